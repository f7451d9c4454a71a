//! Account use-case service.
//!
//! # Responsibility
//! - Create salted password accounts and verify logins.
//! - Gate account creation on an admin session.
//!
//! # Invariants
//! - Usernames have at least 3 characters, passwords at least 4.
//! - Hashes are `SHA-256(salt || password)` with a fresh 16-byte salt.
//! - Hash comparison does not short-circuit on the first differing byte.

use crate::model::account::{Account, Session};
use crate::repo::account_repo::AccountRepository;
use crate::repo::StoreError;
use log::{info, warn};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const MIN_USERNAME_CHARS: usize = 3;
pub const MIN_PASSWORD_CHARS: usize = 4;
const SALT_BYTES: usize = 16;

/// Demo accounts created on first start: `(username, password, is_admin)`.
pub const DEMO_ACCOUNTS: [(&str, &str, bool); 2] =
    [("admin", "admin", true), ("user", "user", false)];

/// Account and login failures.
#[derive(Debug)]
pub enum AuthError {
    UsernameTooShort,
    PasswordTooShort,
    UsernameTaken(String),
    UnknownUser(String),
    WrongPassword,
    NotLoggedIn,
    AdminRequired,
    Store(StoreError),
}

impl Display for AuthError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UsernameTooShort => write!(
                f,
                "Username must be at least {MIN_USERNAME_CHARS} characters long."
            ),
            Self::PasswordTooShort => write!(
                f,
                "Password must be at least {MIN_PASSWORD_CHARS} characters long."
            ),
            Self::UsernameTaken(_) => write!(f, "Username is already taken."),
            Self::UnknownUser(_) => write!(f, "Username does not exist."),
            Self::WrongPassword => write!(f, "Wrong password."),
            Self::NotLoggedIn => write!(f, "You must be logged in."),
            Self::AdminRequired => write!(f, "Only admin can create users."),
            Self::Store(err) => write!(f, "account store error: {err}"),
        }
    }
}

impl Error for AuthError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateAccount(username) => Self::UsernameTaken(username),
            other => Self::Store(other),
        }
    }
}

/// Salted SHA-256 password hashing.
pub struct PasswordHasher;

impl PasswordHasher {
    pub fn new_salt() -> Vec<u8> {
        let mut salt = vec![0_u8; SALT_BYTES];
        rand::thread_rng().fill_bytes(&mut salt);
        salt
    }

    pub fn hash(salt: &[u8], password: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hasher.finalize().to_vec()
    }

    pub fn verify(salt: &[u8], password: &str, expected: &[u8]) -> bool {
        constant_time_eq(&Self::hash(salt, password), expected)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Use-case service over an account repository.
pub struct AccountService<R: AccountRepository> {
    repo: R,
}

impl<R: AccountRepository> AccountService<R> {
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Registers a new account.
    ///
    /// # Errors
    /// - Length checks run before the store is touched.
    /// - `UsernameTaken` when the name exists.
    pub fn new_account(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<(), AuthError> {
        let username = username.trim();
        if username.chars().count() < MIN_USERNAME_CHARS {
            return Err(AuthError::UsernameTooShort);
        }
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(AuthError::PasswordTooShort);
        }

        let salt = PasswordHasher::new_salt();
        let password_hash = PasswordHasher::hash(&salt, password);
        self.repo.insert_account(&Account {
            username: username.to_string(),
            salt,
            password_hash,
            is_admin,
        })?;
        info!(
            "event=account_create module=auth status=ok is_admin={}",
            is_admin
        );
        Ok(())
    }

    pub fn username_exists(&self, username: &str) -> Result<bool, AuthError> {
        Ok(self.repo.get_account(username.trim())?.is_some())
    }

    /// Checks a password. Unknown users are an error, not `false`.
    pub fn credentials_correct(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        let account = self
            .repo
            .get_account(username.trim())?
            .ok_or_else(|| AuthError::UnknownUser(username.trim().to_string()))?;
        Ok(PasswordHasher::verify(
            &account.salt,
            password,
            &account.password_hash,
        ))
    }

    /// Verifies credentials and opens a session.
    pub fn login(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let username = username.trim();
        let account = self
            .repo
            .get_account(username)?
            .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;
        if !PasswordHasher::verify(&account.salt, password, &account.password_hash) {
            warn!("event=login module=auth status=rejected reason=wrong_password");
            return Err(AuthError::WrongPassword);
        }
        info!(
            "event=login module=auth status=ok is_admin={}",
            account.is_admin
        );
        Ok(Session::for_user(account.username, account.is_admin))
    }

    /// Creates an account on behalf of a logged-in admin.
    pub fn create_account_as(
        &self,
        session: &Session,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<(), AuthError> {
        if !session.is_logged_in() {
            return Err(AuthError::NotLoggedIn);
        }
        if !session.is_admin() {
            return Err(AuthError::AdminRequired);
        }
        self.new_account(username, password, is_admin)
    }

    /// Inserts the demo accounts when the table is empty. Returns how many were added.
    pub fn seed_demo_accounts(&self) -> Result<usize, AuthError> {
        if self.repo.count_accounts()? > 0 {
            return Ok(0);
        }
        for (username, password, is_admin) in DEMO_ACCOUNTS {
            self.new_account(username, password, is_admin)?;
        }
        Ok(DEMO_ACCOUNTS.len())
    }
}
