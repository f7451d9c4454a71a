//! Account repository contract and SQLite implementation.

use crate::model::account::Account;
use crate::repo::{StoreError, StoreResult};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

/// Persistence operations for login accounts.
pub trait AccountRepository {
    /// Inserts a new account; fails with `DuplicateAccount` when taken.
    fn insert_account(&self, account: &Account) -> StoreResult<()>;
    fn get_account(&self, username: &str) -> StoreResult<Option<Account>>;
    fn count_accounts(&self) -> StoreResult<u64>;
}

/// SQLite-backed account repository.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AccountRepository for SqliteAccountRepository<'_> {
    fn insert_account(&self, account: &Account) -> StoreResult<()> {
        let inserted = self.conn.execute(
            "INSERT INTO accounts (username, salt, password_hash, is_admin)
             VALUES (?1, ?2, ?3, ?4);",
            params![
                account.username.as_str(),
                account.salt.as_slice(),
                account.password_hash.as_slice(),
                account.is_admin,
            ],
        );
        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateAccount(account.username.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn get_account(&self, username: &str) -> StoreResult<Option<Account>> {
        let account = self
            .conn
            .query_row(
                "SELECT username, salt, password_hash, is_admin
                 FROM accounts
                 WHERE username = ?1;",
                [username],
                |row| {
                    Ok(Account {
                        username: row.get("username")?,
                        salt: row.get("salt")?,
                        password_hash: row.get("password_hash")?,
                        is_admin: row.get("is_admin")?,
                    })
                },
            )
            .optional()?;
        Ok(account)
    }

    fn count_accounts(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM accounts;", [], |row| row.get(0))?;
        u64::try_from(count)
            .map_err(|_| StoreError::InvalidData(format!("negative account count {count}")))
    }
}
