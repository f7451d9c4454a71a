use stockbot_core::db::open_db_in_memory;
use stockbot_core::repo::account_repo::AccountRepository;
use stockbot_core::{AccountService, AuthError, Session, SqliteAccountRepository};

#[test]
fn demo_accounts_are_seeded_once() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(SqliteAccountRepository::new(&conn));

    assert_eq!(service.seed_demo_accounts().unwrap(), 2);
    assert_eq!(service.seed_demo_accounts().unwrap(), 0);

    let admin = service.login("admin", "admin").unwrap();
    assert!(admin.is_admin());
    let user = service.login("user", "user").unwrap();
    assert!(user.is_logged_in());
    assert!(!user.is_admin());
    assert_eq!(user.username(), Some("user"));
}

#[test]
fn passwords_are_stored_salted() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(SqliteAccountRepository::new(&conn));
    service.new_account("alice", "secret", false).unwrap();
    service.new_account("bob", "secret", false).unwrap();

    let repo = SqliteAccountRepository::new(&conn);
    let alice = repo.get_account("alice").unwrap().unwrap();
    let bob = repo.get_account("bob").unwrap().unwrap();
    assert_eq!(alice.salt.len(), 16);
    assert_eq!(alice.password_hash.len(), 32);
    assert_ne!(alice.password_hash, bob.password_hash);
    assert_ne!(alice.password_hash, b"secret".to_vec());
}

#[test]
fn login_distinguishes_unknown_user_from_wrong_password() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(SqliteAccountRepository::new(&conn));
    service.new_account("alice", "secret", false).unwrap();

    let unknown = service.login("mallory", "secret").unwrap_err();
    assert!(matches!(unknown, AuthError::UnknownUser(_)));
    assert_eq!(unknown.to_string(), "Username does not exist.");

    let wrong = service.login("alice", "guess").unwrap_err();
    assert!(matches!(wrong, AuthError::WrongPassword));
    assert_eq!(wrong.to_string(), "Wrong password.");

    assert!(service.credentials_correct("alice", "secret").unwrap());
    assert!(!service.credentials_correct("alice", "Secret").unwrap());
    assert!(service.username_exists(" alice ").unwrap());
    assert!(!service.username_exists("bob").unwrap());
}

#[test]
fn new_account_enforces_lengths_and_uniqueness() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(SqliteAccountRepository::new(&conn));

    assert!(matches!(
        service.new_account("al", "secret", false),
        Err(AuthError::UsernameTooShort)
    ));
    assert!(matches!(
        service.new_account("alice", "abc", false),
        Err(AuthError::PasswordTooShort)
    ));
    service.new_account("alice", "abcd", false).unwrap();
    let err = service.new_account("alice", "other", true).unwrap_err();
    assert_eq!(err.to_string(), "Username is already taken.");
}

#[test]
fn only_admins_create_accounts() {
    let conn = open_db_in_memory().unwrap();
    let service = AccountService::new(SqliteAccountRepository::new(&conn));
    service.seed_demo_accounts().unwrap();

    let anonymous = Session::anonymous();
    assert!(matches!(
        service.create_account_as(&anonymous, "carol", "pass", false),
        Err(AuthError::NotLoggedIn)
    ));

    let user = service.login("user", "user").unwrap();
    let err = service
        .create_account_as(&user, "carol", "pass", false)
        .unwrap_err();
    assert_eq!(err.to_string(), "Only admin can create users.");

    let mut admin = service.login("admin", "admin").unwrap();
    service
        .create_account_as(&admin, "carol", "pass", true)
        .unwrap();
    assert!(service.login("carol", "pass").unwrap().is_admin());

    admin.logout();
    assert!(!admin.is_logged_in());
}
