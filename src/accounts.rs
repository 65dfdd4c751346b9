//! Debug-mode local account lookup.
//!
//! With `AUTH_DEBUG` enabled, logins resolve against a JSON accounts file
//! instead of the backend. This is an alternate identity provider for
//! development only; the file never ships.
//!
//! File shape: `{"accounts": [{"email", "role", "password", "name"?}]}`.

use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::session::Role;

/// One local test account
#[derive(Debug, Clone, Deserialize)]
pub struct Account {
    pub email: String,
    pub role: Role,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: Vec<Account>,
}

/// In-memory view of the accounts file
#[derive(Debug, Clone, Default)]
pub struct AccountStore {
    accounts: Vec<Account>,
}

impl AccountStore {
    /// Load the accounts file. A missing or unreadable file yields an
    /// empty store (every login then fails), matching the forgiving
    /// behavior of the debug tooling this replaces.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let accounts = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<AccountsFile>(&raw) {
                Ok(file) => file.accounts,
                Err(e) => {
                    warn!(path = %path.display(), "Accounts file is not valid JSON: {}", e);
                    Vec::new()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), "Accounts file not readable: {}", e);
                Vec::new()
            }
        };

        Self { accounts }
    }

    pub fn from_accounts(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    /// Match email and password against the loaded accounts.
    pub fn validate(&self, email: &str, password: &str) -> Option<&Account> {
        self.accounts
            .iter()
            .find(|account| account.email == email && account.password == password)
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AccountStore {
        let raw = r#"{
            "accounts": [
                {"email": "student@records.example", "role": "student", "password": "pw1"},
                {"email": "aro@records.example", "role": "ARO", "password": "pw2", "name": "Records Officer"}
            ]
        }"#;
        let file: AccountsFile = serde_json::from_str(raw).unwrap();
        AccountStore::from_accounts(file.accounts)
    }

    #[test]
    fn test_validate_matches_email_and_password() {
        let store = store();
        let account = store.validate("aro@records.example", "pw2").unwrap();
        assert_eq!(account.role, Role::Aro);
        assert_eq!(account.name.as_deref(), Some("Records Officer"));

        assert!(store.validate("aro@records.example", "wrong").is_none());
        assert!(store.validate("nobody@records.example", "pw1").is_none());
    }

    #[test]
    fn test_missing_file_yields_empty_store() {
        let store = AccountStore::load("/definitely/not/a/real/path.json");
        assert!(store.is_empty());
        assert!(store.validate("a@b.com", "pw").is_none());
    }

    #[test]
    fn test_unknown_role_fails_parse() {
        let raw = r#"{"accounts": [{"email": "x@y", "role": "wizard", "password": "p"}]}"#;
        assert!(serde_json::from_str::<AccountsFile>(raw).is_err());
    }
}
