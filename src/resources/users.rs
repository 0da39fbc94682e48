//! User account storage.
//!
//! Handlers talk to accounts through [`UserStore`]; [`InMemoryUserStore`] is
//! the bundled implementation.

use crate::error::{ProtocolError, Result};
use parking_lot::RwLock;
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: u64,
    pub wallet: String,
    pub nickname: String,
    pub password: String,
    pub email: String,
    pub created_at: SystemTime,
}

/// Fields supplied when creating an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub wallet: String,
    pub nickname: String,
    pub password: String,
    pub email: String,
}

pub trait UserStore: Send + Sync {
    fn find_by_wallet(&self, wallet: &str) -> Result<Option<UserRecord>>;

    fn email_taken(&self, email: &str) -> Result<bool>;

    fn wallet_taken(&self, wallet: &str) -> Result<bool> {
        Ok(self.find_by_wallet(wallet)?.is_some())
    }

    fn nickname_taken(&self, nickname: &str) -> Result<bool>;

    /// Store a new account. Fails if the email, wallet or nickname is taken.
    fn insert(&self, user: NewUser) -> Result<UserRecord>;
}

#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    users: RwLock<Vec<UserRecord>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl UserStore for InMemoryUserStore {
    fn find_by_wallet(&self, wallet: &str) -> Result<Option<UserRecord>> {
        Ok(self.users.read().iter().find(|u| u.wallet == wallet).cloned())
    }

    fn email_taken(&self, email: &str) -> Result<bool> {
        Ok(self.users.read().iter().any(|u| u.email == email))
    }

    fn nickname_taken(&self, nickname: &str) -> Result<bool> {
        Ok(self.users.read().iter().any(|u| u.nickname == nickname))
    }

    fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let mut users = self.users.write();
        if users.iter().any(|u| {
            u.email == user.email || u.wallet == user.wallet || u.nickname == user.nickname
        }) {
            return Err(ProtocolError::Custom(format!(
                "Account already exists for wallet {}",
                user.wallet
            )));
        }

        let record = UserRecord {
            id: users.len() as u64 + 1,
            wallet: user.wallet,
            nickname: user.nickname,
            password: user.password,
            email: user.email,
            created_at: SystemTime::now(),
        };
        users.push(record.clone());
        Ok(record)
    }
}
