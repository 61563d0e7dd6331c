//! # Outbound Ports
//!
//! The user population the engine samples from.

use crate::domain::RolloutError;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{Account, UserId};

/// User directory - outbound port.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Every account with elevated privileges.
    async fn list_admins(&self) -> Result<Vec<UserId>, RolloutError>;

    /// One page of all accounts, in a stable order.
    async fn list_all(&self, offset: usize, limit: usize) -> Result<Vec<UserId>, RolloutError>;

    /// Size of the whole population.
    async fn count_all(&self) -> Result<usize, RolloutError>;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// In-memory user directory, ordered by insertion.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    accounts: RwLock<Vec<Account>>,
}

impl InMemoryUserDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory pre-filled with `admins` admins followed by `users` regular
    /// accounts, ids starting at 1.
    #[must_use]
    pub fn with_population(admins: u64, users: u64) -> Self {
        let directory = Self::new();
        for id in 1..=admins + users {
            let account = Account::new(UserId(id), format!("user{id}"));
            if id <= admins {
                directory.insert(account.with_role(shared_types::Role::Admin));
            } else {
                directory.insert(account);
            }
        }
        directory
    }

    pub fn insert(&self, account: Account) {
        self.accounts.write().push(account);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn list_admins(&self) -> Result<Vec<UserId>, RolloutError> {
        Ok(self
            .accounts
            .read()
            .iter()
            .filter(|a| a.is_admin())
            .map(|a| a.id)
            .collect())
    }

    async fn list_all(&self, offset: usize, limit: usize) -> Result<Vec<UserId>, RolloutError> {
        Ok(self
            .accounts
            .read()
            .iter()
            .skip(offset)
            .take(limit)
            .map(|a| a.id)
            .collect())
    }

    async fn count_all(&self) -> Result<usize, RolloutError> {
        Ok(self.len())
    }
}
