//! # Outbound Ports
//!
//! Account lookups the detector needs from the user store.

use crate::domain::DetectionError;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{Account, UserId};
use std::collections::BTreeMap;

/// Account directory - outbound port.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Accounts for `ids`. Unknown ids are left out.
    async fn get_accounts(&self, ids: &[UserId]) -> Result<Vec<Account>, DetectionError>;

    /// Accounts whose verified email equals `email`, other than `exclude`.
    async fn find_by_verified_email(
        &self,
        email: &str,
        exclude: UserId,
    ) -> Result<Vec<Account>, DetectionError>;
}

/// In-memory account directory keyed by id.
#[derive(Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<BTreeMap<UserId, Account>>,
}

impl InMemoryAccountDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn upsert(&self, account: Account) {
        self.accounts.write().insert(account.id, account);
    }

    pub fn remove(&self, id: UserId) -> Option<Account> {
        self.accounts.write().remove(&id)
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn get_accounts(&self, ids: &[UserId]) -> Result<Vec<Account>, DetectionError> {
        let accounts = self.accounts.read();
        Ok(ids.iter().filter_map(|id| accounts.get(id).cloned()).collect())
    }

    async fn find_by_verified_email(
        &self,
        email: &str,
        exclude: UserId,
    ) -> Result<Vec<Account>, DetectionError> {
        Ok(self
            .accounts
            .read()
            .values()
            .filter(|a| a.id != exclude && a.email.as_deref() == Some(email))
            .cloned()
            .collect())
    }
}
