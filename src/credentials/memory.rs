//! In-process credential store.

use super::{counter_advances, CredentialRecord, CredentialStore, StoreError, UserAccount};
use crate::user::{UserIdentity, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<UserIdentity, UserAccount>,
    // credential id -> owner
    owners: HashMap<Vec<u8>, UserIdentity>,
}

impl Inner {
    /// First unique profile field that another identity already holds
    fn taken_field(&self, profile: &UserProfile) -> Option<&'static str> {
        self.accounts
            .values()
            .map(|account| &account.profile)
            .filter(|other| other.identity != profile.identity)
            .find_map(|other| {
                if other.email == profile.email {
                    Some("email")
                } else if other.idnumber == profile.idnumber {
                    Some("idnumber")
                } else if other.user_handle == profile.user_handle {
                    Some("user_handle")
                } else {
                    None
                }
            })
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn put(&self, profile: &UserProfile, record: CredentialRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        if inner.owners.contains_key(&record.credential_id) {
            return Err(StoreError::Conflict);
        }
        if !inner.accounts.contains_key(&profile.identity) {
            if let Some(field) = inner.taken_field(profile) {
                return Err(StoreError::DuplicateProfile(field));
            }
        }

        inner
            .owners
            .insert(record.credential_id.clone(), profile.identity.clone());
        inner
            .accounts
            .entry(profile.identity.clone())
            .or_insert_with(|| UserAccount {
                profile: profile.clone(),
                credentials: Vec::new(),
            })
            .credentials
            .push(record);

        Ok(())
    }

    async fn check_profile_available(&self, profile: &UserProfile) -> Result<(), StoreError> {
        let inner = self.inner.lock().await;
        match inner.taken_field(profile) {
            Some(field) => Err(StoreError::DuplicateProfile(field)),
            None => Ok(()),
        }
    }

    async fn get(&self, user: &UserIdentity) -> Result<Option<UserAccount>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(user).cloned())
    }

    async fn update_counter(
        &self,
        credential_id: &[u8],
        new_counter: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;

        let owner = inner
            .owners
            .get(credential_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        let record = inner
            .accounts
            .get_mut(&owner)
            .and_then(|account| {
                account
                    .credentials
                    .iter_mut()
                    .find(|record| record.credential_id == credential_id)
            })
            .ok_or(StoreError::NotFound)?;

        if !counter_advances(record.counter, new_counter) {
            return Err(StoreError::CounterRegression {
                stored: record.counter,
                presented: new_counter,
            });
        }

        record.counter = new_counter;
        record.last_used_at = Some(used_at);
        Ok(())
    }
}
