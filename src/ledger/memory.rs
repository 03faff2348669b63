//! In-process ledger backend.

use super::{CeremonyKind, ChallengeError, ChallengeStore, PendingChallenge};
use crate::user::UserIdentity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    entries: Mutex<HashMap<(UserIdentity, CeremonyKind), PendingChallenge>>,
}

#[async_trait]
impl ChallengeStore for MemoryChallengeStore {
    async fn insert(&self, pending: PendingChallenge) -> Result<(), ChallengeError> {
        let mut entries = self.entries.lock().await;
        entries.insert((pending.user.clone(), pending.kind), pending);
        Ok(())
    }

    async fn take(
        &self,
        user: &UserIdentity,
        kind: CeremonyKind,
    ) -> Result<Option<PendingChallenge>, ChallengeError> {
        let mut entries = self.entries.lock().await;
        Ok(entries.remove(&(user.clone(), kind)))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ChallengeError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, pending| pending.expires_at >= now);
        Ok((before - entries.len()) as u64)
    }
}
