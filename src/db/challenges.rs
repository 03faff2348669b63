//! SQLite implementation of [`ChallengeStore`].
//!
//! `take` is a single `DELETE … RETURNING`: whichever request runs it first
//! gets the row, every other one gets nothing.

use super::encode_time;
use crate::db::models::ChallengeRow;
use crate::ledger::{CeremonyKind, ChallengeError, ChallengeStore, PendingChallenge};
use crate::user::UserIdentity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct SqliteChallengeStore {
    pool: SqlitePool,
}

impl SqliteChallengeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChallengeStore for SqliteChallengeStore {
    async fn insert(&self, pending: PendingChallenge) -> Result<(), ChallengeError> {
        sqlx::query(
            "INSERT INTO challenges (username, kind, challenge, context, issued_at, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (username, kind) DO UPDATE SET
                 challenge = excluded.challenge,
                 context = excluded.context,
                 issued_at = excluded.issued_at,
                 expires_at = excluded.expires_at",
        )
        .bind(pending.user.as_str())
        .bind(pending.kind.as_str())
        .bind(&pending.challenge)
        .bind(&pending.context)
        .bind(encode_time(pending.issued_at))
        .bind(encode_time(pending.expires_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn take(
        &self,
        user: &UserIdentity,
        kind: CeremonyKind,
    ) -> Result<Option<PendingChallenge>, ChallengeError> {
        let row = sqlx::query_as::<_, ChallengeRow>(
            "DELETE FROM challenges
             WHERE username = ? AND kind = ?
             RETURNING username, kind, challenge, context, issued_at, expires_at",
        )
        .bind(user.as_str())
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PendingChallenge::try_from).transpose()?)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ChallengeError> {
        let result = sqlx::query("DELETE FROM challenges WHERE expires_at < ?")
            .bind(encode_time(now))
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
