//! # Credential Database Operations
//!
//! SQLite implementation of [`CredentialStore`].
//!
//! ## Counter updates
//! The compare-and-set is a single conditional `UPDATE`; SQLite executes it
//! atomically, so the read of the old counter and the write of the new one
//! cannot interleave with another assertion for the same credential.

use super::{encode_time, users};
use crate::credentials::{CredentialRecord, CredentialStore, StoreError, UserAccount};
use crate::db::models::CredentialRow;
use crate::user::{UserIdentity, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn put(&self, profile: &UserProfile, record: CredentialRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        match users::insert_if_absent(&mut *tx, profile, record.created_at).await {
            Ok(true) => tracing::debug!(user = %profile.identity, "user profile created"),
            Ok(false) => {}
            Err(e) => {
                return Err(match users::duplicate_field(&e) {
                    Some(field) => StoreError::DuplicateProfile(field),
                    None => e.into(),
                })
            }
        }

        let inserted = sqlx::query(
            "INSERT INTO credentials
             (credential_id, username, public_key, counter, created_at, last_used_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.credential_id)
        .bind(profile.identity.as_str())
        .bind(&record.public_key)
        .bind(i64::from(record.counter))
        .bind(encode_time(record.created_at))
        .bind(record.last_used_at.map(encode_time))
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            // dropping `tx` rolls back the profile insert as well
            Err(e) if is_unique_violation(&e) => return Err(StoreError::Conflict),
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    async fn check_profile_available(&self, profile: &UserProfile) -> Result<(), StoreError> {
        match users::find_conflict(&self.pool, profile).await? {
            Some(field) => Err(StoreError::DuplicateProfile(field)),
            None => Ok(()),
        }
    }

    async fn get(&self, user: &UserIdentity) -> Result<Option<UserAccount>, StoreError> {
        let Some(profile) = users::find_by_username(&self.pool, user).await? else {
            return Ok(None);
        };

        let credentials = sqlx::query_as::<_, CredentialRow>(
            "SELECT * FROM credentials WHERE username = ? ORDER BY created_at, credential_id",
        )
        .bind(user.as_str())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(CredentialRecord::try_from)
        .collect::<Result<Vec<_>, _>>()?;

        Ok(Some(UserAccount { profile, credentials }))
    }

    async fn update_counter(
        &self,
        credential_id: &[u8],
        new_counter: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let counter = i64::from(new_counter);

        let updated = sqlx::query(
            "UPDATE credentials
             SET counter = ?1, last_used_at = ?2
             WHERE credential_id = ?3
               AND (counter < ?1 OR (counter = 0 AND ?1 = 0))",
        )
        .bind(counter)
        .bind(encode_time(used_at))
        .bind(credential_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 1 {
            return Ok(());
        }

        // Nothing matched: either the credential is unknown or the counter
        // did not advance.
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT counter FROM credentials WHERE credential_id = ?")
                .bind(credential_id)
                .fetch_optional(&self.pool)
                .await?;

        match stored {
            None => Err(StoreError::NotFound),
            Some(stored) => Err(StoreError::CounterRegression {
                stored: u32::try_from(stored).unwrap_or(u32::MAX),
                presented: new_counter,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::test_support::{profile, profile_form};
    use chrono::TimeZone;
    use std::sync::Arc;
    use uuid::Uuid;

    async fn store() -> SqliteCredentialStore {
        let pool = db::connect("sqlite::memory:", 1).await.unwrap();
        SqliteCredentialStore::new(pool)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
    }

    fn record(id: &[u8], counter: u32) -> CredentialRecord {
        CredentialRecord::new(id.to_vec(), vec![0xa5; 77], counter, at())
    }

    #[tokio::test]
    async fn put_then_get() {
        let store = store().await;
        let alice = profile("alice");
        store.put(&alice, record(b"cred-1", 7)).await.unwrap();

        let account = store.get(&alice.identity).await.unwrap().unwrap();
        assert_eq!(account.profile, alice);
        assert_eq!(account.credentials.len(), 1);
        assert_eq!(account.credentials[0].credential_id, b"cred-1");
        assert_eq!(account.credentials[0].counter, 7);
        assert_eq!(account.credentials[0].public_key, vec![0xa5; 77]);
        assert_eq!(account.credentials[0].created_at, at());
    }

    #[tokio::test]
    async fn unknown_user_is_none() {
        let store = store().await;
        assert!(store.get(&profile("nobody").identity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conflict_leaves_no_trace() {
        let store = store().await;
        store.put(&profile("alice"), record(b"cred-1", 0)).await.unwrap();

        let err = store.put(&profile("bob"), record(b"cred-1", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
        // bob's profile insert was rolled back with the credential
        assert!(store.get(&profile("bob").identity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_email_is_reported() {
        let store = store().await;
        store.put(&profile("alice"), record(b"cred-1", 0)).await.unwrap();

        let mut form = profile_form("bob");
        form.email = "ALICE@example.com".to_string();
        let bob = UserProfile::parse(&form, Uuid::new_v4()).unwrap();

        assert!(matches!(
            store.check_profile_available(&bob).await,
            Err(StoreError::DuplicateProfile("email"))
        ));
        assert!(matches!(
            store.put(&bob, record(b"cred-2", 0)).await,
            Err(StoreError::DuplicateProfile("email"))
        ));
        assert!(store.get(&bob.identity).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_idnumber_is_reported() {
        let store = store().await;
        store.put(&profile("alice"), record(b"cred-1", 0)).await.unwrap();

        let mut form = profile_form("bob");
        form.idnumber = profile_form("alice").idnumber;
        let bob = UserProfile::parse(&form, Uuid::new_v4()).unwrap();

        assert!(matches!(
            store.check_profile_available(&bob).await,
            Err(StoreError::DuplicateProfile("idnumber"))
        ));
        assert!(matches!(
            store.put(&bob, record(b"cred-2", 0)).await,
            Err(StoreError::DuplicateProfile("idnumber"))
        ));
        // the credential insert never happened either
        assert!(matches!(
            store.update_counter(b"cred-2", 1, at()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn own_profile_is_not_a_conflict() {
        let store = store().await;
        let alice = profile("alice");
        store.put(&alice, record(b"cred-1", 0)).await.unwrap();
        store.check_profile_available(&alice).await.unwrap();
    }

    #[tokio::test]
    async fn profile_is_never_overwritten() {
        let store = store().await;
        let alice = profile("alice");
        store.put(&alice, record(b"cred-1", 0)).await.unwrap();

        let mut form = profile_form("alice");
        form.firstname = "Mallory".to_string();
        let other = UserProfile::parse(&form, alice.user_handle).unwrap();
        store.put(&other, record(b"cred-2", 0)).await.unwrap();

        let account = store.get(&other.identity).await.unwrap().unwrap();
        assert_eq!(account.profile.firstname, "Alice");
        assert_eq!(account.credentials.len(), 2);
    }

    #[tokio::test]
    async fn counter_compare_and_set() {
        let store = store().await;
        let alice = profile("alice");
        store.put(&alice, record(b"cred-1", 0)).await.unwrap();

        let used_at = at() + chrono::Duration::minutes(3);
        store.update_counter(b"cred-1", 5, used_at).await.unwrap();
        let err = store.update_counter(b"cred-1", 3, at()).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::CounterRegression {
                stored: 5,
                presented: 3
            }
        ));
        assert!(matches!(
            store.update_counter(b"cred-1", 5, at()).await,
            Err(StoreError::CounterRegression { .. })
        ));

        let account = store.get(&alice.identity).await.unwrap().unwrap();
        assert_eq!(account.credentials[0].counter, 5);
        assert_eq!(account.credentials[0].last_used_at, Some(used_at));
    }

    #[tokio::test]
    async fn zero_counter_is_accepted_repeatedly() {
        let store = store().await;
        store.put(&profile("alice"), record(b"cred-1", 0)).await.unwrap();
        store.update_counter(b"cred-1", 0, at()).await.unwrap();
        store.update_counter(b"cred-1", 0, at()).await.unwrap();
    }

    #[tokio::test]
    async fn update_unknown_credential() {
        let store = store().await;
        assert!(matches!(
            store.update_counter(b"missing", 1, at()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_updates_with_same_counter_only_one_wins() {
        let store = Arc::new(store().await);
        store.put(&profile("alice"), record(b"cred-1", 1)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update_counter(b"cred-1", 2, at()).await.is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }
}
