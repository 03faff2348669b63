//! # Credential Record Store
//!
//! Owns every enrolled authenticator credential. Ceremonies never edit
//! records directly; they call `put` and `update_counter`.
//!
//! ## Invariants
//! - A user identity maps to exactly one profile, never overwritten.
//! - `email`, `idnumber` and the WebAuthn user handle each belong to at
//!   most one identity.
//! - A credential id is unique across the whole store.
//! - The signature counter only moves forward. The check happens inside
//!   the store, in the same critical section (or SQL statement) as the
//!   write, so two concurrent assertions cannot both advance it.

pub mod memory;

use crate::user::{UserIdentity, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One enrolled authenticator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    /// Opaque credential id chosen by the authenticator
    pub credential_id: Vec<u8>,
    /// Serialized `webauthn_rs::prelude::Passkey` (public key and algorithm)
    ///
    /// Written once at enrollment. The `counter` field below is the
    /// authoritative signature counter, not the copy inside this blob.
    pub public_key: Vec<u8>,
    /// Signature counter; 0 means the authenticator does not keep one
    pub counter: u32,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl CredentialRecord {
    pub fn new(credential_id: Vec<u8>, public_key: Vec<u8>, counter: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            credential_id,
            public_key,
            counter,
            created_at,
            last_used_at: None,
        }
    }
}

/// A user's profile with all of their credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    pub profile: UserProfile,
    pub credentials: Vec<CredentialRecord>,
}

impl UserAccount {
    pub fn credential(&self, credential_id: &[u8]) -> Option<&CredentialRecord> {
        self.credentials
            .iter()
            .find(|record| record.credential_id == credential_id)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    /// The credential id is already enrolled
    #[error("credential id already enrolled")]
    Conflict,

    /// Another identity already uses this profile value
    #[error("a user with this {0} already exists")]
    DuplicateProfile(&'static str),

    #[error("signature counter did not advance (stored {stored}, presented {presented})")]
    CounterRegression { stored: u32, presented: u32 },

    #[error("credential not found")]
    NotFound,

    #[error("credential store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// Whether `presented` is an acceptable successor of `stored`
///
/// Counters must strictly increase, except that an authenticator which
/// never counts (stored 0, presented 0) is accepted as-is.
pub fn counter_advances(stored: u32, presented: u32) -> bool {
    presented > stored || (stored == 0 && presented == 0)
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Enroll a credential for `profile.identity`
    ///
    /// Creates the profile if the identity is new; an existing profile is
    /// left untouched. Fails with `Conflict` if the credential id exists
    /// and with `DuplicateProfile` if a new profile collides with another
    /// identity's email, idnumber or user handle.
    async fn put(&self, profile: &UserProfile, record: CredentialRecord) -> Result<(), StoreError>;

    /// Fail with `DuplicateProfile` if another identity already holds the
    /// profile's email or idnumber
    async fn check_profile_available(&self, profile: &UserProfile) -> Result<(), StoreError>;

    /// Profile and credentials for a user, if the user is enrolled
    async fn get(&self, user: &UserIdentity) -> Result<Option<UserAccount>, StoreError>;

    /// Compare-and-set the counter of a credential
    ///
    /// Fails with `CounterRegression` unless [`counter_advances`] holds;
    /// the stored value is unchanged in that case. On success `used_at`
    /// becomes the credential's `last_used_at`.
    async fn update_counter(
        &self,
        credential_id: &[u8],
        new_counter: u32,
        used_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}
