//! # Challenge Ledger
//!
//! Single source of truth for unconsumed WebAuthn challenges.
//!
//! ## Rules
//! - At most one pending challenge per (user, ceremony kind). Issuing a new
//!   one replaces the previous entry.
//! - `consume` removes the entry atomically before judging it, so two
//!   concurrent consumers of the same pair can never both succeed.
//! - An entry older than the configured time-to-live is rejected with
//!   `Expired` even if the presented bytes match.
//!
//! Storage is pluggable through [`ChallengeStore`]: `memory` for tests and
//! embedding, `crate::db::challenges` for SQLite.

pub mod memory;

use crate::clock::Clock;
use crate::user::UserIdentity;
use async_trait::async_trait;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Length of challenges generated by the ledger itself
pub const CHALLENGE_LEN: usize = 32;

/// WebAuthn requires at least 16 random bytes
pub const MIN_CHALLENGE_LEN: usize = 16;

pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(60);

/// Longer time-to-live values are clamped to this
pub const MAX_CHALLENGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CeremonyKind {
    Registration,
    Authentication,
}

impl CeremonyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CeremonyKind::Registration => "registration",
            CeremonyKind::Authentication => "authentication",
        }
    }
}

impl fmt::Display for CeremonyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CeremonyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registration" => Ok(CeremonyKind::Registration),
            "authentication" => Ok(CeremonyKind::Authentication),
            other => Err(format!("unknown ceremony kind '{other}'")),
        }
    }
}

#[derive(Error, Debug)]
pub enum ChallengeError {
    #[error("no pending challenge")]
    NotFound,

    #[error("challenge expired")]
    Expired,

    #[error("challenge mismatch")]
    Mismatch,

    /// Refused at issue time
    #[error("challenge of {0} bytes is too short")]
    TooShort(usize),

    /// The backing store failed; distinct from a rejected challenge
    #[error("challenge store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
}

/// A freshly issued challenge, as handed to the ceremony
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub user: UserIdentity,
    pub kind: CeremonyKind,
    pub bytes: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Challenge {
    /// Base64url (no padding), the form browsers expect in options
    pub fn encoded(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(&self.bytes)
    }
}

/// Ledger entry as kept by a [`ChallengeStore`]
///
/// `context` is opaque ceremony-session data stored next to the challenge
/// and handed back by a successful `consume`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChallenge {
    pub user: UserIdentity,
    pub kind: CeremonyKind,
    pub challenge: Vec<u8>,
    pub context: Vec<u8>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Storage backend for the ledger
///
/// Implementations must make `take` atomic: for one (user, kind) pair only
/// one caller may ever receive a given entry.
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    /// Insert or replace the entry for `(pending.user, pending.kind)`
    async fn insert(&self, pending: PendingChallenge) -> Result<(), ChallengeError>;

    /// Remove and return the entry for the pair, if any
    async fn take(
        &self,
        user: &UserIdentity,
        kind: CeremonyKind,
    ) -> Result<Option<PendingChallenge>, ChallengeError>;

    /// Drop entries whose expiry is before `now`; returns how many went
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, ChallengeError>;
}

#[derive(Clone)]
pub struct ChallengeLedger {
    store: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl ChallengeLedger {
    pub fn new(store: Arc<dyn ChallengeStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::milliseconds(ttl.min(MAX_CHALLENGE_TTL).as_millis() as i64);
        Self { store, clock, ttl }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Issue a new challenge for the pair, replacing any pending one
    pub async fn issue(&self, user: &UserIdentity, kind: CeremonyKind) -> Result<Challenge, ChallengeError> {
        self.issue_with_context(user, kind, Vec::new()).await
    }

    /// Same as [`issue`](Self::issue), with session context stored alongside
    pub async fn issue_with_context(
        &self,
        user: &UserIdentity,
        kind: CeremonyKind,
        context: Vec<u8>,
    ) -> Result<Challenge, ChallengeError> {
        let mut bytes = vec![0u8; CHALLENGE_LEN];
        OsRng.fill_bytes(&mut bytes);
        self.record(user, kind, bytes, context).await
    }

    /// Record a challenge generated elsewhere (by the WebAuthn library)
    ///
    /// From here on the ledger owns it exactly like one it generated: it
    /// replaces any pending entry for the pair and can be consumed once.
    pub async fn record(
        &self,
        user: &UserIdentity,
        kind: CeremonyKind,
        bytes: Vec<u8>,
        context: Vec<u8>,
    ) -> Result<Challenge, ChallengeError> {
        if bytes.len() < MIN_CHALLENGE_LEN {
            return Err(ChallengeError::TooShort(bytes.len()));
        }

        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;

        self.store
            .insert(PendingChallenge {
                user: user.clone(),
                kind,
                challenge: bytes.clone(),
                context,
                issued_at,
                expires_at,
            })
            .await?;

        tracing::debug!(user = %user, %kind, "challenge issued");

        Ok(Challenge {
            user: user.clone(),
            kind,
            bytes,
            issued_at,
            expires_at,
        })
    }

    /// Consume the pending challenge for the pair
    ///
    /// The entry is removed before it is judged: a second call for the same
    /// pair fails with `NotFound` whatever the first outcome was. Returns the
    /// session context stored at issue time.
    pub async fn consume(
        &self,
        user: &UserIdentity,
        kind: CeremonyKind,
        presented: &[u8],
    ) -> Result<Vec<u8>, ChallengeError> {
        let pending = self
            .store
            .take(user, kind)
            .await?
            .ok_or(ChallengeError::NotFound)?;

        if self.clock.now() > pending.expires_at {
            return Err(ChallengeError::Expired);
        }

        if pending.challenge != presented {
            return Err(ChallengeError::Mismatch);
        }

        tracing::debug!(user = %user, %kind, "challenge consumed");

        Ok(pending.context)
    }

    pub async fn purge_expired(&self) -> Result<u64, ChallengeError> {
        self.store.purge_expired(self.clock.now()).await
    }
}
