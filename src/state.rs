//! # Application State
//!
//! Shared state handed to every ceremony and request handler. Axum clones it
//! per request; every field is an `Arc` (or wraps one), so that is cheap.
//!
//! ## Components
//! - `ledger`: the Challenge Ledger (single-use challenges)
//! - `credentials`: the Credential Record Store
//! - `webauthn`: the webauthn-rs instance that builds ceremony options
//! - `attestation` / `assertion`: the verifier capabilities
//! - `relying_party`: enrollment policy and the verification time bound
//! - `clock`: time source for credential timestamps (the ledger has its own
//!   handle to the same clock)
//!
//! The ceremonies hold nothing between calls; everything they need is
//! reconstructed from the ledger and the store.

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::credentials::memory::MemoryCredentialStore;
use crate::credentials::CredentialStore;
use crate::db::{self, challenges::SqliteChallengeStore, credentials::SqliteCredentialStore};
use crate::ledger::memory::MemoryChallengeStore;
use crate::ledger::ChallengeLedger;
use crate::webauthn::passkey::PasskeyVerifier;
use crate::webauthn::verifier::{AssertionVerifier, AttestationVerifier};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use webauthn_rs::prelude::*;

/// Relying-party settings every ceremony checks responses against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    /// Normalised origin, see [`Config::rp_origin`]
    pub origin: String,
    pub name: String,
    /// When false, an identity holding a credential cannot enroll another
    pub allow_reregistration: bool,
    pub verifier_timeout: Duration,
}

impl RelyingParty {
    pub fn from_config(config: &Config) -> Self {
        Self {
            id: config.rp_id.clone(),
            origin: config.rp_origin.clone(),
            name: config.rp_name.clone(),
            allow_reregistration: config.allow_reregistration,
            verifier_timeout: config.verifier_timeout,
        }
    }

    /// Build the WebAuthn instance for this relying party
    ///
    /// The browser-side `timeout` advertised in ceremony options equals
    /// `challenge_ttl`, so a prompt never outlives its challenge.
    pub fn webauthn(&self, challenge_ttl: Duration) -> Result<Arc<Webauthn>> {
        let origin = Url::parse(&self.origin).with_context(|| format!("invalid RP origin {:?}", self.origin))?;
        let webauthn = WebauthnBuilder::new(&self.id, &origin)?
            .rp_name(&self.name)
            .allow_subdomains(false)
            .timeout(challenge_ttl)
            .build()?;
        Ok(Arc::new(webauthn))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub ledger: ChallengeLedger,
    pub credentials: Arc<dyn CredentialStore>,
    pub webauthn: Arc<Webauthn>,
    pub attestation: Arc<dyn AttestationVerifier>,
    pub assertion: Arc<dyn AssertionVerifier>,
    pub relying_party: Arc<RelyingParty>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// Production state: SQLite-backed ledger and store, passkey verification
    ///
    /// # Errors
    /// Fails if the database cannot be opened or migrated, or if the relying
    /// party settings are rejected by webauthn-rs.
    pub async fn new(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.database_url, config.database_max_connections).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ledger = ChallengeLedger::new(
            Arc::new(SqliteChallengeStore::new(pool.clone())),
            clock.clone(),
            config.challenge_ttl,
        );
        let relying_party = RelyingParty::from_config(config);
        let webauthn = relying_party.webauthn(config.challenge_ttl)?;
        let verifier = Arc::new(PasskeyVerifier::new(webauthn.clone()));

        Ok(Self {
            ledger,
            credentials: Arc::new(SqliteCredentialStore::new(pool)),
            webauthn,
            attestation: verifier.clone(),
            assertion: verifier,
            relying_party: Arc::new(relying_party),
            clock,
        })
    }

    /// State over the in-process backends, with passkey verification
    pub fn in_memory(relying_party: RelyingParty, clock: Arc<dyn Clock>, challenge_ttl: Duration) -> Result<Self> {
        let ledger = ChallengeLedger::new(Arc::new(MemoryChallengeStore::default()), clock.clone(), challenge_ttl);
        let webauthn = relying_party.webauthn(challenge_ttl)?;
        let verifier = Arc::new(PasskeyVerifier::new(webauthn.clone()));

        Ok(Self {
            ledger,
            credentials: Arc::new(MemoryCredentialStore::default()),
            webauthn,
            attestation: verifier.clone(),
            assertion: verifier,
            relying_party: Arc::new(relying_party),
            clock,
        })
    }

    /// Replace the verifiers, keeping everything else
    pub fn with_verifiers(
        mut self,
        attestation: Arc<dyn AttestationVerifier>,
        assertion: Arc<dyn AssertionVerifier>,
    ) -> Self {
        self.attestation = attestation;
        self.assertion = assertion;
        self
    }
}
