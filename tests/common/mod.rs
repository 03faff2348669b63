#![allow(dead_code)]

mod authenticator;

pub use authenticator::{SoftAuthenticator, COSE_ALG_ES256, COSE_ALG_RS256, FLAG_UP, ORIGIN};

use passkey_ceremony_server::clock::ManualClock;
use passkey_ceremony_server::db::{self, challenges::SqliteChallengeStore, credentials::SqliteCredentialStore};
use passkey_ceremony_server::ledger::{ChallengeLedger, DEFAULT_CHALLENGE_TTL};
use passkey_ceremony_server::state::{AppState, RelyingParty};
use passkey_ceremony_server::user::ProfileForm;
use passkey_ceremony_server::webauthn::passkey::PasskeyVerifier;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

pub fn relying_party() -> RelyingParty {
    RelyingParty {
        id: "localhost".to_string(),
        origin: ORIGIN.to_string(),
        name: "Passkey Demo".to_string(),
        allow_reregistration: false,
        verifier_timeout: Duration::from_secs(5),
    }
}

/// SQLite-backed state with passkey verification and a controllable clock
pub async fn sqlite_state(clock: Arc<ManualClock>) -> AppState {
    let pool = db::connect("sqlite::memory:", 1).await.unwrap();
    let relying_party = relying_party();
    let webauthn = relying_party.webauthn(DEFAULT_CHALLENGE_TTL).unwrap();
    let verifier = Arc::new(PasskeyVerifier::new(webauthn.clone()));

    AppState {
        ledger: ChallengeLedger::new(
            Arc::new(SqliteChallengeStore::new(pool.clone())),
            clock.clone(),
            DEFAULT_CHALLENGE_TTL,
        ),
        credentials: Arc::new(SqliteCredentialStore::new(pool)),
        webauthn,
        attestation: verifier.clone(),
        assertion: verifier,
        relying_party: Arc::new(relying_party),
        clock,
    }
}

/// Registration form as JSON; `email` and `idnumber` derive from the username
pub fn profile_json(username: &str) -> Value {
    json!({
        "username": username,
        "firstname": "Alice",
        "lastname": "Smith",
        "idnumber": format!("ID-{username}"),
        "contact": "+1 555 0100",
        "birthdate": "1990-04-12",
        "gender": "female",
        "email": format!("{username}@example.com"),
        "civilstatus": "single",
        "address": "1 Main St",
    })
}

pub fn profile_form(username: &str) -> ProfileForm {
    serde_json::from_value(profile_json(username)).unwrap()
}
