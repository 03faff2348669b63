//! State builders, profile fixtures and a slow verifier shared by the unit
//! tests. Ceremonies run against the real passkey verifier, driven by the
//! software authenticator also used by the integration tests.

use crate::clock::ManualClock;
use crate::error::AppResult;
use crate::ledger::DEFAULT_CHALLENGE_TTL;
use crate::state::{AppState, RelyingParty};
use crate::user::{AuthenticatedUser, ProfileForm, UserProfile};
use crate::webauthn::authentication::{finish_authentication, start_authentication};
use crate::webauthn::registration::{finish_registration, start_registration};
use crate::webauthn::types::{
    AuthenticationFinishRequest, AuthenticationStartRequest, CredentialSummary, RegistrationFinishRequest,
};
use crate::webauthn::verifier::{
    AssertionVerifier, AttestationVerifier, VerifiedAssertion, VerifiedAttestation, VerifyError,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use webauthn_rs::prelude::{
    PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential,
};

#[path = "../tests/common/authenticator.rs"]
mod authenticator;

pub use authenticator::{SoftAuthenticator, COSE_ALG_ES256, COSE_ALG_RS256, FLAG_UP, ORIGIN};

pub fn relying_party() -> RelyingParty {
    RelyingParty {
        id: "localhost".to_string(),
        origin: ORIGIN.to_string(),
        name: "Passkey Demo".to_string(),
        allow_reregistration: false,
        verifier_timeout: Duration::from_secs(5),
    }
}

pub fn state(clock: Arc<ManualClock>) -> AppState {
    state_with(relying_party(), clock)
}

pub fn state_with(relying_party: RelyingParty, clock: Arc<ManualClock>) -> AppState {
    AppState::in_memory(relying_party, clock, DEFAULT_CHALLENGE_TTL).unwrap()
}

/// Complete registration form; `email` and `idnumber` derive from the username
pub fn profile_form(username: &str) -> ProfileForm {
    let mut firstname: Vec<char> = username.chars().collect();
    if let Some(first) = firstname.first_mut() {
        *first = first.to_ascii_uppercase();
    }

    ProfileForm {
        username: username.to_string(),
        firstname: firstname.into_iter().collect(),
        lastname: "Example".to_string(),
        idnumber: format!("ID-{username}"),
        contact: "+1 555 0100".to_string(),
        birthdate: "1990-04-12".to_string(),
        gender: "female".to_string(),
        email: format!("{username}@example.com"),
        civilstatus: "single".to_string(),
        address: "1 Main St".to_string(),
    }
}

pub fn profile(username: &str) -> UserProfile {
    UserProfile::parse(&profile_form(username), Uuid::new_v4()).unwrap()
}

/// Run a full registration ceremony for `username`
pub async fn enroll(state: &AppState, authenticator: &mut SoftAuthenticator, username: &str) -> CredentialSummary {
    let options = start_registration(state, &profile_form(username)).await.unwrap();
    let request = RegistrationFinishRequest {
        username: username.to_string(),
        credential: authenticator.attest(&options),
    };
    finish_registration(state, &request).await.unwrap()
}

/// Run a full authentication ceremony reporting `sign_count`
pub async fn login(
    state: &AppState,
    authenticator: &SoftAuthenticator,
    username: &str,
    sign_count: u32,
) -> AppResult<AuthenticatedUser> {
    let options = start_authentication(
        state,
        &AuthenticationStartRequest {
            username: username.to_string(),
        },
    )
    .await?;
    let request = AuthenticationFinishRequest {
        username: username.to_string(),
        credential: authenticator.assert(&options, sign_count),
    };
    finish_authentication(state, &request).await
}

/// Blocks well past any timeout the tests configure
#[derive(Debug, Clone, Copy)]
pub struct SlowVerifier;

const SLOW: Duration = Duration::from_millis(500);

impl AttestationVerifier for SlowVerifier {
    fn verify_attestation(
        &self,
        _credential: &RegisterPublicKeyCredential,
        _session: &PasskeyRegistration,
    ) -> Result<VerifiedAttestation, VerifyError> {
        std::thread::sleep(SLOW);
        Err(VerifyError::Rejected("too late".into()))
    }
}

impl AssertionVerifier for SlowVerifier {
    fn verify_assertion(
        &self,
        _credential: &PublicKeyCredential,
        _session: &PasskeyAuthentication,
    ) -> Result<VerifiedAssertion, VerifyError> {
        std::thread::sleep(SLOW);
        Err(VerifyError::Rejected("too late".into()))
    }
}
