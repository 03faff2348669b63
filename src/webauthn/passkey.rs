//! # Passkey Verifier
//!
//! Production verifier over webauthn-rs. The library checks the client
//! data (type, challenge, origin), the RP ID hash, the UP and UV flags and
//! the signature for every algorithm it advertises (ES256 and RS256).
//!
//! A verified credential is stored as the serialized [`Passkey`]. The blob
//! is written once at enrollment; the counter column of the credential
//! record is what later assertions are compared against.

use crate::webauthn::verifier::{
    AssertionVerifier, AttestationVerifier, VerifiedAssertion, VerifiedAttestation, VerifyError,
};
use serde_json::Value;
use std::sync::Arc;
use webauthn_rs::prelude::*;

#[derive(Clone)]
pub struct PasskeyVerifier {
    webauthn: Arc<Webauthn>,
}

impl PasskeyVerifier {
    pub fn new(webauthn: Arc<Webauthn>) -> Self {
        Self { webauthn }
    }
}

impl std::fmt::Debug for PasskeyVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasskeyVerifier")
            .field("webauthn", &"<Webauthn instance>")
            .finish()
    }
}

/// Signature counter recorded inside a serialized passkey
fn stored_counter(passkey: &Value) -> u32 {
    passkey
        .pointer("/cred/counter")
        .and_then(Value::as_u64)
        .and_then(|counter| u32::try_from(counter).ok())
        .unwrap_or(0)
}

impl AttestationVerifier for PasskeyVerifier {
    fn verify_attestation(
        &self,
        credential: &RegisterPublicKeyCredential,
        session: &PasskeyRegistration,
    ) -> Result<VerifiedAttestation, VerifyError> {
        let passkey = self.webauthn.finish_passkey_registration(credential, session)?;

        let serialized = serde_json::to_value(&passkey)
            .map_err(|e| VerifyError::Malformed(format!("cannot encode passkey: {e}")))?;
        let public_key = serde_json::to_vec(&serialized)
            .map_err(|e| VerifyError::Malformed(format!("cannot encode passkey: {e}")))?;

        Ok(VerifiedAttestation {
            credential_id: passkey.cred_id().to_vec(),
            initial_counter: stored_counter(&serialized),
            public_key,
        })
    }
}

impl AssertionVerifier for PasskeyVerifier {
    fn verify_assertion(
        &self,
        credential: &PublicKeyCredential,
        session: &PasskeyAuthentication,
    ) -> Result<VerifiedAssertion, VerifyError> {
        let result = self.webauthn.finish_passkey_authentication(credential, session)?;

        Ok(VerifiedAssertion {
            credential_id: result.cred_id().to_vec(),
            new_counter: result.counter(),
        })
    }
}
