//! # Verifier Contracts
//!
//! The ceremonies never inspect signatures or CBOR themselves. They hand
//! the client's credential and the library's ceremony session to an
//! [`AttestationVerifier`] or [`AssertionVerifier`] and act on the typed
//! outcome. The production implementation is
//! [`PasskeyVerifier`](super::passkey::PasskeyVerifier), backed by
//! webauthn-rs; tests substitute a slow fake to exercise the time bound.
//!
//! Verification is CPU-bound and synchronous. [`bounded`] moves it onto the
//! blocking pool and caps how long a ceremony waits for it.
//!
//! Verifiers judge everything except the stored signature counter, which
//! is reconciled against the credential store by the authentication
//! ceremony.

use std::time::Duration;
use thiserror::Error;
use webauthn_rs::prelude::{
    PasskeyAuthentication, PasskeyRegistration, PublicKeyCredential, RegisterPublicKeyCredential,
    WebauthnError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAttestation {
    pub credential_id: Vec<u8>,
    /// Serialized passkey: the credential public key and its algorithm
    pub public_key: Vec<u8>,
    pub initial_counter: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedAssertion {
    /// Credential the signature was checked against
    pub credential_id: Vec<u8>,
    pub new_counter: u32,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("client data type does not match the ceremony")]
    ClientDataType,

    #[error("client data challenge does not match the issued challenge")]
    ChallengeMismatch,

    #[error("origin is not allowed")]
    OriginMismatch,

    #[error("RP ID hash does not match")]
    RpIdMismatch,

    #[error("user presence flag not set")]
    UserNotPresent,

    #[error("user verification required but flag not set")]
    UserNotVerified,

    #[error("credential id does not match the response")]
    CredentialIdMismatch,

    #[error("credential is not registered to this user")]
    UnknownCredential,

    #[error("user handle does not match the account")]
    UserHandleMismatch,

    #[error("signature verification failed")]
    BadSignature,

    #[error("malformed response: {0}")]
    Malformed(String),

    /// Any other refusal by the WebAuthn library
    #[error("rejected: {0}")]
    Rejected(String),

    #[error("verifier did not answer within {0:?}")]
    TimedOut(Duration),

    /// The verification task panicked or was cancelled
    #[error("verifier aborted: {0}")]
    Aborted(String),
}

impl From<WebauthnError> for VerifyError {
    fn from(err: WebauthnError) -> Self {
        match err {
            WebauthnError::InvalidClientDataType => VerifyError::ClientDataType,
            WebauthnError::MismatchedChallenge => VerifyError::ChallengeMismatch,
            WebauthnError::InvalidRPOrigin => VerifyError::OriginMismatch,
            WebauthnError::InvalidRPIDHash => VerifyError::RpIdMismatch,
            WebauthnError::UserNotPresent => VerifyError::UserNotPresent,
            WebauthnError::UserNotVerified => VerifyError::UserNotVerified,
            WebauthnError::AuthenticationFailure => VerifyError::BadSignature,
            other => VerifyError::Rejected(other.to_string()),
        }
    }
}

pub trait AttestationVerifier: Send + Sync {
    fn verify_attestation(
        &self,
        credential: &RegisterPublicKeyCredential,
        session: &PasskeyRegistration,
    ) -> Result<VerifiedAttestation, VerifyError>;
}

pub trait AssertionVerifier: Send + Sync {
    fn verify_assertion(
        &self,
        credential: &PublicKeyCredential,
        session: &PasskeyAuthentication,
    ) -> Result<VerifiedAssertion, VerifyError>;
}

/// Run a verification on the blocking pool with an upper bound on the wait
///
/// A verifier that does not finish in time is treated as a failed
/// verification, never as success. The blocking task itself cannot be
/// interrupted; its late result is dropped.
pub async fn bounded<T, F>(limit: Duration, verification: F) -> Result<T, VerifyError>
where
    F: FnOnce() -> Result<T, VerifyError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(verification)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(VerifyError::Aborted(join_error.to_string())),
        Err(_) => Err(VerifyError::TimedOut(limit)),
    }
}
