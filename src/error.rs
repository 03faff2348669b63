//! # Error Handling
//!
//! Ceremony-level error taxonomy and its mapping to HTTP responses.
//!
//! Component errors (`ChallengeError`, `StoreError`, `VerifyError`) live
//! next to their components; the ceremonies translate them into the
//! categories below, which is what callers see.
//!
//! ## Caller-visible categories
//! - `InputInvalid`, `ChallengeInvalid`, `AttestationInvalid` → 400
//! - `AssertionInvalid`, `PossibleCloneDetected` → 401 (identical body)
//! - `NotRegistered` → 404
//! - `AlreadyRegistered`, `CredentialAlreadyEnrolled`, `ProfileConflict` → 409
//! - `StoreUnavailable` → 503 (the only retryable category)
//! - `WebAuthn`, `Internal` → 500

use crate::credentials::StoreError;
use crate::ledger::ChallengeError;
use crate::user::UserIdentity;
use crate::webauthn::verifier::VerifyError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use webauthn_rs::prelude::WebauthnError;

#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed identity or response shape
    #[error("Invalid input: {0}")]
    InputInvalid(String),

    /// No pending challenge, expired, or mismatched
    #[error("Challenge invalid: {0}")]
    ChallengeInvalid(#[source] ChallengeError),

    #[error("Attestation invalid: {0}")]
    AttestationInvalid(#[source] VerifyError),

    #[error("Assertion invalid: {0}")]
    AssertionInvalid(#[source] VerifyError),

    #[error("User '{0}' is already registered")]
    AlreadyRegistered(UserIdentity),

    #[error("User '{0}' is not registered")]
    NotRegistered(UserIdentity),

    /// The credential id is already enrolled (for this or another user)
    #[error("Credential already enrolled")]
    CredentialAlreadyEnrolled,

    /// `email` or `idnumber` belongs to another user
    #[error("A user with this {0} already exists")]
    ProfileConflict(&'static str),

    /// Valid signature, but the signature counter did not advance.
    ///
    /// Reported to HTTP callers exactly like `AssertionInvalid`.
    #[error("Possible cloned authenticator: stored counter {stored}, presented {presented}")]
    PossibleCloneDetected { stored: u32, presented: u32 },

    /// Transient persistence failure; nothing was committed
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[source] sqlx::Error),

    /// The library refused to build ceremony options
    #[error("WebAuthn error: {0}")]
    WebAuthn(#[from] WebauthnError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<ChallengeError> for AppError {
    fn from(err: ChallengeError) -> Self {
        match err {
            ChallengeError::Unavailable(source) => AppError::StoreUnavailable(source),
            // only reachable if the library hands out a short challenge
            ChallengeError::TooShort(len) => AppError::Internal(format!("library challenge of {len} bytes")),
            other => AppError::ChallengeInvalid(other),
        }
    }
}

/// Default mapping of store failures.
///
/// `StoreError::NotFound` needs the user identity to be reported as
/// `NotRegistered`, so ceremonies that can hit it match on it before
/// falling back to this conversion.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => AppError::CredentialAlreadyEnrolled,
            StoreError::DuplicateProfile(field) => AppError::ProfileConflict(field),
            StoreError::CounterRegression { stored, presented } => {
                AppError::PossibleCloneDetected { stored, presented }
            }
            StoreError::NotFound => AppError::Internal("credential vanished during ceremony".to_string()),
            StoreError::Unavailable(source) => AppError::StoreUnavailable(source),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InputInvalid(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::InputInvalid(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::ChallengeInvalid(e) => {
                tracing::warn!("Challenge rejected: {}", e);
                (StatusCode::BAD_REQUEST, "Challenge invalid or expired".to_string())
            }
            AppError::AttestationInvalid(e) => {
                tracing::warn!("Attestation rejected: {}", e);
                (StatusCode::BAD_REQUEST, "Registration verification failed".to_string())
            }
            AppError::AssertionInvalid(e) => {
                tracing::warn!("Assertion rejected: {}", e);
                (StatusCode::UNAUTHORIZED, "Authentication failed".to_string())
            }
            AppError::PossibleCloneDetected { stored, presented } => {
                tracing::warn!(
                    security = "possible_clone",
                    stored,
                    presented,
                    "Signature counter regression"
                );
                (StatusCode::UNAUTHORIZED, "Authentication failed".to_string())
            }
            AppError::AlreadyRegistered(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::CredentialAlreadyEnrolled => (StatusCode::CONFLICT, self.to_string()),
            AppError::ProfileConflict(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::NotRegistered(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::StoreUnavailable(e) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::SERVICE_UNAVAILABLE, "Store unavailable".to_string())
            }
            AppError::WebAuthn(e) => {
                tracing::error!("WebAuthn error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
