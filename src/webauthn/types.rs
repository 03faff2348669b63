//! # WebAuthn API Types
//!
//! Request payloads and the summaries returned after a ceremony.
//!
//! ## Boundary validation
//! Credentials arrive in the browser's JSON encoding of
//! `PublicKeyCredential` and deserialize straight into the webauthn-rs-proto
//! types. Before a ceremony consumes anything it checks the parts it reads
//! itself: the credential type, `id` against `rawId`, and the challenge in
//! `clientDataJSON`. Anything malformed is rejected as `InputInvalid`.

use crate::error::{AppError, AppResult};
use crate::user::ProfileForm;
use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use webauthn_rs_proto::{PublicKeyCredential, RegisterPublicKeyCredential};

/// Upper bound on credential id length (WebAuthn allows up to 1023 bytes)
pub const MAX_CREDENTIAL_ID_LEN: usize = 1023;

pub const PUBLIC_KEY_TYPE: &str = "public-key";

pub fn encode_b64url(bytes: &[u8]) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, tolerating trailing `=` padding
pub fn decode_b64url(field: &str, value: &str) -> AppResult<Vec<u8>> {
    BASE64_URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|_| AppError::InputInvalid(format!("{field} is not valid base64url")))
}

/// Request to start passkey registration: the full profile form
///
/// ## Example JSON
/// ```json
/// {
///   "username": "alice",
///   "firstname": "Alice",
///   "lastname": "Smith",
///   "idnumber": "ID-0001",
///   "contact": "+1 555 0100",
///   "birthdate": "1990-04-12",
///   "gender": "female",
///   "email": "alice@example.com",
///   "civilstatus": "single",
///   "address": "1 Main St"
/// }
/// ```
pub type RegistrationStartRequest = ProfileForm;

/// Request to complete passkey registration
///
/// `credential` is the output of `navigator.credentials.create()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationFinishRequest {
    pub username: String,
    pub credential: RegisterPublicKeyCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationStartRequest {
    pub username: String,
}

/// Request to complete passkey authentication
///
/// `credential` is the output of `navigator.credentials.get()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticationFinishRequest {
    pub username: String,
    pub credential: PublicKeyCredential,
}

#[derive(Deserialize)]
struct ClientDataChallenge {
    challenge: String,
}

/// Challenge the client signed over, read from `clientDataJSON`
///
/// Only the challenge is extracted here, to find the ledger entry. The
/// verifier checks the full client data later.
pub fn presented_challenge(client_data_json: &[u8]) -> AppResult<Vec<u8>> {
    let client_data: ClientDataChallenge = serde_json::from_slice(client_data_json)
        .map_err(|e| AppError::InputInvalid(format!("clientDataJSON: {e}")))?;
    decode_b64url("clientDataJSON.challenge", &client_data.challenge)
}

/// Validate the credential's identifiers and return the raw id
pub fn credential_id(id: &str, raw_id: &[u8], type_: &str) -> AppResult<Vec<u8>> {
    if type_ != PUBLIC_KEY_TYPE {
        return Err(AppError::InputInvalid(format!(
            "credential type must be '{PUBLIC_KEY_TYPE}'"
        )));
    }
    if raw_id.is_empty() || raw_id.len() > MAX_CREDENTIAL_ID_LEN {
        return Err(AppError::InputInvalid("credential id has an invalid length".to_string()));
    }
    if decode_b64url("id", id)? != raw_id {
        return Err(AppError::InputInvalid("id and rawId differ".to_string()));
    }
    Ok(raw_id.to_vec())
}

/// Enrollment result; carries no key material
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CredentialSummary {
    pub credential_id: String,
    pub username: String,
    pub display_name: String,
    pub counter: u32,
    pub created_at: DateTime<Utc>,
}
