//! # Passkey Registration Ceremony
//!
//! Registration is a two-step process: start and finish.
//!
//! ## Registration Flow
//! 1. **Start**: validate the profile, let webauthn-rs build the creation
//!    options, record their challenge in the ledger
//! 2. **Finish**: consume the challenge, verify the attestation, store the
//!    credential
//!
//! ## Ceremony session
//! The pending [`UserProfile`] and the serialized `PasskeyRegistration`
//! travel in the ledger entry next to the challenge. Nothing about the user
//! is persisted until the credential is, and both are written by one
//! `CredentialStore::put`.
//!
//! ## Failure semantics
//! Every failure is terminal for the attempt. The challenge is consumed
//! before verification, so a retry always needs a fresh start.

use crate::credentials::{CredentialRecord, UserAccount};
use crate::error::{AppError, AppResult};
use crate::ledger::CeremonyKind;
use crate::state::AppState;
use crate::user::{UserIdentity, UserProfile};
use crate::webauthn::types::{
    self, encode_b64url, CredentialSummary, RegistrationFinishRequest, RegistrationStartRequest,
};
use crate::webauthn::verifier::{bounded, VerifyError};
use serde::{Deserialize, Serialize};
use webauthn_rs::prelude::*;

/// Ledger context of a registration challenge
#[derive(Serialize, Deserialize)]
struct RegistrationSession {
    profile: UserProfile,
    registration: PasskeyRegistration,
}

/// Reject enrollment when the identity already holds a credential and the
/// relying party allows only one
fn check_policy(state: &AppState, user: &UserIdentity, account: Option<&UserAccount>) -> AppResult<()> {
    let enrolled = account.is_some_and(|account| !account.credentials.is_empty());
    if enrolled && !state.relying_party.allow_reregistration {
        return Err(AppError::AlreadyRegistered(user.clone()));
    }
    Ok(())
}

/// Start the passkey registration process
///
/// ## Flow
/// 1. Validate the profile form
/// 2. Refuse identities that are already enrolled (unless re-registration is
///    allowed) and emails or ID numbers held by someone else
/// 3. Generate the creation options with webauthn-rs (ES256 and RS256
///    advertised, user verification required)
/// 4. Record their challenge with the profile and library state as context
///
/// ## Errors
/// - `InputInvalid`: malformed profile
/// - `AlreadyRegistered`: identity already holds a credential
/// - `ProfileConflict`: email or ID number already taken
/// - `StoreUnavailable`: ledger or store backend failed
pub async fn start_registration(
    state: &AppState,
    form: &RegistrationStartRequest,
) -> AppResult<CreationChallengeResponse> {
    let mut profile = UserProfile::parse(form, Uuid::new_v4())?;
    let user = profile.identity.clone();

    let account = state.credentials.get(&user).await?;
    check_policy(state, &user, account.as_ref())?;
    // a known user keeps the handle their passkeys were created under
    if let Some(account) = &account {
        profile.user_handle = account.profile.user_handle;
    }
    state.credentials.check_profile_available(&profile).await?;

    let exclude_credentials: Option<Vec<CredentialID>> = account
        .as_ref()
        .map(|account| {
            account
                .credentials
                .iter()
                .map(|record| record.credential_id.clone().into())
                .collect::<Vec<_>>()
        })
        .filter(|ids| !ids.is_empty());

    let (options, registration) = state.webauthn.start_passkey_registration(
        profile.user_handle,
        user.as_str(),
        &profile.display_name(),
        exclude_credentials,
    )?;

    let challenge = options.public_key.challenge.to_vec();
    let context = serde_json::to_vec(&RegistrationSession { profile, registration })
        .map_err(|e| AppError::Internal(format!("cannot encode ceremony context: {e}")))?;
    state
        .ledger
        .record(&user, CeremonyKind::Registration, challenge, context)
        .await?;

    tracing::debug!(user = %user, "registration challenge issued");
    Ok(options)
}

/// Finish the passkey registration process
///
/// ## Flow
/// 1. Validate the request shape (`InputInvalid` before anything is consumed)
/// 2. Consume the registration challenge the response was signed over
/// 3. Verify the attestation on the blocking pool, bounded by the configured
///    timeout
/// 4. Re-check the enrollment policy and store profile + credential together
///
/// ## Errors
/// - `ChallengeInvalid`: no pending challenge, expired, or mismatched
/// - `AttestationInvalid`: verification failed or timed out
/// - `AlreadyRegistered`: another enrollment won the race
/// - `CredentialAlreadyEnrolled`: the credential id is already stored
/// - `ProfileConflict`: another user took the email or ID number meanwhile
///
/// ## Security Note
/// Only the public key is stored. The summary returned to the caller
/// carries no key material.
pub async fn finish_registration(
    state: &AppState,
    request: &RegistrationFinishRequest,
) -> AppResult<CredentialSummary> {
    let user = UserIdentity::parse(&request.username)?;
    let credential = &request.credential;
    let credential_id = types::credential_id(&credential.id, &credential.raw_id, &credential.type_)?;
    let challenge = types::presented_challenge(&credential.response.client_data_json)?;

    let context = state
        .ledger
        .consume(&user, CeremonyKind::Registration, &challenge)
        .await
        .inspect_err(|e| tracing::warn!(user = %user, "registration challenge rejected: {e}"))?;
    let RegistrationSession { profile, registration } = serde_json::from_slice(&context)
        .map_err(|e| AppError::Internal(format!("cannot decode ceremony context: {e}")))?;
    if profile.identity != user {
        return Err(AppError::Internal("ceremony context belongs to another user".to_string()));
    }

    let verifier = state.attestation.clone();
    let response = credential.clone();
    let verified = bounded(state.relying_party.verifier_timeout, move || {
        verifier.verify_attestation(&response, &registration)
    })
    .await
    .and_then(|verified| {
        if verified.credential_id == credential_id {
            Ok(verified)
        } else {
            Err(VerifyError::CredentialIdMismatch)
        }
    })
    .map_err(|e| {
        tracing::warn!(user = %user, "attestation rejected: {e}");
        AppError::AttestationInvalid(e)
    })?;

    let account = state.credentials.get(&user).await?;
    check_policy(state, &user, account.as_ref())?;

    let record = CredentialRecord::new(
        verified.credential_id,
        verified.public_key,
        verified.initial_counter,
        state.clock.now(),
    );
    let summary = CredentialSummary {
        credential_id: encode_b64url(&record.credential_id),
        username: user.to_string(),
        // an existing profile is never overwritten
        display_name: account
            .map(|account| account.profile.display_name())
            .unwrap_or_else(|| profile.display_name()),
        counter: record.counter,
        created_at: record.created_at,
    };

    state.credentials.put(&profile, record).await?;

    tracing::info!(user = %user, credential = %summary.credential_id, "passkey enrolled");
    Ok(summary)
}
