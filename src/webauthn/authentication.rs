//! Passkey authentication ceremony.
//!
//! Mirrors registration: `start_authentication` has webauthn-rs build the
//! request options over the user's passkeys and records their challenge,
//! `finish_authentication` consumes the challenge, verifies the assertion
//! and advances the signature counter.

use crate::credentials::{StoreError, UserAccount};
use crate::error::{AppError, AppResult};
use crate::ledger::CeremonyKind;
use crate::state::AppState;
use crate::user::{AuthenticatedUser, UserIdentity};
use crate::webauthn::types::{self, AuthenticationFinishRequest, AuthenticationStartRequest};
use crate::webauthn::verifier::{bounded, VerifyError};
use webauthn_rs::prelude::*;

async fn enrolled_account(state: &AppState, user: &UserIdentity) -> AppResult<UserAccount> {
    match state.credentials.get(user).await? {
        Some(account) if !account.credentials.is_empty() => Ok(account),
        _ => Err(AppError::NotRegistered(user.clone())),
    }
}

fn rejected(user: &UserIdentity, err: VerifyError) -> AppError {
    tracing::warn!(user = %user, "assertion rejected: {err}");
    AppError::AssertionInvalid(err)
}

pub async fn start_authentication(
    state: &AppState,
    request: &AuthenticationStartRequest,
) -> AppResult<RequestChallengeResponse> {
    let user = UserIdentity::parse(&request.username)?;
    let account = enrolled_account(state, &user).await?;

    let passkeys = account
        .credentials
        .iter()
        .map(|record| serde_json::from_slice::<Passkey>(&record.public_key))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Internal(format!("stored passkey is unreadable: {e}")))?;

    let (options, authentication) = state.webauthn.start_passkey_authentication(&passkeys)?;

    let challenge = options.public_key.challenge.to_vec();
    let context = serde_json::to_vec(&authentication)
        .map_err(|e| AppError::Internal(format!("cannot encode ceremony context: {e}")))?;
    state
        .ledger
        .record(&user, CeremonyKind::Authentication, challenge, context)
        .await?;

    tracing::debug!(user = %user, "authentication challenge issued");
    Ok(options)
}

/// Verify an assertion and advance the credential's signature counter
///
/// A counter that does not advance fails the ceremony with
/// `PossibleCloneDetected` even though the signature was valid. Callers over
/// HTTP cannot tell it apart from `AssertionInvalid`.
pub async fn finish_authentication(
    state: &AppState,
    request: &AuthenticationFinishRequest,
) -> AppResult<AuthenticatedUser> {
    let user = UserIdentity::parse(&request.username)?;
    let credential = &request.credential;
    let credential_id = types::credential_id(&credential.id, &credential.raw_id, &credential.type_)?;
    let challenge = types::presented_challenge(&credential.response.client_data_json)?;
    let account = enrolled_account(state, &user).await?;

    let context = state
        .ledger
        .consume(&user, CeremonyKind::Authentication, &challenge)
        .await
        .inspect_err(|e| tracing::warn!(user = %user, "authentication challenge rejected: {e}"))?;
    let authentication: PasskeyAuthentication = serde_json::from_slice(&context)
        .map_err(|e| AppError::Internal(format!("cannot decode ceremony context: {e}")))?;

    let stored = account
        .credential(&credential_id)
        .ok_or_else(|| rejected(&user, VerifyError::UnknownCredential))?;
    if let Some(handle) = &credential.response.user_handle {
        let handle: &[u8] = handle;
        if handle != account.profile.user_handle.as_bytes() {
            return Err(rejected(&user, VerifyError::UserHandleMismatch));
        }
    }

    let verifier = state.assertion.clone();
    let response = credential.clone();
    let verified = bounded(state.relying_party.verifier_timeout, move || {
        verifier.verify_assertion(&response, &authentication)
    })
    .await
    .and_then(|verified| {
        if verified.credential_id == stored.credential_id {
            Ok(verified)
        } else {
            Err(VerifyError::CredentialIdMismatch)
        }
    })
    .map_err(|e| rejected(&user, e))?;

    match state
        .credentials
        .update_counter(&stored.credential_id, verified.new_counter, state.clock.now())
        .await
    {
        Ok(()) => {}
        Err(StoreError::CounterRegression { stored, presented }) => {
            tracing::warn!(
                security = "possible_clone",
                user = %user,
                stored,
                presented,
                "signature counter did not advance; rejecting valid assertion"
            );
            return Err(AppError::PossibleCloneDetected { stored, presented });
        }
        Err(StoreError::NotFound) => return Err(AppError::NotRegistered(user)),
        Err(e) => return Err(e.into()),
    }

    tracing::info!(user = %user, counter = verified.new_counter, "passkey authentication succeeded");
    Ok(AuthenticatedUser::from(account.profile))
}
