use crate::error::AppResult;
use crate::state::AppState;
use crate::webauthn::types::*;
use crate::webauthn::{authentication, registration};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde_json::{json, Value};
use webauthn_rs::prelude::{CreationChallengeResponse, RequestChallengeResponse};

// Request bodies are taken as `Result` so a malformed body surfaces as
// `InputInvalid` with the usual `{"error": ...}` shape.

// Registration endpoints

pub async fn register_start(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationStartRequest>, JsonRejection>,
) -> AppResult<Json<CreationChallengeResponse>> {
    let Json(req) = payload?;
    let options = registration::start_registration(&state, &req).await?;

    Ok(Json(options))
}

pub async fn register_finish(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationFinishRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let summary = registration::finish_registration(&state, &req).await?;

    Ok(Json(json!({
        "verified": true,
        "credential": summary
    })))
}

// Authentication endpoints

pub async fn authenticate_start(
    State(state): State<AppState>,
    payload: Result<Json<AuthenticationStartRequest>, JsonRejection>,
) -> AppResult<Json<RequestChallengeResponse>> {
    let Json(req) = payload?;
    let options = authentication::start_authentication(&state, &req).await?;

    Ok(Json(options))
}

pub async fn authenticate_finish(
    State(state): State<AppState>,
    payload: Result<Json<AuthenticationFinishRequest>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(req) = payload?;
    let user = authentication::finish_authentication(&state, &req).await?;

    Ok(Json(json!({
        "verified": true,
        "user": user
    })))
}
