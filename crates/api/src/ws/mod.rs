pub mod connection;
pub mod dispatcher;
pub mod handler;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod transcription;

use axum::http::{HeaderMap, header::AUTHORIZATION};
use callroom_services::{AuthError, Identity};

use crate::error::AdmissionError;
use crate::state::AppState;

/// Bearer credential from the `token` query parameter, falling back to an
/// `Authorization: Bearer` header.
pub(crate) fn credential(query_token: Option<String>, headers: &HeaderMap) -> Option<String> {
    query_token.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

pub(crate) fn authenticate(state: &AppState, token: Option<&str>) -> Result<Identity, AdmissionError> {
    let token = token.ok_or(AuthError::MissingToken)?;
    Ok(state.auth.verify_access_token(token)?)
}
