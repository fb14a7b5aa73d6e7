//! # Authentication
//!
//! Every endpoint except `/health` takes a JSON envelope
//! `{"authkey": "...", "request": {...}}`. The [`Authenticated`] extractor
//! checks the key in constant time, then decodes `request` into the
//! handler's payload type.
//!
//! A server without a configured key rejects every authenticated request.

use super::AppState;
use super::error::ApiError;
use super::types::AuthEnvelope;
use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use nounwire_core::NounwireError;
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;

/// A request payload whose envelope carried the right key.
#[derive(Debug)]
pub struct Authenticated<T>(pub T);

impl<T> FromRequest<AppState> for Authenticated<T>
where
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| NounwireError::Serialization(e.body_text()))?;
        let envelope: AuthEnvelope = serde_json::from_slice(&body)
            .map_err(|e| NounwireError::Serialization(format!("malformed request body: {}", e)))?;

        let Some(expected) = state.auth_key.as_deref() else {
            tracing::warn!(
                event = "auth_failure",
                reason = "no_key_configured",
                "Authentication failed: server has no auth key"
            );
            return Err(NounwireError::AuthenticationFailed.into());
        };
        let Some(provided) = envelope.authkey.as_deref() else {
            tracing::warn!(
                event = "auth_failure",
                reason = "missing_authkey",
                "Authentication failed: request carries no authkey"
            );
            return Err(NounwireError::AuthenticationFailed.into());
        };
        if !keys_match(provided, expected) {
            tracing::warn!(
                event = "auth_failure",
                reason = "invalid_authkey",
                "Authentication failed: invalid authkey"
            );
            return Err(NounwireError::AuthenticationFailed.into());
        }

        let payload = serde_json::from_value(envelope.request)
            .map_err(|e| NounwireError::Serialization(format!("malformed request: {}", e)))?;
        Ok(Self(payload))
    }
}

/// Constant-time key comparison.
///
/// Both keys are padded to the same length so `ct_eq` always runs over the
/// same number of bytes.
pub fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();

    let max_len = provided.len().max(expected.len());
    let mut padded_provided = vec![0u8; max_len];
    let mut padded_expected = vec![0u8; max_len];
    padded_provided[..provided.len()].copy_from_slice(provided);
    padded_expected[..expected.len()].copy_from_slice(expected);

    let bytes_match: bool = padded_provided.ct_eq(&padded_expected).into();
    bytes_match && provided.len() == expected.len()
}

// =============================================================================
// TESTS
// =============================================================================
