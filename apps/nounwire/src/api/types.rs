//! # API Types
//!
//! Request envelope and response bodies for the nounwire HTTP API.

use nounwire_core::QueryCapabilities;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// REQUEST TYPES
// =============================================================================

/// Body of every authenticated request.
///
/// `request` is kept raw until the key has been checked.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthEnvelope {
    #[serde(default)]
    pub authkey: Option<String>,
    #[serde(default)]
    pub request: Value,
}

impl AuthEnvelope {
    pub fn new(authkey: impl Into<String>, request: Value) -> Self {
        Self {
            authkey: Some(authkey.into()),
            request,
        }
    }
}

// =============================================================================
// RESPONSE TYPES
// =============================================================================

/// Response of `POST /schema`: capabilities per exposed noun.
pub type SchemaResponse = BTreeMap<String, QueryCapabilities>;

/// Health check response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `unknown_noun_name`.
    pub error: String,
    pub detail: String,
    pub retryable: bool,
}
