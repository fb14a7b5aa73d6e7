//! # HTTP Handlers
//!
//! `schema` describes the exposed nouns; `query` validates a request, runs
//! it against the provider and marshals the completed result set.

use super::AppState;
use super::auth::Authenticated;
use super::error::ApiError;
use super::types::{HealthResponse, SchemaResponse};
use axum::Json;
use axum::extract::State;
use axum::http::{Method, Uri};
use nounwire_core::{
    MarshalledSet, Marshaller, NounQuery, NounwireError, QueryListener, QueryRequest, ResultSet,
};
use serde_json::Value;
use tokio::sync::oneshot;

// =============================================================================
// HEALTH
// =============================================================================

/// `GET /health`, unauthenticated.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

// =============================================================================
// SCHEMA
// =============================================================================

/// `POST /schema`. The request payload is ignored.
pub async fn schema_handler(
    State(state): State<AppState>,
    Authenticated(_): Authenticated<Value>,
) -> Json<SchemaResponse> {
    Json(state.registry.query_schemas())
}

// =============================================================================
// QUERY
// =============================================================================

/// Forwards the completion event into a oneshot channel.
struct CompletionListener {
    sender: oneshot::Sender<Result<ResultSet, NounwireError>>,
}

impl QueryListener for CompletionListener {
    fn on_query_completed(self: Box<Self>, result: Result<ResultSet, NounwireError>) {
        // The handler may have timed out and dropped the receiver.
        if self.sender.send(result).is_err() {
            tracing::debug!("query completed after its request was abandoned");
        }
    }
}

/// `POST /query`.
pub async fn query_handler(
    State(state): State<AppState>,
    Authenticated(request): Authenticated<QueryRequest>,
) -> Result<Json<MarshalledSet>, ApiError> {
    let query = NounQuery::from_request(&state.registry, &request)?;
    let noun = query.noun.clone();

    let (sender, receiver) = oneshot::channel();
    let handle = state
        .provider
        .run_query(query, Box::new(CompletionListener { sender }))?;

    let result = match tokio::time::timeout(state.query_timeout, receiver).await {
        Ok(Ok(result)) => result?,
        Ok(Err(_)) => {
            return Err(NounwireError::ProviderFailed(format!(
                "query {} dropped its listener without completing",
                handle.0
            ))
            .into());
        }
        Err(_) => {
            state.provider.cancel(handle);
            let timeout_ms = state.query_timeout.as_millis() as u64;
            tracing::warn!(handle = handle.0, noun = %noun, timeout_ms, "query timed out");
            return Err(NounwireError::QueryTimeout(timeout_ms).into());
        }
    };

    let set = Marshaller::new(&state.registry).marshal_result(&result)?;
    tracing::debug!(
        noun = %noun,
        items = set.item_ids.len(),
        entries = set.entry_count(),
        "query marshalled"
    );
    Ok(Json(set))
}

// =============================================================================
// FALLBACKS
// =============================================================================

/// Any method other than POST on `schema` or `query`.
pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    NounwireError::MethodNotAllowed(format!("{} {}", method, uri.path())).into()
}

/// Any path without a route.
pub async fn unknown_endpoint(uri: Uri) -> ApiError {
    NounwireError::UnknownEndpoint(uri.path().to_string()).into()
}
