//! # nounwire HTTP API Module
//!
//! This module implements the HTTP server using axum.
//!
//! ## Endpoints
//!
//! - `POST /schema` - Query capabilities of every exposed noun
//! - `POST /query` - Run a query and return a marshalled set
//! - `GET /health` - Health check (unauthenticated)
//!
//! `schema` and `query` take `{"authkey": ..., "request": ...}` bodies. Other
//! methods on them answer 405, unknown paths 404.
//!
//! ## Security Configuration
//!
//! - `cors_origins`: comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `rate_limit`: requests per second (default: 100, 0 to disable)
//! - `auth_key` / `auth_key_file`: the key every envelope must carry

mod auth;
mod error;
mod handlers;
mod middleware;
mod types;

pub use auth::{Authenticated, keys_match};
pub use error::ApiError;
pub use handlers::{health_handler, query_handler, schema_handler};
pub use middleware::{GlobalRateLimiter, create_rate_limiter};
pub use types::{AuthEnvelope, ErrorResponse, HealthResponse, SchemaResponse};

use crate::config::ServerConfig;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use nounwire_core::primitives::EXPOSED_NOUNS;
use nounwire_core::{HelperTable, NounProvider, NounRegistry, NounwireError};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state. Everything in it is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<NounRegistry>,
    pub provider: Arc<dyn NounProvider>,
    /// `None` rejects every authenticated request.
    pub auth_key: Option<Arc<str>>,
    pub query_timeout: Duration,
    pub rate_limit: u32,
    pub cors_origins: Option<String>,
}

impl AppState {
    /// Build the registry over the provider's catalog and resolve the key.
    pub fn new(provider: Arc<dyn NounProvider>, config: &ServerConfig) -> Result<Self, NounwireError> {
        let registry = NounRegistry::new(
            provider.catalog().clone(),
            HelperTable::standard(),
            EXPOSED_NOUNS,
        )?;
        Ok(Self {
            registry: Arc::new(registry),
            provider,
            auth_key: config.resolve_auth_key()?.map(Arc::from),
            query_timeout: config.query_timeout(),
            rate_limit: config.rate_limit,
            cors_origins: config.cors_origins.clone(),
        })
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from the configured origins.
///
/// - `*`: allows all origins
/// - unset: localhost only
/// - otherwise: the comma-separated list
fn build_cors_layer(origins: Option<&str>) -> CorsLayer {
    match origins {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins (cors_origins=*). This is insecure for production!");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!("CORS: No valid origins configured, defaulting to localhost only");
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => build_localhost_cors(),
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:8778",
        "http://127.0.0.1:8778",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ]
    .into_iter()
    .filter_map(|origin| origin.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit
/// 4. Rate Limiting (if enabled)
///
/// Authentication happens in the `Authenticated` extractor.
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(state.cors_origins.as_deref());

    if state.auth_key.is_none() {
        tracing::warn!(
            "No auth key configured - every schema and query request will be rejected. \
             Set NOUNWIRE_AUTH_KEY or create ~/.nounwire-authkey."
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route(
            "/schema",
            post(handlers::schema_handler).fallback(handlers::method_not_allowed),
        )
        .route(
            "/query",
            post(handlers::query_handler).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::unknown_endpoint);

    if state.rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", state.rate_limit);
        router = router.layer(axum_middleware::from_fn_with_state(
            create_rate_limiter(state.rate_limit),
            middleware::rate_limit_middleware,
        ));
    } else {
        tracing::info!("Rate limiting disabled");
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve `provider` on the configured address until the process ends.
pub async fn run_server(
    config: &ServerConfig,
    provider: Arc<dyn NounProvider>,
) -> Result<(), NounwireError> {
    let state = AppState::new(provider, config)?;
    let router = create_router(state);
    let addr = config.addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NounwireError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("nounwire HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| NounwireError::Io(format!("Server error: {}", e)))
}

// =============================================================================
// TESTS
// =============================================================================
