//! # Middleware Module
//!
//! Global rate limiting for the nounwire HTTP API.
//!
//! The limit comes from `ServerConfig::rate_limit` (requests per second,
//! `NOUNWIRE_RATE_LIMIT`); `0` disables the limiter.

use super::types::ErrorResponse;
use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
};
use std::num::NonZeroU32;
use std::sync::Arc;

// =============================================================================
// RATE LIMITER
// =============================================================================

/// Global rate limiter type alias.
pub type GlobalRateLimiter = Arc<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>;

/// Create a limiter allowing `requests_per_second`, at least one.
pub fn create_rate_limiter(requests_per_second: u32) -> GlobalRateLimiter {
    let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    Arc::new(RateLimiter::direct(Quota::per_second(rps)))
}

/// Rejects with 429 once the global limiter is exhausted.
pub async fn rate_limit_middleware(
    State(limiter): State<GlobalRateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match limiter.check() {
        Ok(()) => next.run(request).await,
        Err(_) => {
            tracing::warn!("Rate limit exceeded");
            let body = ErrorResponse {
                error: "rate_limited".to_string(),
                detail: "Too Many Requests".to_string(),
                retryable: true,
            };
            (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response()
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
