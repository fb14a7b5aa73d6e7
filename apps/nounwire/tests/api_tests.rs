//! Integration tests for the nounwire HTTP API.
//!
//! Uses axum-test to drive the router without binding a port.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use axum::http::StatusCode;
use axum_test::TestServer;
use nounwire::api::{AppState, AuthEnvelope, ErrorResponse, HealthResponse, create_router};
use nounwire::config::ServerConfig;
use nounwire::fixture::StoreProvider;
use nounwire_core::{
    AttrValue, MarshalledSet, NounCatalog, NounId, NounInstance, NounProvider, NounQuery,
    NounStore, NounwireError, QueryCapabilities, QueryHandle, QueryListener, mail_catalog,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

const KEY: &str = "test-key";

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn test_config() -> ServerConfig {
    ServerConfig {
        auth_key: Some(KEY.to_string()),
        rate_limit: 0,
        query_timeout_ms: 2_000,
        ..ServerConfig::default()
    }
}

fn server_with(provider: Arc<dyn NounProvider>, config: &ServerConfig) -> TestServer {
    let state = AppState::new(provider, config).unwrap();
    TestServer::new(create_router(state)).unwrap()
}

/// A server over the sample mailbox.
fn create_test_server() -> TestServer {
    server_with(Arc::new(StoreProvider::mail_sample().unwrap()), &test_config())
}

fn envelope(request: Value) -> AuthEnvelope {
    AuthEnvelope::new(KEY, request)
}

/// Accepts queries and never completes them; records cancellations.
struct StalledProvider {
    catalog: NounCatalog,
    parked: Mutex<Vec<Box<dyn QueryListener>>>,
    cancelled: Arc<Mutex<Vec<QueryHandle>>>,
}

impl NounProvider for StalledProvider {
    fn catalog(&self) -> &NounCatalog {
        &self.catalog
    }

    fn run_query(
        &self,
        _query: NounQuery,
        listener: Box<dyn QueryListener>,
    ) -> Result<QueryHandle, NounwireError> {
        let mut parked = self.parked.lock().unwrap();
        parked.push(listener);
        Ok(QueryHandle(parked.len() as u64))
    }

    fn cancel(&self, handle: QueryHandle) {
        self.cancelled.lock().unwrap().push(handle);
    }
}

// =============================================================================
// HEALTH ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let server = create_test_server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let health: HealthResponse = response.json();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
}

// =============================================================================
// SCHEMA ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_schema_lists_exposed_nouns() {
    let server = create_test_server();

    let response = server.post("/schema").json(&envelope(json!({}))).await;

    response.assert_status_ok();
    let schemas: BTreeMap<String, QueryCapabilities> = response.json();
    let nouns: Vec<_> = schemas.keys().map(String::as_str).collect();
    assert_eq!(nouns, vec!["contact", "conversation", "identity", "message"]);

    let date = &schemas["message"]["date"];
    assert_eq!(date.noun_type, "date");
    assert!(date.continuous);
    assert!(schemas["message"]["attachmentTypes"].likable);
    assert_eq!(schemas["message"]["from"].id_attr.as_deref(), Some("id"));
}

#[tokio::test]
async fn test_schema_payload_may_be_absent() {
    let server = create_test_server();

    let response = server.post("/schema").json(&json!({"authkey": KEY})).await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_schema_wire_shape_is_camel_case() {
    let server = create_test_server();

    let body: Value = server.post("/schema").json(&envelope(json!({}))).await.json();

    let tags = &body["message"]["tags"];
    assert_eq!(tags["nounType"], json!("tag"));
    assert_eq!(tags["selfMarshalling"], json!(false));
    assert_eq!(tags["idAttr"], json!("key"));
}

// =============================================================================
// QUERY ENDPOINT TESTS
// =============================================================================

#[tokio::test]
async fn test_query_returns_marshalled_set() {
    let server = create_test_server();

    let response = server
        .post("/query")
        .json(&envelope(json!({
            "noun": "message",
            "constraints": [["read", [false]]]
        })))
        .await;

    response.assert_status_ok();
    let set: MarshalledSet = response.json();
    assert_eq!(set.noun_type, "message");
    assert_eq!(set.item_ids, vec![NounId::Int(2), NounId::Int(3)]);

    // Identities are shared between the two messages and sent once each.
    assert_eq!(set.noun_values["identity"].len(), 3);
    assert_eq!(set.noun_values["conversation"].len(), 2);
    for noun in set.noun_values.keys() {
        assert!(set.noun_schemas.contains_key(noun), "no schema for {}", noun);
    }

    let message = set.value("message", &NounId::Int(2)).unwrap();
    assert_eq!(message["from"], json!(11));
    assert_eq!(message["date"], json!(1_267_450_200_000_i64));
}

#[tokio::test]
async fn test_query_with_range_order_and_limit() {
    let server = create_test_server();

    let set: MarshalledSet = server
        .post("/query")
        .json(&envelope(json!({
            "noun": "message",
            "constraints": [
                ["dateRange", [[1_267_401_600_000_i64, null]]],
                ["orderBy", ["-date"]],
                ["limit", [2]]
            ]
        })))
        .await
        .json();

    assert_eq!(set.item_ids, vec![NounId::Int(4), NounId::Int(3)]);
}

#[tokio::test]
async fn test_query_with_no_hits_is_empty() {
    let server = create_test_server();

    let response = server
        .post("/query")
        .json(&envelope(json!({
            "noun": "contact",
            "constraints": [["nameLike", ["zed%"]]]
        })))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(
        body,
        json!({"nounType": "contact", "itemIds": [], "nounSchemas": {}, "nounValues": {}})
    );
}

// =============================================================================
// ERROR MAPPING TESTS
// =============================================================================

#[tokio::test]
async fn test_wrong_key_is_401() {
    let server = create_test_server();

    let response = server
        .post("/query")
        .json(&AuthEnvelope::new("nope", json!({"noun": "message"})))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "authentication_failed");
    assert!(!error.retryable);
}

#[tokio::test]
async fn test_missing_key_is_401() {
    let server = create_test_server();

    let response = server
        .post("/schema")
        .json(&json!({"request": {}}))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_server_without_key_rejects_everything() {
    let config = ServerConfig {
        auth_key: Some("   ".to_string()),
        ..test_config()
    };
    let server = server_with(Arc::new(StoreProvider::mail_sample().unwrap()), &config);

    let response = server.post("/schema").json(&envelope(json!({}))).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server.post("/schema").json(&AuthEnvelope::new("", json!({}))).await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_endpoint_is_404() {
    let server = create_test_server();

    let response = server.post("/signal").json(&envelope(json!({}))).await;

    response.assert_status(StatusCode::NOT_FOUND);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "unknown_endpoint");
    assert!(error.detail.contains("/signal"));
}

#[tokio::test]
async fn test_get_on_post_endpoint_is_405() {
    let server = create_test_server();

    for path in ["/query", "/schema"] {
        let response = server.get(path).await;
        response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
        let error: ErrorResponse = response.json();
        assert_eq!(error.error, "method_not_allowed");
    }
}

#[tokio::test]
async fn test_malformed_json_is_400() {
    let server = create_test_server();

    let response = server.post("/query").text("{not json").await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "malformed_request");
}

#[tokio::test]
async fn test_malformed_query_payload_is_400() {
    let server = create_test_server();

    let response = server
        .post("/query")
        .json(&envelope(json!({"constraints": []})))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_noun_is_400() {
    let server = create_test_server();

    for noun in ["calendar", "folder"] {
        let response = server
            .post("/query")
            .json(&envelope(json!({"noun": noun})))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let error: ErrorResponse = response.json();
        assert_eq!(error.error, "unknown_noun_name");
    }
}

#[tokio::test]
async fn test_malformed_constraint_is_400() {
    let server = create_test_server();

    let response = server
        .post("/query")
        .json(&envelope(json!({
            "noun": "message",
            "constraints": [["fromRange", [[1, 2]]]]
        })))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "malformed_constraint");
}

#[tokio::test]
async fn test_dangling_reference_is_500() {
    let catalog = mail_catalog();
    let store = NounStore::from_instances([
        NounInstance::new("message", 1).with("from", AttrValue::reference(99))
    ]);
    let server = server_with(Arc::new(StoreProvider::new(catalog, store)), &test_config());

    let response = server
        .post("/query")
        .json(&envelope(json!({"noun": "message"})))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "dangling_reference");
}

#[tokio::test]
async fn test_stalled_query_times_out_and_cancels() {
    let cancelled = Arc::new(Mutex::new(Vec::new()));
    let provider = StalledProvider {
        catalog: mail_catalog(),
        parked: Mutex::new(Vec::new()),
        cancelled: Arc::clone(&cancelled),
    };
    let config = ServerConfig {
        query_timeout_ms: 50,
        ..test_config()
    };
    let server = server_with(Arc::new(provider), &config);

    let response = server
        .post("/query")
        .json(&envelope(json!({"noun": "contact"})))
        .await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "query_timeout");
    assert!(error.retryable);
    assert_eq!(*cancelled.lock().unwrap(), vec![QueryHandle(1)]);
}

#[tokio::test]
async fn test_rate_limit_returns_429() {
    let config = ServerConfig {
        rate_limit: 1,
        ..test_config()
    };
    let server = server_with(Arc::new(StoreProvider::mail_sample().unwrap()), &config);

    server.get("/health").await.assert_status_ok();
    let response = server.get("/health").await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let error: ErrorResponse = response.json();
    assert!(error.retryable);
}
