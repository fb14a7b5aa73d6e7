//! # Remote Client
//!
//! `RemoteNouns` talks to a nounwire server: it fetches the query schemas
//! once, builds query proxies from them, and rebuilds every query result
//! into a local object graph.
//!
//! ```text
//! connect ──POST /schema──▶ QueryProxies
//! new_query ─▶ ProxyQuery ──POST /query──▶ MarshalledSet ─▶ Unmarshalled
//! ```

use crate::api::{AuthEnvelope, ErrorResponse, HealthResponse, SchemaResponse};
use nounwire_core::{
    HelperTable, MarshalledSet, NounwireError, ProxyQuery, QueryProxies, QueryProxyBuilder,
    QueryRequest, Unmarshalled, Unmarshaller,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors from the client layer, one per response class.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Cannot reach the server.
    #[error("Cannot connect to nounwire at {0}")]
    ConnectionFailed(String),

    /// 401: missing or wrong auth key.
    #[error("Unauthorized: invalid or missing auth key")]
    Unauthorized,

    /// 404: the endpoint does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// 400 or 405: the server refused the request as sent.
    #[error("Rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// 429 or 503: try again later if `retryable`.
    #[error("Unavailable: {detail}")]
    Unavailable { detail: String, retryable: bool },

    /// Any other 5xx.
    #[error("Server error ({0}): {1}")]
    Server(u16, String),

    /// The response body was not what the endpoint returns.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The query could not be built or its result could not be rebuilt.
    #[error(transparent)]
    Query(#[from] NounwireError),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { retryable: true, .. })
    }
}

impl From<ClientError> for NounwireError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Query(inner) => inner,
            ClientError::Unauthorized => Self::AuthenticationFailed,
            ClientError::NotFound(path) => Self::UnknownEndpoint(path),
            ClientError::Parse(detail) => Self::Serialization(detail),
            ClientError::ConnectionFailed(detail) => Self::Io(detail),
            other => Self::ProviderFailed(other.to_string()),
        }
    }
}

/// A connection to one nounwire server.
#[derive(Debug)]
pub struct RemoteNouns {
    http: reqwest::Client,
    base_url: String,
    authkey: String,
    schemas: SchemaResponse,
    proxies: QueryProxies,
}

impl RemoteNouns {
    /// Fetch the query schemas from `base_url` and build the proxies.
    pub async fn connect(
        base_url: impl Into<String>,
        authkey: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::new();
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let authkey = authkey.into();

        let schemas: SchemaResponse =
            post_envelope(&http, &base_url, "schema", &authkey, &serde_json::Value::Null).await?;
        let proxies = QueryProxyBuilder::new(&HelperTable::standard()).build(&schemas)?;
        tracing::debug!(url = %base_url, nouns = schemas.len(), "connected");

        Ok(Self {
            http,
            base_url,
            authkey,
            schemas,
            proxies,
        })
    }

    pub fn schemas(&self) -> &SchemaResponse {
        &self.schemas
    }

    pub fn proxies(&self) -> &QueryProxies {
        &self.proxies
    }

    /// Start building a query on one of the server's nouns.
    pub fn new_query(&self, noun: &str) -> Result<ProxyQuery<'_>, ClientError> {
        Ok(self.proxies.new_query(noun)?)
    }

    /// Run a query and rebuild its result graph.
    pub async fn run(&self, query: ProxyQuery<'_>) -> Result<Unmarshalled, ClientError> {
        let set = self.run_request(&query.into_request()).await?;
        Ok(Unmarshaller::new().unmarshal(&set)?)
    }

    /// Run a wire request and return the marshalled set as sent.
    pub async fn run_request(&self, request: &QueryRequest) -> Result<MarshalledSet, ClientError> {
        post_envelope(&self.http, &self.base_url, "query", &self.authkey, request).await
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ClientError::ConnectionFailed(format!("{}: {e}", self.base_url)))?;
        handle_response(response).await
    }
}

async fn post_envelope<B, T>(
    http: &reqwest::Client,
    base_url: &str,
    endpoint: &str,
    authkey: &str,
    request: &B,
) -> Result<T, ClientError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let request = serde_json::to_value(request)
        .map_err(|e| NounwireError::Serialization(e.to_string()))?;
    let url = format!("{}/{}", base_url, endpoint);
    let response = http
        .post(&url)
        .json(&AuthEnvelope::new(authkey, request))
        .send()
        .await
        .map_err(|e| ClientError::ConnectionFailed(format!("{base_url}: {e}")))?;
    handle_response(response).await
}

/// Check the status code, then parse the body as `T`.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Parse(e.to_string()));
    }

    let text = response.text().await.unwrap_or_default();
    let body = serde_json::from_str::<ErrorResponse>(&text).ok();
    let detail = body
        .as_ref()
        .map(|b| b.detail.clone())
        .unwrap_or_else(|| text.clone());

    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => ClientError::Unauthorized,
        reqwest::StatusCode::NOT_FOUND => ClientError::NotFound(detail),
        reqwest::StatusCode::TOO_MANY_REQUESTS => ClientError::Unavailable {
            detail,
            retryable: true,
        },
        reqwest::StatusCode::SERVICE_UNAVAILABLE => ClientError::Unavailable {
            retryable: body.is_some_and(|b| b.retryable),
            detail,
        },
        s if s.is_client_error() => ClientError::Rejected {
            status: s.as_u16(),
            detail,
        },
        s => ClientError::Server(s.as_u16(), detail),
    })
}
