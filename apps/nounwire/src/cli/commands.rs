//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::RemoteArgs;
use crate::api;
use crate::client::RemoteNouns;
use crate::config::ServerConfig;
use crate::fixture::StoreProvider;
use nounwire_core::{
    ConstraintCall, Field, Marshaller, NounId, NounQuery, NounRegistry, NounwireError, ProxyQuery,
    QueryProxyBuilder, SchemaDescriber, Unmarshalled, Unmarshaller,
};
use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum dataset file size (100 MB).
const MAX_DATASET_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), NounwireError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| NounwireError::Io(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(NounwireError::Serialization(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize `path` and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, NounwireError> {
    let canonical = path.canonicalize().map_err(|e| {
        NounwireError::Io(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(NounwireError::Io(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// The store provider for `dataset`, or the sample mailbox.
pub fn load_provider(dataset: Option<&Path>) -> Result<StoreProvider, NounwireError> {
    match dataset {
        Some(path) => {
            let path = validate_file_path(path)?;
            validate_file_size(&path, MAX_DATASET_FILE_SIZE)?;
            StoreProvider::from_dataset_file(&path)
        }
        None => StoreProvider::mail_sample(),
    }
}

/// `[["method", [args...]], ...]` from the command line.
pub fn parse_constraints(text: &str) -> Result<Vec<ConstraintCall>, NounwireError> {
    serde_json::from_str(text).map_err(|e| {
        NounwireError::MalformedConstraint(format!("constraints must be [[method, [args]]]: {}", e))
    })
}

/// Feed each call through the proxy so arguments get the client transforms.
fn apply_constraints(query: &mut ProxyQuery<'_>, calls: &[ConstraintCall]) -> Result<(), NounwireError> {
    for call in calls {
        query.call(call.method(), call.args())?;
    }
    Ok(())
}

fn print_json(value: &impl serde::Serialize) -> Result<(), NounwireError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| NounwireError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Command-line values that override the configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dataset: Option<PathBuf>,
    pub rate_limit: Option<u32>,
    pub query_timeout_ms: Option<u64>,
}

impl ServerOverrides {
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(dataset) = self.dataset {
            config.dataset = Some(dataset);
        }
        if let Some(rate_limit) = self.rate_limit {
            config.rate_limit = rate_limit;
        }
        if let Some(timeout) = self.query_timeout_ms {
            config.query_timeout_ms = timeout;
        }
    }
}

/// Start the HTTP server.
pub async fn cmd_server(
    config_path: Option<&Path>,
    overrides: ServerOverrides,
) -> Result<(), NounwireError> {
    let mut config = ServerConfig::load(config_path)?;
    overrides.apply(&mut config);
    let provider = load_provider(config.dataset.as_deref())?;

    eprintln!("nounwire server starting...");
    eprintln!();
    eprintln!("Configuration:");
    eprintln!("  Address:    {}", config.addr());
    match &config.dataset {
        Some(path) => eprintln!("  Dataset:    {}", path.display()),
        None => eprintln!("  Dataset:    built-in sample mailbox"),
    }
    eprintln!("  Instances:  {}", provider.store().len());
    eprintln!("  Timeout:    {} ms", config.query_timeout_ms);
    eprintln!();
    eprintln!("Endpoints:");
    eprintln!("  POST /schema - Query capabilities per noun");
    eprintln!("  POST /query  - Run a query, get a marshalled set");
    eprintln!("  GET  /health - Health check");
    eprintln!();
    eprintln!("Press Ctrl+C to stop");
    eprintln!();

    api::run_server(&config, Arc::new(provider)).await
}

// =============================================================================
// REMOTE COMMANDS
// =============================================================================

async fn connect(config_path: Option<&Path>, remote: &RemoteArgs) -> Result<RemoteNouns, NounwireError> {
    let authkey = match &remote.authkey {
        Some(key) => key.clone(),
        None => ServerConfig::load(config_path)?
            .resolve_auth_key()?
            .ok_or(NounwireError::AuthenticationFailed)?,
    };
    Ok(RemoteNouns::connect(remote.url.clone(), authkey).await?)
}

/// Print the server's query schemas.
pub async fn cmd_schema(config_path: Option<&Path>, remote: &RemoteArgs) -> Result<(), NounwireError> {
    let client = connect(config_path, remote).await?;
    print_json(client.schemas())
}

/// Run a query on the server.
pub async fn cmd_query(
    config_path: Option<&Path>,
    remote: &RemoteArgs,
    noun: &str,
    constraints: &str,
    rebuild: bool,
) -> Result<(), NounwireError> {
    let calls = parse_constraints(constraints)?;
    let client = connect(config_path, remote).await?;

    let mut query = client.new_query(noun)?;
    apply_constraints(&mut query, &calls)?;

    if rebuild {
        let rebuilt = client.run(query).await?;
        print_json(&render_graph(&rebuilt))
    } else {
        let set = client.run_request(&query.into_request()).await?;
        print_json(&set)
    }
}

// =============================================================================
// LOCAL COMMANDS
// =============================================================================

/// Query a local dataset and print what the server would send.
pub fn cmd_marshal(
    dataset: Option<&Path>,
    noun: &str,
    constraints: &str,
    rebuild: bool,
) -> Result<(), NounwireError> {
    let calls = parse_constraints(constraints)?;
    let provider = load_provider(dataset)?;
    let registry = NounRegistry::mail()?;
    let proxies = QueryProxyBuilder::new(registry.helpers()).build(&registry.query_schemas())?;

    let mut query = proxies.new_query(noun)?;
    apply_constraints(&mut query, &calls)?;
    let query = NounQuery::from_request(&registry, &query.into_request())?;

    let ids = provider.evaluate(&query)?;
    let store = provider.store();
    let roots = ids.iter().filter_map(|id| store.get(&query.noun, id));
    let set = Marshaller::new(&registry).marshal(store, &query.noun, roots)?;

    if rebuild {
        let rebuilt = Unmarshaller::new().unmarshal(&set)?;
        print_json(&render_graph(&rebuilt))
    } else {
        print_json(&set)
    }
}

/// Print simplified schemas and query capabilities of the mail model.
pub fn cmd_describe(noun: Option<&str>) -> Result<(), NounwireError> {
    let registry = NounRegistry::mail()?;
    let catalog = registry.catalog();
    let describer = SchemaDescriber::new(catalog);

    let mut out = Map::new();
    for entity in catalog.iter().filter(|n| n.is_entity()) {
        if noun.is_some_and(|wanted| wanted != entity.name) {
            continue;
        }
        out.insert(
            entity.name.clone(),
            json!({
                "exposed": registry.exposed().any(|name| name == entity.name),
                "idAttr": entity.id_attr,
                "schema": describer.describe(entity)?,
                "capabilities": describer.describe_query_capabilities(entity)?,
            }),
        );
    }
    match noun {
        Some(wanted) if out.is_empty() => Err(NounwireError::UnknownNounName(wanted.to_string())),
        _ => print_json(&Value::Object(out)),
    }
}

// =============================================================================
// RENDERING
// =============================================================================

/// Root objects with references shown as `type#id`.
pub fn render_graph(rebuilt: &Unmarshalled) -> Value {
    let label = |noun_type: &str, id: &NounId| format!("{}#{}", noun_type, id.key());

    let roots: Vec<Value> = rebuilt
        .root_objects()
        .map(|object| {
            let mut fields = Map::new();
            fields.insert("$ref".to_string(), json!(label(&object.noun_type, &object.id)));
            for (key, field) in &object.fields {
                let value = match field {
                    Field::Value(value) => value.clone(),
                    Field::Ref(None) => Value::Null,
                    Field::Ref(Some(target)) => {
                        let target = &rebuilt.graph[*target];
                        json!(label(&target.noun_type, &target.id))
                    }
                    Field::Refs(targets) => targets
                        .iter()
                        .map(|t| {
                            let target = &rebuilt.graph[*t];
                            json!(label(&target.noun_type, &target.id))
                        })
                        .collect(),
                };
                fields.insert(key.clone(), value);
            }
            Value::Object(fields)
        })
        .collect();

    json!({
        "nounType": rebuilt.noun_type,
        "objects": rebuilt.graph.len(),
        "roots": roots,
    })
}

// =============================================================================
// TESTS
// =============================================================================
