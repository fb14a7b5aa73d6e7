//! # Server Configuration
//!
//! `ServerConfig` is read from an optional TOML file, then overridden by
//! environment variables, then by command-line flags.
//!
//! | Variable                     | Field              |
//! |------------------------------|--------------------|
//! | `NOUNWIRE_AUTH_KEY`          | `auth_key`         |
//! | `NOUNWIRE_AUTH_KEY_FILE`     | `auth_key_file`    |
//! | `NOUNWIRE_RATE_LIMIT`        | `rate_limit`       |
//! | `NOUNWIRE_QUERY_TIMEOUT_MS`  | `query_timeout_ms` |
//! | `NOUNWIRE_CORS_ORIGINS`      | `cors_origins`     |

use nounwire_core::NounwireError;
use nounwire_core::primitives::DEFAULT_QUERY_TIMEOUT_MS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8778;

/// Default requests per second for the global rate limiter.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

/// Key file looked up in `$HOME` when none is configured.
pub const DEFAULT_KEY_FILE: &str = ".nounwire-authkey";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Inline auth key. Takes precedence over `auth_key_file`.
    pub auth_key: Option<String>,
    pub auth_key_file: Option<PathBuf>,
    /// Requests per second; `0` disables rate limiting.
    pub rate_limit: u32,
    pub query_timeout_ms: u64,
    /// `*` or a comma-separated origin list. Unset means localhost only.
    pub cors_origins: Option<String>,
    /// JSON dataset served by the store provider. Unset serves the sample.
    pub dataset: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            auth_key: None,
            auth_key_file: None,
            rate_limit: DEFAULT_RATE_LIMIT,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            cors_origins: None,
            dataset: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, NounwireError> {
        toml::from_str(text)
            .map_err(|e| NounwireError::Serialization(format!("invalid config: {}", e)))
    }

    /// Load from `path` (defaults if `None`), then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, NounwireError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    NounwireError::Io(format!("cannot read config {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env_from(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), NounwireError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("NOUNWIRE_AUTH_KEY") {
            self.auth_key = Some(key);
        }
        if let Some(path) = lookup("NOUNWIRE_AUTH_KEY_FILE") {
            self.auth_key_file = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("NOUNWIRE_RATE_LIMIT") {
            self.rate_limit = parse_env("NOUNWIRE_RATE_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("NOUNWIRE_QUERY_TIMEOUT_MS") {
            self.query_timeout_ms = parse_env("NOUNWIRE_QUERY_TIMEOUT_MS", &raw)?;
        }
        if let Some(origins) = lookup("NOUNWIRE_CORS_ORIGINS") {
            self.cors_origins = Some(origins);
        }
        Ok(())
    }

    /// The auth key the server accepts, if any.
    ///
    /// An inline key wins. Otherwise the key file is read and trimmed; an
    /// explicitly configured file must exist, the default `$HOME` one may not.
    pub fn resolve_auth_key(&self) -> Result<Option<String>, NounwireError> {
        if let Some(key) = self.auth_key.as_deref() {
            let key = key.trim();
            return Ok((!key.is_empty()).then(|| key.to_string()));
        }

        let (path, required) = match &self.auth_key_file {
            Some(path) => (path.clone(), true),
            None => match std::env::var_os("HOME") {
                Some(home) => (PathBuf::from(home).join(DEFAULT_KEY_FILE), false),
                None => return Ok(None),
            },
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let key = text.trim();
                Ok((!key.is_empty()).then(|| key.to_string()))
            }
            Err(e) if required => Err(NounwireError::Io(format!(
                "cannot read auth key file {}: {}",
                path.display(),
                e
            ))),
            Err(_) => Ok(None),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, NounwireError> {
    raw.trim().parse().map_err(|_| {
        NounwireError::Serialization(format!("{} is not a valid number: {:?}", name, raw))
    })
}

// =============================================================================
// TESTS
// =============================================================================
