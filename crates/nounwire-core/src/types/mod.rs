//! # Core Type Definitions
//!
//! This module contains the value-level types shared by every stage of the
//! marshalling pipeline:
//! - Instance identifiers (`NounId`)
//! - Provider-side instances (`NounInstance`, `AttrValue`)
//! - Error types (`NounwireError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`s; nothing
//! in the engine iterates a hash map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// NOUN IDENTIFIERS
// =============================================================================

/// Identifier of one noun instance, unique within its noun type.
///
/// Ids travel as plain JSON values (`42`, `"inbox"`) in `itemIds` and in
/// reference fields, and as their string form when used as the key of a
/// `nounValues` map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NounId {
    Int(i64),
    Text(String),
}

impl NounId {
    /// The string form used as a JSON object key.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Int(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    /// Read an id out of a JSON value. Only integers and strings are ids.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => n.as_i64().map(Self::Int),
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }

    /// The id as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Text(s) => serde_json::Value::from(s.as_str()),
        }
    }
}

impl fmt::Display for NounId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for NounId {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for NounId {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for NounId {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NounId {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

// =============================================================================
// ATTRIBUTE VALUES
// =============================================================================

/// A raw attribute value as held by a provider-side instance.
///
/// References carry only the id; the target noun type comes from the
/// attribute's descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    Date(DateTime<Utc>),
    /// Opaque, self-describing payload (attachment infos and similar).
    Json(serde_json::Value),
    Ref(NounId),
    List(Vec<AttrValue>),
}

impl AttrValue {
    /// Reference to a single instance.
    #[must_use]
    pub fn reference(id: impl Into<NounId>) -> Self {
        Self::Ref(id.into())
    }

    /// Ordered list of references.
    pub fn references<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<NounId>,
    {
        Self::List(ids.into_iter().map(|id| Self::Ref(id.into())).collect())
    }

    /// Whether the value is `Null`.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Convert a JSON value into the closest attribute value.
    ///
    /// Objects stay opaque (`Json`); arrays become lists.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.clone()),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(_) => Self::Json(value.clone()),
        }
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for AttrValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

// =============================================================================
// NOUN INSTANCE
// =============================================================================

/// One concrete object of a noun type, as materialized by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct NounInstance {
    pub noun_type: String,
    pub id: NounId,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl NounInstance {
    /// Create an instance with no attributes.
    #[must_use]
    pub fn new(noun_type: impl Into<String>, id: impl Into<NounId>) -> Self {
        Self {
            noun_type: noun_type.into(),
            id: id.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Builder-style attribute assignment.
    #[must_use]
    pub fn with(mut self, attr: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(attr.into(), value.into());
        self
    }

    /// Set an attribute in place.
    pub fn set(&mut self, attr: impl Into<String>, value: impl Into<AttrValue>) {
        self.attrs.insert(attr.into(), value.into());
    }

    /// Get an attribute value, if present.
    #[must_use]
    pub fn get(&self, attr: &str) -> Option<&AttrValue> {
        self.attrs.get(attr)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors raised by the engine and mapped to responses by the transport.
///
/// - No silent failures: a field that cannot be marshalled is an error,
///   never a dropped key
/// - Transport-facing variants are recoverable per request
/// - Internal variants carry diagnostic detail for the failed response
#[derive(Debug, Error)]
pub enum NounwireError {
    /// The request's auth key is missing or wrong.
    #[error("Authentication failed")]
    AuthenticationFailed,

    /// The request named an endpoint that does not exist.
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    /// The endpoint exists but only accepts POST.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The client asked for a noun type that is not exposed.
    #[error("Unknown noun name: {0}")]
    UnknownNounName(String),

    /// The marshaller met a noun type outside the registry's closed universe.
    #[error("Unknown runtime noun type: {0}")]
    UnknownRuntimeNounType(String),

    /// A constraint names an attribute or method the capability schema lacks,
    /// or carries arguments of the wrong shape.
    #[error("Malformed constraint: {0}")]
    MalformedConstraint(String),

    /// A reference points at an instance the result graph does not contain.
    #[error("Dangling reference: {noun_type}#{id}")]
    DanglingReference { noun_type: String, id: NounId },

    /// An attribute value does not have the shape its schema entry requires.
    #[error("Value mismatch on {noun_type}.{attr}: expected {expected}")]
    ValueMismatch {
        noun_type: String,
        attr: String,
        expected: &'static str,
    },

    /// A marshalled set references schemas or ids it does not carry.
    #[error("Inconsistent marshalled set: {0}")]
    InconsistentSet(String),

    /// A slot was populated twice or never populated.
    #[error("Slot conflict: {0}")]
    SlotConflict(String),

    /// The catalog, helper table, or capability schema is not self-consistent.
    #[error("Schema configuration error: {0}")]
    SchemaConfig(String),

    /// The provider did not complete the query in time.
    #[error("Query timed out after {0} ms")]
    QueryTimeout(u64),

    /// The provider failed or abandoned the query.
    #[error("Provider failed: {0}")]
    ProviderFailed(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl NounwireError {
    /// Whether the caller may retry the same request unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueryTimeout(_))
    }
}

// =============================================================================
// TESTS
// =============================================================================
