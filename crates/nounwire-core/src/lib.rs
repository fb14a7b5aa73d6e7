//! # nounwire-core
//!
//! The graph marshalling engine for nounwire - THE LOGIC.
//!
//! This crate turns an in-memory graph of typed noun instances (messages,
//! contacts, identities, conversations) into a flat, deduplicated,
//! schema-annotated JSON structure, and rebuilds an equivalent object graph
//! from it on the far side. It also describes each noun's queryable surface
//! so a remote caller can build constraints without hardcoded type knowledge.
//!
//! ## Pipeline
//!
//! ```text
//! NounCatalog ──▶ NounRegistry ──▶ Marshaller ──▶ MarshalledSet
//!                      │                               │
//!                      └──▶ QueryCapabilities          ▼
//!                               │                 Unmarshaller ──▶ ObjectGraph
//!                               ▼
//!                         QueryProxies ──▶ QueryRequest ──▶ NounQuery
//! ```
//!
//! ## Architectural Constraints
//!
//! - Has NO async, NO network dependencies (pure Rust)
//! - Is closed: the noun universe is fixed when the registry is built
//! - Is deterministic: identical inputs yield identical wire output
//! - Walks graphs iteratively; cycles and shared references cost nothing

// =============================================================================
// MODULES
// =============================================================================

pub mod catalog;
pub mod helpers;
pub mod marshal;
pub mod primitives;
pub mod provider;
pub mod proxy;
pub mod query;
pub mod registry;
pub mod schema;
pub mod slots;
pub mod store;
pub mod types;
pub mod unmarshal;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{AttrValue, NounId, NounInstance, NounwireError};

// =============================================================================
// RE-EXPORTS: Engine
// =============================================================================

pub use catalog::{AttributeDescriptor, NounCatalog, NounClass, NounType, SchemaSource, mail_catalog};
pub use helpers::{HelperTable, MarshalHelper};
pub use marshal::{FlatObject, MarshalledSet, Marshaller};
pub use registry::{FieldPlan, NounPlan, NounRegistry};
pub use schema::{QueryCapabilities, QueryCapability, SchemaAttr, SchemaDescriber, SimplifiedSchema};
pub use slots::{Reservation, SlotHandle, SlotTable};
pub use unmarshal::{Field, ObjectGraph, ObjectRef, RebuiltObject, Unmarshalled, Unmarshaller};

// =============================================================================
// RE-EXPORTS: Queries and Providers
// =============================================================================

pub use provider::{NounProvider, QueryHandle, QueryListener, ResultSet};
pub use proxy::{ArgTransform, ConstraintMethod, ProxyQuery, QueryDefinition, QueryProxies, QueryProxyBuilder};
pub use query::{Constraint, ConstraintCall, ConstraintOp, NounQuery, QueryRequest};
pub use store::{InstanceSource, NounStore};
