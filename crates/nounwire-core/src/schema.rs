//! # Schema Describer
//!
//! Derives the two schema shapes the wire protocol uses from a noun type's
//! attribute table:
//!
//! - `SimplifiedSchema`: `attrKey -> {reference, nounType, singular}`, the
//!   minimum a client needs to rebuild a graph from a marshalled set.
//! - `QueryCapabilities`: `attrKey -> {nounType, selfMarshalling, continuous,
//!   likable, idAttr?}`, sent to remote callers so they can build
//!   constraints without hardcoded type knowledge.
//!
//! Both are pure functions of the type definition and the catalog.

use crate::catalog::{NounCatalog, NounType, SchemaSource};
use crate::NounwireError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// SCHEMA SHAPES
// =============================================================================

/// Marshalling description of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaAttr {
    /// True when the attribute holds id references into `nounValues`.
    pub reference: bool,
    pub noun_type: String,
    pub singular: bool,
}

impl SchemaAttr {
    /// A by-value attribute.
    #[must_use]
    pub fn primitive(noun_type: impl Into<String>, singular: bool) -> Self {
        Self {
            reference: false,
            noun_type: noun_type.into(),
            singular,
        }
    }

    /// A by-reference attribute.
    #[must_use]
    pub fn reference(noun_type: impl Into<String>, singular: bool) -> Self {
        Self {
            reference: true,
            noun_type: noun_type.into(),
            singular,
        }
    }
}

/// Per noun type: attribute key to marshalling description.
pub type SimplifiedSchema = BTreeMap<String, SchemaAttr>;

/// Query description of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryCapability {
    pub noun_type: String,
    pub self_marshalling: bool,
    pub continuous: bool,
    pub likable: bool,
    /// Id accessor of the target type, for arguments that are references.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_attr: Option<String>,
}

/// Per noun type: attribute key to query description.
pub type QueryCapabilities = BTreeMap<String, QueryCapability>;

// =============================================================================
// DESCRIBER
// =============================================================================

/// Schema derivation over a catalog.
#[derive(Debug, Clone, Copy)]
pub struct SchemaDescriber<'c> {
    catalog: &'c NounCatalog,
}

impl<'c> SchemaDescriber<'c> {
    #[must_use]
    pub fn new(catalog: &'c NounCatalog) -> Self {
        Self { catalog }
    }

    fn target(&self, noun: &NounType, attr: &str, target: &str) -> Result<&'c NounType, NounwireError> {
        self.catalog.get(target).ok_or_else(|| {
            NounwireError::SchemaConfig(format!(
                "attribute '{}.{}' targets unknown type '{}'",
                noun.name, attr, target
            ))
        })
    }

    /// Derive the marshalling schema of a noun type.
    ///
    /// Query-only attributes are omitted. Primitive targets are by-value,
    /// everything else is by-reference.
    pub fn describe(&self, noun: &NounType) -> Result<SimplifiedSchema, NounwireError> {
        let mut schema = match &noun.schema_source {
            SchemaSource::Canned(fixed) => return Ok(fixed.clone()),
            SchemaSource::DerivedWith(extra) => extra.clone(),
            SchemaSource::Derived => SimplifiedSchema::new(),
        };

        for attr in &noun.attributes {
            let target = self.target(noun, &attr.bound_name, &attr.target)?;
            if target.is_query_only() {
                continue;
            }
            let entry = if target.is_entity() {
                SchemaAttr::reference(&target.name, attr.singular)
            } else {
                SchemaAttr::primitive(&target.name, attr.singular)
            };
            schema.insert(attr.bound_name.clone(), entry);
        }

        Ok(schema)
    }

    /// Derive the query-capability schema of a noun type.
    ///
    /// Every attribute appears, query-only ones included; references record
    /// the target's id accessor.
    pub fn describe_query_capabilities(
        &self,
        noun: &NounType,
    ) -> Result<QueryCapabilities, NounwireError> {
        let mut capabilities = QueryCapabilities::new();

        for attr in &noun.attributes {
            let target = self.target(noun, &attr.bound_name, &attr.target)?;
            let self_marshalling = target.is_self_marshalling();
            capabilities.insert(
                attr.bound_name.clone(),
                QueryCapability {
                    noun_type: target.name.clone(),
                    self_marshalling,
                    continuous: attr.continuous,
                    likable: attr.likable,
                    id_attr: (!self_marshalling).then(|| target.id_attr.clone()),
                },
            );
        }

        Ok(capabilities)
    }
}

// =============================================================================
// TESTS
// =============================================================================
