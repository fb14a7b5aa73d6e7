//! # Noun Registry
//!
//! The explicit registry value built once at startup from a catalog, a
//! helper table and the set of exposed noun names.
//!
//! Construction derives every entity type's schemas and compiles each schema
//! entry into a `FieldPlan`. Anything the marshaller would otherwise have to
//! guess at runtime (a helper on the wrong kind of type, a reference to a
//! non-entity, an exposed name that does not exist) fails here instead.

use crate::catalog::NounCatalog;
use crate::helpers::{HelperTable, MarshalHelper};
use crate::primitives::EXPOSED_NOUNS;
use crate::schema::{QueryCapabilities, SchemaDescriber, SimplifiedSchema};
use crate::{NounwireError, catalog::mail_catalog};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// FIELD PLANS
// =============================================================================

/// How one schema entry is marshalled. The set of cases is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldPlan {
    /// Copied by value.
    Plain { singular: bool },
    /// Passed through a value helper, per element when plural.
    Helper {
        helper: MarshalHelper,
        singular: bool,
    },
    /// One id, or `null`.
    RefOne { target: String },
    /// Ordered ids, or `[]`.
    RefMany { target: String },
}

/// Everything the engine needs to know about one entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NounPlan {
    pub noun_type: String,
    pub id_attr: String,
    pub schema: SimplifiedSchema,
    pub fields: BTreeMap<String, FieldPlan>,
    /// When set, instances are marshalled through this projection instead of
    /// `fields`.
    pub projection: Option<MarshalHelper>,
    pub capabilities: QueryCapabilities,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Immutable after construction; share it behind an `Arc`.
#[derive(Debug, Clone)]
pub struct NounRegistry {
    catalog: NounCatalog,
    helpers: HelperTable,
    plans: BTreeMap<String, NounPlan>,
    exposed: BTreeSet<String>,
}

impl NounRegistry {
    /// Compile a registry.
    pub fn new<'a>(
        catalog: NounCatalog,
        helpers: HelperTable,
        exposed: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, NounwireError> {
        catalog.validate()?;
        check_helpers(&catalog, &helpers)?;

        let describer = SchemaDescriber::new(&catalog);
        let mut plans = BTreeMap::new();

        for noun in catalog.iter().filter(|n| n.is_entity()) {
            let schema = describer.describe(noun)?;
            let capabilities = describer.describe_query_capabilities(noun)?;
            let projection = helpers.get(&noun.name).cloned();

            let mut fields = BTreeMap::new();
            for (key, attr) in &schema {
                let target = catalog.get(&attr.noun_type).ok_or_else(|| {
                    NounwireError::SchemaConfig(format!(
                        "schema entry '{}.{}' names unknown type '{}'",
                        noun.name, key, attr.noun_type
                    ))
                })?;

                let plan = match (attr.reference, attr.singular) {
                    (true, _) if !target.is_entity() => {
                        return Err(NounwireError::SchemaConfig(format!(
                            "'{}.{}' references non-entity type '{}'",
                            noun.name, key, target.name
                        )));
                    }
                    (true, true) => FieldPlan::RefOne {
                        target: target.name.clone(),
                    },
                    (true, false) => FieldPlan::RefMany {
                        target: target.name.clone(),
                    },
                    (false, singular) => match helpers.get(&target.name) {
                        Some(helper) => FieldPlan::Helper {
                            helper: helper.clone(),
                            singular,
                        },
                        None => FieldPlan::Plain { singular },
                    },
                };
                fields.insert(key.clone(), plan);
            }

            plans.insert(
                noun.name.clone(),
                NounPlan {
                    noun_type: noun.name.clone(),
                    id_attr: noun.id_attr.clone(),
                    schema,
                    fields,
                    projection,
                    capabilities,
                },
            );
        }

        let mut exposed_set = BTreeSet::new();
        for name in exposed {
            if !plans.contains_key(name) {
                return Err(NounwireError::SchemaConfig(format!(
                    "exposed noun '{}' is not an entity type",
                    name
                )));
            }
            exposed_set.insert(name.to_string());
        }

        Ok(Self {
            catalog,
            helpers,
            plans,
            exposed: exposed_set,
        })
    }

    /// The mail object model with the standard helpers.
    pub fn mail() -> Result<Self, NounwireError> {
        Self::new(mail_catalog(), HelperTable::standard(), EXPOSED_NOUNS)
    }

    /// Plan for any entity type in the closed universe.
    pub fn plan(&self, noun_type: &str) -> Result<&NounPlan, NounwireError> {
        self.plans
            .get(noun_type)
            .ok_or_else(|| NounwireError::UnknownRuntimeNounType(noun_type.to_string()))
    }

    /// Plan for a type a remote client may name.
    pub fn exposed_plan(&self, noun_type: &str) -> Result<&NounPlan, NounwireError> {
        if !self.exposed.contains(noun_type) {
            return Err(NounwireError::UnknownNounName(noun_type.to_string()));
        }
        self.plan(noun_type)
    }

    #[must_use]
    pub fn schema(&self, noun_type: &str) -> Option<&SimplifiedSchema> {
        self.plans.get(noun_type).map(|p| &p.schema)
    }

    /// Query-capability schemas of every exposed type, as served to clients.
    #[must_use]
    pub fn query_schemas(&self) -> BTreeMap<String, QueryCapabilities> {
        self.exposed
            .iter()
            .filter_map(|name| {
                self.plans
                    .get(name)
                    .map(|p| (name.clone(), p.capabilities.clone()))
            })
            .collect()
    }

    pub fn exposed(&self) -> impl Iterator<Item = &str> {
        self.exposed.iter().map(String::as_str)
    }

    #[must_use]
    pub fn catalog(&self) -> &NounCatalog {
        &self.catalog
    }

    #[must_use]
    pub fn helpers(&self) -> &HelperTable {
        &self.helpers
    }
}

/// Value helpers belong on primitives, projections on entities.
fn check_helpers(catalog: &NounCatalog, helpers: &HelperTable) -> Result<(), NounwireError> {
    for (name, helper) in helpers.iter() {
        let Some(noun) = catalog.get(name) else {
            return Err(NounwireError::SchemaConfig(format!(
                "helper registered for unknown type '{}'",
                name
            )));
        };
        if helper.is_value_helper() == noun.is_entity() {
            return Err(NounwireError::SchemaConfig(format!(
                "helper {:?} does not fit type '{}'",
                helper, name
            )));
        }
    }
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDescriptor, NounType, SchemaSource};
    use crate::schema::SchemaAttr;

    #[test]
    fn mail_registry_compiles() {
        let registry = NounRegistry::mail().expect("registry");
        let message = registry.plan("message").expect("message");

        assert_eq!(
            message.fields["date"],
            FieldPlan::Helper {
                helper: MarshalHelper::EpochMillis,
                singular: true
            }
        );
        assert_eq!(message.fields["subject"], FieldPlan::Plain { singular: true });
        assert_eq!(
            message.fields["tags"],
            FieldPlan::RefMany {
                target: "tag".into()
            }
        );
        assert_eq!(
            message.fields["folder"],
            FieldPlan::RefOne {
                target: "folder".into()
            }
        );
        assert!(message.projection.is_none());
        assert!(registry.plan("tag").expect("tag").projection.is_some());
    }

    #[test]
    fn unknown_runtime_type() {
        let registry = NounRegistry::mail().expect("registry");
        assert!(matches!(
            registry.plan("calendar"),
            Err(NounwireError::UnknownRuntimeNounType(_))
        ));
        assert!(matches!(
            registry.plan("date"),
            Err(NounwireError::UnknownRuntimeNounType(_))
        ));
    }

    #[test]
    fn whitelist_controls_exposure() {
        let registry = NounRegistry::mail().expect("registry");
        assert!(registry.exposed_plan("message").is_ok());
        assert!(matches!(
            registry.exposed_plan("folder"),
            Err(NounwireError::UnknownNounName(_))
        ));

        let schemas = registry.query_schemas();
        let names: Vec<_> = schemas.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["contact", "conversation", "identity", "message"]);
    }

    #[test]
    fn exposing_a_primitive_fails() {
        let result = NounRegistry::new(mail_catalog(), HelperTable::standard(), ["date"]);
        assert!(matches!(result, Err(NounwireError::SchemaConfig(_))));
    }

    #[test]
    fn value_helper_on_entity_fails() {
        let mut helpers = HelperTable::standard();
        helpers.insert("contact", MarshalHelper::EpochMillis);
        let result = NounRegistry::new(mail_catalog(), helpers, EXPOSED_NOUNS);
        assert!(matches!(result, Err(NounwireError::SchemaConfig(_))));
    }

    #[test]
    fn canned_reference_to_primitive_fails() {
        let mut canned = SimplifiedSchema::new();
        canned.insert("owner".into(), SchemaAttr::reference("string", true));
        let catalog = NounCatalog::from_types([
            NounType::primitive("string"),
            NounType::entity("box").with_schema_source(SchemaSource::Canned(canned)),
        ])
        .expect("catalog");
        let result = NounRegistry::new(catalog, HelperTable::new(), ["box"]);
        assert!(matches!(result, Err(NounwireError::SchemaConfig(_))));
    }

    #[test]
    fn empty_helper_table_copies_dates_plainly() {
        let catalog = NounCatalog::from_types([
            NounType::primitive("date"),
            NounType::entity("event").with_attribute(AttributeDescriptor::singular("at", "date")),
        ])
        .expect("catalog");
        let registry = NounRegistry::new(catalog, HelperTable::new(), ["event"]).expect("registry");
        assert_eq!(
            registry.plan("event").expect("event").fields["at"],
            FieldPlan::Plain { singular: true }
        );
    }
}
