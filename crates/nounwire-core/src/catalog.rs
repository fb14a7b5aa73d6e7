//! # Noun Catalog
//!
//! The closed universe of noun type definitions.
//!
//! A provider hands the catalog over at startup; the registry compiles it
//! once and nothing adds types afterwards. `mail_catalog()` is the built-in
//! definition set for the mail object model.

use crate::primitives::{
    DEFAULT_ID_ATTR, NOUN_ATTACHMENT, NOUN_BOOLEAN, NOUN_CONTACT, NOUN_CONVERSATION, NOUN_DATE,
    NOUN_FOLDER, NOUN_FULLTEXT, NOUN_IDENTITY, NOUN_MESSAGE, NOUN_NUMBER, NOUN_PARAM_IDENTITY,
    NOUN_STRING, NOUN_TAG,
};
use crate::schema::SchemaAttr;
use crate::NounwireError;
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// NOUN CLASSIFICATION
// =============================================================================

/// How values of a noun type travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NounClass {
    /// Self-marshalling value (boolean, number, string, date, attachment).
    Primitive,
    /// Exists only to parametrize queries; never found on an instance.
    QueryOnly { self_marshalling: bool },
    /// Has identity and is transmitted by reference.
    Entity,
}

// =============================================================================
// ATTRIBUTE DESCRIPTOR
// =============================================================================

/// One attribute of a noun type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDescriptor {
    pub bound_name: String,
    /// Name of the noun type the attribute's values belong to.
    pub target: String,
    pub singular: bool,
    /// Supports a `<attr>Range` constraint.
    pub continuous: bool,
    /// Supports a `<attr>Like` constraint.
    pub likable: bool,
}

impl AttributeDescriptor {
    #[must_use]
    pub fn singular(bound_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            bound_name: bound_name.into(),
            target: target.into(),
            singular: true,
            continuous: false,
            likable: false,
        }
    }

    #[must_use]
    pub fn plural(bound_name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            singular: false,
            ..Self::singular(bound_name, target)
        }
    }

    #[must_use]
    pub fn continuous(mut self) -> Self {
        self.continuous = true;
        self
    }

    #[must_use]
    pub fn likable(mut self) -> Self {
        self.likable = true;
        self
    }
}

// =============================================================================
// SCHEMA SOURCE
// =============================================================================

/// Where a noun type's simplified schema comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaSource {
    /// Derived from the attribute table alone.
    #[default]
    Derived,
    /// Derived, plus entries for data the model exposes outside its
    /// attribute table. Generic attributes win on a key clash.
    DerivedWith(BTreeMap<String, SchemaAttr>),
    /// Fixed schema; the attribute table is ignored for marshalling.
    Canned(BTreeMap<String, SchemaAttr>),
}

// =============================================================================
// NOUN TYPE
// =============================================================================

/// A noun type definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NounType {
    pub name: String,
    pub class: NounClass,
    pub attributes: Vec<AttributeDescriptor>,
    /// Name under which instances expose their id.
    pub id_attr: String,
    pub schema_source: SchemaSource,
}

impl NounType {
    fn with_class(name: impl Into<String>, class: NounClass) -> Self {
        Self {
            name: name.into(),
            class,
            attributes: Vec::new(),
            id_attr: DEFAULT_ID_ATTR.to_string(),
            schema_source: SchemaSource::Derived,
        }
    }

    /// An entity type with identity.
    #[must_use]
    pub fn entity(name: impl Into<String>) -> Self {
        Self::with_class(name, NounClass::Entity)
    }

    /// A self-marshalling value type.
    #[must_use]
    pub fn primitive(name: impl Into<String>) -> Self {
        Self::with_class(name, NounClass::Primitive)
    }

    /// A query-only parameter type.
    #[must_use]
    pub fn query_only(name: impl Into<String>, self_marshalling: bool) -> Self {
        Self::with_class(name, NounClass::QueryOnly { self_marshalling })
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeDescriptor) -> Self {
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub fn with_id_attr(mut self, id_attr: impl Into<String>) -> Self {
        self.id_attr = id_attr.into();
        self
    }

    #[must_use]
    pub fn with_schema_source(mut self, source: SchemaSource) -> Self {
        self.schema_source = source;
        self
    }

    /// Find an attribute by bound name.
    #[must_use]
    pub fn attribute(&self, bound_name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.bound_name == bound_name)
    }

    /// Entities travel by reference; everything else travels by value.
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.class == NounClass::Entity
    }

    /// Whether this type only ever appears as a query parameter.
    #[must_use]
    pub fn is_query_only(&self) -> bool {
        matches!(self.class, NounClass::QueryOnly { .. })
    }

    /// Whether query arguments of this type need no client-side transform.
    #[must_use]
    pub fn is_self_marshalling(&self) -> bool {
        match self.class {
            NounClass::Primitive => true,
            NounClass::QueryOnly { self_marshalling } => self_marshalling,
            NounClass::Entity => false,
        }
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// All noun types known to a process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NounCatalog {
    types: BTreeMap<String, NounType>,
}

impl NounCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a noun type. Names must be unique.
    pub fn insert(&mut self, noun: NounType) -> Result<(), NounwireError> {
        if self.types.contains_key(&noun.name) {
            return Err(NounwireError::SchemaConfig(format!(
                "noun type '{}' defined twice",
                noun.name
            )));
        }
        self.types.insert(noun.name.clone(), noun);
        Ok(())
    }

    /// Build a catalog from a list of types.
    pub fn from_types(types: impl IntoIterator<Item = NounType>) -> Result<Self, NounwireError> {
        let mut catalog = Self::new();
        for noun in types {
            catalog.insert(noun)?;
        }
        Ok(catalog)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&NounType> {
        self.types.get(name)
    }

    /// All types, in name order.
    pub fn iter(&self) -> impl Iterator<Item = &NounType> {
        self.types.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Check that every attribute targets a known type and that bound names
    /// are unique per type.
    pub fn validate(&self) -> Result<(), NounwireError> {
        for noun in self.types.values() {
            let mut seen = BTreeSet::new();
            for attr in &noun.attributes {
                if !seen.insert(attr.bound_name.as_str()) {
                    return Err(NounwireError::SchemaConfig(format!(
                        "attribute '{}.{}' defined twice",
                        noun.name, attr.bound_name
                    )));
                }
                if !self.types.contains_key(&attr.target) {
                    return Err(NounwireError::SchemaConfig(format!(
                        "attribute '{}.{}' targets unknown type '{}'",
                        noun.name, attr.bound_name, attr.target
                    )));
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// BUILT-IN MAIL CATALOG
// =============================================================================

fn canned(entries: &[(&str, &str)]) -> BTreeMap<String, SchemaAttr> {
    entries
        .iter()
        .map(|(key, noun)| ((*key).to_string(), SchemaAttr::primitive(*noun, true)))
        .collect()
}

/// The mail object model: conversations, messages, contacts, identities,
/// tags and folders, plus the value types they use.
#[must_use]
pub fn mail_catalog() -> NounCatalog {
    use AttributeDescriptor as A;

    let types = [
        NounType::primitive(NOUN_BOOLEAN),
        NounType::primitive(NOUN_NUMBER),
        NounType::primitive(NOUN_STRING),
        NounType::primitive(NOUN_DATE),
        NounType::primitive(NOUN_ATTACHMENT),
        NounType::query_only(NOUN_FULLTEXT, true),
        NounType::query_only(NOUN_PARAM_IDENTITY, false),
        NounType::entity(NOUN_CONVERSATION)
            .with_schema_source(SchemaSource::Canned(canned(&[("subject", NOUN_STRING)]))),
        NounType::entity(NOUN_MESSAGE)
            .with_schema_source(SchemaSource::DerivedWith(canned(&[("subject", NOUN_STRING)])))
            .with_attribute(A::singular("conversation", NOUN_CONVERSATION))
            .with_attribute(A::singular("folder", NOUN_FOLDER))
            .with_attribute(A::singular("date", NOUN_DATE).continuous())
            .with_attribute(A::singular("from", NOUN_IDENTITY))
            .with_attribute(A::plural("to", NOUN_IDENTITY))
            .with_attribute(A::plural("cc", NOUN_IDENTITY))
            .with_attribute(A::plural("involves", NOUN_IDENTITY))
            .with_attribute(A::plural("tags", NOUN_TAG))
            .with_attribute(A::singular("star", NOUN_BOOLEAN))
            .with_attribute(A::singular("read", NOUN_BOOLEAN))
            .with_attribute(A::plural("attachmentTypes", NOUN_STRING).likable())
            .with_attribute(A::plural("attachmentInfos", NOUN_ATTACHMENT))
            .with_attribute(A::plural("fulltextMatches", NOUN_FULLTEXT))
            .with_attribute(A::singular("involvesParam", NOUN_PARAM_IDENTITY)),
        NounType::entity(NOUN_CONTACT)
            .with_attribute(A::singular("name", NOUN_STRING).likable())
            .with_attribute(A::singular("popularity", NOUN_NUMBER).continuous())
            .with_attribute(A::singular("frecency", NOUN_NUMBER).continuous())
            .with_attribute(A::plural("identities", NOUN_IDENTITY)),
        NounType::entity(NOUN_IDENTITY)
            .with_schema_source(SchemaSource::DerivedWith(canned(&[(
                "inAddressBook",
                NOUN_BOOLEAN,
            )])))
            .with_attribute(A::singular("kind", NOUN_STRING))
            .with_attribute(A::singular("value", NOUN_STRING).likable())
            .with_attribute(A::singular("contact", NOUN_CONTACT)),
        NounType::entity(NOUN_TAG)
            .with_id_attr("key")
            .with_schema_source(SchemaSource::Canned(canned(&[
                ("key", NOUN_STRING),
                ("tag", NOUN_STRING),
            ]))),
        NounType::entity(NOUN_FOLDER).with_schema_source(SchemaSource::Canned(canned(&[
            ("id", NOUN_NUMBER),
            ("name", NOUN_STRING),
            ("accountLabel", NOUN_STRING),
        ]))),
    ];

    let mut catalog = NounCatalog::new();
    for noun in types {
        catalog.types.insert(noun.name.clone(), noun);
    }
    catalog
}

// =============================================================================
// TESTS
// =============================================================================
