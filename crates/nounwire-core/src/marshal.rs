//! # Marshaller
//!
//! Flattens a result graph into a `MarshalledSet`.
//!
//! ## Algorithm
//!
//! The walk is iterative over an explicit work stack:
//!
//! 1. Every root is reserved in a `SlotTable` before anything about it is
//!    computed, and its id is appended to `itemIds`.
//! 2. Popping an instance populates its slot with the flat object built from
//!    the type's `FieldPlan`s.
//! 3. A reference field resolves its target, reserves it, and writes the id.
//!    Fresh reservations are pushed onto the stack; existing ones are not
//!    revisited, which makes shared references and cycles free.
//!
//! Each distinct `(type, id)` is flattened exactly once.

use crate::helpers::plain_json;
use crate::provider::ResultSet;
use crate::registry::{FieldPlan, NounPlan, NounRegistry};
use crate::schema::SimplifiedSchema;
use crate::slots::{Reservation, SlotTable};
use crate::store::InstanceSource;
use crate::{AttrValue, NounId, NounInstance, NounwireError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One instance on the wire: attribute key to JSON value.
pub type FlatObject = BTreeMap<String, Value>;

// =============================================================================
// MARSHALLED SET
// =============================================================================

/// The self-contained wire form of a result graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarshalledSet {
    /// Type of the root items.
    pub noun_type: String,
    /// Root ids, in result order.
    pub item_ids: Vec<NounId>,
    /// Schema of every type that has an entry in `noun_values`.
    pub noun_schemas: BTreeMap<String, SimplifiedSchema>,
    /// Type name to id key to flattened instance.
    pub noun_values: BTreeMap<String, BTreeMap<String, FlatObject>>,
}

impl MarshalledSet {
    /// An empty set of roots of the given type.
    #[must_use]
    pub fn empty(noun_type: impl Into<String>) -> Self {
        Self {
            noun_type: noun_type.into(),
            item_ids: Vec::new(),
            noun_schemas: BTreeMap::new(),
            noun_values: BTreeMap::new(),
        }
    }

    /// The flat object of one instance.
    #[must_use]
    pub fn value(&self, noun_type: &str, id: &NounId) -> Option<&FlatObject> {
        self.noun_values
            .get(noun_type)
            .and_then(|values| values.get(&id.key()))
    }

    /// Number of distinct instances carried.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.noun_values.values().map(BTreeMap::len).sum()
    }
}

// =============================================================================
// MARSHALLER
// =============================================================================

/// Stateless over a registry; cheap to construct per request.
#[derive(Debug, Clone, Copy)]
pub struct Marshaller<'r> {
    registry: &'r NounRegistry,
}

impl<'r> Marshaller<'r> {
    #[must_use]
    pub fn new(registry: &'r NounRegistry) -> Self {
        Self { registry }
    }

    /// Marshal `roots`, all of type `root_type`, resolving references through
    /// `source`.
    pub fn marshal<'s, S, I>(
        &self,
        source: &'s S,
        root_type: &str,
        roots: I,
    ) -> Result<MarshalledSet, NounwireError>
    where
        S: InstanceSource + ?Sized,
        I: IntoIterator<Item = &'s NounInstance>,
    {
        self.registry.plan(root_type)?;

        let mut table: SlotTable<FlatObject> = SlotTable::new();
        let mut schemas = BTreeMap::new();
        let mut item_ids = Vec::new();
        let mut stack: Vec<&'s NounInstance> = Vec::new();

        for root in roots {
            if root.noun_type != root_type {
                return Err(NounwireError::UnknownRuntimeNounType(format!(
                    "{} in a result set of {}",
                    root.noun_type, root_type
                )));
            }
            item_ids.push(root.id.clone());
            if self.reserve(&mut table, &mut schemas, root)? {
                stack.push(root);
            }
        }
        // Roots come off the stack in result order.
        stack.reverse();

        while let Some(instance) = stack.pop() {
            let plan = self.registry.plan(&instance.noun_type)?;
            let flat = match &plan.projection {
                Some(helper) => helper.apply_instance(instance, &plan.id_attr)?,
                None => self.flatten(source, plan, instance, &mut table, &mut schemas, &mut stack)?,
            };
            let handle = table.lookup(&instance.noun_type, &instance.id).ok_or_else(|| {
                NounwireError::SlotConflict(format!(
                    "{}#{} flattened without a reservation",
                    instance.noun_type, instance.id
                ))
            })?;
            table.populate(handle, flat)?;
        }

        let mut noun_values: BTreeMap<String, BTreeMap<String, FlatObject>> = BTreeMap::new();
        for (noun_type, id, flat) in table.into_entries()? {
            let values = noun_values.entry(noun_type).or_default();
            if values.insert(id.key(), flat).is_some() {
                return Err(NounwireError::SlotConflict(format!(
                    "two ids of one type share the key '{}'",
                    id
                )));
            }
        }

        Ok(MarshalledSet {
            noun_type: root_type.to_string(),
            item_ids,
            noun_schemas: schemas,
            noun_values,
        })
    }

    /// Marshal a completed query result. Root ids the result's source cannot
    /// resolve are dangling references.
    pub fn marshal_result(&self, result: &ResultSet) -> Result<MarshalledSet, NounwireError> {
        let source = result.source.as_ref();
        let roots = result
            .item_ids
            .iter()
            .map(|id| {
                source
                    .instance(&result.noun_type, id)
                    .ok_or_else(|| NounwireError::DanglingReference {
                        noun_type: result.noun_type.clone(),
                        id: id.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.marshal(source, &result.noun_type, roots)
    }

    /// Reserve an instance; on first sight record its type's schema.
    fn reserve(
        &self,
        table: &mut SlotTable<FlatObject>,
        schemas: &mut BTreeMap<String, SimplifiedSchema>,
        instance: &NounInstance,
    ) -> Result<bool, NounwireError> {
        let plan = self.registry.plan(&instance.noun_type)?;
        match table.reserve(&instance.noun_type, &instance.id) {
            Reservation::Existing(_) => Ok(false),
            Reservation::Fresh(_) => {
                schemas
                    .entry(plan.noun_type.clone())
                    .or_insert_with(|| plan.schema.clone());
                Ok(true)
            }
        }
    }

    fn flatten<'s, S>(
        &self,
        source: &'s S,
        plan: &NounPlan,
        instance: &NounInstance,
        table: &mut SlotTable<FlatObject>,
        schemas: &mut BTreeMap<String, SimplifiedSchema>,
        stack: &mut Vec<&'s NounInstance>,
    ) -> Result<FlatObject, NounwireError>
    where
        S: InstanceSource + ?Sized,
    {
        let mismatch = |attr: &str, expected| NounwireError::ValueMismatch {
            noun_type: instance.noun_type.clone(),
            attr: attr.to_string(),
            expected,
        };

        let mut flat = FlatObject::new();
        for (key, field) in &plan.fields {
            let raw = instance.get(key).unwrap_or(&AttrValue::Null);
            let value = match field {
                FieldPlan::Plain { singular: true } => match raw {
                    AttrValue::List(_) => return Err(mismatch(key, "a single value")),
                    _ => plain_json(raw).ok_or_else(|| mismatch(key, "a by-value field"))?,
                },
                FieldPlan::Plain { singular: false } => match raw {
                    AttrValue::Null => Value::Array(Vec::new()),
                    AttrValue::List(_) => {
                        plain_json(raw).ok_or_else(|| mismatch(key, "a list of values"))?
                    }
                    _ => return Err(mismatch(key, "a list")),
                },
                FieldPlan::Helper { helper, singular: true } => {
                    helper.apply_value(raw).map_err(|expected| mismatch(key, expected))?
                }
                FieldPlan::Helper { helper, singular: false } => match raw {
                    AttrValue::Null => Value::Array(Vec::new()),
                    AttrValue::List(items) => Value::Array(
                        items
                            .iter()
                            .map(|item| helper.apply_value(item))
                            .collect::<Result<_, _>>()
                            .map_err(|expected| mismatch(key, expected))?,
                    ),
                    _ => return Err(mismatch(key, "a list")),
                },
                FieldPlan::RefOne { target } => match raw {
                    AttrValue::Null => Value::Null,
                    AttrValue::Ref(id) => {
                        self.visit(source, target, id, table, schemas, stack)?;
                        id.to_json()
                    }
                    _ => return Err(mismatch(key, "a reference")),
                },
                FieldPlan::RefMany { target } => match raw {
                    AttrValue::Null => Value::Array(Vec::new()),
                    AttrValue::List(items) => {
                        let mut ids = Vec::with_capacity(items.len());
                        for item in items {
                            let AttrValue::Ref(id) = item else {
                                return Err(mismatch(key, "a list of references"));
                            };
                            self.visit(source, target, id, table, schemas, stack)?;
                            ids.push(id.to_json());
                        }
                        Value::Array(ids)
                    }
                    _ => return Err(mismatch(key, "a list of references")),
                },
            };
            flat.insert(key.clone(), value);
        }
        Ok(flat)
    }

    /// Resolve a referenced instance and queue it if it is new.
    fn visit<'s, S>(
        &self,
        source: &'s S,
        target: &str,
        id: &NounId,
        table: &mut SlotTable<FlatObject>,
        schemas: &mut BTreeMap<String, SimplifiedSchema>,
        stack: &mut Vec<&'s NounInstance>,
    ) -> Result<(), NounwireError>
    where
        S: InstanceSource + ?Sized,
    {
        if table.lookup(target, id).is_some() {
            return Ok(());
        }
        let instance = source
            .instance(target, id)
            .ok_or_else(|| NounwireError::DanglingReference {
                noun_type: target.to_string(),
                id: id.clone(),
            })?;
        if self.reserve(table, schemas, instance)? {
            stack.push(instance);
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{AttributeDescriptor, NounCatalog, NounType};
    use crate::helpers::HelperTable;
    use crate::store::NounStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn people_registry() -> NounRegistry {
        let catalog = NounCatalog::from_types([
            NounType::primitive("string"),
            NounType::entity("person")
                .with_attribute(AttributeDescriptor::singular("name", "string"))
                .with_attribute(AttributeDescriptor::singular("partner", "person"))
                .with_attribute(AttributeDescriptor::plural("friends", "person")),
        ])
        .expect("catalog");
        NounRegistry::new(catalog, HelperTable::new(), ["person"]).expect("registry")
    }

    #[test]
    fn mutual_references_marshal_once_each() {
        let registry = people_registry();
        let a = NounInstance::new("person", 1)
            .with("name", "A")
            .with("partner", AttrValue::reference(2));
        let b = NounInstance::new("person", 2)
            .with("name", "B")
            .with("partner", AttrValue::reference(1));
        let store = NounStore::from_instances([a.clone(), b]);

        let set = Marshaller::new(&registry)
            .marshal(&store, "person", [&a])
            .expect("marshal");

        assert_eq!(set.item_ids, vec![NounId::Int(1)]);
        assert_eq!(set.entry_count(), 2);
        assert_eq!(set.value("person", &NounId::Int(1)).expect("a")["partner"], json!(2));
        assert_eq!(set.value("person", &NounId::Int(2)).expect("b")["partner"], json!(1));
        assert_eq!(set.value("person", &NounId::Int(2)).expect("b")["friends"], json!([]));
    }

    #[test]
    fn self_reference_terminates() {
        let registry = people_registry();
        let me = NounInstance::new("person", 5).with("friends", AttrValue::references([5, 5]));
        let store = NounStore::from_instances([me.clone()]);
        let set = Marshaller::new(&registry)
            .marshal(&store, "person", [&me])
            .expect("marshal");
        assert_eq!(set.entry_count(), 1);
        assert_eq!(set.value("person", &NounId::Int(5)).expect("me")["friends"], json!([5, 5]));
        assert_eq!(set.value("person", &NounId::Int(5)).expect("me")["partner"], Value::Null);
    }

    #[test]
    fn dangling_reference_is_an_error() {
        let registry = people_registry();
        let lonely = NounInstance::new("person", 1).with("partner", AttrValue::reference(99));
        let store = NounStore::from_instances([lonely.clone()]);
        let result = Marshaller::new(&registry).marshal(&store, "person", [&lonely]);
        assert!(matches!(
            result,
            Err(NounwireError::DanglingReference { id: NounId::Int(99), .. })
        ));
    }

    #[test]
    fn wrong_shape_is_a_mismatch() {
        let registry = people_registry();
        let odd = NounInstance::new("person", 1).with("partner", "not a ref");
        let store = NounStore::from_instances([odd.clone()]);
        let result = Marshaller::new(&registry).marshal(&store, "person", [&odd]);
        assert!(matches!(result, Err(NounwireError::ValueMismatch { .. })));
    }

    #[test]
    fn plain_fields_must_match_their_cardinality() {
        let catalog = NounCatalog::from_types([
            NounType::primitive("string"),
            NounType::entity("memo")
                .with_attribute(AttributeDescriptor::singular("title", "string"))
                .with_attribute(AttributeDescriptor::plural("labels", "string")),
        ])
        .expect("catalog");
        let registry = NounRegistry::new(catalog, HelperTable::new(), ["memo"]).expect("registry");
        let marshal = |memo: NounInstance| {
            let store = NounStore::from_instances([memo.clone()]);
            Marshaller::new(&registry).marshal(&store, "memo", [&memo])
        };

        let scalar_in_plural = NounInstance::new("memo", 1).with("labels", "solo");
        assert!(matches!(
            marshal(scalar_in_plural),
            Err(NounwireError::ValueMismatch { .. })
        ));

        let list_in_singular = NounInstance::new("memo", 1)
            .with("title", AttrValue::List(vec![AttrValue::from("a")]));
        assert!(matches!(
            marshal(list_in_singular),
            Err(NounwireError::ValueMismatch { .. })
        ));

        let well_formed = NounInstance::new("memo", 1)
            .with("title", "Plan")
            .with("labels", AttrValue::List(vec![AttrValue::from("a"), AttrValue::from("b")]));
        let set = marshal(well_formed).expect("marshal");
        let flat = set.value("memo", &NounId::Int(1)).expect("memo");
        assert_eq!(flat["title"], json!("Plan"));
        assert_eq!(flat["labels"], json!(["a", "b"]));
    }

    #[test]
    fn empty_result() {
        let registry = people_registry();
        let store = NounStore::new();
        let set = Marshaller::new(&registry)
            .marshal(&store, "person", std::iter::empty())
            .expect("marshal");
        assert_eq!(set, MarshalledSet::empty("person"));
        assert!(matches!(
            Marshaller::new(&registry).marshal(&store, "ghost", std::iter::empty()),
            Err(NounwireError::UnknownRuntimeNounType(_))
        ));
    }

    #[test]
    fn mail_message_uses_helpers_and_projections() {
        let registry = NounRegistry::mail().expect("registry");
        let date = Utc.with_ymd_and_hms(2010, 3, 1, 12, 0, 0).single().expect("date");
        let msg = NounInstance::new("message", 1)
            .with("subject", "Hi")
            .with("date", date)
            .with("tags", AttrValue::references(["$label1"]))
            .with("folder", AttrValue::reference(3));
        let store = NounStore::from_instances([
            msg.clone(),
            NounInstance::new("tag", "$label1").with("tag", "Important"),
            NounInstance::new("folder", 3)
                .with("name", "Inbox")
                .with("accountLabel", "work"),
        ]);

        let set = Marshaller::new(&registry)
            .marshal(&store, "message", [&msg])
            .expect("marshal");

        let flat = set.value("message", &NounId::Int(1)).expect("message");
        assert_eq!(flat["date"], json!(1_267_444_800_000_i64));
        assert_eq!(flat["tags"], json!(["$label1"]));
        assert_eq!(flat["to"], json!([]));
        assert_eq!(flat["from"], Value::Null);
        assert!(!flat.contains_key("fulltextMatches"));

        assert_eq!(
            set.value("tag", &NounId::from("$label1")).expect("tag"),
            &FlatObject::from([
                ("key".to_string(), json!("$label1")),
                ("tag".to_string(), json!("Important")),
            ])
        );
        assert_eq!(set.value("folder", &NounId::Int(3)).expect("folder")["id"], json!(3));
        assert!(set.noun_schemas.contains_key("tag"));
        assert!(!set.noun_schemas.contains_key("identity"));
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let set = MarshalledSet::empty("contact");
        let json = serde_json::to_value(&set).expect("serialize");
        assert_eq!(
            json,
            json!({"nounType": "contact", "itemIds": [], "nounSchemas": {}, "nounValues": {}})
        );
    }
}
