//! # Unmarshaller
//!
//! Rebuilds an object graph from a `MarshalledSet`.
//!
//! The graph is an arena: every `(type, id)` becomes exactly one
//! `RebuiltObject`, and every reference to it, from any field of any object,
//! is the same `ObjectRef`. Cycles on the wire become cycles of indices.

use crate::marshal::MarshalledSet;
use crate::schema::SchemaAttr;
use crate::slots::{Reservation, SlotTable};
use crate::{NounId, NounwireError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Index;

// =============================================================================
// OBJECT GRAPH
// =============================================================================

/// Index of a rebuilt object in its `ObjectGraph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectRef(usize);

impl ObjectRef {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// One rebuilt field.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Deep copy of the wire value.
    Value(Value),
    /// Singular reference, `None` for a null reference.
    Ref(Option<ObjectRef>),
    /// Plural reference, in wire order.
    Refs(Vec<ObjectRef>),
}

/// A reconstructed instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuiltObject {
    pub noun_type: String,
    pub id: NounId,
    pub fields: BTreeMap<String, Field>,
}

impl RebuiltObject {
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// A by-value field.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        match self.fields.get(key) {
            Some(Field::Value(value)) => Some(value),
            _ => None,
        }
    }

    /// A singular reference field that is not null.
    #[must_use]
    pub fn reference(&self, key: &str) -> Option<ObjectRef> {
        match self.fields.get(key) {
            Some(Field::Ref(target)) => *target,
            _ => None,
        }
    }

    /// A plural reference field; empty when absent.
    #[must_use]
    pub fn references(&self, key: &str) -> &[ObjectRef] {
        match self.fields.get(key) {
            Some(Field::Refs(targets)) => targets,
            _ => &[],
        }
    }

    /// Read a field marshalled as epoch milliseconds back as a date.
    #[must_use]
    pub fn date_field(&self, key: &str) -> Option<DateTime<Utc>> {
        self.value(key)
            .and_then(Value::as_i64)
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }

    /// `{idAttr: id}`, usable as an argument to a reference-typed constraint.
    #[must_use]
    pub fn as_query_arg(&self, id_attr: &str) -> Value {
        let mut arg = serde_json::Map::new();
        arg.insert(id_attr.to_string(), self.id.to_json());
        Value::Object(arg)
    }
}

/// Arena of rebuilt objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectGraph {
    objects: Vec<RebuiltObject>,
    /// Type name to `nounValues` key to object.
    index: BTreeMap<String, BTreeMap<String, ObjectRef>>,
}

impl ObjectGraph {
    #[must_use]
    pub fn get(&self, object: ObjectRef) -> Option<&RebuiltObject> {
        self.objects.get(object.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectRef, &RebuiltObject)> {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, object)| (ObjectRef(i), object))
    }

    /// Find the object rebuilt for `(noun_type, id)`.
    #[must_use]
    pub fn find(&self, noun_type: &str, id: &NounId) -> Option<ObjectRef> {
        self.index
            .get(noun_type)
            .and_then(|ids| ids.get(&id.key()))
            .copied()
    }
}

impl Index<ObjectRef> for ObjectGraph {
    type Output = RebuiltObject;

    fn index(&self, object: ObjectRef) -> &RebuiltObject {
        &self.objects[object.0]
    }
}

/// Result of unmarshalling: the graph and its roots in `itemIds` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Unmarshalled {
    pub noun_type: String,
    pub graph: ObjectGraph,
    pub roots: Vec<ObjectRef>,
}

impl Unmarshalled {
    /// Root objects in result order, duplicates included.
    pub fn root_objects(&self) -> impl Iterator<Item = &RebuiltObject> {
        self.roots.iter().map(|r| &self.graph[*r])
    }
}

// =============================================================================
// UNMARSHALLER
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct Unmarshaller;

impl Unmarshaller {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub fn unmarshal(&self, set: &MarshalledSet) -> Result<Unmarshalled, NounwireError> {
        let mut table: SlotTable<RebuiltObject> = SlotTable::new();
        let mut stack: Vec<(String, NounId)> = Vec::new();
        let mut roots = Vec::with_capacity(set.item_ids.len());

        for id in &set.item_ids {
            roots.push(ensure_reserved(&mut table, &mut stack, &set.noun_type, id));
        }
        stack.reverse();

        while let Some((noun_type, id)) = stack.pop() {
            let schema = set.noun_schemas.get(&noun_type).ok_or_else(|| {
                NounwireError::InconsistentSet(format!("no schema for '{}'", noun_type))
            })?;
            let flat = set.value(&noun_type, &id).ok_or_else(|| {
                NounwireError::InconsistentSet(format!("no value for {}#{}", noun_type, id))
            })?;

            // The schema decides the shape; wire keys it does not list are dropped.
            let mut fields = BTreeMap::new();
            for (key, attr) in schema {
                let raw = flat.get(key).unwrap_or(&Value::Null);
                let field = match (attr.reference, attr.singular, raw) {
                    (true, _, _) => rebuild_reference(&mut table, &mut stack, attr, key, raw)?,
                    (false, false, Value::Null) => Field::Value(Value::Array(Vec::new())),
                    (false, _, _) => Field::Value(raw.clone()),
                };
                fields.insert(key.clone(), field);
            }

            let handle = table.lookup(&noun_type, &slot_key(&id)).ok_or_else(|| {
                NounwireError::SlotConflict(format!("{}#{} built without a reservation", noun_type, id))
            })?;
            table.populate(
                handle,
                RebuiltObject {
                    noun_type,
                    id,
                    fields,
                },
            )?;
        }

        let mut graph = ObjectGraph::default();
        for (position, (noun_type, key, object)) in table.into_entries()?.into_iter().enumerate() {
            graph
                .index
                .entry(noun_type)
                .or_default()
                .insert(key.key(), ObjectRef(position));
            graph.objects.push(object);
        }

        Ok(Unmarshalled {
            noun_type: set.noun_type.clone(),
            graph,
            roots,
        })
    }
}

/// `1` and `"1"` name the same `nounValues` entry, so they share a slot.
fn slot_key(id: &NounId) -> NounId {
    NounId::Text(id.key())
}

fn ensure_reserved(
    table: &mut SlotTable<RebuiltObject>,
    stack: &mut Vec<(String, NounId)>,
    noun_type: &str,
    id: &NounId,
) -> ObjectRef {
    let reservation = table.reserve(noun_type, &slot_key(id));
    if let Reservation::Fresh(_) = reservation {
        stack.push((noun_type.to_string(), id.clone()));
    }
    ObjectRef(reservation.handle().index())
}

fn rebuild_reference(
    table: &mut SlotTable<RebuiltObject>,
    stack: &mut Vec<(String, NounId)>,
    attr: &SchemaAttr,
    key: &str,
    raw: &Value,
) -> Result<Field, NounwireError> {
    let bad_id = |value: &Value| {
        NounwireError::InconsistentSet(format!("'{}' holds {} where an id belongs", key, value))
    };

    if attr.singular {
        return match raw {
            Value::Null => Ok(Field::Ref(None)),
            other => {
                let id = NounId::from_json(other).ok_or_else(|| bad_id(other))?;
                Ok(Field::Ref(Some(ensure_reserved(table, stack, &attr.noun_type, &id))))
            }
        };
    }

    match raw {
        Value::Null => Ok(Field::Refs(Vec::new())),
        Value::Array(items) => {
            let mut targets = Vec::with_capacity(items.len());
            for item in items {
                let id = NounId::from_json(item).ok_or_else(|| bad_id(item))?;
                targets.push(ensure_reserved(table, stack, &attr.noun_type, &id));
            }
            Ok(Field::Refs(targets))
        }
        other => Err(bad_id(other)),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::FlatObject;
    use crate::schema::SimplifiedSchema;
    use serde_json::json;

    fn set_from(value: Value) -> MarshalledSet {
        serde_json::from_value(value).expect("set")
    }

    fn pair_set() -> MarshalledSet {
        set_from(json!({
            "nounType": "person",
            "itemIds": [1, 1],
            "nounSchemas": {
                "person": {
                    "name": {"reference": false, "nounType": "string", "singular": true},
                    "partner": {"reference": true, "nounType": "person", "singular": true},
                    "friends": {"reference": true, "nounType": "person", "singular": false}
                }
            },
            "nounValues": {
                "person": {
                    "1": {"name": "A", "partner": 2, "friends": [2, 1]},
                    "2": {"name": "B", "partner": 1, "friends": null}
                }
            }
        }))
    }

    #[test]
    fn cycles_share_object_refs() {
        let out = Unmarshaller::new().unmarshal(&pair_set()).expect("unmarshal");
        assert_eq!(out.graph.len(), 2);
        assert_eq!(out.roots.len(), 2);
        assert_eq!(out.roots[0], out.roots[1]);

        let a = &out.graph[out.roots[0]];
        let b_ref = a.reference("partner").expect("partner");
        let b = &out.graph[b_ref];
        assert_eq!(b.value("name"), Some(&json!("B")));
        assert_eq!(b.reference("partner"), Some(out.roots[0]));
        assert_eq!(a.references("friends"), &[b_ref, out.roots[0]]);
        assert!(b.references("friends").is_empty());
    }

    #[test]
    fn missing_value_is_inconsistent() {
        let mut set = pair_set();
        set.noun_values
            .get_mut("person")
            .expect("person")
            .remove("2");
        assert!(matches!(
            Unmarshaller::new().unmarshal(&set),
            Err(NounwireError::InconsistentSet(_))
        ));
    }

    #[test]
    fn missing_schema_is_inconsistent() {
        let mut set = pair_set();
        set.noun_schemas.clear();
        assert!(matches!(
            Unmarshaller::new().unmarshal(&set),
            Err(NounwireError::InconsistentSet(_))
        ));
    }

    #[test]
    fn non_id_reference_is_inconsistent() {
        let mut set = pair_set();
        set.noun_values
            .get_mut("person")
            .and_then(|p| p.get_mut("2"))
            .expect("b")
            .insert("partner".into(), json!({"id": 1}));
        assert!(Unmarshaller::new().unmarshal(&set).is_err());
    }

    #[test]
    fn values_are_deep_copied_and_dates_stay_numbers() {
        let mut schema = SimplifiedSchema::new();
        schema.insert("date".into(), SchemaAttr::primitive("date", true));
        schema.insert("infos".into(), SchemaAttr::primitive("attachment-infos", false));
        let mut set = MarshalledSet::empty("message");
        set.item_ids.push(NounId::Int(1));
        set.noun_schemas.insert("message".into(), schema);
        set.noun_values.entry("message".into()).or_default().insert(
            "1".into(),
            [
                ("date".to_string(), json!(1_267_444_800_000_i64)),
                ("infos".to_string(), json!([{"name": "a.png", "size": 10}])),
            ]
            .into_iter()
            .collect(),
        );

        let out = Unmarshaller::new().unmarshal(&set).expect("unmarshal");
        let msg = out.root_objects().next().expect("root");
        assert_eq!(msg.value("date"), Some(&json!(1_267_444_800_000_i64)));
        assert_eq!(
            msg.date_field("date").map(|d| d.to_rfc3339()),
            Some("2010-03-01T12:00:00+00:00".to_string())
        );
        assert_eq!(msg.value("infos"), Some(&json!([{"name": "a.png", "size": 10}])));
        assert_eq!(msg.as_query_arg("id"), json!({"id": 1}));
    }

    #[test]
    fn int_and_text_ids_with_one_key_are_one_object() {
        let set = set_from(json!({
            "nounType": "person",
            "itemIds": [2],
            "nounSchemas": {
                "person": {
                    "partner": {"reference": true, "nounType": "person", "singular": true}
                }
            },
            "nounValues": {"person": {"2": {"partner": "2"}}}
        }));
        let out = Unmarshaller::new().unmarshal(&set).expect("unmarshal");
        assert_eq!(out.graph.len(), 1);
        assert_eq!(out.graph[out.roots[0]].reference("partner"), Some(out.roots[0]));
        assert_eq!(out.graph.find("person", &NounId::from("2")), Some(out.roots[0]));
    }

    #[test]
    fn schema_decides_the_rebuilt_fields() {
        let mut set = pair_set();
        set.item_ids = vec![NounId::Int(3)];
        set.noun_values.entry("person".into()).or_default().insert(
            "3".into(),
            [
                ("name".to_string(), json!("C")),
                ("smuggled".to_string(), json!({"nested": 1})),
            ]
            .into_iter()
            .collect(),
        );

        let out = Unmarshaller::new().unmarshal(&set).expect("unmarshal");
        let c = &out.graph[out.roots[0]];
        assert_eq!(
            c.fields.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["friends", "name", "partner"]
        );
        assert_eq!(c.get("partner"), Some(&Field::Ref(None)));
        assert_eq!(c.get("friends"), Some(&Field::Refs(Vec::new())));
        assert!(c.get("smuggled").is_none());
    }

    #[test]
    fn absent_by_value_fields_default_by_cardinality() {
        let mut schema = SimplifiedSchema::new();
        schema.insert("subject".into(), SchemaAttr::primitive("string", true));
        schema.insert("labels".into(), SchemaAttr::primitive("string", false));
        let mut set = MarshalledSet::empty("memo");
        set.item_ids.push(NounId::Int(1));
        set.noun_schemas.insert("memo".into(), schema);
        set.noun_values
            .entry("memo".into())
            .or_default()
            .insert("1".into(), FlatObject::new());

        let out = Unmarshaller::new().unmarshal(&set).expect("unmarshal");
        let memo = out.root_objects().next().expect("root");
        assert_eq!(memo.value("subject"), Some(&Value::Null));
        assert_eq!(memo.value("labels"), Some(&json!([])));
    }

    #[test]
    fn find_uses_the_wire_key() {
        let out = Unmarshaller::new().unmarshal(&pair_set()).expect("unmarshal");
        let b = out.graph.find("person", &NounId::Int(2)).expect("b");
        assert_eq!(out.graph[b].value("name"), Some(&json!("B")));
        assert_eq!(out.graph.find("person", &NounId::from("1")), Some(out.roots[0]));
        assert!(out.graph.find("person", &NounId::Int(9)).is_none());
        assert!(out.graph.find("contact", &NounId::Int(1)).is_none());
    }

    #[test]
    fn empty_set() {
        let out = Unmarshaller::new()
            .unmarshal(&MarshalledSet::empty("contact"))
            .expect("unmarshal");
        assert!(out.graph.is_empty());
        assert!(out.roots.is_empty());
    }
}
