//! # Noun Store
//!
//! In-memory arena of materialized instances.
//!
//! The marshaller never follows pointers: references are `(type, id)` pairs
//! resolved through `InstanceSource`, which lets a result graph hold cycles
//! without shared ownership.

use crate::catalog::NounCatalog;
use crate::primitives::NOUN_DATE;
use crate::schema::{SchemaAttr, SchemaDescriber};
use crate::{AttrValue, NounId, NounInstance, NounwireError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// Resolves a reference to the instance it names.
pub trait InstanceSource {
    fn instance(&self, noun_type: &str, id: &NounId) -> Option<&NounInstance>;
}

/// Instances grouped by type, then id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NounStore {
    instances: BTreeMap<String, BTreeMap<NounId, NounInstance>>,
}

impl NounStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an instance, returning the one it replaced.
    pub fn insert(&mut self, instance: NounInstance) -> Option<NounInstance> {
        self.instances
            .entry(instance.noun_type.clone())
            .or_default()
            .insert(instance.id.clone(), instance)
    }

    /// Build a store from a list of instances.
    pub fn from_instances(instances: impl IntoIterator<Item = NounInstance>) -> Self {
        let mut store = Self::new();
        for instance in instances {
            store.insert(instance);
        }
        store
    }

    #[must_use]
    pub fn get(&self, noun_type: &str, id: &NounId) -> Option<&NounInstance> {
        self.instances.get(noun_type).and_then(|m| m.get(id))
    }

    /// All instances of one type, in id order.
    pub fn instances_of<'a>(&'a self, noun_type: &str) -> impl Iterator<Item = &'a NounInstance> + 'a {
        self.instances
            .get(noun_type)
            .into_iter()
            .flat_map(|m| m.values())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load a JSON dataset shaped `{ "<type>": [ { "<idAttr>": id, ... } ] }`.
    ///
    /// Each field is converted according to the type's simplified schema:
    /// reference fields become `Ref`s, date fields accept epoch milliseconds
    /// or RFC 3339 strings, everything else is taken by value. Fields outside
    /// the schema are kept by value.
    pub fn load_json(catalog: &NounCatalog, dataset: &Value) -> Result<Self, NounwireError> {
        let groups = dataset.as_object().ok_or_else(|| {
            NounwireError::Serialization("dataset must be an object keyed by noun type".into())
        })?;

        let describer = SchemaDescriber::new(catalog);
        let mut store = Self::new();

        for (noun_name, records) in groups {
            let noun = catalog
                .get(noun_name)
                .filter(|n| n.is_entity())
                .ok_or_else(|| NounwireError::UnknownRuntimeNounType(noun_name.clone()))?;
            let schema = describer.describe(noun)?;
            let records = records.as_array().ok_or_else(|| {
                NounwireError::Serialization(format!("'{}' must hold an array", noun_name))
            })?;

            for record in records {
                let fields = record.as_object().ok_or_else(|| {
                    NounwireError::Serialization(format!("'{}' records must be objects", noun_name))
                })?;
                let id = fields
                    .get(&noun.id_attr)
                    .and_then(NounId::from_json)
                    .ok_or_else(|| {
                        NounwireError::Serialization(format!(
                            "'{}' record without a usable '{}'",
                            noun_name, noun.id_attr
                        ))
                    })?;

                let mut instance = NounInstance::new(noun_name.clone(), id);
                for (key, raw) in fields {
                    if *key == noun.id_attr && !schema.contains_key(key) {
                        continue;
                    }
                    let value = match schema.get(key) {
                        Some(attr) => convert_field(noun_name, key, attr, raw)?,
                        None => AttrValue::from_json(raw),
                    };
                    instance.set(key.clone(), value);
                }
                store.insert(instance);
            }
        }

        Ok(store)
    }
}

impl InstanceSource for NounStore {
    fn instance(&self, noun_type: &str, id: &NounId) -> Option<&NounInstance> {
        self.get(noun_type, id)
    }
}

fn convert_field(
    noun: &str,
    key: &str,
    attr: &SchemaAttr,
    raw: &Value,
) -> Result<AttrValue, NounwireError> {
    let mismatch = |expected| NounwireError::ValueMismatch {
        noun_type: noun.to_string(),
        attr: key.to_string(),
        expected,
    };

    let one = |value: &Value| -> Result<AttrValue, NounwireError> {
        if value.is_null() {
            return Ok(AttrValue::Null);
        }
        if attr.reference {
            return NounId::from_json(value)
                .map(AttrValue::Ref)
                .ok_or_else(|| mismatch("an id"));
        }
        if attr.noun_type == NOUN_DATE {
            return parse_date(value).ok_or_else(|| mismatch("a date"));
        }
        Ok(AttrValue::from_json(value))
    };

    match (attr.singular, raw) {
        (true, value) => one(value),
        (false, Value::Null) => Ok(AttrValue::Null),
        (false, Value::Array(items)) => items.iter().map(one).collect::<Result<_, _>>().map(AttrValue::List),
        (false, _) => Err(mismatch("a list")),
    }
}

fn parse_date(value: &Value) -> Option<AttrValue> {
    let date = match value {
        Value::Number(n) => DateTime::<Utc>::from_timestamp_millis(n.as_i64()?)?,
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.to_utc(),
        _ => return None,
    };
    Some(AttrValue::Date(date))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::mail_catalog;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn insert_and_resolve() {
        let mut store = NounStore::new();
        assert!(store.insert(NounInstance::new("contact", 1)).is_none());
        assert!(store.insert(NounInstance::new("contact", 1).with("name", "x")).is_some());
        assert_eq!(store.len(), 1);
        assert!(store.instance("contact", &NounId::Int(1)).is_some());
        assert!(store.instance("identity", &NounId::Int(1)).is_none());
    }

    #[test]
    fn load_json_converts_by_schema() {
        let dataset = json!({
            "message": [{
                "id": 1,
                "subject": "Hi",
                "date": "2010-03-01T12:00:00Z",
                "from": 10,
                "to": [10, 11],
                "folder": null,
                "attachmentTypes": ["image/png"],
                "x-extra": {"k": 1}
            }],
            "identity": [
                {"id": 10, "value": "ann@example.com"},
                {"id": 11, "value": "bob@example.com"}
            ]
        });
        let store = NounStore::load_json(&mail_catalog(), &dataset).expect("load");
        assert_eq!(store.len(), 3);

        let msg = store.get("message", &NounId::Int(1)).expect("message");
        assert_eq!(msg.get("from"), Some(&AttrValue::Ref(NounId::Int(10))));
        assert_eq!(msg.get("to"), Some(&AttrValue::references([10, 11])));
        assert_eq!(msg.get("folder"), Some(&AttrValue::Null));
        assert_eq!(
            msg.get("date"),
            Some(&AttrValue::Date(
                Utc.with_ymd_and_hms(2010, 3, 1, 12, 0, 0).single().expect("date")
            ))
        );
        assert!(matches!(msg.get("x-extra"), Some(AttrValue::Json(_))));
        assert!(msg.get("id").is_none());
    }

    #[test]
    fn load_json_uses_type_id_attr() {
        let dataset = json!({"tag": [{"key": "$label1", "tag": "Important"}]});
        let store = NounStore::load_json(&mail_catalog(), &dataset).expect("load");
        let tag = store.get("tag", &NounId::from("$label1")).expect("tag");
        assert_eq!(tag.get("key"), Some(&AttrValue::from("$label1")));
    }

    #[test]
    fn load_json_rejects_bad_shapes() {
        let catalog = mail_catalog();
        assert!(NounStore::load_json(&catalog, &json!([])).is_err());
        assert!(matches!(
            NounStore::load_json(&catalog, &json!({"calendar": []})),
            Err(NounwireError::UnknownRuntimeNounType(_))
        ));
        assert!(NounStore::load_json(&catalog, &json!({"contact": [{"name": "no id"}]})).is_err());
        assert!(matches!(
            NounStore::load_json(&catalog, &json!({"message": [{"id": 1, "to": 5}]})),
            Err(NounwireError::ValueMismatch { .. })
        ));
    }
}
