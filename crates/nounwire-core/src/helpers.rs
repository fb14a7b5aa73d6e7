//! # Marshal Helpers
//!
//! Transforms for noun types that are not self-describing on the wire.
//!
//! The helper table is an explicit value built at startup and handed to the
//! registry and the query proxy builder. There is no global lookup.

use crate::marshal::FlatObject;
use crate::primitives::{NOUN_ATTACHMENT, NOUN_DATE, NOUN_FOLDER, NOUN_TAG};
use crate::{AttrValue, NounInstance, NounwireError};
use chrono::DateTime;
use serde_json::Value;
use std::collections::BTreeMap;

/// A registered transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalHelper {
    /// Date to epoch milliseconds. No inverse is applied on unmarshal.
    EpochMillis,
    /// Self-describing payload emitted as its own JSON.
    JsonPayload,
    /// Entity projected to a fixed field list instead of its full schema.
    /// A field equal to the type's id accessor yields the instance id.
    Project(Vec<String>),
}

impl MarshalHelper {
    /// Value helpers transform primitive attribute values; `Project` applies
    /// to whole entity instances.
    #[must_use]
    pub fn is_value_helper(&self) -> bool {
        matches!(self, Self::EpochMillis | Self::JsonPayload)
    }

    /// Transform one primitive value. On mismatch, returns the expected shape.
    pub fn apply_value(&self, value: &AttrValue) -> Result<Value, &'static str> {
        match (self, value) {
            (_, AttrValue::Null) => Ok(Value::Null),
            (Self::EpochMillis, AttrValue::Date(date)) => Ok(Value::from(date.timestamp_millis())),
            (Self::EpochMillis, AttrValue::Number(n)) => Ok(Value::Number(n.clone())),
            (Self::EpochMillis, _) => Err("a date"),
            (Self::JsonPayload, other) => plain_json(other).ok_or("a by-value payload"),
            (Self::Project(_), _) => Err("an entity instance"),
        }
    }

    /// Project an entity instance to a flat object.
    pub fn apply_instance(
        &self,
        instance: &NounInstance,
        id_attr: &str,
    ) -> Result<FlatObject, NounwireError> {
        let Self::Project(fields) = self else {
            return Err(NounwireError::SchemaConfig(format!(
                "helper {:?} cannot project '{}' instances",
                self, instance.noun_type
            )));
        };

        let mut out = FlatObject::new();
        for field in fields {
            let value = if field == id_attr {
                instance.id.to_json()
            } else {
                match instance.get(field) {
                    None => Value::Null,
                    Some(raw) => plain_json(raw).ok_or_else(|| NounwireError::ValueMismatch {
                        noun_type: instance.noun_type.clone(),
                        attr: field.clone(),
                        expected: "a by-value field",
                    })?,
                }
            };
            out.insert(field.clone(), value);
        }
        Ok(out)
    }

    /// Transform one client-side query argument.
    pub fn apply_arg(&self, arg: &Value) -> Result<Value, String> {
        match (self, arg) {
            (Self::EpochMillis, Value::Null | Value::Number(_)) => Ok(arg.clone()),
            (Self::EpochMillis, Value::String(text)) => DateTime::parse_from_rfc3339(text)
                .map(|date| Value::from(date.timestamp_millis()))
                .map_err(|e| format!("'{}' is not an RFC 3339 date: {}", text, e)),
            (Self::EpochMillis, other) => Err(format!("{} is not a date", other)),
            (Self::JsonPayload, _) => Ok(arg.clone()),
            (Self::Project(_), _) => Err("projection helpers do not transform arguments".into()),
        }
    }
}

/// By-value JSON form of a raw attribute value. `None` if the value holds a
/// reference anywhere.
#[must_use]
pub fn plain_json(value: &AttrValue) -> Option<Value> {
    Some(match value {
        AttrValue::Null => Value::Null,
        AttrValue::Bool(b) => Value::Bool(*b),
        AttrValue::Number(n) => Value::Number(n.clone()),
        AttrValue::Text(s) => Value::String(s.clone()),
        AttrValue::Date(d) => Value::String(d.to_rfc3339()),
        AttrValue::Json(v) => v.clone(),
        AttrValue::Ref(_) => return None,
        AttrValue::List(items) => Value::Array(items.iter().map(plain_json).collect::<Option<_>>()?),
    })
}

// =============================================================================
// HELPER TABLE
// =============================================================================

/// Noun type name to helper.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelperTable {
    helpers: BTreeMap<String, MarshalHelper>,
}

impl HelperTable {
    /// An empty table: every primitive is copied as-is.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Helpers for the mail object model.
    #[must_use]
    pub fn standard() -> Self {
        let project = |fields: &[&str]| {
            MarshalHelper::Project(fields.iter().map(|f| (*f).to_string()).collect())
        };

        let mut table = Self::new();
        table.insert(NOUN_DATE, MarshalHelper::EpochMillis);
        table.insert(NOUN_ATTACHMENT, MarshalHelper::JsonPayload);
        table.insert(NOUN_TAG, project(&["key", "tag"]));
        table.insert(NOUN_FOLDER, project(&["id", "name", "accountLabel"]));
        table
    }

    /// Register or replace the helper for a noun type.
    pub fn insert(&mut self, noun_type: impl Into<String>, helper: MarshalHelper) {
        self.helpers.insert(noun_type.into(), helper);
    }

    #[must_use]
    pub fn get(&self, noun_type: &str) -> Option<&MarshalHelper> {
        self.helpers.get(noun_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MarshalHelper)> {
        self.helpers.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// =============================================================================
// TESTS
// =============================================================================
