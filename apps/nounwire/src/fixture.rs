//! # Store Provider
//!
//! A `NounProvider` over an in-memory `NounStore`. Queries are evaluated
//! synchronously and complete before `run_query` returns.
//!
//! Constraint semantics:
//! - Equality: any argument equals the value, or one element of a list value
//! - Range: inclusive `[low, high]`, a `null` bound is open
//! - Like: case-insensitive, `%` matches any run of characters
//! - Fulltext attributes match a substring of any text attribute
//! - Parameterized identities match any identity reference
//!
//! References compare by id and dates by epoch milliseconds, the same forms
//! the client sends.

use nounwire_core::primitives::{NOUN_FULLTEXT, NOUN_IDENTITY, NOUN_PARAM_IDENTITY};
use nounwire_core::{
    AttrValue, Constraint, ConstraintOp, NounCatalog, NounId, NounInstance, NounProvider,
    NounQuery, NounStore, NounType, NounwireError, QueryHandle, QueryListener, ResultSet,
    mail_catalog,
};
use serde_json::{Value, json};
use std::cmp::Ordering;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{self, AtomicU64};

pub struct StoreProvider {
    catalog: NounCatalog,
    store: Arc<NounStore>,
    next_handle: AtomicU64,
}

impl StoreProvider {
    pub fn new(catalog: NounCatalog, store: NounStore) -> Self {
        Self {
            catalog,
            store: Arc::new(store),
            next_handle: AtomicU64::new(1),
        }
    }

    /// The mail catalog over [`sample_dataset`].
    pub fn mail_sample() -> Result<Self, NounwireError> {
        let catalog = mail_catalog();
        let store = NounStore::load_json(&catalog, &sample_dataset())?;
        Ok(Self::new(catalog, store))
    }

    /// The mail catalog over a JSON dataset file.
    pub fn from_dataset_file(path: &Path) -> Result<Self, NounwireError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            NounwireError::Io(format!("cannot read dataset {}: {}", path.display(), e))
        })?;
        let dataset: Value = serde_json::from_str(&text).map_err(|e| {
            NounwireError::Serialization(format!("invalid dataset {}: {}", path.display(), e))
        })?;
        let catalog = mail_catalog();
        let store = NounStore::load_json(&catalog, &dataset)?;
        Ok(Self::new(catalog, store))
    }

    pub fn store(&self) -> &NounStore {
        &self.store
    }

    /// Ids of the instances that satisfy `query`, ordered and limited.
    pub fn evaluate(&self, query: &NounQuery) -> Result<Vec<NounId>, NounwireError> {
        let noun = self
            .catalog
            .get(&query.noun)
            .filter(|n| n.is_entity())
            .ok_or_else(|| NounwireError::UnknownNounName(query.noun.clone()))?;

        let mut hits: Vec<&NounInstance> = self
            .store
            .instances_of(&query.noun)
            .filter(|instance| {
                query
                    .constraints
                    .iter()
                    .all(|constraint| satisfies(noun, instance, constraint))
            })
            .collect();

        if !query.order_by.is_empty() {
            hits.sort_by(|a, b| compare_instances(a, b, &query.order_by));
        }
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits.into_iter().map(|instance| instance.id.clone()).collect())
    }
}

impl NounProvider for StoreProvider {
    fn catalog(&self) -> &NounCatalog {
        &self.catalog
    }

    fn run_query(
        &self,
        query: NounQuery,
        mut listener: Box<dyn QueryListener>,
    ) -> Result<QueryHandle, NounwireError> {
        let handle = QueryHandle(self.next_handle.fetch_add(1, atomic::Ordering::Relaxed));
        let ids = self.evaluate(&query)?;
        tracing::debug!(
            handle = handle.0,
            noun = %query.noun,
            constraints = query.constraints.len(),
            hits = ids.len(),
            "query evaluated"
        );

        listener.on_items_added(&ids);
        let source = Arc::clone(&self.store);
        listener.on_query_completed(Ok(ResultSet::new(query.noun, ids, source)));
        Ok(handle)
    }
}

// =============================================================================
// CONSTRAINTS
// =============================================================================

fn satisfies(noun: &NounType, instance: &NounInstance, constraint: &Constraint) -> bool {
    let target = noun
        .attribute(&constraint.attr)
        .map(|attr| attr.target.as_str());

    if target == Some(NOUN_FULLTEXT) {
        return constraint
            .args
            .iter()
            .filter_map(Value::as_str)
            .any(|needle| fulltext_match(instance, needle));
    }
    if target == Some(NOUN_PARAM_IDENTITY) {
        return constraint
            .args
            .iter()
            .any(|arg| involves_identity(noun, instance, arg));
    }

    let Some(value) = instance.get(&constraint.attr) else {
        return false;
    };
    let values = elements(value);

    match constraint.op {
        ConstraintOp::Equals => constraint
            .args
            .iter()
            .any(|arg| values.iter().any(|v| wire_value(v).as_ref() == Some(arg))),
        ConstraintOp::Range => constraint.args.iter().any(|arg| match arg {
            Value::Array(bounds) if bounds.len() == 2 => values
                .iter()
                .any(|v| in_range(v, &bounds[0], &bounds[1])),
            _ => false,
        }),
        ConstraintOp::Like => constraint
            .args
            .iter()
            .filter_map(Value::as_str)
            .any(|pattern| {
                values
                    .iter()
                    .any(|v| matches!(v, AttrValue::Text(text) if like(text, pattern)))
            }),
    }
}

/// A list's elements, or the value itself.
fn elements(value: &AttrValue) -> Vec<&AttrValue> {
    match value {
        AttrValue::List(items) => items.iter().collect(),
        other => vec![other],
    }
}

/// The form a client uses for this value in constraint arguments.
fn wire_value(value: &AttrValue) -> Option<Value> {
    match value {
        AttrValue::Null => Some(Value::Null),
        AttrValue::Bool(b) => Some(Value::Bool(*b)),
        AttrValue::Number(n) => Some(Value::Number(n.clone())),
        AttrValue::Text(s) => Some(Value::String(s.clone())),
        AttrValue::Date(d) => Some(json!(d.timestamp_millis())),
        AttrValue::Json(v) => Some(v.clone()),
        AttrValue::Ref(id) => Some(id.to_json()),
        AttrValue::List(_) => None,
    }
}

fn in_range(value: &AttrValue, low: &Value, high: &Value) -> bool {
    let Some(x) = wire_value(value).as_ref().and_then(Value::as_f64) else {
        return false;
    };
    let above = low.is_null() || low.as_f64().is_some_and(|l| l <= x);
    let below = high.is_null() || high.as_f64().is_some_and(|h| x <= h);
    above && below
}

/// SQL-style `LIKE` with `%` wildcards, ignoring case.
fn like(text: &str, pattern: &str) -> bool {
    let text = text.to_lowercase();
    let pattern = pattern.to_lowercase();
    let parts: Vec<&str> = pattern.split('%').collect();

    let [first, middle @ .., last] = parts.as_slice() else {
        return text == pattern;
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };
    for part in middle {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}

fn fulltext_match(instance: &NounInstance, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    instance.attrs.values().flat_map(elements).any(|value| {
        matches!(value, AttrValue::Text(text) if text.to_lowercase().contains(&needle))
    })
}

fn involves_identity(noun: &NounType, instance: &NounInstance, arg: &Value) -> bool {
    noun.attributes
        .iter()
        .filter(|attr| attr.target == NOUN_IDENTITY)
        .filter_map(|attr| instance.get(&attr.bound_name))
        .flat_map(elements)
        .any(|value| matches!(value, AttrValue::Ref(id) if id.to_json() == *arg))
}

// =============================================================================
// ORDERING
// =============================================================================

fn compare_instances(a: &NounInstance, b: &NounInstance, keys: &[String]) -> Ordering {
    for key in keys {
        let (attr, descending) = match key.strip_prefix('-') {
            Some(attr) => (attr, true),
            None => (key.trim_start_matches('+'), false),
        };
        let ordering = compare_values(
            a.get(attr).and_then(wire_value),
            b.get(attr).and_then(wire_value),
        );
        let ordering = if descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Missing and null sort first.
fn compare_values(a: Option<Value>, b: Option<Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(&y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(&y),
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Less,
        (_, None | Some(Value::Null)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

// =============================================================================
// SAMPLE DATA
// =============================================================================

/// A small mailbox: two conversations, four messages, three people.
pub fn sample_dataset() -> Value {
    json!({
        "conversation": [
            {"id": 100, "subject": "Lunch on Friday"},
            {"id": 101, "subject": "Quarterly report"}
        ],
        "message": [
            {
                "id": 1, "subject": "Lunch on Friday", "conversation": 100, "folder": 5,
                "date": "2010-03-01T12:00:00Z", "from": 10, "to": [11], "cc": [],
                "involves": [10, 11], "tags": ["$label1"], "star": true, "read": true,
                "attachmentTypes": [], "attachmentInfos": []
            },
            {
                "id": 2, "subject": "Re: Lunch on Friday", "conversation": 100, "folder": 5,
                "date": "2010-03-01T13:30:00Z", "from": 11, "to": [10], "cc": [12],
                "involves": [10, 11, 12], "tags": [], "star": false, "read": false,
                "attachmentTypes": ["image/png"],
                "attachmentInfos": [{"name": "menu.png", "contentType": "image/png"}]
            },
            {
                "id": 3, "subject": "Quarterly report", "conversation": 101, "folder": 6,
                "date": "2010-03-05T09:00:00Z", "from": 12, "to": [10], "cc": [],
                "involves": [10, 12], "tags": ["$label2"], "star": false, "read": false,
                "attachmentTypes": ["application/pdf"],
                "attachmentInfos": [{"name": "q1.pdf", "contentType": "application/pdf"}]
            },
            {
                "id": 4, "subject": "Re: Quarterly report", "conversation": 101, "folder": 5,
                "date": "2010-03-06T17:45:00Z", "from": 10, "to": [12], "cc": [11],
                "involves": [10, 11, 12], "tags": ["$label2"], "star": false, "read": true,
                "attachmentTypes": [], "attachmentInfos": []
            }
        ],
        "identity": [
            {"id": 10, "kind": "email", "value": "ann@example.com", "contact": 20, "inAddressBook": true},
            {"id": 11, "kind": "email", "value": "bob@example.com", "contact": 21, "inAddressBook": true},
            {"id": 12, "kind": "email", "value": "carol@example.org", "contact": 22, "inAddressBook": false}
        ],
        "contact": [
            {"id": 20, "name": "Ann", "popularity": 42, "frecency": 900, "identities": [10]},
            {"id": 21, "name": "Bob", "popularity": 17, "frecency": 300, "identities": [11]},
            {"id": 22, "name": "Carol", "popularity": 5, "frecency": 120, "identities": [12]}
        ],
        "tag": [
            {"key": "$label1", "tag": "Important"},
            {"key": "$label2", "tag": "Work"}
        ],
        "folder": [
            {"id": 5, "name": "Inbox", "accountLabel": "ann@example.com"},
            {"id": 6, "name": "Archive", "accountLabel": "ann@example.com"}
        ]
    })
}

// =============================================================================
// TESTS
// =============================================================================
