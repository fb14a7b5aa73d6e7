//! # Query Proxies
//!
//! Client-side query builders generated from a server's capability schemas.
//!
//! Each noun gets one `QueryDefinition`: a table from method name to the
//! argument transform that method applies. The table is built once; a
//! `ProxyQuery` borrows it and owns only its constraint list, so building
//! queries never touches shared state.

use crate::helpers::{HelperTable, MarshalHelper};
use crate::primitives::{LIKE_SUFFIX, METHOD_LIMIT, METHOD_ORDER_BY, RANGE_SUFFIX};
use crate::query::{ConstraintCall, QueryRequest};
use crate::schema::{QueryCapabilities, QueryCapability};
use crate::NounwireError;
use serde_json::Value;
use std::collections::BTreeMap;

// =============================================================================
// ARGUMENT TRANSFORMS
// =============================================================================

/// How one argument is prepared for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgTransform {
    PassThrough,
    /// A value helper, e.g. dates to epoch milliseconds.
    Helper(MarshalHelper),
    /// A reference argument: an object contributes its value under this key;
    /// a bare id is sent as-is.
    IdOf(String),
}

impl ArgTransform {
    fn for_capability(
        helpers: &HelperTable,
        noun: &str,
        attr: &str,
        capability: &QueryCapability,
    ) -> Result<Self, NounwireError> {
        if let Some(helper) = helpers
            .get(&capability.noun_type)
            .filter(|h| h.is_value_helper())
        {
            return Ok(Self::Helper(helper.clone()));
        }
        if capability.self_marshalling {
            return Ok(Self::PassThrough);
        }
        match &capability.id_attr {
            Some(id_attr) => Ok(Self::IdOf(id_attr.clone())),
            None => Err(NounwireError::SchemaConfig(format!(
                "'{}.{}' of type '{}' has neither a helper nor an id accessor",
                noun, attr, capability.noun_type
            ))),
        }
    }

    /// Transform one argument.
    pub fn apply(&self, method: &str, arg: &Value) -> Result<Value, NounwireError> {
        let malformed = |detail: String| {
            NounwireError::MalformedConstraint(format!("'{}': {}", method, detail))
        };
        match self {
            Self::PassThrough => Ok(arg.clone()),
            Self::Helper(helper) => helper.apply_arg(arg).map_err(malformed),
            Self::IdOf(id_attr) => match arg {
                Value::Object(fields) => fields
                    .get(id_attr)
                    .filter(|id| matches!(id, Value::Number(_) | Value::String(_)))
                    .cloned()
                    .ok_or_else(|| malformed(format!("argument has no usable '{}'", id_attr))),
                Value::Number(_) | Value::String(_) => Ok(arg.clone()),
                other => Err(malformed(format!("{} is not a reference", other))),
            },
        }
    }
}

/// What a method does with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstraintMethod {
    /// Each argument is transformed.
    Values(ArgTransform),
    /// Each argument is a `[low, high]` pair; both bounds are transformed.
    Ranges(ArgTransform),
}

impl ConstraintMethod {
    fn marshal_args(&self, method: &str, args: &[Value]) -> Result<Vec<Value>, NounwireError> {
        match self {
            Self::Values(transform) => args.iter().map(|a| transform.apply(method, a)).collect(),
            Self::Ranges(transform) => args
                .iter()
                .map(|arg| match arg {
                    Value::Array(bounds) if bounds.len() == 2 => Ok(Value::Array(vec![
                        transform.apply(method, &bounds[0])?,
                        transform.apply(method, &bounds[1])?,
                    ])),
                    other => Err(NounwireError::MalformedConstraint(format!(
                        "'{}' takes [low, high] pairs, got {}",
                        method, other
                    ))),
                })
                .collect(),
        }
    }
}

// =============================================================================
// DEFINITIONS
// =============================================================================

/// Method table of one noun.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryDefinition {
    pub noun: String,
    methods: BTreeMap<String, ConstraintMethod>,
}

impl QueryDefinition {
    #[must_use]
    pub fn method(&self, name: &str) -> Option<&ConstraintMethod> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }
}

/// Builds `QueryProxies` from capability schemas.
#[derive(Debug, Clone, Copy)]
pub struct QueryProxyBuilder<'h> {
    helpers: &'h HelperTable,
}

impl<'h> QueryProxyBuilder<'h> {
    #[must_use]
    pub fn new(helpers: &'h HelperTable) -> Self {
        Self { helpers }
    }

    pub fn build(
        &self,
        schemas: &BTreeMap<String, QueryCapabilities>,
    ) -> Result<QueryProxies, NounwireError> {
        let mut definitions = BTreeMap::new();

        for (noun, capabilities) in schemas {
            let mut methods = BTreeMap::new();
            for builtin in [METHOD_LIMIT, METHOD_ORDER_BY] {
                add_method(
                    &mut methods,
                    noun,
                    builtin.to_string(),
                    ConstraintMethod::Values(ArgTransform::PassThrough),
                )?;
            }
            for (attr, capability) in capabilities {
                let transform = ArgTransform::for_capability(self.helpers, noun, attr, capability)?;
                if capability.continuous {
                    add_method(
                        &mut methods,
                        noun,
                        format!("{}{}", attr, RANGE_SUFFIX),
                        ConstraintMethod::Ranges(transform.clone()),
                    )?;
                }
                if capability.likable {
                    add_method(
                        &mut methods,
                        noun,
                        format!("{}{}", attr, LIKE_SUFFIX),
                        ConstraintMethod::Values(ArgTransform::PassThrough),
                    )?;
                }
                add_method(&mut methods, noun, attr.clone(), ConstraintMethod::Values(transform))?;
            }

            definitions.insert(
                noun.clone(),
                QueryDefinition {
                    noun: noun.clone(),
                    methods,
                },
            );
        }

        Ok(QueryProxies { definitions })
    }
}

/// Insert a method; two sources for one name are a configuration error.
fn add_method(
    methods: &mut BTreeMap<String, ConstraintMethod>,
    noun: &str,
    name: String,
    method: ConstraintMethod,
) -> Result<(), NounwireError> {
    if methods.contains_key(&name) {
        return Err(NounwireError::SchemaConfig(format!(
            "{}: method '{}' is defined twice",
            noun, name
        )));
    }
    methods.insert(name, method);
    Ok(())
}

/// Query definitions for every noun a server exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryProxies {
    definitions: BTreeMap<String, QueryDefinition>,
}

impl QueryProxies {
    /// Start an empty query on `noun`.
    pub fn new_query(&self, noun: &str) -> Result<ProxyQuery<'_>, NounwireError> {
        let definition = self
            .definitions
            .get(noun)
            .ok_or_else(|| NounwireError::UnknownNounName(noun.to_string()))?;
        Ok(ProxyQuery {
            definition,
            constraints: Vec::new(),
        })
    }

    #[must_use]
    pub fn definition(&self, noun: &str) -> Option<&QueryDefinition> {
        self.definitions.get(noun)
    }

    pub fn nouns(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }
}

// =============================================================================
// PROXY QUERY
// =============================================================================

/// A query under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyQuery<'d> {
    definition: &'d QueryDefinition,
    constraints: Vec<ConstraintCall>,
}

impl ProxyQuery<'_> {
    /// Record `method(args...)` with its arguments marshalled.
    pub fn call(&mut self, method: &str, args: &[Value]) -> Result<&mut Self, NounwireError> {
        let handler = self.definition.method(method).ok_or_else(|| {
            NounwireError::MalformedConstraint(format!(
                "'{}' has no method '{}'",
                self.definition.noun, method
            ))
        })?;
        let marshalled = handler.marshal_args(method, args)?;
        self.constraints
            .push(ConstraintCall(method.to_string(), marshalled));
        Ok(self)
    }

    /// Equality on `attr`.
    pub fn constrain(&mut self, attr: &str, values: &[Value]) -> Result<&mut Self, NounwireError> {
        self.call(attr, values)
    }

    /// `attr` within any of the `(low, high)` pairs.
    pub fn range(
        &mut self,
        attr: &str,
        bounds: &[(Value, Value)],
    ) -> Result<&mut Self, NounwireError> {
        let args: Vec<Value> = bounds
            .iter()
            .map(|(low, high)| Value::Array(vec![low.clone(), high.clone()]))
            .collect();
        self.call(&format!("{}{}", attr, RANGE_SUFFIX), &args)
    }

    /// `attr` matching any of the patterns.
    pub fn like(&mut self, attr: &str, patterns: &[Value]) -> Result<&mut Self, NounwireError> {
        self.call(&format!("{}{}", attr, LIKE_SUFFIX), patterns)
    }

    pub fn limit(&mut self, count: usize) -> Result<&mut Self, NounwireError> {
        self.call(METHOD_LIMIT, &[Value::from(count)])
    }

    pub fn order_by(&mut self, keys: &[&str]) -> Result<&mut Self, NounwireError> {
        let args: Vec<Value> = keys.iter().map(|k| Value::from(*k)).collect();
        self.call(METHOD_ORDER_BY, &args)
    }

    #[must_use]
    pub fn noun(&self) -> &str {
        &self.definition.noun
    }

    #[must_use]
    pub fn constraints(&self) -> &[ConstraintCall] {
        &self.constraints
    }

    #[must_use]
    pub fn into_request(self) -> QueryRequest {
        QueryRequest {
            noun: self.definition.noun.clone(),
            constraints: self.constraints,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::NounRegistry;
    use serde_json::json;

    fn proxies() -> QueryProxies {
        let registry = NounRegistry::mail().expect("registry");
        QueryProxyBuilder::new(registry.helpers())
            .build(&registry.query_schemas())
            .expect("proxies")
    }

    #[test]
    fn method_tables_follow_capabilities() {
        let proxies = proxies();
        let message = proxies.definition("message").expect("message");
        assert_eq!(
            message.method("date"),
            Some(&ConstraintMethod::Values(ArgTransform::Helper(
                MarshalHelper::EpochMillis
            )))
        );
        assert_eq!(
            message.method("dateRange"),
            Some(&ConstraintMethod::Ranges(ArgTransform::Helper(
                MarshalHelper::EpochMillis
            )))
        );
        assert_eq!(
            message.method("from"),
            Some(&ConstraintMethod::Values(ArgTransform::IdOf("id".into())))
        );
        assert_eq!(
            message.method("tags"),
            Some(&ConstraintMethod::Values(ArgTransform::IdOf("key".into())))
        );
        assert!(message.method("fromRange").is_none());
        assert!(message.method("attachmentTypesLike").is_some());
        assert!(message.method("limit").is_some());
        assert!(proxies.definition("folder").is_none());
    }

    #[test]
    fn reference_args_send_ids() {
        let proxies = proxies();
        let mut query = proxies.new_query("message").expect("query");
        query
            .constrain("from", &[json!({"id": 7, "value": "ann@example.com"}), json!(8)])
            .expect("from")
            .constrain("tags", &[json!({"key": "$label1", "tag": "Important"})])
            .expect("tags");
        let request = query.into_request();
        assert_eq!(
            serde_json::to_value(&request).expect("serialize"),
            json!({
                "noun": "message",
                "constraints": [["from", [7, 8]], ["tags", ["$label1"]]]
            })
        );
    }

    #[test]
    fn dates_become_millis_in_both_forms() {
        let proxies = proxies();
        let mut query = proxies.new_query("message").expect("query");
        query
            .constrain("date", &[json!("2010-03-01T12:00:00Z")])
            .expect("eq")
            .range("date", &[(json!("2010-03-01T12:00:00Z"), json!(null))])
            .expect("range")
            .limit(3)
            .expect("limit")
            .order_by(&["-date"])
            .expect("order");
        let calls = query.constraints();
        assert_eq!(calls[0].args(), &[json!(1_267_444_800_000_i64)]);
        assert_eq!(calls[1].args(), &[json!([1_267_444_800_000_i64, null])]);
        assert_eq!(calls[2], ConstraintCall("limit".into(), vec![json!(3)]));
        assert_eq!(calls[3], ConstraintCall("orderBy".into(), vec![json!("-date")]));
    }

    #[test]
    fn bad_calls_are_malformed() {
        let proxies = proxies();
        let mut query = proxies.new_query("contact").expect("query");
        assert!(matches!(
            query.call("nosuch", &[]),
            Err(NounwireError::MalformedConstraint(_))
        ));
        assert!(matches!(
            query.call("popularityRange", &[json!(1)]),
            Err(NounwireError::MalformedConstraint(_))
        ));
        assert!(matches!(
            query.constrain("identities", &[json!({"value": "x"})]),
            Err(NounwireError::MalformedConstraint(_))
        ));
        assert!(query.constraints().is_empty());
        assert!(matches!(
            proxies.new_query("folder"),
            Err(NounwireError::UnknownNounName(_))
        ));
    }

    #[test]
    fn queries_do_not_share_constraints() {
        let proxies = proxies();
        let mut first = proxies.new_query("contact").expect("first");
        first.limit(1).expect("limit");
        let second = proxies.new_query("contact").expect("second");
        assert_eq!(first.constraints().len(), 1);
        assert!(second.constraints().is_empty());
    }

    #[test]
    fn reference_without_id_attr_is_config_error() {
        let mut caps = QueryCapabilities::new();
        caps.insert(
            "owner".into(),
            QueryCapability {
                noun_type: "person".into(),
                self_marshalling: false,
                continuous: false,
                likable: false,
                id_attr: None,
            },
        );
        let schemas = BTreeMap::from([("box".to_string(), caps)]);
        assert!(matches!(
            QueryProxyBuilder::new(&HelperTable::new()).build(&schemas),
            Err(NounwireError::SchemaConfig(_))
        ));
    }

    fn number(continuous: bool) -> QueryCapability {
        QueryCapability {
            noun_type: "number".into(),
            self_marshalling: true,
            continuous,
            likable: false,
            id_attr: None,
        }
    }

    #[test]
    fn method_name_collisions_are_config_errors() {
        let build = |caps: QueryCapabilities| {
            let schemas = BTreeMap::from([("box".to_string(), caps)]);
            QueryProxyBuilder::new(&HelperTable::new()).build(&schemas)
        };

        let shadows_builtin = QueryCapabilities::from([("limit".to_string(), number(false))]);
        assert!(matches!(build(shadows_builtin), Err(NounwireError::SchemaConfig(_))));

        let shadows_range = QueryCapabilities::from([
            ("size".to_string(), number(true)),
            ("sizeRange".to_string(), number(false)),
        ]);
        assert!(matches!(build(shadows_range), Err(NounwireError::SchemaConfig(_))));

        let distinct = QueryCapabilities::from([
            ("size".to_string(), number(true)),
            ("weight".to_string(), number(true)),
        ]);
        assert!(build(distinct).is_ok());
    }
}
