//! # Query Module
//!
//! The wire form of a remote query and its server-side validation.
//!
//! A request names an exposed noun and carries `[method, [args...]]` pairs.
//! Methods are resolved against the noun's query-capability schema:
//!
//! - `<attr>`: equality on any attribute
//! - `<attr>Range`: `[low, high]` pairs, continuous attributes only
//! - `<attr>Like`: patterns, likable attributes only
//! - `limit`, `orderBy`: built in for every noun
//!
//! Anything else is rejected before the provider sees it.

use crate::primitives::{
    LIKE_SUFFIX, MAX_CONSTRAINT_ARGS, MAX_CONSTRAINTS, METHOD_LIMIT, METHOD_ORDER_BY, RANGE_SUFFIX,
};
use crate::registry::NounRegistry;
use crate::schema::QueryCapabilities;
use crate::NounwireError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// WIRE FORM
// =============================================================================

/// One `[method, [args...]]` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintCall(pub String, pub Vec<Value>);

impl ConstraintCall {
    #[must_use]
    pub fn method(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn args(&self) -> &[Value] {
        &self.1
    }
}

/// Body of a `query` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub noun: String,
    #[serde(default)]
    pub constraints: Vec<ConstraintCall>,
}

// =============================================================================
// VALIDATED QUERY
// =============================================================================

/// Constraint operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintOp {
    /// Any of the arguments equals the attribute (or one of its values).
    Equals,
    /// The attribute falls in any `[low, high]` argument pair.
    Range,
    /// The attribute matches any pattern argument.
    Like,
}

/// A constraint checked against the capability schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub attr: String,
    pub op: ConstraintOp,
    /// For `Range`, every argument is a two-element array.
    pub args: Vec<Value>,
}

/// A query ready for a provider.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NounQuery {
    pub noun: String,
    pub constraints: Vec<Constraint>,
    pub limit: Option<usize>,
    /// Attribute names, optionally prefixed with `-` for descending order.
    pub order_by: Vec<String>,
}

impl NounQuery {
    /// An unconstrained query.
    #[must_use]
    pub fn new(noun: impl Into<String>) -> Self {
        Self {
            noun: noun.into(),
            ..Self::default()
        }
    }

    /// Validate a wire request against the registry.
    ///
    /// The noun must be exposed (`UnknownNounName`); every method must exist
    /// in its capability schema with arguments of the right shape
    /// (`MalformedConstraint`).
    pub fn from_request(
        registry: &NounRegistry,
        request: &QueryRequest,
    ) -> Result<Self, NounwireError> {
        let plan = registry.exposed_plan(&request.noun)?;
        let capabilities = &plan.capabilities;

        if request.constraints.len() > MAX_CONSTRAINTS {
            return Err(NounwireError::MalformedConstraint(format!(
                "{} constraints exceed the limit of {}",
                request.constraints.len(),
                MAX_CONSTRAINTS
            )));
        }
        let total_args: usize = request.constraints.iter().map(|c| c.1.len()).sum();
        if total_args > MAX_CONSTRAINT_ARGS {
            return Err(NounwireError::MalformedConstraint(format!(
                "{} constraint arguments exceed the limit of {}",
                total_args, MAX_CONSTRAINT_ARGS
            )));
        }

        let mut query = Self::new(plan.noun_type.clone());
        for call in &request.constraints {
            let method = call.method();
            let args = call.args();

            if method == METHOD_LIMIT {
                query.limit = Some(parse_limit(args)?);
                continue;
            }
            if method == METHOD_ORDER_BY {
                query.order_by.extend(parse_order_by(capabilities, args)?);
                continue;
            }

            let (attr, op) = resolve_method(capabilities, method).ok_or_else(|| {
                NounwireError::MalformedConstraint(format!(
                    "'{}' has no constraint method '{}'",
                    request.noun, method
                ))
            })?;
            if args.is_empty() {
                return Err(NounwireError::MalformedConstraint(format!(
                    "'{}' needs at least one argument",
                    method
                )));
            }
            if op == ConstraintOp::Range {
                check_ranges(method, args)?;
            }
            query.constraints.push(Constraint {
                attr: attr.to_string(),
                op,
                args: args.to_vec(),
            });
        }

        Ok(query)
    }
}

/// Map a method name to `(attribute, operator)`. An exact attribute name
/// wins over a suffixed reading.
fn resolve_method<'a>(
    capabilities: &QueryCapabilities,
    method: &'a str,
) -> Option<(&'a str, ConstraintOp)> {
    if capabilities.contains_key(method) {
        return Some((method, ConstraintOp::Equals));
    }
    let range = method
        .strip_suffix(RANGE_SUFFIX)
        .filter(|attr| capabilities.get(*attr).is_some_and(|c| c.continuous))
        .map(|attr| (attr, ConstraintOp::Range));
    let like = || {
        method
            .strip_suffix(LIKE_SUFFIX)
            .filter(|attr| capabilities.get(*attr).is_some_and(|c| c.likable))
            .map(|attr| (attr, ConstraintOp::Like))
    };
    range.or_else(like)
}

fn parse_limit(args: &[Value]) -> Result<usize, NounwireError> {
    match args {
        [value] => value
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| {
                NounwireError::MalformedConstraint(format!("limit {} is not a count", value))
            }),
        _ => Err(NounwireError::MalformedConstraint(format!(
            "limit takes one argument, got {}",
            args.len()
        ))),
    }
}

fn parse_order_by(
    capabilities: &QueryCapabilities,
    args: &[Value],
) -> Result<Vec<String>, NounwireError> {
    args.iter()
        .map(|arg| {
            let key = arg.as_str().ok_or_else(|| {
                NounwireError::MalformedConstraint(format!("orderBy key {} is not a string", arg))
            })?;
            let attr = key.trim_start_matches(['-', '+']);
            if !capabilities.contains_key(attr) {
                return Err(NounwireError::MalformedConstraint(format!(
                    "cannot order by unknown attribute '{}'",
                    attr
                )));
            }
            Ok(key.to_string())
        })
        .collect()
}

fn check_ranges(method: &str, args: &[Value]) -> Result<(), NounwireError> {
    for arg in args {
        if !matches!(arg, Value::Array(bounds) if bounds.len() == 2) {
            return Err(NounwireError::MalformedConstraint(format!(
                "'{}' arguments must be [low, high] pairs, got {}",
                method, arg
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
    use serde_json::json;

    fn request(value: Value) -> QueryRequest {
        serde_json::from_value(value).expect("request")
    }

    fn validate(value: Value) -> Result<NounQuery, NounwireError> {
        let registry = NounRegistry::mail().expect("registry");
        NounQuery::from_request(&registry, &request(value))
    }

    #[test]
    fn wire_shape_is_pairs() {
        let req = QueryRequest {
            noun: "message".into(),
            constraints: vec![ConstraintCall("limit".into(), vec![json!(5)])],
        };
        assert_eq!(
            serde_json::to_value(&req).expect("serialize"),
            json!({"noun": "message", "constraints": [["limit", [5]]]})
        );
        assert!(request(json!({"noun": "contact"})).constraints.is_empty());
    }

    #[test]
    fn resolves_all_method_kinds() {
        let query = validate(json!({
            "noun": "message",
            "constraints": [
                ["from", [{"id": 1}]],
                ["dateRange", [[0, 100]]],
                ["attachmentTypesLike", ["image/%"]],
                ["limit", [10]],
                ["orderBy", ["-date"]]
            ]
        }))
        .expect("valid");

        let ops: Vec<_> = query
            .constraints
            .iter()
            .map(|c| (c.attr.as_str(), c.op))
            .collect();
        assert_eq!(
            ops,
            vec![
                ("from", ConstraintOp::Equals),
                ("date", ConstraintOp::Range),
                ("attachmentTypes", ConstraintOp::Like),
            ]
        );
        assert_eq!(query.limit, Some(10));
        assert_eq!(query.order_by, vec!["-date".to_string()]);
    }

    #[test]
    fn unexposed_noun_is_unknown() {
        assert!(matches!(
            validate(json!({"noun": "folder"})),
            Err(NounwireError::UnknownNounName(_))
        ));
        assert!(matches!(
            validate(json!({"noun": "calendar"})),
            Err(NounwireError::UnknownNounName(_))
        ));
    }

    #[test]
    fn capability_flags_gate_suffixes() {
        for bad in [
            json!(["fromRange", [[1, 2]]]),
            json!(["dateLike", ["x"]]),
            json!(["nosuch", [1]]),
            json!(["dateRange", [5]]),
            json!(["dateRange", [[1, 2, 3]]]),
            json!(["from", []]),
            json!(["limit", [-1]]),
            json!(["limit", [1, 2]]),
            json!(["orderBy", ["-nosuch"]]),
            json!(["orderBy", [3]]),
        ] {
            let result = validate(json!({"noun": "message", "constraints": [bad]}));
            assert!(
                matches!(result, Err(NounwireError::MalformedConstraint(_))),
                "accepted {}",
                bad
            );
        }
    }

    #[test]
    fn constraint_count_is_bounded() {
        let calls: Vec<_> = (0..=MAX_CONSTRAINTS).map(|_| json!(["read", [true]])).collect();
        assert!(matches!(
            validate(json!({"noun": "message", "constraints": calls})),
            Err(NounwireError::MalformedConstraint(_))
        ));

        let args: Vec<_> = (0..=MAX_CONSTRAINT_ARGS).map(|i| json!(i)).collect();
        assert!(matches!(
            validate(json!({"noun": "contact", "constraints": [["popularity", args]]})),
            Err(NounwireError::MalformedConstraint(_))
        ));
    }
}
