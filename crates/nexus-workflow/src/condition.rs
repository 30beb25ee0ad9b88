//! Condition matcher: declarative predicates over an event's data payload.
//!
//! Rule conditions arrive in the legacy mapping shape:
//! ```text
//! { "open_count": { "$gte": 3 }, "replied": false, "source": { "$in": ["inbound", "api"] } }
//! ```
//! and are compiled once, at rule-load time, into a [`Condition`] tree.
//! Evaluation is then a plain recursive walk.

use nexus_core::error::{NexusError, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Compiled condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Gte(String, Value),
    Gt(String, Value),
    Lt(String, Value),
    In(String, Vec<Value>),
    /// Every child must hold. Empty means "always".
    All(Vec<Condition>),
}

impl Condition {
    /// Condition that always matches.
    pub fn always() -> Self {
        Condition::All(Vec::new())
    }

    /// Compile a legacy condition mapping. `rule` is used for error messages.
    ///
    /// `null` and `{}` compile to [`Condition::always`]. A field whose value is
    /// an object with `$`-prefixed keys is an operator clause; any other value
    /// is an equality check. Unknown operators are rejected.
    pub fn compile(rule: &str, conditions: &Value) -> Result<Self> {
        let map = match conditions {
            Value::Null => return Ok(Self::always()),
            Value::Object(map) => map,
            other => {
                return Err(NexusError::invalid_rule(
                    rule,
                    format!("conditions must be an object, got {other}"),
                ));
            }
        };

        let mut clauses = Vec::with_capacity(map.len());
        for (field, expected) in map {
            match expected.as_object().filter(|obj| is_operator_object(obj)) {
                Some(ops) => compile_operators(rule, field, ops, &mut clauses)?,
                None => clauses.push(Condition::Eq(field.clone(), expected.clone())),
            }
        }

        Ok(match clauses.len() {
            1 => clauses.remove(0),
            _ => Condition::All(clauses),
        })
    }

    /// Evaluate against an event payload. Non-object payloads have no fields,
    /// so only an empty condition matches them.
    pub fn evaluate(&self, data: &Value) -> bool {
        match self {
            Condition::All(children) => children.iter().all(|c| c.evaluate(data)),
            Condition::Eq(field, expected) => {
                data.get(field).is_some_and(|actual| strict_eq(actual, expected))
            }
            Condition::Gte(field, expected) => compare(data.get(field), expected)
                .is_some_and(|o| o != Ordering::Less),
            Condition::Gt(field, expected) => {
                compare(data.get(field), expected).is_some_and(|o| o == Ordering::Greater)
            }
            Condition::Lt(field, expected) => {
                compare(data.get(field), expected).is_some_and(|o| o == Ordering::Less)
            }
            Condition::In(field, options) => data
                .get(field)
                .is_some_and(|actual| options.iter().any(|o| strict_eq(actual, o))),
        }
    }
}

/// Match `data` against a raw condition mapping.
///
/// An uncompilable condition never matches; the problem is logged.
pub fn matches(data: &Value, condition: &Value) -> bool {
    match Condition::compile("<inline>", condition) {
        Ok(compiled) => compiled.evaluate(data),
        Err(e) => {
            tracing::warn!("⚠️ Condition rejected: {}", e);
            false
        }
    }
}

fn is_operator_object(obj: &Map<String, Value>) -> bool {
    !obj.is_empty() && obj.keys().any(|k| k.starts_with('$'))
}

fn compile_operators(
    rule: &str,
    field: &str,
    ops: &Map<String, Value>,
    out: &mut Vec<Condition>,
) -> Result<()> {
    for (op, operand) in ops {
        let field = field.to_string();
        let clause = match op.as_str() {
            "$gte" => Condition::Gte(field, operand.clone()),
            "$gt" => Condition::Gt(field, operand.clone()),
            "$lt" => Condition::Lt(field, operand.clone()),
            // A non-array operand can never contain the value.
            "$in" => Condition::In(field, operand.as_array().cloned().unwrap_or_default()),
            other if other.starts_with('$') => {
                return Err(NexusError::invalid_rule(
                    rule,
                    format!("unknown operator '{other}' on field '{field}'"),
                ));
            }
            other => {
                return Err(NexusError::invalid_rule(
                    rule,
                    format!("field '{field}' mixes operators with plain key '{other}'"),
                ));
            }
        };
        out.push(clause);
    }
    Ok(())
}

/// Equality with numeric normalization: `3 == 3.0`.
fn strict_eq(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => actual == expected,
    }
}

/// Order `actual` relative to `expected`. Numbers compare numerically and
/// strings lexicographically; anything else is incomparable.
fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}
