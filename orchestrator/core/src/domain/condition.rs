// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Safelisted boolean condition evaluation over JSON documents.
//!
//! Escalation rules and correlation rules express their predicates as an
//! explicit [`Condition`] tree loaded from configuration. Conditions are
//! data, never code: there is no interpreted expression language, only the
//! comparison operators defined here, applied to dotted-path field lookups.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("field '{0}' not present in evaluation context")]
    MissingField(String),

    #[error("field '{field}' is not comparable as a number")]
    NotNumeric { field: String },

    #[error("invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("operator '{op}' requires a {expected} operand")]
    BadOperand { op: &'static str, expected: &'static str },
}

/// Comparison operators permitted in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Equals,
    Contains,
    Regex,
    Gt,
    Lt,
}

/// A single field comparison against a dotted path (e.g. `metadata.ip`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub field: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Comparison {
    pub fn new(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Evaluate this comparison against a JSON document.
    ///
    /// A missing field is an error rather than `false` so callers can
    /// distinguish a misconfigured rule from a rule that did not match.
    pub fn evaluate(&self, doc: &Value) -> Result<bool, ConditionError> {
        let field_value = lookup_path(doc, &self.field)
            .ok_or_else(|| ConditionError::MissingField(self.field.clone()))?;

        match self.op {
            CompareOp::Equals => Ok(loose_eq(field_value, &self.value)),
            CompareOp::Contains => {
                let needle = self.value.as_str().ok_or(ConditionError::BadOperand {
                    op: "contains",
                    expected: "string",
                })?;
                Ok(stringify(field_value).contains(needle))
            }
            CompareOp::Regex => {
                let pattern = self.value.as_str().ok_or(ConditionError::BadOperand {
                    op: "regex",
                    expected: "string",
                })?;
                let re = regex::Regex::new(pattern).map_err(|source| {
                    ConditionError::InvalidRegex {
                        pattern: pattern.to_string(),
                        source,
                    }
                })?;
                Ok(re.is_match(&stringify(field_value)))
            }
            CompareOp::Gt => {
                let (lhs, rhs) = self.numeric_operands(field_value)?;
                Ok(lhs > rhs)
            }
            CompareOp::Lt => {
                let (lhs, rhs) = self.numeric_operands(field_value)?;
                Ok(lhs < rhs)
            }
        }
    }

    fn numeric_operands(&self, field_value: &Value) -> Result<(f64, f64), ConditionError> {
        let lhs = as_number(field_value).ok_or_else(|| ConditionError::NotNumeric {
            field: self.field.clone(),
        })?;
        let rhs = as_number(&self.value).ok_or(ConditionError::BadOperand {
            op: "gt/lt",
            expected: "number",
        })?;
        Ok((lhs, rhs))
    }
}

/// Boolean combination of comparisons.
///
/// Serializes naturally in YAML:
///
/// ```yaml
/// any:
///   - field: context.correlated_threats
///     op: gt
///     value: 5
///   - field: context.attack_pattern
///     op: equals
///     value: coordinated
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    All { all: Vec<Condition> },
    Any { any: Vec<Condition> },
    Not { not: Box<Condition> },
    Compare(Comparison),
}

impl Condition {
    pub fn compare(field: impl Into<String>, op: CompareOp, value: Value) -> Self {
        Condition::Compare(Comparison::new(field, op, value))
    }

    pub fn evaluate(&self, doc: &Value) -> Result<bool, ConditionError> {
        match self {
            Condition::All { all } => {
                for c in all {
                    if !c.evaluate(doc)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Condition::Any { any } => {
                for c in any {
                    if c.evaluate(doc)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Condition::Not { not } => Ok(!not.evaluate(doc)?),
            Condition::Compare(cmp) => cmp.evaluate(doc),
        }
    }
}

/// Resolve a dotted path (`metadata.ip`) inside a JSON document.
pub fn lookup_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn stringify(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Equality with number/string coercion so YAML-sourced values like `"5"`
// still match numeric event fields.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}
