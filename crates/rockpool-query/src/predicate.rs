//! Predicate evaluation for query match criteria.
//!
//! Evaluates a criteria object (the non-reserved part of a query) against a
//! record's field map. Operators are gated by an [`OperatorSet`] whitelist
//! that callers can extend with custom operators, making the evaluator the
//! substitution point for the query language.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use regex::RegexBuilder;
use serde_json::Value;

use crate::error::QueryError;
use crate::{Fields, Query};

/// Operators enabled by default, matching the built-in evaluator.
const DEFAULT_OPERATORS: &[&str] = &[
    "$eq",
    "$ne",
    "$gt",
    "$gte",
    "$lt",
    "$lte",
    "$in",
    "$nin",
    "$exists",
    "$elemMatch",
    "$regex",
    "$options",
    "$like",
    "$iLike",
    "$ilike",
    "$notLike",
    "$notILike",
];

/// A caller-supplied operator: `(field value if present, operand) -> bool`.
pub type CustomOperator = Arc<dyn Fn(Option<&Value>, &Value) -> bool + Send + Sync>;

/// Whitelist of enabled operators plus caller-registered custom operators.
///
/// The default set covers the built-in comparison, set-membership, regex,
/// and SQL-`LIKE` operators. Registering a custom operator also enables it.
#[derive(Clone)]
pub struct OperatorSet {
    enabled: HashSet<String>,
    custom: HashMap<String, CustomOperator>,
}

impl Default for OperatorSet {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_OPERATORS.iter().map(|s| s.to_string()).collect(),
            custom: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for OperatorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut enabled: Vec<_> = self.enabled.iter().collect();
        enabled.sort();
        f.debug_struct("OperatorSet")
            .field("enabled", &enabled)
            .field("custom", &self.custom.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperatorSet {
    /// Create the default operator set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable additional operator names (a whitelist extension).
    ///
    /// Names without a built-in or custom implementation will still fail
    /// at evaluation time with `UnknownOperator`.
    pub fn with_operators<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled.extend(names.into_iter().map(Into::into));
        self
    }

    /// Register a custom operator implementation and enable it.
    pub fn with_custom(mut self, name: impl Into<String>, op: CustomOperator) -> Self {
        let name = name.into();
        self.enabled.insert(name.clone());
        self.custom.insert(name, op);
        self
    }

    /// Check whether an operator name is allowed.
    pub fn allows(&self, name: &str) -> bool {
        self.enabled.contains(name)
    }

    fn custom(&self, name: &str) -> Option<&CustomOperator> {
        self.custom.get(name)
    }
}

/// Resolve a dot-separated path within a field map.
///
/// Array segments may be indexed numerically (`"tags.0"`).
pub fn lookup_path<'a>(fields: &'a Fields, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Compare two values of the same type.
///
/// Numbers compare numerically, strings lexicographically. Values of
/// different types (and arrays/objects) are incomparable and return `None`,
/// which range operators treat as a non-match.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Evaluate match criteria against a record's fields.
///
/// Top-level keys are combined with AND. `$or` and `$and` take arrays of
/// sub-criteria; any other `$`-prefixed top-level key is rejected. Field
/// keys may use dot-paths.
pub fn record_matches(criteria: &Query, fields: &Fields, ops: &OperatorSet) -> Result<bool, QueryError> {
    for (key, condition) in criteria {
        let matched = match key.as_str() {
            "$or" => {
                let mut any = false;
                for clause in clause_list(key, condition)? {
                    if record_matches(clause, fields, ops)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$and" => {
                let mut all = true;
                for clause in clause_list(key, condition)? {
                    if !record_matches(clause, fields, ops)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            k if k.starts_with('$') => return Err(QueryError::UnknownOperator(k.to_string())),
            path => field_matches(condition, lookup_path(fields, path), ops)?,
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Interpret a `$or`/`$and` operand as a list of sub-queries.
fn clause_list<'a>(key: &str, condition: &'a Value) -> Result<Vec<&'a Query>, QueryError> {
    let Value::Array(items) = condition else {
        return Err(QueryError::MalformedLogical(key.to_string()));
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => Ok(map),
            _ => Err(QueryError::MalformedLogical(key.to_string())),
        })
        .collect()
}

/// Evaluate a single field condition against an (optional) field value.
fn field_matches(
    condition: &Value,
    value: Option<&Value>,
    ops: &OperatorSet,
) -> Result<bool, QueryError> {
    match condition {
        Value::Object(clauses) if clauses.keys().any(|k| k.starts_with('$')) => {
            if let Some(plain) = clauses.keys().find(|k| !k.starts_with('$')) {
                return Err(QueryError::InvalidFilter {
                    filter: plain.clone(),
                    reason: "cannot mix operators and plain fields in one condition".to_string(),
                });
            }
            operator_clauses_match(clauses, value, ops)
        }
        other => Ok(value_eq(value, other)),
    }
}

/// Equality with MongoDB array semantics: an array field matches a scalar
/// condition when any element equals it. A missing field equals `null`.
fn value_eq(value: Option<&Value>, expected: &Value) -> bool {
    match value {
        None => expected.is_null(),
        Some(v) if v == expected => true,
        Some(Value::Array(items)) => items.iter().any(|item| item == expected),
        Some(_) => false,
    }
}

/// Membership for `$in`/`$nin`, with the same array-field semantics as
/// equality.
fn in_list(value: Option<&Value>, list: &[Value]) -> bool {
    match value {
        None => list.iter().any(|item| item.is_null()),
        Some(Value::Array(items)) => items.iter().any(|item| list.contains(item)),
        Some(v) => list.contains(v),
    }
}

fn operator_clauses_match(
    clauses: &Query,
    value: Option<&Value>,
    ops: &OperatorSet,
) -> Result<bool, QueryError> {
    for (op, operand) in clauses {
        // $options only modifies a sibling $regex clause
        if op == "$options" {
            continue;
        }
        if !ops.allows(op) {
            return Err(QueryError::OperatorNotAllowed(op.clone()));
        }
        let matched = match op.as_str() {
            "$eq" => value_eq(value, operand),
            "$ne" => !value_eq(value, operand),
            "$gt" | "$gte" | "$lt" | "$lte" => range_matches(op, value, operand),
            "$in" => in_list(value, operand_array(op, operand)?),
            "$nin" => !in_list(value, operand_array(op, operand)?),
            "$exists" => {
                let Value::Bool(expected) = operand else {
                    return Err(QueryError::InvalidFilter {
                        filter: op.clone(),
                        reason: "expects a boolean".to_string(),
                    });
                };
                value.is_some() == *expected
            }
            "$regex" => regex_matches(value, operand, clauses.get("$options"))?,
            "$like" => like_matches(value, operand, false)?,
            "$iLike" | "$ilike" => like_matches(value, operand, true)?,
            "$notLike" => !like_matches(value, operand, false)?,
            "$notILike" => !like_matches(value, operand, true)?,
            "$elemMatch" => elem_matches(value, operand, ops)?,
            other => match ops.custom(other) {
                Some(custom) => custom(value, operand),
                None => return Err(QueryError::UnknownOperator(other.to_string())),
            },
        };
        if !matched {
            return Ok(false);
        }
    }
    Ok(true)
}

fn operand_array<'a>(op: &str, operand: &'a Value) -> Result<&'a [Value], QueryError> {
    match operand {
        Value::Array(items) => Ok(items),
        _ => Err(QueryError::InvalidFilter {
            filter: op.to_string(),
            reason: "expects an array".to_string(),
        }),
    }
}

fn range_matches(op: &str, value: Option<&Value>, operand: &Value) -> bool {
    let Some(value) = value else {
        return false;
    };
    let Some(ordering) = compare_values(value, operand) else {
        return false;
    };
    match op {
        "$gt" => ordering == Ordering::Greater,
        "$gte" => ordering != Ordering::Less,
        "$lt" => ordering == Ordering::Less,
        "$lte" => ordering != Ordering::Greater,
        _ => unreachable!("range_matches called with non-range operator"),
    }
}

fn regex_matches(
    value: Option<&Value>,
    operand: &Value,
    options: Option<&Value>,
) -> Result<bool, QueryError> {
    let Value::String(pattern) = operand else {
        return Err(QueryError::InvalidFilter {
            filter: "$regex".to_string(),
            reason: "expects a string pattern".to_string(),
        });
    };
    let flags = options.and_then(Value::as_str).unwrap_or_default();
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(flags.contains('i'))
        .multi_line(flags.contains('m'))
        .dot_matches_new_line(flags.contains('s'))
        .ignore_whitespace(flags.contains('x'))
        .build()?;
    Ok(matches!(value, Some(Value::String(s)) if regex.is_match(s)))
}

fn like_matches(
    value: Option<&Value>,
    operand: &Value,
    case_insensitive: bool,
) -> Result<bool, QueryError> {
    let Value::String(pattern) = operand else {
        return Err(QueryError::InvalidFilter {
            filter: "$like".to_string(),
            reason: "expects a string pattern".to_string(),
        });
    };
    let regex = RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(case_insensitive)
        .build()?;
    Ok(matches!(value, Some(Value::String(s)) if regex.is_match(s)))
}

/// Translate a SQL `LIKE` pattern to an anchored regex: `%` matches any
/// run of characters, `_` matches exactly one.
fn like_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for ch in pattern.chars() {
        match ch {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

fn elem_matches(
    value: Option<&Value>,
    operand: &Value,
    ops: &OperatorSet,
) -> Result<bool, QueryError> {
    let Value::Object(criteria) = operand else {
        return Err(QueryError::InvalidFilter {
            filter: "$elemMatch".to_string(),
            reason: "expects a query object".to_string(),
        });
    };
    let Some(Value::Array(items)) = value else {
        return Ok(false);
    };
    for item in items {
        let matched = match item {
            // object elements: the operand is a sub-query over the element
            Value::Object(fields) => record_matches(criteria, fields, ops)?,
            // scalar elements: the operand is an operator clause on the element
            scalar if criteria.keys().all(|k| k.starts_with('$')) => {
                operator_clauses_match(criteria, Some(scalar), ops)?
            }
            _ => false,
        };
        if matched {
            return Ok(true);
        }
    }
    Ok(false)
}
