//! Stable multi-field sorting for query results.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::QueryError;
use crate::predicate::{compare_values, lookup_path};
use crate::Fields;

/// Direction of a sort field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Sort fields in priority order, each with a direction.
pub type SortSpec = Vec<(String, SortOrder)>;

/// Parse a `$sort` operand: an object of `field: 1 | -1` in priority order.
pub fn parse_sort(value: &Value) -> Result<SortSpec, QueryError> {
    let Value::Object(entries) = value else {
        return Err(QueryError::InvalidFilter {
            filter: "$sort".to_string(),
            reason: "expects an object of field: 1 | -1".to_string(),
        });
    };
    entries
        .iter()
        .map(|(field, direction)| {
            let order = match direction.as_i64() {
                Some(1) => SortOrder::Ascending,
                Some(-1) => SortOrder::Descending,
                _ => {
                    return Err(QueryError::InvalidFilter {
                        filter: "$sort".to_string(),
                        reason: format!("direction for {field} must be 1 or -1"),
                    });
                }
            };
            Ok((field.clone(), order))
        })
        .collect()
}

/// Build a comparator over field maps for use with a stable sort.
///
/// Within a type, values compare naturally; across types a fixed rank
/// applies (missing < null < bool < number < string < array < object) so
/// the ordering is total and deterministic. Ties compare equal, which a
/// stable sort resolves by insertion order.
pub fn sorter(spec: &SortSpec) -> impl Fn(&Fields, &Fields) -> Ordering + '_ {
    move |a, b| {
        for (field, order) in spec {
            let ordering = compare_sort_values(lookup_path(a, field), lookup_path(b, field));
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_)) => 5,
        Some(Value::Object(_)) => 6,
    }
}

fn compare_sort_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            compare_values(x, y).unwrap_or_else(|| type_rank(a).cmp(&type_rank(b)))
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields(value: serde_json::Value) -> Fields {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn parses_multi_field_sort_in_order() {
        let spec = parse_sort(&json!({"age": -1, "name": 1})).unwrap();
        assert_eq!(
            spec,
            vec![
                ("age".to_string(), SortOrder::Descending),
                ("name".to_string(), SortOrder::Ascending),
            ]
        );
    }

    #[test]
    fn rejects_bad_direction() {
        assert!(parse_sort(&json!({"age": 0})).is_err());
        assert!(parse_sort(&json!(["age"])).is_err());
    }

    #[test]
    fn sorts_ascending_with_stable_ties() {
        let mut rows = vec![
            fields(json!({"name": "b", "n": 0})),
            fields(json!({"name": "a", "n": 1})),
            fields(json!({"name": "a", "n": 2})),
        ];
        let spec = parse_sort(&json!({"name": 1})).unwrap();
        rows.sort_by(sorter(&spec));
        let ns: Vec<i64> = rows.iter().map(|r| r["n"].as_i64().unwrap()).collect();
        // equal names keep their original relative order
        assert_eq!(ns, vec![1, 2, 0]);
    }

    #[test]
    fn secondary_field_breaks_primary_ties() {
        let mut rows = vec![
            fields(json!({"group": 1, "name": "z"})),
            fields(json!({"group": 1, "name": "a"})),
            fields(json!({"group": 0, "name": "m"})),
        ];
        let spec = parse_sort(&json!({"group": 1, "name": 1})).unwrap();
        rows.sort_by(sorter(&spec));
        let names: Vec<&str> = rows.iter().map(|r| r["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["m", "a", "z"]);
    }

    #[test]
    fn missing_fields_sort_first_ascending() {
        let mut rows = vec![
            fields(json!({"name": "a"})),
            fields(json!({"other": true})),
        ];
        let spec = parse_sort(&json!({"name": 1})).unwrap();
        rows.sort_by(sorter(&spec));
        assert!(rows[0].get("name").is_none());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // sorting ascending yields a non-decreasing sequence
            #[test]
            fn ascending_is_non_decreasing(values in prop::collection::vec(-100i64..100, 0..20)) {
                let mut rows: Vec<Fields> =
                    values.iter().map(|v| fields(json!({"n": v}))).collect();
                let spec = parse_sort(&json!({"n": 1})).unwrap();
                rows.sort_by(sorter(&spec));
                let sorted: Vec<i64> = rows.iter().map(|r| r["n"].as_i64().unwrap()).collect();
                prop_assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
            }

            // descending is the reverse of ascending for distinct keys
            #[test]
            fn descending_reverses_ascending(values in prop::collection::hash_set(-100i64..100, 0..20)) {
                let rows: Vec<Fields> =
                    values.iter().map(|v| fields(json!({"n": v}))).collect();
                let asc_spec = parse_sort(&json!({"n": 1})).unwrap();
                let desc_spec = parse_sort(&json!({"n": -1})).unwrap();

                let mut asc = rows.clone();
                asc.sort_by(sorter(&asc_spec));
                let mut desc = rows;
                desc.sort_by(sorter(&desc_spec));
                desc.reverse();

                prop_assert_eq!(asc, desc);
            }
        }
    }
}
