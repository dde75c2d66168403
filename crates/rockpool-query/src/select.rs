//! `$select` field projection.

use crate::Fields;

/// Project a field map down to the selected fields.
///
/// Fields named in `always` (the identity field, a temp-identity alias)
/// are retained whether or not they were selected, so projected records
/// stay addressable.
pub fn project(fields: &Fields, selected: &[String], always: &[&str]) -> Fields {
    let mut out = Fields::new();
    for (key, value) in fields {
        let keep = selected.iter().any(|s| s == key) || always.contains(&key.as_str());
        if keep {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}
