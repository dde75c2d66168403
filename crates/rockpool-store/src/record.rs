//! The record type: an open field map plus store-managed metadata.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use rockpool_query::{Fields, project};

use crate::error::StoreError;
use crate::id::{RecordId, RecordKey, TempId};

/// One logical entity: named JSON fields plus reserved metadata.
///
/// The permanent identity lives inside the field map under the store's
/// configured id field. The temp identity and clone flag are metadata the
/// store manages; they are not serialized with the fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(flatten)]
    fields: Fields,
    #[serde(skip)]
    temp_id: Option<TempId>,
    #[serde(skip)]
    is_clone: bool,
}

impl Record {
    /// Create a record from a field map.
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            temp_id: None,
            is_clone: false,
        }
    }

    /// Create a record from a JSON value, which must be an object.
    pub fn from_value(value: Value) -> Result<Self, StoreError> {
        match value {
            Value::Object(fields) => Ok(Self::new(fields)),
            Value::Null => Err(StoreError::NotAnObject("null")),
            Value::Bool(_) => Err(StoreError::NotAnObject("a boolean")),
            Value::Number(_) => Err(StoreError::NotAnObject("a number")),
            Value::String(_) => Err(StoreError::NotAnObject("a string")),
            Value::Array(_) => Err(StoreError::NotAnObject("an array")),
        }
    }

    /// The record's fields.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Mutable access to the record's fields.
    ///
    /// Store invariants (identity placement, clone existence) are only
    /// maintained when mutations go through the store's operations.
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }

    /// Read a single field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Write a single field.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    /// The fields as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// The permanent identity, if the id field holds one.
    pub fn id(&self, id_field: &str) -> Option<RecordId> {
        self.fields.get(id_field).and_then(RecordId::from_value)
    }

    /// True iff the permanent identity is absent.
    pub fn is_temporary(&self, id_field: &str) -> bool {
        self.id(id_field).is_none()
    }

    /// The temp identity, if one has been assigned.
    pub fn temp_id(&self) -> Option<&TempId> {
        self.temp_id.as_ref()
    }

    /// Attach a temp identity, e.g. when a server response must be matched
    /// back to the temp record it confirms.
    pub fn with_temp_id(mut self, temp: TempId) -> Self {
        self.temp_id = Some(temp);
        self
    }

    pub(crate) fn set_temp_id(&mut self, temp: TempId) {
        self.temp_id = Some(temp);
    }

    /// Assign a temp identity once; later calls keep the existing one.
    pub fn ensure_temp_id(&mut self) -> &TempId {
        self.temp_id.get_or_insert_with(TempId::next)
    }

    /// Whether this record is an editable snapshot.
    pub fn is_clone(&self) -> bool {
        self.is_clone
    }

    pub(crate) fn mark_clone(&mut self, is_clone: bool) {
        self.is_clone = is_clone;
    }

    /// The table-placement key: permanent identity if present, else the
    /// temp identity.
    pub fn key(&self, id_field: &str) -> Option<RecordKey> {
        match self.id(id_field) {
            Some(id) => Some(RecordKey::Id(id)),
            None => self.temp_id.clone().map(RecordKey::Temp),
        }
    }

    /// Shallow-overwrite matching fields from `incoming`; unrelated fields
    /// are untouched.
    pub fn merge_fields(&mut self, incoming: &Fields) {
        for (key, value) in incoming {
            self.fields.insert(key.clone(), value.clone());
        }
    }

    /// A projected copy holding only `selected` fields plus the id field.
    /// Metadata is preserved so the projection stays addressable.
    pub fn select(&self, selected: &[String], id_field: &str) -> Record {
        Record {
            fields: project(&self.fields, selected, &[id_field]),
            temp_id: self.temp_id.clone(),
            is_clone: self.is_clone,
        }
    }
}

impl From<Fields> for Record {
    fn from(fields: Fields) -> Self {
        Self::new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(value: Value) -> Record {
        Record::from_value(value).unwrap()
    }

    #[test]
    fn rejects_non_object_data() {
        assert!(Record::from_value(json!([1])).is_err());
        assert!(Record::from_value(json!("x")).is_err());
        assert!(Record::from_value(json!(null)).is_err());
    }

    #[test]
    fn identity_comes_from_the_configured_field() {
        let r = record(json!({"uuid": "u1", "id": 9}));
        assert_eq!(r.id("uuid"), Some(RecordId::from("u1")));
        assert_eq!(r.id("id"), Some(RecordId::from(9)));
        assert!(r.id("missing").is_none());
    }

    #[test]
    fn null_identity_is_temporary() {
        let r = record(json!({"id": null, "name": "a"}));
        assert!(r.is_temporary("id"));
    }

    #[test]
    fn temp_id_is_assigned_once() {
        let mut r = record(json!({"name": "a"}));
        let first = r.ensure_temp_id().clone();
        let second = r.ensure_temp_id().clone();
        assert_eq!(first, second);
    }

    #[test]
    fn key_prefers_permanent_identity() {
        let mut r = record(json!({"name": "a"}));
        r.ensure_temp_id();
        assert!(matches!(r.key("id"), Some(RecordKey::Temp(_))));

        r.set("id", json!(4));
        assert_eq!(r.key("id"), Some(RecordKey::Id(RecordId::Int(4))));
    }

    #[test]
    fn merge_overwrites_only_matching_fields() {
        let mut r = record(json!({"id": 1, "name": "a", "age": 3}));
        let incoming = json!({"name": "b"}).as_object().unwrap().clone();
        r.merge_fields(&incoming);
        assert_eq!(r.to_value(), json!({"id": 1, "name": "b", "age": 3}));
    }

    #[test]
    fn select_retains_identity_field() {
        let r = record(json!({"id": 1, "name": "a", "secret": "x"}));
        let projected = r.select(&["name".to_string()], "id");
        assert_eq!(projected.to_value(), json!({"id": 1, "name": "a"}));
    }

    #[test]
    fn serializes_as_plain_fields() {
        let mut r = record(json!({"id": 1, "name": "a"}));
        r.ensure_temp_id();
        let serialized = serde_json::to_value(&r).unwrap();
        assert_eq!(serialized, json!({"id": 1, "name": "a"}));
    }
}
