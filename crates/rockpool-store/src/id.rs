//! Record identities: permanent server-assigned ids and generated temp ids.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Global counter for temp-id clock bits to ensure uniqueness within a process.
static TEMP_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A permanent, server-assigned record identity.
///
/// Identity fields arrive as JSON, so both integer and string ids are
/// supported. Non-integer numbers are carried as their string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Str(String),
}

impl RecordId {
    /// Extract an identity from a JSON value, if it holds one.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(RecordId::Int(i)),
                None => Some(RecordId::Str(n.to_string())),
            },
            Value::String(s) => Some(RecordId::Str(s.clone())),
            _ => None,
        }
    }

    /// The identity as a JSON value, for writing back into a field map.
    pub fn to_value(&self) -> Value {
        match self {
            RecordId::Int(i) => Value::from(*i),
            RecordId::Str(s) => Value::from(s.clone()),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordId::Int(i) => write!(f, "{i}"),
            RecordId::Str(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RecordId {
    fn from(i: i64) -> Self {
        RecordId::Int(i)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

/// A client-generated placeholder identity for a record the server has not
/// confirmed yet.
///
/// Temp ids are 13 characters of base32-sortable encoding containing:
/// - 53 bits of microsecond timestamp
/// - 10 bits of clock identifier (for collision prevention)
///
/// Generation order is therefore lexicographic order, so temps list in
/// creation order wherever they are sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(pub String);

impl TempId {
    /// Generate a new temp id based on current time with a unique clock
    /// identifier.
    pub fn next() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};

        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64;

        // Counter wraps at 1024 (10 bits), which handles up to 1024 temp
        // ids per microsecond within one process.
        let clock_id = TEMP_ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0x3FF;

        Self::from_u64((micros << 10) | clock_id)
    }

    /// Encode a raw 63-bit value as 13 base32-sortable characters.
    fn from_u64(val: u64) -> Self {
        const CHARSET: &[u8] = b"234567abcdefghijklmnopqrstuvwxyz";
        let mut encoded = String::with_capacity(13);

        let mut v = val;
        for _ in 0..13 {
            encoded.push(CHARSET[(v & 0x1f) as usize] as char);
            v >>= 5;
        }

        Self(encoded.chars().rev().collect())
    }
}

impl std::fmt::Display for TempId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TempId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TempId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The key a record is placed under in a table: its permanent identity if
/// it has one, else its temp identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    Id(RecordId),
    Temp(TempId),
}

impl RecordKey {
    /// The permanent identity, if this key holds one.
    pub fn id(&self) -> Option<&RecordId> {
        match self {
            RecordKey::Id(id) => Some(id),
            RecordKey::Temp(_) => None,
        }
    }

    /// The temp identity, if this key holds one.
    pub fn temp(&self) -> Option<&TempId> {
        match self {
            RecordKey::Id(_) => None,
            RecordKey::Temp(temp) => Some(temp),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKey::Id(id) => write!(f, "{id}"),
            RecordKey::Temp(temp) => write!(f, "{temp}"),
        }
    }
}

impl From<RecordId> for RecordKey {
    fn from(id: RecordId) -> Self {
        RecordKey::Id(id)
    }
}

impl From<TempId> for RecordKey {
    fn from(temp: TempId) -> Self {
        RecordKey::Temp(temp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn extracts_int_and_string_ids() {
        assert_eq!(RecordId::from_value(&json!(7)), Some(RecordId::Int(7)));
        assert_eq!(
            RecordId::from_value(&json!("abc")),
            Some(RecordId::Str("abc".to_string()))
        );
        assert_eq!(RecordId::from_value(&json!(null)), None);
        assert_eq!(RecordId::from_value(&json!({})), None);
    }

    #[test]
    fn temp_ids_are_13_chars() {
        let temp = TempId::next();
        assert_eq!(temp.0.len(), 13);
    }

    #[test]
    fn temp_ids_are_unique() {
        let ids: Vec<TempId> = (0..1000).map(|_| TempId::next()).collect();
        let mut deduped = ids.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
    }

    #[test]
    fn temp_ids_sort_by_generation_order() {
        let earlier = TempId::from_u64(1000 << 10);
        let later = TempId::from_u64(2000 << 10);
        assert!(earlier < later);
    }

    #[test]
    fn key_display_is_the_raw_identity() {
        assert_eq!(RecordKey::Id(RecordId::Int(3)).to_string(), "3");
        assert_eq!(RecordKey::Temp(TempId::from("t1")).to_string(), "t1");
    }
}
