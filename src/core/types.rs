//! Field value, record, and event types for miner telemetry.
//!
//! Miners broadcast schema-less JSON objects; no fixed field set is enforced
//! here. A [`MinerRecord`] keeps whatever scalar fields arrived, and typed
//! accessors interpret the conventional ones (`Valid`, `HashRate`, ...).

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// A single scalar telemetry field.
///
/// The wire format carries JSON, but records only admit scalars; null,
/// arrays, and nested objects are dropped during decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer counter or reading.
    Int(i64),
    /// Floating-point reading.
    Float(f64),
    /// Free-form text (rates, difficulties, versions).
    Text(String),
}

impl FieldValue {
    /// Convert a JSON value into a scalar field value.
    ///
    /// Returns `None` for null, arrays, and objects.
    pub fn from_json(value: &Value) -> Option<FieldValue> {
        match value {
            Value::Bool(b) => Some(FieldValue::Bool(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(FieldValue::Int(i))
                } else {
                    n.as_f64().map(FieldValue::Float)
                }
            }
            Value::String(s) => Some(FieldValue::Text(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Integer view of this value. Floats are truncated.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Float(f) if f.is_finite() => Some(*f as i64),
            _ => None,
        }
    }

    /// Floating-point view of this value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(i) => Some(*i as f64),
            FieldValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Text view of this value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view of this value.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Int(i)
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        FieldValue::Float(f)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Bool(b)
    }
}

/// One miner's most recent broadcast payload.
///
/// An update always replaces the whole record for its miner; fields from
/// earlier broadcasts are never merged in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MinerRecord {
    fields: HashMap<String, FieldValue>,
}

impl MinerRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a parsed JSON object, keeping scalar fields only.
    ///
    /// Non-scalar fields are skipped; the count of skipped fields is returned
    /// alongside the record so callers can log it.
    pub fn from_json_object(object: &serde_json::Map<String, Value>) -> (Self, usize) {
        let mut fields = HashMap::with_capacity(object.len());
        let mut skipped = 0;
        for (key, value) in object {
            match FieldValue::from_json(value) {
                Some(v) => {
                    fields.insert(key.clone(), v);
                }
                None => skipped += 1,
            }
        }
        (Self { fields }, skipped)
    }

    /// Insert or replace a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Raw field lookup.
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Integer field lookup.
    pub fn int_field(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(FieldValue::as_i64)
    }

    /// Numeric field lookup.
    pub fn num_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(FieldValue::as_f64)
    }

    /// Text field lookup.
    pub fn text_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(FieldValue::as_str)
    }

    /// Boolean field lookup.
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(FieldValue::as_bool)
    }

    /// Cumulative count of valid blocks reported by the miner (0 if absent).
    pub fn valid_blocks(&self) -> i64 {
        self.int_field("Valid").unwrap_or(0)
    }

    /// Human-readable hashrate string, e.g. `"55.2MH/s"`.
    pub fn hash_rate(&self) -> Option<&str> {
        self.text_field("HashRate")
    }

    /// Best difficulty achieved, as reported text.
    pub fn best_diff(&self) -> Option<&str> {
        self.text_field("BestDiff")
    }

    /// The miner's self-reported address, if present and non-empty.
    pub fn self_reported_ip(&self) -> Option<&str> {
        self.text_field("IP").filter(|ip| !ip.is_empty())
    }

    /// Number of fields in the record.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }
}

/// Miner identifier: the payload's `IP` field, or the datagram source address.
pub type MinerId = String;

/// Immutable point-in-time view of every known miner's latest record.
///
/// Taken with a copy-on-read clone of the store, so later updates never
/// mutate a snapshot a consumer is holding.
pub type MinerSnapshot = Arc<HashMap<MinerId, MinerRecord>>;

/// Domain event name used when forwarding block events to external buses.
pub const BLOCK_FOUND_EVENT: &str = "block_found";

/// Fired when a miner reports more valid blocks than its previous record.
///
/// Transient: published once per detected transition and never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockFoundEvent {
    /// Identifier of the reporting miner.
    pub miner_id: MinerId,
    /// New cumulative valid-block count.
    pub valid_blocks: i64,
    /// Best difficulty string from the triggering record.
    pub best_diff: Option<String>,
    /// Hashrate string from the triggering record.
    pub hashrate: Option<String>,
}

impl BlockFoundEvent {
    /// Build an event from the record that triggered the transition.
    pub fn from_record(miner_id: &str, record: &MinerRecord) -> Self {
        Self {
            miner_id: miner_id.to_string(),
            valid_blocks: record.valid_blocks(),
            best_diff: record.best_diff().map(str::to_string),
            hashrate: record.hash_rate().map(str::to_string),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected JSON object, got {other:?}"),
        }
    }

    #[test]
    fn test_field_value_from_json_scalars() {
        assert_eq!(
            FieldValue::from_json(&json!(true)),
            Some(FieldValue::Bool(true))
        );
        assert_eq!(FieldValue::from_json(&json!(7)), Some(FieldValue::Int(7)));
        assert_eq!(
            FieldValue::from_json(&json!(0.5)),
            Some(FieldValue::Float(0.5))
        );
        assert_eq!(
            FieldValue::from_json(&json!("12.3M")),
            Some(FieldValue::Text("12.3M".to_string()))
        );
    }

    #[test]
    fn test_field_value_from_json_rejects_non_scalars() {
        assert_eq!(FieldValue::from_json(&Value::Null), None);
        assert_eq!(FieldValue::from_json(&json!([1, 2])), None);
        assert_eq!(FieldValue::from_json(&json!({"a": 1})), None);
    }

    #[test]
    fn test_record_from_json_object_skips_non_scalars() {
        let obj = object(json!({
            "IP": "192.168.1.50",
            "Valid": 3,
            "Temp": 54.5,
            "Nested": {"x": 1},
            "List": [1, 2]
        }));
        let (record, skipped) = MinerRecord::from_json_object(&obj);

        assert_eq!(record.len(), 3);
        assert_eq!(skipped, 2);
        assert_eq!(record.self_reported_ip(), Some("192.168.1.50"));
        assert_eq!(record.valid_blocks(), 3);
        assert_eq!(record.num_field("Temp"), Some(54.5));
    }

    #[test]
    fn test_valid_blocks_defaults_to_zero() {
        let record = MinerRecord::new();
        assert_eq!(record.valid_blocks(), 0);
    }

    #[test]
    fn test_valid_blocks_truncates_float() {
        let mut record = MinerRecord::new();
        record.insert("Valid", 2.9);
        assert_eq!(record.valid_blocks(), 2);
    }

    #[test]
    fn test_empty_self_reported_ip_is_none() {
        let mut record = MinerRecord::new();
        record.insert("IP", "");
        assert_eq!(record.self_reported_ip(), None);
    }

    #[test]
    fn test_block_found_event_from_record() {
        let mut record = MinerRecord::new();
        record.insert("Valid", 2i64);
        record.insert("BestDiff", "15.1M");
        record.insert("HashRate", "55.0MH/s");

        let event = BlockFoundEvent::from_record("192.168.1.50", &record);
        assert_eq!(event.miner_id, "192.168.1.50");
        assert_eq!(event.valid_blocks, 2);
        assert_eq!(event.best_diff.as_deref(), Some("15.1M"));
        assert_eq!(event.hashrate.as_deref(), Some("55.0MH/s"));
    }

    #[test]
    fn test_block_found_event_serializes_for_external_bus() {
        let event = BlockFoundEvent {
            miner_id: "10.0.0.2".to_string(),
            valid_blocks: 4,
            best_diff: None,
            hashrate: Some("120K".to_string()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["miner_id"], "10.0.0.2");
        assert_eq!(json["valid_blocks"], 4);
        assert_eq!(json["best_diff"], Value::Null);
        assert_eq!(json["hashrate"], "120K");
    }
}
