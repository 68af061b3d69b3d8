//! Shared data types for the settings protocol

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A wrapper for serde_json::Value that serializes as a JSON string for bincode compatibility.
///
/// Bincode doesn't support `deserialize_any` which `serde_json::Value` requires.
/// This wrapper serializes the JSON value as a string, which bincode can handle.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonValue(pub serde_json::Value);

impl JsonValue {
    /// Create a new JsonValue from a serde_json::Value
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Get a reference to the inner value
    pub fn inner(&self) -> &serde_json::Value {
        &self.0
    }

    /// Consume the wrapper and return the inner value
    pub fn into_inner(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for JsonValue {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

impl From<JsonValue> for serde_json::Value {
    fn from(value: JsonValue) -> Self {
        value.0
    }
}

impl std::ops::Deref for JsonValue {
    type Target = serde_json::Value;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for JsonValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Serialize as a JSON string for bincode compatibility
        let json_string = serde_json::to_string(&self.0).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&json_string)
    }
}

impl<'de> Deserialize<'de> for JsonValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Deserialize from a JSON string
        let json_string = String::deserialize(deserializer)?;
        let value: serde_json::Value =
            serde_json::from_str(&json_string).map_err(serde::de::Error::custom)?;
        Ok(Self(value))
    }
}

/// A set of changed settings: dotted key to new value.
///
/// BTreeMap so receivers apply multi-key notifications in dotted-key order.
/// A removed key is carried as JSON `null`.
pub type ChangeSet = BTreeMap<String, JsonValue>;

/// Type of connected session
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClientKind {
    /// Desktop application
    Desktop,
    /// Tablet / touch UI
    Tablet,
    /// Secondary browser tab
    Browser,
    /// Command-line tool
    Cli,
    /// Unknown or legacy client
    Unknown,
}

/// Flatten a JSON object into dotted leaf keys.
///
/// A leaf is anything that is not a non-empty object: scalars, arrays,
/// `null`, and empty objects all terminate a path. `flatten_value(body)`
/// on `{"probe": {"zThickness": 15}}` yields `[("probe.zThickness", 15)]`.
/// An empty root object yields no leaves; a non-object root is a single
/// leaf with an empty key.
pub fn flatten_value(value: &serde_json::Value) -> Vec<(String, serde_json::Value)> {
    let mut out = Vec::new();
    match value {
        serde_json::Value::Object(map) => {
            for (key, child) in map {
                flatten_into(key, child, &mut out);
            }
        }
        other => out.push((String::new(), other.clone())),
    }
    out
}

fn flatten_into(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, serde_json::Value)>) {
    match value {
        serde_json::Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                let path = format!("{}.{}", prefix, key);
                flatten_into(&path, child, out);
            }
        }
        other => out.push((prefix.to_string(), other.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==================== JsonValue Tests ====================

    #[test]
    fn test_json_value_bincode_roundtrip() {
        let value = JsonValue::new(json!({"units": "mm", "safeHeight": 10.5}));
        let bytes = bincode::serialize(&value).unwrap();
        let decoded: JsonValue = bincode::deserialize(&bytes).unwrap();
        assert_eq!(value, decoded);
    }

    #[test]
    fn test_json_value_scalar_roundtrip() {
        for value in [json!(true), json!(42), json!("dark"), json!(null)] {
            let wrapped = JsonValue::new(value.clone());
            let bytes = bincode::serialize(&wrapped).unwrap();
            let decoded: JsonValue = bincode::deserialize(&bytes).unwrap();
            assert_eq!(decoded.into_inner(), value);
        }
    }

    #[test]
    fn test_json_value_deref() {
        let value = JsonValue::new(json!({"theme": "dark"}));
        assert_eq!(value.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_json_value_conversions() {
        let raw = json!([1, 2, 3]);
        let wrapped: JsonValue = raw.clone().into();
        let back: serde_json::Value = wrapped.into();
        assert_eq!(back, raw);
    }

    // ==================== ChangeSet Tests ====================

    #[test]
    fn test_change_set_iterates_in_dotted_key_order() {
        let mut changes = ChangeSet::new();
        changes.insert("workspace.units".into(), JsonValue::new(json!("mm")));
        changes.insert("theme".into(), JsonValue::new(json!("dark")));
        changes.insert("workspace.park.z".into(), JsonValue::new(json!(5)));

        let keys: Vec<&str> = changes.keys().map(String::as_str).collect();
        assert_eq!(keys, ["theme", "workspace.park.z", "workspace.units"]);
    }

    // ==================== ClientKind Tests ====================

    #[test]
    fn test_client_kind_serde() {
        let kind = ClientKind::Tablet;
        let bytes = bincode::serialize(&kind).unwrap();
        let decoded: ClientKind = bincode::deserialize(&bytes).unwrap();
        assert_eq!(kind, decoded);
    }

    // ==================== flatten_value Tests ====================

    #[test]
    fn test_flatten_nested_object() {
        let body = json!({
            "workspace": {
                "units": "mm",
                "probeProfile": {"zThickness": 15.0}
            }
        });

        let mut flat = flatten_value(&body);
        flat.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(
            flat,
            vec![
                ("workspace.probeProfile.zThickness".to_string(), json!(15.0)),
                ("workspace.units".to_string(), json!("mm")),
            ]
        );
    }

    #[test]
    fn test_flatten_arrays_are_leaves() {
        let body = json!({"toolChange": {"hooks": ["pre", "post"]}});
        let flat = flatten_value(&body);
        assert_eq!(
            flat,
            vec![("toolChange.hooks".to_string(), json!(["pre", "post"]))]
        );
    }

    #[test]
    fn test_flatten_empty_object_is_leaf() {
        let body = json!({"park": {}});
        let flat = flatten_value(&body);
        assert_eq!(flat, vec![("park".to_string(), json!({}))]);
    }

    #[test]
    fn test_flatten_scalar_root() {
        let flat = flatten_value(&json!(42));
        assert_eq!(flat, vec![(String::new(), json!(42))]);
    }

    #[test]
    fn test_flatten_empty_root_has_no_leaves() {
        assert!(flatten_value(&json!({})).is_empty());
    }

    #[test]
    fn test_flatten_null_is_leaf() {
        let body = json!({"spindle": {"rpm": null}});
        let flat = flatten_value(&body);
        assert_eq!(flat, vec![("spindle.rpm".to_string(), json!(null))]);
    }
}
