//! Conversion between plain JSON and Firestore typed values.

use serde_json::{json, Map, Number, Value};

use crate::document::Fields;

/// Encode a plain JSON value as a Firestore `Value`.
pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode a field map.
pub fn encode_fields(fields: &Fields) -> Value {
    let encoded: Map<String, Value> = fields
        .iter()
        .map(|(name, value)| (name.clone(), encode(value)))
        .collect();
    Value::Object(encoded)
}

/// Decode a Firestore `Value` into plain JSON.
///
/// Unknown value kinds decode to null.
pub fn decode(value: &Value) -> Value {
    let Some(object) = value.as_object() else {
        return Value::Null;
    };

    if let Some(s) = object.get("stringValue").and_then(Value::as_str) {
        return Value::String(s.to_string());
    }
    if let Some(raw) = object.get("integerValue") {
        let parsed = match raw {
            Value::String(s) => s.parse::<i64>().ok(),
            Value::Number(n) => n.as_i64(),
            _ => None,
        };
        return parsed.map(Value::from).unwrap_or(Value::Null);
    }
    if let Some(raw) = object.get("doubleValue") {
        let parsed = match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse::<f64>().ok(),
            _ => None,
        };
        return parsed
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
    }
    if let Some(b) = object.get("booleanValue").and_then(Value::as_bool) {
        return Value::Bool(b);
    }
    if let Some(ts) = object.get("timestampValue").and_then(Value::as_str) {
        return Value::String(ts.to_string());
    }
    if let Some(reference) = object.get("referenceValue").and_then(Value::as_str) {
        return Value::String(reference.to_string());
    }
    if let Some(bytes) = object.get("bytesValue").and_then(Value::as_str) {
        return Value::String(bytes.to_string());
    }
    if let Some(point) = object.get("geoPointValue") {
        return json!({
            "latitude": point.get("latitude").cloned().unwrap_or(Value::Null),
            "longitude": point.get("longitude").cloned().unwrap_or(Value::Null),
        });
    }
    if let Some(array) = object.get("arrayValue") {
        let values = array
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode).collect())
            .unwrap_or_default();
        return Value::Array(values);
    }
    if let Some(map) = object.get("mapValue") {
        return Value::Object(
            map.get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        );
    }

    Value::Null
}

/// Decode an encoded field map.
pub fn decode_fields(fields: &Map<String, Value>) -> Fields {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), decode(value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integers_are_strings_on_the_wire() {
        assert_eq!(encode(&json!(42)), json!({ "integerValue": "42" }));
        assert_eq!(decode(&json!({ "integerValue": "42" })), json!(42));
    }

    #[test]
    fn test_doubles_keep_precision() {
        assert_eq!(encode(&json!(10.25)), json!({ "doubleValue": 10.25 }));
        assert_eq!(decode(&json!({ "doubleValue": 10.25 })), json!(10.25));
    }

    #[test]
    fn test_nested_photo_list() {
        let photos = json!([
            "http://x/1.jpg",
            { "url": "http://x/2.jpg", "description": "front" }
        ]);
        let encoded = encode(&photos);
        assert!(encoded["arrayValue"]["values"][1]["mapValue"]["fields"]["url"]["stringValue"]
            .is_string());
        assert_eq!(decode(&encoded), photos);
    }

    #[test]
    fn test_empty_containers_decode() {
        assert_eq!(decode(&json!({ "arrayValue": {} })), json!([]));
        assert_eq!(decode(&json!({ "mapValue": {} })), json!({}));
    }

    #[test]
    fn test_server_values_decode() {
        assert_eq!(
            decode(&json!({ "timestampValue": "2024-01-01T00:00:00Z" })),
            json!("2024-01-01T00:00:00Z")
        );
        assert_eq!(decode(&json!({ "nullValue": null })), Value::Null);
        assert_eq!(decode(&json!({ "somethingNew": 1 })), Value::Null);
    }
}
