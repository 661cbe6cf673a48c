//! Documents read from and written to the document store.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-generated opaque identifier.
    pub id: String,
    /// Schema-less field map.
    pub fields: Fields,
}

impl Document {
    /// Create a document from its ID and field map.
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Get a field, treating an explicit null as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|value| !value.is_null())
    }

    /// Get a string field. Non-string values are treated as absent.
    pub fn string(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    /// Get a numeric field.
    ///
    /// Accepts JSON numbers and numeric strings. Anything else is logged and
    /// treated as absent so one malformed field never poisons the document.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.field(name)? {
            Value::Number(number) => number.as_f64(),
            Value::String(raw) => match raw.trim().parse::<f64>() {
                Ok(parsed) if parsed.is_finite() => Some(parsed),
                _ => {
                    warn!("Ignoring unparseable number {:?} in {}.{}", raw, self.id, name);
                    None
                }
            },
            other => {
                warn!("Ignoring non-numeric value {} in {}.{}", other, self.id, name);
                None
            }
        }
    }

    /// Names of all fields carried by the document.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }
}

/// Data for a create/set/update call.
///
/// Fields named through [`DocumentData::server_timestamp`] are filled in by
/// the store at write time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentData {
    fields: Fields,
    server_timestamps: Vec<String>,
}

impl DocumentData {
    /// Create empty write data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Ask the store to stamp `name` with its own clock.
    pub fn server_timestamp(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.fields.remove(&name);
        if !self.server_timestamps.contains(&name) {
            self.server_timestamps.push(name);
        }
        self
    }

    /// Plain field values.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Fields stamped by the store.
    pub fn server_timestamp_fields(&self) -> &[String] {
        &self.server_timestamps
    }

    /// Every field path touched by this write.
    pub fn field_paths(&self) -> Vec<String> {
        self.fields
            .keys()
            .cloned()
            .chain(self.server_timestamps.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        let Value::Object(fields) = value else {
            panic!("fixture must be an object");
        };
        Document::new("doc-1", fields)
    }

    #[test]
    fn test_null_fields_are_absent() {
        let d = doc(json!({"email": null, "role": "admin"}));
        assert!(d.field("email").is_none());
        assert_eq!(d.string("role"), Some("admin"));
    }

    #[test]
    fn test_number_accepts_strings_and_numbers() {
        let d = doc(json!({"lat": 10.5, "lng": "20.25", "budget": 300}));
        assert_eq!(d.number("lat"), Some(10.5));
        assert_eq!(d.number("lng"), Some(20.25));
        assert_eq!(d.number("budget"), Some(300.0));
    }

    #[test]
    fn test_malformed_number_is_absent() {
        let d = doc(json!({"surface": "twelve", "budget": [1, 2]}));
        assert_eq!(d.number("surface"), None);
        assert_eq!(d.number("budget"), None);
    }

    #[test]
    fn test_server_timestamp_replaces_plain_value() {
        let data = DocumentData::new()
            .with("updatedAt", "yesterday")
            .with("email", "a@x.com")
            .server_timestamp("updatedAt");

        assert!(data.fields().get("updatedAt").is_none());
        assert_eq!(
            data.server_timestamp_fields().to_vec(),
            vec!["updatedAt".to_string()]
        );
        assert_eq!(data.field_paths().len(), 2);
    }
}
