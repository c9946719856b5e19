//! Text encoding for values stored in the remote backend.
//!
//! Plain strings are stored as-is so that keys written by other tools stay
//! readable. Everything else, including strings that would themselves parse
//! as JSON (`"123"`, `"true"`, `"[1]"`), is stored as JSON text. Decoding
//! parses JSON first and falls back to a raw string, which makes the
//! round-trip lossless for every value.

use serde_json::Value;

/// Encode a value for storage as a Redis string.
pub fn encode(value: &Value) -> String {
    match value {
        Value::String(s) if serde_json::from_str::<Value>(s).is_err() => s.clone(),
        other => other.to_string(),
    }
}

/// Decode a stored Redis string.
pub fn decode(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_is_stored_raw() {
        assert_eq!(encode(&json!("diabetes is a chronic condition")), "diabetes is a chronic condition");
    }

    #[test]
    fn structured_values_are_json() {
        assert_eq!(encode(&json!({"a": 1})), r#"{"a":1}"#);
        assert_eq!(encode(&json!(42)), "42");
        assert_eq!(encode(&json!(null)), "null");
    }

    #[test]
    fn json_looking_strings_survive() {
        for s in ["123", "true", "null", "[1,2]", "\"quoted\"", "{}"] {
            let value = json!(s);
            assert_eq!(decode(&encode(&value)), value, "string {s:?}");
        }
    }

    #[test]
    fn mixed_values_survive() {
        let values = [
            json!("plain"),
            json!(""),
            json!(3.5),
            json!(false),
            json!(["a", 1, null]),
            json!({"user": {"id": 42, "tags": ["x"]}}),
        ];
        for value in values {
            assert_eq!(decode(&encode(&value)), value);
        }
    }
}
