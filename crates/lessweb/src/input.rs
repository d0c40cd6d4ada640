//! Raw request input values and the parsers producing them.

use serde_json::Value;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::warn;

/// A raw input value before coercion.
///
/// Query strings and form bodies produce text, repeated keys produce a text
/// list. JSON bodies and values injected by interceptors are already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Text(String),
    Texts(Vec<String>),
    Json(Value),
}

pub type InputMap = HashMap<String, InputValue>;

impl InputValue {
    /// The textual form of this input, the last one for text lists.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            InputValue::Text(s) => Some(s),
            InputValue::Texts(list) => list.last().map(String::as_str),
            InputValue::Json(Value::String(s)) => Some(s),
            InputValue::Json(_) => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            InputValue::Text(s) => Value::String(s.clone()),
            InputValue::Texts(list) => Value::Array(list.iter().cloned().map(Value::String).collect()),
            InputValue::Json(v) => v.clone(),
        }
    }

    fn push_text(&mut self, text: String) {
        match self {
            InputValue::Text(first) => *self = InputValue::Texts(vec![std::mem::take(first), text]),
            InputValue::Texts(list) => list.push(text),
            InputValue::Json(_) => *self = InputValue::Text(text),
        }
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        InputValue::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        InputValue::Text(value)
    }
}

impl From<Vec<String>> for InputValue {
    fn from(value: Vec<String>) -> Self {
        InputValue::Texts(value)
    }
}

impl From<Value> for InputValue {
    fn from(value: Value) -> Self {
        InputValue::Json(value)
    }
}

/// Parses `a=1&b=2&a=3` into fields, repeated keys become [`InputValue::Texts`].
///
/// Malformed input yields no fields.
pub(crate) fn parse_urlencoded(bytes: &[u8]) -> InputMap {
    let pairs = match serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes) {
        Ok(pairs) => pairs,
        Err(e) => {
            warn!(cause = %e, "ignore malformed urlencoded input");
            return InputMap::new();
        }
    };

    let mut map = InputMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        insert_text(&mut map, key, value);
    }
    map
}

/// Adds a text field, a repeated key turns into [`InputValue::Texts`].
pub(crate) fn insert_text(map: &mut InputMap, key: String, value: String) {
    match map.entry(key) {
        Entry::Occupied(mut occupied) => occupied.get_mut().push_text(value),
        Entry::Vacant(vacant) => {
            vacant.insert(InputValue::Text(value));
        }
    }
}

/// Parses a JSON object body into fields, any other JSON document yields no fields.
pub(crate) fn parse_json_object(bytes: &[u8]) -> InputMap {
    if bytes.is_empty() {
        return InputMap::new();
    }

    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Object(object)) => object.into_iter().map(|(k, v)| (k, InputValue::Json(v))).collect(),
        Ok(_) => {
            warn!("ignore json body which is not an object");
            InputMap::new()
        }
        Err(e) => {
            warn!(cause = %e, "ignore malformed json body");
            InputMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InputValue, parse_json_object, parse_urlencoded};
    use serde_json::json;

    #[test]
    fn test_urlencoded() {
        let map = parse_urlencoded(b"a=1&b=hello+world&c=%E4%BD%A0");
        assert_eq!(map.len(), 3);
        assert_eq!(map["a"], InputValue::from("1"));
        assert_eq!(map["b"], InputValue::from("hello world"));
        assert_eq!(map["c"], InputValue::from("你"));
    }

    #[test]
    fn test_urlencoded_repeated_keys() {
        let map = parse_urlencoded(b"id=1&id=2&id=3&x=0");
        assert_eq!(map["id"], InputValue::Texts(vec!["1".into(), "2".into(), "3".into()]));
        assert_eq!(map["id"].as_text(), Some("3"));
        assert_eq!(map["x"], InputValue::from("0"));
    }

    #[test]
    fn test_urlencoded_empty() {
        assert!(parse_urlencoded(b"").is_empty());
    }

    #[test]
    fn test_json_object() {
        let map = parse_json_object(br#"{"a": 1, "tags": ["x", "y"], "user": {"name": "z"}}"#);
        assert_eq!(map["a"], InputValue::Json(json!(1)));
        assert_eq!(map["tags"], InputValue::Json(json!(["x", "y"])));
        assert_eq!(map["user"].to_json(), json!({"name": "z"}));
    }

    #[test]
    fn test_json_malformed_or_not_object() {
        assert!(parse_json_object(b"{not json").is_empty());
        assert!(parse_json_object(b"[1, 2]").is_empty());
        assert!(parse_json_object(b"").is_empty());
    }

    #[test]
    fn test_to_json() {
        assert_eq!(InputValue::from("a").to_json(), json!("a"));
        assert_eq!(InputValue::Texts(vec!["a".into(), "b".into()]).to_json(), json!(["a", "b"]));
        assert_eq!(InputValue::Json(json!({"k": 1})).as_text(), None);
    }
}
