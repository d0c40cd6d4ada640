//! JSON encoding of handler results.
//!
//! Encoders are tried in registration order, each one declares the runtime
//! type it handles and the first match wins. An encoder for `T` also renders
//! lists, options and string-keyed maps of `T`, fields of other structs still
//! go through serde. Values no encoder claims fall back to their serde
//! `Serialize` implementation, which covers dates, enumerations and plain
//! structs.

use crate::error::WebError;
use serde::Serialize;
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub trait JsonEncoder: Send + Sync {
    /// The type this encoder handles.
    fn target_type(&self) -> TypeId;

    /// `None` when `value` is not of the target type or a container of it.
    fn encode(&self, value: &dyn Any) -> Option<Value>;
}

pub struct TypedEncoder<T, F> {
    f: F,
    _phantom: PhantomData<fn(&T)>,
}

/// An encoder for values of type `T`.
pub fn encoder_for<T, F>(f: F) -> TypedEncoder<T, F>
where
    T: 'static,
    F: Fn(&T) -> Value + Send + Sync,
{
    TypedEncoder { f, _phantom: PhantomData }
}

impl<T, F> JsonEncoder for TypedEncoder<T, F>
where
    T: 'static,
    F: Fn(&T) -> Value + Send + Sync,
{
    fn target_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn encode(&self, value: &dyn Any) -> Option<Value> {
        if let Some(value) = value.downcast_ref::<T>() {
            return Some((self.f)(value));
        }
        if let Some(list) = value.downcast_ref::<Vec<T>>() {
            return Some(Value::Array(list.iter().map(&self.f).collect()));
        }
        if let Some(list) = value.downcast_ref::<Vec<Option<T>>>() {
            return Some(Value::Array(list.iter().map(|v| self.encode_option(v.as_ref())).collect()));
        }
        if let Some(option) = value.downcast_ref::<Option<T>>() {
            return Some(self.encode_option(option.as_ref()));
        }
        if let Some(map) = value.downcast_ref::<HashMap<String, T>>() {
            return Some(Value::Object(map.iter().map(|(k, v)| (k.clone(), (self.f)(v))).collect()));
        }
        value
            .downcast_ref::<BTreeMap<String, T>>()
            .map(|map| Value::Object(map.iter().map(|(k, v)| (k.clone(), (self.f)(v))).collect()))
    }
}

impl<T, F> TypedEncoder<T, F>
where
    F: Fn(&T) -> Value,
{
    fn encode_option(&self, value: Option<&T>) -> Value {
        value.map_or(Value::Null, &self.f)
    }
}

impl<T, F> fmt::Debug for TypedEncoder<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedEncoder").field("target", &std::any::type_name::<T>()).finish()
    }
}

#[derive(Clone, Default)]
pub struct JsonEncoders {
    inner: Vec<Arc<dyn JsonEncoder>>,
}

impl fmt::Debug for JsonEncoders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonEncoders").field("len", &self.inner.len()).finish()
    }
}

impl JsonEncoders {
    pub fn push<E: JsonEncoder + 'static>(&mut self, encoder: E) {
        self.inner.push(Arc::new(encoder));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn encode<T: Serialize + 'static>(&self, value: &T) -> Result<Value, WebError> {
        if let Some(value) = self.inner.iter().find_map(|encoder| encoder.encode(value)) {
            return Ok(value);
        }

        serde_json::to_value(value).map_err(WebError::fault)
    }
}

#[cfg(test)]
mod tests {
    use super::{JsonEncoders, encoder_for};
    use serde::Serialize;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[derive(Serialize)]
    #[serde(rename_all = "lowercase")]
    enum Color {
        Red,
    }

    #[derive(Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_serde_fallback() {
        let encoders = JsonEncoders::default();
        assert_eq!(encoders.encode(&Color::Red).unwrap(), json!("red"));
        assert_eq!(encoders.encode(&Point { x: 1, y: 2 }).unwrap(), json!({"x": 1, "y": 2}));
    }

    #[test]
    fn test_first_matching_encoder_wins() {
        let mut encoders = JsonEncoders::default();
        encoders.push(encoder_for(|p: &Point| json!([p.x, p.y])));
        encoders.push(encoder_for(|_: &Point| json!("never")));

        assert_eq!(encoders.encode(&Point { x: 1, y: 2 }).unwrap(), json!([1, 2]));
        // other types are left to serde
        assert_eq!(encoders.encode(&3).unwrap(), json!(3));
    }

    #[test]
    fn test_encoders_apply_to_elements() {
        let mut encoders = JsonEncoders::default();
        encoders.push(encoder_for(|p: &Point| json!(format!("{},{}", p.x, p.y))));

        let points = vec![Point { x: 1, y: 2 }, Point { x: 3, y: 4 }];
        assert_eq!(encoders.encode(&points).unwrap(), json!(["1,2", "3,4"]));
        assert_eq!(encoders.encode(&Some(Point { x: 0, y: 0 })).unwrap(), json!("0,0"));
        assert_eq!(encoders.encode(&None::<Point>).unwrap(), json!(null));
        assert_eq!(encoders.encode(&vec![Some(Point { x: 5, y: 6 }), None]).unwrap(), json!(["5,6", null]));

        let mut map = BTreeMap::new();
        map.insert("home".to_string(), Point { x: 7, y: 8 });
        assert_eq!(encoders.encode(&map).unwrap(), json!({"home": "7,8"}));

        // a struct holding points is left to serde
        #[derive(Serialize)]
        struct Path {
            points: Vec<Point>,
        }
        assert_eq!(encoders.encode(&Path { points: vec![Point { x: 1, y: 1 }] }).unwrap(), json!({"points": [{"x": 1, "y": 1}]}));
    }

    #[test]
    fn test_serialize_failure_is_a_fault() {
        let mut map = BTreeMap::new();
        map.insert(vec![1], 1);
        let encoders = JsonEncoders::default();
        assert!(encoders.encode(&map).is_err());
    }
}
