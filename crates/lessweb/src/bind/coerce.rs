//! Conversion of raw input into the canonical JSON form of a [`ParamKind`].
//!
//! Coercion produces a [`serde_json::Value`] shaped for the target kind, the
//! typed value is then obtained through [`FromValue`](super::FromValue).
//! Registered [`Coerce`] implementations are consulted first, in
//! registration order, at every level of nesting.

use super::{ModelKind, ParamDescriptor, ParamKind, ScalarKind};
use crate::error::WebError;
use crate::input::InputValue;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;

/// A user supplied conversion tried before the built-in ones.
#[cfg_attr(test, mockall::automock)]
pub trait Coerce: Send + Sync {
    /// `None` declines and passes the input on, `Some(Err(reason))` rejects it.
    fn coerce(&self, input: &InputValue, kind: &ParamKind) -> Option<Result<Value, String>>;
}

pub struct CoercerFn<F> {
    f: F,
}

impl<F> fmt::Debug for CoercerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoercerFn").finish_non_exhaustive()
    }
}

pub fn coercer_fn<F>(f: F) -> CoercerFn<F>
where
    F: Fn(&InputValue, &ParamKind) -> Option<Result<Value, String>> + Send + Sync,
{
    CoercerFn { f }
}

impl<F> Coerce for CoercerFn<F>
where
    F: Fn(&InputValue, &ParamKind) -> Option<Result<Value, String>> + Send + Sync,
{
    fn coerce(&self, input: &InputValue, kind: &ParamKind) -> Option<Result<Value, String>> {
        (self.f)(input, kind)
    }
}

/// The ordered coercer registry of an application.
#[derive(Clone, Default)]
pub struct Coercers {
    inner: Vec<Arc<dyn Coerce>>,
}

impl fmt::Debug for Coercers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coercers").field("len", &self.inner.len()).finish()
    }
}

impl Coercers {
    pub fn push<C: Coerce + 'static>(&mut self, coercer: C) {
        self.inner.push(Arc::new(coercer));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn try_custom(&self, input: &InputValue, kind: &ParamKind) -> Option<Result<Value, String>> {
        self.inner.iter().find_map(|coercer| coercer.coerce(input, kind))
    }
}

/// Coerces `input` into the JSON form of `kind`, `field` names the input in errors.
pub fn coerce(coercers: &Coercers, input: &InputValue, kind: &ParamKind, field: &str) -> Result<Value, WebError> {
    if let Some(result) = coercers.try_custom(input, kind) {
        return result.map_err(|reason| WebError::invalid(field, reason));
    }

    match kind {
        ParamKind::Scalar(scalar) => coerce_scalar(input, *scalar).map_err(|reason| WebError::invalid(field, reason)),
        ParamKind::Optional(inner) => match input {
            InputValue::Json(Value::Null) => Ok(Value::Null),
            _ => coerce(coercers, input, inner, field),
        },
        ParamKind::Sequence(inner) => coerce_sequence(coercers, input, inner, field),
        ParamKind::Mapping(inner) => {
            let object = as_object(input).map_err(|reason| WebError::invalid(field, reason))?;
            let mut out = Map::with_capacity(object.len());
            for (key, value) in object {
                let value = coerce(coercers, &InputValue::Json(value), inner, &format!("{field}.{key}"))?;
                out.insert(key, value);
            }
            Ok(Value::Object(out))
        }
        ParamKind::Model(model) => {
            let object = as_object(input).map_err(|reason| WebError::invalid(field, reason))?;
            coerce_fields(coercers, &object, model, field)
        }
        ParamKind::Json | ParamKind::Custom(_) => Ok(input.to_json()),
        ParamKind::Special(_) | ParamKind::Service(_) | ParamKind::File => {
            Err(WebError::invalid(field, format!("{} can not be read from request input", kind.label())))
        }
    }
}

/// The value of a parameter without input: its default, nothing for optional ones, an error otherwise.
pub(crate) fn absent(coercers: &Coercers, desc: &ParamDescriptor, field: &str) -> Result<Option<Value>, WebError> {
    if let Some(default) = desc.default_value() {
        return coerce(coercers, &InputValue::Json(default.clone()), desc.kind(), field).map(Some);
    }

    if desc.kind().is_optional() || !desc.is_required() {
        return Ok(None);
    }

    Err(WebError::missing(field))
}

fn coerce_fields(coercers: &Coercers, object: &Map<String, Value>, model: &ModelKind, parent: &str) -> Result<Value, WebError> {
    let fields = (model.fields)();
    let mut out = Map::with_capacity(fields.len());

    for desc in &fields {
        let field = format!("{parent}.{}", desc.query_name());
        let value = match object.get(desc.query_name()) {
            Some(value) => Some(coerce(coercers, &InputValue::Json(value.clone()), desc.kind(), &field)?),
            None => absent(coercers, desc, &field)?,
        };

        if let Some(value) = value {
            out.insert(desc.name().to_string(), desc.checked(value, &field)?);
        }
    }

    Ok(Value::Object(out))
}

fn coerce_sequence(coercers: &Coercers, input: &InputValue, inner: &ParamKind, field: &str) -> Result<Value, WebError> {
    let elements: Vec<InputValue> = match input {
        InputValue::Texts(list) => list.iter().cloned().map(InputValue::Text).collect(),
        InputValue::Text(text) | InputValue::Json(Value::String(text)) => match serde_json::from_str::<Value>(text) {
            Ok(Value::Array(array)) => array.into_iter().map(InputValue::Json).collect(),
            _ => vec![InputValue::Text(text.clone())],
        },
        InputValue::Json(Value::Array(array)) => array.iter().cloned().map(InputValue::Json).collect(),
        InputValue::Json(value @ (Value::Null | Value::Object(_))) => {
            return Err(WebError::invalid(field, format!("expected a list, got {}", json_type(value))));
        }
        InputValue::Json(value) => vec![InputValue::Json(value.clone())],
    };

    elements
        .iter()
        .enumerate()
        .map(|(i, element)| coerce(coercers, element, inner, &format!("{field}[{i}]")))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn as_object(input: &InputValue) -> Result<Map<String, Value>, String> {
    let value = match input {
        InputValue::Json(Value::String(text)) | InputValue::Text(text) => {
            serde_json::from_str::<Value>(text).map_err(|e| format!("expected a JSON object: {e}"))?
        }
        InputValue::Texts(list) => {
            let text = list.last().map_or("", String::as_str);
            serde_json::from_str::<Value>(text).map_err(|e| format!("expected a JSON object: {e}"))?
        }
        InputValue::Json(value) => value.clone(),
    };

    match value {
        Value::Object(object) => Ok(object),
        other => Err(format!("expected an object, got {}", json_type(&other))),
    }
}

fn coerce_scalar(input: &InputValue, kind: ScalarKind) -> Result<Value, String> {
    match kind {
        ScalarKind::Bool => Ok(Value::Bool(coerce_bool(input))),
        ScalarKind::Int => {
            let n = parse_integer(input, "int")?;
            i64::try_from(n).map(Value::from).map_err(|_| format!("invalid range for int(): '{n}'"))
        }
        ScalarKind::Uint => {
            let n = parse_integer(input, "uint")?;
            u64::try_from(n).map(Value::from).map_err(|_| format!("invalid range for uint(): '{n}'"))
        }
        ScalarKind::Float => {
            let f = parse_float(input)?;
            Number::from_f64(f).map(Value::Number).ok_or_else(|| format!("invalid range for float(): '{f}'"))
        }
        ScalarKind::Str => match input {
            InputValue::Json(Value::Number(n)) => Ok(Value::String(n.to_string())),
            InputValue::Json(Value::Bool(b)) => Ok(Value::String(b.to_string())),
            InputValue::Json(value @ (Value::Null | Value::Array(_) | Value::Object(_))) => {
                Err(format!("expected a string, got {}", json_type(value)))
            }
            _ => Ok(Value::String(input.as_text().unwrap_or_default().to_string())),
        },
    }
}

/// ✓ and ✗ are the only literals, any other text is true unless empty.
fn coerce_bool(input: &InputValue) -> bool {
    match input {
        InputValue::Json(Value::Bool(b)) => *b,
        InputValue::Json(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        InputValue::Json(Value::Null) => false,
        InputValue::Json(Value::Array(array)) => !array.is_empty(),
        InputValue::Json(Value::Object(object)) => !object.is_empty(),
        _ => match input.as_text().unwrap_or_default() {
            "✓" => true,
            "✗" => false,
            text => !text.is_empty(),
        },
    }
}

// bounds of i128 as f64, a float within them truncates without saturating
const I128_FLOAT_BOUND: f64 = 1.7e38;

fn parse_integer(input: &InputValue, label: &str) -> Result<i128, String> {
    match input {
        InputValue::Json(Value::Number(n)) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from))
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && f.abs() < I128_FLOAT_BOUND).map(truncate))
            .ok_or_else(|| format!("invalid literal for {label}(): '{n}'")),
        InputValue::Json(Value::Bool(b)) => Ok(i128::from(*b)),
        InputValue::Json(value @ (Value::Null | Value::Array(_) | Value::Object(_))) => {
            Err(format!("{label}() argument must be a string or a number, not '{}'", json_type(value)))
        }
        _ => {
            let text = input.as_text().unwrap_or_default();
            text.trim().parse::<i128>().map_err(|_| format!("invalid literal for {label}(): '{text}'"))
        }
    }
}

#[allow(clippy::cast_possible_truncation, reason = "JSON floats truncate toward zero, the bound is checked before")]
fn truncate(f: f64) -> i128 {
    f.trunc() as i128
}

fn parse_float(input: &InputValue) -> Result<f64, String> {
    match input {
        InputValue::Json(Value::Number(n)) => n.as_f64().ok_or_else(|| format!("invalid literal for float(): '{n}'")),
        InputValue::Json(Value::Bool(b)) => Ok(if *b { 1.0 } else { 0.0 }),
        InputValue::Json(value @ (Value::Null | Value::Array(_) | Value::Object(_))) => {
            Err(format!("float() argument must be a string or a number, not '{}'", json_type(value)))
        }
        _ => {
            let text = input.as_text().unwrap_or_default();
            text.trim().parse::<f64>().map_err(|_| format!("invalid literal for float(): '{text}'"))
        }
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
