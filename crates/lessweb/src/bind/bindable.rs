use super::{Binder, ModelKind, ParamDescriptor, ParamKind, ScalarKind, SpecialKind};
use crate::error::WebError;
use crate::request::Request;
use crate::response::Response;
use crate::utils::short_type_name;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// A type every handler parameter implements.
pub trait Bindable: Sized + Send + 'static {
    fn kind() -> ParamKind;

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError>;
}

/// A value parameter: built from the coerced JSON form of its input.
///
/// Implement it together with [`bindable_value!`](crate::bindable_value) for
/// custom parameter types, usually with [`ParamKind::Custom`] and a registered
/// coercer.
pub trait FromValue: Sized {
    fn kind() -> ParamKind;

    fn from_value(value: Value) -> Result<Self, String>;
}

/// Implements [`Bindable`] for types implementing [`FromValue`].
#[macro_export]
macro_rules! bindable_value {
    ($($ty:ty),* $(,)?) => {
        $(
        impl $crate::Bindable for $ty {
            fn kind() -> $crate::ParamKind {
                <$ty as $crate::FromValue>::kind()
            }

            fn bind(binder: &mut $crate::Binder<'_>, desc: &$crate::ParamDescriptor) -> Result<Self, $crate::WebError> {
                binder.bind_value(desc)
            }
        }
        )*
    };
}

macro_rules! impl_from_value_for_scalar {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
        impl FromValue for $ty {
            fn kind() -> ParamKind {
                ParamKind::Scalar(ScalarKind::$kind)
            }

            fn from_value(value: Value) -> Result<Self, String> {
                serde_json::from_value(value).map_err(|e| e.to_string())
            }
        }
        )*
    };
}

impl_from_value_for_scalar! {
    bool => Bool,
    i8 => Int, i16 => Int, i32 => Int, i64 => Int, isize => Int,
    u8 => Uint, u16 => Uint, u32 => Uint, u64 => Uint, usize => Uint,
    f32 => Float, f64 => Float,
    String => Str,
}

crate::bindable_value!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String, Value);

impl FromValue for Value {
    fn kind() -> ParamKind {
        ParamKind::Json
    }

    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Vec<T> {
    fn kind() -> ParamKind {
        ParamKind::Sequence(Box::new(T::kind()))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Array(array) => array.into_iter().map(T::from_value).collect(),
            other => Err(format!("expected a list, got {other}")),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn kind() -> ParamKind {
        ParamKind::Optional(Box::new(T::kind()))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: FromValue> FromValue for HashMap<String, T> {
    fn kind() -> ParamKind {
        ParamKind::Mapping(Box::new(T::kind()))
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Object(object) => object.into_iter().map(|(k, v)| T::from_value(v).map(|v| (k, v))).collect(),
            other => Err(format!("expected an object, got {other}")),
        }
    }
}

impl<T: FromValue + Send + 'static> Bindable for Vec<T> {
    fn kind() -> ParamKind {
        <Self as FromValue>::kind()
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder.bind_value(desc)
    }
}

impl<T: FromValue + Send + 'static> Bindable for Option<T> {
    fn kind() -> ParamKind {
        <Self as FromValue>::kind()
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder.bind_value(desc)
    }
}

impl<T: FromValue + Send + 'static> Bindable for HashMap<String, T> {
    fn kind() -> ParamKind {
        <Self as FromValue>::kind()
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder.bind_value(desc)
    }
}

/// Declares how a model type is assembled from request input.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Person {
///     name: String,
///     age: u8,
/// }
///
/// impl ModelSchema for Person {
///     fn fields() -> Vec<ParamDescriptor> {
///         vec![ParamDescriptor::of::<String>("name"), ParamDescriptor::of::<u8>("age").default(18)]
///     }
/// }
/// ```
pub trait ModelSchema: DeserializeOwned + Send + 'static {
    fn fields() -> Vec<ParamDescriptor>;
}

/// A handler parameter bound field by field from request input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Model<T>(pub T);

impl<T> Model<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for Model<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Model<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: ModelSchema> FromValue for Model<T> {
    fn kind() -> ParamKind {
        ParamKind::Model(ModelKind { name: short_type_name::<T>(), fields: T::fields })
    }

    fn from_value(value: Value) -> Result<Self, String> {
        serde_json::from_value(value).map(Model).map_err(|e| e.to_string())
    }
}

impl<T: ModelSchema> Bindable for Model<T> {
    fn kind() -> ParamKind {
        <Self as FromValue>::kind()
    }

    fn bind(binder: &mut Binder<'_>, desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder.bind_value(desc)
    }
}

impl Bindable for Request {
    fn kind() -> ParamKind {
        ParamKind::Special(SpecialKind::Request)
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        Ok(binder.request())
    }
}

impl Bindable for Response {
    fn kind() -> ParamKind {
        ParamKind::Special(SpecialKind::Response)
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        Ok(binder.response())
    }
}
