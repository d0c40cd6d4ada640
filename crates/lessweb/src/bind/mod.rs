//! Parameter binding: turning request input into typed handler arguments.
//!
//! Every handler parameter is described by a [`ParamDescriptor`]: its name,
//! the external input name it is read from, its [`ParamKind`] and an
//! optional default. Descriptors are built once per handler and checked when
//! the router is built. At request time the [`Binder`] walks them in order:
//!
//! * context specials (`Request`, `Response`, `State<T>`, `Query<T>`,
//!   `Form<T>`, `Json<T>`) are taken from the context,
//! * [`Model`] parameters, optional ones included, are assembled field by field,
//! * [`UploadedFile`](crate::UploadedFile) parameters take the files of a
//!   multipart body,
//! * [`Inject`] parameters are constructed through their [`Service`]
//!   implementation, at most once per invocation,
//! * everything else is looked up by name and coerced by kind.

mod args;
mod bindable;
pub mod coerce;
mod service;

pub use args::BindArgs;
pub use bindable::{Bindable, FromValue, Model, ModelSchema};
pub use coerce::{Coerce, Coercers, CoercerFn, coercer_fn};
pub use service::{Inject, Service};

use crate::context::RequestContext;
use crate::error::WebError;
use crate::request::Request;
use crate::response::Response;
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Bool,
    Int,
    Uint,
    Float,
    Str,
}

/// Parameters served by the context rather than by input lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialKind {
    Request,
    Response,
    State,
    Query,
    Form,
    Json,
}

/// A model: an object whose fields are bound one by one.
#[derive(Clone, Copy)]
pub struct ModelKind {
    pub name: &'static str,
    pub fields: fn() -> Vec<ParamDescriptor>,
}

impl fmt::Debug for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelKind").field("name", &self.name).finish_non_exhaustive()
    }
}

/// How a parameter is produced.
#[derive(Debug, Clone)]
pub enum ParamKind {
    Special(SpecialKind),
    Model(ModelKind),
    Service(&'static str),
    Scalar(ScalarKind),
    Sequence(Box<ParamKind>),
    Mapping(Box<ParamKind>),
    Optional(Box<ParamKind>),
    /// Any JSON value, passed through untouched.
    Json,
    /// A user type, converted by a registered coercer or from the raw JSON form of the input.
    Custom(&'static str),
    /// A file part of a multipart body.
    File,
}

impl ParamKind {
    /// Whether the parameter is looked up by name and therefore needs one.
    pub fn reads_input(&self) -> bool {
        !matches!(self, ParamKind::Special(_) | ParamKind::Service(_)) && self.model().is_none()
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, ParamKind::Optional(_))
    }

    /// The model bound field by field, for `Model` and optional `Model` kinds.
    pub fn model(&self) -> Option<&ModelKind> {
        match self {
            ParamKind::Model(model) => Some(model),
            ParamKind::Optional(inner) => match &**inner {
                ParamKind::Model(model) => Some(model),
                _ => None,
            },
            _ => None,
        }
    }

    /// A human readable name of the kind, used for unnamed parameters and error messages.
    pub fn label(&self) -> String {
        match self {
            ParamKind::Special(special) => format!("{special:?}"),
            ParamKind::Model(model) => model.name.to_string(),
            ParamKind::Service(name) | ParamKind::Custom(name) => (*name).to_string(),
            ParamKind::Scalar(scalar) => format!("{scalar:?}").to_lowercase(),
            ParamKind::Sequence(inner) => format!("list[{}]", inner.label()),
            ParamKind::Mapping(inner) => format!("dict[{}]", inner.label()),
            ParamKind::Optional(inner) => format!("optional[{}]", inner.label()),
            ParamKind::Json => "json".to_string(),
            ParamKind::File => "file".to_string(),
        }
    }
}

/// Checks a coerced value against a concrete Rust type.
type TypeCheck = fn(&Value) -> Result<(), String>;

fn type_check<T: FromValue>(value: &Value) -> Result<(), String> {
    T::from_value(value.clone()).map(drop)
}

/// The binding plan of one parameter.
#[derive(Debug, Clone)]
pub struct ParamDescriptor {
    name: String,
    alias: Option<String>,
    kind: ParamKind,
    default: Option<Value>,
    required: bool,
    check: Option<TypeCheck>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self { name: name.into(), alias: None, kind, default: None, required: true, check: None }
    }

    /// A descriptor whose kind comes from the Rust type.
    ///
    /// Coerced values are also checked against `T`, so an out of range model
    /// field is reported under the field's own name.
    pub fn of<T: FromValue>(name: impl Into<String>) -> Self {
        Self { check: Some(type_check::<T>), ..Self::new(name, T::kind()) }
    }

    /// A nested model field.
    pub fn model<T: ModelSchema>(name: impl Into<String>) -> Self {
        Self::new(name, <Model<T> as FromValue>::kind())
    }

    /// Reads the parameter from another external input name.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Used when no input is present, it goes through the same coercion as real input.
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Lets a model field be absent, the model's own serde default then applies.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The external input name: the alias when set, the name otherwise.
    #[inline]
    pub fn query_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[inline]
    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    #[inline]
    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    #[inline]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Passes `value` through the type check, naming `field` on failure.
    pub(crate) fn checked(&self, value: Value, field: &str) -> Result<Value, WebError> {
        match self.check {
            Some(check) => check(&value).map(|()| value).map_err(|reason| WebError::invalid(field, reason)),
            None => Ok(value),
        }
    }
}

/// The user facing part of a descriptor, its kind is filled in from the handler signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    name: String,
    alias: Option<String>,
    default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), alias: None, default: None }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub(crate) fn describe(&self, kind: ParamKind) -> ParamDescriptor {
        ParamDescriptor {
            name: self.name.clone(),
            alias: self.alias.clone(),
            kind,
            default: self.default.clone(),
            required: true,
            check: None,
        }
    }
}

impl From<&str> for Param {
    fn from(name: &str) -> Self {
        Param::new(name)
    }
}

impl From<String> for Param {
    fn from(name: String) -> Self {
        Param::new(name)
    }
}

/// Binds the parameters of one handler invocation.
///
/// Services constructed through the binder are cached for its lifetime, so
/// every parameter and every service asking for service `S` shares one
/// instance.
pub struct Binder<'a> {
    ctx: &'a RequestContext,
    services: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    constructing: Vec<TypeId>,
}

impl fmt::Debug for Binder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("ctx", self.ctx)
            .field("services", &self.services.len())
            .field("constructing", &self.constructing.len())
            .finish()
    }
}

impl<'a> Binder<'a> {
    pub fn new(ctx: &'a RequestContext) -> Self {
        Self { ctx, services: HashMap::new(), constructing: Vec::new() }
    }

    #[inline]
    pub fn context(&self) -> &'a RequestContext {
        self.ctx
    }

    pub fn request(&self) -> Request {
        self.ctx.request().clone()
    }

    pub fn response(&self) -> Response {
        self.ctx.response().clone()
    }

    /// Binds one parameter of type `T`.
    pub fn param<T: Bindable>(&mut self, desc: &ParamDescriptor) -> Result<T, WebError> {
        T::bind(self, desc)
    }

    /// Binds the input `name` as `T`, the shorthand services use for their own inputs.
    pub fn input<T: Bindable>(&mut self, name: &str) -> Result<T, WebError> {
        let desc = ParamDescriptor::new(name, T::kind());
        T::bind(self, &desc)
    }

    /// Resolves and converts a value parameter.
    pub fn bind_value<T: FromValue>(&self, desc: &ParamDescriptor) -> Result<T, WebError> {
        let value = self.resolve(desc)?.unwrap_or(Value::Null);
        T::from_value(value).map_err(|reason| WebError::invalid(desc.query_name(), reason))
    }

    /// The coerced JSON form of a parameter, `None` when it is absent but allowed to be.
    pub fn resolve(&self, desc: &ParamDescriptor) -> Result<Option<Value>, WebError> {
        let coercers = self.ctx.coercers();
        let field = desc.query_name();

        let value = match self.ctx.lookup_input(desc.name(), field) {
            Some(input) => Some(coerce::coerce(coercers, input, desc.kind(), field)?),
            None => match desc.kind().model() {
                Some(model) if self.ctx.piped(desc.name()).is_none() => match self.bind_fields(&(model.fields)()) {
                    Err(WebError::MissingParameter { .. }) if desc.kind().is_optional() || !desc.is_required() => None,
                    other => Some(other?),
                },
                _ => coerce::absent(coercers, desc, field)?,
            },
        };

        value.map(|value| desc.checked(value, field)).transpose()
    }

    fn bind_fields(&self, fields: &[ParamDescriptor]) -> Result<Value, WebError> {
        let mut object = Map::with_capacity(fields.len());
        for field in fields {
            if let Some(value) = self.resolve(field)? {
                object.insert(field.name().to_string(), value);
            }
        }
        Ok(Value::Object(object))
    }

    /// The instance of service `S` for this invocation, constructed on first use.
    ///
    /// # Errors
    /// [`WebError::ServiceCycle`] when constructing `S` requires `S` again, or whatever
    /// `S::construct` fails with.
    pub fn service<S: Service>(&mut self) -> Result<Arc<S>, WebError> {
        let id = TypeId::of::<S>();

        if let Some(cached) = self.services.get(&id) {
            return Arc::clone(cached)
                .downcast::<S>()
                .map_err(|_| WebError::fault("service cache holds a value of another type"));
        }

        if self.constructing.contains(&id) {
            return Err(WebError::ServiceCycle { service: std::any::type_name::<S>() });
        }

        self.constructing.push(id);
        let constructed = S::construct(self);
        self.constructing.pop();

        let service = Arc::new(constructed?);
        self.services.insert(id, Arc::clone(&service) as Arc<dyn Any + Send + Sync>);
        Ok(service)
    }
}

#[cfg(test)]
mod tests {
    use super::{Binder, Inject, Model, ModelSchema, ParamDescriptor, ParamKind, ScalarKind, Service};
    use crate::context::RequestContext;
    use crate::error::WebError;
    use bytes::Bytes;
    use http::Method;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(method: Method, uri: &str, content_type: &str, body: &'static str) -> RequestContext {
        RequestContext::from_request(
            http::Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", content_type)
                .body(Bytes::from_static(body.as_bytes()))
                .unwrap(),
        )
    }

    fn get(uri: &str) -> RequestContext {
        context(Method::GET, uri, "text/plain", "")
    }

    #[test]
    fn test_scalar() {
        let ctx = get("/?a=33&b=x");
        let mut binder = Binder::new(&ctx);

        let a: i64 = binder.param(&ParamDescriptor::of::<i64>("a")).unwrap();
        assert_eq!(a, 33);

        let err = binder.param::<i64>(&ParamDescriptor::of::<i64>("b")).unwrap_err();
        assert!(matches!(err, WebError::InvalidParameter { ref field, .. } if field == "b"));

        let err = binder.param::<i64>(&ParamDescriptor::of::<i64>("c")).unwrap_err();
        assert!(matches!(err, WebError::MissingParameter { ref field } if field == "c"));
    }

    #[test]
    fn test_uint_range() {
        let ctx = get("/?n=-1");
        let mut binder = Binder::new(&ctx);
        match binder.param::<u32>(&ParamDescriptor::of::<u32>("n")) {
            Err(WebError::InvalidParameter { field, reason }) => {
                assert_eq!(field, "n");
                assert_eq!(reason, "invalid range for uint(): '-1'");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_default_and_optional() {
        let ctx = get("/");
        let mut binder = Binder::new(&ctx);

        let b: String = binder.param(&ParamDescriptor::of::<String>("b").default("y")).unwrap();
        assert_eq!(b, "y");

        let n: i32 = binder.param(&ParamDescriptor::of::<i32>("n").default("12")).unwrap();
        assert_eq!(n, 12);

        let o: Option<i32> = binder.param(&ParamDescriptor::of::<Option<i32>>("o")).unwrap();
        assert_eq!(o, None);
    }

    #[test]
    fn test_alias_descriptor() {
        let ctx = get("/?wd=rust");
        let mut binder = Binder::new(&ctx);
        let keyword: String = binder.param(&ParamDescriptor::of::<String>("keyword").alias("wd")).unwrap();
        assert_eq!(keyword, "rust");

        let err = binder.param::<String>(&ParamDescriptor::of::<String>("other").alias("q")).unwrap_err();
        assert_eq!(err.field(), Some("q"));
    }

    #[test]
    fn test_sequence_from_repeated_keys() {
        let ctx = get("/?id=1&id=2&id=3");
        let mut binder = Binder::new(&ctx);
        let ids: Vec<u64> = binder.param(&ParamDescriptor::of::<Vec<u64>>("id")).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);

        let ctx = get("/?id=%5B4%2C5%5D");
        let mut binder = Binder::new(&ctx);
        let ids: Vec<u64> = binder.param(&ParamDescriptor::of::<Vec<u64>>("id")).unwrap();
        assert_eq!(ids, vec![4, 5]);

        let ctx = get("/?id=1&id=x");
        let mut binder = Binder::new(&ctx);
        let err = binder.param::<Vec<u64>>(&ParamDescriptor::of::<Vec<u64>>("id")).unwrap_err();
        assert_eq!(err.field(), Some("id[1]"));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Address {
        city: String,
        zip: Option<String>,
    }

    impl ModelSchema for Address {
        fn fields() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::of::<String>("city"), ParamDescriptor::of::<Option<String>>("zip")]
        }
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Person {
        name: String,
        age: u8,
        #[serde(default)]
        tags: Vec<String>,
        address: Option<Address>,
    }

    impl ModelSchema for Person {
        fn fields() -> Vec<ParamDescriptor> {
            vec![
                ParamDescriptor::of::<String>("name").alias("n"),
                ParamDescriptor::of::<u8>("age").default(18),
                ParamDescriptor::of::<Vec<String>>("tags").optional(),
                ParamDescriptor::model::<Address>("address").optional(),
            ]
        }
    }

    #[test]
    fn test_model_from_query() {
        let ctx = get("/?n=zava&tags=a&tags=b");
        let mut binder = Binder::new(&ctx);
        let desc = ParamDescriptor::new("Person", <Model<Person> as super::FromValue>::kind());

        let Model(person) = binder.param::<Model<Person>>(&desc).unwrap();
        assert_eq!(person.name, "zava");
        assert_eq!(person.age, 18);
        assert_eq!(person.tags, vec!["a", "b"]);
        assert_eq!(person.address, None);
    }

    #[test]
    fn test_model_from_json_body() {
        let ctx = context(
            Method::POST,
            "/",
            "application/json",
            r#"{"n": "zava", "age": 30, "address": {"city": "hz"}}"#,
        );
        let mut binder = Binder::new(&ctx);
        let desc = ParamDescriptor::new("Person", <Model<Person> as super::FromValue>::kind());

        let Model(person) = binder.param::<Model<Person>>(&desc).unwrap();
        assert_eq!(person.age, 30);
        assert_eq!(person.address, Some(Address { city: "hz".into(), zip: None }));
    }

    #[test]
    fn test_model_missing_field() {
        let ctx = get("/?age=3");
        let mut binder = Binder::new(&ctx);
        let desc = ParamDescriptor::new("Person", <Model<Person> as super::FromValue>::kind());
        let err = binder.param::<Model<Person>>(&desc).unwrap_err();
        assert!(matches!(err, WebError::MissingParameter { ref field } if field == "n"));
    }

    #[test]
    fn test_model_nested_invalid_field() {
        let ctx = context(Method::POST, "/", "application/json", r#"{"n": "z", "address": {"zip": "1"}}"#);
        let mut binder = Binder::new(&ctx);
        let desc = ParamDescriptor::new("Person", <Model<Person> as super::FromValue>::kind());
        let err = binder.param::<Model<Person>>(&desc).unwrap_err();
        assert!(matches!(err, WebError::MissingParameter { ref field } if field == "address.city"));
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Paging {
        page: u32,
        size: u8,
    }

    impl ModelSchema for Paging {
        fn fields() -> Vec<ParamDescriptor> {
            vec![ParamDescriptor::of::<u32>("page"), ParamDescriptor::of::<u8>("size").default(20)]
        }
    }

    fn optional_paging() -> ParamDescriptor {
        ParamDescriptor::new("Paging", <Option<Model<Paging>> as super::FromValue>::kind())
    }

    #[test]
    fn test_optional_model() {
        let ctx = get("/?page=3");
        let mut binder = Binder::new(&ctx);
        let paging = binder.param::<Option<Model<Paging>>>(&optional_paging()).unwrap();
        assert_eq!(paging.map(Model::into_inner), Some(Paging { page: 3, size: 20 }));

        // absent only when a required field is missing
        let ctx = get("/?size=5");
        let mut binder = Binder::new(&ctx);
        assert!(binder.param::<Option<Model<Paging>>>(&optional_paging()).unwrap().is_none());

        // other errors still fail the request
        let ctx = get("/?page=x");
        let mut binder = Binder::new(&ctx);
        let err = binder.param::<Option<Model<Paging>>>(&optional_paging()).unwrap_err();
        assert_eq!(err.field(), Some("page"));
    }

    #[test]
    fn test_model_field_out_of_type_range() {
        let ctx = get("/?page=3&size=300");
        let mut binder = Binder::new(&ctx);
        let desc = ParamDescriptor::new("Paging", <Model<Paging> as super::FromValue>::kind());
        match binder.param::<Model<Paging>>(&desc) {
            Err(WebError::InvalidParameter { field, reason }) => {
                assert_eq!(field, "size");
                assert!(reason.contains("300"), "{reason}");
            }
            other => panic!("unexpected: {other:?}"),
        }

        let ctx = context(Method::POST, "/", "application/json", r#"{"Paging": {"page": 1, "size": 256}}"#);
        let mut binder = Binder::new(&ctx);
        let err = binder.param::<Model<Paging>>(&desc).unwrap_err();
        assert_eq!(err.field(), Some("Paging.size"));
    }

    static CONSTRUCTED: AtomicUsize = AtomicUsize::new(0);

    struct Db;

    impl Service for Db {
        fn construct(_binder: &mut Binder<'_>) -> Result<Self, WebError> {
            CONSTRUCTED.fetch_add(1, Ordering::SeqCst);
            Ok(Db)
        }
    }

    struct Repo {
        db: Inject<Db>,
        table: String,
    }

    impl Service for Repo {
        fn construct(binder: &mut Binder<'_>) -> Result<Self, WebError> {
            Ok(Repo { db: Inject(binder.service::<Db>()?), table: binder.input("table")? })
        }
    }

    #[test]
    fn test_service_constructed_once_per_binder() {
        let ctx = get("/?table=users");
        let mut binder = Binder::new(&ctx);

        let db = binder.service::<Db>().unwrap();
        let repo = binder.service::<Repo>().unwrap();
        let again = binder.service::<Repo>().unwrap();

        assert_eq!(CONSTRUCTED.load(Ordering::SeqCst), 1);
        assert!(std::sync::Arc::ptr_eq(&db, &repo.db.0));
        assert!(std::sync::Arc::ptr_eq(&repo, &again));
        assert_eq!(repo.table, "users");
    }

    struct Chicken;
    struct Egg;

    impl Service for Chicken {
        fn construct(binder: &mut Binder<'_>) -> Result<Self, WebError> {
            binder.service::<Egg>()?;
            Ok(Chicken)
        }
    }

    impl Service for Egg {
        fn construct(binder: &mut Binder<'_>) -> Result<Self, WebError> {
            binder.service::<Chicken>()?;
            Ok(Egg)
        }
    }

    #[test]
    fn test_service_cycle() {
        let ctx = get("/");
        let mut binder = Binder::new(&ctx);
        let err = binder.service::<Chicken>().err().unwrap();
        assert!(matches!(err, WebError::ServiceCycle { service } if service.ends_with("Chicken")));
    }

    #[test]
    fn test_kind_labels() {
        assert!(ParamKind::Scalar(ScalarKind::Int).reads_input());
        assert!(!ParamKind::Service("Db").reads_input());
        assert!(!<Option<Model<Paging>> as super::FromValue>::kind().reads_input());
        assert!(ParamKind::File.reads_input());
        assert_eq!(<Vec<Option<i64>> as super::FromValue>::kind().label(), "list[optional[int]]");
    }
}
