//! Per-request state shared by interceptors, binding and handlers.
//!
//! A [`RequestContext`] is created by the dispatcher for every request and
//! dropped once the response has been produced. It is owned by exactly one
//! request flow, interceptors receive it as `&mut` together with the
//! continuation of the chain.
//!
//! Input lookup for a parameter `name` goes through, in order:
//!
//! 1. the alias table, mapping `name` to the external input name,
//! 2. the pipe, values injected by interceptors under `name` (an entry may
//!    also force the parameter to be absent),
//! 3. the accepted-inputs list of the route, unlisted names are absent,
//! 4. path parameters, then body fields (not for `GET`, `HEAD` and
//!    `DELETE`), then query fields.
//!
//! Files of a `multipart/form-data` body follow the same alias and
//! accepted-inputs rules, the pipe never holds files.

use crate::bind::coerce::Coercers;
use crate::encoder::JsonEncoders;
use crate::input::{InputMap, InputValue, parse_json_object, parse_urlencoded};
use crate::request::{Request, RequestHead};
use crate::response::Response;
use crate::router::PathParams;
use crate::upload::{FileMap, UploadedFile, parse_multipart};
use bytes::Bytes;
use http::{Extensions, HeaderMap, Method};
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Application-wide registries every context reads from.
#[derive(Debug, Default)]
pub(crate) struct AppShared {
    pub(crate) state: Extensions,
    pub(crate) coercers: Coercers,
    pub(crate) encoders: JsonEncoders,
}

pub struct RequestContext {
    request: Request,
    body: Bytes,
    path_params: PathParams,
    query_fields: OnceCell<InputMap>,
    body_fields: OnceCell<InputMap>,
    inputs: OnceCell<InputMap>,
    files: FileMap,
    aliases: HashMap<String, String>,
    pipe: HashMap<String, Option<InputValue>>,
    accepted_inputs: Option<Arc<[String]>>,
    extensions: Extensions,
    response: Response,
    continuations: Vec<String>,
    shared: Arc<AppShared>,
}

impl RequestContext {
    pub(crate) fn new(head: Arc<RequestHead>, body: Bytes, shared: Arc<AppShared>) -> Self {
        Self {
            request: Request::new(head),
            body,
            path_params: PathParams::empty(),
            query_fields: OnceCell::new(),
            body_fields: OnceCell::new(),
            inputs: OnceCell::new(),
            files: FileMap::new(),
            aliases: HashMap::new(),
            pipe: HashMap::new(),
            accepted_inputs: None,
            extensions: Extensions::new(),
            response: Response::new(),
            continuations: Vec::new(),
            shared,
        }
    }

    /// A context outside of any application, no state and no custom coercers or encoders.
    pub fn from_request(request: http::Request<Bytes>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(Arc::new(RequestHead::from(parts)), body, Arc::default())
    }

    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    #[inline]
    pub fn method(&self) -> &Method {
        self.request.method()
    }

    #[inline]
    pub fn path(&self) -> &str {
        self.request.path()
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        self.request.headers()
    }

    /// The raw request body.
    #[inline]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    #[inline]
    pub fn response(&self) -> &Response {
        &self.response
    }

    #[inline]
    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    pub(crate) fn set_path_params(&mut self, params: PathParams) {
        self.path_params = params;
        self.inputs = OnceCell::new();
    }

    pub(crate) fn set_accepted_inputs(&mut self, accepted: Option<Arc<[String]>>) {
        self.accepted_inputs = accepted;
    }

    /// Whether the route lets binding read the external input `name`.
    pub fn accepts_input(&self, name: &str) -> bool {
        self.accepted_inputs.as_ref().is_none_or(|accepted| accepted.iter().any(|n| n == name))
    }

    /// Fields of the query string.
    pub fn query_fields(&self) -> &InputMap {
        self.query_fields.get_or_init(|| parse_urlencoded(self.request.query_string().as_bytes()))
    }

    /// Fields of the body: members of a JSON object, text parts of a multipart body
    /// once [loaded](RequestContext::load_multipart), urlencoded form fields otherwise.
    pub fn body_fields(&self) -> &InputMap {
        self.body_fields.get_or_init(|| {
            if self.request.is_json() {
                parse_json_object(&self.body)
            } else if self.request.is_multipart() {
                InputMap::new()
            } else {
                parse_urlencoded(&self.body)
            }
        })
    }

    /// Parses a `multipart/form-data` body into body fields and files.
    ///
    /// Does nothing for other bodies, for methods whose body is not read, or once done.
    pub async fn load_multipart(&mut self) {
        if !self.reads_body() || self.body_fields.get().is_some() {
            return;
        }
        let Some(boundary) = self.request.multipart_boundary() else {
            return;
        };

        let (fields, files) = parse_multipart(self.body.clone(), boundary).await;
        self.body_fields = OnceCell::with_value(fields);
        self.inputs = OnceCell::new();
        self.files = files;
    }

    /// Uploaded files by field name.
    #[inline]
    pub fn files(&self) -> &FileMap {
        &self.files
    }

    /// The last file uploaded under `name`.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name).and_then(|files| files.last())
    }

    /// The files for parameter `name` whose declared external name is `external`.
    pub(crate) fn lookup_files(&self, name: &str, external: &str) -> Option<&[UploadedFile]> {
        let external = self.aliases.get(name).map_or(external, String::as_str);
        if self.pipe.contains_key(name) || !self.accepts_input(external) {
            return None;
        }
        self.files.get(external).map(Vec::as_slice)
    }

    fn reads_body(&self) -> bool {
        !matches!(*self.method(), Method::GET | Method::HEAD | Method::DELETE)
    }

    /// Path parameters, body fields and query fields merged, earlier sources win.
    pub fn inputs(&self) -> &InputMap {
        self.inputs.get_or_init(|| {
            let mut inputs = self.query_fields().clone();
            if self.reads_body() {
                inputs.extend(self.body_fields().iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            inputs.extend(self.path_params.iter().map(|(k, v)| (k.to_string(), InputValue::from(v))));
            inputs
        })
    }

    /// Looks up the input for the parameter `name`.
    pub fn get_input(&self, name: &str) -> Option<&InputValue> {
        self.lookup_input(name, name)
    }

    /// Looks up the input for parameter `name` whose declared external name is `external`.
    ///
    /// An alias registered with [`RequestContext::set_alias`] overrides `external`.
    pub(crate) fn lookup_input(&self, name: &str, external: &str) -> Option<&InputValue> {
        let external = self.aliases.get(name).map_or(external, String::as_str);

        if let Some(piped) = self.pipe.get(name) {
            return piped.as_ref();
        }

        if !self.accepts_input(external) {
            return None;
        }

        self.inputs().get(external)
    }

    /// Exposes parameter `name` under another external input name.
    pub fn set_alias(&mut self, name: impl Into<String>, external: impl Into<String>) {
        self.aliases.insert(name.into(), external.into());
    }

    pub fn alias_of(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Resolves parameter `name` to `value` for the rest of this request, skipping input lookup.
    pub fn set_param(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.pipe.insert(name.into(), Some(value.into()));
    }

    /// Forces parameter `name` to be absent, its default then applies.
    pub fn unset_param(&mut self, name: impl Into<String>) {
        self.pipe.insert(name.into(), None);
    }

    /// Drops a pipe entry, normal input lookup applies again.
    pub fn clear_param(&mut self, name: &str) {
        self.pipe.remove(name);
    }

    /// The pipe entry for `name`: `Some(None)` means forced absent.
    pub fn piped(&self, name: &str) -> Option<Option<&InputValue>> {
        self.pipe.get(name).map(Option::as_ref)
    }

    /// Request scoped values, e.g. the user an auth interceptor resolved.
    #[inline]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[inline]
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Application state registered on the application builder.
    pub fn state<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.shared.state.get::<T>()
    }

    /// Names of the interceptors and the handler currently running, outermost first.
    #[inline]
    pub fn continuation_stack(&self) -> &[String] {
        &self.continuations
    }

    pub(crate) fn push_continuation(&mut self, name: &str) {
        self.continuations.push(name.to_string());
    }

    pub(crate) fn pop_continuation(&mut self) {
        self.continuations.pop();
    }

    #[inline]
    pub(crate) fn coercers(&self) -> &Coercers {
        &self.shared.coercers
    }

    #[inline]
    pub(crate) fn encoders(&self) -> &JsonEncoders {
        &self.shared.encoders
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", self.method())
            .field("path", &self.path())
            .field("path_params", &self.path_params)
            .field("aliases", &self.aliases)
            .field("pipe", &self.pipe)
            .field("continuations", &self.continuations)
            .finish_non_exhaustive()
    }
}
