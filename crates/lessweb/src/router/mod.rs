//! Ordered route table.
//!
//! Routes are tried in registration order and the first route whose pattern
//! matches the path and whose method accepts the request wins. Routes whose
//! pattern matches but whose method does not are remembered so that the
//! caller can answer `405` with an `Allow` header instead of `404`.

pub mod pattern;

use crate::decorator::{Decorator, DecoratorComposer, DecoratorExt, IdentityDecorator};
use crate::error::WebError;
use crate::handler::RequestHandler;
use crate::view::{View, ViewHandler};
use http::Method;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

pub use pattern::{DEFAULT_PLACEHOLDER, PathParams, PathPattern};

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("unknown method `{method}`, expected `*` or one of GET, HEAD, POST, PUT, DELETE, CONNECT, OPTIONS, TRACE, PATCH")]
    InvalidMethod { method: String },

    #[error("invalid path pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("handler `{handler}` names {declared} parameters but reads {expected} from request input")]
    ParamCountMismatch { handler: &'static str, declared: usize, expected: usize },
}

const KNOWN_METHODS: [Method; 9] = [
    Method::GET,
    Method::HEAD,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::CONNECT,
    Method::OPTIONS,
    Method::TRACE,
    Method::PATCH,
];

/// The methods a route or an interceptor accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodSpec {
    /// `*`, any method.
    Any,
    Only(Method),
}

impl MethodSpec {
    #[inline]
    pub fn matches(&self, method: &Method) -> bool {
        match self {
            MethodSpec::Any => true,
            MethodSpec::Only(m) => m == method,
        }
    }
}

impl FromStr for MethodSpec {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "*" {
            return Ok(MethodSpec::Any);
        }

        KNOWN_METHODS
            .iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .map(|m| MethodSpec::Only(m.clone()))
            .ok_or_else(|| RouterError::InvalidMethod { method: s.to_string() })
    }
}

impl From<Method> for MethodSpec {
    fn from(method: Method) -> Self {
        MethodSpec::Only(method)
    }
}

impl fmt::Display for MethodSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSpec::Any => f.write_str("*"),
            MethodSpec::Only(m) => f.write_str(m.as_str()),
        }
    }
}

/// A compiled route: pattern, method and the (decorated) handler.
pub struct Route {
    pattern: PathPattern,
    method: MethodSpec,
    handler: Box<dyn RequestHandler>,
    accepted_inputs: Option<Arc<[String]>>,
}

impl Route {
    #[inline]
    pub fn pattern(&self) -> &PathPattern {
        &self.pattern
    }

    #[inline]
    pub fn method(&self) -> &MethodSpec {
        &self.method
    }

    #[inline]
    pub fn handler(&self) -> &dyn RequestHandler {
        self.handler.as_ref()
    }

    /// When set, only these input names are visible to parameter binding.
    #[inline]
    pub fn accepted_inputs(&self) -> Option<&Arc<[String]>> {
        self.accepted_inputs.as_ref()
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("pattern", &self.pattern)
            .field("method", &self.method)
            .field("accepted_inputs", &self.accepted_inputs)
            .finish_non_exhaustive()
    }
}

/// The outcome of a successful lookup.
#[derive(Debug)]
pub struct RouteMatch<'router> {
    route: &'router Route,
    params: PathParams,
}

impl<'router> RouteMatch<'router> {
    #[inline]
    pub fn route(&self) -> &'router Route {
        self.route
    }

    #[inline]
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    pub fn into_parts(self) -> (&'router Route, PathParams) {
        (self.route, self.params)
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn builder() -> RouterBuilder<IdentityDecorator> {
        RouterBuilder::new()
    }

    /// Finds the first route matching `path` and `method`.
    ///
    /// # Errors
    /// * [`WebError::MethodNotAllowed`] when some pattern matched but none accepted the method,
    ///   carrying the matched routes' methods in registration order. `OPTIONS` is never listed.
    /// * [`WebError::RouteNotFound`] otherwise.
    pub fn at(&self, path: &str, method: &Method) -> Result<RouteMatch<'_>, WebError> {
        let mut allowed: Vec<Method> = Vec::new();

        for route in &self.routes {
            if !route.pattern.is_match(path) {
                continue;
            }

            if route.method.matches(method) {
                if let Some(params) = route.pattern.captures(path) {
                    return Ok(RouteMatch { route, params });
                }
            } else if let MethodSpec::Only(m) = &route.method {
                if *m != Method::OPTIONS && !allowed.contains(m) {
                    allowed.push(m.clone());
                }
            }
        }

        if allowed.is_empty() { Err(WebError::RouteNotFound) } else { Err(WebError::MethodNotAllowed { allowed }) }
    }

    #[inline]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

pub struct RouterBuilder<D> {
    routes: Vec<(String, RouteBuilder)>,
    placeholder: String,
    decorator: D,
}

impl<D: fmt::Debug> fmt::Debug for RouterBuilder<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder")
            .field("routes", &self.routes)
            .field("placeholder", &self.placeholder)
            .field("decorator", &self.decorator)
            .finish()
    }
}

impl RouterBuilder<IdentityDecorator> {
    fn new() -> Self {
        Self { routes: Vec::new(), placeholder: DEFAULT_PLACEHOLDER.to_string(), decorator: IdentityDecorator }
    }
}

impl<D> RouterBuilder<D> {
    /// Appends a route, earlier routes take precedence over later ones.
    pub fn route(mut self, pattern: impl Into<String>, route_builder: RouteBuilder) -> Self {
        self.routes.push((pattern.into(), route_builder));
        self
    }

    /// Appends a route for a method given as text, `*` meaning any method.
    pub fn route_for<H>(self, pattern: impl Into<String>, method: &str, handler: H) -> Result<Self, RouterError>
    where
        H: RequestHandler + 'static,
    {
        Ok(self.route(pattern, route_for(method, handler)?))
    }

    /// Sets the regex charset `{name}` placeholders expand to.
    pub fn placeholder_pattern(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn with_global_decorator<D2>(self, decorator: D2) -> RouterBuilder<DecoratorComposer<D, D2>>
    where
        D: Decorator<Box<dyn RequestHandler>>,
        D2: Decorator<D::Out>,
    {
        RouterBuilder { routes: self.routes, placeholder: self.placeholder, decorator: self.decorator.and_then(decorator) }
    }

    /// Compiles all patterns and validates every handler's parameter declarations.
    pub fn build(self) -> Result<Router, RouterError>
    where
        D: Decorator<Box<dyn RequestHandler>>,
        <D as Decorator<Box<dyn RequestHandler>>>::Out: RequestHandler + 'static,
    {
        let mut routes = Vec::with_capacity(self.routes.len());

        for (pattern, route_builder) in self.routes {
            let compiled = PathPattern::with_placeholder(&pattern, &self.placeholder)?;

            route_builder.handler.validate().inspect_err(|e| error!(pattern = %pattern, "invalid route handler: {e}"))?;

            let handler: Box<dyn RequestHandler> = match route_builder.view {
                Some(view) => Box::new(ViewHandler::new(route_builder.handler, view)),
                None => route_builder.handler,
            };

            routes.push(Route {
                pattern: compiled,
                method: route_builder.method,
                handler: Box::new(self.decorator.decorate(handler)),
                accepted_inputs: route_builder.accepted_inputs.map(Arc::from),
            });
        }

        Ok(Router { routes })
    }
}

macro_rules! method_route {
    ($fn_name:ident, $method:ident) => {
        pub fn $fn_name<H: RequestHandler + 'static>(handler: H) -> RouteBuilder {
            RouteBuilder::new(MethodSpec::Only(Method::$method), handler)
        }
    };
}

method_route!(get, GET);
method_route!(post, POST);
method_route!(put, PUT);
method_route!(delete, DELETE);
method_route!(head, HEAD);
method_route!(options, OPTIONS);
method_route!(connect, CONNECT);
method_route!(patch, PATCH);
method_route!(trace, TRACE);

/// A route accepting every method.
pub fn any<H: RequestHandler + 'static>(handler: H) -> RouteBuilder {
    RouteBuilder::new(MethodSpec::Any, handler)
}

/// A route for a method given as text, matched case-insensitively.
///
/// # Errors
/// [`RouterError::InvalidMethod`] when `method` is neither `*` nor a standard HTTP method.
pub fn route_for<H: RequestHandler + 'static>(method: &str, handler: H) -> Result<RouteBuilder, RouterError> {
    Ok(RouteBuilder::new(method.parse()?, handler))
}

pub struct RouteBuilder {
    method: MethodSpec,
    handler: Box<dyn RequestHandler>,
    view: Option<Box<dyn View>>,
    accepted_inputs: Option<Vec<String>>,
}

impl fmt::Debug for RouteBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteBuilder")
            .field("method", &self.method)
            .field("view", &self.view.is_some())
            .field("accepted_inputs", &self.accepted_inputs)
            .finish_non_exhaustive()
    }
}

impl RouteBuilder {
    fn new<H: RequestHandler + 'static>(method: MethodSpec, handler: H) -> Self {
        Self { method, handler: Box::new(handler), view: None, accepted_inputs: None }
    }

    /// Post-processes the handler's reply.
    pub fn view<V: View + 'static>(mut self, view: V) -> Self {
        self.view = Some(Box::new(view));
        self
    }

    /// Restricts the input names parameter binding may read.
    pub fn accept_inputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.accepted_inputs = Some(names.into_iter().map(Into::into).collect());
        self
    }
}
