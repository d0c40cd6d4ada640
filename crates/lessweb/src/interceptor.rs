//! Interceptors wrap matched handlers.
//!
//! An interceptor is registered with a path pattern and a method, it only
//! wraps requests matching both. It receives the context together with
//! [`Next`], the rest of the pipeline, and decides itself whether to call it
//! not at all (short-circuit), once, or several times.
//!
//! The interceptor registered first is the outermost one, the interceptor
//! registered last runs closest to the handler.

use crate::context::RequestContext;
use crate::error::HandlerResult;
use crate::handler::RequestHandler;
use crate::router::{DEFAULT_PLACEHOLDER, MethodSpec, PathPattern, RouterError};
use crate::utils::short_type_name;
use async_trait::async_trait;
use futures::future::BoxFuture;
use http::Method;
use std::fmt;
use tracing::trace;

#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> HandlerResult;

    /// The name recorded on the continuation stack while this interceptor runs.
    fn name(&self) -> &'static str {
        short_type_name::<Self>()
    }
}

/// The remaining pipeline: the inner interceptors followed by the handler.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    layers: &'a [&'a Layer],
    endpoint: &'a dyn RequestHandler,
    endpoint_name: &'a str,
}

impl<'a> Next<'a> {
    /// Runs the rest of the pipeline, may be called any number of times.
    pub fn run<'c>(self, ctx: &'c mut RequestContext) -> BoxFuture<'c, HandlerResult>
    where
        'a: 'c,
    {
        Box::pin(async move {
            match self.layers.split_first() {
                Some((layer, rest)) => {
                    let name = layer.interceptor.name();
                    trace!(interceptor = name, depth = ctx.continuation_stack().len(), "enter interceptor");
                    ctx.push_continuation(name);
                    let next = Next { layers: rest, ..self };
                    let result = layer.interceptor.intercept(ctx, next).await;
                    ctx.pop_continuation();
                    result
                }
                None => {
                    ctx.push_continuation(self.endpoint_name);
                    let result = self.endpoint.invoke(ctx).await;
                    ctx.pop_continuation();
                    result
                }
            }
        })
    }

    /// How many interceptors are left before the handler.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.layers.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("remaining", &self.layers.len()).field("endpoint", &self.endpoint_name).finish()
    }
}

pub(crate) struct Layer {
    pattern: PathPattern,
    method: MethodSpec,
    interceptor: Box<dyn Interceptor>,
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("interceptor", &self.interceptor.name())
            .finish()
    }
}

impl Layer {
    fn applies_to(&self, path: &str, method: &Method) -> bool {
        self.method.matches(method) && self.pattern.is_match(path)
    }
}

/// The registered interceptors of an application.
pub struct InterceptorChain {
    // newest first
    layers: Vec<Layer>,
    placeholder: String,
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::with_placeholder(DEFAULT_PLACEHOLDER)
    }

    /// A chain whose patterns expand `{name}` placeholders to `placeholder`.
    pub fn with_placeholder(placeholder: impl Into<String>) -> Self {
        Self { layers: Vec::new(), placeholder: placeholder.into() }
    }

    /// Registers `interceptor` for requests matching `pattern` and `method` (`*` for any).
    ///
    /// # Errors
    /// An invalid method or a pattern that does not compile.
    pub fn register<I>(&mut self, pattern: &str, method: &str, interceptor: I) -> Result<(), RouterError>
    where
        I: Interceptor + 'static,
    {
        self.register_boxed(pattern, method, Box::new(interceptor))
    }

    pub(crate) fn register_boxed(
        &mut self,
        pattern: &str,
        method: &str,
        interceptor: Box<dyn Interceptor>,
    ) -> Result<(), RouterError> {
        let layer = Layer {
            pattern: PathPattern::with_placeholder(pattern, &self.placeholder)?,
            method: method.parse()?,
            interceptor,
        };
        self.layers.insert(0, layer);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Folds the interceptors matching `path` and `method` around `handler`.
    pub fn build<'a>(
        &'a self,
        handler: &'a dyn RequestHandler,
        handler_name: &'a str,
        path: &str,
        method: &Method,
    ) -> Pipeline<'a> {
        let layers = self.layers.iter().rev().filter(|layer| layer.applies_to(path, method)).collect();
        Pipeline { layers, endpoint: handler, endpoint_name: handler_name }
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for layer in &self.layers {
            list.entry(&format_args!("{} {} {}", layer.method, layer.pattern.as_str(), layer.interceptor.name()));
        }
        list.finish()
    }
}

/// The interceptors applying to one request, outermost first, around its handler.
pub struct Pipeline<'a> {
    layers: Vec<&'a Layer>,
    endpoint: &'a dyn RequestHandler,
    endpoint_name: &'a str,
}

impl Pipeline<'_> {
    pub async fn run(&self, ctx: &mut RequestContext) -> HandlerResult {
        Next { layers: &self.layers, endpoint: self.endpoint, endpoint_name: self.endpoint_name }.run(ctx).await
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.layers.len()
    }
}

impl fmt::Debug for Pipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("depth", &self.layers.len()).field("endpoint", &self.endpoint_name).finish()
    }
}

pub struct InterceptorFn<F> {
    f: F,
}

impl<F> fmt::Debug for InterceptorFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorFn").finish_non_exhaustive()
    }
}

/// Adapts a closure into an [`Interceptor`].
///
/// ```no_run
/// use lessweb::interceptor_fn;
///
/// let passthrough = interceptor_fn(|ctx, next| Box::pin(async move { next.run(ctx).await }));
/// ```
pub fn interceptor_fn<F>(f: F) -> InterceptorFn<F>
where
    F: for<'c> Fn(&'c mut RequestContext, Next<'c>) -> BoxFuture<'c, HandlerResult> + Send + Sync,
{
    InterceptorFn { f }
}

#[async_trait]
impl<F> Interceptor for InterceptorFn<F>
where
    F: for<'c> Fn(&'c mut RequestContext, Next<'c>) -> BoxFuture<'c, HandlerResult> + Send + Sync,
{
    async fn intercept(&self, ctx: &mut RequestContext, next: Next<'_>) -> HandlerResult {
        (self.f)(ctx, next).await
    }
}
