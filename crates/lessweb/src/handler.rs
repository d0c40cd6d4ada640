//! Request handlers.
//!
//! Any async function whose arguments are [`Bindable`](crate::Bindable) and
//! whose output is a [`Responder`] becomes a handler through [`handler_fn`].
//! Rust functions carry no parameter names at runtime, so every argument read
//! from request input is named with [`FnHandler::param`], in declaration
//! order. Arguments served by the context (requests, responses, state,
//! services, models) take no name.

use crate::bind::{BindArgs, Binder, Param, ParamDescriptor};
use crate::context::RequestContext;
use crate::error::{HandlerResult, WebError};
use crate::fn_trait::FnTrait;
use crate::responder::Responder;
use crate::router::RouterError;
use async_trait::async_trait;
use futures::future::BoxFuture;
use once_cell::sync::OnceCell;
use std::fmt;
use std::marker::PhantomData;

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult;

    /// Checks the handler's declarations, called once when the router is built.
    fn validate(&self) -> Result<(), RouterError> {
        Ok(())
    }
}

#[async_trait]
impl RequestHandler for Box<dyn RequestHandler> {
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        (**self).invoke(ctx).await
    }

    fn validate(&self) -> Result<(), RouterError> {
        (**self).validate()
    }
}

/// a `FnTrait` holder which represents any async Fn
pub struct FnHandler<F, Args> {
    f: F,
    params: Vec<Param>,
    descriptors: OnceCell<Vec<ParamDescriptor>>,
    _phantom: PhantomData<fn(Args)>,
}

impl<F, Args> FnHandler<F, Args>
where
    F: FnTrait<Args>,
    Args: BindArgs,
{
    fn new(f: F) -> Self {
        Self { f, params: Vec::new(), descriptors: OnceCell::new(), _phantom: PhantomData }
    }

    /// Names the next argument that is read from request input.
    pub fn param(mut self, param: impl Into<Param>) -> Self {
        self.params.push(param.into());
        self
    }

    fn descriptors(&self) -> Result<&[ParamDescriptor], RouterError> {
        self.descriptors.get_or_try_init(|| self.describe()).map(Vec::as_slice)
    }

    fn describe(&self) -> Result<Vec<ParamDescriptor>, RouterError> {
        let kinds = Args::kinds();
        let expected = kinds.iter().filter(|kind| kind.reads_input()).count();
        if expected != self.params.len() {
            return Err(RouterError::ParamCountMismatch {
                handler: std::any::type_name::<F>(),
                declared: self.params.len(),
                expected,
            });
        }

        let mut params = self.params.iter();
        Ok(kinds
            .into_iter()
            .map(|kind| match kind.reads_input().then(|| params.next()).flatten() {
                Some(param) => param.describe(kind),
                None => {
                    let name = kind.model().map_or_else(|| kind.label(), |model| model.name.to_string());
                    ParamDescriptor::new(name, kind)
                }
            })
            .collect())
    }
}

impl<F, Args> fmt::Debug for FnHandler<F, Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("f", &std::any::type_name::<F>())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

pub fn handler_fn<F, Args>(f: F) -> FnHandler<F, Args>
where
    F: FnTrait<Args>,
    Args: BindArgs,
{
    FnHandler::new(f)
}

#[async_trait]
impl<F, Args> RequestHandler for FnHandler<F, Args>
where
    F: FnTrait<Args> + 'static,
    F::Output: Responder,
    Args: BindArgs + 'static,
{
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        let descriptors = self.descriptors().map_err(WebError::fault)?;
        let args = {
            let mut binder = Binder::new(ctx);
            Args::bind(&mut binder, descriptors)?
        };

        let responder = self.f.call(args).await;
        responder.respond_to(ctx)
    }

    fn validate(&self) -> Result<(), RouterError> {
        self.descriptors().map(|_| ())
    }
}

/// A handler working on the raw [`RequestContext`].
pub struct ContextHandler<F> {
    f: F,
}

impl<F> fmt::Debug for ContextHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandler").field("f", &std::any::type_name::<F>()).finish()
    }
}

/// Wraps a function of the context, for handlers that manage input and output themselves.
///
/// ```no_run
/// use lessweb::{Reply, ctx_handler};
///
/// let handler = ctx_handler(|ctx| Box::pin(async move { Ok(Reply::text(ctx.path().to_string())) }));
/// ```
pub fn ctx_handler<F>(f: F) -> ContextHandler<F>
where
    F: for<'c> Fn(&'c mut RequestContext) -> BoxFuture<'c, HandlerResult> + Send + Sync,
{
    ContextHandler { f }
}

#[async_trait]
impl<F> RequestHandler for ContextHandler<F>
where
    F: for<'c> Fn(&'c mut RequestContext) -> BoxFuture<'c, HandlerResult> + Send + Sync,
{
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        (self.f)(ctx).await
    }
}
