//! Composable wrappers applied to every route handler at router build time.
//!
//! A [`Decorator`] turns one value into another, typically a handler into a
//! wrapped handler. Decorators chain with [`DecoratorExt::and_then`], the
//! left decorator is applied first.

use crate::context::RequestContext;
use crate::error::HandlerResult;
use crate::handler::RequestHandler;
use crate::responder::Reply;
use async_trait::async_trait;
use std::fmt;

pub trait Decorator<In> {
    type Out;

    fn decorate(&self, raw: In) -> Self::Out;
}

pub trait DecoratorExt<In>: Decorator<In> {
    fn and_then<D>(self, decorator: D) -> DecoratorComposer<Self, D>
    where
        Self: Sized,
    {
        DecoratorComposer::new(self, decorator)
    }
}

impl<T: Decorator<In> + ?Sized, In> DecoratorExt<In> for T {}

#[derive(Default, Clone, Copy, Debug)]
pub struct IdentityDecorator;

impl<In> Decorator<In> for IdentityDecorator {
    type Out = In;

    #[inline(always)]
    fn decorate(&self, raw: In) -> Self::Out {
        raw
    }
}

#[derive(Debug)]
pub struct DecoratorComposer<D1, D2> {
    first: D1,
    second: D2,
}

impl<D1, D2> DecoratorComposer<D1, D2> {
    pub fn new(first: D1, second: D2) -> Self {
        Self { first, second }
    }
}

impl<In, D1, D2> Decorator<In> for DecoratorComposer<D1, D2>
where
    D1: Decorator<In>,
    D2: Decorator<D1::Out>,
{
    type Out = D2::Out;

    fn decorate(&self, raw: In) -> Self::Out {
        self.second.decorate(self.first.decorate(raw))
    }
}

#[derive(Clone, Copy)]
pub struct DecoratorFn<F> {
    f: F,
}

impl<F> fmt::Debug for DecoratorFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorFn").finish_non_exhaustive()
    }
}

pub fn decorator_fn<In, Out, F>(f: F) -> DecoratorFn<F>
where
    F: Fn(In) -> Out,
{
    DecoratorFn { f }
}

impl<In, Out, F> Decorator<In> for DecoratorFn<F>
where
    F: Fn(In) -> Out,
{
    type Out = Out;

    fn decorate(&self, raw: In) -> Self::Out {
        (self.f)(raw)
    }
}

/// Rewrites every successful reply of the decorated handler.
#[derive(Clone, Copy)]
pub struct MapReply<F> {
    f: F,
}

impl<F> fmt::Debug for MapReply<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReply").finish_non_exhaustive()
    }
}

pub fn map_reply<F>(f: F) -> MapReply<F>
where
    F: Fn(Reply) -> Reply + Clone + Send + Sync + 'static,
{
    MapReply { f }
}

pub struct MapReplyHandler<H, F> {
    handler: H,
    f: F,
}

impl<H: fmt::Debug, F> fmt::Debug for MapReplyHandler<H, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapReplyHandler").field("handler", &self.handler).finish_non_exhaustive()
    }
}

impl<H, F> Decorator<H> for MapReply<F>
where
    H: RequestHandler,
    F: Fn(Reply) -> Reply + Clone + Send + Sync + 'static,
{
    type Out = MapReplyHandler<H, F>;

    fn decorate(&self, handler: H) -> Self::Out {
        MapReplyHandler { handler, f: self.f.clone() }
    }
}

#[async_trait]
impl<H, F> RequestHandler for MapReplyHandler<H, F>
where
    H: RequestHandler,
    F: Fn(Reply) -> Reply + Send + Sync,
{
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        self.handler.invoke(ctx).await.map(&self.f)
    }

    fn validate(&self) -> Result<(), crate::router::RouterError> {
        self.handler.validate()
    }
}
