//! Conversion of handler return values into replies.
//!
//! A handler returns anything implementing [`Responder`]. The result is a
//! [`Reply`]: status, headers and a structured [`ReplyBody`]. Keeping JSON
//! bodies as [`serde_json::Value`] until the very end lets interceptors and
//! views inspect or rewrite them. The dispatcher turns the final reply into
//! bytes.

use crate::context::RequestContext;
use crate::error::{HandlerResult, WebError};
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::borrow::Cow;
use std::convert::Infallible;

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ReplyBody {
    #[default]
    Empty,
    Text(String),
    Bytes(Bytes),
    Json(Value),
}

impl ReplyBody {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ReplyBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ReplyBody::Json(value) => Some(value),
            _ => None,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, ReplyBody::Empty)
    }
}

/// A handler's result before it is written to the wire.
///
/// A reply without a status takes the status set on the context's
/// [`Response`](crate::Response), `200 OK` otherwise.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: ReplyBody,
}

impl Reply {
    pub fn new(body: ReplyBody) -> Self {
        Self { status: None, headers: HeaderMap::new(), body }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(ReplyBody::Text(text.into()))
    }

    pub fn bytes(bytes: impl Into<Bytes>) -> Self {
        Self::new(ReplyBody::Bytes(bytes.into()))
    }

    pub fn json(value: Value) -> Self {
        Self::new(ReplyBody::Json(value))
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    #[inline]
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    #[inline]
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    #[inline]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    #[inline]
    pub fn body(&self) -> &ReplyBody {
        &self.body
    }

    #[inline]
    pub fn body_mut(&mut self) -> &mut ReplyBody {
        &mut self.body
    }

    pub fn into_parts(self) -> (Option<StatusCode>, HeaderMap, ReplyBody) {
        (self.status, self.headers, self.body)
    }
}

/// A trait for types a handler can return.
pub trait Responder {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult;
}

impl Responder for Reply {
    #[inline]
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(self)
    }
}

/// Errors convert into [`WebError`] and abort the request.
impl<T: Responder, E: Into<WebError>> Responder for Result<T, E> {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
        match self {
            Ok(t) => t.respond_to(ctx),
            Err(e) => Err(e.into()),
        }
    }
}

/// `None` is an empty body.
impl<T: Responder> Responder for Option<T> {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
        match self {
            Some(t) => t.respond_to(ctx),
            None => Ok(Reply::empty()),
        }
    }
}

impl<T: Responder> Responder for (StatusCode, T) {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
        let (status, responder) = self;
        responder.respond_to(ctx).map(|reply| reply.with_status(status))
    }
}

impl<T: Responder> Responder for (T, StatusCode) {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
        let (responder, status) = self;
        (status, responder).respond_to(ctx)
    }
}

impl<T: Responder> Responder for Box<T> {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
        (*self).respond_to(ctx)
    }
}

/// Pre-built responses pass through with their status and headers.
impl<B: Into<Bytes>> Responder for http::Response<B> {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        let (parts, body) = self.into_parts();
        let mut reply = Reply::bytes(body).with_status(parts.status);
        *reply.headers_mut() = parts.headers;
        Ok(reply)
    }
}

impl Responder for () {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::empty())
    }
}

impl Responder for Infallible {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        match self {}
    }
}

impl Responder for &'static str {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::text(self))
    }
}

impl Responder for String {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::text(self))
    }
}

impl Responder for Cow<'static, str> {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::text(self))
    }
}

impl Responder for Bytes {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::bytes(self))
    }
}

impl Responder for Vec<u8> {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::bytes(self))
    }
}

impl Responder for Value {
    fn respond_to(self, _ctx: &RequestContext) -> HandlerResult {
        Ok(Reply::json(self))
    }
}

// numbers and booleans are JSON bodies
macro_rules! json_scalar_responder {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl Responder for $ty {
                fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
                    ctx.encoders().encode(&self).map(Reply::json)
                }
            }
        )+
    };
}

json_scalar_responder!(bool, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, u128, usize, f32, f64);
