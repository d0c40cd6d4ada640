//! Per-route post-processing of handler replies.

use crate::context::RequestContext;
use crate::error::HandlerResult;
use crate::handler::RequestHandler;
use crate::responder::{Reply, ReplyBody};
use crate::router::RouterError;
use async_trait::async_trait;
use std::fmt;

/// Rewrites the reply of the route it is attached to.
pub trait View: Send + Sync {
    fn render(&self, ctx: &RequestContext, reply: Reply) -> HandlerResult;
}

impl<F> View for F
where
    F: Fn(&RequestContext, Reply) -> HandlerResult + Send + Sync,
{
    fn render(&self, ctx: &RequestContext, reply: Reply) -> HandlerResult {
        (self)(ctx, reply)
    }
}

/// Substitutes the reply's text for the first `{}` of `template`.
///
/// JSON replies are substituted in their compact serialized form, the
/// result is a text reply.
pub fn template_view(template: impl Into<String>) -> TemplateView {
    TemplateView { template: template.into() }
}

#[derive(Debug, Clone)]
pub struct TemplateView {
    template: String,
}

impl View for TemplateView {
    fn render(&self, _ctx: &RequestContext, reply: Reply) -> HandlerResult {
        let (status, headers, body) = reply.into_parts();
        let content = match body {
            ReplyBody::Empty => String::new(),
            ReplyBody::Text(text) => text,
            ReplyBody::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            ReplyBody::Json(value) => value.to_string(),
        };

        let mut rendered = Reply::text(self.template.replacen("{}", &content, 1));
        *rendered.headers_mut() = headers;
        if let Some(status) = status {
            rendered.set_status(status);
        }
        Ok(rendered)
    }
}

pub(crate) struct ViewHandler {
    handler: Box<dyn RequestHandler>,
    view: Box<dyn View>,
}

impl fmt::Debug for ViewHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewHandler").finish_non_exhaustive()
    }
}

impl ViewHandler {
    pub(crate) fn new(handler: Box<dyn RequestHandler>, view: Box<dyn View>) -> Self {
        Self { handler, view }
    }
}

#[async_trait]
impl RequestHandler for ViewHandler {
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        let reply = self.handler.invoke(ctx).await?;
        self.view.render(ctx, reply)
    }

    fn validate(&self) -> Result<(), RouterError> {
        self.handler.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::{View, template_view};
    use crate::context::RequestContext;
    use crate::responder::Reply;
    use bytes::Bytes;
    use http::StatusCode;
    use serde_json::json;

    fn ctx() -> RequestContext {
        RequestContext::from_request(http::Request::new(Bytes::new()))
    }

    #[test]
    fn test_template_view() {
        let view = template_view("sum={}");
        let reply = view.render(&ctx(), Reply::json(json!(3))).unwrap();
        assert_eq!(reply.body().as_text(), Some("sum=3"));

        let reply = view.render(&ctx(), Reply::text("x").with_status(StatusCode::CREATED)).unwrap();
        assert_eq!(reply.body().as_text(), Some("sum=x"));
        assert_eq!(reply.status(), Some(StatusCode::CREATED));
    }

    #[test]
    fn test_closure_view() {
        let view = |_: &RequestContext, reply: Reply| Ok(reply.with_status(StatusCode::ACCEPTED));
        let reply = view.render(&ctx(), Reply::empty()).unwrap();
        assert_eq!(reply.status(), Some(StatusCode::ACCEPTED));
    }
}
