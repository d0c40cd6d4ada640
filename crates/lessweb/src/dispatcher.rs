//! Turns requests into responses.
//!
//! For every request the [`Application`]:
//!
//! 1. builds a [`RequestContext`], with the base path moved off the request path,
//! 2. serves `/static/` files when a static directory is configured,
//! 3. matches the route table, answering `404` or `405` on failure, and reads
//!    multipart bodies of matched requests,
//! 4. wraps the matched handler with the interceptors matching the request,
//! 5. runs the pipeline, bounded by the request timeout and with panics caught,
//! 6. renders the reply or the error into an `http::Response`.

use crate::body::ResponseBody;
use crate::bind::Coerce;
use crate::config::{ConfigError, Settings};
use crate::context::{AppShared, RequestContext};
use crate::encoder::JsonEncoder;
use crate::error::{HandlerResult, WebError};
use crate::interceptor::{Interceptor, InterceptorChain};
use crate::request::RequestHead;
use crate::responder::{Reply, ReplyBody};
use crate::router::{Router, RouterError};
use crate::static_files::StaticFiles;
use arc_swap::ArcSwap;
use bytes::Bytes;
use futures::FutureExt;
use http::header::{ALLOW, CONTENT_TYPE, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::json;
use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Where a configured static directory is served.
const STATIC_PREFIX: &str = "/static/";

#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct Application {
    router: ArcSwap<Router>,
    interceptors: InterceptorChain,
    shared: Arc<AppShared>,
    settings: Settings,
    home_path: String,
    static_files: Option<StaticFiles>,
    html_content_type: HeaderValue,
    json_content_type: HeaderValue,
}

impl Application {
    pub fn builder() -> ApplicationBuilder {
        ApplicationBuilder::new()
    }

    #[inline]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The route table currently serving requests.
    pub fn router(&self) -> Arc<Router> {
        self.router.load_full()
    }

    #[inline]
    pub fn interceptors(&self) -> &InterceptorChain {
        &self.interceptors
    }

    /// Swaps in a new route table, requests already in flight finish on the old one.
    pub fn replace_router(&self, router: Router) {
        info!(routes = router.len(), "replacing route table");
        self.router.store(Arc::new(router));
    }

    pub async fn handle(&self, request: http::Request<Bytes>) -> http::Response<ResponseBody> {
        let (parts, body) = request.into_parts();
        let mut head = RequestHead::from(parts);
        let static_file = self.static_file_path(&head);
        let mounted = head.mount_at(&self.home_path);
        let mut ctx = RequestContext::new(Arc::new(head), body, Arc::clone(&self.shared));
        let span = info_span!("request", method = %ctx.method(), path = %ctx.path());

        async move {
            let started = Instant::now();
            let result = match static_file {
                Some(relative) => self.serve_static(&ctx, &relative).await,
                None if mounted => self.dispatch(&mut ctx).await,
                None => Err(WebError::RouteNotFound),
            };
            let response = self.render(&ctx, result);
            info!(status = response.status().as_u16(), elapsed = ?started.elapsed(), "request completed");
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, ctx: &mut RequestContext) -> HandlerResult {
        let router = self.router.load_full();
        let (route, params) = router.at(ctx.path(), ctx.method())?.into_parts();
        ctx.set_path_params(params);
        ctx.set_accepted_inputs(route.accepted_inputs().cloned());
        ctx.load_multipart().await;

        let path = ctx.path().to_string();
        let method = ctx.method().clone();
        let pipeline = self.interceptors.build(route.handler(), route.pattern().as_str(), &path, &method);
        debug!(pattern = route.pattern().as_str(), interceptors = pipeline.depth(), "route matched");

        let run = AssertUnwindSafe(pipeline.run(ctx)).catch_unwind();
        let outcome = match self.settings.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_| WebError::Timeout(limit))?,
            None => run.await,
        };

        outcome.unwrap_or_else(|panic| Err(WebError::fault(panic_message(&*panic))))
    }

    fn static_file_path(&self, head: &RequestHead) -> Option<String> {
        self.static_files.as_ref()?;
        head.path().strip_prefix(STATIC_PREFIX).map(str::to_string)
    }

    async fn serve_static(&self, ctx: &RequestContext, relative: &str) -> HandlerResult {
        let Some(static_files) = &self.static_files else {
            return Err(WebError::RouteNotFound);
        };
        if !matches!(*ctx.method(), Method::GET | Method::HEAD) {
            return Err(WebError::MethodNotAllowed { allowed: vec![Method::GET, Method::HEAD] });
        }
        static_files.serve(relative).await
    }

    fn render(&self, ctx: &RequestContext, result: HandlerResult) -> http::Response<ResponseBody> {
        let reply = result.unwrap_or_else(|e| self.error_reply(&e));
        let (status, reply_headers, body) = reply.into_parts();

        let status = status.or_else(|| ctx.response().status()).unwrap_or(StatusCode::OK);
        let mut headers = ctx.response().headers();
        headers.extend(reply_headers);

        let (content_type, bytes) = match body {
            ReplyBody::Empty => (self.html_content_type.clone(), Bytes::new()),
            ReplyBody::Text(text) => (self.html_content_type.clone(), Bytes::from(text)),
            ReplyBody::Bytes(bytes) => (self.html_content_type.clone(), bytes),
            ReplyBody::Json(value) => (self.json_content_type.clone(), Bytes::from(value.to_string())),
        };
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, content_type);
        }
        append_cookies(ctx, &mut headers);

        let mut response = http::Response::new(ResponseBody::once(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }

    fn error_reply(&self, e: &WebError) -> Reply {
        let status = e.status_code();
        match e {
            WebError::MissingParameter { field } | WebError::InvalidParameter { field, .. } => {
                debug!(field = %field, "binding failed: {e}");
                let kind = if matches!(e, WebError::MissingParameter { .. }) { "MissingParameter" } else { "InvalidParameter" };
                Reply::json(json!({"error": kind, "field": field, "message": e.to_string()})).with_status(status)
            }
            WebError::RouteNotFound => Reply::text("Not Found").with_status(status),
            WebError::MethodNotAllowed { allowed } => {
                let mut reply = Reply::text("Method Not Allowed").with_status(status);
                let allow = allowed.iter().map(http::Method::as_str).collect::<Vec<_>>().join(", ");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    reply.headers_mut().insert(ALLOW, value);
                }
                reply
            }
            WebError::Status { message, .. } => Reply::text(message.clone()).with_status(status),
            WebError::Timeout(limit) => {
                warn!(timeout = ?limit, "request timed out");
                Reply::text("Service Unavailable").with_status(status)
            }
            WebError::ServiceCycle { .. } | WebError::Fault { .. } => {
                let chain = error_chain(e);
                error!(cause = %chain, "request failed");
                let body = if self.settings.debug { chain } else { "Internal Server Error".to_string() };
                Reply::text(body).with_status(status)
            }
        }
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("routes", &self.router.load().len())
            .field("interceptors", &self.interceptors)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Cookies without a path are scoped to the base path.
fn append_cookies(ctx: &RequestContext, headers: &mut HeaderMap) {
    let default_path = format!("{}/", ctx.request().home_path());
    for cookie in ctx.response().cookies() {
        match cookie.header_value(&default_path) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(e) => warn!(cookie = cookie.name(), cause = %e, "dropping cookie with invalid characters"),
        }
    }
}

fn error_chain(e: &dyn StdError) -> String {
    let mut chain = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        chain.push_str("\ncaused by: ");
        chain.push_str(&cause.to_string());
        source = cause.source();
    }
    chain
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let message = panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic");
    format!("handler panicked: {message}")
}

struct PendingInterceptor {
    pattern: String,
    method: String,
    interceptor: Box<dyn Interceptor>,
}

impl fmt::Debug for PendingInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingInterceptor")
            .field("pattern", &self.pattern)
            .field("method", &self.method)
            .field("interceptor", &self.interceptor.name())
            .finish()
    }
}

pub struct ApplicationBuilder {
    router: Option<Router>,
    interceptors: Vec<PendingInterceptor>,
    shared: AppShared,
    settings: Settings,
}

impl ApplicationBuilder {
    fn new() -> Self {
        Self { router: None, interceptors: Vec::new(), shared: AppShared::default(), settings: Settings::default() }
    }

    pub fn router(mut self, router: Router) -> Self {
        self.router = Some(router);
        self
    }

    /// Wraps the handlers of requests matching `pattern` and `method` (`*` for any).
    ///
    /// Interceptors registered earlier wrap the ones registered later.
    pub fn interceptor<I>(mut self, pattern: impl Into<String>, method: impl Into<String>, interceptor: I) -> Self
    where
        I: Interceptor + 'static,
    {
        self.interceptors.push(PendingInterceptor {
            pattern: pattern.into(),
            method: method.into(),
            interceptor: Box::new(interceptor),
        });
        self
    }

    /// Shares `value` with every request, handlers read it through [`State<T>`](crate::State).
    pub fn state<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.shared.state.insert(value);
        self
    }

    /// Adds a custom coercer, consulted before the built-in conversions.
    pub fn coercer<C: Coerce + 'static>(mut self, coercer: C) -> Self {
        self.shared.coercers.push(coercer);
        self
    }

    pub fn encoder<E: JsonEncoder + 'static>(mut self, encoder: E) -> Self {
        self.shared.encoders.push(encoder);
        self
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.settings.debug = debug;
        self
    }

    pub fn encoding(mut self, encoding: impl Into<String>) -> Self {
        self.settings.encoding = encoding.into();
        self
    }

    /// Mounts the application below `base_path`, e.g. `/api`.
    pub fn base_path(mut self, base_path: impl Into<String>) -> Self {
        self.settings.base_path = base_path.into();
        self
    }

    /// Serves the files of `dir` under `/static/`.
    pub fn static_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.settings.static_dir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.request_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn build(self) -> Result<Application, ApplicationError> {
        self.settings.validate()?;

        let mut interceptors = InterceptorChain::with_placeholder(self.settings.placeholder_pattern.clone());
        for pending in self.interceptors {
            interceptors.register_boxed(&pending.pattern, &pending.method, pending.interceptor).inspect_err(|e| {
                error!(pattern = %pending.pattern, method = %pending.method, "invalid interceptor: {e}");
            })?;
        }

        let router = match self.router {
            Some(router) => router,
            None => Router::builder().build()?,
        };

        let html_content_type = HeaderValue::from_str(&format!("{}; charset={}", mime::TEXT_HTML, self.settings.encoding))
            .map_err(|e| ConfigError::Invalid { key: "encoding", reason: e.to_string() })?;
        let json_content_type = HeaderValue::from_str(mime::APPLICATION_JSON.as_ref())
            .map_err(|e| ConfigError::Invalid { key: "encoding", reason: e.to_string() })?;

        let home_path = self.settings.home_path();
        let static_files =
            self.settings.static_dir.clone().map(|dir| StaticFiles::new(dir).max_age(self.settings.static_max_age()));

        info!(
            routes = router.len(),
            interceptors = interceptors.len(),
            home_path = %home_path,
            static_dir = ?self.settings.static_dir,
            "application built"
        );
        Ok(Application {
            router: ArcSwap::from_pointee(router),
            interceptors,
            shared: Arc::new(self.shared),
            settings: self.settings,
            home_path,
            static_files,
            html_content_type,
            json_content_type,
        })
    }
}

impl fmt::Debug for ApplicationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationBuilder")
            .field("interceptors", &self.interceptors.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
