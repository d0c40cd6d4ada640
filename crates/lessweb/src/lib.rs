//! A small async web framework.
//!
//! * an ordered regex route table, first match wins,
//! * interceptor chains wrapping matched handlers, each interceptor decides
//!   whether and how often the rest of the pipeline runs,
//! * typed parameter binding from path, query, form, multipart and JSON
//!   input, with models, file uploads, injected services and custom coercers,
//! * static files, and mounting the whole application below a base path.
//!
//! ```no_run
//! use lessweb::{Application, Router, Server, get, handler_fn};
//! use serde_json::{Value, json};
//!
//! async fn add(a: i64, b: i64) -> Value {
//!     json!({"ans": a + b})
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let router = Router::builder().route("/add", get(handler_fn(add).param("a").param("b"))).build()?;
//!     let app = Application::builder().router(router).build()?;
//!     Server::builder().application(app).address("127.0.0.1:8080").build()?.start().await?;
//!     Ok(())
//! }
//! ```

mod body;
mod context;
mod dispatcher;
mod error;
mod fn_trait;
mod handler;
mod input;
mod request;
mod responder;
mod response;
mod server;
mod static_files;
mod upload;
mod utils;

pub mod bind;
pub mod config;
pub mod decorator;
pub mod encoder;
pub mod extract;
pub mod interceptor;
pub mod router;
pub mod view;

pub use bind::{
    BindArgs, Bindable, Binder, Coerce, FromValue, Inject, Model, ModelSchema, Param, ParamDescriptor, ParamKind,
    Service, coercer_fn,
};
pub use body::ResponseBody;
pub use config::{ConfigError, Settings};
pub use context::RequestContext;
pub use dispatcher::{Application, ApplicationBuilder, ApplicationError};
pub use encoder::{JsonEncoder, encoder_for};
pub use error::{BoxError, HandlerResult, WebError};
pub use extract::{Form, Json, Query, State};
pub use fn_trait::FnTrait;
pub use handler::{ContextHandler, FnHandler, RequestHandler, ctx_handler, handler_fn};
pub use input::{InputMap, InputValue};
pub use interceptor::{Interceptor, InterceptorChain, Next, interceptor_fn};
pub use request::Request;
pub use responder::{Reply, ReplyBody, Responder};
pub use response::{Cookie, Response, SameSite};
pub use router::{Router, RouterError, any, delete, get, head, options, patch, post, put, route_for};
pub use server::{Server, ServerError};
pub use static_files::{StaticFiles, serve_file};
pub use upload::{FileMap, UploadedFile};
pub use view::{View, template_view};
