//! Whole-request extractors.
//!
//! Unlike named parameters these read an entire input source at once:
//!
//! * [`Query<T>`] deserializes the query string with `serde_qs`,
//! * [`Form<T>`] deserializes an urlencoded body with `serde_urlencoded`,
//! * [`Json<T>`] deserializes a JSON body with `serde_json`,
//! * [`State<T>`] clones application state registered on the builder.

use crate::bind::{Bindable, Binder, ParamDescriptor, ParamKind, SpecialKind};
use crate::context::RequestContext;
use crate::error::{HandlerResult, WebError};
use crate::responder::{Reply, Responder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ops::{Deref, DerefMut};
use tracing::debug;

macro_rules! wrapper {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name<T>(pub T);

        impl<T> $name<T> {
            pub fn into_inner(self) -> T {
                self.0
            }
        }

        impl<T> Deref for $name<T> {
            type Target = T;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl<T> DerefMut for $name<T> {
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.0
            }
        }
        )*
    };
}

wrapper! {
    /// The query string deserialized as `T`.
    Query,
    /// The urlencoded body deserialized as `T`.
    Form,
    /// A JSON body as a parameter, a JSON body as a return value.
    Json,
    /// A clone of the application state of type `T`.
    State,
}

impl<T: DeserializeOwned + Send + 'static> Bindable for Query<T> {
    fn kind() -> ParamKind {
        ParamKind::Special(SpecialKind::Query)
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        let query = binder.context().request().query_string();
        serde_qs::from_str::<T>(query).map(Query).map_err(|e| {
            debug!(cause = %e, "invalid query string");
            WebError::invalid("query", e)
        })
    }
}

impl<T: DeserializeOwned + Send + 'static> Bindable for Form<T> {
    fn kind() -> ParamKind {
        ParamKind::Special(SpecialKind::Form)
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        serde_urlencoded::from_bytes::<T>(binder.context().body()).map(Form).map_err(|e| {
            debug!(cause = %e, "invalid form body");
            WebError::invalid("form", e)
        })
    }
}

impl<T: DeserializeOwned + Send + 'static> Bindable for Json<T> {
    fn kind() -> ParamKind {
        ParamKind::Special(SpecialKind::Json)
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        serde_json::from_slice::<T>(binder.context().body()).map(Json).map_err(|e| {
            debug!(cause = %e, "invalid json body");
            WebError::invalid("body", e)
        })
    }
}

impl<T: Serialize + 'static> Responder for Json<T> {
    fn respond_to(self, ctx: &RequestContext) -> HandlerResult {
        ctx.encoders().encode(&self.0).map(Reply::json)
    }
}

impl<T: Clone + Send + Sync + 'static> Bindable for State<T> {
    fn kind() -> ParamKind {
        ParamKind::Special(SpecialKind::State)
    }

    fn bind(binder: &mut Binder<'_>, _desc: &ParamDescriptor) -> Result<Self, WebError> {
        binder
            .context()
            .state::<T>()
            .cloned()
            .map(State)
            .ok_or_else(|| WebError::fault(format!("state `{}` is not registered", std::any::type_name::<T>())))
    }
}

#[cfg(test)]
mod tests {
    use super::{Form, Json, Query, State};
    use crate::bind::{Bindable, Binder, ParamDescriptor};
    use crate::context::RequestContext;
    use crate::error::WebError;
    use crate::responder::{ReplyBody, Responder};
    use bytes::Bytes;
    use http::Method;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Search {
        q: String,
        page: Option<u32>,
    }

    fn context(method: Method, uri: &str, body: &'static str) -> RequestContext {
        RequestContext::from_request(
            http::Request::builder().method(method).uri(uri).body(Bytes::from_static(body.as_bytes())).unwrap(),
        )
    }

    fn bind<T: Bindable>(ctx: &RequestContext) -> Result<T, WebError> {
        let mut binder = Binder::new(ctx);
        binder.param(&ParamDescriptor::new("whole", T::kind()))
    }

    #[test]
    fn test_query() {
        let ctx = context(Method::GET, "/s?q=rust&page=2", "");
        let Query(search) = bind::<Query<Search>>(&ctx).unwrap();
        assert_eq!(search, Search { q: "rust".into(), page: Some(2) });

        let ctx = context(Method::GET, "/s?page=2", "");
        let err = bind::<Query<Search>>(&ctx).unwrap_err();
        assert_eq!(err.field(), Some("query"));
    }

    #[test]
    fn test_form() {
        let ctx = context(Method::POST, "/s", "q=hello+world");
        let Form(search) = bind::<Form<Search>>(&ctx).unwrap();
        assert_eq!(search.q, "hello world");
        assert_eq!(search.page, None);
    }

    #[test]
    fn test_json() {
        let ctx = context(Method::POST, "/s", r#"{"q": "x", "page": 1}"#);
        let Json(search) = bind::<Json<Search>>(&ctx).unwrap();
        assert_eq!(search.page, Some(1));

        let ctx = context(Method::POST, "/s", "{broken");
        let err = bind::<Json<Search>>(&ctx).unwrap_err();
        assert_eq!(err.field(), Some("body"));
    }

    #[test]
    fn test_state_not_registered() {
        let ctx = context(Method::GET, "/", "");
        let err = bind::<State<String>>(&ctx).unwrap_err();
        assert!(matches!(err, WebError::Fault { .. }));
    }

    #[test]
    fn test_json_responder() {
        let ctx = context(Method::GET, "/", "");
        let reply = Json(Search { q: "x".into(), page: None }).respond_to(&ctx).unwrap();
        assert_eq!(reply.body(), &ReplyBody::Json(json!({"q": "x", "page": null})));
    }
}
