//! Request-level error taxonomy.
//!
//! Every failure that can happen while a request flows through the
//! dispatcher is represented by [`WebError`]. The dispatcher maps each
//! variant onto exactly one HTTP status class:
//!
//! | variant                                 | status |
//! |-----------------------------------------|--------|
//! | `MissingParameter`, `InvalidParameter`  | 400    |
//! | `RouteNotFound`                         | 404    |
//! | `MethodNotAllowed`                      | 405    |
//! | `Status`                                | as set |
//! | `Timeout`                               | 503    |
//! | `ServiceCycle`, `Fault`                 | 500    |

use crate::responder::Reply;
use http::{Method, StatusCode};
use std::error::Error;
use std::time::Duration;
use thiserror::Error;

pub type BoxError = Box<dyn Error + Send + Sync>;

/// The result every handler and interceptor produces.
pub type HandlerResult = Result<Reply, WebError>;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("missing parameter `{field}`")]
    MissingParameter { field: String },

    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("no route matches the request path")]
    RouteNotFound,

    #[error("method not allowed, supported methods: {allowed:?}")]
    MethodNotAllowed { allowed: Vec<Method> },

    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("request was not completed within {0:?}")]
    Timeout(Duration),

    #[error("service `{service}` depends on itself")]
    ServiceCycle { service: &'static str },

    #[error("handler fault: {source}")]
    Fault {
        #[from]
        source: BoxError,
    },
}

impl WebError {
    pub fn missing<S: ToString>(field: S) -> Self {
        Self::MissingParameter { field: field.to_string() }
    }

    pub fn invalid<F: ToString, R: ToString>(field: F, reason: R) -> Self {
        Self::InvalidParameter { field: field.to_string(), reason: reason.to_string() }
    }

    /// Aborts the request with an explicit status, e.g. `401` from an auth interceptor.
    pub fn status<S: ToString>(status: StatusCode, message: S) -> Self {
        Self::Status { status, message: message.to_string() }
    }

    pub fn fault<E: Into<BoxError>>(e: E) -> Self {
        Self::Fault { source: e.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::MissingParameter { .. } | Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
            Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Status { status, .. } => *status,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::ServiceCycle { .. } | Self::Fault { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Binding errors are caused by the client's input.
    #[inline]
    pub fn is_binding_error(&self) -> bool {
        matches!(self, Self::MissingParameter { .. } | Self::InvalidParameter { .. })
    }

    /// The offending input name for binding errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingParameter { field } | Self::InvalidParameter { field, .. } => Some(field),
            _ => None,
        }
    }
}
