use crate::body::ResponseBody;
use crate::dispatcher::Application;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("application must be set")]
    MissingApplication,

    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct ServerBuilder {
    application: Option<Application>,
    address: Option<String>,
}

impl ServerBuilder {
    fn new() -> Self {
        Self { application: None, address: None }
    }

    pub fn application(mut self, application: Application) -> Self {
        self.application = Some(application);
        self
    }

    /// Overrides the `address` setting of the application.
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn build(self) -> Result<Server, ServerError> {
        let application = self.application.ok_or(ServerError::MissingApplication)?;
        let address = self.address.unwrap_or_else(|| application.settings().address.clone());
        let address = address
            .parse::<SocketAddr>()
            .map_err(|e| ServerError::InvalidAddress { address: address.clone(), reason: e.to_string() })?;

        Ok(Server { application: Arc::new(application), address })
    }
}

#[derive(Debug)]
pub struct Server {
    application: Arc<Application>,
    address: SocketAddr,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    #[inline]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Serves until the process is stopped.
    pub async fn start(self) -> Result<(), ServerError> {
        self.start_with_shutdown(std::future::pending()).await
    }

    /// Serves until `shutdown` completes, connections already accepted run to their end.
    pub async fn start_with_shutdown<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send,
    {
        self.install_subscriber();

        let tcp_listener = TcpListener::bind(self.address).await.map_err(|source| {
            error!(cause = %source, "bind server error");
            ServerError::Bind { address: self.address, source }
        })?;
        info!("start listening at {}", self.address);

        tokio::pin!(shutdown);
        loop {
            let (tcp_stream, remote_addr) = tokio::select! {
                accepted = tcp_listener.accept() => match accepted {
                    Ok(stream_and_addr) => stream_and_addr,
                    Err(e) => {
                        warn!(cause = %e, "failed to accept");
                        continue;
                    }
                },
                () = &mut shutdown => {
                    info!("shutdown signal received, stop accepting connections");
                    return Ok(());
                }
            };

            let application = Arc::clone(&self.application);
            tokio::spawn(async move {
                let service = service_fn(move |request: http::Request<Incoming>| {
                    let application = Arc::clone(&application);
                    async move { Ok::<_, Infallible>(serve(&application, request, remote_addr).await) }
                });

                match http1::Builder::new().serve_connection(TokioIo::new(tcp_stream), service).await {
                    Ok(()) => debug!(%remote_addr, "finished process, connection shutdown"),
                    Err(e) => error!(%remote_addr, cause = %e, "service has error, connection shutdown"),
                }
            });
        }
    }

    fn install_subscriber(&self) {
        let level = self.application.settings().level().unwrap_or(tracing::Level::INFO);
        let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
        if tracing::subscriber::set_global_default(subscriber).is_err() {
            debug!("a global subscriber is already installed");
        }
    }
}

async fn serve(
    application: &Application,
    request: http::Request<Incoming>,
    remote_addr: SocketAddr,
) -> http::Response<ResponseBody> {
    let (mut parts, body) = request.into_parts();
    parts.extensions.insert(remote_addr);

    let limit = application.settings().max_body_size;
    let bytes = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(%remote_addr, limit, "request body too large");
            return status_response(http::StatusCode::PAYLOAD_TOO_LARGE);
        }
        Err(e) => {
            warn!(%remote_addr, cause = %e, "failed to read request body");
            return status_response(http::StatusCode::BAD_REQUEST);
        }
    };

    application.handle(http::Request::from_parts(parts, bytes)).await
}

fn status_response(status: http::StatusCode) -> http::Response<ResponseBody> {
    let mut response = http::Response::new(ResponseBody::from(status.canonical_reason().unwrap_or_default()));
    *response.status_mut() = status;
    response
}
