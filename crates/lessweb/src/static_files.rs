//! Serving files from a directory.
//!
//! Replies carry `Cache-Control: max-age`, `Expires`, `Last-Modified` and a
//! content type guessed from the file extension. Paths containing `..` are
//! answered with `404`, like missing files.

use crate::context::RequestContext;
use crate::error::{HandlerResult, WebError};
use crate::handler::RequestHandler;
use crate::responder::Reply;
use async_trait::async_trait;
use http::HeaderValue;
use http::header::{CACHE_CONTROL, CONTENT_TYPE, EXPIRES, LAST_MODIFIED};
use httpdate::fmt_http_date;
use mime::Mime;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::debug;

pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(900);

/// The path parameter [`StaticFiles`] reads the file path from.
pub const FILE_PATH_PARAM: &str = "path";

/// Reads `relative` below `root` into a reply with caching headers.
///
/// # Errors
/// [`WebError::RouteNotFound`] when the path contains `..` or names no regular file,
/// a fault for other I/O errors.
pub async fn serve_file(root: &Path, relative: &str, max_age: Duration) -> HandlerResult {
    if relative.contains("..") {
        return Err(WebError::RouteNotFound);
    }

    let file = root.join(relative.trim_start_matches('/'));
    let metadata = tokio::fs::metadata(&file).await.map_err(not_found_or_fault)?;
    if !metadata.is_file() {
        return Err(WebError::RouteNotFound);
    }
    let bytes = tokio::fs::read(&file).await.map_err(not_found_or_fault)?;
    debug!(file = %file.display(), size = bytes.len(), "serving static file");

    let mut reply = Reply::bytes(bytes);
    let headers = reply.headers_mut();
    headers.insert(CONTENT_TYPE, header_value(guess_content_type(&file).as_ref())?);
    headers.insert(CACHE_CONTROL, header_value(&format!("max-age={}", max_age.as_secs()))?);
    headers.insert(EXPIRES, header_value(&fmt_http_date(SystemTime::now() + max_age))?);
    if let Ok(modified) = metadata.modified() {
        headers.insert(LAST_MODIFIED, header_value(&fmt_http_date(modified))?);
    }
    Ok(reply)
}

fn not_found_or_fault(e: io::Error) -> WebError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => WebError::RouteNotFound,
        _ => WebError::fault(e),
    }
}

fn header_value(value: &str) -> Result<HeaderValue, WebError> {
    HeaderValue::from_str(value).map_err(WebError::fault)
}

fn guess_content_type(file: &Path) -> Mime {
    let extension = file.extension().and_then(|ext| ext.to_str()).map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("html" | "htm") => mime::TEXT_HTML_UTF_8,
        Some("css") => mime::TEXT_CSS_UTF_8,
        Some("js" | "mjs") => mime::APPLICATION_JAVASCRIPT_UTF_8,
        Some("json") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN_UTF_8,
        Some("csv") => mime::TEXT_CSV_UTF_8,
        Some("xml") => mime::TEXT_XML,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("bmp") => mime::IMAGE_BMP,
        Some("svg") => mime::IMAGE_SVG,
        Some("woff") => mime::FONT_WOFF,
        Some("woff2") => mime::FONT_WOFF2,
        Some("pdf") => mime::APPLICATION_PDF,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

/// A handler serving the files below a directory.
///
/// The file is named by the `path` capture of the route:
///
/// ```no_run
/// use lessweb::{Router, StaticFiles, get};
///
/// let router = Router::builder().route("/assets/(?P<path>.*)", get(StaticFiles::new("./public"))).build();
/// ```
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: Arc<PathBuf>,
    max_age: Duration,
}

impl StaticFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: Arc::new(root.into()), max_age: DEFAULT_MAX_AGE }
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) async fn serve(&self, relative: &str) -> HandlerResult {
        serve_file(&self.root, relative, self.max_age).await
    }
}

#[async_trait]
impl RequestHandler for StaticFiles {
    async fn invoke(&self, ctx: &mut RequestContext) -> HandlerResult {
        let relative = ctx.path_params().get(FILE_PATH_PARAM).ok_or(WebError::RouteNotFound)?;
        self.serve(relative).await
    }
}
