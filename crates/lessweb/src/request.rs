//! Read-only view of the request line and headers.

use http::header::{AsHeaderName, CONTENT_TYPE, COOKIE, HOST};
use http::request::Parts;
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use mime::Mime;
use once_cell::sync::OnceCell;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

/// Everything of a request except its body.
#[derive(Debug)]
pub struct RequestHead {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path: String,
    home_path: String,
    remote_addr: Option<SocketAddr>,
    cookies: OnceCell<Vec<(String, String)>>,
}

impl RequestHead {
    #[inline]
    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Moves `home_path` from the front of the path into the home path.
    ///
    /// Returns `false`, leaving the head untouched, when the path does not lie below `home_path`.
    pub(crate) fn mount_at(&mut self, home_path: &str) -> bool {
        if home_path.is_empty() {
            return true;
        }
        let Some(rest) = self.path.strip_prefix(home_path).filter(|rest| rest.starts_with('/')) else {
            return false;
        };
        self.path = rest.to_string();
        self.home_path = home_path.to_string();
        true
    }
}

impl From<Parts> for RequestHead {
    fn from(parts: Parts) -> Self {
        let raw = parts.uri.path();
        // undecodable escapes keep the raw path
        let path = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), Cow::into_owned);
        let remote_addr = parts.extensions.get::<SocketAddr>().copied();
        Self {
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            path,
            home_path: String::new(),
            remote_addr,
            cookies: OnceCell::new(),
        }
    }
}

/// A cheap, cloneable handle on the current request head.
///
/// Handlers receive it by declaring a `Request` parameter.
#[derive(Debug, Clone)]
pub struct Request {
    head: Arc<RequestHead>,
}

impl Request {
    pub(crate) fn new(head: Arc<RequestHead>) -> Self {
        Self { head }
    }

    #[inline]
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    #[inline]
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.head.version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn header<K: AsHeaderName>(&self, name: K) -> Option<&HeaderValue> {
        self.head.headers.get(name)
    }

    /// The percent-decoded path below the home path, this is what routes are matched against.
    #[inline]
    pub fn path(&self) -> &str {
        &self.head.path
    }

    /// The prefix the application is mounted at, empty when mounted at the root.
    #[inline]
    pub fn home_path(&self) -> &str {
        &self.head.home_path
    }

    /// The raw query string without the leading `?`.
    pub fn query_string(&self) -> &str {
        self.head.uri.query().unwrap_or_default()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    /// Whether the body declares a JSON media type.
    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|content_type| content_type.contains("json"))
    }

    /// Whether the body is `multipart/form-data`.
    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .and_then(|content_type| content_type.parse::<Mime>().ok())
            .is_some_and(|m| m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA)
    }

    pub(crate) fn multipart_boundary(&self) -> Option<String> {
        self.content_type().and_then(|content_type| multer::parse_boundary(content_type).ok())
    }

    pub fn host(&self) -> Option<&str> {
        self.head
            .uri
            .host()
            .or_else(|| self.header(HOST).and_then(|value| value.to_str().ok()))
    }

    /// The peer address, when the request came through the server.
    #[inline]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.head.remote_addr
    }

    /// All request cookies in header order.
    pub fn cookies(&self) -> &[(String, String)] {
        self.head.cookies.get_or_init(|| parse_cookies(&self.head.headers))
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().iter().find(|(key, _)| key == name).map(|(_, value)| value.as_str())
    }
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            let value = value.trim();
            let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);
            let value = urlencoding::decode(value).map_or_else(|_| value.to_string(), Cow::into_owned);
            Some((name.to_string(), value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{Request, RequestHead};
    use http::Method;
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn request(builder: http::request::Builder) -> Request {
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Request::new(Arc::new(RequestHead::from(parts)))
    }

    #[test]
    fn test_basic_accessors() {
        let req = request(
            http::Request::builder()
                .method(Method::POST)
                .uri("/user/%E4%BD%A0?a=1&b=2")
                .header("host", "example.com")
                .header("content-type", "application/json; charset=utf-8"),
        );

        assert_eq!(req.method(), &Method::POST);
        assert_eq!(req.path(), "/user/你");
        assert_eq!(req.query_string(), "a=1&b=2");
        assert_eq!(req.host(), Some("example.com"));
        assert!(req.is_json());
        assert_eq!(req.remote_addr(), None);
    }

    #[test]
    fn test_cookies() {
        let req = request(
            http::Request::builder()
                .uri("/")
                .header("cookie", "sid=abc; theme=\"dark\"")
                .header("cookie", "lang=zh; broken"),
        );

        assert_eq!(req.cookies().len(), 3);
        assert_eq!(req.cookie("sid"), Some("abc"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("lang"), Some("zh"));
        assert_eq!(req.cookie("broken"), None);
    }

    #[test]
    fn test_cookie_values_are_unquoted() {
        let req = request(http::Request::builder().uri("/").header("cookie", "sid=x%3B%20Domain%3Devil.example; n=%E4%BD%A0"));
        assert_eq!(req.cookie("sid"), Some("x; Domain=evil.example"));
        assert_eq!(req.cookie("n"), Some("你"));
    }

    #[test]
    fn test_home_path() {
        let head = |uri: &str| {
            let (parts, ()) = http::Request::builder().uri(uri).body(()).unwrap().into_parts();
            RequestHead::from(parts)
        };

        let mut mounted = head("/api/user/1");
        assert!(mounted.mount_at("/api"));
        let req = Request::new(Arc::new(mounted));
        assert_eq!(req.path(), "/user/1");
        assert_eq!(req.home_path(), "/api");

        let mut outside = head("/apiary");
        assert!(!outside.mount_at("/api"));
        assert_eq!(outside.path(), "/apiary");
        assert!(!head("/api").mount_at("/api"));

        let mut root = head("/x");
        assert!(root.mount_at(""));
        assert_eq!(root.path(), "/x");
    }

    #[test]
    fn test_multipart_content_type() {
        let req = request(http::Request::builder().uri("/").header("content-type", "multipart/form-data; boundary=XyZ"));
        assert!(req.is_multipart());
        assert_eq!(req.multipart_boundary().as_deref(), Some("XyZ"));
        assert!(!req.is_json());

        let req = request(http::Request::builder().uri("/").header("content-type", "application/x-www-form-urlencoded"));
        assert!(!req.is_multipart());
        assert_eq!(req.multipart_boundary(), None);
    }

    #[test]
    fn test_malformed_path_escapes_are_kept() {
        assert_eq!(request(http::Request::builder().uri("/a%20b+c")).path(), "/a b+c");
        assert_eq!(request(http::Request::builder().uri("/a%2")).path(), "/a%2");
        assert_eq!(request(http::Request::builder().uri("/%ff")).path(), "/%ff");
    }

    #[test]
    fn test_remote_addr_from_extensions() {
        let addr: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let req = request(http::Request::builder().uri("/").extension(addr));
        assert_eq!(req.remote_addr(), Some(addr));
        assert!(!req.is_json());
    }
}
