//! The per-request response writer and `Set-Cookie` builder.
//!
//! Handlers, interceptors and services may all hold a [`Response`] at the
//! same time, it is a shared handle. Whatever is written here is merged into
//! the final HTTP response by the dispatcher, values carried by the returned
//! [`Reply`](crate::Reply) take precedence.

use http::header::{HeaderName, HeaderValue, IntoHeaderName};
use http::{HeaderMap, StatusCode};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct ResponseParts {
    status: Option<StatusCode>,
    headers: HeaderMap,
    cookies: Vec<Cookie>,
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    inner: Arc<Mutex<ResponseParts>>,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    fn parts(&self) -> MutexGuard<'_, ResponseParts> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_status(&self, status: StatusCode) {
        self.parts().status = Some(status);
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.parts().status
    }

    /// Sets a header, replacing previous values of the same name.
    pub fn set_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) {
        self.parts().headers.insert(name, value);
    }

    /// Like [`Response::set_header`] but from text, failing on characters headers cannot carry.
    pub fn try_set_header(&self, name: &str, value: &str) -> Result<(), http::Error> {
        let name = HeaderName::try_from(name)?;
        let value = HeaderValue::try_from(value)?;
        self.parts().headers.insert(name, value);
        Ok(())
    }

    pub fn append_header<K: IntoHeaderName>(&self, name: K, value: HeaderValue) {
        self.parts().headers.append(name, value);
    }

    pub fn header(&self, name: &str) -> Option<HeaderValue> {
        self.parts().headers.get(name).cloned()
    }

    pub fn headers(&self) -> HeaderMap {
        self.parts().headers.clone()
    }

    /// Queues a cookie, a later cookie with the same name replaces the earlier one.
    pub fn set_cookie(&self, cookie: Cookie) {
        let mut parts = self.parts();
        parts.cookies.retain(|c| c.name != cookie.name);
        parts.cookies.push(cookie);
    }

    /// Asks the client to drop a cookie.
    pub fn remove_cookie(&self, name: impl Into<String>) {
        self.set_cookie(Cookie::removal(name));
    }

    pub fn cookies(&self) -> Vec<Cookie> {
        self.parts().cookies.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        })
    }
}

/// A `Set-Cookie` entry.
///
/// The value is percent-encoded when rendered and decoded again by
/// [`Request::cookie`](crate::Request::cookie). Without an explicit path the
/// cookie is scoped to the application's base path, `/` by default.
/// `Display` renders the header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: String,
    path: Option<String>,
    domain: Option<String>,
    max_age: Option<i64>,
    expires: Option<String>,
    secure: bool,
    http_only: bool,
    same_site: Option<SameSite>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: None,
            domain: None,
            max_age: None,
            expires: None,
            secure: false,
            http_only: false,
            same_site: None,
        }
    }

    /// An empty, already expired cookie.
    pub fn removal(name: impl Into<String>) -> Self {
        Self::new(name, "").max_age(0)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Lifetime in seconds, `0` or negative expires the cookie immediately.
    pub fn max_age(mut self, seconds: i64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    /// An HTTP date, e.g. `Wed, 21 Oct 2015 07:28:00 GMT`.
    pub fn expires(mut self, http_date: impl Into<String>) -> Self {
        self.expires = Some(http_date.into());
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = Some(same_site);
        self
    }

    pub fn to_header_value(&self) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        self.header_value("/")
    }

    /// Renders the cookie, `default_path` standing in for an unset path.
    pub(crate) fn header_value(&self, default_path: &str) -> Result<HeaderValue, http::header::InvalidHeaderValue> {
        HeaderValue::try_from(Rendered { cookie: self, default_path }.to_string())
    }
}

impl fmt::Display for Cookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Rendered { cookie: self, default_path: "/" }, f)
    }
}

struct Rendered<'a> {
    cookie: &'a Cookie,
    default_path: &'a str,
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cookie = self.cookie;
        write!(f, "{}={}", cookie.name, urlencoding::encode(&cookie.value))?;
        write!(f, "; Path={}", cookie.path.as_deref().unwrap_or(self.default_path))?;
        if let Some(domain) = &cookie.domain {
            write!(f, "; Domain={domain}")?;
        }
        if let Some(max_age) = cookie.max_age {
            write!(f, "; Max-Age={}", max_age.max(0))?;
        }
        if let Some(expires) = &cookie.expires {
            write!(f, "; Expires={expires}")?;
        }
        if cookie.secure {
            f.write_str("; Secure")?;
        }
        if cookie.http_only {
            f.write_str("; HttpOnly")?;
        }
        if let Some(same_site) = cookie.same_site {
            write!(f, "; SameSite={same_site}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Cookie, Response, SameSite};
    use http::{HeaderValue, StatusCode};

    #[test]
    fn test_shared_handle() {
        let response = Response::new();
        let other = response.clone();

        other.set_status(StatusCode::CREATED);
        other.set_header("x-trace", HeaderValue::from_static("1"));

        assert_eq!(response.status(), Some(StatusCode::CREATED));
        assert_eq!(response.header("x-trace").unwrap(), "1");
    }

    #[test]
    fn test_try_set_header() {
        let response = Response::new();
        assert!(response.try_set_header("x-ok", "fine").is_ok());
        assert!(response.try_set_header("x-bad", "line\nbreak").is_err());
        assert!(response.try_set_header("bad name", "v").is_err());
        assert_eq!(response.headers().len(), 1);
    }

    #[test]
    fn test_cookie_display() {
        let cookie = Cookie::new("sid", "abc")
            .domain("example.com")
            .max_age(3600)
            .secure(true)
            .http_only(true)
            .same_site(SameSite::Lax);
        assert_eq!(cookie.to_string(), "sid=abc; Path=/; Domain=example.com; Max-Age=3600; Secure; HttpOnly; SameSite=Lax");

        assert_eq!(Cookie::removal("sid").to_string(), "sid=; Path=/; Max-Age=0");
        assert_eq!(Cookie::new("a", "b").max_age(-10).to_string(), "a=b; Path=/; Max-Age=0");
    }

    #[test]
    fn test_cookie_replaced_by_name() {
        let response = Response::new();
        response.set_cookie(Cookie::new("a", "1"));
        response.set_cookie(Cookie::new("b", "2"));
        response.set_cookie(Cookie::new("a", "3"));

        let cookies = response.cookies();
        assert_eq!(cookies.len(), 2);
        assert_eq!(cookies[0].name(), "b");
        assert_eq!(cookies[1].value(), "3");
    }

    #[test]
    fn test_cookie_header_value() {
        assert!(Cookie::new("a", "b").to_header_value().is_ok());
        assert!(Cookie::new("a\r\n", "b").to_header_value().is_err());
        assert_eq!(Cookie::new("a", "b").header_value("/app/").unwrap(), "a=b; Path=/app/");
        assert_eq!(Cookie::new("a", "b").path("/x").header_value("/app/").unwrap(), "a=b; Path=/x");
    }

    #[test]
    fn test_cookie_value_cannot_inject_attributes() {
        let cookie = Cookie::new("sid", "x; Domain=evil.example");
        assert_eq!(cookie.to_string(), "sid=x%3B%20Domain%3Devil.example; Path=/");
        assert_eq!(cookie.value(), "x; Domain=evil.example");
        assert!(Cookie::new("a", "b\r\n").to_header_value().is_ok());
    }
}
