//! Request/response exchange threaded through the filter chain

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{COOKIE, HeaderName, SET_COOKIE};
use http::{HeaderMap, HeaderValue, Method, Response, StatusCode, Uri};
use http_body_util::Full;
use rudiment_session_storage::SessionHandle;
use tracing::warn;

use crate::cookie::{SetCookie, parse_cookies};

/// Session attached to the exchange for the current request cycle
#[derive(Debug, Clone)]
pub struct SessionAccess {
    pub session: SessionHandle,
    /// Created while handling this request
    pub created: bool,
    /// Access time recorded before this request touched the session
    pub previous_access: Option<u64>,
}

/// One HTTP request and the response being built for it
///
/// The request half is immutable once constructed. Filters and endpoints
/// write the response half; cookies set through [`add_cookie`](Self::add_cookie)
/// are rendered as `Set-Cookie` headers by [`into_response`](Self::into_response).
#[derive(Debug)]
pub struct HttpExchange {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    cookies: HashMap<String, String>,
    status: StatusCode,
    response_headers: HeaderMap,
    response_cookies: Vec<SetCookie>,
    response_body: Bytes,
    session: Option<SessionAccess>,
}

impl HttpExchange {
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Self {
        let cookies = parse_cookies(&headers);
        Self {
            method,
            uri,
            headers,
            body,
            cookies,
            status: StatusCode::OK,
            response_headers: HeaderMap::new(),
            response_cookies: Vec::new(),
            response_body: Bytes::new(),
            session: None,
        }
    }

    /// Bare request without headers or body
    ///
    /// ```rust
    /// use http::Method;
    /// use rudiment_http_server::HttpExchange;
    ///
    /// let exchange = HttpExchange::request(Method::POST, "/orders")
    ///     .with_header("X-XSRF-TOKEN", "t")
    ///     .with_cookie("XSRF-TOKEN", "t");
    ///
    /// assert_eq!(exchange.path(), "/orders");
    /// assert_eq!(exchange.cookie("XSRF-TOKEN"), Some("t"));
    /// ```
    pub fn request(method: Method, path: &str) -> Self {
        let uri = path.parse().unwrap_or_else(|_| Uri::from_static("/"));
        Self::new(method, uri, HeaderMap::new(), Bytes::new())
    }

    /// Add a request header; invalid names or values are ignored
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
                self.cookies = parse_cookies(&self.headers);
            }
            _ => warn!("Ignoring invalid request header {}", name),
        }
        self
    }

    /// Add a request cookie
    pub fn with_cookie(self, name: &str, value: &str) -> Self {
        self.with_header(COOKIE.as_str(), &format!("{name}={value}"))
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    // ============================================================================
    // Request
    // ============================================================================

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a request header, if it is valid visible ASCII
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// GET, HEAD, OPTIONS and TRACE do not change server state
    pub fn is_safe_method(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        )
    }

    // ============================================================================
    // Session
    // ============================================================================

    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref().map(|access| &access.session)
    }

    pub fn session_access(&self) -> Option<&SessionAccess> {
        self.session.as_ref()
    }

    pub(crate) fn set_session_access(&mut self, access: SessionAccess) {
        self.session = Some(access);
    }

    pub(crate) fn clear_session_access(&mut self) {
        self.session = None;
    }

    // ============================================================================
    // Response
    // ============================================================================

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn response_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.response_headers
    }

    pub fn add_cookie(&mut self, cookie: SetCookie) {
        self.response_cookies.push(cookie);
    }

    /// Add `cookie`, dropping any cookie already set under its name
    pub fn replace_cookie(&mut self, cookie: SetCookie) {
        self.response_cookies
            .retain(|existing| existing.name() != cookie.name());
        self.response_cookies.push(cookie);
    }

    pub fn response_cookies(&self) -> &[SetCookie] {
        &self.response_cookies
    }

    /// Last cookie set under `name` in this response
    pub fn response_cookie(&self, name: &str) -> Option<&SetCookie> {
        self.response_cookies
            .iter()
            .rev()
            .find(|cookie| cookie.name() == name)
    }

    pub fn response_body(&self) -> &Bytes {
        &self.response_body
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.response_body = body.into();
    }

    /// Set status and body in one go
    pub fn respond(&mut self, status: StatusCode, body: impl Into<Bytes>) {
        self.status = status;
        self.response_body = body.into();
    }

    /// Render the response half for the transport
    pub fn into_response(self) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(self.response_body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        *headers = self.response_headers;
        for cookie in &self.response_cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(SET_COOKIE, value);
                }
                Err(_) => warn!("Dropping unrenderable cookie {}", cookie.name()),
            }
        }

        response
    }
}
