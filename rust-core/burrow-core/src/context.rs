//! # Request Context
//!
//! Per-request object shared by the dispatcher, every middleware and the
//! handler. Cloning is cheap; all clones observe the same request and the
//! same response under construction.
//!
//! Request data is fixed once the context is built. The response side is
//! mutable until one of the sending methods ([`Context::json`],
//! [`Context::text`], [`Context::html`], [`Context::redirect`]) commits it;
//! after that further writes are ignored and [`Context::responded`] is true.

use crate::error::{Error, Result};
use crate::json;
use crate::middleware::Committed;
use crate::response::Response;
use crate::router::Params;
use cookie::Cookie;
use hyper::body::Bytes;
use hyper::header::{
    HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE,
};
use hyper::HeaderMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// `SameSite` cookie attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    /// `SameSite=Strict`
    Strict,
    /// `SameSite=Lax`
    Lax,
    /// `SameSite=None`
    None,
}

impl From<SameSite> for cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Strict => Self::Strict,
            SameSite::Lax => Self::Lax,
            SameSite::None => Self::None,
        }
    }
}

/// Attributes for [`Context::set_cookie`]
#[derive(Debug, Clone, Default)]
pub struct CookieOptions {
    /// `Max-Age`, whole seconds
    pub max_age: Option<Duration>,
    /// `Expires`
    pub expires: Option<SystemTime>,
    /// `Path`
    pub path: Option<String>,
    /// `Domain`
    pub domain: Option<String>,
    /// `Secure`
    pub secure: bool,
    /// `HttpOnly`
    pub http_only: bool,
    /// `SameSite`
    pub same_site: Option<SameSite>,
}

struct RequestData {
    method: String,
    url: String,
    path: String,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    body_limit: usize,
}

struct ResponseState {
    status: u16,
    headers: HeaderMap,
    body: Option<Value>,
    sent: Option<Bytes>,
    committed: bool,
}

struct Inner {
    request: RequestData,
    params: RwLock<Params>,
    parsed_body: OnceLock<Value>,
    response: Mutex<ResponseState>,
}

/// Shared request/response context
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("method", &self.method())
            .field("url", &self.url())
            .field("status", &self.status())
            .field("responded", &self.responded())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`]
#[derive(Debug)]
pub struct ContextBuilder {
    method: String,
    url: String,
    headers: HeaderMap,
    body: Bytes,
    remote_addr: Option<SocketAddr>,
    body_limit: usize,
}

impl ContextBuilder {
    /// Append a request header; invalid names or values are ignored
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    /// Append every header of `headers`
    #[must_use]
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut last = None;
        for (name, value) in headers {
            if let Some(name) = name {
                last = Some(name);
            }
            if let Some(name) = &last {
                self.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Set the raw request body
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the peer address
    #[must_use]
    pub const fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Set the size limit enforced by [`Context::parse_body`]
    #[must_use]
    pub const fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Build the context
    #[must_use]
    pub fn build(self) -> Context {
        let target = self.url.split('#').next().unwrap_or_default();
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query_string(query)),
            None => (target, Vec::new()),
        };
        let path = if path.is_empty() { "/" } else { path }.to_string();
        let cookies = parse_cookies(&self.headers);

        Context {
            inner: Arc::new(Inner {
                request: RequestData {
                    method: self.method,
                    url: self.url,
                    path,
                    query,
                    headers: self.headers,
                    cookies,
                    body: self.body,
                    remote_addr: self.remote_addr,
                    body_limit: self.body_limit,
                },
                params: RwLock::new(Params::new()),
                parsed_body: OnceLock::new(),
                response: Mutex::new(ResponseState {
                    status: 200,
                    headers: HeaderMap::new(),
                    body: None,
                    sent: None,
                    committed: false,
                }),
            }),
        }
    }
}

impl Context {
    /// Start building a context for `method` and the raw request target `url`
    pub fn builder(method: impl Into<String>, url: impl Into<String>) -> ContextBuilder {
        ContextBuilder {
            method: method.into().to_ascii_uppercase(),
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            remote_addr: None,
            body_limit: usize::MAX,
        }
    }

    // ---- request ----

    /// Request method, upper-cased
    #[must_use]
    pub fn method(&self) -> &str {
        &self.inner.request.method
    }

    /// Raw request target, query string included
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.request.url
    }

    /// Request path without query string
    #[must_use]
    pub fn path(&self) -> &str {
        &self.inner.request.path
    }

    /// First query value for `key`
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.inner
            .request
            .query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every query value for `key`, in order of appearance
    #[must_use]
    pub fn query_all(&self, key: &str) -> Vec<&str> {
        self.inner
            .request
            .query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Decoded query pairs, in order of appearance
    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.inner.request.query
    }

    /// Get a request header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner
            .request
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
    }

    /// All request headers
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.inner.request.headers
    }

    /// Get a request cookie by name
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.inner.request.cookies.get(name).map(String::as_str)
    }

    /// All request cookies
    #[must_use]
    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.inner.request.cookies
    }

    /// Peer address of the connection, when known
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.request.remote_addr
    }

    /// Best-effort client address
    ///
    /// First entry of `X-Forwarded-For`, then `X-Real-IP`, then the peer.
    #[must_use]
    pub fn client_ip(&self) -> Option<String> {
        if let Some(forwarded) = self.header("x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
                return Some(first.to_string());
            }
        }
        if let Some(real_ip) = self.header("x-real-ip").map(str::trim) {
            if !real_ip.is_empty() {
                return Some(real_ip.to_string());
            }
        }
        self.remote_addr().map(|addr| addr.ip().to_string())
    }

    /// Raw request body
    #[must_use]
    pub fn raw_body(&self) -> &Bytes {
        &self.inner.request.body
    }

    /// Size limit enforced by [`parse_body`](Self::parse_body)
    #[must_use]
    pub fn body_limit(&self) -> usize {
        self.inner.request.body_limit
    }

    /// Path parameters captured by the router
    #[must_use]
    pub fn params(&self) -> Params {
        self.inner
            .params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get one path parameter
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.inner
            .params
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(str::to_string)
    }

    /// Replace the path parameters
    pub fn set_params(&self, params: Params) {
        *self.inner.params.write().unwrap_or_else(PoisonError::into_inner) = params;
    }

    /// Parse the request body according to its `Content-Type`
    ///
    /// - `application/json` is parsed as JSON
    /// - `application/x-www-form-urlencoded` becomes an object of strings,
    ///   repeated keys collecting into arrays
    /// - anything else becomes `{"raw": "<body text>"}`
    ///
    /// A successful parse is cached; later calls return the same value.
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLarge` when the declared or actual size
    /// exceeds the body limit and `Error::InvalidBody` for malformed JSON.
    pub fn parse_body(&self) -> Result<Value> {
        if let Some(parsed) = self.inner.parsed_body.get() {
            return Ok(parsed.clone());
        }

        let request = &self.inner.request;
        let declared = self
            .header(CONTENT_LENGTH.as_str())
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let actual = declared.max(request.body.len());
        if actual > request.body_limit {
            return Err(Error::PayloadTooLarge {
                limit: request.body_limit,
                actual,
            });
        }

        let content_type = self
            .header(CONTENT_TYPE.as_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let parsed = if content_type.contains("application/json") {
            let mut bytes = request.body.to_vec();
            json::parse_json_bytes::<Value>(&mut bytes)?
        } else if content_type.contains("application/x-www-form-urlencoded") {
            pairs_to_object(&parse_query_string(&String::from_utf8_lossy(&request.body)))
        } else {
            json!({ "raw": String::from_utf8_lossy(&request.body) })
        };

        Ok(self.inner.parsed_body.get_or_init(|| parsed).clone())
    }

    /// Parse the body and deserialize it into `T`
    ///
    /// # Errors
    ///
    /// Same as [`parse_body`](Self::parse_body), plus `Error::Json` when the
    /// parsed value does not fit `T`.
    pub fn body_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.parse_body()?)?)
    }

    // ---- response ----

    fn response_state(&self) -> MutexGuard<'_, ResponseState> {
        self.inner
            .response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutate the response unless it has been committed
    fn update(&self, op: &str, f: impl FnOnce(&mut ResponseState)) {
        let mut state = self.response_state();
        if state.committed {
            debug!(op, method = %self.method(), url = %self.url(), "response already sent");
            return;
        }
        f(&mut state);
    }

    /// Response status code (200 until changed)
    #[must_use]
    pub fn status(&self) -> u16 {
        self.response_state().status
    }

    /// Set the response status code
    pub fn set_status(&self, status: u16) -> &Self {
        self.update("set_status", |state| state.status = status);
        self
    }

    /// Set or replace a response header; invalid names or values are ignored
    pub fn set_header(&self, name: &str, value: &str) -> &Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => self.update("set_header", |state| {
                state.headers.insert(name, value);
            }),
            _ => warn!(name, "ignoring invalid response header"),
        }
        self
    }

    /// Set several response headers
    pub fn set_headers<'a>(&self, headers: impl IntoIterator<Item = (&'a str, &'a str)>) -> &Self {
        for (name, value) in headers {
            self.set_header(name, value);
        }
        self
    }

    /// Current value of a response header
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<String> {
        self.response_state()
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    /// Body value staged without sending
    #[must_use]
    pub fn body(&self) -> Option<Value> {
        self.response_state().body.clone()
    }

    /// Stage a JSON body without committing the response
    ///
    /// The value is written out by the dispatcher if nothing else sends.
    pub fn set_body(&self, value: Value) -> &Self {
        self.update("set_body", |state| state.body = Some(value));
        self
    }

    fn send(&self, op: &str, content_type: &'static str, body: Bytes) {
        self.update(op, |state| {
            state
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            state.sent = Some(body);
            state.committed = true;
        });
    }

    /// Send a JSON response
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if `value` cannot be serialized; nothing is sent.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let body = json::to_json(value)?;
        self.send("json", "application/json", Bytes::from(body));
        Ok(())
    }

    /// Set the status and send a JSON response
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if `value` cannot be serialized; nothing is sent.
    pub fn json_with_status<T: Serialize + ?Sized>(&self, status: u16, value: &T) -> Result<()> {
        let body = json::to_json(value)?;
        self.set_status(status);
        self.send("json", "application/json", Bytes::from(body));
        Ok(())
    }

    /// Set the status and send an already built JSON value
    pub(crate) fn reply(&self, status: u16, value: &Value) {
        self.set_status(status);
        self.send("reply", "application/json", Bytes::from(value.to_string()));
    }

    /// Send a plain text response
    pub fn text(&self, body: impl Into<String>) {
        self.send("text", "text/plain", Bytes::from(body.into()));
    }

    /// Send an HTML response
    pub fn html(&self, body: impl Into<String>) {
        self.send("html", "text/html", Bytes::from(body.into()));
    }

    /// Redirect with `302 Found`
    pub fn redirect(&self, location: &str) {
        self.redirect_with_status(location, 302);
    }

    /// Redirect with an explicit status
    pub fn redirect_with_status(&self, location: &str, status: u16) {
        let Ok(location) = HeaderValue::from_str(location) else {
            warn!(location, "ignoring redirect to invalid location");
            return;
        };
        self.update("redirect", |state| {
            state.status = status;
            state.headers.insert(LOCATION, location);
            state.sent = Some(Bytes::new());
            state.committed = true;
        });
    }

    /// Append a `Set-Cookie` header
    ///
    /// Name and value are percent-encoded.
    pub fn set_cookie(&self, name: &str, value: &str, options: &CookieOptions) {
        let cookie = build_cookie(name, value, options);
        match HeaderValue::from_str(&cookie) {
            Ok(header) => self.update("set_cookie", |state| {
                state.headers.append(SET_COOKIE, header);
            }),
            Err(_) => warn!(name, "ignoring unrepresentable cookie"),
        }
    }

    /// Whether the response has been committed
    #[must_use]
    pub fn responded(&self) -> bool {
        self.response_state().committed
    }

    /// Snapshot the response
    ///
    /// A committed response is returned as sent. Otherwise a staged body is
    /// serialized as JSON, and with no body the response is empty.
    #[must_use]
    pub fn to_response(&self) -> Response {
        let state = self.response_state();
        let mut headers = state.headers.clone();
        let body = if let Some(sent) = &state.sent {
            sent.clone()
        } else if let Some(value) = &state.body {
            headers
                .entry(CONTENT_TYPE)
                .or_insert(HeaderValue::from_static("application/json"));
            Bytes::from(value.to_string())
        } else {
            Bytes::new()
        };

        Response {
            status: state.status,
            headers,
            body,
        }
    }
}

impl Committed for Context {
    fn is_committed(&self) -> bool {
        self.responded()
    }
}

fn build_cookie(name: &str, value: &str, options: &CookieOptions) -> String {
    let mut builder = Cookie::build((name.to_string(), value.to_string()));
    if let Some(max_age) = options.max_age {
        let secs = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
        builder = builder.max_age(cookie::time::Duration::seconds(secs));
    }
    if let Some(expires) = options.expires {
        builder = builder.expires(cookie::time::OffsetDateTime::from(expires));
    }
    if let Some(path) = &options.path {
        builder = builder.path(path.clone());
    }
    if let Some(domain) = &options.domain {
        builder = builder.domain(domain.clone());
    }
    if options.secure {
        builder = builder.secure(true);
    }
    if options.http_only {
        builder = builder.http_only(true);
    }
    if let Some(same_site) = options.same_site {
        builder = builder.same_site(same_site.into());
    }
    builder.build().encoded().to_string()
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse_encoded)
        .filter_map(std::result::Result::ok)
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

/// Parse `a=1&b=two+words` into decoded pairs, keeping duplicates
fn parse_query_string(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced).map_or_else(
        |_| String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned(),
        Cow::into_owned,
    )
}

fn pairs_to_object(pairs: &[(String, String)]) -> Value {
    let mut map = Map::new();
    for (key, value) in pairs {
        let value = Value::String(value.clone());
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(key.clone(), value);
            }
        }
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(url: &str) -> Context {
        Context::builder("GET", url).build()
    }

    #[test]
    fn test_url_and_query() {
        let ctx = get("/search?q=rust+lang&tag=a&tag=b%20c&flag#frag");
        assert_eq!(ctx.method(), "GET");
        assert_eq!(ctx.path(), "/search");
        assert_eq!(ctx.url(), "/search?q=rust+lang&tag=a&tag=b%20c&flag#frag");
        assert_eq!(ctx.query("q"), Some("rust lang"));
        assert_eq!(ctx.query("tag"), Some("a"));
        assert_eq!(ctx.query_all("tag"), vec!["a", "b c"]);
        assert_eq!(ctx.query("flag"), Some(""));
        assert_eq!(ctx.query("missing"), None);
        assert_eq!(ctx.query_pairs().len(), 4);
    }

    #[test]
    fn test_method_is_uppercased_and_empty_path_is_root() {
        let ctx = Context::builder("post", "?x=1").build();
        assert_eq!(ctx.method(), "POST");
        assert_eq!(ctx.path(), "/");
        assert_eq!(ctx.query("x"), Some("1"));
    }

    #[test]
    fn test_cookies_are_parsed() {
        let ctx = Context::builder("GET", "/")
            .header("Cookie", "session=abc123; theme=dark")
            .header("Cookie", "greeting=hello%20world")
            .build();
        assert_eq!(ctx.cookie("session"), Some("abc123"));
        assert_eq!(ctx.cookie("theme"), Some("dark"));
        assert_eq!(ctx.cookie("greeting"), Some("hello world"));
        assert_eq!(ctx.cookies().len(), 3);
    }

    #[test]
    fn test_params_shared_between_clones() {
        let ctx = get("/users/42");
        let clone = ctx.clone();
        let params: Params = [("id".to_string(), "42".to_string())].into_iter().collect();
        ctx.set_params(params);
        assert_eq!(clone.param("id").as_deref(), Some("42"));
        assert_eq!(clone.params().parse::<u32>("id"), Some(42));
        assert_eq!(clone.param("missing"), None);
    }

    #[test]
    fn test_client_ip_precedence() {
        let peer: SocketAddr = "10.0.0.9:5555".parse().unwrap();

        let ctx = Context::builder("GET", "/")
            .header("X-Forwarded-For", " 203.0.113.7 , 10.0.0.1")
            .header("X-Real-IP", "198.51.100.2")
            .remote_addr(peer)
            .build();
        assert_eq!(ctx.client_ip().as_deref(), Some("203.0.113.7"));

        let ctx = Context::builder("GET", "/")
            .header("X-Real-IP", "198.51.100.2")
            .remote_addr(peer)
            .build();
        assert_eq!(ctx.client_ip().as_deref(), Some("198.51.100.2"));

        let ctx = Context::builder("GET", "/").remote_addr(peer).build();
        assert_eq!(ctx.client_ip().as_deref(), Some("10.0.0.9"));

        assert_eq!(get("/").client_ip(), None);
    }

    #[test]
    fn test_json_commits_response() {
        let ctx = get("/");
        assert!(!ctx.responded());
        ctx.set_status(201).json(&json!({"id": 1})).unwrap();
        assert!(ctx.responded());
        assert!(ctx.is_committed());

        // later writes are ignored
        ctx.text("second");
        ctx.set_status(500);
        ctx.set_header("X-Late", "1");

        let resp = ctx.to_response();
        assert_eq!(resp.status, 201);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.body_str(), Some(r#"{"id":1}"#));
        assert!(resp.header("x-late").is_none());
    }

    #[test]
    fn test_text_and_html_content_types() {
        let ctx = get("/");
        ctx.text("hi");
        assert_eq!(ctx.to_response().header("content-type"), Some("text/plain"));

        let ctx = get("/");
        ctx.html("<h1>hi</h1>");
        let resp = ctx.to_response();
        assert_eq!(resp.header("content-type"), Some("text/html"));
        assert_eq!(resp.body_str(), Some("<h1>hi</h1>"));
    }

    #[test]
    fn test_redirect_defaults_to_302() {
        let ctx = get("/old");
        ctx.redirect("/new");
        let resp = ctx.to_response();
        assert_eq!(resp.status, 302);
        assert_eq!(resp.header("location"), Some("/new"));
        assert!(resp.body.is_empty());

        let ctx = get("/old");
        ctx.redirect_with_status("/moved", 301);
        assert_eq!(ctx.status(), 301);
        assert!(ctx.responded());
    }

    #[test]
    fn test_staged_body_is_written_as_json() {
        let ctx = get("/");
        ctx.set_status(500)
            .set_body(json!({"error": "Internal Server Error"}));
        assert!(!ctx.responded());
        assert_eq!(ctx.body(), Some(json!({"error": "Internal Server Error"})));

        let resp = ctx.to_response();
        assert_eq!(resp.status, 500);
        assert_eq!(resp.header("content-type"), Some("application/json"));
        assert_eq!(resp.body_str(), Some(r#"{"error":"Internal Server Error"}"#));
    }

    #[test]
    fn test_unsent_response_is_empty() {
        let ctx = get("/");
        ctx.set_headers([("X-A", "1"), ("X-B", "2")]);
        let resp = ctx.to_response();
        assert_eq!(resp.status, 200);
        assert!(resp.body.is_empty());
        assert_eq!(resp.header("x-a"), Some("1"));
        assert_eq!(ctx.response_header("X-B").as_deref(), Some("2"));
    }

    #[test]
    fn test_set_cookie_appends_headers() {
        let ctx = get("/");
        ctx.set_cookie(
            "session",
            "abc 123",
            &CookieOptions {
                max_age: Some(Duration::from_secs(3600)),
                path: Some("/".to_string()),
                http_only: true,
                secure: true,
                same_site: Some(SameSite::Lax),
                ..CookieOptions::default()
            },
        );
        ctx.set_cookie("theme", "dark", &CookieOptions::default());

        let resp = ctx.to_response();
        let cookies: Vec<&str> = resp
            .headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        assert_eq!(cookies.len(), 2);
        assert!(cookies[0].starts_with("session=abc%20123"));
        assert!(cookies[0].contains("Max-Age=3600"));
        assert!(cookies[0].contains("Path=/"));
        assert!(cookies[0].contains("HttpOnly"));
        assert!(cookies[0].contains("Secure"));
        assert!(cookies[0].contains("SameSite=Lax"));
        assert_eq!(cookies[1], "theme=dark");
    }

    #[test]
    fn test_parse_json_body_is_cached() {
        let ctx = Context::builder("POST", "/posts")
            .header("Content-Type", "application/json; charset=utf-8")
            .body(r#"{"title": "Hello", "content": "World"}"#)
            .build();
        let body = ctx.parse_body().unwrap();
        assert_eq!(body["title"], "Hello");
        assert_eq!(ctx.clone().parse_body().unwrap(), body);

        #[derive(serde::Deserialize)]
        struct NewPost {
            title: String,
        }
        let post: NewPost = ctx.body_as().unwrap();
        assert_eq!(post.title, "Hello");
    }

    #[test]
    fn test_parse_form_body() {
        let ctx = Context::builder("POST", "/form")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("name=Jane+Doe&tag=a&tag=b&tag=c")
            .build();
        let body = ctx.parse_body().unwrap();
        assert_eq!(body["name"], "Jane Doe");
        assert_eq!(body["tag"], json!(["a", "b", "c"]));
    }

    #[test]
    fn test_parse_other_body_as_raw() {
        let ctx = Context::builder("POST", "/raw")
            .header("Content-Type", "text/plain")
            .body("just text")
            .build();
        assert_eq!(ctx.parse_body().unwrap(), json!({"raw": "just text"}));

        let ctx = Context::builder("POST", "/raw").build();
        assert_eq!(ctx.parse_body().unwrap(), json!({"raw": ""}));
    }

    #[test]
    fn test_parse_invalid_json_body() {
        let ctx = Context::builder("POST", "/posts")
            .header("Content-Type", "application/json")
            .body("{oops")
            .build();
        assert!(matches!(ctx.parse_body(), Err(Error::InvalidBody { .. })));
    }

    #[test]
    fn test_parse_body_enforces_limit() {
        let ctx = Context::builder("POST", "/upload")
            .header("Content-Type", "application/json")
            .body(r#"{"data": "0123456789"}"#)
            .body_limit(8)
            .build();
        assert!(matches!(
            ctx.parse_body(),
            Err(Error::PayloadTooLarge { limit: 8, .. })
        ));

        // a declared length over the limit is rejected even if the body is short
        let ctx = Context::builder("POST", "/upload")
            .header("Content-Length", "1000")
            .body("{}")
            .body_limit(100)
            .build();
        assert!(matches!(
            ctx.parse_body(),
            Err(Error::PayloadTooLarge { actual: 1000, .. })
        ));
    }
}
