//! # Built-in Middleware
//!
//! Ready-made middleware for common cross-cutting concerns:
//!
//! - [`Cors`] - Cross-Origin Resource Sharing headers and preflight replies
//! - [`Logger`] - one access log event per request
//! - [`BodyParser`] - eager body parsing with a 400 on malformed input
//! - [`ErrorHandler`] - converts downstream errors into a JSON 500
//! - [`RateLimit`] - fixed window request counting per client

use crate::config::Environment;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::middleware::{BoxFuture, Middleware, Next};
use cookie::time::format_description::well_known::Rfc3339;
use cookie::time::OffsetDateTime;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, info};

type OriginPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Which origins [`Cors`] allows
#[derive(Clone)]
pub enum AllowOrigin {
    /// `Access-Control-Allow-Origin: *`
    Any,
    /// Always send this origin
    Exact(String),
    /// Echo the request origin when it is listed
    List(Vec<String>),
    /// Echo the request origin when the predicate accepts it
    Predicate(OriginPredicate),
}

impl fmt::Debug for AllowOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Exact(origin) => f.debug_tuple("Exact").field(origin).finish(),
            Self::List(origins) => f.debug_tuple("List").field(origins).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl AllowOrigin {
    fn resolve(&self, request_origin: Option<&str>) -> Option<String> {
        match self {
            Self::Any => Some("*".to_string()),
            Self::Exact(origin) => Some(origin.clone()),
            Self::List(origins) => request_origin
                .filter(|origin| origins.iter().any(|allowed| allowed == origin))
                .map(str::to_string),
            Self::Predicate(accept) => request_origin
                .filter(|origin| accept(origin))
                .map(str::to_string),
        }
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
///
/// `OPTIONS` requests are answered directly with 204 and never reach the
/// rest of the chain.
#[derive(Debug, Clone)]
pub struct Cors {
    origin: AllowOrigin,
    methods: Vec<String>,
    allowed_headers: Vec<String>,
    exposed_headers: Vec<String>,
    credentials: bool,
    max_age: Duration,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            origin: AllowOrigin::Any,
            methods: ["GET", "HEAD", "PUT", "PATCH", "POST", "DELETE"]
                .map(String::from)
                .to_vec(),
            allowed_headers: vec!["Content-Type".to_string(), "Authorization".to_string()],
            exposed_headers: Vec::new(),
            credentials: false,
            max_age: Duration::from_secs(86_400),
        }
    }
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl Cors {
    /// Create a CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the origin policy
    #[must_use]
    pub fn origin(mut self, origin: AllowOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Always allow exactly `origin`
    #[must_use]
    pub fn allow_origin(self, origin: impl Into<String>) -> Self {
        self.origin(AllowOrigin::Exact(origin.into()))
    }

    /// Allow the listed origins
    #[must_use]
    pub fn allow_origins<I, S>(self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origin(AllowOrigin::List(strings(origins)))
    }

    /// Allow origins accepted by `predicate`
    #[must_use]
    pub fn allow_origin_fn<F>(self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.origin(AllowOrigin::Predicate(Arc::new(predicate)))
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods<I, S>(mut self, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods = strings(methods);
        self
    }

    /// Set allowed request headers
    #[must_use]
    pub fn allow_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_headers = strings(headers);
        self
    }

    /// Set headers exposed to the browser
    #[must_use]
    pub fn expose_headers<I, S>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exposed_headers = strings(headers);
        self
    }

    /// Allow credentials
    #[must_use]
    pub const fn credentials(mut self, allow: bool) -> Self {
        self.credentials = allow;
        self
    }

    /// Set the preflight cache duration
    #[must_use]
    pub const fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

impl Middleware<Context> for Cors {
    fn handle(&self, ctx: Context, next: Next<Context>) -> BoxFuture<'static, Result<()>> {
        if let Some(origin) = self.origin.resolve(ctx.header("origin")) {
            ctx.set_header("Access-Control-Allow-Origin", &origin);
        }
        ctx.set_header("Access-Control-Allow-Methods", &self.methods.join(", "));
        ctx.set_header("Access-Control-Allow-Headers", &self.allowed_headers.join(", "));
        if !self.exposed_headers.is_empty() {
            ctx.set_header(
                "Access-Control-Expose-Headers",
                &self.exposed_headers.join(", "),
            );
        }
        if self.credentials {
            ctx.set_header("Access-Control-Allow-Credentials", "true");
        }

        if ctx.method() == "OPTIONS" {
            ctx.set_header("Access-Control-Max-Age", &self.max_age.as_secs().to_string());
            ctx.set_status(204).text("");
            return Box::pin(async { Ok(()) });
        }

        Box::pin(async move { next.run().await })
    }

    fn name(&self) -> &'static str {
        "Cors"
    }
}

/// Access log line layout for [`Logger`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// `ip - [time] "METHOD url" status duration "user-agent"`
    #[default]
    Combined,
    /// `ip - [time] "METHOD url" status`
    Common,
    /// `ip METHOD url status duration`
    Short,
    /// `METHOD url status duration`
    Tiny,
}

/// One finished request, as seen by [`Logger`]
struct AccessEntry<'a> {
    method: &'a str,
    url: &'a str,
    status: u16,
    duration: Duration,
    ip: &'a str,
    user_agent: &'a str,
    timestamp: &'a str,
}

impl LogFormat {
    fn render(self, entry: &AccessEntry<'_>) -> String {
        let AccessEntry {
            method,
            url,
            status,
            ip,
            user_agent,
            timestamp,
            ..
        } = entry;
        let duration = format!("{}ms", entry.duration.as_millis());
        match self {
            Self::Tiny => format!("{method} {url} {status} {duration}"),
            Self::Short => format!("{ip} {method} {url} {status} {duration}"),
            Self::Common => format!(r#"{ip} - [{timestamp}] "{method} {url}" {status}"#),
            Self::Combined => format!(
                r#"{ip} - [{timestamp}] "{method} {url}" {status} {duration} "{user_agent}""#
            ),
        }
    }
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}

type SkipPredicate = Arc<dyn Fn(&Context) -> bool + Send + Sync>;

/// Logging middleware - emits one `info!` event per request
///
/// Fields: `method`, `url`, `status`, `duration_ms`, `ip`, `user_agent`.
/// The message is the line rendered in the configured [`LogFormat`].
#[derive(Clone, Default)]
pub struct Logger {
    format: LogFormat,
    skip: Option<SkipPredicate>,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("format", &self.format)
            .field("skip", &self.skip.is_some())
            .finish()
    }
}

impl Logger {
    /// Create a logger using the combined format
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the line format
    #[must_use]
    pub const fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Skip logging for requests accepted by `predicate`
    #[must_use]
    pub fn skip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }
}

impl Middleware<Context> for Logger {
    fn handle(&self, ctx: Context, next: Next<Context>) -> BoxFuture<'static, Result<()>> {
        if self.skip.as_ref().is_some_and(|skip| skip(&ctx)) {
            return Box::pin(async move { next.run().await });
        }

        let format = self.format;
        Box::pin(async move {
            let started = Instant::now();
            let result = next.run().await;
            let duration = started.elapsed();

            let ip = ctx.client_ip().unwrap_or_else(|| "-".to_string());
            let entry = AccessEntry {
                method: ctx.method(),
                url: ctx.url(),
                status: ctx.status(),
                duration,
                ip: &ip,
                user_agent: ctx.header("user-agent").unwrap_or("-"),
                timestamp: &timestamp(),
            };
            info!(
                method = entry.method,
                url = entry.url,
                status = entry.status,
                duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                ip = entry.ip,
                user_agent = entry.user_agent,
                "{}",
                format.render(&entry)
            );
            result
        })
    }

    fn name(&self) -> &'static str {
        "Logger"
    }
}

/// Body parsing middleware
///
/// For `POST`, `PUT` and `PATCH` the body is parsed before the rest of the
/// chain runs. A parse failure is answered with 400
/// `{"error":"Invalid request body","message":..}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyParser;

impl BodyParser {
    /// Create a body parser
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware<Context> for BodyParser {
    fn handle(&self, ctx: Context, next: Next<Context>) -> BoxFuture<'static, Result<()>> {
        if matches!(ctx.method(), "POST" | "PUT" | "PATCH") {
            if let Err(err) = ctx.parse_body() {
                ctx.reply(
                    400,
                    &json!({ "error": "Invalid request body", "message": err.to_string() }),
                );
                return Box::pin(async { Ok(()) });
            }
        }
        Box::pin(async move { next.run().await })
    }

    fn name(&self) -> &'static str {
        "BodyParser"
    }
}

type ErrorTemplate = Arc<dyn Fn(&Error, &Context) -> Value + Send + Sync>;

/// Error handling middleware
///
/// Catches errors raised further down the chain and answers 500. The error
/// text is shown to the client when `expose` is set or the environment is
/// development; otherwise the message is "Something went wrong". A template,
/// when set, builds the body instead.
#[derive(Clone)]
pub struct ErrorHandler {
    expose: bool,
    environment: Environment,
    template: Option<ErrorTemplate>,
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("expose", &self.expose)
            .field("environment", &self.environment)
            .field("template", &self.template.is_some())
            .finish()
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self {
            expose: false,
            environment: Environment::current(),
            template: None,
        }
    }
}

impl ErrorHandler {
    /// Create an error handler for the current environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Show error messages to clients
    #[must_use]
    pub const fn expose(mut self, expose: bool) -> Self {
        self.expose = expose;
        self
    }

    /// Override the detected environment
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Build the error body with `template`
    #[must_use]
    pub fn template<F>(mut self, template: F) -> Self
    where
        F: Fn(&Error, &Context) -> Value + Send + Sync + 'static,
    {
        self.template = Some(Arc::new(template));
        self
    }

    fn render(&self, err: &Error, ctx: &Context) {
        ctx.set_status(500);
        if let Some(template) = &self.template {
            ctx.set_body(template(err, ctx));
            return;
        }

        let development = self.environment.is_development();
        let message = if self.expose || development {
            err.to_string()
        } else {
            "Something went wrong".to_string()
        };
        let mut body = json!({ "error": "Internal Server Error", "message": message });
        if development {
            body["details"] = Value::String(format!("{err:?}"));
        }
        ctx.reply(500, &body);
    }
}

impl Middleware<Context> for ErrorHandler {
    fn handle(&self, ctx: Context, next: Next<Context>) -> BoxFuture<'static, Result<()>> {
        let handler = self.clone();
        Box::pin(async move {
            if let Err(err) = next.run().await {
                error!(
                    error = %err,
                    method = %ctx.method(),
                    url = %ctx.url(),
                    "request error handled"
                );
                handler.render(&err, &ctx);
            }
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "ErrorHandler"
    }
}

struct Window {
    count: u64,
    resets_at: Instant,
    resets_at_wall: SystemTime,
}

/// Snapshot of a client's window after counting one request
struct Quota {
    count: u64,
    resets_in: Duration,
    resets_at_wall: SystemTime,
}

/// Windows kept before expired ones are pruned
const PRUNE_THRESHOLD: usize = 10_000;

/// Fixed window rate limiting middleware
///
/// Requests are counted per client key (`X-Forwarded-For`, `X-Real-IP`,
/// peer address, or `"unknown"`). Once a key exceeds `max` requests in the
/// current window it is answered with 429 until the window resets.
pub struct RateLimit {
    window: Duration,
    max: u64,
    message: String,
    standard_headers: bool,
    legacy_headers: bool,
    windows: Mutex<HashMap<String, Window>>,
}

impl fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimit")
            .field("window", &self.window)
            .field("max", &self.max)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60), 100)
    }
}

impl RateLimit {
    /// Allow `max` requests per `window`
    #[must_use]
    pub fn new(window: Duration, max: u64) -> Self {
        Self {
            window,
            max,
            message: "Too many requests".to_string(),
            standard_headers: true,
            legacy_headers: false,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Message sent with 429 responses
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Toggle `RateLimit-*` headers
    #[must_use]
    pub const fn standard_headers(mut self, enabled: bool) -> Self {
        self.standard_headers = enabled;
        self
    }

    /// Toggle `X-RateLimit-*` headers
    #[must_use]
    pub const fn legacy_headers(mut self, enabled: bool) -> Self {
        self.legacy_headers = enabled;
        self
    }

    fn count(&self, key: &str) -> Quota {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if windows.len() >= PRUNE_THRESHOLD {
            windows.retain(|_, window| window.resets_at > now);
        }

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            count: 0,
            resets_at: now + self.window,
            resets_at_wall: SystemTime::now() + self.window,
        });
        if now >= window.resets_at {
            window.count = 0;
            window.resets_at = now + self.window;
            window.resets_at_wall = SystemTime::now() + self.window;
        }
        window.count += 1;

        Quota {
            count: window.count,
            resets_in: window.resets_at.saturating_duration_since(now),
            resets_at_wall: window.resets_at_wall,
        }
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

impl Middleware<Context> for RateLimit {
    fn handle(&self, ctx: Context, next: Next<Context>) -> BoxFuture<'static, Result<()>> {
        let key = ctx.client_ip().unwrap_or_else(|| "unknown".to_string());
        let quota = self.count(&key);
        let limit = self.max.to_string();
        let remaining = self.max.saturating_sub(quota.count).to_string();

        if self.standard_headers {
            ctx.set_header("RateLimit-Limit", &limit);
            ctx.set_header("RateLimit-Remaining", &remaining);
            ctx.set_header("RateLimit-Reset", &ceil_secs(quota.resets_in).to_string());
        }
        if self.legacy_headers {
            let epoch = quota
                .resets_at_wall
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default();
            ctx.set_header("X-RateLimit-Limit", &limit);
            ctx.set_header("X-RateLimit-Remaining", &remaining);
            ctx.set_header("X-RateLimit-Reset", &ceil_secs(epoch).to_string());
        }

        if quota.count > self.max {
            ctx.reply(
                429,
                &json!({ "error": "Rate limit exceeded", "message": self.message }),
            );
            return Box::pin(async { Ok(()) });
        }

        Box::pin(async move { next.run().await })
    }

    fn name(&self) -> &'static str {
        "RateLimit"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::App;
    use crate::response::Response;

    fn ok_app() -> App {
        let mut app = App::new();
        app.get("/", |ctx: Context| async move { ctx.json(&json!({"ok": true})) });
        app
    }

    fn body(resp: &Response) -> Value {
        resp.json_body().unwrap()
    }

    #[tokio::test]
    async fn test_cors_default_headers() {
        let mut app = ok_app();
        app.use_middleware(Cors::new());

        let resp = app.test_request("GET", "/", &[], "").await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            resp.header("access-control-allow-methods"),
            Some("GET, HEAD, PUT, PATCH, POST, DELETE")
        );
        assert_eq!(
            resp.header("access-control-allow-headers"),
            Some("Content-Type, Authorization")
        );
        assert!(resp.header("access-control-allow-credentials").is_none());
    }

    #[tokio::test]
    async fn test_cors_preflight_stops_chain() {
        let mut app = ok_app();
        app.use_middleware(Cors::new().max_age(Duration::from_secs(600)));

        let resp = app.test_request("OPTIONS", "/", &[], "").await;
        assert_eq!(resp.status, 204);
        assert_eq!(resp.header("access-control-max-age"), Some("600"));
        assert!(resp.body.is_empty());
    }

    #[tokio::test]
    async fn test_cors_origin_list() {
        let mut app = ok_app();
        app.use_middleware(
            Cors::new()
                .allow_origins(["https://a.example", "https://b.example"])
                .credentials(true)
                .expose_headers(["X-Total"]),
        );

        let resp = app
            .test_request("GET", "/", &[("Origin", "https://b.example")], "")
            .await;
        assert_eq!(
            resp.header("access-control-allow-origin"),
            Some("https://b.example")
        );
        assert_eq!(resp.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(resp.header("access-control-expose-headers"), Some("X-Total"));

        let resp = app
            .test_request("GET", "/", &[("Origin", "https://evil.example")], "")
            .await;
        assert!(resp.header("access-control-allow-origin").is_none());
    }

    #[tokio::test]
    async fn test_cors_origin_predicate() {
        let mut app = ok_app();
        app.use_middleware(Cors::new().allow_origin_fn(|origin| origin.ends_with(".trusted.dev")));

        let resp = app
            .test_request("GET", "/", &[("Origin", "https://app.trusted.dev")], "")
            .await;
        assert_eq!(
            resp.header("access-control-allow-origin"),
            Some("https://app.trusted.dev")
        );
    }

    #[test]
    fn test_log_formats() {
        let entry = AccessEntry {
            method: "GET",
            url: "/posts?page=2",
            status: 200,
            duration: Duration::from_millis(12),
            ip: "10.0.0.1",
            user_agent: "curl/8.0",
            timestamp: "2024-01-01T00:00:00Z",
        };
        assert_eq!(LogFormat::Tiny.render(&entry), "GET /posts?page=2 200 12ms");
        assert_eq!(
            LogFormat::Short.render(&entry),
            "10.0.0.1 GET /posts?page=2 200 12ms"
        );
        assert_eq!(
            LogFormat::Common.render(&entry),
            r#"10.0.0.1 - [2024-01-01T00:00:00Z] "GET /posts?page=2" 200"#
        );
        assert_eq!(
            LogFormat::Combined.render(&entry),
            r#"10.0.0.1 - [2024-01-01T00:00:00Z] "GET /posts?page=2" 200 12ms "curl/8.0""#
        );
    }

    #[tokio::test]
    async fn test_logger_passes_through() {
        let mut app = ok_app();
        app.use_middleware(Logger::new().format(LogFormat::Tiny));
        app.use_middleware(Logger::new().skip(|ctx| ctx.path() == "/"));

        let resp = app.test_request("GET", "/", &[], "").await;
        assert_eq!(resp.status, 200);
        assert_eq!(app.middleware_names(), vec!["Logger", "Logger"]);
    }

    #[tokio::test]
    async fn test_body_parser_rejects_bad_json() {
        let mut app = App::new();
        app.use_middleware(BodyParser::new());
        app.post("/posts", |ctx: Context| async move {
            let body = ctx.parse_body()?;
            ctx.json_with_status(201, &body)
        });

        let headers = [("Content-Type", "application/json")];
        let resp = app.test_request("POST", "/posts", &headers, "{broken").await;
        assert_eq!(resp.status, 400);
        assert_eq!(body(&resp)["error"], "Invalid request body");
        assert!(body(&resp)["message"].is_string());

        let resp = app
            .test_request("POST", "/posts", &headers, r#"{"title":"Hi"}"#)
            .await;
        assert_eq!(resp.status, 201);
        assert_eq!(body(&resp), json!({"title": "Hi"}));
    }

    #[tokio::test]
    async fn test_body_parser_ignores_get() {
        let mut app = ok_app();
        app.use_middleware(BodyParser::new());
        let headers = [("Content-Type", "application/json")];
        let resp = app.test_request("GET", "/", &headers, "{broken").await;
        assert_eq!(resp.status, 200);
    }

    fn failing_app(handler: ErrorHandler) -> App {
        let mut app = App::new();
        app.use_middleware(handler);
        app.get("/fail", |_ctx: Context| async move {
            Err(Error::msg("disk full"))
        });
        app
    }

    #[tokio::test]
    async fn test_error_handler_masks_in_production() {
        let app = failing_app(ErrorHandler::new().environment(Environment::Production));
        let resp = app.test_request("GET", "/fail", &[], "").await;
        assert_eq!(resp.status, 500);
        assert_eq!(
            body(&resp),
            json!({"error": "Internal Server Error", "message": "Something went wrong"})
        );
    }

    #[tokio::test]
    async fn test_error_handler_exposes() {
        let app = failing_app(
            ErrorHandler::new()
                .environment(Environment::Production)
                .expose(true),
        );
        let resp = app.test_request("GET", "/fail", &[], "").await;
        assert_eq!(body(&resp)["message"], "disk full");
        assert!(body(&resp).get("details").is_none());

        let app = failing_app(ErrorHandler::new().environment(Environment::Development));
        let resp = app.test_request("GET", "/fail", &[], "").await;
        assert_eq!(body(&resp)["message"], "disk full");
        assert!(body(&resp)["details"].is_string());
    }

    #[tokio::test]
    async fn test_error_handler_template() {
        let app = failing_app(
            ErrorHandler::new().template(|err, ctx| json!({ "oops": err.to_string(), "path": ctx.path() })),
        );
        let resp = app.test_request("GET", "/fail", &[], "").await;
        assert_eq!(resp.status, 500);
        assert_eq!(body(&resp), json!({"oops": "disk full", "path": "/fail"}));
    }

    #[tokio::test]
    async fn test_rate_limit_window() {
        let mut app = ok_app();
        app.use_middleware(RateLimit::new(Duration::from_secs(60), 2).legacy_headers(true));

        let client = [("X-Forwarded-For", "203.0.113.5")];
        let first = app.test_request("GET", "/", &client, "").await;
        assert_eq!(first.status, 200);
        assert_eq!(first.header("ratelimit-limit"), Some("2"));
        assert_eq!(first.header("ratelimit-remaining"), Some("1"));
        assert_eq!(first.header("ratelimit-reset"), Some("60"));
        assert_eq!(first.header("x-ratelimit-limit"), Some("2"));

        let second = app.test_request("GET", "/", &client, "").await;
        assert_eq!(second.header("ratelimit-remaining"), Some("0"));

        let third = app.test_request("GET", "/", &client, "").await;
        assert_eq!(third.status, 429);
        assert_eq!(third.header("ratelimit-remaining"), Some("0"));
        assert_eq!(
            body(&third),
            json!({"error": "Rate limit exceeded", "message": "Too many requests"})
        );

        // another client has its own window
        let other = app
            .test_request("GET", "/", &[("X-Real-IP", "198.51.100.1")], "")
            .await;
        assert_eq!(other.status, 200);
    }

    #[tokio::test]
    async fn test_rate_limit_resets() {
        let mut app = ok_app();
        app.use_middleware(
            RateLimit::new(Duration::from_millis(30), 1)
                .standard_headers(false)
                .message("slow down"),
        );

        assert_eq!(app.test_request("GET", "/", &[], "").await.status, 200);
        let limited = app.test_request("GET", "/", &[], "").await;
        assert_eq!(limited.status, 429);
        assert_eq!(body(&limited)["message"], "slow down");
        assert!(limited.header("ratelimit-limit").is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(app.test_request("GET", "/", &[], "").await.status, 200);
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::from_millis(2001)), 3);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
