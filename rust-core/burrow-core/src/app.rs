//! # Application
//!
//! Ties the router and the middleware executor together into a request
//! dispatcher.
//!
//! For every request the global middleware chain runs around a final action.
//! The final action installs the route parameters and runs the route-bound
//! middleware around the handler, or answers 404 when nothing matched. Errors
//! that escape the global chain are logged and turned into a 500 unless a
//! response was already sent.
//!
//! ```ignore
//! let mut app = App::new();
//! app.use_middleware(Logger::default());
//! app.get("/users/:id", |ctx: Context| async move {
//!     let id = ctx.param("id");
//!     ctx.json(&json!({ "id": id }))
//! });
//! app.listen().await?;
//! ```

use crate::config::ServerConfig;
use crate::context::Context;
use crate::error::Result;
use crate::middleware::{BoxFuture, BoxedMiddleware, Middleware, MiddlewareChain};
use crate::response::Response;
use crate::route::RouteInfo;
use crate::router::{Method, Params, Router};
use hyper::body::Bytes;
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, warn};

/// Route handler
///
/// Implemented for any `Fn(Context) -> impl Future<Output = Result<()>>`.
pub trait Handler: Send + Sync + 'static {
    /// Produce the response for `ctx`
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<()>>;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxFuture<'static, Result<()>> {
        Box::pin(self(ctx))
    }
}

/// Shared handler trait object
pub type BoxedHandler = Arc<dyn Handler>;

/// Route-bound middleware list
pub type RouteMiddleware = Vec<BoxedMiddleware<Context>>;

/// Snapshot of the application setup, see [`App::server_info`]
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Bind host
    pub host: String,
    /// Bind port
    pub port: u16,
    /// Request timeout in milliseconds
    pub timeout_ms: u128,
    /// Max request body size in bytes
    pub max_body_size: usize,
    /// Registered routes, rendered as `METHOD /path`
    pub routes: Vec<String>,
}

/// Matched route carried into the final action
struct Resolved {
    handler: BoxedHandler,
    params: Params,
    middleware: RouteMiddleware,
}

/// HTTP application: configuration, route table and global middleware
pub struct App {
    config: ServerConfig,
    router: Router<BoxedHandler, BoxedMiddleware<Context>>,
    middleware: MiddlewareChain<Context>,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("middleware", &self.middleware)
            .field("routes", &self.router.routes().len())
            .finish()
    }
}

impl App {
    /// Create an application with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Create an application with the given configuration
    #[must_use]
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            middleware: MiddlewareChain::new(),
        }
    }

    /// Server configuration
    #[must_use]
    pub const fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Mutable server configuration
    pub fn config_mut(&mut self) -> &mut ServerConfig {
        &mut self.config
    }

    /// Append a global middleware
    pub fn use_middleware<M: Middleware<Context>>(&mut self, middleware: M) -> &mut Self {
        self.middleware.add(middleware);
        self
    }

    /// Register a handler for `method` and `path`
    pub fn route<H: Handler>(&mut self, method: Method, path: &str, handler: H) -> &mut Self {
        self.route_with(method, path, Vec::new(), handler)
    }

    /// Register a handler with route-bound middleware
    ///
    /// The middleware runs, in order, after the global chain and before the
    /// handler.
    pub fn route_with<H: Handler>(
        &mut self,
        method: Method,
        path: &str,
        middleware: RouteMiddleware,
        handler: H,
    ) -> &mut Self {
        let handler: BoxedHandler = Arc::new(handler);
        self.router.add_route(method, path, handler, middleware);
        self
    }

    /// Register a GET handler
    pub fn get<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Get, path, handler)
    }

    /// Register a POST handler
    pub fn post<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Post, path, handler)
    }

    /// Register a PUT handler
    pub fn put<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Put, path, handler)
    }

    /// Register a DELETE handler
    pub fn delete<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Delete, path, handler)
    }

    /// Register a PATCH handler
    pub fn patch<H: Handler>(&mut self, path: &str, handler: H) -> &mut Self {
        self.route(Method::Patch, path, handler)
    }

    /// Register a GET handler with route-bound middleware
    pub fn get_with<H: Handler>(
        &mut self,
        path: &str,
        middleware: RouteMiddleware,
        handler: H,
    ) -> &mut Self {
        self.route_with(Method::Get, path, middleware, handler)
    }

    /// Register a POST handler with route-bound middleware
    pub fn post_with<H: Handler>(
        &mut self,
        path: &str,
        middleware: RouteMiddleware,
        handler: H,
    ) -> &mut Self {
        self.route_with(Method::Post, path, middleware, handler)
    }

    /// Register a PUT handler with route-bound middleware
    pub fn put_with<H: Handler>(
        &mut self,
        path: &str,
        middleware: RouteMiddleware,
        handler: H,
    ) -> &mut Self {
        self.route_with(Method::Put, path, middleware, handler)
    }

    /// Register a DELETE handler with route-bound middleware
    pub fn delete_with<H: Handler>(
        &mut self,
        path: &str,
        middleware: RouteMiddleware,
        handler: H,
    ) -> &mut Self {
        self.route_with(Method::Delete, path, middleware, handler)
    }

    /// Register a PATCH handler with route-bound middleware
    pub fn patch_with<H: Handler>(
        &mut self,
        path: &str,
        middleware: RouteMiddleware,
        handler: H,
    ) -> &mut Self {
        self.route_with(Method::Patch, path, middleware, handler)
    }

    /// Every registered route
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.router.routes()
    }

    /// Names of the global middleware, in execution order
    #[must_use]
    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.names()
    }

    /// Configuration and route summary
    #[must_use]
    pub fn server_info(&self) -> ServerInfo {
        ServerInfo {
            host: self.config.host.clone(),
            port: self.config.port,
            timeout_ms: self.config.request_timeout.as_millis(),
            max_body_size: self.config.max_body_size,
            routes: self
                .routes()
                .iter()
                .map(|r| format!("{} {}", r.method, r.path))
                .collect(),
        }
    }

    fn resolve(&self, ctx: &Context) -> Option<Resolved> {
        let method: Method = ctx.method().parse().ok()?;
        let matched = self.router.match_route(method, ctx.path())?;
        Some(Resolved {
            handler: Arc::clone(matched.handler),
            params: matched.params,
            middleware: matched.middleware.to_vec(),
        })
    }

    /// Run the full pipeline for one request, without a timeout
    pub async fn dispatch(&self, ctx: Context) -> Response {
        let resolved = self.resolve(&ctx);
        let inner = ctx.clone();
        let final_action = move || run_route(inner, resolved);

        if let Err(err) = self.middleware.execute(ctx.clone(), final_action).await {
            error!(
                error = %err,
                method = %ctx.method(),
                url = %ctx.url(),
                "request failed"
            );
            if !ctx.responded() {
                ctx.reply(
                    500,
                    &json!({
                        "error": "Internal Server Error",
                        "message": "Something went wrong",
                    }),
                );
            }
        }

        ctx.to_response()
    }

    /// Run the pipeline under the configured request timeout
    ///
    /// A dispatch that outlives the timeout is dropped. A response committed
    /// before that point is still sent; otherwise the request is answered
    /// with 408 `{"error":"Request Timeout"}`.
    pub async fn handle(&self, ctx: Context) -> Response {
        let timeout = self.config.request_timeout;
        let watched = ctx.clone();

        match tokio::time::timeout(timeout, self.dispatch(ctx)).await {
            Ok(response) => response,
            Err(_) => {
                warn!(
                    method = %watched.method(),
                    url = %watched.url(),
                    ?timeout,
                    committed = watched.responded(),
                    "request timed out"
                );
                if watched.responded() {
                    watched.to_response()
                } else {
                    Response::json(r#"{"error":"Request Timeout"}"#).with_status(408)
                }
            }
        }
    }

    /// Execute a request in-process, without a network stack
    ///
    /// Applies the same body limit and timeout as the server. The peer
    /// address is reported as `127.0.0.1:0`.
    pub async fn test_request(
        &self,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: impl Into<Bytes>,
    ) -> Response {
        let body = body.into();
        if body.len() > self.config.max_body_size {
            return payload_too_large();
        }

        let builder = headers.iter().fold(
            Context::builder(method, uri)
                .remote_addr(SocketAddr::from(([127, 0, 0, 1], 0)))
                .body_limit(self.config.max_body_size)
                .body(body),
            |builder, (name, value)| builder.header(name, value),
        );
        self.handle(builder.build()).await
    }

    /// Serve the application until a shutdown signal arrives
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or accepting fails
    pub async fn listen(self) -> Result<()> {
        crate::server::Server::new(self).serve().await
    }
}

/// Final action of the global chain
async fn run_route(ctx: Context, resolved: Option<Resolved>) -> Result<()> {
    let Some(route) = resolved else {
        let message = format!("Cannot {} {}", ctx.method(), ctx.url());
        ctx.reply(404, &json!({ "error": "Not Found", "message": message }));
        return Ok(());
    };

    ctx.set_params(route.params);
    if route.middleware.is_empty() {
        return route.handler.call(ctx).await;
    }

    let chain: MiddlewareChain<Context> = route.middleware.into_iter().collect();
    let handler = route.handler;
    let inner = ctx.clone();
    chain.execute(ctx, move || handler.call(inner)).await
}

pub(crate) fn payload_too_large() -> Response {
    Response::json(r#"{"error":"Payload Too Large"}"#).with_status(413)
}
