//! # Burrow Core
//!
//! Core runtime library for the burrow web framework.
//! Provides a trie router, an onion-model middleware executor and an HTTP
//! dispatcher served by Hyper on Tokio.
//!
//! ## Architecture
//!
//! A request becomes a shared [`Context`]. The [`App`] runs its global
//! [`MiddlewareChain`] around a final action that resolves the route through
//! the [`Router`], runs the route-bound middleware and finally the handler.
//! The first response committed on the context is the one sent.
//!
//! ## Modules
//!
//! - `route` - Path splitting and segment classification
//! - `trie` - Arena-backed segment trie with backtracking lookup
//! - `router` - Method-aware routing and parameter extraction
//! - `middleware` - Middleware trait, one-shot continuations and the executor
//! - `context` - Per-request context and response state
//! - `response` - Finished response value
//! - `builtin` - CORS, logging, body parsing, error handling, rate limiting
//! - `app` - Dispatcher tying router and middleware together
//! - `server` - HTTP server built on Hyper
//! - `config` - Server configuration and environment profile
//! - `json` - JSON parsing with simd-json
//! - `logging` - Tracing subscriber setup
//! - `error` - Error types and handling

pub mod app;
pub mod builtin;
pub mod config;
pub mod context;
pub mod error;
pub mod json;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod trie;

pub use app::{App, BoxedHandler, Handler, RouteMiddleware, ServerInfo};
pub use builtin::{AllowOrigin, BodyParser, Cors, ErrorHandler, LogFormat, Logger, RateLimit};
pub use config::{Environment, ServerConfig};
pub use context::{Context, ContextBuilder, CookieOptions, SameSite};
pub use error::{BoxError, Error, Result};
pub use json::to_json;
pub use logging::init_tracing;
pub use middleware::{BoxFuture, BoxedMiddleware, Committed, Middleware, MiddlewareChain, Next};
pub use response::Response;
pub use route::RouteInfo;
pub use router::{Match, Method, Params, Router};
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
