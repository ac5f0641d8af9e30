//! # Trie Router
//!
//! Resolves a method and path to a registered handler, extracting named and
//! wildcard parameters along the way.
//!
//! ## Features
//!
//! - Path parameters (`/users/:id`)
//! - Wildcard tails (`/files/*`, captured under `*`)
//! - Literal segments always win over parameters, parameters over wildcards
//! - Middleware bound per route, returned with the match
//!
//! The router is built once at startup and read concurrently afterwards;
//! lookups take `&self` and never allocate shared state.
//!
//! Registering the same method and path twice replaces the handler but
//! appends the new middleware after the old ones.

use crate::error::{Error, Result};
use crate::route::{split_path, RouteInfo};
use crate::trie::RouteTrie;
use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP HEAD
    Head,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP OPTIONS
    Options,
    /// HTTP TRACE
    Trace,
    /// HTTP CONNECT
    Connect,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
            Self::Trace => "TRACE",
            Self::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a method name is not one of [`Method`]'s variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMethod(pub String);

impl fmt::Display for UnknownMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown HTTP method: {}", self.0)
    }
}

impl std::error::Error for UnknownMethod {}

impl FromStr for Method {
    type Err = UnknownMethod;

    /// Case-insensitive: `get`, `Get` and `GET` are the same method
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "OPTIONS" => Ok(Self::Options),
            "TRACE" => Ok(Self::Trace),
            "CONNECT" => Ok(Self::Connect),
            _ => Err(UnknownMethod(s.to_string())),
        }
    }
}

impl TryFrom<&hyper::Method> for Method {
    type Error = UnknownMethod;

    fn try_from(method: &hyper::Method) -> std::result::Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// Parameters captured by a match
///
/// Named parameters are keyed by their registered name; a wildcard tail is
/// keyed by `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(HashMap<String, String>);

impl Params {
    /// Create an empty parameter map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a parameter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Parse a parameter into any `FromStr` type
    ///
    /// Returns `None` when the parameter is missing or does not parse.
    #[must_use]
    pub fn parse<T: FromStr>(&self, name: &str) -> Option<T> {
        self.get(name).and_then(|value| value.parse().ok())
    }

    /// Whether a parameter was captured
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or replace a parameter
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    /// Iterate over `(name, value)` pairs in arbitrary order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of captured parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was captured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, String)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = hash_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Matched route with extracted parameters
///
/// Produced fresh for every lookup. The handler and middleware are borrowed
/// from the router; the parameters are owned by the caller.
#[derive(Debug)]
pub struct Match<'a, H, M> {
    /// The handler registered for the requested method
    pub handler: &'a H,
    /// Extracted path parameters
    pub params: Params,
    /// Middleware bound at the matched node
    pub middleware: &'a [M],
}

/// Trie-based HTTP router
///
/// `H` is the handler type and `M` the type of route-bound middleware; the
/// router never calls either, it only stores and returns them.
#[derive(Debug, Clone)]
pub struct Router<H, M = ()> {
    trie: RouteTrie<H, M>,
}

impl<H, M> Default for Router<H, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, M> Router<H, M> {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self {
            trie: RouteTrie::new(),
        }
    }

    /// Register a route with the given method and path pattern
    ///
    /// Segments starting with `:` are parameters and a lone `*` is a
    /// wildcard. Only one parameter name is kept per trie level: registering
    /// `/users/:id` and then `/users/:slug` yields one node bound as `id`.
    ///
    /// Re-registering a method and path replaces the handler and appends
    /// `middleware` to what is already bound there.
    pub fn add_route(
        &mut self,
        method: Method,
        path: &str,
        handler: H,
        middleware: impl IntoIterator<Item = M>,
    ) {
        let segments = split_path(path);
        let node = self.trie.insert(&segments);
        if self.trie.set_handler(node, method, handler).is_some() {
            debug!(%method, path, "handler replaced");
        } else {
            debug!(%method, path, "route registered");
        }
        self.trie.bind_middleware(node, middleware);
    }

    /// Match a request path against registered routes
    ///
    /// `path` must already have its query string and fragment removed; it is
    /// percent-decoded segment by segment.
    ///
    /// The method is checked only on the node the path resolves to. If that
    /// node has no handler for `method`, the lookup misses even when another
    /// branch could have matched.
    #[must_use]
    pub fn match_route(&self, method: Method, path: &str) -> Option<Match<'_, H, M>> {
        let segments = split_path(path);
        let (node_id, bindings) = self.trie.search(&segments)?;
        let node = self.trie.node(node_id);
        let handler = node.handler(method)?;

        Some(Match {
            handler,
            params: bindings.into_iter().collect(),
            middleware: node.middleware(),
        })
    }

    /// Like [`match_route`](Self::match_route), reporting a miss as an error
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` if no matching route exists
    pub fn try_match(&self, method: Method, path: &str) -> Result<Match<'_, H, M>> {
        self.match_route(method, path)
            .ok_or_else(|| Error::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
    }

    /// List every registered `(method, path)` pair
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        let mut routes = Vec::new();
        self.trie.for_each_terminal(|path, node| {
            for method in node.methods() {
                routes.push(RouteInfo {
                    method,
                    path: path.to_string(),
                    middleware: node.middleware().len(),
                });
            }
        });
        routes
    }

    /// Convenience method to add a GET route
    pub fn get(&mut self, path: &str, handler: H) {
        self.add_route(Method::Get, path, handler, []);
    }

    /// Convenience method to add a POST route
    pub fn post(&mut self, path: &str, handler: H) {
        self.add_route(Method::Post, path, handler, []);
    }

    /// Convenience method to add a PUT route
    pub fn put(&mut self, path: &str, handler: H) {
        self.add_route(Method::Put, path, handler, []);
    }

    /// Convenience method to add a DELETE route
    pub fn delete(&mut self, path: &str, handler: H) {
        self.add_route(Method::Delete, path, handler, []);
    }

    /// Convenience method to add a PATCH route
    pub fn patch(&mut self, path: &str, handler: H) {
        self.add_route(Method::Patch, path, handler, []);
    }
}
