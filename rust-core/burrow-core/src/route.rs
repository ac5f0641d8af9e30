//! # Route Paths
//!
//! Path splitting and segment classification shared by registration and lookup.
//!
//! A path is split on `/`, empty segments are discarded and every remaining
//! segment is percent-decoded, so `/a//b/` and `/a/b` are the same route and
//! `/` is the root with zero segments.
//!
//! Registration syntax per segment:
//!
//! - `:name` declares a parameter
//! - `*` declares a wildcard capturing the rest of the path
//! - anything else is a literal

use crate::router::Method;
use std::borrow::Cow;
use std::fmt;

/// Parameter key under which a wildcard capture is stored
pub const WILDCARD_PARAM: &str = "*";

/// Classification of a registered path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// Matches only its exact text
    Literal,
    /// Matches any single segment, binding it under the given name
    Param(String),
    /// Matches every remaining segment
    Wildcard,
}

impl SegmentKind {
    /// Classify a decoded registration segment
    #[must_use]
    pub fn classify(segment: &str) -> Self {
        if segment == WILDCARD_PARAM {
            Self::Wildcard
        } else if let Some(name) = segment.strip_prefix(':') {
            Self::Param(name.to_string())
        } else {
            Self::Literal
        }
    }

    /// Parameter name for `Param` segments
    #[must_use]
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Self::Param(name) => Some(name),
            _ => None,
        }
    }
}

/// Split a path into decoded, non-empty segments
///
/// Invalid UTF-8 produced by decoding is replaced lossily rather than
/// rejected, so lookup never fails on a malformed request target.
#[must_use]
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(decode_segment)
        .collect()
}

fn decode_segment(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes()))
            .into_owned(),
    }
}

/// A registered route as reported by [`crate::Router::routes`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// HTTP method
    pub method: Method,
    /// Path rebuilt from trie segments (`/` for the root)
    pub path: String,
    /// Number of middleware bound at the route's node
    pub middleware: usize,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if self.middleware > 0 {
            write!(f, " (+{} middleware)", self.middleware)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_discards_empty_segments() {
        assert_eq!(split_path("/a//b/"), vec!["a", "b"]);
        assert_eq!(split_path("a/b"), vec!["a", "b"]);
        assert!(split_path("/").is_empty());
        assert!(split_path("").is_empty());
    }

    #[test]
    fn test_split_percent_decodes() {
        assert_eq!(split_path("/caf%C3%A9/hello%20world"), vec!["café", "hello world"]);
        // encoded slash stays inside its segment
        assert_eq!(split_path("/a%2Fb/c"), vec!["a/b", "c"]);
    }

    #[test]
    fn test_split_invalid_utf8_is_lossy() {
        let segments = split_path("/bad%FF");
        assert_eq!(segments.len(), 1);
        assert!(segments[0].starts_with("bad"));
    }

    #[test]
    fn test_classify_segments() {
        assert_eq!(SegmentKind::classify("users"), SegmentKind::Literal);
        assert_eq!(
            SegmentKind::classify(":id"),
            SegmentKind::Param("id".to_string())
        );
        assert_eq!(SegmentKind::classify("*"), SegmentKind::Wildcard);
        assert_eq!(SegmentKind::classify("*x"), SegmentKind::Literal);
        assert_eq!(SegmentKind::classify(":slug").param_name(), Some("slug"));
        assert_eq!(SegmentKind::Wildcard.param_name(), None);
    }

    #[test]
    fn test_route_info_display() {
        let info = RouteInfo {
            method: Method::Get,
            path: "/users/:id".to_string(),
            middleware: 2,
        };
        assert_eq!(info.to_string(), "GET /users/:id (+2 middleware)");

        let info = RouteInfo {
            method: Method::Post,
            path: "/".to_string(),
            middleware: 0,
        };
        assert_eq!(info.to_string(), "POST /");
    }
}
