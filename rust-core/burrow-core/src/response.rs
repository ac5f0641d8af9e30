//! # HTTP Response
//!
//! Finished response produced by a [`Context`](crate::Context) once dispatch
//! is over, and its conversion into a hyper response.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use hyper::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;

/// Finished HTTP response
#[derive(Clone, Default)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Bytes,
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish()
    }
}

impl Response {
    /// Create a JSON response from an already serialized body
    #[must_use]
    pub fn json(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "application/json")
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::with_content_type(body.into(), "text/plain")
    }

    fn with_content_type(body: String, content_type: &'static str) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status: 200,
            headers,
            body: Bytes::from(body),
        }
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set or replace a header; invalid names or values are ignored
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get the body as UTF-8 text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the body is not valid JSON for `T`
    pub fn json_body<T: DeserializeOwned>(&self) -> crate::Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_json() {
        let resp = Response::json(r#"{"status": "ok"}"#);
        assert_eq!(resp.status, 200);
        assert_eq!(resp.header("content-type"), Some("application/json"));

        let value: serde_json::Value = resp.json_body().unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[test]
    fn test_response_with_status_and_header() {
        let resp = Response::text("Not Found")
            .with_status(404)
            .with_header("X-Trace", "abc")
            .with_header("bad header", "ignored");
        assert_eq!(resp.status, 404);
        assert_eq!(resp.header("x-trace"), Some("abc"));
        assert_eq!(resp.headers.len(), 2);
        assert_eq!(resp.body_str(), Some("Not Found"));
    }

    #[test]
    fn test_into_hyper_keeps_parts() {
        let resp = Response::text("hi").with_status(201).into_hyper();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_into_hyper_invalid_status() {
        let resp = Response::text("odd").with_status(42).into_hyper();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
