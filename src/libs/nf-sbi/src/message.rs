//! SBI Message Structures
//!
//! Request/response envelopes exchanged over the SBI client and server,
//! plus RFC 7807 problem details.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Content type used for JSON bodies
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// Content type used for RFC 7807 bodies
pub const CONTENT_TYPE_PROBLEM: &str = "application/problem+json";
/// Content type used for plaintext bodies
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// SBI Header - request line
#[derive(Debug, Clone, Default)]
pub struct SbiHeader {
    /// HTTP method (GET, POST, PUT, DELETE, PATCH, OPTIONS)
    pub method: String,
    /// Full URI (path and optional query)
    pub uri: String,
}

impl SbiHeader {
    /// Create a new header with method and URI
    pub fn with_method_uri(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
        }
    }

    /// URI path without the query string
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or(&self.uri)
    }
}

/// SBI HTTP Message - params, headers and body
///
/// Header names are stored lowercased, the way HTTP/2 carries them.
#[derive(Debug, Clone, Default)]
pub struct SbiHttpMessage {
    /// Query parameters
    pub params: HashMap<String, String>,
    /// HTTP headers
    pub headers: HashMap<String, String>,
    /// Body content
    pub content: Option<String>,
}

impl SbiHttpMessage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a query parameter
    pub fn set_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.params.insert(key.into(), value.into());
    }

    /// Set a header
    pub fn set_header(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Get a header (case-insensitive)
    pub fn get_header(&self, key: &str) -> Option<&String> {
        self.headers.get(&key.to_ascii_lowercase())
    }

    /// Set the body content
    pub fn set_content(&mut self, content: impl Into<String>) {
        self.content = Some(content.into());
    }
}

/// SBI Request
#[derive(Debug, Clone, Default)]
pub struct SbiRequest {
    /// Request header
    pub header: SbiHeader,
    /// HTTP message (params, headers, body)
    pub http: SbiHttpMessage,
}

impl SbiRequest {
    fn with_method(method: &str, uri: impl Into<String>) -> Self {
        Self {
            header: SbiHeader::with_method_uri(method, uri),
            http: SbiHttpMessage::new(),
        }
    }

    /// Create a GET request
    pub fn get(uri: impl Into<String>) -> Self {
        Self::with_method("GET", uri)
    }

    /// Create a PUT request
    pub fn put(uri: impl Into<String>) -> Self {
        Self::with_method("PUT", uri)
    }

    /// Create a POST request
    pub fn post(uri: impl Into<String>) -> Self {
        Self::with_method("POST", uri)
    }

    /// Create a DELETE request
    pub fn delete(uri: impl Into<String>) -> Self {
        Self::with_method("DELETE", uri)
    }

    /// Set JSON body content
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(body)?;
        self.http.set_content(json);
        self.http.set_header("Content-Type", CONTENT_TYPE_JSON);
        Ok(self)
    }

    /// Add a query parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.http.set_param(key, value);
        self
    }

    /// Add a header
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.http.set_header(key, value);
        self
    }
}

/// SBI Response
#[derive(Debug, Clone, Default)]
pub struct SbiResponse {
    /// HTTP message (headers, body)
    pub http: SbiHttpMessage,
    /// HTTP status code
    pub status: u16,
}

impl SbiResponse {
    /// Create a response with status code
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Create a successful response (200 OK)
    pub fn ok() -> Self {
        Self::with_status(200)
    }

    /// Create a created response (201 Created)
    pub fn created() -> Self {
        Self::with_status(201)
    }

    /// Create a no content response (204 No Content)
    pub fn no_content() -> Self {
        Self::with_status(204)
    }

    /// Set JSON body content
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Result<Self, serde_json::Error> {
        let json = serde_json::to_string(body)?;
        self.http.set_content(json);
        self.http.set_header("Content-Type", CONTENT_TYPE_JSON);
        Ok(self)
    }

    /// Set raw body content
    pub fn with_body(mut self, content: impl Into<String>, content_type: impl Into<String>) -> Self {
        self.http.set_content(content);
        self.http.set_header("Content-Type", content_type);
        self
    }

    /// Set a plaintext body
    pub fn with_text(self, content: impl Into<String>) -> Self {
        self.with_body(content, CONTENT_TYPE_TEXT)
    }

    /// Add a header
    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.http.set_header(key, value);
        self
    }

    /// Check if response is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse JSON body
    pub fn json_body<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        let content = self.http.content.as_deref().unwrap_or("{}");
        serde_json::from_str(content)
    }
}

/// Problem Details - RFC 7807 compliant error response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProblemDetails {
    /// A URI reference that identifies the problem type
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    /// A short, human-readable summary of the problem type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// The HTTP status code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i32>,
    /// A human-readable explanation specific to this occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// A URI reference that identifies the specific occurrence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    /// Application-specific error cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ProblemDetails {
    pub fn with_status(status: i32) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}
