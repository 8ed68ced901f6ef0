//! Pluggable request/response transport underneath the pipeline.
//!
//! The core assumes nothing about the wire beyond JSON bodies and HTTP-like
//! status signaling, so the transport is a trait: the in-memory
//! implementation serves tests and single-process use, and an HTTP client
//! backed by reqwest is available behind the `http` feature.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

mod in_memory;
pub use in_memory::{InMemoryTransport, Stall};

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpTransport;

/// Request method, restricted to what the collections need.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single outbound call, already carrying the credential if one was live.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    /// Path relative to the API root, e.g. `/movies/m1`.
    pub path: String,
    pub body: Option<Value>,
    /// Bearer token attached by the pipeline, absent when unauthenticated.
    pub bearer: Option<String>,
}

/// A response that made it back over the wire, success or not.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: u16,
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Whether the status signals success (2xx).
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport-level failure: the call never produced a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport failure: {}", self.0)
    }
}

impl Error for TransportError {}

/// Boxed future returned by [`Transport::send`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send + 'a>>;

/// A generic request/response RPC capable of JSON bodies.
///
/// Non-success statuses are still `Ok`: a `Response` means the server
/// answered; `TransportError` means it never did.
pub trait Transport: Send + Sync {
    fn send(&self, request: Request) -> TransportFuture<'_>;
}
