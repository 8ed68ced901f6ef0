//! HTTP transport backed by reqwest. Requires the `http` feature.

use serde_json::Value;

use super::{Method, Request, Response, Transport, TransportError, TransportFuture};

/// Transport that talks to a real API over HTTP.
///
/// Non-success statuses are returned as responses so the pipeline can map
/// them to `RequestError::Rejected`; only failures to get any response at
/// all become `TransportError`.
pub struct HttpTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url` (e.g. `https://api.example.com/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn method(&self, method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: Request) -> TransportFuture<'_> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(self.method(request.method), url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        Box::pin(async move {
            let response = builder
                .send()
                .await
                .map_err(|e| TransportError(e.to_string()))?;
            let status = response.status().as_u16();
            // An empty or non-JSON body still yields a usable response.
            let body = response.json::<Value>().await.unwrap_or(Value::Null);
            Ok(Response::new(status, body))
        })
    }
}
