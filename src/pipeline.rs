//! Request pipeline — wraps every outbound call.
//!
//! Injects the live credential as a bearer header, unwraps the server's
//! `{ "data": ... }` envelope, and normalizes failures into
//! [`RequestError`]. One attempt per call; retry policy, if any, belongs to
//! the caller.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::TokenStore;
use crate::error::RequestError;
use crate::transport::{Method, Request, Transport};

/// The single seam every remote call goes through.
#[derive(Clone)]
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    tokens: TokenStore,
}

impl RequestPipeline {
    pub fn new(transport: Arc<dyn Transport>, tokens: TokenStore) -> Self {
        Self { transport, tokens }
    }

    /// The token store this pipeline reads its credential from.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Issue a call and unwrap the `{ "data": ... }` envelope.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RequestError> {
        let body = self.call_raw(method, path, body).await?;
        match body.get("data") {
            Some(data) => Ok(data.clone()),
            None => Ok(body),
        }
    }

    /// Issue a call and return the raw response body.
    ///
    /// Used by flows whose responses are not enveloped, like login's
    /// `{ "token": ... }`.
    pub async fn call_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, RequestError> {
        let bearer = self.tokens.get();
        tracing::debug!(%method, path, authenticated = bearer.is_some(), "dispatching request");

        let request = Request {
            method,
            path: path.to_string(),
            body,
            bearer,
        };
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RequestError::Network(e.to_string()))?;

        if !response.is_success() {
            let message = response
                .body
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
            tracing::warn!(%method, path, status = response.status, "request rejected");
            return Err(RequestError::Rejected {
                status: response.status,
                message,
            });
        }
        Ok(response.body)
    }
}

/// Decode a success payload into its typed shape.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, RequestError> {
    serde_json::from_value(value).map_err(|e| RequestError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;
    use serde_json::json;

    fn pipeline() -> (RequestPipeline, InMemoryTransport, TokenStore) {
        let transport = InMemoryTransport::new();
        let tokens = TokenStore::new();
        let pipeline = RequestPipeline::new(Arc::new(transport.clone()), tokens.clone());
        (pipeline, transport, tokens)
    }

    #[tokio::test]
    async fn attaches_bearer_when_authenticated() {
        let (pipeline, transport, tokens) = pipeline();
        transport.respond(Method::Get, "/movies", 200, json!({ "data": [] }));

        pipeline.call(Method::Get, "/movies", None).await.unwrap();
        tokens.set("secret");
        pipeline.call(Method::Get, "/movies", None).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests[0].bearer, None);
        assert_eq!(requests[1].bearer, Some("secret".to_string()));
    }

    #[tokio::test]
    async fn unwraps_data_envelope() {
        let (pipeline, transport, _) = pipeline();
        transport.respond(
            Method::Get,
            "/movies",
            200,
            json!({ "data": [{ "_id": "m1" }] }),
        );

        let value = pipeline.call(Method::Get, "/movies", None).await.unwrap();
        assert_eq!(value, json!([{ "_id": "m1" }]));
    }

    #[tokio::test]
    async fn raw_call_keeps_the_whole_body() {
        let (pipeline, transport, _) = pipeline();
        transport.respond(
            Method::Post,
            "/users/login",
            200,
            json!({ "token": "t1" }),
        );

        let body = pipeline
            .call_raw(Method::Post, "/users/login", Some(json!({})))
            .await
            .unwrap();
        assert_eq!(body["token"], "t1");
    }

    #[tokio::test]
    async fn rejection_surfaces_the_server_message_verbatim() {
        let (pipeline, transport, _) = pipeline();
        transport.respond(
            Method::Post,
            "/movies",
            422,
            json!({ "error": "year must be a number" }),
        );

        let err = pipeline
            .call(Method::Post, "/movies", Some(json!({})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RequestError::Rejected {
                status: 422,
                message: Some("year must be a number".to_string()),
            }
        );
    }

    #[tokio::test]
    async fn transport_failure_is_a_network_error() {
        let (pipeline, transport, _) = pipeline();
        transport.fail(Method::Get, "/movies", "connection refused");

        let err = pipeline.call(Method::Get, "/movies", None).await.unwrap_err();
        assert!(matches!(err, RequestError::Network(_)));
    }
}
