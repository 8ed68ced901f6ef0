//! Scripted in-memory transport for tests and single-process use.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::Semaphore;

use super::{Method, Request, Response, Transport, TransportError, TransportFuture};

#[derive(Clone)]
enum Script {
    Respond(Response),
    Fail(String),
}

#[derive(Default)]
struct Route {
    scripts: VecDeque<Script>,
    gate: Option<Arc<Semaphore>>,
}

#[derive(Default)]
struct State {
    routes: HashMap<(Method, String), Route>,
    log: Vec<Request>,
}

/// In-memory transport with scripted responses.
///
/// Script a route with [`respond`](Self::respond) or [`fail`](Self::fail);
/// repeated scripts on the same route are consumed in order, and the last
/// one repeats. Every request is recorded, including requests still stalled
/// behind a [`Stall`] gate, so tests can assert how many calls actually went
/// out.
///
/// ## Example
///
/// ```
/// use cinesync::{InMemoryTransport, Method};
/// use serde_json::json;
///
/// let transport = InMemoryTransport::new();
/// transport.respond(Method::Get, "/movies", 200, json!({ "data": [] }));
/// transport.fail(Method::Post, "/movies", "connection reset");
/// ```
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<State>>,
}

/// Handle keeping a stalled route's requests in flight until released.
pub struct Stall {
    gate: Arc<Semaphore>,
}

impl Stall {
    /// Let one stalled request proceed.
    pub fn release(&self) {
        self.gate.add_permits(1);
    }
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for a route.
    pub fn respond(&self, method: Method, path: impl Into<String>, status: u16, body: Value) {
        self.script(method, path.into(), Script::Respond(Response::new(status, body)));
    }

    /// Script a transport failure for a route.
    pub fn fail(&self, method: Method, path: impl Into<String>, reason: impl Into<String>) {
        self.script(method, path.into(), Script::Fail(reason.into()));
    }

    /// Hold every request to a route in flight until the returned [`Stall`]
    /// releases it.
    pub fn stall(&self, method: Method, path: impl Into<String>) -> Stall {
        let gate = Arc::new(Semaphore::new(0));
        let mut state = self.state.lock().unwrap();
        state
            .routes
            .entry((method, path.into()))
            .or_default()
            .gate = Some(Arc::clone(&gate));
        Stall { gate }
    }

    /// Every request sent so far, in order, including stalled ones.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().unwrap().log.clone()
    }

    /// How many requests hit a specific route.
    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    fn script(&self, method: Method, path: String, script: Script) {
        let mut state = self.state.lock().unwrap();
        state
            .routes
            .entry((method, path))
            .or_default()
            .scripts
            .push_back(script);
    }

    fn next_script(&self, request: &Request) -> (Option<Script>, Option<Arc<Semaphore>>) {
        let mut state = self.state.lock().unwrap();
        state.log.push(request.clone());
        match state.routes.get_mut(&(request.method, request.path.clone())) {
            Some(route) => {
                let script = if route.scripts.len() > 1 {
                    route.scripts.pop_front()
                } else {
                    route.scripts.front().cloned()
                };
                (script, route.gate.clone())
            }
            None => (None, None),
        }
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, request: Request) -> TransportFuture<'_> {
        let (script, gate) = self.next_script(&request);
        Box::pin(async move {
            if let Some(gate) = gate {
                // Consume one permit per stalled request.
                gate.acquire()
                    .await
                    .map_err(|_| TransportError("stall gate closed".into()))?
                    .forget();
            }
            match script {
                Some(Script::Respond(response)) => Ok(response),
                Some(Script::Fail(reason)) => Err(TransportError(reason)),
                None => Err(TransportError(format!(
                    "no scripted response for {} {}",
                    request.method, request.path
                ))),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_responses_are_consumed_in_order() {
        let transport = InMemoryTransport::new();
        transport.fail(Method::Get, "/movies", "reset");
        transport.respond(Method::Get, "/movies", 200, json!({ "data": [] }));

        let request = Request {
            method: Method::Get,
            path: "/movies".into(),
            body: None,
            bearer: None,
        };

        assert!(transport.send(request.clone()).await.is_err());
        let response = transport.send(request.clone()).await.unwrap();
        assert_eq!(response.status, 200);
        // Last script repeats.
        assert!(transport.send(request).await.is_ok());
        assert_eq!(transport.calls(Method::Get, "/movies"), 3);
    }

    #[tokio::test]
    async fn unscripted_route_is_a_transport_failure() {
        let transport = InMemoryTransport::new();
        let err = transport
            .send(Request {
                method: Method::Delete,
                path: "/movies/m1".into(),
                body: None,
                bearer: None,
            })
            .await
            .unwrap_err();
        assert!(err.0.contains("DELETE /movies/m1"));
    }

    #[tokio::test]
    async fn stalled_request_waits_for_release() {
        let transport = InMemoryTransport::new();
        transport.respond(Method::Get, "/movies", 200, json!({ "data": [] }));
        let stall = transport.stall(Method::Get, "/movies");

        let pending = tokio::spawn({
            let transport = transport.clone();
            async move {
                transport
                    .send(Request {
                        method: Method::Get,
                        path: "/movies".into(),
                        body: None,
                        bearer: None,
                    })
                    .await
            }
        });

        // The request is logged even while stalled.
        tokio::task::yield_now().await;
        assert_eq!(transport.calls(Method::Get, "/movies"), 1);
        assert!(!pending.is_finished());

        stall.release();
        assert_eq!(pending.await.unwrap().unwrap().status, 200);
    }
}
