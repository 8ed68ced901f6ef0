//! cinesync — client-side data synchronization for a token-gated movie
//! catalog.
//!
//! The crate is the layer between views and a remote JSON API: it caches
//! fetched collections, applies optimistic or pessimistic local patches when
//! a mutation is issued, reconciles the cache with the eventual server
//! response, rolls patches back atomically on failure, and gates protected
//! views behind the authentication token it attaches to every outgoing
//! request.
//!
//! ## Quick start
//!
//! ```
//! use std::sync::Arc;
//! use cinesync::{InMemoryTransport, Method, SyncClient};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let transport = InMemoryTransport::new();
//! transport.respond(Method::Post, "/users/login", 200, json!({ "token": "t1" }));
//! transport.respond(Method::Get, "/movies", 200, json!({ "data": [] }));
//!
//! let client = SyncClient::new(Arc::new(transport));
//! client.login("ada", "hunter2").await.unwrap();
//!
//! let movies = client.movies().all().fetch().await;
//! assert!(movies.is_success);
//! # }
//! ```
//!
//! Diagnostic logging goes through `tracing` and is silent unless the
//! embedding application installs a subscriber.

mod auth;
mod cache;
mod client;
mod error;
mod mutation;
mod notify;
mod pipeline;
mod query;
mod record;
mod transport;

pub use auth::{gate, AuthGate, GateDecision, GateView, TokenStore, LOGIN_PATH};
pub use cache::{
    BeginFetch, CacheStatus, CollectionCache, EntrySnapshot, FetchTicket, Patch, PatchError,
    PatchUndo, QueryKey,
};
pub use client::{CollectionHandle, SyncClient};
pub use error::RequestError;
pub use mutation::{Intent, MutationEngine, MutationHandle};
pub use notify::Noticeboard;
pub use pipeline::RequestPipeline;
pub use query::{QueryHandle, QuerySnapshot};
pub use record::{Director, Movie, NewMovie, NewReview, Record, Review};
pub use transport::{
    InMemoryTransport, Method, Request, Response, Stall, Transport, TransportError,
};

#[cfg(feature = "http")]
pub use transport::HttpTransport;
