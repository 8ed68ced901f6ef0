//! View-facing query handles.
//!
//! A handle couples one cache key with the GET path that populates it and
//! exposes the read surface views render from: a non-blocking snapshot plus
//! de-duplication-aware `fetch` and forced `refetch`.

use serde_json::Value;

use crate::cache::{BeginFetch, CacheStatus, CollectionCache, FetchTicket, QueryKey};
use crate::error::RequestError;
use crate::pipeline::{decode, RequestPipeline};
use crate::record::Record;
use crate::transport::Method;

/// What a view renders from: current data plus coarse status flags.
#[derive(Clone, Debug)]
pub struct QuerySnapshot<T> {
    pub data: Option<Vec<T>>,
    pub is_loading: bool,
    pub is_error: bool,
    pub is_success: bool,
}

/// Read surface for one cached query.
#[derive(Clone)]
pub struct QueryHandle<T: Record> {
    pipeline: RequestPipeline,
    cache: CollectionCache<T>,
    key: QueryKey,
    path: String,
}

impl<T: Record> QueryHandle<T> {
    pub fn new(
        pipeline: RequestPipeline,
        cache: CollectionCache<T>,
        key: QueryKey,
        path: impl Into<String>,
    ) -> Self {
        Self {
            pipeline,
            cache,
            key,
            path: path.into(),
        }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current state of this query. Never blocks, never fetches.
    pub fn snapshot(&self) -> QuerySnapshot<T> {
        let entry = self.cache.read(&self.key);
        QuerySnapshot {
            data: entry.data,
            is_loading: entry.status == CacheStatus::Loading,
            is_error: entry.status == CacheStatus::Error,
            is_success: entry.status == CacheStatus::Ready,
        }
    }

    /// Ensure this query has been fetched, then return its state.
    ///
    /// Already-ready data is returned as-is (re-fetch is on demand only, via
    /// [`refetch`](Self::refetch)). If a fetch for the same key is already
    /// in flight, this call attaches to its result instead of issuing a
    /// second one.
    pub async fn fetch(&self) -> QuerySnapshot<T> {
        if self.cache.read(&self.key).status == CacheStatus::Ready {
            return self.snapshot();
        }
        self.drive().await
    }

    /// Fetch regardless of current freshness.
    pub async fn refetch(&self) -> QuerySnapshot<T> {
        self.drive().await
    }

    async fn drive(&self) -> QuerySnapshot<T> {
        match self.cache.begin_fetch(&self.key) {
            BeginFetch::Started(ticket) => self.run_fetch(ticket).await,
            BeginFetch::Joined => self.wait_for_inflight().await,
        }
        self.snapshot()
    }

    async fn run_fetch(&self, ticket: FetchTicket) {
        tracing::debug!(key = %self.key, path = %self.path, "fetching");
        match self.pipeline.call(Method::Get, &self.path, None).await {
            Ok(value) => match decode_items::<T>(value) {
                Ok(items) => {
                    self.cache.commit_fetch(ticket, items);
                }
                Err(e) => {
                    tracing::warn!(key = %self.key, error = %e, "fetch payload malformed");
                    self.cache.fail_fetch(ticket);
                }
            },
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "fetch failed");
                self.cache.fail_fetch(ticket);
            }
        }
    }

    /// Wait for the fetch some other caller owns to resolve.
    async fn wait_for_inflight(&self) {
        let mut rx = self.cache.subscribe(&self.key);
        while self.cache.read(&self.key).is_fetching {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

/// Decode a fetched payload into an ordered sequence.
///
/// Collection endpoints return an array; single-entity endpoints (movie by
/// id) return one object, cached as a one-element sequence.
fn decode_items<T: Record>(value: Value) -> Result<Vec<T>, RequestError> {
    if value.is_array() {
        decode(value)
    } else {
        decode::<T>(value).map(|item| vec![item])
    }
}
