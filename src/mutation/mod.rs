//! Mutation engine — executes create/update/delete intents and reconciles
//! the cache.
//!
//! Two reconciliation strategies, selected per intent:
//!
//! - **confirm-then-apply** (create): the cache is untouched until the call
//!   succeeds, then the server entity (with its server-assigned id) is
//!   appended — unless a fetch committed meanwhile, since its data already
//!   includes the new entity. There is nothing to undo on failure.
//! - **apply-then-confirm** (update/delete): the local edit is applied
//!   immediately and its inverse recorded as a pending patch; on success the
//!   pending patch is discarded and the optimistic value replaced with the
//!   authoritative server echo; on failure the inverse restores the prior
//!   state.
//!
//! Every execution settles exactly once: one notification is pushed and the
//! `on_settled` callback runs, success or failure, even when success-path
//! reconciliation itself fails. The only exception is a stale resolution
//! (the entry's revision moved while the call was in flight), which is
//! dropped silently per the generation-counter rule.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::cache::{CollectionCache, Patch, PatchUndo, QueryKey};
use crate::error::RequestError;
use crate::notify::Noticeboard;
use crate::pipeline::{decode, RequestPipeline};
use crate::record::Record;
use crate::transport::Method;

mod ledger;
use ledger::PatchLedger;

/// What a mutation wants done, and which cache entry it reconciles.
#[derive(Clone, Debug)]
pub enum Intent<T: Record> {
    /// POST the input to the collection; append the server entity on success.
    Create { key: QueryKey, input: Value },
    /// PUT the item; replace-in-place optimistically.
    Update { key: QueryKey, item: T },
    /// DELETE by id; remove-by-id optimistically.
    Delete { key: QueryKey, id: String },
}

impl<T: Record> Intent<T> {
    fn verb(&self) -> &'static str {
        match self {
            Intent::Create { .. } => "save",
            Intent::Update { .. } => "update",
            Intent::Delete { .. } => "delete",
        }
    }
}

/// Executes intents against the pipeline and drives cache edits.
///
/// Clone-friendly; clones share the pending-patch ledger and in-flight
/// counter.
#[derive(Clone)]
pub struct MutationEngine<T: Record> {
    pipeline: RequestPipeline,
    cache: CollectionCache<T>,
    board: Noticeboard,
    ledger: Arc<PatchLedger<T>>,
    in_flight: Arc<AtomicUsize>,
}

impl<T: Record> MutationEngine<T> {
    pub fn new(pipeline: RequestPipeline, cache: CollectionCache<T>, board: Noticeboard) -> Self {
        Self {
            pipeline,
            cache,
            board,
            ledger: Arc::new(PatchLedger::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether any mutation through this engine is currently in flight.
    /// Views tracking a single form want [`MutationHandle::is_loading`]
    /// instead.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// A handle with its own loading flag, sharing this engine's ledger and
    /// cache. One per view-side form.
    pub fn handle(&self) -> MutationHandle<T> {
        MutationHandle::new(self.clone())
    }

    /// Execute an intent. Equivalent to [`execute_with`](Self::execute_with)
    /// with a no-op settlement callback.
    pub async fn execute(&self, intent: Intent<T>) -> Result<T, RequestError> {
        self.execute_with(intent, || {}).await
    }

    /// Execute an intent, running `on_settled` exactly once after
    /// resolution. Views use the callback to close dependent affordances
    /// (dialogs, spinners) regardless of outcome.
    pub async fn execute_with(
        &self,
        intent: Intent<T>,
        on_settled: impl FnOnce(),
    ) -> Result<T, RequestError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let verb = intent.verb();
        let (result, fresh) = match intent {
            Intent::Create { key, input } => self.run_create(key, input).await,
            Intent::Update { key, item } => self.run_update(key, item).await,
            Intent::Delete { key, id } => self.run_delete(key, id).await,
        };
        if fresh {
            self.board.push(Self::message(verb, &result));
        }
        on_settled();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn run_create(&self, key: QueryKey, input: Value) -> (Result<T, RequestError>, bool) {
        let path = format!("/{}", T::COLLECTION);
        let revision = self.cache.read(&key).revision;
        let result = self
            .pipeline
            .call(Method::Post, &path, Some(input))
            .await
            .and_then(decode::<T>);
        if let Ok(item) = &result {
            if self.cache.read(&key).revision != revision {
                // A fetch committed while the POST was in flight; its data
                // already contains the new entity, so appending would
                // duplicate it.
                tracing::debug!(key = %key, "append skipped after mid-flight refetch");
            } else if let Err(e) = self.cache.apply_patch(&key, Patch::append(item.clone())) {
                // Unpopulated entry: no view has fetched this collection yet,
                // so there is nothing to append into and the next fetch will
                // include the new entity anyway.
                tracing::debug!(key = %key, error = %e, "skipping append after create");
            }
        }
        (result, true)
    }

    async fn run_update(&self, key: QueryKey, item: T) -> (Result<T, RequestError>, bool) {
        let id = item.id().to_string();
        let body = match serde_json::to_value(&item) {
            Ok(body) => body,
            Err(e) => return (Err(RequestError::Decode(e.to_string())), true),
        };
        let pending = self.apply_optimistic(&key, Patch::Replace { item: item.clone() });

        let path = format!("/{}/{}", T::COLLECTION, id);
        let result = self
            .pipeline
            .call(Method::Put, &path, Some(body))
            .await
            .and_then(decode::<T>);

        match &result {
            Ok(server) => {
                let fresh = self.settle_success(&key, pending);
                if fresh && pending.is_some() {
                    // The server echo is authoritative: swap the optimistic
                    // value for what the server actually stored.
                    if let Err(e) = self
                        .cache
                        .apply_patch(&key, Patch::Replace { item: server.clone() })
                    {
                        tracing::debug!(key = %key, error = %e, "server echo not reconciled");
                    }
                }
                (result, fresh)
            }
            Err(_) => (result, self.settle_failure(&key, pending)),
        }
    }

    async fn run_delete(&self, key: QueryKey, id: String) -> (Result<T, RequestError>, bool) {
        let pending = self.apply_optimistic(&key, Patch::Remove { id: id.clone() });

        let path = format!("/{}/{}", T::COLLECTION, id);
        let result = self
            .pipeline
            .call(Method::Delete, &path, None)
            .await
            .and_then(decode::<T>);

        match &result {
            Ok(_) => (result, self.settle_success(&key, pending)),
            Err(_) => (result, self.settle_failure(&key, pending)),
        }
    }

    /// Apply the local edit and record its inverse as a pending patch.
    /// `None` when there was nothing to edit (unpopulated entry or missing
    /// target): the call still goes out, there is just nothing to undo.
    fn apply_optimistic(&self, key: &QueryKey, patch: Patch<T>) -> Option<(u64, u64)> {
        match self.cache.apply_patch(key, patch) {
            Ok(undo) => {
                let revision = undo.revision();
                let id = self.ledger.record(key.clone(), undo);
                Some((id, revision))
            }
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "no optimistic edit applied");
                None
            }
        }
    }

    /// Discard this mutation's pending patch and replay any deferred undos
    /// it was blocking. Returns whether the resolution is still fresh.
    fn settle_success(&self, key: &QueryKey, pending: Option<(u64, u64)>) -> bool {
        match pending {
            Some((id, revision)) => {
                self.replay(self.ledger.confirm(key, id));
                self.is_fresh(key, revision)
            }
            None => true,
        }
    }

    /// Roll back this mutation's pending patch (deferred if later patches
    /// are still in flight). Returns whether the resolution is still fresh.
    fn settle_failure(&self, key: &QueryKey, pending: Option<(u64, u64)>) -> bool {
        match pending {
            Some((id, revision)) => {
                self.replay(self.ledger.fail(key, id));
                self.is_fresh(key, revision)
            }
            None => true,
        }
    }

    fn replay(&self, undos: Vec<PatchUndo<T>>) {
        for undo in undos {
            self.cache.undo(undo);
        }
    }

    /// A resolution is stale once the entry's revision moved past the one
    /// its optimistic edit was applied against: a committed fetch has
    /// already replaced the optimistic state, so neither cache edits nor a
    /// notification should fire.
    fn is_fresh(&self, key: &QueryKey, revision: u64) -> bool {
        self.cache.read(key).revision == revision
    }

    fn message(verb: &str, result: &Result<T, RequestError>) -> String {
        match result {
            Ok(_) => match verb {
                "save" => format!("New {} saved successfully!", T::NOUN),
                "update" => format!("{} updated successfully!", capitalize(T::NOUN)),
                _ => format!("{} deleted successfully!", capitalize(T::NOUN)),
            },
            Err(e) => e
                .server_message()
                .map(str::to_string)
                .unwrap_or_else(|| format!("Failed to {} {}", verb, T::NOUN)),
        }
    }
}

/// One view-side form's handle on a collection's mutations: `execute` plus a
/// loading flag scoped to this handle alone.
///
/// The engine-wide [`MutationEngine::is_loading`] covers every mutation on
/// the collection; a handle's flag only reflects calls dispatched through it,
/// so an update form stays idle while an unrelated delete is in flight.
/// Clones share the flag.
#[derive(Clone)]
pub struct MutationHandle<T: Record> {
    engine: MutationEngine<T>,
    in_flight: Arc<AtomicUsize>,
}

impl<T: Record> MutationHandle<T> {
    fn new(engine: MutationEngine<T>) -> Self {
        Self {
            engine,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Whether a mutation dispatched through this handle is in flight.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Execute an intent through the shared engine, tracked by this handle's
    /// flag.
    pub async fn execute(&self, intent: Intent<T>) -> Result<T, RequestError> {
        self.execute_with(intent, || {}).await
    }

    /// [`execute`](Self::execute) with a settlement callback, as in
    /// [`MutationEngine::execute_with`].
    pub async fn execute_with(
        &self,
        intent: Intent<T>,
        on_settled: impl FnOnce(),
    ) -> Result<T, RequestError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let result = self.engine.execute_with(intent, on_settled).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

fn capitalize(noun: &str) -> String {
    let mut chars = noun.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
