//! Keyed store of previously fetched collections.
//!
//! Each entry holds an ordered sequence of records, a freshness status, and
//! a monotonically increasing revision bumped on every committed fetch. The
//! revision is the generation counter that lets late completions be detected
//! by comparison instead of by inspecting view mount state: a commit or undo
//! carrying a revision that no longer matches is silently discarded.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use crate::record::Record;

mod patch;
pub use patch::{Patch, PatchError};

/// Identity of one cached query's result set, e.g. "movies" or
/// "reviews/movie/m1".
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct QueryKey(String);

impl QueryKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Freshness of a cache entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheStatus {
    /// Never fetched.
    Uninitialized,
    /// First fetch in flight, no data yet.
    Loading,
    /// Holds data from a committed fetch.
    Ready,
    /// Last fetch failed. Prior data, if any, is preserved.
    Error,
}

/// Point-in-time view of one entry. Never blocks.
#[derive(Clone, Debug)]
pub struct EntrySnapshot<T> {
    /// `None` until a fetch has committed.
    pub data: Option<Vec<T>>,
    pub status: CacheStatus,
    pub revision: u64,
    /// Whether a fetch for this key is currently in flight.
    pub is_fetching: bool,
}

/// Outcome of [`CollectionCache::begin_fetch`].
#[derive(Debug)]
pub enum BeginFetch {
    /// This caller owns the fetch; resolve it with the ticket.
    Started(FetchTicket),
    /// A fetch for this key is already in flight; attach to its result.
    Joined,
}

/// Proof of having started a fetch, carrying the revision observed at begin
/// time. A completion whose ticket revision no longer matches is stale.
#[derive(Clone, Debug)]
pub struct FetchTicket {
    key: QueryKey,
    revision: u64,
}

/// The undo record for an applied patch: the inverse edit plus the revision
/// it was computed against.
#[derive(Clone, Debug)]
pub struct PatchUndo<T: Record> {
    key: QueryKey,
    revision: u64,
    inverse: Patch<T>,
}

impl<T: Record> PatchUndo<T> {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Revision of the entry at the time the forward patch was applied.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

struct Entry<T> {
    data: Option<Vec<T>>,
    status: CacheStatus,
    revision: u64,
    fetching: bool,
    changed: watch::Sender<u64>,
}

impl<T> Entry<T> {
    fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            data: None,
            status: CacheStatus::Uninitialized,
            revision: 0,
            fetching: false,
            changed,
        }
    }

    fn bump(&self) {
        self.changed.send_modify(|seq| *seq += 1);
    }
}

/// Process-wide cache of fetched collections for one record type.
///
/// Clone-friendly via `Arc`; reads and writes are synchronous and atomic
/// with respect to the lock, never held across an await.
#[derive(Clone)]
pub struct CollectionCache<T: Record> {
    entries: Arc<Mutex<HashMap<QueryKey, Entry<T>>>>,
}

impl<T: Record> Default for CollectionCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> CollectionCache<T> {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current status and data for a key. Missing entries read as
    /// uninitialized; nothing is inserted.
    pub fn read(&self, key: &QueryKey) -> EntrySnapshot<T> {
        let entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some(entry) => EntrySnapshot {
                data: entry.data.clone(),
                status: entry.status,
                revision: entry.revision,
                is_fetching: entry.fetching,
            },
            None => EntrySnapshot {
                data: None,
                status: CacheStatus::Uninitialized,
                revision: 0,
                is_fetching: false,
            },
        }
    }

    /// Start a fetch for `key`, or join the one already in flight.
    ///
    /// At most one fetch per key is ever in flight: the second concurrent
    /// caller gets [`BeginFetch::Joined`] and must wait on
    /// [`subscribe`](Self::subscribe) instead of issuing its own call.
    pub fn begin_fetch(&self, key: &QueryKey) -> BeginFetch {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        if entry.fetching {
            return BeginFetch::Joined;
        }
        entry.fetching = true;
        if entry.status != CacheStatus::Ready {
            entry.status = CacheStatus::Loading;
        }
        entry.bump();
        BeginFetch::Started(FetchTicket {
            key: key.clone(),
            revision: entry.revision,
        })
    }

    /// Commit a completed fetch. Returns `false` when the completion is
    /// stale (the entry's revision moved since the ticket was issued); a
    /// stale commit is discarded without touching the newer data.
    pub fn commit_fetch(&self, ticket: FetchTicket, data: Vec<T>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(ticket.key.clone()).or_insert_with(Entry::new);
        if entry.revision != ticket.revision {
            tracing::debug!(key = %ticket.key, "discarding stale fetch completion");
            return false;
        }
        entry.data = Some(data);
        entry.status = CacheStatus::Ready;
        entry.revision += 1;
        entry.fetching = false;
        entry.bump();
        true
    }

    /// Record a failed fetch. Prior data, if any, is preserved
    /// (stale-while-error). Stale failures are discarded like stale commits.
    pub fn fail_fetch(&self, ticket: FetchTicket) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(ticket.key.clone()).or_insert_with(Entry::new);
        if entry.revision != ticket.revision {
            tracing::debug!(key = %ticket.key, "discarding stale fetch failure");
            return false;
        }
        entry.status = CacheStatus::Error;
        entry.fetching = false;
        entry.bump();
        true
    }

    /// Apply an edit to the entry's sequence, immediately visible to
    /// readers. Returns the undo record for the exact inverse. Never changes
    /// the entry's status.
    pub fn apply_patch(&self, key: &QueryKey, patch: Patch<T>) -> Result<PatchUndo<T>, PatchError> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        let data = entry
            .data
            .as_mut()
            .ok_or_else(|| PatchError::NoData(key.to_string()))?;
        let inverse = patch.apply(data)?;
        entry.bump();
        Ok(PatchUndo {
            key: key.clone(),
            revision: entry.revision,
            inverse,
        })
    }

    /// Replay an undo record, restoring the entry to its pre-patch value.
    ///
    /// Skipped (returning `false`) when the entry's revision moved since the
    /// forward patch was applied: a committed fetch has already replaced the
    /// optimistic state with authoritative data.
    pub fn undo(&self, undo: PatchUndo<T>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let entry = match entries.get_mut(&undo.key) {
            Some(entry) => entry,
            None => return false,
        };
        if entry.revision != undo.revision {
            tracing::debug!(key = %undo.key, "skipping stale undo");
            return false;
        }
        let data = match entry.data.as_mut() {
            Some(data) => data,
            None => return false,
        };
        match undo.inverse.apply(data) {
            Ok(_) => {
                entry.bump();
                true
            }
            Err(e) => {
                tracing::warn!(key = %undo.key, error = %e, "undo did not apply");
                false
            }
        }
    }

    /// Observe changes to a key. The receiver wakes on every status, data,
    /// or patch change; callers re-read after waking.
    pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<u64> {
        let mut entries = self.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(Entry::new);
        entry.changed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Director, Movie};

    fn movie(id: &str, title: &str) -> Movie {
        Movie {
            id: id.into(),
            title: title.into(),
            year: 2021,
            director: Director {
                name: "someone".into(),
                phone_no: "555".into(),
            },
        }
    }

    fn key() -> QueryKey {
        QueryKey::new("movies")
    }

    #[test]
    fn read_of_unknown_key_is_uninitialized() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let snap = cache.read(&key());
        assert_eq!(snap.status, CacheStatus::Uninitialized);
        assert!(snap.data.is_none());
        assert_eq!(snap.revision, 0);
    }

    #[test]
    fn fetch_lifecycle_commits_data_and_bumps_revision() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => panic!("no fetch should be in flight"),
        };
        assert_eq!(cache.read(&key()).status, CacheStatus::Loading);

        assert!(cache.commit_fetch(ticket, vec![movie("m1", "Arrival")]));
        let snap = cache.read(&key());
        assert_eq!(snap.status, CacheStatus::Ready);
        assert_eq!(snap.revision, 1);
        assert_eq!(snap.data.unwrap().len(), 1);
    }

    #[test]
    fn second_begin_fetch_joins_the_first() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        assert!(matches!(cache.begin_fetch(&key()), BeginFetch::Started(_)));
        assert!(matches!(cache.begin_fetch(&key()), BeginFetch::Joined));
    }

    #[test]
    fn refetch_of_ready_entry_keeps_ready_status() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        cache.commit_fetch(ticket, vec![movie("m1", "Arrival")]);

        // Demand re-fetch: data stays visible while in flight.
        assert!(matches!(cache.begin_fetch(&key()), BeginFetch::Started(_)));
        assert_eq!(cache.read(&key()).status, CacheStatus::Ready);
    }

    #[test]
    fn stale_commit_is_discarded() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let stale = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        // A newer fetch commits first.
        assert!(cache.commit_fetch(stale.clone(), vec![movie("m2", "Dune")]));

        // The older completion now carries an outdated revision.
        assert!(!cache.commit_fetch(stale, vec![movie("m1", "Arrival")]));
        let snap = cache.read(&key());
        assert_eq!(snap.data.unwrap()[0].id, "m2");
        assert_eq!(snap.revision, 1);
    }

    #[test]
    fn failed_fetch_preserves_prior_data() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        cache.commit_fetch(ticket, vec![movie("m1", "Arrival")]);

        let retry = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        assert!(cache.fail_fetch(retry));

        let snap = cache.read(&key());
        assert_eq!(snap.status, CacheStatus::Error);
        assert_eq!(snap.data.unwrap().len(), 1);
    }

    #[test]
    fn patch_then_undo_round_trips() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        cache.commit_fetch(ticket, vec![movie("m1", "Arrival"), movie("m2", "Dune")]);
        let before = cache.read(&key());

        let undo = cache
            .apply_patch(&key(), Patch::Remove { id: "m1".into() })
            .unwrap();
        assert_eq!(cache.read(&key()).data.unwrap().len(), 1);
        // Patch application never changes status or revision.
        assert_eq!(cache.read(&key()).status, CacheStatus::Ready);
        assert_eq!(cache.read(&key()).revision, before.revision);

        assert!(cache.undo(undo));
        let after = cache.read(&key());
        assert_eq!(after.data.unwrap(), before.data.unwrap());
    }

    #[test]
    fn undo_is_skipped_after_a_newer_commit() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        cache.commit_fetch(ticket, vec![movie("m1", "Arrival")]);

        let undo = cache
            .apply_patch(&key(), Patch::Remove { id: "m1".into() })
            .unwrap();

        // A refetch commits authoritative data in the meantime.
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        cache.commit_fetch(ticket, vec![movie("m1", "Arrival"), movie("m3", "Alien")]);

        assert!(!cache.undo(undo));
        assert_eq!(cache.read(&key()).data.unwrap().len(), 2);
    }

    #[test]
    fn patch_on_unpopulated_entry_is_rejected() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let err = cache
            .apply_patch(&key(), Patch::append(movie("m1", "Arrival")))
            .unwrap_err();
        assert!(matches!(err, PatchError::NoData(_)));
    }

    #[tokio::test]
    async fn subscribers_wake_on_changes() {
        let cache: CollectionCache<Movie> = CollectionCache::new();
        let mut rx = cache.subscribe(&key());
        let ticket = match cache.begin_fetch(&key()) {
            BeginFetch::Started(t) => t,
            BeginFetch::Joined => unreachable!(),
        };
        rx.changed().await.unwrap();
        cache.commit_fetch(ticket, vec![]);
        rx.changed().await.unwrap();
        assert_eq!(cache.read(&key()).status, CacheStatus::Ready);
    }
}
