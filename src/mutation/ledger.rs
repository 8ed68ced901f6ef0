//! Per-key ledger of pending optimistic patches.
//!
//! Each apply-then-confirm mutation records the undo for its optimistic edit
//! here. Undos must replay in strict reverse-of-application order: a failed
//! patch that is not on top of its key's stack is only marked doomed, and is
//! unwound once every patch applied after it has resolved. Both `confirm`
//! and `fail` therefore return the undos that are ready to replay, already
//! in last-applied-first order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::cache::{PatchUndo, QueryKey};
use crate::record::Record;

struct Pending<T: Record> {
    id: u64,
    undo: PatchUndo<T>,
    doomed: bool,
}

pub(crate) struct PatchLedger<T: Record> {
    stacks: Mutex<HashMap<QueryKey, Vec<Pending<T>>>>,
    next_id: AtomicU64,
}

impl<T: Record> PatchLedger<T> {
    pub(crate) fn new() -> Self {
        Self {
            stacks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Record a pending patch, returning the mutation's in-flight id.
    pub(crate) fn record(&self, key: QueryKey, undo: PatchUndo<T>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stacks = self.stacks.lock().unwrap();
        stacks.entry(key).or_default().push(Pending {
            id,
            undo,
            doomed: false,
        });
        id
    }

    /// The mutation succeeded: its edit stands. Removes the pending patch
    /// and returns any doomed undos now exposed at the top of the stack.
    pub(crate) fn confirm(&self, key: &QueryKey, id: u64) -> Vec<PatchUndo<T>> {
        let mut stacks = self.stacks.lock().unwrap();
        let stack = match stacks.get_mut(key) {
            Some(stack) => stack,
            None => return Vec::new(),
        };
        stack.retain(|pending| pending.id != id);
        Self::drain_doomed(stack)
    }

    /// The mutation failed: its edit must be undone. Returns the undos ready
    /// to replay, in last-applied-first order; empty when a live patch above
    /// it defers the unwind.
    pub(crate) fn fail(&self, key: &QueryKey, id: u64) -> Vec<PatchUndo<T>> {
        let mut stacks = self.stacks.lock().unwrap();
        let stack = match stacks.get_mut(key) {
            Some(stack) => stack,
            None => return Vec::new(),
        };
        if let Some(pending) = stack.iter_mut().find(|pending| pending.id == id) {
            pending.doomed = true;
        }
        Self::drain_doomed(stack)
    }

    /// How many patches are pending for a key.
    #[cfg(test)]
    pub(crate) fn pending(&self, key: &QueryKey) -> usize {
        self.stacks
            .lock()
            .unwrap()
            .get(key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    fn drain_doomed(stack: &mut Vec<Pending<T>>) -> Vec<PatchUndo<T>> {
        let mut undos = Vec::new();
        while stack.last().is_some_and(|pending| pending.doomed) {
            let pending = stack.pop().unwrap();
            undos.push(pending.undo);
        }
        undos
    }
}
