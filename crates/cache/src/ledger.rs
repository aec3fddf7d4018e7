//! Process-wide record of uploaded outputs and cache entries waiting on them
//!
//! The uploaded-files table, the pending cache entries and the inputs seen by
//! `get` share one lock, so a commit decision always sees a consistent
//! snapshot. The lock is never held across an await.

use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use swipe_core::{Bindings, FileIdentity, PathKind};

/// A cache `put` that cannot be made durable yet
#[derive(Debug, Clone)]
pub struct PendingCacheEntry {
    pub key: String,
    pub outputs: Bindings,
    /// Identity of every file and directory path in `outputs`
    pub output_ids: HashMap<String, FileIdentity>,
    /// Inputs recorded by `get`, with whatever identities could be resolved
    pub inputs: Bindings,
    pub input_ids: HashMap<String, FileIdentity>,
}

/// Everything needed to write a durable cache entry, taken out of the ledger
#[derive(Debug, Clone)]
pub struct CommitPlan {
    pub key: String,
    /// Inputs with paths replaced by uploaded URIs where known
    pub remote_inputs: Bindings,
    /// Outputs with every path replaced by its uploaded URI
    pub remote_outputs: Bindings,
}

#[derive(Debug, Default)]
struct LedgerState {
    uploaded: HashMap<FileIdentity, String>,
    waiting: HashMap<FileIdentity, BTreeSet<String>>,
    pending: HashMap<String, PendingCacheEntry>,
    key_inputs: HashMap<String, Bindings>,
}

impl LedgerState {
    fn remote_for(&self, id: &FileIdentity) -> Option<String> {
        match id {
            FileIdentity::Remote(uri) => Some(uri.clone()),
            other => self.uploaded.get(other).cloned(),
        }
    }

    fn forget_pending(&mut self, key: &str) -> Option<PendingCacheEntry> {
        let entry = self.pending.remove(key)?;
        for id in entry.output_ids.values() {
            if let Some(keys) = self.waiting.get_mut(id) {
                keys.remove(key);
                if keys.is_empty() {
                    self.waiting.remove(id);
                }
            }
        }
        Some(entry)
    }
}

#[derive(Debug, Default)]
pub struct UploadLedger {
    state: Mutex<LedgerState>,
}

impl UploadLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote URI an identity was uploaded to
    pub fn lookup(&self, id: &FileIdentity) -> Option<String> {
        self.state.lock().uploaded.get(id).cloned()
    }

    /// Record a confirmed upload and return the cache keys waiting on it.
    ///
    /// An identity keeps the first URI it was published under.
    pub fn publish(&self, id: FileIdentity, uri: impl Into<String>) -> Vec<String> {
        let mut state = self.state.lock();
        state.uploaded.entry(id.clone()).or_insert_with(|| uri.into());
        state
            .waiting
            .get(&id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Cache keys with a pending entry that references `id`
    pub fn waiting_on(&self, id: &FileIdentity) -> Vec<String> {
        self.state
            .lock()
            .waiting
            .get(id)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn uploaded_count(&self) -> usize {
        self.state.lock().uploaded.len()
    }

    pub fn record_inputs(&self, key: &str, inputs: Bindings) {
        self.state.lock().key_inputs.insert(key.to_string(), inputs);
    }

    pub fn inputs_for(&self, key: &str) -> Option<Bindings> {
        self.state.lock().key_inputs.get(key).cloned()
    }

    /// Record an entry, replacing any earlier pending entry for its key
    pub fn record_pending(&self, entry: PendingCacheEntry) {
        let mut state = self.state.lock();
        state.forget_pending(&entry.key);
        for id in entry.output_ids.values() {
            state
                .waiting
                .entry(id.clone())
                .or_default()
                .insert(entry.key.clone());
        }
        state.pending.insert(entry.key.clone(), entry);
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.state.lock().pending.contains_key(key)
    }

    /// Take the pending entry for `key` if every output it references has
    /// been uploaded.
    ///
    /// Returns `None` when there is no entry or an output is still missing.
    /// A successful claim removes the entry, so exactly one caller gets the
    /// plan for a given `put`.
    pub fn claim(&self, key: &str) -> Option<CommitPlan> {
        let mut state = self.state.lock();
        let entry = state.pending.get(key)?;

        let mut missing = false;
        let remote_outputs = entry.outputs.rewrite_paths(|_, path| {
            match entry.output_ids.get(path).and_then(|id| state.remote_for(id)) {
                Some(uri) => uri,
                None => {
                    missing = true;
                    String::new()
                }
            }
        });
        if missing {
            return None;
        }

        let remote_inputs = entry.inputs.rewrite_paths(|_, path| {
            entry
                .input_ids
                .get(path)
                .and_then(|id| state.remote_for(id))
                .unwrap_or_else(|| path.to_string())
        });

        state.forget_pending(key)?;
        Some(CommitPlan {
            key: key.to_string(),
            remote_inputs,
            remote_outputs,
        })
    }

    /// Replace every path in `bindings` with its uploaded URI.
    ///
    /// `resolve` maps a path to its identity; paths it cannot resolve or that
    /// were never uploaded are handed to `unresolved` and kept as they are.
    /// Already-remote values pass through untouched.
    pub fn rewrite_to_remote<R, U>(&self, bindings: &Bindings, mut resolve: R, mut unresolved: U) -> Bindings
    where
        R: FnMut(&str) -> Option<FileIdentity>,
        U: FnMut(PathKind, &str),
    {
        let state = self.state.lock();
        bindings.rewrite_paths(|kind, path| {
            if swipe_core::is_remote_uri(path) {
                return path.to_string();
            }
            match resolve(path).and_then(|id| state.uploaded.get(&id).cloned()) {
                Some(uri) => uri,
                None => {
                    unresolved(kind, path);
                    path.to_string()
                }
            }
        })
    }
}
