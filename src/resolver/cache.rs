//! Process-wide cache of account names learned from the upstream hierarchy.
//!
//! The cache is filled once, the first time a lookup finds it empty, and is
//! never expired. Two requests that both find it empty may both fetch the
//! hierarchy; the second write simply overwrites the first with the same
//! entries. No lock is held across an `.await`, so abandoning a request
//! mid-fetch leaves the cache untouched.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{PoisonError, RwLock};

use tracing::{info, warn};

use super::normalize_key;
use crate::upstream::{AccountNode, ToolError};

/// One learned account name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasCacheEntry {
    /// Normalised account name (the lookup key).
    pub normalized_key: String,
    /// Canonical account id.
    pub canonical_id: String,
    /// Account name as the upstream reported it.
    pub display_name: String,
}

/// Normalised name to account mapping.
#[derive(Debug, Default)]
pub struct AliasCache {
    entries: RwLock<HashMap<String, AliasCacheEntry>>,
}

impl AliasCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if nothing has been learned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Number of cached names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Looks up a normalised key.
    #[must_use]
    pub fn get(&self, normalized_key: &str) -> Option<AliasCacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(normalized_key)
            .cloned()
    }

    /// Snapshot of every `(normalized_key, canonical_id)` pair.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, String)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|e| (e.normalized_key.clone(), e.canonical_id.clone()))
            .collect()
    }

    /// Inserts `nodes`, overwriting existing keys. Returns the number stored.
    ///
    /// Nodes whose id is not canonical or whose name normalises to nothing
    /// are skipped.
    pub fn populate<I>(&self, nodes: I) -> usize
    where
        I: IntoIterator<Item = AccountNode>,
    {
        let fresh: Vec<AliasCacheEntry> = nodes
            .into_iter()
            .filter_map(|node| {
                let canonical_id = super::canonical_digits(&node.id)?;
                let normalized_key = normalize_key(&node.name);
                (!normalized_key.is_empty()).then(|| AliasCacheEntry {
                    normalized_key,
                    canonical_id,
                    display_name: node.name,
                })
            })
            .collect();

        let count = fresh.len();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for entry in fresh {
            entries.insert(entry.normalized_key.clone(), entry);
        }
        count
    }

    /// Fills the cache from `fetch` if it is empty, then looks up `normalized_key`.
    ///
    /// A failed fetch is logged and the lookup proceeds against the (still
    /// empty) cache.
    pub async fn get_or_populate<F, Fut>(
        &self,
        normalized_key: &str,
        fetch: F,
    ) -> Option<AliasCacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<AccountNode>, ToolError>>,
    {
        if self.is_empty() {
            match fetch().await {
                Ok(nodes) => {
                    let count = self.populate(nodes);
                    info!(entries = count, "Populated account alias cache");
                }
                Err(e) => {
                    warn!(error = %e, "Account hierarchy lookup failed, continuing without cache");
                }
            }
        }
        self.get(normalized_key)
    }

    /// Forgets everything; the next lookup refetches.
    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
