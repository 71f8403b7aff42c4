//! In-memory store of finished search responses.
//!
//! Entries never expire on their own; the whole store is emptied at once by
//! [`ResultCache::clear`], which the daily invalidator calls.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::models::{SearchPayload, SearchResponse};

/// Cache key derived from the request exactly as the caller sent it.
///
/// The symptom is keyed on its raw JSON encoding, so `"Cough"` and `"cough "`
/// are different keys, as are a string and a one-element list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    #[must_use]
    pub fn of(payload: &SearchPayload) -> Self {
        let symptom = payload
            .symptom
            .as_ref()
            .map_or_else(|| "null".to_string(), ToString::to_string);

        Self(format!(
            "type:{}|param:{}",
            payload.search_type_label(),
            symptom
        ))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Default)]
struct Store {
    generation: u64,
    entries: HashMap<Fingerprint, Arc<SearchResponse>>,
}

/// Shared response store.
///
/// Every [`clear`](Self::clear) starts a new generation. Writers read the
/// generation before computing a response and pass it back to
/// [`insert`](Self::insert), so a response computed before a clear never lands
/// in the emptied store.
#[derive(Debug, Default)]
pub struct ResultCache {
    store: RwLock<Store>,
}

impl ResultCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, fingerprint: &Fingerprint) -> Option<Arc<SearchResponse>> {
        self.store.read().await.entries.get(fingerprint).cloned()
    }

    pub async fn generation(&self) -> u64 {
        self.store.read().await.generation
    }

    /// Stores a response computed during `generation`.
    ///
    /// Returns `false` without writing when the store was cleared since then.
    /// An existing entry for the same key is kept.
    pub async fn insert(
        &self,
        fingerprint: Fingerprint,
        response: Arc<SearchResponse>,
        generation: u64,
    ) -> bool {
        let mut store = self.store.write().await;
        if store.generation != generation {
            return false;
        }
        store.entries.entry(fingerprint).or_insert(response);
        true
    }

    /// Replaces the store with an empty one and returns how many entries were dropped.
    pub async fn clear(&self) -> usize {
        let mut store = self.store.write().await;
        store.generation = store.generation.wrapping_add(1);
        std::mem::take(&mut store.entries).len()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }
}
