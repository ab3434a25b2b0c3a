//! Query embedding cache.
//!
//! Repeated similarity lookups for the same text skip the embedding call.
//! Entries are keyed by model and text, so switching models never serves a
//! vector of the wrong shape.

use moka::future::Cache;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// Cache key for an embedding.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EmbeddingKey {
    model: String,
    text_hash: u64,
    text_len: usize,
}

impl EmbeddingKey {
    pub fn new(model: &str, text: &str) -> Self {
        Self {
            model: model.to_string(),
            text_hash: hash_text(text),
            text_len: text.len(),
        }
    }
}

/// Embedding cache using moka.
///
/// Vectors are shared behind `Arc` so hits do not copy them.
#[derive(Clone)]
pub struct EmbeddingCache {
    cache: Cache<EmbeddingKey, Arc<Vec<f32>>>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl EmbeddingCache {
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    pub async fn get(&self, key: &EmbeddingKey) -> Option<Arc<Vec<f32>>> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: EmbeddingKey, vector: Arc<Vec<f32>>) {
        self.cache.insert(key, vector).await;
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate; moka applies pending writes lazily.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(600))
    }
}

fn hash_text(text: &str) -> u64 {
    use std::collections::hash_map::DefaultHasher;
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}
