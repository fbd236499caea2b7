//! In-process completion cache and content-hash derivation.
//!
//! The cache maps a content hash to the last completion produced for it,
//! letting every member of a dedup group reuse the representative's
//! summary. The same hash is persisted on the summary record, so a fresh
//! process warms from the store transparently.

use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

/// A completed summary+translation pair, cacheable by content hash.
#[derive(Debug, Clone)]
pub struct CachedCompletion {
    /// Generated summary text.
    pub summary_text: String,
    /// Generated translation, if any.
    pub translation_text: Option<String>,
    /// Provider that produced the pair.
    pub provider: String,
    /// Model identifier.
    pub model: String,
    /// Whether the summary came from an LLM (false for pass-through).
    pub is_generated: bool,
}

/// Derive the cache key for a tweet.
///
/// Members of a dedup group share the representative's key, so one LLM
/// call serves the whole group. Standalone tweets key on their own id.
pub fn content_hash(
    tweet_id: &str,
    dedup: Option<(&str, &str)>, // (dedup_type, representative_tweet_id)
) -> String {
    let key = match dedup {
        Some((dedup_type, representative)) => format!("{dedup_type}:{representative}"),
        None => format!("standalone:{tweet_id}"),
    };
    hex::encode(Sha256::digest(key.as_bytes()))
}

/// Volatile cache of completions by content hash.
///
/// Readers don't block each other; writers are serialised. Unbounded for
/// the process lifetime and reset on restart; the persisted
/// `content_hash` column covers cross-restart reuse.
#[derive(Default)]
pub struct SummaryCache {
    inner: RwLock<HashMap<String, CachedCompletion>>,
}

impl SummaryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a completion by content hash.
    pub fn get(&self, hash: &str) -> Option<CachedCompletion> {
        self.inner
            .read()
            .ok()
            .and_then(|map| map.get(hash).cloned())
    }

    /// Store a completion.
    pub fn insert(&self, hash: String, completion: CachedCompletion) {
        if let Ok(mut map) = self.inner.write() {
            map.insert(hash, completion);
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.read().map(|map| map.len()).unwrap_or(0)
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion(text: &str) -> CachedCompletion {
        CachedCompletion {
            summary_text: text.to_string(),
            translation_text: None,
            provider: "minimax".to_string(),
            model: "test".to_string(),
            is_generated: true,
        }
    }

    #[test]
    fn standalone_and_group_keys_differ() {
        let standalone = content_hash("t1", None);
        let grouped = content_hash("t1", Some(("exact_duplicate", "t1")));
        assert_ne!(standalone, grouped);
        // Hashes are hex SHA-256.
        assert_eq!(standalone.len(), 64);
    }

    #[test]
    fn group_members_share_key() {
        let a = content_hash("t1", Some(("similar_content", "rep")));
        let b = content_hash("t2", Some(("similar_content", "rep")));
        assert_eq!(a, b);
    }

    #[test]
    fn group_type_is_part_of_key() {
        let exact = content_hash("t1", Some(("exact_duplicate", "rep")));
        let similar = content_hash("t1", Some(("similar_content", "rep")));
        assert_ne!(exact, similar);
    }

    #[test]
    fn insert_and_get() {
        let cache = SummaryCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("h1").is_none());

        cache.insert("h1".to_string(), completion("cached"));
        let hit = cache.get("h1").expect("hit");
        assert_eq!(hit.summary_text, "cached");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn insert_overwrites() {
        let cache = SummaryCache::new();
        cache.insert("h1".to_string(), completion("old"));
        cache.insert("h1".to_string(), completion("new"));
        assert_eq!(cache.get("h1").expect("hit").summary_text, "new");
        assert_eq!(cache.len(), 1);
    }
}
