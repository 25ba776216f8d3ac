//! Two-tier content-addressed response cache (C4).
//!
//! Both the chat cache and the comparison cache are instances of the same
//! generic [`ContentCache<V>`]: an `RwLock<HashMap<..>>` with atomic
//! hit/miss/eviction counters, generalized from a single embedding-keyed
//! LRU into a TTL-keyed store parameterized over payload type.
//!
//! # Cache key derivation (§6, bit-exact)
//!
//! Question normalization: NFC Unicode normalization, lowercase
//! (Unicode-aware), trim, collapse internal whitespace runs to one space.
//! Hashing: SHA-256, hex-encoded. The composite params hash concatenates
//! `question_norm ‖ "|" ‖ (party ?? "all") ‖ "|" ‖ topK ‖ "|" ‖ minScore`
//! before hashing, so the question hash alone and the params hash together
//! form the two-part key `(question_hash, params_hash)` — the sole key
//! shape implemented (§9).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Statistics for one cache instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total live entries.
    pub total: usize,
    /// Entries with a past `expires_at` observed during stats collection
    /// (not yet swept by `cleanup`).
    pub expired: usize,
    /// Entries with no expiration.
    pub never_expires: usize,
    /// Cumulative hits since process start.
    pub hits: u64,
    /// Cumulative misses since process start.
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Normalize a question per §6: NFC, lowercase, trim, collapse whitespace.
pub fn normalize_question(question: &str) -> String {
    let nfc: String = question.nfc().collect();
    let lower = nfc.to_lowercase();
    lower.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of the normalized question alone.
pub fn question_hash(question: &str) -> String {
    sha256_hex(&normalize_question(question))
}

/// Composite params hash: `question_norm|party|topK|minScore`.
pub fn chat_params_hash(question: &str, party: Option<&str>, top_k: usize, min_score: f32) -> String {
    let composite = format!(
        "{}|{}|{}|{}",
        normalize_question(question),
        party.unwrap_or("all"),
        top_k,
        min_score
    );
    sha256_hex(&composite)
}

/// Hash of a normalized comparison topic alone.
pub fn topic_hash(topic: &str) -> String {
    sha256_hex(&normalize_question(topic))
}

/// Hash of the sorted, comma-joined party id list.
pub fn parties_hash(party_ids: &[String]) -> String {
    let mut sorted = party_ids.to_vec();
    sorted.sort();
    sha256_hex(&sorted.join(","))
}

/// The two-part cache key shape used by both the chat and comparison caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Hash of the normalized question/topic alone.
    pub primary: String,
    /// Hash disambiguating by retrieval parameters / party set.
    pub secondary: String,
}

struct Entry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Option<DateTime<Utc>>,
}

/// Generic content-addressed cache with optional per-entry TTL.
///
/// Concurrent `put`s with identical keys resolve last-write-wins; no
/// single-flight consolidation (§4.4): duplicate compute on a cold key is
/// acceptable.
pub struct ContentCache<V: Clone + Send + Sync> {
    entries: RwLock<HashMap<CacheKey, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<V: Clone + Send + Sync> ContentCache<V> {
    /// Construct an empty cache.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up `key`. If the stored entry is expired, it is deleted and a
    /// miss is returned (lazy expiration per §3 CacheEntry lifecycle).
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        {
            let entries = self.entries.read();
            if let Some(entry) = entries.get(key) {
                if !is_expired(entry) {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
            } else {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        }
        // Expired: upgrade to a write lock and delete.
        let mut entries = self.entries.write();
        entries.remove(key);
        self.misses.fetch_add(1, Ordering::Relaxed);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Insert or overwrite `key`. `ttl = None` means no expiration.
    pub fn put(&self, key: CacheKey, value: V, ttl: Option<Duration>) {
        let expires_at = ttl.map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());
        let mut entries = self.entries.write();
        entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                expires_at,
            },
        );
    }

    /// Remove `key` unconditionally.
    pub fn invalidate(&self, key: &CacheKey) {
        self.entries.write().remove(key);
    }

    /// Bulk-delete expired entries, returning the number removed.
    pub fn cleanup(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !is_expired(entry));
        let removed = before - entries.len();
        self.evictions.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    /// Snapshot statistics.
    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.read();
        let expired = entries.values().filter(|e| is_expired(e)).count();
        let never_expires = entries.values().filter(|e| e.expires_at.is_none()).count();
        CacheStats {
            total: entries.len(),
            expired,
            never_expires,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone + Send + Sync> Default for ContentCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired<V>(entry: &Entry<V>) -> bool {
    match entry.expires_at {
        Some(exp) => Utc::now() >= exp,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace_and_case() {
        assert_eq!(
            normalize_question("  Qué   Propone   el  Gobierno? "),
            "qué propone el gobierno?"
        );
    }

    #[test]
    fn cache_key_determinism_under_whitespace_perturbation() {
        let a = chat_params_hash("Hola Mundo", Some("pln"), 5, 0.35);
        let b = chat_params_hash("  hola   mundo  ", Some("pln"), 5, 0.35);
        assert_eq!(a, b);
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache: ContentCache<String> = ContentCache::new();
        let key = CacheKey {
            primary: question_hash("hola"),
            secondary: chat_params_hash("hola", None, 5, 0.35),
        };
        cache.put(key.clone(), "respuesta".to_string(), None);
        assert_eq!(cache.get(&key), Some("respuesta".to_string()));
    }

    #[test]
    fn expired_entry_is_lazily_removed() {
        let cache: ContentCache<String> = ContentCache::new();
        let key = CacheKey {
            primary: "p".into(),
            secondary: "s".into(),
        };
        cache.put(key.clone(), "v".to_string(), Some(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&key), None);
        assert_eq!(cache.stats().total, 0);
    }

    #[test]
    fn parties_hash_is_order_independent() {
        let a = parties_hash(&["pln".to_string(), "pusc".to_string()]);
        let b = parties_hash(&["pusc".to_string(), "pln".to_string()]);
        assert_eq!(a, b);
    }
}
