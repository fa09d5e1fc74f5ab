//! Result cache for idempotent function calls
//!
//! Content-addressed and TTL-bound. Keys are a SHA-256 over the server, the
//! function and a canonical rendering of the parameters, so reordered but equal
//! parameter maps collide. When full, the entry with the soonest deadline is
//! evicted (not the least recently used one). Expired entries are dropped
//! lazily on read and by `cleanup_expired`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Cached value with its deadline
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Cached result payload
    pub value: Value,
    /// When this entry was created
    pub created_at: Instant,
    /// First instant at which the entry is no longer served
    pub expires_at: Instant,
    /// Number of times this entry has been served
    pub hit_count: u64,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
        }
    }

    /// Check if this entry is expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Entries currently stored
    pub size: usize,
    /// Capacity
    pub max_size: usize,
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that returned nothing, expired reads included
    pub misses: u64,
    /// Entries removed to make room
    pub evictions: u64,
    /// Entries removed because their deadline passed
    pub expirations: u64,
    /// All reads
    pub total_requests: u64,
    /// hits / total_requests (0.0 to 1.0)
    pub hit_rate: f64,
    /// size / max_size * 100
    pub usage_percent: f64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    total_requests: u64,
}

#[derive(Debug)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    counters: Counters,
    max_size: usize,
}

impl CacheState {
    /// Drop the entry with the earliest deadline; ties break on key order
    fn evict_soonest(&mut self) -> Option<String> {
        let victim = self
            .entries
            .iter()
            .min_by(|(ka, a), (kb, b)| a.expires_at.cmp(&b.expires_at).then_with(|| ka.cmp(kb)))
            .map(|(k, _)| k.clone())?;
        self.entries.remove(&victim);
        self.counters.evictions += 1;
        Some(victim)
    }
}

/// Shared result cache
#[derive(Debug)]
pub struct ResultCache {
    state: Mutex<CacheState>,
}

impl ResultCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                counters: Counters::default(),
                max_size: max_size.max(1),
            }),
        }
    }

    /// Deterministic key for a call
    pub fn key(server: &str, function: &str, params: &Value) -> String {
        let mut canonical = String::new();
        write_canonical(params, &mut canonical);

        let mut hasher = Sha256::new();
        hasher.update(server.as_bytes());
        hasher.update(b":");
        hasher.update(function.as_bytes());
        hasher.update(b":");
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Get a live value. Expired entries are removed and count as misses.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.counters.total_requests += 1;

        let expired = match state.entries.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.hit_count += 1;
                let value = entry.value.clone();
                state.counters.hits += 1;
                debug!("🎯 [CACHE] Hit for key {}", short(key));
                return Some(value);
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            state.entries.remove(key);
            state.counters.expirations += 1;
            debug!("⌛ [CACHE] Entry {} expired", short(key));
        }
        state.counters.misses += 1;
        None
    }

    /// Store a value. A zero TTL stores nothing.
    pub async fn set(&self, key: String, value: Value, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }

        let mut state = self.state.lock().await;
        if !state.entries.contains_key(&key) && state.entries.len() >= state.max_size {
            if let Some(victim) = state.evict_soonest() {
                debug!("🗑️ [CACHE] Evicted {} to make room", short(&victim));
            }
        }
        state.entries.insert(key, CacheEntry::new(value, ttl));
    }

    /// Whether a live entry exists. Does not touch statistics.
    pub async fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().await;
        state.entries.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    pub async fn invalidate(&self, key: &str) -> bool {
        self.state.lock().await.entries.remove(key).is_some()
    }

    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        let count = state.entries.len();
        state.entries.clear();
        info!("🧹 [CACHE] Cleared {} entries", count);
    }

    /// Remove every expired entry, returning how many were dropped
    pub async fn cleanup_expired(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let before = state.entries.len();
        state.entries.retain(|_, entry| now < entry.expires_at);
        let removed = before - state.entries.len();
        state.counters.expirations += removed as u64;
        if removed > 0 {
            debug!("🧹 [CACHE] Swept {} expired entries", removed);
        }
        removed
    }

    /// Change capacity, evicting soonest-deadline entries if now over capacity
    pub async fn set_max_size(&self, max_size: usize) {
        let mut state = self.state.lock().await;
        state.max_size = max_size.max(1);
        while state.entries.len() > state.max_size {
            if state.evict_soonest().is_none() {
                break;
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let counters = &state.counters;
        let size = state.entries.len();
        CacheStats {
            size,
            max_size: state.max_size,
            hits: counters.hits,
            misses: counters.misses,
            evictions: counters.evictions,
            expirations: counters.expirations,
            total_requests: counters.total_requests,
            hit_rate: if counters.total_requests > 0 {
                counters.hits as f64 / counters.total_requests as f64
            } else {
                0.0
            },
            usage_percent: size as f64 / state.max_size as f64 * 100.0,
        }
    }
}

fn short(key: &str) -> &str {
    &key[..key.len().min(12)]
}

/// JSON rendering with object keys sorted at every level
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
