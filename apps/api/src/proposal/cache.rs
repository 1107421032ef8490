//! Response cache — bounded, time-expiring, keyed by a request fingerprint.
//!
//! Eviction is strict FIFO by insertion order: a hit does not refresh an
//! entry's age, and overflow removes the oldest-inserted entry. Expired
//! entries count as misses and are purged lazily on touch.
//!
//! Uses `tokio::time::Instant` so TTL behaviour is testable under the
//! paused test clock.

use std::collections::HashMap;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::CacheConfig;
use crate::proposal::models::{ProposalRequest, ProposalResponse};

/// Deterministic fingerprint of a normalized request, used as the cache key.
///
/// Normalization: every text field is whitespace-trimmed and the category is
/// reduced to its canonical lowercase label. Fields are hashed in a fixed
/// order with separators, so two requests with identical normalized content
/// always collide and any content difference never does.
pub fn fingerprint(request: &ProposalRequest) -> String {
    const FIELD_SEP: &[u8] = &[0x1e];
    const ITEM_SEP: &[u8] = &[0x1f];

    let mut hasher = Sha256::new();
    hasher.update(request.job_title.trim().as_bytes());
    hasher.update(FIELD_SEP);
    hasher.update(request.requirements.trim().as_bytes());
    hasher.update(FIELD_SEP);
    hasher.update(request.project_type.label().as_bytes());
    hasher.update(FIELD_SEP);
    for optional in [
        request.budget.as_deref(),
        request.timeline.as_deref(),
        request.additional_context.as_deref(),
    ] {
        hasher.update(optional.map(str::trim).unwrap_or_default().as_bytes());
        hasher.update(FIELD_SEP);
    }
    for item in &request.requirement_items {
        hasher.update(item.trim().as_bytes());
        hasher.update(ITEM_SEP);
    }
    format!("{:x}", hasher.finalize())
}

struct CacheEntry {
    response: ProposalResponse,
    inserted_at: Instant,
    /// Monotonic insertion sequence — the FIFO eviction order.
    seq: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    next_seq: u64,
}

/// Bounded TTL cache for generated proposals, safe for concurrent access.
/// With caching disabled, `lookup` always misses and `store` is a no-op.
pub struct ResponseCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    fn ttl(&self) -> Duration {
        Duration::from_secs(self.config.ttl_minutes * 60)
    }

    /// Returns the cached response for `key`, treating expired entries as
    /// absent (and purging them on touch).
    pub async fn lookup(&self, key: &str) -> Option<ProposalResponse> {
        if !self.config.enabled {
            return None;
        }
        let ttl = self.ttl();
        let mut inner = self.inner.lock().await;
        match inner.entries.get(key) {
            Some(entry) if entry.inserted_at.elapsed() <= ttl => {
                return Some(entry.response.clone());
            }
            Some(_) => {}
            None => return None,
        }
        // Lazy purge on touch: an expired entry is treated as absent.
        inner.entries.remove(key);
        debug!("cache entry expired for key {key}");
        None
    }

    /// Inserts or overwrites the entry for `key`. When the insert pushes the
    /// cache over capacity, the single oldest-inserted entry is evicted.
    pub async fn store(&self, key: &str, response: &ProposalResponse) {
        if !self.config.enabled {
            return;
        }
        let mut inner = self.inner.lock().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            key.to_string(),
            CacheEntry {
                response: response.clone(),
                inserted_at: Instant::now(),
                seq,
            },
        );

        if inner.entries.len() > self.config.max_entries {
            if let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.seq)
                .map(|(key, _)| key.clone())
            {
                inner.entries.remove(&oldest);
                debug!("cache evicted oldest entry {oldest}");
            }
        }
    }
}
