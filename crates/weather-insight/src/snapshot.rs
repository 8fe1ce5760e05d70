//! In-memory forecast snapshots with a fixed time-to-live.
//!
//! The entry map sits behind one `parking_lot::Mutex`. The lock is released
//! while `fetch_fn` runs, so two callers that miss on the same key may both
//! fetch; whichever stores last wins. Payloads are shared as `Arc<T>` and an
//! entry is only ever replaced wholesale.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::model::{CacheMetadata, FreshnessStatus};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub location: String,
    pub day_count: u8,
}

impl SnapshotKey {
    pub fn new(location: &str, day_count: u8) -> Self {
        Self {
            location: location.trim().to_ascii_lowercase(),
            day_count,
        }
    }

    pub fn label(&self) -> String {
        format!("{}-{}d", slugify(&self.location), self.day_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub age_secs: u64,
    pub is_fresh: bool,
}

/// A payload handed out by the store together with how it was obtained.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    pub payload: Arc<T>,
    pub fetched_at: DateTime<Utc>,
    pub cache: CacheMetadata,
}

struct CacheEntry<T> {
    payload: Arc<T>,
    fetched_at: DateTime<Utc>,
}

pub struct SnapshotStore<T> {
    entries: Mutex<HashMap<SnapshotKey, CacheEntry<T>>>,
    ttl_secs: u64,
    now_fn: Clock,
}

impl<T> fmt::Debug for SnapshotStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("ttl_secs", &self.ttl_secs)
            .field("entries", &self.len())
            .finish()
    }
}

impl<T> SnapshotStore<T> {
    pub fn new(ttl_secs: u64) -> Self {
        Self::with_clock(ttl_secs, Utc::now)
    }

    pub fn with_clock<N>(ttl_secs: u64, now_fn: N) -> Self
    where
        N: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl_secs,
            now_fn: Box::new(now_fn),
        }
    }

    /// Returns the cached payload for `(location, day_count)` while it is
    /// fresh, otherwise calls `fetch_fn` and stores its result.
    ///
    /// Errors from `fetch_fn` are returned untouched and never cached; an
    /// expired entry is not served as a fallback.
    pub fn get_or_fetch<F, E>(
        &self,
        location: &str,
        day_count: u8,
        fetch_fn: F,
    ) -> Result<Snapshot<T>, E>
    where
        F: FnOnce(&str, u8) -> Result<T, E>,
    {
        let key = SnapshotKey::new(location, day_count);
        let now = (self.now_fn)();

        if let Some(snapshot) = self.fresh_snapshot(&key, now) {
            tracing::debug!(key = %key.label(), age_secs = snapshot.cache.age_secs, "snapshot cache hit");
            return Ok(snapshot);
        }

        tracing::debug!(key = %key.label(), "snapshot cache miss");
        let payload = Arc::new(fetch_fn(location.trim(), day_count)?);
        let fetched_at = (self.now_fn)();

        self.entries.lock().insert(
            key.clone(),
            CacheEntry {
                payload: Arc::clone(&payload),
                fetched_at,
            },
        );
        tracing::info!(key = %key.label(), "stored fresh snapshot");

        Ok(Snapshot {
            payload,
            fetched_at,
            cache: self.metadata(&key, FreshnessStatus::Live, 0),
        })
    }

    /// Freshness of the entry for `(location, day_count)`, if one exists.
    pub fn peek(&self, location: &str, day_count: u8) -> Option<Freshness> {
        let key = SnapshotKey::new(location, day_count);
        let now = (self.now_fn)();
        let entries = self.entries.lock();
        entries
            .get(&key)
            .map(|entry| evaluate_freshness(entry.fetched_at, now, self.ttl_secs))
    }

    pub fn invalidate(&self, location: &str, day_count: u8) -> bool {
        let key = SnapshotKey::new(location, day_count);
        self.entries.lock().remove(&key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn fresh_snapshot(&self, key: &SnapshotKey, now: DateTime<Utc>) -> Option<Snapshot<T>> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        let freshness = evaluate_freshness(entry.fetched_at, now, self.ttl_secs);
        if !freshness.is_fresh {
            return None;
        }

        Some(Snapshot {
            payload: Arc::clone(&entry.payload),
            fetched_at: entry.fetched_at,
            cache: self.metadata(key, FreshnessStatus::CacheFresh, freshness.age_secs),
        })
    }

    fn metadata(&self, key: &SnapshotKey, status: FreshnessStatus, age_secs: u64) -> CacheMetadata {
        CacheMetadata {
            status,
            key: key.label(),
            ttl_secs: self.ttl_secs,
            age_secs,
        }
    }
}

pub fn evaluate_freshness(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl_secs: u64) -> Freshness {
    let age = now.signed_duration_since(fetched_at);
    let age_millis = u64::try_from(age.num_milliseconds().max(0)).unwrap_or(u64::MAX);

    Freshness {
        age_secs: age_millis / 1_000,
        is_fresh: age_millis <= ttl_secs.saturating_mul(1_000),
    }
}

fn slugify(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_dash = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            prev_dash = false;
            out.push(ch.to_ascii_lowercase());
            continue;
        }

        if !prev_dash {
            out.push('-');
            prev_dash = true;
        }
    }

    out.trim_matches('-').to_string()
}
