use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time-bounded suppression map for duplicate dispatch.
///
/// A key is `"{subject} {event_id}"`; while an entry is present it blocks
/// every further dispatch for that key, not just one rule. Entries either
/// live until an explicit [`release`](Self::release) or expire after the
/// TTL passed to [`try_lock_for`](Self::try_lock_for).
///
/// Expiry is enforced twice: a fire-and-forget timer removes the entry in
/// the background, and [`try_lock`](Self::try_lock) treats an expired entry
/// as absent, so the semantics hold even without a running timer.
///
/// # Examples
///
/// ```
/// use jobmon_monitor::debounce::DebounceStore;
///
/// let store = DebounceStore::new();
/// assert!(store.try_lock("etl.load 102"));
/// assert!(!store.try_lock("etl.load 102"));
/// assert!(store.release("etl.load 102"));
/// assert!(store.try_lock("etl.load 102"));
/// ```
#[derive(Clone, Default)]
pub struct DebounceStore {
    entries: Arc<Mutex<HashMap<String, Option<Instant>>>>,
}

impl DebounceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically inserts the key if absent, with no expiry. Returns
    /// whether the insertion succeeded.
    pub fn try_lock(&self, key: &str) -> bool {
        self.insert(key, None)
    }

    /// Same as [`try_lock`](Self::try_lock) but the entry is removed
    /// automatically after `ttl`. The removal timer is fire-and-forget and
    /// never awaited by shutdown.
    pub fn try_lock_for(&self, key: &str, ttl: Duration) -> bool {
        let acquired = self.insert(key, Some(Instant::now() + ttl));
        if acquired {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let entries = Arc::clone(&self.entries);
                let key = key.to_string();
                handle.spawn(async move {
                    tokio::time::sleep(ttl).await;
                    let mut entries = entries.lock().unwrap();
                    // Only reap the entry we created; a release + re-lock in
                    // the meantime replaced it with a newer expiry
                    if let Some(Some(expiry)) = entries.get(&key) {
                        if *expiry <= Instant::now() {
                            entries.remove(&key);
                        }
                    }
                });
            }
        }
        acquired
    }

    /// Removes the key immediately. Returns whether a live entry was
    /// present.
    pub fn release(&self, key: &str) -> bool {
        match self.entries.lock().unwrap().remove(key) {
            Some(Some(expiry)) => expiry > Instant::now(),
            Some(None) => true,
            None => false,
        }
    }

    /// Whether a live (non-expired) entry currently blocks this key.
    pub fn locked(&self, key: &str) -> bool {
        match self.entries.lock().unwrap().get(key) {
            Some(Some(expiry)) => *expiry > Instant::now(),
            Some(None) => true,
            None => false,
        }
    }

    fn insert(&self, key: &str, expiry: Option<Instant>) -> bool {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            // Expired entry: treat as absent
            Some(Some(existing)) if *existing <= Instant::now() => {
                entries.insert(key.to_string(), expiry);
                true
            }
            Some(_) => false,
            None => {
                entries.insert(key.to_string(), expiry);
                true
            }
        }
    }
}

/// Builds the composite suppression key for a subject/event pair.
pub fn debounce_key(subject: &str, event_id: i32) -> String {
    format!("{subject} {event_id}")
}
