use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use crate::error::ValidationError;

/// Default interval between background sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct StateEntry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> StateEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now > at)
    }
}

/// Convert a script TTL in seconds to an expiry offset. Zero or negative
/// means the entry never expires; a TTL past what the clock can represent is
/// rejected.
pub fn ttl_from_secs(secs: f64) -> Result<Option<Duration>, ValidationError> {
    if secs.is_nan() {
        return Err(ValidationError::new("ttl must be a number"));
    }
    if secs <= 0.0 {
        return Ok(None);
    }
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|ttl| Instant::now().checked_add(*ttl).is_some())
        .map(Some)
        .ok_or_else(|| ValidationError::new(format!("ttl of {} seconds is too large", secs)))
}

/// Key/value store shared by every script, with optional per-entry expiry
///
/// All reads, writes and sweeps go through one lock. Expired entries are
/// invisible to `get` even before the sweeper removes them.
pub struct StateStore<V> {
    entries: Mutex<HashMap<String, StateEntry<V>>>,
}

impl<V: Clone + Send> StateStore<V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store `value` under `key`, replacing both the value and its expiry
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    pub fn set_at(&self, key: impl Into<String>, value: V, ttl: Option<Duration>, now: Instant) {
        let entry = StateEntry {
            value,
            expires_at: ttl.and_then(|ttl| now.checked_add(ttl)),
        };
        self.entries.lock().insert(key.into(), entry);
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Look up `key` as of `now`, deleting it if it has expired
    pub fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Remove `key` whether or not it has expired
    pub fn clear(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Drop every entry that has expired as of `now`; returns how many
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of physically stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone + Send> Default for StateStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send + Sync + 'static> StateStore<V> {
    /// Start a background thread that sweeps every `interval`.
    ///
    /// The thread stops when the returned guard is dropped or when the store
    /// itself goes away.
    pub fn start_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperGuard {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let store: Weak<Self> = Arc::downgrade(self);

        let spawned = thread::Builder::new()
            .name("tidepool-state-sweep".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(store) = store.upgrade() else {
                            break;
                        };
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(target: "scripting", "State sweep removed {} expired entries", removed);
                        }
                    }
                    _ => break,
                }
            });

        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(e) => {
                error!(target: "scripting", "Failed to start state sweeper: {}", e);
                None
            }
        };

        SweeperGuard {
            stop_tx: Some(stop_tx),
            thread,
        }
    }
}

/// Keeps the sweeper thread running; stops and joins it on drop
pub struct SweeperGuard {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SweeperGuard {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for SweeperGuard {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
