//! In-memory lock service.
//!
//! Locks are map entries keyed by lock key, valued by creation time.
//! TTL expiry is not simulated (tests stage expiry by deleting entries);
//! creation times can be backdated to put locks past the reaper's grace
//! period. Every release call is recorded so exactly-once assertions are
//! possible.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use recording_controller::clients::lock::{LockEntry, LockService};
use recording_controller::errors::RecorderError;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Default)]
struct LockState {
    locks: HashMap<String, DateTime<Utc>>,
    release_calls: Vec<String>,
    /// Keys whose operations fail with `RecorderError::Lock`, for error
    /// isolation tests.
    failing_keys: HashSet<String>,
}

/// In-memory [`LockService`] implementation.
#[derive(Clone, Default)]
pub struct MockLockService {
    state: Arc<Mutex<LockState>>,
}

impl MockLockService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap()
    }

    /// Stage a held lock created `age` ago.
    pub fn insert_lock_aged(&self, key: &str, age: Duration) {
        let created_at = Utc::now()
            - ChronoDuration::from_std(age).expect("age out of chrono range");
        self.state().locks.insert(key.to_string(), created_at);
    }

    /// Move an existing lock's creation time `age` into the past.
    pub fn backdate(&self, key: &str, age: Duration) {
        let created_at = Utc::now()
            - ChronoDuration::from_std(age).expect("age out of chrono range");
        if let Some(existing) = self.state().locks.get_mut(key) {
            *existing = created_at;
        }
    }

    /// Make every operation on `key` fail.
    pub fn fail_operations_on(&self, key: &str) {
        self.state().failing_keys.insert(key.to_string());
    }

    #[must_use]
    pub fn is_held(&self, key: &str) -> bool {
        self.state().locks.contains_key(key)
    }

    /// Every key `release` was called with, in order.
    #[must_use]
    pub fn release_calls(&self) -> Vec<String> {
        self.state().release_calls.clone()
    }

    /// How many times `release` was called for `key`.
    #[must_use]
    pub fn release_call_count(&self, key: &str) -> usize {
        self.state()
            .release_calls
            .iter()
            .filter(|k| k.as_str() == key)
            .count()
    }
}

#[async_trait]
impl LockService for MockLockService {
    async fn acquire(&self, key: &str, _ttl: Duration) -> Result<bool, RecorderError> {
        let mut state = self.state();
        if state.failing_keys.contains(key) {
            return Err(RecorderError::Lock(format!("mock failure on {key}")));
        }
        if state.locks.contains_key(key) {
            return Ok(false);
        }
        state.locks.insert(key.to_string(), Utc::now());
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<(), RecorderError> {
        let mut state = self.state();
        state.release_calls.push(key.to_string());
        if state.failing_keys.contains(key) {
            return Err(RecorderError::Lock(format!("mock failure on {key}")));
        }
        state.locks.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, RecorderError> {
        let state = self.state();
        if state.failing_keys.contains(key) {
            return Err(RecorderError::Lock(format!("mock failure on {key}")));
        }
        Ok(state.locks.contains_key(key))
    }

    async fn created_at(&self, key: &str) -> Result<Option<DateTime<Utc>>, RecorderError> {
        let state = self.state();
        if state.failing_keys.contains(key) {
            return Err(RecorderError::Lock(format!("mock failure on {key}")));
        }
        Ok(state.locks.get(key).copied())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<LockEntry>, RecorderError> {
        Ok(self
            .state()
            .locks
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, created_at)| LockEntry {
                key: key.clone(),
                created_at: *created_at,
            })
            .collect())
    }
}
