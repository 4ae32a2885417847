use std::sync::atomic::{AtomicUsize, Ordering};

use super::Capability;

/// Ordered credentials for one capability plus the index of the last key that
/// produced a verified success. The index is the only state shared between
/// concurrent sessions; a lost update only costs key affinity.
#[derive(Debug)]
pub struct KeyPool {
    capability: Capability,
    keys: Vec<String>,
    last_successful: AtomicUsize,
}

impl KeyPool {
    pub fn new(capability: Capability, keys: Vec<String>) -> Self {
        let keys = keys
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();

        Self {
            capability,
            keys,
            last_successful: AtomicUsize::new(0),
        }
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key(&self, index: usize) -> Option<&str> {
        self.keys.get(index).map(String::as_str)
    }

    pub fn last_successful_index(&self) -> usize {
        self.last_successful.load(Ordering::Acquire)
    }

    /// Resolve where a rotation begins: the caller's index when it is in
    /// range, otherwise the last successful one.
    pub fn start_index(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(index) if index < self.keys.len() => index,
            _ => {
                let last = self.last_successful_index();
                if last < self.keys.len() { last } else { 0 }
            }
        }
    }

    /// Index of the `attempt`-th key when rotating from `start`.
    pub fn rotate(&self, start: usize, attempt: usize) -> usize {
        if self.keys.is_empty() {
            return 0;
        }
        (start + attempt) % self.keys.len()
    }

    /// Record a verified success. Out-of-range indexes are ignored so the
    /// stored index always stays inside `[0, len)`.
    pub fn record_success(&self, index: usize) {
        if index < self.keys.len() {
            self.last_successful.store(index, Ordering::Release);
        }
    }
}
