// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pending Interest Table.
//!
//! Keyed by (name, request-id, retry-index); the value is the label of the
//! upstream neighbor the eventual DATA must be returned to. Insertion of an
//! already-present key fails, which is how duplicate interests arriving over
//! loops or parallel paths are suppressed. Consumption is a single atomic
//! `take`: the first matching DATA wins, any later one finds no entry and is
//! dropped.
//!
//! There is no time-based expiry. A stale entry becomes harmless when its
//! upstream neighbor ages out of the FIB -- late DATA then has no endpoint
//! to go to and is dropped.

use parking_lot::Mutex;
use std::collections::HashMap;

/// PIT key: one attempt of one request for one name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PitKey {
    pub name: String,
    pub rid: String,
    pub retry: u32,
}

impl PitKey {
    pub fn new(name: &str, rid: &str, retry: u32) -> Self {
        Self {
            name: name.to_string(),
            rid: rid.to_string(),
            retry,
        }
    }
}

/// Keyed table of outstanding interests.
pub struct Pit {
    entries: Mutex<HashMap<PitKey, u32>>,
}

impl Pit {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn contains(&self, key: &PitKey) -> bool {
        self.entries.lock().contains_key(key)
    }

    /// Record `upstream` as the return path for `key`. Returns false (and
    /// leaves the original untouched) if the key is already pending.
    pub fn insert(&self, key: PitKey, upstream: u32) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&key) {
            return false;
        }
        entries.insert(key, upstream);
        true
    }

    /// Atomically remove and return the upstream label for `key`.
    pub fn take(&self, key: &PitKey) -> Option<u32> {
        self.entries.lock().remove(key)
    }

    /// Snapshot for telemetry.
    pub fn snapshot(&self) -> Vec<(PitKey, u32)> {
        self.entries
            .lock()
            .iter()
            .map(|(key, upstream)| (key.clone(), *upstream))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for Pit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_take() {
        let pit = Pit::new();
        let key = PitKey::new("/data/2/glucose", "aB9x2", 0);
        assert!(pit.insert(key.clone(), 1));
        assert!(pit.contains(&key));
        assert_eq!(pit.take(&key), Some(1));
        assert!(!pit.contains(&key));
        // Second take misses: exactly one DATA goes downstream
        assert_eq!(pit.take(&key), None);
    }

    #[test]
    fn test_duplicate_insert_rejected_keeps_first_upstream() {
        let pit = Pit::new();
        let key = PitKey::new("/data/2/glucose", "aB9x2", 0);
        assert!(pit.insert(key.clone(), 1));
        // Same interest from a second neighbor within the window
        assert!(!pit.insert(key.clone(), 3));
        assert_eq!(pit.take(&key), Some(1));
    }

    #[test]
    fn test_retry_index_distinguishes_attempts() {
        let pit = Pit::new();
        assert!(pit.insert(PitKey::new("/data/2/glucose", "aB9x2", 0), 1));
        // Reissue with bumped retry is a fresh key, not a duplicate
        assert!(pit.insert(PitKey::new("/data/2/glucose", "aB9x2", 1), 1));
        assert_eq!(pit.len(), 2);
    }

    #[test]
    fn test_different_rids_are_independent() {
        let pit = Pit::new();
        assert!(pit.insert(PitKey::new("/data/2/glucose", "aB9x2", 0), 1));
        assert!(pit.insert(PitKey::new("/data/2/glucose", "Zq77p", 0), 2));
        assert_eq!(pit.take(&PitKey::new("/data/2/glucose", "Zq77p", 0)), Some(2));
        assert_eq!(pit.take(&PitKey::new("/data/2/glucose", "aB9x2", 0)), Some(1));
    }

    #[test]
    fn test_take_missing() {
        let pit = Pit::new();
        assert_eq!(pit.take(&PitKey::new("/x", "aaaaa", 0)), None);
        assert!(pit.is_empty());
    }
}
