// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Table of interests this node itself originated.
//!
//! Serves two purposes in the forwarding plane: origin loop prevention (an
//! inbound INTEREST matching one of our own originations is dropped rather
//! than inserted into the PIT) and round-trip accounting (the first matching
//! DATA flips the entry to answered and yields the elapsed time; later
//! duplicates are not re-surfaced).

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Origination {
    answered: bool,
    started: Instant,
}

/// Keyed by (data-name, request-id).
pub struct OriginatorTable {
    entries: Mutex<HashMap<(String, String), Origination>>,
}

impl OriginatorTable {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Record a fresh origination, unanswered, clock started now.
    pub fn record(&self, name: &str, rid: &str) {
        self.entries.lock().insert(
            (name.to_string(), rid.to_string()),
            Origination {
                answered: false,
                started: Instant::now(),
            },
        );
    }

    /// Whether (name, rid) was originated here (answered or not).
    pub fn contains(&self, name: &str, rid: &str) -> bool {
        self.entries
            .lock()
            .contains_key(&(name.to_string(), rid.to_string()))
    }

    /// Flip the entry to answered. Returns the round-trip time on the FIRST
    /// matching DATA, `None` if the entry is absent or already answered.
    pub fn mark_answered(&self, name: &str, rid: &str) -> Option<Duration> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&(name.to_string(), rid.to_string()))?;
        if entry.answered {
            return None;
        }
        entry.answered = true;
        Some(entry.started.elapsed())
    }

    /// Whether (name, rid) has been answered.
    pub fn is_answered(&self, name: &str, rid: &str) -> bool {
        self.entries
            .lock()
            .get(&(name.to_string(), rid.to_string()))
            .map(|entry| entry.answered)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for OriginatorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_answer_once() {
        let table = OriginatorTable::new();
        table.record("/data/1/ecg", "aB9x2");
        assert!(table.contains("/data/1/ecg", "aB9x2"));
        assert!(!table.is_answered("/data/1/ecg", "aB9x2"));

        let rtt = table.mark_answered("/data/1/ecg", "aB9x2");
        assert!(rtt.is_some());
        assert!(table.is_answered("/data/1/ecg", "aB9x2"));

        // Duplicate DATA is not re-surfaced
        assert!(table.mark_answered("/data/1/ecg", "aB9x2").is_none());
    }

    #[test]
    fn test_unknown_entry() {
        let table = OriginatorTable::new();
        assert!(!table.contains("/data/1/ecg", "aB9x2"));
        assert!(table.mark_answered("/data/1/ecg", "aB9x2").is_none());
    }

    #[test]
    fn test_rid_distinguishes_originations() {
        let table = OriginatorTable::new();
        table.record("/data/1/ecg", "aB9x2");
        table.record("/data/1/ecg", "Zq77p");
        assert!(table.mark_answered("/data/1/ecg", "aB9x2").is_some());
        // The other attempt is still pending
        assert!(!table.is_answered("/data/1/ecg", "Zq77p"));
        assert_eq!(table.len(), 2);
    }
}
