// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Neighbor table (FIB) with hello-count aging.
//!
//! An entry exists only for peers that produced at least one authenticated
//! HELLO/HELLO_ACK. Each observed hello bumps the entry's count up to the
//! configured maximum; each aging tick decrements every count by one and
//! evicts entries that reach zero. A peer that keeps beaconing therefore
//! stays pinned near the maximum, and a silent peer disappears after
//! `max_hello_count` ticks.
//!
//! # State machine
//!
//! ```text
//!   absent --(hello)--> present(count=1)
//!   present(c) --(hello)--> present(min(c+1, MAX))
//!   present(c) --(tick)---> present(c-1)
//!   present(0) ------------> absent
//! ```

use parking_lot::Mutex;
use rsa::RsaPublicKey;
use std::collections::HashMap;

/// One reachable neighbor.
#[derive(Clone, Debug)]
pub struct Neighbor {
    /// Transport endpoint the neighbor listens on.
    pub host: String,
    pub port: u16,
    /// Most recently advertised public key (replaced on every hello, so key
    /// rotation is tolerated without an eviction cycle).
    pub public_key: RsaPublicKey,
    /// Opaque certificate bytes as received.
    pub cert: Vec<u8>,
    /// Aging counter, 1..=max_hello_count.
    pub hello_count: u32,
}

/// Keyed neighbor table shared across handler threads and the hello clock.
pub struct Fib {
    entries: Mutex<HashMap<u32, Neighbor>>,
    max_hello_count: u32,
}

impl Fib {
    pub fn new(max_hello_count: u32) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_hello_count,
        }
    }

    /// Create or refresh the entry for `label` from an authenticated hello.
    ///
    /// A new entry starts at count 1; an existing one is bumped (saturating
    /// at the maximum) and gets its endpoint, key, and certificate replaced
    /// with the freshest advertisement.
    pub fn observe_hello(
        &self,
        label: u32,
        host: String,
        port: u16,
        public_key: RsaPublicKey,
        cert: Vec<u8>,
    ) {
        let mut entries = self.entries.lock();
        match entries.get_mut(&label) {
            Some(entry) => {
                entry.hello_count = (entry.hello_count + 1).min(self.max_hello_count);
                entry.host = host;
                entry.port = port;
                entry.public_key = public_key;
                entry.cert = cert;
            }
            None => {
                log::debug!("[fib] new neighbor {} at {}:{}", label, host, port);
                entries.insert(
                    label,
                    Neighbor {
                        host,
                        port,
                        public_key,
                        cert,
                        hello_count: 1,
                    },
                );
            }
        }
    }

    /// One aging tick: decrement every count, evict entries reaching zero.
    /// Returns the evicted labels.
    pub fn tick(&self) -> Vec<u32> {
        let mut entries = self.entries.lock();
        let mut evicted = Vec::new();
        entries.retain(|label, entry| {
            entry.hello_count -= 1;
            if entry.hello_count == 0 {
                evicted.push(*label);
                false
            } else {
                true
            }
        });
        for label in &evicted {
            log::debug!("[fib] neighbor {} aged out", label);
        }
        evicted
    }

    /// Whether `label` is currently reachable.
    pub fn contains(&self, label: u32) -> bool {
        self.entries.lock().contains_key(&label)
    }

    /// Clone of one entry, if present.
    pub fn lookup(&self, label: u32) -> Option<Neighbor> {
        self.entries.lock().get(&label).cloned()
    }

    /// Snapshot of all entries for fan-out. Cloned under the lock so the
    /// caller can iterate and block on TCP without holding it.
    pub fn snapshot(&self) -> Vec<(u32, Neighbor)> {
        self.entries
            .lock()
            .iter()
            .map(|(label, entry)| (*label, entry.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
