// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Gateway bridge state.
//!
//! Two designated nodes, one per subnet, share a gateway keypair and each
//! other's endpoints. Interests for names under the configured gateway
//! prefix are tunnelled to the peer as `EG` frames; answers come back as
//! `EG_REPLY` frames. Two tables track the bridge's two directions:
//!
//! - **GPIT** (keyed by name): interests from the local mesh that were
//!   tunnelled out, remembering which downstream neighbor gets the DATA
//!   when the reply arrives.
//! - **client requests** (keyed by name + request-id): interests this
//!   gateway re-originated into its own mesh on behalf of the peer; when
//!   the origination is answered, the payload goes back over the bridge
//!   instead of to a local consumer.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use crate::crypto::NodeKeys;

/// GPIT value: the attempt identifiers plus the downstream neighbor label.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GpitEntry {
    pub rid: String,
    pub retry: u32,
    pub upstream: u32,
}

/// Bridge state for one gateway node.
pub struct GatewayBridge {
    keys: NodeKeys,
    peer_host: String,
    peer_port: u16,
    prefix: String,
    gpit: Mutex<HashMap<String, GpitEntry>>,
    client_requests: Mutex<HashSet<(String, String)>>,
}

impl GatewayBridge {
    pub fn new(keys: NodeKeys, peer_host: String, peer_port: u16, prefix: String) -> Self {
        Self {
            keys,
            peer_host,
            peer_port,
            prefix,
            gpit: Mutex::new(HashMap::new()),
            client_requests: Mutex::new(HashSet::new()),
        }
    }

    /// Shared gateway keypair (both peers hold the same one).
    pub fn keys(&self) -> &NodeKeys {
        &self.keys
    }

    /// Peer gateway endpoint.
    pub fn peer(&self) -> (&str, u16) {
        (&self.peer_host, self.peer_port)
    }

    /// Whether `name` is foreign, i.e. belongs across the bridge.
    pub fn matches(&self, name: &str) -> bool {
        name.starts_with(&self.prefix)
    }

    /// Record a foreign interest about to be tunnelled. Returns false if the
    /// name is already pending (the interest is not tunnelled twice).
    pub fn record_foreign_interest(&self, name: &str, entry: GpitEntry) -> bool {
        let mut gpit = self.gpit.lock();
        if gpit.contains_key(name) {
            return false;
        }
        gpit.insert(name.to_string(), entry);
        true
    }

    /// Whether a pending tunnelled interest for `name` matches the given
    /// attempt identifiers.
    pub fn match_pending(&self, name: &str, rid: &str, retry: u32) -> bool {
        self.gpit
            .lock()
            .get(name)
            .map(|entry| entry.rid == rid && entry.retry == retry)
            .unwrap_or(false)
    }

    /// Remove and return the pending entry for `name` (reply arrived).
    pub fn take_pending(&self, name: &str) -> Option<GpitEntry> {
        self.gpit.lock().remove(name)
    }

    /// Number of pending tunnelled interests.
    pub fn pending_len(&self) -> usize {
        self.gpit.lock().len()
    }

    /// Remember that (name, rid) was re-originated here on the peer's
    /// behalf.
    pub fn record_client_request(&self, name: &str, rid: &str) {
        self.client_requests
            .lock()
            .insert((name.to_string(), rid.to_string()));
    }

    /// Consume the client-request marker, if present. True means the
    /// answered DATA belongs to the peer gateway, not a local consumer.
    pub fn take_client_request(&self, name: &str, rid: &str) -> bool {
        self.client_requests
            .lock()
            .remove(&(name.to_string(), rid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys::keys_a;

    fn bridge() -> GatewayBridge {
        GatewayBridge::new(
            keys_a().clone(),
            "127.0.0.1".to_string(),
            34000,
            "/wristband/".to_string(),
        )
    }

    #[test]
    fn test_prefix_match() {
        let bridge = bridge();
        assert!(bridge.matches("/wristband/pulse"));
        assert!(!bridge.matches("/data/1/pulse"));
        assert_eq!(bridge.peer(), ("127.0.0.1", 34000));
    }

    #[test]
    fn test_foreign_interest_recorded_once() {
        let bridge = bridge();
        let entry = GpitEntry {
            rid: "aB9x2".to_string(),
            retry: 0,
            upstream: 3,
        };
        assert!(bridge.record_foreign_interest("/wristband/pulse", entry.clone()));
        // Second arrival of the same name is not tunnelled again
        assert!(!bridge.record_foreign_interest(
            "/wristband/pulse",
            GpitEntry {
                rid: "Zq77p".to_string(),
                retry: 0,
                upstream: 4,
            }
        ));
        assert!(bridge.match_pending("/wristband/pulse", "aB9x2", 0));
        assert!(!bridge.match_pending("/wristband/pulse", "Zq77p", 0));
        assert!(!bridge.match_pending("/wristband/pulse", "aB9x2", 1));

        let taken = bridge.take_pending("/wristband/pulse").expect("entry");
        assert_eq!(taken, entry);
        assert_eq!(bridge.pending_len(), 0);
        assert!(bridge.take_pending("/wristband/pulse").is_none());
    }

    #[test]
    fn test_client_request_consumed_once() {
        let bridge = bridge();
        bridge.record_client_request("/wristband/pulse", "aB9x2");
        assert!(bridge.take_client_request("/wristband/pulse", "aB9x2"));
        assert!(!bridge.take_client_request("/wristband/pulse", "aB9x2"));
        assert!(!bridge.take_client_request("/wristband/pulse", "other"));
    }
}
