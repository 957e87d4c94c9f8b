// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-node telemetry: packet counters, the recent-packets ring, and the
//! snapshot document persisted once per hello tick.
//!
//! Snapshots land as one JSON file per node in the configured stats
//! directory, keyed by node label so the aggregator can merge them into a
//! single mesh-wide document.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;

/// Bounded ring depth: the ten most recent packets.
pub const RECENT_RING_DEPTH: usize = 10;

/// Monotonic packet counters, bumped lock-free from handler threads.
#[derive(Default)]
pub struct Counters {
    pub in_hello: AtomicU64,
    pub in_hello_ack: AtomicU64,
    pub in_interest: AtomicU64,
    pub in_data: AtomicU64,
    pub out_hello: AtomicU64,
    pub out_hello_ack: AtomicU64,
    pub out_interest_org: AtomicU64,
    pub out_interest_fwd: AtomicU64,
    pub out_data_org: AtomicU64,
    pub out_data_fwd: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            in_counts: DirectionIn {
                hello: self.in_hello.load(Ordering::Relaxed),
                hello_ack: self.in_hello_ack.load(Ordering::Relaxed),
                interest: self.in_interest.load(Ordering::Relaxed),
                data: self.in_data.load(Ordering::Relaxed),
            },
            out_counts: DirectionOut {
                hello: self.out_hello.load(Ordering::Relaxed),
                hello_ack: self.out_hello_ack.load(Ordering::Relaxed),
                interest_org: self.out_interest_org.load(Ordering::Relaxed),
                interest_fwd: self.out_interest_fwd.load(Ordering::Relaxed),
                data_org: self.out_data_org.load(Ordering::Relaxed),
                data_fwd: self.out_data_fwd.load(Ordering::Relaxed),
            },
        }
    }
}

/// Inbound counters as persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectionIn {
    pub hello: u64,
    pub hello_ack: u64,
    pub interest: u64,
    pub data: u64,
}

/// Outbound counters as persisted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DirectionOut {
    pub hello: u64,
    pub hello_ack: u64,
    pub interest_org: u64,
    pub interest_fwd: u64,
    pub data_org: u64,
    pub data_fwd: u64,
}

/// Counter values at one instant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    #[serde(rename = "in")]
    pub in_counts: DirectionIn,
    #[serde(rename = "out")]
    pub out_counts: DirectionOut,
}

/// One packet as it crossed this node, in both forms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PacketRecord {
    /// Human-readable form (decoded body or frame summary).
    pub plaintext: String,
    /// Wire form as sent/received (encrypted frames stay opaque).
    pub encrypted: String,
}

/// Bounded ring of the most recent packets, newest last.
pub struct PacketRing {
    records: Mutex<VecDeque<PacketRecord>>,
}

impl PacketRing {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(RECENT_RING_DEPTH)),
        }
    }

    pub fn push(&self, plaintext: String, encrypted: String) {
        let mut records = self.records.lock();
        if records.len() == RECENT_RING_DEPTH {
            records.pop_front();
        }
        records.push_back(PacketRecord {
            plaintext,
            encrypted,
        });
    }

    pub fn snapshot(&self) -> Vec<PacketRecord> {
        self.records.lock().iter().cloned().collect()
    }
}

impl Default for PacketRing {
    fn default() -> Self {
        Self::new()
    }
}

/// FIB entry as persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FibRow {
    pub label: u32,
    pub hello_count: u32,
}

/// PIT entry as persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PitRow {
    pub name: String,
    pub rid: String,
    pub retry: u32,
    pub upstream: u32,
}

/// Gateway status as persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayStatus {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peer: Option<String>,
}

/// The per-tick snapshot document for one node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub xy: (u32, u32),
    pub endpoint: String,
    pub comms_enabled: bool,
    pub gateway: GatewayStatus,
    pub counters: CounterSnapshot,
    pub recent: Vec<PacketRecord>,
    pub fib: Vec<FibRow>,
    pub pit: Vec<PitRow>,
}

/// Write `snapshot` to `<dir>/node_<label>.json` as `{"<label>": {...}}`.
///
/// The write goes through a temp file and rename so the aggregator never
/// observes a half-written document.
///
/// # Errors
///
/// Returns `Error::Io` on filesystem failure.
pub fn write_snapshot(dir: &Path, label: u32, snapshot: &NodeSnapshot) -> Result<()> {
    fs::create_dir_all(dir)?;
    let mut doc = serde_json::Map::new();
    doc.insert(label.to_string(), serde_json::to_value(snapshot).map_err(std::io::Error::other)?);
    let body = serde_json::to_string_pretty(&doc).map_err(std::io::Error::other)?;
    let final_path = dir.join(format!("node_{}.json", label));
    let tmp_path = dir.join(format!(".node_{}.json.tmp", label));
    fs::write(&tmp_path, body)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> NodeSnapshot {
        NodeSnapshot {
            xy: (120, 740),
            endpoint: "127.0.0.1:33000".to_string(),
            comms_enabled: true,
            gateway: GatewayStatus {
                enabled: false,
                peer: None,
            },
            counters: Counters::new().snapshot(),
            recent: vec![PacketRecord {
                plaintext: "[0][1][127.0.0.1][33001]".to_string(),
                encrypted: "[0][1][127.0.0.1][33001][...]".to_string(),
            }],
            fib: vec![FibRow {
                label: 1,
                hello_count: 5,
            }],
            pit: Vec::new(),
        }
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = Counters::new();
        counters.in_hello.fetch_add(3, Ordering::Relaxed);
        counters.out_interest_org.fetch_add(2, Ordering::Relaxed);
        let snap = counters.snapshot();
        assert_eq!(snap.in_counts.hello, 3);
        assert_eq!(snap.out_counts.interest_org, 2);
        assert_eq!(snap.out_counts.data_fwd, 0);
    }

    #[test]
    fn test_ring_bounded_at_depth() {
        let ring = PacketRing::new();
        for i in 0..25 {
            ring.push(format!("pkt-{}", i), format!("enc-{}", i));
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), RECENT_RING_DEPTH);
        assert_eq!(snap[0].plaintext, "pkt-15");
        assert_eq!(snap[9].plaintext, "pkt-24");
    }

    #[test]
    fn test_write_snapshot_keyed_by_label() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_snapshot(dir.path(), 7, &sample_snapshot()).expect("write");

        let body =
            fs::read_to_string(dir.path().join("node_7.json")).expect("snapshot file exists");
        let doc: serde_json::Value = serde_json::from_str(&body).expect("valid json");
        let node = doc.get("7").expect("keyed by label");
        assert_eq!(node["endpoint"], "127.0.0.1:33000");
        assert_eq!(node["counters"]["in"]["hello"], 0);
        assert_eq!(node["fib"][0]["label"], 1);
    }

    #[test]
    fn test_write_snapshot_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut snap = sample_snapshot();
        write_snapshot(dir.path(), 7, &snap).expect("write");
        snap.comms_enabled = false;
        write_snapshot(dir.path(), 7, &snap).expect("rewrite");

        let body = fs::read_to_string(dir.path().join("node_7.json")).expect("file");
        let doc: serde_json::Value = serde_json::from_str(&body).expect("json");
        assert_eq!(doc["7"]["comms_enabled"], false);
    }
}
