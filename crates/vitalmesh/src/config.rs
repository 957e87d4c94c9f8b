// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mesh configuration: static topology, timing, and key material paths.
//!
//! One configuration document describes one subnet of the mesh: every node's
//! label, endpoint, grid coordinates, and owned name prefix, plus the global
//! timing knobs and, optionally, the gateway section for the node that
//! bridges to a foreign subnet. The physical-layer view is derived from the
//! coordinates: each node keeps its k geometrically nearest peers as hello
//! targets.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Seconds between hello beacons, expressed in milliseconds so tests can
/// shrink the clock.
pub const DEFAULT_HELLO_DELAY_MS: u64 = 1000;

/// Aging ceiling: a silent peer survives this many aging ticks.
pub const DEFAULT_MAX_HELLO_COUNT: u32 = 5;

/// Minimum neighbors kept in the physical-layer view (k-nearest).
pub const DEFAULT_MIN_NEIGHBORS: usize = 3;

/// Fixed deployment grid.
pub const DEFAULT_GRID: (u32, u32) = (1000, 1000);

/// First server port when stamping out a mesh programmatically.
pub const DEFAULT_BASE_PORT: u16 = 33000;

/// Common name stamped into node certificates.
pub const NETWORK_COMMON_NAME: &str = "hospital-net";

fn default_hello_delay_ms() -> u64 {
    DEFAULT_HELLO_DELAY_MS
}

fn default_max_hello_count() -> u32 {
    DEFAULT_MAX_HELLO_COUNT
}

fn default_min_neighbors() -> usize {
    DEFAULT_MIN_NEIGHBORS
}

fn default_grid_width() -> u32 {
    DEFAULT_GRID.0
}

fn default_grid_height() -> u32 {
    DEFAULT_GRID.1
}

/// One node's static description.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeSpec {
    pub label: u32,
    pub host: String,
    pub port: u16,
    pub x: u32,
    pub y: u32,
    /// Owned data prefix, e.g. "/data/3/".
    pub data_prefix: String,
}

impl NodeSpec {
    /// Squared grid distance to another node.
    fn distance2(&self, other: &NodeSpec) -> u64 {
        let dx = i64::from(self.x) - i64::from(other.x);
        let dy = i64::from(self.y) - i64::from(other.y);
        (dx * dx + dy * dy) as u64
    }
}

/// Gateway section: present on the one node per subnet that bridges to a
/// peer subnet.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Label of the gateway node in THIS subnet's node list.
    pub label: u32,
    /// PEM file holding the keypair shared by both gateway peers.
    pub key_path: PathBuf,
    /// Endpoint of the peer gateway in the foreign subnet.
    pub peer_host: String,
    pub peer_port: u16,
    /// Names under this prefix are foreign and travel over the bridge.
    pub prefix: String,
}

/// Configuration of one mesh subnet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeshConfig {
    #[serde(default = "default_grid_width")]
    pub grid_width: u32,
    #[serde(default = "default_grid_height")]
    pub grid_height: u32,
    /// k-nearest neighbors each node beacons to.
    #[serde(default = "default_min_neighbors")]
    pub k: usize,
    #[serde(default = "default_hello_delay_ms")]
    pub hello_delay_ms: u64,
    #[serde(default = "default_max_hello_count")]
    pub max_hello_count: u32,
    /// Shared membership private key (PKCS#8 PEM).
    pub member_key_path: PathBuf,
    /// Where per-tick snapshots are written; disabled when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,
    pub nodes: Vec<NodeSpec>,
}

impl MeshConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// `Error::ConfigFile` on read/parse failure, `Error::Config` on
    /// structural problems.
    pub fn from_file(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)
            .map_err(|err| Error::ConfigFile(format!("{}: {}", path.display(), err)))?;
        let config: MeshConfig = serde_json::from_str(&body)
            .map_err(|err| Error::ConfigFile(format!("{}: {}", path.display(), err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist the configuration (generator tool).
    ///
    /// # Errors
    ///
    /// `Error::Io` on write failure.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let body = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, body)?;
        Ok(())
    }

    /// Structural validation.
    ///
    /// # Errors
    ///
    /// `Error::Config` with a description of the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::Config("node list is empty".to_string()));
        }
        if self.k == 0 {
            return Err(Error::Config("k must be at least 1".to_string()));
        }
        let mut labels = HashSet::new();
        let mut endpoints = HashSet::new();
        for node in &self.nodes {
            if !labels.insert(node.label) {
                return Err(Error::Config(format!("duplicate label {}", node.label)));
            }
            if !endpoints.insert((node.host.clone(), node.port)) {
                return Err(Error::Config(format!(
                    "duplicate endpoint {}:{}",
                    node.host, node.port
                )));
            }
            if node.data_prefix.is_empty() {
                return Err(Error::Config(format!(
                    "node {} has an empty data prefix",
                    node.label
                )));
            }
        }
        if let Some(gateway) = &self.gateway {
            if !labels.contains(&gateway.label) {
                return Err(Error::Config(format!(
                    "gateway label {} is not in the node list",
                    gateway.label
                )));
            }
            if gateway.prefix.is_empty() {
                return Err(Error::Config("gateway prefix is empty".to_string()));
            }
        }
        Ok(())
    }

    /// Look up one node's spec.
    pub fn node(&self, label: u32) -> Option<&NodeSpec> {
        self.nodes.iter().find(|node| node.label == label)
    }

    /// The k geometrically nearest peers of `label`, computed once from the
    /// static topology. Ties break toward the lower label so the view is
    /// deterministic.
    pub fn k_nearest(&self, label: u32) -> Vec<&NodeSpec> {
        let Some(origin) = self.node(label) else {
            return Vec::new();
        };
        let mut peers: Vec<&NodeSpec> = self
            .nodes
            .iter()
            .filter(|node| node.label != label)
            .collect();
        peers.sort_by_key(|node| (origin.distance2(node), node.label));
        peers.truncate(self.k);
        peers
    }

    /// Stamp out a single-host mesh with seeded coordinates on the default
    /// grid: node `i` gets port `base_port + i` and owns `/data/<i>/`.
    pub fn generate(seed: u64, num_nodes: u32, host: &str, base_port: u16) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let nodes = (0..num_nodes)
            .map(|label| NodeSpec {
                label,
                host: host.to_string(),
                port: base_port + label as u16,
                x: rng.gen_range(0..=DEFAULT_GRID.0),
                y: rng.gen_range(0..=DEFAULT_GRID.1),
                data_prefix: format!("/data/{}/", label),
            })
            .collect();
        Self {
            grid_width: DEFAULT_GRID.0,
            grid_height: DEFAULT_GRID.1,
            k: DEFAULT_MIN_NEIGHBORS,
            hello_delay_ms: DEFAULT_HELLO_DELAY_MS,
            max_hello_count: DEFAULT_MAX_HELLO_COUNT,
            member_key_path: PathBuf::from("member.pem"),
            stats_dir: None,
            gateway: None,
            nodes,
        }
    }
}
