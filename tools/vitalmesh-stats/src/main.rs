// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! VitalMesh telemetry aggregator.
//!
//! Merges the per-node snapshot files a mesh writes into its stats
//! directory into one mesh-wide JSON document, refreshed on a fixed
//! cadence. A cycle in which any snapshot is unreadable (a node is mid
//! write) is skipped; the next cycle picks up the consistent set.
//!
//! # Usage
//!
//! ```bash
//! vitalmesh-stats --stats-dir stats --output mesh-stats.json
//! vitalmesh-stats --stats-dir stats --output mesh-stats.json --once
//! ```

use clap::Parser;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// VitalMesh telemetry aggregator
#[derive(Parser, Debug)]
#[command(name = "vitalmesh-stats")]
#[command(about = "VitalMesh - merges per-node telemetry snapshots")]
#[command(version)]
struct Args {
    /// Directory the nodes write their snapshots into
    #[arg(short, long, default_value = "stats")]
    stats_dir: PathBuf,

    /// Aggregated output file
    #[arg(short, long, default_value = "mesh-stats.json")]
    output: PathBuf,

    /// Refresh interval in milliseconds
    #[arg(long, default_value = "500")]
    interval_ms: u64,

    /// Aggregate once and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    loop {
        match aggregate(&args.stats_dir) {
            Ok(merged) => {
                let body = serde_json::to_string_pretty(&merged)?;
                fs::write(&args.output, body)?;
                tracing::debug!(
                    "merged {} node snapshot(s) into {}",
                    merged.len(),
                    args.output.display()
                );
            }
            Err(err) => {
                // A node was mid-write; retry next cycle
                tracing::debug!("skipping cycle: {}", err);
            }
        }
        if args.once {
            break;
        }
        std::thread::sleep(Duration::from_millis(args.interval_ms));
    }
    Ok(())
}

/// Read every snapshot file and merge the label-keyed documents. Fails as a
/// whole if any file is unreadable so the output is never a mixed
/// generation.
fn aggregate(dir: &Path) -> Result<Map<String, Value>, Box<dyn std::error::Error>> {
    let mut merged = Map::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext == "json")
            .unwrap_or(false);
        if !path.is_file() || !is_json {
            continue;
        }
        let body = fs::read_to_string(&path)?;
        let doc: Map<String, Value> = serde_json::from_str(&body)?;
        for (label, snapshot) in doc {
            merged.insert(label, snapshot);
        }
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_merges_labels() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join("node_0.json"),
            r#"{"0": {"endpoint": "127.0.0.1:33000"}}"#,
        )
        .expect("write");
        fs::write(
            dir.path().join("node_1.json"),
            r#"{"1": {"endpoint": "127.0.0.1:33001"}}"#,
        )
        .expect("write");
        // Non-json clutter is ignored
        fs::write(dir.path().join("notes.txt"), "ignore me").expect("write");

        let merged = aggregate(dir.path()).expect("aggregate");
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["0"]["endpoint"], "127.0.0.1:33000");
        assert_eq!(merged["1"]["endpoint"], "127.0.0.1:33001");
    }

    #[test]
    fn test_aggregate_fails_on_partial_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("node_0.json"), r#"{"0": {"endpo"#).expect("write");
        assert!(aggregate(dir.path()).is_err());
    }

    #[test]
    fn test_aggregate_empty_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let merged = aggregate(dir.path()).expect("aggregate");
        assert!(merged.is_empty());
    }
}
