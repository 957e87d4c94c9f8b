// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! VitalMesh node launcher.
//!
//! Runs one mesh participant from a configuration file and forwards stdin
//! lines to its management channel.
//!
//! # Usage
//!
//! ```bash
//! # Run node 3 of a configured mesh
//! vitalmesh-node --config mesh.json --label 3
//!
//! # Generate an example 10-node single-host configuration
//! vitalmesh-node gen-config --output mesh.json --nodes 10 --seed 1
//!
//! # Operator commands on stdin while running:
//! #   get /data/1/heartrate/ecg [retry]
//! #   pause | resume | quit
//! ```

use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vitalmesh::{Command, MedicalSensorSystem, MeshConfig, Node};

/// VitalMesh node launcher
#[derive(Parser, Debug)]
#[command(name = "vitalmesh-node")]
#[command(about = "VitalMesh - runs one NDN mesh participant")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "mesh.json")]
    config: PathBuf,

    /// Label of the node to run
    #[arg(short, long)]
    label: Option<u32>,

    /// Override the snapshot directory from the configuration
    #[arg(long)]
    stats_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate an example configuration file
    GenConfig {
        /// Output file path
        #[arg(short, long, default_value = "mesh.json")]
        output: PathBuf,

        /// Number of nodes
        #[arg(short, long, default_value = "10")]
        nodes: u32,

        /// Coordinate seed
        #[arg(short, long, default_value = "1")]
        seed: u64,

        /// Host every node binds to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// First server port (node i gets base + i)
        #[arg(long, default_value = "33000")]
        base_port: u16,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Some(Commands::GenConfig {
        output,
        nodes,
        seed,
        host,
        base_port,
    }) = args.command
    {
        let config = MeshConfig::generate(seed, nodes, &host, base_port);
        config.to_file(&output)?;
        tracing::info!("wrote {} node mesh to {}", nodes, output.display());
        return Ok(());
    }

    let label = args
        .label
        .ok_or("pass --label to pick the node to run (or use gen-config)")?;
    let mut config = MeshConfig::from_file(&args.config)?;
    if args.stats_dir.is_some() {
        config.stats_dir = args.stats_dir;
    }

    let producer = MedicalSensorSystem::new(&format!("patient-{}", label));
    let node = Node::start(&config, label, Box::new(producer))?;
    let handle = node.handle();

    // Operator seam: stdin lines become management commands; unknown lines
    // are no-ops.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match Command::parse(&line) {
                Some(command) => {
                    let stop = command == Command::Shutdown;
                    handle.send(command);
                    if stop {
                        break;
                    }
                }
                None => {
                    if !line.trim().is_empty() {
                        tracing::warn!("unknown command: {}", line.trim());
                    }
                }
            }
        }
    });

    node.run();
    Ok(())
}
