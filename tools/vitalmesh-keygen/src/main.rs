// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! VitalMesh key generator.
//!
//! Produces the out-of-band key material a deployment shares before any
//! node starts: the membership key every legitimate node signs its HELLOs
//! with, and the gateway key held by the two bridge peers.
//!
//! # Usage
//!
//! ```bash
//! vitalmesh-keygen --output member.pem
//! vitalmesh-keygen --output gateway.pem
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vitalmesh::crypto::{self, NodeKeys};

/// VitalMesh key generator
#[derive(Parser, Debug)]
#[command(name = "vitalmesh-keygen")]
#[command(about = "VitalMesh - generates RSA-2048 PKCS#8 PEM keys")]
#[command(version)]
struct Args {
    /// Output PEM file
    #[arg(short, long, default_value = "member.pem")]
    output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    force: bool,

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

    if args.output.exists() && !args.force {
        return Err(format!(
            "{} already exists (pass --force to overwrite)",
            args.output.display()
        )
        .into());
    }

    tracing::info!("generating RSA-2048 keypair...");
    let keys = NodeKeys::generate()?;
    crypto::save_private_key_pem(&args.output, keys.private())?;
    tracing::info!("wrote {}", args.output.display());
    Ok(())
}
