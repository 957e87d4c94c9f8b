// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Only setup-time failures (configuration, key material, socket binding)
//! surface as `Error`. Runtime drop categories -- bad signatures,
//! undecryptable bodies, malformed frames, unknown peers, transport send
//! failures -- are swallowed at the point of detection with a counter bump
//! and a debug log line, and never cross a component boundary.

use std::fmt;
use std::io;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Setup and configuration errors.
#[derive(Debug)]
pub enum Error {
    /// Configuration is structurally invalid (duplicate labels, unknown
    /// node, k larger than the mesh, ...).
    Config(String),

    /// Configuration file could not be read or parsed.
    ConfigFile(String),

    /// Key generation, key encoding, or signing failed.
    Crypto(String),

    /// Key file could not be loaded from disk.
    KeyFile(String),

    /// Socket bind failed for the node's server endpoint.
    Bind(io::Error),

    /// Generic I/O error with underlying cause.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "invalid configuration: {}", msg),
            Error::ConfigFile(msg) => write!(f, "configuration file error: {}", msg),
            Error::Crypto(msg) => write!(f, "crypto failure: {}", msg),
            Error::KeyFile(msg) => write!(f, "key file error: {}", msg),
            Error::Bind(err) => write!(f, "failed to bind server socket: {}", err),
            Error::Io(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Bind(err) | Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}
