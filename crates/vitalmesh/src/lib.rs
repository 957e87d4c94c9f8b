// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # VitalMesh - Named-Data Networking overlay for medical-sensor meshes
//!
//! A pure Rust implementation of an NDN forwarding plane for small meshes of
//! autonomous sensor nodes. Every node simultaneously plays three roles: a
//! producer that owns a named data prefix, a forwarder that relays INTEREST
//! packets toward producers and DATA packets back along the reverse path,
//! and a consumer that originates interests for a local operator.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vitalmesh::{Command, MeshConfig, MedicalSensorSystem, Node, Result};
//!
//! fn main() -> Result<()> {
//!     let config = MeshConfig::from_file("mesh.json".as_ref())?;
//!     let node = Node::start(&config, 3, Box::new(MedicalSensorSystem::new("patient-3")))?;
//!     let handle = node.handle();
//!     handle.send(Command::Originate {
//!         name: "/data/1/heartrate/ecg".to_string(),
//!         retry: 0,
//!     });
//!     node.run();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                           Node Runtime                             |
//! |   hello clock | management channel | telemetry snapshots           |
//! +--------------------------------------------------------------------+
//! |                        Forwarding Engine                           |
//! |   FIB (neighbor aging) | PIT (reverse paths) | originator table    |
//! |   producer seam | gateway bridge (GPIT, EG/EG_REPLY tunnelling)    |
//! +--------------------------------------------------------------------+
//! |                            Codec                                   |
//! |   bracket frames | PSS-signed HELLOs | OAEP-encrypted bodies       |
//! +--------------------------------------------------------------------+
//! |                          Transport                                 |
//! |   blocking TCP listener + handler threads | per-frame client sends |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Node`] | One mesh participant: transport + engine + clock |
//! | [`MeshConfig`] | Static topology, timing, and key material paths |
//! | [`Engine`] | The INTEREST/DATA state machines |
//! | [`Command`] | Operator commands over the management channel |
//! | [`MedicalSensorSystem`] | Synthesized vitals backing a producer |

/// Wire codec: bracket framing, packet union, inline crypto.
pub mod codec;
/// Mesh configuration and k-nearest topology derivation.
pub mod config;
/// RSA primitives: OAEP encryption, PSS signatures, key files.
pub mod crypto;
/// Forwarding engine and the outbound frame seam.
pub mod engine;
/// Crate error type.
pub mod error;
/// Gateway bridge state (GPIT, client requests).
pub mod gateway;
/// Node runtime and management channel.
pub mod node;
/// Producer seam and the medical sensor system.
pub mod sensor;
/// FIB, PIT, and originator tables.
pub mod tables;
/// Counters, recent-packet ring, persisted snapshots.
pub mod telemetry;
/// Blocking TCP transport.
pub mod transport;

pub use config::{GatewayConfig, MeshConfig, NodeSpec};
pub use engine::{Delivery, Engine, FrameSink};
pub use error::{Error, Result};
pub use node::{Command, Node, NodeHandle, RunningNode};
pub use sensor::{MedicalSensorSystem, ProducerStore};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
