// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node runtime: one autonomous mesh participant.
//!
//! Owns the transport, the forwarding engine, the producer, and the
//! management channel, and drives the periodic clock: every hello tick the
//! runtime drains operator commands, beacons HELLOs to its k-nearest peers,
//! ages the FIB on every second tick, and persists the telemetry snapshot.
//!
//! ```text
//!           +--------------------- Node ----------------------+
//!  stdin -> | commands -> main loop -> hellos / aging / stats |
//!           |                |                                |
//!           |                v                                |
//!  TCP   -> | listener -> Engine (FIB/PIT/originator/bridge)  |
//!           |                |                                |
//!           |                +-> FrameSender -> TCP           |
//!           +-------------------------------------------------+
//! ```

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{MeshConfig, NETWORK_COMMON_NAME};
use crate::crypto::{self, NodeCertificate, NodeKeys};
use crate::engine::{Delivery, Engine, EngineConfig};
use crate::error::{Error, Result};
use crate::gateway::GatewayBridge;
use crate::sensor::ProducerStore;
use crate::telemetry::{self, GatewayStatus, NodeSnapshot};
use crate::transport::{FrameSender, Listener};

/// Depth of the operator command queue.
const COMMAND_QUEUE_DEPTH: usize = 64;

/// Sleep slice inside a tick so shutdown stays responsive.
const TICK_SLICE: Duration = Duration::from_millis(50);

/// Operator commands accepted over the management channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Originate an interest for `name`; `retry` distinguishes reissues.
    Originate { name: String, retry: u32 },
    /// Quiesce the node: drop inbound, no-op outbound.
    Pause,
    /// Resume communications.
    Resume,
    /// Stop the runtime.
    Shutdown,
}

impl Command {
    /// Parse an operator line. Unknown input yields `None` (a no-op).
    ///
    /// ```text
    /// get /data/1/heartrate/ecg [retry]
    /// pause | resume | quit
    /// ```
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        match parts.next()? {
            "get" => {
                let name = parts.next()?.to_string();
                let retry = parts
                    .next()
                    .and_then(|token| token.parse::<u32>().ok())
                    .unwrap_or(0);
                Some(Command::Originate { name, retry })
            }
            "pause" => Some(Command::Pause),
            "resume" => Some(Command::Resume),
            "quit" | "shutdown" => Some(Command::Shutdown),
            _ => None,
        }
    }
}

/// Cloneable handle for feeding commands to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    tx: Sender<Command>,
}

impl NodeHandle {
    /// Enqueue a command. Returns false if the queue is full or the node is
    /// gone (the command is lost either way, matching the lossy channel
    /// semantics of the mesh itself).
    pub fn send(&self, command: Command) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// One mesh node, fully wired but not yet ticking. Call [`Node::run`] to
/// block on the clock or [`Node::spawn`] to drive it on its own thread.
pub struct Node {
    label: u32,
    xy: (u32, u32),
    endpoint: String,
    engine: Arc<Engine>,
    listener: Option<Listener>,
    comms: Arc<AtomicBool>,
    cmd_tx: Sender<Command>,
    cmd_rx: Receiver<Command>,
    hello_delay: Duration,
    stats_dir: Option<PathBuf>,
    gateway_peer: Option<String>,
}

impl Node {
    /// Build and wire one node from the mesh configuration: load the
    /// membership key, generate the node keypair and certificate, attach the
    /// gateway bridge if this label is the subnet's gateway, bind the
    /// listener, and compute the k-nearest hello targets.
    ///
    /// # Errors
    ///
    /// Fails on unknown label, unreadable key files, or an unbindable
    /// server endpoint.
    pub fn start(config: &MeshConfig, label: u32, producer: Box<dyn ProducerStore>) -> Result<Self> {
        let spec = config
            .node(label)
            .ok_or_else(|| Error::Config(format!("label {} is not in the mesh", label)))?;

        let member = NodeKeys::from_private(crypto::load_private_key_pem(&config.member_key_path)?);
        let keys = NodeKeys::generate()?;
        let cert = NodeCertificate::issue(&keys, NETWORK_COMMON_NAME)?.to_bytes()?;

        let gateway = match &config.gateway {
            Some(gateway_config) if gateway_config.label == label => {
                let gateway_keys =
                    NodeKeys::from_private(crypto::load_private_key_pem(&gateway_config.key_path)?);
                log::info!(
                    "[node] {} bridging {} to {}:{}",
                    label,
                    gateway_config.prefix,
                    gateway_config.peer_host,
                    gateway_config.peer_port
                );
                Some(GatewayBridge::new(
                    gateway_keys,
                    gateway_config.peer_host.clone(),
                    gateway_config.peer_port,
                    gateway_config.prefix.clone(),
                ))
            }
            _ => None,
        };
        let gateway_peer = gateway
            .as_ref()
            .map(|bridge| format!("{}:{}", bridge.peer().0, bridge.peer().1));

        let hello_targets = config
            .k_nearest(label)
            .into_iter()
            .map(|peer| (peer.host.clone(), peer.port))
            .collect();

        let comms = Arc::new(AtomicBool::new(true));
        let sink = Arc::new(FrameSender::new(label, Arc::clone(&comms)));
        let engine = Arc::new(Engine::new(
            EngineConfig {
                label,
                host: spec.host.clone(),
                port: spec.port,
                data_prefix: spec.data_prefix.clone(),
                max_hello_count: config.max_hello_count,
                hello_targets,
            },
            keys,
            member,
            cert,
            producer,
            sink,
            gateway,
        ));

        let engine_inbound = Arc::clone(&engine);
        let listener = Listener::spawn(
            label,
            &spec.host,
            spec.port,
            Arc::clone(&comms),
            move |frame| engine_inbound.on_frame(&frame),
        )?;

        let (cmd_tx, cmd_rx) = channel::bounded(COMMAND_QUEUE_DEPTH);
        Ok(Self {
            label,
            xy: (spec.x, spec.y),
            endpoint: format!("{}:{}", spec.host, spec.port),
            engine,
            listener: Some(listener),
            comms,
            cmd_tx,
            cmd_rx,
            hello_delay: Duration::from_millis(config.hello_delay_ms),
            stats_dir: config.stats_dir.clone(),
            gateway_peer,
        })
    }

    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// Management handle for the operator seam.
    pub fn handle(&self) -> NodeHandle {
        NodeHandle {
            tx: self.cmd_tx.clone(),
        }
    }

    /// Drain payloads answered to this node's own interests.
    pub fn take_deliveries(&self) -> Vec<Delivery> {
        self.engine.take_deliveries()
    }

    /// Assemble the telemetry snapshot for this instant.
    pub fn snapshot(&self) -> NodeSnapshot {
        NodeSnapshot {
            xy: self.xy,
            endpoint: self.endpoint.clone(),
            comms_enabled: self.comms.load(Ordering::Relaxed),
            gateway: GatewayStatus {
                enabled: self.gateway_peer.is_some(),
                peer: self.gateway_peer.clone(),
            },
            counters: self.engine.counters().snapshot(),
            recent: self.engine.ring().snapshot(),
            fib: self.engine.fib_rows(),
            pit: self.engine.pit_rows(),
        }
    }

    /// Drive the hello clock until a `Shutdown` command arrives.
    pub fn run(mut self) {
        log::info!("[node] {} running at {}", self.label, self.endpoint);
        let mut tick: u64 = 0;
        let mut running = true;
        while running {
            // Non-blocking drain of the management channel.
            while let Ok(command) = self.cmd_rx.try_recv() {
                running &= self.apply(command);
            }
            if !running {
                break;
            }

            self.engine.send_hellos();
            tick += 1;
            // Aging runs at half the beacon rate so a live peer nets +1
            // per aging window.
            if tick % 2 == 0 {
                self.engine.fib_tick();
            }
            if let Some(dir) = &self.stats_dir {
                if let Err(err) = telemetry::write_snapshot(dir, self.label, &self.snapshot()) {
                    log::debug!("[node] {}: snapshot write failed: {}", self.label, err);
                }
            }

            let mut slept = Duration::ZERO;
            while slept < self.hello_delay {
                if let Ok(command) = self.cmd_rx.try_recv() {
                    running &= self.apply(command);
                    if !running {
                        break;
                    }
                }
                thread::sleep(TICK_SLICE.min(self.hello_delay - slept));
                slept += TICK_SLICE;
            }
        }
        if let Some(listener) = self.listener.take() {
            listener.shutdown();
        }
        log::info!("[node] {} stopped", self.label);
    }

    /// Apply one command; returns false when the runtime should stop.
    fn apply(&self, command: Command) -> bool {
        match command {
            Command::Originate { name, retry } => {
                let rid = self.engine.originate(&name, retry);
                log::info!(
                    "[node] {}: originated interest for {} rid {} retry {}",
                    self.label,
                    name,
                    rid,
                    retry
                );
                true
            }
            Command::Pause => {
                log::info!("[node] {}: communications paused", self.label);
                self.comms.store(false, Ordering::Relaxed);
                true
            }
            Command::Resume => {
                log::info!("[node] {}: communications resumed", self.label);
                self.comms.store(true, Ordering::Relaxed);
                true
            }
            Command::Shutdown => false,
        }
    }

    /// Run the clock on a background thread.
    pub fn spawn(self) -> RunningNode {
        let label = self.label;
        let engine = Arc::clone(&self.engine);
        let handle = self.handle();
        let thread = thread::spawn(move || self.run());
        RunningNode {
            label,
            engine,
            handle,
            thread: Some(thread),
        }
    }
}

/// A node running on its own thread.
pub struct RunningNode {
    label: u32,
    engine: Arc<Engine>,
    handle: NodeHandle,
    thread: Option<JoinHandle<()>>,
}

impl RunningNode {
    pub fn label(&self) -> u32 {
        self.label
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn handle(&self) -> &NodeHandle {
        &self.handle
    }

    /// Drain payloads answered to this node's own interests.
    pub fn take_deliveries(&self) -> Vec<Delivery> {
        self.engine.take_deliveries()
    }

    /// Request shutdown and wait for the clock thread.
    pub fn stop(mut self) {
        self.handle.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RunningNode {
    fn drop(&mut self) {
        self.handle.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_parse() {
        assert_eq!(
            Command::parse("get /data/1/heartrate/ecg"),
            Some(Command::Originate {
                name: "/data/1/heartrate/ecg".to_string(),
                retry: 0
            })
        );
        assert_eq!(
            Command::parse("get /data/1/heartrate/ecg 2"),
            Some(Command::Originate {
                name: "/data/1/heartrate/ecg".to_string(),
                retry: 2
            })
        );
        assert_eq!(Command::parse("pause"), Some(Command::Pause));
        assert_eq!(Command::parse("resume"), Some(Command::Resume));
        assert_eq!(Command::parse("quit"), Some(Command::Shutdown));
        assert_eq!(Command::parse("shutdown"), Some(Command::Shutdown));
    }

    #[test]
    fn test_command_parse_unknown_is_noop() {
        assert_eq!(Command::parse(""), None);
        assert_eq!(Command::parse("get"), None);
        assert_eq!(Command::parse("frobnicate /x"), None);
        // Malformed retry falls back to 0 rather than failing the command
        assert_eq!(
            Command::parse("get /x abc"),
            Some(Command::Originate {
                name: "/x".to_string(),
                retry: 0
            })
        );
    }
}
