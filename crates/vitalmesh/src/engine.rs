// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Forwarding engine: the INTEREST/DATA state machines, hello handling, and
//! interest origination.
//!
//! One engine instance per node, shared between the transport handler
//! threads and the hello clock. All decisions run against the three tables
//! (FIB, PIT, OriginatorTable) plus the optional gateway bridge; outbound
//! frames leave through an injected [`FrameSink`] so the engine never blocks
//! on TCP while holding a table lock -- fan-out iterates a FIB snapshot
//! taken under the lock and released before the first send.
//!
//! # Inbound INTEREST (name, rid, retry, src)
//!
//! ```text
//! originated here?  ----------------> drop          (origin loop)
//! name under owned prefix? --------> answer DATA to src
//! gateway + foreign name + new? ---> tunnel EG, fall through
//! (name, rid, retry) in PIT? ------> drop           (duplicate)
//! else: PIT <- src, re-encrypt and fan out to FIB \ {src}
//! ```
//!
//! # Inbound DATA (name, rid, retry, payload)
//!
//! ```text
//! unanswered origination? ---------> surface locally (or EG_REPLY
//!                                    if re-originated for the peer)
//! gateway with matching GPIT? -----> EG_REPLY to peer
//! else PIT take -> upstream -------> re-encrypt, forward
//!        (miss) -------------------> drop
//! ```

use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rsa::RsaPublicKey;
use std::sync::Arc;
use std::time::Duration;

use crate::codec::{
    self, DataFields, DecodeOutcome, HelloFields, InterestFields, Packet, WireKind, HELLO_ACK_ID,
    HELLO_ID,
};
use crate::crypto::NodeKeys;
use crate::gateway::{GatewayBridge, GpitEntry};
use crate::sensor::ProducerStore;
use crate::tables::{Fib, OriginatorTable, Pit, PitKey};
use crate::telemetry::{Counters, FibRow, PacketRing, PitRow};

/// Request-id length: 5 characters from the 62-character alphabet.
const REQUEST_ID_LEN: usize = 5;

/// Payload substituted when the producer owns the prefix but has nothing at
/// the requested name.
const NOT_FOUND_PAYLOAD: &str = r#"{"message": "Data not found!"}"#;

/// Outbound seam: the engine hands complete frames to the sink, which owns
/// connecting, writing, and swallowing transport failures.
pub trait FrameSink: Send + Sync {
    fn send(&self, host: &str, port: u16, frame: &[u8]);
}

/// A payload surfaced to the local consumer.
#[derive(Clone, Debug)]
pub struct Delivery {
    pub name: String,
    pub rid: String,
    pub payload: String,
    pub round_trip: Duration,
}

/// Static identity and timing knobs the engine needs.
pub struct EngineConfig {
    pub label: u32,
    pub host: String,
    pub port: u16,
    /// Owned data prefix, e.g. "/data/3/".
    pub data_prefix: String,
    pub max_hello_count: u32,
    /// Endpoints beaconed to every hello tick (the k-nearest peers).
    pub hello_targets: Vec<(String, u16)>,
}

/// Per-node forwarding engine.
pub struct Engine {
    config: EngineConfig,
    keys: NodeKeys,
    member: NodeKeys,
    cert: Vec<u8>,
    fib: Fib,
    pit: Pit,
    originator: OriginatorTable,
    counters: Counters,
    ring: PacketRing,
    producer: Box<dyn ProducerStore>,
    sink: Arc<dyn FrameSink>,
    gateway: Option<GatewayBridge>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        keys: NodeKeys,
        member: NodeKeys,
        cert: Vec<u8>,
        producer: Box<dyn ProducerStore>,
        sink: Arc<dyn FrameSink>,
        gateway: Option<GatewayBridge>,
    ) -> Self {
        let max_hello_count = config.max_hello_count;
        Self {
            config,
            keys,
            member,
            cert,
            fib: Fib::new(max_hello_count),
            pit: Pit::new(),
            originator: OriginatorTable::new(),
            counters: Counters::new(),
            ring: PacketRing::new(),
            producer,
            sink,
            gateway,
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn label(&self) -> u32 {
        self.config.label
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        self.keys.public()
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn originator(&self) -> &OriginatorTable {
        &self.originator
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn gateway(&self) -> Option<&GatewayBridge> {
        self.gateway.as_ref()
    }

    /// Drain payloads surfaced to the local consumer since the last call.
    pub fn take_deliveries(&self) -> Vec<Delivery> {
        std::mem::take(&mut *self.deliveries.lock())
    }

    /// Telemetry rows for the persisted snapshot.
    pub fn fib_rows(&self) -> Vec<FibRow> {
        self.fib
            .snapshot()
            .into_iter()
            .map(|(label, entry)| FibRow {
                label,
                hello_count: entry.hello_count,
            })
            .collect()
    }

    pub fn pit_rows(&self) -> Vec<PitRow> {
        self.pit
            .snapshot()
            .into_iter()
            .map(|(key, upstream)| PitRow {
                name: key.name,
                rid: key.rid,
                retry: key.retry,
                upstream,
            })
            .collect()
    }

    pub fn ring(&self) -> &PacketRing {
        &self.ring
    }

    // ========================================================================
    // Inbound path
    // ========================================================================

    /// Entry point for every raw frame the transport accepted. Gateway
    /// frames short-circuit on the literal `EG` magic before normal
    /// decoding; everything else goes through the codec and one dispatch
    /// match.
    pub fn on_frame(&self, raw: &[u8]) {
        if codec::is_gateway_frame(raw) {
            self.handle_gateway_frame(raw);
            return;
        }
        match codec::decode_frame(raw, self.keys.private(), self.member.public()) {
            DecodeOutcome::Packet(packet) => {
                self.count_inbound(kind_of(&packet));
                self.ring
                    .push(packet_summary(&packet), String::from_utf8_lossy(raw).into_owned());
                match packet {
                    Packet::Hello(hello) => self.handle_hello(hello, false),
                    Packet::HelloAck(hello) => self.handle_hello(hello, true),
                    Packet::Interest(interest) => self.handle_interest(interest),
                    Packet::Data(data) => self.handle_data(data),
                }
            }
            DecodeOutcome::Dropped(kind) => {
                // Kind was identified, so the inbound counter still moves.
                self.count_inbound(kind);
                log::debug!("[engine] node {}: dropped {:?} frame", self.config.label, kind);
            }
            DecodeOutcome::Malformed => {
                log::debug!("[engine] node {}: malformed frame", self.config.label);
            }
        }
    }

    fn count_inbound(&self, kind: WireKind) {
        use std::sync::atomic::Ordering;
        match kind {
            WireKind::Hello => self.counters.in_hello.fetch_add(1, Ordering::Relaxed),
            WireKind::HelloAck => self.counters.in_hello_ack.fetch_add(1, Ordering::Relaxed),
            WireKind::Interest => self.counters.in_interest.fetch_add(1, Ordering::Relaxed),
            WireKind::Data => self.counters.in_data.fetch_add(1, Ordering::Relaxed),
        };
    }

    fn handle_hello(&self, hello: HelloFields, ack: bool) {
        self.fib.observe_hello(
            hello.label,
            hello.host.clone(),
            hello.port,
            hello.public_key,
            hello.cert,
        );
        if !ack {
            self.send_hello_frame(HELLO_ACK_ID, &hello.host, hello.port);
        }
    }

    fn handle_interest(&self, interest: InterestFields) {
        use std::sync::atomic::Ordering;
        let InterestFields {
            source,
            name,
            rid,
            retry,
        } = interest;

        // Frames from peers we never authenticated are spoofable: drop.
        if !self.fib.contains(source) {
            log::debug!(
                "[engine] node {}: interest for {} from unknown peer {}",
                self.config.label,
                name,
                source
            );
            return;
        }

        // Origin loop: our own interest came back around.
        if self.originator.contains(&name, &rid) {
            log::debug!(
                "[engine] node {}: interest for {} rid {} is our own, dropping",
                self.config.label,
                name,
                rid
            );
            return;
        }

        // Producer path: we own the prefix, answer directly to the sender.
        if name.starts_with(&self.config.data_prefix) {
            let rest = name
                .strip_prefix(&self.config.data_prefix)
                .unwrap_or_default();
            let payload = self
                .producer
                .lookup(rest)
                .unwrap_or_else(|| NOT_FOUND_PAYLOAD.to_string());
            if let Some(neighbor) = self.fib.lookup(source) {
                self.send_data_frame(&name, &rid, retry, &payload, source, &neighbor);
                self.counters.out_data_org.fetch_add(1, Ordering::Relaxed);
            }
            return;
        }

        // Gateway path: foreign names tunnel to the peer gateway, and the
        // interest still fans out locally below.
        if let Some(bridge) = &self.gateway {
            if bridge.matches(&name) {
                let entry = GpitEntry {
                    rid: rid.clone(),
                    retry,
                    upstream: source,
                };
                if bridge.record_foreign_interest(&name, entry) {
                    match codec::encode_gateway_request(bridge.keys().public(), &name) {
                        Ok(frame) => {
                            let (peer_host, peer_port) = bridge.peer();
                            log::debug!(
                                "[engine] node {}: tunnelling {} to gateway peer {}:{}",
                                self.config.label,
                                name,
                                peer_host,
                                peer_port
                            );
                            self.ring.push(format!("EG {}", name), frame.clone());
                            self.sink.send(peer_host, peer_port, frame.as_bytes());
                        }
                        Err(err) => {
                            log::debug!("[engine] node {}: gateway encode failed: {}", self.config.label, err);
                        }
                    }
                }
            }
        }

        // Forwarder path: record the reverse path, fan out everywhere else.
        let key = PitKey::new(&name, &rid, retry);
        if !self.pit.insert(key, source) {
            log::debug!(
                "[engine] node {}: duplicate interest {} rid {} retry {}",
                self.config.label,
                name,
                rid,
                retry
            );
            return;
        }
        for (label, neighbor) in self.fib.snapshot() {
            if label == source {
                continue;
            }
            match codec::encode_interest(self.config.label, &name, &rid, retry, &neighbor.public_key)
            {
                Ok(frame) => {
                    self.ring.push(
                        format!("[2][{}][{}][{}][{}]", self.config.label, name, rid, retry),
                        frame.clone(),
                    );
                    self.sink.send(&neighbor.host, neighbor.port, frame.as_bytes());
                    self.counters.out_interest_fwd.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    log::debug!(
                        "[engine] node {}: interest encode for {} failed: {}",
                        self.config.label,
                        label,
                        err
                    );
                }
            }
        }
    }

    fn handle_data(&self, data: DataFields) {
        use std::sync::atomic::Ordering;
        let DataFields {
            source,
            name,
            rid,
            retry,
            payload,
        } = data;

        if !self.fib.contains(source) {
            log::debug!(
                "[engine] node {}: data for {} from unknown peer {}",
                self.config.label,
                name,
                source
            );
            return;
        }

        // Consumer path: first answer to one of our own originations.
        if let Some(round_trip) = self.originator.mark_answered(&name, &rid) {
            if let Some(bridge) = &self.gateway {
                if bridge.take_client_request(&name, &rid) {
                    // Re-originated on the peer gateway's behalf: the answer
                    // crosses the bridge instead of surfacing here.
                    match codec::encode_gateway_reply(bridge.keys().public(), &name, &payload) {
                        Ok(frame) => {
                            let (peer_host, peer_port) = bridge.peer();
                            self.ring.push(format!("EG_REPLY {}", name), frame.clone());
                            self.sink.send(peer_host, peer_port, frame.as_bytes());
                        }
                        Err(err) => {
                            log::debug!(
                                "[engine] node {}: gateway reply encode failed: {}",
                                self.config.label,
                                err
                            );
                        }
                    }
                    return;
                }
            }
            log::info!(
                "[engine] node {}: {} answered in {:?}",
                self.config.label,
                name,
                round_trip
            );
            self.deliveries.lock().push(Delivery {
                name,
                rid,
                payload,
                round_trip,
            });
            return;
        }

        // Gateway path: a locally answered foreign interest goes back over
        // the bridge.
        if let Some(bridge) = &self.gateway {
            if bridge.match_pending(&name, &rid, retry) {
                match codec::encode_gateway_reply(bridge.keys().public(), &name, &payload) {
                    Ok(frame) => {
                        let (peer_host, peer_port) = bridge.peer();
                        self.ring.push(format!("EG_REPLY {}", name), frame.clone());
                        self.sink.send(peer_host, peer_port, frame.as_bytes());
                    }
                    Err(err) => {
                        log::debug!(
                            "[engine] node {}: gateway reply encode failed: {}",
                            self.config.label,
                            err
                        );
                    }
                }
                return;
            }
        }

        // Reverse path: exactly one DATA per PIT entry, first wins.
        let key = PitKey::new(&name, &rid, retry);
        let Some(upstream) = self.pit.take(&key) else {
            log::debug!(
                "[engine] node {}: no pending interest for {} rid {} retry {}",
                self.config.label,
                name,
                rid,
                retry
            );
            return;
        };
        let Some(neighbor) = self.fib.lookup(upstream) else {
            // Upstream aged out of the FIB; nowhere to return the data.
            log::debug!(
                "[engine] node {}: upstream {} for {} no longer reachable",
                self.config.label,
                upstream,
                name
            );
            return;
        };
        self.send_data_frame(&name, &rid, retry, &payload, upstream, &neighbor);
        self.counters.out_data_fwd.fetch_add(1, Ordering::Relaxed);
    }

    fn handle_gateway_frame(&self, raw: &[u8]) {
        let Some(bridge) = &self.gateway else {
            log::debug!(
                "[engine] node {}: gateway frame but no bridge configured",
                self.config.label
            );
            return;
        };
        match codec::decode_gateway_frame(raw, bridge.keys().private()) {
            Some(codec::GatewayFrame::Request { name }) => {
                // Re-originate into the local mesh on the peer's behalf.
                // The marker is recorded before any interest leaves so the
                // answer can never race past it.
                let rid = generate_request_id();
                bridge.record_client_request(&name, &rid);
                log::debug!(
                    "[engine] node {}: re-originating tunnelled interest for {}",
                    self.config.label,
                    name
                );
                self.originate_with_rid(&name, &rid, 0);
            }
            Some(codec::GatewayFrame::Reply { name, payload }) => {
                use std::sync::atomic::Ordering;
                let Some(entry) = bridge.take_pending(&name) else {
                    log::debug!(
                        "[engine] node {}: gateway reply for {} without pending entry",
                        self.config.label,
                        name
                    );
                    return;
                };
                let Some(neighbor) = self.fib.lookup(entry.upstream) else {
                    log::debug!(
                        "[engine] node {}: downstream {} for {} no longer reachable",
                        self.config.label,
                        entry.upstream,
                        name
                    );
                    return;
                };
                self.send_data_frame(&name, &entry.rid, entry.retry, &payload, entry.upstream, &neighbor);
                self.counters.out_data_fwd.fetch_add(1, Ordering::Relaxed);
            }
            None => {
                log::debug!(
                    "[engine] node {}: undecodable gateway frame",
                    self.config.label
                );
            }
        }
    }

    // ========================================================================
    // Origination and the hello clock
    // ========================================================================

    /// Originate an interest for `name`. Returns the generated request-id.
    /// An empty FIB produces zero outbound interests; the origination is
    /// still recorded so a matching DATA arriving later (e.g. after the
    /// topology heals) is recognized.
    pub fn originate(&self, name: &str, retry: u32) -> String {
        let rid = generate_request_id();
        self.originate_with_rid(name, &rid, retry);
        rid
    }

    fn originate_with_rid(&self, name: &str, rid: &str, retry: u32) {
        use std::sync::atomic::Ordering;
        self.originator.record(name, rid);
        for (label, neighbor) in self.fib.snapshot() {
            match codec::encode_interest(self.config.label, name, rid, retry, &neighbor.public_key) {
                Ok(frame) => {
                    self.ring.push(
                        format!("[2][{}][{}][{}][{}]", self.config.label, name, rid, retry),
                        frame.clone(),
                    );
                    self.sink.send(&neighbor.host, neighbor.port, frame.as_bytes());
                    self.counters.out_interest_org.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    log::debug!(
                        "[engine] node {}: interest encode for {} failed: {}",
                        self.config.label,
                        label,
                        err
                    );
                }
            }
        }
    }

    /// Beacon a HELLO to each of the k-nearest peers (one clock tick).
    pub fn send_hellos(&self) {
        for (host, port) in &self.config.hello_targets {
            self.send_hello_frame(HELLO_ID, host, *port);
        }
    }

    /// One FIB aging tick.
    pub fn fib_tick(&self) {
        self.fib.tick();
    }

    // ========================================================================
    // Frame emission helpers
    // ========================================================================

    fn send_hello_frame(&self, kind_id: u8, host: &str, port: u16) {
        use std::sync::atomic::Ordering;
        match codec::encode_hello(
            kind_id,
            self.config.label,
            &self.config.host,
            self.config.port,
            &self.cert,
            &self.keys,
            self.member.private(),
        ) {
            Ok(frame) => {
                self.ring.push(
                    format!(
                        "[{}][{}][{}][{}]",
                        kind_id, self.config.label, self.config.host, self.config.port
                    ),
                    frame.clone(),
                );
                self.sink.send(host, port, frame.as_bytes());
                if kind_id == HELLO_ID {
                    self.counters.out_hello.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.counters.out_hello_ack.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(err) => {
                log::debug!(
                    "[engine] node {}: hello encode failed: {}",
                    self.config.label,
                    err
                );
            }
        }
    }

    fn send_data_frame(
        &self,
        name: &str,
        rid: &str,
        retry: u32,
        payload: &str,
        to_label: u32,
        neighbor: &crate::tables::Neighbor,
    ) {
        match codec::encode_data(
            self.config.label,
            name,
            rid,
            retry,
            payload,
            &neighbor.public_key,
        ) {
            Ok(frame) => {
                self.ring.push(
                    format!("[1][{}][{}][{}][{}]", self.config.label, name, rid, retry),
                    frame.clone(),
                );
                self.sink.send(&neighbor.host, neighbor.port, frame.as_bytes());
            }
            Err(err) => {
                log::debug!(
                    "[engine] node {}: data encode for {} failed: {}",
                    self.config.label,
                    to_label,
                    err
                );
            }
        }
    }
}

/// 5-character alphanumeric request-id (62-character alphabet).
pub fn generate_request_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(REQUEST_ID_LEN)
        .map(char::from)
        .collect()
}

fn kind_of(packet: &Packet) -> WireKind {
    match packet {
        Packet::Hello(_) => WireKind::Hello,
        Packet::HelloAck(_) => WireKind::HelloAck,
        Packet::Interest(_) => WireKind::Interest,
        Packet::Data(_) => WireKind::Data,
    }
}

fn packet_summary(packet: &Packet) -> String {
    match packet {
        Packet::Hello(hello) => format!("[0][{}][{}][{}]", hello.label, hello.host, hello.port),
        Packet::HelloAck(hello) => format!("[4][{}][{}][{}]", hello.label, hello.host, hello.port),
        Packet::Interest(interest) => format!(
            "[2][{}][{}][{}][{}]",
            interest.source, interest.name, interest.rid, interest.retry
        ),
        Packet::Data(data) => format!(
            "[1][{}][{}][{}][{}]",
            data.source, data.name, data.rid, data.retry
        ),
    }
}
