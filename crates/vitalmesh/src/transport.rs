// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Blocking TCP transport.
//!
//! Inbound: a listener thread accepts connections and spawns one short-lived
//! handler thread per connection. A handler reads the whole frame (the
//! sender closes its end after writing), hands it to the inbound callback,
//! and exits; a panic or I/O error in a handler never reaches the accept
//! loop. Outbound: every send opens a fresh connection, writes the frame,
//! and closes; connect and write failures are swallowed -- the hello clock
//! recreates reachability.
//!
//! A shared `comms` flag quiesces the node in both directions: inbound
//! connections are accepted and immediately dropped, outbound sends become
//! no-ops.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::engine::FrameSink;
use crate::error::{Error, Result};

/// Upper bound on one inbound frame.
const MAX_FRAME_BYTES: u64 = 16 * 1024;

/// How long a handler waits for the sender to finish writing.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// How long an outbound write may block.
const WRITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Accept-loop poll interval (the listener is non-blocking so shutdown
/// stays responsive).
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Outbound half: one fresh connection per frame.
pub struct FrameSender {
    label: u32,
    comms: Arc<AtomicBool>,
}

impl FrameSender {
    pub fn new(label: u32, comms: Arc<AtomicBool>) -> Self {
        Self { label, comms }
    }
}

impl FrameSink for FrameSender {
    fn send(&self, host: &str, port: u16, frame: &[u8]) {
        if !self.comms.load(Ordering::Relaxed) {
            return;
        }
        let mut stream = match TcpStream::connect((host, port)) {
            Ok(stream) => stream,
            Err(err) => {
                log::debug!(
                    "[transport] node {}: connect {}:{} failed: {}",
                    self.label,
                    host,
                    port,
                    err
                );
                return;
            }
        };
        let _ = stream.set_write_timeout(Some(WRITE_TIMEOUT));
        if let Err(err) = stream.write_all(frame) {
            log::debug!(
                "[transport] node {}: send to {}:{} failed: {}",
                self.label,
                host,
                port,
                err
            );
        }
    }
}

/// Inbound half: accept loop plus per-connection handler threads.
pub struct Listener {
    handle: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_port: u16,
}

impl Listener {
    /// Bind `host:port` and start the accept loop. Every complete frame is
    /// passed to `on_frame` on a per-connection thread.
    ///
    /// # Errors
    ///
    /// Returns `Error::Bind` if the socket cannot be bound.
    pub fn spawn<F>(
        label: u32,
        host: &str,
        port: u16,
        comms: Arc<AtomicBool>,
        on_frame: F,
    ) -> Result<Self>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind((host, port)).map_err(Error::Bind)?;
        let local_port = listener.local_addr().map(|addr| addr.port()).unwrap_or(port);
        listener.set_nonblocking(true)?;
        log::debug!("[transport] node {}: listening on {}:{}", label, host, local_port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = Arc::clone(&shutdown);
        let on_frame = Arc::new(on_frame);

        let handle = thread::spawn(move || {
            accept_loop(label, &listener, &comms, &shutdown_clone, &on_frame);
        });

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_port,
        })
    }

    /// Port actually bound (useful when spawned with port 0).
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Signal the accept loop to stop and wait for it.
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn accept_loop<F>(
    label: u32,
    listener: &TcpListener,
    comms: &Arc<AtomicBool>,
    shutdown: &Arc<AtomicBool>,
    on_frame: &Arc<F>,
) where
    F: Fn(Vec<u8>) + Send + Sync + 'static,
{
    loop {
        if shutdown.load(Ordering::Relaxed) {
            log::debug!("[transport] node {}: listener stopping", label);
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                // Paused: accept and immediately drop, nothing is read.
                if !comms.load(Ordering::Relaxed) {
                    drop(stream);
                    continue;
                }
                let on_frame = Arc::clone(on_frame);
                thread::spawn(move || {
                    if let Some(frame) = read_frame(stream) {
                        on_frame(frame);
                    } else {
                        log::debug!("[transport] node {}: empty read from {}", label, peer);
                    }
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                log::debug!("[transport] node {}: accept failed: {}", label, err);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

/// Read one frame: everything the peer writes until it closes, capped.
fn read_frame(stream: TcpStream) -> Option<Vec<u8>> {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));
    let mut buf = Vec::new();
    let mut bounded = stream.take(MAX_FRAME_BYTES);
    match bounded.read_to_end(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf),
        Err(_) => {
            // Timeout or reset mid-frame: whatever arrived is either a
            // complete frame or will fail decoding downstream.
            if buf.is_empty() {
                None
            } else {
                Some(buf)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Instant;

    fn wait_for<T>(timeout: Duration, mut poll: impl FnMut() -> Option<T>) -> Option<T> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Some(value) = poll() {
                return Some(value);
            }
            thread::sleep(Duration::from_millis(10));
        }
        None
    }

    #[test]
    fn test_frame_roundtrip_over_localhost() {
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let comms = Arc::new(AtomicBool::new(true));

        let listener = Listener::spawn(0, "127.0.0.1", 0, Arc::clone(&comms), move |frame| {
            received_clone.lock().push(frame);
        })
        .expect("bind");
        let port = listener.local_port();

        let sender = FrameSender::new(1, Arc::new(AtomicBool::new(true)));
        sender.send("127.0.0.1", port, b"[0][1][127.0.0.1][33001]");

        let frame = wait_for(Duration::from_secs(5), || {
            received.lock().first().cloned()
        })
        .expect("frame arrives");
        assert_eq!(frame, b"[0][1][127.0.0.1][33001]");

        listener.shutdown();
    }

    #[test]
    fn test_paused_listener_drops_inbound() {
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);
        let comms = Arc::new(AtomicBool::new(false));

        let listener = Listener::spawn(0, "127.0.0.1", 0, Arc::clone(&comms), move |frame| {
            received_clone.lock().push(frame);
        })
        .expect("bind");
        let port = listener.local_port();

        let sender = FrameSender::new(1, Arc::new(AtomicBool::new(true)));
        sender.send("127.0.0.1", port, b"[0][1][x][1]");

        // Give the accept loop time to take (and drop) the connection
        thread::sleep(Duration::from_millis(300));
        assert!(received.lock().is_empty());

        // Resume: frames flow again
        comms.store(true, Ordering::Relaxed);
        sender.send("127.0.0.1", port, b"[0][1][y][2]");
        let frame = wait_for(Duration::from_secs(5), || {
            received.lock().first().cloned()
        })
        .expect("frame after resume");
        assert_eq!(frame, b"[0][1][y][2]");

        listener.shutdown();
    }

    #[test]
    fn test_paused_sender_is_noop() {
        let received: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let received_clone = Arc::clone(&received);

        let listener = Listener::spawn(
            0,
            "127.0.0.1",
            0,
            Arc::new(AtomicBool::new(true)),
            move |frame| {
                received_clone.lock().push(frame);
            },
        )
        .expect("bind");
        let port = listener.local_port();

        let sender = FrameSender::new(1, Arc::new(AtomicBool::new(false)));
        sender.send("127.0.0.1", port, b"[0][1][x][1]");
        thread::sleep(Duration::from_millis(200));
        assert!(received.lock().is_empty());

        listener.shutdown();
    }

    #[test]
    fn test_send_to_dead_endpoint_is_swallowed() {
        let sender = FrameSender::new(1, Arc::new(AtomicBool::new(true)));
        // Nothing listens here; send must not panic or error out
        sender.send("127.0.0.1", 1, b"[0][1][x][1]");
    }

    #[test]
    fn test_handler_panic_does_not_kill_listener() {
        let hits: Arc<Mutex<u32>> = Arc::new(Mutex::new(0));
        let hits_clone = Arc::clone(&hits);

        let listener = Listener::spawn(
            0,
            "127.0.0.1",
            0,
            Arc::new(AtomicBool::new(true)),
            move |frame| {
                *hits_clone.lock() += 1;
                if frame == b"poison" {
                    panic!("handler poisoned");
                }
            },
        )
        .expect("bind");
        let port = listener.local_port();

        let sender = FrameSender::new(1, Arc::new(AtomicBool::new(true)));
        sender.send("127.0.0.1", port, b"poison");
        wait_for(Duration::from_secs(5), || {
            (*hits.lock() == 1).then_some(())
        })
        .expect("poison handled");

        // The accept loop survived the handler panic
        sender.send("127.0.0.1", port, b"healthy");
        wait_for(Duration::from_secs(5), || {
            (*hits.lock() == 2).then_some(())
        })
        .expect("listener still alive");

        listener.shutdown();
    }
}
