//! In-process controller simulation for tests and hardware-free runs.
//!
//! [`SimController`] builds a [`Transport`] whose writer records every
//! outbound line and, unless silenced, answers each one with a framed
//! acknowledgement on the reader side.  The paired [`SimHandle`] inspects
//! what was sent and injects inbound traffic.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use vexmind_hal::{DeviceConfig, DeviceManager, SimController};
//!
//! let (transport, handle) = SimController::new().build();
//! let device = DeviceManager::new(transport, DeviceConfig::default()).unwrap();
//! device.add_command("vex ping", false).unwrap();
//!
//! let deadline = std::time::Instant::now() + Duration::from_secs(2);
//! while handle.sent_lines().is_empty() && std::time::Instant::now() < deadline {
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! assert_eq!(handle.sent_lines(), vec!["vex ping".to_string()]);
//! device.stop();
//! ```

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::lock;
use crate::mailbox::FRAME_MARKER;
use crate::transport::{LineReader, Transport};

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Builder for a simulated controller link.
pub struct SimController {
    read_timeout: Duration,
    auto_reply: bool,
}

impl Default for SimController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimController {
    pub fn new() -> Self {
        Self {
            read_timeout: Duration::from_millis(50),
            auto_reply: true,
        }
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Never acknowledge outbound lines.
    pub fn silent(mut self) -> Self {
        self.auto_reply = false;
        self
    }

    pub fn build(self) -> (Transport, SimHandle) {
        let (tx, rx) = mpsc::channel();
        let state = Arc::new(SimState {
            sent: Mutex::new(Vec::new()),
            raw: Mutex::new(Vec::new()),
            auto_reply: AtomicBool::new(self.auto_reply),
            fail_writes: AtomicBool::new(false),
        });
        let transport = Transport {
            label: "sim".to_string(),
            reader: Box::new(SimReader {
                rx,
                timeout: self.read_timeout,
            }),
            writer: Box::new(SimWriter {
                state: Arc::clone(&state),
                inbound: tx.clone(),
                partial: Vec::new(),
            }),
        };
        (transport, SimHandle { state, inbound: tx })
    }
}

/// The canned answer the simulator frames for an outbound command.
pub fn sim_reply(command: &str) -> String {
    match command {
        "vex ping" => "pong".to_string(),
        "vex battery getCapacity" => "100".to_string(),
        other => match other.strip_prefix("vex robot get ") {
            Some(joint) => format!("{joint} 0"),
            None => "ok".to_string(),
        },
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Shared state and handle
// ────────────────────────────────────────────────────────────────────────────

/// One line written by the device manager.
#[derive(Debug, Clone)]
pub struct SentLine {
    pub at: Instant,
    pub text: String,
}

struct SimState {
    sent: Mutex<Vec<SentLine>>,
    raw: Mutex<Vec<u8>>,
    auto_reply: AtomicBool,
    fail_writes: AtomicBool,
}

/// Test-side view of a simulated link.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<SimState>,
    inbound: Sender<Vec<u8>>,
}

impl SimHandle {
    pub fn sent_lines(&self) -> Vec<String> {
        lock(&self.state.sent).iter().map(|l| l.text.clone()).collect()
    }

    pub fn sent(&self) -> Vec<SentLine> {
        lock(&self.state.sent).clone()
    }

    /// Every byte written, terminators included.
    pub fn sent_bytes(&self) -> Vec<u8> {
        lock(&self.state.raw).clone()
    }

    /// Deliver `line` to the reader side as if the controller printed it.
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        let _ = self.inbound.send(bytes);
    }

    /// Deliver raw bytes as one inbound line.
    pub fn push_bytes(&self, bytes: Vec<u8>) {
        let _ = self.inbound.send(bytes);
    }

    pub fn set_auto_reply(&self, enabled: bool) {
        self.state.auto_reply.store(enabled, Ordering::SeqCst);
    }

    /// Make every subsequent write fail with a broken pipe.
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Link halves
// ────────────────────────────────────────────────────────────────────────────

struct SimReader {
    rx: Receiver<Vec<u8>>,
    timeout: Duration,
}

impl LineReader for SimReader {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(mut bytes) => {
                while matches!(bytes.last(), Some(b'\n' | b'\r')) {
                    bytes.pop();
                }
                Ok(Some(bytes))
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated link closed",
            )),
        }
    }
}

struct SimWriter {
    state: Arc<SimState>,
    inbound: Sender<Vec<u8>>,
    partial: Vec<u8>,
}

impl Write for SimWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "simulated write failure",
            ));
        }
        lock(&self.state.raw).extend_from_slice(buf);
        self.partial.extend_from_slice(buf);

        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            if self.state.auto_reply.load(Ordering::SeqCst) {
                let reply = format!("{FRAME_MARKER}{}{FRAME_MARKER}\n", sim_reply(&text));
                let _ = self.inbound.send(reply.into_bytes());
            }
            lock(&self.state.sent).push(SentLine {
                at: Instant::now(),
                text,
            });
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
