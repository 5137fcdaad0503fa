//! [`DeviceManager`] – owns the controller link and serialises access to it.
//!
//! Two background threads run for the manager's lifetime:
//!
//! - **listener** reads inbound lines, extracts the `<#>…<#>` payload and
//!   stores it in the [`ResponseMailbox`].  An empty frame, malformed input
//!   and I/O errors clear the mailbox; none of them ends the thread.
//! - **worker** pops commands from a FIFO queue one at a time, writes each
//!   as `cmd\n`, waits out the duration of timed motion commands, then polls
//!   the mailbox for a bounded number of attempts.
//!
//! Responses are correlated positionally: the value consumed after a send is
//! whatever occupies the mailbox at that point.  This is sound only while a
//! single command is in flight, which the worker guarantees.

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};
use vexmind_types::VexError;

use crate::lock;
use crate::mailbox::{ResponseMailbox, extract_frame};
use crate::transport::{LineReader, SerialConfig, SerialTransport, Transport};

const MOTION_PREFIX: &str = "vex robot move";

/// Longest uninterrupted sleep inside a wait; bounds stop latency.
const WAIT_SLICE: Duration = Duration::from_millis(50);

// ────────────────────────────────────────────────────────────────────────────
// Public surface
// ────────────────────────────────────────────────────────────────────────────

/// Anything that accepts controller commands for asynchronous delivery.
///
/// Implemented by [`DeviceManager`]; the orchestration loop depends only on
/// this trait.
pub trait CommandSink: Send + Sync {
    /// Enqueue `command`.  `priority` is accepted for compatibility and
    /// ignored: delivery is strictly FIFO.
    ///
    /// # Errors
    ///
    /// [`VexError::DeviceStopped`] once the sink no longer accepts work.
    fn add_command(&self, command: &str, priority: bool) -> Result<(), VexError>;
}

/// Timing knobs for the worker and listener threads.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    /// How long the worker blocks on an empty queue before re-checking the
    /// stop flag.
    pub command_poll_interval: Duration,
    /// Pause between mailbox checks after a send.
    pub response_poll_interval: Duration,
    /// Mailbox checks per command before giving up.
    pub response_poll_attempts: u32,
    /// Listener pause after an I/O error.
    pub error_backoff: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            command_poll_interval: Duration::from_secs(1),
            response_poll_interval: Duration::from_secs(1),
            response_poll_attempts: 5,
            error_backoff: Duration::from_millis(100),
        }
    }
}

/// Snapshot returned by [`DeviceManager::queue_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub queued_commands: usize,
    pub is_running: bool,
}

/// Extract the trailing duration, in seconds, from a timed motion command.
///
/// Only `vex robot move <dir> <v> <d>` carries a duration.  Anything else,
/// or a motion command without a third argument, yields `None`.  A duration
/// that does not parse as a non-negative finite number is logged and also
/// yields `None`.
pub fn extract_duration(command: &str) -> Option<f64> {
    let args = command.trim().strip_prefix(MOTION_PREFIX)?;
    if !args.is_empty() && !args.starts_with(char::is_whitespace) {
        return None;
    }
    let tokens: Vec<&str> = args.split_whitespace().collect();
    if tokens.len() < 3 {
        return None;
    }
    let last = tokens[tokens.len() - 1];
    match last.parse::<f64>() {
        Ok(d) if d.is_finite() && d >= 0.0 => Some(d),
        _ => {
            warn!(command, duration = last, "invalid duration format in command");
            None
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DeviceManager
// ────────────────────────────────────────────────────────────────────────────

struct Shared {
    label: String,
    config: DeviceConfig,
    stop: AtomicBool,
    mailbox: ResponseMailbox,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    queued: AtomicUsize,
}

/// Serial link owner with a FIFO command queue.
///
/// Dropping the manager stops it.
pub struct DeviceManager {
    shared: Arc<Shared>,
    queue: Mutex<Option<Sender<String>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceManager {
    /// Open a real serial port and start the background threads.
    ///
    /// # Errors
    ///
    /// [`VexError::Transport`] when the port cannot be opened or the threads
    /// cannot be spawned.
    pub fn open_serial(serial: &SerialConfig, config: DeviceConfig) -> Result<Self, VexError> {
        let transport = SerialTransport::open(serial)?;
        Self::new(transport, config)
    }

    /// Take ownership of `transport` and start the listener and worker.
    ///
    /// # Errors
    ///
    /// [`VexError::Transport`] when a thread cannot be spawned.
    pub fn new(transport: Transport, config: DeviceConfig) -> Result<Self, VexError> {
        let Transport {
            label,
            reader,
            writer,
        } = transport;
        let shared = Arc::new(Shared {
            label,
            config,
            stop: AtomicBool::new(false),
            mailbox: ResponseMailbox::new(),
            writer: Mutex::new(Some(writer)),
            queued: AtomicUsize::new(0),
        });
        let (tx, rx) = mpsc::channel();

        let spawn_err = |e: std::io::Error| VexError::Transport {
            port: shared.label.clone(),
            details: format!("failed to spawn device thread: {e}"),
        };

        let listener = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("vex-listener".into())
                .spawn(move || shared.run_listener(reader))
                .map_err(spawn_err)?
        };
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("vex-worker".into())
                .spawn(move || shared.run_worker(rx))
        };
        let worker = match worker {
            Ok(handle) => handle,
            Err(e) => {
                shared.stop.store(true, Ordering::SeqCst);
                let _ = listener.join();
                return Err(spawn_err(e));
            }
        };

        info!(port = %shared.label, "device manager started");

        Ok(Self {
            shared,
            queue: Mutex::new(Some(tx)),
            listener: Mutex::new(Some(listener)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Write `command` plus a newline to the link immediately, bypassing the
    /// queue.  Failures are logged, never returned.
    pub fn send_command(&self, command: &str) {
        self.shared.send(command);
    }

    /// Enqueue `command` for the worker.  See [`CommandSink::add_command`].
    ///
    /// # Errors
    ///
    /// [`VexError::DeviceStopped`] after [`stop`](Self::stop).
    pub fn add_command(&self, command: &str, priority: bool) -> Result<(), VexError> {
        if priority {
            debug!(command, "priority flag ignored; queue is FIFO");
        }
        let queue = lock(&self.queue);
        let tx = queue.as_ref().ok_or(VexError::DeviceStopped)?;
        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if tx.send(command.to_string()).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(VexError::DeviceStopped);
        }
        info!(command, "command added to queue");
        Ok(())
    }

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            queued_commands: self.shared.queued.load(Ordering::SeqCst),
            is_running: self.is_running(),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.shared.stopped()
    }

    /// Stop both threads and close the link.
    ///
    /// Returns within roughly the longer of the transport read timeout and
    /// the command poll interval.  Commands still queued are discarded.  Calling `stop` again
    /// is a no-op.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        lock(&self.queue).take();

        // Close the write half first; the read half goes with the listener.
        let closed = lock(&self.shared.writer).take().map(|mut writer| {
            let _ = writer.flush();
        });

        for (name, slot) in [("worker", &self.worker), ("listener", &self.listener)] {
            let handle = lock(slot).take();
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!(thread = name, "device thread panicked");
                }
            }
        }

        if closed.is_some() {
            self.shared.queued.store(0, Ordering::SeqCst);
            info!(port = %self.shared.label, "device manager stopped");
        }
    }
}

impl CommandSink for DeviceManager {
    fn add_command(&self, command: &str, priority: bool) -> Result<(), VexError> {
        DeviceManager::add_command(self, command, priority)
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.stop();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Thread bodies
// ────────────────────────────────────────────────────────────────────────────

impl Shared {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn send(&self, command: &str) {
        let mut guard = lock(&self.writer);
        let Some(writer) = guard.as_mut() else {
            error!(command, "cannot send command: link closed");
            return;
        };
        let result = writer
            .write_all(format!("{command}\n").as_bytes())
            .and_then(|()| writer.flush());
        match result {
            Ok(()) => info!(command, "sent command"),
            Err(e) => {
                let err = VexError::Transport {
                    port: self.label.clone(),
                    details: e.to_string(),
                };
                error!(command, error = %err, "error while sending command");
            }
        }
    }

    /// Sleep for `total`, waking early on stop.  Returns `false` if stopped.
    fn wait(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.stopped() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }

    fn await_response(&self) -> Option<String> {
        for _ in 0..self.config.response_poll_attempts {
            if let Some(response) = self.mailbox.take() {
                return Some(response);
            }
            if !self.wait(self.config.response_poll_interval) {
                return None;
            }
        }
        None
    }

    fn run_worker(&self, rx: Receiver<String>) {
        while !self.stopped() {
            let command = match rx.recv_timeout(self.config.command_poll_interval) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            // Saturating: stop() may already have zeroed the counter.
            let _ = self
                .queued
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if self.stopped() {
                break;
            }

            info!(command = %command, "processing command");
            self.send(&command);

            if let Some(seconds) = extract_duration(&command) {
                info!(seconds, "waiting for motion to complete");
                if !self.wait(Duration::from_secs_f64(seconds)) {
                    break;
                }
            }

            match self.await_response() {
                Some(response) => info!(command = %command, response = %response, "command completed"),
                None if self.stopped() => break,
                None => warn!(command = %command, "no response received"),
            }
        }
        debug!("worker thread exiting");
    }

    fn run_listener(&self, mut reader: Box<dyn LineReader>) {
        while !self.stopped() {
            match reader.read_line() {
                Ok(None) => {}
                Ok(Some(bytes)) => match String::from_utf8(bytes) {
                    Ok(line) => self.accept_line(line.trim()),
                    Err(e) => {
                        self.mailbox.clear();
                        let err = VexError::Parse(e.to_string());
                        error!(error = %err, "error decoding controller output");
                    }
                },
                Err(e) => {
                    if self.stopped() {
                        break;
                    }
                    self.mailbox.clear();
                    let err = VexError::Transport {
                        port: self.label.clone(),
                        details: e.to_string(),
                    };
                    error!(error = %err, "error reading from controller");
                    self.wait(self.config.error_backoff);
                }
            }
        }
        debug!("listener thread exiting");
    }

    fn accept_line(&self, line: &str) {
        match extract_frame(line) {
            Some("") => {
                // An empty reply still replaces whatever was waiting.
                debug!("empty response frame; mailbox cleared");
                self.mailbox.clear();
            }
            Some(payload) => {
                info!(response = payload, "received response");
                self.mailbox.put(payload.to_string());
            }
            None if line.is_empty() => {}
            None => debug!(line, "unframed controller output ignored"),
        }
    }
}
