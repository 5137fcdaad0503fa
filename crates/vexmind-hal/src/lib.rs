//! `vexmind-hal` – Device Manager
//!
//! Owns the line-oriented serial link to the robot controller.
//!
//! # Modules
//!
//! - [`transport`] – [`LineReader`][transport::LineReader] and the
//!   [`Transport`][transport::Transport] pair; [`SerialTransport`][transport::SerialTransport]
//!   opens a real port and splits it into a reader half and a writer half.
//! - [`mailbox`] – [`ResponseMailbox`][mailbox::ResponseMailbox]: the
//!   single-slot, overwrite-on-write / consume-on-read response cell, plus
//!   `<#>…<#>` frame extraction.
//! - [`device`] – [`DeviceManager`][device::DeviceManager]: the listener and
//!   worker threads, FIFO command dispatch, and motion-duration pacing.
//! - [`sim`] – [`SimController`][sim::SimController]: an in-process
//!   controller that records outbound lines and acknowledges them, for tests
//!   and hardware-free runs.

use std::sync::{Mutex, MutexGuard};

pub mod device;
pub mod mailbox;
pub mod sim;
pub mod transport;

pub use device::{CommandSink, DeviceConfig, DeviceManager, QueueStatus, extract_duration};
pub use mailbox::{FRAME_MARKER, ResponseMailbox, extract_frame};
pub use sim::{SimController, SimHandle};
pub use transport::{BufferedLineReader, LineReader, SerialConfig, SerialTransport, Transport};

/// Lock `mutex`, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
