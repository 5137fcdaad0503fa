//! `vexmind-kernel` – Command Safety
//!
//! Nothing model-generated reaches the serial port without passing through
//! this crate.  It does not think; it parses, clamps and rejects.
//!
//! # Modules
//!
//! - [`grammar`] – tokenizer and parser for the closed controller grammar,
//!   producing a typed [`Command`][vexmind_types::Command].
//! - [`limits`] – [`MotionLimits`][limits::MotionLimits]: the velocity and
//!   duration envelope applied as a pure clamp.
//! - [`command_gate`] – [`CommandGate`][command_gate::CommandGate]: parse,
//!   adjust, and strictly re-check a generated command in one call.

pub mod command_gate;
pub mod grammar;
pub mod limits;

pub use command_gate::CommandGate;
pub use grammar::{GrammarError, MotionRequest, ParsedCommand, parse_lenient, parse_strict};
pub use limits::{DEFAULT_DURATION_SECS, MotionLimits};
