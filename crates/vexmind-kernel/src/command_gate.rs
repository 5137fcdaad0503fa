//! [`CommandGate`] – the single checkpoint between model output and the
//! device queue.
//!
//! [`CommandGate::validate_and_adjust`] runs in three steps:
//!
//! 1. **Parse** the text leniently into a typed command.  Non-motion
//!    commands are already exact and pass through unchanged.
//! 2. **Adjust** motion commands: a missing duration becomes
//!    [`DEFAULT_DURATION_SECS`], then velocity and duration are clamped by
//!    [`MotionLimits::clamp`].
//! 3. **Re-check** the rendered wire text with the strict parser.  A command
//!    that still fails here is rejected.
//!
//! # Example
//!
//! ```
//! use vexmind_kernel::CommandGate;
//!
//! let gate = CommandGate::default();
//! let cmd = gate.validate_and_adjust("vex robot move forward 5 10").unwrap();
//! assert_eq!(cmd.to_string(), "vex robot move forward 10 3");
//! ```

use tracing::debug;
use vexmind_types::Command;

use crate::grammar::{self, GrammarError, ParsedCommand};
use crate::limits::{DEFAULT_DURATION_SECS, MotionLimits};

/// Grammar validator and safety clamp for generated commands.
#[derive(Debug, Clone, Default)]
pub struct CommandGate {
    limits: MotionLimits,
}

impl CommandGate {
    pub fn new(limits: MotionLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &MotionLimits {
        &self.limits
    }

    /// Validate `raw` against the grammar, clamping motion values into the
    /// configured envelope.
    ///
    /// # Errors
    ///
    /// Returns the [`GrammarError`] of the first failing step.
    pub fn validate_and_adjust(&self, raw: &str) -> Result<Command, GrammarError> {
        let request = match grammar::parse_lenient(raw)? {
            ParsedCommand::Fixed(cmd) => return Ok(cmd),
            ParsedCommand::Motion(req) => req,
        };

        let requested_duration = request.duration.unwrap_or(DEFAULT_DURATION_SECS);
        let (velocity, duration) = self.limits.clamp(request.velocity, requested_duration);
        let adjusted = Command::Move {
            direction: request.direction,
            velocity,
            duration,
        };
        let wire = adjusted.to_string();

        if u32::from(velocity) != request.velocity || request.duration != Some(duration) {
            debug!(
                requested_velocity = request.velocity,
                requested_duration = ?request.duration,
                command = %wire,
                "motion command adjusted into limits"
            );
        }

        grammar::parse_strict(&wire, &self.limits)
    }

    /// `true` when `raw` is already an exact, in-range command.
    pub fn is_valid(&self, raw: &str) -> bool {
        grammar::parse_strict(raw, &self.limits).is_ok()
    }
}
