//! [`CommandGenerator`] – turns a free-form thought into one controller
//! command.
//!
//! The oracle is asked for exactly one command from the catalogue; the reply
//! goes through [`CommandGate::validate_and_adjust`].  If it is still not a
//! command, the oracle gets one corrective re-prompt quoting the rejected
//! text.  There is no third attempt.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};
use vexmind_kernel::{CommandGate, GrammarError};
use vexmind_types::{Command, VexError};

use crate::oracle::{COMMAND_MODEL, ChatMessage, Oracle, ThinkRequest};

/// Command templates shown to the oracle.
pub const COMMAND_CATALOGUE: [&str; 6] = [
    "vex robot move (forward|backward|left|right|armUp|armDown|clawOpen|clawClose) (10-188) (0.5-3)",
    "vex motor all stop",
    "vex robot set (arm|claw) (0-1)",
    "vex robot get (arm|claw)",
    "vex battery getCapacity",
    "vex ping",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerateError {
    /// The oracle gave no usable reply.
    #[error("no command generated: {0}")]
    Oracle(String),
    /// Both attempts produced text outside the grammar.
    #[error("no valid command generated from thought process: {candidate:?} ({reason})")]
    Invalid {
        candidate: String,
        reason: GrammarError,
    },
}

impl From<GenerateError> for VexError {
    fn from(e: GenerateError) -> Self {
        match e {
            GenerateError::Oracle(msg) => VexError::OracleUnavailable(msg),
            GenerateError::Invalid { .. } => VexError::Validation(e.to_string()),
        }
    }
}

fn catalogue() -> String {
    COMMAND_CATALOGUE.join("\n")
}

fn decision_prompt(thought: &str) -> String {
    format!(
        "COMMAND MODE: You are a robot controller AI. Based on the user's intent, generate a \
         valid command from the provided list of commands. You may change placeholder values \
         (velocity, duration) to match the thought process. Velocity 10-30 is slow, 90-188 is \
         fast, anything in between is medium. Return only the exact command string, without \
         explanations.\n---\nUser's Thought Process: {thought}\n\nAvailable Commands:\n{}",
        catalogue()
    )
}

fn revision_prompt(invalid: &str) -> String {
    format!(
        "COMMAND MODE: The command generated does not match the required structure or \
         contains invalid values. Rewrite it to STRICTLY conform to one of the formats below, \
         with velocity and duration inside the valid ranges. Respond ONLY with the rewritten \
         command.\n---\nInvalid Command: {invalid}\n\nAvailable Commands:\n{}",
        catalogue()
    )
}

pub struct CommandGenerator {
    oracle: Arc<dyn Oracle>,
    gate: CommandGate,
    model: String,
}

impl CommandGenerator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            gate: CommandGate::default(),
            model: COMMAND_MODEL.to_string(),
        }
    }

    pub fn with_gate(mut self, gate: CommandGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn gate(&self) -> &CommandGate {
        &self.gate
    }

    /// Map `thought` to a validated, clamped command.
    ///
    /// # Errors
    ///
    /// [`GenerateError::Oracle`] when the oracle does not answer, and
    /// [`GenerateError::Invalid`] when the corrective retry also fails the
    /// grammar.
    pub async fn generate_command(&self, thought: &str) -> Result<Command, GenerateError> {
        info!(thought, "generating command");

        let first = self
            .ask("command-generation", decision_prompt(thought))
            .await?;
        let rejection = match self.gate.validate_and_adjust(&first) {
            Ok(cmd) => return Ok(cmd),
            Err(e) => e,
        };
        warn!(candidate = %first, error = %rejection, "generated command rejected; requesting revision");

        let revised = self.ask("command-revision", revision_prompt(&first)).await?;
        self.gate.validate_and_adjust(&revised).map_err(|reason| {
            error!(candidate = %revised, error = %reason, "no valid command generated from thought process");
            GenerateError::Invalid {
                candidate: revised,
                reason,
            }
        })
    }

    async fn ask(&self, intent: &str, prompt: String) -> Result<String, GenerateError> {
        let request =
            ThinkRequest::new(intent, vec![ChatMessage::user(prompt)]).with_model(&self.model);
        self.oracle.think(request).await.map_err(|e| {
            error!(intent, error = %e, "no command generated");
            GenerateError::Oracle(e.to_string())
        })
    }
}
