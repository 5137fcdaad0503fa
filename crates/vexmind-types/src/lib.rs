use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction token accepted by the controller's `vex robot move` verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MoveDirection {
    Forward,
    Backward,
    Left,
    Right,
    ArmUp,
    ArmDown,
    ClawOpen,
    ClawClose,
}

impl MoveDirection {
    /// Every direction, in grammar order.
    pub const ALL: [MoveDirection; 8] = [
        MoveDirection::Forward,
        MoveDirection::Backward,
        MoveDirection::Left,
        MoveDirection::Right,
        MoveDirection::ArmUp,
        MoveDirection::ArmDown,
        MoveDirection::ClawOpen,
        MoveDirection::ClawClose,
    ];

    /// The exact wire token (case-sensitive).
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveDirection::Forward => "forward",
            MoveDirection::Backward => "backward",
            MoveDirection::Left => "left",
            MoveDirection::Right => "right",
            MoveDirection::ArmUp => "armUp",
            MoveDirection::ArmDown => "armDown",
            MoveDirection::ClawOpen => "clawOpen",
            MoveDirection::ClawClose => "clawClose",
        }
    }

    /// Resolve a wire token back into a direction.
    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.as_str() == token)
    }
}

/// Addressable end-effector for the `set` / `get` verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Joint {
    Arm,
    Claw,
}

impl Joint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Joint::Arm => "arm",
            Joint::Claw => "claw",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "arm" => Some(Joint::Arm),
            "claw" => Some(Joint::Claw),
            _ => None,
        }
    }
}

/// A single instruction from the controller's closed command grammar.
///
/// The [`Display`](fmt::Display) impl produces the exact wire text (without
/// the trailing newline the device manager appends).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verb", rename_all = "snake_case")]
pub enum Command {
    /// Timed motion: `vex robot move <direction> <velocity> <duration>`.
    Move {
        direction: MoveDirection,
        velocity: u16,
        /// Seconds.
        duration: f64,
    },
    /// `vex motor all stop`
    StopAll,
    /// `vex robot set <arm|claw> <0|1>`
    Set { joint: Joint, engaged: bool },
    /// `vex robot get <arm|claw>`
    Get { joint: Joint },
    /// `vex battery getCapacity`
    BatteryCapacity,
    /// `vex ping`
    Ping,
}

impl Command {
    /// `true` for commands that physically move the robot for a duration.
    pub fn is_motion(&self) -> bool {
        matches!(self, Command::Move { .. })
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move {
                direction,
                velocity,
                duration,
            } => write!(
                f,
                "vex robot move {} {} {}",
                direction.as_str(),
                velocity,
                duration
            ),
            Command::StopAll => f.write_str("vex motor all stop"),
            Command::Set { joint, engaged } => {
                write!(f, "vex robot set {} {}", joint.as_str(), u8::from(*engaged))
            }
            Command::Get { joint } => write!(f, "vex robot get {}", joint.as_str()),
            Command::BatteryCapacity => f.write_str("vex battery getCapacity"),
            Command::Ping => f.write_str("vex ping"),
        }
    }
}

/// Acceptance state of a submitted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Pending,
    Accepted,
    Denied,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Pending => "pending",
            GoalStatus::Accepted => "accepted",
            GoalStatus::Denied => "denied",
        }
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reason attached to a freshly created goal before any decision is made.
pub const DEFAULT_GOAL_REASON: &str = "No reason provided.";

/// A client-submitted natural-language goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalRecord {
    pub id: String,
    pub request: String,
    pub status: GoalStatus,
    pub reason: String,
}

impl GoalRecord {
    /// Build a `pending` goal with the default reason.
    pub fn new(id: impl Into<String>, request: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            request: request.into(),
            status: GoalStatus::Pending,
            reason: DEFAULT_GOAL_REASON.to_string(),
        }
    }
}

/// Point-in-time snapshot of the orchestration service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceState {
    pub running: bool,
    pub active_goal: Option<String>,
    pub commands_executed: usize,
    pub log_size: usize,
}

/// One captured log line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    /// Upper-case level name, e.g. `"INFO"`.
    pub level: String,
    /// Emitting component, e.g. `"vexmind_hal::device"`.
    pub target: String,
    pub message: String,
}

/// Global error type spanning serial transport failures, malformed device
/// frames, grammar rejections and oracle outages.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VexError {
    #[error("Transport failure on {port}: {details}")]
    Transport { port: String, details: String },

    #[error("Malformed device frame: {0}")]
    Parse(String),

    #[error("Command rejected by grammar: {0}")]
    Validation(String),

    #[error("Reasoning oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("Scene capture failed: {0}")]
    SceneUnavailable(String),

    #[error("Device command queue is closed")]
    DeviceStopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn move_command_renders_wire_text() {
        let cmd = Command::Move {
            direction: MoveDirection::Forward,
            velocity: 10,
            duration: 3.0,
        };
        assert_eq!(cmd.to_string(), "vex robot move forward 10 3");

        let cmd = Command::Move {
            direction: MoveDirection::ClawOpen,
            velocity: 120,
            duration: 1.5,
        };
        assert_eq!(cmd.to_string(), "vex robot move clawOpen 120 1.5");
    }

    #[test]
    fn fixed_commands_render_wire_text() {
        assert_eq!(Command::StopAll.to_string(), "vex motor all stop");
        assert_eq!(Command::Ping.to_string(), "vex ping");
        assert_eq!(
            Command::BatteryCapacity.to_string(),
            "vex battery getCapacity"
        );
        assert_eq!(
            Command::Set {
                joint: Joint::Claw,
                engaged: true
            }
            .to_string(),
            "vex robot set claw 1"
        );
        assert_eq!(
            Command::Get { joint: Joint::Arm }.to_string(),
            "vex robot get arm"
        );
    }

    #[test]
    fn direction_tokens_resolve() {
        for d in MoveDirection::ALL {
            assert_eq!(MoveDirection::from_token(d.as_str()), Some(d));
        }
        assert_eq!(MoveDirection::from_token("ArmUp"), None);
        assert_eq!(MoveDirection::from_token("up"), None);
    }

    #[test]
    fn only_move_is_motion() {
        assert!(
            Command::Move {
                direction: MoveDirection::Left,
                velocity: 50,
                duration: 1.0
            }
            .is_motion()
        );
        assert!(!Command::StopAll.is_motion());
        assert!(!Command::Ping.is_motion());
    }

    #[test]
    fn new_goal_is_pending_with_default_reason() {
        let goal = GoalRecord::new("g1", "go to the kitchen");
        assert_eq!(goal.status, GoalStatus::Pending);
        assert_eq!(goal.reason, DEFAULT_GOAL_REASON);
    }

    #[test]
    fn goal_status_serializes_lowercase() {
        let goal = GoalRecord::new("g1", "wave");
        let json = serde_json::to_string(&goal).unwrap();
        assert!(json.contains("\"pending\""));
    }

    #[test]
    fn goal_missing_field_fails_to_deserialize() {
        let raw = r#"{"id":"g1","request":"wave","status":"pending"}"#;
        assert!(serde_json::from_str::<GoalRecord>(raw).is_err());
    }

    #[test]
    fn vex_error_display() {
        let err = VexError::Transport {
            port: "/dev/ttyACM1".to_string(),
            details: "broken pipe".to_string(),
        };
        assert!(err.to_string().contains("/dev/ttyACM1"));
        assert!(VexError::DeviceStopped.to_string().contains("closed"));
    }
}
