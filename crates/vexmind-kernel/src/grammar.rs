//! Tokenizer and parser for the controller's closed command grammar.
//!
//! ```text
//! vex robot move <forward|backward|left|right|armUp|armDown|clawOpen|clawClose> <velocity> <duration>
//! vex motor all stop
//! vex robot set <arm|claw> <0|1>
//! vex robot get <arm|claw>
//! vex battery getCapacity
//! vex ping
//! ```
//!
//! Two entry points are provided:
//!
//! - [`parse_lenient`] accepts a motion command with any non-negative
//!   velocity/duration and an optional duration, returning a
//!   [`ParsedCommand::Motion`] for the caller to clamp.
//! - [`parse_strict`] requires every token, including the duration, and
//!   range-checks motion values against [`MotionLimits`].

use thiserror::Error;
use vexmind_types::{Command, Joint, MoveDirection};

use crate::limits::MotionLimits;

/// Reasons a piece of text is not a command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GrammarError {
    #[error("empty command")]
    Empty,
    #[error("not a controller command: {0}")]
    UnknownCommand(String),
    #[error("unknown move direction: {0}")]
    UnknownDirection(String),
    #[error("unknown joint: {0}")]
    UnknownJoint(String),
    #[error("missing {0}")]
    MissingArgument(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: String },
    #[error("unexpected trailing input: {0}")]
    TrailingTokens(String),
}

/// Motion values as requested, before any clamping.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionRequest {
    pub direction: MoveDirection,
    pub velocity: u32,
    pub duration: Option<f64>,
}

/// Output of [`parse_lenient`].
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedCommand {
    Motion(MotionRequest),
    /// Any non-motion command; these carry no tunable values.
    Fixed(Command),
}

/// Strip whitespace plus the backticks and quotes a model tends to wrap
/// around a one-line answer.
pub fn normalize(raw: &str) -> &str {
    raw.trim()
        .trim_matches(|c: char| c == '`' || c == '"' || c == '\'')
        .trim()
}

/// Parse `raw` allowing an omitted duration and out-of-range values.
pub fn parse_lenient(raw: &str) -> Result<ParsedCommand, GrammarError> {
    let text = normalize(raw);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    match tokens.as_slice() {
        [] => Err(GrammarError::Empty),
        ["vex", "robot", "move", rest @ ..] => parse_motion(rest).map(ParsedCommand::Motion),
        ["vex", "motor", "all", "stop", rest @ ..] => fixed(Command::StopAll, rest),
        ["vex", "robot", "set", rest @ ..] => parse_set(rest),
        ["vex", "robot", "get", rest @ ..] => match rest {
            [] => Err(GrammarError::MissingArgument("joint")),
            [joint, tail @ ..] => fixed(Command::Get { joint: joint_token(joint)? }, tail),
        },
        ["vex", "battery", "getCapacity", rest @ ..] => fixed(Command::BatteryCapacity, rest),
        ["vex", "ping", rest @ ..] => fixed(Command::Ping, rest),
        _ => Err(GrammarError::UnknownCommand(text.to_string())),
    }
}

/// Parse `raw` as an exact, in-range command.
pub fn parse_strict(raw: &str, limits: &MotionLimits) -> Result<Command, GrammarError> {
    match parse_lenient(raw)? {
        ParsedCommand::Fixed(cmd) => Ok(cmd),
        ParsedCommand::Motion(req) => {
            let duration = req
                .duration
                .ok_or(GrammarError::MissingArgument("duration"))?;
            limits.check(req.velocity, duration)?;
            Ok(Command::Move {
                direction: req.direction,
                velocity: req.velocity as u16,
                duration,
            })
        }
    }
}

fn fixed(cmd: Command, rest: &[&str]) -> Result<ParsedCommand, GrammarError> {
    if rest.is_empty() {
        Ok(ParsedCommand::Fixed(cmd))
    } else {
        Err(GrammarError::TrailingTokens(rest.join(" ")))
    }
}

fn parse_motion(args: &[&str]) -> Result<MotionRequest, GrammarError> {
    let (dir, velocity, duration, rest) = match args {
        [] => return Err(GrammarError::MissingArgument("direction")),
        [_] => return Err(GrammarError::MissingArgument("velocity")),
        [dir, v] => (*dir, *v, None, &[][..]),
        [dir, v, d, rest @ ..] => (*dir, *v, Some(*d), rest),
    };
    if !rest.is_empty() {
        return Err(GrammarError::TrailingTokens(rest.join(" ")));
    }
    let direction = MoveDirection::from_token(dir)
        .ok_or_else(|| GrammarError::UnknownDirection(dir.to_string()))?;
    let velocity = parse_velocity(velocity)?;
    let duration = duration.map(parse_duration).transpose()?;
    Ok(MotionRequest {
        direction,
        velocity,
        duration,
    })
}

fn parse_set(args: &[&str]) -> Result<ParsedCommand, GrammarError> {
    match args {
        [] => Err(GrammarError::MissingArgument("joint")),
        [_] => Err(GrammarError::MissingArgument("state")),
        [joint, state, rest @ ..] => {
            let joint = joint_token(joint)?;
            let engaged = match *state {
                "0" => false,
                "1" => true,
                other => {
                    return Err(GrammarError::InvalidNumber {
                        field: "state",
                        value: other.to_string(),
                    });
                }
            };
            fixed(Command::Set { joint, engaged }, rest)
        }
    }
}

fn joint_token(token: &str) -> Result<Joint, GrammarError> {
    Joint::from_token(token).ok_or_else(|| GrammarError::UnknownJoint(token.to_string()))
}

fn parse_velocity(token: &str) -> Result<u32, GrammarError> {
    let invalid = || GrammarError::InvalidNumber {
        field: "velocity",
        value: token.to_string(),
    };
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    // Digit-only but too wide for u32 still means "very fast": saturate.
    Ok(token.parse::<u32>().unwrap_or(u32::MAX))
}

fn parse_duration(token: &str) -> Result<f64, GrammarError> {
    let invalid = || GrammarError::InvalidNumber {
        field: "duration",
        value: token.to_string(),
    };
    let well_formed = !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit() || b == b'.')
        && token.bytes().filter(|b| *b == b'.').count() <= 1
        && token.bytes().any(|b| b.is_ascii_digit());
    if !well_formed {
        return Err(invalid());
    }
    token.parse::<f64>().map_err(|_| invalid())
}
