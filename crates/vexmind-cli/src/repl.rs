//! REPL – Read-Eval-Print Loop for the vexmind interactive shell.
//!
//! Supported slash-commands:
//!   /start               – start the orchestration loop
//!   /stop                – stop the orchestration loop
//!   /status              – service state
//!   /goal <id> <text>    – submit a goal
//!   /goals               – list queued goals
//!   /review              – decide every pending goal
//!   /clear               – drop all queued goals
//!   /exec <command>      – queue a controller command
//!   /estop               – send `vex motor all stop` immediately
//!   /commands            – commands executed by the loop
//!   /logs [level]        – recent log entries
//!   /queue               – device queue status
//!   /help                – show this list
//!   /quit | /exit        – shut down and exit

use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::runtime::Runtime;
use vexmind_runtime::AppContext;
use vexmind_types::{GoalRecord, GoalStatus};

/// One parsed line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplCommand {
    Start,
    Stop,
    Status,
    Goal { id: String, text: String },
    Goals,
    Review,
    Clear,
    Exec(String),
    EmergencyStop,
    Commands,
    Logs(Option<String>),
    Queue,
    Help,
    Quit,
    /// Known command, wrong arguments; carries the usage line.
    Usage(&'static str),
    Unknown(String),
}

pub fn parse(line: &str) -> Option<ReplCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = match line.split_once(char::is_whitespace) {
        Some((head, rest)) => (head, rest.trim()),
        None => (line, ""),
    };

    let cmd = match head {
        "/start" => ReplCommand::Start,
        "/stop" => ReplCommand::Stop,
        "/status" => ReplCommand::Status,
        "/goal" => match rest.split_once(char::is_whitespace) {
            Some((id, text)) if !text.trim().is_empty() => ReplCommand::Goal {
                id: id.to_string(),
                text: text.trim().to_string(),
            },
            _ => ReplCommand::Usage("/goal <id> <text>"),
        },
        "/goals" => ReplCommand::Goals,
        "/review" => ReplCommand::Review,
        "/clear" => ReplCommand::Clear,
        "/exec" if rest.is_empty() => ReplCommand::Usage("/exec <command>"),
        "/exec" => ReplCommand::Exec(rest.to_string()),
        "/estop" => ReplCommand::EmergencyStop,
        "/commands" => ReplCommand::Commands,
        "/logs" if rest.is_empty() => ReplCommand::Logs(None),
        "/logs" => ReplCommand::Logs(Some(rest.to_string())),
        "/queue" => ReplCommand::Queue,
        "/help" => ReplCommand::Help,
        "/quit" | "/exit" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Some(cmd)
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits.  The caller
/// owns the final [`AppContext::shutdown`].
pub fn run(ctx: &AppContext, rt: &Runtime, shutdown: Arc<AtomicBool>) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{}: {}", "Terminal error".red(), e);
            return;
        }
    };

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        let line = match editor.readline(&format!("{} ", "vexmind>".bold().cyan())) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                // Raw-mode terminals deliver Ctrl-C here instead of SIGINT.
                ctx.emergency_stop();
                println!("{}", "  ✓ Emergency stop sent.".yellow());
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        };

        let Some(cmd) = parse(&line) else {
            continue;
        };
        let _ = editor.add_history_entry(line.as_str());

        if cmd == ReplCommand::Quit {
            println!("{}", "Goodbye.".green());
            break;
        }
        execute(ctx, rt, cmd);
    }
    shutdown.store(true, Ordering::SeqCst);
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn execute(ctx: &AppContext, rt: &Runtime, cmd: ReplCommand) {
    match cmd {
        ReplCommand::Start => {
            if rt.block_on(ctx.start()) {
                println!("{}", "✓ Service started.".green());
            } else {
                println!("{}", "Service is already running.".yellow());
            }
        }
        ReplCommand::Stop => {
            if rt.block_on(ctx.stop()) {
                println!("{}", "✓ Service stopped.".green());
            } else {
                println!("{}", "Service is not running.".yellow());
            }
        }
        ReplCommand::Status => {
            let state = ctx.read_state();
            let running = if state.running { "running".green() } else { "stopped".red() };
            println!("{}", "Service State".bold().underline());
            println!("  Status            : {}", running);
            println!(
                "  Active goal       : {}",
                state.active_goal.as_deref().unwrap_or("-")
            );
            println!("  Commands executed : {}", state.commands_executed);
            println!("  Log entries       : {}", state.log_size);
        }
        ReplCommand::Goal { id, text } => match ctx.submit_goal(&id, &text) {
            Ok(msg) => println!("{} {}", "✓".green(), msg),
            Err(e) => println!("{}", e.to_string().red()),
        },
        ReplCommand::Goals => print_goals(&ctx.list_goals()),
        ReplCommand::Review => {
            let reviewed = rt.block_on(ctx.review_goals());
            if reviewed.is_empty() {
                println!("  No pending goals.");
            } else {
                print_goals(&reviewed);
            }
        }
        ReplCommand::Clear => println!("  Cleared {} goal(s).", ctx.clear_goals()),
        ReplCommand::Exec(text) => match ctx.add_command(&text, false) {
            Ok(command) => println!("{} queued {}", "✓".green(), command.to_string().bold()),
            Err(e) => println!("{}", e.to_string().red()),
        },
        ReplCommand::EmergencyStop => {
            ctx.emergency_stop();
            println!("{}", "✓ Emergency stop sent.".yellow());
        }
        ReplCommand::Commands => {
            let executed = ctx.executed_commands();
            if executed.is_empty() {
                println!("  No commands executed yet.");
            }
            for (i, command) in executed.iter().enumerate() {
                println!("  {:>3}. {}", i + 1, command);
            }
        }
        ReplCommand::Logs(level) => {
            for entry in ctx.logs(level.as_deref()) {
                println!(
                    "  {} {:<5} {} {}",
                    entry.timestamp.format("%H:%M:%S%.3f").to_string().dimmed(),
                    entry.level,
                    entry.target.dimmed(),
                    entry.message
                );
            }
        }
        ReplCommand::Queue => {
            let status = ctx.queue_status();
            println!("  Queued commands : {}", status.queued_commands);
            println!(
                "  Device          : {}",
                if status.is_running { "running".green() } else { "stopped".red() }
            );
        }
        ReplCommand::Help => cmd_help(),
        ReplCommand::Quit => {}
        ReplCommand::Usage(usage) => println!("{} {}", "Usage:".yellow(), usage.bold()),
        ReplCommand::Unknown(other) => println!(
            "{} '{}'. Type {} for available commands.",
            "Unknown command:".red(),
            other.yellow(),
            "/help".bold()
        ),
    }
}

fn print_goals(goals: &[GoalRecord]) {
    if goals.is_empty() {
        println!("  Goal queue is empty.");
        return;
    }
    for goal in goals {
        let status = match goal.status {
            GoalStatus::Accepted => "accepted".green(),
            GoalStatus::Denied => "denied".red(),
            GoalStatus::Pending => "pending".yellow(),
        };
        println!("  [{}] {} – {}", status, goal.id.bold(), goal.request);
        println!("        {}", goal.reason.dimmed());
    }
}

fn cmd_help() {
    println!();
    println!("{}", "vexmind Commands".bold().underline());
    println!("  {}              – start the orchestration loop", "/start".bold().cyan());
    println!("  {}               – stop the orchestration loop", "/stop".bold().cyan());
    println!("  {}             – service state", "/status".bold().cyan());
    println!("  {}   – submit a goal", "/goal <id> <text>".bold().cyan());
    println!("  {}              – list queued goals", "/goals".bold().cyan());
    println!("  {}             – decide pending goals", "/review".bold().cyan());
    println!("  {}              – drop all queued goals", "/clear".bold().cyan());
    println!("  {}     – queue a controller command", "/exec <command>".bold().cyan());
    println!("  {}              – stop all motors now", "/estop".bold().cyan());
    println!("  {}           – executed command history", "/commands".bold().cyan());
    println!("  {}       – recent logs, optionally by level", "/logs [level]".bold().cyan());
    println!("  {}              – device queue status", "/queue".bold().cyan());
    println!("  {}        – exit", "/quit  /exit".bold().cyan());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_are_skipped() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse("/start"), Some(ReplCommand::Start));
        assert_eq!(parse(" /stop "), Some(ReplCommand::Stop));
        assert_eq!(parse("/exit"), Some(ReplCommand::Quit));
        assert_eq!(parse("/estop"), Some(ReplCommand::EmergencyStop));
    }

    #[test]
    fn goal_takes_id_and_rest_of_line() {
        assert_eq!(
            parse("/goal g1 pick up the red  cube"),
            Some(ReplCommand::Goal {
                id: "g1".into(),
                text: "pick up the red  cube".into(),
            })
        );
        assert_eq!(parse("/goal g1"), Some(ReplCommand::Usage("/goal <id> <text>")));
        assert_eq!(parse("/goal"), Some(ReplCommand::Usage("/goal <id> <text>")));
    }

    #[test]
    fn exec_keeps_command_text() {
        assert_eq!(
            parse("/exec vex robot move forward 50 1"),
            Some(ReplCommand::Exec("vex robot move forward 50 1".into()))
        );
        assert_eq!(parse("/exec"), Some(ReplCommand::Usage("/exec <command>")));
    }

    #[test]
    fn logs_level_is_optional() {
        assert_eq!(parse("/logs"), Some(ReplCommand::Logs(None)));
        assert_eq!(parse("/logs warn"), Some(ReplCommand::Logs(Some("warn".into()))));
    }

    #[test]
    fn unknown_command_is_reported() {
        assert_eq!(parse("/fly"), Some(ReplCommand::Unknown("/fly".into())));
        assert_eq!(parse("hello"), Some(ReplCommand::Unknown("hello".into())));
    }
}
