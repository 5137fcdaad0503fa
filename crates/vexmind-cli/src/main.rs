//! `vexmind-cli` – vexmind Command Line Interface
//!
//! This binary wires the stack together and hands control to the operator:
//!
//! 1. Installs tracing, with the in-memory log sink behind `/logs`.
//! 2. Loads `~/.vexmind/config.toml`, writing defaults on first run.
//! 3. Opens the controller's serial port (or the simulator when
//!    `serial_port = "sim"`) and builds the [`AppContext`].
//! 4. Intercepts **Ctrl-C** to send `vex motor all stop` and exit safely.
//! 5. Drops the user into an interactive REPL.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use vexmind_hal::{DeviceConfig, DeviceManager, SerialConfig, SimController};
use vexmind_runtime::{
    AppContext, HttpSnapshotCamera, LogSink, OpenAiOracle, OrchestratorConfig, init_tracing,
};
use vexmind_types::VexError;

fn main() {
    let logs = Arc::new(LogSink::default());
    let _tracing = init_tracing("vexmind", Some(&logs));

    print_banner();

    let cfg = load_or_create_config();
    info!(config = ?cfg, "configuration loaded");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => fail("Failed to start async runtime", e),
    };

    let ctx = match build_context(&cfg, logs) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => fail("Startup failed", e),
    };

    // ── Shutdown flag + Ctrl-C handler ────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    let ctx_ctrlc = Arc::clone(&ctx);

    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping all motors …".yellow().bold());
        ctx_ctrlc.emergency_stop();
        println!("{}", "  ✓ Emergency stop sent.".green());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; emergency stop on Ctrl-C will not be available");
    }

    println!(
        "  Type {} for a list of commands.\n",
        "/help".bold().cyan()
    );

    repl::run(&ctx, &rt, shutdown);

    print!("  Shutting down … ");
    rt.block_on(ctx.shutdown());
    println!("{}", "done".green());
}

fn build_context(cfg: &config::Config, logs: Arc<LogSink>) -> Result<AppContext, VexError> {
    let device = if cfg.uses_sim() {
        println!("  Device : {}", "simulated controller".yellow());
        let (transport, _handle) = SimController::new().build();
        DeviceManager::new(transport, DeviceConfig::default())?
    } else {
        println!(
            "  Device : {} @ {} baud",
            cfg.serial_port.bold(),
            cfg.baud_rate
        );
        let serial = SerialConfig {
            port: cfg.serial_port.clone(),
            baud_rate: cfg.baud_rate,
            read_timeout: cfg.read_timeout(),
        };
        DeviceManager::open_serial(&serial, DeviceConfig::default())?
    };

    let oracle = OpenAiOracle::new(&cfg.oracle_url, &cfg.model, cfg.oracle_timeout())?
        .with_api_key(cfg.api_key.expose())
        .with_vision_model(&cfg.vision_model);
    println!("  Oracle : {} ({})", cfg.oracle_url.dimmed(), cfg.model.bold());
    if cfg.api_key.is_empty() {
        println!(
            "  {}  Set {} or `api_key` in the config file.",
            "No oracle API key configured.".dimmed(),
            "VEXMIND_API_KEY".bold()
        );
    }

    let camera = HttpSnapshotCamera::new(&cfg.camera_url, cfg.oracle_timeout())?;
    println!("  Camera : {}", cfg.camera_url.dimmed());
    println!();

    let orchestrator = OrchestratorConfig {
        throttle: cfg.throttle(),
        command_model: cfg.command_model.clone(),
        ..OrchestratorConfig::default()
    };
    Ok(AppContext::new(
        Arc::new(device),
        Arc::new(oracle),
        Arc::new(camera),
        logs,
        orchestrator,
    ))
}

fn load_or_create_config() -> config::Config {
    match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save(&cfg) {
                Ok(()) => println!(
                    "  {} Default config written to {}",
                    "✓".green().bold(),
                    config::config_path().display().to_string().bold()
                ),
                Err(e) => println!("{}: {}", "Error saving config".red(), e),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

fn fail(context: &str, err: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context.red().bold(), err);
    std::process::exit(1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#" _   _____ __ __ __  ___ _         __"#.bold().cyan());
    println!("{}", r#"| | / / _ \\ \ //  |/  /(_)___  ___/ /"#.bold().cyan());
    println!("{}", r#"| |/ /  __/ > < / /|_/ // / _ \/ _  / "#.bold().cyan());
    println!("{}", r#"|___/\___/_/\_/_/  /_//_/_//_/\_,_/  "#.bold().cyan());
    println!();
    println!("  {} {}",
        "vexmind".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Language-driven VEX robot control");
    println!();
}
