//! Configuration Vault – reads/writes `~/.vexmind/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Serial port value that selects the in-process simulated controller.
pub const SIM_PORT: &str = "sim";

/// Oracle API key; wiped from memory when dropped.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Persisted user configuration stored in `~/.vexmind/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Serial device of the VEX controller, or `"sim"`.
    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Base URL of the OpenAI-compatible oracle (without `/v1`).
    #[serde(default = "default_oracle_url")]
    pub oracle_url: String,

    /// Model used for thoughts and goal review.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_command_model")]
    pub command_model: String,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Oracle API key (stored as plain text; the file is created `0600`).
    #[serde(default, skip_serializing_if = "ApiKey::is_empty")]
    pub api_key: ApiKey,

    #[serde(default = "default_oracle_timeout_secs")]
    pub oracle_timeout_secs: u64,

    /// Snapshot endpoint returning one JPEG frame.
    #[serde(default = "default_camera_url")]
    pub camera_url: String,

    /// Pause between orchestration iterations.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("serial_port", &self.serial_port)
            .field("baud_rate", &self.baud_rate)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("oracle_url", &self.oracle_url)
            .field("model", &self.model)
            .field("command_model", &self.command_model)
            .field("vision_model", &self.vision_model)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("oracle_timeout_secs", &self.oracle_timeout_secs)
            .field("camera_url", &self.camera_url)
            .field("throttle_ms", &self.throttle_ms)
            .finish()
    }
}

fn default_serial_port() -> String {
    "/dev/ttyACM1".to_string()
}
fn default_baud_rate() -> u32 {
    115_200
}
fn default_read_timeout_ms() -> u64 {
    5_000
}
fn default_oracle_url() -> String {
    "https://api.groq.com/openai".to_string()
}
fn default_model() -> String {
    vexmind_runtime::oracle::DEFAULT_MODEL.to_string()
}
fn default_command_model() -> String {
    vexmind_runtime::oracle::COMMAND_MODEL.to_string()
}
fn default_vision_model() -> String {
    vexmind_runtime::oracle::VISION_MODEL.to_string()
}
fn default_oracle_timeout_secs() -> u64 {
    30
}
fn default_camera_url() -> String {
    "http://10.0.0.27:4747/cam/1/frame.jpg".to_string()
}
fn default_throttle_ms() -> u64 {
    1_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            read_timeout_ms: default_read_timeout_ms(),
            oracle_url: default_oracle_url(),
            model: default_model(),
            command_model: default_command_model(),
            vision_model: default_vision_model(),
            api_key: ApiKey::default(),
            oracle_timeout_secs: default_oracle_timeout_secs(),
            camera_url: default_camera_url(),
            throttle_ms: default_throttle_ms(),
        }
    }
}

impl Config {
    pub fn uses_sim(&self) -> bool {
        self.serial_port == SIM_PORT
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

/// Return the path to `~/.vexmind/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".vexmind").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `VEXMIND_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `VEXMIND_SERIAL_PORT` | `serial_port` |
/// | `VEXMIND_BAUD_RATE` | `baud_rate` |
/// | `VEXMIND_ORACLE_URL` | `oracle_url` |
/// | `VEXMIND_MODEL` | `model` |
/// | `VEXMIND_API_KEY` | `api_key` |
/// | `VEXMIND_CAMERA_URL` | `camera_url` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("VEXMIND_SERIAL_PORT") {
        cfg.serial_port = v;
    }
    if let Ok(v) = std::env::var("VEXMIND_BAUD_RATE")
        && let Ok(baud) = v.parse::<u32>()
    {
        cfg.baud_rate = baud;
    }
    if let Ok(v) = std::env::var("VEXMIND_ORACLE_URL") {
        cfg.oracle_url = v;
    }
    if let Ok(v) = std::env::var("VEXMIND_MODEL") {
        cfg.model = v;
    }
    if let Ok(v) = std::env::var("VEXMIND_API_KEY") {
        cfg.api_key = ApiKey::new(v);
    }
    if let Ok(v) = std::env::var("VEXMIND_CAMERA_URL") {
        cfg.camera_url = v;
    }
}

/// Save the config to disk, creating `~/.vexmind/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------).
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Owner read/write only (rw-------).
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
