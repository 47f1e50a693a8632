//! Shell configuration loading.
//!
//! The config file is looked up from an explicit path, then `$POSTDESK_CONFIG`,
//! then `postdesk.json` in the app data directory. `.yaml`/`.yml` files are
//! parsed as YAML, everything else as JSON. A missing file means defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "POSTDESK_CONFIG";

/// Name of the reference backend binary, expected next to the shell.
pub const BACKEND_BINARY: &str = "postdesk-backend";

/// Default per-call deadline (ms).
const DEFAULT_CALL_TIMEOUT_MS: u64 = 30_000;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors while reading a config or seed file that exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("failed to parse config '{path}': {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid seed data: {reason}")]
    InvalidSeed { reason: String },
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// How to launch the backend process.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            command: default_backend_command(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }
}

/// Top-level shell configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    /// Per-call deadline in milliseconds; `0` disables the deadline.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default)]
    pub log: LogConfig,
}

/// Where the shell writes its log and how many old logs it keeps.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Directory for the log files; the app data directory when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_log_file_name")]
    pub file_name: String,
    /// Rotated generations kept next to the live file (`shell.log.1` ..).
    #[serde(default = "default_log_keep")]
    pub keep: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            file_name: default_log_file_name(),
            keep: default_log_keep(),
        }
    }
}

impl LogConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(crate::data_dir)
    }

    /// The live log file.
    pub fn path(&self) -> PathBuf {
        self.dir().join(&self.file_name)
    }

    /// The `n`th rotated generation; 1 is the most recent.
    pub fn generation(&self, n: u32) -> PathBuf {
        self.dir().join(format!("{}.{n}", self.file_name))
    }
}

fn default_log_file_name() -> String {
    "shell.log".to_string()
}

fn default_log_keep() -> u32 {
    3
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            log: LogConfig::default(),
        }
    }
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

/// The backend binary shipped next to the running executable, or the bare
/// name (resolved through `PATH`) when that cannot be determined.
fn default_backend_command() -> String {
    let file_name = format!("{BACKEND_BINARY}{}", std::env::consts::EXE_SUFFIX);
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(&file_name)))
        .filter(|candidate| candidate.exists())
        .map(|candidate| candidate.to_string_lossy().into_owned())
        .unwrap_or(file_name)
}

// ─── Loading ─────────────────────────────────────────────────────────────────

impl ShellConfig {
    /// Per-call deadline, if enabled.
    pub fn call_timeout(&self) -> Option<Duration> {
        (self.call_timeout_ms > 0).then(|| Duration::from_millis(self.call_timeout_ms))
    }

    /// Parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        let parsed: Result<Self, String> = if is_yaml {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        };

        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Load from the resolved config path, falling back to defaults, and log
    /// where the config came from.
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        let (cfg, source) = Self::resolve(explicit);
        source.log(&cfg);
        cfg
    }

    /// Like `load_or_default`, without logging. Used before tracing is set
    /// up, since the log location is part of the config.
    pub fn resolve(explicit: Option<&Path>) -> (Self, ConfigSource) {
        let path = resolve_config_path(explicit);
        if !path.exists() {
            return (Self::default(), ConfigSource::Defaults { path });
        }

        match Self::load(&path) {
            Ok(cfg) => (cfg, ConfigSource::File { path }),
            Err(error) => (Self::default(), ConfigSource::Fallback { error }),
        }
    }
}

/// How a `ShellConfig` was obtained.
#[derive(Debug)]
pub enum ConfigSource {
    /// No file at the resolved path.
    Defaults { path: PathBuf },
    File { path: PathBuf },
    /// The file exists but could not be used.
    Fallback { error: ConfigError },
}

impl ConfigSource {
    pub fn log(&self, cfg: &ShellConfig) {
        match self {
            ConfigSource::Defaults { path } => {
                tracing::info!(path = %path.display(), "no config file, using defaults");
            }
            ConfigSource::File { path } => {
                tracing::info!(
                    path = %path.display(),
                    backend = %cfg.backend.command,
                    call_timeout_ms = cfg.call_timeout_ms,
                    "loaded shell config"
                );
            }
            ConfigSource::Fallback { error } => {
                tracing::warn!(error = %error, "failed to load shell config, using defaults");
            }
        }
    }
}

/// Resolve which config file to read.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(path);
    }
    crate::data_dir().join("postdesk.json")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
