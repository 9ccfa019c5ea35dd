use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts on one mirror before rotating (including the first).
    pub attempts_per_mirror: u32,
    /// Base delay in seconds for exponential backoff.
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts_per_mirror: 3,
            base_delay_secs: 5.0,
            max_delay_secs: 60,
        }
    }
}

/// HTTP transfer tuning (optional `[transfer]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    pub connect_timeout_secs: u64,
    /// Abort an attempt when no byte arrives for this long.
    pub idle_timeout_secs: u64,
    /// Receive buffer, i.e. the largest chunk between cancellation checks.
    pub chunk_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            idle_timeout_secs: 30,
            chunk_size: 8 * 1024,
        }
    }
}

impl TransferConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Global configuration loaded from `~/.config/mfetch/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Application root holding `models/` and the state journal.
    /// Defaults to `~/.local/share/mfetch`.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    /// Ordered mirror base URLs; the first one is tried first.
    pub mirrors: Vec<String>,
    /// `User-Agent` header sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Minimum spacing of streaming progress events per file.
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
    /// Minimum spacing of journal writes during streaming.
    #[serde(default = "default_persist_interval_ms")]
    pub persist_interval_ms: u64,
    /// Optional TOML catalog; the built-in table is used when absent.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub transfer: Option<TransferConfig>,
}

fn default_user_agent() -> String {
    format!("mfetch/{}", env!("CARGO_PKG_VERSION"))
}

fn default_progress_interval_ms() -> u64 {
    100
}

fn default_persist_interval_ms() -> u64 {
    200
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            mirrors: vec![
                "https://huggingface.co".to_string(),
                "https://hf-mirror.com".to_string(),
            ],
            user_agent: default_user_agent(),
            progress_interval_ms: default_progress_interval_ms(),
            persist_interval_ms: default_persist_interval_ms(),
            catalog_path: None,
            retry: None,
            transfer: None,
        }
    }
}

impl FetchConfig {
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }

    pub fn transfer_or_default(&self) -> TransferConfig {
        self.transfer.clone().unwrap_or_default()
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<FetchConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = FetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FetchConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
