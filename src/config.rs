//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$ASTROMAIL_CONFIG` (environment variable)
//! 2. `~/.config/astromail/config.toml` (Linux)
//!    `~/Library/Application Support/astromail/config.toml` (macOS)
//!    `%APPDATA%\astromail\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::SETUP_NOTIFICATION_ID;
use crate::store::INBOX;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Where and how inbound mail is picked up.
    pub ingest: IngestConfig,
    /// Listing output.
    pub display: DisplayConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override the data directory (message store, account state, logs).
    pub data_dir: Option<PathBuf>,
    /// `strftime` format string for dates in listings.
    pub date_format: String,
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Local mirror of the receiving bucket.
    pub source_dir: Option<PathBuf>,
    /// Key prefix the receiving service writes under.
    pub prefix: String,
    /// Folder new mail is stored in.
    pub folder: String,
    /// Object id to ignore.
    pub sentinel_id: String,
    /// How long `--wait` waits for the first object.
    pub wait_timeout_secs: u64,
    /// How often `--wait` looks.
    pub wait_interval_secs: u64,
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Messages per page in `list`.
    pub page_size: usize,
    /// Characters of body text shown per message in `list`.
    pub preview_chars: usize,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "warn".to_string(),
            data_dir: None,
            date_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: None,
            prefix: "emails/".to_string(),
            folder: INBOX.to_string(),
            sentinel_id: SETUP_NOTIFICATION_ID.to_string(),
            wait_timeout_secs: 120,
            wait_interval_secs: 10,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            page_size: 50,
            preview_chars: 60,
        }
    }
}

impl IngestConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.wait_timeout_secs)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_secs(self.wait_interval_secs.max(1))
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Save configuration to the standard location.
pub fn save_config(config: &Config) -> anyhow::Result<()> {
    let path = config_file_path()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config file path"))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(&path, contents)?;
    tracing::info!(path = %path.display(), "Saved config");
    Ok(())
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("ASTROMAIL_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join("astromail").join("config.toml"))
}

/// Return the data directory for the store, account state and logs.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("astromail")
}

/// Root of the on-disk message store.
pub fn store_dir(config: &Config) -> PathBuf {
    data_dir(config).join("mail")
}

/// Account state file.
pub fn account_path(config: &Config) -> PathBuf {
    data_dir(config).join(crate::account::ACCOUNT_FILE)
}

/// Return the log file path.
pub fn log_file_path(config: &Config) -> PathBuf {
    data_dir(config).join("astromail.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.general.log_level, "warn");
        assert_eq!(cfg.ingest.prefix, "emails/");
        assert_eq!(cfg.ingest.folder, "inbox");
        assert_eq!(cfg.ingest.sentinel_id, "AMAZON_SES_SETUP_NOTIFICATION");
        assert_eq!(cfg.ingest.wait_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.display.page_size, 50);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let mut cfg = Config::default();
        cfg.ingest.source_dir = Some(PathBuf::from("/srv/bucket"));
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.ingest.source_dir, cfg.ingest.source_dir);
        assert_eq!(parsed.display.page_size, cfg.display.page_size);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[general]
data_dir = "/tmp/astromail"

[ingest]
prefix = "incoming/"
wait_interval_secs = 0
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.ingest.prefix, "incoming/");
        assert_eq!(cfg.ingest.folder, "inbox");
        assert_eq!(cfg.ingest.wait_interval(), Duration::from_secs(1));
        assert_eq!(cfg.display.page_size, 50);
        assert_eq!(store_dir(&cfg), PathBuf::from("/tmp/astromail/mail"));
        assert_eq!(account_path(&cfg), PathBuf::from("/tmp/astromail/account.toml"));
        assert_eq!(log_file_path(&cfg), PathBuf::from("/tmp/astromail/astromail.log"));
    }
}
