//! Configuration assembled purely from environment variables. The core
//! has no interactive bootstrap of its own — `.env` loading is the CLI
//! collaborator's job; by the time `Config::load` runs, the process
//! environment is assumed to already carry whatever the operator set.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    Sheets,
    Csv,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_id: i32,
    pub api_hash: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
}

impl PathsConfig {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("core.db")
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("core.session")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.data_dir.join("core.pid")
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local time-of-day for the daily full-history bulk ingest, `HH:MM`.
    pub sync_time: String,
    /// Max messages per dialog per pull.
    pub sync_limit: u32,
    pub destination_kind: DestinationKind,
    pub destination_id: Option<String>,
    pub service_account_file: Option<PathBuf>,
    /// Usernames excluded from the follow-up projection. Empty by default;
    /// see DESIGN.md for why this is configurable rather than hard-coded.
    pub followup_deny_usernames: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub paths: PathsConfig,
    pub sync: SyncConfig,
    pub log_level: LogLevel,
}

impl Config {
    pub fn load() -> Result<Self> {
        let telegram = TelegramConfig {
            api_id: require_env("TELEGRAM_API_ID")?
                .parse()
                .map_err(|e| CoreError::Config(format!("TELEGRAM_API_ID must be an integer: {e}")))?,
            api_hash: require_env("TELEGRAM_API_HASH")?,
            phone: require_env("TELEGRAM_PHONE")?,
        };

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let destination_kind = match std::env::var("DESTINATION_KIND").as_deref() {
            Ok("sheets") => DestinationKind::Sheets,
            Ok("csv") | Err(_) => DestinationKind::Csv,
            Ok("none") => DestinationKind::None,
            Ok(other) => {
                return Err(CoreError::Config(format!(
                    "DESTINATION_KIND must be one of sheets|csv|none, got '{other}'"
                )))
            }
        };

        let sync = SyncConfig {
            sync_time: std::env::var("SYNC_TIME").unwrap_or_else(|_| "03:00".to_string()),
            sync_limit: std::env::var("SYNC_LIMIT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100_000),
            destination_kind,
            destination_id: std::env::var("DESTINATION_ID").ok(),
            service_account_file: std::env::var("SERVICE_ACCOUNT_FILE").ok().map(PathBuf::from),
            followup_deny_usernames: std::env::var("FOLLOWUP_DENY_USERNAMES")
                .ok()
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_default(),
        };

        let log_level = match std::env::var("LOG_LEVEL").as_deref() {
            Ok("debug") => LogLevel::Debug,
            Ok("warn") => LogLevel::Warn,
            Ok("error") => LogLevel::Error,
            _ => LogLevel::Info,
        };

        let config = Self {
            telegram,
            paths: PathsConfig { data_dir },
            sync,
            log_level,
        };

        config.validate()?;
        info!(data_dir = %config.paths.data_dir.display(), "configuration loaded");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.telegram.api_hash.is_empty() {
            return Err(CoreError::Config("TELEGRAM_API_HASH must not be empty".into()));
        }
        if self.sync.destination_kind == DestinationKind::Sheets && self.sync.service_account_file.is_none() {
            return Err(CoreError::Config(
                "DESTINATION_KIND=sheets requires SERVICE_ACCOUNT_FILE".into(),
            ));
        }
        if !matches!(
            self.sync.sync_time.split_once(':'),
            Some((h, m)) if h.parse::<u32>().map(|h| h < 24).unwrap_or(false)
                && m.parse::<u32>().map(|m| m < 60).unwrap_or(false)
        ) {
            return Err(CoreError::Config(format!(
                "SYNC_TIME must be HH:MM, got '{}'",
                self.sync.sync_time
            )));
        }
        Ok(())
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| CoreError::Config(format!("{key} is required")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_time_validation_rejects_bad_format() {
        let cfg = Config {
            telegram: TelegramConfig { api_id: 1, api_hash: "x".into(), phone: "+1".into() },
            paths: PathsConfig { data_dir: "./data".into() },
            sync: SyncConfig {
                sync_time: "25:99".into(),
                sync_limit: 100,
                destination_kind: DestinationKind::Csv,
                destination_id: None,
                service_account_file: None,
                followup_deny_usernames: vec![],
            },
            log_level: LogLevel::Info,
        };
        assert!(cfg.validate().is_err());
    }
}
