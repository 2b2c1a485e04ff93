// tablevault/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::database::ConnectionParams;
use crate::utils::retry::RetryPolicy;

pub const PASSWORD_ENV_VAR: &str = "DB_PASSWORD";
const DEFAULT_PORT: u16 = 3306;
const DEFAULT_MAX_WORKERS: usize = 4;
const DEFAULT_CHARACTER_SET: &str = "utf8mb4";

// Structs for deserializing config.json
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonRetryOptions {
    pub max_attempts: Option<u32>,
    pub delay_secs: Option<f64>,
    pub max_wait_secs: Option<u64>,
    pub unbounded: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonArchiveOptions {
    pub format: Option<String>,
    pub executable: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJsonConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub backup_dir: Option<PathBuf>,
    pub client_dir: Option<PathBuf>,
    pub extra_dump_options: Option<Vec<String>>,
    pub max_workers: Option<usize>,
    pub character_set: Option<String>,
    pub connection_retry: Option<JsonRetryOptions>,
    pub restore_retry: Option<JsonRetryOptions>,
    pub archive: Option<JsonArchiveOptions>,
    pub write_report: Option<bool>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connection: ConnectionParams,
    pub backup_dir: PathBuf,
    /// Directory holding the client executables; PATH is used when absent.
    pub client_dir: Option<PathBuf>,
    pub extra_dump_options: Vec<String>,
    pub max_workers: usize,
    pub character_set: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    SevenZip,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::SevenZip => "7z",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSettings {
    pub format: ArchiveFormat,
    pub executable: String,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::SevenZip,
            executable: "7za".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub session: SessionConfig,
    pub connection_retry: RetryPolicy,
    pub restore_retry: RetryPolicy,
    pub archive: ArchiveSettings,
    pub write_report: bool,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config, env::var(PASSWORD_ENV_VAR).ok())
    }

    /// Validates the raw file contents. `env_password` is used when the file
    /// carries no password.
    pub fn from_raw(raw: RawJsonConfig, env_password: Option<String>) -> Result<Self> {
        let host = required(raw.hostname, "hostname")?;
        let user = required(raw.username, "username")?;
        let database = required(raw.database, "database")?;
        let password = raw
            .password
            .or(env_password)
            .with_context(|| {
                format!(
                    "password must be set in config.json or via the {} environment variable",
                    PASSWORD_ENV_VAR
                )
            })?;

        let backup_dir = raw
            .backup_dir
            .context("backup_dir must be set in config.json")?;
        if backup_dir.to_string_lossy().trim().is_empty() {
            return Err(anyhow::anyhow!("backup_dir cannot be empty in config.json."));
        }

        let max_workers = raw.max_workers.unwrap_or(DEFAULT_MAX_WORKERS);
        if max_workers == 0 {
            return Err(anyhow::anyhow!("max_workers must be at least 1"));
        }

        let session = SessionConfig {
            connection: ConnectionParams {
                host,
                port: raw.port.unwrap_or(DEFAULT_PORT),
                user,
                password,
                database,
            },
            backup_dir,
            client_dir: raw.client_dir.filter(|d| !d.as_os_str().is_empty()),
            extra_dump_options: raw.extra_dump_options.unwrap_or_default(),
            max_workers,
            character_set: raw
                .character_set
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CHARACTER_SET.to_string()),
        };

        Ok(AppConfig {
            session,
            connection_retry: parse_retry(
                raw.connection_retry.as_ref(),
                RetryPolicy::connection_default(),
                "connection_retry",
            )?,
            restore_retry: parse_retry(
                raw.restore_retry.as_ref(),
                RetryPolicy::restore_default(),
                "restore_retry",
            )?,
            archive: parse_archive(raw.archive.as_ref())?,
            write_report: raw.write_report.unwrap_or(false),
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("{} must be set in config.json", field))
}

/// Applies the overrides in `raw` on top of `default`.
fn parse_retry(
    raw: Option<&JsonRetryOptions>,
    default: RetryPolicy,
    field: &str,
) -> Result<RetryPolicy> {
    let Some(raw) = raw else {
        return Ok(default);
    };

    let delay = match raw.delay_secs {
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
            anyhow::anyhow!(
                "{}.delay_secs must be a non-negative number of seconds, got {}",
                field,
                secs
            )
        })?,
        None => default.delay(),
    };

    if raw.unbounded.unwrap_or(false) {
        if raw.max_attempts.is_some() || raw.max_wait_secs.is_some() {
            return Err(anyhow::anyhow!(
                "{}.unbounded cannot be combined with max_attempts or max_wait_secs",
                field
            ));
        }
        return Ok(RetryPolicy::unbounded(delay));
    }

    let mut policy = default.with_delay(delay);
    if let Some(attempts) = raw.max_attempts {
        if attempts == 0 {
            return Err(anyhow::anyhow!("{}.max_attempts must be at least 1", field));
        }
        policy = policy.with_max_attempts(attempts);
    }
    if let Some(secs) = raw.max_wait_secs {
        policy = policy.with_max_elapsed(Duration::from_secs(secs));
    }
    Ok(policy)
}

fn parse_archive(raw: Option<&JsonArchiveOptions>) -> Result<ArchiveSettings> {
    let mut settings = ArchiveSettings::default();
    let Some(raw) = raw else {
        return Ok(settings);
    };

    if let Some(format) = &raw.format {
        settings.format = match format.trim().to_ascii_lowercase().as_str() {
            "7z" => ArchiveFormat::SevenZip,
            "tar.gz" | "tgz" => ArchiveFormat::TarGz,
            other => {
                return Err(anyhow::anyhow!(
                    "archive.format must be either \"7z\" or \"tar.gz\", got {:?}",
                    other
                ));
            }
        };
    }
    if let Some(executable) = raw.executable.as_ref().filter(|e| !e.trim().is_empty()) {
        settings.executable = executable.clone();
    }
    Ok(settings)
}
