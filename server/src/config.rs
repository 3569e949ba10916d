use std::{env, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::warn;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_STORAGE_DIR: &str = "temp_archives";
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "jpeg", "jpg"];
pub const DEFAULT_MAX_FILES_PER_TASK: usize = 3;
pub const DEFAULT_MAX_CONCURRENT_TASKS: usize = 3;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BUILD_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_TASK_TTL_SECS: u64 = 900;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_MAX_FILE_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("ARCHIVER_ALLOWED_EXTENSIONS is empty")]
    NoExtensions,
}

/// Configuración fija al arrancar; no se recarga.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub storage_dir: PathBuf,
    pub allowed_extensions: Vec<String>,
    pub max_files_per_task: usize,
    pub max_concurrent_tasks: usize,
    pub fetch_timeout: Duration,
    pub build_timeout: Duration,
    /// Tiempo máximo que una tarea puede quedarse en `created`
    pub task_ttl: Duration,
    pub sweep_interval: Duration,
    /// Tope por archivo descargado
    pub max_file_bytes: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            max_files_per_task: DEFAULT_MAX_FILES_PER_TASK,
            max_concurrent_tasks: DEFAULT_MAX_CONCURRENT_TASKS,
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            build_timeout: Duration::from_secs(DEFAULT_BUILD_TIMEOUT_SECS),
            task_ttl: Duration::from_secs(DEFAULT_TASK_TTL_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }
}

impl Config {
    /// Lee `ARCHIVER_*` del entorno, con defaults para lo que falte.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let allowed_extensions = match lookup("ARCHIVER_ALLOWED_EXTENSIONS") {
            Some(raw) => raw
                .split(',')
                .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            None => defaults.allowed_extensions,
        };

        let config = Config {
            bind_addr: lookup("ARCHIVER_BIND").unwrap_or(defaults.bind_addr),
            storage_dir: lookup("ARCHIVER_STORAGE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_dir),
            allowed_extensions,
            max_files_per_task: parse_or(
                &lookup,
                "ARCHIVER_MAX_FILES_PER_TASK",
                DEFAULT_MAX_FILES_PER_TASK,
            ),
            max_concurrent_tasks: parse_or(
                &lookup,
                "ARCHIVER_MAX_CONCURRENT_TASKS",
                DEFAULT_MAX_CONCURRENT_TASKS,
            ),
            fetch_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ARCHIVER_FETCH_TIMEOUT_SECS",
                DEFAULT_FETCH_TIMEOUT_SECS,
            )),
            build_timeout: Duration::from_secs(parse_or(
                &lookup,
                "ARCHIVER_BUILD_TIMEOUT_SECS",
                DEFAULT_BUILD_TIMEOUT_SECS,
            )),
            task_ttl: Duration::from_secs(parse_or(
                &lookup,
                "ARCHIVER_TASK_TTL_SECS",
                DEFAULT_TASK_TTL_SECS,
            )),
            sweep_interval: Duration::from_secs(parse_or(
                &lookup,
                "ARCHIVER_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
            max_file_bytes: parse_or(&lookup, "ARCHIVER_MAX_FILE_BYTES", DEFAULT_MAX_FILE_BYTES),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::NoExtensions);
        }
        if self.max_files_per_task == 0 {
            return Err(ConfigError::Zero("ARCHIVER_MAX_FILES_PER_TASK"));
        }
        if self.max_concurrent_tasks == 0 {
            return Err(ConfigError::Zero("ARCHIVER_MAX_CONCURRENT_TASKS"));
        }
        let durations = [
            (self.fetch_timeout, "ARCHIVER_FETCH_TIMEOUT_SECS"),
            (self.build_timeout, "ARCHIVER_BUILD_TIMEOUT_SECS"),
            (self.task_ttl, "ARCHIVER_TASK_TTL_SECS"),
            (self.sweep_interval, "ARCHIVER_SWEEP_INTERVAL_SECS"),
        ];
        if let Some(&(_, key)) = durations.iter().find(|(d, _)| d.is_zero()) {
            return Err(ConfigError::Zero(key));
        }
        if self.max_file_bytes == 0 {
            return Err(ConfigError::Zero("ARCHIVER_MAX_FILE_BYTES"));
        }
        Ok(())
    }
}

// valor inválido -> default + warning (no abortamos el arranque por esto)
fn parse_or<T, F>(lookup: &F, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("valor inválido para {}: {:?}, usando {}", key, raw, default);
            default
        }),
        None => default,
    }
}
