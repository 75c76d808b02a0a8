use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use semi_core::upload::UploadLimits;

/// Lowest and highest accepted `SEMI_WEB_MAX_CONCURRENT_JOBS`.
pub const MIN_CONCURRENT_JOBS: usize = 1;
pub const MAX_CONCURRENT_JOBS: usize = 16;

/// Number of consecutive ports tried when the configured one is taken.
pub const PORT_FALLBACK_ATTEMPTS: u16 = 20;

/// Startup configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} has an invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for running on a workstation.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Preferred bind port (default: `8765`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// Time allowed until response headers are sent (default: `300`).
    pub request_timeout_secs: u64,
    /// Job admission, upload and retention limits.
    pub limits: JobLimits,
}

/// Limits governing submissions and the job lifecycle.
#[derive(Debug, Clone)]
pub struct JobLimits {
    pub max_files: usize,
    pub max_request_bytes: usize,
    pub max_file_bytes: u64,
    /// How long a finished job stays reachable.
    pub job_ttl: Duration,
    /// Period of the expiry sweep.
    pub cleanup_interval: Duration,
    pub max_concurrent_jobs: usize,
    /// Capacity of the admission queue.
    pub max_queued_jobs: usize,
    /// Root under which job workspaces are created.
    pub work_dir: PathBuf,
}

impl Default for JobLimits {
    fn default() -> Self {
        Self {
            max_files: 200,
            max_request_bytes: 512 * 1024 * 1024,
            max_file_bytes: 64 * 1024 * 1024,
            job_ttl: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(60),
            max_concurrent_jobs: 2,
            max_queued_jobs: 500,
            work_dir: std::env::temp_dir(),
        }
    }
}

impl JobLimits {
    pub fn upload(&self) -> UploadLimits {
        UploadLimits {
            max_files: self.max_files,
            max_file_bytes: self.max_file_bytes,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                          | Default                  |
    /// |----------------------------------|--------------------------|
    /// | `HOST`                           | `127.0.0.1`              |
    /// | `PORT`                           | `8765`                   |
    /// | `CORS_ORIGINS`                   | `http://localhost:8765`  |
    /// | `REQUEST_TIMEOUT_SECS`           | `300`                    |
    /// | `SEMI_WEB_MAX_FILES`             | `200`                    |
    /// | `SEMI_WEB_MAX_REQUEST_BYTES`     | `536870912`              |
    /// | `SEMI_WEB_MAX_FILE_BYTES`        | `67108864`               |
    /// | `SEMI_WEB_JOB_TTL_SECS`          | `1800`                   |
    /// | `SEMI_WEB_CLEANUP_INTERVAL_SECS` | `60`                     |
    /// | `SEMI_WEB_MAX_CONCURRENT_JOBS`   | `2` (clamped to 1..=16)  |
    /// | `SEMI_WEB_MAX_QUEUED_JOBS`       | `500`                    |
    /// | `SEMI_WEB_WORK_DIR`              | system temp directory    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ServerConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = JobLimits::default();

        let host = lookup("HOST").unwrap_or_else(|| "127.0.0.1".into());
        let port = parse_var(&lookup, "PORT", 8765u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:8765".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
                var: "CORS_ORIGINS",
                value: origin.clone(),
                reason: e.to_string(),
            })?;
        }

        let request_timeout_secs = parse_var(&lookup, "REQUEST_TIMEOUT_SECS", 300u64)?;

        let max_concurrent_jobs: usize =
            parse_var(&lookup, "SEMI_WEB_MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs)?;

        let limits = JobLimits {
            max_files: positive(&lookup, "SEMI_WEB_MAX_FILES", defaults.max_files)?,
            max_request_bytes: positive(
                &lookup,
                "SEMI_WEB_MAX_REQUEST_BYTES",
                defaults.max_request_bytes,
            )?,
            max_file_bytes: positive(&lookup, "SEMI_WEB_MAX_FILE_BYTES", defaults.max_file_bytes)?,
            job_ttl: Duration::from_secs(parse_var(
                &lookup,
                "SEMI_WEB_JOB_TTL_SECS",
                defaults.job_ttl.as_secs(),
            )?),
            cleanup_interval: Duration::from_secs(positive(
                &lookup,
                "SEMI_WEB_CLEANUP_INTERVAL_SECS",
                defaults.cleanup_interval.as_secs(),
            )?),
            max_concurrent_jobs: max_concurrent_jobs.clamp(MIN_CONCURRENT_JOBS, MAX_CONCURRENT_JOBS),
            max_queued_jobs: positive(&lookup, "SEMI_WEB_MAX_QUEUED_JOBS", defaults.max_queued_jobs)?,
            work_dir: lookup("SEMI_WEB_WORK_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            limits,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Like [`parse_var`] but rejects zero.
fn positive<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    let value = parse_var(lookup, var, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}
