// Service configuration, assembled once at startup

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::downloader::DEFAULT_EXTENSIONS;

const ENV_PREFIX: &str = "MEDIA_DL_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?} ({reason})")]
    InvalidValue {
        var: String,
        value: String,
        reason: String,
    },

    #[error("{0}")]
    Invalid(String),
}

/// Immutable settings shared by every component
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: IpAddr,
    pub port: u16,
    /// Where downloads land; shared with the sweeper
    pub output_dir: PathBuf,
    /// Deadline for a single fetcher download
    pub download_timeout: Duration,
    /// Deadline for a whole request (info + selection + download)
    pub request_timeout: Duration,
    /// Deadline for the fetcher info call
    pub info_timeout: Duration,
    /// Files older than this are removed by the sweeper
    pub retention: Duration,
    pub sweep_interval: Duration,
    pub max_size_bytes: u64,
    /// Lower-cased container allowlist
    pub allowed_extensions: Vec<String>,
    /// Explicit yt-dlp executable
    pub fetcher_path: Option<String>,
    pub proxy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            output_dir: default_output_dir(),
            download_timeout: Duration::from_secs(10 * 60),
            request_timeout: Duration::from_secs(12 * 60),
            info_timeout: Duration::from_secs(60),
            retention: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(10 * 60),
            max_size_bytes: 100 * 1_048_576,
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            fetcher_path: None,
            proxy: None,
        }
    }
}

fn default_output_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("media-downloader")
}

impl ServerConfig {
    /// Read `MEDIA_DL_*` environment variables over the defaults
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` with an injectable variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(&format!("{}{}", ENV_PREFIX, name))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Self::default();

        if let Some(v) = get("HOST") {
            config.bind_host = parse_var("HOST", &v)?;
        }
        if let Some(v) = get("PORT") {
            config.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = get("OUTPUT_DIR") {
            config.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("DOWNLOAD_TIMEOUT_SECS") {
            config.download_timeout = Duration::from_secs(parse_var("DOWNLOAD_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(parse_var("REQUEST_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("INFO_TIMEOUT_SECS") {
            config.info_timeout = Duration::from_secs(parse_var("INFO_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("RETENTION_SECS") {
            config.retention = Duration::from_secs(parse_var("RETENTION_SECS", &v)?);
        }
        if let Some(v) = get("SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(parse_var("SWEEP_INTERVAL_SECS", &v)?);
        }
        if let Some(v) = get("MAX_SIZE_MB") {
            let mb: u64 = parse_var("MAX_SIZE_MB", &v)?;
            config.max_size_bytes = mb.saturating_mul(1_048_576);
        }
        if let Some(v) = get("ALLOWED_EXTENSIONS") {
            config.allowed_extensions = v.split(',').map(str::to_string).collect();
        }
        config.fetcher_path = get("YTDLP_PATH");
        config.proxy = get("PROXY");

        config.validate()
    }

    /// Normalize and check cross-field constraints
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        self.allowed_extensions = self
            .allowed_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();

        if self.allowed_extensions.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one allowed extension is required".to_string(),
            ));
        }
        if self.max_size_bytes == 0 {
            return Err(ConfigError::Invalid("size budget must be positive".to_string()));
        }
        if self.request_timeout < self.download_timeout {
            return Err(ConfigError::Invalid(format!(
                "request timeout ({}s) is shorter than download timeout ({}s)",
                self.request_timeout.as_secs(),
                self.download_timeout.as_secs()
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid("sweep interval must be positive".to_string()));
        }

        Ok(self)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_max_size_bytes(mut self, bytes: u64) -> Self {
        self.max_size_bytes = bytes;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: format!("{}{}", ENV_PREFIX, name),
        value: value.to_string(),
        reason: e.to_string(),
    })
}
