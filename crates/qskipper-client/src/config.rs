//! Client configuration loaded from environment variables.
//!
//! All settings have defaults so the client can start with zero
//! configuration against the production backend.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use qskipper_shared::constants::DEFAULT_API_URL;
use qskipper_store::image_cache::{DEFAULT_DISK_CAP_BYTES, DEFAULT_MEMORY_CAP_BYTES};
use qskipper_store::{default_cache_dir, Database, StoreError};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without a trailing slash.
    /// Env: `QSKIPPER_API_URL`
    pub api_url: String,

    /// Timeout for GET and DELETE requests.
    /// Env: `QSKIPPER_READ_TIMEOUT_SECS`
    /// Default: 30 s
    pub read_timeout: Duration,

    /// Timeout for POST and PUT requests, which may carry image payloads.
    /// Env: `QSKIPPER_WRITE_TIMEOUT_SECS`
    /// Default: 90 s
    pub write_timeout: Duration,

    /// Lifetime of cached list responses.
    /// Env: `QSKIPPER_RESPONSE_CACHE_TTL_SECS`
    /// Default: 30 s
    pub response_cache_ttl: Duration,

    /// Overrides the platform data directory (database and image cache).
    /// Env: `QSKIPPER_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Env: `QSKIPPER_IMAGE_MEMORY_CAP_BYTES`
    pub image_memory_cap_bytes: usize,

    /// Env: `QSKIPPER_IMAGE_DISK_CAP_BYTES`
    pub image_disk_cap_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(90),
            response_cache_ttl: Duration::from_secs(30),
            data_dir: None,
            image_memory_cap_bytes: DEFAULT_MEMORY_CAP_BYTES,
            image_disk_cap_bytes: DEFAULT_DISK_CAP_BYTES,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("QSKIPPER_API_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.starts_with("http://") || url.starts_with("https://") {
                config.api_url = url.to_string();
            } else {
                tracing::warn!(value = %url, "Invalid QSKIPPER_API_URL, using default");
            }
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "QSKIPPER_READ_TIMEOUT_SECS") {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QSKIPPER_WRITE_TIMEOUT_SECS") {
            config.write_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "QSKIPPER_RESPONSE_CACHE_TTL_SECS") {
            config.response_cache_ttl = Duration::from_secs(secs);
        }

        if let Some(dir) = lookup("QSKIPPER_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(cap) = parse_var(&lookup, "QSKIPPER_IMAGE_MEMORY_CAP_BYTES") {
            config.image_memory_cap_bytes = cap;
        }
        if let Some(cap) = parse_var(&lookup, "QSKIPPER_IMAGE_DISK_CAP_BYTES") {
            config.image_disk_cap_bytes = cap;
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }

    /// Open the key-value database, in `data_dir` when set, otherwise in the
    /// platform data directory.
    pub fn open_database(&self) -> Result<Database, StoreError> {
        match &self.data_dir {
            Some(dir) => Database::open_in_dir(dir),
            None => Database::new(),
        }
    }

    /// Directory of the image cache's disk tier.
    pub fn image_cache_dir(&self) -> Result<PathBuf, StoreError> {
        let base = match &self.data_dir {
            Some(dir) => dir.clone(),
            None => default_cache_dir()?,
        };
        Ok(base.join("images"))
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "Invalid value, using default");
            None
        }
    }
}
