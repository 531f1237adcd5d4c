use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::api::ExportFormat;
use crate::workflow::PollPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Transcription service settings
    pub api: ApiConfig,

    /// How running jobs are polled
    #[serde(default)]
    pub polling: PollingConfig,

    /// Application settings
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Root of the REST API, e.g. `http://localhost:8000/api/v1`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Where the login token is kept (defaults next to the config file)
    pub token_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Milliseconds between status checks
    pub interval_ms: u64,

    /// Give up after this many status checks
    pub max_attempts: Option<u32>,

    /// Give up after this many seconds of processing
    pub max_duration_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Directory for downloaded scripts (current directory if unset)
    pub download_dir: Option<PathBuf>,

    /// Format used by `download` when none is given
    #[serde(default)]
    pub default_export_format: ExportFormat,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api/v1".to_string(),
            timeout_secs: 30,
            token_path: None,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: 2000,
            max_attempts: None,
            max_duration_secs: Some(30 * 60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            polling: PollingConfig::default(),
            app: AppConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `explicit`, or the default location.
    ///
    /// A missing file is created with default settings.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let config_path = match explicit {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            let config: Config = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;

            config.validate()?;
            tracing::debug!(path = %config_path.display(), "Loaded configuration");
            Ok(config)
        } else {
            let config = Self::default();
            config.save(&config_path).await?;
            tracing::info!(path = %config_path.display(), "Wrote default configuration");
            Ok(config)
        }
    }

    /// Save configuration to file
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("scriptgen.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        Ok(Self::config_dir()?.join("config.yaml"))
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("scriptgen"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base = Url::parse(&self.api.base_url)
            .with_context(|| format!("Invalid API base URL: {}", self.api.base_url))?;

        if !matches!(base.scheme(), "http" | "https") {
            anyhow::bail!("API base URL must use HTTP or HTTPS protocol");
        }

        if self.polling.interval_ms == 0 {
            anyhow::bail!("polling.interval_ms must be greater than zero");
        }

        if self.polling.max_attempts == Some(0) {
            anyhow::bail!("polling.max_attempts must be greater than zero (or null for no limit)");
        }

        if self.polling.max_duration_secs == Some(0) {
            anyhow::bail!("polling.max_duration_secs must be greater than zero (or null for no limit)");
        }

        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than zero");
        }

        Ok(())
    }

    /// Override the API base URL (command line or environment)
    pub fn with_base_url(mut self, base_url: Option<String>) -> Result<Self> {
        if let Some(base_url) = base_url {
            self.api.base_url = base_url;
            self.validate()?;
        }
        Ok(self)
    }

    /// Location of the persisted login token
    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.api.token_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("token")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.polling.interval_ms),
            max_attempts: self.polling.max_attempts,
            max_duration: self.polling.max_duration_secs.map(Duration::from_secs),
        }
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  API URL: {}", self.api.base_url);
        println!("  Request Timeout: {}s", self.api.timeout_secs);
        println!("  Poll Interval: {}ms", self.polling.interval_ms);
        match self.polling.max_attempts {
            Some(max) => println!("  Max Status Checks: {}", max),
            None => println!("  Max Status Checks: unlimited"),
        }
        match self.polling.max_duration_secs {
            Some(secs) => println!("  Max Wait: {}s", secs),
            None => println!("  Max Wait: unlimited"),
        }
        if let Some(dir) = &self.app.download_dir {
            println!("  Download Directory: {}", dir.display());
        }
        println!("  Default Export Format: {}", self.app.default_export_format);
    }
}
