//! Harness configuration.
//!
//! Loads [`HarnessConfig`] from an optional TOML file with environment
//! variable overrides via `WEIRD_*` prefixed variables. The defaults
//! describe the stock run: `weird.cl`, entry point `weird`, one work-group
//! of 32 items writing a 32-byte buffer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "WEIRD_CONFIG";

/// Output format of the stderr log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl std::fmt::Display for LogFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pretty => write!(f, "pretty"),
            Self::Compact => write!(f, "compact"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Harness configuration loaded from TOML with environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Kernel source files, compiled together in this order.
    /// Override: `WEIRD_SOURCES` (comma separated)
    pub source_files: Vec<PathBuf>,

    /// Kernel entry point.
    /// Override: `WEIRD_KERNEL`
    pub kernel_name: String,

    /// 1-D global work size.
    /// Override: `WEIRD_GLOBAL_WORK_SIZE`
    pub global_work_size: usize,

    /// 1-D local work size.
    /// Override: `WEIRD_LOCAL_WORK_SIZE`
    pub local_work_size: usize,

    /// Size of the output buffer in bytes.
    /// Override: `WEIRD_OUTPUT_BYTES`
    pub output_bytes: usize,

    /// Drain the queue once more right before the launch.
    /// Override: `WEIRD_FINISH_BEFORE_LAUNCH`
    pub finish_before_launch: bool,

    /// Default log filter when `RUST_LOG` is unset.
    /// Override: `WEIRD_LOG_LEVEL`
    pub log_level: String,

    /// Override: `WEIRD_LOG_FORMAT`
    pub log_format: LogFormat,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            source_files: vec![PathBuf::from("weird.cl")],
            kernel_name: "weird".to_string(),
            global_work_size: 32,
            local_work_size: 32,
            output_bytes: 32,
            finish_before_launch: true,
            log_level: "warn".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

/// Errors that can occur when loading or validating a [`HarnessConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("invalid environment override {key}={value}: {reason}")]
    EnvOverride {
        key: String,
        value: String,
        reason: String,
    },
}

impl HarnessConfig {
    /// Load from the file named by `WEIRD_CONFIG` if set, else from the
    /// environment alone.
    pub fn discover() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => Self::load(Path::new(&path)),
            _ => Self::from_env(),
        }
    }

    /// Load configuration from a TOML file, falling back to defaults for
    /// missing fields, then apply environment variable overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Load from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut cfg: HarnessConfig = toml::from_str(toml_str)?;
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load only from environment variables, starting from defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_files.is_empty() {
            return Err(ConfigError::Validation(
                "source_files must name at least one file".into(),
            ));
        }
        if self.kernel_name.trim().is_empty() {
            return Err(ConfigError::Validation("kernel_name must not be empty".into()));
        }
        if self.global_work_size == 0 || self.local_work_size == 0 {
            return Err(ConfigError::Validation("work sizes must be > 0".into()));
        }
        if self.global_work_size % self.local_work_size != 0 {
            return Err(ConfigError::Validation(format!(
                "global_work_size {} is not a multiple of local_work_size {}",
                self.global_work_size, self.local_work_size
            )));
        }
        if self.output_bytes == 0 {
            return Err(ConfigError::Validation("output_bytes must be > 0".into()));
        }
        Ok(())
    }

    /// Apply `WEIRD_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = std::env::var("WEIRD_SOURCES") {
            self.source_files = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        if let Ok(val) = std::env::var("WEIRD_KERNEL") {
            self.kernel_name = val;
        }

        if let Some(n) = parse_usize_env("WEIRD_GLOBAL_WORK_SIZE")? {
            self.global_work_size = n;
        }
        if let Some(n) = parse_usize_env("WEIRD_LOCAL_WORK_SIZE")? {
            self.local_work_size = n;
        }
        if let Some(n) = parse_usize_env("WEIRD_OUTPUT_BYTES")? {
            self.output_bytes = n;
        }

        if let Ok(val) = std::env::var("WEIRD_FINISH_BEFORE_LAUNCH") {
            self.finish_before_launch = matches!(val.as_str(), "1" | "true" | "yes");
        }

        if let Ok(val) = std::env::var("WEIRD_LOG_LEVEL") {
            self.log_level = val;
        }

        if let Ok(val) = std::env::var("WEIRD_LOG_FORMAT") {
            self.log_format = val.parse::<LogFormat>().map_err(|reason| {
                ConfigError::EnvOverride {
                    key: "WEIRD_LOG_FORMAT".into(),
                    value: val.clone(),
                    reason,
                }
            })?;
        }

        Ok(())
    }
}

fn parse_usize_env(key: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|e| ConfigError::EnvOverride {
                key: key.into(),
                value: val.clone(),
                reason: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}
