//! Configuration file parsing and management.
//!
//! This module handles loading configuration from TOML files and `KC_*`
//! environment variables, and merging configurations with proper precedence
//! rules.

use crate::error::KeyCheckError;
use crate::types::MAX_CONCURRENCY;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration loaded from TOML files.
///
/// ```toml
/// [defaults]
/// bucket = "images"
/// region = "us-west-2"
/// concurrency = 2000
/// timeout = "30s"
///
/// [output]
/// report_path = "resulturls"
/// ```
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct FileConfig {
    /// Default values for run options
    pub defaults: Option<DefaultsConfig>,

    /// Output preferences
    pub output: Option<OutputConfig>,
}

/// Default configuration values that map to CLI options.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct DefaultsConfig {
    /// Default concurrency level
    pub concurrency: Option<usize>,

    /// Target bucket
    pub bucket: Option<String>,

    /// Bucket region
    pub region: Option<String>,

    /// Custom S3-compatible endpoint
    pub endpoint: Option<String>,

    /// Per-call timeout (as string, e.g., "5s", "30s", "2m")
    pub timeout: Option<String>,

    /// Retries for transient failures
    pub retries: Option<u32>,

    /// Send unsigned requests
    pub no_sign_request: Option<bool>,
}

/// Output configuration.
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
pub struct OutputConfig {
    /// Where the broken-key report is written
    pub report_path: Option<String>,
}

/// Configuration discovery and loading functionality.
#[derive(Debug, Clone, Default)]
pub struct ConfigManager {
    /// Whether to log which config files were picked up
    pub verbose: bool,
}

impl ConfigManager {
    /// Create a new configuration manager.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `FileError` if the file is missing or unreadable, and
    /// `ConfigError` if it is not valid TOML or fails validation.
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<FileConfig, KeyCheckError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(KeyCheckError::file_error(
                path.to_string_lossy(),
                "Configuration file not found",
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            KeyCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to read configuration file: {}", e),
            )
        })?;

        let config: FileConfig = toml::from_str(&content).map_err(|e| {
            KeyCheckError::config(format!("Failed to parse TOML configuration: {}", e))
        })?;

        self.validate_config(&config)?;

        Ok(config)
    }

    /// Discover and load configuration files in precedence order.
    ///
    /// XDG config < home directory config < local config. Files that fail to
    /// load are skipped with a warning.
    pub fn discover_and_load(&self) -> Result<FileConfig, KeyCheckError> {
        let candidates = [
            self.get_xdg_config_path(),
            self.get_global_config_path(),
            self.get_local_config_path(),
        ];

        let mut merged_config = FileConfig::default();
        for path in candidates.into_iter().flatten() {
            match self.load_file(&path) {
                Ok(config) => {
                    if self.verbose {
                        tracing::info!(path = %path.display(), "loaded configuration file");
                    }
                    merged_config = self.merge_configs(merged_config, config);
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring configuration file");
                }
            }
        }

        Ok(merged_config)
    }

    /// Local configuration file in the current directory.
    fn get_local_config_path(&self) -> Option<PathBuf> {
        ["./key-check.toml", "./.key-check.toml"]
            .into_iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(Path::to_path_buf)
    }

    /// Configuration file in the user's home directory.
    fn get_global_config_path(&self) -> Option<PathBuf> {
        let home = env::var_os("HOME")?;
        [".key-check.toml", "key-check.toml"]
            .iter()
            .map(|candidate| Path::new(&home).join(candidate))
            .find(|path| path.exists())
    }

    /// Follows the XDG Base Directory Specification.
    fn get_xdg_config_path(&self) -> Option<PathBuf> {
        let config_dir = env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| Path::new(&home).join(".config")))?;

        let path = config_dir.join("key-check").join("config.toml");
        path.exists().then_some(path)
    }

    /// Merge two configurations; values from `higher` win field by field.
    pub fn merge_configs(&self, lower: FileConfig, higher: FileConfig) -> FileConfig {
        FileConfig {
            defaults: match (lower.defaults, higher.defaults) {
                (Some(lower), Some(higher)) => Some(DefaultsConfig {
                    concurrency: higher.concurrency.or(lower.concurrency),
                    bucket: higher.bucket.or(lower.bucket),
                    region: higher.region.or(lower.region),
                    endpoint: higher.endpoint.or(lower.endpoint),
                    timeout: higher.timeout.or(lower.timeout),
                    retries: higher.retries.or(lower.retries),
                    no_sign_request: higher.no_sign_request.or(lower.no_sign_request),
                }),
                (lower, higher) => higher.or(lower),
            },
            output: match (lower.output, higher.output) {
                (Some(lower), Some(higher)) => Some(OutputConfig {
                    report_path: higher.report_path.or(lower.report_path),
                }),
                (lower, higher) => higher.or(lower),
            },
        }
    }

    /// Validate a configuration for common issues.
    fn validate_config(&self, config: &FileConfig) -> Result<(), KeyCheckError> {
        if let Some(defaults) = &config.defaults {
            if let Some(concurrency) = defaults.concurrency {
                if concurrency == 0 || concurrency > MAX_CONCURRENCY {
                    return Err(KeyCheckError::config(format!(
                        "Concurrency must be between 1 and {}",
                        MAX_CONCURRENCY
                    )));
                }
            }

            if let Some(timeout_str) = &defaults.timeout {
                if parse_timeout_string(timeout_str).is_none() {
                    return Err(KeyCheckError::config(format!(
                        "Invalid timeout format '{}'. Use format like '5s', '30s', '2m'",
                        timeout_str
                    )));
                }
            }

            if let Some(bucket) = &defaults.bucket {
                if bucket.trim().is_empty() {
                    return Err(KeyCheckError::config("Bucket name cannot be empty"));
                }
            }
        }

        Ok(())
    }
}

/// Environment variable configuration that mirrors CLI options.
///
/// Values come from the `KC_*` variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvConfig {
    pub concurrency: Option<usize>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub timeout: Option<String>,
    pub retries: Option<u32>,
    pub output: Option<String>,
    pub config: Option<String>,
    pub no_sign_request: Option<bool>,
}

/// Load configuration from environment variables.
///
/// Invalid values are logged as warnings and ignored.
pub fn load_env_config(verbose: bool) -> EnvConfig {
    parse_env_config(|name| env::var(name).ok(), verbose)
}

/// Build an [`EnvConfig`] from an arbitrary variable lookup.
pub fn parse_env_config<F>(lookup: F, verbose: bool) -> EnvConfig
where
    F: Fn(&str) -> Option<String>,
{
    let mut env_config = EnvConfig::default();

    let non_empty = |name: &str| -> Option<String> {
        let value = lookup(name)?;
        if value.trim().is_empty() {
            return None;
        }
        if verbose {
            tracing::info!("Using {}={}", name, value);
        }
        Some(value.trim().to_string())
    };

    if let Some(val) = lookup("KC_CONCURRENCY") {
        match val.trim().parse::<usize>() {
            Ok(concurrency) if concurrency > 0 && concurrency <= MAX_CONCURRENCY => {
                env_config.concurrency = Some(concurrency);
                if verbose {
                    tracing::info!("Using KC_CONCURRENCY={}", concurrency);
                }
            }
            _ => {
                tracing::warn!(
                    "Invalid KC_CONCURRENCY='{}', must be 1-{}",
                    val,
                    MAX_CONCURRENCY
                );
            }
        }
    }

    if let Some(timeout_str) = lookup("KC_TIMEOUT") {
        if parse_timeout_string(&timeout_str).is_some() {
            env_config.timeout = Some(timeout_str.trim().to_string());
            if verbose {
                tracing::info!("Using KC_TIMEOUT={}", timeout_str);
            }
        } else {
            tracing::warn!(
                "Invalid KC_TIMEOUT='{}', use format like '5s', '30s', '2m'",
                timeout_str
            );
        }
    }

    if let Some(val) = lookup("KC_RETRIES") {
        match val.trim().parse::<u32>() {
            Ok(retries) => {
                env_config.retries = Some(retries);
                if verbose {
                    tracing::info!("Using KC_RETRIES={}", retries);
                }
            }
            Err(_) => tracing::warn!("Invalid KC_RETRIES='{}', must be a number", val),
        }
    }

    if let Some(val) = lookup("KC_NO_SIGN_REQUEST") {
        match parse_bool(&val) {
            Some(flag) => {
                env_config.no_sign_request = Some(flag);
                if verbose {
                    tracing::info!("Using KC_NO_SIGN_REQUEST={}", flag);
                }
            }
            None => tracing::warn!(
                "Invalid KC_NO_SIGN_REQUEST='{}', use true/false, 1/0 or yes/no",
                val
            ),
        }
    }

    env_config.bucket = non_empty("KC_BUCKET");
    env_config.region = non_empty("KC_REGION");
    env_config.endpoint = non_empty("KC_ENDPOINT");
    env_config.output = non_empty("KC_OUTPUT");
    env_config.config = non_empty("KC_CONFIG");

    env_config
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a timeout string like "5s", "30s", "2m" into seconds.
///
/// A bare number is read as seconds. Zero is rejected.
pub fn parse_timeout_string(timeout_str: &str) -> Option<u64> {
    let timeout_str = timeout_str.trim().to_lowercase();

    let seconds = if let Some(secs) = timeout_str.strip_suffix('s') {
        secs.parse::<u64>().ok()
    } else if let Some(mins) = timeout_str.strip_suffix('m') {
        mins.parse::<u64>().ok().and_then(|m| m.checked_mul(60))
    } else {
        timeout_str.parse::<u64>().ok()
    }?;

    (seconds > 0).then_some(seconds)
}
