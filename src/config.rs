//! Configuration file management for sslcheck.
//!
//! This module handles loading, parsing, and merging configuration from TOML files
//! and command-line arguments, then validating the result into [`Settings`].
//!
//! # Configuration Precedence
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (`$HOME/.config/sslcheck.toml` or specified with --config)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! hosts = ["example.com", "example.org:8443"]
//!
//! [log]
//! console = false
//! level = "info"
//!
//! [ssl]
//! connect_timeout = 30
//! warn_validity = 30
//! critical_validity = 14
//! verify = "skip"
//!
//! [slack]
//! enabled = true
//! hook_url = "https://hooks.slack.com/services/T000/B000/XXXX"
//! policy = "escalations"
//! format = "attachments"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::inspect::{InspectorConfig, VerifyMode};
use crate::notify::{MessageFormat, NotifyPolicy};
use crate::Thresholds;

/// Application name, used for the default config path and log fields.
pub const APP_NAME: &str = "sslcheck";

/// Upper bound for `ssl.connect_timeout`, in seconds.
pub const MAX_CONNECT_TIMEOUT: u64 = 24 * 60 * 60;

/// Main configuration structure for sslcheck.
///
/// All fields are optional to support partial configuration and merging.
/// Missing values will be filled in by defaults or overridden by CLI arguments.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct Config {
    /// List of hosts to check
    pub hosts: Option<Vec<String>>,
    /// Logging configuration
    pub log: Option<LogConfig>,
    /// Certificate checker configuration
    pub ssl: Option<SslConfig>,
    /// Slack notification configuration
    pub slack: Option<SlackConfig>,
}

/// Logging configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct LogConfig {
    /// Use the human readable console writer instead of JSON
    pub console: Option<bool>,
    /// Force debug level
    pub verbose: Option<bool>,
    /// Level name: trace, debug, info, warn, error
    pub level: Option<String>,
}

/// Certificate checker configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SslConfig {
    /// Connect timeout in seconds
    pub connect_timeout: Option<u64>,
    /// Warning threshold in days
    pub warn_validity: Option<i64>,
    /// Critical threshold in days
    pub critical_validity: Option<i64>,
    /// Chain verification mode
    pub verify: Option<VerifyMode>,
}

/// Slack webhook configuration.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct SlackConfig {
    /// Send the result to the webhook
    pub enabled: Option<bool>,
    /// Incoming webhook URL
    pub hook_url: Option<String>,
    /// Which results are sent
    pub policy: Option<NotifyPolicy>,
    /// Message layout
    pub format: Option<MessageFormat>,
}

/// Validated logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub console: bool,
    pub verbose: bool,
    pub level: String,
}

/// Validated notification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySettings {
    pub enabled: bool,
    /// Always set when `enabled` is true
    pub hook_url: Option<Url>,
    pub policy: NotifyPolicy,
    pub format: MessageFormat,
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub hosts: Vec<String>,
    pub log: LogSettings,
    pub inspector: InspectorConfig,
    pub notify: NotifySettings,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully parsed configuration
    /// * `Err(ConfigError::Io)` - File could not be read
    /// * `Err(ConfigError::Parse)` - File contains invalid TOML
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// `$HOME/.config/sslcheck.toml`, when `HOME` is set.
    pub fn default_path() -> Option<PathBuf> {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join(format!("{}.toml", APP_NAME))
        })
    }

    /// Creates a configuration with the default values.
    ///
    /// # Default Values
    ///
    /// - `hosts`: None (must be provided)
    /// - `log`: JSON output, level "info"
    /// - `ssl.connect_timeout`: 30 seconds
    /// - `ssl.warn_validity`: 30 days
    /// - `ssl.critical_validity`: 14 days
    /// - `ssl.verify`: skip
    /// - `slack.enabled`: false, policy escalations, attachments format
    pub fn defaults() -> Self {
        Config {
            hosts: None,
            log: Some(LogConfig {
                console: Some(false),
                verbose: Some(false),
                level: Some("info".to_string()),
            }),
            ssl: Some(SslConfig {
                connect_timeout: Some(30),
                warn_validity: Some(30),
                critical_validity: Some(14),
                verify: Some(VerifyMode::Skip),
            }),
            slack: Some(SlackConfig {
                enabled: Some(false),
                hook_url: None,
                policy: Some(NotifyPolicy::Escalations),
                format: Some(MessageFormat::Attachments),
            }),
        }
    }

    /// Merges this configuration with another, prioritizing the other's values.
    ///
    /// For each field, if the `other` config has a value (Some), it overrides
    /// this config's value. If the `other` value is None, keeps the current value.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.hosts.is_some() {
            self.hosts = other.hosts;
        }
        self.log = merge_section(self.log, other.log, |base, o| {
            merge_opt(&mut base.console, o.console);
            merge_opt(&mut base.verbose, o.verbose);
            merge_opt(&mut base.level, o.level);
        });
        self.ssl = merge_section(self.ssl, other.ssl, |base, o| {
            merge_opt(&mut base.connect_timeout, o.connect_timeout);
            merge_opt(&mut base.warn_validity, o.warn_validity);
            merge_opt(&mut base.critical_validity, o.critical_validity);
            merge_opt(&mut base.verify, o.verify);
        });
        self.slack = merge_section(self.slack, other.slack, |base, o| {
            merge_opt(&mut base.enabled, o.enabled);
            merge_opt(&mut base.hook_url, o.hook_url);
            merge_opt(&mut base.policy, o.policy);
            merge_opt(&mut base.format, o.format);
        });
        self
    }

    /// Validates the merged configuration.
    ///
    /// Fails when no host is configured, when the critical threshold is higher
    /// than the warning one, or when notification is enabled without a valid
    /// webhook URL. Unset values fall back to [`Config::defaults`].
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let config = Config::defaults().merge_with(self);
        let log = config.log.unwrap_or_default();
        let ssl = config.ssl.unwrap_or_default();
        let slack = config.slack.unwrap_or_default();

        let hosts: Vec<String> = config
            .hosts
            .unwrap_or_default()
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();
        if hosts.is_empty() {
            return Err(ConfigError::Validation("--host is required".to_string()));
        }

        let warn = ssl.warn_validity.unwrap_or(30);
        let critical = ssl.critical_validity.unwrap_or(14);
        if warn < 0 || critical < 0 {
            return Err(ConfigError::Validation(
                "validity thresholds must not be negative".to_string(),
            ));
        }
        if warn < critical {
            return Err(ConfigError::Validation(format!(
                "critical validity ({}d) is higher than warning validity ({}d)",
                critical, warn
            )));
        }

        let thresholds = Thresholds::try_days(warn, critical).ok_or_else(|| {
            ConfigError::Validation("validity thresholds are out of range".to_string())
        })?;

        let connect_timeout = ssl.connect_timeout.unwrap_or(30);
        if connect_timeout == 0 || connect_timeout > MAX_CONNECT_TIMEOUT {
            return Err(ConfigError::Validation(format!(
                "connect timeout must be between 1 and {} seconds, got {}",
                MAX_CONNECT_TIMEOUT, connect_timeout
            )));
        }

        let enabled = slack.enabled.unwrap_or(false);
        let hook_url = match slack.hook_url.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => Some(
                Url::parse(raw)
                    .map_err(|e| ConfigError::Validation(format!("invalid hook_url: {}", e)))?,
            ),
            _ => None,
        };
        if enabled && hook_url.is_none() {
            return Err(ConfigError::Validation(
                "slack notification is enabled but hook_url is not set".to_string(),
            ));
        }

        Ok(Settings {
            hosts,
            log: LogSettings {
                console: log.console.unwrap_or(false),
                verbose: log.verbose.unwrap_or(false),
                level: log.level.unwrap_or_else(|| "info".to_string()),
            },
            inspector: InspectorConfig {
                connect_timeout: Duration::from_secs(connect_timeout),
                thresholds,
                verify: ssl.verify.unwrap_or_default(),
            },
            notify: NotifySettings {
                enabled,
                hook_url,
                policy: slack.policy.unwrap_or_default(),
                format: slack.format.unwrap_or_default(),
            },
        })
    }

    /// Generates an example configuration file in TOML format.
    ///
    /// Creates a sample configuration with all available options set to
    /// example values. Useful for bootstrapping a new configuration file.
    pub fn example_toml() -> String {
        let example = Config {
            hosts: Some(vec![
                "example.com".to_string(),
                "example.org:8443".to_string(),
                "expired.badssl.com".to_string(),
            ]),
            slack: Some(SlackConfig {
                enabled: Some(true),
                hook_url: Some("https://hooks.slack.com/services/T000/B000/XXXX".to_string()),
                policy: Some(NotifyPolicy::Escalations),
                format: Some(MessageFormat::Blocks),
            }),
            ..Config::defaults()
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

fn merge_opt<T>(base: &mut Option<T>, other: Option<T>) {
    if other.is_some() {
        *base = other;
    }
}

fn merge_section<T>(base: Option<T>, other: Option<T>, merge: impl FnOnce(&mut T, T)) -> Option<T> {
    match (base, other) {
        (Some(mut base), Some(other)) => {
            merge(&mut base, other);
            Some(base)
        }
        (base, None) => base,
        (None, other) => other,
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (missing required fields, invalid values, etc.)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
