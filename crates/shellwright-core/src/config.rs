//! Configuration types for shellwright.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::pattern::Pattern;
use crate::policy::WaitPolicy;
use crate::{Error, Result};

/// Client configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Output collection settings
    pub wait: WaitSettings,
    /// Loopback transport settings
    pub local: LocalSettings,
    /// Logging settings
    pub logging: LoggingSettings,
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ClientConfig =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.connection.host.trim().is_empty() {
            return Err(Error::Config("connection.host cannot be empty".to_string()));
        }

        if self.connection.port == 0 {
            return Err(Error::Config("connection.port must be > 0".to_string()));
        }

        if self.connection.timeout_ms == 0 {
            return Err(Error::Config(
                "connection.timeout_ms must be > 0".to_string(),
            ));
        }

        if self.wait.quiet_cycles == 0 {
            return Err(Error::Config("wait.quiet_cycles must be > 0".to_string()));
        }

        // Patterns are compiled again per collection; this only surfaces typos early
        for pattern in [&self.wait.start_pattern, &self.wait.end_pattern]
            .into_iter()
            .flatten()
        {
            Pattern::parse(pattern)?;
        }

        if self.local.shell.trim().is_empty() {
            return Err(Error::Config("local.shell cannot be empty".to_string()));
        }

        Ok(())
    }

    /// Collection timeout as a duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.connection.timeout_ms)
    }
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Remote host
    pub host: String,
    /// Remote port
    pub port: u16,
    /// User to authenticate as
    pub user: Option<String>,
    /// Maximum wait for a single output collection, in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 22,
            user: None,
            timeout_ms: 30_000,
        }
    }
}

/// Output collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    /// Consecutive empty reads required before ending
    pub quiet_cycles: u32,
    /// Pause on each empty read of the ending phase, in microseconds
    pub pause_before_end_us: u64,
    /// Sleep between polls, in microseconds
    pub poll_interval_us: u64,
    /// Wait for at least one character before counting silence
    pub require_at_least_one_char: bool,
    /// Pattern gating the start of collection
    pub start_pattern: Option<String>,
    /// Pattern ending collection
    pub end_pattern: Option<String>,
}

impl Default for WaitSettings {
    fn default() -> Self {
        let policy = WaitPolicy::default();
        Self {
            quiet_cycles: policy.quiet_cycles_before_end,
            pause_before_end_us: policy.pause_before_end.as_micros() as u64,
            poll_interval_us: policy.poll_interval.as_micros() as u64,
            require_at_least_one_char: policy.require_at_least_one_char,
            start_pattern: None,
            end_pattern: None,
        }
    }
}

impl WaitSettings {
    /// Build the wait policy described by these settings.
    pub fn to_policy(&self) -> WaitPolicy {
        WaitPolicy {
            start_pattern: self.start_pattern.clone(),
            end_pattern: self.end_pattern.clone(),
            require_at_least_one_char: self.require_at_least_one_char,
            quiet_cycles_before_end: self.quiet_cycles,
            pause_before_end: Duration::from_micros(self.pause_before_end_us),
            poll_interval: Duration::from_micros(self.poll_interval_us),
        }
    }
}

/// Loopback transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalSettings {
    /// Shell used for shell channels and `sh -c` exec channels
    pub shell: String,
    /// Host public key used for fingerprints
    pub host_key_path: String,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            host_key_path: "/etc/ssh/ssh_host_ed25519_key.pub".to_string(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
