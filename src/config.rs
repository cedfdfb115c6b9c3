//! Service configuration.
//!
//! Values come from defaults, then `SSHBOX_*` environment variables (plus the
//! conventional `DATABASE_URL`), then command-line flags applied through the
//! `with_*` builders.

use std::net::SocketAddr;
use std::ops::RangeInclusive;
use std::time::Duration;

use thiserror::Error;

use crate::engine::ResourceLimits;
use crate::lifecycle::policy::{
    ProvisioningPolicy, DEFAULT_ALLOWED_IMAGES, DEFAULT_MAX_CONTAINERS_PER_OWNER,
};
use crate::lifecycle::record::DEFAULT_INTERNAL_PORT;
use crate::ports::DEFAULT_PORT_RANGE;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the sshbox service.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    // Server settings
    /// Address the HTTP/WebSocket server listens on.
    pub bind_addr: SocketAddr,
    /// Host name shown in SSH connection hints.
    pub ssh_host: String,

    // Engine settings
    /// Explicit engine address; the platform default socket when `None`.
    pub docker_host: Option<String>,
    /// Upper bound on a synchronous image pull.
    pub pull_timeout: Duration,
    /// Grace period the engine gives a container on stop.
    pub stop_timeout_secs: i64,
    /// Memory limit for containers (in MB).
    pub memory_mb: u64,
    /// CPU cores allocated to containers.
    pub cpu_cores: f64,
    /// Working directory inside containers.
    pub working_dir: String,
    /// Prefix of engine-side container names.
    pub name_prefix: String,

    // Provisioning policy
    /// First host port handed out.
    pub port_range_start: u16,
    /// Last host port handed out (inclusive).
    pub port_range_end: u16,
    /// SSH port inside containers.
    pub internal_port: u16,
    /// Quota of created/running/paused containers per owner.
    pub max_containers_per_owner: u64,
    /// Images that may be provisioned.
    pub allowed_images: Vec<String>,

    // Logs
    /// Line count used when a log request does not specify one.
    pub default_log_lines: usize,
    /// Largest line count a log request may ask for.
    pub max_log_lines: usize,

    // Storage
    /// PostgreSQL connection URL; the in-memory store is used when `None`.
    pub database_url: Option<String>,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            ssh_host: "localhost".to_string(),

            docker_host: None,
            pull_timeout: Duration::from_secs(300),
            stop_timeout_secs: 10,
            memory_mb: 512,
            cpu_cores: 0.5,
            working_dir: "/workspace".to_string(),
            name_prefix: "platform".to_string(),

            port_range_start: *DEFAULT_PORT_RANGE.start(),
            port_range_end: *DEFAULT_PORT_RANGE.end(),
            internal_port: DEFAULT_INTERNAL_PORT,
            max_containers_per_owner: DEFAULT_MAX_CONTAINERS_PER_OWNER,
            allowed_images: DEFAULT_ALLOWED_IMAGES.iter().map(|s| s.to_string()).collect(),

            default_log_lines: 100,
            max_log_lines: 5000,

            database_url: None,
        }
    }
}

impl PlatformConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from environment variables.
    ///
    /// Recognised variables:
    /// - `SSHBOX_BIND_ADDR`, `SSHBOX_SSH_HOST`
    /// - `SSHBOX_DOCKER_HOST`, `SSHBOX_PULL_TIMEOUT_SECS`, `SSHBOX_STOP_TIMEOUT_SECS`
    /// - `SSHBOX_MEMORY_MB`, `SSHBOX_CPU_CORES`, `SSHBOX_WORKING_DIR`, `SSHBOX_NAME_PREFIX`
    /// - `SSHBOX_PORT_RANGE_START`, `SSHBOX_PORT_RANGE_END`, `SSHBOX_INTERNAL_PORT`
    /// - `SSHBOX_MAX_CONTAINERS`, `SSHBOX_ALLOWED_IMAGES` (comma separated)
    /// - `SSHBOX_DEFAULT_LOG_LINES`, `SSHBOX_MAX_LOG_LINES`
    /// - `DATABASE_URL`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a variable cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`PlatformConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Server settings
        if let Some(val) = lookup("SSHBOX_BIND_ADDR") {
            config.bind_addr = parse_env_value(&val, "SSHBOX_BIND_ADDR")?;
        }

        if let Some(val) = lookup("SSHBOX_SSH_HOST") {
            config.ssh_host = val;
        }

        // Engine settings
        config.docker_host = lookup("SSHBOX_DOCKER_HOST").filter(|v| !v.is_empty());

        if let Some(val) = lookup("SSHBOX_PULL_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "SSHBOX_PULL_TIMEOUT_SECS")?;
            config.pull_timeout = Duration::from_secs(secs);
        }

        if let Some(val) = lookup("SSHBOX_STOP_TIMEOUT_SECS") {
            config.stop_timeout_secs = parse_env_value(&val, "SSHBOX_STOP_TIMEOUT_SECS")?;
        }

        if let Some(val) = lookup("SSHBOX_MEMORY_MB") {
            config.memory_mb = parse_env_value(&val, "SSHBOX_MEMORY_MB")?;
        }

        if let Some(val) = lookup("SSHBOX_CPU_CORES") {
            config.cpu_cores = parse_env_value(&val, "SSHBOX_CPU_CORES")?;
        }

        if let Some(val) = lookup("SSHBOX_WORKING_DIR") {
            config.working_dir = val;
        }

        if let Some(val) = lookup("SSHBOX_NAME_PREFIX") {
            config.name_prefix = val;
        }

        // Provisioning policy
        if let Some(val) = lookup("SSHBOX_PORT_RANGE_START") {
            config.port_range_start = parse_env_value(&val, "SSHBOX_PORT_RANGE_START")?;
        }

        if let Some(val) = lookup("SSHBOX_PORT_RANGE_END") {
            config.port_range_end = parse_env_value(&val, "SSHBOX_PORT_RANGE_END")?;
        }

        if let Some(val) = lookup("SSHBOX_INTERNAL_PORT") {
            config.internal_port = parse_env_value(&val, "SSHBOX_INTERNAL_PORT")?;
        }

        if let Some(val) = lookup("SSHBOX_MAX_CONTAINERS") {
            config.max_containers_per_owner = parse_env_value(&val, "SSHBOX_MAX_CONTAINERS")?;
        }

        if let Some(val) = lookup("SSHBOX_ALLOWED_IMAGES") {
            config.allowed_images = parse_list(&val);
        }

        // Logs
        if let Some(val) = lookup("SSHBOX_DEFAULT_LOG_LINES") {
            config.default_log_lines = parse_env_value(&val, "SSHBOX_DEFAULT_LOG_LINES")?;
        }

        if let Some(val) = lookup("SSHBOX_MAX_LOG_LINES") {
            config.max_log_lines = parse_env_value(&val, "SSHBOX_MAX_LOG_LINES")?;
        }

        // Storage
        config.database_url = lookup("DATABASE_URL").filter(|v| !v.is_empty());

        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            return Err(ConfigError::ValidationFailed(format!(
                "invalid port range {}-{}",
                self.port_range_start, self.port_range_end
            )));
        }

        if self.internal_port == 0 {
            return Err(ConfigError::ValidationFailed(
                "internal_port must be greater than 0".to_string(),
            ));
        }

        if self.max_containers_per_owner == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_containers_per_owner must be greater than 0".to_string(),
            ));
        }

        if self.allowed_images.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "allowed_images cannot be empty".to_string(),
            ));
        }

        if self.memory_mb < 64 {
            return Err(ConfigError::ValidationFailed(
                "memory_mb must be at least 64 MB".to_string(),
            ));
        }

        if self.cpu_cores <= 0.0 {
            return Err(ConfigError::ValidationFailed(
                "cpu_cores must be greater than 0".to_string(),
            ));
        }

        if self.pull_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "pull_timeout must be greater than 0".to_string(),
            ));
        }

        if self.default_log_lines == 0 || self.default_log_lines > self.max_log_lines {
            return Err(ConfigError::ValidationFailed(
                "default_log_lines must be between 1 and max_log_lines".to_string(),
            ));
        }

        if self.name_prefix.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "name_prefix cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_range_start..=self.port_range_end
    }

    pub fn resource_limits(&self) -> ResourceLimits {
        ResourceLimits::new(self.memory_mb, self.cpu_cores)
    }

    pub fn policy(&self) -> ProvisioningPolicy {
        ProvisioningPolicy::new(self.allowed_images.clone(), self.max_containers_per_owner)
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_ssh_host(mut self, host: impl Into<String>) -> Self {
        self.ssh_host = host.into();
        self
    }

    pub fn with_docker_host(mut self, host: impl Into<String>) -> Self {
        self.docker_host = Some(host.into());
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_port_range(mut self, range: RangeInclusive<u16>) -> Self {
        self.port_range_start = *range.start();
        self.port_range_end = *range.end();
        self
    }

    pub fn with_max_containers_per_owner(mut self, max: u64) -> Self {
        self.max_containers_per_owner = max;
        self
    }

    pub fn with_allowed_images(mut self, images: Vec<String>) -> Self {
        self.allowed_images = images;
        self
    }

    pub fn with_pull_timeout(mut self, timeout: Duration) -> Self {
        self.pull_timeout = timeout;
        self
    }
}

/// Parses an environment variable value into the specified type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Splits a comma-separated list, dropping empty entries.
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
