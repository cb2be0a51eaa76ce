use crate::utils::error::{Result, ScoutError};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Which transport the gateway serves the protocol over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Http,
    Stdio,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub transport: Transport,
    pub http: HttpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub ssh: SshSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_colors")]
    pub colors: bool,
    /// Include request/response payloads in DEBUG records.
    #[serde(default)]
    pub payloads: bool,
    #[serde(default = "default_slow_threshold_ms")]
    pub slow_threshold_ms: u64,
    /// Include underlying error chains in error records.
    #[serde(default)]
    pub include_traceback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Byte cap for remote file reads.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Seconds for the remote `timeout N <cmd>` wrapper on ad-hoc queries.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    /// Per-endpoint cap for the TCP connectivity probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// SSH client config to load the host table from.
    #[serde(default = "default_ssh_config_path")]
    pub config_path: PathBuf,
    /// Seconds before an unused pooled session is reaped.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Reject servers whose host key the handler does not accept.
    #[serde(default)]
    pub strict_host_keys: bool,
    /// Glob patterns; when nonempty, only matching host names are loaded.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Glob patterns; matching host names are skipped (allowlist wins).
    #[serde(default)]
    pub blocklist: Vec<String>,
}

// Default values
fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "debug".to_string()
}

fn default_log_colors() -> bool {
    true
}

fn default_slow_threshold_ms() -> u64 {
    1000
}

fn default_max_file_size() -> u64 {
    1_048_576
}

fn default_command_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> f64 {
    2.0
}

fn default_ssh_config_path() -> PathBuf {
    let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".ssh").join("config")
}

fn default_idle_timeout() -> u64 {
    60
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            colors: default_log_colors(),
            payloads: false,
            slow_threshold_ms: default_slow_threshold_ms(),
            include_traceback: false,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            command_timeout_secs: default_command_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            config_path: default_ssh_config_path(),
            idle_timeout_secs: default_idle_timeout(),
            strict_host_keys: false,
            allowlist: Vec::new(),
            blocklist: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: Transport::Http,
            http: HttpConfig::default(),
            logging: LoggingConfig::default(),
            limits: LimitsConfig::default(),
            ssh: SshSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from `SCOUT_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(transport) = read_env("SCOUT_TRANSPORT") {
            config.transport = match transport.to_lowercase().as_str() {
                "http" => Transport::Http,
                "stdio" => Transport::Stdio,
                other => {
                    return Err(ScoutError::Config(format!(
                        "Invalid SCOUT_TRANSPORT: {}. Must be 'http' or 'stdio'",
                        other
                    )))
                }
            };
        }

        if let Some(host) = read_env("SCOUT_HTTP_HOST") {
            config.http.host = host;
        }
        if let Some(port) = read_env("SCOUT_HTTP_PORT") {
            config.http.port = parse_num("SCOUT_HTTP_PORT", &port)?;
        }

        if let Some(level) = read_env("SCOUT_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
        if let Some(colors) = read_env("SCOUT_LOG_COLORS") {
            config.logging.colors = parse_bool(&colors);
        }
        if let Some(payloads) = read_env("SCOUT_LOG_PAYLOADS") {
            config.logging.payloads = parse_bool(&payloads);
        }
        if let Some(threshold) = read_env("SCOUT_SLOW_THRESHOLD_MS") {
            config.logging.slow_threshold_ms = parse_num("SCOUT_SLOW_THRESHOLD_MS", &threshold)?;
        }
        if let Some(traceback) = read_env("SCOUT_INCLUDE_TRACEBACK") {
            config.logging.include_traceback = parse_bool(&traceback);
        }

        if let Some(max) = read_env("SCOUT_MAX_FILE_SIZE") {
            config.limits.max_file_size = parse_num("SCOUT_MAX_FILE_SIZE", &max)?;
        }
        if let Some(timeout) = read_env("SCOUT_COMMAND_TIMEOUT") {
            config.limits.command_timeout_secs = parse_num("SCOUT_COMMAND_TIMEOUT", &timeout)?;
        }

        if let Some(path) = read_env("SCOUT_SSH_CONFIG_PATH") {
            config.ssh.config_path = PathBuf::from(path);
        }
        if let Some(idle) = read_env("SCOUT_IDLE_TIMEOUT") {
            config.ssh.idle_timeout_secs = parse_num("SCOUT_IDLE_TIMEOUT", &idle)?;
        }
        if let Some(strict) = read_env("SCOUT_SSH_STRICT_HOST_KEYS") {
            config.ssh.strict_host_keys = parse_bool(&strict);
        }
        if let Some(allow) = read_env("SCOUT_HOST_ALLOWLIST") {
            config.ssh.allowlist = parse_patterns(&allow);
        }
        if let Some(block) = read_env("SCOUT_HOST_BLOCKLIST") {
            config.ssh.blocklist = parse_patterns(&block);
        }

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.limits.max_file_size == 0 {
            return Err(ScoutError::Config(
                "SCOUT_MAX_FILE_SIZE must be greater than zero".to_string(),
            ));
        }
        if self.limits.command_timeout_secs == 0 {
            return Err(ScoutError::Config(
                "SCOUT_COMMAND_TIMEOUT must be greater than zero".to_string(),
            ));
        }
        if self.ssh.idle_timeout_secs == 0 {
            return Err(ScoutError::Config(
                "SCOUT_IDLE_TIMEOUT must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ScoutError::Config(format!("Invalid {}: {}", name, value)))
}

fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_patterns(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
