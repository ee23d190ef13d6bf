use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub intel: IntelConfig,
    pub slack: SlackConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct IntelConfig {
    /// Host of the threat-intelligence API, with or without a scheme.
    pub hostname: String,
    pub api_key: SecretString,
    pub ignore_tls_errors: bool,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    /// Verifies that inbound requests were sent by Slack.
    pub signing_secret: SecretString,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub command: String,
    /// Per-source lookup deadline. Zero disables it.
    pub source_timeout_secs: u64,
    pub progress_width: usize,
    pub payload_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Slack request ingress.
    pub port: u16,
    pub health_check_port: u16,
    pub event_queue_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub intel_hostname: Option<String>,
    pub intel_api_key: Option<String>,
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub search_command: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            intel: IntelConfig {
                hostname: String::new(),
                api_key: String::new().into(),
                ignore_tls_errors: false,
                timeout_secs: 120,
            },
            slack: SlackConfig {
                bot_token: String::new().into(),
                signing_secret: String::new().into(),
            },
            search: SearchConfig {
                command: "/intel".to_string(),
                source_timeout_secs: 60,
                progress_width: 40,
                payload_ttl_secs: 30 * 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                health_check_port: 8080,
                event_queue_capacity: 256,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl IntelConfig {
    /// Base URL for API calls; a bare hostname is assumed to speak https.
    pub fn base_url(&self) -> String {
        let host = self.hostname.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SearchConfig {
    pub fn source_timeout(&self) -> Option<Duration> {
        (self.source_timeout_secs > 0).then(|| Duration::from_secs(self.source_timeout_secs))
    }

    pub fn payload_ttl(&self) -> Duration {
        Duration::from_secs(self.payload_ttl_secs)
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("intelbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(intel) = patch.intel {
            if let Some(hostname) = intel.hostname {
                self.intel.hostname = hostname;
            }
            if let Some(api_key) = intel.api_key {
                self.intel.api_key = secret_value(api_key);
            }
            if let Some(ignore_tls_errors) = intel.ignore_tls_errors {
                self.intel.ignore_tls_errors = ignore_tls_errors;
            }
            if let Some(timeout_secs) = intel.timeout_secs {
                self.intel.timeout_secs = timeout_secs;
            }
        }

        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
        }

        if let Some(search) = patch.search {
            if let Some(command) = search.command {
                self.search.command = command;
            }
            if let Some(source_timeout_secs) = search.source_timeout_secs {
                self.search.source_timeout_secs = source_timeout_secs;
            }
            if let Some(progress_width) = search.progress_width {
                self.search.progress_width = progress_width;
            }
            if let Some(payload_ttl_secs) = search.payload_ttl_secs {
                self.search.payload_ttl_secs = payload_ttl_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(capacity) = server.event_queue_capacity {
                self.server.event_queue_capacity = capacity;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("INTELBOT_INTEL_HOSTNAME") {
            self.intel.hostname = value;
        }
        if let Some(value) = read_env("INTELBOT_INTEL_API_KEY") {
            self.intel.api_key = secret_value(value);
        }
        if let Some(value) = read_env("INTELBOT_INTEL_IGNORE_TLS_ERRORS") {
            self.intel.ignore_tls_errors = parse_bool("INTELBOT_INTEL_IGNORE_TLS_ERRORS", &value)?;
        }
        if let Some(value) = read_env("INTELBOT_INTEL_TIMEOUT_SECS") {
            self.intel.timeout_secs = parse_u64("INTELBOT_INTEL_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("INTELBOT_SLACK_BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("INTELBOT_SLACK_SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }

        if let Some(value) = read_env("INTELBOT_SEARCH_COMMAND") {
            self.search.command = value;
        }
        if let Some(value) = read_env("INTELBOT_SEARCH_SOURCE_TIMEOUT_SECS") {
            self.search.source_timeout_secs =
                parse_u64("INTELBOT_SEARCH_SOURCE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("INTELBOT_SEARCH_PROGRESS_WIDTH") {
            self.search.progress_width = parse_usize("INTELBOT_SEARCH_PROGRESS_WIDTH", &value)?;
        }
        if let Some(value) = read_env("INTELBOT_SEARCH_PAYLOAD_TTL_SECS") {
            self.search.payload_ttl_secs = parse_u64("INTELBOT_SEARCH_PAYLOAD_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("INTELBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("INTELBOT_SERVER_PORT") {
            self.server.port = parse_u16("INTELBOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("INTELBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("INTELBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("INTELBOT_LOGGING_LEVEL").or_else(|| read_env("INTELBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("INTELBOT_LOGGING_FORMAT").or_else(|| read_env("INTELBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(hostname) = overrides.intel_hostname {
            self.intel.hostname = hostname;
        }
        if let Some(api_key) = overrides.intel_api_key {
            self.intel.api_key = secret_value(api_key);
        }
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(command) = overrides.search_command {
            self.search.command = command;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_intel(&self.intel)?;
        validate_slack(&self.slack)?;
        validate_search(&self.search)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("intelbot.toml"), PathBuf::from("config/intelbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_intel(intel: &IntelConfig) -> Result<(), ConfigError> {
    if intel.hostname.trim().is_empty() {
        return Err(ConfigError::Validation(
            "intel.hostname is required (e.g. `intel.example.com`)".to_string(),
        ));
    }

    if intel.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "intel.api_key is required. Generate one under your account settings on the intel server"
                .to_string(),
        ));
    }

    if intel.timeout_secs == 0 || intel.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "intel.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    Ok(())
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string()
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used an app-level token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required. Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string()
        ));
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if !search.command.starts_with('/') || search.command.trim().len() < 2 {
        return Err(ConfigError::Validation(
            "search.command must be a slash command such as `/intel`".to_string(),
        ));
    }

    if search.progress_width == 0 || search.progress_width > 100 {
        return Err(ConfigError::Validation(
            "search.progress_width must be in range 1..=100".to_string(),
        ));
    }

    if search.payload_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "search.payload_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 || server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must be greater than zero".to_string(),
        ));
    }
    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(format!(
            "server.port and server.health_check_port must differ (both are {})",
            server.port
        )));
    }
    if server.event_queue_capacity == 0 {
        return Err(ConfigError::Validation(
            "server.event_queue_capacity must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn invalid_override(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() }
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| invalid_override(key, value))
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| invalid_override(key, value))
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| invalid_override(key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| invalid_override(key, value))
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    intel: Option<IntelPatch>,
    slack: Option<SlackPatch>,
    search: Option<SearchPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct IntelPatch {
    hostname: Option<String>,
    api_key: Option<String>,
    ignore_tls_errors: Option<bool>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    command: Option<String>,
    source_timeout_secs: Option<u64>,
    progress_width: Option<usize>,
    payload_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    event_queue_capacity: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
