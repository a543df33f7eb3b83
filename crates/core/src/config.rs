use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::poll::{PollLimits, DEFAULT_MAX_OPTION_LEN, DEFAULT_MAX_QUESTION_LEN};
use crate::messages::Locale;

pub const DEFAULT_COMMAND_PREFIX: &str = "!poll";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub store: StoreConfig,
    pub mattermost: MattermostConfig,
    pub polls: PollsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub vote_retry_attempts: u32,
    pub vote_retry_base_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct MattermostConfig {
    pub url: String,
    pub bot_token: SecretString,
    pub http_timeout_secs: u64,
    pub connect_retries: u32,
    pub connect_retry_delay_ms: u64,
}

#[derive(Clone, Debug)]
pub struct PollsConfig {
    pub command_prefix: String,
    pub max_question_len: usize,
    pub max_option_len: usize,
    pub locale: Locale,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Memory,
    Sql,
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
    pub database_url: Option<String>,
    pub store_backend: Option<StoreBackend>,
    pub log_level: Option<String>,
    pub mattermost_url: Option<String>,
    pub mattermost_bot_token: Option<String>,
    pub locale: Option<Locale>,
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
            database: DatabaseConfig {
                url: "sqlite://pollbot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            store: StoreConfig {
                backend: StoreBackend::Sql,
                vote_retry_attempts: 5,
                vote_retry_base_delay_ms: 20,
            },
            mattermost: MattermostConfig {
                url: String::new(),
                bot_token: String::new().into(),
                http_timeout_secs: 10,
                connect_retries: 5,
                connect_retry_delay_ms: 1_000,
            },
            polls: PollsConfig {
                command_prefix: DEFAULT_COMMAND_PREFIX.to_string(),
                max_question_len: DEFAULT_MAX_QUESTION_LEN,
                max_option_len: DEFAULT_MAX_OPTION_LEN,
                locale: Locale::En,
            },
            server: ServerConfig { bind_address: "127.0.0.1".to_string(), health_check_port: 8080 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl StoreBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sql => "sql",
        }
    }
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sql" => Ok(Self::Sql),
            other => Err(ConfigError::Validation(format!(
                "unsupported store backend `{other}` (expected memory|sql)"
            ))),
        }
    }
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

impl PollsConfig {
    pub fn limits(&self) -> PollLimits {
        PollLimits { max_question_len: self.max_question_len, max_option_len: self.max_option_len }
    }
}

impl MattermostConfig {
    /// Server URL with a scheme; bare hosts default to plain http.
    pub fn http_url(&self) -> String {
        let url = self.url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        }
    }

    pub fn websocket_url(&self) -> String {
        let http_url = self.http_url();
        let ws_base = http_url.replacen("http", "ws", 1);
        format!("{ws_base}/api/v4/websocket")
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pollbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(store) = patch.store {
            if let Some(backend) = store.backend {
                self.store.backend = backend;
            }
            if let Some(attempts) = store.vote_retry_attempts {
                self.store.vote_retry_attempts = attempts;
            }
            if let Some(delay) = store.vote_retry_base_delay_ms {
                self.store.vote_retry_base_delay_ms = delay;
            }
        }

        if let Some(mattermost) = patch.mattermost {
            if let Some(url) = mattermost.url {
                self.mattermost.url = url;
            }
            if let Some(bot_token_value) = mattermost.bot_token {
                self.mattermost.bot_token = secret_value(bot_token_value);
            }
            if let Some(http_timeout_secs) = mattermost.http_timeout_secs {
                self.mattermost.http_timeout_secs = http_timeout_secs;
            }
            if let Some(connect_retries) = mattermost.connect_retries {
                self.mattermost.connect_retries = connect_retries;
            }
            if let Some(connect_retry_delay_ms) = mattermost.connect_retry_delay_ms {
                self.mattermost.connect_retry_delay_ms = connect_retry_delay_ms;
            }
        }

        if let Some(polls) = patch.polls {
            if let Some(command_prefix) = polls.command_prefix {
                self.polls.command_prefix = command_prefix;
            }
            if let Some(max_question_len) = polls.max_question_len {
                self.polls.max_question_len = max_question_len;
            }
            if let Some(max_option_len) = polls.max_option_len {
                self.polls.max_option_len = max_option_len;
            }
            if let Some(locale) = polls.locale {
                self.polls.locale = locale;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
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
        if let Some(value) = read_env("POLLBOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("POLLBOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("POLLBOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("POLLBOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("POLLBOT_STORE_BACKEND") {
            self.store.backend = value.parse()?;
        }
        if let Some(value) = read_env("POLLBOT_STORE_VOTE_RETRY_ATTEMPTS") {
            self.store.vote_retry_attempts =
                parse_u32("POLLBOT_STORE_VOTE_RETRY_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_STORE_VOTE_RETRY_BASE_DELAY_MS") {
            self.store.vote_retry_base_delay_ms =
                parse_u64("POLLBOT_STORE_VOTE_RETRY_BASE_DELAY_MS", &value)?;
        }

        // MATTERMOST_URL and BOT_TOKEN are accepted for existing deployments.
        let url = read_env("POLLBOT_MATTERMOST_URL").or_else(|| read_env("MATTERMOST_URL"));
        if let Some(value) = url {
            self.mattermost.url = value;
        }
        let bot_token = read_env("POLLBOT_MATTERMOST_BOT_TOKEN").or_else(|| read_env("BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.mattermost.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_HTTP_TIMEOUT_SECS") {
            self.mattermost.http_timeout_secs =
                parse_u64("POLLBOT_MATTERMOST_HTTP_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_CONNECT_RETRIES") {
            self.mattermost.connect_retries =
                parse_u32("POLLBOT_MATTERMOST_CONNECT_RETRIES", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_MATTERMOST_CONNECT_RETRY_DELAY_MS") {
            self.mattermost.connect_retry_delay_ms =
                parse_u64("POLLBOT_MATTERMOST_CONNECT_RETRY_DELAY_MS", &value)?;
        }

        if let Some(value) = read_env("POLLBOT_POLLS_COMMAND_PREFIX") {
            self.polls.command_prefix = value;
        }
        if let Some(value) = read_env("POLLBOT_POLLS_MAX_QUESTION_LEN") {
            self.polls.max_question_len = parse_usize("POLLBOT_POLLS_MAX_QUESTION_LEN", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_POLLS_MAX_OPTION_LEN") {
            self.polls.max_option_len = parse_usize("POLLBOT_POLLS_MAX_OPTION_LEN", &value)?;
        }
        if let Some(value) = read_env("POLLBOT_POLLS_LOCALE") {
            self.polls.locale = value.parse().map_err(ConfigError::Validation)?;
        }

        if let Some(value) = read_env("POLLBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("POLLBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port = parse_u16("POLLBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level = read_env("POLLBOT_LOGGING_LEVEL").or_else(|| read_env("POLLBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("POLLBOT_LOGGING_FORMAT").or_else(|| read_env("POLLBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(store_backend) = overrides.store_backend {
            self.store.backend = store_backend;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(mattermost_url) = overrides.mattermost_url {
            self.mattermost.url = mattermost_url;
        }
        if let Some(mattermost_bot_token) = overrides.mattermost_bot_token {
            self.mattermost.bot_token = secret_value(mattermost_bot_token);
        }
        if let Some(locale) = overrides.locale {
            self.polls.locale = locale;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_store(&self.store)?;
        validate_mattermost(&self.mattermost)?;
        validate_polls(&self.polls)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pollbot.toml"), PathBuf::from("config/pollbot.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    if store.vote_retry_attempts == 0 || store.vote_retry_attempts > 20 {
        return Err(ConfigError::Validation(
            "store.vote_retry_attempts must be in range 1..=20".to_string(),
        ));
    }

    if store.vote_retry_base_delay_ms > 1_000 {
        return Err(ConfigError::Validation(
            "store.vote_retry_base_delay_ms must not exceed 1000".to_string(),
        ));
    }

    Ok(())
}

fn validate_mattermost(mattermost: &MattermostConfig) -> Result<(), ConfigError> {
    if mattermost.url.trim().is_empty() {
        return Err(ConfigError::Validation(
            "mattermost.url is required (e.g. `https://chat.example.com`)".to_string(),
        ));
    }

    if mattermost.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "mattermost.bot_token is required. Create one under \
             System Console > Integrations > Bot Accounts"
                .to_string(),
        ));
    }

    if mattermost.http_timeout_secs == 0 || mattermost.http_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "mattermost.http_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if mattermost.connect_retries == 0 {
        return Err(ConfigError::Validation(
            "mattermost.connect_retries must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_polls(polls: &PollsConfig) -> Result<(), ConfigError> {
    let prefix = polls.command_prefix.trim();
    if prefix.is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "polls.command_prefix must be a single non-empty word".to_string(),
        ));
    }

    if polls.max_question_len == 0 || polls.max_option_len == 0 {
        return Err(ConfigError::Validation(
            "polls.max_question_len and polls.max_option_len must be greater than zero"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
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

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    store: Option<StorePatch>,
    mattermost: Option<MattermostPatch>,
    polls: Option<PollsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    backend: Option<StoreBackend>,
    vote_retry_attempts: Option<u32>,
    vote_retry_base_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct MattermostPatch {
    url: Option<String>,
    bot_token: Option<String>,
    http_timeout_secs: Option<u64>,
    connect_retries: Option<u32>,
    connect_retry_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PollsPatch {
    command_prefix: Option<String>,
    max_question_len: Option<usize>,
    max_option_len: Option<usize>,
    locale: Option<Locale>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
