use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::DEFAULT_TRIGGER_PREFIX;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chat: ChatConfig,
    pub backend: BackendConfig,
    pub queue: QueueConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ChatConfig {
    pub bot_token: SecretString,
    /// Seeds the self-message filter; the gateway overwrites it once the session is ready.
    pub bot_user_id: String,
    pub trigger_prefix: String,
    pub api_base_url: String,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub broker_url: String,
    pub topic: String,
    pub partition: u32,
    pub consumer_group: String,
    pub poll_interval_ms: u64,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
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
    pub broker_url: Option<String>,
    pub topic: Option<String>,
    pub log_level: Option<String>,
    pub bot_token: Option<String>,
    pub bot_user_id: Option<String>,
    pub trigger_prefix: Option<String>,
    pub backend_api_key: Option<String>,
    pub backend_model: Option<String>,
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
            chat: ChatConfig {
                bot_token: String::new().into(),
                bot_user_id: String::new(),
                trigger_prefix: DEFAULT_TRIGGER_PREFIX.to_string(),
                api_base_url: "https://discord.com/api/v10".to_string(),
            },
            backend: BackendConfig {
                api_key: String::new().into(),
                model: "gemini-1.5-flash".to_string(),
                base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                timeout_secs: 60,
            },
            queue: QueueConfig {
                broker_url: "sqlite://relaybot-queue.db".to_string(),
                topic: "discord_messages".to_string(),
                partition: 0,
                consumer_group: "relaybot".to_string(),
                poll_interval_ms: 250,
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("relaybot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(chat) = patch.chat {
            if let Some(bot_token_value) = chat.bot_token {
                self.chat.bot_token = secret_value(bot_token_value);
            }
            if let Some(bot_user_id) = chat.bot_user_id {
                self.chat.bot_user_id = bot_user_id;
            }
            if let Some(trigger_prefix) = chat.trigger_prefix {
                self.chat.trigger_prefix = trigger_prefix;
            }
            if let Some(api_base_url) = chat.api_base_url {
                self.chat.api_base_url = api_base_url;
            }
        }

        if let Some(backend) = patch.backend {
            if let Some(api_key_value) = backend.api_key {
                self.backend.api_key = secret_value(api_key_value);
            }
            if let Some(model) = backend.model {
                self.backend.model = model;
            }
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(queue) = patch.queue {
            if let Some(broker_url) = queue.broker_url {
                self.queue.broker_url = broker_url;
            }
            if let Some(topic) = queue.topic {
                self.queue.topic = topic;
            }
            if let Some(partition) = queue.partition {
                self.queue.partition = partition;
            }
            if let Some(consumer_group) = queue.consumer_group {
                self.queue.consumer_group = consumer_group;
            }
            if let Some(poll_interval_ms) = queue.poll_interval_ms {
                self.queue.poll_interval_ms = poll_interval_ms;
            }
            if let Some(max_connections) = queue.max_connections {
                self.queue.max_connections = max_connections;
            }
            if let Some(timeout_secs) = queue.timeout_secs {
                self.queue.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
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
        if let Some(value) = read_env("RELAYBOT_CHAT_BOT_TOKEN").or_else(|| read_env("DISCORD_TOKEN"))
        {
            self.chat.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("RELAYBOT_CHAT_BOT_USER_ID") {
            self.chat.bot_user_id = value;
        }
        if let Some(value) = read_env("RELAYBOT_CHAT_TRIGGER_PREFIX") {
            self.chat.trigger_prefix = value;
        }
        if let Some(value) = read_env("RELAYBOT_CHAT_API_BASE_URL") {
            self.chat.api_base_url = value;
        }

        if let Some(value) =
            read_env("RELAYBOT_BACKEND_API_KEY").or_else(|| read_env("GEMINI_API_KEY"))
        {
            self.backend.api_key = secret_value(value);
        }
        if let Some(value) = read_env("RELAYBOT_BACKEND_MODEL") {
            self.backend.model = value;
        }
        if let Some(value) = read_env("RELAYBOT_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("RELAYBOT_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("RELAYBOT_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) =
            read_env("RELAYBOT_QUEUE_BROKER_URL").or_else(|| read_env("KAFKA_BROKER_ADDRESS"))
        {
            self.queue.broker_url = value;
        }
        if let Some(value) = read_env("RELAYBOT_QUEUE_TOPIC") {
            self.queue.topic = value;
        }
        if let Some(value) = read_env("RELAYBOT_QUEUE_PARTITION") {
            self.queue.partition = parse_u32("RELAYBOT_QUEUE_PARTITION", &value)?;
        }
        if let Some(value) = read_env("RELAYBOT_QUEUE_CONSUMER_GROUP") {
            self.queue.consumer_group = value;
        }
        if let Some(value) = read_env("RELAYBOT_QUEUE_POLL_INTERVAL_MS") {
            self.queue.poll_interval_ms = parse_u64("RELAYBOT_QUEUE_POLL_INTERVAL_MS", &value)?;
        }
        if let Some(value) = read_env("RELAYBOT_QUEUE_MAX_CONNECTIONS") {
            self.queue.max_connections = parse_u32("RELAYBOT_QUEUE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("RELAYBOT_QUEUE_TIMEOUT_SECS") {
            self.queue.timeout_secs = parse_u64("RELAYBOT_QUEUE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("RELAYBOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("RELAYBOT_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("RELAYBOT_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("RELAYBOT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("RELAYBOT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("RELAYBOT_LOGGING_LEVEL").or_else(|| read_env("RELAYBOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("RELAYBOT_LOGGING_FORMAT").or_else(|| read_env("RELAYBOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(broker_url) = overrides.broker_url {
            self.queue.broker_url = broker_url;
        }
        if let Some(topic) = overrides.topic {
            self.queue.topic = topic;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.chat.bot_token = secret_value(bot_token);
        }
        if let Some(bot_user_id) = overrides.bot_user_id {
            self.chat.bot_user_id = bot_user_id;
        }
        if let Some(trigger_prefix) = overrides.trigger_prefix {
            self.chat.trigger_prefix = trigger_prefix;
        }
        if let Some(api_key) = overrides.backend_api_key {
            self.backend.api_key = secret_value(api_key);
        }
        if let Some(model) = overrides.backend_model {
            self.backend.model = model;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_chat(&self.chat)?;
        validate_backend(&self.backend)?;
        validate_queue(&self.queue)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("relaybot.toml"), PathBuf::from("config/relaybot.toml")]
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

fn validate_chat(chat: &ChatConfig) -> Result<(), ConfigError> {
    if chat.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "chat.bot_token is required (set RELAYBOT_CHAT_BOT_TOKEN or DISCORD_TOKEN)".to_string(),
        ));
    }

    if chat.trigger_prefix.is_empty() {
        return Err(ConfigError::Validation("chat.trigger_prefix must not be empty".to_string()));
    }

    if !is_http_url(&chat.api_base_url) {
        return Err(ConfigError::Validation(
            "chat.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    if backend.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "backend.api_key is required (set RELAYBOT_BACKEND_API_KEY or GEMINI_API_KEY)"
                .to_string(),
        ));
    }

    if backend.model.trim().is_empty() {
        return Err(ConfigError::Validation("backend.model must not be empty".to_string()));
    }

    if !is_http_url(&backend.base_url) {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_queue(queue: &QueueConfig) -> Result<(), ConfigError> {
    let url = queue.broker_url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "queue.broker_url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if queue.topic.trim().is_empty() {
        return Err(ConfigError::Validation("queue.topic must not be empty".to_string()));
    }

    if queue.consumer_group.trim().is_empty() {
        return Err(ConfigError::Validation("queue.consumer_group must not be empty".to_string()));
    }

    if queue.poll_interval_ms == 0 || queue.poll_interval_ms > 60_000 {
        return Err(ConfigError::Validation(
            "queue.poll_interval_ms must be in range 1..=60000".to_string(),
        ));
    }

    if queue.max_connections == 0 {
        return Err(ConfigError::Validation(
            "queue.max_connections must be greater than zero".to_string(),
        ));
    }

    if queue.timeout_secs == 0 || queue.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "queue.timeout_secs must be in range 1..=300".to_string(),
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

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
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

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
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

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    chat: Option<ChatPatch>,
    backend: Option<BackendPatch>,
    queue: Option<QueuePatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatPatch {
    bot_token: Option<String>,
    bot_user_id: Option<String>,
    trigger_prefix: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct QueuePatch {
    broker_url: Option<String>,
    topic: Option<String>,
    partition: Option<u32>,
    consumer_group: Option<String>,
    poll_interval_ms: Option<u64>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const REQUIRED_VARS: &[&str] = &[
        "RELAYBOT_CHAT_BOT_TOKEN",
        "RELAYBOT_CHAT_BOT_USER_ID",
        "RELAYBOT_BACKEND_API_KEY",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_required_vars() {
        env::set_var("RELAYBOT_CHAT_BOT_TOKEN", "bot-token-test");
        env::set_var("RELAYBOT_CHAT_BOT_USER_ID", "U-BOT");
        env::set_var("RELAYBOT_BACKEND_API_KEY", "gemini-key-test");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_RELAYBOT_TOKEN", "bot-from-env");
        env::set_var("TEST_RELAYBOT_KEY", "key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("relaybot.toml");
            fs::write(
                &path,
                r#"
[chat]
bot_token = "${TEST_RELAYBOT_TOKEN}"
bot_user_id = "U-BOT"

[backend]
api_key = "${TEST_RELAYBOT_KEY}"

[queue]
topic = "replies"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.chat.bot_token.expose_secret() == "bot-from-env",
                "bot token should be interpolated from environment",
            )?;
            ensure(
                config.backend.api_key.expose_secret() == "key-from-env",
                "api key should be interpolated from environment",
            )?;
            ensure(config.queue.topic == "replies", "topic should come from the file")?;
            ensure(config.chat.trigger_prefix == "/B ", "trigger prefix should default")?;
            Ok(())
        })();

        clear_vars(&["TEST_RELAYBOT_TOKEN", "TEST_RELAYBOT_KEY"]);
        result
    }

    #[test]
    fn legacy_env_names_fill_credentials_and_broker() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("DISCORD_TOKEN", "legacy-bot-token");
        env::set_var("GEMINI_API_KEY", "legacy-gemini-key");
        env::set_var("KAFKA_BROKER_ADDRESS", "sqlite://legacy-queue.db");
        env::set_var("RELAYBOT_CHAT_BOT_USER_ID", "U-BOT");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.chat.bot_token.expose_secret() == "legacy-bot-token",
                "DISCORD_TOKEN should populate the bot token",
            )?;
            ensure(
                config.backend.api_key.expose_secret() == "legacy-gemini-key",
                "GEMINI_API_KEY should populate the backend key",
            )?;
            ensure(
                config.queue.broker_url == "sqlite://legacy-queue.db",
                "KAFKA_BROKER_ADDRESS should populate the broker url",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "DISCORD_TOKEN",
            "GEMINI_API_KEY",
            "KAFKA_BROKER_ADDRESS",
            "RELAYBOT_CHAT_BOT_USER_ID",
        ]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("RELAYBOT_LOG_LEVEL", "warn");
        env::set_var("RELAYBOT_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["RELAYBOT_LOG_LEVEL", "RELAYBOT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("RELAYBOT_QUEUE_BROKER_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("relaybot.toml");
            fs::write(
                &path,
                r#"
[queue]
broker_url = "sqlite://from-file.db"
topic = "from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    topic: Some("from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.queue.broker_url == "sqlite://from-env.db",
                "env broker url should win over the file",
            )?;
            ensure(config.queue.topic == "from-override", "override topic should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["RELAYBOT_QUEUE_BROKER_URL"]);
        result
    }

    #[test]
    fn bot_user_id_may_be_left_to_the_gateway() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAYBOT_CHAT_BOT_TOKEN", "bot-token-test");
        env::set_var("RELAYBOT_BACKEND_API_KEY", "gemini-key-test");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.chat.bot_user_id.is_empty(), "bot user id should default to empty")
        })();

        clear_vars(REQUIRED_VARS);
        result
    }

    #[test]
    fn non_sqlite_broker_url_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("RELAYBOT_QUEUE_BROKER_URL", "localhost:9092");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected broker url validation failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::Validation(ref message) if message.contains("queue.broker_url")
                ),
                "validation failure should mention queue.broker_url",
            )
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["RELAYBOT_QUEUE_BROKER_URL"]);
        result
    }

    #[test]
    fn invalid_numeric_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_required_vars();
        env::set_var("RELAYBOT_QUEUE_PARTITION", "first");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid override failure".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. } if key == "RELAYBOT_QUEUE_PARTITION"
                ),
                "invalid partition should be reported with its key",
            )
        })();

        clear_vars(REQUIRED_VARS);
        clear_vars(&["RELAYBOT_QUEUE_PARTITION"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("RELAYBOT_CHAT_BOT_TOKEN", "bot-secret-value");
        env::set_var("RELAYBOT_CHAT_BOT_USER_ID", "U-BOT");
        env::set_var("RELAYBOT_BACKEND_API_KEY", "gemini-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("bot-secret-value"), "debug output should not contain bot token")?;
            ensure(
                !debug.contains("gemini-secret-value"),
                "debug output should not contain backend api key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(REQUIRED_VARS);
        result
    }
}
