use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pollbot_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::{CommandResult, FailureKind};

struct FieldSource<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                FailureKind::ConfigValidation,
                format!("config validation failed: {error}"),
            );
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = FieldSource { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    CommandResult::success("config", render(&config, &source))
}

fn render(config: &AppConfig, source: &FieldSource<'_>) -> String {
    let bot_token = redact_token(config.mattermost.bot_token.expose_secret());

    let fields = vec![
        field("database.url", config.database.url.clone(), &["POLLBOT_DATABASE_URL"]),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["POLLBOT_DATABASE_MAX_CONNECTIONS"],
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["POLLBOT_DATABASE_TIMEOUT_SECS"],
        ),
        field("store.backend", config.store.backend.as_str(), &["POLLBOT_STORE_BACKEND"]),
        field(
            "store.vote_retry_attempts",
            config.store.vote_retry_attempts.to_string(),
            &["POLLBOT_STORE_VOTE_RETRY_ATTEMPTS"],
        ),
        field(
            "store.vote_retry_base_delay_ms",
            config.store.vote_retry_base_delay_ms.to_string(),
            &["POLLBOT_STORE_VOTE_RETRY_BASE_DELAY_MS"],
        ),
        field(
            "mattermost.url",
            config.mattermost.http_url(),
            &["POLLBOT_MATTERMOST_URL", "MATTERMOST_URL"],
        ),
        field("mattermost.bot_token", bot_token, &["POLLBOT_MATTERMOST_BOT_TOKEN", "BOT_TOKEN"]),
        field(
            "mattermost.http_timeout_secs",
            config.mattermost.http_timeout_secs.to_string(),
            &["POLLBOT_MATTERMOST_HTTP_TIMEOUT_SECS"],
        ),
        field(
            "mattermost.connect_retries",
            config.mattermost.connect_retries.to_string(),
            &["POLLBOT_MATTERMOST_CONNECT_RETRIES"],
        ),
        field(
            "mattermost.connect_retry_delay_ms",
            config.mattermost.connect_retry_delay_ms.to_string(),
            &["POLLBOT_MATTERMOST_CONNECT_RETRY_DELAY_MS"],
        ),
        field(
            "polls.command_prefix",
            config.polls.command_prefix.clone(),
            &["POLLBOT_POLLS_COMMAND_PREFIX"],
        ),
        field(
            "polls.max_question_len",
            config.polls.max_question_len.to_string(),
            &["POLLBOT_POLLS_MAX_QUESTION_LEN"],
        ),
        field(
            "polls.max_option_len",
            config.polls.max_option_len.to_string(),
            &["POLLBOT_POLLS_MAX_OPTION_LEN"],
        ),
        field("polls.locale", config.polls.locale.as_str(), &["POLLBOT_POLLS_LOCALE"]),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["POLLBOT_SERVER_BIND_ADDRESS"],
        ),
        field(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            &["POLLBOT_SERVER_HEALTH_CHECK_PORT"],
        ),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["POLLBOT_LOGGING_LEVEL", "POLLBOT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            config.logging.format.as_str().to_string(),
            &["POLLBOT_LOGGING_FORMAT", "POLLBOT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in fields {
        lines.push(render_line(key, &value, field_source(key, env_keys, source)));
    }
    lines.join("\n")
}

type Field = (&'static str, String, &'static [&'static str]);

fn field(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Field {
    (key, value.to_string(), env_keys)
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("pollbot.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/pollbot.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(key_path: &str, env_keys: &[&str], source: &FieldSource<'_>) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = source.doc {
        if contains_path(doc, key_path) {
            let file_path = source
                .path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Mattermost tokens carry no meaningful prefix; only the last four
/// characters are kept so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() < 12 {
        return "<redacted>".to_string();
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token};

    #[test]
    fn tokens_are_redacted() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("8xq1bz7fnjfa3kgdr1k5rw9mha"), "***9mha");
    }

    #[test]
    fn nested_keys_are_found_in_toml() {
        let doc: toml::Value = "[mattermost]\nurl = \"chat.local\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "mattermost.url"));
        assert!(!contains_path(&doc, "mattermost.bot_token"));
        assert!(!contains_path(&doc, "polls.locale"));
    }
}
