use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use toml::Value;
use trout_core::config::{AppConfig, DEFAULT_CONFIG_FILE};

use crate::commands::{load_config, CommandResult};

struct Field {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run() -> CommandResult {
    let config = match load_config(true) {
        Ok(config) => config,
        Err(failure) => return CommandResult::from_failure("config", failure),
    };

    CommandResult::success("config", render(&config))
}

pub fn render(config: &AppConfig) -> String {
    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let field = |key, value: String, env_key| Field { key, value, env_key };
    let release = &config.release;

    vec![
        field("database.url", config.database.url.clone(), "TROUT_DATABASE_URL"),
        field(
            "database.max_connections",
            config.database.max_connections.to_string(),
            "TROUT_DATABASE_MAX_CONNECTIONS",
        ),
        field(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            "TROUT_DATABASE_TIMEOUT_SECS",
        ),
        field("slack.app_token", redact_token(&config.slack.app_token), "TROUT_SLACK_APP_TOKEN"),
        field("slack.bot_token", redact_token(&config.slack.bot_token), "TROUT_SLACK_BOT_TOKEN"),
        field("slack.api_base_url", config.slack.api_base_url.clone(), "TROUT_SLACK_API_BASE_URL"),
        field("release.password", redact_secret(&release.password), "TROUT_RELEASE_PASSWORD"),
        field(
            "release.max_password_attempts",
            release.max_password_attempts.to_string(),
            "TROUT_RELEASE_MAX_PASSWORD_ATTEMPTS",
        ),
        field(
            "release.thread_open_interval_ms",
            release.thread_open_interval_ms.to_string(),
            "TROUT_RELEASE_THREAD_OPEN_INTERVAL_MS",
        ),
        field(
            "release.post_interval_ms",
            release.post_interval_ms.to_string(),
            "TROUT_RELEASE_POST_INTERVAL_MS",
        ),
        field(
            "release.direct_message_interval_ms",
            release.direct_message_interval_ms.to_string(),
            "TROUT_RELEASE_DIRECT_MESSAGE_INTERVAL_MS",
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            "TROUT_SERVER_BIND_ADDRESS",
        ),
        field(
            "server.health_check_port",
            config.server.health_check_port.to_string(),
            "TROUT_SERVER_HEALTH_CHECK_PORT",
        ),
        field(
            "server.graceful_shutdown_secs",
            config.server.graceful_shutdown_secs.to_string(),
            "TROUT_SERVER_GRACEFUL_SHUTDOWN_SECS",
        ),
        field("logging.level", config.logging.level.clone(), "TROUT_LOGGING_LEVEL"),
        field("logging.format", config.logging.format.as_str().to_string(), "TROUT_LOGGING_FORMAT"),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
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

/// Keeps the `xoxb-`/`xapp-` prefix so the token kind stays visible.
fn redact_token(token: &SecretString) -> String {
    let trimmed = token.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

fn redact_secret(secret: &SecretString) -> String {
    if secret.expose_secret().is_empty() { "<empty>" } else { "<redacted>" }.to_string()
}
