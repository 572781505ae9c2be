use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use quickpick_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    render(LoadOptions::default())
}

/// Effective configuration, one `key = value (source: ..)` line per setting.
pub fn render(options: LoadOptions) -> String {
    let config_file_path = options.config_path.clone().or_else(detect_config_path);
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };
    let sources = Sources {
        doc: load_config_file_doc(config_file_path.as_deref()),
        path: config_file_path,
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    let mut push = |key: &str, value: &str, env_keys: &[&str]| {
        lines.push(render_line(key, value, sources.field_source(key, env_keys)));
    };

    push(
        "platforms.driver",
        &format!("{:?}", config.platforms.driver).to_lowercase(),
        &["QUICKPICK_PLATFORMS_DRIVER"],
    );
    let enabled: Vec<&str> = config.platforms.enabled.iter().map(|id| id.as_str()).collect();
    push("platforms.enabled", &enabled.join(","), &["QUICKPICK_PLATFORMS_ENABLED"]);
    push(
        "platforms.user_agent",
        &config.platforms.user_agent,
        &["QUICKPICK_PLATFORMS_USER_AGENT"],
    );

    for (id, endpoint) in config.enabled_endpoints() {
        let prefix = id.as_str().to_ascii_uppercase();
        let key = |field: &str| format!("platforms.endpoints.{id}.{field}");
        let env_key = |field: &str| format!("QUICKPICK_PLATFORM_{prefix}_{field}");
        push(&key("base_url"), &endpoint.base_url, &[env_key("BASE_URL").as_str()]);
        push(
            &key("delivery_fee"),
            &endpoint.delivery_fee.to_string(),
            &[env_key("DELIVERY_FEE").as_str()],
        );
        push(
            &key("eta_minutes"),
            &endpoint.eta_minutes.to_string(),
            &[env_key("ETA_MINUTES").as_str()],
        );
        let token = endpoint
            .api_token
            .as_ref()
            .map(|token| redact_token(token.expose_secret()))
            .unwrap_or_else(|| "<unset>".to_string());
        push(&key("api_token"), &token, &[env_key("API_TOKEN").as_str()]);
    }

    push(
        "aggregator.search_timeout_ms",
        &config.aggregator.search_timeout_ms.to_string(),
        &["QUICKPICK_AGGREGATOR_SEARCH_TIMEOUT_MS"],
    );

    push(
        "orders.max_placement_attempts",
        &config.orders.max_placement_attempts.to_string(),
        &["QUICKPICK_ORDERS_MAX_PLACEMENT_ATTEMPTS"],
    );
    push(
        "orders.retry_base_delay_ms",
        &config.orders.retry_base_delay_ms.to_string(),
        &["QUICKPICK_ORDERS_RETRY_BASE_DELAY_MS"],
    );
    push(
        "orders.retry_backoff_multiplier",
        &config.orders.retry_backoff_multiplier.to_string(),
        &["QUICKPICK_ORDERS_RETRY_BACKOFF_MULTIPLIER"],
    );
    push(
        "orders.retry_max_delay_ms",
        &config.orders.retry_max_delay_ms.to_string(),
        &["QUICKPICK_ORDERS_RETRY_MAX_DELAY_MS"],
    );
    push(
        "orders.max_retained_terminal",
        &config.orders.max_retained_terminal.to_string(),
        &["QUICKPICK_ORDERS_MAX_RETAINED_TERMINAL"],
    );

    let preferences = &config.preferences;
    push(
        "preferences.delivery_priority",
        preferences.delivery_priority.as_str(),
        &["QUICKPICK_PREFERENCES_DELIVERY_PRIORITY"],
    );
    push(
        "preferences.max_delivery_time_minutes",
        &preferences.max_delivery_time_minutes.to_string(),
        &["QUICKPICK_PREFERENCES_MAX_DELIVERY_TIME_MINUTES"],
    );
    let preferred: Vec<&str> =
        preferences.preferred_platforms.iter().map(|id| id.as_str()).collect();
    push(
        "preferences.preferred_platforms",
        &preferred.join(","),
        &["QUICKPICK_PREFERENCES_PREFERRED_PLATFORMS"],
    );
    push(
        "preferences.auto_approve_savings_threshold",
        &preferences.auto_approve_savings_threshold.to_string(),
        &["QUICKPICK_PREFERENCES_AUTO_APPROVE_SAVINGS_THRESHOLD"],
    );
    push(
        "preferences.quality_threshold",
        &preferences.quality_threshold.to_string(),
        &["QUICKPICK_PREFERENCES_QUALITY_THRESHOLD"],
    );

    push("server.bind_address", &config.server.bind_address, &["QUICKPICK_SERVER_BIND_ADDRESS"]);
    push("server.port", &config.server.port.to_string(), &["QUICKPICK_SERVER_PORT"]);
    push(
        "server.graceful_shutdown_secs",
        &config.server.graceful_shutdown_secs.to_string(),
        &["QUICKPICK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
    );

    push(
        "logging.level",
        &config.logging.level,
        &["QUICKPICK_LOGGING_LEVEL", "QUICKPICK_LOG_LEVEL"],
    );
    push(
        "logging.format",
        &format!("{:?}", config.logging.format).to_lowercase(),
        &["QUICKPICK_LOGGING_FORMAT", "QUICKPICK_LOG_FORMAT"],
    );

    lines.join("\n")
}

struct Sources {
    doc: Option<Value>,
    path: Option<PathBuf>,
}

impl Sources {
    fn field_source(&self, key_path: &str, env_keys: &[&str]) -> String {
        if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if let Some(doc) = &self.doc {
            if contains_path(doc, key_path) {
                let file_path = self
                    .path
                    .as_ref()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| "config file".to_string());
                return format!("file ({file_path})");
            }
        }

        "default".to_string()
    }
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("quickpick.toml"), PathBuf::from("config/quickpick.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
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

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let visible: String = trimmed.chars().take(4).collect();
    if trimmed.chars().count() > 8 {
        return format!("{visible}***");
    }

    "<redacted>".to_string()
}
