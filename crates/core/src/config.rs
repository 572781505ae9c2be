use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::catalog::{DeliveryTerms, PlatformId};
use crate::domain::preference::{DeliveryPriority, PreferencePolicy};
use crate::orchestrator::RetrySettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub platforms: PlatformsConfig,
    pub aggregator: AggregatorConfig,
    pub orders: OrdersConfig,
    pub preferences: PreferencePolicy,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct PlatformsConfig {
    pub driver: PlatformDriver,
    pub enabled: Vec<PlatformId>,
    pub user_agent: String,
    pub endpoints: BTreeMap<PlatformId, PlatformEndpoint>,
}

#[derive(Clone, Debug)]
pub struct PlatformEndpoint {
    pub base_url: String,
    pub delivery_fee: Decimal,
    pub eta_minutes: u32,
    pub api_token: Option<SecretString>,
}

impl PlatformEndpoint {
    pub fn delivery_terms(&self) -> DeliveryTerms {
        DeliveryTerms { fee: self.delivery_fee, eta_minutes: self.eta_minutes }
    }
}

#[derive(Clone, Debug)]
pub struct AggregatorConfig {
    pub search_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct OrdersConfig {
    pub max_placement_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
    pub retry_max_delay_ms: u64,
    /// Delivered, failed and rejected orders kept for status lookups.
    pub max_retained_terminal: usize,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlatformDriver {
    Http,
    Simulated,
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
    pub platform_driver: Option<PlatformDriver>,
    pub enabled_platforms: Option<Vec<PlatformId>>,
    pub search_timeout_ms: Option<u64>,
    pub server_port: Option<u16>,
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

const KNOWN_PLATFORMS: [(&str, &str, i64, u32); 4] = [
    ("zepto", "https://www.zepto.com", 0, 10),
    ("blinkit", "https://blinkit.com", 0, 10),
    ("instamart", "https://www.swiggy.com/instamart", 20, 30),
    ("bigbasket", "https://www.bigbasket.com", 20, 30),
];

impl Default for AppConfig {
    fn default() -> Self {
        let endpoints = KNOWN_PLATFORMS
            .iter()
            .map(|(id, base_url, fee, eta)| {
                (
                    PlatformId::new(*id),
                    PlatformEndpoint {
                        base_url: (*base_url).to_string(),
                        delivery_fee: Decimal::from(*fee),
                        eta_minutes: *eta,
                        api_token: None,
                    },
                )
            })
            .collect();

        Self {
            platforms: PlatformsConfig {
                driver: PlatformDriver::Http,
                enabled: KNOWN_PLATFORMS.iter().map(|(id, ..)| PlatformId::new(*id)).collect(),
                user_agent: format!("quickpick/{}", env!("CARGO_PKG_VERSION")),
                endpoints,
            },
            aggregator: AggregatorConfig { search_timeout_ms: 4_000 },
            orders: OrdersConfig {
                max_placement_attempts: 3,
                retry_base_delay_ms: 200,
                retry_backoff_multiplier: 2,
                retry_max_delay_ms: 2_000,
                max_retained_terminal: 100,
            },
            preferences: PreferencePolicy::default(),
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for PlatformDriver {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "simulated" => Ok(Self::Simulated),
            other => Err(ConfigError::Validation(format!(
                "unsupported platform driver `{other}` (expected http|simulated)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("quickpick.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.aggregator.search_timeout_ms)
    }

    pub fn retry_settings(&self) -> RetrySettings {
        RetrySettings {
            max_attempts: self.orders.max_placement_attempts,
            base_delay: Duration::from_millis(self.orders.retry_base_delay_ms),
            backoff_multiplier: self.orders.retry_backoff_multiplier,
            max_delay: Duration::from_millis(self.orders.retry_max_delay_ms),
        }
    }

    /// Enabled platforms with their endpoint settings, in configuration order.
    pub fn enabled_endpoints(&self) -> Vec<(&PlatformId, &PlatformEndpoint)> {
        self.platforms
            .enabled
            .iter()
            .filter_map(|id| self.platforms.endpoints.get(id).map(|endpoint| (id, endpoint)))
            .collect()
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(platforms) = patch.platforms {
            if let Some(driver) = platforms.driver {
                self.platforms.driver = driver;
            }
            if let Some(enabled) = platforms.enabled {
                self.platforms.enabled = enabled.into_iter().map(PlatformId::new).collect();
            }
            if let Some(user_agent) = platforms.user_agent {
                self.platforms.user_agent = user_agent;
            }
            for (id, endpoint_patch) in platforms.endpoints {
                let endpoint = self
                    .platforms
                    .endpoints
                    .entry(PlatformId::new(id))
                    .or_insert_with(|| PlatformEndpoint {
                        base_url: String::new(),
                        delivery_fee: Decimal::ZERO,
                        eta_minutes: 30,
                        api_token: None,
                    });
                if let Some(base_url) = endpoint_patch.base_url {
                    endpoint.base_url = base_url;
                }
                if let Some(delivery_fee) = endpoint_patch.delivery_fee {
                    endpoint.delivery_fee = delivery_fee;
                }
                if let Some(eta_minutes) = endpoint_patch.eta_minutes {
                    endpoint.eta_minutes = eta_minutes;
                }
                if let Some(api_token_value) = endpoint_patch.api_token {
                    endpoint.api_token = Some(secret_value(api_token_value));
                }
            }
        }

        if let Some(aggregator) = patch.aggregator {
            if let Some(search_timeout_ms) = aggregator.search_timeout_ms {
                self.aggregator.search_timeout_ms = search_timeout_ms;
            }
        }

        if let Some(orders) = patch.orders {
            if let Some(max_placement_attempts) = orders.max_placement_attempts {
                self.orders.max_placement_attempts = max_placement_attempts;
            }
            if let Some(retry_base_delay_ms) = orders.retry_base_delay_ms {
                self.orders.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(retry_backoff_multiplier) = orders.retry_backoff_multiplier {
                self.orders.retry_backoff_multiplier = retry_backoff_multiplier;
            }
            if let Some(retry_max_delay_ms) = orders.retry_max_delay_ms {
                self.orders.retry_max_delay_ms = retry_max_delay_ms;
            }
            if let Some(max_retained_terminal) = orders.max_retained_terminal {
                self.orders.max_retained_terminal = max_retained_terminal;
            }
        }

        if let Some(preferences) = patch.preferences {
            if let Some(delivery_priority) = preferences.delivery_priority {
                self.preferences.delivery_priority = delivery_priority;
            }
            if let Some(max_delivery_time_minutes) = preferences.max_delivery_time_minutes {
                self.preferences.max_delivery_time_minutes = max_delivery_time_minutes;
            }
            if let Some(preferred_platforms) = preferences.preferred_platforms {
                self.preferences.preferred_platforms =
                    preferred_platforms.into_iter().map(PlatformId::new).collect();
            }
            if let Some(threshold) = preferences.auto_approve_savings_threshold {
                self.preferences.auto_approve_savings_threshold = threshold;
            }
            if let Some(quality_threshold) = preferences.quality_threshold {
                self.preferences.quality_threshold = quality_threshold;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
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
        if let Some(value) = read_env("QUICKPICK_PLATFORMS_DRIVER") {
            self.platforms.driver = value.parse()?;
        }
        if let Some(value) = read_env("QUICKPICK_PLATFORMS_ENABLED") {
            self.platforms.enabled = parse_platform_list(&value);
        }
        if let Some(value) = read_env("QUICKPICK_PLATFORMS_USER_AGENT") {
            self.platforms.user_agent = value;
        }
        for (id, endpoint) in self.platforms.endpoints.iter_mut() {
            let prefix = format!("QUICKPICK_PLATFORM_{}", id.as_str().to_ascii_uppercase());
            if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
                endpoint.base_url = value;
            }
            if let Some(value) = read_env(&format!("{prefix}_API_TOKEN")) {
                endpoint.api_token = Some(secret_value(value));
            }
            let fee_key = format!("{prefix}_DELIVERY_FEE");
            if let Some(value) = read_env(&fee_key) {
                endpoint.delivery_fee = parse_decimal(&fee_key, &value)?;
            }
            let eta_key = format!("{prefix}_ETA_MINUTES");
            if let Some(value) = read_env(&eta_key) {
                endpoint.eta_minutes = parse_u32(&eta_key, &value)?;
            }
        }

        if let Some(value) = read_env("QUICKPICK_AGGREGATOR_SEARCH_TIMEOUT_MS") {
            self.aggregator.search_timeout_ms =
                parse_u64("QUICKPICK_AGGREGATOR_SEARCH_TIMEOUT_MS", &value)?;
        }

        if let Some(value) = read_env("QUICKPICK_ORDERS_MAX_PLACEMENT_ATTEMPTS") {
            self.orders.max_placement_attempts =
                parse_u32("QUICKPICK_ORDERS_MAX_PLACEMENT_ATTEMPTS", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_ORDERS_RETRY_BASE_DELAY_MS") {
            self.orders.retry_base_delay_ms =
                parse_u64("QUICKPICK_ORDERS_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_ORDERS_RETRY_BACKOFF_MULTIPLIER") {
            self.orders.retry_backoff_multiplier =
                parse_u32("QUICKPICK_ORDERS_RETRY_BACKOFF_MULTIPLIER", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_ORDERS_RETRY_MAX_DELAY_MS") {
            self.orders.retry_max_delay_ms =
                parse_u64("QUICKPICK_ORDERS_RETRY_MAX_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_ORDERS_MAX_RETAINED_TERMINAL") {
            self.orders.max_retained_terminal =
                parse_usize("QUICKPICK_ORDERS_MAX_RETAINED_TERMINAL", &value)?;
        }

        if let Some(value) = read_env("QUICKPICK_PREFERENCES_DELIVERY_PRIORITY") {
            self.preferences.delivery_priority = DeliveryPriority::from_str(&value).map_err(|_| {
                ConfigError::InvalidEnvOverride {
                    key: "QUICKPICK_PREFERENCES_DELIVERY_PRIORITY".to_string(),
                    value: value.clone(),
                }
            })?;
        }
        if let Some(value) = read_env("QUICKPICK_PREFERENCES_MAX_DELIVERY_TIME_MINUTES") {
            self.preferences.max_delivery_time_minutes =
                parse_u32("QUICKPICK_PREFERENCES_MAX_DELIVERY_TIME_MINUTES", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_PREFERENCES_PREFERRED_PLATFORMS") {
            self.preferences.preferred_platforms = parse_platform_list(&value);
        }
        if let Some(value) = read_env("QUICKPICK_PREFERENCES_AUTO_APPROVE_SAVINGS_THRESHOLD") {
            self.preferences.auto_approve_savings_threshold =
                parse_decimal("QUICKPICK_PREFERENCES_AUTO_APPROVE_SAVINGS_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_PREFERENCES_QUALITY_THRESHOLD") {
            self.preferences.quality_threshold =
                parse_decimal("QUICKPICK_PREFERENCES_QUALITY_THRESHOLD", &value)?;
        }

        if let Some(value) = read_env("QUICKPICK_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("QUICKPICK_SERVER_PORT") {
            self.server.port = parse_u16("QUICKPICK_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("QUICKPICK_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("QUICKPICK_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level =
            read_env("QUICKPICK_LOGGING_LEVEL").or_else(|| read_env("QUICKPICK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("QUICKPICK_LOGGING_FORMAT").or_else(|| read_env("QUICKPICK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(driver) = overrides.platform_driver {
            self.platforms.driver = driver;
        }
        if let Some(enabled) = overrides.enabled_platforms {
            self.platforms.enabled = enabled;
        }
        if let Some(search_timeout_ms) = overrides.search_timeout_ms {
            self.aggregator.search_timeout_ms = search_timeout_ms;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_platforms(&self.platforms)?;
        validate_aggregator(&self.aggregator)?;
        validate_orders(&self.orders)?;
        self.preferences
            .validate()
            .map_err(|error| ConfigError::Validation(format!("preferences: {error}")))?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("quickpick.toml"), PathBuf::from("config/quickpick.toml")]
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

fn validate_platforms(platforms: &PlatformsConfig) -> Result<(), ConfigError> {
    if platforms.enabled.is_empty() {
        return Err(ConfigError::Validation(
            "platforms.enabled must list at least one platform".to_string(),
        ));
    }

    let mut seen = Vec::with_capacity(platforms.enabled.len());
    for id in &platforms.enabled {
        if seen.contains(&id) {
            return Err(ConfigError::Validation(format!(
                "platforms.enabled lists `{id}` more than once"
            )));
        }
        seen.push(id);

        let Some(endpoint) = platforms.endpoints.get(id) else {
            return Err(ConfigError::Validation(format!(
                "platforms.enabled lists `{id}` but no [platforms.endpoints.{id}] section exists"
            )));
        };

        let base_url = endpoint.base_url.trim();
        if platforms.driver == PlatformDriver::Http
            && !base_url.starts_with("http://")
            && !base_url.starts_with("https://")
        {
            return Err(ConfigError::Validation(format!(
                "platforms.endpoints.{id}.base_url must start with http:// or https://"
            )));
        }
        if endpoint.delivery_fee.is_sign_negative() {
            return Err(ConfigError::Validation(format!(
                "platforms.endpoints.{id}.delivery_fee must not be negative"
            )));
        }
        if endpoint.eta_minutes == 0 {
            return Err(ConfigError::Validation(format!(
                "platforms.endpoints.{id}.eta_minutes must be greater than zero"
            )));
        }
    }

    Ok(())
}

fn validate_aggregator(aggregator: &AggregatorConfig) -> Result<(), ConfigError> {
    if aggregator.search_timeout_ms == 0 || aggregator.search_timeout_ms > 60_000 {
        return Err(ConfigError::Validation(
            "aggregator.search_timeout_ms must be in range 1..=60000".to_string(),
        ));
    }
    Ok(())
}

fn validate_orders(orders: &OrdersConfig) -> Result<(), ConfigError> {
    if orders.max_placement_attempts == 0 || orders.max_placement_attempts > 10 {
        return Err(ConfigError::Validation(
            "orders.max_placement_attempts must be in range 1..=10".to_string(),
        ));
    }
    if orders.retry_backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "orders.retry_backoff_multiplier must be greater than zero".to_string(),
        ));
    }
    if orders.retry_base_delay_ms > orders.retry_max_delay_ms {
        return Err(ConfigError::Validation(
            "orders.retry_base_delay_ms must not exceed orders.retry_max_delay_ms".to_string(),
        ));
    }
    if orders.max_retained_terminal == 0 {
        return Err(ConfigError::Validation(
            "orders.max_retained_terminal must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_platform_list(value: &str) -> Vec<PlatformId> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| PlatformId::new(id.to_ascii_lowercase()))
        .collect()
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

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    platforms: Option<PlatformsPatch>,
    aggregator: Option<AggregatorPatch>,
    orders: Option<OrdersPatch>,
    preferences: Option<PreferencesPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct PlatformsPatch {
    driver: Option<PlatformDriver>,
    enabled: Option<Vec<String>>,
    user_agent: Option<String>,
    #[serde(default)]
    endpoints: BTreeMap<String, EndpointPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct EndpointPatch {
    base_url: Option<String>,
    delivery_fee: Option<Decimal>,
    eta_minutes: Option<u32>,
    api_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AggregatorPatch {
    search_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct OrdersPatch {
    max_placement_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_backoff_multiplier: Option<u32>,
    retry_max_delay_ms: Option<u64>,
    max_retained_terminal: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct PreferencesPatch {
    delivery_priority: Option<DeliveryPriority>,
    max_delivery_time_minutes: Option<u32>,
    preferred_platforms: Option<Vec<String>>,
    auto_approve_savings_threshold: Option<Decimal>,
    quality_threshold: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
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
    use std::time::Duration;

    use rust_decimal::Decimal;
    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use crate::domain::catalog::PlatformId;
    use crate::domain::preference::DeliveryPriority;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, PlatformDriver};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_cover_four_platforms_and_policy() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        let enabled: Vec<_> = config.platforms.enabled.iter().map(PlatformId::as_str).collect();
        ensure(
            enabled == ["zepto", "blinkit", "instamart", "bigbasket"],
            "default platforms should be listed in configuration order",
        )?;
        ensure(config.search_timeout() == Duration::from_millis(4_000), "default timeout 4s")?;
        ensure(config.retry_settings().max_attempts == 3, "three placement attempts by default")?;
        ensure(config.orders.max_retained_terminal == 100, "keep 100 finished orders")?;
        ensure(
            config.preferences.delivery_priority == DeliveryPriority::Fastest,
            "fastest is the default priority",
        )?;
        ensure(
            config.preferences.auto_approve_savings_threshold == Decimal::from(50),
            "default auto-approve threshold is 50",
        )?;
        ensure(config.enabled_endpoints().len() == 4, "every enabled platform has an endpoint")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_ZEPTO_TOKEN", "zepto-token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("quickpick.toml");
            fs::write(
                &path,
                r#"
[platforms.endpoints.zepto]
api_token = "${TEST_ZEPTO_TOKEN}"
delivery_fee = 15
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let zepto = config
                .platforms
                .endpoints
                .get(&PlatformId::new("zepto"))
                .ok_or_else(|| "zepto endpoint missing".to_string())?;
            ensure(
                zepto.api_token.as_ref().map(|token| token.expose_secret())
                    == Some("zepto-token-from-env"),
                "api token should be loaded from environment",
            )?;
            ensure(zepto.delivery_fee == Decimal::from(15), "file should set delivery fee")?;
            ensure(
                zepto.base_url == "https://www.zepto.com",
                "unpatched fields keep their defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_ZEPTO_TOKEN"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUICKPICK_LOG_LEVEL", "warn");
        env::set_var("QUICKPICK_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["QUICKPICK_LOG_LEVEL", "QUICKPICK_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUICKPICK_AGGREGATOR_SEARCH_TIMEOUT_MS", "2500");
        env::set_var("QUICKPICK_PLATFORMS_ENABLED", "blinkit, zepto");
        env::set_var("QUICKPICK_PREFERENCES_DELIVERY_PRIORITY", "cheapest");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("quickpick.toml");
            fs::write(
                &path,
                r#"
[platforms]
driver = "simulated"
enabled = ["zepto"]

[aggregator]
search_timeout_ms = 1500

[orders]
max_placement_attempts = 5
max_retained_terminal = 20

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    server_port: Some(9191),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.platforms.driver == PlatformDriver::Simulated, "file sets driver")?;
            ensure(config.orders.max_placement_attempts == 5, "file sets attempts")?;
            ensure(config.orders.max_retained_terminal == 20, "file sets order retention")?;
            ensure(config.aggregator.search_timeout_ms == 2_500, "env timeout should win")?;
            ensure(
                config.platforms.enabled
                    == vec![PlatformId::new("blinkit"), PlatformId::new("zepto")],
                "env platform list should win over file",
            )?;
            ensure(
                config.preferences.delivery_priority == DeliveryPriority::Cheapest,
                "env priority should apply",
            )?;
            ensure(config.server.port == 9191, "override port should win")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&[
            "QUICKPICK_AGGREGATOR_SEARCH_TIMEOUT_MS",
            "QUICKPICK_PLATFORMS_ENABLED",
            "QUICKPICK_PREFERENCES_DELIVERY_PRIORITY",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUICKPICK_PLATFORMS_ENABLED", "zepto,dunzo");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("dunzo")
            );
            ensure(has_message, "validation failure should name the unknown platform")
        })();

        clear_vars(&["QUICKPICK_PLATFORMS_ENABLED"]);
        result
    }

    #[test]
    fn zero_order_retention_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUICKPICK_ORDERS_MAX_RETAINED_TERMINAL", "0");
        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::Validation(message)) => ensure(
                message.contains("orders.max_retained_terminal"),
                "validation failure should name the retention key",
            ),
            _ => Err("expected zero retention to fail validation".to_string()),
        };

        clear_vars(&["QUICKPICK_ORDERS_MAX_RETAINED_TERMINAL"]);
        result
    }

    #[test]
    fn invalid_env_numbers_are_reported_with_their_key() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUICKPICK_PLATFORM_ZEPTO_DELIVERY_FEE", "free");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected invalid override".to_string()),
                Err(error) => error,
            };
            ensure(
                matches!(
                    error,
                    ConfigError::InvalidEnvOverride { ref key, .. }
                        if key == "QUICKPICK_PLATFORM_ZEPTO_DELIVERY_FEE"
                ),
                "error should name the offending variable",
            )
        })();

        clear_vars(&["QUICKPICK_PLATFORM_ZEPTO_DELIVERY_FEE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("QUICKPICK_PLATFORM_BLINKIT_API_TOKEN", "blinkit-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("blinkit-secret-value"),
                "debug output should not contain api token",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["QUICKPICK_PLATFORM_BLINKIT_API_TOKEN"]);
        result
    }
}
