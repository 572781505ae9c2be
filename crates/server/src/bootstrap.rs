use std::sync::Arc;

use axum::Router;
use quickpick_core::aggregator::CatalogAggregator;
use quickpick_core::audit::TracingAuditSink;
use quickpick_core::config::{AppConfig, ConfigError, LoadOptions};
use quickpick_core::errors::ApplicationError;
use quickpick_core::orchestrator::OrderOrchestrator;
use quickpick_platforms::build_registry;
use thiserror::Error;
use tracing::info;

use crate::{health, routes};

pub struct Application {
    pub config: AppConfig,
    pub orchestrator: Arc<OrderOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("platform setup failed: {0}")]
    Platforms(#[source] ApplicationError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let registry = build_registry(&config).map_err(BootstrapError::Platforms)?;
    info!(
        event_name = "system.bootstrap.platforms_ready",
        correlation_id = "bootstrap",
        driver = ?config.platforms.driver,
        platforms = registry.len(),
        "platform clients constructed"
    );

    let orchestrator = OrderOrchestrator::new(
        CatalogAggregator::new(registry, config.search_timeout()),
        config.preferences.clone(),
        config.retry_settings(),
        Arc::new(TracingAuditSink),
    )
    .with_terminal_retention(config.orders.max_retained_terminal);

    Ok(Application { config, orchestrator: Arc::new(orchestrator) })
}

impl Application {
    pub fn router(&self) -> Router {
        routes::router(Arc::clone(&self.orchestrator))
            .merge(health::router(Arc::clone(&self.orchestrator), self.config.platforms.driver))
    }
}

#[cfg(test)]
mod tests {
    use quickpick_core::config::{AppConfig, ConfigOverrides, LoadOptions, PlatformDriver};
    use quickpick_core::domain::catalog::PlatformId;

    use crate::bootstrap::{bootstrap, bootstrap_with_config, BootstrapError};

    #[test]
    fn bootstrap_rejects_unknown_platforms_before_serving() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                enabled_platforms: Some(vec![PlatformId::new("dunzo")]),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().expect("unknown platform").to_string();
        assert!(message.contains("dunzo"));
    }

    #[test]
    fn simulated_bootstrap_wires_every_enabled_platform() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                platform_driver: Some(PlatformDriver::Simulated),
                enabled_platforms: Some(vec![
                    PlatformId::new("blinkit"),
                    PlatformId::new("bigbasket"),
                ]),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("simulated bootstrap");

        assert_eq!(
            app.orchestrator.registry().ids(),
            vec![PlatformId::new("blinkit"), PlatformId::new("bigbasket")]
        );
        assert_eq!(app.orchestrator.default_policy(), &app.config.preferences);
        assert_eq!(app.orchestrator.terminal_retention(), 100);
    }

    #[test]
    fn configured_retention_reaches_the_orchestrator() {
        let mut config = AppConfig::default();
        config.platforms.driver = PlatformDriver::Simulated;
        config.orders.max_retained_terminal = 7;

        let app = bootstrap_with_config(config).expect("simulated bootstrap");
        assert_eq!(app.orchestrator.terminal_retention(), 7);
    }

    #[test]
    fn missing_config_file_is_a_config_error() {
        let result = bootstrap(LoadOptions {
            config_path: Some("does-not-exist/quickpick.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        });

        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }
}
