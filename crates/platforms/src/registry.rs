use std::sync::Arc;

use quickpick_core::config::{AppConfig, PlatformDriver, PlatformEndpoint};
use quickpick_core::domain::catalog::PlatformId;
use quickpick_core::errors::ApplicationError;
use quickpick_core::platform::{PlatformClient, PlatformRegistry};
use tracing::info;

use crate::simulated::simulated_client;
use crate::{BigBasket, Blinkit, StorefrontClient, SwiggyInstamart, Zepto};

/// Platforms with a built-in storefront.
pub const SUPPORTED_PLATFORMS: [&str; 4] = ["zepto", "blinkit", "instamart", "bigbasket"];

/// Builds one client per enabled platform, in configuration order.
pub fn build_registry(config: &AppConfig) -> Result<PlatformRegistry, ApplicationError> {
    let clients: Vec<Arc<dyn PlatformClient>> = match config.platforms.driver {
        PlatformDriver::Simulated => config
            .enabled_endpoints()
            .into_iter()
            .map(|(id, endpoint)| {
                Arc::new(simulated_client(id.clone(), endpoint.delivery_terms()))
                    as Arc<dyn PlatformClient>
            })
            .collect(),
        PlatformDriver::Http => {
            let http = reqwest::Client::builder()
                .user_agent(config.platforms.user_agent.as_str())
                .timeout(config.search_timeout())
                .build()
                .map_err(|error| {
                    ApplicationError::Configuration(format!("http client: {error}"))
                })?;

            config
                .enabled_endpoints()
                .into_iter()
                .map(|(id, endpoint)| storefront_client(id, endpoint, http.clone()))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    let registry = PlatformRegistry::new(clients)?;
    info!(
        event_name = "platforms.registry_built",
        driver = ?config.platforms.driver,
        platforms = ?registry.ids().iter().map(PlatformId::as_str).collect::<Vec<_>>(),
        "platform registry built"
    );
    Ok(registry)
}

fn storefront_client(
    id: &PlatformId,
    endpoint: &PlatformEndpoint,
    http: reqwest::Client,
) -> Result<Arc<dyn PlatformClient>, ApplicationError> {
    let id = id.clone();
    let client: Arc<dyn PlatformClient> = match id.as_str() {
        "zepto" => Arc::new(StorefrontClient::new(id, Zepto, endpoint, http)),
        "blinkit" => Arc::new(StorefrontClient::new(id, Blinkit, endpoint, http)),
        "instamart" => Arc::new(StorefrontClient::new(id, SwiggyInstamart, endpoint, http)),
        "bigbasket" => Arc::new(StorefrontClient::new(id, BigBasket, endpoint, http)),
        other => {
            return Err(ApplicationError::Configuration(format!(
                "no storefront for platform `{other}` (supported: {})",
                SUPPORTED_PLATFORMS.join(", ")
            )))
        }
    };
    Ok(client)
}

#[cfg(test)]
mod tests {
    use quickpick_core::config::{AppConfig, PlatformDriver, PlatformEndpoint};
    use quickpick_core::domain::catalog::PlatformId;
    use quickpick_core::errors::ApplicationError;
    use rust_decimal::Decimal;

    use super::build_registry;

    #[test]
    fn simulated_driver_builds_enabled_platforms_in_order() {
        let mut config = AppConfig::default();
        config.platforms.driver = PlatformDriver::Simulated;
        config.platforms.enabled = vec![PlatformId::new("instamart"), PlatformId::new("zepto")];

        let registry = build_registry(&config).expect("registry");
        assert_eq!(registry.ids(), vec![PlatformId::new("instamart"), PlatformId::new("zepto")]);
        let instamart = registry.get(&PlatformId::new("instamart")).expect("instamart");
        assert_eq!(instamart.delivery_terms().fee, Decimal::from(20));
    }

    #[test]
    fn http_driver_builds_every_known_storefront() {
        let registry = build_registry(&AppConfig::default()).expect("registry");
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn http_driver_rejects_platforms_without_a_storefront() {
        let mut config = AppConfig::default();
        let dunzo = PlatformId::new("dunzo");
        config.platforms.endpoints.insert(
            dunzo.clone(),
            PlatformEndpoint {
                base_url: "https://www.dunzo.com".to_owned(),
                delivery_fee: Decimal::from(15),
                eta_minutes: 25,
                api_token: None,
            },
        );
        config.platforms.enabled.push(dunzo);

        let error = build_registry(&config).expect_err("dunzo has no storefront");
        assert!(matches!(
            error,
            ApplicationError::Configuration(message) if message.contains("dunzo")
        ));
    }
}
