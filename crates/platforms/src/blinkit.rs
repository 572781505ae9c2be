use quickpick_core::domain::catalog::{PlatformId, ProductCandidate};
use reqwest::Url;
use serde::Deserialize;

use crate::storefront::{
    candidate, join_url, parse_price_text, parse_rating_text, with_query, Storefront,
    StorefrontError, MAX_CANDIDATES,
};

/// Blinkit returns display strings (`"₹45"`, `"4.3 (120)"`) rather than numbers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blinkit;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<BlinkitProduct>,
}

#[derive(Debug, Deserialize)]
struct BlinkitProduct {
    name: String,
    price: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    rating: Option<String>,
    #[serde(default)]
    inventory: u32,
    #[serde(default)]
    url: Option<String>,
}

impl Storefront for Blinkit {
    fn search_url(&self, base_url: &str, query: &str) -> Result<Url, StorefrontError> {
        Ok(with_query(join_url(base_url, "search")?, "q", query))
    }

    fn parse_search(
        &self,
        platform: &PlatformId,
        body: &str,
    ) -> Result<Vec<ProductCandidate>, StorefrontError> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|error| StorefrontError::payload("search", error))?;

        Ok(response
            .products
            .into_iter()
            .filter_map(|product| {
                let price = parse_price_text(&product.price)?;
                candidate(
                    platform,
                    &product.name,
                    price,
                    product.unit,
                    product.inventory > 0,
                    product.rating.as_deref().map(parse_rating_text).unwrap_or_default(),
                    product.url,
                )
            })
            .take(MAX_CANDIDATES)
            .collect())
    }
}
