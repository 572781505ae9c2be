use quickpick_core::domain::catalog::{PlatformId, ProductCandidate};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::storefront::{
    candidate, join_url, with_query, Storefront, StorefrontError, MAX_CANDIDATES,
};

/// Zepto reports prices in paise.
#[derive(Clone, Copy, Debug, Default)]
pub struct Zepto;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<ZeptoProduct>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZeptoProduct {
    name: String,
    selling_price: i64,
    #[serde(default)]
    pack_size: Option<String>,
    #[serde(default)]
    rating: Option<Decimal>,
    #[serde(default)]
    out_of_stock: bool,
    #[serde(default)]
    slug: Option<String>,
}

impl Storefront for Zepto {
    fn search_url(&self, base_url: &str, query: &str) -> Result<Url, StorefrontError> {
        Ok(with_query(join_url(base_url, "search")?, "query", query))
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
            .filter(|product| product.selling_price >= 0)
            .filter_map(|product| {
                candidate(
                    platform,
                    &product.name,
                    Decimal::new(product.selling_price, 2),
                    product.pack_size,
                    !product.out_of_stock,
                    product.rating.unwrap_or(Decimal::ZERO),
                    product.slug.map(|slug| format!("https://www.zepto.com/pn/{slug}")),
                )
            })
            .take(MAX_CANDIDATES)
            .collect())
    }
}
