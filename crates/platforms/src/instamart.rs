use quickpick_core::domain::catalog::{PlatformId, ProductCandidate};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::storefront::{
    candidate, join_url, with_query, Storefront, StorefrontError, MAX_CANDIDATES,
};

/// Swiggy Instamart nests prices and ratings inside objects under `data.items`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SwiggyInstamart;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: SearchData,
}

#[derive(Debug, Deserialize)]
struct SearchData {
    #[serde(default)]
    items: Vec<InstamartItem>,
}

#[derive(Debug, Deserialize)]
struct InstamartItem {
    display_name: String,
    price: InstamartPrice,
    #[serde(default)]
    quantity: Option<String>,
    #[serde(default)]
    rating: Option<InstamartRating>,
    #[serde(default = "in_stock_default")]
    in_stock: bool,
}

#[derive(Debug, Deserialize)]
struct InstamartPrice {
    #[serde(default)]
    offer_price: Option<Decimal>,
    mrp: Decimal,
}

#[derive(Debug, Deserialize)]
struct InstamartRating {
    value: Decimal,
}

fn in_stock_default() -> bool {
    true
}

impl Storefront for SwiggyInstamart {
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
            .data
            .items
            .into_iter()
            .filter_map(|item| {
                let price = item.price.offer_price.unwrap_or(item.price.mrp);
                if price.is_sign_negative() {
                    return None;
                }
                candidate(
                    platform,
                    &item.display_name,
                    price,
                    item.quantity,
                    item.in_stock,
                    item.rating.map(|rating| rating.value).unwrap_or_default(),
                    None,
                )
            })
            .take(MAX_CANDIDATES)
            .collect())
    }
}
