use quickpick_core::domain::catalog::{PlatformId, ProductCandidate};
use reqwest::Url;
use serde::Deserialize;

use crate::storefront::{
    candidate, join_url, parse_price_text, parse_rating_text, with_query, Storefront,
    StorefrontError, MAX_CANDIDATES,
};

/// BigBasket searches under `/ps/` and prices products with `sp` decimal strings.
#[derive(Clone, Copy, Debug, Default)]
pub struct BigBasket;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    products: Vec<BigBasketProduct>,
}

#[derive(Debug, Deserialize)]
struct BigBasketProduct {
    desc: String,
    #[serde(default)]
    w: Option<String>,
    pricing: BigBasketPricing,
    #[serde(default)]
    rating_info: Option<BigBasketRating>,
    #[serde(default)]
    sold_out: bool,
    #[serde(default)]
    absolute_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BigBasketPricing {
    sp: String,
}

#[derive(Debug, Deserialize)]
struct BigBasketRating {
    avg_rating: String,
}

impl Storefront for BigBasket {
    fn search_url(&self, base_url: &str, query: &str) -> Result<Url, StorefrontError> {
        Ok(with_query(join_url(base_url, "ps/")?, "q", query))
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
                let price = parse_price_text(&product.pricing.sp)?;
                let rating = product
                    .rating_info
                    .map(|rating| parse_rating_text(&rating.avg_rating))
                    .unwrap_or_default();
                let product_url =
                    product.absolute_url.map(|path| format!("https://www.bigbasket.com{path}"));
                candidate(
                    platform,
                    &product.desc,
                    price,
                    product.w,
                    !product.sold_out,
                    rating,
                    product_url,
                )
            })
            .take(MAX_CANDIDATES)
            .collect())
    }
}
