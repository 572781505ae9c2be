//! Per-site request shapes and response parsing.
//!
//! Every delivery platform exposes the same three capabilities with different
//! URLs and payloads. A [`Storefront`] owns only those differences; transport,
//! sessions and error classification live in [`crate::StorefrontClient`].

use chrono::{DateTime, Utc};
use quickpick_core::domain::catalog::{PlatformId, ProductCandidate};
use quickpick_core::domain::order::{FulfilmentState, OrderLine};
use reqwest::Url;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Search results beyond this many cards are ignored.
pub const MAX_CANDIDATES: usize = 20;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StorefrontError {
    #[error("invalid storefront url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unexpected {context} payload: {reason}")]
    UnexpectedPayload { context: &'static str, reason: String },
    #[error("unknown fulfilment state `{0}`")]
    UnknownState(String),
}

impl StorefrontError {
    pub(crate) fn payload(context: &'static str, error: serde_json::Error) -> Self {
        Self::UnexpectedPayload { context, reason: error.to_string() }
    }
}

pub trait Storefront: Send + Sync + 'static {
    /// Search endpoint for one item query.
    fn search_url(&self, base_url: &str, query: &str) -> Result<Url, StorefrontError>;

    /// Decodes a search response body into at most [`MAX_CANDIDATES`] candidates.
    fn parse_search(
        &self,
        platform: &PlatformId,
        body: &str,
    ) -> Result<Vec<ProductCandidate>, StorefrontError>;

    fn order_url(&self, base_url: &str) -> Result<Url, StorefrontError> {
        join_url(base_url, "api/orders")
    }

    fn status_url(&self, base_url: &str, platform_order_id: &str) -> Result<Url, StorefrontError> {
        let mut url = join_url(base_url, "api/orders")?;
        url.path_segments_mut()
            .map_err(|_| StorefrontError::InvalidUrl {
                url: base_url.to_owned(),
                reason: "base url cannot carry a path".to_owned(),
            })?
            .push(platform_order_id);
        Ok(url)
    }

    fn order_request<'a>(
        &self,
        lines: &'a [OrderLine],
        user_id: &'a str,
    ) -> PlaceOrderRequest<'a> {
        PlaceOrderRequest::new(lines, user_id)
    }

    fn parse_receipt(&self, body: &str) -> Result<OrderReceipt, StorefrontError> {
        serde_json::from_str(body).map_err(|error| StorefrontError::payload("order", error))
    }

    fn parse_status(&self, body: &str) -> Result<StatusReport, StorefrontError> {
        let payload: StatusPayload =
            serde_json::from_str(body).map_err(|error| StorefrontError::payload("status", error))?;
        Ok(StatusReport {
            state: parse_fulfilment_state(&payload.status)?,
            estimated_delivery: payload.estimated_delivery,
            delivery_person: payload.delivery_person.filter(|name| !name.trim().is_empty()),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderRequest<'a> {
    pub user_id: &'a str,
    pub items: Vec<PlaceOrderLine<'a>>,
}

#[derive(Debug, Serialize)]
pub struct PlaceOrderLine<'a> {
    pub query: &'a str,
    pub product_name: &'a str,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl<'a> PlaceOrderRequest<'a> {
    pub fn new(lines: &'a [OrderLine], user_id: &'a str) -> Self {
        Self {
            user_id,
            items: lines
                .iter()
                .map(|line| PlaceOrderLine {
                    query: &line.item.name,
                    product_name: &line.product_name,
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
        }
    }
}

/// Platform acknowledgement of a checkout.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct OrderReceipt {
    pub order_id: String,
    #[serde(default)]
    pub tracking_url: Option<String>,
    #[serde(default)]
    pub estimated_delivery: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub state: FulfilmentState,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub delivery_person: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    status: String,
    #[serde(default)]
    estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    delivery_person: Option<String>,
}

pub fn parse_fulfilment_state(raw: &str) -> Result<FulfilmentState, StorefrontError> {
    let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "confirmed" | "placed" | "accepted" | "packed" | "processing" => {
            Ok(FulfilmentState::Confirmed)
        }
        "out_for_delivery" | "dispatched" | "picked_up" => Ok(FulfilmentState::OutForDelivery),
        "delivered" | "completed" => Ok(FulfilmentState::Delivered),
        "cancelled" | "canceled" | "refunded" => Ok(FulfilmentState::Cancelled),
        _ => Err(StorefrontError::UnknownState(raw.to_owned())),
    }
}

pub(crate) fn join_url(base_url: &str, path: &str) -> Result<Url, StorefrontError> {
    let normalized = format!("{}/", base_url.trim().trim_end_matches('/'));
    let base = Url::parse(&normalized).map_err(|error| StorefrontError::InvalidUrl {
        url: base_url.to_owned(),
        reason: error.to_string(),
    })?;
    base.join(path).map_err(|error| StorefrontError::InvalidUrl {
        url: base_url.to_owned(),
        reason: error.to_string(),
    })
}

pub(crate) fn with_query(mut url: Url, key: &str, value: &str) -> Url {
    url.query_pairs_mut().append_pair(key, value.trim());
    url
}

/// Price from display text such as `"₹1,045.50"` or `"Rs. 45"`.
pub fn parse_price_text(raw: &str) -> Option<Decimal> {
    let numeric: String = raw
        .chars()
        .skip_while(|ch| !ch.is_ascii_digit())
        .take_while(|ch| ch.is_ascii_digit() || *ch == '.' || *ch == ',')
        .filter(|ch| *ch != ',')
        .collect();
    numeric.parse::<Decimal>().ok().filter(|price| !price.is_sign_negative())
}

/// Rating from text such as `"4.3 (1.2k)"`; unparseable text rates zero.
pub fn parse_rating_text(raw: &str) -> Decimal {
    raw.split_whitespace()
        .next()
        .and_then(|token| token.parse::<Decimal>().ok())
        .map(ProductCandidate::clamp_rating)
        .unwrap_or(Decimal::ZERO)
}

pub(crate) fn candidate(
    platform: &PlatformId,
    name: &str,
    unit_price: Decimal,
    unit: Option<String>,
    available: bool,
    rating: Decimal,
    product_url: Option<String>,
) -> Option<ProductCandidate> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some(ProductCandidate {
        platform: platform.clone(),
        name: name.to_owned(),
        unit_price,
        unit: unit.filter(|unit| !unit.trim().is_empty()),
        available,
        rating: ProductCandidate::clamp_rating(rating),
        product_url,
    })
}
