use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::PlatformId;
use crate::domain::preference::DeliveryPriority;
use crate::domain::quote::{PlatformQuote, QuotedItem};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBreakdown {
    pub platform: PlatformId,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub delivery_time_minutes: u32,
    pub total: Decimal,
    pub average_rating: Decimal,
    pub items: Vec<QuotedItem>,
    pub complete: bool,
    pub eligible: bool,
    pub excluded_reason: Option<String>,
    /// Why the platform could not cover the basket, whether or not it was ranked.
    pub issue: Option<String>,
}

impl PlatformBreakdown {
    pub fn from_quote(quote: &PlatformQuote, excluded_reason: Option<String>) -> Self {
        Self {
            platform: quote.platform.clone(),
            subtotal: quote.subtotal,
            delivery_fee: quote.delivery_fee,
            delivery_time_minutes: quote.delivery_time_minutes,
            total: quote.total(),
            average_rating: quote.average_rating(),
            items: quote.items.clone(),
            complete: quote.complete,
            eligible: excluded_reason.is_none(),
            excluded_reason,
            issue: quote.issue.as_ref().map(|issue| issue.describe()),
        }
    }
}

/// Optimizer output. Contains no timestamps so identical inputs compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub best_platform: PlatformId,
    pub priority: DeliveryPriority,
    pub breakdown: Vec<PlatformBreakdown>,
    pub savings: Decimal,
    pub summary: String,
    pub partial: bool,
    pub filters_relaxed: bool,
}

impl Recommendation {
    pub fn winner(&self) -> Option<&PlatformBreakdown> {
        self.breakdown.iter().find(|entry| entry.platform == self.best_platform)
    }

    pub fn best_total(&self) -> Decimal {
        self.winner().map(|entry| entry.total).unwrap_or(Decimal::ZERO)
    }
}
