use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{PlatformId, ProductCandidate};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPriority {
    Fastest,
    Cheapest,
    BestRated,
}

impl DeliveryPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fastest => "fastest",
            Self::Cheapest => "cheapest",
            Self::BestRated => "best_rated",
        }
    }
}

impl fmt::Display for DeliveryPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryPriority {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fastest" => Ok(Self::Fastest),
            "cheapest" => Ok(Self::Cheapest),
            "best_rated" | "best-rated" => Ok(Self::BestRated),
            other => Err(DomainError::InvalidPreferencePolicy(format!(
                "unsupported delivery priority `{other}` (expected fastest|cheapest|best_rated)"
            ))),
        }
    }
}

/// Per-request selection policy. Owned by the caller; the core only reads it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferencePolicy {
    pub delivery_priority: DeliveryPriority,
    pub max_delivery_time_minutes: u32,
    pub preferred_platforms: Vec<PlatformId>,
    pub auto_approve_savings_threshold: Decimal,
    pub quality_threshold: Decimal,
}

impl Default for PreferencePolicy {
    fn default() -> Self {
        Self {
            delivery_priority: DeliveryPriority::Fastest,
            max_delivery_time_minutes: 30,
            preferred_platforms: vec![PlatformId::new("zepto"), PlatformId::new("blinkit")],
            auto_approve_savings_threshold: Decimal::from(50),
            quality_threshold: Decimal::from(4),
        }
    }
}

impl PreferencePolicy {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.max_delivery_time_minutes == 0 {
            return Err(DomainError::InvalidPreferencePolicy(
                "max_delivery_time_minutes must be greater than zero".to_owned(),
            ));
        }

        if self.auto_approve_savings_threshold.is_sign_negative() {
            return Err(DomainError::InvalidPreferencePolicy(
                "auto_approve_savings_threshold must not be negative".to_owned(),
            ));
        }

        if self.quality_threshold.is_sign_negative()
            || self.quality_threshold > ProductCandidate::MAX_RATING
        {
            return Err(DomainError::InvalidPreferencePolicy(format!(
                "quality_threshold must be within 0..=5, got {}",
                self.quality_threshold
            )));
        }

        let mut seen = HashSet::new();
        for platform in &self.preferred_platforms {
            if !seen.insert(platform) {
                return Err(DomainError::InvalidPreferencePolicy(format!(
                    "preferred_platforms lists `{platform}` more than once"
                )));
            }
        }

        Ok(())
    }

    /// Position in `preferred_platforms`; unlisted platforms sort after every listed one.
    pub fn preference_rank(&self, platform: &PlatformId) -> usize {
        self.preferred_platforms
            .iter()
            .position(|preferred| preferred == platform)
            .unwrap_or(usize::MAX)
    }
}
