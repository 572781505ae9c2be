use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(pub String);

impl PlatformId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A requested product, not yet bound to any platform's catalog.
///
/// Accepts an optional leading quantity: `"2 x milk"` and `"2x milk"` both parse
/// to two units of `milk`. Names that merely start with digits (`"7up"`, `"2xl tee"`)
/// are kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub quantity: u32,
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), quantity: 1 }
    }

    pub fn with_quantity(name: impl Into<String>, quantity: u32) -> Self {
        Self { name: name.into(), quantity }
    }

    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvariantViolation("item must not be blank".to_owned()));
        }

        let digits: String = trimmed.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() {
            return Ok(Self::new(trimmed));
        }

        let rest = trimmed[digits.len()..].trim_start();
        let mut chars = rest.chars();
        let has_multiplier = matches!(chars.next(), Some('x' | 'X'))
            && chars.next().map(char::is_whitespace).unwrap_or(true);
        if !has_multiplier {
            return Ok(Self::new(trimmed));
        }

        let quantity = digits.parse::<u32>().map_err(|_| {
            DomainError::InvariantViolation(format!("item quantity `{digits}` is out of range"))
        })?;
        if quantity == 0 {
            return Err(DomainError::InvariantViolation(format!(
                "item `{trimmed}` must request at least one unit"
            )));
        }

        let name = rest[1..].trim();
        if name.is_empty() {
            return Err(DomainError::InvariantViolation(format!(
                "item `{trimmed}` is missing a product name"
            )));
        }

        Ok(Self::with_quantity(name, quantity))
    }
}

impl FromStr for Item {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quantity == 1 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} x {}", self.quantity, self.name)
        }
    }
}

/// One platform's offer for an item. Lives for a single comparison cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCandidate {
    pub platform: PlatformId,
    pub name: String,
    pub unit_price: Decimal,
    pub unit: Option<String>,
    pub available: bool,
    pub rating: Decimal,
    pub product_url: Option<String>,
}

impl ProductCandidate {
    pub const MAX_RATING: Decimal = Decimal::from_parts(5, 0, 0, false, 0);

    /// Ratings scraped from storefronts are clamped into `0..=5`.
    pub fn clamp_rating(rating: Decimal) -> Decimal {
        rating.clamp(Decimal::ZERO, Self::MAX_RATING)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTerms {
    pub fee: Decimal,
    pub eta_minutes: u32,
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{Item, ProductCandidate};

    #[test]
    fn parses_plain_item_names() {
        let item: Item = "  tomatoes ".parse().expect("plain item");
        assert_eq!(item, Item::new("tomatoes"));
    }

    #[test]
    fn parses_leading_quantities() {
        assert_eq!(Item::parse("2 x milk").expect("spaced"), Item::with_quantity("milk", 2));
        assert_eq!(Item::parse("3X eggs").expect("compact"), Item::with_quantity("eggs", 3));
        assert_eq!(Item::with_quantity("milk", 2).to_string(), "2 x milk");
    }

    #[test]
    fn keeps_names_that_start_with_digits() {
        assert_eq!(Item::parse("7up").expect("brand"), Item::new("7up"));
        assert_eq!(Item::parse("2xl tee").expect("size"), Item::new("2xl tee"));
    }

    #[test]
    fn rejects_blank_and_zero_quantity_items() {
        assert!(Item::parse("   ").is_err());
        assert!(Item::parse("0 x bread").is_err());
        assert!(Item::parse("4 x ").is_err());
    }

    #[test]
    fn ratings_are_clamped_to_five_stars() {
        assert_eq!(ProductCandidate::clamp_rating(Decimal::new(72, 1)), Decimal::from(5));
        assert_eq!(ProductCandidate::clamp_rating(Decimal::new(-1, 0)), Decimal::ZERO);
    }
}
