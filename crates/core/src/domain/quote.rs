use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedItem {
    pub item: Item,
    pub candidate: ProductCandidate,
}

impl QuotedItem {
    /// `None` when price times quantity does not fit in a `Decimal`.
    pub fn line_total(&self) -> Option<Decimal> {
        self.candidate.unit_price.checked_mul(Decimal::from(self.item.quantity))
    }
}

/// Why a platform quote could not cover the whole basket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuoteIssue {
    Unavailable { reason: String },
    TimedOut { after_ms: u64 },
    MissingItems { items: Vec<String> },
}

impl QuoteIssue {
    pub fn describe(&self) -> String {
        match self {
            Self::Unavailable { reason } => format!("platform unavailable: {reason}"),
            Self::TimedOut { after_ms } => format!("search timed out after {after_ms}ms"),
            Self::MissingItems { items } => format!("no available match for {}", items.join(", ")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformQuote {
    pub platform: PlatformId,
    pub items: Vec<QuotedItem>,
    pub unresolved: Vec<Item>,
    pub subtotal: Decimal,
    pub delivery_fee: Decimal,
    pub delivery_time_minutes: u32,
    pub complete: bool,
    pub issue: Option<QuoteIssue>,
}

impl PlatformQuote {
    /// Lines whose cost cannot be represented are moved to `unresolved`, so the
    /// quote total always fits.
    pub fn from_resolution(
        platform: PlatformId,
        terms: DeliveryTerms,
        items: Vec<QuotedItem>,
        mut unresolved: Vec<Item>,
    ) -> Self {
        let mut total = terms.fee;
        let mut priced = Vec::with_capacity(items.len());
        for quoted in items {
            match quoted.line_total().and_then(|line| total.checked_add(line)) {
                Some(next) => {
                    total = next;
                    priced.push(quoted);
                }
                None => unresolved.push(quoted.item),
            }
        }
        let items = priced;
        let subtotal = total - terms.fee;
        let complete = unresolved.is_empty();
        let issue = (!complete).then(|| QuoteIssue::MissingItems {
            items: unresolved.iter().map(ToString::to_string).collect(),
        });

        Self {
            platform,
            items,
            unresolved,
            subtotal,
            delivery_fee: terms.fee,
            delivery_time_minutes: terms.eta_minutes,
            complete,
            issue,
        }
    }

    pub fn failed(
        platform: PlatformId,
        terms: DeliveryTerms,
        requested: &[Item],
        issue: QuoteIssue,
    ) -> Self {
        Self {
            platform,
            items: Vec::new(),
            unresolved: requested.to_vec(),
            subtotal: Decimal::ZERO,
            delivery_fee: terms.fee,
            delivery_time_minutes: terms.eta_minutes,
            complete: false,
            issue: Some(issue),
        }
    }

    pub fn total(&self) -> Decimal {
        self.subtotal + self.delivery_fee
    }

    pub fn resolved_count(&self) -> usize {
        self.items.len()
    }

    pub fn average_rating(&self) -> Decimal {
        if self.items.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = self.items.iter().map(|quoted| quoted.candidate.rating).sum();
        (sum / Decimal::from(self.items.len())).round_dp(2)
    }
}

/// Per-platform quotes for one comparison, in platform configuration order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformQuotes {
    quotes: Vec<PlatformQuote>,
}

impl PlatformQuotes {
    pub fn new(quotes: Vec<PlatformQuote>) -> Self {
        Self { quotes }
    }

    pub fn get(&self, platform: &PlatformId) -> Option<&PlatformQuote> {
        self.quotes.iter().find(|quote| &quote.platform == platform)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlatformQuote> {
        self.quotes.iter()
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn all_incomplete(&self) -> bool {
        self.quotes.iter().all(|quote| !quote.complete)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};

    use super::{PlatformQuote, QuoteIssue, QuotedItem};

    fn quoted(name: &str, quantity: u32, price: i64, rating: i64) -> QuotedItem {
        QuotedItem {
            item: Item::with_quantity(name, quantity),
            candidate: ProductCandidate {
                platform: PlatformId::new("zepto"),
                name: format!("Fresh {name}"),
                unit_price: Decimal::from(price),
                unit: None,
                available: true,
                rating: Decimal::new(rating, 1),
                product_url: None,
            },
        }
    }

    fn terms() -> DeliveryTerms {
        DeliveryTerms { fee: Decimal::from(15), eta_minutes: 12 }
    }

    #[test]
    fn complete_quote_sums_quantities_and_fee() {
        let quote = PlatformQuote::from_resolution(
            PlatformId::new("zepto"),
            terms(),
            vec![quoted("milk", 2, 30, 45), quoted("tomatoes", 1, 40, 41)],
            Vec::new(),
        );

        assert!(quote.complete);
        assert_eq!(quote.subtotal, Decimal::from(100));
        assert_eq!(quote.total(), Decimal::from(115));
        assert_eq!(quote.average_rating(), Decimal::new(430, 2));
        assert!(quote.issue.is_none());
    }

    #[test]
    fn unresolved_items_make_quote_incomplete() {
        let quote = PlatformQuote::from_resolution(
            PlatformId::new("zepto"),
            terms(),
            vec![quoted("milk", 1, 30, 45)],
            vec![Item::new("saffron")],
        );

        assert!(!quote.complete);
        assert_eq!(quote.issue, Some(QuoteIssue::MissingItems { items: vec!["saffron".into()] }));
    }

    #[test]
    fn failed_quote_keeps_requested_items_as_unresolved() {
        let requested = vec![Item::new("milk"), Item::new("bread")];
        let quote = PlatformQuote::failed(
            PlatformId::new("blinkit"),
            terms(),
            &requested,
            QuoteIssue::TimedOut { after_ms: 4000 },
        );

        assert!(!quote.complete);
        assert_eq!(quote.resolved_count(), 0);
        assert_eq!(quote.unresolved, requested);
        assert_eq!(quote.average_rating(), Decimal::ZERO);
    }

    #[test]
    fn unrepresentable_line_costs_are_left_unresolved() {
        let mut huge = quoted("milk", u32::MAX, 1, 45);
        huge.candidate.unit_price = Decimal::MAX;

        let quote = PlatformQuote::from_resolution(
            PlatformId::new("zepto"),
            terms(),
            vec![huge, quoted("bread", 1, 40, 42)],
            Vec::new(),
        );

        assert!(!quote.complete);
        assert_eq!(quote.resolved_count(), 1);
        assert_eq!(quote.subtotal, Decimal::from(40));
        assert_eq!(quote.total(), Decimal::from(55));
        assert_eq!(quote.unresolved, vec![Item::with_quantity("milk", u32::MAX)]);
        assert_eq!(
            quote.issue,
            Some(QuoteIssue::MissingItems { items: vec![format!("{} x milk", u32::MAX)] })
        );
    }
}
