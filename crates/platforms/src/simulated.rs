//! Seeded offline catalog for the `simulated` driver.
//!
//! Prices are derived from a shared base list with a fixed per-platform markup,
//! so the same request always produces the same comparison.

use std::time::Duration;

use quickpick_core::domain::catalog::{DeliveryTerms, PlatformId};
use quickpick_core::platform::InMemoryPlatformClient;
use rust_decimal::Decimal;

/// Item key, product name, base price in paise, rating in tenths.
const STAPLES: &[(&str, &str, i64, i64)] = &[
    ("milk", "Toned Milk 500 ml", 2_900, 44),
    ("bread", "Whole Wheat Bread 400 g", 4_500, 42),
    ("eggs", "Farm Fresh Eggs 6 pcs", 5_400, 43),
    ("butter", "Salted Butter 100 g", 5_800, 46),
    ("curd", "Fresh Curd 400 g", 3_500, 43),
    ("tomatoes", "Tomato Hybrid 500 g", 2_800, 41),
    ("onions", "Onion 1 kg", 3_900, 40),
    ("potatoes", "Potato 1 kg", 3_200, 41),
    ("bananas", "Robusta Banana 6 pcs", 4_200, 42),
    ("rice", "Basmati Rice 1 kg", 18_900, 44),
    ("atta", "Whole Wheat Atta 5 kg", 27_500, 45),
    ("sugar", "Refined Sugar 1 kg", 4_800, 42),
    ("tea", "Assam Tea 250 g", 14_500, 44),
    ("coffee", "Instant Coffee 100 g", 31_000, 45),
];

/// Markup in basis points, rating delta in tenths and items the platform does not stock.
fn platform_profile(id: &PlatformId) -> (i64, i64, &'static [&'static str]) {
    match id.as_str() {
        "zepto" => (0, 0, &[]),
        "blinkit" => (500, 1, &["coffee"]),
        "instamart" => (-300, -1, &["atta"]),
        "bigbasket" => (-800, 0, &["bananas", "curd"]),
        other => {
            let seed: i64 = other.bytes().map(i64::from).sum();
            (seed % 7 * 100 - 300, seed % 3 - 1, &[])
        }
    }
}

/// Simulated client with the seeded catalog for `id`.
pub fn simulated_client(id: PlatformId, terms: DeliveryTerms) -> InMemoryPlatformClient {
    let (markup_bps, rating_delta, missing) = platform_profile(&id);
    let latency = Duration::from_millis(20 + u64::from(terms.eta_minutes));
    let markup = Decimal::ONE + Decimal::new(markup_bps, 4);

    let client = InMemoryPlatformClient::new(id, terms).with_search_latency(latency);

    STAPLES.iter().filter(|(item, ..)| !missing.contains(item)).fold(
        client,
        |client, (item, product, price_paise, rating_tenths)| {
            let price = (Decimal::new(*price_paise, 2) * markup).round_dp(2);
            let rating = Decimal::new(rating_tenths + rating_delta, 1);
            client.with_product(item, product, price, rating)
        },
    )
}

#[cfg(test)]
mod tests {
    use quickpick_core::domain::catalog::{DeliveryTerms, Item, PlatformId};
    use quickpick_core::platform::PlatformClient;
    use rust_decimal::Decimal;

    use super::simulated_client;

    fn terms() -> DeliveryTerms {
        DeliveryTerms { fee: Decimal::ZERO, eta_minutes: 10 }
    }

    #[tokio::test]
    async fn prices_follow_platform_markup() {
        let zepto = simulated_client(PlatformId::new("zepto"), terms());
        let blinkit = simulated_client(PlatformId::new("blinkit"), terms());

        let zepto_milk = zepto.search(&Item::new("Milk")).await.expect("zepto search");
        let blinkit_milk = blinkit.search(&Item::new("milk")).await.expect("blinkit search");

        assert_eq!(zepto_milk[0].unit_price, Decimal::new(2_900, 2));
        assert_eq!(blinkit_milk[0].unit_price, Decimal::new(3_045, 2));
        assert_eq!(blinkit_milk[0].rating, Decimal::new(45, 1));
    }

    #[tokio::test]
    async fn unstocked_items_return_no_candidates() {
        let bigbasket = simulated_client(PlatformId::new("bigbasket"), terms());
        assert!(bigbasket.search(&Item::new("bananas")).await.expect("search").is_empty());
        assert!(bigbasket.search(&Item::new("caviar")).await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn unknown_platforms_are_still_deterministic() {
        let first = simulated_client(PlatformId::new("dunzo"), terms());
        let second = simulated_client(PlatformId::new("dunzo"), terms());
        let left = first.search(&Item::new("rice")).await.expect("search");
        let right = second.search(&Item::new("rice")).await.expect("search");
        assert_eq!(left, right);
        assert!(!left.is_empty());
    }
}
