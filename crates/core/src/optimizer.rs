//! Platform selection over aggregated quotes.
//!
//! Selection is filter, rank, tie-break. It is a pure function of its inputs:
//! no clock reads and no randomness, so identical quotes and policy always give an
//! identical [`Recommendation`].

use std::cmp::Ordering;

use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::preference::{DeliveryPriority, PreferencePolicy};
use crate::domain::quote::{PlatformQuote, PlatformQuotes};
use crate::domain::recommendation::{PlatformBreakdown, Recommendation};
use crate::errors::ApplicationError;

#[derive(Clone, Debug, Default)]
pub struct DealOptimizer;

impl DealOptimizer {
    pub fn new() -> Self {
        Self
    }

    pub fn recommend(
        &self,
        quotes: &PlatformQuotes,
        policy: &PreferencePolicy,
    ) -> Result<Recommendation, ApplicationError> {
        if quotes.is_empty() {
            return Err(ApplicationError::NoEligibleQuote);
        }

        let partial = quotes.all_incomplete();
        let comparable: Vec<&PlatformQuote> = if partial {
            let most_resolved =
                quotes.iter().map(PlatformQuote::resolved_count).max().unwrap_or_default();
            quotes.iter().filter(|quote| quote.resolved_count() == most_resolved).collect()
        } else {
            quotes.iter().filter(|quote| quote.complete).collect()
        };

        let filtered: Vec<&PlatformQuote> = comparable
            .iter()
            .copied()
            .filter(|quote| filter_reason(quote, policy).is_none())
            .collect();
        let filters_relaxed = filtered.is_empty();
        let mut ranked = if filters_relaxed { comparable.clone() } else { filtered };
        ranked.sort_by(|left, right| rank(left, right, policy));

        let Some(winner) = ranked.first().copied() else {
            return Err(ApplicationError::NoEligibleQuote);
        };
        let runner_up = ranked.get(1).copied();
        let savings = match runner_up {
            Some(second) if !partial => (second.total() - winner.total()).max(Decimal::ZERO),
            _ => Decimal::ZERO,
        };

        let breakdown = quotes
            .iter()
            .map(|quote| {
                let excluded_reason = if ranked.iter().any(|entry| entry.platform == quote.platform)
                {
                    None
                } else if !comparable.iter().any(|entry| entry.platform == quote.platform) {
                    Some(incomplete_reason(quote, partial))
                } else {
                    filter_reason(quote, policy)
                };
                PlatformBreakdown::from_quote(quote, excluded_reason)
            })
            .collect();

        let summary = summarize(
            winner,
            runner_up,
            savings,
            policy.delivery_priority,
            partial,
            filters_relaxed,
        );
        debug!(
            event_name = "optimizer.recommendation_built",
            best_platform = %winner.platform,
            priority = %policy.delivery_priority,
            eligible = ranked.len(),
            savings = %savings,
            partial,
            filters_relaxed,
            "recommendation built"
        );

        Ok(Recommendation {
            best_platform: winner.platform.clone(),
            priority: policy.delivery_priority,
            breakdown,
            savings,
            summary,
            partial,
            filters_relaxed,
        })
    }
}

fn rank(left: &PlatformQuote, right: &PlatformQuote, policy: &PreferencePolicy) -> Ordering {
    let primary = match policy.delivery_priority {
        DeliveryPriority::Cheapest => left.total().cmp(&right.total()),
        DeliveryPriority::Fastest => left.delivery_time_minutes.cmp(&right.delivery_time_minutes),
        DeliveryPriority::BestRated => right.average_rating().cmp(&left.average_rating()),
    };

    primary
        .then_with(|| {
            policy.preference_rank(&left.platform).cmp(&policy.preference_rank(&right.platform))
        })
        .then_with(|| left.platform.cmp(&right.platform))
}

fn filter_reason(quote: &PlatformQuote, policy: &PreferencePolicy) -> Option<String> {
    if quote.delivery_time_minutes > policy.max_delivery_time_minutes {
        return Some(format!(
            "delivery time {} min exceeds limit of {} min",
            quote.delivery_time_minutes, policy.max_delivery_time_minutes
        ));
    }

    let rating = quote.average_rating();
    if rating < policy.quality_threshold {
        return Some(format!(
            "average rating {rating} is below quality threshold {}",
            policy.quality_threshold
        ));
    }

    None
}

fn incomplete_reason(quote: &PlatformQuote, partial: bool) -> String {
    match (&quote.issue, partial) {
        (_, true) => format!(
            "resolved only {} of {} items",
            quote.resolved_count(),
            quote.resolved_count() + quote.unresolved.len()
        ),
        (Some(issue), false) => format!("incomplete quote: {}", issue.describe()),
        (None, false) => "incomplete quote".to_owned(),
    }
}

fn summarize(
    winner: &PlatformQuote,
    runner_up: Option<&PlatformQuote>,
    savings: Decimal,
    priority: DeliveryPriority,
    partial: bool,
    filters_relaxed: bool,
) -> String {
    let mut summary = if partial {
        let missing: Vec<String> = winner.unresolved.iter().map(ToString::to_string).collect();
        format!(
            "Best effort: {} covers {} of {} items for ₹{:.2}, delivered in {} min. Missing: {}.",
            winner.platform,
            winner.resolved_count(),
            winner.resolved_count() + winner.unresolved.len(),
            winner.total(),
            winner.delivery_time_minutes,
            if missing.is_empty() { "none".to_owned() } else { missing.join(", ") },
        )
    } else {
        let lead = format!(
            "{} is the {} option at ₹{:.2}, delivered in {} min (avg rating {}).",
            winner.platform,
            priority_label(priority),
            winner.total(),
            winner.delivery_time_minutes,
            winner.average_rating(),
        );
        match runner_up {
            Some(second) => {
                format!("{lead} Saves ₹{savings:.2} compared with {}.", second.platform)
            }
            None => format!("{lead} No other platform could fill the whole list."),
        }
    };

    if filters_relaxed {
        summary.push_str(
            " No platform met the delivery-time and rating limits, so they were relaxed.",
        );
    }
    summary
}

fn priority_label(priority: DeliveryPriority) -> &'static str {
    match priority {
        DeliveryPriority::Cheapest => "cheapest",
        DeliveryPriority::Fastest => "fastest",
        DeliveryPriority::BestRated => "best-rated",
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::catalog::{DeliveryTerms, Item, PlatformId, ProductCandidate};
    use crate::domain::preference::{DeliveryPriority, PreferencePolicy};
    use crate::domain::quote::{PlatformQuote, PlatformQuotes, QuoteIssue, QuotedItem};
    use crate::errors::ApplicationError;

    use super::DealOptimizer;

    fn quote(platform: &str, subtotal: i64, fee: i64, eta: u32, rating: i64) -> PlatformQuote {
        let platform = PlatformId::new(platform);
        PlatformQuote::from_resolution(
            platform.clone(),
            DeliveryTerms { fee: Decimal::from(fee), eta_minutes: eta },
            vec![QuotedItem {
                item: Item::new("basket"),
                candidate: ProductCandidate {
                    platform,
                    name: "Weekly basket".to_owned(),
                    unit_price: Decimal::from(subtotal),
                    unit: None,
                    available: true,
                    rating: Decimal::new(rating, 1),
                    product_url: None,
                },
            }],
            Vec::new(),
        )
    }

    fn timed_out(platform: &str) -> PlatformQuote {
        PlatformQuote::failed(
            PlatformId::new(platform),
            DeliveryTerms { fee: Decimal::ZERO, eta_minutes: 10 },
            &[Item::new("basket")],
            QuoteIssue::TimedOut { after_ms: 4_000 },
        )
    }

    fn policy(priority: DeliveryPriority) -> PreferencePolicy {
        PreferencePolicy { delivery_priority: priority, ..PreferencePolicy::default() }
    }

    fn scenario() -> PlatformQuotes {
        PlatformQuotes::new(vec![
            quote("a", 245, 0, 12, 44),
            quote("b", 260, 20, 10, 45),
            quote("c", 245, 20, 15, 42),
            quote("d", 290, 0, 8, 46),
        ])
    }

    #[test]
    fn cheapest_picks_lowest_total_and_savings_against_runner_up() {
        let recommendation = DealOptimizer::new()
            .recommend(&scenario(), &policy(DeliveryPriority::Cheapest))
            .expect("recommendation");

        assert_eq!(recommendation.best_platform, PlatformId::new("a"));
        assert_eq!(recommendation.best_total(), Decimal::from(245));
        assert_eq!(recommendation.savings, Decimal::from(20));
        assert!(!recommendation.partial);
        assert!(!recommendation.filters_relaxed);
        for entry in recommendation.breakdown.iter().filter(|entry| entry.eligible) {
            assert!(recommendation.best_total() <= entry.total);
        }
    }

    #[test]
    fn fastest_and_best_rated_use_their_own_primary_keys() {
        let optimizer = DealOptimizer::new();

        let fastest =
            optimizer.recommend(&scenario(), &policy(DeliveryPriority::Fastest)).expect("fastest");
        assert_eq!(fastest.best_platform, PlatformId::new("d"));

        let rated = optimizer
            .recommend(&scenario(), &policy(DeliveryPriority::BestRated))
            .expect("best rated");
        assert_eq!(rated.best_platform, PlatformId::new("d"));
    }

    #[test]
    fn identical_inputs_give_identical_recommendations() {
        let optimizer = DealOptimizer::new();
        let policy = policy(DeliveryPriority::Cheapest);
        assert_eq!(
            optimizer.recommend(&scenario(), &policy).expect("first"),
            optimizer.recommend(&scenario(), &policy).expect("second")
        );
    }

    #[test]
    fn ties_fall_back_to_preferred_platforms_then_id() {
        let quotes = PlatformQuotes::new(vec![
            quote("instamart", 100, 0, 10, 45),
            quote("blinkit", 100, 0, 10, 45),
            quote("bigbasket", 100, 0, 10, 45),
        ]);

        let preferred = PreferencePolicy {
            delivery_priority: DeliveryPriority::Cheapest,
            preferred_platforms: vec![PlatformId::new("blinkit")],
            ..PreferencePolicy::default()
        };
        let optimizer = DealOptimizer::new();
        assert_eq!(
            optimizer.recommend(&quotes, &preferred).expect("preferred").best_platform,
            PlatformId::new("blinkit")
        );

        let unpreferred =
            PreferencePolicy { preferred_platforms: Vec::new(), ..preferred };
        let recommendation = optimizer.recommend(&quotes, &unpreferred).expect("alphabetical");
        assert_eq!(recommendation.best_platform, PlatformId::new("bigbasket"));
        assert_eq!(recommendation.savings, Decimal::ZERO);
    }

    #[test]
    fn incomplete_quotes_stay_in_breakdown_but_never_win() {
        let quotes = PlatformQuotes::new(vec![
            quote("zepto", 300, 0, 10, 45),
            timed_out("blinkit"),
        ]);

        let recommendation = DealOptimizer::new()
            .recommend(&quotes, &policy(DeliveryPriority::Cheapest))
            .expect("recommendation");

        assert_eq!(recommendation.best_platform, PlatformId::new("zepto"));
        assert_eq!(recommendation.savings, Decimal::ZERO);
        let blinkit = recommendation
            .breakdown
            .iter()
            .find(|entry| entry.platform == PlatformId::new("blinkit"))
            .expect("blinkit breakdown");
        assert!(!blinkit.eligible);
        assert!(!blinkit.complete);
        assert_eq!(
            blinkit.excluded_reason.as_deref(),
            Some("incomplete quote: search timed out after 4000ms")
        );
    }

    #[test]
    fn filters_exclude_slow_and_low_rated_quotes() {
        let quotes = PlatformQuotes::new(vec![
            quote("slow", 100, 0, 45, 48),
            quote("poor", 110, 0, 10, 32),
            quote("ok", 150, 0, 20, 42),
        ]);

        let recommendation = DealOptimizer::new()
            .recommend(&quotes, &policy(DeliveryPriority::Cheapest))
            .expect("recommendation");

        assert_eq!(recommendation.best_platform, PlatformId::new("ok"));
        assert!(!recommendation.filters_relaxed);
        let excluded: Vec<_> = recommendation
            .breakdown
            .iter()
            .filter(|entry| !entry.eligible)
            .map(|entry| entry.platform.as_str())
            .collect();
        assert_eq!(excluded, vec!["slow", "poor"]);
    }

    #[test]
    fn filters_are_relaxed_when_nothing_passes() {
        let quotes = PlatformQuotes::new(vec![
            quote("slow", 100, 0, 45, 48),
            quote("slower", 90, 0, 60, 47),
        ]);

        let recommendation = DealOptimizer::new()
            .recommend(&quotes, &policy(DeliveryPriority::Cheapest))
            .expect("relaxed recommendation");

        assert!(recommendation.filters_relaxed);
        assert_eq!(recommendation.best_platform, PlatformId::new("slower"));
        assert_eq!(recommendation.savings, Decimal::from(10));
        assert!(recommendation.summary.contains("relaxed"));
    }

    #[test]
    fn all_incomplete_quotes_produce_partial_best_effort() {
        let mut half = quote("blinkit", 80, 0, 10, 45);
        half.unresolved.push(Item::new("saffron"));
        half.complete = false;
        let quotes = PlatformQuotes::new(vec![timed_out("zepto"), half]);

        let recommendation = DealOptimizer::new()
            .recommend(&quotes, &PreferencePolicy::default())
            .expect("best effort");

        assert!(recommendation.partial);
        assert_eq!(recommendation.best_platform, PlatformId::new("blinkit"));
        assert_eq!(recommendation.savings, Decimal::ZERO);
        assert!(recommendation.summary.starts_with("Best effort"));
    }

    #[test]
    fn every_platform_timing_out_still_recommends() {
        let quotes = PlatformQuotes::new(vec![timed_out("zepto"), timed_out("blinkit")]);
        let recommendation = DealOptimizer::new()
            .recommend(&quotes, &PreferencePolicy::default())
            .expect("fallback");

        assert!(recommendation.partial);
        assert_eq!(recommendation.best_platform, PlatformId::new("zepto"));
    }

    #[test]
    fn empty_quotes_have_no_eligible_quote() {
        let error = DealOptimizer::new()
            .recommend(&PlatformQuotes::default(), &PreferencePolicy::default())
            .expect_err("no quotes");
        assert_eq!(error, ApplicationError::NoEligibleQuote);
    }
}
