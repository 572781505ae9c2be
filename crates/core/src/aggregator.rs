//! Concurrent catalog search across every configured platform.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::domain::catalog::{Item, ProductCandidate};
use crate::domain::preference::DeliveryPriority;
use crate::domain::quote::{PlatformQuote, PlatformQuotes, QuoteIssue, QuotedItem};
use crate::platform::{PlatformClient, PlatformError, PlatformRegistry};

pub const DEFAULT_SEARCH_TIMEOUT_MS: u64 = 4_000;

pub struct CatalogAggregator {
    registry: PlatformRegistry,
    search_timeout: Duration,
}

impl CatalogAggregator {
    pub fn new(registry: PlatformRegistry, search_timeout: Duration) -> Self {
        Self { registry, search_timeout }
    }

    pub fn registry(&self) -> &PlatformRegistry {
        &self.registry
    }

    pub fn search_timeout(&self) -> Duration {
        self.search_timeout
    }

    /// Quotes every platform for `items`, one entry per platform in configuration order.
    ///
    /// Platform futures are joined in place rather than spawned, so dropping the
    /// returned future cancels every in-flight search and releases its session.
    /// A platform that fails or exceeds the timeout yields an incomplete quote;
    /// it never fails the batch.
    pub async fn collect_quotes(
        &self,
        items: &[Item],
        priority: DeliveryPriority,
        correlation_id: &str,
    ) -> PlatformQuotes {
        let timeout_ms = duration_ms(self.search_timeout);
        let tasks = self.registry.clients().iter().map(|client| {
            let client = Arc::clone(client);
            async move {
                match timeout(self.search_timeout, quote_platform(client.as_ref(), items, priority))
                    .await
                {
                    Ok(Ok(quote)) => quote,
                    Ok(Err(error)) => {
                        warn!(
                            event_name = "aggregator.platform_unavailable",
                            correlation_id,
                            platform = %client.id(),
                            error = %error,
                            "platform search failed; recording incomplete quote"
                        );
                        PlatformQuote::failed(
                            client.id().clone(),
                            client.delivery_terms(),
                            items,
                            QuoteIssue::Unavailable { reason: unavailable_reason(error) },
                        )
                    }
                    Err(_) => {
                        warn!(
                            event_name = "aggregator.platform_timed_out",
                            correlation_id,
                            platform = %client.id(),
                            timeout_ms,
                            "platform search exceeded timeout"
                        );
                        PlatformQuote::failed(
                            client.id().clone(),
                            client.delivery_terms(),
                            items,
                            QuoteIssue::TimedOut { after_ms: timeout_ms },
                        )
                    }
                }
            }
        });

        let quotes = PlatformQuotes::new(join_all(tasks).await);
        info!(
            event_name = "aggregator.quotes_collected",
            correlation_id,
            platforms = quotes.len(),
            complete = quotes.iter().filter(|quote| quote.complete).count(),
            item_count = items.len(),
            "catalog aggregation completed"
        );
        quotes
    }
}

async fn quote_platform(
    client: &dyn PlatformClient,
    items: &[Item],
    priority: DeliveryPriority,
) -> Result<PlatformQuote, PlatformError> {
    let mut resolved = Vec::with_capacity(items.len());
    let mut unresolved = Vec::new();

    for item in items {
        let candidates = client.search(item).await?;
        match select_candidate(&candidates, priority) {
            Some(candidate) => {
                debug!(
                    event_name = "aggregator.item_resolved",
                    platform = %client.id(),
                    item = %item,
                    product = %candidate.name,
                    unit_price = %candidate.unit_price,
                    "item resolved"
                );
                resolved.push(QuotedItem { item: item.clone(), candidate: candidate.clone() });
            }
            None => unresolved.push(item.clone()),
        }
    }

    Ok(PlatformQuote::from_resolution(
        client.id().clone(),
        client.delivery_terms(),
        resolved,
        unresolved,
    ))
}

/// Best available candidate for one item under `priority`.
///
/// Delivery time is platform-wide, so `fastest` picks products the same way as
/// `best_rated`. Names break the remaining ties to keep the pick deterministic.
pub fn select_candidate(
    candidates: &[ProductCandidate],
    priority: DeliveryPriority,
) -> Option<&ProductCandidate> {
    candidates.iter().filter(|candidate| candidate.available).min_by(|left, right| {
        let primary = match priority {
            DeliveryPriority::Cheapest => left
                .unit_price
                .cmp(&right.unit_price)
                .then_with(|| right.rating.cmp(&left.rating)),
            DeliveryPriority::BestRated | DeliveryPriority::Fastest => right
                .rating
                .cmp(&left.rating)
                .then_with(|| left.unit_price.cmp(&right.unit_price)),
        };
        match primary {
            Ordering::Equal => left.name.cmp(&right.name),
            other => other,
        }
    })
}

fn unavailable_reason(error: PlatformError) -> String {
    match error {
        PlatformError::Unavailable { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
