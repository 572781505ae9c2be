//! One-shot basket comparison from the command line. Never places an order.

use quickpick_core::aggregator::CatalogAggregator;
use quickpick_core::config::{AppConfig, ConfigOverrides, LoadOptions, PlatformDriver};
use quickpick_core::domain::catalog::Item;
use quickpick_core::domain::preference::DeliveryPriority;
use quickpick_core::domain::recommendation::{PlatformBreakdown, Recommendation};
use quickpick_core::errors::ApplicationError;
use quickpick_core::optimizer::DealOptimizer;
use quickpick_platforms::build_registry;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::CommandResult;

const COMMAND: &str = "compare";

#[derive(Clone, Debug, Default)]
pub struct CompareArgs {
    pub items: Vec<String>,
    pub priority: Option<DeliveryPriority>,
    pub max_delivery_minutes: Option<u32>,
    pub quality_threshold: Option<Decimal>,
    pub simulated: bool,
}

#[derive(Debug, Serialize)]
struct CompareReport<'a> {
    command: &'static str,
    status: &'static str,
    best_platform: &'a str,
    priority: DeliveryPriority,
    savings: Decimal,
    partial: bool,
    filters_relaxed: bool,
    summary: &'a str,
    platforms: Vec<PlatformLine<'a>>,
}

#[derive(Debug, Serialize)]
struct PlatformLine<'a> {
    platform: &'a str,
    total: Decimal,
    delivery_time_minutes: u32,
    average_rating: Decimal,
    resolved_items: usize,
    complete: bool,
    eligible: bool,
    excluded_reason: Option<&'a str>,
    issue: Option<&'a str>,
}

pub fn run(args: CompareArgs) -> CommandResult {
    let options = LoadOptions {
        overrides: ConfigOverrides {
            platform_driver: args.simulated.then_some(PlatformDriver::Simulated),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("config validation failed: {error}"),
                2,
            )
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            )
        }
    };

    match runtime.block_on(compare(&config, &args)) {
        Ok(recommendation) => render(&recommendation),
        Err(error) => {
            let (error_class, exit_code) = classify(&error);
            CommandResult::failure(COMMAND, error_class, error.to_string(), exit_code)
        }
    }
}

async fn compare(
    config: &AppConfig,
    args: &CompareArgs,
) -> Result<Recommendation, ApplicationError> {
    if args.items.is_empty() {
        return Err(ApplicationError::InvalidRequest("at least one item is required".to_string()));
    }
    let items = args.items.iter().map(|raw| Item::parse(raw)).collect::<Result<Vec<_>, _>>()?;

    let mut policy = config.preferences.clone();
    if let Some(priority) = args.priority {
        policy.delivery_priority = priority;
    }
    if let Some(minutes) = args.max_delivery_minutes {
        policy.max_delivery_time_minutes = minutes;
    }
    if let Some(threshold) = args.quality_threshold {
        policy.quality_threshold = threshold;
    }
    policy.validate()?;

    let registry = build_registry(config)?;
    let aggregator = CatalogAggregator::new(registry, config.search_timeout());
    let quotes = aggregator.collect_quotes(&items, policy.delivery_priority, "cli-compare").await;
    DealOptimizer::new().recommend(&quotes, &policy)
}

fn classify(error: &ApplicationError) -> (&'static str, u8) {
    match error {
        ApplicationError::Domain(_) | ApplicationError::InvalidRequest(_) => ("invalid_request", 3),
        ApplicationError::Configuration(_) => ("config_validation", 2),
        ApplicationError::NoEligibleQuote | ApplicationError::Platform(_) => {
            ("no_eligible_quote", 4)
        }
        ApplicationError::OrderNotFound(_) => ("not_found", 4),
    }
}

fn render(recommendation: &Recommendation) -> CommandResult {
    let mut lines = vec![recommendation.summary.clone()];
    lines.extend(recommendation.breakdown.iter().map(human_line));

    let report = CompareReport {
        command: COMMAND,
        status: "ok",
        best_platform: recommendation.best_platform.as_str(),
        priority: recommendation.priority,
        savings: recommendation.savings,
        partial: recommendation.partial,
        filters_relaxed: recommendation.filters_relaxed,
        summary: &recommendation.summary,
        platforms: recommendation
            .breakdown
            .iter()
            .map(|entry| PlatformLine {
                platform: entry.platform.as_str(),
                total: entry.total,
                delivery_time_minutes: entry.delivery_time_minutes,
                average_rating: entry.average_rating,
                resolved_items: entry.items.len(),
                complete: entry.complete,
                eligible: entry.eligible,
                excluded_reason: entry.excluded_reason.as_deref(),
                issue: entry.issue.as_deref(),
            })
            .collect(),
    };

    CommandResult::report(COMMAND, lines, &report, 0)
}

fn human_line(entry: &PlatformBreakdown) -> String {
    let mut line = format!(
        "- {}: total {} ({} min, rating {})",
        entry.platform, entry.total, entry.delivery_time_minutes, entry.average_rating
    );
    if let Some(reason) = &entry.excluded_reason {
        line.push_str(&format!(" [excluded: {reason}]"));
    }
    line
}
