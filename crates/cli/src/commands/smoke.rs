use std::time::Instant;

use crate::commands::CommandResult;
use quickpick_core::aggregator::CatalogAggregator;
use quickpick_core::config::{AppConfig, LoadOptions};
use quickpick_core::domain::catalog::Item;
use quickpick_core::optimizer::DealOptimizer;
use quickpick_platforms::build_registry;
use serde::Serialize;

const SMOKE_ITEM: &str = "milk";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    run_with(LoadOptions::default())
}

pub fn run_with(options: LoadOptions) -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(options)) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("platform_registry"));
            checks.push(skipped("catalog_search"));
            checks.push(skipped("recommendation"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let registry = match timed_check(|| build_registry(&config)) {
        Ok((elapsed_ms, registry)) => {
            let ids: Vec<String> = registry.ids().iter().map(ToString::to_string).collect();
            checks.push(SmokeCheck {
                name: "platform_registry",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: format!(
                    "{:?} driver with platforms: {}",
                    config.platforms.driver,
                    ids.join(", ")
                )
                .to_lowercase(),
            });
            registry
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "platform_registry",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("catalog_search"));
            checks.push(skipped("recommendation"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "catalog_search",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("recommendation"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let search_started = Instant::now();
    let aggregator = CatalogAggregator::new(registry, config.search_timeout());
    let basket = [Item::new(SMOKE_ITEM)];
    let quotes = runtime.block_on(aggregator.collect_quotes(
        &basket,
        config.preferences.delivery_priority,
        "cli-smoke",
    ));
    let answered = quotes.iter().filter(|quote| quote.complete).count();
    let unanswered: Vec<String> = quotes
        .iter()
        .filter_map(|quote| {
            quote.issue.as_ref().map(|issue| format!("{}: {}", quote.platform, issue.describe()))
        })
        .collect();
    checks.push(SmokeCheck {
        name: "catalog_search",
        status: if answered > 0 { SmokeStatus::Pass } else { SmokeStatus::Fail },
        elapsed_ms: search_started.elapsed().as_millis() as u64,
        message: if unanswered.is_empty() {
            format!("{answered}/{} platforms quoted `{SMOKE_ITEM}`", quotes.len())
        } else {
            format!(
                "{answered}/{} platforms quoted `{SMOKE_ITEM}` ({})",
                quotes.len(),
                unanswered.join("; ")
            )
        },
    });

    let recommendation_started = Instant::now();
    match DealOptimizer::new().recommend(&quotes, &config.preferences) {
        Ok(recommendation) => checks.push(SmokeCheck {
            name: "recommendation",
            status: SmokeStatus::Pass,
            elapsed_ms: recommendation_started.elapsed().as_millis() as u64,
            message: recommendation.summary,
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "recommendation",
            status: SmokeStatus::Fail,
            elapsed_ms: recommendation_started.elapsed().as_millis() as u64,
            message: error.to_string(),
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let lines = vec![report.summary.clone()];
    CommandResult::report("smoke", lines, &report, if failed { 6 } else { 0 })
}
