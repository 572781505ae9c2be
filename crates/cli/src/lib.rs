pub mod commands;

use clap::{Parser, Subcommand};
use quickpick_core::domain::preference::DeliveryPriority;
use rust_decimal::Decimal;
use std::process::ExitCode;

use crate::commands::compare::CompareArgs;

#[derive(Debug, Parser)]
#[command(
    name = "quickpick",
    about = "QuickPick operator CLI",
    long_about = "Compare grocery baskets across quick-commerce platforms, inspect configuration \
                  and run readiness checks.",
    after_help = "Examples:\n  quickpick compare milk \"2 x bread\" --priority cheapest\n  \
                  quickpick config\n  quickpick smoke"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Compare a basket across every enabled platform without ordering")]
    Compare {
        #[arg(required = true, help = "Items to compare, e.g. `milk` or `2 x bread`")]
        items: Vec<String>,
        #[arg(long, help = "Override the delivery priority (fastest|cheapest|best_rated)")]
        priority: Option<DeliveryPriority>,
        #[arg(long, help = "Override the maximum acceptable delivery time in minutes")]
        max_delivery_minutes: Option<u32>,
        #[arg(long, help = "Override the minimum average product rating (0-5)")]
        quality_threshold: Option<Decimal>,
        #[arg(long, help = "Use the offline simulated catalog instead of live storefronts")]
        simulated: bool,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Run end-to-end readiness checks with per-check timing details")]
    Smoke,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Compare {
            items,
            priority,
            max_delivery_minutes,
            quality_threshold,
            simulated,
        } => commands::compare::run(CompareArgs {
            items,
            priority,
            max_delivery_minutes,
            quality_threshold,
            simulated,
        }),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Smoke => commands::smoke::run(),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
