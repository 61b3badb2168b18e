mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::scenarios::{HoldPeriodArgs, ScenariosArgs, SensitivityArgs};
use commands::underwriting::UnderwriteArgs;
use commands::waterfall::WaterfallArgs;

/// Real-estate underwriting and equity waterfall calculations
#[derive(Parser)]
#[command(
    name = "uw",
    version,
    about = "Real-estate underwriting and equity waterfall calculations",
    long_about = "A CLI for underwriting income-producing real estate with decimal precision. \
                  Projects cash flows, computes levered and unlevered returns, distributes \
                  equity through promote waterfalls, and runs scenarios, sensitivity grids \
                  and hold-period sweeps."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Project cash flows and returns for one deal
    Underwrite(UnderwriteArgs),
    /// Distribute cash flows through an LP/GP waterfall
    Waterfall(WaterfallArgs),
    /// Compare named scenarios against a base case
    Scenarios(ScenariosArgs),
    /// Two-way sensitivity grid over any pair of assumptions
    Sensitivity(SensitivityArgs),
    /// Returns for every exit year in a range
    HoldPeriod(HoldPeriodArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Underwrite(args) => commands::underwriting::run_underwrite(args),
        Commands::Waterfall(args) => commands::waterfall::run_waterfall(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::Sensitivity(args) => commands::scenarios::run_sensitivity(args),
        Commands::HoldPeriod(args) => commands::scenarios::run_hold_period(args),
        Commands::Version => {
            println!("uw {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
