//! quotamap CLI: replay budget scenarios and probe value sizes.

mod json;
mod scenario;

use clap::{Parser, Subcommand};
use quotamap_core::config::QuotaConfig;
use quotamap_mem::Quota;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::scenario::{apply_scenario_config, parse_scenario, run_scenario, Report};

#[derive(Parser)]
#[command(name = "quotamap")]
#[command(about = "Quota-enforcing nested containers: scenario runner and size probe", long_about = None)]
struct Cli {
    /// Log filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario YAML file and print every step and the final budgets
    Run {
        /// Path to the scenario YAML file
        #[arg(short, long)]
        script: PathBuf,

        /// Reject unpriced value kinds (overrides config)
        #[arg(long)]
        strict_kinds: bool,

        /// Maximum for budgets declared without one (overrides config)
        #[arg(long)]
        default_max: Option<u64>,
    },

    /// Estimate the cost of a JSON value
    Size {
        /// Path to a JSON file
        #[arg(short, long)]
        value: PathBuf,

        /// Price nested containers too
        #[arg(short, long)]
        recursive: bool,
    },

    /// Validate a scenario YAML file (syntax and budget names)
    Validate {
        /// Path to the scenario YAML file
        #[arg(short, long)]
        script: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Commands::Run {
            script,
            strict_kinds,
            default_max,
        } => {
            if let Err(e) = run(&script, strict_kinds, default_max) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Size { value, recursive } => {
            if let Err(e) = size(&value, recursive) {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }
        Commands::Validate { script } => {
            if let Err(e) = validate(&script) {
                eprintln!("Validation failed: {}", e);
                std::process::exit(1);
            }
            println!("✓ Scenario is valid");
        }
    }
}

fn run(
    script: &PathBuf,
    strict_kinds: bool,
    default_max: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let src = fs::read_to_string(script)?;
    let scenario = parse_scenario(&src)?;

    let mut config = QuotaConfig::from_env();
    apply_scenario_config(&mut config, &scenario.config);
    if strict_kinds {
        config.strict_kinds = true;
    }
    if let Some(max) = default_max {
        config.default_max_bytes = max;
    }

    let report = run_scenario(&scenario, config)?;
    print_report(&report)?;
    Ok(())
}

fn print_report(report: &Report) -> Result<(), Box<dyn std::error::Error>> {
    println!("Steps");
    println!("=====");
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(delta) => println!("  {}. {} -> {:+}", outcome.step, outcome.label, delta),
            Err(e) => println!("  {}. {} -> error: {}", outcome.step, outcome.label, e),
        }
    }
    println!();
    println!("Budgets");
    println!("=======");
    for b in &report.budgets {
        println!(
            "  {} ({:?}): {} / {} bytes, effective {}, peak {}",
            b.name,
            b.stats.state,
            b.stats.own_size,
            b.stats.max_size,
            b.stats.effective_size,
            b.stats.peak_size
        );
        if let Some(contents) = &b.contents {
            println!("    {}", serde_json::to_string(contents)?);
        }
    }
    Ok(())
}

fn size(path: &PathBuf, recursive: bool) -> Result<(), Box<dyn std::error::Error>> {
    let src = fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&src)?;
    let mut quota = Quota::new(QuotaConfig::from_env())?;
    let v = quota.import(&json::to_plain(&value))?;
    let bytes = quota.size_of(&v, recursive)?;
    println!("{} bytes", bytes);
    Ok(())
}

fn validate(script: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let src = fs::read_to_string(script)?;
    let _ = parse_scenario(&src)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn log_level_is_global() {
        let cli = Cli::parse_from([
            "quotamap",
            "size",
            "--value",
            "v.json",
            "--log-level",
            "debug",
            "-r",
        ]);
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::Size { recursive: true, .. }));
    }

    #[test]
    fn recursive_size_covers_nested_bodies() {
        let mut quota = Quota::default();
        let v = quota
            .import(&json::to_plain(&serde_json::json!({"a": [true]})))
            .unwrap();
        assert_eq!(quota.size_of(&v, false).unwrap(), 40);
        // root: header + "a" entry; inner: header + [1] = true
        assert_eq!(
            quota.size_of(&v, true).unwrap(),
            40 + (16 + 1) + 40 + (16 + 8 + 1)
        );
    }
}
