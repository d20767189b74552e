//! CLI entry point for the combat metrics simulator

use clap::{Parser, ValueEnum};
use combat_metrics_lib::{
    config::{EncounterConfig, RunOptions},
    report::SimReport,
    simulation::run_and_report,
    DistributionReport,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::filter::EnvFilter;

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "combat-metrics")]
#[command(version = "0.1")]
#[command(about = "Monte Carlo combat encounter statistics", long_about = None)]
struct Args {
    /// Path to the encounter file (YAML or JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Number of iterations to run
    #[arg(short = 'n', long, default_value = "1000")]
    iterations: usize,

    /// Seed of the first iteration; iteration i uses seed + i
    #[arg(short, long, default_value = "0")]
    seed: i64,

    /// Use parallel processing
    #[arg(short, long, default_value = "false")]
    parallel: bool,

    /// Keep every per-iteration value in the report
    #[arg(long, default_value = "false")]
    save_all_values: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: OutputFormat,

    /// Show timing information
    #[arg(short, long, default_value = "false")]
    timing: bool,
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn print_distribution(label: &str, d: &DistributionReport) {
    println!(
        "  {label:<8} {:>10.2} ± {:<9.2} min {:>10.2} (seed {}) max {:>10.2} (seed {})",
        d.avg, d.stdev, d.min, d.min_seed, d.max, d.max_seed
    );
}

fn print_text(report: &SimReport) {
    println!("=== Combat Metrics ===");
    println!("Iterations: {}", report.iterations);
    println!(
        "Encounter duration: {:.1}s ± {:.1}s",
        report.duration_secs_avg, report.duration_secs_stdev
    );

    for unit in &report.units {
        println!();
        println!("--- {} ---", unit.name);
        print_distribution("DPS", &unit.dps);
        print_distribution("HPS", &unit.hps);
        print_distribution("TPS", &unit.threat);
        print_distribution("DTPS", &unit.dtps);
        if unit.tmi.avg != 0.0 {
            print_distribution("TMI", &unit.tmi);
        }
        if unit.tto.avg != 0.0 {
            print_distribution("TTO", &unit.tto);
            println!("  Avg seconds OOM: {:.2}", unit.seconds_oom_avg);
        }
        println!("  Chance of death: {:.2}%", unit.chance_of_death * 100.0);

        for action in &unit.actions {
            let casts: i32 = action.targets.iter().map(|t| t.casts).sum();
            let damage: f64 = action.targets.iter().map(|t| t.damage).sum();
            let healing: f64 = action.targets.iter().map(|t| t.healing).sum();
            println!(
                "  {:<16} casts {:>8} damage {:>14.0} healing {:>14.0}",
                action.id.to_string(),
                casts,
                damage,
                healing
            );
        }
        for aura in &unit.auras {
            println!(
                "  aura {:<11} uptime {:>7.2}s procs {:>7.2}",
                aura.id.to_string(),
                aura.uptime_seconds_avg,
                aura.procs_avg
            );
        }
    }
}

fn main() {
    init_logging();
    let args = Args::parse();

    let config = match EncounterConfig::from_file(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "could not load encounter");
            std::process::exit(1);
        }
    };

    let options = RunOptions {
        iterations: args.iterations,
        random_seed: args.seed,
        save_all_values: args.save_all_values,
        parallel: args.parallel,
    };

    let start = Instant::now();
    let report = match run_and_report(&config, &options) {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "simulation failed");
            std::process::exit(1);
        }
    };
    let elapsed = start.elapsed();

    match args.output {
        OutputFormat::Text => {
            print_text(&report);
            if args.timing {
                println!();
                println!("--- Performance ---");
                println!("Total time: {:.3}s", elapsed.as_secs_f64());
                println!(
                    "Per iteration: {:.3}ms",
                    elapsed.as_secs_f64() * 1000.0 / args.iterations.max(1) as f64
                );
            }
        }
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => {
                tracing::error!(error = %e, "could not serialize report");
                std::process::exit(1);
            }
        },
    }
}
