//! Offline analysis CLI for manetsim runs.
//!
//! Detects malicious nodes from node statistics and writes banlists for a
//! follow-up mitigation run, or compares every run in the PDR results log.

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Context, Result};

use manetsim::analysis::{self, comparison};

#[derive(Parser)]
#[command(name = "manet-analyzer")]
#[command(about = "Detection and comparison for manetsim runs")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output directory for banlists and reports
    #[arg(short, long, default_value = "scratch/ai_out")]
    output: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect malicious nodes and write banlists
    Detect {
        /// Node stats CSV to analyze (defaults to nodes_stats.csv in the output directory)
        #[arg(long)]
        stats: Option<PathBuf>,
    },

    /// Compare attack and mitigation runs against the baseline
    Compare {
        /// PDR results log (defaults to pdr_results.txt in the output directory)
        #[arg(long)]
        results: Option<PathBuf>,

        /// Also write the comparison as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("Failed to create output directory: {}", cli.output.display()))?;

    match cli.command {
        Commands::Detect { stats } => {
            let stats = stats.unwrap_or_else(|| cli.output.join("nodes_stats.csv"));
            let report = analysis::run_detection(&stats, &cli.output)?;

            println!("\n=== DETECTION SUMMARY ===\n");
            println!("Scenario: {:?}", report.scenario);
            println!(
                "Known: {} blackholes, {} wormholes",
                report.known_blackholes.len(),
                report.known_wormholes.len()
            );
            println!("Blackhole banlist: {:?}", report.blackhole_banlist);
            println!("Wormhole banlist: {:?}", report.wormhole_banlist);
            println!(
                "Total banned: {} nodes ({:.1}%)",
                report.banlist.len(),
                report.ban_ratio * 100.0
            );
            if report.safety_fallback {
                println!("Ban ratio limit hit; only known nodes were banned");
            }
            println!();
        }
        Commands::Compare { results, json } => {
            let results = results.unwrap_or_else(|| cli.output.join("pdr_results.txt"));
            let runs = analysis::read_pdr_log(&results)?;
            let report = analysis::compare(&runs);

            println!("{}", comparison::format_text_report(&report));
            comparison::write_text_report(&report, &cli.output.join("comparison.txt"))?;
            if json {
                comparison::write_json_report(&report, &cli.output.join("comparison.json"))?;
            }
        }
    }

    Ok(())
}
