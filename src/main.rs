use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use manetsim::config::{AttackMode, Config, RoutingProtocol};
use manetsim::config_loader::{self, CliOverrides};
use manetsim::nse::{ExternalSimulator, NseCounters};
use manetsim::orchestrator::{self, SIMULATION_PLAN};

/// Adversarial scenario engine for MANET routing experiments
#[derive(Parser, Debug)]
#[command(name = "manetsim", author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Select roles and flows and export the simulation plan
    Plan {
        #[command(flatten)]
        scenario: ScenarioArgs,
    },

    /// Import simulator counters and write statistics, PDR log and banlists
    Report {
        #[command(flatten)]
        scenario: ScenarioArgs,

        /// Counters JSON produced by the simulator for this plan
        #[arg(long)]
        counters: PathBuf,
    },
}

/// Scenario selection shared by all subcommands
#[derive(Args, Debug, Clone, Default)]
struct ScenarioArgs {
    /// Path to the scenario configuration YAML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of nodes
    #[arg(long)]
    nodes: Option<u32>,

    /// Simulated duration in seconds
    #[arg(long, value_parser = parse_seconds)]
    sim_time: Option<Duration>,

    /// Side of the placement area in meters
    #[arg(long)]
    area: Option<u32>,

    /// Routing protocol (AODV or OLSR)
    #[arg(long)]
    routing: Option<RoutingProtocol>,

    /// Attack mode (none, blackhole, wormhole)
    #[arg(long)]
    attack: Option<AttackMode>,

    /// Number of blackhole nodes
    #[arg(long)]
    blackholes: Option<u32>,

    /// Number of wormhole pairs
    #[arg(long)]
    wormholes: Option<u32>,

    /// Banlist from an attack run; makes this a mitigation run
    #[arg(long)]
    banlist: Option<PathBuf>,

    /// Wormhole pair file written by the attack run
    #[arg(long, requires = "banlist")]
    wormhole_pairs: Option<PathBuf>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for reports and banlists
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
}

impl ScenarioArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            nodes: self.nodes,
            sim_time: self.sim_time,
            area: self.area,
            routing: self.routing,
            attack: self.attack,
            blackholes: self.blackholes,
            wormholes: self.wormholes,
            banlist: self.banlist.clone(),
            wormhole_pairs: self.wormhole_pairs.clone(),
            seed: self.seed,
            output_dir: self.output_dir.clone(),
        }
    }

    fn load(&self) -> Result<Config> {
        let mut config = config_loader::load_or_default(self.config.as_deref())?;
        config_loader::apply_overrides(&mut config, &self.overrides())?;
        Ok(config)
    }
}

fn parse_seconds(value: &str) -> Result<Duration, String> {
    let seconds: f64 = value
        .trim_end_matches('s')
        .parse()
        .map_err(|_| format!("'{}' is not a number of seconds", value))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let scenario = match &cli.command {
        Command::Plan { scenario } | Command::Report { scenario, .. } => scenario,
    };
    let config = scenario.load()?;

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.general.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    info!(
        "{} run: {} nodes, {:?} simulated, attack {}",
        config.scenario_kind(),
        config.general.nodes,
        config.general.sim_time,
        config.attack.mode
    );
    info!("Output directory: {:?}", config.general.output_dir);

    let output_dir = config.general.output_dir.clone();
    fs::create_dir_all(&output_dir)
        .wrap_err_with(|| format!("Failed to create output directory '{}'", output_dir.display()))?;

    match cli.command {
        Command::Plan { .. } => {
            let prepared = orchestrator::prepare(&config);
            let mut simulator = ExternalSimulator::new(&config, None);
            orchestrator::install(&prepared, &mut simulator)?;

            let plan_path = output_dir.join(SIMULATION_PLAN);
            simulator.plan().write(&plan_path)?;
            for path in orchestrator::write_banlists(&prepared)? {
                info!("Banlist written to {}", path.display());
            }

            info!(
                "Planned {} hostile apps and {}/{} benign flows",
                prepared.hostile_apps.len(),
                prepared.flows.len(),
                prepared.target_flows
            );
            info!("Run the simulator on {:?}, then call `manetsim report --counters <file>`", plan_path);
        }
        Command::Report { counters, .. } => {
            let counters = NseCounters::load(&counters)?;
            let prepared = orchestrator::prepare(&config);
            let mut simulator = ExternalSimulator::new(&config, Some(counters));
            let statistics = orchestrator::execute(&prepared, &mut simulator)?;

            simulator.plan().write(&output_dir.join(SIMULATION_PLAN))?;
            let result = orchestrator::persist(&prepared, &statistics)?;
            println!("{}", result);
        }
    }

    info!("Done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_parsing() {
        let cli = Cli::parse_from([
            "manetsim",
            "plan",
            "--nodes",
            "20",
            "--attack",
            "wormhole",
            "--wormholes",
            "2",
            "--sim-time",
            "60",
        ]);

        let Command::Plan { scenario } = cli.command else {
            panic!("expected plan subcommand");
        };
        assert_eq!(scenario.nodes, Some(20));
        assert_eq!(scenario.attack, Some(AttackMode::Wormhole));
        assert_eq!(scenario.sim_time, Some(Duration::from_secs(60)));
        assert!(scenario.config.is_none());
    }

    #[test]
    fn test_report_parsing() {
        let cli = Cli::parse_from([
            "manetsim",
            "report",
            "--config",
            "scenario.yaml",
            "--banlist",
            "scratch/ai_out/banlist.txt",
            "--counters",
            "counters.json",
            "--log-level",
            "debug",
        ]);

        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Report { scenario, counters } = cli.command else {
            panic!("expected report subcommand");
        };
        assert_eq!(counters, PathBuf::from("counters.json"));
        assert_eq!(scenario.config, Some(PathBuf::from("scenario.yaml")));
        assert!(scenario.overrides().banlist.is_some());
    }

    #[test]
    fn test_pairs_require_banlist() {
        let result = Cli::try_parse_from(["manetsim", "plan", "--wormhole-pairs", "pairs.txt"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_seconds_parser() {
        assert_eq!(parse_seconds("50"), Ok(Duration::from_secs(50)));
        assert_eq!(parse_seconds("2.5s"), Ok(Duration::from_millis(2500)));
        assert!(parse_seconds("soon").is_err());
    }
}
