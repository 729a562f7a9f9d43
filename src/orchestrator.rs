//! Run orchestration.
//!
//! This module drives one run end to end: load roles (generated or
//! reconstructed), verify them, plan hostile apps and benign flows, install
//! everything into a [`NetworkSimulator`], run it, aggregate the counters
//! and write the report files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use color_eyre::eyre::{Context, Result};
use log::info;

use crate::banlist::{read_banlist, read_wormhole_pairs, write_attack_banlists};
use crate::config::{AttackMode, Config, RunKind};
use crate::metrics::report::{
    append_pdr_result, stats_filename, write_node_stats, write_run_report, RunReport, GENERIC_NODE_STATS,
    PDR_RESULTS, RUN_SUMMARY,
};
use crate::metrics::{MetricsAggregator, PdrResult, RunStatistics};
use crate::nse::{
    install_hostile_app, sink_port, Destination, GeneratorSpec, NetworkSimulator, NodeAddressing,
    ScheduledEvent, TrafficClass,
};
use crate::scenario::{
    plan_hostile_apps, scenario_rng, ConsistencyVerifier, Diagnostic, Diagnostics, HostileApp,
    MaliciousRoleSet, MitigationReconstructor, NodeId, ScenarioBuilder, WormholePair,
};
use crate::traffic::{FlowSpec, TrafficFlowSynthesizer};

/// Sinks open this long after the simulation starts
pub const SINK_START: Duration = Duration::from_secs(5);

/// Benign generators alternate this on/off pattern
pub const BENIGN_ON_TIME: Duration = Duration::from_secs(3);
pub const BENIGN_OFF_TIME: Duration = Duration::from_secs(2);

/// Route rediscovery times in mitigation runs
pub const REDISCOVERY_TIMES: [Duration; 3] = [
    Duration::from_secs(20),
    Duration::from_secs(30),
    Duration::from_secs(40),
];

pub const SIMULATION_PLAN: &str = "simulation_plan.json";

/// Everything decided before the simulator runs
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub config: Config,
    pub run_kind: RunKind,
    pub roles: MaliciousRoleSet,
    pub hostile_apps: Vec<HostileApp>,
    pub flows: Vec<FlowSpec>,
    pub target_flows: usize,
    pub diagnostics: Diagnostics,
}

impl PreparedRun {
    pub fn output_dir(&self) -> &Path {
        &self.config.general.output_dir
    }

    pub fn addressing(&self) -> NodeAddressing {
        NodeAddressing::new(self.config.general.address_base, self.config.general.nodes)
    }
}

/// Decide roles, hostile apps and benign flows for a run.
///
/// Role selection, flood targeting and flow synthesis draw from one random
/// source seeded from the config, in that order.
pub fn prepare(config: &Config) -> PreparedRun {
    let node_count = config.general.nodes;
    let run_kind = config.run_kind();
    let mut diagnostics = Diagnostics::new();
    let mut rng = scenario_rng(config.general.seed);

    info!(
        "Preparing {} run: {} nodes, attack mode {}, seed {}",
        config.scenario_kind(),
        node_count,
        config.attack.mode,
        config.general.seed
    );

    let roles = match run_kind {
        RunKind::Attack => {
            ScenarioBuilder::from_config(config).build(BTreeSet::new(), &mut rng, &mut diagnostics)
        }
        RunKind::Mitigation => {
            let banned = load_banned(config, &mut diagnostics);
            let pairs = load_explicit_pairs(config, &mut diagnostics);
            MitigationReconstructor::from_config(config).reconstruct(banned, pairs, &mut diagnostics)
        }
    };

    ConsistencyVerifier::from_config(config).verify(run_kind, &roles, &mut diagnostics);

    let hostile_apps = plan_hostile_apps(&roles, node_count, &mut rng);

    let synthesizer = TrafficFlowSynthesizer::new(node_count, &config.traffic);
    let target_flows = synthesizer.target_flow_count();
    let flows = synthesizer.synthesize(&roles.malicious_nodes(), &mut rng, &mut diagnostics);

    PreparedRun {
        config: config.clone(),
        run_kind,
        roles,
        hostile_apps,
        flows,
        target_flows,
        diagnostics,
    }
}

/// Unreadable banlists degrade to an empty set
fn load_banned(config: &Config, diagnostics: &mut Diagnostics) -> BTreeSet<NodeId> {
    let Some(path) = &config.attack.banlist else {
        return BTreeSet::new();
    };
    match read_banlist(path, config.general.nodes, diagnostics) {
        Ok(banned) => banned,
        Err(e) => {
            diagnostics.record(Diagnostic::BanlistUnavailable {
                path: path.clone(),
                reason: e.to_string(),
            });
            BTreeSet::new()
        }
    }
}

fn load_explicit_pairs(config: &Config, diagnostics: &mut Diagnostics) -> Option<Vec<WormholePair>> {
    let path = config.attack.wormhole_pairs.as_ref()?;
    match read_wormhole_pairs(path, config.general.nodes) {
        Ok(pairs) => Some(pairs),
        Err(e) => {
            diagnostics.record(Diagnostic::BanlistUnavailable {
                path: path.clone(),
                reason: e.to_string(),
            });
            None
        }
    }
}

/// Install the prepared run into the simulator
pub fn install<S: NetworkSimulator + ?Sized>(prepared: &PreparedRun, sim: &mut S) -> Result<()> {
    let config = &prepared.config;
    let node_count = config.general.nodes;
    let traffic_stop = config.traffic_stop();
    let malicious = prepared.roles.malicious_nodes();

    for &node in &malicious {
        sim.disable_forwarding(node)
            .wrap_err_with(|| format!("Failed to disable forwarding on node {}", node))?;
    }
    info!("Forwarding disabled on {} malicious nodes", malicious.len());

    for app in &prepared.hostile_apps {
        install_hostile_app(sim, app)
            .wrap_err_with(|| format!("Failed to install hostile app on node {}", app.node))?;
    }

    if prepared.run_kind == RunKind::Mitigation && config.attack.mode != AttackMode::None {
        let normal: Vec<NodeId> = (0..node_count).filter(|&id| !prepared.roles.is_malicious(id)).collect();
        for at in REDISCOVERY_TIMES {
            for &node in &normal {
                sim.schedule(at, ScheduledEvent::RouteRediscovery { node })?;
            }
        }
        info!("Scheduled route rediscovery for {} normal nodes", normal.len());
    }

    for node in 0..node_count {
        sim.install_sink(node, sink_port(node), SINK_START, traffic_stop)?;
    }

    for flow in &prepared.flows {
        sim.install_generator(
            flow.src,
            GeneratorSpec {
                class: TrafficClass::Benign,
                destination: Destination::Node(flow.dst),
                port: sink_port(flow.dst),
                packet_size: config.traffic.packet_size,
                data_rate_bps: config.traffic.data_rate_bps,
                on_time: BENIGN_ON_TIME,
                off_time: BENIGN_OFF_TIME,
                start: flow.start,
                stop: Some(traffic_stop),
            },
        )
        .wrap_err_with(|| format!("Failed to install flow {} -> {}", flow.src, flow.dst))?;
    }

    for node in 0..node_count {
        sim.trace_forwarding(node)?;
    }

    Ok(())
}

/// Install, run and aggregate.
///
/// The forwarding counter belongs to the aggregator and is lent to the
/// simulator only for the duration of `run`.
pub fn execute<S: NetworkSimulator + ?Sized>(prepared: &PreparedRun, sim: &mut S) -> Result<RunStatistics> {
    install(prepared, sim)?;

    let mut aggregator = MetricsAggregator::new(prepared.addressing(), &prepared.roles);
    info!("Starting simulation");
    let flows = sim
        .run(prepared.config.general.sim_time, aggregator.forwarding_mut())
        .wrap_err("Simulation run failed")?;

    Ok(aggregator.aggregate(&flows, prepared.flows.len()))
}

/// Write the banlists of an attack run. A baseline leaves an empty combined
/// list; mitigation runs write nothing.
pub fn write_banlists(prepared: &PreparedRun) -> Result<Vec<PathBuf>> {
    if prepared.run_kind != RunKind::Attack {
        return Ok(Vec::new());
    }
    let dir = prepared.output_dir();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
    let written = write_attack_banlists(dir, prepared.config.attack.mode, &prepared.roles)?;
    Ok(written)
}

/// Write node stats, the PDR line, banlists and the JSON summary
pub fn persist(prepared: &PreparedRun, statistics: &RunStatistics) -> Result<PdrResult> {
    let config = &prepared.config;
    let dir = prepared.output_dir();
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    write_node_stats(
        &dir.join(stats_filename(config.attack.mode, prepared.run_kind)),
        &statistics.nodes,
    )?;
    write_node_stats(&dir.join(GENERIC_NODE_STATS), &statistics.nodes)?;

    let result = PdrResult::new(
        config.general.routing,
        config.scenario_kind(),
        config.attack.mode,
        config.general.nodes,
        &prepared.roles,
        &statistics.summary,
    );
    append_pdr_result(&dir.join(PDR_RESULTS), &result)?;

    write_banlists(prepared)?;

    let report = RunReport {
        generated_at: Utc::now(),
        result: &result,
        seed: config.general.seed,
        summary: &statistics.summary,
        blackholes: prepared.roles.blackholes.iter().copied().collect(),
        wormhole_pairs: &prepared.roles.wormhole_pairs,
        banned: prepared.roles.banned.iter().copied().collect(),
        diagnostics: &prepared.diagnostics,
    };
    write_run_report(&dir.join(RUN_SUMMARY), &report)?;

    info!(
        "Network: {} nodes, Flows: {}/{}",
        config.general.nodes, statistics.summary.active_flow_count, prepared.target_flows
    );
    info!("{}", result);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nse::{FlowRecord, ForwardingCounter};
    use crate::banlist::{BLACKHOLE_BANLIST, COMBINED_BANLIST};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[derive(Default)]
    struct CountingSimulator {
        disabled: Vec<NodeId>,
        sinks: usize,
        generators: BTreeMap<TrafficClass, usize>,
        scheduled: usize,
        traced: usize,
    }

    impl NetworkSimulator for CountingSimulator {
        fn disable_forwarding(&mut self, node: NodeId) -> Result<()> {
            self.disabled.push(node);
            Ok(())
        }
        fn install_sink(&mut self, _node: NodeId, _port: u16, _start: Duration, _stop: Duration) -> Result<()> {
            self.sinks += 1;
            Ok(())
        }
        fn install_generator(&mut self, _node: NodeId, generator: GeneratorSpec) -> Result<()> {
            *self.generators.entry(generator.class).or_insert(0) += 1;
            Ok(())
        }
        fn schedule(&mut self, _at: Duration, _event: ScheduledEvent) -> Result<()> {
            self.scheduled += 1;
            Ok(())
        }
        fn trace_forwarding(&mut self, _node: NodeId) -> Result<()> {
            self.traced += 1;
            Ok(())
        }
        fn run(&mut self, _stop: Duration, forwarding: &mut ForwardingCounter) -> Result<Vec<FlowRecord>> {
            forwarding.add(0, 3);
            Ok(Vec::new())
        }
    }

    fn blackhole_config() -> Config {
        let mut config = Config::default();
        config.attack.mode = AttackMode::Blackhole;
        config
    }

    #[test]
    fn test_prepare_is_deterministic() {
        let a = prepare(&blackhole_config());
        let b = prepare(&blackhole_config());
        assert_eq!(a.roles, b.roles);
        assert_eq!(a.flows, b.flows);
        assert_eq!(a.hostile_apps, b.hostile_apps);
    }

    #[test]
    fn test_install_attack_run() {
        let prepared = prepare(&blackhole_config());
        let mut sim = CountingSimulator::default();
        let stats = execute(&prepared, &mut sim).unwrap();

        assert_eq!(sim.disabled.len(), 3);
        assert_eq!(sim.sinks, 50);
        assert_eq!(sim.traced, 50);
        assert_eq!(sim.scheduled, 0);
        assert_eq!(sim.generators[&TrafficClass::Benign], prepared.flows.len());
        assert!(sim.generators[&TrafficClass::BlackholeFlood] > 0);
        assert_eq!(stats.nodes[0].fwd_packets, 3);
    }

    #[test]
    fn test_missing_banlist_degrades_to_empty() {
        let mut config = blackhole_config();
        config.attack.banlist = Some(PathBuf::from("/nonexistent/banlist.txt"));
        let prepared = prepare(&config);

        assert!(prepared.roles.banned.is_empty());
        assert!(prepared
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::BanlistUnavailable { .. })));

        // a mitigation run still schedules rediscovery for every normal node
        let mut sim = CountingSimulator::default();
        install(&prepared, &mut sim).unwrap();
        assert_eq!(sim.scheduled, 3 * 50);
        assert!(sim.generators.get(&TrafficClass::BlackholeFlood).is_none());
    }

    #[test]
    fn test_baseline_persist_leaves_empty_combined_banlist() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.general.output_dir = dir.path().to_path_buf();
        let prepared = prepare(&config);
        let stats = execute(&prepared, &mut CountingSimulator::default()).unwrap();
        persist(&prepared, &stats).unwrap();

        let combined = fs::read_to_string(dir.path().join(COMBINED_BANLIST)).unwrap();
        assert!(combined.is_empty());
        assert!(!dir.path().join(BLACKHOLE_BANLIST).exists());
    }

    #[test]
    fn test_mitigation_persist_writes_no_banlist() {
        let dir = TempDir::new().unwrap();
        let mut config = blackhole_config();
        config.general.output_dir = dir.path().to_path_buf();
        config.attack.banlist = Some(dir.path().join("attack_banlist.txt"));
        let prepared = prepare(&config);
        let stats = execute(&prepared, &mut CountingSimulator::default()).unwrap();
        persist(&prepared, &stats).unwrap();

        assert!(!dir.path().join(COMBINED_BANLIST).exists());
    }
}
