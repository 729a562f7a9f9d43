//! Adapter for a simulator that runs outside this process.
//!
//! [`ExternalSimulator`] records every setup call into a [`SimulationPlan`]
//! that can be written as JSON and handed to the simulator. After the
//! simulator has run, its counters are imported as [`NseCounters`] and
//! replayed through [`NetworkSimulator::run`], so the rest of the pipeline
//! does not care where the numbers came from.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{FlowRecord, ForwardingCounter, GeneratorSpec, NetworkSimulator, NodeAddressing, ScheduledEvent};
use crate::config::{AttackMode, Config, RoutingProtocol, ScenarioKind};
use crate::scenario::NodeId;

/// Counters produced by one external simulator run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NseCounters {
    pub flows: Vec<FlowRecord>,
    /// Forwarded packets indexed by node id
    #[serde(default)]
    pub forwarded: Vec<u64>,
}

impl NseCounters {
    /// Load counters from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .wrap_err_with(|| format!("Failed to open counters file {}", path.display()))?;
        let counters: NseCounters = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("Failed to parse counters file {}", path.display()))?;
        info!(
            "Loaded {} flow records and {} forwarding counters from {}",
            counters.flows.len(),
            counters.forwarded.len(),
            path.display()
        );
        Ok(counters)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedNode {
    pub id: NodeId,
    pub address: std::net::Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedSink {
    pub node: NodeId,
    pub port: u16,
    #[serde(with = "humantime_serde")]
    pub start: Duration,
    #[serde(with = "humantime_serde")]
    pub stop: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedGenerator {
    pub node: NodeId,
    #[serde(flatten)]
    pub spec: GeneratorSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedEvent {
    #[serde(with = "humantime_serde")]
    pub at: Duration,
    #[serde(flatten)]
    pub event: ScheduledEvent,
}

/// Complete simulator setup for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationPlan {
    pub generated_at: DateTime<Utc>,
    pub scenario: ScenarioKind,
    pub attack: AttackMode,
    pub routing: RoutingProtocol,
    /// Side of the square placement area in meters
    pub area: u32,
    pub seed: u64,
    #[serde(with = "humantime_serde")]
    pub stop_time: Duration,
    pub nodes: Vec<PlannedNode>,
    pub forwarding_disabled: Vec<NodeId>,
    pub sinks: Vec<PlannedSink>,
    pub generators: Vec<PlannedGenerator>,
    pub scheduled: Vec<PlannedEvent>,
    pub traced_nodes: Vec<NodeId>,
}

impl SimulationPlan {
    /// Write the plan as pretty JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = File::create(path)
            .wrap_err_with(|| format!("Failed to create simulation plan {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .wrap_err_with(|| format!("Failed to write simulation plan {}", path.display()))?;
        info!("Simulation plan written to {}", path.display());
        Ok(())
    }
}

/// Records setup into a plan and replays imported counters on `run`
#[derive(Debug)]
pub struct ExternalSimulator {
    addressing: NodeAddressing,
    plan: SimulationPlan,
    counters: Option<NseCounters>,
}

impl ExternalSimulator {
    pub fn new(config: &Config, counters: Option<NseCounters>) -> Self {
        let general = &config.general;
        let addressing = NodeAddressing::new(general.address_base, general.nodes);
        let nodes = (0..general.nodes)
            .filter_map(|id| addressing.address_of(id).map(|address| PlannedNode { id, address }))
            .collect();

        Self {
            addressing,
            plan: SimulationPlan {
                generated_at: Utc::now(),
                scenario: config.scenario_kind(),
                attack: config.attack.mode,
                routing: general.routing,
                area: general.area,
                seed: general.seed,
                stop_time: general.sim_time,
                nodes,
                forwarding_disabled: Vec::new(),
                sinks: Vec::new(),
                generators: Vec::new(),
                scheduled: Vec::new(),
                traced_nodes: Vec::new(),
            },
            counters,
        }
    }

    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    fn check_node(&self, node: NodeId) -> Result<()> {
        if node >= self.addressing.node_count() {
            color_eyre::eyre::bail!(
                "Node {} is outside the network of {} nodes",
                node,
                self.addressing.node_count()
            );
        }
        Ok(())
    }
}

impl NetworkSimulator for ExternalSimulator {
    fn disable_forwarding(&mut self, node: NodeId) -> Result<()> {
        self.check_node(node)?;
        self.plan.forwarding_disabled.push(node);
        Ok(())
    }

    fn install_sink(&mut self, node: NodeId, port: u16, start: Duration, stop: Duration) -> Result<()> {
        self.check_node(node)?;
        self.plan.sinks.push(PlannedSink { node, port, start, stop });
        Ok(())
    }

    fn install_generator(&mut self, node: NodeId, generator: GeneratorSpec) -> Result<()> {
        self.check_node(node)?;
        self.plan.generators.push(PlannedGenerator { node, spec: generator });
        Ok(())
    }

    fn schedule(&mut self, at: Duration, event: ScheduledEvent) -> Result<()> {
        self.plan.scheduled.push(PlannedEvent { at, event });
        Ok(())
    }

    fn trace_forwarding(&mut self, node: NodeId) -> Result<()> {
        self.check_node(node)?;
        self.plan.traced_nodes.push(node);
        Ok(())
    }

    fn run(&mut self, stop: Duration, forwarding: &mut ForwardingCounter) -> Result<Vec<FlowRecord>> {
        self.plan.stop_time = stop;

        let Some(counters) = self.counters.take() else {
            warn!("No simulator counters imported; run produces empty statistics");
            return Ok(Vec::new());
        };

        if counters.forwarded.len() != self.addressing.node_count() as usize {
            warn!(
                "Forwarding counters cover {} nodes, network has {}",
                counters.forwarded.len(),
                self.addressing.node_count()
            );
        }
        for (node, &packets) in counters.forwarded.iter().enumerate() {
            if let Ok(node) = NodeId::try_from(node) {
                forwarding.add(node, packets);
            }
        }

        Ok(counters.flows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nse::{Destination, TrafficClass};
    use std::io::Write;
    use std::net::Ipv4Addr;
    use tempfile::{NamedTempFile, TempDir};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.general.nodes = 4;
        config
    }

    #[test]
    fn test_setup_is_recorded() {
        let mut sim = ExternalSimulator::new(&small_config(), None);
        sim.disable_forwarding(2).unwrap();
        sim.install_sink(0, 9000, Duration::from_secs(5), Duration::from_secs(45))
            .unwrap();
        sim.install_generator(
            1,
            GeneratorSpec {
                class: TrafficClass::Benign,
                destination: Destination::Node(3),
                port: 9003,
                packet_size: 1024,
                data_rate_bps: 100_000,
                on_time: Duration::from_secs(3),
                off_time: Duration::from_secs(2),
                start: Duration::from_secs(10),
                stop: Some(Duration::from_secs(45)),
            },
        )
        .unwrap();
        sim.schedule(Duration::from_secs(20), ScheduledEvent::RouteRediscovery { node: 0 })
            .unwrap();
        sim.trace_forwarding(3).unwrap();

        let plan = sim.plan();
        assert_eq!(plan.nodes.len(), 4);
        assert_eq!(plan.nodes[3].address, Ipv4Addr::new(10, 1, 1, 4));
        assert_eq!(plan.forwarding_disabled, vec![2]);
        assert_eq!(plan.sinks.len(), 1);
        assert_eq!(plan.generators[0].node, 1);
        assert_eq!(plan.scheduled.len(), 1);
        assert_eq!(plan.traced_nodes, vec![3]);
    }

    #[test]
    fn test_unknown_node_is_rejected() {
        let mut sim = ExternalSimulator::new(&small_config(), None);
        assert!(sim.disable_forwarding(4).is_err());
    }

    #[test]
    fn test_run_replays_counters() {
        let counters = NseCounters {
            flows: vec![FlowRecord {
                source_address: Ipv4Addr::new(10, 1, 1, 1),
                destination_address: Ipv4Addr::new(10, 1, 1, 4),
                tx_packets: 10,
                rx_packets: 7,
            }],
            forwarded: vec![0, 5, 2, 0],
        };
        let mut sim = ExternalSimulator::new(&small_config(), Some(counters));
        let mut forwarding = ForwardingCounter::new(4);

        let flows = sim.run(Duration::from_secs(50), &mut forwarding).unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(forwarding.as_slice(), &[0, 5, 2, 0]);

        // counters are consumed by the first run
        let again = sim.run(Duration::from_secs(50), &mut ForwardingCounter::new(4)).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_run_without_counters_is_empty() {
        let mut sim = ExternalSimulator::new(&small_config(), None);
        let mut forwarding = ForwardingCounter::new(4);
        assert!(sim.run(Duration::from_secs(50), &mut forwarding).unwrap().is_empty());
        assert_eq!(forwarding.as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_load_counters_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"flows":[{{"source_address":"10.1.1.1","destination_address":"10.1.1.5","tx_packets":10,"rx_packets":9}}]}}"#
        )
        .unwrap();

        let counters = NseCounters::load(file.path()).unwrap();
        assert_eq!(counters.flows[0].rx_packets, 9);
        assert!(counters.forwarded.is_empty());
    }

    #[test]
    fn test_plan_written_as_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("simulation_plan.json");
        let sim = ExternalSimulator::new(&small_config(), None);
        sim.plan().write(&path).unwrap();

        let value: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(value["routing"], "AODV");
        assert_eq!(value["nodes"].as_array().map(Vec::len), Some(4));
    }
}
