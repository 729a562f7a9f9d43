//! Boundary to the network simulation environment.
//!
//! Radio, MAC, routing and packet delivery all live in an external
//! simulator. The scenario engine only needs the narrow surface in
//! [`NetworkSimulator`]: disable forwarding, install sinks and generators,
//! schedule callbacks, trace forwarding, run, and read counters back.

pub mod addressing;
pub mod external;

use std::net::Ipv4Addr;
use std::time::Duration;

use color_eyre::Result;
use serde::{Deserialize, Serialize};

use crate::scenario::{FloodTarget, HostileApp, HostileBehavior, NodeId};

pub use addressing::NodeAddressing;
pub use external::{ExternalSimulator, NseCounters, SimulationPlan};

/// Every node listens on `SINK_BASE_PORT + id`
pub const SINK_BASE_PORT: u16 = 9000;

/// Sink port for `node`
pub fn sink_port(node: NodeId) -> u16 {
    SINK_BASE_PORT.saturating_add(u16::try_from(node).unwrap_or(u16::MAX))
}

/// Where a generator sends its packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    Node(NodeId),
    Broadcast,
}

impl From<FloodTarget> for Destination {
    fn from(target: FloodTarget) -> Self {
        match target {
            FloodTarget::Node(node) => Destination::Node(node),
            FloodTarget::Broadcast => Destination::Broadcast,
        }
    }
}

/// Why a generator exists; lets the simulator tell benign from hostile load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficClass {
    Benign,
    BlackholeFlood,
    WormholeFlood,
    WormholeBroadcast,
}

/// On/off UDP traffic generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorSpec {
    pub class: TrafficClass,
    pub destination: Destination,
    pub port: u16,
    pub packet_size: u32,
    pub data_rate_bps: u64,
    #[serde(with = "humantime_serde")]
    pub on_time: Duration,
    #[serde(with = "humantime_serde")]
    pub off_time: Duration,
    #[serde(with = "humantime_serde")]
    pub start: Duration,
    /// Runs until the end of the simulation when absent
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub stop: Option<Duration>,
}

/// Callbacks the simulator fires on its own clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScheduledEvent {
    /// Flush stale routes so the routing protocol rediscovers paths
    /// around quarantined nodes
    RouteRediscovery { node: NodeId },
}

/// Post-run counters for one source/destination flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub source_address: Ipv4Addr,
    pub destination_address: Ipv4Addr,
    pub tx_packets: u64,
    pub rx_packets: u64,
}

/// Per-node forwarded packet counts.
///
/// Lent mutably to [`NetworkSimulator::run`]; the simulator is the only
/// writer while it runs and the core only reads once `run` returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardingCounter {
    counts: Vec<u64>,
}

impl ForwardingCounter {
    pub fn new(node_count: u32) -> Self {
        Self {
            counts: vec![0; node_count as usize],
        }
    }

    /// Count one forwarded packet; ignores unknown nodes
    pub fn record(&mut self, node: NodeId) {
        self.add(node, 1);
    }

    pub fn add(&mut self, node: NodeId, packets: u64) {
        if let Some(count) = self.counts.get_mut(node as usize) {
            *count += packets;
        }
    }

    pub fn get(&self, node: NodeId) -> u64 {
        self.counts.get(node as usize).copied().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.counts
    }
}

/// Narrow interface to the external network simulator
pub trait NetworkSimulator {
    /// Stop `node` from forwarding packets for others
    fn disable_forwarding(&mut self, node: NodeId) -> Result<()>;

    /// Listen on `port` of `node` between `start` and `stop`
    fn install_sink(&mut self, node: NodeId, port: u16, start: Duration, stop: Duration) -> Result<()>;

    fn install_generator(&mut self, node: NodeId, generator: GeneratorSpec) -> Result<()>;

    fn schedule(&mut self, at: Duration, event: ScheduledEvent) -> Result<()>;

    /// Count packets `node` forwards into the counter passed to `run`
    fn trace_forwarding(&mut self, node: NodeId) -> Result<()>;

    /// Execute the run until `stop` and return per-flow counters
    fn run(&mut self, stop: Duration, forwarding: &mut ForwardingCounter) -> Result<Vec<FlowRecord>>;
}

/// Install one hostile app: every flood stream becomes a generator on the
/// hostile node. Forwarding is disabled separately for all malicious nodes.
pub fn install_hostile_app<S: NetworkSimulator + ?Sized>(sim: &mut S, app: &HostileApp) -> Result<()> {
    for stream in &app.streams {
        let class = match (app.behavior, stream.target) {
            (HostileBehavior::Blackhole, _) => TrafficClass::BlackholeFlood,
            (HostileBehavior::Wormhole { .. }, FloodTarget::Broadcast) => TrafficClass::WormholeBroadcast,
            (HostileBehavior::Wormhole { .. }, FloodTarget::Node(_)) => TrafficClass::WormholeFlood,
        };
        sim.install_generator(
            app.node,
            GeneratorSpec {
                class,
                destination: stream.target.into(),
                port: stream.port,
                packet_size: stream.packet_size,
                data_rate_bps: stream.data_rate_bps,
                on_time: stream.on_time,
                off_time: stream.off_time,
                start: stream.start,
                stop: None,
            },
        )?;
    }
    Ok(())
}
