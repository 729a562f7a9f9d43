//! Hostile behaviors described as data.
//!
//! Each hostile node gets a [`HostileApp`]: which behavior it plays and the
//! flood streams it emits. The simulation adapter interprets these
//! descriptions; no per-behavior types are needed on that side.

use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::types::{MaliciousRoleSet, NodeId};

/// Hostile apps start shortly after the simulation begins
pub const HOSTILE_START: Duration = Duration::from_secs(1);

const BLACKHOLE_STREAMS: u32 = 3;
const BLACKHOLE_PORT: u16 = 9999;
const BLACKHOLE_RATE_BPS: u64 = 500_000;
const BLACKHOLE_PACKET_SIZE: u32 = 1000;

const WORMHOLE_STREAMS: u32 = 5;
const WORMHOLE_BASE_PORT: u16 = 8888;
const WORMHOLE_RATE_BPS: u64 = 1_000_000;
const WORMHOLE_PACKET_SIZE: u32 = 500;

const BROADCAST_PORT: u16 = 9990;
const BROADCAST_RATE_BPS: u64 = 800_000;
const BROADCAST_PACKET_SIZE: u32 = 200;

/// What a hostile node does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum HostileBehavior {
    Blackhole,
    Wormhole { partner: NodeId },
}

/// Destination of a flood stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloodTarget {
    Node(NodeId),
    Broadcast,
}

/// One constant-rate flood generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FloodStream {
    pub target: FloodTarget,
    pub port: u16,
    pub data_rate_bps: u64,
    pub packet_size: u32,
    #[serde(with = "humantime_serde")]
    pub start: Duration,
    #[serde(with = "humantime_serde")]
    pub on_time: Duration,
    #[serde(with = "humantime_serde")]
    pub off_time: Duration,
}

/// Hostile behavior installed on one node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostileApp {
    pub node: NodeId,
    #[serde(flatten)]
    pub behavior: HostileBehavior,
    pub streams: Vec<FloodStream>,
}

/// Build hostile apps for every role member that is not banned.
///
/// Banned nodes stay quarantined but passive, which is what separates a
/// mitigation run from its attack run.
pub fn plan_hostile_apps<R: Rng + ?Sized>(
    roles: &MaliciousRoleSet,
    node_count: u32,
    rng: &mut R,
) -> Vec<HostileApp> {
    let mut apps = Vec::new();

    for &node in &roles.blackholes {
        if roles.banned.contains(&node) {
            continue;
        }
        apps.push(HostileApp {
            node,
            behavior: HostileBehavior::Blackhole,
            streams: blackhole_streams(node, node_count, rng),
        });
    }

    for pair in &roles.wormhole_pairs {
        for (node, partner) in [(pair.first, pair.second), (pair.second, pair.first)] {
            if roles.banned.contains(&node) {
                continue;
            }
            apps.push(HostileApp {
                node,
                behavior: HostileBehavior::Wormhole { partner },
                streams: wormhole_streams(node, partner, node_count, rng),
            });
        }
    }

    info!("Planned {} hostile apps", apps.len());
    apps
}

fn blackhole_streams<R: Rng + ?Sized>(node: NodeId, node_count: u32, rng: &mut R) -> Vec<FloodStream> {
    let mut streams = Vec::new();
    for i in 0..BLACKHOLE_STREAMS {
        let target = rng.gen_range(0..node_count);
        // a draw that lands on the node itself just loses that stream
        if target == node {
            debug!("Blackhole {} drew itself for stream {}", node, i);
            continue;
        }
        streams.push(FloodStream {
            target: FloodTarget::Node(target),
            port: BLACKHOLE_PORT,
            data_rate_bps: BLACKHOLE_RATE_BPS,
            packet_size: BLACKHOLE_PACKET_SIZE,
            start: Duration::from_millis(2000 + 500 * u64::from(i)),
            on_time: Duration::from_secs(1),
            off_time: Duration::ZERO,
        });
    }
    streams
}

fn wormhole_streams<R: Rng + ?Sized>(
    node: NodeId,
    partner: NodeId,
    node_count: u32,
    rng: &mut R,
) -> Vec<FloodStream> {
    let mut streams = Vec::new();
    for i in 0..WORMHOLE_STREAMS {
        let target = if i == 0 {
            partner
        } else {
            rng.gen_range(0..node_count)
        };
        if target == node {
            continue;
        }
        streams.push(FloodStream {
            target: FloodTarget::Node(target),
            port: WORMHOLE_BASE_PORT + i as u16,
            data_rate_bps: WORMHOLE_RATE_BPS,
            packet_size: WORMHOLE_PACKET_SIZE,
            start: Duration::from_millis(1000 + 300 * u64::from(i)),
            on_time: Duration::from_secs(1),
            off_time: Duration::ZERO,
        });
    }

    streams.push(FloodStream {
        target: FloodTarget::Broadcast,
        port: BROADCAST_PORT,
        data_rate_bps: BROADCAST_RATE_BPS,
        packet_size: BROADCAST_PACKET_SIZE,
        start: Duration::from_millis(2500),
        on_time: Duration::from_secs(2),
        off_time: Duration::from_secs(1),
    });
    streams
}
