//! Post-run aggregation of simulator counters.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::nse::{FlowRecord, ForwardingCounter, NodeAddressing};
use crate::scenario::{MaliciousRoleSet, NodeId, NodeRole};

/// Counters and reported role of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStats {
    pub node_id: NodeId,
    pub address: Ipv4Addr,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub fwd_packets: u64,
    pub role: NodeRole,
}

/// Run-level totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_tx: u64,
    pub total_rx: u64,
    pub pdr: f64,
    pub active_flow_count: usize,
    pub role_counts: BTreeMap<NodeRole, usize>,
}

/// Everything the aggregator derives from one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatistics {
    pub nodes: Vec<NodeStats>,
    pub summary: RunSummary,
}

/// `rx / tx`, or 0 when nothing was sent
pub fn packet_delivery_ratio(total_tx: u64, total_rx: u64) -> f64 {
    if total_tx == 0 {
        0.0
    } else {
        total_rx as f64 / total_tx as f64
    }
}

/// Owns the forwarding counter for a run and turns counters into stats
#[derive(Debug)]
pub struct MetricsAggregator<'a> {
    addressing: NodeAddressing,
    roles: &'a MaliciousRoleSet,
    forwarding: ForwardingCounter,
}

impl<'a> MetricsAggregator<'a> {
    pub fn new(addressing: NodeAddressing, roles: &'a MaliciousRoleSet) -> Self {
        Self {
            addressing,
            roles,
            forwarding: ForwardingCounter::new(addressing.node_count()),
        }
    }

    /// Counter to lend to the simulator for the duration of the run
    pub fn forwarding_mut(&mut self) -> &mut ForwardingCounter {
        &mut self.forwarding
    }

    pub fn forwarding(&self) -> &ForwardingCounter {
        &self.forwarding
    }

    /// Build per-node stats and the run summary.
    ///
    /// Totals cover every flow record. Per-node tx/rx only count flows
    /// whose source/destination address belongs to a node of this network.
    pub fn aggregate(&self, flows: &[FlowRecord], active_flow_count: usize) -> RunStatistics {
        let node_count = self.addressing.node_count();
        let mut tx = vec![0u64; node_count as usize];
        let mut rx = vec![0u64; node_count as usize];
        let mut total_tx = 0u64;
        let mut total_rx = 0u64;

        for flow in flows {
            total_tx += flow.tx_packets;
            total_rx += flow.rx_packets;

            match self.addressing.node_of(flow.source_address) {
                Some(node) => tx[node as usize] += flow.tx_packets,
                None => debug!("Flow source {} is not a node address", flow.source_address),
            }
            if let Some(node) = self.addressing.node_of(flow.destination_address) {
                rx[node as usize] += flow.rx_packets;
            }
        }

        let mut role_counts = BTreeMap::new();
        let mut nodes = Vec::with_capacity(node_count as usize);
        for node in 0..node_count {
            let role = self.roles.role_of(node);
            *role_counts.entry(role).or_insert(0) += 1;

            let Some(address) = self.addressing.address_of(node) else {
                continue;
            };
            nodes.push(NodeStats {
                node_id: node,
                address,
                tx_packets: tx[node as usize],
                rx_packets: rx[node as usize],
                fwd_packets: self.forwarding.get(node),
                role,
            });
        }

        let pdr = packet_delivery_ratio(total_tx, total_rx);
        info!("Tx={} Rx={} PDR={:.6}", total_tx, total_rx, pdr);

        RunStatistics {
            nodes,
            summary: RunSummary {
                total_tx,
                total_rx,
                pdr,
                active_flow_count,
                role_counts,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::WormholePair;

    fn addr(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(10, 1, 1, last)
    }

    fn flow(src: u8, dst: u8, tx: u64, rx: u64) -> FlowRecord {
        FlowRecord {
            source_address: addr(src),
            destination_address: addr(dst),
            tx_packets: tx,
            rx_packets: rx,
        }
    }

    #[test]
    fn test_pdr_bounds() {
        assert_eq!(packet_delivery_ratio(0, 0), 0.0);
        assert_eq!(packet_delivery_ratio(0, 5), 0.0);
        assert_eq!(packet_delivery_ratio(10, 10), 1.0);
        for (tx, rx) in [(1, 0), (7, 3), (1000, 999)] {
            let pdr = packet_delivery_ratio(tx, rx);
            assert!((0.0..=1.0).contains(&pdr));
        }
    }

    #[test]
    fn test_aggregate_maps_addresses_to_nodes() {
        let roles = MaliciousRoleSet::default();
        let addressing = NodeAddressing::new(Ipv4Addr::new(10, 1, 1, 0), 4);
        let mut aggregator = MetricsAggregator::new(addressing, &roles);
        aggregator.forwarding_mut().add(2, 9);

        let flows = vec![
            flow(1, 4, 10, 8),
            flow(1, 3, 5, 5),
            // foreign source still counts toward totals
            flow(99, 4, 4, 1),
        ];
        let stats = aggregator.aggregate(&flows, 2);

        assert_eq!(stats.summary.total_tx, 19);
        assert_eq!(stats.summary.total_rx, 14);
        assert_eq!(stats.nodes[0].tx_packets, 15);
        assert_eq!(stats.nodes[3].rx_packets, 9);
        assert_eq!(stats.nodes[2].rx_packets, 5);
        assert_eq!(stats.nodes[2].fwd_packets, 9);
        assert_eq!(stats.summary.active_flow_count, 2);
    }

    #[test]
    fn test_role_precedence_and_counts() {
        let roles = MaliciousRoleSet {
            blackholes: [0, 1].into_iter().collect(),
            wormhole_pairs: vec![WormholePair::new(1, 4)],
            banned: [1, 3].into_iter().collect(),
        };
        let addressing = NodeAddressing::new(Ipv4Addr::new(10, 1, 1, 0), 6);
        let aggregator = MetricsAggregator::new(addressing, &roles);
        let stats = aggregator.aggregate(&[], 0);

        let roles_by_node: Vec<NodeRole> = stats.nodes.iter().map(|n| n.role).collect();
        assert_eq!(
            roles_by_node,
            vec![
                NodeRole::Blackhole,
                NodeRole::Blackhole,
                NodeRole::Normal,
                NodeRole::Banned,
                NodeRole::Wormhole,
                NodeRole::Normal,
            ]
        );
        assert_eq!(stats.summary.role_counts[&NodeRole::Normal], 2);
        assert_eq!(stats.summary.role_counts[&NodeRole::Blackhole], 2);
        assert_eq!(stats.summary.pdr, 0.0);
    }
}
