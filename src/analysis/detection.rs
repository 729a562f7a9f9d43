//! Heuristic malicious node detection from a node stats CSV.
//!
//! Nodes the run already labelled as hostile are always banned. On top of
//! that, a node still labelled NORMAL is flagged only on high-confidence
//! traffic anomalies, and only for the attack type the stats show. Ban
//! counts are capped so a noisy run cannot quarantine a large part of the
//! network.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{bail, eyre, Context, Result};
use log::{info, warn};
use serde::Serialize;

use super::stats::median;
use crate::banlist::{read_banlist, write_banlist, BLACKHOLE_BANLIST, COMBINED_BANLIST, WORMHOLE_BANLIST};
use crate::scenario::{Diagnostics, NodeId, NodeRole};

pub const DETECTED_REPORT: &str = "detected.json";

/// Nodes above this tx or rx count are considered active
const ACTIVITY_THRESHOLD: u64 = 15;
/// Anomaly detection needs more active nodes than this
const MIN_ACTIVE_NODES: usize = 15;
const MAX_SAFE_BAN_RATIO: f64 = 0.25;

/// One row of the node stats CSV
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub fwd_packets: u64,
    pub node_type: NodeRole,
}

/// Attack type visible in the stats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservedScenario {
    Baseline,
    Blackhole,
    Wormhole,
    Mixed,
}

/// Parse node stats CSV content. Columns are located by header name.
pub fn parse_node_stats(content: &str) -> Result<Vec<NodeRecord>> {
    let mut lines = content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or_else(|| eyre!("Node stats file is empty"))?;
    let columns: HashMap<&str, usize> = header
        .split(',')
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();
    let column = |name: &str| {
        columns
            .get(name)
            .copied()
            .ok_or_else(|| eyre!("Node stats header is missing column '{}'", name))
    };
    let (id_col, tx_col, rx_col, fwd_col, type_col) = (
        column("node_id")?,
        column("txPackets")?,
        column("rxPackets")?,
        column("fwdPackets")?,
        column("node_type")?,
    );

    let mut records = Vec::new();
    for (index, line) in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |col: usize| {
            fields
                .get(col)
                .copied()
                .ok_or_else(|| eyre!("Line {}: expected at least {} fields", index + 1, col + 1))
        };
        let number = |col: usize| -> Result<u64> {
            let value = field(col)?;
            value
                .parse()
                .map_err(|_| eyre!("Line {}: invalid number '{}'", index + 1, value))
        };

        let node_id = NodeId::try_from(number(id_col)?)
            .map_err(|_| eyre!("Line {}: node id out of range", index + 1))?;
        let node_type = field(type_col)?
            .parse::<NodeRole>()
            .map_err(|e| eyre!("Line {}: {}", index + 1, e))?;

        records.push(NodeRecord {
            node_id,
            tx_packets: number(tx_col)?,
            rx_packets: number(rx_col)?,
            fwd_packets: number(fwd_col)?,
            node_type,
        });
    }
    Ok(records)
}

pub fn read_node_stats(path: &Path) -> Result<Vec<NodeRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read node stats {}", path.display()))?;
    let records = parse_node_stats(&content)
        .with_context(|| format!("Failed to parse node stats {}", path.display()))?;
    info!("Loaded data for {} nodes", records.len());
    Ok(records)
}

fn ids_with_role(nodes: &[NodeRecord], role: NodeRole) -> Vec<NodeId> {
    nodes
        .iter()
        .filter(|n| n.node_type == role)
        .map(|n| n.node_id)
        .collect()
}

/// Attack type from the labelled hostile rows
pub fn infer_scenario(nodes: &[NodeRecord]) -> ObservedScenario {
    let blackholes = nodes.iter().any(|n| n.node_type == NodeRole::Blackhole);
    let wormholes = nodes.iter().any(|n| n.node_type == NodeRole::Wormhole);
    match (blackholes, wormholes) {
        (true, false) => ObservedScenario::Blackhole,
        (false, true) => ObservedScenario::Wormhole,
        (false, false) => ObservedScenario::Baseline,
        (true, true) => ObservedScenario::Mixed,
    }
}

/// Upper bounds on the number of banned nodes per type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionLimits {
    pub total: usize,
    pub blackhole: usize,
    pub wormhole: usize,
}

impl DetectionLimits {
    /// Only the active attack type may grow past what is already known,
    /// and by at most one node
    pub fn new(node_count: usize, known_blackholes: usize, known_wormholes: usize, scenario: ObservedScenario) -> Self {
        let total = 6.max(node_count / 4);
        let grow = |known: usize| total.min(known + 1);
        let (blackhole, wormhole) = match scenario {
            ObservedScenario::Blackhole => (grow(known_blackholes), known_wormholes),
            ObservedScenario::Wormhole => (known_blackholes, grow(known_wormholes)),
            ObservedScenario::Baseline | ObservedScenario::Mixed => {
                (grow(known_blackholes), grow(known_wormholes))
            }
        };
        Self {
            total,
            blackhole,
            wormhole,
        }
    }
}

/// Drops everything, receives a lot, sends little
pub fn looks_like_blackhole(node: &NodeRecord, median_rx: f64) -> bool {
    let rx = node.rx_packets as f64;
    node.fwd_packets == 0
        && rx > 40f64.max(median_rx * 2.5)
        && (node.tx_packets as f64) < rx * 0.25
        && node.rx_packets > 30
}

/// Attracts far more traffic than its peers but forwards only a sliver
pub fn looks_like_wormhole(node: &NodeRecord, median_rx: f64) -> bool {
    let rx = node.rx_packets as f64;
    let fwd_ratio = node.fwd_packets as f64 / (rx + 0.001);
    rx > median_rx * 5.0
        && fwd_ratio > 0.05
        && fwd_ratio < 0.25
        && (node.tx_packets as f64) < rx * 0.15
        && node.rx_packets > 50
}

/// Banlists of the other attack type kept from an earlier detection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreservedBanlists {
    pub blackholes: BTreeSet<NodeId>,
    pub wormholes: BTreeSet<NodeId>,
}

impl PreservedBanlists {
    /// Load the banlists not owned by `scenario` from `dir`, if present
    pub fn load(dir: &Path, scenario: ObservedScenario, node_count: u32) -> Self {
        let load = |name: &str| {
            let path = dir.join(name);
            if !path.exists() {
                return BTreeSet::new();
            }
            match read_banlist(&path, node_count, &mut Diagnostics::new()) {
                Ok(ids) => {
                    if !ids.is_empty() {
                        info!("Preserved existing {}: {:?}", name, ids);
                    }
                    ids
                }
                Err(e) => {
                    warn!("Could not read existing {}: {}", name, e);
                    BTreeSet::new()
                }
            }
        };

        Self {
            blackholes: if scenario != ObservedScenario::Blackhole {
                load(BLACKHOLE_BANLIST)
            } else {
                BTreeSet::new()
            },
            wormholes: if scenario != ObservedScenario::Wormhole {
                load(WORMHOLE_BANLIST)
            } else {
                BTreeSet::new()
            },
        }
    }
}

/// Outcome of one detection pass
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub generated_at: DateTime<Utc>,
    pub scenario: ObservedScenario,
    pub node_count: usize,
    pub known_blackholes: Vec<NodeId>,
    pub known_wormholes: Vec<NodeId>,
    pub preserved_blackholes: Vec<NodeId>,
    pub preserved_wormholes: Vec<NodeId>,
    pub active_nodes: usize,
    pub median_rx: Option<f64>,
    pub additional_blackholes: Vec<NodeId>,
    pub additional_wormholes: Vec<NodeId>,
    pub limits: DetectionLimits,
    pub blackhole_banlist: Vec<NodeId>,
    pub wormhole_banlist: Vec<NodeId>,
    pub banlist: Vec<NodeId>,
    pub ban_ratio: f64,
    /// Ratio exceeded the safe bound; only known and preserved nodes kept
    pub safety_fallback: bool,
}

/// Run the detection heuristics over parsed node stats
pub fn detect(nodes: &[NodeRecord], preserved: &PreservedBanlists) -> DetectionReport {
    let scenario = infer_scenario(nodes);
    let known_blackholes = ids_with_role(nodes, NodeRole::Blackhole);
    let known_wormholes = ids_with_role(nodes, NodeRole::Wormhole);
    let limits = DetectionLimits::new(nodes.len(), known_blackholes.len(), known_wormholes.len(), scenario);
    info!("Detected attack type: {:?}", scenario);
    info!(
        "Limits: total {}, blackholes {}, wormholes {}",
        limits.total, limits.blackhole, limits.wormhole
    );

    let mut blackhole_list: Vec<NodeId> = preserved
        .blackholes
        .iter()
        .copied()
        .chain(known_blackholes.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut wormhole_list: Vec<NodeId> = preserved
        .wormholes
        .iter()
        .copied()
        .chain(known_wormholes.iter().copied())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let active: Vec<f64> = nodes
        .iter()
        .filter(|n| n.rx_packets > ACTIVITY_THRESHOLD || n.tx_packets > ACTIVITY_THRESHOLD)
        .map(|n| n.rx_packets as f64)
        .collect();

    let mut median_rx = None;
    let mut additional_blackholes = Vec::new();
    let mut additional_wormholes = Vec::new();
    if active.len() > MIN_ACTIVE_NODES {
        let median = median(&active);
        info!("Active nodes: {}, median rx: {:.1}", active.len(), median);
        median_rx = Some(median);

        let candidates = nodes.iter().filter(|n| n.node_type == NodeRole::Normal);
        for node in candidates {
            if scenario == ObservedScenario::Blackhole && looks_like_blackhole(node, median) {
                info!(
                    "High-confidence blackhole: node {} (rx={}, fwd=0, tx={})",
                    node.node_id, node.rx_packets, node.tx_packets
                );
                additional_blackholes.push(node.node_id);
            }
            if scenario == ObservedScenario::Wormhole && looks_like_wormhole(node, median) {
                info!(
                    "High-confidence wormhole: node {} (rx={}, fwd={}, tx={})",
                    node.node_id, node.rx_packets, node.fwd_packets, node.tx_packets
                );
                additional_wormholes.push(node.node_id);
            }
        }
        blackhole_list.extend(&additional_blackholes);
        wormhole_list.extend(&additional_wormholes);
    } else {
        warn!("Insufficient active nodes for additional detection ({})", active.len());
    }

    blackhole_list.truncate(limits.blackhole);
    wormhole_list.truncate(limits.wormhole);

    let mut blackhole_banlist: BTreeSet<NodeId> = blackhole_list.into_iter().collect();
    let mut wormhole_banlist: BTreeSet<NodeId> = wormhole_list.into_iter().collect();
    let mut banlist: BTreeSet<NodeId> = blackhole_banlist.union(&wormhole_banlist).copied().collect();

    let ratio = |count: usize| {
        if nodes.is_empty() {
            0.0
        } else {
            count as f64 / nodes.len() as f64
        }
    };
    let mut ban_ratio = ratio(banlist.len());
    let safety_fallback = ban_ratio > MAX_SAFE_BAN_RATIO;
    if safety_fallback {
        warn!(
            "Ban ratio {:.1}% exceeds {:.0}%; keeping only known and preserved nodes",
            ban_ratio * 100.0,
            MAX_SAFE_BAN_RATIO * 100.0
        );
        blackhole_banlist = known_blackholes
            .iter()
            .chain(&preserved.blackholes)
            .copied()
            .collect();
        wormhole_banlist = known_wormholes
            .iter()
            .chain(&preserved.wormholes)
            .copied()
            .collect();
        banlist = blackhole_banlist.union(&wormhole_banlist).copied().collect();
        ban_ratio = ratio(banlist.len());
    }

    info!(
        "Banned: {} blackholes, {} wormholes, {} total ({:.1}%)",
        blackhole_banlist.len(),
        wormhole_banlist.len(),
        banlist.len(),
        ban_ratio * 100.0
    );

    DetectionReport {
        generated_at: Utc::now(),
        scenario,
        node_count: nodes.len(),
        known_blackholes,
        known_wormholes,
        preserved_blackholes: preserved.blackholes.iter().copied().collect(),
        preserved_wormholes: preserved.wormholes.iter().copied().collect(),
        active_nodes: active.len(),
        median_rx,
        additional_blackholes,
        additional_wormholes,
        limits,
        blackhole_banlist: blackhole_banlist.into_iter().collect(),
        wormhole_banlist: wormhole_banlist.into_iter().collect(),
        banlist: banlist.into_iter().collect(),
        ban_ratio,
        safety_fallback,
    }
}

/// Write banlists and `detected.json` into `dir`.
///
/// A per-type banlist is only rewritten when that type is the active
/// attack or the list is non-empty; the combined list is always written.
pub fn write_detection(dir: &Path, report: &DetectionReport) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    if report.scenario == ObservedScenario::Blackhole || !report.blackhole_banlist.is_empty() {
        write_banlist(&dir.join(BLACKHOLE_BANLIST), report.blackhole_banlist.iter().copied())?;
    }
    if report.scenario == ObservedScenario::Wormhole || !report.wormhole_banlist.is_empty() {
        write_banlist(&dir.join(WORMHOLE_BANLIST), report.wormhole_banlist.iter().copied())?;
    }
    write_banlist(&dir.join(COMBINED_BANLIST), report.banlist.iter().copied())?;

    let json = serde_json::to_string_pretty(report).context("Failed to serialize detection report")?;
    let path = dir.join(DETECTED_REPORT);
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Detection report written to {}", path.display());
    Ok(())
}

/// Read node stats, detect, and write banlists into `output_dir`
pub fn run_detection(stats_path: &Path, output_dir: &Path) -> Result<DetectionReport> {
    let nodes = read_node_stats(stats_path)?;
    if nodes.is_empty() {
        bail!("Node stats {} contain no rows", stats_path.display());
    }
    let node_count = u32::try_from(nodes.len()).context("Too many nodes in node stats")?;
    let preserved = PreservedBanlists::load(output_dir, infer_scenario(&nodes), node_count);
    let report = detect(&nodes, &preserved);
    write_detection(output_dir, &report)?;
    Ok(report)
}
