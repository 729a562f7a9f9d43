//! Report files written at the end of a run.
//!
//! - node stats CSV, once under a mode-specific name and once as
//!   `nodes_stats.csv` for the detector
//! - one appended line in `pdr_results.txt`
//! - `run_summary.json` with totals, diagnostics and scenario metadata

use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Context, Result};
use serde::Serialize;

use super::aggregator::{NodeStats, RunSummary};
use crate::config::{AttackMode, RoutingProtocol, RunKind, ScenarioKind};
use crate::scenario::{Diagnostics, MaliciousRoleSet, WormholePair};

pub const NODE_STATS_HEADER: &str = "node_id,ip,txPackets,rxPackets,fwdPackets,node_type";
pub const GENERIC_NODE_STATS: &str = "nodes_stats.csv";
pub const PDR_RESULTS: &str = "pdr_results.txt";
pub const RUN_SUMMARY: &str = "run_summary.json";

/// Mode-specific node stats file name
pub fn stats_filename(mode: AttackMode, run_kind: RunKind) -> &'static str {
    match (mode, run_kind) {
        (AttackMode::None, _) => "nodes_stats_baseline.csv",
        (AttackMode::Blackhole, RunKind::Attack) => "nodes_stats_blackhole_attack.csv",
        (AttackMode::Blackhole, RunKind::Mitigation) => "nodes_stats_blackhole_mitigation.csv",
        (AttackMode::Wormhole, RunKind::Attack) => "nodes_stats_wormhole_attack.csv",
        (AttackMode::Wormhole, RunKind::Mitigation) => "nodes_stats_wormhole_mitigation.csv",
    }
}

/// Render node stats as CSV with header
pub fn format_node_stats(nodes: &[NodeStats]) -> String {
    let mut out = String::with_capacity(64 * (nodes.len() + 1));
    out.push_str(NODE_STATS_HEADER);
    out.push('\n');
    for node in nodes {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            node.node_id, node.address, node.tx_packets, node.rx_packets, node.fwd_packets, node.role
        ));
    }
    out
}

pub fn write_node_stats(path: &Path, nodes: &[NodeStats]) -> Result<()> {
    fs::write(path, format_node_stats(nodes))
        .with_context(|| format!("Failed to write node stats to {}", path.display()))?;
    log::info!("Node stats written to {}", path.display());
    Ok(())
}

/// One line of the PDR results log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PdrResult {
    pub routing: RoutingProtocol,
    pub scenario: ScenarioKind,
    pub attack: AttackMode,
    pub nodes: u32,
    pub blackholes: usize,
    pub wormhole_pairs: usize,
    pub wormhole_nodes: usize,
    pub banned_nodes: usize,
    pub active_flows: usize,
    pub tx: u64,
    pub rx: u64,
    pub pdr: f64,
}

impl PdrResult {
    pub fn new(
        routing: RoutingProtocol,
        scenario: ScenarioKind,
        attack: AttackMode,
        nodes: u32,
        roles: &MaliciousRoleSet,
        summary: &RunSummary,
    ) -> Self {
        Self {
            routing,
            scenario,
            attack,
            nodes,
            blackholes: roles.blackholes.len(),
            wormhole_pairs: roles.wormhole_pairs.len(),
            wormhole_nodes: roles.wormhole_pairs.len() * 2,
            banned_nodes: roles.banned.len(),
            active_flows: summary.active_flow_count,
            tx: summary.total_tx,
            rx: summary.total_rx,
            pdr: summary.pdr,
        }
    }
}

impl fmt::Display for PdrResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Routing={} Scenario={} AttackType={} Nodes={} Blackholes={} WormholePairs={} \
             WormholeNodes={} BannedNodes={} ActiveFlows={} Tx={} Rx={} PDR={:.6}",
            self.routing,
            self.scenario,
            self.attack,
            self.nodes,
            self.blackholes,
            self.wormhole_pairs,
            self.wormhole_nodes,
            self.banned_nodes,
            self.active_flows,
            self.tx,
            self.rx,
            self.pdr
        )
    }
}

/// Errors parsing a PDR results line
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PdrParseError {
    #[error("Missing field {0}")]
    MissingField(&'static str),
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

fn parse_field<T: FromStr>(value: &str, field: &'static str) -> Result<T, PdrParseError> {
    value.parse().map_err(|_| PdrParseError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn narrow<T: TryFrom<u64>>(value: u64, field: &'static str) -> Result<T, PdrParseError> {
    T::try_from(value).map_err(|_| PdrParseError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

impl FromStr for PdrResult {
    type Err = PdrParseError;

    /// Parse `key=value` fields. Scenario, AttackType and PDR are required;
    /// missing counters read as zero and a `nan` PDR reads as zero.
    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: std::collections::HashMap<&str, &str> = line
            .split_whitespace()
            .filter_map(|part| part.split_once('='))
            .collect();

        let required = |key: &'static str| fields.get(key).copied().ok_or(PdrParseError::MissingField(key));
        let count = |key: &'static str| -> Result<u64, PdrParseError> {
            fields.get(key).map_or(Ok(0), |v| parse_field(v, key))
        };

        let pdr_text = required("PDR")?;
        let pdr = if pdr_text.eq_ignore_ascii_case("nan") {
            0.0
        } else {
            parse_field(pdr_text, "PDR")?
        };

        Ok(Self {
            routing: fields
                .get("Routing")
                .map_or(Ok(RoutingProtocol::default()), |v| parse_field(v, "Routing"))?,
            scenario: parse_field(required("Scenario")?, "Scenario")?,
            attack: parse_field(required("AttackType")?, "AttackType")?,
            nodes: narrow(count("Nodes")?, "Nodes")?,
            blackholes: narrow(count("Blackholes")?, "Blackholes")?,
            wormhole_pairs: narrow(count("WormholePairs")?, "WormholePairs")?,
            wormhole_nodes: narrow(count("WormholeNodes")?, "WormholeNodes")?,
            banned_nodes: narrow(count("BannedNodes")?, "BannedNodes")?,
            active_flows: narrow(count("ActiveFlows")?, "ActiveFlows")?,
            tx: count("Tx")?,
            rx: count("Rx")?,
            pdr,
        })
    }
}

/// Append one line to the PDR results log
pub fn append_pdr_result(path: &Path, result: &PdrResult) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open PDR results {}", path.display()))?;
    writeln!(file, "{}", result)
        .with_context(|| format!("Failed to append to PDR results {}", path.display()))?;
    Ok(())
}

/// JSON summary of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub result: &'a PdrResult,
    pub seed: u64,
    pub summary: &'a RunSummary,
    pub blackholes: Vec<u32>,
    pub wormhole_pairs: &'a [WormholePair],
    pub banned: Vec<u32>,
    pub diagnostics: &'a Diagnostics,
}

pub fn write_run_report(path: &Path, report: &RunReport<'_>) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run summary to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write run summary to {}", path.display()))?;
    log::info!("Run summary written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::NodeRole;
    use std::collections::BTreeMap;
    use std::net::Ipv4Addr;
    use tempfile::TempDir;

    fn sample_result() -> PdrResult {
        PdrResult {
            routing: RoutingProtocol::Aodv,
            scenario: ScenarioKind::Attack,
            attack: AttackMode::Blackhole,
            nodes: 50,
            blackholes: 3,
            wormhole_pairs: 0,
            wormhole_nodes: 0,
            banned_nodes: 0,
            active_flows: 30,
            tx: 1200,
            rx: 900,
            pdr: 0.75,
        }
    }

    #[test]
    fn test_pdr_line_format() {
        assert_eq!(
            sample_result().to_string(),
            "Routing=AODV Scenario=ATTACK AttackType=blackhole Nodes=50 Blackholes=3 WormholePairs=0 \
             WormholeNodes=0 BannedNodes=0 ActiveFlows=30 Tx=1200 Rx=900 PDR=0.750000"
        );
    }

    #[test]
    fn test_pdr_line_parses_back() {
        let parsed: PdrResult = sample_result().to_string().parse().unwrap();
        assert_eq!(parsed, sample_result());
    }

    #[test]
    fn test_pdr_line_tolerates_missing_counters() {
        let parsed: PdrResult = "Scenario=BASELINE AttackType=none PDR=nan".parse().unwrap();
        assert_eq!(parsed.scenario, ScenarioKind::Baseline);
        assert_eq!(parsed.tx, 0);
        assert_eq!(parsed.pdr, 0.0);

        assert_eq!(
            "Scenario=ATTACK AttackType=blackhole".parse::<PdrResult>(),
            Err(PdrParseError::MissingField("PDR"))
        );
        assert!("Scenario=ATTACK AttackType=sybil PDR=0.5".parse::<PdrResult>().is_err());
    }

    #[test]
    fn test_pdr_line_rejects_oversized_node_count() {
        assert_eq!(
            "Scenario=ATTACK AttackType=blackhole Nodes=4294967346 PDR=0.5".parse::<PdrResult>(),
            Err(PdrParseError::InvalidValue {
                field: "Nodes",
                value: "4294967346".to_string(),
            })
        );
    }

    #[test]
    fn test_stats_filenames() {
        assert_eq!(stats_filename(AttackMode::None, RunKind::Mitigation), "nodes_stats_baseline.csv");
        assert_eq!(
            stats_filename(AttackMode::Wormhole, RunKind::Mitigation),
            "nodes_stats_wormhole_mitigation.csv"
        );
    }

    #[test]
    fn test_node_stats_csv() {
        let nodes = vec![NodeStats {
            node_id: 0,
            address: Ipv4Addr::new(10, 1, 1, 1),
            tx_packets: 5,
            rx_packets: 4,
            fwd_packets: 0,
            role: NodeRole::Blackhole,
        }];
        assert_eq!(
            format_node_stats(&nodes),
            "node_id,ip,txPackets,rxPackets,fwdPackets,node_type\n0,10.1.1.1,5,4,0,BLACKHOLE\n"
        );
    }

    #[test]
    fn test_pdr_results_append() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PDR_RESULTS);
        append_pdr_result(&path, &sample_result()).unwrap();
        append_pdr_result(&path, &sample_result()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_run_report_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RUN_SUMMARY);
        let summary = RunSummary {
            total_tx: 10,
            total_rx: 5,
            pdr: 0.5,
            active_flow_count: 2,
            role_counts: BTreeMap::from([(NodeRole::Normal, 4)]),
        };
        let result = sample_result();
        let diagnostics = Diagnostics::new();
        let report = RunReport {
            generated_at: Utc::now(),
            result: &result,
            seed: 1,
            summary: &summary,
            blackholes: vec![],
            wormhole_pairs: &[],
            banned: vec![],
            diagnostics: &diagnostics,
        };
        write_run_report(&path, &report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["role_counts"]["NORMAL"], 4);
        assert_eq!(value["result"]["scenario"], "ATTACK");
    }
}
