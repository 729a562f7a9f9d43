//! Cross-run comparison of the PDR results log.
//!
//! Attack runs are measured against the baseline PDR, mitigation runs
//! against the mean PDR of the matching attack runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use color_eyre::eyre::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use super::stats::{mean, std_dev};
use crate::config::{AttackMode, ScenarioKind};
use crate::metrics::PdrResult;

/// Parse every line of a PDR log; unparsable lines are skipped
pub fn parse_pdr_log(content: &str) -> Vec<PdrResult> {
    let mut results = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match line.parse::<PdrResult>() {
            Ok(result) => results.push(result),
            Err(e) => warn!("Skipping PDR log line {}: {}", index + 1, e),
        }
    }
    results
}

pub fn read_pdr_log(path: &Path) -> Result<Vec<PdrResult>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read PDR results {}", path.display()))?;
    let results = parse_pdr_log(&content);
    info!("Parsed {} runs from {}", results.len(), path.display());
    Ok(results)
}

/// Effect of one attack type in one scenario, in percent
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioMetrics {
    pub attack: AttackMode,
    pub scenario: ScenarioKind,
    pub runs: usize,
    pub avg_pdr: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attack_impact: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation_gain: Option<f64>,
    pub recovery_rate: f64,
}

/// Summary over every parsed run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonReport {
    pub generated_at: DateTime<Utc>,
    pub runs: usize,
    pub baseline_pdr: Option<f64>,
    pub pdr_min: f64,
    pub pdr_max: f64,
    pub pdr_mean: f64,
    pub pdr_std: f64,
    pub total_tx: u64,
    pub total_rx: u64,
    pub metrics: Vec<ScenarioMetrics>,
}

/// Compute comparison metrics.
///
/// The baseline is the first BASELINE run without an attack. Without one
/// no scenario metrics are produced.
pub fn compare(results: &[PdrResult]) -> ComparisonReport {
    let pdrs: Vec<f64> = results.iter().map(|r| r.pdr).collect();
    let baseline_pdr = results
        .iter()
        .find(|r| r.attack == AttackMode::None && r.scenario == ScenarioKind::Baseline)
        .map(|r| r.pdr);

    let mut groups: BTreeMap<(AttackMode, ScenarioKind), Vec<f64>> = BTreeMap::new();
    for result in results {
        groups.entry((result.attack, result.scenario)).or_default().push(result.pdr);
    }

    let mut metrics = Vec::new();
    match baseline_pdr {
        None => warn!("No baseline scenario found; skipping improvement metrics"),
        Some(baseline) => {
            for (&(attack, scenario), values) in &groups {
                let avg_pdr = mean(values);
                match scenario {
                    ScenarioKind::Baseline => {}
                    ScenarioKind::Attack => {
                        let impact = if baseline > 0.0 {
                            (baseline - avg_pdr) / baseline * 100.0
                        } else {
                            0.0
                        };
                        metrics.push(ScenarioMetrics {
                            attack,
                            scenario,
                            runs: values.len(),
                            avg_pdr,
                            attack_impact: Some(impact.max(0.0)),
                            mitigation_gain: None,
                            recovery_rate: 0.0,
                        });
                    }
                    ScenarioKind::Mitigation => {
                        let attack_pdr = groups.get(&(attack, ScenarioKind::Attack)).map(|v| mean(v));
                        let Some(attack_pdr) = attack_pdr.filter(|p| *p > 0.0) else {
                            warn!("No usable {} attack runs to compare mitigation against", attack);
                            continue;
                        };
                        metrics.push(ScenarioMetrics {
                            attack,
                            scenario,
                            runs: values.len(),
                            avg_pdr,
                            attack_impact: None,
                            mitigation_gain: Some((avg_pdr - attack_pdr) / attack_pdr * 100.0),
                            recovery_rate: if baseline > 0.0 {
                                avg_pdr / baseline * 100.0
                            } else {
                                0.0
                            },
                        });
                    }
                }
            }
        }
    }

    let pdr_min = if pdrs.is_empty() {
        0.0
    } else {
        pdrs.iter().copied().fold(f64::INFINITY, f64::min)
    };

    ComparisonReport {
        generated_at: Utc::now(),
        runs: results.len(),
        baseline_pdr,
        pdr_min,
        pdr_max: pdrs.iter().copied().fold(0.0, f64::max),
        pdr_mean: mean(&pdrs),
        pdr_std: std_dev(&pdrs),
        total_tx: results.iter().map(|r| r.tx).sum(),
        total_rx: results.iter().map(|r| r.rx).sum(),
        metrics,
    }
}

/// Human-readable comparison table
pub fn format_text_report(report: &ComparisonReport) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push("=".repeat(72));
    lines.push("                 MANET ATTACK / MITIGATION COMPARISON".to_string());
    lines.push("=".repeat(72));
    lines.push(String::new());

    lines.push(format!("Runs: {}", report.runs));
    match report.baseline_pdr {
        Some(pdr) => lines.push(format!("Baseline PDR: {:.3}", pdr)),
        None => lines.push("Baseline PDR: not available".to_string()),
    }
    lines.push(format!("PDR range: {:.3} - {:.3}", report.pdr_min, report.pdr_max));
    lines.push(format!("Average PDR: {:.3} ± {:.3}", report.pdr_mean, report.pdr_std));
    lines.push(format!(
        "Total packets: {} transmitted, {} received",
        report.total_tx, report.total_rx
    ));
    lines.push(String::new());

    if !report.metrics.is_empty() {
        lines.push(format!(
            "{:<10} {:<11} {:>4} {:>8} {:>10} {:>10} {:>10}",
            "Attack", "Scenario", "Runs", "PDR", "Impact%", "Gain%", "Recovery%"
        ));
        lines.push("-".repeat(72));
        for m in &report.metrics {
            let percent = |v: Option<f64>| v.map_or_else(|| "-".to_string(), |v| format!("{:.1}", v));
            lines.push(format!(
                "{:<10} {:<11} {:>4} {:>8.3} {:>10} {:>10} {:>10.1}",
                m.attack.to_string(),
                m.scenario.to_string(),
                m.runs,
                m.avg_pdr,
                percent(m.attack_impact),
                percent(m.mitigation_gain),
                m.recovery_rate
            ));
        }
        lines.push(String::new());
    }

    lines.push("=".repeat(72));
    lines.join("\n")
}

pub fn write_text_report(report: &ComparisonReport, output_path: &Path) -> Result<()> {
    fs::write(output_path, format_text_report(report))
        .with_context(|| format!("Failed to write text report to {}", output_path.display()))?;
    info!("Text report written to {}", output_path.display());
    Ok(())
}

pub fn write_json_report(report: &ComparisonReport, output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report to JSON")?;
    fs::write(output_path, json)
        .with_context(|| format!("Failed to write JSON report to {}", output_path.display()))?;
    info!("JSON report written to {}", output_path.display());
    Ok(())
}
