//! Recoverable conditions recorded while a scenario is assembled.
//!
//! Nothing in the scenario engine aborts a run. Shortfalls, count
//! mismatches and skipped banlist entries are recorded here instead, logged
//! as warnings, and carried into the run summary so offline analysis can
//! spot reduced-fidelity runs.

use std::fmt;
use std::path::PathBuf;

use log::warn;
use serde::Serialize;

use super::types::{NodeId, NodeRole, WormholePair};
use crate::config::AttackMode;

/// Which comparison produced a consistency warning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConsistencyCheck {
    /// Requested role count vs roles actually assigned (attack runs)
    RequestedVsAssigned,
    /// Expected banlist size vs banlist contents (mitigation runs)
    ExpectedVsBanned,
    /// Banned node count vs reconstructed wormhole members
    BannedVsPairs,
    /// Explicit pair file vs banlist contents
    PairFile,
}

impl fmt::Display for ConsistencyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsistencyCheck::RequestedVsAssigned => write!(f, "requested vs assigned"),
            ConsistencyCheck::ExpectedVsBanned => write!(f, "expected vs banned"),
            ConsistencyCheck::BannedVsPairs => write!(f, "banned vs wormhole members"),
            ConsistencyCheck::PairFile => write!(f, "pair file vs banlist"),
        }
    }
}

/// A recoverable condition. None of these stop the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Fewer candidates than requested for a hostile role
    ScenarioShortfall {
        role: NodeRole,
        requested: usize,
        achieved: usize,
    },
    /// Expected and actual malicious-node counts diverge
    ConsistencyWarning {
        expected: usize,
        actual: usize,
        mode: AttackMode,
        check: ConsistencyCheck,
    },
    /// Sorted-order reconstruction paired nodes differently than the
    /// strategic placement table that produced them
    PairingCaveat {
        reconstructed: Vec<WormholePair>,
        strategic: Vec<WormholePair>,
    },
    /// Banned members do not match the placement table, so the
    /// sorted-order pairing could not be checked
    UnverifiedPairing { reconstructed: Vec<WormholePair> },
    /// A regenerated pair with only some members on the banlist
    PartialPair {
        pair: WormholePair,
        banned_members: Vec<NodeId>,
    },
    /// The traffic matrix has fewer flows than targeted
    FlowShortfall { target: usize, active: usize },
    /// A banlist value outside the node range was ignored
    BanlistSkipped { value: u64, node_count: u32 },
    /// A banlist or pair file could not be read
    BanlistUnavailable { path: PathBuf, reason: String },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ScenarioShortfall { role, requested, achieved } => write!(
                f,
                "scenario shortfall: requested {} {} role slots, only {} achievable",
                requested, role, achieved
            ),
            Diagnostic::ConsistencyWarning { expected, actual, mode, check } => write!(
                f,
                "consistency warning ({} mode, {}): expected {}, actual {}",
                mode, check, expected, actual
            ),
            Diagnostic::PairingCaveat { reconstructed, strategic } => write!(
                f,
                "reconstructed pairs {:?} differ from strategic placement {:?}",
                reconstructed.iter().map(|p| p.normalized()).collect::<Vec<_>>(),
                strategic.iter().map(|p| p.normalized()).collect::<Vec<_>>()
            ),
            Diagnostic::UnverifiedPairing { reconstructed } => write!(
                f,
                "pairs {:?} inferred from sorted banlist order; original pairing unknown",
                reconstructed.iter().map(|p| p.normalized()).collect::<Vec<_>>()
            ),
            Diagnostic::PartialPair { pair, banned_members } => write!(
                f,
                "wormhole pair {} only partially banned (banned: {:?})",
                pair, banned_members
            ),
            Diagnostic::FlowShortfall { target, active } => {
                write!(f, "flow shortfall: {} of {} target flows placed", active, target)
            }
            Diagnostic::BanlistSkipped { value, node_count } => write!(
                f,
                "banlist entry {} ignored (network has {} nodes)",
                value, node_count
            ),
            Diagnostic::BanlistUnavailable { path, reason } => {
                write!(f, "banlist {} unavailable: {}", path.display(), reason)
            }
        }
    }
}

/// Ordered log of diagnostics for one run
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record and log a diagnostic
    pub fn record(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.entries.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn consistency_warnings(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::ConsistencyWarning { .. }))
            .count()
    }

    pub fn has_scenario_shortfall(&self) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d, Diagnostic::ScenarioShortfall { .. }))
    }

    pub fn has_flow_shortfall(&self) -> bool {
        self.entries
            .iter()
            .any(|d| matches!(d, Diagnostic::FlowShortfall { .. }))
    }
}
