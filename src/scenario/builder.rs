//! Hostile role selection for attack runs.

use std::collections::BTreeSet;

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;

use super::diagnostics::{Diagnostic, Diagnostics};
use super::placement::select_strategic_pairs;
use super::types::{MaliciousRoleSet, NodeId, NodeRole, WormholePair};
use crate::config::{AttackMode, Config};

/// Selects which nodes turn hostile in an attack run
#[derive(Debug, Clone)]
pub struct ScenarioBuilder {
    node_count: u32,
    mode: AttackMode,
    blackholes: u32,
    wormholes: u32,
}

impl ScenarioBuilder {
    pub fn new(node_count: u32, mode: AttackMode, blackholes: u32, wormholes: u32) -> Self {
        Self {
            node_count,
            mode,
            blackholes,
            wormholes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.general.nodes,
            config.attack.mode,
            config.attack.blackholes,
            config.attack.wormholes,
        )
    }

    /// Assign hostile roles, never to a node in `banned`.
    ///
    /// Only the field matching the attack mode is populated; `banned` is
    /// carried through unchanged.
    pub fn build<R: Rng + ?Sized>(
        &self,
        banned: BTreeSet<NodeId>,
        rng: &mut R,
        diagnostics: &mut Diagnostics,
    ) -> MaliciousRoleSet {
        let mut roles = MaliciousRoleSet {
            banned,
            ..Default::default()
        };

        match self.mode {
            AttackMode::None => {
                info!("No attack configured; all nodes behave normally");
            }
            AttackMode::Blackhole => {
                roles.blackholes = self.select_blackholes(&roles.banned, rng, diagnostics);
            }
            AttackMode::Wormhole => {
                roles.wormhole_pairs = self.select_wormhole_pairs(&roles.banned, diagnostics);
            }
        }

        roles
    }

    /// Shuffle the non-banned nodes and take a prefix.
    ///
    /// At least one node always stays available for traffic, so the
    /// achievable count is capped at `node_count - 1`.
    pub fn select_blackholes<R: Rng + ?Sized>(
        &self,
        banned: &BTreeSet<NodeId>,
        rng: &mut R,
        diagnostics: &mut Diagnostics,
    ) -> BTreeSet<NodeId> {
        let mut candidates: Vec<NodeId> = (0..self.node_count)
            .filter(|id| !banned.contains(id))
            .collect();

        info!(
            "Available nodes for blackholes: {}/{}",
            candidates.len(),
            self.node_count
        );

        let requested = self.blackholes as usize;
        let limit = candidates
            .len()
            .min(self.node_count.saturating_sub(1) as usize);
        let achieved = requested.min(limit);
        if achieved < requested {
            diagnostics.record(Diagnostic::ScenarioShortfall {
                role: NodeRole::Blackhole,
                requested,
                achieved,
            });
        }

        candidates.shuffle(rng);
        let selected: BTreeSet<NodeId> = candidates.into_iter().take(achieved).collect();

        info!("Selected blackhole nodes: {:?}", selected);
        selected
    }

    /// First usable entries of the strategic placement table
    pub fn select_wormhole_pairs(
        &self,
        banned: &BTreeSet<NodeId>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<WormholePair> {
        let requested = self.wormholes as usize;
        let pairs = select_strategic_pairs(self.node_count, requested, banned);

        if pairs.len() < requested {
            diagnostics.record(Diagnostic::ScenarioShortfall {
                role: NodeRole::Wormhole,
                requested,
                achieved: pairs.len(),
            });
        }

        for (i, pair) in pairs.iter().enumerate() {
            info!("Wormhole pair {}: {}", i + 1, pair);
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::scenario_rng;

    #[test]
    fn test_blackhole_count_and_disjoint_from_banned() {
        let banned: BTreeSet<NodeId> = [1, 2, 3].into_iter().collect();
        for node_count in [5u32, 10, 50] {
            for requested in 0..=node_count {
                let builder = ScenarioBuilder::new(node_count, AttackMode::Blackhole, requested, 0);
                let mut diagnostics = Diagnostics::new();
                let roles = builder.build(banned.clone(), &mut scenario_rng(3), &mut diagnostics);

                let available = (node_count as usize) - banned.len();
                assert_eq!(roles.blackholes.len(), (requested as usize).min(available));
                assert!(roles.blackholes.is_disjoint(&banned));
                assert!(roles.wormhole_pairs.is_empty());
            }
        }
    }

    #[test]
    fn test_same_seed_same_blackholes() {
        let builder = ScenarioBuilder::new(50, AttackMode::Blackhole, 3, 0);
        let a = builder.build(BTreeSet::new(), &mut scenario_rng(1), &mut Diagnostics::new());
        let b = builder.build(BTreeSet::new(), &mut scenario_rng(1), &mut Diagnostics::new());
        assert_eq!(a.blackholes, b.blackholes);
        assert_eq!(a.blackholes.len(), 3);
    }

    #[test]
    fn test_degenerate_request_is_clamped() {
        let builder = ScenarioBuilder::new(4, AttackMode::Blackhole, 10, 0);
        let mut diagnostics = Diagnostics::new();
        let roles = builder.build(BTreeSet::new(), &mut scenario_rng(1), &mut diagnostics);

        assert!(roles.blackholes.len() <= 3);
        assert!(roles.blackholes.len() >= 1);
        assert!(diagnostics.has_scenario_shortfall());
    }

    #[test]
    fn test_wormhole_pairs_from_table() {
        let builder = ScenarioBuilder::new(20, AttackMode::Wormhole, 0, 2);
        let mut diagnostics = Diagnostics::new();
        let roles = builder.build(BTreeSet::new(), &mut scenario_rng(1), &mut diagnostics);

        assert_eq!(
            roles.wormhole_pairs,
            vec![WormholePair::new(0, 19), WormholePair::new(5, 15)]
        );
        assert_eq!(roles.wormhole_members().len(), 4);
        assert!(roles.blackholes.is_empty());
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_wormhole_shortfall_recorded() {
        let builder = ScenarioBuilder::new(4, AttackMode::Wormhole, 0, 5);
        let mut diagnostics = Diagnostics::new();
        let roles = builder.build(BTreeSet::new(), &mut scenario_rng(1), &mut diagnostics);

        assert_eq!(roles.wormhole_pairs.len(), 2);
        assert!(diagnostics.has_scenario_shortfall());
    }

    #[test]
    fn test_no_attack_assigns_nothing() {
        let builder = ScenarioBuilder::new(10, AttackMode::None, 3, 3);
        let roles = builder.build(BTreeSet::new(), &mut scenario_rng(1), &mut Diagnostics::new());
        assert!(roles.malicious_nodes().is_empty());
    }
}
