//! Role reconstruction for mitigation runs.
//!
//! A mitigation run does not select anything: the banlist written by the
//! paired attack run is the role assignment. Blackholes map one to one. For
//! wormholes the banlist is a flat node set, so pairs have to be rebuilt.

use std::collections::BTreeSet;

use log::{info, warn};

use super::diagnostics::{ConsistencyCheck, Diagnostic, Diagnostics};
use super::placement::select_strategic_pairs;
use super::types::{MaliciousRoleSet, NodeId, WormholePair};
use crate::config::{AttackMode, Config};

/// Rebuilds the hostile role assignment from a banlist
#[derive(Debug, Clone)]
pub struct MitigationReconstructor {
    node_count: u32,
    mode: AttackMode,
    wormholes: u32,
}

impl MitigationReconstructor {
    pub fn new(node_count: u32, mode: AttackMode, wormholes: u32) -> Self {
        Self {
            node_count,
            mode,
            wormholes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.general.nodes, config.attack.mode, config.attack.wormholes)
    }

    /// Rebuild roles from `banned`.
    ///
    /// `explicit_pairs` is the content of a pair file written by the attack
    /// run, when one was supplied; it is used only if it agrees with the
    /// banlist.
    pub fn reconstruct(
        &self,
        banned: BTreeSet<NodeId>,
        explicit_pairs: Option<Vec<WormholePair>>,
        diagnostics: &mut Diagnostics,
    ) -> MaliciousRoleSet {
        let mut roles = MaliciousRoleSet::default();

        match self.mode {
            AttackMode::None => {
                info!("Mitigation without attack mode: {} banned nodes stay passive", banned.len());
            }
            AttackMode::Blackhole => {
                roles.blackholes = banned.clone();
                info!("Original blackhole nodes: {:?}", roles.blackholes);
            }
            AttackMode::Wormhole => {
                roles.wormhole_pairs = self.reconstruct_pairs(&banned, explicit_pairs, diagnostics);
            }
        }

        roles.banned = banned;
        roles
    }

    fn reconstruct_pairs(
        &self,
        banned: &BTreeSet<NodeId>,
        explicit_pairs: Option<Vec<WormholePair>>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<WormholePair> {
        let requested = self.wormholes as usize;

        if let Some(pairs) = explicit_pairs {
            if let Some(pairs) = self.accept_explicit_pairs(banned, pairs, diagnostics) {
                info!("Using {} wormhole pairs from pair file", pairs.len());
                return pairs;
            }
        }

        if banned.len() == requested * 2 {
            let pairs = pair_sorted(banned);
            for pair in &pairs {
                info!("Reconstructed pair: {}", pair);
            }
            self.check_against_placement(banned, &pairs, diagnostics);
            return pairs;
        }

        warn!(
            "Banlist has {} nodes but {} wormhole pairs need {}; falling back to strategic placement",
            banned.len(),
            requested,
            requested * 2
        );
        let mut kept = Vec::new();
        for pair in select_strategic_pairs(self.node_count, requested, &BTreeSet::new()) {
            let banned_members: Vec<NodeId> = pair
                .members()
                .into_iter()
                .filter(|id| banned.contains(id))
                .collect();
            match banned_members.len() {
                2 => {
                    info!("Fallback pair {} fully banned", pair);
                    kept.push(pair);
                }
                1 => diagnostics.record(Diagnostic::PartialPair { pair, banned_members }),
                _ => info!("Fallback pair {} has no banned members; dropped", pair),
            }
        }
        kept
    }

    /// Explicit pairs must be well formed, all banned, and match the count
    fn accept_explicit_pairs(
        &self,
        banned: &BTreeSet<NodeId>,
        pairs: Vec<WormholePair>,
        diagnostics: &mut Diagnostics,
    ) -> Option<Vec<WormholePair>> {
        let mut seen = BTreeSet::new();
        let disjoint = pairs
            .iter()
            .flat_map(|p| p.members())
            .all(|id| seen.insert(id));
        let well_formed = disjoint && pairs.iter().all(|p| p.first != p.second);
        let members_banned = seen.iter().filter(|id| banned.contains(id)).count();

        if well_formed && members_banned == seen.len() && pairs.len() == self.wormholes as usize {
            return Some(pairs);
        }

        diagnostics.record(Diagnostic::ConsistencyWarning {
            expected: seen.len(),
            actual: members_banned,
            mode: self.mode,
            check: ConsistencyCheck::PairFile,
        });
        None
    }

    /// Flag a sorted-order pairing that provably differs from the original
    fn check_against_placement(
        &self,
        banned: &BTreeSet<NodeId>,
        reconstructed: &[WormholePair],
        diagnostics: &mut Diagnostics,
    ) {
        let strategic = select_strategic_pairs(self.node_count, reconstructed.len(), &BTreeSet::new());
        let strategic_members: BTreeSet<NodeId> = strategic.iter().flat_map(|p| p.members()).collect();
        if strategic_members != *banned {
            diagnostics.record(Diagnostic::UnverifiedPairing {
                reconstructed: reconstructed.to_vec(),
            });
            return;
        }

        if normalized(reconstructed) != normalized(&strategic) {
            diagnostics.record(Diagnostic::PairingCaveat {
                reconstructed: reconstructed.to_vec(),
                strategic,
            });
        }
    }
}

fn normalized(pairs: &[WormholePair]) -> BTreeSet<(NodeId, NodeId)> {
    pairs.iter().map(|p| p.normalized()).collect()
}

/// Group the ascending node list into consecutive pairs
fn pair_sorted(nodes: &BTreeSet<NodeId>) -> Vec<WormholePair> {
    let sorted: Vec<NodeId> = nodes.iter().copied().collect();
    sorted
        .chunks_exact(2)
        .map(|chunk| WormholePair::new(chunk[0], chunk[1]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[NodeId]) -> BTreeSet<NodeId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn test_blackholes_are_the_banlist() {
        let reconstructor = MitigationReconstructor::new(50, AttackMode::Blackhole, 0);
        let mut diagnostics = Diagnostics::new();
        let roles = reconstructor.reconstruct(set(&[4, 17, 33]), None, &mut diagnostics);

        assert_eq!(roles.blackholes, set(&[4, 17, 33]));
        assert_eq!(roles.banned, set(&[4, 17, 33]));
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_sorted_pairing_keeps_membership() {
        // Attack on 20 nodes produced (0,19), (5,15)
        let reconstructor = MitigationReconstructor::new(20, AttackMode::Wormhole, 2);
        let mut diagnostics = Diagnostics::new();
        let roles = reconstructor.reconstruct(set(&[0, 19, 5, 15]), None, &mut diagnostics);

        assert_eq!(
            roles.wormhole_pairs,
            vec![WormholePair::new(0, 5), WormholePair::new(15, 19)]
        );
        assert_eq!(roles.wormhole_members(), set(&[0, 5, 15, 19]));
        // the pairing differs from the placement table and is flagged
        assert!(diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::PairingCaveat { .. })));
        assert_eq!(diagnostics.consistency_warnings(), 0);
    }

    #[test]
    fn test_pairing_off_the_placement_table_is_flagged() {
        // e.g. a banlist written by the detector
        let reconstructor = MitigationReconstructor::new(20, AttackMode::Wormhole, 2);
        let mut diagnostics = Diagnostics::new();
        let roles = reconstructor.reconstruct(set(&[3, 7, 11, 13]), None, &mut diagnostics);

        assert_eq!(
            roles.wormhole_pairs,
            vec![WormholePair::new(3, 7), WormholePair::new(11, 13)]
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics.iter().next(),
            Some(Diagnostic::UnverifiedPairing { reconstructed }) if reconstructed == &roles.wormhole_pairs
        ));
        assert_eq!(diagnostics.consistency_warnings(), 0);
    }

    #[test]
    fn test_explicit_pairs_restore_exact_pairing() {
        let reconstructor = MitigationReconstructor::new(20, AttackMode::Wormhole, 2);
        let mut diagnostics = Diagnostics::new();
        let explicit = vec![WormholePair::new(0, 19), WormholePair::new(5, 15)];
        let roles = reconstructor.reconstruct(set(&[0, 19, 5, 15]), Some(explicit.clone()), &mut diagnostics);

        assert_eq!(roles.wormhole_pairs, explicit);
        assert!(diagnostics.is_empty());
    }

    #[test]
    fn test_inconsistent_pair_file_is_ignored() {
        let reconstructor = MitigationReconstructor::new(20, AttackMode::Wormhole, 2);
        let mut diagnostics = Diagnostics::new();
        let explicit = vec![WormholePair::new(0, 19), WormholePair::new(6, 14)];
        let roles = reconstructor.reconstruct(set(&[0, 19, 5, 15]), Some(explicit), &mut diagnostics);

        assert_eq!(roles.wormhole_members(), set(&[0, 5, 15, 19]));
        assert_eq!(diagnostics.consistency_warnings(), 1);
    }

    #[test]
    fn test_count_mismatch_falls_back_to_placement() {
        // 3 pairs requested on 20 nodes: (0,19), (5,15), (1,18); banlist lost node 18
        let reconstructor = MitigationReconstructor::new(20, AttackMode::Wormhole, 3);
        let mut diagnostics = Diagnostics::new();
        let roles = reconstructor.reconstruct(set(&[0, 19, 5, 15, 1]), None, &mut diagnostics);

        assert_eq!(
            roles.wormhole_pairs,
            vec![WormholePair::new(0, 19), WormholePair::new(5, 15)]
        );
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::PartialPair { banned_members, .. } if banned_members == &vec![1]
        )));
        // banned node 1 stays banned even without a pair
        assert!(roles.banned.contains(&1));
    }
}
