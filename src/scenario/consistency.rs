//! Cross-checks requested hostile counts against what was actually built.

use log::info;

use super::diagnostics::{ConsistencyCheck, Diagnostic, Diagnostics};
use super::types::MaliciousRoleSet;
use crate::config::{AttackMode, Config, RunKind};

/// Compares expected and actual malicious-node counts. Never fails a run.
#[derive(Debug, Clone)]
pub struct ConsistencyVerifier {
    mode: AttackMode,
    blackholes: u32,
    wormholes: u32,
}

impl ConsistencyVerifier {
    pub fn new(mode: AttackMode, blackholes: u32, wormholes: u32) -> Self {
        Self {
            mode,
            blackholes,
            wormholes,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.attack.mode, config.attack.blackholes, config.attack.wormholes)
    }

    /// Number of banned nodes a matching banlist should contain
    pub fn expected_banned(&self) -> usize {
        match self.mode {
            AttackMode::None => 0,
            AttackMode::Blackhole => self.blackholes as usize,
            AttackMode::Wormhole => self.wormholes as usize * 2,
        }
    }

    /// Record a warning for every mismatch; returns true when consistent
    pub fn verify(
        &self,
        run_kind: RunKind,
        roles: &MaliciousRoleSet,
        diagnostics: &mut Diagnostics,
    ) -> bool {
        let expected = self.expected_banned();
        let mut consistent = true;

        let (actual, check) = match run_kind {
            RunKind::Attack => (roles.hostile_node_count(), ConsistencyCheck::RequestedVsAssigned),
            RunKind::Mitigation => (roles.banned.len(), ConsistencyCheck::ExpectedVsBanned),
        };
        if actual != expected {
            diagnostics.record(Diagnostic::ConsistencyWarning {
                expected,
                actual,
                mode: self.mode,
                check,
            });
            consistent = false;
        }

        if run_kind == RunKind::Mitigation && self.mode == AttackMode::Wormhole {
            let members = roles.wormhole_pairs.len() * 2;
            if roles.banned.len() != members {
                diagnostics.record(Diagnostic::ConsistencyWarning {
                    expected: roles.banned.len(),
                    actual: members,
                    mode: self.mode,
                    check: ConsistencyCheck::BannedVsPairs,
                });
                consistent = false;
            }
        }

        if consistent {
            info!(
                "Consistent: {} malicious nodes expected for {} mode",
                expected, self.mode
            );
        }
        consistent
    }
}
