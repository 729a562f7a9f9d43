//! Adversarial scenario assembly.
//!
//! Attack runs select hostile roles ([`ScenarioBuilder`]); mitigation runs
//! rebuild them from a banlist ([`MitigationReconstructor`]). Either way the
//! result is checked by [`ConsistencyVerifier`] and turned into hostile app
//! descriptions. All randomness flows through one seeded [`ScenarioRng`].

pub mod builder;
pub mod consistency;
pub mod diagnostics;
pub mod hostile;
pub mod mitigation;
pub mod placement;
pub mod types;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub use builder::ScenarioBuilder;
pub use consistency::ConsistencyVerifier;
pub use diagnostics::{ConsistencyCheck, Diagnostic, Diagnostics};
pub use hostile::{plan_hostile_apps, FloodStream, FloodTarget, HostileApp, HostileBehavior};
pub use mitigation::MitigationReconstructor;
pub use placement::{select_strategic_pairs, strategic_table};
pub use types::{MaliciousRoleSet, NodeId, NodeRole, WormholePair};

/// Seeded random source shared by role selection, flood targeting and
/// traffic synthesis. ChaCha keeps sequences identical across platforms.
pub type ScenarioRng = ChaCha8Rng;

/// Create the run's random source from its seed
pub fn scenario_rng(seed: u64) -> ScenarioRng {
    ChaCha8Rng::seed_from_u64(seed)
}
