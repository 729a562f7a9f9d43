//! Benign traffic matrix synthesis.
//!
//! Flows never start or end on a malicious node. The first share of flow
//! slots pairs each available node with its mirror at the far end of the
//! available list, so those flows cross the address space and tend to route
//! through regions hostile nodes occupy. Remaining slots are random.

use std::collections::BTreeSet;
use std::time::Duration;

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::TrafficConfig;
use crate::scenario::{Diagnostic, Diagnostics, NodeId};

/// One benign source-to-destination flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowSpec {
    pub src: NodeId,
    pub dst: NodeId,
    #[serde(with = "humantime_serde")]
    pub start: Duration,
}

/// Builds the benign traffic matrix for one run
#[derive(Debug, Clone)]
pub struct TrafficFlowSynthesizer<'a> {
    node_count: u32,
    settings: &'a TrafficConfig,
}

impl<'a> TrafficFlowSynthesizer<'a> {
    pub fn new(node_count: u32, settings: &'a TrafficConfig) -> Self {
        Self {
            node_count,
            settings,
        }
    }

    /// `floor(node_count * flow_fraction)`
    pub fn target_flow_count(&self) -> usize {
        (f64::from(self.node_count) * self.settings.flow_fraction).floor() as usize
    }

    /// Synthesize flows avoiding every node in `malicious`.
    ///
    /// Each slot gets `2 * node_count` attempts; a slot that runs out is
    /// skipped, so the result may be shorter than the target.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        malicious: &BTreeSet<NodeId>,
        rng: &mut R,
        diagnostics: &mut Diagnostics,
    ) -> Vec<FlowSpec> {
        let available: Vec<NodeId> = (0..self.node_count)
            .filter(|id| !malicious.contains(id))
            .collect();
        let target = self.target_flow_count();

        info!(
            "Target flows: {}, available nodes for traffic: {}/{}",
            target,
            available.len(),
            self.node_count
        );

        let mut flows = Vec::with_capacity(target);
        if available.len() < 2 {
            if target > 0 {
                diagnostics.record(Diagnostic::FlowShortfall { target, active: 0 });
            }
            return flows;
        }

        let budget = 2 * self.node_count as usize;
        let structured_limit = self.settings.structured_share * target as f64;
        let len = available.len();

        for slot in 0..target {
            let structured = (slot as f64) < structured_limit && (len as f64) > structured_limit;
            let mut accepted = None;

            for attempt in 0..budget {
                let (src, dst) = if structured && attempt == 0 {
                    let idx = slot % len;
                    (available[idx], available[(len - 1 - idx) % len])
                } else {
                    (
                        available[rng.gen_range(0..len)],
                        available[rng.gen_range(0..len)],
                    )
                };

                if src != dst && !malicious.contains(&src) && !malicious.contains(&dst) {
                    accepted = Some((src, dst));
                    break;
                }
            }

            match accepted {
                Some((src, dst)) => flows.push(FlowSpec {
                    src,
                    dst,
                    start: self.settings.base_start + self.settings.flow_spacing * slot as u32,
                }),
                None => debug!("Flow slot {} skipped after {} attempts", slot, budget),
            }
        }

        info!("Active flows created: {}/{}", flows.len(), target);
        if flows.len() < target {
            diagnostics.record(Diagnostic::FlowShortfall {
                target,
                active: flows.len(),
            });
        }
        flows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::scenario_rng;

    #[test]
    fn test_never_touches_malicious_nodes() {
        let settings = TrafficConfig::default();
        for node_count in [2u32, 5, 12, 50] {
            let synthesizer = TrafficFlowSynthesizer::new(node_count, &settings);
            for malicious_count in 0..=node_count.saturating_sub(2) {
                // spread the malicious nodes out with a stride
                let malicious: BTreeSet<NodeId> =
                    (0..malicious_count).map(|i| (i * 7) % node_count).collect();
                let flows = synthesizer.synthesize(&malicious, &mut scenario_rng(11), &mut Diagnostics::new());

                assert!(flows.len() <= synthesizer.target_flow_count());
                for flow in &flows {
                    assert_ne!(flow.src, flow.dst);
                    assert!(!malicious.contains(&flow.src));
                    assert!(!malicious.contains(&flow.dst));
                }
            }
        }
    }

    #[test]
    fn test_structured_phase_mirrors_available_nodes() {
        let settings = TrafficConfig::default();
        let synthesizer = TrafficFlowSynthesizer::new(50, &settings);
        let flows = synthesizer.synthesize(&BTreeSet::new(), &mut scenario_rng(1), &mut Diagnostics::new());

        assert_eq!(synthesizer.target_flow_count(), 30);
        assert_eq!(flows.len(), 30);
        assert_eq!((flows[0].src, flows[0].dst), (0, 49));
        assert_eq!((flows[1].src, flows[1].dst), (1, 48));
        assert_eq!(flows[0].start, Duration::from_secs(10));
        assert_eq!(flows[2].start, Duration::from_millis(10_600));
    }

    #[test]
    fn test_start_times_increase() {
        let settings = TrafficConfig::default();
        let synthesizer = TrafficFlowSynthesizer::new(30, &settings);
        let malicious: BTreeSet<NodeId> = [0, 29, 7].into_iter().collect();
        let flows = synthesizer.synthesize(&malicious, &mut scenario_rng(4), &mut Diagnostics::new());

        assert!(flows.windows(2).all(|w| w[0].start < w[1].start));
    }

    #[test]
    fn test_too_few_nodes_is_a_shortfall() {
        let settings = TrafficConfig::default();
        let synthesizer = TrafficFlowSynthesizer::new(10, &settings);
        let malicious: BTreeSet<NodeId> = (0..9).collect();
        let mut diagnostics = Diagnostics::new();

        let flows = synthesizer.synthesize(&malicious, &mut scenario_rng(1), &mut diagnostics);
        assert!(flows.is_empty());
        assert!(diagnostics.has_flow_shortfall());
    }

    #[test]
    fn test_same_seed_same_matrix() {
        let settings = TrafficConfig::default();
        let synthesizer = TrafficFlowSynthesizer::new(40, &settings);
        let malicious: BTreeSet<NodeId> = [3, 9, 27].into_iter().collect();

        let a = synthesizer.synthesize(&malicious, &mut scenario_rng(8), &mut Diagnostics::new());
        let b = synthesizer.synthesize(&malicious, &mut scenario_rng(8), &mut Diagnostics::new());
        assert_eq!(a, b);
    }
}
