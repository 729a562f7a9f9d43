//! Strategic wormhole placement.
//!
//! Wormhole pairs are not drawn at random. They come from a fixed table of
//! positions spread across the address space (extreme ends, quarter points,
//! eighths, sixths) so that a pair straddles as many multi-hop routes as
//! possible. The table depends only on the node count, which lets a later
//! mitigation run regenerate exactly the same candidates.

use std::collections::BTreeSet;

use log::debug;

use super::types::{NodeId, WormholePair};

/// Raw placement table for `node_count` nodes, in priority order.
///
/// Entries are not filtered: small networks produce out-of-range,
/// degenerate (`a == b`) or overlapping entries.
pub fn strategic_table(node_count: u32) -> Vec<(NodeId, NodeId)> {
    let n = node_count;
    let mut table = vec![
        (0, n.saturating_sub(1)),
        (n / 4, 3 * n / 4),
        (1, n.saturating_sub(2)),
        (n / 8, 7 * n / 8),
        (n / 6, 5 * n / 6),
    ];
    if n > 20 {
        table.push((2, n.saturating_sub(3)));
        table.push((n / 12, 11 * n / 12));
    }
    table
}

/// Take the first `count` usable entries of the placement table.
///
/// An entry is usable when both endpoints are below `node_count`, the
/// endpoints differ, neither is in `excluded`, and neither already belongs to
/// an earlier selected pair. May return fewer than `count` pairs.
pub fn select_strategic_pairs(
    node_count: u32,
    count: usize,
    excluded: &BTreeSet<NodeId>,
) -> Vec<WormholePair> {
    let mut used = BTreeSet::new();
    let mut pairs = Vec::with_capacity(count);

    for (a, b) in strategic_table(node_count) {
        if pairs.len() >= count {
            break;
        }
        let usable = a < node_count
            && b < node_count
            && a != b
            && !excluded.contains(&a)
            && !excluded.contains(&b)
            && !used.contains(&a)
            && !used.contains(&b);
        if !usable {
            debug!("Skipping placement entry ({}, {}) for {} nodes", a, b, node_count);
            continue;
        }
        used.insert(a);
        used.insert(b);
        pairs.push(WormholePair::new(a, b));
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_for_twenty_nodes() {
        assert_eq!(
            strategic_table(20),
            vec![(0, 19), (5, 15), (1, 18), (2, 17), (3, 16)]
        );
    }

    #[test]
    fn test_table_extends_above_twenty() {
        let table = strategic_table(50);
        assert_eq!(table.len(), 7);
        assert_eq!(table[5], (2, 47));
        assert_eq!(table[6], (4, 45));
    }

    #[test]
    fn test_selection_is_deterministic_and_distinct() {
        let first = select_strategic_pairs(50, 5, &BTreeSet::new());
        let second = select_strategic_pairs(50, 5, &BTreeSet::new());
        assert_eq!(first, second);

        let members: BTreeSet<NodeId> = first.iter().flat_map(|p| p.members()).collect();
        assert_eq!(members.len(), 10);
    }

    #[test]
    fn test_selection_skips_excluded_nodes() {
        let excluded: BTreeSet<NodeId> = [0].into_iter().collect();
        let pairs = select_strategic_pairs(20, 2, &excluded);
        assert_eq!(pairs, vec![WormholePair::new(5, 15), WormholePair::new(1, 18)]);
    }

    #[test]
    fn test_small_network_runs_short() {
        // n = 4: (0,3), (1,3), (1,2), (0,3), (0,3) -> only two disjoint pairs
        let pairs = select_strategic_pairs(4, 5, &BTreeSet::new());
        assert_eq!(pairs, vec![WormholePair::new(0, 3), WormholePair::new(1, 2)]);
    }
}
