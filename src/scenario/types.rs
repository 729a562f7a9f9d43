//! Core data types for hostile role assignment.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Node identity in `[0, node_count)`, stable for the whole run
pub type NodeId = u32;

/// Two colluding wormhole endpoints, `first != second`.
///
/// The pair is unordered for membership purposes; `first`/`second` only
/// preserve the order in which the pair was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WormholePair {
    pub first: NodeId,
    pub second: NodeId,
}

impl WormholePair {
    pub fn new(first: NodeId, second: NodeId) -> Self {
        Self { first, second }
    }

    pub fn members(&self) -> [NodeId; 2] {
        [self.first, self.second]
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.first == node || self.second == node
    }

    /// Order-independent form, used to compare pairings
    pub fn normalized(&self) -> (NodeId, NodeId) {
        (self.first.min(self.second), self.first.max(self.second))
    }
}

impl fmt::Display for WormholePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.first, self.second)
    }
}

/// Reported role of a node. Variant order is reporting precedence:
/// Blackhole > Banned > Wormhole > Normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeRole {
    Blackhole,
    Banned,
    Wormhole,
    Normal,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Blackhole => write!(f, "BLACKHOLE"),
            NodeRole::Banned => write!(f, "BANNED"),
            NodeRole::Wormhole => write!(f, "WORMHOLE"),
            NodeRole::Normal => write!(f, "NORMAL"),
        }
    }
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "BLACKHOLE" => Ok(NodeRole::Blackhole),
            "BANNED" => Ok(NodeRole::Banned),
            "WORMHOLE" => Ok(NodeRole::Wormhole),
            "NORMAL" => Ok(NodeRole::Normal),
            other => Err(format!("unknown node type '{}'", other)),
        }
    }
}

/// Hostile role assignment for one run.
///
/// The three subsets are disjoint by construction in attack runs. In
/// mitigation runs `banned` is authoritative and the other two are derived
/// from it, so overlap with `banned` is expected there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaliciousRoleSet {
    pub blackholes: BTreeSet<NodeId>,
    pub wormhole_pairs: Vec<WormholePair>,
    pub banned: BTreeSet<NodeId>,
}

impl MaliciousRoleSet {
    /// All nodes that appear in any wormhole pair
    pub fn wormhole_members(&self) -> BTreeSet<NodeId> {
        self.wormhole_pairs.iter().flat_map(|p| p.members()).collect()
    }

    /// Blackholes, wormhole members and banned nodes: excluded from the
    /// benign traffic matrix and from forwarding
    pub fn malicious_nodes(&self) -> BTreeSet<NodeId> {
        let mut nodes = self.blackholes.clone();
        nodes.extend(self.wormhole_members());
        nodes.extend(self.banned.iter().copied());
        nodes
    }

    pub fn is_malicious(&self, node: NodeId) -> bool {
        self.blackholes.contains(&node)
            || self.banned.contains(&node)
            || self.wormhole_pairs.iter().any(|p| p.contains(node))
    }

    /// Reported role with fixed precedence
    pub fn role_of(&self, node: NodeId) -> NodeRole {
        if self.blackholes.contains(&node) {
            NodeRole::Blackhole
        } else if self.banned.contains(&node) {
            NodeRole::Banned
        } else if self.wormhole_pairs.iter().any(|p| p.contains(node)) {
            NodeRole::Wormhole
        } else {
            NodeRole::Normal
        }
    }

    /// Number of nodes holding an active hostile role
    pub fn hostile_node_count(&self) -> usize {
        self.blackholes.len() + self.wormhole_pairs.len() * 2
    }
}
