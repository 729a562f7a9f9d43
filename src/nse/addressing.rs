//! Node id to IPv4 address mapping.
//!
//! Node `i` lives at `base + i + 1`, so with the default base `10.1.1.0`
//! node 0 is `10.1.1.1`. The mapping is arithmetic and invertible; it never
//! leaks into the scenario logic, which only reasons in node ids.

use std::net::Ipv4Addr;

use crate::scenario::NodeId;

/// Address assignment for a fixed-size network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAddressing {
    base: Ipv4Addr,
    node_count: u32,
}

impl NodeAddressing {
    pub fn new(base: Ipv4Addr, node_count: u32) -> Self {
        Self { base, node_count }
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// Address of `node`, or `None` when out of range
    pub fn address_of(&self, node: NodeId) -> Option<Ipv4Addr> {
        if node >= self.node_count {
            return None;
        }
        u32::from(self.base)
            .checked_add(node)?
            .checked_add(1)
            .map(Ipv4Addr::from)
    }

    /// Node owning `address`, or `None` for foreign addresses
    pub fn node_of(&self, address: Ipv4Addr) -> Option<NodeId> {
        let offset = u32::from(address).checked_sub(u32::from(self.base))?;
        let node = offset.checked_sub(1)?;
        (node < self.node_count).then_some(node)
    }
}
