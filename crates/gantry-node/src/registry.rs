//! The address↔node registry.
//!
//! One registry per interface, guarded by a single mutex that is never held
//! across a network round trip. Reassignment after a firmware reload
//! replaces entries atomically under the same lock.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use rand::Rng;
use tracing::debug;

use gantry_core::{
    constants::RESERVED_ADDRESSES,
    error::{ErrorKind, Result},
};

use crate::node::NodeCore;

/// Attempts at finding a free random address before giving up. The address
/// space is 2¹⁶; hitting this bound means the interface is absurdly full.
const CLAIM_ATTEMPTS: u32 = 4096;

#[derive(Default)]
pub(crate) struct NodeRegistry {
    nodes: Mutex<HashMap<u16, Arc<NodeCore>>>,
}

impl NodeRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Looks up the node registered at an address.
    pub(crate) fn lookup(&self, address: u16) -> Option<Arc<NodeCore>> {
        self.nodes.lock().unwrap().get(&address).cloned()
    }

    /// Generates a fresh random address, free of collisions with live nodes
    /// and reserved values, and registers `node` under it.
    pub(crate) fn claim_random(&self, node: &Arc<NodeCore>) -> Result<u16> {
        let mut nodes = self.nodes.lock().unwrap();
        let mut rng = rand::rng();
        for _ in 0..CLAIM_ATTEMPTS {
            let address: u16 = rng.random();
            if RESERVED_ADDRESSES.contains(&address) || nodes.contains_key(&address) {
                continue;
            }
            nodes.insert(address, Arc::clone(node));
            debug!(node = node.name(), address, "registered node address");
            return Ok(address);
        }
        Err(ErrorKind::AddressExhausted(CLAIM_ATTEMPTS))
    }

    /// Drops the registration at `address`, if any.
    pub(crate) fn forget(&self, address: u16) {
        self.nodes.lock().unwrap().remove(&address);
    }

    /// Number of registered addresses.
    pub(crate) fn len(&self) -> usize {
        self.nodes.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_claimed_addresses_never_collide() {
        let registry = NodeRegistry::new();
        let node = Arc::new(NodeCore::new("probe"));

        // Pre-populate with 50 live entries.
        for _ in 0..50 {
            registry.claim_random(&node).unwrap();
        }

        let mut seen = HashSet::new();
        for _ in 0..1000 {
            let address = registry.claim_random(&node).unwrap();
            assert!(!RESERVED_ADDRESSES.contains(&address));
            assert!(seen.insert(address), "address {} handed out twice", address);
        }
        assert_eq!(registry.len(), 1050);
    }

    #[test]
    fn test_forget_releases_address() {
        let registry = NodeRegistry::new();
        let node = Arc::new(NodeCore::new("probe"));
        let address = registry.claim_random(&node).unwrap();
        assert!(registry.lookup(address).is_some());

        registry.forget(address);
        assert!(registry.lookup(address).is_none());
        assert_eq!(registry.len(), 0);
    }
}
