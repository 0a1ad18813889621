//! Virtual nodes: the host-side counterparts of physical controllers.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU16, Ordering},
        Arc, RwLock,
    },
};

use tracing::{debug, info, warn};

use gantry_core::error::{ErrorKind, Result};
use gantry_protocol::FieldMap;

use crate::{
    action::Action,
    interface::InterfaceCore,
    port::PortBinding,
    standard,
};

/// Address value meaning "not yet assigned"; reserved on the wire.
const UNASSIGNED: u16 = 0;

/// State shared between a [`VirtualNode`] handle and the interface's router.
pub(crate) struct NodeCore {
    name: String,
    address: AtomicU16,
    ports: RwLock<HashMap<u8, Arc<PortBinding>>>,
}

impl NodeCore {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            address: AtomicU16::new(UNASSIGNED),
            ports: RwLock::new(HashMap::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn address(&self) -> u16 {
        self.address.load(Ordering::SeqCst)
    }

    pub(crate) fn set_address(&self, address: u16) {
        self.address.store(address, Ordering::SeqCst);
    }

    pub(crate) fn binding(&self, port: u8) -> Option<Arc<PortBinding>> {
        self.ports.read().unwrap().get(&port).cloned()
    }

    pub(crate) fn bind(&self, binding: PortBinding) {
        let port = binding.port();
        if self.ports.write().unwrap().insert(port, Arc::new(binding)).is_some() {
            warn!(node = self.name, port, "rebinding port; previous binding replaced");
        }
    }

    /// Routes one validated inbound payload to the port's binding: decode,
    /// run the handler, then fill the response slot and wake the waiter.
    pub(crate) fn deliver(&self, port: u8, payload: &[u8]) {
        let Some(binding) = self.binding(port) else {
            debug!(node = self.name, port, "dropping packet for unbound port");
            return;
        };
        let Some(template) = &binding.inbound else {
            debug!(node = self.name, port, "dropping packet for one-way port");
            return;
        };
        match template.decode(payload) {
            Ok(fields) => {
                if let Some(handler) = &binding.handler {
                    handler(&fields);
                }
                binding.mailbox.put(fields);
            }
            Err(error) => {
                warn!(node = self.name, port, %error, "dropping undecodable packet");
            }
        }
    }
}

/// A logical node on the host, driving one physical controller.
///
/// Created through [`crate::Interface::create_node`]; ports are bound at
/// initialization, then [`VirtualNode::acquire_address`] runs the addressing
/// handshake with the physical counterpart.
pub struct VirtualNode {
    core: Arc<NodeCore>,
    interface: Arc<InterfaceCore>,
}

impl VirtualNode {
    pub(crate) fn new(core: Arc<NodeCore>, interface: Arc<InterfaceCore>) -> Self {
        Self { core, interface }
    }

    /// The node's logical name.
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// The node's current protocol address (0 while unassigned).
    pub fn address(&self) -> u16 {
        self.core.address()
    }

    /// Binds a port. Ports are expected to be bound once, at initialization.
    pub fn bind_port(&self, binding: PortBinding) {
        self.core.bind(binding);
    }

    /// Creates an action targeting one of this node's ports.
    ///
    /// The action is returned uncommitted: callers with deferred parameter
    /// edits commit now and release later; everyone else uses
    /// [`Action::transact`] or [`VirtualNode::call`].
    pub fn action(&self, port: u8, fields: FieldMap) -> Result<Action> {
        let binding = self.core.binding(port).ok_or(ErrorKind::PortUnbound(port))?;
        let mailbox = binding.expects_response().then(|| Arc::clone(&binding.mailbox));
        Ok(Action::new(
            Arc::clone(&self.core),
            port,
            binding.mode,
            binding.outbound.clone(),
            mailbox,
            fields,
            self.interface.commit_tx.clone(),
        ))
    }

    /// Issues a request and blocks for its outcome.
    pub fn call(&self, port: u8, fields: FieldMap) -> Result<FieldMap> {
        self.action(port, fields)?.transact()
    }

    /// Runs the addressing handshake: generate a fresh collision-free
    /// address, register it, announce it over the multicast set-address port
    /// and await the counterpart's URL acknowledgment.
    ///
    /// On success any previously-held address is dropped from the registry
    /// atomically; on failure the registry and the node's address are left
    /// as they were.
    pub fn acquire_address(&self) -> Result<u16> {
        let previous = self.core.address();
        let address = self.interface.registry.claim_random(&self.core)?;
        self.core.set_address(address);

        let request = FieldMap::new().with_uint("address", u64::from(address));
        match self.call(standard::ports::SET_ADDRESS, request) {
            Ok(response) => {
                if previous != UNASSIGNED {
                    self.interface.registry.forget(previous);
                }
                let url = response.text("url").unwrap_or("");
                info!(node = self.name(), address, url, "node acquired");
                Ok(address)
            }
            Err(error) => {
                self.interface.registry.forget(address);
                self.core.set_address(previous);
                Err(error)
            }
        }
    }

    pub(crate) fn core(&self) -> &Arc<NodeCore> {
        &self.core
    }
}
