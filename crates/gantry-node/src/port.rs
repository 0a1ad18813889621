//! Port bindings: the request/response channels of a node.
//!
//! A port statically binds one outbound packet template and at most one
//! inbound (response) template. The binding owns the single response slot
//! shared between the port's inbound handler and whichever action is
//! currently waiting on the port.

use std::sync::Arc;

use gantry_core::sync::Mailbox;
use gantry_protocol::{FieldMap, PacketTemplate, TransmitMode};

/// Callback invoked with each decoded inbound packet before the waiting
/// action is woken. Runs on the router thread; keep it short.
pub type InboundHandler = Box<dyn Fn(&FieldMap) + Send + Sync>;

/// A statically-bound request/response channel at a node.
pub struct PortBinding {
    pub(crate) port: u8,
    pub(crate) outbound: PacketTemplate,
    pub(crate) inbound: Option<PacketTemplate>,
    pub(crate) mode: TransmitMode,
    pub(crate) mailbox: Arc<Mailbox<FieldMap>>,
    pub(crate) handler: Option<InboundHandler>,
}

impl PortBinding {
    /// Creates a unicast binding with the given outbound template and no
    /// response.
    pub fn new(port: u8, outbound: PacketTemplate) -> Self {
        Self {
            port,
            outbound,
            inbound: None,
            mode: TransmitMode::Unicast,
            mailbox: Arc::new(Mailbox::new()),
            handler: None,
        }
    }

    /// Declares the response template; actions on this port will block for a
    /// matching inbound packet.
    pub fn with_response(mut self, inbound: PacketTemplate) -> Self {
        self.inbound = Some(inbound);
        self
    }

    /// Transmits on this port as multicast (all nodes on the interface).
    pub fn multicast(mut self) -> Self {
        self.mode = TransmitMode::Multicast;
        self
    }

    /// Installs an inbound handler, e.g. to fold responses into machine
    /// state asynchronously.
    pub fn with_handler(mut self, handler: impl Fn(&FieldMap) + Send + Sync + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    /// The port number this binding serves.
    pub fn port(&self) -> u8 {
        self.port
    }

    /// Whether actions on this port block for a response.
    pub fn expects_response(&self) -> bool {
        self.inbound.is_some()
    }
}

impl std::fmt::Debug for PortBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortBinding")
            .field("port", &self.port)
            .field("mode", &self.mode)
            .field("expects_response", &self.expects_response())
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}
