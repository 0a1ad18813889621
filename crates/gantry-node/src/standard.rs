//! The standard node port contract.
//!
//! Every conforming node honors a fixed numbering for its management ports:
//! status, bootloader command/write/read, URL request, set-address, identify
//! and reset. [`StandardNode`] binds these and wraps them in typed calls.

use tracing::debug;

use gantry_core::error::{ErrorKind, Result};
use gantry_protocol::{FieldMap, FieldSpec, PacketTemplate};

use crate::{interface::Interface, node::VirtualNode, port::PortBinding};

/// Fixed port numbering every node must honor.
pub mod ports {
    /// Run-mode and application-validity query.
    pub const STATUS: u8 = 1;
    /// Bootloader mode-change commands.
    pub const BOOTLOADER_COMMAND: u8 = 2;
    /// Paged program-memory writes.
    pub const BOOTLOADER_WRITE: u8 = 3;
    /// Paged program-memory read-back.
    pub const BOOTLOADER_READ: u8 = 4;
    /// Driver URL query.
    pub const URL_REQUEST: u8 = 5;
    /// Address assignment announcement (multicast).
    pub const SET_ADDRESS: u8 = 6;
    /// Ask the node to identify itself physically (e.g. blink an LED).
    pub const IDENTIFY: u8 = 7;
    /// Hard reset.
    pub const RESET: u8 = 255;
}

/// Marker a node reports when it holds a valid application image.
pub const APP_VALID_MARKER: u8 = 170;

/// Which program a node is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// The resident bootloader.
    Bootloader,
    /// The user application.
    Application,
}

impl RunMode {
    /// The status character a node reports for this mode.
    pub fn status_char(&self) -> char {
        match self {
            RunMode::Bootloader => 'B',
            RunMode::Application => 'A',
        }
    }
}

/// Decoded response of the status port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStatus {
    /// Program the node is running.
    pub mode: RunMode,
    /// Whether the node holds a valid application image.
    pub app_valid: bool,
}

/// A virtual node with the standard management ports bound.
pub struct StandardNode {
    node: VirtualNode,
}

impl core::fmt::Debug for StandardNode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StandardNode")
            .field("name", &self.node.name())
            .field("address", &self.node.address())
            .finish()
    }
}

impl StandardNode {
    /// Creates the node on the interface, binds the standard ports and runs
    /// the addressing handshake with the physical counterpart.
    pub fn attach(interface: &Interface, name: &str) -> Result<Self> {
        let node = interface.create_node(name);
        bind_standard_ports(&node);
        node.acquire_address()?;
        Ok(Self { node })
    }

    /// Wraps an existing node, binding the standard ports without running
    /// the addressing handshake. For callers that manage addressing
    /// themselves.
    pub fn from_node(node: VirtualNode) -> Self {
        bind_standard_ports(&node);
        Self { node }
    }

    /// The underlying virtual node.
    pub fn node(&self) -> &VirtualNode {
        &self.node
    }

    /// Queries the node's run mode and application validity.
    pub fn status(&self) -> Result<NodeStatus> {
        let response = self.node.call(ports::STATUS, FieldMap::new())?;
        let mode = match response.text("status")?.chars().next() {
            Some('A') => RunMode::Application,
            Some('B') => RunMode::Bootloader,
            _ => {
                return Err(ErrorKind::WrongFieldType {
                    field: "status",
                    expected: "run mode 'A' or 'B'",
                })
            }
        };
        let app_valid = response.uint("app_validity")? == u64::from(APP_VALID_MARKER);
        Ok(NodeStatus { mode, app_valid })
    }

    /// Asks the node for the URL of its driver.
    pub fn request_url(&self) -> Result<String> {
        let response = self.node.call(ports::URL_REQUEST, FieldMap::new())?;
        Ok(response.text("url")?.to_owned())
    }

    /// Asks the node to identify itself physically. No response expected.
    pub fn identify(&self) -> Result<()> {
        self.node.call(ports::IDENTIFY, FieldMap::new())?;
        Ok(())
    }

    /// Hard-resets the node. No response expected.
    pub fn reset(&self) -> Result<()> {
        debug!(node = self.node.name(), "resetting node");
        self.node.call(ports::RESET, FieldMap::new())?;
        Ok(())
    }
}

fn bind_standard_ports(node: &VirtualNode) {
    node.bind_port(
        PortBinding::new(ports::STATUS, PacketTemplate::empty()).with_response(
            PacketTemplate::new(vec![
                FieldSpec::Text { name: "status", width: Some(1) },
                FieldSpec::Uint { name: "app_validity", width: 1 },
            ]),
        ),
    );
    node.bind_port(
        PortBinding::new(
            ports::BOOTLOADER_COMMAND,
            PacketTemplate::new(vec![FieldSpec::Uint { name: "command_code", width: 1 }]),
        )
        .with_response(PacketTemplate::new(vec![
            FieldSpec::Uint { name: "response_code", width: 1 },
            FieldSpec::Uint { name: "page_number", width: 2 },
        ])),
    );
    node.bind_port(
        PortBinding::new(
            ports::BOOTLOADER_WRITE,
            PacketTemplate::new(vec![
                FieldSpec::Uint { name: "command_code", width: 1 },
                FieldSpec::Uint { name: "page_number", width: 2 },
                FieldSpec::Bytes {
                    name: "write_data",
                    width: Some(gantry_core::constants::BOOTLOADER_PAGE_SIZE),
                },
            ]),
        )
        .with_response(PacketTemplate::new(vec![
            FieldSpec::Uint { name: "response_code", width: 1 },
            FieldSpec::Uint { name: "page_number", width: 2 },
        ])),
    );
    node.bind_port(
        PortBinding::new(
            ports::BOOTLOADER_READ,
            PacketTemplate::new(vec![FieldSpec::Uint { name: "page_number", width: 2 }]),
        )
        .with_response(PacketTemplate::new(vec![FieldSpec::Bytes {
            name: "read_data",
            width: Some(gantry_core::constants::BOOTLOADER_PAGE_SIZE),
        }])),
    );
    node.bind_port(
        PortBinding::new(ports::URL_REQUEST, PacketTemplate::empty()).with_response(
            PacketTemplate::new(vec![FieldSpec::Text { name: "url", width: None }]),
        ),
    );
    node.bind_port(
        PortBinding::new(
            ports::SET_ADDRESS,
            PacketTemplate::new(vec![FieldSpec::Uint { name: "address", width: 2 }]),
        )
        .multicast()
        .with_response(PacketTemplate::new(vec![FieldSpec::Text { name: "url", width: None }])),
    );
    node.bind_port(PortBinding::new(ports::IDENTIFY, PacketTemplate::empty()));
    node.bind_port(PortBinding::new(ports::RESET, PacketTemplate::empty()));
}
