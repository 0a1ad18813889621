#![warn(missing_docs)]

//! gantry-node: the virtual node layer.
//!
//! A physical controller network is driven through an [`Interface`]: one
//! shared half-duplex channel, one transmitter serializing outbound
//! [`Action`]s, and a receiver/router pair dispatching validated inbound
//! frames to the [`VirtualNode`] registered at each address.
//!
//! On top of the raw port-call primitives sit the standard node port set
//! ([`StandardNode`]) and the firmware bootloader state machine.

mod action;
mod arbiter;
/// The firmware upload state machine.
pub mod bootloader;
/// Firmware images and Intel HEX parsing.
pub mod firmware;
mod interface;
mod node;
mod port;
mod registry;
/// The standard node port contract.
pub mod standard;

pub use action::{Action, ActionController, ActionSequence};
pub use firmware::FirmwareImage;
pub use interface::Interface;
pub use node::VirtualNode;
pub use port::PortBinding;
pub use standard::{NodeStatus, RunMode, StandardNode};
