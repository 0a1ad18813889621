#![warn(missing_docs)]

//! Gantry: a small public API facade for the workspace.
//!
//! This crate re-exports the surface needed to drive a physical node
//! network:
//!
//! - Interface and nodes (`Interface`, `StandardNode`, `StepperNode`)
//! - Motion (`MotionController`, axis elements, kinematics)
//! - Firmware upload (`FirmwareImage`)
//! - Core configuration and transports (`Config`, `UdpTransport`)
//!
//! Example
//! ```ignore
//! use gantry::prelude::*;
//!
//! let transport = UdpTransport::connect("0.0.0.0:0", "192.168.1.30:8000")?;
//! let interface = Interface::with_defaults(transport);
//!
//! let node = StepperNode::attach(&interface, "x-axis", 1)?;
//! let axis = ElementChain::new(vec![
//!     Element::microstep(4),
//!     Element::stepper(1.8),
//!     Element::pulley(18.0),
//! ])?;
//! let machine = MotionController::new(node, vec![axis], Box::new(Direct::new(1)),
//!     interface.config())?;
//!
//! machine.move_to(&[Some(120.0)], 40.0, None)?.wait()?;
//! ```

// Core configuration, errors and transports
pub use gantry_core::{
    config::Config,
    error::{ErrorKind, Result},
    transport::{LoopbackTransport, Transport, UdpTransport},
};
// Wire protocol: templates and framing
pub use gantry_protocol::{FieldMap, FieldSpec, PacketTemplate, TransmitMode};
// Nodes: interface, actions, addressing, bootloading
pub use gantry_node::{
    Action, ActionSequence, FirmwareImage, Interface, NodeStatus, PortBinding, RunMode,
    StandardNode, VirtualNode,
};
// Motion: elements, kinematics, planning
pub use gantry_motion::{
    AccelSpec, Chain, Compound, Direct, Element, ElementChain, HBot, Kinematics,
    MotionController, MoveHandle, PositionState, Route, SpinStatus, StepperNode,
};

/// Convenience prelude with the most commonly used items.
pub mod prelude {
    pub use crate::{
        AccelSpec, Config, Direct, Element, ElementChain, ErrorKind, FieldMap, FirmwareImage,
        Interface, Kinematics, MotionController, Result, StandardNode, StepperNode, Transport,
        UdpTransport,
    };
}
