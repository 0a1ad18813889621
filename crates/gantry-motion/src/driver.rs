//! The stepper node driver: standard ports plus the motion command ports.

use gantry_core::error::{ErrorKind, Result};
use gantry_node::{standard::StandardNode, Action, Interface, PortBinding};
use gantry_protocol::{FieldMap, FieldSpec, PacketTemplate};

use crate::segment::fields;

/// Port numbering for the stepper node's motion commands.
pub mod step_ports {
    /// Queue one step command (per-axis steps plus velocity profile).
    pub const STEP_COMMAND: u8 = 8;
    /// Query whether the node is stepping and how many commands it holds.
    pub const SPIN_STATUS: u8 = 9;
    /// Set the node's peak step rate.
    pub const VELOCITY: u8 = 10;
}

/// Decoded response of the spin-status port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpinStatus {
    /// Whether the node is currently emitting steps.
    pub spinning: bool,
    /// Step commands held in the node's buffer.
    pub queued: u8,
}

/// A stepper-driver node: the standard management ports plus step-command,
/// spin-status and velocity ports.
pub struct StepperNode {
    standard: StandardNode,
    axes: usize,
}

impl StepperNode {
    /// Attaches a stepper node driving `axes` motors (1..=8).
    pub fn attach(interface: &Interface, name: &str, axes: usize) -> Result<Self> {
        assert!((1..=8).contains(&axes), "a stepper node drives 1..=8 axes");
        let standard = StandardNode::attach(interface, name)?;
        bind_step_ports(&standard, axes);
        Ok(Self { standard, axes })
    }

    /// Wraps an already-attached standard node without running the
    /// addressing handshake again.
    pub fn from_standard(standard: StandardNode, axes: usize) -> Self {
        assert!((1..=8).contains(&axes), "a stepper node drives 1..=8 axes");
        bind_step_ports(&standard, axes);
        Self { standard, axes }
    }

    /// The standard management surface of this node.
    pub fn standard(&self) -> &StandardNode {
        &self.standard
    }

    /// Number of motor axes this node drives.
    pub fn axes(&self) -> usize {
        self.axes
    }

    /// Creates an uncommitted step-command action with placeholder fields.
    ///
    /// The motion planner updates the payload with the finalized velocity
    /// profile before releasing it.
    pub fn step_action(&self, payload: FieldMap) -> Result<Action> {
        self.standard.node().action(step_ports::STEP_COMMAND, payload)
    }

    /// Queries whether the node is stepping and how full its buffer is.
    pub fn spin_status(&self) -> Result<SpinStatus> {
        let response = self.standard.node().call(step_ports::SPIN_STATUS, FieldMap::new())?;
        Ok(SpinStatus {
            spinning: response.uint("spinning")? != 0,
            queued: response.uint("queued")? as u8,
        })
    }

    /// Requests a new peak step rate from the node.
    pub fn set_velocity(&self, rate: u16) -> Result<()> {
        let request = FieldMap::new().with_uint("rate", u64::from(rate));
        let response = self.standard.node().call(step_ports::VELOCITY, request)?;
        if response.uint("ok")? == 0 {
            return Err(ErrorKind::CommandRefused(step_ports::VELOCITY));
        }
        Ok(())
    }
}

fn bind_step_ports(standard: &StandardNode, axes: usize) {
    let node = standard.node();
    node.bind_port(
        PortBinding::new(
            step_ports::STEP_COMMAND,
            PacketTemplate::new(vec![
                FieldSpec::Bytes { name: fields::STEPS, width: Some(axes) },
                FieldSpec::Uint { name: fields::DIRECTIONS, width: 1 },
                FieldSpec::Uint { name: fields::RATE, width: 2 },
                FieldSpec::Uint { name: fields::ACCEL_STEPS, width: 1 },
                FieldSpec::Uint { name: fields::DECEL_STEPS, width: 1 },
                FieldSpec::Uint { name: fields::ACCEL_RATE, width: 2 },
            ]),
        )
        .with_response(PacketTemplate::new(vec![FieldSpec::Uint { name: "slots", width: 1 }])),
    );
    node.bind_port(
        PortBinding::new(step_ports::SPIN_STATUS, PacketTemplate::empty()).with_response(
            PacketTemplate::new(vec![
                FieldSpec::Uint { name: "spinning", width: 1 },
                FieldSpec::Uint { name: "queued", width: 1 },
            ]),
        ),
    );
    node.bind_port(
        PortBinding::new(
            step_ports::VELOCITY,
            PacketTemplate::new(vec![FieldSpec::Uint { name: "rate", width: 2 }]),
        )
        .with_response(PacketTemplate::new(vec![FieldSpec::Uint { name: "ok", width: 1 }])),
    );
}
