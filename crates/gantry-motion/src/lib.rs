#![warn(missing_docs)]

//! gantry-motion: continuous motion over discrete step hardware.
//!
//! A [`MotionController`] accepts moves in machine coordinates, converts
//! them to integer motor steps through its kinematics and axis element
//! collaborators, and feeds the resulting segments through a lookahead
//! planner that limits junction velocities and shapes accelerations before
//! the step commands are released for transmission.

/// Axis elements: unit-conversion chains between motors and stage travel.
pub mod elements;
/// Kinematics transforms between axis space and machine space.
pub mod kinematics;
mod controller;
mod driver;
mod planner;
mod segment;
mod state;

pub use controller::{AccelSpec, MotionController, MoveHandle};
pub use driver::{step_ports, SpinStatus, StepperNode};
pub use elements::{Element, ElementChain};
pub use kinematics::{Chain, Compound, Direct, HBot, Kinematics, Matrix, Route};
pub use state::PositionState;
