//! The motion controller: moves in, planned step commands out.

use std::sync::Mutex;

use tracing::debug;

use gantry_core::{
    config::Config,
    error::{ErrorKind, Result},
};
use gantry_node::ActionSequence;

use crate::{
    driver::StepperNode,
    elements::ElementChain,
    kinematics::Kinematics,
    planner::{Planner, PlannerTuning},
    segment::{split_steps, MotionSegment, MAX_SEGMENT_STEPS},
    state::PositionState,
};

/// How a move's acceleration is specified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AccelSpec {
    /// Stage-length units (mm/s²), converted through the move's
    /// steps-per-length ratio.
    StageLength(f64),
    /// Raw step units (steps/s²), used as-is.
    Steps(f64),
}

/// Handle to one issued move: the ordered step commands it produced.
pub struct MoveHandle {
    sequence: ActionSequence,
}

impl MoveHandle {
    /// Blocks until every step command of the move has been transmitted and
    /// acknowledged.
    pub fn wait(self) -> Result<()> {
        self.sequence.wait()?;
        Ok(())
    }

    /// Number of step commands the move produced.
    pub fn commands(&self) -> usize {
        self.sequence.len()
    }
}

/// Drives one stepper node through its axis and kinematics collaborators.
///
/// Moves are planned against the machine's future position, split into step
/// commands bounded by the packet's step capacity, committed for channel
/// access in issue order and released by the lookahead planner once their
/// velocity profiles are final.
pub struct MotionController {
    node: StepperNode,
    axes: Vec<ElementChain>,
    kinematics: Box<dyn Kinematics>,
    position: PositionState,
    /// Future motor positions in whole steps; integers so that chained
    /// moves never accumulate rounding drift.
    motor_steps: Mutex<Vec<i64>>,
    planner: Planner,
    default_acceleration: f64,
}

impl MotionController {
    /// Builds a controller over an attached stepper node.
    ///
    /// The kinematics order and the axis element count must both match the
    /// node's axis count.
    pub fn new(
        node: StepperNode,
        axes: Vec<ElementChain>,
        kinematics: Box<dyn Kinematics>,
        config: &Config,
    ) -> Result<Self> {
        if kinematics.order() != node.axes() {
            return Err(ErrorKind::VectorLength {
                expected: node.axes(),
                got: kinematics.order(),
            });
        }
        if axes.len() != node.axes() {
            return Err(ErrorKind::VectorLength { expected: node.axes(), got: axes.len() });
        }
        let order = node.axes();
        Ok(Self {
            node,
            axes,
            kinematics,
            position: PositionState::new(order),
            motor_steps: Mutex::new(vec![0; order]),
            planner: Planner::spawn(PlannerTuning::from_config(config)),
            default_acceleration: config.default_acceleration,
        })
    }

    /// Issues a move to the given machine position.
    ///
    /// `target` holds one entry per machine coordinate; `None` holds that
    /// coordinate. `velocity` is stage-length units per second along the
    /// move. The step commands are committed immediately (reserving their
    /// transmission slots) and released once the planner finalizes them.
    pub fn move_to(
        &self,
        target: &[Option<f64>],
        velocity: f64,
        acceleration: Option<AccelSpec>,
    ) -> Result<MoveHandle> {
        let current = self.position.future();
        if target.len() != current.len() {
            return Err(ErrorKind::VectorLength { expected: current.len(), got: target.len() });
        }
        let requested: Vec<f64> = target
            .iter()
            .zip(&current)
            .map(|(target, &current)| target.unwrap_or(current))
            .collect();

        // Machine space → axis space → motor steps.
        let axis_positions = self.kinematics.reverse(&requested)?;
        let motor_targets: Vec<i64> = axis_positions
            .iter()
            .zip(&self.axes)
            .map(|(&position, axis)| axis.reverse(position).round() as i64)
            .collect();

        let deltas: Vec<i64> = {
            let mut motor_steps = self.motor_steps.lock().unwrap();
            let deltas: Vec<i64> =
                motor_targets.iter().zip(motor_steps.iter()).map(|(t, c)| t - c).collect();
            motor_steps.copy_from_slice(&motor_targets);
            deltas
        };
        self.position.commit(&requested)?;

        let major = deltas.iter().map(|d| d.abs()).max().unwrap_or(0);
        if major == 0 {
            debug!(node = self.node.standard().node().name(), "zero-length move");
            return Ok(MoveHandle { sequence: ActionSequence::new(Vec::new()) });
        }

        // Rates convert between stage length and steps via the ratio of
        // major-axis steps to Cartesian move length; a zero-length move has
        // zero ratio and hence zero acceleration.
        let length: f64 = requested
            .iter()
            .zip(&current)
            .map(|(r, c)| (r - c) * (r - c))
            .sum::<f64>()
            .sqrt();
        let ratio = if length > 0.0 { major as f64 / length } else { 0.0 };
        let rate_cap = if ratio > 0.0 { velocity * ratio } else { velocity };
        let accel = match acceleration {
            None => self.default_acceleration,
            Some(AccelSpec::Steps(steps)) => steps,
            Some(AccelSpec::StageLength(stage)) => stage * ratio,
        };

        let mut actions = Vec::new();
        for chunk in split_steps(&deltas, MAX_SEGMENT_STEPS) {
            let mut segment = MotionSegment::new(chunk, rate_cap, accel);
            let action = self.node.step_action(segment.command_fields(1.0))?;
            action.commit()?;
            segment.controller = Some(action.controller());
            actions.push(action);
            self.planner.submit(segment)?;
        }

        Ok(MoveHandle { sequence: ActionSequence::new(actions) })
    }

    /// Forces the planner to finalize and release everything it holds.
    pub fn flush(&self) {
        self.planner.flush();
    }

    /// The machine position state (actual and future coordinates).
    pub fn position(&self) -> &PositionState {
        &self.position
    }

    /// The underlying stepper node.
    pub fn node(&self) -> &StepperNode {
        &self.node
    }
}
