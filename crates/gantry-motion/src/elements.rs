//! Axis elements: the unit-conversion stages between a motor and its stage.
//!
//! An element scales a scalar between adjacent unit domains (microsteps to
//! steps, steps to revolutions, revolutions to millimeters of travel). A
//! chain composes elements; its `forward` maps motor units to stage travel
//! and `reverse` maps travel back to motor units. Forward and reverse are
//! exact inverses to floating-point rounding.

use gantry_core::error::{ErrorKind, Result};

/// Unit tag matching any adjacent unit (used by unit-preserving elements).
const ANY_UNITS: &str = "*";

/// One scaling stage between two unit domains.
#[derive(Debug, Clone)]
pub struct Element {
    ratio: f64,
    input_units: &'static str,
    output_units: &'static str,
}

impl Element {
    /// A custom scaling element: `forward(v) = v * ratio`.
    pub fn new(ratio: f64, input_units: &'static str, output_units: &'static str) -> Self {
        Self { ratio, input_units, output_units }
    }

    /// Microstepping driver: microsteps → whole steps.
    pub fn microstep(count: u32) -> Self {
        Self::new(1.0 / f64::from(count.max(1)), "usteps", "steps")
    }

    /// Stepper motor with the given step angle: steps → revolutions.
    pub fn stepper(step_angle_degrees: f64) -> Self {
        Self::new(step_angle_degrees / 360.0, "steps", "rev")
    }

    /// Leadscrew with the given lead: revolutions → millimeters.
    pub fn leadscrew(lead_mm: f64) -> Self {
        Self::new(lead_mm, "rev", "mm")
    }

    /// Timing pulley with the given pitch diameter: revolutions →
    /// millimeters of belt travel.
    pub fn pulley(pitch_diameter_mm: f64) -> Self {
        Self::new(std::f64::consts::PI * pitch_diameter_mm, "rev", "mm")
    }

    /// Direction inverter; unit-preserving.
    pub fn invert() -> Self {
        Self::new(-1.0, ANY_UNITS, ANY_UNITS)
    }

    /// Maps a value from the input domain into the output domain.
    pub fn forward(&self, value: f64) -> f64 {
        value * self.ratio
    }

    /// Maps a value from the output domain back into the input domain.
    pub fn reverse(&self, value: f64) -> f64 {
        value / self.ratio
    }

    /// The units this element consumes in the forward direction.
    pub fn input_units(&self) -> &'static str {
        self.input_units
    }

    /// The units this element produces in the forward direction.
    pub fn output_units(&self) -> &'static str {
        self.output_units
    }
}

/// An ordered chain of elements forming one axis.
#[derive(Debug, Clone)]
pub struct ElementChain {
    elements: Vec<Element>,
}

impl ElementChain {
    /// Composes elements in forward order (motor side first).
    ///
    /// Adjacent elements must agree about units; a mismatch is a machine
    /// configuration error and fails fast.
    pub fn new(elements: Vec<Element>) -> Result<Self> {
        let mut current: Option<&'static str> = None;
        for element in &elements {
            if element.input_units != ANY_UNITS {
                if let Some(units) = current {
                    if units != element.input_units {
                        return Err(ErrorKind::UnitMismatch {
                            upstream: units,
                            downstream: element.input_units,
                        });
                    }
                }
            }
            if element.output_units != ANY_UNITS {
                current = Some(element.output_units);
            }
        }
        Ok(Self { elements })
    }

    /// Motor units → stage travel.
    pub fn forward(&self, value: f64) -> f64 {
        self.elements.iter().fold(value, |value, element| element.forward(value))
    }

    /// Stage travel → motor units.
    pub fn reverse(&self, value: f64) -> f64 {
        self.elements.iter().rev().fold(value, |value, element| element.reverse(value))
    }
}
