//! Kinematics transforms between axis space and machine space.
//!
//! A transform maps fixed-length coordinate vectors in both directions;
//! forward and reverse must be exact inverses to floating-point rounding.
//! Vector-length mismatches are machine configuration errors and fail fast.

use gantry_core::error::{ErrorKind, Result};

/// A bidirectional map between axis coordinates and machine coordinates.
pub trait Kinematics: Send + Sync {
    /// Axis space → machine space.
    fn forward(&self, axes: &[f64]) -> Result<Vec<f64>>;
    /// Machine space → axis space.
    fn reverse(&self, machine: &[f64]) -> Result<Vec<f64>>;
    /// The coordinate vector length this transform operates on.
    fn order(&self) -> usize;
}

/// A dense transformation matrix.
#[derive(Debug, Clone)]
pub struct Matrix {
    rows: Vec<Vec<f64>>,
}

impl Matrix {
    /// Builds a matrix from its rows.
    ///
    /// # Panics
    /// If the rows are not all the same length (malformed machine
    /// definition).
    pub fn new(rows: Vec<Vec<f64>>) -> Self {
        if let Some(first) = rows.first() {
            let width = first.len();
            assert!(
                rows.iter().all(|row| row.len() == width),
                "matrix rows must all be the same length"
            );
        }
        Self { rows }
    }

    /// The identity matrix of the given order.
    pub fn identity(order: usize) -> Self {
        Self {
            rows: (0..order)
                .map(|i| (0..order).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
                .collect(),
        }
    }

    /// Number of input coordinates (columns).
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }

    /// Applies the matrix to a vector.
    pub fn transform(&self, vector: &[f64]) -> Result<Vec<f64>> {
        if vector.len() != self.width() {
            return Err(ErrorKind::VectorLength { expected: self.width(), got: vector.len() });
        }
        Ok(self
            .rows
            .iter()
            .map(|row| row.iter().zip(vector).map(|(a, b)| a * b).sum())
            .collect())
    }
}

/// Identity kinematics: axes map directly onto machine coordinates.
#[derive(Debug, Clone)]
pub struct Direct {
    order: usize,
}

impl Direct {
    /// Identity transform over vectors of the given length.
    pub fn new(order: usize) -> Self {
        Self { order }
    }

    fn check(&self, vector: &[f64]) -> Result<Vec<f64>> {
        if vector.len() != self.order {
            return Err(ErrorKind::VectorLength { expected: self.order, got: vector.len() });
        }
        Ok(vector.to_vec())
    }
}

impl Kinematics for Direct {
    fn forward(&self, axes: &[f64]) -> Result<Vec<f64>> {
        self.check(axes)
    }
    fn reverse(&self, machine: &[f64]) -> Result<Vec<f64>> {
        self.check(machine)
    }
    fn order(&self) -> usize {
        self.order
    }
}

/// Routing kinematics: a permutation of coordinates.
#[derive(Debug, Clone)]
pub struct Route {
    to_axes: Matrix,
    to_machine: Matrix,
}

impl Route {
    /// Routes machine coordinate `routing[i]` onto axis `i`.
    pub fn new(routing: &[usize]) -> Self {
        let order = routing.len();
        let to_axes = Matrix::new(
            routing
                .iter()
                .map(|&source| (0..order).map(|j| if j == source { 1.0 } else { 0.0 }).collect())
                .collect(),
        );
        let to_machine = Matrix::new(
            (0..order)
                .map(|i| routing.iter().map(|&source| if source == i { 1.0 } else { 0.0 }).collect())
                .collect(),
        );
        Self { to_axes, to_machine }
    }
}

impl Kinematics for Route {
    fn forward(&self, axes: &[f64]) -> Result<Vec<f64>> {
        self.to_machine.transform(axes)
    }
    fn reverse(&self, machine: &[f64]) -> Result<Vec<f64>> {
        self.to_axes.transform(machine)
    }
    fn order(&self) -> usize {
        self.to_axes.width()
    }
}

/// H-bot (CoreXY-style) kinematics over two axes.
#[derive(Debug, Clone)]
pub struct HBot {
    to_machine: Matrix,
    to_axes: Matrix,
}

impl HBot {
    /// Builds the transform, optionally inverting either machine axis.
    pub fn new(invert_x: bool, invert_y: bool) -> Self {
        let x = if invert_x { -1.0 } else { 1.0 };
        let y = if invert_y { -1.0 } else { 1.0 };
        Self {
            to_machine: Matrix::new(vec![vec![0.5 * x, 0.5 * x], vec![0.5 * y, -0.5 * y]]),
            to_axes: Matrix::new(vec![vec![x, y], vec![x, -y]]),
        }
    }
}

impl Kinematics for HBot {
    fn forward(&self, axes: &[f64]) -> Result<Vec<f64>> {
        self.to_machine.transform(axes)
    }
    fn reverse(&self, machine: &[f64]) -> Result<Vec<f64>> {
        self.to_axes.transform(machine)
    }
    fn order(&self) -> usize {
        2
    }
}

/// Block-diagonal composition: each stage transforms its own slice of the
/// coordinate vector.
pub struct Compound {
    sections: Vec<Box<dyn Kinematics>>,
    order: usize,
}

impl Compound {
    /// Composes independent sections along the diagonal.
    pub fn new(sections: Vec<Box<dyn Kinematics>>) -> Self {
        let order = sections.iter().map(|s| s.order()).sum();
        Self { sections, order }
    }

    fn apply(
        &self,
        vector: &[f64],
        apply: impl Fn(&dyn Kinematics, &[f64]) -> Result<Vec<f64>>,
    ) -> Result<Vec<f64>> {
        if vector.len() != self.order {
            return Err(ErrorKind::VectorLength { expected: self.order, got: vector.len() });
        }
        let mut output = Vec::with_capacity(self.order);
        let mut offset = 0;
        for section in &self.sections {
            let slice = &vector[offset..offset + section.order()];
            output.extend(apply(section.as_ref(), slice)?);
            offset += section.order();
        }
        Ok(output)
    }
}

impl Kinematics for Compound {
    fn forward(&self, axes: &[f64]) -> Result<Vec<f64>> {
        self.apply(axes, |section, slice| section.forward(slice))
    }
    fn reverse(&self, machine: &[f64]) -> Result<Vec<f64>> {
        self.apply(machine, |section, slice| section.reverse(slice))
    }
    fn order(&self) -> usize {
        self.order
    }
}

/// Serial composition: stages applied in order forward, reversed backward.
pub struct Chain {
    stages: Vec<Box<dyn Kinematics>>,
    order: usize,
}

impl Chain {
    /// Chains transforms; all stages must share one order.
    pub fn new(stages: Vec<Box<dyn Kinematics>>) -> Self {
        let order = stages.first().map_or(0, |s| s.order());
        assert!(
            stages.iter().all(|s| s.order() == order),
            "chained kinematics must share one order"
        );
        Self { stages, order }
    }
}

impl Kinematics for Chain {
    fn forward(&self, axes: &[f64]) -> Result<Vec<f64>> {
        let mut vector = axes.to_vec();
        for stage in &self.stages {
            vector = stage.forward(&vector)?;
        }
        Ok(vector)
    }
    fn reverse(&self, machine: &[f64]) -> Result<Vec<f64>> {
        let mut vector = machine.to_vec();
        for stage in self.stages.iter().rev() {
            vector = stage.reverse(&vector)?;
        }
        Ok(vector)
    }
    fn order(&self) -> usize {
        self.order
    }
}
