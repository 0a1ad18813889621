//! Machine position state.

use std::sync::Mutex;

use gantry_core::error::{ErrorKind, Result};

/// Actual (last reported) and future (last committed) machine positions.
///
/// `commit` tracks where buffered moves will leave the machine and is the
/// base for computing the next move; `update` records real-time position
/// reports from the hardware.
#[derive(Debug)]
pub struct PositionState {
    actual: Mutex<Vec<f64>>,
    future: Mutex<Vec<f64>>,
}

impl PositionState {
    /// Creates a state of the given order, zeroed.
    pub fn new(order: usize) -> Self {
        Self { actual: Mutex::new(vec![0.0; order]), future: Mutex::new(vec![0.0; order]) }
    }

    /// Coordinate vector length.
    pub fn order(&self) -> usize {
        self.actual.lock().unwrap().len()
    }

    /// The last known real-time position.
    pub fn actual(&self) -> Vec<f64> {
        self.actual.lock().unwrap().clone()
    }

    /// The position the machine will hold once all buffered moves finish.
    pub fn future(&self) -> Vec<f64> {
        self.future.lock().unwrap().clone()
    }

    /// Records a real-time position report.
    pub fn update(&self, position: &[f64]) -> Result<()> {
        let mut actual = self.actual.lock().unwrap();
        if position.len() != actual.len() {
            return Err(ErrorKind::VectorLength { expected: actual.len(), got: position.len() });
        }
        actual.copy_from_slice(position);
        Ok(())
    }

    /// Records the endpoint of a newly buffered move.
    pub fn commit(&self, position: &[f64]) -> Result<()> {
        let mut future = self.future.lock().unwrap();
        if position.len() != future.len() {
            return Err(ErrorKind::VectorLength { expected: future.len(), got: position.len() });
        }
        future.copy_from_slice(position);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commit_and_update_are_independent() {
        let state = PositionState::new(2);
        state.commit(&[5.0, 6.0]).unwrap();
        assert_eq!(state.future(), vec![5.0, 6.0]);
        assert_eq!(state.actual(), vec![0.0, 0.0]);

        state.update(&[4.9, 6.1]).unwrap();
        assert_eq!(state.actual(), vec![4.9, 6.1]);
        assert_eq!(state.future(), vec![5.0, 6.0]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let state = PositionState::new(2);
        assert!(state.commit(&[1.0]).is_err());
    }
}
