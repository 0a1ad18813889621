//! Motion segments and oversized-move splitting.

use gantry_node::ActionController;
use gantry_protocol::FieldMap;

/// Largest major-axis step count a single step command can carry.
pub(crate) const MAX_SEGMENT_STEPS: i64 = 255;

/// Field names of the step command payload, shared with the driver's port
/// template.
pub(crate) mod fields {
    pub const STEPS: &str = "steps";
    pub const DIRECTIONS: &str = "directions";
    pub const RATE: &str = "rate";
    pub const ACCEL_STEPS: &str = "accel_steps";
    pub const DECEL_STEPS: &str = "decel_steps";
    pub const ACCEL_RATE: &str = "accel_rate";
}

/// One planned slice of motion, bounded to a single step command.
///
/// Created by the controller when a move is issued; lives in the planner's
/// lookahead window until its velocity profile is finalized and its
/// committed step command is released. Mutated only by the planner thread.
pub(crate) struct MotionSegment {
    /// Per-axis signed step delta.
    pub steps: Vec<i64>,
    /// Dominant-axis step count, carried as float for the rate math.
    pub major_steps: f64,
    /// Euclidean-normalized direction of the step vector.
    pub direction: Vec<f64>,
    /// Requested peak step rate, steps/s.
    pub rate_cap: f64,
    /// Acceleration limit, steps/s².
    pub accel: f64,
    /// Junction rate limit against the preceding segment.
    pub entry_junction: f64,
    /// Planned entry rate (forward pass result).
    pub entry_rate: f64,
    /// Planned exit rate (reverse pass result).
    pub exit_rate: f64,
    /// Steps spent accelerating, float until finalization.
    pub accel_steps: f64,
    /// Steps spent decelerating, float until finalization.
    pub decel_steps: f64,
    /// Edit-and-release handle to the committed step command, if any.
    pub controller: Option<ActionController>,
}

impl MotionSegment {
    pub(crate) fn new(steps: Vec<i64>, rate_cap: f64, accel: f64) -> Self {
        let major = steps.iter().map(|s| s.abs()).max().unwrap_or(0);
        let length = steps.iter().map(|&s| (s * s) as f64).sum::<f64>().sqrt();
        let direction = if length > 0.0 {
            steps.iter().map(|&s| s as f64 / length).collect()
        } else {
            vec![0.0; steps.len()]
        };
        Self {
            steps,
            major_steps: major as f64,
            direction,
            rate_cap,
            accel,
            entry_junction: f64::INFINITY,
            entry_rate: 0.0,
            exit_rate: 0.0,
            accel_steps: 0.0,
            decel_steps: 0.0,
            controller: None,
        }
    }

    /// Builds the step command payload for the finalized profile.
    ///
    /// Rates and ramp lengths are carried in floating point throughout
    /// planning and rounded to integers only here. The accel/decel step
    /// counts are clamped so they never exceed the segment's total steps;
    /// deceleration dominates on conflict.
    pub(crate) fn command_fields(&self, time_base: f64) -> FieldMap {
        let total = self.major_steps;
        let decel = self.decel_steps.round().min(total);
        let accel = self.accel_steps.round().min(total - decel);

        let magnitudes: Vec<u8> = self.steps.iter().map(|s| s.unsigned_abs() as u8).collect();
        let directions = self
            .steps
            .iter()
            .enumerate()
            .fold(0u8, |mask, (axis, &s)| if s > 0 { mask | (1 << axis) } else { mask });

        // Acceleration is encoded as steps/s per tick of the node's step
        // generator.
        let accel_rate = (self.accel / time_base).round() as u64;

        FieldMap::new()
            .with_bytes(fields::STEPS, magnitudes)
            .with_uint(fields::DIRECTIONS, u64::from(directions))
            .with_uint(fields::RATE, self.entry_rate.round() as u64)
            .with_uint(fields::ACCEL_STEPS, accel as u64)
            .with_uint(fields::DECEL_STEPS, decel as u64)
            .with_uint(fields::ACCEL_RATE, accel_rate)
    }
}

/// Splits a per-axis step delta into the fewest chunks whose major-axis
/// counts fit a single step command.
///
/// Chunk `i` of a delta `d` over `k` chunks is `⌊d(i+1)/k⌋ − ⌊di/k⌋`: the
/// chunks sum exactly to `d` (no axis drift) and differ pairwise by at most
/// one step.
pub(crate) fn split_steps(steps: &[i64], max_steps: i64) -> Vec<Vec<i64>> {
    let major = steps.iter().map(|s| s.abs()).max().unwrap_or(0);
    let chunks = ((major + max_steps - 1) / max_steps).max(1);

    (0..chunks)
        .map(|i| {
            steps
                .iter()
                .map(|&d| (d * (i + 1)).div_euclid(chunks) - (d * i).div_euclid(chunks))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_conserved(delta: &[i64], chunks: &[Vec<i64>]) {
        for (axis, &d) in delta.iter().enumerate() {
            let sum: i64 = chunks.iter().map(|c| c[axis]).sum();
            assert_eq!(sum, d, "axis {} drifted", axis);
            let magnitudes: Vec<i64> = chunks.iter().map(|c| c[axis]).collect();
            let min = magnitudes.iter().min().unwrap();
            let max = magnitudes.iter().max().unwrap();
            assert!(max - min <= 1, "axis {} chunks uneven: {:?}", axis, magnitudes);
        }
    }

    #[test]
    fn test_small_move_is_one_chunk() {
        let chunks = split_steps(&[100, -42], MAX_SEGMENT_STEPS);
        assert_eq!(chunks, vec![vec![100, -42]]);
    }

    #[test]
    fn test_split_conserves_steps() {
        let delta = [1000, -713, 3];
        let chunks = split_steps(&delta, MAX_SEGMENT_STEPS);
        assert_eq!(chunks.len(), 4); // ceil(1000 / 255)
        assert!(chunks.iter().all(|c| c.iter().all(|s| s.abs() <= MAX_SEGMENT_STEPS)));
        assert_conserved(&delta, &chunks);
    }

    #[test]
    fn test_split_exact_boundary() {
        let chunks = split_steps(&[510], MAX_SEGMENT_STEPS);
        assert_eq!(chunks, vec![vec![255], vec![255]]);
    }

    #[test]
    fn test_split_negative_major_axis() {
        let delta = [-600, 599];
        let chunks = split_steps(&delta, MAX_SEGMENT_STEPS);
        assert_eq!(chunks.len(), 3);
        assert_conserved(&delta, &chunks);
    }

    #[test]
    fn test_resplit_is_idempotent() {
        let delta = [777, -321];
        let first = split_steps(&delta, MAX_SEGMENT_STEPS);
        for chunk in &first {
            // Every chunk already fits, so re-splitting yields it unchanged.
            assert_eq!(split_steps(chunk, MAX_SEGMENT_STEPS), vec![chunk.clone()]);
        }
    }

    #[test]
    fn test_zero_delta() {
        let chunks = split_steps(&[0, 0], MAX_SEGMENT_STEPS);
        assert_eq!(chunks, vec![vec![0, 0]]);
    }

    #[test]
    fn test_direction_vector_is_normalized() {
        let segment = MotionSegment::new(vec![3, 4], 100.0, 1000.0);
        assert!((segment.direction[0] - 0.6).abs() < 1e-9);
        assert!((segment.direction[1] - 0.8).abs() < 1e-9);
        assert_eq!(segment.major_steps, 4.0);
    }

    #[test]
    fn test_command_fields_round_and_clamp() {
        let mut segment = MotionSegment::new(vec![10, -20], 400.0, 2000.0);
        segment.entry_rate = 350.4;
        segment.accel_steps = 15.0;
        segment.decel_steps = 12.0;

        let payload = segment.command_fields(1000.0);
        assert_eq!(payload.bytes(fields::STEPS).unwrap(), &[10, 20]);
        assert_eq!(payload.uint(fields::DIRECTIONS).unwrap(), 0b01);
        assert_eq!(payload.uint(fields::RATE).unwrap(), 350);
        // Deceleration keeps its 12 steps; acceleration is clamped to the
        // 8 that remain of the 20-step segment.
        assert_eq!(payload.uint(fields::DECEL_STEPS).unwrap(), 12);
        assert_eq!(payload.uint(fields::ACCEL_STEPS).unwrap(), 8);
        assert_eq!(payload.uint(fields::ACCEL_RATE).unwrap(), 2);
    }
}
