//! The lookahead motion planner.
//!
//! Segments enter a bounded sliding window. Each admission recomputes the
//! junction-limited forward (acceleration) pass and the reverse
//! (deceleration) pass over the window. Once the window overflows or goes
//! idle, the oldest segments are finalized: their profiles are written into
//! their committed step commands, which are then released for transmission.

use std::{
    collections::VecDeque,
    thread::{Builder, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, trace, warn};

use gantry_core::{
    config::Config,
    error::{ErrorKind, Result},
};

use crate::segment::MotionSegment;

/// Planner parameters lifted out of the interface configuration.
#[derive(Debug, Clone)]
pub(crate) struct PlannerTuning {
    pub depth: usize,
    pub flush_timeout: Duration,
    pub pull_in_speed: f64,
    pub pull_in_acceleration: f64,
    pub step_time_base: f64,
}

impl PlannerTuning {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            depth: config.planner_depth,
            flush_timeout: config.planner_flush_timeout,
            pull_in_speed: config.pull_in_speed,
            pull_in_acceleration: config.pull_in_acceleration,
            step_time_base: config.step_time_base,
        }
    }
}

enum PlannerMsg {
    Segment(Box<MotionSegment>),
    Flush,
}

/// Handle to the planner worker thread.
pub(crate) struct Planner {
    tx: Option<Sender<PlannerMsg>>,
    worker: Option<JoinHandle<()>>,
}

impl Planner {
    pub(crate) fn spawn(tuning: PlannerTuning) -> Self {
        let (tx, rx) = unbounded();
        let worker = Builder::new()
            .name("gantry-planner".to_owned())
            .spawn(move || PlannerWindow::new(tuning).run(rx))
            .expect("failed to spawn planner thread");
        Self { tx: Some(tx), worker: Some(worker) }
    }

    /// Hands a segment to the planner thread.
    pub(crate) fn submit(&self, segment: MotionSegment) -> Result<()> {
        self.tx
            .as_ref()
            .expect("planner sender lives until drop")
            .send(PlannerMsg::Segment(Box::new(segment)))
            .map_err(|_| ErrorKind::InterfaceClosed)
    }

    /// Forces finalization of everything currently in the window.
    pub(crate) fn flush(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(PlannerMsg::Flush);
        }
    }
}

impl Drop for Planner {
    fn drop(&mut self) {
        // Closing the channel drains and finalizes the window.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// The worker-side window state.
struct PlannerWindow {
    tuning: PlannerTuning,
    window: VecDeque<MotionSegment>,
    /// Direction of the most recently admitted segment, for junction math.
    last_direction: Option<Vec<f64>>,
    /// Exit rate of the most recently finalized segment: the entry baseline
    /// once the window has drained.
    baseline_exit: f64,
}

impl PlannerWindow {
    fn new(tuning: PlannerTuning) -> Self {
        let baseline_exit = tuning.pull_in_speed;
        Self { tuning, window: VecDeque::new(), last_direction: None, baseline_exit }
    }

    fn run(mut self, rx: Receiver<PlannerMsg>) {
        loop {
            match rx.recv_timeout(self.tuning.flush_timeout) {
                Ok(PlannerMsg::Segment(segment)) => self.admit(*segment),
                Ok(PlannerMsg::Flush) => self.flush_all(),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.window.is_empty() {
                        debug!(segments = self.window.len(), "idle flush of planner window");
                        self.flush_all();
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    self.flush_all();
                    break;
                }
            }
        }
        trace!("planner stopped");
    }

    fn admit(&mut self, mut segment: MotionSegment) {
        segment.entry_junction = junction_rate(
            self.last_direction.as_deref(),
            &segment.direction,
            self.tuning.pull_in_acceleration,
        );
        self.last_direction = Some(segment.direction.clone());
        self.window.push_back(segment);

        forward_pass(&mut self.window, self.baseline_exit);
        reverse_pass(&mut self.window, self.tuning.pull_in_speed);

        while self.window.len() > self.tuning.depth {
            let oldest = self.window.pop_front().expect("window is non-empty");
            self.finalize(oldest);
        }
    }

    fn flush_all(&mut self) {
        while let Some(segment) = self.window.pop_front() {
            self.finalize(segment);
        }
    }

    /// Pushes the finalized profile into the committed step command and
    /// releases it for real transmission.
    fn finalize(&mut self, segment: MotionSegment) {
        self.baseline_exit = segment.exit_rate;
        let Some(controller) = &segment.controller else {
            return;
        };
        let payload = segment.command_fields(self.tuning.step_time_base);
        if let Err(error) = controller.update(payload) {
            warn!(%error, "finalized segment could not update its step command");
        }
        controller.release();
    }
}

/// The maximum step rate at which two consecutive direction vectors can both
/// be honored without exceeding the pull-in acceleration limit.
///
/// A straight continuation is unbounded; a full reversal of a unit direction
/// yields `sqrt(pull_in_accel / 2)`.
pub(crate) fn junction_rate(
    previous: Option<&[f64]>,
    current: &[f64],
    pull_in_accel: f64,
) -> f64 {
    let Some(previous) = previous else {
        return f64::INFINITY;
    };
    let delta = previous
        .iter()
        .zip(current)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    if delta > 0.0 {
        (pull_in_accel / delta).sqrt()
    } else {
        f64::INFINITY
    }
}

/// Forward (acceleration) pass over the window, oldest to newest.
pub(crate) fn forward_pass(window: &mut VecDeque<MotionSegment>, baseline_exit: f64) {
    let mut previous_exit = baseline_exit;
    for segment in window.iter_mut() {
        segment.entry_rate = previous_exit.min(segment.entry_junction).min(segment.rate_cap);
        let length = segment.major_steps;

        if segment.accel > 0.0 {
            // d = (v_f² − v_i²) / (2a), clamped to the segment.
            let to_cap =
                (segment.rate_cap.powi(2) - segment.entry_rate.powi(2)) / (2.0 * segment.accel);
            segment.accel_steps = to_cap.clamp(0.0, length);
            segment.exit_rate =
                (segment.entry_rate.powi(2) + 2.0 * segment.accel * segment.accel_steps).sqrt();
        } else {
            segment.accel_steps = 0.0;
            segment.exit_rate = segment.entry_rate;
        }
        previous_exit = segment.exit_rate;
    }
}

/// Reverse (deceleration) pass over the window, newest to oldest.
///
/// The window tail always plans down to the pull-in speed so the machine can
/// stop if no further segments arrive.
pub(crate) fn reverse_pass(window: &mut VecDeque<MotionSegment>, pull_in_speed: f64) {
    let mut next_entry = pull_in_speed;
    for segment in window.iter_mut().rev() {
        segment.exit_rate = segment.exit_rate.min(next_entry);
        let length = segment.major_steps;
        let (entry, exit) = (segment.entry_rate, segment.exit_rate);
        let (cap, accel) = (segment.rate_cap, segment.accel);

        let reverse_entry;
        if accel <= 0.0 || length == 0.0 {
            segment.decel_steps = 0.0;
            reverse_entry = entry;
        } else {
            let accel_full = (cap.powi(2) - entry.powi(2)) / (2.0 * accel);
            let decel_full = (cap.powi(2) - exit.powi(2)) / (2.0 * accel);

            if accel_full + decel_full <= length {
                // Trapezoid: cruise at the cap between the ramps.
                segment.accel_steps = accel_full;
                segment.decel_steps = decel_full;
                reverse_entry = entry;
            } else if exit <= entry && (entry.powi(2) - exit.powi(2)) / (2.0 * accel) >= length {
                // The whole segment decelerates and still cannot reach the
                // planned entry; the deficit propagates backward.
                segment.accel_steps = 0.0;
                segment.decel_steps = length;
                reverse_entry = (exit.powi(2) + 2.0 * accel * length).sqrt();
                segment.entry_rate = entry.min(reverse_entry);
            } else {
                // Ramps overlap: accelerate to the intersection point, then
                // decelerate; no cruise phase.
                let accel_len = ((exit.powi(2) - entry.powi(2)) / (4.0 * accel) + length / 2.0)
                    .clamp(0.0, length);
                segment.accel_steps = accel_len;
                segment.decel_steps = length - accel_len;
                reverse_entry = entry;
            }
        }
        next_entry = segment.entry_rate.min(reverse_entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCEL: f64 = 1000.0; // steps/s²
    const CAP: f64 = 500.0; // steps/s

    fn collinear_segment(length: i64) -> MotionSegment {
        MotionSegment::new(vec![length, 0], CAP, ACCEL)
    }

    fn plan(window: &mut VecDeque<MotionSegment>, pull_in_speed: f64) {
        let mut last_direction: Option<Vec<f64>> = None;
        for segment in window.iter_mut() {
            segment.entry_junction =
                junction_rate(last_direction.as_deref(), &segment.direction, 20_000.0);
            last_direction = Some(segment.direction.clone());
        }
        forward_pass(window, pull_in_speed);
        reverse_pass(window, pull_in_speed);
    }

    #[test]
    fn test_junction_straight_continuation_is_unbounded() {
        let direction = [1.0, 0.0];
        assert_eq!(junction_rate(Some(&direction), &direction, 20_000.0), f64::INFINITY);
    }

    #[test]
    fn test_junction_full_reversal() {
        let rate = junction_rate(Some(&[1.0, 0.0]), &[-1.0, 0.0], 20_000.0);
        assert!((rate - (20_000.0f64 / 2.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_junction_first_segment_is_unbounded() {
        assert_eq!(junction_rate(None, &[1.0, 0.0], 20_000.0), f64::INFINITY);
    }

    #[test]
    fn test_trapezoid_across_three_collinear_segments() {
        // Each segment is long enough to reach the cap from rest on its own.
        let ramp = CAP * CAP / (2.0 * ACCEL); // 125 steps
        let length = (4.0 * ramp) as i64;

        let mut window: VecDeque<_> =
            (0..3).map(|_| collinear_segment(length)).collect();
        plan(&mut window, 0.0);

        // The middle segment cruises at the cap: no deceleration between
        // same-direction segments at maximum rate.
        assert!((window[1].entry_rate - CAP).abs() < 1e-6);
        assert!((window[1].exit_rate - CAP).abs() < 1e-6);
        assert_eq!(window[1].accel_steps, 0.0);
        assert_eq!(window[1].decel_steps, 0.0);

        // The first accelerates from rest; the last decelerates to rest.
        assert!((window[0].entry_rate - 0.0).abs() < 1e-9);
        assert!((window[0].accel_steps - ramp).abs() < 1e-6);
        assert!((window[2].exit_rate - 0.0).abs() < 1e-9);
        assert!((window[2].decel_steps - ramp).abs() < 1e-6);
    }

    #[test]
    fn test_short_segment_has_no_cruise_phase() {
        // Too short to reach the cap: the ramps meet in the middle.
        let ramp = CAP * CAP / (2.0 * ACCEL);
        let length = ramp as i64; // half of what a full accel+decel needs

        let mut window: VecDeque<_> = std::iter::once(collinear_segment(length)).collect();
        plan(&mut window, 0.0);

        let segment = &window[0];
        assert!((segment.accel_steps - length as f64 / 2.0).abs() < 1e-6);
        assert!((segment.decel_steps - length as f64 / 2.0).abs() < 1e-6);
        let peak = (2.0f64 * ACCEL * segment.accel_steps).sqrt();
        assert!(peak < CAP);
    }

    #[test]
    fn test_reversal_limits_junction_between_segments() {
        let pull_in_accel = 20_000.0;
        let length = 10_000;
        let mut window = VecDeque::new();
        window.push_back(MotionSegment::new(vec![length, 0], CAP, ACCEL));
        window.push_back(MotionSegment::new(vec![-length, 0], CAP, ACCEL));

        let mut last_direction: Option<Vec<f64>> = None;
        for segment in window.iter_mut() {
            segment.entry_junction =
                junction_rate(last_direction.as_deref(), &segment.direction, pull_in_accel);
            last_direction = Some(segment.direction.clone());
        }
        forward_pass(&mut window, 0.0);
        reverse_pass(&mut window, 0.0);

        let junction = (pull_in_accel / 2.0f64).sqrt(); // = 100 steps/s
        assert!(window[0].exit_rate <= junction + 1e-9);
        assert!(window[1].entry_rate <= junction + 1e-9);
    }

    #[test]
    fn test_unreachable_entry_propagates_backward() {
        // A long fast segment followed by a stub too short to decelerate in:
        // the stub's reachable entry rate caps the first segment's exit.
        let mut window = VecDeque::new();
        window.push_back(MotionSegment::new(vec![10_000, 0], CAP, ACCEL));
        window.push_back(MotionSegment::new(vec![20, 0], CAP, ACCEL));
        plan(&mut window, 0.0);

        let reachable = (2.0f64 * ACCEL * 20.0).sqrt();
        assert!(window[1].entry_rate <= reachable + 1e-6);
        assert!(window[0].exit_rate <= window[1].entry_rate + 1e-6);
        assert_eq!(window[1].decel_steps, 20.0);
    }

    #[test]
    fn test_zero_acceleration_never_ramps() {
        let mut window: VecDeque<_> =
            std::iter::once(MotionSegment::new(vec![100, 0], CAP, 0.0)).collect();
        plan(&mut window, 0.0);
        assert_eq!(window[0].accel_steps, 0.0);
        assert_eq!(window[0].decel_steps, 0.0);
        assert_eq!(window[0].entry_rate, 0.0);
    }
}
