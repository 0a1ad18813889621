use std::{default::Default, time::Duration};

#[derive(Clone, Debug)]
/// Configuration options to tune protocol and planner behavior.
pub struct Config {
    /// Number of transmission attempts before an action reports failure.
    pub retry_attempts: u32,
    /// How long each attempt waits for a response before retransmitting.
    pub retry_timeout: Duration,
    /// How long the receiver blocks on the transport before rechecking for
    /// shutdown. Bounds shutdown latency, not throughput.
    pub receive_poll_timeout: Duration,
    /// Max receive buffer size in bytes for a single transport read.
    pub receive_buffer_size: usize,
    /// Max segments held in the planner lookahead window before the oldest
    /// are finalized and released for transmission.
    pub planner_depth: usize,
    /// Idle time without a new segment after which the whole window is
    /// flushed.
    pub planner_flush_timeout: Duration,
    /// Max step rate at which a stepper can change direction without losing
    /// steps, in steps/s. Bounds junction velocity and serves as the rate at
    /// the head and tail of the planning window.
    pub pull_in_speed: f64,
    /// Acceleration limit used for junction velocity calculation, in
    /// steps/s². Derived from the motor/transmission combination; tune per
    /// machine.
    pub pull_in_acceleration: f64,
    /// Acceleration applied to moves that do not request one, in steps/s².
    pub default_acceleration: f64,
    /// Tick rate of the node's step generator in ticks/s. Acceleration rates
    /// are encoded on the wire as steps/s per tick.
    pub step_time_base: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_attempts: 10,
            retry_timeout: Duration::from_millis(200),
            receive_poll_timeout: Duration::from_millis(5),
            receive_buffer_size: 512,
            planner_depth: 50,
            planner_flush_timeout: Duration::from_millis(100),
            pull_in_speed: 700.0,        // steps/s
            pull_in_acceleration: 20_000.0, // steps/s²
            default_acceleration: 10_000.0, // steps/s²
            step_time_base: 1_000.0,     // ticks/s
        }
    }
}
