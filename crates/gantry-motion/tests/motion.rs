//! Integration tests for the gantry-motion crate.
//!
//! A simulated stepper node answers the standard and motion ports over a
//! loopback transport, so these tests cover the whole path: move issue,
//! segment splitting, lookahead planning, deferred release and transmission.

use std::{thread, time::Duration};

use crossbeam_channel::{unbounded, Receiver, Sender};

use gantry_core::{
    config::Config,
    transport::{LoopbackTransport, Transport},
};
use gantry_motion::{
    step_ports, AccelSpec, Direct, Element, ElementChain, MotionController, StepperNode,
};
use gantry_node::{standard::ports, Interface};
use gantry_protocol::{frame::build_frame, Crc8, Frame, FrameReader, TransmitMode};

/// Bytes of one received step command, as laid out by the step template.
#[derive(Debug, Clone)]
struct StepCommand {
    steps: Vec<u8>,
    directions: u8,
    rate: u16,
    accel_steps: u8,
    decel_steps: u8,
}

impl StepCommand {
    fn parse(payload: &[u8], axes: usize) -> Self {
        Self {
            steps: payload[..axes].to_vec(),
            directions: payload[axes],
            rate: u16::from_be_bytes([payload[axes + 1], payload[axes + 2]]),
            accel_steps: payload[axes + 3],
            decel_steps: payload[axes + 4],
        }
    }

    fn signed_steps(&self) -> Vec<i64> {
        self.steps
            .iter()
            .enumerate()
            .map(|(axis, &magnitude)| {
                if self.directions & (1 << axis) != 0 {
                    i64::from(magnitude)
                } else {
                    -i64::from(magnitude)
                }
            })
            .collect()
    }
}

struct SimStepper {
    transport: LoopbackTransport,
    crc: Crc8,
    reader: FrameReader,
    address: u16,
    axes: usize,
    commands: Sender<StepCommand>,
}

impl SimStepper {
    fn spawn(
        transport: LoopbackTransport,
        axes: usize,
    ) -> (Receiver<StepCommand>, thread::JoinHandle<()>) {
        let (commands_tx, commands_rx) = unbounded();
        let sim = SimStepper {
            transport,
            crc: Crc8::new(),
            reader: FrameReader::new(),
            address: 0,
            axes,
            commands: commands_tx,
        };
        let worker = thread::spawn(move || sim.run());
        (commands_rx, worker)
    }

    fn run(mut self) {
        let mut buffer = [0u8; 512];
        loop {
            match self.transport.receive(&mut buffer, Duration::from_millis(20)) {
                Ok(len) => {
                    for frame in self.reader.extend(&buffer[..len]) {
                        self.handle(frame);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(_) => break,
            }
        }
    }

    fn handle(&mut self, frame: Frame) {
        if frame.mode == TransmitMode::Unicast && frame.address != self.address {
            return;
        }
        match frame.port {
            ports::SET_ADDRESS => {
                self.address = u16::from_be_bytes([frame.payload[0], frame.payload[1]]);
                self.reply(ports::SET_ADDRESS, b"gantry.local/stepper".to_vec());
            }
            ports::STATUS => self.reply(ports::STATUS, vec![b'A', 170]),
            step_ports::STEP_COMMAND => {
                let _ = self.commands.send(StepCommand::parse(&frame.payload, self.axes));
                self.reply(step_ports::STEP_COMMAND, vec![16]); // free buffer slots
            }
            step_ports::SPIN_STATUS => self.reply(step_ports::SPIN_STATUS, vec![1, 3]),
            step_ports::VELOCITY => self.reply(step_ports::VELOCITY, vec![1]),
            _ => {}
        }
    }

    fn reply(&self, port: u8, payload: Vec<u8>) {
        let frame =
            build_frame(&self.crc, TransmitMode::Unicast, self.address, port, &payload).unwrap();
        let _ = self.transport.send(&frame);
    }
}

fn test_config() -> Config {
    Config {
        retry_attempts: 3,
        retry_timeout: Duration::from_millis(100),
        receive_poll_timeout: Duration::from_millis(5),
        planner_flush_timeout: Duration::from_millis(250),
        pull_in_speed: 0.0,
        pull_in_acceleration: 20_000.0,
        ..Config::default()
    }
}

/// One-axis rig with a unit steps↔mm axis, so rates in mm/s equal steps/s.
fn single_axis_rig() -> (Interface, MotionController, Receiver<StepCommand>, thread::JoinHandle<()>)
{
    let (host_end, node_end) = LoopbackTransport::pair();
    let (commands, worker) = SimStepper::spawn(node_end, 1);
    let config = test_config();
    let interface = Interface::new(host_end, config.clone());

    let node = StepperNode::attach(&interface, "axis", 1).unwrap();
    let axis = ElementChain::new(vec![Element::new(1.0, "steps", "mm")]).unwrap();
    let controller =
        MotionController::new(node, vec![axis], Box::new(Direct::new(1)), &config).unwrap();
    (interface, controller, commands, worker)
}

fn collect(commands: &Receiver<StepCommand>, expected: usize) -> Vec<StepCommand> {
    (0..expected)
        .map(|_| commands.recv_timeout(Duration::from_secs(5)).expect("step command"))
        .collect()
}

#[test]
fn test_oversized_move_splits_and_conserves_steps() {
    let (interface, controller, commands, worker) = single_axis_rig();

    let handle = controller.move_to(&[Some(600.0)], 400.0, None).unwrap();
    assert_eq!(handle.commands(), 3); // ceil(600 / 255)
    controller.flush();
    handle.wait().unwrap();

    let received = collect(&commands, 3);
    let total: i64 = received.iter().map(|c| c.signed_steps()[0]).sum();
    assert_eq!(total, 600);
    for command in &received {
        assert!(command.steps[0] as i64 <= 255);
    }

    drop(controller);
    drop(interface);
    worker.join().unwrap();
}

#[test]
fn test_collinear_moves_form_a_trapezoid_on_the_wire() {
    let (interface, controller, commands, worker) = single_axis_rig();

    // Three 200-step moves at 500 steps/s with 1000 steps/s² of
    // acceleration: the 125-step ramps fit inside the first and last.
    let accel = Some(AccelSpec::Steps(1000.0));
    let first = controller.move_to(&[Some(200.0)], 500.0, accel).unwrap();
    let second = controller.move_to(&[Some(400.0)], 500.0, accel).unwrap();
    let third = controller.move_to(&[Some(600.0)], 500.0, accel).unwrap();
    controller.flush();
    first.wait().unwrap();
    second.wait().unwrap();
    third.wait().unwrap();

    let received = collect(&commands, 3);
    // Entry rates: rest, full speed, full speed.
    assert_eq!(received[0].rate, 0);
    assert_eq!(received[1].rate, 500);
    assert_eq!(received[2].rate, 500);
    // Acceleration front-loads into the first command, deceleration
    // back-loads into the last; the middle cruises.
    assert_eq!(received[0].accel_steps, 125);
    assert_eq!(received[0].decel_steps, 0);
    assert_eq!(received[1].accel_steps, 0);
    assert_eq!(received[1].decel_steps, 0);
    assert_eq!(received[2].accel_steps, 0);
    assert_eq!(received[2].decel_steps, 125);

    drop(controller);
    drop(interface);
    worker.join().unwrap();
}

#[test]
fn test_zero_length_move_issues_no_commands() {
    let (interface, controller, commands, worker) = single_axis_rig();

    let handle = controller.move_to(&[None], 100.0, None).unwrap();
    assert_eq!(handle.commands(), 0);
    handle.wait().unwrap();
    assert!(commands.try_recv().is_err());

    drop(controller);
    drop(interface);
    worker.join().unwrap();
}

#[test]
fn test_negative_direction_move() {
    let (interface, controller, commands, worker) = single_axis_rig();

    controller.move_to(&[Some(50.0)], 300.0, None).unwrap();
    let back = controller.move_to(&[Some(-30.0)], 300.0, None).unwrap();
    controller.flush();
    back.wait().unwrap();

    let received = collect(&commands, 2);
    assert_eq!(received[0].signed_steps()[0], 50);
    assert_eq!(received[1].signed_steps()[0], -80);

    drop(controller);
    drop(interface);
    worker.join().unwrap();
}

#[test]
fn test_spin_status_and_velocity_round_trip() {
    let (interface, controller, _commands, worker) = single_axis_rig();

    let status = controller.node().spin_status().unwrap();
    assert!(status.spinning);
    assert_eq!(status.queued, 3);

    controller.node().set_velocity(800).unwrap();

    drop(controller);
    drop(interface);
    worker.join().unwrap();
}
