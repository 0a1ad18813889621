//! Drive a two-axis H-bot stage over a UDP-attached node network.
//!
//! Run:
//! - cargo run -p gantry --example xy_stage -- 192.168.1.30:8000

use std::env;

use gantry::{
    AccelSpec, Element, ElementChain, HBot, Interface, MotionController, StepperNode,
    UdpTransport,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let remote = env::args().nth(1).unwrap_or_else(|| "192.168.1.30:8000".to_owned());

    let transport = UdpTransport::connect("0.0.0.0:0", remote.as_str())?;
    let interface = Interface::with_defaults(transport);

    // One dual-axis driver node; both motors share the H-bot belt.
    let node = StepperNode::attach(&interface, "stage", 2)?;
    println!("stage node acquired at address {:#06x}", node.standard().node().address());

    let belt_axis = || {
        ElementChain::new(vec![
            Element::microstep(4),
            Element::stepper(1.8),
            Element::pulley(18.0),
        ])
    };
    let machine = MotionController::new(
        node,
        vec![belt_axis()?, belt_axis()?],
        Box::new(HBot::new(false, false)),
        interface.config(),
    )?;

    // Trace a 40 mm square at 30 mm/s.
    let corners = [(40.0, 0.0), (40.0, 40.0), (0.0, 40.0), (0.0, 0.0)];
    for (x, y) in corners {
        let handle = machine.move_to(
            &[Some(x), Some(y)],
            30.0,
            Some(AccelSpec::StageLength(200.0)),
        )?;
        handle.wait()?;
        println!("reached ({x}, {y})");
    }

    let status = machine.node().spin_status()?;
    println!("spinning: {}, queued commands: {}", status.spinning, status.queued);
    Ok(())
}
