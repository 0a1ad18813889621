//! The interface: one shared channel, its worker threads and node registry.
//!
//! Three workers run per interface: the arbiter (see [`crate::arbiter`]),
//! a receiver reassembling transport bytes into validated frames, and a
//! router dispatching each frame to the node registered at its address.

use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{Builder, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, warn};

use gantry_core::{config::Config, transport::Transport};
use gantry_protocol::{Crc8, Frame, FrameReader};

use crate::{action::ActionState, arbiter, node::NodeCore, registry::NodeRegistry, VirtualNode};

/// How often blocked waits recheck for interface shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Interface state shared with worker threads and node handles.
pub(crate) struct InterfaceCore {
    pub(crate) config: Config,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) crc: Crc8,
    pub(crate) registry: NodeRegistry,
    pub(crate) commit_tx: Sender<Arc<ActionState>>,
    shutdown: AtomicBool,
}

impl InterfaceCore {
    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

/// A host connection to one physical node network.
///
/// Owns the worker threads; dropping the interface stops them. Node handles
/// created from it keep the shared state alive, but their requests fail with
/// `InterfaceClosed` once the interface is gone.
pub struct Interface {
    core: Arc<InterfaceCore>,
    workers: Vec<JoinHandle<()>>,
}

impl Interface {
    /// Opens an interface over the given transport.
    pub fn new(transport: impl Transport, config: Config) -> Self {
        let (commit_tx, commit_rx) = unbounded();
        let core = Arc::new(InterfaceCore {
            config,
            transport: Arc::new(transport),
            crc: Crc8::new(),
            registry: NodeRegistry::new(),
            commit_tx,
            shutdown: AtomicBool::new(false),
        });

        let (frame_tx, frame_rx) = unbounded();
        let workers = vec![
            spawn_worker("gantry-arbiter", {
                let core = Arc::clone(&core);
                move || arbiter::run(core, commit_rx)
            }),
            spawn_worker("gantry-receiver", {
                let core = Arc::clone(&core);
                move || run_receiver(core, frame_tx)
            }),
            spawn_worker("gantry-router", {
                let core = Arc::clone(&core);
                move || run_router(core, frame_rx)
            }),
        ];

        Self { core, workers }
    }

    /// Opens an interface with default configuration.
    pub fn with_defaults(transport: impl Transport) -> Self {
        Self::new(transport, Config::default())
    }

    /// Creates a logical node on this interface.
    ///
    /// The node starts unaddressed; bind its ports, then run
    /// [`VirtualNode::acquire_address`].
    pub fn create_node(&self, name: &str) -> VirtualNode {
        VirtualNode::new(Arc::new(NodeCore::new(name)), Arc::clone(&self.core))
    }

    /// Number of nodes currently holding addresses on this interface.
    pub fn node_count(&self) -> usize {
        self.core.registry.len()
    }

    /// The interface configuration.
    pub fn config(&self) -> &Config {
        &self.core.config
    }
}

impl Drop for Interface {
    fn drop(&mut self) {
        self.core.shutdown.store(true, Ordering::SeqCst);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

fn spawn_worker(name: &str, body: impl FnOnce() + Send + 'static) -> JoinHandle<()> {
    Builder::new().name(name.to_owned()).spawn(body).expect("failed to spawn worker thread")
}

/// Reassembles raw transport bytes into validated frames.
fn run_receiver(core: Arc<InterfaceCore>, frame_tx: Sender<Frame>) {
    let mut reader = FrameReader::new();
    let mut buffer = vec![0u8; core.config.receive_buffer_size];

    while !core.is_shut_down() {
        match core.transport.receive(&mut buffer, core.config.receive_poll_timeout) {
            Ok(0) => {}
            Ok(len) => {
                for frame in reader.extend(&buffer[..len]) {
                    if frame_tx.send(frame).is_err() {
                        return;
                    }
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {}
            Err(e) => {
                // Never fatal to the worker; log and keep listening.
                error!(error = %e, "transport receive error");
                std::thread::sleep(core.config.receive_poll_timeout);
            }
        }
    }
    debug!("receiver stopped");
}

/// Dispatches validated frames to the node registered at each address.
fn run_router(core: Arc<InterfaceCore>, frame_rx: Receiver<Frame>) {
    loop {
        if core.is_shut_down() {
            break;
        }
        let frame = match frame_rx.recv_timeout(SHUTDOWN_POLL) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match core.registry.lookup(frame.address) {
            Some(node) => node.deliver(frame.port, &frame.payload),
            None => {
                warn!(address = frame.address, port = frame.port, "dropping unroutable frame");
            }
        }
    }
    debug!("router stopped");
}
