//! Reified outbound requests ("actions") and their lifecycle.
//!
//! Every outbound request is an [`Action`]: a use-once unit of transmission
//! owning its payload fields, transmit mode and retry bookkeeping. Actions
//! move through `Created → Committed → AccessGranted → {Resolved |
//! RetriesExhausted}`; commitment hands scheduling to the interface's
//! arbiter while the creator keeps this handle to block on the outcome.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crossbeam_channel::{bounded, Receiver, Sender};

use gantry_core::{
    error::{ErrorKind, Result},
    sync::{Event, Mailbox},
};
use gantry_protocol::{FieldMap, PacketTemplate, TransmitMode};

use crate::node::NodeCore;

/// Shared state between an [`Action`] handle and the arbiter.
pub(crate) struct ActionState {
    pub(crate) node: Arc<NodeCore>,
    pub(crate) port: u8,
    pub(crate) mode: TransmitMode,
    pub(crate) template: PacketTemplate,
    /// Response slot shared with the port's inbound handler; `None` for
    /// ports that never answer.
    pub(crate) mailbox: Option<Arc<Mailbox<FieldMap>>>,
    pub(crate) fields: Mutex<FieldMap>,
    /// Set once the creator has no further payload edits pending; the
    /// arbiter will not transmit before this.
    pub(crate) released: Event,
    committed: AtomicBool,
    outcome_tx: Sender<Result<FieldMap>>,
}

impl ActionState {
    /// Delivers the final outcome. A no-op if the creator stopped waiting.
    pub(crate) fn resolve(&self, outcome: Result<FieldMap>) {
        let _ = self.outcome_tx.try_send(outcome);
    }
}

/// A single outbound request awaiting serialized transmission.
///
/// The handle is use-once: [`Action::wait`] consumes it. Code that must edit
/// or release the payload after commitment (the motion planner) takes a
/// [`ActionController`] and leaves the handle itself with whoever blocks on
/// completion.
pub struct Action {
    state: Arc<ActionState>,
    outcome_rx: Receiver<Result<FieldMap>>,
    commit_tx: Sender<Arc<ActionState>>,
}

impl Action {
    pub(crate) fn new(
        node: Arc<NodeCore>,
        port: u8,
        mode: TransmitMode,
        template: PacketTemplate,
        mailbox: Option<Arc<Mailbox<FieldMap>>>,
        fields: FieldMap,
        commit_tx: Sender<Arc<ActionState>>,
    ) -> Self {
        let (outcome_tx, outcome_rx) = bounded(1);
        let state = Arc::new(ActionState {
            node,
            port,
            mode,
            template,
            mailbox,
            fields: Mutex::new(fields),
            released: Event::new(),
            committed: AtomicBool::new(false),
            outcome_tx,
        });
        Self { state, outcome_rx, commit_tx }
    }

    /// Replaces the payload fields. Fails once the action is released.
    pub fn update(&self, fields: FieldMap) -> Result<()> {
        self.controller().update(fields)
    }

    /// Enqueues the action for channel access. Idempotent; the queue position
    /// is taken on the first call.
    pub fn commit(&self) -> Result<()> {
        if self.state.committed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.commit_tx
            .send(Arc::clone(&self.state))
            .map_err(|_| ErrorKind::InterfaceClosed)
    }

    /// Marks the action cleared to transmit. Transmission still waits for
    /// the arbiter to grant channel access in commit order.
    pub fn release(&self) {
        self.state.released.set();
    }

    /// Commits and immediately releases: the common path for requests with
    /// no deferred parameter edits.
    pub fn submit(&self) -> Result<()> {
        self.commit()?;
        self.release();
        Ok(())
    }

    /// Blocks until the action resolves or fails, consuming the handle.
    ///
    /// For requests that expect no response, resolution yields an empty
    /// field map immediately after transmission.
    pub fn wait(self) -> Result<FieldMap> {
        self.outcome_rx.recv().map_err(|_| ErrorKind::InterfaceClosed)?
    }

    /// Commits, releases and blocks for the outcome in one call.
    pub fn transact(self) -> Result<FieldMap> {
        self.submit()?;
        self.wait()
    }

    /// Returns a control handle for deferred payload edits and release.
    pub fn controller(&self) -> ActionController {
        ActionController { state: Arc::clone(&self.state) }
    }

    /// The port this action targets.
    pub fn port(&self) -> u8 {
        self.state.port
    }

    /// Whether the action has been released for transmission.
    pub fn is_released(&self) -> bool {
        self.state.released.is_set()
    }
}

/// Edit-and-release handle to a committed action.
///
/// Held by the motion planner, which finalizes velocity profiles into
/// already-committed step commands and only then clears them for
/// transmission.
pub struct ActionController {
    state: Arc<ActionState>,
}

impl ActionController {
    /// Replaces the payload fields. Fails once the action is released.
    pub fn update(&self, fields: FieldMap) -> Result<()> {
        if self.state.released.is_set() {
            return Err(ErrorKind::ActionReleased);
        }
        *self.state.fields.lock().unwrap() = fields;
        Ok(())
    }

    /// Marks the action cleared to transmit.
    pub fn release(&self) {
        self.state.released.set();
    }
}

/// An ordered sequence of child actions carrying one oversized logical
/// request.
///
/// Committing, releasing or waiting on the sequence fans out to every child
/// in order. Each child keeps its own retry budget; the sequence fails on the
/// first child that fails.
pub struct ActionSequence {
    children: Vec<Action>,
}

impl ActionSequence {
    /// Wraps an ordered list of child actions.
    pub fn new(children: Vec<Action>) -> Self {
        Self { children }
    }

    /// Commits every child, in order.
    pub fn commit(&self) -> Result<()> {
        for child in &self.children {
            child.commit()?;
        }
        Ok(())
    }

    /// Releases every child, in order.
    pub fn release(&self) {
        for child in &self.children {
            child.release();
        }
    }

    /// Updates every child's payload, in order. `payloads` must hold one
    /// field map per child; fails on the first already-released child.
    pub fn update(&self, payloads: Vec<FieldMap>) -> Result<()> {
        for (child, payload) in self.children.iter().zip(payloads) {
            child.update(payload)?;
        }
        Ok(())
    }

    /// Blocks until every child resolves; returns the responses in order.
    pub fn wait(self) -> Result<Vec<FieldMap>> {
        self.children.into_iter().map(Action::wait).collect()
    }

    /// The child actions, in transmission order.
    pub fn children(&self) -> &[Action] {
        &self.children
    }

    /// Number of child actions.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the sequence holds no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}
