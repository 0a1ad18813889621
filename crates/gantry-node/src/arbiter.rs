//! The channel-access arbiter: one transmitter per interface.
//!
//! Committed actions queue FIFO; the arbiter takes them one at a time, blocks
//! until each is cleared to release, then grants it the channel for one
//! transmit/response round trip (retried within the configured budget). At
//! most one action is ever transmitting per interface, and release order
//! follows commit order.

use std::{sync::Arc, time::Duration};

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, warn};

use gantry_core::error::ErrorKind;
use gantry_protocol::{frame::build_frame, FieldMap};

use crate::{action::ActionState, interface::InterfaceCore};

/// How often blocked waits recheck for interface shutdown.
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

pub(crate) fn run(core: Arc<InterfaceCore>, commit_rx: Receiver<Arc<ActionState>>) {
    'arbiter: loop {
        if core.is_shut_down() {
            break;
        }
        let action = match commit_rx.recv_timeout(SHUTDOWN_POLL) {
            Ok(action) => action,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        // Head-of-line blocking: the next committed action transmits only
        // once its creator clears it, preserving commit order.
        while !action.released.wait_timeout(SHUTDOWN_POLL) {
            if core.is_shut_down() {
                action.resolve(Err(ErrorKind::InterfaceClosed));
                break 'arbiter;
            }
        }

        grant(&core, &action);
    }

    // Leave no committed action silently stranded.
    while let Ok(action) = commit_rx.try_recv() {
        action.resolve(Err(ErrorKind::InterfaceClosed));
    }
    debug!("arbiter stopped");
}

/// Grants one action exclusive channel access for its round trip.
fn grant(core: &InterfaceCore, action: &ActionState) {
    let frame = {
        let fields = action.fields.lock().unwrap();
        let encoded = action
            .template
            .encode(&fields)
            .and_then(|payload| {
                build_frame(&core.crc, action.mode, action.node.address(), action.port, &payload)
            });
        match encoded {
            Ok(frame) => frame,
            Err(error) => {
                action.resolve(Err(error));
                return;
            }
        }
    };

    let Some(mailbox) = &action.mailbox else {
        // No unique responder (multicast) or one-way port: transmit once and
        // resolve immediately.
        let outcome = core.transport.send(&frame).map(|_| FieldMap::new()).map_err(Into::into);
        action.resolve(outcome);
        return;
    };

    // Discard any stale response left in the slot by earlier traffic.
    mailbox.clear();

    for attempt in 1..=core.config.retry_attempts {
        if let Err(error) = core.transport.send(&frame) {
            action.resolve(Err(error.into()));
            return;
        }
        if let Some(response) = mailbox.wait_take(core.config.retry_timeout) {
            action.resolve(Ok(response));
            return;
        }
        if attempt < core.config.retry_attempts {
            warn!(
                node = action.node.name(),
                port = action.port,
                attempt,
                "could not reach node; retrying"
            );
        }
    }

    action.resolve(Err(ErrorKind::RetriesExhausted {
        port: action.port,
        attempts: core.config.retry_attempts,
    }));
}
