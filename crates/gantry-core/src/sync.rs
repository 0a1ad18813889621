//! Blocking synchronization primitives for the action protocol.
//!
//! The action/response handshake needs two small building blocks: a settable
//! flag a thread can block on (`Event`) and a single-slot mailbox shared
//! between a port's inbound handler and the action waiting on it (`Mailbox`).
//! Both block on a condvar rather than polling.

use std::{
    sync::{Condvar, Mutex},
    time::Duration,
};

/// A boolean flag that threads can set, clear and block on.
#[derive(Debug, Default)]
pub struct Event {
    state: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    /// Creates a new, unset event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the flag and wakes all waiters.
    pub fn set(&self) {
        let mut state = self.state.lock().unwrap();
        *state = true;
        self.cond.notify_all();
    }

    /// Clears the flag.
    pub fn clear(&self) {
        *self.state.lock().unwrap() = false;
    }

    /// Returns whether the flag is currently set.
    pub fn is_set(&self) -> bool {
        *self.state.lock().unwrap()
    }

    /// Blocks until the flag is set.
    pub fn wait(&self) {
        let mut state = self.state.lock().unwrap();
        while !*state {
            state = self.cond.wait(state).unwrap();
        }
    }

    /// Blocks until the flag is set or the timeout elapses.
    /// Returns true if the flag was observed set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let state = self.state.lock().unwrap();
        let (state, _) = self.cond.wait_timeout_while(state, timeout, |set| !*set).unwrap();
        *state
    }
}

/// A single-slot mailbox with a response-ready signal.
///
/// A new value silently overwrites any unconsumed prior one; callers must not
/// keep multiple requests outstanding against the same slot.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self { slot: Mutex::new(None), ready: Condvar::new() }
    }
}

impl<T> Mailbox<T> {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value, replacing any unconsumed one, and wakes waiters.
    pub fn put(&self, value: T) {
        let mut slot = self.slot.lock().unwrap();
        *slot = Some(value);
        self.ready.notify_all();
    }

    /// Takes the stored value if one is present, clearing the slot.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap().take()
    }

    /// Discards any unconsumed value, e.g. before issuing a fresh request.
    pub fn clear(&self) {
        *self.slot.lock().unwrap() = None;
    }

    /// Blocks until a value is available or the timeout elapses, taking it.
    pub fn wait_take(&self, timeout: Duration) -> Option<T> {
        let mut slot = self.slot.lock().unwrap();
        if slot.is_some() {
            return slot.take();
        }
        let (mut slot, _) = self.ready.wait_timeout_while(slot, timeout, |s| s.is_none()).unwrap();
        slot.take()
    }
}
