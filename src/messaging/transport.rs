//! Transport abstraction: whatever actually carries messages to the cloud.
//!
//! Concrete implementations (MQTT, HTTPS long polling, …) live outside this
//! crate; the dispatcher and router only ever see this trait, so adding a
//! new transport requires zero changes to the messaging logic.
//!
//! Two in-crate implementations are provided:
//! - [`NullTransport`] accepts every batch and never yields a request.
//! - [`LoopbackTransport`] records what was sent, can be scripted to fail,
//!   and lets tests and demos inject inbound requests.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::message::{Message, RequestMessage};
use crate::error::Error;

/// Result of sending one message of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    Failed { error: Error, reason: String },
}

impl SendOutcome {
    pub fn failed(error: Error, reason: impl Into<String>) -> Self {
        Self::Failed {
            error,
            reason: reason.into(),
        }
    }

    /// The same outcome for every message of a batch of `len`.
    pub fn uniform(len: usize, outcome: &SendOutcome) -> Vec<SendOutcome> {
        vec![outcome.clone(); len]
    }
}

/// Message transport.
///
/// `send` and `poll` are called from different threads (the dispatcher
/// worker and the router poll loop), possibly at the same time.
pub trait Transport: Send + Sync {
    /// Send `batch` as one request.  Returns one outcome per message, in
    /// batch order.  Missing outcomes are treated as failures.
    fn send(&self, batch: &[Message]) -> Vec<SendOutcome>;

    /// Wait up to `timeout` for an inbound request.
    fn poll(&self, timeout: Duration) -> Option<RequestMessage>;
}

/// A transport that discards all sends successfully and never receives.
/// Useful as a default when no cloud connection is configured.
pub struct NullTransport;

impl Transport for NullTransport {
    fn send(&self, batch: &[Message]) -> Vec<SendOutcome> {
        SendOutcome::uniform(batch.len(), &SendOutcome::Delivered)
    }

    fn poll(&self, timeout: Duration) -> Option<RequestMessage> {
        std::thread::sleep(timeout);
        None
    }
}

// ───────────────────────────────────────────────────────────────
// Loopback transport
// ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct LoopbackState {
    sent: Vec<Message>,
    batch_sizes: Vec<usize>,
    /// Scripted failures, consumed one per batch.
    failures: VecDeque<(Error, String)>,
    inbound: VecDeque<RequestMessage>,
}

/// In-memory transport for tests and the demo binary.
#[derive(Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    inbound_ready: Condvar,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next send call fail every message with `error`.
    pub fn fail_next_batch(&self, error: Error, reason: impl Into<String>) {
        self.state.lock().failures.push_back((error, reason.into()));
    }

    /// Queue an inbound request for the next `poll`.
    pub fn push_request(&self, request: RequestMessage) {
        self.state.lock().inbound.push_back(request);
        self.inbound_ready.notify_one();
    }

    /// Every message successfully delivered so far, in send order.
    pub fn sent(&self) -> Vec<Message> {
        self.state.lock().sent.clone()
    }

    /// Sizes of every batch handed to `send`, including failed ones.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.state.lock().batch_sizes.clone()
    }

    pub fn pending_requests(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

impl Transport for LoopbackTransport {
    fn send(&self, batch: &[Message]) -> Vec<SendOutcome> {
        let mut state = self.state.lock();
        state.batch_sizes.push(batch.len());
        if let Some((error, reason)) = state.failures.pop_front() {
            return SendOutcome::uniform(batch.len(), &SendOutcome::failed(error, reason));
        }
        state.sent.extend(batch.iter().cloned());
        SendOutcome::uniform(batch.len(), &SendOutcome::Delivered)
    }

    fn poll(&self, timeout: Duration) -> Option<RequestMessage> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(req) = state.inbound.pop_front() {
                return Some(req);
            }
            if self
                .inbound_ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.inbound.pop_front();
            }
        }
    }
}
