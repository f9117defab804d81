//! Asynchronous outbound message dispatcher.
//!
//! Producers on any thread call [`DispatchQueue::queue`]; one dedicated
//! worker thread drains the lanes in priority order, hands each batch to the
//! transport and then reports every message's outcome through the delivery
//! or error callback.
//!
//! ```text
//!  producers ──queue()──▶ ┌───────────┐  take_batch  ┌────────┐  send  ┌───────────┐
//!  (any thread)           │ LaneQueue │ ───────────▶ │ worker │ ─────▶ │ Transport │
//!                         └───────────┘              └────────┘        └───────────┘
//!                                                        │
//!                                   delivery / error callback, once per message
//! ```
//!
//! # Callback contract
//!
//! Callbacks run on the worker thread, one at a time.  They must not call
//! `queue` (directly, or indirectly through attribute setters, `raise` or
//! `submit`): the worker would end up waiting on its own queue.  Debug
//! builds assert on this.
//!
//! A panicking callback is logged and the worker moves on to the next
//! message.  Should the worker itself unwind, the queue is closed so that
//! producers get `Fail` instead of queuing into a dead lane.
//!
//! # Backpressure
//!
//! The queue is bounded by [`ClientConfig::queue_capacity`] across all
//! lanes.  A full queue fails fast with [`Error::OutOfMemory`]; `queue`
//! never blocks beyond acquiring the queue lock.
//!
//! # Reliability
//!
//! The dispatcher never retries.  A failed `GuaranteedDelivery` message is
//! reported through the error callback and the producer decides whether to
//! resend it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use heapless::String as BoundedString;
use log::{debug, error, info, warn};
use parking_lot::{Condvar, Mutex, RwLock};

use super::lanes::{Batch, LaneQueue};
use super::message::{Message, Payload, Tracker};
use super::transport::{SendOutcome, Transport};
use crate::config::{ClientConfig, FAIL_REASON_CAPACITY};
use crate::error::{Error, Result};

/// Invoked once per successfully sent message.
pub type DeliveryCallback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Invoked once per message the transport could not send, with the result
/// code and a short human-readable reason.
pub type ErrorCallback = Arc<dyn Fn(&Message, Error, &str) + Send + Sync>;

type FailReason = BoundedString<FAIL_REASON_CAPACITY>;

struct QueueState {
    lanes: LaneQueue,
    /// A batch has been taken and its callbacks have not finished yet.
    in_flight: bool,
    /// No new messages are accepted; the worker exits once drained.
    closed: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    work_ready: Condvar,
    idle: Condvar,
    batch_size: usize,
    transport: Arc<dyn Transport>,
    on_delivery: RwLock<Option<DeliveryCallback>>,
    on_error: RwLock<Option<ErrorCallback>>,
    worker_thread: OnceLock<ThreadId>,
}

impl Shared {
    fn on_worker_thread(&self) -> bool {
        self.worker_thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    fn run(&self) {
        let _ = self.worker_thread.set(thread::current().id());
        let _exit = WorkerExit(self);
        info!("Dispatcher: worker started (batch size {})", self.batch_size);

        loop {
            let batch = {
                let mut state = self.state.lock();
                while state.lanes.is_empty() && !state.closed {
                    self.work_ready.wait(&mut state);
                }
                if state.lanes.is_empty() {
                    break;
                }
                state.in_flight = true;
                state.lanes.take_batch(self.batch_size)
            };

            self.deliver(batch);

            let mut state = self.state.lock();
            state.in_flight = false;
            if state.lanes.is_empty() {
                self.idle.notify_all();
            }
        }

        self.idle.notify_all();
        info!("Dispatcher: worker stopped");
    }

    fn deliver(&self, batch: Batch) {
        debug!("Dispatcher: sending batch of {}", batch.len());
        let mut outcomes = self.transport.send(&batch).into_iter();

        // Snapshot the slots so callbacks run without holding their locks.
        let on_delivery = self.on_delivery.read().clone();
        let on_error = self.on_error.read().clone();

        for message in batch {
            match outcomes.next() {
                Some(SendOutcome::Delivered) => {
                    if let Some(cb) = &on_delivery {
                        guarded("delivery", &message, || cb(&message));
                    }
                }
                Some(SendOutcome::Failed { error, reason }) => {
                    Self::report_failure(&message, error, &reason, on_error.as_ref());
                }
                None => {
                    Self::report_failure(
                        &message,
                        Error::Fail,
                        "transport returned no outcome",
                        on_error.as_ref(),
                    );
                }
            }

            if let Payload::Response(response) = &message.payload {
                if let Some(request) = &response.request {
                    debug!("Dispatcher: released request {}", request.id);
                }
            }
        }
    }

    fn report_failure(
        message: &Message,
        error: Error,
        reason: &str,
        on_error: Option<&ErrorCallback>,
    ) {
        let reason = truncate_reason(reason);
        warn!(
            "Dispatcher: message {} failed: {} ({})",
            message.id, error, reason
        );
        if let Some(Tracker(tracker)) = &message.tracker {
            guarded("tracker", message, || tracker.on_failed(message, error, &reason));
        }
        if let Some(cb) = on_error {
            guarded("error", message, || cb(message, error, &reason));
        }
    }
}

/// Run one user callback; a panic is logged and swallowed.
fn guarded(kind: &str, message: &Message, callback: impl FnOnce()) {
    if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
        error!(
            "Dispatcher: {} callback panicked on message {}",
            kind, message.id
        );
    }
}

/// Closes the queue if the worker unwinds, so nothing is accepted that no
/// one will drain.
struct WorkerExit<'a>(&'a Shared);

impl Drop for WorkerExit<'_> {
    fn drop(&mut self) {
        if !thread::panicking() {
            return;
        }
        error!("Dispatcher: worker unwinding, closing queue");
        let mut state = self.0.state.lock();
        state.closed = true;
        state.in_flight = false;
        drop(state);
        self.0.idle.notify_all();
    }
}

fn truncate_reason(reason: &str) -> FailReason {
    let mut out = FailReason::new();
    for ch in reason.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

// ───────────────────────────────────────────────────────────────
// Producer handle
// ───────────────────────────────────────────────────────────────

/// Cheap, cloneable producer side of a [`MessageDispatcher`].
#[derive(Clone)]
pub struct DispatchQueue {
    shared: Arc<Shared>,
}

impl DispatchQueue {
    /// Enqueue a message for asynchronous delivery.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `message` is `None`.
    /// - `OutOfMemory` if the queue is at capacity.
    /// - `Fail` if the dispatcher has been shut down.
    ///
    /// Transport failures are never returned here; they reach the error
    /// callback.
    pub fn queue(&self, message: impl Into<Option<Message>>) -> Result<()> {
        let Some(message) = message.into() else {
            return Err(Error::InvalidArgument);
        };
        debug_assert!(
            !self.shared.on_worker_thread(),
            "queue() called from a dispatcher callback"
        );

        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(Error::Fail);
        }
        let capacity = state.lanes.capacity();
        if let Err(rejected) = state.lanes.push(message) {
            warn!(
                "Dispatcher: queue full ({}), rejecting message {}",
                capacity, rejected.id
            );
            return Err(Error::OutOfMemory);
        }
        debug!("Dispatcher: queued ({} pending)", state.lanes.len());
        drop(state);

        self.shared.work_ready.notify_one();
        Ok(())
    }

    /// Messages waiting in the lanes (excluding a batch being sent).
    pub fn len(&self) -> usize {
        self.shared.state.lock().lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ───────────────────────────────────────────────────────────────
// Dispatcher
// ───────────────────────────────────────────────────────────────

/// Owns the drain worker.  Dropping it flushes the queue and joins the
/// worker.
pub struct MessageDispatcher {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl MessageDispatcher {
    /// Build a dispatcher without starting its worker.  Messages may be
    /// queued before [`start`](Self::start).
    pub fn new(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                lanes: LaneQueue::new(config.queue_capacity),
                in_flight: false,
                closed: false,
            }),
            work_ready: Condvar::new(),
            idle: Condvar::new(),
            batch_size: config.max_messages_for_send,
            transport,
            on_delivery: RwLock::new(None),
            on_error: RwLock::new(None),
            worker_thread: OnceLock::new(),
        });
        Ok(Self {
            shared,
            worker: None,
        })
    }

    /// Build a dispatcher and start its worker.
    pub fn spawn(config: &ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let mut dispatcher = Self::new(config, transport)?;
        dispatcher.start()?;
        Ok(dispatcher)
    }

    /// Start the drain worker.  Fails if already started or shut down.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() || self.shared.state.lock().closed {
            return Err(Error::Fail);
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("edgelink-dispatch".into())
            .spawn(move || shared.run())
            .map_err(|e| {
                error!("Dispatcher: failed to spawn worker: {}", e);
                Error::OutOfMemory
            })?;
        self.worker = Some(handle);
        Ok(())
    }

    pub fn handle(&self) -> DispatchQueue {
        DispatchQueue {
            shared: Arc::clone(&self.shared),
        }
    }

    /// See [`DispatchQueue::queue`].
    pub fn queue(&self, message: impl Into<Option<Message>>) -> Result<()> {
        self.handle().queue(message)
    }

    pub fn len(&self) -> usize {
        self.shared.state.lock().lanes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Install the delivery callback, replacing any previous one.
    pub fn set_delivery_callback(&self, cb: impl Fn(&Message) + Send + Sync + 'static) {
        *self.shared.on_delivery.write() = Some(Arc::new(cb));
    }

    /// Install the error callback, replacing any previous one.
    pub fn set_error_callback(&self, cb: impl Fn(&Message, Error, &str) + Send + Sync + 'static) {
        *self.shared.on_error.write() = Some(Arc::new(cb));
    }

    pub fn clear_callbacks(&self) {
        *self.shared.on_delivery.write() = None;
        *self.shared.on_error.write() = None;
    }

    /// Block until every queued message has been sent and its callbacks
    /// have returned.  Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while !state.lanes.is_empty() || state.in_flight {
            if self.shared.idle.wait_until(&mut state, deadline).timed_out() {
                return state.lanes.is_empty() && !state.in_flight;
            }
        }
        true
    }

    /// Stop accepting messages, send everything still queued, and join the
    /// worker.  Idempotent.
    pub fn shutdown(&mut self) {
        let pending = {
            let mut state = self.shared.state.lock();
            state.closed = true;
            state.lanes.len()
        };
        self.shared.work_ready.notify_all();

        match self.worker.take() {
            Some(handle) => {
                if handle.join().is_err() {
                    error!("Dispatcher: worker panicked");
                }
            }
            None if pending > 0 => {
                warn!("Dispatcher: shut down before start, dropping {} messages", pending);
            }
            None => {}
        }
    }
}

impl Drop for MessageDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
