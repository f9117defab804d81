//! Inbound request router.
//!
//! Per request: `Received → Resolved → Handled → Responded`.  The router
//! builds the default 404 response, resolves a handler through the
//! [`HandlerRegistry`], lets it fill the response, links the request into
//! the response and queues it.  From that point the dispatcher owns the
//! request and drops it once the response has been handed to the transport.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};

use super::dispatcher::DispatchQueue;
use super::message::{Message, RequestMessage};
use super::registry::HandlerRegistry;
use super::transport::Transport;
use crate::error::{Error, Result};

#[derive(Clone)]
pub struct RequestRouter {
    registry: Arc<HandlerRegistry>,
    queue: DispatchQueue,
}

impl RequestRouter {
    pub fn new(registry: Arc<HandlerRegistry>, queue: DispatchQueue) -> Self {
        Self { registry, queue }
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Resolve and run the handler for `request`, returning the response
    /// message with the request linked into it.  Nothing is queued.
    pub fn dispatch(&self, request: RequestMessage) -> Message {
        debug!(
            "Router: request {} received ({:?} {} for {})",
            request.id, request.method, request.url, request.destination
        );
        let mut message = Message::response_for(&request);

        let handler = self.registry.lookup(&request.destination, request.path());
        if self.registry.is_default(&handler) {
            warn!(
                "Router: no handler registered for {} at {}",
                request.destination,
                request.path()
            );
        }
        debug!("Router: request {} resolved", request.id);

        if let Some(response) = message.as_response_mut() {
            handler.handle(&request, response);
            debug!(
                "Router: request {} handled ({})",
                request.id, response.status_code
            );
            response.request = Some(Box::new(request));
        }
        message
    }

    /// Dispatch `request` and queue its response.
    ///
    /// # Errors
    ///
    /// Whatever [`DispatchQueue::queue`] reports; the request is dropped in
    /// that case.
    pub fn route(&self, request: RequestMessage) -> Result<()> {
        let response = self.dispatch(request);
        let id = response.id.clone();
        self.queue.queue(response).inspect_err(|e| {
            warn!("Router: could not queue response {}: {}", id, e);
        })?;
        debug!("Router: response {} queued", id);
        Ok(())
    }

    /// Wait up to `timeout` for one inbound request and route it.
    /// Returns `Ok(false)` when the poll timed out.
    pub fn poll_once(&self, transport: &dyn Transport, timeout: Duration) -> Result<bool> {
        match transport.poll(timeout) {
            Some(request) => self.route(request).map(|()| true),
            None => Ok(false),
        }
    }
}

/// Background thread repeatedly polling the transport and routing requests.
///
/// Stopping takes effect after the current poll returns, so `stop` may block
/// for up to one polling timeout.
pub struct PollLoop {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl PollLoop {
    pub fn spawn(
        router: RequestRouter,
        transport: Arc<dyn Transport>,
        timeout: Duration,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("edgelink-poll".into())
            .spawn(move || {
                info!("Router: poll loop started ({:?} timeout)", timeout);
                while !flag.load(Ordering::Acquire) {
                    // Fail means the dispatcher has shut down.
                    if let Err(Error::Fail) = router.poll_once(transport.as_ref(), timeout) {
                        break;
                    }
                }
                info!("Router: poll loop stopped");
            })
            .map_err(|e| {
                error!("Router: failed to spawn poll loop: {}", e);
                Error::OutOfMemory
            })?;
        Ok(Self {
            stop,
            worker: Some(worker),
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Signal the loop and join it.  Idempotent.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Router: poll loop panicked");
            }
        }
    }
}

impl Drop for PollLoop {
    fn drop(&mut self) {
        self.stop();
    }
}
