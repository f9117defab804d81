//! Client context: one dispatcher, one handler registry and, optionally,
//! one poll loop, all bound to a single transport.
//!
//! Construct on startup, drop (or [`DeviceClient::shutdown`]) on exit.
//! Several clients can coexist in one process.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::config::ClientConfig;
use crate::device::{DeviceModel, VirtualDevice};
use crate::error::{Error, Result};
use crate::messaging::dispatcher::{DispatchQueue, MessageDispatcher};
use crate::messaging::message::{Message, Resource, ResourceMessage, ResourceReportType};
use crate::messaging::registry::HandlerRegistry;
use crate::messaging::router::{PollLoop, RequestRouter};
use crate::messaging::transport::Transport;

pub struct DeviceClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    registry: Arc<HandlerRegistry>,
    dispatcher: MessageDispatcher,
    poll: Option<PollLoop>,
    closed: bool,
}

impl DeviceClient {
    /// Validate `config`, build the registry and start the dispatcher.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(HandlerRegistry::new(config.max_resource_number));
        let dispatcher = MessageDispatcher::spawn(&config, Arc::clone(&transport))?;
        info!(
            "Client: started (batch {}, queue {}, registry {})",
            config.max_messages_for_send, config.queue_capacity, config.max_resource_number
        );
        Ok(Self {
            config,
            transport,
            registry,
            dispatcher,
            poll: None,
            closed: false,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn queue_handle(&self) -> DispatchQueue {
        self.dispatcher.handle()
    }

    pub fn router(&self) -> RequestRouter {
        RequestRouter::new(Arc::clone(&self.registry), self.dispatcher.handle())
    }

    /// See [`DispatchQueue::queue`].
    pub fn queue(&self, message: impl Into<Option<Message>>) -> Result<()> {
        self.dispatcher.queue(message)
    }

    pub fn set_delivery_callback(&self, cb: impl Fn(&Message) + Send + Sync + 'static) {
        self.dispatcher.set_delivery_callback(cb);
    }

    pub fn set_error_callback(&self, cb: impl Fn(&Message, Error, &str) + Send + Sync + 'static) {
        self.dispatcher.set_error_callback(cb);
    }

    /// Create a virtual device for `endpoint_id` bound to this client.
    pub fn virtual_device(
        &self,
        endpoint_id: &str,
        model: Arc<dyn DeviceModel>,
    ) -> Result<VirtualDevice> {
        VirtualDevice::new(
            endpoint_id,
            model,
            self.dispatcher.handle(),
            Arc::clone(&self.registry),
        )
    }

    /// Queue one resource report for `endpoint_id`.
    pub fn report_resources(
        &self,
        endpoint_id: &str,
        resources: Vec<Resource>,
        report_type: ResourceReportType,
    ) -> Result<()> {
        if endpoint_id.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let report = ResourceMessage {
            resources,
            report_type,
            endpoint_name: endpoint_id.to_owned(),
        };
        self.dispatcher.queue(Message::resource(endpoint_id, report))
    }

    /// Spawn the poll loop.  `Fail` if it is already running or the client
    /// has been shut down.
    pub fn start_polling(&mut self) -> Result<()> {
        if self.closed || self.poll.is_some() {
            return Err(Error::Fail);
        }
        self.poll = Some(PollLoop::spawn(
            self.router(),
            Arc::clone(&self.transport),
            self.config.polling_timeout(),
        )?);
        Ok(())
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(PollLoop::is_running)
    }

    /// See [`MessageDispatcher::wait_idle`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.dispatcher.wait_idle(timeout)
    }

    /// Stop polling, then flush and join the dispatcher.  Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut poll) = self.poll.take() {
            poll.stop();
        }
        self.dispatcher.shutdown();
        info!("Client: shut down");
    }
}

impl Drop for DeviceClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}
