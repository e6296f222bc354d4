use std::fmt;
use std::sync::Arc;

use crate::scheduler::{Scheduler, TokioScheduler};
use crate::transport::{ReqwestTransport, Transport};
use crate::{CallController, CallOptions, ClientConfig};

/// Factory binding shared configuration once and producing
/// [`CallController`]s.
///
/// The configuration is shared by reference with every controller the client
/// creates; nothing is validated until a request runs.
#[derive(Clone)]
pub struct ApiClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .finish()
    }
}

impl ApiClient {
    /// Creates a client over a `reqwest` transport with the configured
    /// interceptors installed.
    pub fn new(config: ClientConfig) -> Self {
        let transport = ReqwestTransport::new(config.interceptors.clone());
        Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
            scheduler: Arc::new(TokioScheduler),
        }
    }

    /// Replaces the transport. Interceptors from the config are not applied
    /// to custom transports.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Replaces the timer backend used for polling, retries and progress.
    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Arc::new(scheduler);
        self
    }

    /// Shared configuration every controller from this client reads.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Binds a call and starts it. Bindings with a refresh interval begin
    /// polling right away, so this needs a tokio runtime in that case.
    pub fn call(&self, options: CallOptions) -> CallController {
        let controller = CallController::new(
            Arc::clone(&self.config),
            options,
            Arc::clone(&self.transport),
            Arc::clone(&self.scheduler),
        );
        controller.start();
        controller
    }
}
