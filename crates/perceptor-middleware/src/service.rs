//! Named request/response services.
//!
//! A server is advertised under a name with a [`ServiceHandler`]; clients
//! look the name up and [`call`][ServiceClient::call] it. Each call gets
//! exactly one answer: the handler's response, the handler's error wrapped
//! as [`PerceptError::RemoteFailure`], or [`PerceptError::Timeout`]. Calls
//! are never retried.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use async_trait::async_trait;
//! use perceptor_middleware::service::{ServiceHandler, ServiceRegistry};
//! use perceptor_types::{DetectObjectRequest, DetectObjectResponse, PerceptError};
//!
//! struct Broken;
//!
//! #[async_trait]
//! impl ServiceHandler for Broken {
//!     async fn handle(&self, _: DetectObjectRequest) -> Result<DetectObjectResponse, PerceptError> {
//!         Err(PerceptError::Transport("camera offline".into()))
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let registry = ServiceRegistry::new();
//! let _server = registry.advertise("detector", Arc::new(Broken)).unwrap();
//! let client = registry.client("detector", Duration::from_secs(1)).unwrap();
//! assert!(client.call(DetectObjectRequest::default()).await.is_err());
//! # });
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use perceptor_types::{DetectObjectRequest, DetectObjectResponse, PerceptError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Call timeout used when none is configured.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(2);

/// Requests buffered per server before callers start waiting.
const SERVICE_QUEUE_DEPTH: usize = 16;

/// Server-side behaviour of a `DetectObject` service.
#[async_trait]
pub trait ServiceHandler: Send + Sync + 'static {
    /// Produce the response for one request.
    async fn handle(
        &self,
        request: DetectObjectRequest,
    ) -> Result<DetectObjectResponse, PerceptError>;
}

type Reply = oneshot::Sender<Result<DetectObjectResponse, PerceptError>>;

struct PendingCall {
    request: DetectObjectRequest,
    reply: Reply,
}

/// Name → request queue of every advertised service. Clones share state.
#[derive(Clone)]
pub struct ServiceRegistry {
    services: Arc<Mutex<HashMap<String, mpsc::Sender<PendingCall>>>>,
    /// `true` once [`close`][Self::close] has run. Every server loop watches it.
    closed: Arc<watch::Sender<bool>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self {
            services: Arc::default(),
            closed: Arc::new(watch::Sender::new(false)),
        }
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise `handler` under `name` and start serving it.
    ///
    /// Requests are handled one at a time, in arrival order. The service
    /// stays up until the returned [`ServiceServer`] is dropped.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// * [`PerceptError::ServiceAlreadyAdvertised`] if a live server already
    ///   owns `name`.
    /// * [`PerceptError::SessionClosed`] after [`close`][Self::close].
    pub fn advertise(
        &self,
        name: &str,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<ServiceServer, PerceptError> {
        let mut services = self.services.lock();
        if *self.closed.borrow() {
            return Err(PerceptError::SessionClosed);
        }
        if services.get(name).is_some_and(|tx| !tx.is_closed()) {
            return Err(PerceptError::ServiceAlreadyAdvertised(name.to_string()));
        }

        let (tx, mut rx) = mpsc::channel::<PendingCall>(SERVICE_QUEUE_DEPTH);
        let mut closed = self.closed.subscribe();
        let service = name.to_string();
        let task = tokio::spawn(async move {
            loop {
                // Shutdown wins over queued requests; those are answered
                // with a dropped reply.
                let call = tokio::select! {
                    biased;
                    _ = closed.wait_for(|closed| *closed) => None,
                    call = rx.recv() => call,
                };
                let Some(call) = call else {
                    break;
                };
                let result = handler.handle(call.request).await;
                if let Err(e) = &result {
                    warn!(service = %service, error = %e, "service handler failed");
                }
                if call.reply.send(result).is_err() {
                    debug!(service = %service, "caller went away before the reply");
                }
            }
            debug!(service = %service, "service loop stopped");
        });

        services.insert(name.to_string(), tx.clone());
        info!(service = name, "service advertised");
        Ok(ServiceServer {
            name: name.to_string(),
            tx,
            task,
            registry: self.clone(),
        })
    }

    /// Create a client for the service advertised as `name`.
    ///
    /// # Errors
    ///
    /// [`PerceptError::ServiceNotFound`] if no live server owns `name`.
    pub fn client(&self, name: &str, timeout: Duration) -> Result<ServiceClient, PerceptError> {
        let services = self.services.lock();
        match services.get(name) {
            Some(tx) if !tx.is_closed() => Ok(ServiceClient {
                service: name.to_string(),
                tx: tx.clone(),
                timeout,
            }),
            _ => Err(PerceptError::ServiceNotFound(name.to_string())),
        }
    }

    /// `true` if a live server owns `name`.
    pub fn is_advertised(&self, name: &str) -> bool {
        self.services
            .lock()
            .get(name)
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Stop every running server and drop every registration. Idempotent.
    ///
    /// Server loops exit after the request they are handling, so clients
    /// created earlier get [`PerceptError::ServiceNotFound`] or
    /// [`PerceptError::RemoteFailure`] from then on. Later
    /// [`advertise`][Self::advertise] calls are refused.
    pub fn close(&self) {
        let mut services = self.services.lock();
        self.closed.send_replace(true);
        services.clear();
    }

    fn unregister(&self, name: &str, tx: &mpsc::Sender<PendingCall>) {
        let mut services = self.services.lock();
        if services.get(name).is_some_and(|cur| cur.same_channel(tx)) {
            services.remove(name);
        }
    }
}

/// Handle of an advertised service. Dropping it stops the server and
/// removes the registration.
pub struct ServiceServer {
    name: String,
    tx: mpsc::Sender<PendingCall>,
    task: JoinHandle<()>,
    registry: ServiceRegistry,
}

impl ServiceServer {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ServiceServer {
    fn drop(&mut self) {
        self.registry.unregister(&self.name, &self.tx);
        self.task.abort();
        info!(service = %self.name, "service shut down");
    }
}

/// Caller side of a service.
#[derive(Clone)]
pub struct ServiceClient {
    service: String,
    tx: mpsc::Sender<PendingCall>,
    timeout: Duration,
}

impl ServiceClient {
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Send `request` and wait for its single response.
    ///
    /// # Errors
    ///
    /// * [`PerceptError::ServiceNotFound`] – the server has gone away.
    /// * [`PerceptError::RemoteFailure`] – the handler returned an error or
    ///   dropped the request.
    /// * [`PerceptError::Timeout`] – no answer within the client timeout.
    pub async fn call(
        &self,
        request: DetectObjectRequest,
    ) -> Result<DetectObjectResponse, PerceptError> {
        let exchange = async {
            let (reply, answer) = oneshot::channel();
            self.tx
                .send(PendingCall { request, reply })
                .await
                .map_err(|_| PerceptError::ServiceNotFound(self.service.clone()))?;
            match answer.await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(PerceptError::RemoteFailure {
                    service: self.service.clone(),
                    message: e.to_string(),
                }),
                Err(_) => Err(PerceptError::RemoteFailure {
                    service: self.service.clone(),
                    message: "server dropped the request".to_string(),
                }),
            }
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(PerceptError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}
