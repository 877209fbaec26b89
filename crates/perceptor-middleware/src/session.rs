//! [`Session`] – the node context handed to every component.
//!
//! Bundles the [`EventBus`], the [`ServiceRegistry`] and a liveness flag.
//! Components receive a clone at construction time; there is no global
//! instance. Calling [`Session::shutdown`] flips the flag, wakes everyone
//! waiting in [`Session::closed`], closes the bus and stops every
//! advertised service. Loops are expected to check [`Session::is_valid`] once
//! per iteration.

use std::sync::Arc;
use std::time::Duration;

use perceptor_types::{Event, EventPayload, PerceptError};
use tokio::sync::watch;
use tracing::info;

use crate::bus::{DEFAULT_CAPACITY, EventBus, TopicReceiver};
use crate::service::{ServiceClient, ServiceHandler, ServiceRegistry, ServiceServer};

/// Shared node context. Clone it cheaply.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    name: String,
    bus: EventBus,
    services: ServiceRegistry,
    alive: watch::Sender<bool>,
}

impl Session {
    /// Open a session named `name` with the default bus capacity.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_bus_capacity(name, DEFAULT_CAPACITY)
    }

    /// Open a session whose bus buffers `capacity` events per topic.
    pub fn with_bus_capacity(name: impl Into<String>, capacity: usize) -> Self {
        let name = name.into();
        info!(session = %name, bus_capacity = capacity, "session opened");
        Self {
            inner: Arc::new(SessionInner {
                name,
                bus: EventBus::new(capacity),
                services: ServiceRegistry::new(),
                alive: watch::Sender::new(true),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.services
    }

    /// `false` once [`shutdown`][Self::shutdown] has been called.
    pub fn is_valid(&self) -> bool {
        *self.inner.alive.borrow()
    }

    /// Invalidate the session. Idempotent.
    pub fn shutdown(&self) {
        let was_alive = self.inner.alive.send_replace(false);
        if was_alive {
            self.inner.bus.close();
            self.inner.services.close();
            info!(session = %self.inner.name, "session shut down");
        }
    }

    /// Resolve once the session has been shut down.
    pub async fn closed(&self) {
        let mut rx = self.inner.alive.subscribe();
        // Err only if the sender is dropped, which cannot happen while
        // `self` holds it.
        let _ = rx.wait_for(|alive| !*alive).await;
    }

    /// Sleep for `duration`, waking early on shutdown.
    ///
    /// Returns `true` if the full duration elapsed and the session is still
    /// valid.
    pub async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.is_valid(),
            _ = self.closed() => false,
        }
    }

    /// Publish `payload` on `topic`, tagged with `source`.
    ///
    /// Returns the number of subscribers reached (possibly zero).
    ///
    /// # Errors
    ///
    /// [`PerceptError::SessionClosed`] after shutdown.
    pub fn publish(
        &self,
        topic: &str,
        source: &str,
        payload: EventPayload,
    ) -> Result<usize, PerceptError> {
        if !self.is_valid() {
            return Err(PerceptError::SessionClosed);
        }
        Ok(self.inner.bus.publish_to(topic, Event::new(source, payload)))
    }

    /// Subscribe to `topic`.
    ///
    /// # Errors
    ///
    /// [`PerceptError::SessionClosed`] after shutdown.
    pub fn subscribe(&self, topic: &str) -> Result<TopicReceiver, PerceptError> {
        if !self.is_valid() {
            return Err(PerceptError::SessionClosed);
        }
        Ok(self.inner.bus.subscribe_to(topic))
    }

    /// Advertise a service on this session. See [`ServiceRegistry::advertise`].
    pub fn advertise_service(
        &self,
        name: &str,
        handler: Arc<dyn ServiceHandler>,
    ) -> Result<ServiceServer, PerceptError> {
        if !self.is_valid() {
            return Err(PerceptError::SessionClosed);
        }
        self.inner.services.advertise(name, handler)
    }

    /// Look up a service on this session. See [`ServiceRegistry::client`].
    pub fn service_client(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<ServiceClient, PerceptError> {
        if !self.is_valid() {
            return Err(PerceptError::SessionClosed);
        }
        self.inner.services.client(name, timeout)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.inner.name)
            .field("valid", &self.is_valid())
            .field("topics", &self.inner.bus.topics())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perceptor_types::{Detection, ObjectType, Pose};

    fn payload() -> EventPayload {
        EventPayload::ObjectDetection(Detection::new(ObjectType::Cup, Pose::default(), Utc::now()))
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let mut rx = session.subscribe("/detections")?;
        assert_eq!(session.publish("/detections", "test", payload())?, 1);
        let event = rx.recv().await.ok_or("no event")?;
        assert_eq!(event.source, "test");
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_invalidates_every_clone() {
        let session = Session::new("test");
        let clone = session.clone();
        assert!(clone.is_valid());

        session.shutdown();
        session.shutdown();
        assert!(!clone.is_valid());
        assert_eq!(
            clone.publish("/detections", "test", payload()),
            Err(PerceptError::SessionClosed)
        );
        assert!(clone.subscribe("/detections").is_err());
        assert!(clone.service_client("detector", Duration::from_secs(1)).is_err());
    }

    #[tokio::test]
    async fn shutdown_ends_open_subscriptions() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let mut rx = session.subscribe("/detections")?;
        session.shutdown();
        assert!(rx.recv().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn closed_wakes_on_shutdown() {
        let session = Session::new("test");
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.closed().await })
        };
        session.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("closed() must resolve")
            .expect("task must not panic");
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_shutdown() {
        let session = Session::new("test");
        let sleeper = {
            let session = session.clone();
            tokio::spawn(async move { session.sleep(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.shutdown();
        let completed = tokio::time::timeout(Duration::from_secs(1), sleeper)
            .await
            .expect("sleep must wake")
            .expect("task must not panic");
        assert!(!completed);
    }

    #[tokio::test]
    async fn sleep_reports_full_duration() {
        let session = Session::new("test");
        assert!(session.sleep(Duration::from_millis(5)).await);
    }
}
