//! Headless, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! Topics are plain names (e.g. `"/dummy_object_detections"`). The channel
//! behind a topic is created the first time anyone publishes to or
//! subscribes to it.
//!
//! A subscriber that falls more than `capacity` events behind loses the
//! oldest ones; [`TopicReceiver::recv`] logs how many were skipped and keeps
//! going.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use perceptor_types::Event;
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
pub const DEFAULT_CAPACITY: usize = 100;

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    capacity: usize,
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Event>>>>,
}

impl EventBus {
    /// Create a new bus with the given per-topic channel capacity.
    ///
    /// A `capacity` of zero is bumped to one (Tokio broadcast channels
    /// cannot be empty).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `0` when nobody is currently listening on the topic (this is
    /// a normal condition, not an error).
    pub fn publish_to(&self, topic: &str, event: Event) -> usize {
        let sender = self.topic_sender(topic);
        match sender.send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(_)) => {
                trace!(topic, "published with no subscribers");
                0
            }
        }
    }

    /// Subscribe to `topic`.
    ///
    /// Only events published after this call are delivered.
    pub fn subscribe_to(&self, topic: &str) -> TopicReceiver {
        TopicReceiver {
            topic: topic.to_string(),
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map(broadcast::Sender::receiver_count)
            .unwrap_or(0)
    }

    /// Names of every topic that has been used so far, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.topics.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Per-topic capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every topic channel. Existing receivers drain what is buffered
    /// and then see the end of the stream.
    pub fn close(&self) {
        self.topics.lock().clear();
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Event> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single topic.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: String,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Lag is logged and skipped over. Returns `None` when the bus has shut
    /// down and no further events will arrive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged; events dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Take the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged; events dropped");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The topic this receiver is bound to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perceptor_types::{Detection, EventPayload, ObjectType, Pose};

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::ObjectDetection(Detection::new(
                ObjectType::Cup,
                Pose::default(),
                chrono::Utc::now(),
            )),
        )
    }

    #[tokio::test]
    async fn publish_and_receive() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to("/detections");

        let event = make_event("test");
        assert_eq!(bus.publish_to("/detections", event.clone()), 1);

        let received = rx.recv().await.ok_or("No event received")?;
        assert_eq!(received.id, event.id);
        assert_eq!(received.source, event.source);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to("/detections", make_event("test")), 0);
        assert_eq!(bus.topics(), vec!["/detections".to_string()]);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe_to("/detections");
        let mut rx2 = bus.subscribe_to("/detections");
        assert_eq!(bus.subscriber_count("/detections"), 2);

        let event = make_event("test");
        bus.publish_to("/detections", event.clone());

        assert_eq!(rx1.recv().await.ok_or("rx1 empty")?.id, event.id);
        assert_eq!(rx2.recv().await.ok_or("rx2 empty")?.id, event.id);
        Ok(())
    }

    /// A subscriber on one topic must not see events published on another.
    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to("/alerts");
        let _detections = bus.subscribe_to("/detections");

        bus.publish_to("/detections", make_event("test"));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "alerts subscriber must not receive a detection");
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to("/detections");
        let events: Vec<Event> = (0..20).map(|_| make_event("test")).collect();
        for e in &events {
            bus.publish_to("/detections", e.clone());
        }
        for e in &events {
            assert_eq!(rx.recv().await.map(|got| got.id), Some(e.id));
        }
    }

    /// A slow subscriber skips the overwritten events and resumes with the
    /// oldest one still buffered.
    #[tokio::test]
    async fn lagging_subscriber_skips_dropped_events() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe_to("/detections");
        let events: Vec<Event> = (0..10).map(|_| make_event("flood")).collect();
        for e in &events {
            bus.publish_to("/detections", e.clone());
        }

        let first = slow.recv().await.expect("buffered event");
        assert_eq!(first.id, events[6].id);
    }

    #[tokio::test]
    async fn close_ends_the_stream_after_draining() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to("/detections");
        let event = make_event("test");
        bus.publish_to("/detections", event.clone());
        bus.close();

        assert_eq!(rx.recv().await.map(|e| e.id), Some(event.id));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn try_recv_on_empty_topic_returns_none() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe_to("/detections");
        assert!(rx.try_recv().is_none());
        assert_eq!(rx.topic(), "/detections");
    }
}
