//! [`DetectionListener`] – bus topic to detection channel.
//!
//! The subscription is taken in [`DetectionListener::new`], so nothing
//! published after construction is missed. Forwarding uses the channel's
//! blocking push: a slow consumer slows the listener down, and anything it
//! cannot keep up with piles up in (and eventually lags out of) the bus.

use perceptor_middleware::{DetectionSender, Session, TopicReceiver};
use perceptor_types::{EventPayload, PerceptError};
use tracing::{debug, info};

pub struct DetectionListener {
    session: Session,
    receiver: TopicReceiver,
    sender: DetectionSender,
    forwarded: u64,
}

impl DetectionListener {
    /// Subscribe to `topic` on `session`, forwarding into `sender`.
    ///
    /// # Errors
    ///
    /// [`PerceptError::SessionClosed`] if the session is already shut down.
    pub fn new(session: &Session, topic: &str, sender: DetectionSender) -> Result<Self, PerceptError> {
        Ok(Self {
            session: session.clone(),
            receiver: session.subscribe(topic)?,
            sender,
            forwarded: 0,
        })
    }

    pub fn topic(&self) -> &str {
        self.receiver.topic()
    }

    /// Forward until the session is shut down or the topic closes.
    ///
    /// Returns the number of detections forwarded. Dropping the listener
    /// closes the channel's sending side.
    ///
    /// # Errors
    ///
    /// [`PerceptError::ChannelClosed`] if the consumer went away.
    pub async fn run(mut self) -> Result<u64, PerceptError> {
        info!(topic = %self.receiver.topic(), "detection listener started");
        loop {
            let event = tokio::select! {
                event = self.receiver.recv() => event,
                _ = self.session.closed() => None,
            };
            let Some(event) = event else { break };

            match event.payload {
                EventPayload::ObjectDetection(detection) => {
                    tokio::select! {
                        pushed = self.sender.push(detection) => pushed?,
                        _ = self.session.closed() => break,
                    }
                    self.forwarded += 1;
                }
                other => debug!(source = %event.source, payload = ?other, "ignoring non-detection event"),
            }
        }
        info!(forwarded = self.forwarded, "detection listener stopped");
        Ok(self.forwarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perceptor_middleware::detection_channel;
    use perceptor_types::{Detection, ObjectType, Pose};
    use std::time::Duration;

    const TOPIC: &str = "/detections";

    fn detection(object_type: ObjectType) -> EventPayload {
        EventPayload::ObjectDetection(Detection::new(object_type, Pose::default(), Utc::now()))
    }

    #[tokio::test]
    async fn forwards_detections_in_order() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let (tx, mut rx) = detection_channel(10);
        let listener = DetectionListener::new(&session, TOPIC, tx)?;
        assert_eq!(listener.topic(), TOPIC);

        session.publish(TOPIC, "test", detection(ObjectType::Cup))?;
        session.publish(TOPIC, "test", detection(ObjectType::DinnerFork))?;
        session.bus().close();

        assert_eq!(listener.run().await?, 2);
        assert_eq!(rx.pop().await.map(|d| d.object_type), Some(ObjectType::Cup));
        assert_eq!(rx.pop().await.map(|d| d.object_type), Some(ObjectType::DinnerFork));
        assert!(rx.pop().await.is_none(), "sender must be dropped with the listener");
        Ok(())
    }

    #[tokio::test]
    async fn skips_other_payloads() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let (tx, mut rx) = detection_channel(10);
        let listener = DetectionListener::new(&session, TOPIC, tx)?;

        session.publish(
            TOPIC,
            "test",
            EventPayload::Fault {
                component: "camera".into(),
                code: 3,
                message: "lens cap on".into(),
            },
        )?;
        session.publish(TOPIC, "test", detection(ObjectType::TableKnife))?;
        session.bus().close();

        assert_eq!(listener.run().await?, 1);
        assert_eq!(rx.try_pop().map(|d| d.object_type), Some(ObjectType::TableKnife));
        Ok(())
    }

    #[tokio::test]
    async fn full_channel_is_unblocked_by_shutdown() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let (tx, _rx) = detection_channel(1);
        let listener = DetectionListener::new(&session, TOPIC, tx)?;
        let task = tokio::spawn(listener.run());

        for _ in 0..3 {
            session.publish(TOPIC, "test", detection(ObjectType::Cup))?;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.shutdown();

        let forwarded = tokio::time::timeout(Duration::from_secs(1), task).await???;
        assert_eq!(forwarded, 1);
        Ok(())
    }

    #[tokio::test]
    async fn dropped_consumer_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let (tx, rx) = detection_channel(1);
        let listener = DetectionListener::new(&session, TOPIC, tx)?;
        drop(rx);

        session.publish(TOPIC, "test", detection(ObjectType::Cup))?;
        assert_eq!(listener.run().await, Err(PerceptError::ChannelClosed));
        Ok(())
    }

    #[test]
    fn cannot_listen_on_closed_session() {
        let session = Session::new("test");
        session.shutdown();
        let (tx, _rx) = detection_channel(1);
        assert!(matches!(
            DetectionListener::new(&session, TOPIC, tx),
            Err(PerceptError::SessionClosed)
        ));
    }
}
