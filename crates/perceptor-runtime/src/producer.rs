//! [`DetectionProducer`] – the publishing loop.
//!
//! Once per interval: generate a detection, publish it on the topic, log
//! `detected <type>`, sleep. The loop ends when the session is shut down,
//! when an optional count is reached, or when publishing fails; in the last
//! case the error is returned.

use std::time::Duration;

use perceptor_detector::DetectionGenerator;
use perceptor_middleware::Session;
use perceptor_types::{Detection, EventPayload, PerceptError};
use tracing::{debug, info};

use crate::DEFAULT_DETECTIONS_TOPIC;

/// Event `source` of published detections.
pub const PRODUCER_SOURCE: &str = "dummy_object_detector";

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub topic: String,
    /// Delay between two publications.
    pub interval: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            topic: DEFAULT_DETECTIONS_TOPIC.to_string(),
            interval: Duration::from_secs(1),
        }
    }
}

pub struct DetectionProducer {
    session: Session,
    generator: DetectionGenerator,
    config: ProducerConfig,
    published: u64,
}

impl DetectionProducer {
    pub fn new(session: Session, generator: DetectionGenerator, config: ProducerConfig) -> Self {
        Self {
            session,
            generator,
            config,
            published: 0,
        }
    }

    /// Number of detections published so far.
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Generate and publish a single detection.
    ///
    /// # Errors
    ///
    /// [`PerceptError::SessionClosed`] if the session is gone.
    pub fn publish_one(&mut self) -> Result<Detection, PerceptError> {
        let detection = self.generator.generate();
        let receivers = self.session.publish(
            &self.config.topic,
            PRODUCER_SOURCE,
            EventPayload::ObjectDetection(detection.clone()),
        )?;
        self.published += 1;
        info!(
            object_type = %detection.object_type,
            x = detection.pose.pose.position.x,
            y = detection.pose.pose.position.y,
            z = detection.pose.pose.position.z,
            "detected {}",
            detection.object_type
        );
        debug!(topic = %self.config.topic, receivers, "detection published");
        Ok(detection)
    }

    /// Publish until the session is shut down.
    ///
    /// Returns the number of detections published.
    pub async fn run(mut self) -> Result<u64, PerceptError> {
        self.run_loop(None).await
    }

    /// Publish at most `count` detections, without sleeping after the last.
    pub async fn run_for(mut self, count: u64) -> Result<u64, PerceptError> {
        self.run_loop(Some(count)).await
    }

    async fn run_loop(&mut self, limit: Option<u64>) -> Result<u64, PerceptError> {
        info!(
            topic = %self.config.topic,
            interval_ms = self.config.interval.as_millis() as u64,
            seed = self.generator.seed(),
            "detection producer started"
        );
        while self.session.is_valid() && limit.is_none_or(|n| self.published < n) {
            match self.publish_one() {
                Err(PerceptError::SessionClosed) if !self.session.is_valid() => break,
                result => {
                    result?;
                }
            }
            if limit.is_some_and(|n| self.published >= n) {
                break;
            }
            if !self.session.sleep(self.config.interval).await {
                break;
            }
        }
        info!(published = self.published, "detection producer stopped");
        Ok(self.published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> ProducerConfig {
        ProducerConfig {
            interval: Duration::from_millis(1),
            ..ProducerConfig::default()
        }
    }

    #[tokio::test]
    async fn publishes_exactly_count_detections() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let mut rx = session.subscribe(DEFAULT_DETECTIONS_TOPIC)?;
        let producer = DetectionProducer::new(session.clone(), DetectionGenerator::with_seed(1), fast());

        assert_eq!(producer.run_for(3).await?, 3);
        for _ in 0..3 {
            let event = rx.try_recv().ok_or("missing event")?;
            assert_eq!(event.source, PRODUCER_SOURCE);
            assert!(matches!(event.payload, EventPayload::ObjectDetection(_)));
        }
        assert!(rx.try_recv().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn published_sequence_matches_seeded_generator() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let mut rx = session.subscribe(DEFAULT_DETECTIONS_TOPIC)?;
        DetectionProducer::new(session.clone(), DetectionGenerator::with_seed(99), fast())
            .run_for(5)
            .await?;

        let mut reference = DetectionGenerator::with_seed(99);
        for _ in 0..5 {
            let expected = reference.generate();
            let Some(event) = rx.try_recv() else {
                return Err("missing event".into());
            };
            let EventPayload::ObjectDetection(got) = event.payload else {
                return Err("unexpected payload".into());
            };
            assert_eq!(got.object_type, expected.object_type);
            assert_eq!(got.pose.pose, expected.pose.pose);
        }
        Ok(())
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let producer = DetectionProducer::new(session, DetectionGenerator::with_seed(2), fast());
        assert_eq!(producer.run_for(2).await?, 2);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        let producer = DetectionProducer::new(
            session.clone(),
            DetectionGenerator::with_seed(3),
            ProducerConfig {
                interval: Duration::from_secs(30),
                ..ProducerConfig::default()
            },
        );
        let task = tokio::spawn(producer.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        session.shutdown();

        let published = tokio::time::timeout(Duration::from_secs(1), task).await???;
        assert_eq!(published, 1);
        Ok(())
    }

    #[tokio::test]
    async fn closed_session_is_reported() {
        let session = Session::new("test");
        let mut producer = DetectionProducer::new(session.clone(), DetectionGenerator::with_seed(4), fast());
        session.shutdown();
        assert_eq!(producer.publish_one().unwrap_err(), PerceptError::SessionClosed);
        assert_eq!(producer.published(), 0);
    }

    #[tokio::test]
    async fn run_on_closed_session_publishes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let session = Session::new("test");
        session.shutdown();
        let producer = DetectionProducer::new(session, DetectionGenerator::with_seed(4), fast());
        assert_eq!(producer.run().await?, 0);
        Ok(())
    }
}
