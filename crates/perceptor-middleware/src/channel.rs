//! Bounded single-producer / single-consumer detection queue.
//!
//! [`detection_channel`] returns the two ends of a FIFO built on
//! [`tokio::sync::mpsc`]:
//!
//! * [`DetectionSender::push`] appends to the tail and waits for space when
//!   the queue is full (backpressure).
//! * [`DetectionSender::try_push`] never waits; a full queue is reported as
//!   [`PerceptError::ChannelFull`].
//! * [`DetectionReceiver::pop`] waits for the oldest item.
//! * [`DetectionReceiver::pop_timeout`] bounds that wait so a consumer can
//!   notice shutdown.
//!
//! Neither end is `Clone`: one producer, one consumer. Every pushed
//! detection is popped exactly once and in push order.

use std::time::Duration;

use perceptor_types::{Detection, PerceptError};
use tokio::sync::mpsc;

/// Queue depth used when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Create a detection channel holding at most `capacity` pending items.
///
/// A `capacity` of zero is bumped to one.
pub fn detection_channel(capacity: usize) -> (DetectionSender, DetectionReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (DetectionSender { tx }, DetectionReceiver { rx })
}

/// Producer end of a detection channel.
#[derive(Debug)]
pub struct DetectionSender {
    tx: mpsc::Sender<Detection>,
}

impl DetectionSender {
    /// Append `detection`, waiting for space if the queue is full.
    ///
    /// # Errors
    ///
    /// [`PerceptError::ChannelClosed`] if the receiver has been dropped.
    pub async fn push(&self, detection: Detection) -> Result<(), PerceptError> {
        self.tx
            .send(detection)
            .await
            .map_err(|_| PerceptError::ChannelClosed)
    }

    /// Append `detection` without waiting.
    ///
    /// # Errors
    ///
    /// [`PerceptError::ChannelFull`] when no slot is free,
    /// [`PerceptError::ChannelClosed`] if the receiver has been dropped.
    pub fn try_push(&self, detection: Detection) -> Result<(), PerceptError> {
        self.tx.try_send(detection).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PerceptError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => PerceptError::ChannelClosed,
        })
    }

    /// Number of items pushed but not yet popped.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of pending items.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// `true` once the receiver is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer end of a detection channel.
#[derive(Debug)]
pub struct DetectionReceiver {
    rx: mpsc::Receiver<Detection>,
}

impl DetectionReceiver {
    /// Wait for and remove the oldest pending detection.
    ///
    /// Returns `None` once the sender is gone and the queue is drained.
    pub async fn pop(&mut self) -> Option<Detection> {
        self.rx.recv().await
    }

    /// Like [`pop`][Self::pop] but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`PerceptError::Timeout`] if nothing arrived in time,
    /// [`PerceptError::ChannelClosed`] once the sender is gone and the queue
    /// is drained.
    pub async fn pop_timeout(&mut self, timeout: Duration) -> Result<Detection, PerceptError> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(detection)) => Ok(detection),
            Ok(None) => Err(PerceptError::ChannelClosed),
            Err(_) => Err(PerceptError::Timeout(timeout.as_millis() as u64)),
        }
    }

    /// Remove the oldest pending detection if there is one.
    pub fn try_pop(&mut self) -> Option<Detection> {
        self.rx.try_recv().ok()
    }

    /// Number of items waiting to be popped.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Stop accepting new items; already queued ones can still be popped.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use perceptor_types::{ObjectType, Pose, Quaternion, Vector3};

    fn detection(object_type: ObjectType, x: f64) -> Detection {
        Detection::new(
            object_type,
            Pose::new(Vector3::new(x, x, x), Quaternion::identity()),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn pops_in_push_order() {
        let (tx, mut rx) = detection_channel(64);
        let pushed: Vec<Detection> = (0..50)
            .map(|i| detection(ObjectType::ALL[i % 6], i as f64))
            .collect();
        for d in &pushed {
            tx.push(d.clone()).await.unwrap();
        }
        assert_eq!(rx.len(), 50);

        let mut popped = Vec::new();
        for _ in 0..50 {
            popped.push(rx.pop().await.unwrap());
        }
        assert_eq!(popped, pushed);
        assert!(rx.is_empty());
    }

    /// Producer and consumer running concurrently through a queue much
    /// smaller than the stream: nothing lost, duplicated or reordered.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_handoff_preserves_sequence() {
        let (tx, mut rx) = detection_channel(4);
        let pushed: Vec<Detection> = (0..500)
            .map(|i| detection(ObjectType::ALL[i % 6], i as f64))
            .collect();

        let to_send = pushed.clone();
        let producer = tokio::spawn(async move {
            for d in to_send {
                tx.push(d).await.unwrap();
            }
        });

        let mut popped = Vec::new();
        while let Some(d) = rx.pop().await {
            popped.push(d);
        }
        producer.await.unwrap();
        assert_eq!(popped, pushed);
    }

    #[tokio::test]
    async fn try_push_reports_full() {
        let (tx, mut rx) = detection_channel(2);
        tx.try_push(detection(ObjectType::Cup, 0.0)).unwrap();
        tx.try_push(detection(ObjectType::Cup, 1.0)).unwrap();
        assert_eq!(tx.len(), 2);
        assert_eq!(
            tx.try_push(detection(ObjectType::Cup, 2.0)),
            Err(PerceptError::ChannelFull)
        );

        rx.pop().await.unwrap();
        assert!(tx.try_push(detection(ObjectType::Cup, 2.0)).is_ok());
    }

    #[tokio::test]
    async fn push_waits_for_space() {
        let (tx, mut rx) = detection_channel(1);
        tx.push(detection(ObjectType::Cup, 0.0)).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.push(detection(ObjectType::DinnerFork, 1.0)),
        )
        .await;
        assert!(blocked.is_err(), "push on a full channel must wait");

        assert_eq!(rx.pop().await.unwrap().object_type, ObjectType::Cup);
        tx.push(detection(ObjectType::DinnerFork, 1.0)).await.unwrap();
        assert_eq!(rx.pop().await.unwrap().object_type, ObjectType::DinnerFork);
    }

    #[tokio::test]
    async fn pop_timeout_on_empty_channel() {
        let (_tx, mut rx) = detection_channel(1);
        let err = rx.pop_timeout(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err, PerceptError::Timeout(20));
    }

    #[tokio::test]
    async fn dropped_sender_drains_then_closes() {
        let (tx, mut rx) = detection_channel(4);
        tx.push(detection(ObjectType::SoupSpoon, 0.0)).await.unwrap();
        drop(tx);

        let d = rx.pop_timeout(Duration::from_millis(20)).await.unwrap();
        assert_eq!(d.object_type, ObjectType::SoupSpoon);
        assert_eq!(
            rx.pop_timeout(Duration::from_millis(20)).await,
            Err(PerceptError::ChannelClosed)
        );
        assert!(rx.pop().await.is_none());
    }

    #[tokio::test]
    async fn push_after_receiver_dropped_fails() {
        let (tx, rx) = detection_channel(4);
        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(
            tx.push(detection(ObjectType::Cup, 0.0)).await,
            Err(PerceptError::ChannelClosed)
        );
        assert_eq!(
            tx.try_push(detection(ObjectType::Cup, 0.0)),
            Err(PerceptError::ChannelClosed)
        );
    }

    #[test]
    fn zero_capacity_is_bumped_to_one() {
        let (tx, _rx) = detection_channel(0);
        assert_eq!(tx.capacity(), 1);
        assert!(tx.is_empty());
    }
}
