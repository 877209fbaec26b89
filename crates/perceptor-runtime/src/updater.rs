//! [`KnowledgeUpdater`] – the consuming loop.
//!
//! Pops detections in FIFO order, turns each pose into a 4×4 transform,
//! renders the `create_object_perception` assertion and submits it. A
//! failed submission is logged and counted; the loop carries on with the
//! next detection. The pop uses a timeout so that shutdown is noticed even
//! when nothing arrives.

use std::sync::Arc;
use std::time::Duration;

use perceptor_knowledge::{KnowledgeStore, ObjectPerceptionQuery, QueryResult, QueryTemplate};
use perceptor_middleware::{DetectionReceiver, Session};
use perceptor_types::{Detection, PerceptError};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub template: QueryTemplate,
    /// How long one pop waits before re-checking the session.
    pub pop_timeout: Duration,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            template: QueryTemplate::default(),
            pop_timeout: Duration::from_millis(500),
        }
    }
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdaterStats {
    /// Detections whose assertion was accepted.
    pub processed: u64,
    /// Detections whose assertion failed.
    pub failed: u64,
}

impl UpdaterStats {
    pub fn total(&self) -> u64 {
        self.processed + self.failed
    }
}

pub struct KnowledgeUpdater {
    session: Session,
    receiver: DetectionReceiver,
    store: Arc<dyn KnowledgeStore>,
    config: UpdaterConfig,
    stats: UpdaterStats,
}

impl KnowledgeUpdater {
    pub fn new(
        session: Session,
        receiver: DetectionReceiver,
        store: Arc<dyn KnowledgeStore>,
        config: UpdaterConfig,
    ) -> Self {
        Self {
            session,
            receiver,
            store,
            config,
            stats: UpdaterStats::default(),
        }
    }

    pub fn stats(&self) -> UpdaterStats {
        self.stats
    }

    /// Assert a single detection.
    pub async fn process(&self, detection: &Detection) -> Result<QueryResult, PerceptError> {
        let query = ObjectPerceptionQuery::from_detection(&self.config.template, detection);
        let text = query.to_prolog();
        debug!(id = %detection.id, query = %text, "asserting detection");
        self.store.submit(&text).await
    }

    /// Consume until the session is shut down, or until the channel is
    /// closed and drained.
    pub async fn run(mut self) -> UpdaterStats {
        info!("knowledge updater started");
        while self.session.is_valid() {
            match self.receiver.pop_timeout(self.config.pop_timeout).await {
                Ok(detection) => self.handle(detection).await,
                Err(PerceptError::Timeout(_)) => continue,
                Err(PerceptError::ChannelClosed) => {
                    debug!("detection channel closed and drained");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "detection channel failed");
                    break;
                }
            }
        }
        info!(
            processed = self.stats.processed,
            failed = self.stats.failed,
            "knowledge updater stopped"
        );
        self.stats
    }

    async fn handle(&mut self, detection: Detection) {
        match self.process(&detection).await {
            Ok(result) => {
                self.stats.processed += 1;
                info!(
                    object_type = %detection.object_type,
                    bindings = ?result.bindings,
                    "object perception asserted"
                );
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(
                    object_type = %detection.object_type,
                    id = %detection.id,
                    error = %e,
                    "failed to assert object perception"
                );
            }
        }
    }
}
