//! [`DetectionPipeline`] – producer, listener and updater wired together.
//!
//! All three run as Tokio tasks on one [`Session`]. The channel between the
//! listener and the updater is the only queue under the pipeline's control;
//! its capacity bounds how far the updater may fall behind before the
//! listener starts waiting.
//!
//! Two ways to stop:
//!
//! - [`PipelineHandle::shutdown`] shuts the session down. Everything still
//!   queued is abandoned.
//! - [`PipelineHandle::finish`] waits for the producer to return (useful
//!   with `max_detections`), then closes the bus so the listener and the
//!   updater drain what was published before stopping.

use std::sync::Arc;

use perceptor_detector::DetectionGenerator;
use perceptor_knowledge::KnowledgeStore;
use perceptor_middleware::channel::DEFAULT_CHANNEL_CAPACITY;
use perceptor_middleware::{Session, detection_channel};
use perceptor_types::PerceptError;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info};

use crate::listener::DetectionListener;
use crate::producer::{DetectionProducer, ProducerConfig};
use crate::updater::{KnowledgeUpdater, UpdaterConfig, UpdaterStats};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub producer: ProducerConfig,
    pub updater: UpdaterConfig,
    pub channel_capacity: usize,
    /// Generator seed. `None` seeds from the wall clock.
    pub seed: Option<u64>,
    /// Stop producing after this many detections.
    pub max_detections: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig::default(),
            updater: UpdaterConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            seed: None,
            max_detections: None,
        }
    }
}

/// What the pipeline did before it stopped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub published: u64,
    pub forwarded: u64,
    pub updater: UpdaterStats,
    /// Errors the tasks ended with, in producer, listener, updater order.
    pub errors: Vec<String>,
}

pub struct DetectionPipeline;

impl DetectionPipeline {
    /// Spawn the three tasks on the current runtime.
    ///
    /// # Errors
    ///
    /// [`PerceptError::SessionClosed`] if `session` is already shut down,
    /// [`PerceptError::Config`] for a zero channel capacity.
    pub fn spawn(
        session: &Session,
        config: PipelineConfig,
        store: Arc<dyn KnowledgeStore>,
    ) -> Result<PipelineHandle, PerceptError> {
        if config.channel_capacity == 0 {
            return Err(PerceptError::Config("channel capacity must be at least 1".into()));
        }
        let (tx, rx) = detection_channel(config.channel_capacity);

        // Subscribe before the producer publishes anything.
        let listener = DetectionListener::new(session, &config.producer.topic, tx)?;
        let updater = KnowledgeUpdater::new(session.clone(), rx, store, config.updater);
        let generator = match config.seed {
            Some(seed) => DetectionGenerator::with_seed(seed),
            None => DetectionGenerator::from_wall_clock(),
        };
        let producer = DetectionProducer::new(session.clone(), generator, config.producer);

        info!(
            session = %session.name(),
            channel_capacity = config.channel_capacity,
            max_detections = ?config.max_detections,
            "detection pipeline starting"
        );
        let producer = match config.max_detections {
            Some(n) => tokio::spawn(producer.run_for(n)),
            None => tokio::spawn(producer.run()),
        };
        Ok(PipelineHandle {
            session: session.clone(),
            producer,
            listener: tokio::spawn(listener.run()),
            updater: tokio::spawn(updater.run()),
        })
    }
}

pub struct PipelineHandle {
    session: Session,
    producer: JoinHandle<Result<u64, PerceptError>>,
    listener: JoinHandle<Result<u64, PerceptError>>,
    updater: JoinHandle<UpdaterStats>,
}

impl PipelineHandle {
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Stop everything now and collect the results.
    pub async fn shutdown(self) -> PipelineReport {
        self.session.shutdown();
        let producer = self.producer.await;
        collect(self.session, producer, self.listener, self.updater).await
    }

    /// Wait for the producer to return, drain, then shut the session down.
    ///
    /// Without `max_detections` this only returns once something else shuts
    /// the session down.
    pub async fn finish(self) -> PipelineReport {
        let producer = self.producer.await;
        self.session.bus().close();
        collect(self.session, producer, self.listener, self.updater).await
    }
}

async fn collect(
    session: Session,
    producer: Result<Result<u64, PerceptError>, JoinError>,
    listener: JoinHandle<Result<u64, PerceptError>>,
    updater: JoinHandle<UpdaterStats>,
) -> PipelineReport {
    let mut report = PipelineReport::default();
    collect_count("producer", producer, &mut report.published, &mut report.errors);
    collect_count("listener", listener.await, &mut report.forwarded, &mut report.errors);
    match updater.await {
        Ok(stats) => report.updater = stats,
        Err(e) => {
            error!(error = %e, "updater task panicked");
            report.errors.push(format!("updater: {e}"));
        }
    }
    session.shutdown();
    info!(
        published = report.published,
        forwarded = report.forwarded,
        processed = report.updater.processed,
        failed = report.updater.failed,
        "detection pipeline stopped"
    );
    report
}

fn collect_count(
    task: &str,
    joined: Result<Result<u64, PerceptError>, JoinError>,
    count: &mut u64,
    errors: &mut Vec<String>,
) {
    match joined {
        Ok(Ok(n)) => *count = n,
        Ok(Err(e)) => {
            error!(task, error = %e, "pipeline task failed");
            errors.push(format!("{task}: {e}"));
        }
        Err(e) => {
            error!(task, error = %e, "pipeline task panicked");
            errors.push(format!("{task}: {e}"));
        }
    }
}
