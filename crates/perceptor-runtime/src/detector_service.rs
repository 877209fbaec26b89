//! On-demand detection: [`DummyDetectorService`] and [`DummyClient`].
//!
//! Every `DetectObject` request is answered with a freshly generated
//! detection. The request carries no fields.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use perceptor_detector::DetectionGenerator;
use perceptor_geometry::to_transform;
use perceptor_middleware::{ServiceClient, ServiceHandler, ServiceServer, Session};
use perceptor_types::{
    DetectObjectRequest, DetectObjectResponse, Detection, PerceptError, Transform,
};
use tracing::info;

pub struct DummyDetectorService {
    generator: Mutex<DetectionGenerator>,
}

impl DummyDetectorService {
    pub fn new(generator: DetectionGenerator) -> Self {
        Self {
            generator: Mutex::new(generator),
        }
    }

    /// Advertise on `session` under `name`. The service stays reachable
    /// while the returned server is alive.
    pub fn advertise(self, session: &Session, name: &str) -> Result<ServiceServer, PerceptError> {
        let server = session.advertise_service(name, Arc::new(self))?;
        info!(service = name, "dummy object detector ready");
        Ok(server)
    }
}

#[async_trait]
impl ServiceHandler for DummyDetectorService {
    async fn handle(&self, _req: DetectObjectRequest) -> Result<DetectObjectResponse, PerceptError> {
        let obj = self.generator.lock().generate();
        info!(object_type = %obj.object_type, "detected {}", obj.object_type);
        Ok(DetectObjectResponse { obj })
    }
}

/// Client side of the dummy detector.
#[derive(Clone)]
pub struct DummyClient {
    client: ServiceClient,
}

impl DummyClient {
    /// Look up `service` on `session`.
    ///
    /// # Errors
    ///
    /// [`PerceptError::ServiceNotFound`] if nothing is advertised under that
    /// name.
    pub fn connect(session: &Session, service: &str, timeout: Duration) -> Result<Self, PerceptError> {
        Ok(Self {
            client: session.service_client(service, timeout)?,
        })
    }

    /// Request one detection.
    pub async fn detect_object(&self) -> Result<Detection, PerceptError> {
        let response = self.client.call(DetectObjectRequest::default()).await?;
        info!(
            service = %self.client.service(),
            object_type = %response.obj.object_type,
            "Detected object of type {}",
            response.obj.object_type
        );
        Ok(response.obj)
    }

    /// Request one detection along with its pose as a transform.
    pub async fn detect_object_transform(&self) -> Result<(Detection, Transform), PerceptError> {
        let detection = self.detect_object().await?;
        let transform = to_transform(&detection.pose.pose);
        Ok((detection, transform))
    }
}
