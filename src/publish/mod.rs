//! The outbound telemetry channel, one queue per mission.

use crate::telemetry::TelemetryMessage;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use strum_macros::Display;
use tokio::{fs::File, io::AsyncWriteExt, sync::Mutex};

#[derive(Debug, Display)]
pub enum PublishError {
    #[strum(to_string = "publish channel is closed")]
    Closed,
    #[strum(to_string = "failed to deliver telemetry message: {0}")]
    Delivery(String),
}

impl std::error::Error for PublishError {}

impl From<std::io::Error> for PublishError {
    fn from(value: std::io::Error) -> Self { PublishError::Delivery(value.to_string()) }
}

/// Abstract at-most-once message delivery to the telemetry bus.
///
/// The bus transport is an external collaborator; this node only publishes.
/// A failed publish drops that message, it never blocks the mission.
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish(&self, message: &TelemetryMessage) -> Result<(), PublishError>;

    async fn close(&self) -> Result<(), PublishError> { Ok(()) }
}

/// File-backed publisher writing one JSON document per line, used when no
/// broker is wired up. The file stands in for the per-mission queue.
pub struct JsonLinesPublisher {
    file: Mutex<Option<File>>,
    path: PathBuf,
}

impl JsonLinesPublisher {
    pub async fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path).await?;
        Ok(Self { file: Mutex::new(Some(file)), path: path.to_path_buf() })
    }

    pub fn path(&self) -> &Path { &self.path }
}

#[async_trait]
impl TelemetryPublisher for JsonLinesPublisher {
    async fn publish(&self, message: &TelemetryMessage) -> Result<(), PublishError> {
        let mut body = serde_json::to_vec(message).map_err(|e| PublishError::Delivery(e.to_string()))?;
        body.push(b'\n');
        let mut guard = self.file.lock().await;
        let file = guard.as_mut().ok_or(PublishError::Closed)?;
        file.write_all(&body).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        if let Some(mut file) = self.file.lock().await.take() {
            file.flush().await?;
        }
        Ok(())
    }
}
