use crate::mission::plan::MissionPlan;
use crate::telemetry::{GeoPosition, OdometrySample};
use async_trait::async_trait;
use futures::stream::BoxStream;
use strum_macros::Display;

/// A live, infinite sequence of updates from one telemetry channel.
pub type TelemetryStream<T> = BoxStream<'static, Result<T, TelemetryFeedError>>;

#[derive(Debug, Display)]
pub enum CommandError {
    #[strum(to_string = "command rejected: {0}")]
    Rejected(String),
    #[strum(to_string = "flight controller link is closed")]
    LinkClosed,
    #[strum(to_string = "link transport failed: {0}")]
    Transport(std::io::Error),
}

impl std::error::Error for CommandError {}

impl From<std::io::Error> for CommandError {
    fn from(value: std::io::Error) -> Self { CommandError::Transport(value) }
}

#[derive(Debug, Display)]
pub enum TelemetryFeedError {
    #[strum(to_string = "telemetry feed closed")]
    Closed,
    #[strum(to_string = "telemetry feed transport failed: {0}")]
    Transport(String),
}

impl std::error::Error for TelemetryFeedError {}

/// The flight-controller connection, as far as this node consumes it.
///
/// Command semantics and mission upload live behind this seam so the rest of
/// the runner never sees the transport. Every `*_feed` call opens an
/// independent subscription; feeds never terminate on their own.
#[async_trait]
pub trait FlightLink: Send + Sync {
    /// Uploads the mission items and, when present, the rally points.
    async fn upload_mission(&self, plan: &MissionPlan) -> Result<(), CommandError>;

    /// Resolves once the controller reports a usable global position and
    /// home position estimate.
    async fn await_position_estimate(&self) -> Result<(), CommandError>;

    async fn arm(&self) -> Result<(), CommandError>;

    async fn start_mission(&self) -> Result<(), CommandError>;

    fn position_feed(&self) -> TelemetryStream<GeoPosition>;

    fn odometry_feed(&self) -> TelemetryStream<OdometrySample>;

    fn in_air_feed(&self) -> TelemetryStream<bool>;
}
