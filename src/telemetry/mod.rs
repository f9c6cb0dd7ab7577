//! Vehicle telemetry: shared value types, the latest-value snapshot store,
//! the feed subscriber tasks, the landing heuristic and the per-second
//! logging/publishing sink.

mod landing;
mod math;
mod message;
mod sink;
mod snapshot;
mod subscribers;

pub use landing::{LandingDetector, LandingVerdict};
pub use math::{euler_from_quaternion, initial_bearing};
pub use message::{AttitudeBlock, PositionBlock, SpeedBlock, TelemetryMessage};
pub use sink::{FlightLogRecord, SinkError, TelemetrySink};
pub use snapshot::{SnapshotStore, TelemetrySnapshot};
pub use subscribers::spawn_subscribers;

use serde::{Deserialize, Serialize};
use std::fmt;

/// A geodetic fix in degrees/degrees/meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPosition {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
}

impl GeoPosition {
    pub fn new(lat: f64, lon: f64, alt: f64) -> Self { Self { lat, lon, alt } }
}

impl fmt::Display for GeoPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°, {:.1}m)", self.lat, self.lon, self.alt)
    }
}

/// Vehicle orientation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    pub const IDENTITY: Self = Self { w: 1.0, x: 0.0, y: 0.0, z: 0.0 };
}

/// Body-frame velocity components in m/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodyVelocity {
    pub vx: f64,
    pub vy: f64,
    pub vz: f64,
}

impl BodyVelocity {
    /// Euclidean norm of the horizontal components.
    pub fn ground_speed(&self) -> f64 { self.vx.hypot(self.vy) }
}

/// One odometry update from the flight controller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdometrySample {
    /// Simulated time in seconds, monotonic within a mission.
    pub sim_time_s: f64,
    pub attitude: Quaternion,
    pub velocity: BodyVelocity,
}
