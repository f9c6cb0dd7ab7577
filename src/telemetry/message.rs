use chrono::{DateTime, Utc};
use serde::Serialize;

/// Publish-ready telemetry envelope, wire-compatible with the ground
/// station's bus payload. One message per logged sample.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryMessage {
    /// Wall-clock timestamp in integer milliseconds.
    pub time_ms: i64,
    /// The same instant as a fractional-seconds string.
    pub time: String,
    pub message: MessageBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub position: PositionBlock,
    pub attitude: AttitudeBlock,
    pub speed: SpeedBlock,
    /// Battery percentage; not simulated, fixed placeholder.
    pub battery: u8,
    /// Pass-through alert list; always empty for simulated flights.
    pub pilot_alerts: Vec<String>,
    pub time: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionBlock {
    pub altitude: f64,
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AttitudeBlock {
    pub pitch: f64,
    pub yaw: f64,
    pub roll: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeedBlock {
    #[serde(rename = "GS")]
    pub ground_speed: f64,
    /// Initial great-circle bearing between the previous and current
    /// position, radians; 0 before a previous position exists.
    pub track_angle: f64,
    pub vert_speed: f64,
}

impl TelemetryMessage {
    const BATTERY_STUB: u8 = 50;

    #[allow(clippy::cast_precision_loss)]
    pub fn new(
        now: DateTime<Utc>,
        position: PositionBlock,
        attitude: AttitudeBlock,
        speed: SpeedBlock,
    ) -> Self {
        let time_ms = now.timestamp_millis();
        let time_s = time_ms as f64 / 1000.0;
        Self {
            time_ms,
            time: format!("{time_s:.6}"),
            message: MessageBody {
                position,
                attitude,
                speed,
                battery: Self::BATTERY_STUB,
                pilot_alerts: Vec::new(),
                time: time_s,
            },
        }
    }
}
