use super::{
    GeoPosition,
    math::{euler_from_quaternion, initial_bearing},
    message::{AttitudeBlock, PositionBlock, SpeedBlock, TelemetryMessage},
    snapshot::SnapshotStore,
};
use crate::{info, publish::TelemetryPublisher, warn};
use chrono::Utc;
use std::{fs::File, path::Path, sync::Arc, time::Duration};
use strum_macros::Display;

#[derive(Debug, Display)]
pub enum SinkError {
    #[strum(to_string = "failed to create flight log: {0}")]
    Create(std::io::Error),
    #[strum(to_string = "failed to append flight log record: {0}")]
    Write(csv::Error),
    #[strum(to_string = "failed to flush flight log: {0}")]
    Flush(std::io::Error),
}

impl std::error::Error for SinkError {}

impl From<csv::Error> for SinkError {
    fn from(value: csv::Error) -> Self { SinkError::Write(value) }
}

/// One row of the flight-log artifact. Raw odometry fields are kept as
/// recorded; derived quantities only go into the published message.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct FlightLogRecord {
    #[serde(rename = "SimTime")]
    pub sim_time_s: f64,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Lon")]
    pub lon: f64,
    #[serde(rename = "Alt")]
    pub alt: f64,
    #[serde(rename = "qw")]
    pub qw: f64,
    #[serde(rename = "qx")]
    pub qx: f64,
    #[serde(rename = "qy")]
    pub qy: f64,
    #[serde(rename = "qz")]
    pub qz: f64,
    #[serde(rename = "Vx")]
    pub vx: f64,
    #[serde(rename = "Vy")]
    pub vy: f64,
    #[serde(rename = "Vz")]
    pub vz: f64,
}

/// Periodic sampler that appends one log record and publishes one telemetry
/// message per simulated second while the vehicle flies.
///
/// The sink owns the log artifact and the publish channel exclusively. It
/// terminates on the first cycle that observes the airborne flag low after
/// flight began; this is the canonical end-of-mission signal.
pub struct TelemetrySink {
    store: Arc<SnapshotStore>,
    publisher: Arc<dyn TelemetryPublisher>,
    writer: csv::Writer<File>,
    poll_interval: Duration,
    last_logged_s: Option<i64>,
    prev_pos: Option<GeoPosition>,
    airborne_seen: bool,
}

impl TelemetrySink {
    pub fn create(
        log_path: &Path,
        store: Arc<SnapshotStore>,
        publisher: Arc<dyn TelemetryPublisher>,
        poll_interval: Duration,
    ) -> Result<Self, SinkError> {
        let file = File::create(log_path).map_err(SinkError::Create)?;
        Ok(Self {
            store,
            publisher,
            writer: csv::Writer::from_writer(file),
            poll_interval,
            last_logged_s: None,
            prev_pos: None,
            airborne_seen: false,
        })
    }

    /// Runs until the vehicle is back on the ground. Records are emitted at
    /// most once per truncated simulated second; seconds the sampler misses
    /// while falling behind are skipped, never backfilled.
    pub async fn run(mut self) -> Result<(), SinkError> {
        info!("Recording sensor data.");
        loop {
            let snap = self.store.read().await;

            if self.airborne_seen && !snap.in_air {
                info!("Vehicle has landed, closing flight log.");
                break;
            }
            if !snap.in_air || !snap.is_complete() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }
            self.airborne_seen = true;

            let (Some(sim_time), Some(pos), Some(q), Some(vel)) =
                (snap.sim_time_s, snap.position, snap.attitude, snap.velocity)
            else {
                continue;
            };
            let Some(sec) = next_eligible_second(self.last_logged_s, sim_time) else {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            };
            self.last_logged_s = Some(sec);

            self.writer.serialize(FlightLogRecord {
                sim_time_s: sim_time,
                lat: pos.lat,
                lon: pos.lon,
                alt: pos.alt,
                qw: q.w,
                qx: q.x,
                qy: q.y,
                qz: q.z,
                vx: vel.vx,
                vy: vel.vy,
                vz: vel.vz,
            })?;
            self.writer.flush().map_err(SinkError::Flush)?;

            let (roll, pitch, yaw) = euler_from_quaternion(&q);
            let track_angle =
                self.prev_pos.as_ref().map_or(0.0, |prev| initial_bearing(prev, &pos));
            self.prev_pos = Some(pos);

            let message = TelemetryMessage::new(
                Utc::now(),
                PositionBlock { altitude: pos.alt, longitude: pos.lon, latitude: pos.lat },
                AttitudeBlock { pitch, yaw, roll },
                SpeedBlock {
                    ground_speed: vel.ground_speed(),
                    track_angle,
                    vert_speed: vel.vz,
                },
            );
            // At-most-once delivery: a failed publish is logged and skipped.
            if let Err(e) = self.publisher.publish(&message).await {
                warn!("Dropping telemetry message for second {sec}: {e}");
            }
        }
        self.writer.flush().map_err(SinkError::Flush)?;
        if let Err(e) = self.publisher.close().await {
            warn!("Publish channel did not close cleanly: {e}");
        }
        Ok(())
    }
}

/// Returns the integer second to log for, or `None` while `sim_time_s` is
/// still inside the last logged second.
pub(super) fn next_eligible_second(last_logged: Option<i64>, sim_time_s: f64) -> Option<i64> {
    let sec = sim_time_s as i64;
    match last_logged {
        Some(last) if last == sec => None,
        _ => Some(sec),
    }
}
