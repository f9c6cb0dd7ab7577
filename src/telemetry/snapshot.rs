use super::{BodyVelocity, GeoPosition, OdometrySample, Quaternion};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};

/// The most recent observation of vehicle state.
///
/// Fields are written independently by different subscriber tasks, so a
/// reader may observe a mix of update times across fields. That is by
/// contract: readers tolerate slightly stale cross-field combinations
/// instead of paying for cross-feed synchronization on every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct TelemetrySnapshot {
    pub sim_time_s: Option<f64>,
    pub position: Option<GeoPosition>,
    pub attitude: Option<Quaternion>,
    pub velocity: Option<BodyVelocity>,
    pub in_air: bool,
}

impl TelemetrySnapshot {
    /// True once every field the sink records has been written at least once.
    pub fn is_complete(&self) -> bool {
        self.sim_time_s.is_some()
            && self.position.is_some()
            && self.attitude.is_some()
            && self.velocity.is_some()
    }
}

/// Shared latest-value cache of telemetry fields.
///
/// Exactly three writers exist (the feed subscribers), each owning a
/// disjoint set of fields. Individual writes are atomic behind the lock;
/// cross-field consistency is explicitly not guaranteed.
#[derive(Debug)]
pub struct SnapshotStore {
    current: RwLock<TelemetrySnapshot>,
    sample: Notify,
}

impl SnapshotStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { current: RwLock::new(TelemetrySnapshot::default()), sample: Notify::new() })
    }

    /// Copies out the current snapshot.
    pub async fn read(&self) -> TelemetrySnapshot { *self.current.read().await }

    pub async fn set_position(&self, pos: GeoPosition) {
        self.current.write().await.position = Some(pos);
    }

    /// Writes simulated time, attitude and body velocity, then signals one
    /// new sample to `next_sample` waiters. The odometry feed is the pulse
    /// of the mission, which is why it alone drives the sample signal.
    pub async fn set_odometry(&self, odom: OdometrySample) {
        {
            let mut snap = self.current.write().await;
            snap.sim_time_s = Some(odom.sim_time_s);
            snap.attitude = Some(odom.attitude);
            snap.velocity = Some(odom.velocity);
        }
        self.sample.notify_one();
    }

    pub async fn set_in_air(&self, in_air: bool) {
        self.current.write().await.in_air = in_air;
    }

    /// Waits for the next odometry sample and returns the snapshot as of
    /// that moment. Rapid updates coalesce; a slow caller sees fewer,
    /// fresher samples rather than a backlog.
    pub async fn next_sample(&self) -> TelemetrySnapshot {
        self.sample.notified().await;
        self.read().await
    }
}
