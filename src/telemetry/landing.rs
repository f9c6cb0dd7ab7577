use super::{GeoPosition, snapshot::{SnapshotStore, TelemetrySnapshot}};
use crate::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Verdict of one detector step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandingVerdict {
    Continue,
    Landed,
}

/// Position-stability landing heuristic.
///
/// This deliberately does not compare against the landing target's absolute
/// coordinates: it detects "motion has stopped" relative to the previous
/// sample, which corresponds to landing because every mission ends with a
/// descent. A latch plus a long debounce make it robust against transient
/// hovering.
#[derive(Debug)]
pub struct LandingDetector {
    target: GeoPosition,
    prev: Option<GeoPosition>,
    samples: u64,
    latched_at: Option<u64>,
}

impl LandingDetector {
    const LAT_EPS_DEG: f64 = 0.01;
    const LON_EPS_DEG: f64 = 0.01;
    const ALT_EPS_M: f64 = 0.5;
    /// Minimum sample count before the stability latch may engage, so the
    /// pre-takeoff standstill never counts as a landing.
    const LATCH_GUARD: u64 = 1000;
    /// Samples of continued processing required after the latch before
    /// `Landed` is reported.
    const CONFIRM_SAMPLES: u64 = 1000;

    pub fn new(target: GeoPosition) -> Self {
        Self { target, prev: None, samples: 1, latched_at: None }
    }

    pub fn landing_target(&self) -> &GeoPosition { &self.target }

    /// Feeds one snapshot into the heuristic. Snapshots without a populated
    /// position are ignored entirely and do not advance the sample counter.
    pub fn observe(&mut self, snapshot: &TelemetrySnapshot) -> LandingVerdict {
        let Some(pos) = snapshot.position else {
            return LandingVerdict::Continue;
        };
        self.samples += 1;

        if let Some(prev) = self.prev {
            let stable = (pos.lat - prev.lat).abs() < Self::LAT_EPS_DEG
                && (pos.lon - prev.lon).abs() < Self::LON_EPS_DEG
                && (pos.alt - prev.alt).abs() < Self::ALT_EPS_M;
            if stable && self.latched_at.is_none() && self.samples > Self::LATCH_GUARD {
                self.latched_at = Some(self.samples);
            }
        }
        self.prev = Some(pos);

        match self.latched_at {
            Some(latch) if self.samples - latch > Self::CONFIRM_SAMPLES => LandingVerdict::Landed,
            _ => LandingVerdict::Continue,
        }
    }

    /// Consumes snapshot samples until landing is detected or the mission is
    /// cancelled from elsewhere. On detection the shared token is cancelled,
    /// ending the telemetry phase. Returns whether this detector fired.
    pub async fn run(mut self, store: Arc<SnapshotStore>, c_tok: CancellationToken) -> bool {
        loop {
            tokio::select! {
                () = c_tok.cancelled() => return false,
                snap = store.next_sample() => {
                    if self.observe(&snap) == LandingVerdict::Landed {
                        info!("Position stable near {} - flight plan has ended.", self.target);
                        c_tok.cancel();
                        return true;
                    }
                }
            }
        }
    }
}
