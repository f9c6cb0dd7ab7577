use super::plan::{MissionPlan, PlanDecodeError};
use crate::config::RunnerConfig;
use crate::flight_control::{
    link::{CommandError, FlightLink, TelemetryFeedError},
    takeoff::{RetryPolicy, TakeoffController, TakeoffError},
};
use crate::publish::TelemetryPublisher;
use crate::sim::supervisor::{SimError, SimSupervisor};
use crate::telemetry::{
    LandingDetector, SinkError, SnapshotStore, TelemetrySink, spawn_subscribers,
};
use crate::{info, sim_out, warn};
use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use strum_macros::Display;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Display)]
pub enum MissionError {
    #[strum(to_string = "{0}")]
    Plan(PlanDecodeError),
    #[strum(to_string = "{0}")]
    Sim(SimError),
    #[strum(to_string = "could not connect to the flight controller: {0}")]
    Connect(CommandError),
    #[strum(to_string = "flight controller command failed: {0}")]
    Command(CommandError),
    #[strum(to_string = "{0}")]
    Takeoff(TakeoffError),
    #[strum(to_string = "telemetry phase aborted: {0}")]
    Feed(TelemetryFeedError),
    #[strum(to_string = "{0}")]
    Sink(SinkError),
}

impl std::error::Error for MissionError {}

impl From<PlanDecodeError> for MissionError {
    fn from(value: PlanDecodeError) -> Self { MissionError::Plan(value) }
}

impl From<SimError> for MissionError {
    fn from(value: SimError) -> Self { MissionError::Sim(value) }
}

impl From<TakeoffError> for MissionError {
    fn from(value: TakeoffError) -> Self { MissionError::Takeoff(value) }
}

impl From<SinkError> for MissionError {
    fn from(value: SinkError) -> Self { MissionError::Sink(value) }
}

/// Composes one mission run: plan → simulator → takeoff → telemetry →
/// teardown. Teardown is unconditional on every exit path that got far
/// enough to have something to tear down.
pub struct MissionRunner {
    supervisor: SimSupervisor,
    takeoff: TakeoffController,
    sink_poll_interval: Duration,
    shutdown_grace: Duration,
    log_dir: PathBuf,
}

impl MissionRunner {
    pub fn new(
        supervisor: SimSupervisor,
        policy: RetryPolicy,
        sink_poll_interval: Duration,
        shutdown_grace: Duration,
        log_dir: PathBuf,
    ) -> Self {
        Self {
            supervisor,
            takeoff: TakeoffController::new(policy),
            sink_poll_interval,
            shutdown_grace,
            log_dir,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            SimSupervisor::from_config(config),
            RetryPolicy::default(),
            config.sink_poll_interval,
            config.sim_shutdown_timeout,
            config.log_dir.clone(),
        )
    }

    pub fn log_path(&self, mission_id: &str) -> PathBuf {
        self.log_dir.join(format!("{mission_id}_log.csv"))
    }

    /// Runs one mission end-to-end and returns the path of the flight-log
    /// artifact. `connect` is called once the simulator is ready, since the
    /// flight-controller link only exists from that point on.
    pub async fn run<C, Fut>(
        &self,
        mission_id: &str,
        plan_path: &Path,
        connect: C,
        publisher: Arc<dyn TelemetryPublisher>,
    ) -> Result<PathBuf, MissionError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn FlightLink>, CommandError>>,
    {
        let plan = MissionPlan::load(plan_path).await?;
        info!(
            "Mission {mission_id}: {} items, home {}, landing target {}.",
            plan.items().len(),
            plan.home(),
            plan.landing_target()
        );

        let mut sim = self.supervisor.launch(plan.home())?;
        let result = match sim.await_ready(|line| sim_out!("{line}")).await {
            Ok(()) => {
                let flight = self.fly(mission_id, &plan, connect, Arc::clone(&publisher)).await;
                // The shutdown handshake runs whether the flight succeeded
                // or not; only a crashed engine skips it.
                if let Err(e) = sim.shutdown(self.shutdown_grace).await {
                    warn!("Simulation engine teardown failed: {e}");
                }
                flight
            }
            // The engine is already gone, there is no one to hand-shake
            // with; kill_on_drop reaps whatever is left.
            Err(e) => Err(e.into()),
        };

        if let Err(e) = publisher.close().await {
            warn!("Publish channel did not close cleanly: {e}");
        }
        result
    }

    /// The phases that need a live simulator: connect, upload, takeoff and
    /// the concurrent telemetry stage.
    async fn fly<C, Fut>(
        &self,
        mission_id: &str,
        plan: &MissionPlan,
        connect: C,
        publisher: Arc<dyn TelemetryPublisher>,
    ) -> Result<PathBuf, MissionError>
    where
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<dyn FlightLink>, CommandError>>,
    {
        let link = connect().await.map_err(MissionError::Connect)?;

        link.upload_mission(plan).await.map_err(MissionError::Command)?;
        info!("Mission {mission_id} uploaded to the flight controller.");

        info!("Waiting for the global position estimate.");
        link.await_position_estimate().await.map_err(MissionError::Command)?;

        self.takeoff.attempt_takeoff(&link).await?;

        tokio::fs::create_dir_all(&self.log_dir).await.map_err(SinkError::Create)?;
        let log_path = self.log_path(mission_id);

        let store = SnapshotStore::new();
        let c_tok = CancellationToken::new();
        let subscribers = spawn_subscribers(&link, &store, &c_tok);
        let detector = LandingDetector::new(*plan.landing_target());
        let detector_handle = tokio::spawn(detector.run(Arc::clone(&store), c_tok.clone()));

        let sink =
            TelemetrySink::create(&log_path, Arc::clone(&store), publisher, self.sink_poll_interval)?;
        let sink_fut = sink.run();
        tokio::pin!(sink_fut);

        // The sink observing "not airborne" is the canonical end of the
        // telemetry phase; the landing detector and a fatal feed error
        // end it through cancellation instead.
        let sink_result = tokio::select! {
            res = &mut sink_fut => Some(res),
            () = c_tok.cancelled() => None,
        };
        c_tok.cancel();

        let landed = detector_handle.await.unwrap_or(false);
        let mut feed_failure = None;
        for handle in subscribers {
            if let Ok(Err(e)) = handle.await {
                feed_failure = Some(e);
            }
        }

        match sink_result {
            Some(Ok(())) => Ok(log_path),
            Some(Err(e)) => Err(MissionError::Sink(e)),
            None if landed => Ok(log_path),
            None => feed_failure.map_or(Ok(log_path), |e| Err(MissionError::Feed(e))),
        }
    }
}
