use super::plan::{MissionPlan, PlanDecodeError};
use super::runner::MissionRunner;
use crate::flight_control::{
    link::{CommandError, FlightLink, TelemetryStream},
    takeoff::RetryPolicy,
};
use crate::publish::{PublishError, TelemetryPublisher};
use crate::sim::supervisor::SimSupervisor;
use crate::telemetry::{
    BodyVelocity, GeoPosition, OdometrySample, Quaternion, TelemetryMessage,
};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::sleep;

const RTL_PLAN: &str = r#"{
    "mission": {
        "plannedHomePosition": [40.0, -3.0, 600.0],
        "items": [
            {"command": 22, "params": [null, null, null, null, 40.0, -3.0, 620.0]},
            {"command": 16, "params": [0.0, 0.0, 0.0, null, 40.1, -3.05, 650.0]},
            {"command": 20, "params": [null, null, null, null, null, null, null]}
        ]
    }
}"#;

#[test]
fn return_to_launch_lands_at_home() {
    let plan = MissionPlan::from_json(RTL_PLAN).unwrap();
    assert_eq!(*plan.home(), GeoPosition::new(40.0, -3.0, 600.0));
    assert_eq!(plan.items().len(), 3);
    assert_eq!(*plan.landing_target(), *plan.home());
    assert!(plan.rally_points().is_empty());
}

#[test]
fn final_waypoint_becomes_the_landing_target() {
    let raw = r#"{
        "mission": {
            "plannedHomePosition": [40.0, -3.0, 600.0],
            "items": [
                {"command": 22, "params": [null, null, null, null, 40.0, -3.0, 620.0]},
                {"command": 21, "params": [null, null, null, null, 40.1, -3.05, 610.0]}
            ]
        }
    }"#;
    let plan = MissionPlan::from_json(raw).unwrap();
    assert_eq!(*plan.landing_target(), GeoPosition::new(40.1, -3.05, 610.0));
}

#[test]
fn plan_without_home_is_rejected() {
    let raw = r#"{"mission": {"items": [{"command": 20, "params": []}]}}"#;
    let err = MissionPlan::from_json(raw).unwrap_err();
    assert!(matches!(err, PlanDecodeError::NoHomePosition));
}

#[test]
fn plan_without_items_is_rejected() {
    let raw = r#"{"mission": {"plannedHomePosition": [40.0, -3.0, 600.0], "items": []}}"#;
    let err = MissionPlan::from_json(raw).unwrap_err();
    assert!(matches!(err, PlanDecodeError::NoMissionItems));
}

#[test]
fn malformed_plan_is_rejected() {
    let err = MissionPlan::from_json("not a plan document").unwrap_err();
    assert!(matches!(err, PlanDecodeError::Parse(_)));
}

#[test]
fn final_item_without_coordinate_is_rejected() {
    let raw = r#"{
        "mission": {
            "plannedHomePosition": [40.0, -3.0, 600.0],
            "items": [{"command": 21, "params": [null, null, null, null, null, null, null]}]
        }
    }"#;
    let err = MissionPlan::from_json(raw).unwrap_err();
    assert!(matches!(err, PlanDecodeError::NoFinalCoordinate));
}

#[test]
fn rally_points_ride_along() {
    let raw = r#"{
        "mission": {
            "plannedHomePosition": [40.0, -3.0, 600.0],
            "items": [{"command": 20, "params": []}]
        },
        "rallyPoints": {"points": [[40.05, -3.02, 610.0], [40.07, -2.98, 615.0]]}
    }"#;
    let plan = MissionPlan::from_json(raw).unwrap();
    assert_eq!(plan.rally_points().len(), 2);
    assert_eq!(plan.rally_points()[0], GeoPosition::new(40.05, -3.02, 610.0));
}

/// Link double that flies a compressed mission in real time: airborne at
/// once, odometry at 50x pace, back on the ground after 400ms.
struct CompressedFlightLink;

#[async_trait]
impl FlightLink for CompressedFlightLink {
    async fn upload_mission(&self, _plan: &MissionPlan) -> Result<(), CommandError> { Ok(()) }

    async fn await_position_estimate(&self) -> Result<(), CommandError> { Ok(()) }

    async fn arm(&self) -> Result<(), CommandError> { Ok(()) }

    async fn start_mission(&self) -> Result<(), CommandError> { Ok(()) }

    fn position_feed(&self) -> TelemetryStream<GeoPosition> {
        stream::unfold((), |()| async {
            sleep(Duration::from_millis(50)).await;
            Some((Ok(GeoPosition::new(40.0, -3.0, 600.0)), ()))
        })
        .boxed()
    }

    #[allow(clippy::cast_precision_loss)]
    fn odometry_feed(&self) -> TelemetryStream<OdometrySample> {
        stream::unfold(0u64, |n| async move {
            sleep(Duration::from_millis(20)).await;
            let sample = OdometrySample {
                sim_time_s: n as f64 * 0.7,
                attitude: Quaternion::IDENTITY,
                velocity: BodyVelocity { vx: 4.0, vy: 3.0, vz: -0.5 },
            };
            Some((Ok(sample), n + 1))
        })
        .boxed()
    }

    fn in_air_feed(&self) -> TelemetryStream<bool> {
        stream::unfold(0u8, |step| async move {
            match step {
                0 => Some((Ok(true), 1)),
                1 => {
                    sleep(Duration::from_millis(400)).await;
                    Some((Ok(false), 2))
                }
                _ => futures::future::pending().await,
            }
        })
        .boxed()
    }
}

#[derive(Default)]
struct CountingPublisher {
    published: AtomicUsize,
    closed: AtomicBool,
}

#[async_trait]
impl TelemetryPublisher for CountingPublisher {
    async fn publish(&self, _message: &TelemetryMessage) -> Result<(), PublishError> {
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
#[allow(clippy::cast_possible_truncation)]
async fn mission_runs_end_to_end_against_a_stub_engine() {
    let dir = std::env::temp_dir().join(format!("mission-e2e-{:08x}", rand::random::<u32>()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let plan_path = dir.join("e2e.plan");
    tokio::fs::write(&plan_path, RTL_PLAN).await.unwrap();

    let engine_stub = String::from(
        r#"printf 'booting\nReady for takeoff!\n'; while read line; do [ "$line" = shutdown ] && exit 0; done"#,
    );
    let supervisor =
        SimSupervisor::new(String::from("sh"), vec![String::from("-c"), engine_stub], None, 50);
    let runner = MissionRunner::new(
        supervisor,
        RetryPolicy::default(),
        Duration::from_millis(10),
        Duration::from_secs(5),
        dir.clone(),
    );

    let link: Arc<dyn FlightLink> = Arc::new(CompressedFlightLink);
    let publisher = Arc::new(CountingPublisher::default());
    let connect = {
        let link = Arc::clone(&link);
        move || async move { Ok::<_, CommandError>(link) }
    };

    let log_path = runner
        .run("e2e", &plan_path, connect, Arc::clone(&publisher) as Arc<dyn TelemetryPublisher>)
        .await
        .unwrap();

    let csv = tokio::fs::read_to_string(&log_path).await.unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next().unwrap(), "SimTime,Lat,Lon,Alt,qw,qx,qy,qz,Vx,Vy,Vz");
    let seconds: Vec<i64> =
        lines.map(|line| line.split(',').next().unwrap().parse::<f64>().unwrap() as i64).collect();
    assert!(!seconds.is_empty());
    // One record per simulated second, strictly forward.
    assert!(seconds.windows(2).all(|pair| pair[0] < pair[1]));

    assert!(publisher.published.load(Ordering::SeqCst) >= 1);
    assert!(publisher.closed.load(Ordering::SeqCst));

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}
