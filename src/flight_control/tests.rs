use super::bridge::BridgeLink;
use super::link::{CommandError, FlightLink, TelemetryFeedError, TelemetryStream};
use super::takeoff::{RetryPolicy, TakeoffController, TakeoffError};
use crate::mission::plan::MissionPlan;
use crate::telemetry::{GeoPosition, OdometrySample};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Link double whose airborne feed only reports flight from a given
/// mission-start attempt on.
struct ScriptedLink {
    airborne_from_attempt: u32,
    arm_failures: u32,
    arms: AtomicU32,
    starts: AtomicU32,
}

impl ScriptedLink {
    fn new(airborne_from_attempt: u32) -> Self {
        Self { airborne_from_attempt, arm_failures: 0, arms: AtomicU32::new(0), starts: AtomicU32::new(0) }
    }
}

#[async_trait]
impl FlightLink for ScriptedLink {
    async fn upload_mission(&self, _plan: &MissionPlan) -> Result<(), CommandError> { Ok(()) }

    async fn await_position_estimate(&self) -> Result<(), CommandError> { Ok(()) }

    async fn arm(&self) -> Result<(), CommandError> {
        let attempt = self.arms.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.arm_failures {
            return Err(CommandError::Rejected(String::from("vehicle busy")));
        }
        Ok(())
    }

    async fn start_mission(&self) -> Result<(), CommandError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn position_feed(&self) -> TelemetryStream<GeoPosition> {
        stream::pending().boxed()
    }

    fn odometry_feed(&self) -> TelemetryStream<OdometrySample> {
        stream::pending().boxed()
    }

    fn in_air_feed(&self) -> TelemetryStream<bool> {
        let attempt = self.starts.load(Ordering::SeqCst);
        if attempt >= self.airborne_from_attempt {
            stream::iter([Ok(false), Ok(true)]).chain(stream::pending()).boxed()
        } else {
            stream::iter([Ok(false)]).chain(stream::pending()).boxed()
        }
    }
}

#[tokio::test(start_paused = true)]
async fn takeoff_succeeds_on_third_attempt() {
    let link = Arc::new(ScriptedLink::new(3));
    let controller = TakeoffController::new(RetryPolicy::default());
    let result =
        controller.attempt_takeoff(&(Arc::clone(&link) as Arc<dyn FlightLink>)).await;
    assert_eq!(result.unwrap(), 3);
    assert_eq!(link.arms.load(Ordering::SeqCst), 3);
    assert_eq!(link.starts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn takeoff_exhausts_after_five_attempts() {
    let link = Arc::new(ScriptedLink::new(u32::MAX));
    let controller = TakeoffController::new(RetryPolicy::default());
    let result =
        controller.attempt_takeoff(&(Arc::clone(&link) as Arc<dyn FlightLink>)).await;
    assert!(matches!(result, Err(TakeoffError::Exhausted { attempts: 5 })));
    assert_eq!(link.arms.load(Ordering::SeqCst), 5);
}

#[tokio::test(start_paused = true)]
async fn takeoff_absorbs_per_attempt_command_errors() {
    let mut link = ScriptedLink::new(1);
    link.arm_failures = 2;
    let link = Arc::new(link);
    let controller = TakeoffController::new(RetryPolicy::default());
    let result =
        controller.attempt_takeoff(&(Arc::clone(&link) as Arc<dyn FlightLink>)).await;
    // The first two attempts die at the arm command and are retried; the
    // third arms, starts and sees the airborne flag.
    assert_eq!(result.unwrap(), 3);
    assert_eq!(link.starts.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn takeoff_honors_custom_policy_bounds() {
    let link = Arc::new(ScriptedLink::new(u32::MAX));
    let controller = TakeoffController::new(RetryPolicy {
        max_attempts: 2,
        airborne_window: Duration::from_millis(100),
        retry_delay: Duration::from_millis(10),
    });
    let result =
        controller.attempt_takeoff(&(Arc::clone(&link) as Arc<dyn FlightLink>)).await;
    assert!(matches!(result, Err(TakeoffError::Exhausted { attempts: 2 })));
    assert_eq!(link.arms.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn bridge_round_trips_commands_and_telemetry() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = socket.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let first = lines.next_line().await.unwrap().unwrap();
        assert!(first.contains(r#""command":"arm""#), "got {first}");
        write_half.write_all(b"{\"type\":\"ack\",\"ok\":true}\n").await.unwrap();
        write_half
            .write_all(b"{\"type\":\"position\",\"lat\":40.0,\"lon\":-3.0,\"alt\":600.0}\n")
            .await
            .unwrap();
        write_half.write_all(b"{\"type\":\"in_air\",\"in_air\":true}\n").await.unwrap();

        let second = lines.next_line().await.unwrap().unwrap();
        assert!(second.contains(r#""command":"start_mission""#), "got {second}");
        write_half
            .write_all(b"{\"type\":\"ack\",\"ok\":false,\"error\":\"not armed\"}\n")
            .await
            .unwrap();

        // Keep the socket alive until the client has read the feeds.
        let _ = lines.next_line().await;
    });

    let link = BridgeLink::connect(&addr.to_string()).await.unwrap();
    let mut positions = link.position_feed();
    let mut in_air = link.in_air_feed();

    link.arm().await.unwrap();
    let pos = positions.next().await.unwrap().unwrap();
    assert_eq!(pos, GeoPosition::new(40.0, -3.0, 600.0));
    assert!(in_air.next().await.unwrap().unwrap());

    let rejection = link.start_mission().await.unwrap_err();
    assert!(matches!(rejection, CommandError::Rejected(reason) if reason == "not armed"));

    drop(link);
    server.await.unwrap();
}

#[tokio::test]
async fn bridge_feed_reports_closure() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        drop(socket);
    });

    let link = BridgeLink::connect(&addr.to_string()).await.unwrap();
    let mut feed = link.in_air_feed();
    let update = feed.next().await.unwrap();
    assert!(matches!(update, Err(TelemetryFeedError::Closed)));
    server.await.unwrap();
}
