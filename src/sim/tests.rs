use super::supervisor::{SimError, SimState, SimSupervisor};
use crate::telemetry::GeoPosition;
use std::time::Duration;

const HOME: GeoPosition = GeoPosition { lat: 40.0, lon: -3.0, alt: 600.0 };

fn stub_supervisor(script: &str) -> SimSupervisor {
    SimSupervisor::new(String::from("sh"), vec![String::from("-c"), String::from(script)], None, 50)
}

#[tokio::test]
async fn ready_marker_ends_the_boot_phase() {
    let sup = stub_supervisor(
        r#"printf 'boot\nloading vehicle\nINFO  [commander] Ready for takeoff!\n'; while read line; do [ "$line" = shutdown ] && exit 0; done"#,
    );
    let mut sim = sup.launch(&HOME).unwrap();
    assert_eq!(sim.state(), SimState::WaitingForReadyLine);

    let mut forwarded = Vec::new();
    sim.await_ready(|line| forwarded.push(line.to_string())).await.unwrap();
    assert_eq!(sim.state(), SimState::Ready);
    // Every boot line is forwarded, the marker line included.
    assert_eq!(forwarded.len(), 3);
    assert!(forwarded[2].contains(SimSupervisor::READY_MARKER));

    sim.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn home_and_speed_reach_the_engine_environment() {
    let sup = stub_supervisor(
        r#"printf 'env %s %s %s %s\nReady for takeoff!\n' "$PX4_HOME_LAT" "$PX4_HOME_LON" "$PX4_HOME_ALT" "$PX4_SIM_SPEED_FACTOR"; while read line; do [ "$line" = shutdown ] && exit 0; done"#,
    );
    let mut sim = sup.launch(&HOME).unwrap();

    let mut forwarded = Vec::new();
    sim.await_ready(|line| forwarded.push(line.to_string())).await.unwrap();
    assert_eq!(forwarded[0], "env 40 -3 600 50");

    sim.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn exit_before_marker_is_a_crash() {
    let sup = stub_supervisor(r"printf 'boot\n'; exit 3");
    let mut sim = sup.launch(&HOME).unwrap();

    let result = sim.await_ready(|_| {}).await;
    assert!(matches!(result, Err(SimError::Crashed)));
    assert_eq!(sim.state(), SimState::Crashed);
}

#[tokio::test]
async fn unresponsive_engine_is_killed_after_grace() {
    let sup = stub_supervisor(r"printf 'Ready for takeoff!\n'; exec sleep 30");
    let mut sim = sup.launch(&HOME).unwrap();
    sim.await_ready(|_| {}).await.unwrap();

    // The stub never reads stdin, so the handshake must fall through to
    // the kill path within the grace period.
    sim.shutdown(Duration::from_millis(200)).await.unwrap();
}
