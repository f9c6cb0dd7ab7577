use std::{env, path::PathBuf, time::Duration};

/// Runtime configuration, read once from the environment at startup.
///
/// Every knob has a default that matches a local SITL setup, so a bare
/// `sitl-runner` invocation works against a planner backend and simulator
/// running on the same machine.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Base URL of the planner backend REST API.
    pub planner_base_url: String,
    /// Address of the simulator-side telemetry bridge.
    pub bridge_addr: String,
    /// Name this machine registers under at the planner backend.
    pub machine_name: String,
    /// Directory where assigned plan files are materialized.
    pub plan_dir: PathBuf,
    /// Directory where flight logs and published telemetry land.
    pub log_dir: PathBuf,
    /// Program used to launch the simulation engine.
    pub sim_program: String,
    /// Arguments for the simulation engine launch.
    pub sim_args: Vec<String>,
    /// Working directory the simulation engine is launched from.
    pub sim_workdir: Option<PathBuf>,
    /// Simulation speed multiplier handed to the engine.
    pub sim_speed_factor: u32,
    /// Interval between polls for a newly assigned job.
    pub job_poll_interval: Duration,
    /// Backoff between sink sampling polls.
    pub sink_poll_interval: Duration,
    /// Grace period for the simulator shutdown handshake before a kill.
    pub sim_shutdown_timeout: Duration,
}

impl RunnerConfig {
    const DEF_PLANNER_URL: &'static str = "http://localhost:3000/api";
    const DEF_BRIDGE_ADDR: &'static str = "127.0.0.1:14550";
    const DEF_SPEED_FACTOR: u32 = 50;
    const DEF_JOB_POLL_SECS: u64 = 5;
    const DEF_SINK_POLL_MILLIS: u64 = 100;
    const DEF_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

    pub fn from_env() -> Self {
        let machine_name = env::var("RUNNER_MACHINE_NAME")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or_else(|_| String::from("sitl-runner"));
        Self {
            planner_base_url: env_or("UAS_PLANNER_URL", Self::DEF_PLANNER_URL),
            bridge_addr: env_or("SITL_BRIDGE_ADDR", Self::DEF_BRIDGE_ADDR),
            machine_name,
            plan_dir: PathBuf::from(env_or("RUNNER_PLAN_DIR", "./plans")),
            log_dir: PathBuf::from(env_or("RUNNER_LOG_DIR", "./trajectories")),
            sim_program: env_or("SITL_PROGRAM", "make"),
            sim_args: env::var("SITL_ARGS")
                .map_or_else(
                    |_| vec![String::from("px4_sitl"), String::from("gazebo-classic")],
                    |v| v.split_whitespace().map(String::from).collect(),
                ),
            sim_workdir: env::var("SITL_WORKDIR").ok().map(PathBuf::from),
            sim_speed_factor: parse_env("SITL_SPEED_FACTOR", Self::DEF_SPEED_FACTOR),
            job_poll_interval: Duration::from_secs(parse_env(
                "RUNNER_JOB_POLL_SECS",
                Self::DEF_JOB_POLL_SECS,
            )),
            sink_poll_interval: Duration::from_millis(parse_env(
                "RUNNER_SINK_POLL_MILLIS",
                Self::DEF_SINK_POLL_MILLIS,
            )),
            sim_shutdown_timeout: Duration::from_secs(parse_env(
                "SITL_SHUTDOWN_TIMEOUT_SECS",
                Self::DEF_SHUTDOWN_TIMEOUT_SECS,
            )),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| String::from(default))
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
