use crate::config::RunnerConfig;
use crate::telemetry::GeoPosition;
use crate::{info, warn};
use std::{path::PathBuf, process::Stdio, time::Duration};
use strum_macros::Display;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStdin, ChildStdout, Command},
    time::timeout,
};

/// Lifecycle of the simulation engine subprocess.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    WaitingForReadyLine,
    Ready,
    ShuttingDown,
    Terminated,
    Crashed,
}

#[derive(Debug, Display)]
pub enum SimError {
    #[strum(to_string = "simulation engine failed to start: {0}")]
    Launch(std::io::Error),
    #[strum(to_string = "simulation engine exited before signalling readiness")]
    Crashed,
    #[strum(to_string = "simulation engine stdio failed: {0}")]
    Stdio(std::io::Error),
}

impl std::error::Error for SimError {}

/// Spawns and supervises the simulation engine.
///
/// The engine is configured purely through environment variables at launch;
/// readiness is only ever inferred from its stdout.
pub struct SimSupervisor {
    program: String,
    args: Vec<String>,
    workdir: Option<PathBuf>,
    speed_factor: u32,
}

impl SimSupervisor {
    /// Exact substring the engine prints once it accepts commands.
    pub const READY_MARKER: &'static str = "Ready for takeoff!";
    /// Literal shutdown command expected on the engine's stdin.
    const SHUTDOWN_CMD: &'static [u8] = b"shutdown\n";

    pub fn new(program: String, args: Vec<String>, workdir: Option<PathBuf>, speed_factor: u32) -> Self {
        Self { program, args, workdir, speed_factor }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(
            config.sim_program.clone(),
            config.sim_args.clone(),
            config.sim_workdir.clone(),
            config.sim_speed_factor,
        )
    }

    /// Spawns the engine with the mission's home position injected into its
    /// environment. The handle owns all three standard streams.
    pub fn launch(&self, home: &GeoPosition) -> Result<SimProcess, SimError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env("PX4_SIM_SPEED_FACTOR", self.speed_factor.to_string())
            .env("PX4_HOME_LAT", home.lat.to_string())
            .env("PX4_HOME_LON", home.lon.to_string())
            .env("PX4_HOME_ALT", home.alt.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            // The handle must never outlive a mission run, even on panic.
            .kill_on_drop(true);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        info!("Launching simulation engine at home {home}.");
        let mut child = command.spawn().map_err(SimError::Launch)?;
        let stdin = child.stdin.take().ok_or_else(stdio_gone)?;
        let stdout = child.stdout.take().ok_or_else(stdio_gone)?;
        Ok(SimProcess {
            child,
            stdin,
            stdout_lines: BufReader::new(stdout).lines(),
            state: SimState::WaitingForReadyLine,
        })
    }
}

fn stdio_gone() -> SimError {
    SimError::Stdio(std::io::Error::other("child stdio was not captured"))
}

/// Handle to one running engine instance. Exactly one exists per mission.
pub struct SimProcess {
    child: Child,
    stdin: ChildStdin,
    stdout_lines: Lines<BufReader<ChildStdout>>,
    state: SimState,
}

impl SimProcess {
    pub fn state(&self) -> SimState { self.state }

    /// Reads stdout line by line until the readiness marker appears,
    /// forwarding every line to `line_sink` on the way. There is no timeout:
    /// cold starts of the engine vary too much to bound this. If the stream
    /// ends first the engine is gone and the run cannot proceed.
    pub async fn await_ready<F: FnMut(&str)>(&mut self, mut line_sink: F) -> Result<(), SimError> {
        while let Some(line) = self.stdout_lines.next_line().await.map_err(SimError::Stdio)? {
            line_sink(&line);
            if line.contains(SimSupervisor::READY_MARKER) {
                self.state = SimState::Ready;
                info!("Simulation engine is ready for takeoff.");
                return Ok(());
            }
        }
        self.state = SimState::Crashed;
        Err(SimError::Crashed)
    }

    /// Shutdown handshake: write the shutdown command, flush, then wait for
    /// the process to exit. A process that ignores the handshake is killed
    /// after `grace`.
    pub async fn shutdown(mut self, grace: Duration) -> Result<(), SimError> {
        self.state = SimState::ShuttingDown;
        info!("Sending shutdown command to the simulation engine.");
        self.stdin.write_all(SimSupervisor::SHUTDOWN_CMD).await.map_err(SimError::Stdio)?;
        self.stdin.flush().await.map_err(SimError::Stdio)?;

        match timeout(grace, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.state = SimState::Terminated;
                info!("Simulation engine exited with {status}.");
                Ok(())
            }
            Ok(Err(e)) => Err(SimError::Stdio(e)),
            Err(_) => {
                warn!("Simulation engine ignored shutdown for {}s, killing it.", grace.as_secs());
                self.child.kill().await.map_err(SimError::Stdio)?;
                self.state = SimState::Terminated;
                Ok(())
            }
        }
    }
}
