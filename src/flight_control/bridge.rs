use super::link::{CommandError, FlightLink, TelemetryFeedError, TelemetryStream};
use crate::mission::plan::{MissionItem, MissionPlan};
use crate::telemetry::{BodyVelocity, GeoPosition, OdometrySample, Quaternion};
use crate::warn;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{broadcast, mpsc, oneshot, watch},
};
use tokio_util::sync::CancellationToken;

/// Outbound one-line JSON request to the telemetry bridge.
#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum BridgeRequest<'a> {
    Arm,
    StartMission,
    UploadMission { items: &'a [MissionItem], rally_points: &'a [GeoPosition] },
}

/// Inbound one-line JSON event. Commands are acknowledged in order;
/// telemetry events arrive interleaved at the bridge's own pace.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeEvent {
    Ack {
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
    Position {
        lat: f64,
        lon: f64,
        alt: f64,
    },
    Odometry {
        time_usec: u64,
        /// Orientation as [w, x, y, z].
        q: [f64; 4],
        /// Body velocity as [vx, vy, vz] in m/s.
        vel: [f64; 3],
    },
    InAir {
        in_air: bool,
    },
    Health {
        global_position_ok: bool,
        home_position_ok: bool,
    },
}

#[derive(Debug, Clone, Copy, Default)]
struct HealthReport {
    global_position_ok: bool,
    home_position_ok: bool,
}

struct PendingCommand {
    line: String,
    ack: oneshot::Sender<Result<(), CommandError>>,
}

/// `FlightLink` transport over the simulator-side telemetry bridge: a
/// single TCP connection carrying newline-delimited JSON both ways.
///
/// A background task owns the socket. It serializes command writes, matches
/// acks to commands in FIFO order and demuxes telemetry into broadcast
/// channels that back the feed subscriptions.
pub struct BridgeLink {
    cmd_tx: mpsc::Sender<PendingCommand>,
    position_tx: broadcast::Sender<GeoPosition>,
    odometry_tx: broadcast::Sender<OdometrySample>,
    in_air_tx: broadcast::Sender<bool>,
    health_rx: watch::Receiver<HealthReport>,
    /// Cancelled by the socket task on exit; the handle's own senders keep
    /// the broadcast channels open, so feeds learn about closure from this.
    closed: CancellationToken,
}

impl BridgeLink {
    /// Buffered updates per feed; slow subscribers skip to fresher values.
    const FEED_BUFFER: usize = 64;
    const CMD_BUFFER: usize = 8;

    pub async fn connect(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        let (read_half, write_half) = stream.into_split();

        let (cmd_tx, cmd_rx) = mpsc::channel(Self::CMD_BUFFER);
        let (position_tx, _) = broadcast::channel(Self::FEED_BUFFER);
        let (odometry_tx, _) = broadcast::channel(Self::FEED_BUFFER);
        let (in_air_tx, _) = broadcast::channel(Self::FEED_BUFFER);
        let (health_tx, health_rx) = watch::channel(HealthReport::default());
        let closed = CancellationToken::new();

        tokio::spawn(io_task(
            BufReader::new(read_half).lines(),
            write_half,
            cmd_rx,
            FeedSenders {
                position: position_tx.clone(),
                odometry: odometry_tx.clone(),
                in_air: in_air_tx.clone(),
                health: health_tx,
            },
            closed.clone(),
        ));

        Ok(Self { cmd_tx, position_tx, odometry_tx, in_air_tx, health_rx, closed })
    }

    async fn send_command(&self, request: &BridgeRequest<'_>) -> Result<(), CommandError> {
        let mut line = serde_json::to_string(request)
            .map_err(|e| CommandError::Rejected(e.to_string()))?;
        line.push('\n');
        let (ack_tx, ack_rx) = oneshot::channel();
        self.cmd_tx
            .send(PendingCommand { line, ack: ack_tx })
            .await
            .map_err(|_| CommandError::LinkClosed)?;
        ack_rx.await.map_err(|_| CommandError::LinkClosed)?
    }
}

#[async_trait]
impl FlightLink for BridgeLink {
    async fn upload_mission(&self, plan: &MissionPlan) -> Result<(), CommandError> {
        self.send_command(&BridgeRequest::UploadMission {
            items: plan.items(),
            rally_points: plan.rally_points(),
        })
        .await
    }

    async fn await_position_estimate(&self) -> Result<(), CommandError> {
        let mut health_rx = self.health_rx.clone();
        health_rx
            .wait_for(|h| h.global_position_ok && h.home_position_ok)
            .await
            .map_err(|_| CommandError::LinkClosed)?;
        Ok(())
    }

    async fn arm(&self) -> Result<(), CommandError> {
        self.send_command(&BridgeRequest::Arm).await
    }

    async fn start_mission(&self) -> Result<(), CommandError> {
        self.send_command(&BridgeRequest::StartMission).await
    }

    fn position_feed(&self) -> TelemetryStream<GeoPosition> {
        feed_stream(self.position_tx.subscribe(), self.closed.clone())
    }

    fn odometry_feed(&self) -> TelemetryStream<OdometrySample> {
        feed_stream(self.odometry_tx.subscribe(), self.closed.clone())
    }

    fn in_air_feed(&self) -> TelemetryStream<bool> {
        feed_stream(self.in_air_tx.subscribe(), self.closed.clone())
    }
}

struct FeedSenders {
    position: broadcast::Sender<GeoPosition>,
    odometry: broadcast::Sender<OdometrySample>,
    in_air: broadcast::Sender<bool>,
    health: watch::Sender<HealthReport>,
}

/// Socket owner: serializes command writes, routes acks and telemetry.
async fn io_task(
    mut lines: Lines<BufReader<OwnedReadHalf>>,
    mut writer: OwnedWriteHalf,
    mut cmd_rx: mpsc::Receiver<PendingCommand>,
    senders: FeedSenders,
    closed: CancellationToken,
) {
    let mut pending: VecDeque<oneshot::Sender<Result<(), CommandError>>> = VecDeque::new();
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    if let Err(e) = writer.write_all(cmd.line.as_bytes()).await {
                        let _ = cmd.ack.send(Err(CommandError::Transport(e)));
                        break;
                    }
                    pending.push_back(cmd.ack);
                }
                // Link handle dropped, nothing left to serve.
                None => break,
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) => dispatch_event(&line, &mut pending, &senders),
                Ok(None) | Err(_) => break,
            },
        }
    }
    closed.cancel();
    for ack in pending.drain(..) {
        let _ = ack.send(Err(CommandError::LinkClosed));
    }
}

fn dispatch_event(
    line: &str,
    pending: &mut VecDeque<oneshot::Sender<Result<(), CommandError>>>,
    senders: &FeedSenders,
) {
    let event = match serde_json::from_str::<BridgeEvent>(line) {
        Ok(event) => event,
        Err(e) => {
            warn!("Discarding undecodable bridge line: {e}");
            return;
        }
    };
    match event {
        BridgeEvent::Ack { ok, error } => {
            let Some(ack) = pending.pop_front() else {
                warn!("Bridge sent an ack with no command outstanding.");
                return;
            };
            let result = if ok {
                Ok(())
            } else {
                Err(CommandError::Rejected(error.unwrap_or_else(|| String::from("unspecified"))))
            };
            let _ = ack.send(result);
        }
        BridgeEvent::Position { lat, lon, alt } => {
            let _ = senders.position.send(GeoPosition::new(lat, lon, alt));
        }
        #[allow(clippy::cast_precision_loss)]
        BridgeEvent::Odometry { time_usec, q, vel } => {
            let _ = senders.odometry.send(OdometrySample {
                sim_time_s: time_usec as f64 / 1e6,
                attitude: Quaternion { w: q[0], x: q[1], y: q[2], z: q[3] },
                velocity: BodyVelocity { vx: vel[0], vy: vel[1], vz: vel[2] },
            });
        }
        BridgeEvent::InAir { in_air } => {
            let _ = senders.in_air.send(in_air);
        }
        BridgeEvent::Health { global_position_ok, home_position_ok } => {
            senders.health.send_replace(HealthReport { global_position_ok, home_position_ok });
        }
    }
}

/// Adapts a broadcast subscription into a feed stream. Lagged receivers
/// skip ahead instead of erroring, matching last-write-wins semantics. Once
/// the socket task is gone the stream yields `Closed` indefinitely.
fn feed_stream<T: Clone + Send + 'static>(
    rx: broadcast::Receiver<T>,
    closed: CancellationToken,
) -> TelemetryStream<T> {
    Box::pin(futures::stream::unfold((rx, closed), |(mut rx, closed)| async move {
        loop {
            tokio::select! {
                update = rx.recv() => match update {
                    Ok(value) => return Some((Ok(value), (rx, closed))),
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        return Some((Err(TelemetryFeedError::Closed), (rx, closed)));
                    }
                },
                () = closed.cancelled() => {
                    return Some((Err(TelemetryFeedError::Closed), (rx, closed)));
                }
            }
        }
    }))
}
