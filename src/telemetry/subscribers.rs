use super::snapshot::SnapshotStore;
use crate::flight_control::link::{FlightLink, TelemetryFeedError, TelemetryStream};
use crate::warn;
use futures::StreamExt;
use std::{future::Future, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Spawns the three long-lived feed subscribers.
///
/// Each feed is an infinite, non-restartable update sequence; a subscriber
/// only ends through cancellation or a feed failure. Writes are single-field
/// and last-write-wins, and no feed ever waits for another. A failed feed
/// cancels the whole telemetry phase, since the sink cannot make progress
/// without fresh samples.
pub fn spawn_subscribers(
    link: &Arc<dyn FlightLink>,
    store: &Arc<SnapshotStore>,
    c_tok: &CancellationToken,
) -> Vec<JoinHandle<Result<(), TelemetryFeedError>>> {
    vec![
        spawn_feed("position", link.position_feed(), c_tok, {
            let store = Arc::clone(store);
            move |pos| {
                let store = Arc::clone(&store);
                async move { store.set_position(pos).await }
            }
        }),
        spawn_feed("odometry", link.odometry_feed(), c_tok, {
            let store = Arc::clone(store);
            move |odom| {
                let store = Arc::clone(&store);
                async move { store.set_odometry(odom).await }
            }
        }),
        spawn_feed("in-air", link.in_air_feed(), c_tok, {
            let store = Arc::clone(store);
            move |in_air| {
                let store = Arc::clone(&store);
                async move { store.set_in_air(in_air).await }
            }
        }),
    ]
}

fn spawn_feed<T, F, Fut>(
    name: &'static str,
    mut feed: TelemetryStream<T>,
    c_tok: &CancellationToken,
    mut apply: F,
) -> JoinHandle<Result<(), TelemetryFeedError>>
where
    T: Send + 'static,
    F: FnMut(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let c_tok = c_tok.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = c_tok.cancelled() => return Ok(()),
                update = feed.next() => match update {
                    Some(Ok(value)) => apply(value).await,
                    Some(Err(e)) => {
                        warn!("The {name} feed failed: {e}");
                        c_tok.cancel();
                        return Err(e);
                    }
                    None => {
                        warn!("The {name} feed ended unexpectedly.");
                        c_tok.cancel();
                        return Err(TelemetryFeedError::Closed);
                    }
                },
            }
        }
    })
}
