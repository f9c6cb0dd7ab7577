use super::link::{CommandError, FlightLink};
use crate::{info, log, warn};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use strum_macros::Display;
use tokio::time::{Instant, sleep, timeout_at};

/// Retry policy for the arm/launch sequence, kept as an explicit value so
/// the bounds are testable in isolation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// How long one attempt waits for the airborne signal.
    pub airborne_window: Duration,
    /// Fixed delay between attempts; no backoff growth.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            airborne_window: Duration::from_secs(1),
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Display)]
pub enum TakeoffError {
    #[strum(to_string = "vehicle not airborne after {attempts} takeoff attempts")]
    Exhausted { attempts: u32 },
}

impl std::error::Error for TakeoffError {}

/// Bounded-retry arm + mission-start state machine.
pub struct TakeoffController {
    policy: RetryPolicy,
}

impl TakeoffController {
    pub fn new(policy: RetryPolicy) -> Self { Self { policy } }

    /// Attempts takeoff until the airborne signal arrives within one
    /// attempt's window. Per-attempt errors are absorbed and logged; only
    /// exhaustion of the whole policy is fatal. Returns the number of the
    /// succeeding attempt.
    pub async fn attempt_takeoff(&self, link: &Arc<dyn FlightLink>) -> Result<u32, TakeoffError> {
        for attempt in 1..=self.policy.max_attempts {
            info!("Arm and takeoff attempt {attempt}/{}.", self.policy.max_attempts);
            match self.try_once(link).await {
                Ok(true) => {
                    info!("Vehicle airborne on attempt {attempt}.");
                    return Ok(attempt);
                }
                Ok(false) => log!("Not airborne within the window, retrying."),
                Err(e) => warn!("Takeoff attempt {attempt} failed: {e}"),
            }
            sleep(self.policy.retry_delay).await;
        }
        Err(TakeoffError::Exhausted { attempts: self.policy.max_attempts })
    }

    /// One attempt: arm, start the mission, then poll the airborne feed
    /// until the window elapses.
    async fn try_once(&self, link: &Arc<dyn FlightLink>) -> Result<bool, CommandError> {
        link.arm().await?;
        link.start_mission().await?;

        let deadline = Instant::now() + self.policy.airborne_window;
        let mut feed = link.in_air_feed();
        loop {
            match timeout_at(deadline, feed.next()).await {
                Err(_) => return Ok(false),
                Ok(Some(Ok(true))) => return Ok(true),
                Ok(Some(Ok(false))) => {}
                Ok(Some(Err(e))) => return Err(CommandError::Rejected(e.to_string())),
                Ok(None) => return Err(CommandError::LinkClosed),
            }
        }
    }
}
