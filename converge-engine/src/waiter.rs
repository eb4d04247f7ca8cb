//! Status waiter — polls a resource until it reaches a target lifecycle
//! status or a wall-clock timeout elapses.
//!
//! Applies to creation-style convergence only. Deletion is never polled:
//! the backend exposes no stable terminal status for deleted resources, so
//! the caller treats a successful delete as fire-and-forget.

use crate::client::{FetchOutcome, RemoteClient};
use converge_types::{ConvergeError, EndpointState, Observation, ResourceKey};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Polling configuration. Defaults match the reference behavior: one poll
/// every 15 seconds, giving up after 320 seconds.
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(320),
        }
    }
}

impl WaitConfig {
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

/// What the waiter saw. Fetch failures abort the wait, so a completed
/// outcome always carries the last polled snapshot; [`Observation::Unknown`]
/// stays available for callers reporting a wait that never polled.
#[derive(Debug, Clone, PartialEq)]
pub struct WaitOutcome {
    pub achieved: bool,
    pub last_observed: Observation,
}

/// Polls `client.fetch(key)` on a fixed interval until the resource reports
/// `target`, returning `achieved = false` with the last observation once
/// `config.timeout` elapses.
///
/// Fetch failures are fatal and propagate immediately — a poll loop that
/// swallowed transport errors would report a timeout where it actually lost
/// the backend. A resource that vanishes mid-wait surfaces as
/// [`ConvergeError::NotFound`].
pub async fn wait_for_status(
    client: &dyn RemoteClient,
    key: &ResourceKey,
    target: EndpointState,
    config: &WaitConfig,
) -> Result<WaitOutcome, ConvergeError> {
    let started = Instant::now();

    loop {
        let state = match client.fetch(key).await? {
            FetchOutcome::Missing => return Err(ConvergeError::NotFound(key.clone())),
            FetchOutcome::Found(state) => state,
        };
        let current = state.endpoint_state();
        debug!(resource = %key, state = ?current, "polled resource status");
        let last_observed = Observation::Seen(state);

        if current == Some(target) {
            return Ok(WaitOutcome {
                achieved: true,
                last_observed,
            });
        }
        if started.elapsed() >= config.timeout {
            warn!(resource = %key, target = %target, "timed out waiting for status");
            return Ok(WaitOutcome {
                achieved: false,
                last_observed,
            });
        }
        tokio::time::sleep(config.poll_interval).await;
    }
}
