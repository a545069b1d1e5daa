//! Bounded polling for resources converging on a desired state.
//!
//! Provides a generic abstraction for waiting on a cloud resource (or any async
//! condition) to reach a state, with a fixed attempt budget, a fixed delay
//! between attempts, and cancellation support.

use backon::{BackoffBuilder, ConstantBuilder};
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Maximum number of probes when waiting for an instance state change
pub const INSTANCE_STATE_MAX_ATTEMPTS: u32 = 30;

/// Delay between probes when waiting for an instance state change
pub const INSTANCE_STATE_INTERVAL: Duration = Duration::from_secs(10);

/// Configuration for bounded waiting.
///
/// `max_attempts * interval` is a hard wall-clock budget: the probe runs at
/// most `max_attempts` times and the waiter sleeps `interval` between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Maximum number of probe invocations (0 is treated as 1)
    pub max_attempts: u32,
    /// Fixed delay between probe invocations
    pub interval: Duration,
}

impl WaitConfig {
    /// Create a wait configuration
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// Policy used for instance state transitions: 30 probes, 10 seconds apart.
    pub const fn instance_state() -> Self {
        Self::new(INSTANCE_STATE_MAX_ATTEMPTS, INSTANCE_STATE_INTERVAL)
    }

    /// Worst-case wall-clock time spent sleeping and probing.
    ///
    /// Saturates at `Duration::MAX` for intervals too large to multiply.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts())
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::instance_state()
    }
}

/// Injectable delay between probes.
///
/// Production code sleeps on the tokio timer; tests substitute a sleeper that
/// returns immediately so exhausting a five-minute budget takes no real time.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Sleeper backed by `tokio::time::sleep`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Why a bounded wait ended without the condition holding.
#[derive(Debug, Error)]
pub enum WaitError<E> {
    /// The probe never reported success within the attempt budget
    #[error("condition not met after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The cancellation token fired before the condition held
    #[error("wait cancelled")]
    Cancelled,

    /// The probe itself failed; errors are surfaced, never retried
    #[error("{0}")]
    Probe(E),
}

/// Repeatedly run `probe` until it reports `Ok(true)`.
///
/// # Arguments
/// * `config` - Attempt budget and fixed interval
/// * `sleeper` - Delay capability used between attempts
/// * `cancel` - Optional cancellation token, checked before every attempt and
///   raced against every sleep
/// * `probe` - Async check returning `Ok(true)` when satisfied, `Ok(false)` to retry
/// * `resource_name` - Name for logging
///
/// # Returns
/// * `Ok(attempts)` - Condition holds; number of probes it took
/// * `Err(WaitError::Probe)` - The probe failed (stops immediately)
/// * `Err(WaitError::Exhausted)` - Budget used up without success
/// * `Err(WaitError::Cancelled)` - Token fired
///
/// No sleep follows the final failed attempt.
pub async fn wait_until<F, Fut, E>(
    config: WaitConfig,
    sleeper: &dyn Sleeper,
    cancel: Option<&CancellationToken>,
    probe: F,
    resource_name: &str,
) -> Result<u32, WaitError<E>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.attempts();
    let mut delays = ConstantBuilder::default()
        .with_delay(config.interval)
        .with_max_times((max_attempts - 1) as usize)
        .build();
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        if cancel.is_some_and(CancellationToken::is_cancelled) {
            debug!(resource = %resource_name, attempt = attempts, "Wait cancelled");
            return Err(WaitError::Cancelled);
        }

        match probe().await {
            Ok(true) => {
                debug!(resource = %resource_name, attempts, "Condition met");
                return Ok(attempts);
            }
            Ok(false) => {
                let Some(delay) = delays.next() else {
                    warn!(
                        resource = %resource_name,
                        attempts,
                        budget_secs = config.budget().as_secs(),
                        "Gave up waiting"
                    );
                    return Err(WaitError::Exhausted { attempts });
                };

                debug!(
                    resource = %resource_name,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Condition not met, retrying"
                );

                match cancel {
                    Some(token) => {
                        tokio::select! {
                            () = sleeper.sleep(delay) => {}
                            () = token.cancelled() => {
                                debug!(resource = %resource_name, "Wait cancelled");
                                return Err(WaitError::Cancelled);
                            }
                        }
                    }
                    None => sleeper.sleep(delay).await,
                }
            }
            Err(e) => {
                warn!(resource = %resource_name, attempt = attempts, error = %e, "Probe failed");
                return Err(WaitError::Probe(e));
            }
        }
    }
}
