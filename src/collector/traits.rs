//! Core collector traits and types.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::device::DeviceError;
use crate::exposition::RegistryFragment;

/// Minimum allowed polling interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Process-wide variables that override record fields in dynamic labels
/// (e.g. `ALIAS`, `HOSTURL`, `IDENTITY`).
pub type GlobalVars = BTreeMap<String, String>;

/// Errors that can occur during registration or collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// Device request failed; the poll is aborted and retried next tick.
    #[error("device error: {0}")]
    Device(#[from] DeviceError),

    /// Instrument creation or registration failed.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Collector could not register its instruments.
    #[error("registration error: {0}")]
    Registration(String),

    /// Scheduler error.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Clamp a polling interval to [`MIN_INTERVAL`].
pub fn clamp_interval(interval: Duration) -> Duration {
    if interval < MIN_INTERVAL {
        tracing::warn!(min_interval = ?MIN_INTERVAL,
            "Interval duration is less than minimum allowed. Using minimum duration."
        );
        MIN_INTERVAL
    } else {
        interval
    }
}

/// Core collector trait.
///
/// A collector owns the instruments of one collection unit. It creates them
/// once in [`register`](Collector::register) and updates them on every
/// [`collect`](Collector::collect).
///
/// # Error Handling
///
/// - A failed device request aborts the current poll and is returned as
///   `Err`; the unit keeps running and retries on the next tick.
/// - A value that cannot be coerced only skips that metric for that record
///   and is logged; `collect` still returns `Ok(())`.
#[async_trait::async_trait]
pub trait Collector: Send + Sync + 'static {
    /// Unit name used in logs and bookkeeping.
    fn name(&self) -> &str;

    /// Create every instrument and add it to `fragment`.
    ///
    /// Label names and constant labels are fixed from here on.
    fn register(&mut self, fragment: &mut RegistryFragment) -> Result<(), CollectorError>;

    /// Perform one poll.
    async fn collect(&self) -> Result<(), CollectorError>;
}
