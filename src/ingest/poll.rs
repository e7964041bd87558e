//! Bounded waiting on an external condition, e.g. a freshly configured
//! bucket starting to receive objects.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{MailError, Result};
use crate::ingest::source::{ObjectInfo, ObjectSource};

/// Call `probe` every `interval` until it yields a value or `timeout` passes.
///
/// The probe runs once immediately. Errors from the probe end the wait.
/// Running out of time is [`MailError::Timeout`].
pub fn wait_until<T, F>(timeout: Duration, interval: Duration, mut probe: F) -> Result<T>
where
    F: FnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    loop {
        if let Some(value) = probe()? {
            return Ok(value);
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(MailError::Timeout(timeout));
        }
        debug!(elapsed = ?elapsed, "Condition not met yet");
        std::thread::sleep(interval.min(timeout - elapsed));
    }
}

/// Wait until at least one object exists under `prefix`.
pub fn wait_for_objects(
    source: &dyn ObjectSource,
    prefix: &str,
    timeout: Duration,
    interval: Duration,
) -> Result<Vec<ObjectInfo>> {
    wait_until(timeout, interval, || {
        let objects = source.list(prefix)?;
        Ok((!objects.is_empty()).then_some(objects))
    })
}
