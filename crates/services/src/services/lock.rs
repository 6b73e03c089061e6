use std::{path::Path, time::Duration};

use tokio::time;

use super::config::LockBackoff;

/// Result of waiting for the lock marker to disappear
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnlockOutcome {
    /// Delays slept, in order
    pub waits: Vec<Duration>,
    /// False when the attempts ran out with the marker still present
    pub unlocked: bool,
}

/// Poll `is_locked` with bounded exponential backoff.
///
/// Exhausting the attempts is not an error: the caller proceeds and may
/// collide with the lock holder.
pub async fn when_unlocked<F>(backoff: &LockBackoff, mut is_locked: F) -> UnlockOutcome
where
    F: FnMut() -> bool,
{
    let mut waits = Vec::new();
    for attempt in 0..backoff.max_attempts {
        if !is_locked() {
            return UnlockOutcome {
                waits,
                unlocked: true,
            };
        }
        let delay = backoff.delay(attempt);
        time::sleep(delay).await;
        waits.push(delay);
    }

    let unlocked = !is_locked();
    if !unlocked {
        tracing::warn!(
            attempts = backoff.max_attempts,
            "lock marker still present, proceeding anyway"
        );
    }
    UnlockOutcome { waits, unlocked }
}

pub async fn when_file_absent(backoff: &LockBackoff, marker: &Path) -> UnlockOutcome {
    when_unlocked(backoff, || marker.exists()).await
}
