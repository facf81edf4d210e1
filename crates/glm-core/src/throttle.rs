//! Pacing helpers for talking to rate-limited APIs.

use std::time::Duration;

use tracing::debug;

/// Sleep between calls to a remote API.
///
/// A zero duration returns immediately without yielding.
pub async fn pause(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    debug!(millis = duration.as_millis() as u64, "Pausing between requests");
    tokio::time::sleep(duration).await;
}
