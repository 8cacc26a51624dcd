//! Cancellation helpers: every wait inside a lookup (rate limiter, retry
//! backoff) races the caller's CancellationToken.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Marker returned when a wait was aborted by its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Sleep for `dur` unless `token` fires first.
pub async fn sleep_or_cancel(dur: Duration, token: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        _ = tokio::time::sleep(dur) => Ok(()),
        _ = token.cancelled() => Err(Cancelled),
    }
}

/// Run `fut` unless `token` fires first.
pub async fn run_or_cancel<F, T>(fut: F, token: &CancellationToken) -> Result<T, Cancelled>
where
    F: Future<Output = T>,
{
    tokio::select! {
        out = fut => Ok(out),
        _ = token.cancelled() => Err(Cancelled),
    }
}

/// Child of `parent` that also cancels itself once `timeout` elapses.
/// Must be called inside a Tokio runtime.
pub fn deadline_token(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let child = parent.child_token();
    let timer = child.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => timer.cancel(),
            _ = timer.cancelled() => {}
        }
    });
    child
}
