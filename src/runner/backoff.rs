/**
 * Retry Back-off
 *
 * DESIGN DECISION: `delay(retryAfter, attempt) = min(retryAfter*1000 if given else
 * 1000*2^attempt, 120000)`, slept through a cancellation-aware `abortable_sleep`
 * WHY: sleeping is cancellation-aware: an already-aborted signal resolves immediately, a
 * mid-sleep abort resolves promptly
 */

use std::time::Duration;

use super::cancellation::CancellationToken;

const MAX_DELAY_MS: u64 = 120_000;

/// Compute the back-off delay in milliseconds for a given attempt.
pub fn compute_retry_delay(retry_after_secs: Option<u64>, attempt: u32) -> Duration {
    let ms = match retry_after_secs {
        Some(secs) => secs.saturating_mul(1000),
        None => 1000u64.saturating_mul(2u64.saturating_pow(attempt)),
    };
    Duration::from_millis(ms.min(MAX_DELAY_MS))
}

/// Sleep for `duration`, resolving early if `token` is cancelled.
pub async fn abortable_sleep(duration: Duration, token: &CancellationToken) {
    tokio::select! {
        _ = tokio::time::sleep(duration) => {}
        _ = token.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uses_retry_after_when_given() {
        assert_eq!(compute_retry_delay(Some(5), 10), Duration::from_millis(5000));
    }

    #[test]
    fn test_exponential_backoff_without_retry_after() {
        assert_eq!(compute_retry_delay(None, 0), Duration::from_millis(1000));
        assert_eq!(compute_retry_delay(None, 1), Duration::from_millis(2000));
        assert_eq!(compute_retry_delay(None, 3), Duration::from_millis(8000));
    }

    #[test]
    fn test_caps_at_120_seconds() {
        assert_eq!(compute_retry_delay(None, 20), Duration::from_millis(MAX_DELAY_MS));
        assert_eq!(compute_retry_delay(Some(999), 0), Duration::from_millis(MAX_DELAY_MS));
    }

    #[tokio::test]
    async fn test_abortable_sleep_resolves_immediately_if_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let start = std::time::Instant::now();
        abortable_sleep(Duration::from_secs(5), &token).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_abortable_sleep_resolves_on_mid_sleep_cancel() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let start = std::time::Instant::now();
        abortable_sleep(Duration::from_secs(5), &token).await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_abortable_sleep_runs_full_duration_without_cancellation() {
        let token = CancellationToken::new();
        let start = std::time::Instant::now();
        abortable_sleep(Duration::from_millis(50), &token).await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }
}
