//! A single retry-with-backoff combinator.
//!
//! The source this pipeline is modeled on exposed three equivalent ways to
//! retry a call (a decorator, an inline loop, a context manager); this crate
//! keeps exactly one, [`with_backoff`], and every retrying call site —
//! currently only the LLM client — goes through it.

use std::future::Future;
use std::time::Duration;

/// Retry `f` up to `max_retries` additional times (so `max_retries + 1`
/// attempts total) with exponential backoff: `base_delay * exponential_base
/// ^ attempt`, capped at `max_delay`. Returns the last error if every attempt
/// fails.
pub async fn with_backoff<F, Fut, T, E>(
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err);
                }
                let delay_secs = base_delay.as_secs_f64() * exponential_base.powi(attempt as i32);
                let delay = Duration::from_secs_f64(delay_secs).min(max_delay);
                tracing::warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying after failure");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`with_backoff`] parameterized with the LLM call's configured retry
/// policy: 3 retries at 1s, 2s, 4s.
pub async fn retry_llm_call<F, Fut, T, E>(f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    use crate::config::defaults::insight as d;
    with_backoff(d::MAX_LLM_RETRIES, d::RETRY_BASE_DELAY, d::RETRY_MAX_DELAY, d::RETRY_EXPONENTIAL_BASE, f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_when_first_attempt_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_backoff(3, Duration::from_millis(1), Duration::from_millis(5), 2.0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(42) }
        })
        .await;
        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success_within_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_backoff(3, Duration::from_millis(1), Duration::from_millis(5), 2.0, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 2 { Err("not yet".to_string()) } else { Ok(7) } }
        })
        .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn returns_last_error_after_exhausting_retries() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = with_backoff(2, Duration::from_millis(1), Duration::from_millis(5), 2.0, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<u32, _>("always fails".to_string()) }
        })
        .await;
        assert_eq!(result, Err("always fails".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
