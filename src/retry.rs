//! Retry with exponential backoff.
//!
//! [`retry`] runs an async operation up to `max_attempts` times. After each
//! failure the error is classified; it is retried only when its kind is
//! retryable or its root-cause message contains one of the configured
//! `retryable_signatures`. Delay before attempt `n + 1` is
//! `min(initial_delay * multiplier^n, max_delay)`.
//!
//! The first failure of every run is logged with full context even when a
//! later attempt succeeds, and exhaustion is logged again with the final
//! attempt count.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{structure_ref, ErrorContext, Locale, StructuredError};

/// Delay to wait after the failed attempt with zero-based index `attempt`.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let factor = config.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
    let millis = (config.initial_delay_ms as f64 * factor).min(config.max_delay_ms as f64);
    Duration::from_millis(millis as u64)
}

/// Whether a classified failure should be attempted again.
///
/// Either source is sufficient: the kind's own retryability, or a match
/// against the caller's signature list.
pub fn should_retry(config: &RetryConfig, error: &StructuredError) -> bool {
    if error.retryable {
        return true;
    }
    let message = error.cause.to_lowercase();
    config
        .retryable_signatures
        .iter()
        .any(|sig| !sig.is_empty() && message.contains(&sig.to_lowercase()))
}

/// Run `op` until it succeeds, fails with a non-retryable error, or runs
/// out of attempts. The original error is returned unchanged on failure.
pub async fn retry<T, F, Fut>(
    config: &RetryConfig,
    context: &ErrorContext,
    locale: Locale,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt: u32 = 0;

    loop {
        let err = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        attempts = attempt + 1,
                        document_id = context.document_id.as_deref().unwrap_or("-"),
                        "call succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        let structured = structure_ref(&err, context.clone(), locale);
        let retryable = should_retry(config, &structured);
        let attempts_left = attempt + 1 < max_attempts;

        if attempt == 0 {
            tracing::warn!(
                attempt = attempt + 1,
                max_attempts,
                kind = %structured.kind,
                retryable,
                user_id = context.user_id.as_deref().unwrap_or("-"),
                document_id = context.document_id.as_deref().unwrap_or("-"),
                job_id = context.job_id.as_deref().unwrap_or("-"),
                extra = ?context.extra,
                error = %structured.message,
                "call failed"
            );
        }

        if !retryable || !attempts_left {
            tracing::error!(
                attempts = attempt + 1,
                max_attempts,
                kind = %structured.kind,
                retryable,
                user_id = context.user_id.as_deref().unwrap_or("-"),
                document_id = context.document_id.as_deref().unwrap_or("-"),
                job_id = context.job_id.as_deref().unwrap_or("-"),
                error = %structured.message,
                "giving up"
            );
            return Err(err);
        }

        let delay = backoff_delay(config, attempt);
        tracing::debug!(
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            kind = %structured.kind,
            "retrying after backoff"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
