//! Classified-retry combinator shared by the agent dispatcher, the
//! Postgres storage backend and the webhook auditor.
//!
//! An operation is attempted up to 3 times. After a failure the error is
//! classified; a non-retriable error aborts immediately, a retriable one
//! waits 1s before the second attempt and 3s before the third. The wait
//! races against the caller's cancellation token.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub const MAX_ATTEMPTS: u32 = 3;
const FIRST_DELAY_SECS: u64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retriable,
    NonRetriable,
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    #[error("non-retriable error: {0}")]
    NonRetriable(#[source] E),
    #[error("aborted after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },
    #[error("operation cancelled")]
    Cancelled,
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// The underlying operation error, when the retry loop saw one.
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::NonRetriable(e) | RetryError::Exhausted { source: e, .. } => Some(e),
            RetryError::Cancelled => None,
        }
    }
}

/// Runs `op` until it succeeds, fails non-retriably, exhausts its attempts
/// or the token is cancelled.
pub async fn run_with_result<T, E, F, Fut, C>(
    cancel: &CancellationToken,
    classify: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> Classification,
{
    let mut attempt = 1u32;
    loop {
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if classify(&err) == Classification::NonRetriable {
            return Err(RetryError::NonRetriable(err));
        }
        if attempt == MAX_ATTEMPTS {
            return Err(RetryError::Exhausted {
                attempts: MAX_ATTEMPTS,
                source: err,
            });
        }

        let delay = Duration::from_secs(FIRST_DELAY_SECS + u64::from(attempt - 1) * 2);
        tracing::info!(
            attempt,
            delay_secs = delay.as_secs(),
            error = %err,
            "retriable error, operation delayed"
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
        attempt += 1;
    }
}

/// Unit-result form of [`run_with_result`].
pub async fn run<E, F, Fut, C>(
    cancel: &CancellationToken,
    classify: C,
    op: F,
) -> Result<(), RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    C: Fn(&E) -> Classification,
{
    run_with_result(cancel, classify, op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("boom")]
    struct Boom;

    fn always_retriable(_: &Boom) -> Classification {
        Classification::Retriable
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_needs_one_attempt() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let out = run_with_result(&token, always_retriable, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Boom>(42) }
        })
        .await
        .unwrap();
        assert_eq!(out, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retriable_error_is_bounded_to_three_attempts() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        let err = run(&token, always_retriable, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(Boom) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::Exhausted { attempts: 3, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s before attempt 2, 3s before attempt 3, nothing after the last.
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_error_aborts_immediately() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let err = run(
            &token,
            |_: &Boom| Classification::NonRetriable,
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(Boom) }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RetryError::NonRetriable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_backoff() {
        let token = CancellationToken::new();
        token.cancel();
        let err = run(&token, always_retriable, || async { Err::<(), _>(Boom) })
            .await
            .unwrap_err();
        assert!(matches!(err, RetryError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_second_attempt_after_one_delay() {
        let calls = AtomicU32::new(0);
        let token = CancellationToken::new();
        let start = tokio::time::Instant::now();
        run(&token, always_retriable, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Boom)
                } else {
                    Ok(())
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(start.elapsed(), Duration::from_secs(1));
    }
}
