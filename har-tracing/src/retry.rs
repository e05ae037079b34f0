//! Retrying failed trace file writes with exponential backoff and jitter.
//!
//! The persistence worker runs on its own thread, so the delays between
//! attempts are plain sleeps on that thread. Documents queued behind a
//! retried one wait for it.
use std::cmp::min;
use std::thread;
use std::time::Duration;

/// What the file tracer does with a document it failed to persist.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Log the failure and drop the document.
    #[default]
    Drop,
    /// Retry according to the policy, then drop the document.
    Retry(RetryPolicy),
}

/// Configuration for retry policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Initial delay in milliseconds before the first retry.
    pub initial_delay_ms: u64,
    /// Maximum delay in milliseconds between retries.
    pub max_delay_ms: u64,
    /// Maximum jitter in milliseconds to add to the delay.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 1_600,
            jitter_ms: 100,
        }
    }
}

// Generates a random jitter value up to max_jitter
fn generate_jitter(max_jitter: u64) -> u64 {
    if max_jitter == 0 {
        0
    } else {
        rand::random::<u64>() % (max_jitter + 1)
    }
}

/// Retries the given operation with exponential backoff and jitter.
///
/// Returns the first success, or the last error once `max_retries` retries
/// have failed.
pub(crate) fn retry_with_exponential_backoff<F, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = policy.initial_delay_ms;

    loop {
        match operation() {
            Ok(result) => return Ok(result),
            Err(err) if attempt < policy.max_retries => {
                attempt += 1;
                har_warn!(
                    name: "FileTracer.Retry",
                    operation = operation_name,
                    attempt = attempt,
                    reason = err.to_string()
                );
                let jitter = generate_jitter(policy.jitter_ms);
                let delay_with_jitter = min(delay + jitter, policy.max_delay_ms);
                thread::sleep(Duration::from_millis(delay_with_jitter));
                delay = min(delay * 2, policy.max_delay_ms);
            }
            Err(err) => return Err(err),
        }
    }
}
