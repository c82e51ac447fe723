/// Bounded retry with exponential backoff for git operations
///
/// A repository being polled is usually also being worked in: index locks,
/// ref updates, and editor-driven churn produce short-lived failures that
/// deserve another attempt. Classification is by substring match against
/// library error text, kept pluggable so a typed classifier can replace it
/// without changing the loop.
use std::time::Duration;

/// Markers identifying an error message as likely retryable
pub const TRANSIENT_ERROR_MARKERS: &[&str] = &[
    "locked",
    "busy",
    "temporary",
    "timeout",
    "connection",
    "network",
];

/// Additional attempts after the first failure
pub const MAX_RETRIES: u32 = 3;

/// Initial backoff delay, doubled after each failed attempt
pub const BASE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Case-insensitive marker match over an error message
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_ERROR_MARKERS
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Default classifier for git2 errors
pub fn is_transient_git_error(err: &git2::Error) -> bool {
    is_transient_message(err.message())
}

/// Retry policy with a pluggable transient-error classifier
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    classify: fn(&git2::Error) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            base_delay: BASE_RETRY_DELAY,
            classify: is_transient_git_error,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            classify: is_transient_git_error,
        }
    }

    /// Replace the transient-error classifier
    pub fn with_classifier(mut self, classify: fn(&git2::Error) -> bool) -> Self {
        self.classify = classify;
        self
    }

    /// Run an operation, retrying transient failures with exponential
    /// backoff. Non-transient errors and retry exhaustion return the
    /// underlying error immediately. The backoff sleep blocks only the
    /// calling thread; callers run this on a blocking worker.
    pub fn run<T, F>(&self, mut op: F) -> Result<T, git2::Error>
    where
        F: FnMut() -> Result<T, git2::Error>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_retries && (self.classify)(&err) => {
                    attempt += 1;
                    tracing::debug!(
                        "transient git error (attempt {}/{}): {}; retrying in {:?}",
                        attempt,
                        self.max_retries,
                        err,
                        delay
                    );
                    std::thread::sleep(delay);
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
