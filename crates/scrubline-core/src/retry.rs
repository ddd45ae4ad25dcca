//! Retry with exponential backoff for shard dispatch

use std::time::Duration;

use crate::store::StoreError;

/// Exponential backoff: 2^attempt seconds (2s, 4s, 8s, ...)
pub const fn backoff_duration(attempt: u32) -> Duration {
    Duration::from_secs(2u64.pow(attempt))
}

/// Retry a store operation with exponential backoff.
///
/// Retries only errors classified retryable, up to `max_retries`
/// additional attempts. Returns the final error on exhaustion or on a
/// non-retryable failure.
pub fn retry_with_backoff<T>(
    label: &str,
    max_retries: u32,
    mut attempt_fn: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, StoreError> {
    let mut attempt = 0u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_retries && e.is_retryable() => {
                attempt += 1;
                log::warn!("{label}: attempt {attempt}/{max_retries} failed: {e}, retrying...");
                std::thread::sleep(backoff_duration(attempt));
            }
            Err(e) => {
                log::error!("{label}: failed permanently: {e}");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn backoff_exponential() {
        assert_eq!(backoff_duration(1), Duration::from_secs(2));
        assert_eq!(backoff_duration(2), Duration::from_secs(4));
        assert_eq!(backoff_duration(3), Duration::from_secs(8));
    }

    #[test]
    fn first_success_no_retry() {
        let mut calls = 0;
        let result = retry_with_backoff("test", 3, || {
            calls += 1;
            Ok::<_, StoreError>(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn non_retryable_fails_immediately() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff("test", 3, || {
            calls += 1;
            Err(StoreError::Http {
                status: Some(403),
                message: "forbidden".to_string(),
            })
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn retryable_exhausts_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = retry_with_backoff("test", 1, || {
            calls += 1;
            Err(StoreError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset",
            )))
        });
        assert!(result.is_err());
        // Initial attempt plus one retry
        assert_eq!(calls, 2);
    }

    #[test]
    fn recovers_after_transient_failure() {
        let mut calls = 0;
        let result = retry_with_backoff("test", 3, || {
            calls += 1;
            if calls < 2 {
                Err(StoreError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "stall",
                )))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 2);
    }
}
