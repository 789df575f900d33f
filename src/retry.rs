//! Transient-failure detection and retry policy.
//!
//! Network hiccups get exactly one retry after a short backoff. Credential
//! rejections and configuration errors are never retried.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::{Error, Result};

/// Default pause before the single retry attempt.
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(2);

/// Check if an error message indicates a transient failure worth retrying.
pub fn is_transient_error(message: &str) -> bool {
    let transient_patterns = [
        "rate limit",
        "timeout",
        "timed out",
        "connection refused",
        "connection reset",
        "temporary failure",
        "network",
        "503",
        "429",
        "could not connect",
        "broken pipe",
    ];

    let lower = message.to_lowercase();
    transient_patterns.iter().any(|p| lower.contains(p))
}

fn should_retry(error: &Error) -> bool {
    match error {
        Error::Network(_) => true,
        Error::Auth(_) | Error::Config(_) | Error::ChallengeTimeout(_) => false,
        other => is_transient_error(&other.to_string()),
    }
}

/// Run `op`, retrying once after `backoff` if it fails transiently.
pub async fn with_retry<T, F, Fut>(description: &str, backoff: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) if should_retry(&e) => {
            warn!("{description} failed transiently, retrying in {backoff:?}: {e}");
            sleep(backoff).await;
            op().await
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn detects_transient_patterns() {
        assert!(is_transient_error("HTTP 429 Too Many Requests"));
        assert!(is_transient_error("Connection refused by peer"));
        assert!(is_transient_error("operation timed out"));
        assert!(!is_transient_error("invalid password"));
        assert!(!is_transient_error("no such selector"));
    }

    #[tokio::test]
    async fn retries_network_error_once() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = with_retry("test op", Duration::from_millis(1), || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(Error::Network("connection reset".into()))
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_transient_failure() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = with_retry("test op", Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Network("still down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn never_retries_auth_errors() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = with_retry("login", Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Auth("bad password".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::Auth(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn never_retries_challenge_timeouts() {
        let attempts = AtomicU32::new(0);
        let result: Result<u32> = with_retry("manual wait", Duration::from_millis(1), || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::ChallengeTimeout("captcha".into())) }
        })
        .await;
        assert!(matches!(result, Err(Error::ChallengeTimeout(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
