//! Main key checker implementation.
//!
//! This module provides the `KeyChecker` struct: it classifies single keys
//! against the configured bucket and drives whole runs through the
//! [`BoundedDispatcher`].

use crate::concurrent::BoundedDispatcher;
use crate::error::KeyCheckError;
use crate::protocols::ObjectLister;
use crate::types::{CheckConfig, CheckOutcome, RunReport};
use std::sync::Arc;
use std::time::Duration;

/// Checks object keys for existence in one bucket.
///
/// Cloning is cheap; clones share the remote client.
///
/// # Example
///
/// ```rust,no_run
/// use key_check_lib::{CheckConfig, KeyChecker, S3Client};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = CheckConfig::for_bucket("images").with_concurrency(500);
///     let client = S3Client::from_config(&config)?;
///     let checker = KeyChecker::new(config, Arc::new(client))?;
///
///     let keys = key_check_lib::parse_keys("a/b.jpg\nc/d.jpg\n");
///     let report = checker.check_keys(keys).await?;
///     for entry in &report.entries {
///         println!("{}", entry);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct KeyChecker {
    /// Configuration settings for this checker instance
    config: CheckConfig,
    /// Remote client used for prefix listings
    lister: Arc<dyn ObjectLister>,
}

impl KeyChecker {
    /// Create a checker for `config.bucket` using `lister` as remote client.
    ///
    /// # Errors
    ///
    /// Returns `KeyCheckError::ConfigError` if the configuration is invalid.
    pub fn new(config: CheckConfig, lister: Arc<dyn ObjectLister>) -> Result<Self, KeyCheckError> {
        config.validate()?;
        Ok(Self { config, lister })
    }

    /// Get the configuration for this checker.
    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    /// Verify the bucket is reachable.
    ///
    /// Run-level check: a failure here means no key can be checked
    /// meaningfully, so callers should abort instead of dispatching.
    pub async fn probe(&self) -> Result<(), KeyCheckError> {
        match tokio::time::timeout(self.config.timeout, self.lister.probe(&self.config.bucket)).await
        {
            Ok(result) => result,
            Err(_) => Err(KeyCheckError::timeout("bucket probe", self.config.timeout)),
        }
    }

    /// Classify a single key as present, missing or errored.
    ///
    /// Retryable failures are retried up to `max_retries` times with a linear
    /// backoff, or after the server's `Retry-After` if that is longer. This never returns an error: failures become
    /// `CheckOutcome::Error` and are logged.
    pub async fn check_key(&self, key: &str) -> CheckOutcome {
        let mut attempt = 0u32;
        loop {
            match self.list_once(key).await {
                Ok(true) => {
                    tracing::trace!(key, "present");
                    return CheckOutcome::Present {
                        key: key.to_string(),
                    };
                }
                Ok(false) => {
                    let outcome = CheckOutcome::missing(key);
                    if let Some(entry) = outcome.report_entry() {
                        tracing::error!(key, status = entry.marker(), "key not found");
                    }
                    return outcome;
                }
                Err(error) if error.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.retry_delay(&error, attempt);
                    tracing::debug!(key, attempt, ?delay, error = %error, "retrying existence check");
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    tracing::error!(key, error = %error, "existence check failed");
                    return CheckOutcome::Error {
                        key: key.to_string(),
                        error,
                    };
                }
            }
        }
    }

    fn retry_delay(&self, error: &KeyCheckError, attempt: u32) -> Duration {
        let backoff = self.config.retry_backoff * attempt;
        match error {
            KeyCheckError::RateLimited {
                retry_after: Some(hint),
                ..
            } => backoff.max(*hint),
            _ => backoff,
        }
    }

    /// One listing call, bounded by the per-check timeout.
    ///
    /// `Ok(true)` iff the listing holds an object whose key equals `key`.
    async fn list_once(&self, key: &str) -> Result<bool, KeyCheckError> {
        let listing = tokio::time::timeout(
            self.config.timeout,
            self.lister.list_by_prefix(&self.config.bucket, key),
        )
        .await
        .map_err(|_| KeyCheckError::timeout("prefix listing", self.config.timeout))??;

        Ok(listing.iter().any(|object| object.key == key))
    }

    /// Check every key with at most `config.concurrency` checks in flight.
    ///
    /// Returns once all checks have completed. Keys are checked exactly once
    /// each; per-key failures are isolated and counted in the summary.
    ///
    /// # Errors
    ///
    /// Only run-level problems (an unusable concurrency limit) are returned.
    pub async fn check_keys<I>(&self, keys: I) -> Result<RunReport, KeyCheckError>
    where
        I: IntoIterator<Item = String>,
    {
        let dispatcher = BoundedDispatcher::new(self.config.concurrency)?;
        tracing::info!(
            bucket = %self.config.bucket,
            concurrency = dispatcher.limit(),
            "starting existence checks"
        );

        let checker = self.clone();
        let report = dispatcher
            .run(keys, move |key| {
                let checker = checker.clone();
                async move { checker.check_key(&key).await }
            })
            .await;

        tracing::info!(summary = %report.summary, "existence checks finished");
        Ok(report)
    }
}

impl std::fmt::Debug for KeyChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyChecker")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocols::ListedObject;
    use crate::types::OutcomeKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Lister that fails a fixed number of times before answering.
    struct FlakyLister {
        failures: usize,
        error: KeyCheckError,
        calls: AtomicUsize,
        objects: Vec<String>,
    }

    #[async_trait]
    impl ObjectLister for FlakyLister {
        async fn list_by_prefix(
            &self,
            _bucket: &str,
            prefix: &str,
        ) -> Result<Vec<ListedObject>, KeyCheckError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            Ok(self
                .objects
                .iter()
                .filter(|k| k.starts_with(prefix))
                .map(ListedObject::new)
                .collect())
        }
    }

    struct SlowLister;

    #[async_trait]
    impl ObjectLister for SlowLister {
        async fn list_by_prefix(
            &self,
            _bucket: &str,
            _prefix: &str,
        ) -> Result<Vec<ListedObject>, KeyCheckError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }
    }

    /// Lister throttled once with a `Retry-After` hint, recording call times.
    struct ThrottledLister {
        retry_after: Option<Duration>,
        calls: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl ObjectLister for ThrottledLister {
        async fn list_by_prefix(
            &self,
            _bucket: &str,
            _prefix: &str,
        ) -> Result<Vec<ListedObject>, KeyCheckError> {
            let first = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(Instant::now());
                calls.len() == 1
            };
            if first {
                return Err(KeyCheckError::RateLimited {
                    service: "s3".to_string(),
                    message: "slow down".to_string(),
                    retry_after: self.retry_after,
                });
            }
            Ok(Vec::new())
        }
    }

    async fn throttled_retry_gap(retry_after: Option<Duration>) -> Duration {
        let lister = Arc::new(ThrottledLister {
            retry_after,
            calls: Mutex::new(Vec::new()),
        });
        let config = CheckConfig::for_bucket("images")
            .with_max_retries(1)
            .with_retry_backoff(Duration::from_millis(200));
        let checker = KeyChecker::new(config, lister.clone()).unwrap();

        assert_eq!(checker.check_key("a/b.jpg").await.kind(), OutcomeKind::Missing);

        let calls = lister.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        calls[1] - calls[0]
    }

    fn checker_with(lister: FlakyLister, retries: u32) -> (KeyChecker, Arc<FlakyLister>) {
        let lister = Arc::new(lister);
        let config = CheckConfig::for_bucket("images")
            .with_max_retries(retries)
            .with_retry_backoff(Duration::from_millis(1));
        let checker = KeyChecker::new(config, lister.clone()).unwrap();
        (checker, lister)
    }

    fn flaky(failures: usize, error: KeyCheckError) -> FlakyLister {
        FlakyLister {
            failures,
            error,
            calls: AtomicUsize::new(0),
            objects: vec!["a/b.jpg".to_string(), "a/b.jpg.bak".to_string()],
        }
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let lister: Arc<dyn ObjectLister> = Arc::new(flaky(0, KeyCheckError::network("x")));
        assert!(KeyChecker::new(CheckConfig::default(), lister).is_err());
    }

    #[tokio::test]
    async fn test_exact_match_is_present() {
        let (checker, _) = checker_with(flaky(0, KeyCheckError::network("x")), 0);
        assert_eq!(checker.check_key("a/b.jpg").await.kind(), OutcomeKind::Present);
    }

    #[tokio::test]
    async fn test_prefix_only_match_is_missing() {
        let (checker, _) = checker_with(flaky(0, KeyCheckError::network("x")), 0);
        // "a/b" is a prefix of stored keys but not a stored key itself
        let outcome = checker.check_key("a/b").await;
        assert_eq!(outcome.kind(), OutcomeKind::Missing);
        assert_eq!(
            outcome.report_entry().map(|e| e.to_string()),
            Some("a/b|a|b|404".to_string())
        );
    }

    #[tokio::test]
    async fn test_same_key_same_outcome() {
        let (checker, _) = checker_with(flaky(0, KeyCheckError::network("x")), 0);
        for key in ["a/b.jpg", "c/d.jpg"] {
            let first = checker.check_key(key).await.kind();
            let second = checker.check_key(key).await.kind();
            assert_eq!(first, second);
        }
    }

    #[tokio::test]
    async fn test_transient_error_retried_then_succeeds() {
        let (checker, lister) = checker_with(flaky(2, KeyCheckError::network("reset")), 2);
        assert_eq!(checker.check_key("a/b.jpg").await.kind(), OutcomeKind::Present);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_error() {
        let (checker, lister) = checker_with(flaky(10, KeyCheckError::network("reset")), 2);
        let outcome = checker.check_key("a/b.jpg").await;
        assert!(matches!(
            outcome,
            CheckOutcome::Error {
                error: KeyCheckError::NetworkError { .. },
                ..
            }
        ));
        assert!(outcome.report_entry().is_none());
        assert_eq!(lister.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_malformed_response_not_retried() {
        let (checker, lister) = checker_with(flaky(1, KeyCheckError::parse("bad body")), 5);
        assert_eq!(checker.check_key("a/b.jpg").await.kind(), OutcomeKind::Error);
        assert_eq!(lister.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let config = CheckConfig::for_bucket("images")
            .with_timeout(Duration::from_secs(5))
            .with_max_retries(0);
        let checker = KeyChecker::new(config, Arc::new(SlowLister)).unwrap();

        let outcome = checker.check_key("a/b.jpg").await;
        assert!(matches!(
            outcome,
            CheckOutcome::Error {
                error: KeyCheckError::Timeout { .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_waits_for_retry_after() {
        let gap = throttled_retry_gap(Some(Duration::from_secs(10))).await;
        assert!(gap >= Duration::from_secs(10), "retried after {:?}", gap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_retry_after_keeps_backoff() {
        let gap = throttled_retry_gap(Some(Duration::from_millis(10))).await;
        assert!(gap >= Duration::from_millis(200), "retried after {:?}", gap);
        assert!(gap < Duration::from_secs(1));

        let gap = throttled_retry_gap(None).await;
        assert!(gap >= Duration::from_millis(200));
    }
}
