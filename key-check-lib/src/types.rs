//! Core data types for object key checking.
//!
//! This module defines the main data structures used throughout the library:
//! the run configuration, per-key outcomes, report entries and run summaries.

use crate::error::KeyCheckError;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Deduplicated collection of candidate keys.
///
/// An ordered set keeps "each key checked at most once" structural and makes
/// dispatch order reproducible between runs.
pub type KeySet = BTreeSet<String>;

/// Status marker written for every key that is not in the bucket.
pub const NOT_FOUND_MARKER: &str = "404";

/// Default number of simultaneously outstanding remote calls.
pub const DEFAULT_CONCURRENCY: usize = 4000;

/// Upper bound accepted for the concurrency limit.
pub const MAX_CONCURRENCY: usize = 10_000;

/// Default region used when none is configured.
pub const DEFAULT_REGION: &str = "us-west-2";

/// Configuration options for a key checking run.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckConfig {
    /// Maximum number of concurrently outstanding existence checks
    /// Default: 4000, Range: 1-10000
    pub concurrency: usize,

    /// Name of the bucket the keys are checked against
    pub bucket: String,

    /// Region of the bucket. Only used to route requests.
    /// Default: "us-west-2"
    pub region: String,

    /// Custom endpoint for S3-compatible stores (e.g. "http://localhost:9000")
    pub endpoint: Option<String>,

    /// Timeout for each individual remote call
    /// Default: 30 seconds
    pub timeout: Duration,

    /// How many times a retryable failure is retried before giving up
    /// Default: 2
    pub max_retries: u32,

    /// Base delay between retries, multiplied by the attempt number
    /// Default: 200ms
    pub retry_backoff: Duration,

    /// Send requests without SigV4 signing (public buckets, open endpoints)
    /// Default: false
    pub unsigned: bool,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            bucket: String::new(),
            region: DEFAULT_REGION.to_string(),
            endpoint: None,
            timeout: Duration::from_secs(30),
            max_retries: 2,
            retry_backoff: Duration::from_millis(200),
            unsigned: false,
        }
    }
}

impl CheckConfig {
    /// Create a configuration for the given bucket with default settings.
    pub fn for_bucket<B: Into<String>>(bucket: B) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Set the concurrency limit.
    ///
    /// Clamped to `1..=MAX_CONCURRENCY`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }

    /// Set the target bucket.
    pub fn with_bucket<B: Into<String>>(mut self, bucket: B) -> Self {
        self.bucket = bucket.into();
        self
    }

    /// Set the bucket region.
    pub fn with_region<R: Into<String>>(mut self, region: R) -> Self {
        self.region = region.into();
        self
    }

    /// Point the client at a custom endpoint.
    pub fn with_endpoint<E: Into<String>>(mut self, endpoint: E) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of retries for retryable failures.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    /// Skip request signing.
    pub fn with_unsigned(mut self, unsigned: bool) -> Self {
        self.unsigned = unsigned;
        self
    }

    /// Reject configurations a run cannot start with.
    pub fn validate(&self) -> Result<(), KeyCheckError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(KeyCheckError::config(format!(
                "Concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            )));
        }
        if self.bucket.trim().is_empty() {
            return Err(KeyCheckError::config("Bucket name cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(KeyCheckError::config("Timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// A formatted record describing one key that is missing from the bucket.
///
/// Rendered as `<key>|<key segments joined by '|'>|404`, e.g.
/// `c/d.jpg|c|d.jpg|404`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReportEntry {
    key: String,
}

impl ReportEntry {
    /// Build the report entry for a key confirmed absent.
    pub fn missing<K: Into<String>>(key: K) -> Self {
        Self { key: key.into() }
    }

    /// The key this entry reports.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The status marker written at the end of the line.
    pub fn marker(&self) -> &'static str {
        NOT_FOUND_MARKER
    }
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segments = crate::utils::split_key_segments(&self.key).join("|");
        write!(f, "{}|{}|{}", self.key, segments, self.marker())
    }
}

/// Result of checking one key.
#[derive(Debug, Clone)]
pub enum CheckOutcome {
    /// The object exists
    Present { key: String },

    /// The object does not exist
    Missing { key: String, entry: ReportEntry },

    /// The remote call failed for a reason other than non-existence
    Error { key: String, error: KeyCheckError },
}

impl CheckOutcome {
    /// Classify a key as missing, deriving its report entry.
    pub fn missing<K: Into<String>>(key: K) -> Self {
        let key = key.into();
        let entry = ReportEntry::missing(key.clone());
        Self::Missing { key, entry }
    }

    /// The key this outcome belongs to.
    pub fn key(&self) -> &str {
        match self {
            Self::Present { key } | Self::Missing { key, .. } | Self::Error { key, .. } => key,
        }
    }

    /// The report entry, only present for `Missing`.
    pub fn report_entry(&self) -> Option<&ReportEntry> {
        match self {
            Self::Missing { entry, .. } => Some(entry),
            _ => None,
        }
    }

    /// Variant tag without the payload.
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Present { .. } => OutcomeKind::Present,
            Self::Missing { .. } => OutcomeKind::Missing,
            Self::Error { .. } => OutcomeKind::Error,
        }
    }
}

/// Variant tag of a [`CheckOutcome`], used for tallies and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Present,
    Missing,
    Error,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Present => write!(f, "present"),
            OutcomeKind::Missing => write!(f, "missing"),
            OutcomeKind::Error => write!(f, "error"),
        }
    }
}

/// Counts for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Number of checks that were scheduled
    pub total: usize,
    /// Keys confirmed present
    pub present: usize,
    /// Keys confirmed missing
    pub missing: usize,
    /// Keys whose check failed (including panicked check tasks)
    pub errored: usize,
}

impl RunSummary {
    /// Fold one outcome into the tallies.
    pub fn record(&mut self, kind: OutcomeKind) {
        match kind {
            OutcomeKind::Present => self.present += 1,
            OutcomeKind::Missing => self.missing += 1,
            OutcomeKind::Error => self.errored += 1,
        }
    }

    /// Number of checks that finished, whatever their outcome.
    pub fn completed(&self) -> usize {
        self.present + self.missing + self.errored
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checked, {} present, {} missing, {} errored",
            self.total, self.present, self.missing, self.errored
        )
    }
}

/// Finalized output of a completed run.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Broken keys, sorted by key, each exactly once
    pub entries: Vec<ReportEntry>,
    /// Outcome counts
    pub summary: RunSummary,
}

impl RunReport {
    /// Number of broken keys found.
    pub fn broken_count(&self) -> usize {
        self.entries.len()
    }
}
