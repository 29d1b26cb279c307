//! # Key Check Library
//!
//! Finds object keys that do not exist in a remote bucket.
//!
//! Checks run concurrently with a hard cap on in-flight remote calls, per-key
//! failures are isolated, and missing keys are collected into a deduplicated
//! report that is only finalized once every check has finished.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use key_check_lib::{CheckConfig, KeyChecker, S3Client};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CheckConfig::for_bucket("images");
//!     let client = Arc::new(S3Client::from_config(&config)?);
//!     let checker = KeyChecker::new(config, client)?;
//!
//!     let keys = key_check_lib::read_keys_from_file("key-data").await?;
//!     let report = checker.check_keys(keys).await?;
//!     key_check_lib::write_report("resulturls", &report.entries).await?;
//!
//!     println!("{} broken keys", report.broken_count());
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Bounded Dispatcher**: one task per key behind a fixed-size permit pool
//! - **Existence Checker**: exact-match classification over prefix listings
//! - **Result Aggregation**: concurrency-safe, deduplicated, sorted output
//! - **S3 Client**: SigV4-signed `ListObjectsV2` over HTTP (feature `s3`)

// Re-export main public API types and functions
pub use checker::KeyChecker;
pub use concurrent::{BoundedDispatcher, DispatchSnapshot};
pub use config::{
    load_env_config, parse_env_config, parse_timeout_string, ConfigManager, DefaultsConfig,
    EnvConfig, FileConfig, OutputConfig,
};
pub use error::KeyCheckError;
pub use protocols::{ListedObject, ObjectLister};
pub use report::{render_report, write_report, ResultSet};
pub use types::{
    CheckConfig, CheckOutcome, KeySet, OutcomeKind, ReportEntry, RunReport, RunSummary,
    DEFAULT_CONCURRENCY, DEFAULT_REGION, MAX_CONCURRENCY, NOT_FOUND_MARKER,
};
pub use utils::{parse_keys, read_keys_from_file, split_key_segments};

#[cfg(feature = "s3")]
pub use protocols::{Credentials, S3Client};

// Internal modules - these are not part of the public API
mod checker;
mod concurrent;
mod config;
mod error;
mod protocols;
mod report;
mod types;
mod utils;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, KeyCheckError>;
