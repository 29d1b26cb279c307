//! Key Check CLI Application
//!
//! Reads a list of object keys, checks each one against an S3 bucket with
//! bounded concurrency, and writes the keys that do not exist to a report file.

mod ui;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::Parser;
use key_check_lib::{
    load_env_config, parse_timeout_string, read_keys_from_file, write_report, CheckConfig,
    ConfigManager, EnvConfig, FileConfig, KeyChecker, S3Client, MAX_CONCURRENCY,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

const STYLES: Styles = Styles::styled()
    .header(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .usage(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
    .literal(AnsiColor::Green.on_default().effects(Effects::BOLD))
    .placeholder(AnsiColor::Cyan.on_default());

/// Report file written when nothing else is configured.
const DEFAULT_REPORT_PATH: &str = "resulturls";

/// CLI arguments for key-check
#[derive(Parser, Debug)]
#[command(name = "key-check")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Find object keys that are missing from an S3 bucket")]
#[command(
    long_about = "Checks every key in KEYS_FILE against an S3 bucket and writes the keys that do not exist to a report.\n\nEach report line has the form <key>|<key segments joined by '|'>|404."
)]
#[command(styles = STYLES)]
pub struct Args {
    /// File with one object key per line
    #[arg(value_name = "KEYS_FILE", help_heading = "Input")]
    pub keys_file: PathBuf,

    /// Bucket to check the keys against
    #[arg(short = 'b', long = "bucket", value_name = "NAME", help_heading = "Bucket")]
    pub bucket: Option<String>,

    /// Bucket region (default: us-west-2)
    #[arg(long = "region", value_name = "REGION", help_heading = "Bucket")]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL
    #[arg(long = "endpoint", value_name = "URL", help_heading = "Bucket")]
    pub endpoint: Option<String>,

    /// Send unsigned requests (public buckets, open endpoints)
    #[arg(long = "no-sign-request", help_heading = "Bucket")]
    pub no_sign_request: bool,

    /// Skip the bucket reachability check before dispatching
    #[arg(long = "skip-probe", help_heading = "Bucket")]
    pub skip_probe: bool,

    /// Max concurrent existence checks (default: 4000)
    #[arg(short = 'c', long = "concurrency", help_heading = "Performance")]
    pub concurrency: Option<usize>,

    /// Timeout per remote call, e.g. "30s" or "2m"
    #[arg(long = "timeout", value_name = "DURATION", help_heading = "Performance")]
    pub timeout: Option<String>,

    /// Retries for transient failures (default: 2)
    #[arg(long = "retries", value_name = "N", help_heading = "Performance")]
    pub retries: Option<u32>,

    /// Report file for missing keys (default: resulturls)
    #[arg(short = 'o', long = "output", value_name = "FILE", help_heading = "Output")]
    pub output: Option<PathBuf>,

    /// Use specific config file instead of automatic discovery
    #[arg(long = "config", value_name = "FILE", help_heading = "Configuration")]
    pub config: Option<String>,

    /// Trace-level logging
    #[arg(short = 'd', long = "debug", help_heading = "Configuration")]
    pub debug: bool,

    /// Verbose logging
    #[arg(short = 'v', long = "verbose", help_heading = "Configuration")]
    pub verbose: bool,
}

/// Everything a run needs once all configuration sources are merged.
#[derive(Debug, Clone, PartialEq)]
struct RunSettings {
    check: CheckConfig,
    report_path: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    init_tracing(&args);

    // Validate arguments
    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run_key_check(args).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the flags.
fn init_tracing(args: &Args) {
    let level = if args.debug {
        "trace"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("warn,key_check={0},key_check_lib={0}", level))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Validate command line arguments
fn validate_args(args: &Args) -> Result<(), String> {
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 || concurrency > MAX_CONCURRENCY {
            return Err(format!(
                "Concurrency must be between 1 and {}",
                MAX_CONCURRENCY
            ));
        }
    }

    if let Some(timeout) = &args.timeout {
        if parse_timeout_string(timeout).is_none() {
            return Err(format!(
                "Invalid timeout '{}'. Use format like '5s', '30s', '2m'",
                timeout
            ));
        }
    }

    if let Some(bucket) = &args.bucket {
        if bucket.trim().is_empty() {
            return Err("Bucket name cannot be empty".to_string());
        }
    }

    Ok(())
}

async fn run_key_check(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let settings = build_config(&args)?;

    let keys = read_keys_from_file(&args.keys_file).await?;
    tracing::info!(
        keys = keys.len(),
        file = %args.keys_file.display(),
        "loaded key list"
    );

    let client = S3Client::from_config(&settings.check)?;
    let checker = KeyChecker::new(settings.check.clone(), Arc::new(client))?;

    if args.verbose {
        ui::print_header(keys.len(), checker.config());
    }

    // Run-level reachability check; nothing is dispatched if it fails.
    if !args.skip_probe && !keys.is_empty() {
        checker.probe().await.map_err(|e| {
            format!(
                "Bucket '{}' is not reachable: {}",
                checker.config().bucket,
                e
            )
        })?;
    }

    let start_time = Instant::now();
    let report = checker.check_keys(keys).await?;
    let duration = start_time.elapsed();

    tracing::info!("Total number of broken keys : {}", report.broken_count());

    write_report(&settings.report_path, &report.entries).await?;
    ui::print_summary(&report.summary, &settings.report_path, duration);

    Ok(())
}

/// Build the run settings from CLI arguments with config file integration.
///
/// Precedence order (highest to lowest):
/// 1. CLI arguments (explicit user input)
/// 2. Environment variables (KC_*)
/// 3. Local config file (./key-check.toml)
/// 4. Global config file (~/.key-check.toml)
/// 5. XDG config file (~/.config/key-check/config.toml)
/// 6. Built-in defaults
fn build_config(args: &Args) -> Result<RunSettings, Box<dyn std::error::Error>> {
    let env_config = load_env_config(args.verbose);
    let config_manager = ConfigManager::new(args.verbose);

    // Step 1: Load config files
    let explicit_path = args.config.clone().or_else(|| env_config.config.clone());
    let file_config = if let Some(path) = explicit_path {
        tracing::debug!(path = %path, "using explicit config file");
        config_manager
            .load_file(&path)
            .map_err(|e| format!("Failed to load config file '{}': {}", path, e))?
    } else {
        match config_manager.discover_and_load() {
            Ok(file_config) => file_config,
            Err(e) => {
                tracing::warn!(error = %e, "config discovery failed, using defaults");
                FileConfig::default()
            }
        }
    };

    let settings = RunSettings {
        check: CheckConfig::default(),
        report_path: PathBuf::from(DEFAULT_REPORT_PATH),
    };
    let settings = merge_file_config(settings, file_config);

    // Step 2: Apply environment variables (KC_*)
    let settings = apply_environment_config(settings, &env_config);

    // Step 3: Apply CLI arguments (highest precedence)
    Ok(apply_cli_args(settings, args))
}

/// Merge FileConfig into the run settings
fn merge_file_config(mut settings: RunSettings, file_config: FileConfig) -> RunSettings {
    if let Some(defaults) = file_config.defaults {
        if let Some(concurrency) = defaults.concurrency {
            settings.check.concurrency = concurrency;
        }
        if let Some(bucket) = defaults.bucket {
            settings.check.bucket = bucket;
        }
        if let Some(region) = defaults.region {
            settings.check.region = region;
        }
        if defaults.endpoint.is_some() {
            settings.check.endpoint = defaults.endpoint;
        }
        if let Some(secs) = defaults.timeout.as_deref().and_then(parse_timeout_string) {
            settings.check.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = defaults.retries {
            settings.check.max_retries = retries;
        }
        if let Some(unsigned) = defaults.no_sign_request {
            settings.check.unsigned = unsigned;
        }
    }

    if let Some(path) = file_config.output.and_then(|o| o.report_path) {
        settings.report_path = PathBuf::from(path);
    }

    settings
}

/// Apply KC_* environment values; they were validated when loaded.
fn apply_environment_config(mut settings: RunSettings, env_config: &EnvConfig) -> RunSettings {
    if let Some(concurrency) = env_config.concurrency {
        settings.check.concurrency = concurrency;
    }
    if let Some(bucket) = &env_config.bucket {
        settings.check.bucket = bucket.clone();
    }
    if let Some(region) = &env_config.region {
        settings.check.region = region.clone();
    }
    if env_config.endpoint.is_some() {
        settings.check.endpoint = env_config.endpoint.clone();
    }
    if let Some(secs) = env_config.timeout.as_deref().and_then(parse_timeout_string) {
        settings.check.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = env_config.retries {
        settings.check.max_retries = retries;
    }
    if let Some(unsigned) = env_config.no_sign_request {
        settings.check.unsigned = unsigned;
    }
    if let Some(output) = &env_config.output {
        settings.report_path = PathBuf::from(output);
    }

    settings
}

/// Apply CLI arguments (highest precedence). Only flags the user passed win.
fn apply_cli_args(mut settings: RunSettings, args: &Args) -> RunSettings {
    if let Some(concurrency) = args.concurrency {
        settings.check.concurrency = concurrency;
    }
    if let Some(bucket) = &args.bucket {
        settings.check.bucket = bucket.clone();
    }
    if let Some(region) = &args.region {
        settings.check.region = region.clone();
    }
    if args.endpoint.is_some() {
        settings.check.endpoint = args.endpoint.clone();
    }
    if let Some(secs) = args.timeout.as_deref().and_then(parse_timeout_string) {
        settings.check.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = args.retries {
        settings.check.max_retries = retries;
    }
    if args.no_sign_request {
        settings.check.unsigned = true;
    }
    if let Some(output) = &args.output {
        settings.report_path = output.clone();
    }

    settings
}
