//! Terminal display logic for the key-check CLI.
//!
//! Headers and the end-of-run summary go to stdout. Log lines go to stderr
//! through `tracing`, so the two never interleave in a pipe.

use console::style;
use key_check_lib::{CheckConfig, RunSummary};
use std::path::Path;
use std::time::Duration;

// ── Header ───────────────────────────────────────────────────────────────────

/// Print a styled header at the start of a run.
pub fn print_header(key_count: usize, config: &CheckConfig) {
    println!(
        "{} {} {}",
        style("key-check").bold(),
        style(format!("v{}", env!("CARGO_PKG_VERSION"))).dim(),
        style(format!(
            "- Checking {} key{}",
            key_count,
            if key_count == 1 { "" } else { "s" }
        ))
        .dim(),
    );

    let mut meta_parts = vec![
        format!("Bucket: {}", config.bucket),
        format!("Region: {}", config.region),
    ];
    if let Some(endpoint) = &config.endpoint {
        meta_parts.push(format!("Endpoint: {}", endpoint));
    }
    meta_parts.push(format!("Concurrency: {}", config.concurrency));
    if config.unsigned {
        meta_parts.push("Unsigned requests".to_string());
    }

    println!("{}", style(meta_parts.join(" | ")).dim());
    println!();
}

// ── Summary ──────────────────────────────────────────────────────────────────

/// Print the final counts and where the report was written.
pub fn print_summary(summary: &RunSummary, report_path: &Path, duration: Duration) {
    println!(
        "  {}",
        style("────────────────────────────────────────────────────").dim()
    );
    println!(
        "  {} key{} in {:.1}s  {}  {}  {}  {}  {}  {}",
        style(summary.total).bold(),
        if summary.total == 1 { "" } else { "s" },
        duration.as_secs_f64(),
        style("|").dim(),
        style(format!("{} present", summary.present)).green(),
        style("|").dim(),
        style(format!("{} missing", summary.missing)).red(),
        style("|").dim(),
        style(format!("{} errored", summary.errored)).yellow(),
    );
    println!(
        "  {} {}",
        style("Report:").dim(),
        style(report_path.display()).cyan()
    );
    if summary.errored > 0 {
        println!(
            "  {}",
            style("Some keys could not be checked; see the error log lines above.").yellow()
        );
    }
}
