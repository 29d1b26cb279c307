//! Result aggregation and report output.
//!
//! [`ResultSet`] is the one piece of state shared by every concurrently running
//! check. It is owned by a single run and finalized once, after the dispatcher
//! has waited for all checks.

use crate::error::KeyCheckError;
use crate::types::{CheckOutcome, ReportEntry};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Deduplicated, concurrency-safe collection of report entries.
#[derive(Debug, Default)]
pub struct ResultSet {
    entries: Mutex<BTreeSet<ReportEntry>>,
}

impl ResultSet {
    /// Create an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry. Returns `false` if it was already present.
    pub fn insert(&self, entry: ReportEntry) -> bool {
        self.lock().insert(entry)
    }

    /// Fold a check outcome into the set. Only `Missing` outcomes add an entry.
    pub fn record(&self, outcome: &CheckOutcome) -> bool {
        match outcome.report_entry() {
            Some(entry) => self.insert(entry.clone()),
            None => false,
        }
    }

    /// Number of distinct entries collected so far.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entry has been collected.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Move all entries out, sorted by key.
    ///
    /// Must only be called once every check feeding this set has completed.
    pub fn take_entries(&self) -> Vec<ReportEntry> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    // A panic while holding the lock cannot leave a BTreeSet half-inserted in a
    // way that matters here, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, BTreeSet<ReportEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Render entries as report text: one line per entry, newline terminated.
pub fn render_report(entries: &[ReportEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&entry.to_string());
        out.push('\n');
    }
    out
}

/// Write the report file, replacing any previous content.
///
/// An empty entry list produces an empty file.
pub async fn write_report<P: AsRef<Path>>(
    path: P,
    entries: &[ReportEntry],
) -> Result<(), KeyCheckError> {
    let path = path.as_ref();
    tokio::fs::write(path, render_report(entries))
        .await
        .map_err(|e| {
            KeyCheckError::file_error(
                path.to_string_lossy(),
                format!("Failed to write report: {}", e),
            )
        })?;

    tracing::debug!(path = %path.display(), lines = entries.len(), "report written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_insert_is_idempotent() {
        let set = ResultSet::new();
        assert!(set.insert(ReportEntry::missing("a/b")));
        assert!(!set.insert(ReportEntry::missing("a/b")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_record_ignores_present_and_error() {
        let set = ResultSet::new();
        set.record(&CheckOutcome::Present {
            key: "here".to_string(),
        });
        set.record(&CheckOutcome::Error {
            key: "flaky".to_string(),
            error: KeyCheckError::network("reset"),
        });
        assert!(set.is_empty());

        set.record(&CheckOutcome::missing("gone"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_take_entries_sorted_and_drains() {
        let set = ResultSet::new();
        set.insert(ReportEntry::missing("z"));
        set.insert(ReportEntry::missing("a"));
        set.insert(ReportEntry::missing("m"));

        let keys: Vec<_> = set
            .take_entries()
            .iter()
            .map(|e| e.key().to_string())
            .collect();
        assert_eq!(keys, vec!["a", "m", "z"]);
        assert!(set.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_lose_nothing() {
        let set = Arc::new(ResultSet::new());
        let mut handles = Vec::new();
        for i in 0..500 {
            let set = Arc::clone(&set);
            handles.push(tokio::spawn(async move {
                set.insert(ReportEntry::missing(format!("k/{}", i)));
                // same entry again from another writer
                set.insert(ReportEntry::missing(format!("k/{}", i)));
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(set.len(), 500);
    }

    #[test]
    fn test_render_report() {
        let entries = vec![ReportEntry::missing("c/d.jpg"), ReportEntry::missing("e.png")];
        assert_eq!(
            render_report(&entries),
            "c/d.jpg|c|d.jpg|404\ne.png|e.png|404\n"
        );
        assert_eq!(render_report(&[]), "");
    }

    #[tokio::test]
    async fn test_write_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resulturls");

        write_report(&path, &[ReportEntry::missing("c/d.jpg")])
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "c/d.jpg|c|d.jpg|404\n"
        );

        write_report(&path, &[]).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
