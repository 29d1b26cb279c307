// key-check-lib/tests/integration.rs

//! Integration tests for key-check-lib runs against an in-memory object store

use async_trait::async_trait;
use key_check_lib::{
    parse_keys, render_report, CheckConfig, KeyCheckError, KeyChecker, ListedObject,
    ObjectLister, OutcomeKind,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

/// In-memory bucket that records how it is called.
#[derive(Default)]
struct FakeStore {
    objects: BTreeSet<String>,
    failing: HashMap<String, KeyCheckError>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl FakeStore {
    fn with_objects(objects: &[&str]) -> Self {
        Self {
            objects: objects.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn calls_for(&self, key: &str) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ObjectLister for FakeStore {
    async fn list_by_prefix(
        &self,
        _bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ListedObject>, KeyCheckError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(prefix.to_string())
            .or_default() += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(error) = self.failing.get(prefix) {
            return Err(error.clone());
        }

        Ok(self
            .objects
            .range(prefix.to_string()..)
            .take_while(|k| k.starts_with(prefix))
            .map(ListedObject::new)
            .collect())
    }
}

fn checker(store: &Arc<FakeStore>, concurrency: usize) -> KeyChecker {
    let config = CheckConfig::for_bucket("images")
        .with_concurrency(concurrency)
        .with_max_retries(1)
        .with_retry_backoff(Duration::from_millis(1));
    KeyChecker::new(config, store.clone()).unwrap()
}

#[tokio::test]
async fn test_one_present_one_missing() {
    let store = Arc::new(FakeStore::with_objects(&["a/b.jpg"]));
    let keys = parse_keys("a/b.jpg\nc/d.jpg\n");

    let report = assert_ok!(checker(&store, 4000).check_keys(keys).await);

    assert_eq!(render_report(&report.entries), "c/d.jpg|c|d.jpg|404\n");
    assert_eq!(report.summary.present, 1);
    assert_eq!(report.summary.missing, 1);
    assert_eq!(report.summary.errored, 0);
}

#[tokio::test]
async fn test_empty_input_makes_no_remote_calls() {
    let store = Arc::new(FakeStore::with_objects(&["a/b.jpg"]));

    let report = assert_ok!(checker(&store, 10).check_keys(parse_keys("")).await);

    assert!(report.entries.is_empty());
    assert_eq!(report.summary.total, 0);
    assert_eq!(render_report(&report.entries), "");
    assert_eq!(store.total_calls(), 0);
}

#[tokio::test]
async fn test_each_key_checked_exactly_once() {
    let store = Arc::new(FakeStore::with_objects(&["k/3", "k/7"]));
    let keys: Vec<String> = (0..250).map(|i| format!("k/{}", i)).collect();

    let report = assert_ok!(checker(&store, 16).check_keys(keys.clone()).await);

    assert_eq!(store.total_calls(), 250);
    assert!(keys.iter().all(|k| store.calls_for(k) == 1));
    assert_eq!(report.summary.total, 250);
    assert_eq!(report.summary.present, 2);
    assert_eq!(report.entries.len(), 248);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_respected() {
    let store = Arc::new(FakeStore {
        delay: Duration::from_millis(5),
        ..Default::default()
    });
    let keys: Vec<String> = (0..200).map(|i| format!("img/{}.png", i)).collect();

    let report = assert_ok!(checker(&store, 8).check_keys(keys).await);

    let peak = store.peak.load(Ordering::SeqCst);
    assert!(peak <= 8, "peak in-flight {} exceeded limit", peak);
    assert!(peak > 1, "checks never overlapped");
    assert_eq!(report.entries.len(), 200);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_missing_checks_all_collected() {
    let store = Arc::new(FakeStore {
        delay: Duration::from_millis(1),
        ..Default::default()
    });
    let keys: Vec<String> = (0..1000).map(|i| format!("gone/{}", i)).collect();

    let report = assert_ok!(checker(&store, 64).check_keys(keys).await);

    assert_eq!(report.entries.len(), 1000);
    let distinct: BTreeSet<_> = report.entries.iter().map(|e| e.key().to_string()).collect();
    assert_eq!(distinct.len(), 1000);
    assert_eq!(report.summary.missing, 1000);
}

#[tokio::test]
async fn test_transient_failure_isolated() {
    let mut store = FakeStore::with_objects(&["ok/0", "ok/2", "ok/4", "ok/6", "ok/8"]);
    store
        .failing
        .insert("ok/5".to_string(), KeyCheckError::network("connection reset"));
    let store = Arc::new(store);
    let keys: Vec<String> = (0..10).map(|i| format!("ok/{}", i)).collect();

    let report = assert_ok!(checker(&store, 3).check_keys(keys).await);

    assert_eq!(report.summary.total, 10);
    assert_eq!(report.summary.present, 5);
    assert_eq!(report.summary.missing, 4);
    assert_eq!(report.summary.errored, 1);
    assert_eq!(
        render_report(&report.entries),
        "ok/1|ok|1|404\nok/3|ok|3|404\nok/7|ok|7|404\nok/9|ok|9|404\n"
    );
    // first attempt plus one retry
    assert_eq!(store.calls_for("ok/5"), 2);
}

#[tokio::test]
async fn test_prefix_collision_is_not_a_match() {
    let store = Arc::new(FakeStore::with_objects(&["photos/cat.jpg.orig", "photos/cat.jpg2"]));

    let outcome = checker(&store, 1).check_key("photos/cat.jpg").await;

    assert_eq!(outcome.kind(), OutcomeKind::Missing);
}

#[tokio::test]
async fn test_present_keys_leave_no_blank_lines() {
    let store = Arc::new(FakeStore::with_objects(&["a", "b", "c"]));

    let report = assert_ok!(checker(&store, 2).check_keys(parse_keys("a\nb\nc\n")).await);

    assert!(report.entries.is_empty());
    assert_eq!(render_report(&report.entries), "");
}

#[tokio::test]
async fn test_probe_defaults_to_ok() {
    let store = Arc::new(FakeStore::default());
    assert_ok!(checker(&store, 1).probe().await);
}
