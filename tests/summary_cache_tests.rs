//! Summary cache integration tests
//!
//! Exercises the persona store, fingerprinting, cache store, lock and
//! orchestrator together through the public library API.

mod common;

use std::collections::HashSet;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{TestEnvironment, CINDY, EEVA};
use persona_coordinator::backend::{MockChatModel, MockConfig};
use persona_coordinator::persona::PersonaStore;
use persona_coordinator::summary::{fingerprint, RegenerationLock, SummaryOptions, SummaryStore};
use persona_coordinator::Error;

const POLL: Duration = Duration::from_millis(20);

fn slow_model(text: &str, latency_ms: u64) -> Arc<MockChatModel> {
    Arc::new(MockChatModel::with_config(MockConfig {
        response: Some(text.to_string()),
        latency_ms,
        ..Default::default()
    }))
}

// ─────────────────────────────────────────────────────────────────
// Persona Store
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_listing_is_sorted_by_file_name() {
    let env = TestEnvironment::with_standard_personas();
    let store = PersonaStore::new(env.persona_dir());

    let keys: Vec<String> = store.list().iter().map(|p| p.key.clone()).collect();
    assert_eq!(keys, vec!["Cindy", "Eeva"]);
    assert_eq!(store.resolve(None).unwrap().key, "Cindy");
}

#[test]
fn test_malformed_file_is_skipped() {
    let env = TestEnvironment::with_standard_personas();
    env.add_persona("broken", "{ not json");

    let store = PersonaStore::new(env.persona_dir());
    assert_eq!(store.list().len(), 2);
}

// ─────────────────────────────────────────────────────────────────
// Fingerprint
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_fingerprint_ignores_field_order_and_emoji() {
    let env = TestEnvironment::new();
    env.add_persona("a", r#"{"key":"Eeva","style":"nerdy","lore":["loves graphs"],"emoji":"📈"}"#);
    env.add_persona("b", r#"{"emoji":"🧮","lore":["loves graphs"],"style":"nerdy","key":"Eeva"}"#);
    env.add_persona("c", r#"{"key":"Eeva","style":"nerdy","lore":["loves trees"]}"#);

    let a = fingerprint(&env.record("a"));
    assert_eq!(a, fingerprint(&env.record("a")));
    assert_eq!(a, fingerprint(&env.record("b")));
    assert_ne!(a, fingerprint(&env.record("c")));
}

// ─────────────────────────────────────────────────────────────────
// Get Or Build
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fresh_entry_is_served_without_generation() {
    let env = TestEnvironment::with_standard_personas();
    env.seed_summary("eeva", "Eeva draws graphs.");
    let model = Arc::new(MockChatModel::new());
    let svc = env.service(model.clone(), "proc-a");

    let entry = svc.get_or_build(Some("Eeva")).await.unwrap();
    assert_eq!(entry.summary, "Eeva draws graphs.");
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn test_changed_definition_regenerates_once() {
    let env = TestEnvironment::with_standard_personas();
    let old = env.seed_summary("eeva", "old summary");
    env.add_persona("eeva", r#"{"key":"Eeva","style":"nerdy","lore":["loves graphs","and trees"]}"#);

    let model = Arc::new(MockChatModel::fixed("new summary"));
    let svc = env.service(model.clone(), "proc-a");

    let entry = svc.get_or_build(Some("Eeva")).await.unwrap();
    assert_eq!(model.call_count(), 1);
    assert_eq!(entry.summary, "new summary");
    assert_ne!(entry.hash, old.hash);
    assert_eq!(entry.hash, fingerprint(&env.record("eeva")));

    let stored = SummaryStore::new(env.cache_dir()).load("Eeva").unwrap();
    assert_eq!(stored, entry);
}

#[tokio::test]
async fn test_cold_cache_generates_and_persists_trimmed_text() {
    let env = TestEnvironment::with_standard_personas();
    let model = Arc::new(MockChatModel::fixed("  Eeva is a nerdy analyst.\n"));
    let svc = env.service(model.clone(), "proc-a");

    let entry = svc.get_or_build(Some("Eeva")).await.unwrap();
    assert_eq!(model.call_count(), 1);
    assert_eq!(entry.key, "Eeva");
    assert_eq!(entry.summary, "Eeva is a nerdy analyst.");
    assert_eq!(entry.hash, fingerprint(&env.record("eeva")));
    assert!(!env.lock_path().exists());
}

#[tokio::test]
async fn test_unknown_selector_falls_back_to_first_persona() {
    let env = TestEnvironment::with_standard_personas();
    let svc = env.service(Arc::new(MockChatModel::fixed("s")), "proc-a");

    let entry = svc.get_or_build(Some("Nobody")).await.unwrap();
    assert_eq!(entry.key, "Cindy");
}

#[tokio::test]
async fn test_empty_directory_is_no_personas() {
    let env = TestEnvironment::new();
    let svc = env.service(Arc::new(MockChatModel::new()), "proc-a");

    let err = svc.get_or_build(None).await.unwrap_err();
    assert!(matches!(err, Error::NoPersonas { .. }));
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn test_generation_failure_leaves_no_entry() {
    let env = TestEnvironment::with_standard_personas();
    let svc = env.service(Arc::new(MockChatModel::failing()), "proc-a");

    let err = svc.get_or_build(Some("Eeva")).await.unwrap_err();
    assert!(matches!(err, Error::Generation { .. }));
    assert!(!SummaryStore::new(env.cache_dir()).path_for("Eeva").exists());
    assert!(!env.lock_path().exists());
}

#[tokio::test]
async fn test_blank_generation_is_an_error() {
    let env = TestEnvironment::with_standard_personas();
    let svc = env.service(Arc::new(MockChatModel::fixed("   \n")), "proc-a");

    let err = svc.get_or_build(Some("Eeva")).await.unwrap_err();
    assert!(matches!(err, Error::Generation { .. }));
    assert!(SummaryStore::new(env.cache_dir()).load("Eeva").is_none());
}

#[tokio::test]
async fn test_corrupt_cache_entry_is_rebuilt() {
    let env = TestEnvironment::with_standard_personas();
    let cache = SummaryStore::new(env.cache_dir());
    fs::create_dir_all(env.cache_dir()).unwrap();
    fs::write(cache.path_for("Eeva"), "{ half written").unwrap();

    let model = Arc::new(MockChatModel::fixed("rebuilt"));
    let svc = env.service(model.clone(), "proc-a");

    assert_eq!(svc.get_or_build(Some("Eeva")).await.unwrap().summary, "rebuilt");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test]
async fn test_foreign_lock_without_cache_is_busy() {
    let env = TestEnvironment::with_standard_personas();
    let other = env.lock("other-process");
    assert!(other.acquire(Duration::ZERO, POLL).await);

    let model = Arc::new(MockChatModel::fixed("never"));
    let svc = env.service(model.clone(), "proc-a").with_options(SummaryOptions {
        lock_timeout: Duration::from_millis(200),
        poll_interval: POLL,
    });

    let err = svc.get_or_build(Some("Eeva")).await.unwrap_err();
    assert!(matches!(err, Error::Busy { .. }));
    assert!(err.is_retryable());
    assert_eq!(err.http_status(), 503);
    assert_eq!(model.call_count(), 0);
    assert_eq!(other.holder().as_deref(), Some("other-process"));
}

#[tokio::test]
async fn test_foreign_lock_with_fresh_cache_is_not_busy() {
    let env = TestEnvironment::with_standard_personas();
    env.seed_summary("eeva", "cached");
    assert!(env.lock("other-process").acquire(Duration::ZERO, POLL).await);

    let svc = env.service(Arc::new(MockChatModel::new()), "proc-a").with_options(SummaryOptions {
        lock_timeout: Duration::from_millis(100),
        poll_interval: POLL,
    });
    assert_eq!(svc.get_or_build(Some("Eeva")).await.unwrap().summary, "cached");
}

#[tokio::test]
async fn test_waiter_picks_up_entry_built_elsewhere() {
    let env = TestEnvironment::with_standard_personas();
    let other = env.lock("other-process");
    assert!(other.acquire(Duration::ZERO, POLL).await);

    let model = Arc::new(MockChatModel::fixed("from this process"));
    let svc = env.service(model.clone(), "proc-a").with_options(SummaryOptions {
        lock_timeout: Duration::from_secs(5),
        poll_interval: POLL,
    });

    let record = env.record("eeva");
    let cache_dir = env.cache_dir();
    let finisher = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        SummaryStore::new(cache_dir)
            .save(&record.key, &fingerprint(&record), "from the other process")
            .unwrap();
        other.release();
    });

    let entry = svc.get_or_build(Some("Eeva")).await.unwrap();
    finisher.await.unwrap();
    assert_eq!(entry.summary, "from the other process");
    assert_eq!(model.call_count(), 0);
}

// ─────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_in_one_process_generate_once() {
    let env = TestEnvironment::with_standard_personas();
    let model = slow_model("shared summary", 100);
    let svc = Arc::new(env.service(model.clone(), "proc-a"));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.get_or_build(Some("Eeva")).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().summary, "shared summary");
    }
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_two_lock_owners_generate_once() {
    let env = TestEnvironment::with_standard_personas();
    let model = slow_model("one build", 150);
    let first = Arc::new(env.service(model.clone(), "proc-a"));
    let second = Arc::new(env.service(model.clone(), "proc-b"));

    let a = tokio::spawn({
        let svc = Arc::clone(&first);
        async move { svc.get_or_build(Some("Eeva")).await }
    });
    let b = tokio::spawn({
        let svc = Arc::clone(&second);
        async move { svc.get_or_build(Some("Eeva")).await }
    });

    assert_eq!(a.await.unwrap().unwrap().summary, "one build");
    assert_eq!(b.await.unwrap().unwrap().summary, "one build");
    assert_eq!(model.call_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lock_is_mutually_exclusive() {
    let env = TestEnvironment::new();
    let holders = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicBool::new(false));

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let lock = env.lock(&format!("owner-{}", i));
            let holders = Arc::clone(&holders);
            let overlap = Arc::clone(&overlap);
            tokio::spawn(async move {
                if !lock.acquire(Duration::from_secs(10), Duration::from_millis(10)).await {
                    return false;
                }
                if holders.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.store(true, Ordering::SeqCst);
                }
                assert_eq!(lock.holder().as_deref(), Some(lock.owner()));
                tokio::time::sleep(Duration::from_millis(30)).await;
                holders.fetch_sub(1, Ordering::SeqCst);
                assert!(lock.release_if_owned());
                true
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert!(!overlap.load(Ordering::SeqCst));
    assert!(!env.lock_path().exists());
}

#[tokio::test]
async fn test_acquire_gives_up_within_bound() {
    let env = TestEnvironment::new();
    assert!(env.lock("forever").acquire(Duration::ZERO, POLL).await);
    let waiter = env.lock("waiter");

    let started = Instant::now();
    let acquired = waiter
        .acquire(Duration::from_secs(1), Duration::from_millis(250))
        .await;
    let waited = started.elapsed();

    assert!(!acquired);
    assert!(waited >= Duration::from_secs(1));
    assert!(waited < Duration::from_millis(1600), "waited {:?}", waited);
}

#[test]
fn test_concurrent_save_and_load_never_tear() {
    let env = TestEnvironment::new();
    let cache = SummaryStore::new(env.cache_dir());
    let long_a = "a".repeat(64 * 1024);
    let long_b = "b".repeat(64 * 1024);
    cache.save("Eeva", "h", &long_a).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let writer = std::thread::spawn({
        let cache = SummaryStore::new(env.cache_dir());
        let done = Arc::clone(&done);
        let (a, b) = (long_a.clone(), long_b.clone());
        move || {
            for i in 0..50 {
                let text = if i % 2 == 0 { &b } else { &a };
                cache.save("Eeva", "h", text).unwrap();
            }
            done.store(true, Ordering::SeqCst);
        }
    });

    while !done.load(Ordering::SeqCst) {
        let entry = cache.read_entry("Eeva").unwrap().unwrap();
        assert!(entry.summary == long_a || entry.summary == long_b);
    }
    writer.join().unwrap();
}

// ─────────────────────────────────────────────────────────────────
// Batch
// ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_ensure_all_builds_skips_and_sweeps() {
    let env = TestEnvironment::with_standard_personas();
    env.seed_summary("eeva", "already fresh");

    let cache = SummaryStore::new(env.cache_dir());
    cache.save("Ghost", "h", "orphan").unwrap();

    let model = Arc::new(MockChatModel::fixed("built"));
    let svc = env.service(model.clone(), "proc-a");

    let report = svc.ensure_all(Duration::from_secs(5), POLL).await.unwrap();
    assert!(report.ran);
    assert_eq!(report.counts(), (1, 1));
    assert_eq!(report.removed, 1);
    assert!(report.failed.is_empty());
    assert_eq!(model.call_count(), 1);

    assert!(cache.load("Ghost").is_none());
    assert_eq!(cache.load("Cindy").unwrap().summary, "built");
    assert!(!env.lock_path().exists());

    let again = svc.ensure_all(Duration::from_secs(5), POLL).await.unwrap();
    assert_eq!(again.counts(), (0, 2));
}

#[tokio::test]
async fn test_ensure_all_keeps_look_alike_keys_apart() {
    let env = TestEnvironment::new();
    env.add_persona("dotted", r#"{"key":"A.B","lore":["dot"]}"#);
    env.add_persona("underscored", r#"{"key":"A_B","lore":["underscore"]}"#);

    let model = Arc::new(MockChatModel::fixed("built"));
    let svc = env.service(model.clone(), "proc-a");

    let first = svc.ensure_all(Duration::from_secs(5), POLL).await.unwrap();
    assert_eq!(first.counts(), (2, 0));

    let second = svc.ensure_all(Duration::from_secs(5), POLL).await.unwrap();
    assert_eq!(second.counts(), (0, 2));
    assert_eq!(second.removed, 0);
    assert_eq!(model.call_count(), 2);
}

#[tokio::test]
async fn test_ensure_all_under_foreign_lock_does_nothing() {
    let env = TestEnvironment::with_standard_personas();
    assert!(env.lock("other-process").acquire(Duration::ZERO, POLL).await);

    let model = Arc::new(MockChatModel::fixed("built"));
    let svc = env.service(model.clone(), "proc-a");

    let started = Instant::now();
    let report = svc
        .ensure_all(Duration::from_millis(200), POLL)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!report.ran);
    assert_eq!(report.counts(), (0, 0));
    assert_eq!(model.call_count(), 0);
    assert!(env.lock_path().exists());
}

#[test]
fn test_sweep_keeps_lock_marker() {
    let env = TestEnvironment::new();
    let cache = SummaryStore::new(env.cache_dir());
    for key in ["A", "B", "C"] {
        cache.save(key, "h", "s").unwrap();
    }
    fs::write(env.lock_path(), "123").unwrap();

    let live: HashSet<String> = ["A", "C"].iter().map(|s| s.to_string()).collect();
    assert_eq!(cache.sweep_orphans(&live).unwrap(), 1);

    assert!(cache.load("A").is_some());
    assert!(cache.load("B").is_none());
    assert!(cache.load("C").is_some());
    assert!(env.lock_path().exists());
}

#[test]
fn test_standard_fixtures_parse() {
    let env = TestEnvironment::new();
    env.add_persona("eeva", EEVA);
    env.add_persona("cindy", CINDY);
    assert_eq!(env.record("eeva").style.as_deref(), Some("nerdy"));
    assert_eq!(env.record("cindy").lore, vec!["builds things".to_string()]);
}
