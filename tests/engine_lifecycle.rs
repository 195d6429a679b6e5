//! Engine start/stop sequencing over mock subsystems.

use std::sync::Arc;
use std::time::Duration;

use tradebot_engine::config::Config;
use tradebot_engine::lifecycle::{EngineState, Registry, SubsystemState};
use tradebot_engine::{Engine, EngineError, ErrorKind, Settings, Subsystem, WorkTracker};

mod common;
use common::{dependent_entry, failing_entry, mock_entry, MemoryStore, Mock, MockOptions};

fn engine(registry: Registry, settings: Settings) -> (Engine, Arc<MemoryStore>) {
    let store = MemoryStore::new(Config::default());
    let engine = Engine::with_registry(settings, store.clone(), registry).unwrap();
    (engine, store)
}

#[tokio::test]
async fn test_full_cycle_quiesces_and_persists() {
    let registry = Registry::new(vec![
        mock_entry("a", MockOptions::default()),
        mock_entry(
            "b",
            MockOptions {
                captures: Some("bc1-captured".into()),
                ..MockOptions::default()
            },
        ),
    ])
    .unwrap();
    let (engine, store) = engine(registry, Settings::default());

    engine.start().await.unwrap();
    assert_eq!(engine.state(), EngineState::Up);
    assert_eq!(engine.tracker().active(), 2);
    assert!(engine.statuses().iter().all(|s| s.running));

    engine.stop().await;

    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.tracker().active(), 0);
    assert!(engine.statuses().iter().all(|s| !s.running));
    assert_eq!(store.saves(), 1);
    let saved = store.last_saved().unwrap();
    assert_eq!(saved.portfolio.addresses[0].address, "bc1-captured");
    assert_eq!(engine.config().portfolio.addresses.len(), 1);
}

#[tokio::test]
async fn test_disabled_dependency_leaves_dependent_unconstructed() {
    let registry = Registry::new(vec![
        mock_entry("a", MockOptions::default()).enabled(false),
        dependent_entry("b", "a"),
        mock_entry("c", MockOptions::default()),
    ])
    .unwrap();
    let (engine, _store) = engine(registry, Settings::default());

    engine.start().await.unwrap();

    let b = engine.subsystem("b").unwrap();
    assert!(!b.is_configured());
    assert!(!b.is_running());
    assert_eq!(b.state(), SubsystemState::Unconfigured);
    assert_eq!(b.start().await.unwrap_err().kind(), ErrorKind::NilSubsystem);
    assert!(engine.subsystem("c").unwrap().is_running());

    engine.stop().await;
}

#[tokio::test]
async fn test_soft_start_failure_is_degraded_mode() {
    let registry = Registry::new(vec![
        mock_entry(
            "flaky",
            MockOptions {
                fail_start: true,
                ..MockOptions::default()
            },
        ),
        mock_entry("steady", MockOptions::default()),
    ])
    .unwrap();
    let (engine, _store) = engine(registry, Settings::default());

    engine.start().await.unwrap();
    let flaky = engine.subsystem_as::<Mock>("flaky").unwrap();
    assert!(!flaky.is_running());
    assert_eq!(flaky.allocations(), 0);
    assert!(engine.subsystem("steady").unwrap().is_running());
    engine.stop().await;
}

#[tokio::test]
async fn test_required_setup_failure_rolls_back() {
    let registry = Registry::new(vec![
        mock_entry("early", MockOptions::default()),
        failing_entry("core").required(true),
        mock_entry("late", MockOptions::default()),
    ])
    .unwrap();
    let (engine, store) = engine(registry, Settings::default());

    let err = engine.start().await.unwrap_err();
    match err {
        EngineError::Fatal { subsystem, source } => {
            assert_eq!(subsystem, "core");
            assert_eq!(source.kind(), ErrorKind::InvalidConfig);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(engine.state(), EngineState::Idle);
    assert_eq!(engine.tracker().active(), 0);
    assert!(!engine.subsystem("early").unwrap().is_running());
    assert!(engine.subsystem("late").is_none());
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_engine_restarts_with_fresh_subsystems() {
    let registry = Registry::new(vec![mock_entry("a", MockOptions::default())]).unwrap();
    let (engine, store) = engine(registry, Settings::default());

    engine.start().await.unwrap();
    let first = engine.subsystem_as::<Mock>("a").unwrap();
    engine.stop().await;

    engine.start().await.unwrap();
    let second = engine.subsystem_as::<Mock>("a").unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(second.is_running());
    assert!(!first.is_running());
    engine.stop().await;

    assert_eq!(store.saves(), 2);
}

#[tokio::test]
async fn test_stuck_stop_is_bounded() {
    let registry = Registry::new(vec![
        mock_entry(
            "stuck",
            MockOptions {
                stop_delay: Some(Duration::from_secs(60)),
                ..MockOptions::default()
            },
        ),
        mock_entry("fine", MockOptions::default()),
    ])
    .unwrap();
    let settings = Settings {
        stop_timeout: Some(Duration::from_millis(50)),
        ..Settings::default()
    };
    let (engine, store) = engine(registry, settings);

    engine.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), engine.stop())
        .await
        .expect("stop should be bounded");

    assert_eq!(engine.state(), EngineState::Idle);
    assert!(!engine.subsystem("fine").unwrap().is_running());
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_dry_run_and_datadir_skip_save() {
    for settings in [
        Settings {
            dry_run: true,
            ..Settings::default()
        },
        Settings {
            data_dir: Some("/tmp/tradebot-alt".into()),
            ..Settings::default()
        },
    ] {
        let registry = Registry::new(vec![mock_entry("a", MockOptions::default())]).unwrap();
        let (engine, store) = engine(registry, settings);
        engine.start().await.unwrap();
        engine.stop().await;
        assert_eq!(store.saves(), 0);
    }
}

#[tokio::test]
async fn test_concurrent_starts_allocate_once() {
    let tracker = WorkTracker::new();
    let mock = Mock::new("racy", &tracker, MockOptions::default());

    let attempts: Vec<_> = (0..16)
        .map(|_| {
            let mock = Arc::clone(&mock);
            tokio::spawn(async move { mock.start().await })
        })
        .collect();

    let mut wins = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(()) => wins += 1,
            Err(e) => assert_eq!(e.kind(), ErrorKind::AlreadyStarted),
        }
    }

    assert_eq!(wins, 1);
    assert_eq!(mock.allocations(), 1);
    assert_eq!(tracker.active(), 1);
    mock.stop().await.unwrap();
    assert_eq!(mock.stop().await.unwrap_err().kind(), ErrorKind::NotStarted);
    assert_eq!(tracker.active(), 0);
}

#[tokio::test]
async fn test_concurrent_engine_starts_have_one_winner() {
    let registry = Registry::new(vec![mock_entry("a", MockOptions::default())]).unwrap();
    let (engine, _store) = engine(registry, Settings::default());
    let engine = Arc::new(engine);

    let (left, right) = tokio::join!(engine.start(), engine.start());
    assert!(left.is_ok() ^ right.is_ok());
    let rejected = left.err().or(right.err()).unwrap();
    assert!(matches!(rejected, EngineError::InvalidState { operation: "start", .. }));

    engine.stop().await;
    engine.stop().await;
    assert_eq!(engine.state(), EngineState::Idle);
}
