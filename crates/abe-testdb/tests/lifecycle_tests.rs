//! Server lifecycle, driven by the scripted backend in `common::fake`.
mod common;

use abe_testdb::{Error, ServerDb, ServerState, SqlxBootstrap};
use common::fake::{Behavior, FakeServer, Observed};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn observed(o: &Arc<Mutex<Observed>>) -> Observed {
    let o = o.lock().unwrap();
    Observed {
        dir: o.dir.clone(),
        pid: o.pid,
        steps: o.steps.clone(),
    }
}

fn assert_nothing_left(o: &Observed) {
    let dir = o.dir.as_ref().expect("install never ran");
    assert!(!dir.exists(), "{} was not removed", dir.display());
    if let Some(pid) = o.pid {
        assert!(common::process_gone(pid), "server process {} still alive", pid);
    }
}

#[tokio::test]
async fn test_create_then_delete_leaves_nothing() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::new(Behavior::Healthy);

    let db = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap();
    assert_eq!(db.state(), ServerState::Active);

    let dir = db.working_dir().unwrap().to_path_buf();
    assert!(dir.starts_with(&config.temp_root));
    assert!(dir.join("fake.cnf").exists());
    assert!(db.server_pid().is_some());
    assert_eq!(db.store().query_int("SELECT 1").await.unwrap(), 1);

    db.delete().await.unwrap();

    let seen = observed(&seen);
    assert_eq!(
        seen.steps,
        vec![
            "install",
            "start",
            "bootstrap_account",
            "create_schema",
            "drop_schema",
            "shutdown"
        ]
    );
    assert_nothing_left(&seen);
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_instances_never_share_a_directory() {
    let config = common::scratch_config();
    let (a, _) = FakeServer::new(Behavior::Healthy);
    let (b, _) = FakeServer::new(Behavior::Healthy);

    let a = ServerDb::create(Box::new(a), &config, &SqlxBootstrap)
        .await
        .unwrap();
    let b = ServerDb::create(Box::new(b), &config, &SqlxBootstrap)
        .await
        .unwrap();
    assert_ne!(a.working_dir(), b.working_dir());

    a.delete().await.unwrap();
    b.delete().await.unwrap();
    assert!(common::leftover_dirs(&config.temp_root).is_empty());
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_install_failure_removes_directory() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::new(Behavior::FailInstall);

    let err = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::CommandFailed { .. }), "{:?}", err);

    let seen = observed(&seen);
    assert_eq!(seen.steps, vec!["install"]);
    assert!(seen.pid.is_none());
    assert_nothing_left(&seen);
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_server_exit_during_startup_fails_fast() {
    let config = common::scratch_config()
        .with_ready_timeout(Duration::from_secs(30), Duration::from_millis(20));
    let (server, seen) = FakeServer::new(Behavior::CrashOnStart);

    let started = std::time::Instant::now();
    let err = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap_err();
    match err {
        Error::ServerExited { status } => assert!(status.contains('7'), "{}", status),
        other => panic!("Expected ServerExited, got {:?}", other),
    }
    assert!(started.elapsed() < Duration::from_secs(10));

    assert_nothing_left(&observed(&seen));
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_readiness_timeout_kills_server() {
    let config = common::scratch_config()
        .with_ready_timeout(Duration::from_millis(300), Duration::from_millis(20));
    let (server, seen) = FakeServer::new(Behavior::NeverReady);

    let err = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap_err();
    match err {
        Error::ServerNotReady {
            timeout,
            last_error,
        } => {
            assert_eq!(timeout, Duration::from_millis(300));
            assert!(last_error.contains("not listening yet"));
        }
        other => panic!("Expected ServerNotReady, got {:?}", other),
    }

    let seen = observed(&seen);
    assert!(seen.pid.is_some());
    assert!(!seen.steps.contains(&"shutdown"));
    assert_nothing_left(&seen);
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_account_failure_stops_server() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::new(Behavior::FailAccount);

    let err = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap_err();
    // The failing step's error, not a cleanup error
    match err {
        Error::CommandFailed { command, .. } => assert_eq!(command, "CREATE USER"),
        other => panic!("Expected CommandFailed, got {:?}", other),
    }

    let seen = observed(&seen);
    assert_eq!(
        seen.steps,
        vec!["install", "start", "bootstrap_account", "shutdown"]
    );
    assert_nothing_left(&seen);
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_schema_failure_stops_server_without_dropping() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::new(Behavior::FailSchema);

    let err = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap_err();
    match err {
        Error::CommandFailed { command, .. } => assert_eq!(command, "CREATE DATABASE"),
        other => panic!("Expected CommandFailed, got {:?}", other),
    }

    let seen = observed(&seen);
    assert_eq!(
        seen.steps,
        vec![
            "install",
            "start",
            "bootstrap_account",
            "create_schema",
            "shutdown"
        ]
    );
    assert!(!seen.steps.contains(&"drop_schema"));
    assert_nothing_left(&seen);
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_bootstrap_failure_runs_full_teardown() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::with_dbtype(Behavior::Healthy, "no-such-driver");

    let err = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Bootstrap(_)), "{:?}", err);

    let seen = observed(&seen);
    assert_eq!(
        seen.steps,
        vec![
            "install",
            "start",
            "bootstrap_account",
            "create_schema",
            "drop_schema",
            "shutdown"
        ]
    );
    assert_nothing_left(&seen);
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_failed_shutdown_request_still_cleans_up() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::new(Behavior::FailShutdown);

    let db = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap();
    let err = db.delete().await.unwrap_err();

    match err {
        Error::Teardown(failures) => {
            assert_eq!(failures.steps().collect::<Vec<_>>(), vec!["shutdown"]);
        }
        other => panic!("Expected Teardown, got {:?}", other),
    }
    assert_nothing_left(&observed(&seen));
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_server_ignoring_shutdown_is_killed() {
    let config =
        common::scratch_config().with_shutdown_timeout(Duration::from_millis(300));
    let (server, seen) = FakeServer::new(Behavior::IgnoreShutdown);

    let db = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap();
    let err = db.delete().await.unwrap_err();

    match err {
        Error::Teardown(failures) => {
            assert_eq!(failures.steps().collect::<Vec<_>>(), vec!["wait"]);
            assert!(matches!(
                failures.errors().next(),
                Some(Error::ShutdownTimeout { .. })
            ));
        }
        other => panic!("Expected Teardown, got {:?}", other),
    }
    assert_nothing_left(&observed(&seen));
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}

#[tokio::test]
async fn test_directory_removal_failure_is_reported() {
    let config = common::scratch_config();
    let (server, seen) = FakeServer::new(Behavior::Healthy);

    let db = ServerDb::create(Box::new(server), &config, &SqlxBootstrap)
        .await
        .unwrap();
    let pid = db.server_pid().unwrap();

    // Pull the directory out from under the instance
    let dir = db.working_dir().unwrap().to_path_buf();
    let moved = config.temp_root.join("moved-away");
    std::fs::rename(&dir, &moved).unwrap();

    let err = db.delete().await.unwrap_err();
    match err {
        Error::Teardown(failures) => {
            // Every step still ran, each failure reported on its own
            assert_eq!(
                failures.steps().collect::<Vec<_>>(),
                vec!["drop_schema", "shutdown", "remove_dir"]
            );
        }
        other => panic!("Expected Teardown, got {:?}", other),
    }

    assert!(common::process_gone(pid));
    assert_eq!(observed(&seen).steps.last(), Some(&"shutdown"));
    std::fs::remove_dir_all(&config.temp_root).unwrap();
}
