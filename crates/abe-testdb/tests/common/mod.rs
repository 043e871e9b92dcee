#![allow(clippy::await_holding_lock)]
#![allow(dead_code)]
pub mod fake;

use abe_testdb::{BackendSelection, BackendType, Config, Fixture, Selection};
use ctor::dtor;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Runtime shared by every test that touches the module fixture; the stores it hands out
/// are bound to it.
pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to create test runtime")
});

/// Module-lifetime fixture, finalized by [`finalize_fixture`] when the test binary exits.
pub static FIXTURE: Lazy<Mutex<Option<Fixture>>> = Lazy::new(|| Mutex::new(None));

/// Backends the shared fixture is parametrized over.
pub fn fixture_config() -> Config {
    Config::default()
        .with_backends(BackendSelection::explicit("sqlite3 oracle psycopg2"))
        .with_temp_root(scratch_root())
}

/// Short, flat scratch root under the system temp dir; server sockets live two levels
/// below it and must fit `sun_path`.
pub fn scratch_root() -> PathBuf {
    std::env::temp_dir().join(format!(
        "abe-{}",
        &uuid::Uuid::new_v4().simple().to_string()[..8]
    ))
}

/// Config with a private temp root and short timeouts.
pub fn scratch_config() -> Config {
    Config::default()
        .with_temp_root(scratch_root())
        .with_ready_timeout(Duration::from_secs(5), Duration::from_millis(20))
        .with_shutdown_timeout(Duration::from_secs(5))
}

/// True once no process with this pid exists any more.
pub fn process_gone(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        !Path::new(&format!("/proc/{}", pid)).exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = pid;
        true
    }
}

/// Working directories left under a temp root.
pub fn leftover_dirs(root: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(root) {
        Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

/// Whether ABE_TEST_DB names `backend`. The default selection and ABE_TEST never opt a
/// test into a backend that needs an installed toolchain.
pub fn backend_requested(backend: BackendType) -> bool {
    let Ok(list) = std::env::var("ABE_TEST_DB") else {
        return false;
    };
    BackendSelection::explicit(&list)
        .resolve()
        .iter()
        .any(|name| BackendType::select(Some(name.as_str())) == Selection::Supported(backend))
}

/// Run `f` with the given variables set (or removed), restoring their old values after.
pub fn with_env<F: FnOnce()>(vars: &[(&str, Option<&str>)], f: F) {
    let saved: Vec<_> = vars
        .iter()
        .map(|(name, _)| (name.to_string(), std::env::var_os(name)))
        .collect();
    for (name, value) in vars {
        match value {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }

    f();

    for (name, value) in saved {
        match value {
            Some(value) => std::env::set_var(&name, value),
            None => std::env::remove_var(&name),
        }
    }
}

#[macro_export]
macro_rules! skip_unless_backend {
    ($backend:expr) => {
        if !common::backend_requested($backend) {
            eprintln!("Skipping test: {} not named in ABE_TEST_DB", $backend);
            return;
        }
    };
}

#[dtor]
fn finalize_fixture() {
    let mut guard = match FIXTURE.lock() {
        Ok(g) => g,
        Err(e) => e.into_inner(),
    };

    if let Some(fixture) = guard.take() {
        let root = fixture.config().temp_root.clone();
        RUNTIME.block_on(async {
            if let Err(e) = fixture.finalize().await {
                eprintln!("Error during fixture teardown: {}", e);
            }
        });
        let _ = std::fs::remove_dir_all(root);
    }
}
