//! Tests for the daemon manager using shell scripts as stand-in daemons.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal;
use nix::unistd::Pid;
use rstest::{fixture, rstest};
use tempfile::TempDir;

use crate::lifecycle::{DaemonLaunch, DaemonManager, LifecycleError, StopOutcome};

const SETTLE: Duration = Duration::from_millis(200);
const POLL: Duration = Duration::from_millis(50);

#[fixture]
fn scripts() -> TempDir {
    TempDir::new().expect("script dir")
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

fn manager_for(binary: &Path) -> DaemonManager {
    DaemonManager::new(binary)
        .with_settle_time(SETTLE)
        .with_poll_interval(POLL)
}

fn process_exists(pid: u32) -> bool {
    let raw = i32::try_from(pid).expect("pid fits");
    signal::kill(Pid::from_raw(raw), None) != Err(Errno::ESRCH)
}

#[rstest]
fn start_then_stop_is_graceful(scripts: TempDir) {
    let binary = write_script(scripts.path(), "dtnd", "exec sleep 30");
    let mut manager = manager_for(&binary);

    manager.start(&DaemonLaunch::new("n1")).expect("start daemon");
    assert!(manager.is_running());
    let pid = manager.pid().expect("tracked pid");

    let outcome = manager.stop(Duration::from_secs(2)).expect("stop daemon");
    assert_eq!(outcome, StopOutcome::Graceful);
    assert!(!manager.is_running());
    assert!(!process_exists(pid));
}

#[rstest]
fn daemon_receives_launch_flags(scripts: TempDir) {
    let record = scripts.path().join("args");
    let body = format!(
        "printf '%s\\n' \"$@\" > '{}'\nexec sleep 30",
        record.display()
    );
    let binary = write_script(scripts.path(), "dtnd", &body);
    let mut manager = manager_for(&binary);

    manager.start(&DaemonLaunch::new("n4")).expect("start daemon");
    manager.stop(Duration::from_secs(2)).expect("stop daemon");

    let recorded = fs::read_to_string(record).expect("read recorded args");
    let arguments: Vec<&str> = recorded.lines().collect();
    assert_eq!(
        arguments,
        ["-n", "n4", "-i", "1s", "-b", "-r", "epidemic", "-C", "mtcp"]
    );
}

#[rstest]
fn second_start_is_refused(scripts: TempDir) {
    let binary = write_script(scripts.path(), "dtnd", "exec sleep 30");
    let mut manager = manager_for(&binary);
    manager.start(&DaemonLaunch::new("n1")).expect("start daemon");
    let pid = manager.pid();

    let result = manager.start(&DaemonLaunch::new("n1"));
    assert!(matches!(result, Err(LifecycleError::AlreadyRunning { .. })));
    assert_eq!(manager.pid(), pid, "original daemon stays tracked");

    manager.stop(Duration::from_secs(2)).expect("stop daemon");
}

#[rstest]
fn early_exit_reports_stderr(scripts: TempDir) {
    let binary = write_script(
        scripts.path(),
        "dtnd",
        "echo 'error: address already in use' >&2\nexit 3",
    );
    let mut manager = manager_for(&binary);

    let result = manager.start(&DaemonLaunch::new("n1"));
    let Err(LifecycleError::StartupFailed {
        exit_status,
        stderr,
    }) = result
    else {
        panic!("expected StartupFailed, got {result:?}");
    };
    assert_eq!(exit_status, Some(3));
    assert!(stderr.contains("address already in use"), "stderr was {stderr:?}");
    assert!(!manager.is_running());
}

#[rstest]
fn missing_binary_fails_to_launch(scripts: TempDir) {
    let mut manager = manager_for(&scripts.path().join("absent"));
    let result = manager.start(&DaemonLaunch::new("n1"));
    assert!(matches!(result, Err(LifecycleError::LaunchDaemon { .. })));
    assert!(!manager.is_running());
}

#[rstest]
fn stubborn_daemon_is_killed(scripts: TempDir) {
    let binary = write_script(
        scripts.path(),
        "dtnd",
        "trap '' TERM\nwhile true; do sleep 1; done",
    );
    let mut manager = manager_for(&binary);
    manager.start(&DaemonLaunch::new("n1")).expect("start daemon");

    let started = Instant::now();
    let outcome = manager
        .stop(Duration::from_millis(300))
        .expect("stop daemon");
    assert_eq!(outcome, StopOutcome::Forced);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!manager.is_running());
}

#[test]
fn stop_without_daemon_is_refused() {
    let mut manager = DaemonManager::new("dtnd");
    let result = manager.stop(Duration::from_secs(1));
    assert!(matches!(result, Err(LifecycleError::NotRunning)));
}

#[rstest]
fn dropping_the_manager_kills_the_daemon(scripts: TempDir) {
    let binary = write_script(scripts.path(), "dtnd", "exec sleep 30");
    let mut manager = manager_for(&binary);
    manager.start(&DaemonLaunch::new("n1")).expect("start daemon");
    let pid = manager.pid().expect("tracked pid");

    drop(manager);
    assert!(!process_exists(pid));
}
