//! End-to-end probe scenarios against stub targets.
//!
//! Each scenario spawns a small shell script standing in for the real
//! analyzer and drives the full pipeline around it: watcher attachment,
//! trigger dispatch, deadline wait, validation, and cleanup. The stubs
//! print the same markers the real target does.

#![cfg(unix)]

use serial_test::serial;
use snapcheck::config::{ProbeConfig, Provider};
use snapcheck::session::{Outcome, RunSession};
use snapcheck::supervisor::{Supervisor, sweep_strays_excluding};
use snapcheck::trigger::TriggerMechanism;
use snapcheck::watcher::OutputWatcher;
use std::collections::HashMap;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Trigger mechanism that always reports success without touching the OS.
struct StubTrigger;

impl TriggerMechanism for StubTrigger {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn attempt(&self) -> bool {
        true
    }
}

/// Write an executable stub script carrying `token` in its path so the
/// stray sweep can identify it unambiguously.
fn write_stub(dir: &TempDir, token: &str, body: &str) -> PathBuf {
    let path = dir.path().join(format!("{token}.sh"));
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn stub_config(dir: &TempDir, binary: PathBuf, token: &str) -> ProbeConfig {
    ProbeConfig::new(
        Provider::Openai,
        Duration::from_secs(10),
        dir.path().to_path_buf(),
    )
    .with_binary(binary)
    .with_stray_pattern(token)
    .with_poll_interval(Duration::from_millis(100))
    .with_startup_wait(Duration::from_secs(5))
    .with_grace_period(Duration::from_secs(2))
    .skip_build()
}

#[test]
#[serial]
fn test_full_scenario_passes_with_delayed_analysis_result() {
    let dir = TempDir::new().unwrap();
    let token = "snapcheck_stub_success";
    let binary = write_stub(
        &dir,
        token,
        "echo HOTKEY_MONITORING_STARTED\nsleep 2\necho '💡 Analysis Result: ok'\nsleep 60",
    );
    let config = stub_config(&dir, binary, token);

    let report = RunSession::with_mechanisms(config, vec![Box::new(StubTrigger)]).run();

    assert_eq!(report.outcome, Outcome::Passed, "report: {report:?}");
    assert!(report.signal_observed);
    assert_eq!(report.mechanism_used, Some("stub"));

    // The stub signals ~2s after the trigger; allow generous slack for CI.
    let latency = report.signal_latency_ms.expect("latency recorded");
    assert!((1500..=8000).contains(&latency), "latency: {latency}ms");

    // Cleanup must leave nothing behind.
    assert_eq!(sweep_strays_excluding(token, &[]), 0);
}

#[test]
#[serial]
fn test_instant_exit_reports_process_death_quickly() {
    let dir = TempDir::new().unwrap();
    let token = "snapcheck_stub_instant_exit";
    let binary = write_stub(&dir, token, "exit 0");
    let config = stub_config(&dir, binary, token);

    let start = Instant::now();
    let report = RunSession::with_mechanisms(config, vec![Box::new(StubTrigger)]).run();
    let took = start.elapsed();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.failed_stage, Some("wait"));
    assert!(
        report
            .failure
            .as_deref()
            .unwrap_or_default()
            .contains("exited before signaling"),
        "failure: {:?}",
        report.failure
    );
    // Death short-circuits: nowhere near the 10s deadline.
    assert!(took < Duration::from_secs(8), "took {took:?}");
}

#[test]
#[serial]
fn test_trigger_exhaustion_fails_fast_and_still_cleans_up() {
    struct FailingTrigger;
    impl TriggerMechanism for FailingTrigger {
        fn name(&self) -> &'static str {
            "always-fails"
        }
        fn attempt(&self) -> bool {
            false
        }
    }

    let dir = TempDir::new().unwrap();
    let token = "snapcheck_stub_trigger_fail";
    let binary = write_stub(&dir, token, "echo HOTKEY_MONITORING_STARTED\nsleep 60");
    let config = stub_config(&dir, binary, token);

    let report = RunSession::with_mechanisms(config, vec![Box::new(FailingTrigger)]).run();

    assert_eq!(report.outcome, Outcome::Failed);
    assert_eq!(report.failed_stage, Some("trigger"));
    // The long-sleeping stub must have been reaped by cleanup anyway.
    assert_eq!(sweep_strays_excluding(token, &[]), 0);
}

#[test]
#[serial]
fn test_concurrent_instances_register_then_conflict() {
    let dir = TempDir::new().unwrap();
    let token = "snapcheck_stub_conflict";
    let first_bin = write_stub(
        &dir,
        token,
        "echo 'HOTKEY_REGISTERED: 1'\necho HOTKEY_MONITORING_STARTED\nsleep 60",
    );
    let second_bin = write_stub(
        &dir,
        &format!("{token}_second"),
        "echo 'HOTKEY_ERROR: Hotkey already registered by another process'\nexit 1",
    );

    let env = HashMap::new();
    let mut first = Supervisor::start(&first_bin, &[], dir.path(), &env).unwrap();
    let first_watcher = OutputWatcher::new();
    first_watcher.attach(first.child_mut());

    wait_until(Duration::from_secs(5), || {
        first_watcher
            .transcript_snapshot()
            .iter()
            .any(|l| l.contains("HOTKEY_REGISTERED"))
    });
    assert!(first.is_alive(), "first instance should keep running");

    let mut second = Supervisor::start(&second_bin, &[], dir.path(), &env).unwrap();
    let second_watcher = OutputWatcher::new();
    second_watcher.attach(second.child_mut());

    wait_until(Duration::from_secs(5), || !second.is_alive());
    wait_until(Duration::from_secs(5), || {
        second_watcher
            .transcript_snapshot()
            .iter()
            .any(|l| l.contains("already registered"))
    });
    assert!(
        second
            .exit_status()
            .is_some_and(|status| !status.success()),
        "second instance must fail distinctly"
    );

    first.terminate(Duration::from_secs(2));
    second.terminate(Duration::from_secs(2));
    first.sweep_strays(token);

    assert_eq!(sweep_strays_excluding(token, &[]), 0, "strays remain");
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    panic!("condition not met within {timeout:?}");
}
