//! Target process ownership: spawn, liveness, two-phase shutdown, and the
//! best-effort sweep of stray processes left over from earlier runs.
//!
//! The supervisor is the only code path allowed to send termination
//! signals. Shutdown is always TERM → grace → KILL; a one-shot kill risks
//! leaving the target's OS-level event hook in an inconsistent state.

use std::collections::HashMap;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use sysinfo::{ProcessesToUpdate, System};
use tracing::{debug, info, warn};

/// Cadence for liveness polls inside the grace window.
const GRACE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Owns the target's process handle for the lifetime of a run session.
pub struct Supervisor {
    child: Child,
    exit_status: Option<ExitStatus>,
}

impl Supervisor {
    /// Spawn the target with both output pipes ready for the watcher.
    pub fn start(
        binary: &Path,
        args: &[&str],
        working_dir: &Path,
        env: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (k, v) in env {
            cmd.env(k, v);
        }

        let child = cmd.spawn()?;
        info!(
            "Target started: {} {} (pid={})",
            binary.display(),
            args.join(" "),
            child.id()
        );
        Ok(Self {
            child,
            exit_status: None,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Hand the output pipes to a watcher. Each pipe can be taken once.
    pub fn child_mut(&mut self) -> &mut Child {
        &mut self.child
    }

    /// Non-blocking liveness probe. Never errors; an unreadable state is
    /// treated as dead.
    pub fn is_alive(&mut self) -> bool {
        if self.exit_status.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                self.exit_status = Some(status);
                false
            }
            Err(e) => {
                debug!("try_wait failed for pid {}: {e}", self.child.id());
                false
            }
        }
    }

    /// Exit status, if the target has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Two-phase shutdown: TERM, wait out `grace`, then KILL and reap.
    ///
    /// Idempotent — calling this on an already-dead target is a no-op.
    pub fn terminate(&mut self, grace: Duration) {
        if !self.is_alive() {
            debug!("terminate: target already exited");
            return;
        }

        let pid = self.child.id();
        info!("Sending TERM to target (pid={pid}, grace={grace:?})");
        send_term(pid);

        let grace_end = Instant::now() + grace;
        while Instant::now() < grace_end {
            if !self.is_alive() {
                info!("Target exited gracefully");
                return;
            }
            std::thread::sleep(GRACE_POLL_INTERVAL);
        }

        warn!("Grace period elapsed, force-killing target (pid={pid})");
        if let Err(e) = self.child.kill() {
            debug!("kill failed for pid {pid}: {e}");
        }
        match self.child.wait() {
            Ok(status) => {
                self.exit_status = Some(status);
                info!("Target reaped after KILL: {status}");
            }
            Err(e) => warn!("Failed to reap target (pid={pid}): {e}"),
        }
    }

    /// Best-effort sweep of stray same-named processes system-wide.
    ///
    /// Takes a fresh snapshot of the process table and kills every process
    /// whose executable name or command line contains `pattern`, excluding
    /// our own child and the probe itself. Individual failures (already
    /// exited, access denied) are swallowed so one unreachable stray cannot
    /// abort the rest of the sweep. Returns the number of strays signaled.
    pub fn sweep_strays(&mut self, pattern: &str) -> usize {
        let own_pid = self.child.id();
        sweep_strays_excluding(pattern, &[own_pid])
    }
}

/// Send a graceful stop signal. Shelling out to `kill` keeps the crate
/// free of unsafe signal plumbing; on non-unix there is no TERM analogue
/// and the caller's KILL escalation applies.
fn send_term(pid: u32) {
    #[cfg(unix)]
    {
        match Command::new("kill")
            .arg("-TERM")
            .arg(pid.to_string())
            .output()
        {
            Ok(output) if output.status.success() => {}
            Ok(_) => debug!("kill -TERM reported failure for pid {pid}"),
            Err(e) => debug!("failed to run kill for pid {pid}: {e}"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

/// Process-table sweep shared by the supervisor and standalone cleanup.
pub fn sweep_strays_excluding(pattern: &str, excluded_pids: &[u32]) -> usize {
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::All, true);

    let self_pid = sysinfo::get_current_pid().ok();
    let mut swept = 0;

    for (pid, process) in system.processes() {
        let pid_u32 = pid.as_u32();
        if excluded_pids.contains(&pid_u32) {
            continue;
        }
        if self_pid.is_some_and(|own| own == *pid) {
            continue;
        }

        let name = process.name().to_string_lossy();
        let cmdline = process
            .cmd()
            .iter()
            .map(|part| part.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if !name.contains(pattern) && !cmdline.contains(pattern) {
            continue;
        }

        // The snapshot is transient; the process may be gone already.
        if process.kill() {
            info!("Swept stray process: {name} (pid={pid_u32})");
            swept += 1;
        } else {
            debug!("Could not signal stray {name} (pid={pid_u32}); skipping");
        }
    }

    if swept > 0 {
        info!("Stray sweep removed {swept} process(es) matching '{pattern}'");
    } else {
        debug!("Stray sweep found nothing matching '{pattern}'");
    }
    swept
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn spawn_sleeper(secs: u32) -> Supervisor {
        Supervisor::start(
            &PathBuf::from("sh"),
            &["-c", &format!("sleep {secs}")],
            &std::env::temp_dir(),
            &HashMap::new(),
        )
        .unwrap()
    }

    #[test]
    #[cfg(unix)]
    fn test_is_alive_tracks_exit() {
        let mut supervisor = Supervisor::start(
            &PathBuf::from("sh"),
            &["-c", "exit 0"],
            &std::env::temp_dir(),
            &HashMap::new(),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while supervisor.is_alive() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!supervisor.is_alive());
        assert!(supervisor.exit_status().is_some());
    }

    #[test]
    #[cfg(unix)]
    fn test_terminate_is_idempotent_and_bounded() {
        let mut supervisor = spawn_sleeper(60);
        let grace = Duration::from_millis(500);

        let start = Instant::now();
        supervisor.terminate(grace);
        supervisor.terminate(grace);
        assert!(!supervisor.is_alive());
        // Two calls must stay within grace + a small forced-kill bound.
        assert!(start.elapsed() < grace * 2 + Duration::from_secs(5));
    }

    #[test]
    #[cfg(unix)]
    fn test_terminate_grace_lets_target_exit_on_term() {
        // sh exits promptly on TERM, so the KILL phase must not be needed.
        let mut supervisor = spawn_sleeper(60);
        supervisor.terminate(Duration::from_secs(5));
        assert!(!supervisor.is_alive());
    }

    #[test]
    fn test_spawn_missing_binary_is_error() {
        let result = Supervisor::start(
            &PathBuf::from("/nonexistent/definitely-missing-binary"),
            &[],
            &std::env::temp_dir(),
            &HashMap::new(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sweep_with_unmatched_pattern_is_noop() {
        let swept = sweep_strays_excluding("no-process-will-ever-match-this-xyzzy", &[]);
        assert_eq!(swept, 0);
    }
}
