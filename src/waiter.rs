//! Bounded wait for the success signal.
//!
//! Polls the watcher's monotonic flag and the supervisor's liveness at a
//! fixed cadence. A dead target short-circuits the wait: there is no point
//! running out the deadline for a process that can no longer signal.

use crate::supervisor::Supervisor;
use crate::watcher::OutputWatcher;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Terminal result of one deadline wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Success marker observed; `elapsed` is trigger-to-signal latency.
    Signaled { elapsed: Duration },
    /// Target exited without ever signaling.
    ProcessDied { elapsed: Duration },
    /// Deadline reached with no signal and the target still alive.
    DeadlineExceeded { elapsed: Duration },
}

impl WaitOutcome {
    pub fn signaled(&self) -> bool {
        matches!(self, Self::Signaled { .. })
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            Self::Signaled { elapsed }
            | Self::ProcessDied { elapsed }
            | Self::DeadlineExceeded { elapsed } => *elapsed,
        }
    }
}

/// Block until the signal appears, the target dies, or `deadline` passes.
///
/// Check order per poll: flag first, then liveness, then deadline — so a
/// signal that raced with process exit still counts as success.
pub fn wait_for_signal(
    watcher: &OutputWatcher,
    supervisor: &mut Supervisor,
    deadline: Duration,
    poll_interval: Duration,
) -> WaitOutcome {
    let start = Instant::now();
    loop {
        if watcher.signaled() {
            let elapsed = start.elapsed();
            info!("Signal observed after {elapsed:?}");
            return WaitOutcome::Signaled { elapsed };
        }

        if !supervisor.is_alive() {
            let elapsed = start.elapsed();
            warn!("Target exited before signaling (after {elapsed:?})");
            return WaitOutcome::ProcessDied { elapsed };
        }

        if start.elapsed() >= deadline {
            warn!("Deadline {deadline:?} reached with no signal");
            return WaitOutcome::DeadlineExceeded {
                elapsed: start.elapsed(),
            };
        }

        std::thread::sleep(poll_interval.min(deadline.saturating_sub(start.elapsed())));
    }
}
