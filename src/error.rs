//! Stage failure taxonomy for the probe pipeline.
//!
//! Every stage converts its failure into exactly one of these variants;
//! none of them is retried. `Timeout` and `ProcessDied` are deliberately
//! separate: the first means the target was slow, the second means it
//! crashed before ever signaling.

use std::time::Duration;
use thiserror::Error;

/// Fatal failure of one pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// External build tool exited non-zero or exceeded its timeout.
    #[error("build failed: {0}")]
    Build(String),

    /// Target binary missing, unexecutable, or the OS refused the spawn.
    #[error("failed to spawn target: {0}")]
    Spawn(#[from] std::io::Error),

    /// Every trigger mechanism in the chain was exhausted.
    #[error("all trigger mechanisms failed")]
    Trigger,

    /// Deadline reached with no success marker observed.
    #[error("no signal within deadline ({0:?})")]
    Timeout(Duration),

    /// Target exited before ever signaling; indicates a crash, not slowness.
    #[error("target process exited before signaling (after {0:?})")]
    ProcessDied(Duration),

    /// Live flag fired but the transcript re-scan disagrees; likely a race.
    #[error("signal flag set but no success marker found in transcript")]
    Validation,
}

impl StageError {
    /// Short stable label for summaries and logs.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Build(_) => "build",
            Self::Spawn(_) => "spawn",
            Self::Trigger => "trigger",
            Self::Timeout(_) => "wait",
            Self::ProcessDied(_) => "wait",
            Self::Validation => "validate",
        }
    }
}
