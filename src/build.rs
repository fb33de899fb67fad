//! Release build of the target, treated as an opaque external command.

use crate::config::{BUILD_TIMEOUT, ProbeConfig};
use crate::error::StageError;
use crate::exec::run_with_timeout;
use tracing::info;

/// Run `cargo build --release` in the target's project directory.
///
/// Binary result only: non-zero exit or timeout maps to
/// [`StageError::Build`] with the tool's stderr tail for context.
pub fn run_build(config: &ProbeConfig) -> Result<(), StageError> {
    if config.skip_build {
        info!("Build step skipped (--skip-build)");
        return Ok(());
    }

    info!("Building target in {}", config.project_dir.display());
    let result = run_with_timeout(
        "cargo",
        ["build", "--release"],
        Some(&config.project_dir),
        BUILD_TIMEOUT,
    )
    .map_err(|e| StageError::Build(format!("failed to invoke cargo: {e}")))?;

    if result.timed_out {
        return Err(StageError::Build(format!(
            "build timed out after {BUILD_TIMEOUT:?}"
        )));
    }
    if !result.success() {
        let tail: Vec<&str> = result.stderr.lines().rev().take(20).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(StageError::Build(format!(
            "cargo exited with {}: {}",
            result.exit_code,
            tail.join("\n")
        )));
    }

    info!("Build succeeded in {:?}", result.duration);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Provider;
    use std::time::Duration;

    #[test]
    fn test_skip_build_short_circuits() {
        let config = ProbeConfig::new(
            Provider::Openai,
            Duration::from_secs(10),
            std::path::PathBuf::from("/nonexistent"),
        )
        .skip_build();
        assert!(run_build(&config).is_ok());
    }
}
