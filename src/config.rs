//! Probe configuration.
//!
//! All environment and CLI input is resolved once, at the binary boundary,
//! into a [`ProbeConfig`] that is passed into the run session. Core logic
//! never reads the environment on its own.

use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// Default timeout for the release build of the target.
pub const BUILD_TIMEOUT: Duration = Duration::from_secs(120);

/// Default grace period between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(5);

/// Default cadence of the deadline waiter's poll loop.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long the target gets to initialize before the trigger fires.
pub const DEFAULT_STARTUP_WAIT: Duration = Duration::from_secs(5);

/// AI provider the target is launched with. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Provider {
    Openai,
    Claude,
    Gemini,
}

impl Provider {
    /// Value passed to the target's `--provider` flag.
    pub fn as_arg(self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_arg())
    }
}

/// Fully-resolved configuration for one run session.
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Provider the target is launched with.
    pub provider: Provider,
    /// Maximum wait for the success signal after the trigger fires.
    pub deadline: Duration,
    /// Project directory containing the target's Cargo workspace.
    pub project_dir: PathBuf,
    /// Path to the target binary (release build output by default).
    pub binary: PathBuf,
    /// API credential forwarded to the target's environment.
    pub api_key: Option<String>,
    /// Skip the build step and use `binary` as-is.
    pub skip_build: bool,
    /// SIGTERM-to-SIGKILL grace period during cleanup.
    pub grace_period: Duration,
    /// Poll cadence for the deadline waiter.
    pub poll_interval: Duration,
    /// Time the target gets to initialize before the trigger fires.
    pub startup_wait: Duration,
    /// Substring used to identify stray target processes during the sweep.
    pub stray_pattern: String,
}

impl ProbeConfig {
    pub fn new(provider: Provider, deadline: Duration, project_dir: PathBuf) -> Self {
        let binary = project_dir
            .join("target")
            .join("release")
            .join("ai-screenshot-analyzer");
        Self {
            provider,
            deadline,
            project_dir,
            binary,
            api_key: None,
            skip_build: false,
            grace_period: DEFAULT_GRACE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            startup_wait: DEFAULT_STARTUP_WAIT,
            stray_pattern: "ai-screenshot-analyzer".to_string(),
        }
    }

    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.binary = binary;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn skip_build(mut self) -> Self {
        self.skip_build = true;
        self
    }

    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_startup_wait(mut self, wait: Duration) -> Self {
        self.startup_wait = wait;
        self
    }

    pub fn with_stray_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.stray_pattern = pattern.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_binary_under_release_target() {
        let config = ProbeConfig::new(
            Provider::Openai,
            Duration::from_secs(60),
            PathBuf::from("/tmp/project"),
        );
        assert_eq!(
            config.binary,
            PathBuf::from("/tmp/project/target/release/ai-screenshot-analyzer")
        );
        assert!(!config.skip_build);
    }

    #[test]
    fn test_provider_args_match_target_contract() {
        assert_eq!(Provider::Openai.as_arg(), "openai");
        assert_eq!(Provider::Claude.as_arg(), "claude");
        assert_eq!(Provider::Gemini.as_arg(), "gemini");
    }
}
