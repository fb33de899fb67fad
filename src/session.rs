//! One run session: the full probe pipeline with unconditional cleanup.
//!
//! Stage order: build → start → startup wait → trigger → deadline wait →
//! validate. Whatever stage the pipeline stops at, cleanup (two-phase
//! terminate plus the stray sweep) always runs, and its own errors are
//! logged without masking the stage failure.

use crate::build::run_build;
use crate::config::ProbeConfig;
use crate::error::StageError;
use crate::supervisor::{Supervisor, sweep_strays_excluding};
use crate::trigger::{self, TriggerMechanism};
use crate::validator::validate;
use crate::waiter::{WaitOutcome, wait_for_signal};
use crate::watcher::OutputWatcher;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Terminal state of a session. Set once, never rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Pending,
    Passed,
    Failed,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Everything the summary needs to describe one finished session.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub outcome: Outcome,
    pub provider: String,
    pub deadline_secs: u64,
    /// Stage label of the failure, if any.
    pub failed_stage: Option<&'static str>,
    pub failure: Option<String>,
    /// Mechanism that delivered the trigger.
    pub mechanism_used: Option<&'static str>,
    /// Trigger-to-signal latency in milliseconds.
    pub signal_latency_ms: Option<u128>,
    pub signal_observed: bool,
    pub strays_swept: usize,
    /// Last lines of the target's combined output.
    pub transcript_tail: Vec<String>,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Passed
    }
}

/// Number of transcript lines echoed into the summary.
const TRANSCRIPT_TAIL_LINES: usize = 10;

/// One attempt to exercise the target end to end.
pub struct RunSession {
    config: ProbeConfig,
    mechanisms: Vec<Box<dyn TriggerMechanism>>,
    watcher: OutputWatcher,
}

impl RunSession {
    /// Session with the platform's real trigger chain.
    pub fn new(config: ProbeConfig) -> Self {
        Self::with_mechanisms(config, trigger::platform_mechanisms())
    }

    /// Session with an injected trigger chain (stub scenarios, tests).
    pub fn with_mechanisms(
        config: ProbeConfig,
        mechanisms: Vec<Box<dyn TriggerMechanism>>,
    ) -> Self {
        Self {
            config,
            mechanisms,
            watcher: OutputWatcher::new(),
        }
    }

    /// Run the pipeline to completion and return the report.
    ///
    /// Cleanup runs on every exit path of the pipeline, including stage
    /// failures; only then is the outcome made terminal.
    pub fn run(mut self) -> RunReport {
        let mut supervisor: Option<Supervisor> = None;
        let mut mechanism_used = None;
        let result = self.run_pipeline(&mut supervisor, &mut mechanism_used);

        let strays_swept = self.cleanup(supervisor);

        let signal_observed = self.watcher.signaled();
        let transcript = self.watcher.transcript_snapshot();
        let tail_start = transcript.len().saturating_sub(TRANSCRIPT_TAIL_LINES);
        let transcript_tail = transcript[tail_start..].to_vec();

        let (outcome, failed_stage, failure, latency) = match result {
            Ok(latency) => (Outcome::Passed, None, None, Some(latency)),
            Err(e) => (Outcome::Failed, Some(e.stage()), Some(e.to_string()), None),
        };

        RunReport {
            outcome,
            provider: self.config.provider.to_string(),
            deadline_secs: self.config.deadline.as_secs(),
            failed_stage,
            failure,
            mechanism_used,
            signal_latency_ms: latency.map(|d| d.as_millis()),
            signal_observed,
            strays_swept,
            transcript_tail,
        }
    }

    /// The sequential pipeline. On success, returns trigger-to-signal
    /// latency. The supervisor handle is parked in `supervisor` so that
    /// `run` can clean up no matter where this returns.
    fn run_pipeline(
        &mut self,
        supervisor: &mut Option<Supervisor>,
        mechanism_used: &mut Option<&'static str>,
    ) -> Result<Duration, StageError> {
        run_build(&self.config)?;

        let mut env = HashMap::new();
        if let Some(key) = &self.config.api_key {
            env.insert("AI_API_KEY".to_string(), key.clone());
        }
        let provider_arg = self.config.provider.as_arg();
        let started = Supervisor::start(
            &self.config.binary,
            &["--provider", provider_arg, "run"],
            &self.config.project_dir,
            &env,
        )?;
        let sup = supervisor.insert(started);
        self.watcher.attach(sup.child_mut());

        self.wait_for_startup(sup)?;

        info!("Firing simulated hotkey trigger");
        let outcome = trigger::fire(&self.mechanisms);
        *mechanism_used = outcome.mechanism;
        if !outcome.fired {
            return Err(StageError::Trigger);
        }
        let triggered_at = Instant::now();

        let wait = wait_for_signal(
            &self.watcher,
            sup,
            self.config.deadline,
            self.config.poll_interval,
        );
        match wait {
            WaitOutcome::Signaled { .. } => {}
            WaitOutcome::ProcessDied { elapsed } => return Err(StageError::ProcessDied(elapsed)),
            WaitOutcome::DeadlineExceeded { .. } => {
                return Err(StageError::Timeout(self.config.deadline));
            }
        }
        let latency = triggered_at.elapsed();

        if !validate(self.watcher.signaled(), &self.watcher.transcript_snapshot()) {
            return Err(StageError::Validation);
        }

        Ok(latency)
    }

    /// Give the target its startup window, failing fast if it dies during
    /// initialization. A readiness marker ends the wait early.
    fn wait_for_startup(&self, supervisor: &mut Supervisor) -> Result<(), StageError> {
        info!(
            "Waiting up to {:?} for target to initialize",
            self.config.startup_wait
        );
        let start = Instant::now();
        while start.elapsed() < self.config.startup_wait {
            if !supervisor.is_alive() {
                return Err(StageError::ProcessDied(start.elapsed()));
            }
            if self.watcher.ready() {
                info!("Target reported readiness");
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        if !supervisor.is_alive() {
            return Err(StageError::ProcessDied(self.config.startup_wait));
        }
        Ok(())
    }

    /// Unconditional teardown: two-phase terminate, then the stray sweep.
    fn cleanup(&self, supervisor: Option<Supervisor>) -> usize {
        info!("Cleaning up");
        match supervisor {
            Some(mut sup) => {
                sup.terminate(self.config.grace_period);
                sup.sweep_strays(&self.config.stray_pattern)
            }
            // Nothing was spawned this run; still sweep leftovers from
            // earlier runs.
            None => sweep_strays_excluding(&self.config.stray_pattern, &[]),
        }
    }
}

/// Log the report and render the human-readable summary block.
pub fn print_summary(report: &RunReport) {
    if report.passed() {
        info!("AUTOMATION PROBE PASSED");
    } else {
        warn!(
            "AUTOMATION PROBE FAILED at stage '{}'",
            report.failed_stage.unwrap_or("unknown")
        );
    }

    println!("============================================================");
    println!("PROBE SUMMARY");
    println!("============================================================");
    println!("Provider:          {}", report.provider);
    println!("Deadline:          {}s", report.deadline_secs);
    println!(
        "Signal observed:   {}",
        if report.signal_observed { "yes" } else { "no" }
    );
    if let Some(mechanism) = report.mechanism_used {
        println!("Trigger mechanism: {mechanism}");
    }
    if let Some(latency) = report.signal_latency_ms {
        println!("Signal latency:    {latency} ms");
    }
    if let Some(failure) = &report.failure {
        println!(
            "Failure:           [{}] {}",
            report.failed_stage.unwrap_or("unknown"),
            failure
        );
    }
    println!("Strays swept:      {}", report.strays_swept);
    println!("Result:            {}", report.outcome);

    if !report.transcript_tail.is_empty() {
        println!();
        println!("Target output (last {} lines):", report.transcript_tail.len());
        for line in &report.transcript_tail {
            println!("  {line}");
        }
    }
}
