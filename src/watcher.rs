//! Background draining and classification of the target's output.
//!
//! The watcher owns the target's stdout/stderr pipes. Reader threads append
//! every line to a shared, append-only transcript and match it against the
//! fixed marker vocabulary. The first success match sets a monotonic flag
//! that the deadline waiter polls; the flag is never reset within a session.
//!
//! The markers are a versioned contract with the target's log wording —
//! if the target rewords its progress lines, this list must change with it.

use std::io::{BufRead, BufReader, Read};
use std::process::Child;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use tracing::{debug, info, warn};

/// Substrings that mark a successful analysis. Case-sensitive containment.
pub const SUCCESS_MARKERS: &[&str] = &["💡 Analysis Result:", "✅"];

/// Substrings that mark an error. Case-insensitive containment.
pub const ERROR_MARKERS: &[&str] = &["❌", "failed", "error"];

/// Readiness markers emitted during target startup.
pub const READY_MARKERS: &[&str] = &["HOTKEY_MONITORING_STARTED", "HOTKEY_REGISTERED"];

/// How one transcript line relates to the marker vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Success,
    Error,
    Neutral,
}

/// Classify a single output line. Success wins over error when both match,
/// mirroring the validator's policy that success markers are authoritative.
pub fn classify(line: &str) -> LineClass {
    if SUCCESS_MARKERS.iter().any(|m| line.contains(m)) {
        return LineClass::Success;
    }
    let lowered = line.to_lowercase();
    if ERROR_MARKERS.iter().any(|m| lowered.contains(&m.to_lowercase())) {
        return LineClass::Error;
    }
    LineClass::Neutral
}

/// Shared view over the target's combined output.
///
/// Cloning is cheap; all clones observe the same transcript and flags.
#[derive(Clone, Default)]
pub struct OutputWatcher {
    transcript: Arc<Mutex<Vec<String>>>,
    signaled: Arc<AtomicBool>,
    ready: Arc<AtomicBool>,
}

impl OutputWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take both pipes from the child and start draining them.
    ///
    /// Each pipe gets one detached reader thread; both feed the same
    /// transcript under one lock, which is where the streams merge. The
    /// threads end naturally when the pipes close and are never restarted.
    pub fn attach(&self, child: &mut Child) {
        if let Some(stdout) = child.stdout.take() {
            self.spawn_reader("stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            self.spawn_reader("stderr", stderr);
        }
    }

    fn spawn_reader<R: Read + Send + 'static>(&self, stream: &'static str, reader: R) {
        let transcript = Arc::clone(&self.transcript);
        let signaled = Arc::clone(&self.signaled);
        let ready = Arc::clone(&self.ready);

        thread::spawn(move || {
            let reader = BufReader::new(reader);
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        // Runs detached; a broken pipe must never surface
                        // into the foreground pipeline.
                        debug!("{stream} reader stopped: {e}");
                        break;
                    }
                };
                let trimmed = line.trim().to_string();
                if trimmed.is_empty() {
                    continue;
                }

                debug!(target: "target", "{trimmed}");
                // The line lands in the transcript before any flag flips,
                // so an observer that sees a flag also sees its line.
                transcript.lock().unwrap().push(trimmed.clone());
                match classify(&trimmed) {
                    LineClass::Success => {
                        if !signaled.swap(true, Ordering::SeqCst) {
                            info!("Success marker observed: {trimmed}");
                        }
                    }
                    LineClass::Error => warn!("Error marker in target output: {trimmed}"),
                    LineClass::Neutral => {}
                }
                if READY_MARKERS.iter().any(|m| trimmed.contains(m)) {
                    ready.store(true, Ordering::SeqCst);
                }
            }
            debug!("{stream} reader finished (stream closed)");
        });
    }

    /// Monotonic success flag: false until the first success marker, then
    /// true for the rest of the session.
    pub fn signaled(&self) -> bool {
        self.signaled.load(Ordering::SeqCst)
    }

    /// True once a readiness marker has been seen during startup.
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Copy of the full transcript so far, in arrival order.
    pub fn transcript_snapshot(&self) -> Vec<String> {
        self.transcript.lock().unwrap().clone()
    }

    /// Append a line directly, bypassing the readers. Test seam.
    #[cfg(test)]
    pub(crate) fn push_line(&self, line: &str) {
        self.transcript.lock().unwrap().push(line.to_string());
        if classify(line) == LineClass::Success {
            self.signaled.store(true, Ordering::SeqCst);
        }
    }
}
