//! Bounded execution of external commands with output capture.
//!
//! Used by the build step, the trigger mechanisms, and the doctor probes.
//! The child is killed when it exceeds its timeout; stdout/stderr are
//! drained on helper threads so a chatty child can never block on a full
//! pipe.

use std::ffi::OsStr;
use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Captured result of one bounded command execution.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Run `program args...` to completion or until `timeout`, whichever
/// comes first. A timed-out child is killed and reported with exit 124.
pub fn run_with_timeout<I, S>(
    program: &str,
    args: I,
    cwd: Option<&Path>,
    timeout: Duration,
) -> std::io::Result<CommandResult>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<_> = args.into_iter().collect();
    let display_args: Vec<_> = args
        .iter()
        .map(|a| a.as_ref().to_string_lossy().into_owned())
        .collect();
    debug!("Executing: {} {}", program, display_args.join(" "));

    let start = Instant::now();
    let mut cmd = Command::new(program);
    cmd.args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let mut child = cmd.spawn()?;
    let stdout_handle = child
        .stdout
        .take()
        .map(|mut out| thread::spawn(move || read_to_string(&mut out)));
    let stderr_handle = child
        .stderr
        .take()
        .map(|mut err| thread::spawn(move || read_to_string(&mut err)));

    let mut timed_out = false;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break Some(status);
        }
        if start.elapsed() >= timeout {
            timed_out = true;
            let _ = child.kill();
            break child.wait().ok();
        }
        thread::sleep(Duration::from_millis(10));
    };

    let duration = start.elapsed();
    let stdout = join_output(stdout_handle);
    let stderr = join_output(stderr_handle);
    let exit_code = status
        .and_then(|s| s.code())
        .unwrap_or(if timed_out { 124 } else { -1 });

    debug!(
        "Command finished: {} (exit={}, {}ms, timed_out={})",
        program,
        exit_code,
        duration.as_millis(),
        timed_out
    );

    Ok(CommandResult {
        exit_code,
        stdout,
        stderr,
        duration,
        timed_out,
    })
}

fn read_to_string<R: Read>(reader: &mut R) -> String {
    let mut buffer = Vec::new();
    if reader.read_to_end(&mut buffer).is_ok() {
        String::from_utf8_lossy(&buffer).into_owned()
    } else {
        String::new()
    }
}

fn join_output(handle: Option<thread::JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.join().unwrap_or_default(),
        None => String::new(),
    }
}
