//! Preflight probes of the host environment.
//!
//! Thin wrappers over platform utilities, each treated as a boolean
//! oracle: can the probe inject input, capture the screen, and touch the
//! clipboard on this machine? None of these is fatal on its own; they
//! exist to explain trigger failures before a run, not to gate it.

use crate::exec::run_with_timeout;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of one environment probe.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeCheck {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

/// Run every probe for the current platform.
pub fn run_all() -> Vec<ProbeCheck> {
    vec![
        input_permission(),
        screen_capture(),
        clipboard_roundtrip(),
    ]
}

/// Can we drive synthetic input? On macOS this needs accessibility
/// permission; querying System Events is the canonical check.
fn input_permission() -> ProbeCheck {
    #[cfg(target_os = "macos")]
    {
        let result = run_with_timeout(
            "osascript",
            [
                "-e",
                "tell application \"System Events\" to get name of first process",
            ],
            None,
            PROBE_TIMEOUT,
        );
        let (ok, detail) = match result {
            Ok(r) if r.success() => (true, "accessibility permission granted".to_string()),
            Ok(r) if r.timed_out => (
                false,
                "permission check timed out (a consent dialog may be waiting)".to_string(),
            ),
            Ok(_) => (false, "accessibility permission not granted".to_string()),
            Err(e) => (false, format!("osascript unavailable: {e}")),
        };
        ProbeCheck {
            name: "input-permission",
            ok,
            detail,
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        // A display server is the precondition for key injection.
        let has_display = std::env::var_os("DISPLAY").is_some()
            || std::env::var_os("WAYLAND_DISPLAY").is_some();
        ProbeCheck {
            name: "input-permission",
            ok: has_display,
            detail: if has_display {
                "display server available".to_string()
            } else {
                "no DISPLAY or WAYLAND_DISPLAY".to_string()
            },
        }
    }
}

/// Can the OS capture the screen for us?
fn screen_capture() -> ProbeCheck {
    #[cfg(target_os = "macos")]
    {
        let target = std::env::temp_dir().join("snapcheck_probe.png");
        let target_str = target.to_string_lossy().into_owned();
        let result = run_with_timeout(
            "screencapture",
            ["-x", target_str.as_str()],
            None,
            PROBE_TIMEOUT,
        );
        let ok = matches!(&result, Ok(r) if r.success()) && target.exists();
        let _ = std::fs::remove_file(&target);
        ProbeCheck {
            name: "screen-capture",
            ok,
            detail: if ok {
                "screencapture produced a file".to_string()
            } else {
                "screencapture failed (screen recording permission?)".to_string()
            },
        }
    }
    #[cfg(not(target_os = "macos"))]
    {
        let has_display = std::env::var_os("DISPLAY").is_some()
            || std::env::var_os("WAYLAND_DISPLAY").is_some();
        ProbeCheck {
            name: "screen-capture",
            ok: has_display,
            detail: if has_display {
                "display server available".to_string()
            } else {
                "headless session, capture will fail".to_string()
            },
        }
    }
}

/// Round-trip a token through the system clipboard.
fn clipboard_roundtrip() -> ProbeCheck {
    let token = "snapcheck-clipboard-probe";
    #[cfg(target_os = "macos")]
    let (copy, paste): (&[&str], &[&str]) = (&["pbcopy"], &["pbpaste"]);
    #[cfg(not(target_os = "macos"))]
    let (copy, paste): (&[&str], &[&str]) = (
        &["xclip", "-selection", "clipboard"],
        &["xclip", "-selection", "clipboard", "-o"],
    );

    let ok = clipboard_write(copy, token)
        && matches!(
            run_with_timeout(paste[0], &paste[1..], None, PROBE_TIMEOUT),
            Ok(r) if r.success() && r.stdout.trim() == token
        );

    ProbeCheck {
        name: "clipboard",
        ok,
        detail: if ok {
            "clipboard round-trip succeeded".to_string()
        } else {
            "clipboard unavailable".to_string()
        },
    }
}

fn clipboard_write(copy: &[&str], token: &str) -> bool {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let Ok(mut child) = Command::new(copy[0])
        .args(&copy[1..])
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    else {
        debug!("clipboard writer {} unavailable", copy[0]);
        return false;
    };
    let write_ok = child
        .stdin
        .as_mut()
        .map(|stdin| stdin.write_all(token.as_bytes()).is_ok())
        .unwrap_or(false);
    drop(child.stdin.take());
    let exit_ok = child.wait().map(|s| s.success()).unwrap_or(false);
    write_ok && exit_ok
}

/// Print the checks and decide the doctor exit: failure only when every
/// probe failed, since a partially-capable host can still run scenarios.
pub fn report(checks: &[ProbeCheck]) -> bool {
    println!("Environment preflight:");
    for check in checks {
        let status = if check.ok { "ok  " } else { "warn" };
        println!("  [{status}] {:<18} {}", check.name, check.detail);
    }
    checks.iter().any(|c| c.ok)
}
