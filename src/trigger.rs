//! Simulated global-hotkey injection through an ordered fallback chain.
//!
//! Delivery of a synthetic user-level input event depends on the OS
//! security posture and no single API is reliable, so the dispatcher walks
//! a priority-ordered list of mechanisms and stops at the first that
//! reports success. Adding a platform means appending a strategy, not
//! branching.

use crate::exec::run_with_timeout;
use std::time::Duration;
use tracing::{info, warn};

/// Per-mechanism attempt timeout.
const MECHANISM_TIMEOUT: Duration = Duration::from_secs(15);

/// One concrete technique for injecting the simulated hotkey.
pub trait TriggerMechanism: Send {
    fn name(&self) -> &'static str;

    /// Attempt the injection once. Returns true on success; a timeout or
    /// non-zero exit is a failure and the dispatcher moves on.
    fn attempt(&self) -> bool;
}

/// Result of a dispatch: whether any mechanism fired, and which.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub fired: bool,
    pub mechanism: Option<&'static str>,
}

/// Try each mechanism strictly in order; first success wins and no
/// mechanism is retried after a later one has been attempted.
pub fn fire(mechanisms: &[Box<dyn TriggerMechanism>]) -> TriggerOutcome {
    for mechanism in mechanisms {
        info!("Trying trigger mechanism: {}", mechanism.name());
        if mechanism.attempt() {
            info!("Trigger delivered via {}", mechanism.name());
            return TriggerOutcome {
                fired: true,
                mechanism: Some(mechanism.name()),
            };
        }
        warn!("Trigger mechanism {} failed, falling back", mechanism.name());
    }
    warn!("All trigger mechanisms exhausted");
    TriggerOutcome {
        fired: false,
        mechanism: None,
    }
}

/// Priority-ordered mechanism list for the current platform.
pub fn platform_mechanisms() -> Vec<Box<dyn TriggerMechanism>> {
    #[cfg(target_os = "macos")]
    {
        vec![
            Box::new(CgEventKeyTap),
            Box::new(AppleScriptKeyCode),
            Box::new(AppleScriptKeystroke),
        ]
    }
    #[cfg(target_os = "linux")]
    {
        vec![Box::new(XdotoolKey)]
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        Vec::new()
    }
}

/// Native CGEvent injection at the HID tap, the highest-fidelity route.
///
/// Requires accessibility permission; posting succeeds even without it,
/// so this mechanism only reports failure when event creation fails.
#[cfg(target_os = "macos")]
pub struct CgEventKeyTap;

#[cfg(target_os = "macos")]
impl TriggerMechanism for CgEventKeyTap {
    fn name(&self) -> &'static str {
        "cgevent-keytap"
    }

    fn attempt(&self) -> bool {
        use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation};
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        // ANSI key code 1 = 's'.
        const KEY_S: u16 = 1;

        let Ok(source) = CGEventSource::new(CGEventSourceStateID::HIDSystemState) else {
            warn!("CGEventSource unavailable");
            return false;
        };
        let flags = CGEventFlags::CGEventFlagCommand | CGEventFlags::CGEventFlagShift;

        // Press and release twice with a short gap, matching the pulse
        // behavior of the scripted fallbacks.
        for _ in 0..2 {
            for keydown in [true, false] {
                let Ok(event) = CGEvent::new_keyboard_event(source.clone(), KEY_S, keydown)
                else {
                    warn!("CGEvent creation failed");
                    return false;
                };
                event.set_flags(flags);
                event.post(CGEventTapLocation::HID);
            }
            std::thread::sleep(Duration::from_millis(500));
        }
        true
    }
}

/// macOS System Events key-code injection.
///
/// Sends the Cmd+Shift+S chord as repeated pulses with short delays; a
/// single pulse is observed to be dropped by some targets.
#[cfg(target_os = "macos")]
pub struct AppleScriptKeyCode;

#[cfg(target_os = "macos")]
impl TriggerMechanism for AppleScriptKeyCode {
    fn name(&self) -> &'static str {
        "applescript-keycode"
    }

    fn attempt(&self) -> bool {
        let script = r#"
tell application "System Events"
    delay 0.3
    key code 1 using {command down, shift down}
    delay 0.1
    key code 1 using {command down, shift down}
    delay 0.1
    key code 1 using {command down, shift down}
    delay 0.1
    key code 1 using {command down, shift down}
    delay 0.1
    key code 1 using {command down, shift down}
end tell
"#;
        run_osascript(script)
    }
}

/// macOS System Events keystroke synthesis, the last-resort fallback.
#[cfg(target_os = "macos")]
pub struct AppleScriptKeystroke;

#[cfg(target_os = "macos")]
impl TriggerMechanism for AppleScriptKeystroke {
    fn name(&self) -> &'static str {
        "applescript-keystroke"
    }

    fn attempt(&self) -> bool {
        let script = r#"
tell application "System Events"
    delay 0.5
    keystroke "s" using {command down, shift down}
    delay 0.2
    keystroke "s" using {command down, shift down}
    delay 0.2
    keystroke "s" using {command down, shift down}
end tell
"#;
        run_osascript(script)
    }
}

#[cfg(target_os = "macos")]
fn run_osascript(script: &str) -> bool {
    match run_with_timeout("osascript", ["-e", script], None, MECHANISM_TIMEOUT) {
        Ok(result) => result.success(),
        Err(e) => {
            warn!("osascript unavailable: {e}");
            false
        }
    }
}

/// X11 key injection via xdotool.
#[cfg(target_os = "linux")]
pub struct XdotoolKey;

#[cfg(target_os = "linux")]
impl TriggerMechanism for XdotoolKey {
    fn name(&self) -> &'static str {
        "xdotool-key"
    }

    fn attempt(&self) -> bool {
        match run_with_timeout(
            "xdotool",
            ["key", "--clearmodifiers", "super+shift+s"],
            None,
            MECHANISM_TIMEOUT,
        ) {
            Ok(result) => result.success(),
            Err(e) => {
                warn!("xdotool unavailable: {e}");
                false
            }
        }
    }
}

/// Mechanism that runs an arbitrary command; used to script triggers in
/// stub scenarios where no real input injection is wanted.
pub struct CommandMechanism {
    name: &'static str,
    program: String,
    args: Vec<String>,
}

impl CommandMechanism {
    pub fn new(
        name: &'static str,
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            name,
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl TriggerMechanism for CommandMechanism {
    fn name(&self) -> &'static str {
        self.name
    }

    fn attempt(&self) -> bool {
        match run_with_timeout(&self.program, &self.args, None, MECHANISM_TIMEOUT) {
            Ok(result) => result.success(),
            Err(e) => {
                warn!("trigger command {} failed to spawn: {e}", self.program);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubMechanism {
        name: &'static str,
        succeeds: bool,
        attempts: Arc<AtomicUsize>,
    }

    impl TriggerMechanism for StubMechanism {
        fn name(&self) -> &'static str {
            self.name
        }

        fn attempt(&self) -> bool {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.succeeds
        }
    }

    fn stub(
        name: &'static str,
        succeeds: bool,
    ) -> (Box<dyn TriggerMechanism>, Arc<AtomicUsize>) {
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Box::new(StubMechanism {
                name,
                succeeds,
                attempts: Arc::clone(&attempts),
            }),
            attempts,
        )
    }

    #[test]
    fn test_first_success_wins_and_failure_attempted_once() {
        let (first, first_attempts) = stub("first", false);
        let (second, second_attempts) = stub("second", true);
        let (third, third_attempts) = stub("third", true);

        let outcome = fire(&[first, second, third]);
        assert!(outcome.fired);
        assert_eq!(outcome.mechanism, Some("second"));
        assert_eq!(first_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(second_attempts.load(Ordering::SeqCst), 1);
        assert_eq!(third_attempts.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_all_failing_reports_no_mechanism() {
        let (first, _) = stub("first", false);
        let (second, _) = stub("second", false);
        let outcome = fire(&[first, second]);
        assert!(!outcome.fired);
        assert_eq!(outcome.mechanism, None);
    }

    #[test]
    fn test_empty_chain_fails() {
        let outcome = fire(&[]);
        assert!(!outcome.fired);
    }

    #[test]
    #[cfg(unix)]
    fn test_command_mechanism_checks_exit_code() {
        let ok = CommandMechanism::new("true-cmd", "sh", ["-c", "exit 0"]);
        let bad = CommandMechanism::new("false-cmd", "sh", ["-c", "exit 1"]);
        assert!(ok.attempt());
        assert!(!bad.attempt());
    }
}
