//! Post-hoc validation of the full transcript.
//!
//! Second confirmation, independent of the live flag: the flag says a
//! success marker flew past the reader, the re-scan proves it is really in
//! the transcript. Error markers found alongside a success are reported as
//! a warning only — the target may legitimately log a recovered error.

use crate::watcher::{ERROR_MARKERS, SUCCESS_MARKERS};
use tracing::{info, warn};

/// Validate the run. Conservative by policy: a missed live signal can not
/// be overturned by transcript text, no matter what the scan would find.
pub fn validate(signal_observed: bool, transcript: &[String]) -> bool {
    if !signal_observed {
        warn!("Validation failed: no live signal was observed");
        return false;
    }

    let has_success = transcript
        .iter()
        .any(|line| SUCCESS_MARKERS.iter().any(|m| line.contains(m)));
    if !has_success {
        warn!("Validation failed: flag was set but transcript holds no success marker");
        return false;
    }

    let has_errors = transcript.iter().any(|line| {
        let lowered = line.to_lowercase();
        ERROR_MARKERS
            .iter()
            .any(|m| lowered.contains(&m.to_lowercase()))
    });
    if has_errors {
        warn!("Error markers present in transcript alongside success; not fatal");
    }

    info!("Transcript validation passed");
    true
}
