//! Black-box automation probe for the AI screenshot analyzer.
//!
//! Validates the target application through its observable process
//! behavior: build it, start it, inject a simulated global hotkey through
//! a chain of fallback mechanisms, wait a bounded time for a success
//! marker on the target's combined output, validate the transcript, and
//! tear everything down deterministically.

pub mod build;
pub mod config;
pub mod doctor;
pub mod error;
pub mod exec;
pub mod session;
pub mod supervisor;
pub mod trigger;
pub mod validator;
pub mod waiter;
pub mod watcher;
