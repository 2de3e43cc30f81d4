//! Logging setup and panic-payload helpers.
//!
//! The library only emits `tracing` events; embedding applications decide
//! where they go. [`init_logging`] is a convenience for binaries and tests
//! that just want formatted output on stderr.

mod logging;

pub use logging::{init_logging, level_for_verbosity, LOG_ENV_VAR};

use std::any::Any;

/// Extract a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Truncate long messages for log lines and event payloads.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
