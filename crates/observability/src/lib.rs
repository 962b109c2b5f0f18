//! Process-wide tracing setup shared by every binary in the workspace.

/// Initialize process-wide observability (tracing/logging).
///
/// Reads `RUST_LOG` and `LOG_FORMAT`. Safe to call multiple times; subsequent
/// calls become no-ops.
pub fn init() {
    tracing::init();
}

pub mod tracing;

pub use self::tracing::{LogFormat, UnknownLogFormat};
