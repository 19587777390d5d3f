//! Optional logging capability injected into the recovery pipeline.
//!
//! The pipeline never depends on a logging framework directly. Callers that
//! want to see which repair strategies failed pass a [`RecoveryLog`]; the
//! pipeline works identically without one. [`TracingLog`] bridges to
//! `tracing`, which is what the CLI installs in `--verbose` mode.

use tracing::{error, info, warn};

/// Narrow logging capability: three named operations, all no-ops by default.
///
/// Implementations must be `Send + Sync` so one logger can be shared across
/// concurrently processed pages.
pub trait RecoveryLog: Send + Sync {
    fn log(&self, message: &str) {
        let _ = message;
    }

    fn warn(&self, message: &str) {
        let _ = message;
    }

    /// `details` carries extra context such as the parser error of each attempt.
    fn error(&self, message: &str, details: &[String]) {
        let _ = (message, details);
    }
}

/// Discards everything.
pub struct NoopLog;

impl RecoveryLog for NoopLog {}

/// Forwards to the `tracing` macros at info / warn / error level.
pub struct TracingLog;

impl RecoveryLog for TracingLog {
    fn log(&self, message: &str) {
        info!(target: "edgequake_water::recovery", "{}", message);
    }

    fn warn(&self, message: &str) {
        warn!(target: "edgequake_water::recovery", "{}", message);
    }

    fn error(&self, message: &str, details: &[String]) {
        if details.is_empty() {
            error!(target: "edgequake_water::recovery", "{}", message);
        } else {
            error!(target: "edgequake_water::recovery", "{} ({})", message, details.join("; "));
        }
    }
}
