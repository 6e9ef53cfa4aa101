//! Error collector: decides what a failed command does to the run.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::error::ReportError;
use crate::script::Value;

/// Called with a per-command error and the raw command text; the returned
/// value is used as the command's result.
pub type ErrorHandler = Arc<dyn Fn(&ReportError, &str) -> Value + Send + Sync>;

pub struct ErrorCollector {
    fail_fast: bool,
    handler: Option<ErrorHandler>,
    errors: Vec<ReportError>,
}

impl fmt::Debug for ErrorCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorCollector")
            .field("fail_fast", &self.fail_fast)
            .field("handler", &self.handler.is_some())
            .field("errors", &self.errors)
            .finish()
    }
}

impl ErrorCollector {
    pub fn new(fail_fast: bool, handler: Option<ErrorHandler>) -> Self {
        ErrorCollector {
            fail_fast,
            handler,
            errors: Vec::new(),
        }
    }

    /// Route a per-command error.
    ///
    /// * structural errors propagate unchanged;
    /// * with a handler, its value replaces the command's result;
    /// * fail-fast propagates;
    /// * otherwise the error is recorded and `None` means "use a placeholder".
    pub fn recover(&mut self, err: ReportError, raw: &str) -> Result<Option<Value>, ReportError> {
        if err.is_structural() {
            return Err(err);
        }
        if let Some(handler) = &self.handler {
            return Ok(Some(handler(&err, raw)));
        }
        if self.fail_fast {
            return Err(err);
        }
        self.record(err);
        Ok(None)
    }

    /// Route an error that must not reach the handler again (e.g. a
    /// handler-supplied value that failed validation).
    pub fn reject(&mut self, err: ReportError) -> Result<(), ReportError> {
        if err.is_structural() || self.fail_fast {
            return Err(err);
        }
        self.record(err);
        Ok(())
    }

    pub fn record(&mut self, err: ReportError) {
        warn!(error = %err, "command failed");
        self.errors.push(err);
    }

    /// `Multiple` if anything was recorded.
    pub fn finish(self) -> Result<(), ReportError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ReportError::Multiple(self.errors))
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
