//! Error taxonomy for report generation.
//!
//! Structural errors (template syntax, broken command nesting, unreadable
//! packages) always abort the invocation. Per-command errors go through the
//! [`ErrorCollector`](crate::collector::ErrorCollector) and may be handled,
//! recorded or propagated depending on the run options.

use thiserror::Error;

use crate::script::EvalError;

/// Every failure `create_report` and friends can surface.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A command produced `null`/`undefined` while `reject_nullish` is on.
    #[error("result of command '{command}' is null or undefined and reject_nullish is set")]
    NullishResult { command: String },

    /// INS produced a plain object, which has no sensible text form.
    #[error("result of command '{command}' is an object")]
    ObjectResult { command: String },

    /// Unbalanced delimiters or block markers.
    #[error("syntax error in command '{command}': {message}")]
    CommandSyntax { command: String, message: String },

    /// Malformed command header, undefined alias, or misuse of a keyword.
    #[error("invalid command '{command}': {message}")]
    InvalidCommand { command: String, message: String },

    /// Evaluating the command's code failed.
    #[error("error executing command '{command}': {source}")]
    CommandExecution {
        command: String,
        #[source]
        source: EvalError,
    },

    /// IMAGE command got a value that is not a usable image descriptor.
    #[error("error executing IMAGE command '{command}': {message}")]
    Image { command: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("template parse error: {0}")]
    TemplateParse(String),

    /// The zip container or one of its bookkeeping parts is unusable.
    #[error("package error: {0}")]
    Package(String),

    /// Everything recorded in collect-all mode.
    #[error("{} error(s) while rendering template: {}", .0.len(), summarize(.0))]
    Multiple(Vec<ReportError>),
}

impl ReportError {
    /// Structural errors are never handed to an error handler and never
    /// downgraded to a recorded error.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ReportError::CommandSyntax { .. }
                | ReportError::InvalidCommand { .. }
                | ReportError::Internal(_)
                | ReportError::TemplateParse(_)
                | ReportError::Package(_)
                | ReportError::Multiple(_)
        )
    }

    /// The raw command text this error is about, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            ReportError::NullishResult { command }
            | ReportError::ObjectResult { command }
            | ReportError::CommandSyntax { command, .. }
            | ReportError::InvalidCommand { command, .. }
            | ReportError::CommandExecution { command, .. }
            | ReportError::Image { command, .. } => Some(command),
            _ => None,
        }
    }

    pub(crate) fn syntax(command: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError::CommandSyntax {
            command: command.into(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid(command: impl Into<String>, message: impl Into<String>) -> Self {
        ReportError::InvalidCommand {
            command: command.into(),
            message: message.into(),
        }
    }
}

fn summarize(errors: &[ReportError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<zip::result::ZipError> for ReportError {
    fn from(e: zip::result::ZipError) -> Self {
        ReportError::Package(e.to_string())
    }
}

impl From<std::io::Error> for ReportError {
    fn from(e: std::io::Error) -> Self {
        ReportError::Package(e.to_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_classification() {
        assert!(ReportError::syntax("FOR x IN y", "unterminated").is_structural());
        assert!(ReportError::invalid("FOR x", "missing IN").is_structural());
        assert!(!ReportError::NullishResult { command: "INS a".into() }.is_structural());
        assert!(!ReportError::Image { command: "IMAGE i".into(), message: "bad".into() }.is_structural());
    }

    #[test]
    fn multiple_lists_every_error() {
        let err = ReportError::Multiple(vec![
            ReportError::NullishResult { command: "INS a".into() },
            ReportError::ObjectResult { command: "INS b".into() },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 error(s)"), "{msg}");
        assert!(msg.contains("INS a") && msg.contains("INS b"), "{msg}");
    }

    #[test]
    fn command_accessor() {
        let err = ReportError::CommandExecution {
            command: "INS foo".into(),
            source: EvalError::Reference("foo".into()),
        };
        assert_eq!(err.command(), Some("INS foo"));
        assert_eq!(ReportError::Internal("x".into()).command(), None);
    }
}
