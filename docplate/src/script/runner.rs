//! Pluggable code runners.
//!
//! The engine never evaluates command code itself; it hands the code, the
//! invocation's [`Sandbox`] and a read-only [`Scope`] to a [`CodeRunner`] and
//! gets the (possibly modified) sandbox back together with the result.  The
//! sandbox is returned even on failure so assignments made before an error
//! are not lost in collect-all mode.

use futures_util::future::{BoxFuture, FutureExt};

use super::interp::{Interpreter, Policy, Scope};
use super::sandbox::Sandbox;
use super::value::Value;
use super::EvalError;

/// Default evaluation-step budget for [`SandboxedRunner`].
pub const DEFAULT_MAX_STEPS: usize = 100_000;

/// Result of one code evaluation.
#[derive(Debug)]
pub struct RunOutcome {
    pub sandbox: Sandbox,
    pub result: Result<Value, EvalError>,
}

/// Evaluates command code against a sandbox and scope.
pub trait CodeRunner: Send + Sync {
    fn run<'a>(&'a self, code: &'a str, sandbox: Sandbox, scope: &'a dyn Scope) -> BoxFuture<'a, RunOutcome>;

    /// Short name for diagnostics.
    fn name(&self) -> &str {
        "custom"
    }
}

/// The default runner: no ambient built-ins and a bounded step count.
#[derive(Debug, Clone, Copy)]
pub struct SandboxedRunner {
    max_steps: usize,
}

impl SandboxedRunner {
    pub fn new(max_steps: usize) -> Self {
        SandboxedRunner { max_steps }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }
}

impl Default for SandboxedRunner {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_STEPS)
    }
}

impl CodeRunner for SandboxedRunner {
    fn run<'a>(&'a self, code: &'a str, sandbox: Sandbox, scope: &'a dyn Scope) -> BoxFuture<'a, RunOutcome> {
        run_with(code, sandbox, scope, Policy::sandboxed(self.max_steps))
    }

    fn name(&self) -> &str {
        "sandboxed"
    }
}

/// Trusted-template runner: exposes `env()` and `Date.now()` and has no
/// step budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectRunner;

impl CodeRunner for DirectRunner {
    fn run<'a>(&'a self, code: &'a str, sandbox: Sandbox, scope: &'a dyn Scope) -> BoxFuture<'a, RunOutcome> {
        run_with(code, sandbox, scope, Policy::trusted())
    }

    fn name(&self) -> &str {
        "direct"
    }
}

fn run_with<'a>(code: &'a str, sandbox: Sandbox, scope: &'a dyn Scope, policy: Policy) -> BoxFuture<'a, RunOutcome> {
    async move {
        let mut interp = Interpreter::new(sandbox, scope, policy);
        let result = interp.run(code).await;
        RunOutcome {
            sandbox: interp.into_sandbox(),
            result,
        }
    }
    .boxed()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
