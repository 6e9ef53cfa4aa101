//! Template expression language.
//!
//! Command code is a small JavaScript-like expression language: literals,
//! member access (with `?.`), calls, arrow functions, the usual operators,
//! template strings and `;`-separated sequences with assignments.  There are
//! no statements, loops or function declarations; iteration is expressed
//! with FOR commands in the template, or with `map`/`filter` inside code.
//!
//! # Quick start
//!
//! ```rust
//! use docplate::script::{CodeRunner, EmptyScope, Sandbox, SandboxedRunner, Value};
//!
//! let runner = SandboxedRunner::default();
//! let out = futures_util::FutureExt::now_or_never(
//!     runner.run("x = 6; x * 7", Sandbox::new(), &EmptyScope),
//! )
//! .unwrap();
//! assert_eq!(out.result, Ok(Value::Int(42)));
//! assert_eq!(out.sandbox.get("x"), Some(&Value::Int(6)));
//! ```

pub mod builtins;
pub mod expr;
pub mod interp;
pub mod runner;
pub mod sandbox;
pub mod value;

use thiserror::Error;

// Re-exports for convenience.
pub use interp::{EmptyScope, Interpreter, Policy, Scope};
pub use runner::{CodeRunner, DirectRunner, RunOutcome, SandboxedRunner};
pub use sandbox::Sandbox;
pub use value::{HostFunction, Value};

/// Failure while evaluating command code.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("{0} is not defined")]
    Reference(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("{0}")]
    Runtime(String),
    #[error("evaluation exceeded {0} steps")]
    StepLimit(usize),
}
