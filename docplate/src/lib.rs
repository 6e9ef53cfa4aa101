//! Report generation from `.docx` templates.
//!
//! A template is an ordinary Word document whose text contains commands
//! between delimiters (`+++` by default):
//!
//! ```text
//! Dear +++INS name+++,
//! +++FOR item IN items+++
//!   +++= $item.title+++ : +++= $item.price+++
//! +++END-FOR item+++
//! ```
//!
//! [`create_report`] scans the document tree for commands, links block
//! commands (FOR/IF) into a tree, evaluates command code with a
//! [`CodeRunner`](script::CodeRunner) and splices the results back into the
//! document.

pub mod cli;
pub mod collector;
pub mod command;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod linker;
pub mod lua;
pub mod metadata;
pub mod mutate;
pub mod package;
pub mod report;
pub mod scanner;
pub mod script;
pub mod tree;
pub mod xml;

pub use context::{DataSource, QueryResolver};
pub use error::ReportError;
pub use metadata::{get_metadata, Metadata};
pub use report::{
    create_report, create_report_probe, list_commands, render_xml, ExecOutput, Options, Probe, ReportOutput,
};
pub use scanner::Delimiters;
pub use script::{EvalError, HostFunction, Value};
