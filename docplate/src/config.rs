//! `.docplaterc` option file parser.
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | set a run option |
//! | `/let <name>=<value>` or `/let <name> <value>` | add an additional-context value |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! `/let` values are parsed as JSON when they can be (`/let limit=10`,
//! `/let ids=[1,2]`) and kept as plain strings otherwise.
//!
//! Recognised `/set` options:
//!
//! | Name | Value |
//! |------|-------|
//! | `delimiter` | command delimiter, used for both ends |
//! | `cmd_start`, `cmd_end` | asymmetric command delimiters |
//! | `literal_delimiter` | literal-XML delimiter (`off` disables) |
//! | `process_line_breaks`, `sandbox`, `fail_fast`, `reject_nullish`, `fix_smart_quotes` | boolean |
//! | `exec_output` | `discard` or `insert` |
//! | `max_steps` | positive integer |
//! | `runner` | `sandboxed`, `direct`, or `lua` (with the `lua` feature) |

use std::path::{Path, PathBuf};
#[cfg(feature = "lua")]
use std::sync::Arc;

use directories::ProjectDirs;
use thiserror::Error;

use crate::report::{ExecOutput, Options};
use crate::script::Value;

/// Name of the rc file looked up in the working directory.
pub const LOCAL_RC: &str = ".docplaterc";

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Options loaded from an rc file.
#[derive(Debug, Default)]
pub struct Config {
    pub options: Options,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an rc string on top of the default options.
    ///
    /// Returns the config and a list of any parse errors on recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let errors = config.apply_str(s);
        (config, errors)
    }

    /// Apply an rc string to this config, returning the per-line errors.
    pub fn apply_str(&mut self, s: &str) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let args_str = args_str.trim();

            let result = match cmd {
                "set" => parse_assignment("/set", &split_args(args_str))
                    .and_then(|(name, value)| set_option(&mut self.options, &name, &value)),
                "let" => parse_assignment("/let", &split_args(args_str)).map(|(name, value)| {
                    self.options.additional_context.insert(name, let_value(&value));
                }),
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        errors
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }

    /// Candidate rc files, in the order they are tried.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(dirs) = ProjectDirs::from("", "", "docplate") {
            paths.push(dirs.config_dir().join("docplaterc"));
        }
        paths.push(PathBuf::from(LOCAL_RC));
        paths
    }

    /// The first existing rc file from [`search_paths`](Self::search_paths).
    pub fn find() -> Option<PathBuf> {
        Self::search_paths().into_iter().find(|p| p.is_file())
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if !in_quotes => in_quotes = true,
            '"' if in_quotes => in_quotes = false,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

// ── /set and /let ─────────────────────────────────────────────────────────────

/// Parse `<name>=<value>` or `<name> <value>`.
fn parse_assignment(directive: &str, tokens: &[String]) -> Result<(String, String), String> {
    if tokens.is_empty() {
        return Err(format!("{directive}: requires an argument"));
    }

    let (name, value) = if let Some((name, first)) = tokens[0].split_once('=') {
        let mut value = first.to_owned();
        for t in &tokens[1..] {
            value.push(' ');
            value.push_str(t);
        }
        (name.to_owned(), value)
    } else if tokens.len() >= 2 {
        (tokens[0].clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("{directive}: missing value for '{}'", tokens[0]));
    };

    if name.is_empty() {
        return Err(format!("{directive}: name cannot be empty"));
    }
    Ok((name, value))
}

fn let_value(raw: &str) -> Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from(json),
        Err(_) => Value::from(raw),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "on" | "yes" | "true" => Ok(true),
        "0" | "off" | "no" | "false" => Ok(false),
        _ => Err(format!("{name}: expected on/off, got '{value}'")),
    }
}

/// Apply one `name=value` option to `options`.
pub fn set_option(options: &mut Options, name: &str, value: &str) -> Result<(), String> {
    match name {
        "delimiter" | "cmd_start" | "cmd_end" if value.is_empty() => {
            return Err(format!("{name}: delimiter cannot be empty"));
        }
        "delimiter" => {
            options.delimiters.start = value.to_owned();
            options.delimiters.end = value.to_owned();
        }
        "cmd_start" => options.delimiters.start = value.to_owned(),
        "cmd_end" => options.delimiters.end = value.to_owned(),
        "literal_delimiter" => {
            options.literal_delimiter = if value.eq_ignore_ascii_case("off") {
                String::new()
            } else {
                value.to_owned()
            };
        }
        "process_line_breaks" => options.process_line_breaks = parse_bool(name, value)?,
        "sandbox" => options.sandbox = parse_bool(name, value)?,
        "fail_fast" => options.fail_fast = parse_bool(name, value)?,
        "reject_nullish" => options.reject_nullish = parse_bool(name, value)?,
        "fix_smart_quotes" => options.fix_smart_quotes = parse_bool(name, value)?,
        "exec_output" => {
            options.exec_output = match value {
                "discard" => ExecOutput::Discard,
                "insert" => ExecOutput::Insert,
                _ => return Err(format!("exec_output: expected discard or insert, got '{value}'")),
            };
        }
        "max_steps" => {
            options.max_steps = match value.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(format!("max_steps: expected a positive integer, got '{value}'")),
            };
        }
        "runner" => match value {
            "sandboxed" => {
                options.runner = None;
                options.sandbox = true;
            }
            "direct" => {
                options.runner = None;
                options.sandbox = false;
            }
            #[cfg(feature = "lua")]
            "lua" => options.runner = Some(Arc::new(crate::lua::LuaRunner::new())),
            _ => return Err(format!("runner: unknown runner '{value}'")),
        },
        _ => return Err(format!("unknown option '{name}'")),
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
