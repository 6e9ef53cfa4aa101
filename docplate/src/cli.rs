//! Command-line argument parsing.
//!
//! Usage:
//!   docplate render [-f[<file>]] [-d<data.json>] [-o<out.docx>] [-s<name>=<value>]... [-v] <template>
//!   docplate list   [-f[<file>]] [-s<name>=<value>]... [-v] <template>
//!   docplate meta   [-v] <template>

use std::path::{Path, PathBuf};

pub const USAGE: &str = "\
Usage: docplate render [-f[<file>]] [-d<data.json>] [-o<out.docx>] [-s<name>=<value>]... [-v] <template>
       docplate list   [-f[<file>]] [-s<name>=<value>]... [-v] <template>
       docplate meta   [-v] <template>";

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    pub command: Subcommand,
    /// Config-file specification.
    pub config: ConfigFile,
    pub template: PathBuf,
    /// JSON data file (`-d<file>`).
    pub data: Option<PathBuf>,
    /// Output path (`-o<file>`).
    pub output: Option<PathBuf>,
    /// Option overrides (`-s<name>=<value>`), applied after the config file.
    pub settings: Vec<(String, String)>,
    /// Number of `-v` flags.
    pub verbose: u8,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Subcommand {
    /// Fill a template and write the report.
    #[default]
    Render,
    /// Print the template's commands as JSON.
    List,
    /// Print the template's document properties as JSON.
    Meta,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search the config directory, then `./.docplaterc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut positional: Vec<String> = Vec::new();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        // `--` ends flag processing.
        if arg == "--" {
            i += 1;
            positional.extend(argv[i..].iter().cloned());
            break;
        }

        if !arg.starts_with('-') || arg == "-" {
            positional.push(arg.to_owned());
            i += 1;
            continue;
        }

        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'v' => args.verbose = args.verbose.saturating_add(1),

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') && is_rc_path(&argv[i + 1]) {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                c @ ('d' | 'o' | 's') => {
                    let value = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err(format!("-{c} requires an argument"));
                    };
                    match c {
                        'd' => args.data = Some(PathBuf::from(value)),
                        'o' => args.output = Some(PathBuf::from(value)),
                        _ => {
                            let Some((name, v)) = value.split_once('=') else {
                                return Err(format!("-s expects <name>=<value>, got '{value}'"));
                            };
                            args.settings.push((name.to_owned(), v.to_owned()));
                        }
                    }
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    args.command = match positional.next().as_deref() {
        Some("render") => Subcommand::Render,
        Some("list") => Subcommand::List,
        Some("meta") => Subcommand::Meta,
        Some(other) => return Err(format!("unknown command: {other}")),
        None => return Err("missing command".to_owned()),
    };
    args.template = match positional.next() {
        Some(t) => PathBuf::from(t),
        None => return Err("missing template path".to_owned()),
    };
    if let Some(extra) = positional.next() {
        return Err(format!("unexpected argument: {extra}"));
    }

    Ok(args)
}

/// A separate `-f` argument is only taken as the rc path when it is not the
/// subcommand name.
fn is_rc_path(s: &str) -> bool {
    !matches!(s, "render" | "list" | "meta")
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Where `render` writes when no `-o` was given: `report.docx` becomes
/// `report-out.docx` next to the template.
pub fn default_output(template: &Path) -> PathBuf {
    let stem = template.file_stem().and_then(|s| s.to_str()).unwrap_or("report");
    let ext = template.extension().and_then(|s| s.to_str()).unwrap_or("docx");
    template.with_file_name(format!("{stem}-out.{ext}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn render_minimal() {
        let a = parse_argv(&argv(&["render", "t.docx"])).unwrap();
        assert_eq!(a.command, Subcommand::Render);
        assert_eq!(a.template, PathBuf::from("t.docx"));
        assert!(matches!(a.config, ConfigFile::Search));
        assert_eq!(a.verbose, 0);
    }

    #[test]
    fn subcommands() {
        assert_eq!(parse_argv(&argv(&["list", "t.docx"])).unwrap().command, Subcommand::List);
        assert_eq!(parse_argv(&argv(&["meta", "t.docx"])).unwrap().command, Subcommand::Meta);
        assert!(parse_argv(&argv(&["print", "t.docx"])).is_err());
    }

    #[test]
    fn value_flags_embedded_and_separate() {
        let a = parse_argv(&argv(&["render", "-ddata.json", "-o", "out.docx", "t.docx"])).unwrap();
        assert_eq!(a.data, Some(PathBuf::from("data.json")));
        assert_eq!(a.output, Some(PathBuf::from("out.docx")));
    }

    #[test]
    fn settings_collected_in_order() {
        let a = parse_argv(&argv(&["render", "-sfail_fast=off", "-s", "delimiter={{", "t.docx"])).unwrap();
        assert_eq!(
            a.settings,
            [("fail_fast".to_owned(), "off".to_owned()), ("delimiter".to_owned(), "{{".to_owned())]
        );
        assert!(parse_argv(&argv(&["render", "-sbogus", "t.docx"])).is_err());
    }

    #[test]
    fn verbosity_counts() {
        let a = parse_argv(&argv(&["-vv", "meta", "t.docx"])).unwrap();
        assert_eq!(a.verbose, 2);
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f", "render", "t.docx"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.command, Subcommand::Render);
    }

    #[test]
    fn config_explicit_embedded() {
        let a = parse_argv(&argv(&["render", "-fmyrc", "t.docx"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("myrc")));
    }

    #[test]
    fn config_explicit_separate() {
        let a = parse_argv(&argv(&["-f", "myrc", "list", "t.docx"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("myrc")));
        assert_eq!(a.command, Subcommand::List);
    }

    #[test]
    fn missing_and_extra_positionals() {
        assert!(parse_argv(&argv(&[])).is_err());
        assert!(parse_argv(&argv(&["render"])).is_err());
        assert!(parse_argv(&argv(&["render", "a", "b"])).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(parse_argv(&argv(&["-z", "render", "t.docx"])).is_err());
    }

    #[test]
    fn default_output_next_to_template() {
        assert_eq!(default_output(Path::new("dir/invoice.docx")), PathBuf::from("dir/invoice-out.docx"));
    }
}
