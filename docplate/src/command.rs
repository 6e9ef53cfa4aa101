//! Command model and keyword classification.
//!
//! A command is the text between a start and an end delimiter.  Its first
//! whitespace-separated token selects the [`CommandKind`]; the remainder is
//! the code handed to the evaluator.  Three one-character shorthands exist:
//! `=expr` (INS), `!expr` (EXEC) and `*name` (CALL).

use std::fmt;

use serde::Serialize;

/// Closed set of command kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum CommandKind {
    Query,
    #[serde(rename = "CMD_NODE")]
    CmdNode,
    Alias,
    For,
    EndFor,
    If,
    EndIf,
    Ins,
    Exec,
    Call,
    Image,
    Link,
    Html,
}

/// Keyword table, matched case-insensitively against the first token.
pub const BUILT_IN_COMMANDS: &[(&str, CommandKind)] = &[
    ("QUERY", CommandKind::Query),
    ("CMD_NODE", CommandKind::CmdNode),
    ("ALIAS", CommandKind::Alias),
    ("FOR", CommandKind::For),
    ("END-FOR", CommandKind::EndFor),
    ("IF", CommandKind::If),
    ("END-IF", CommandKind::EndIf),
    ("INS", CommandKind::Ins),
    ("EXEC", CommandKind::Exec),
    ("CALL", CommandKind::Call),
    ("IMAGE", CommandKind::Image),
    ("LINK", CommandKind::Link),
    ("HTML", CommandKind::Html),
];

impl CommandKind {
    pub fn keyword(self) -> &'static str {
        BUILT_IN_COMMANDS
            .iter()
            .find(|(_, k)| *k == self)
            .map_or("INS", |(name, _)| name)
    }

    pub fn from_keyword(word: &str) -> Option<CommandKind> {
        BUILT_IN_COMMANDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(word))
            .map(|(_, k)| *k)
    }

    /// Block openers and closers.
    pub fn is_block_marker(self) -> bool {
        matches!(
            self,
            CommandKind::For | CommandKind::EndFor | CommandKind::If | CommandKind::EndIf
        )
    }

    /// Kinds that may not be the body of an alias.
    pub fn is_structural(self) -> bool {
        self.is_block_marker()
            || matches!(
                self,
                CommandKind::Alias | CommandKind::CmdNode | CommandKind::Query | CommandKind::Call
            )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One command as it appears in the template.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawCommand {
    /// Text between the delimiters, untrimmed.
    pub raw: String,
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Everything after the keyword (or shorthand), trimmed.
    pub code: String,
}

impl RawCommand {
    /// Classify the text between a pair of delimiters.
    pub fn parse(raw: &str) -> RawCommand {
        let text = raw.trim();
        let (kind, code) = classify(text);
        RawCommand {
            raw: raw.to_owned(),
            kind,
            code: code.trim().to_owned(),
        }
    }

    /// The same command with a different kind and code (alias expansion).
    pub fn with_body(&self, kind: CommandKind, code: String) -> RawCommand {
        RawCommand {
            raw: self.raw.clone(),
            kind,
            code,
        }
    }
}

fn classify(text: &str) -> (CommandKind, &str) {
    if let Some(rest) = text.strip_prefix('=') {
        return (CommandKind::Ins, rest);
    }
    if let Some(rest) = text.strip_prefix('!') {
        // A leading `!=` is not the EXEC shorthand.
        if !rest.starts_with('=') {
            return (CommandKind::Exec, rest);
        }
    }
    if let Some(rest) = text.strip_prefix('*') {
        return (CommandKind::Call, rest);
    }

    let (word, rest) = match text.find(char::is_whitespace) {
        Some(i) => (&text[..i], &text[i..]),
        None => (text, ""),
    };
    match CommandKind::from_keyword(word) {
        Some(kind) => (kind, rest),
        None => (CommandKind::Ins, text),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_code(raw: &str) -> (CommandKind, String) {
        let c = RawCommand::parse(raw);
        (c.kind, c.code)
    }

    #[test]
    fn keywords_case_insensitive() {
        assert_eq!(kind_code("INS name"), (CommandKind::Ins, "name".into()));
        assert_eq!(kind_code(" for item in items "), (CommandKind::For, "item in items".into()));
        assert_eq!(kind_code("End-For item"), (CommandKind::EndFor, "item".into()));
        assert_eq!(kind_code("END-IF"), (CommandKind::EndIf, String::new()));
        assert_eq!(kind_code("cmd_node x y"), (CommandKind::CmdNode, "x y".into()));
    }

    #[test]
    fn shorthands() {
        assert_eq!(kind_code("= a + b"), (CommandKind::Ins, "a + b".into()));
        assert_eq!(kind_code("!x = 1"), (CommandKind::Exec, "x = 1".into()));
        assert_eq!(kind_code("*greet"), (CommandKind::Call, "greet".into()));
    }

    #[test]
    fn unknown_leading_token_is_ins() {
        assert_eq!(kind_code("name.first"), (CommandKind::Ins, "name.first".into()));
        assert_eq!(kind_code("a + b"), (CommandKind::Ins, "a + b".into()));
        assert_eq!(kind_code("  "), (CommandKind::Ins, String::new()));
    }

    #[test]
    fn keyword_needs_word_boundary() {
        assert_eq!(kind_code("format(x)"), (CommandKind::Ins, "format(x)".into()));
        assert_eq!(kind_code("IFS"), (CommandKind::Ins, "IFS".into()));
    }

    #[test]
    fn raw_kept_verbatim() {
        let c = RawCommand::parse(" INS x ");
        assert_eq!(c.raw, " INS x ");
    }

    #[test]
    fn serializes_with_type_field() {
        let json = serde_json::to_value(RawCommand::parse("END-FOR x")).unwrap();
        assert_eq!(json["type"], "END-FOR");
        assert_eq!(json["code"], "x");
        let json = serde_json::to_value(RawCommand::parse("CMD_NODE a b")).unwrap();
        assert_eq!(json["type"], "CMD_NODE");
    }

    #[test]
    fn kind_predicates() {
        assert!(CommandKind::For.is_block_marker());
        assert!(CommandKind::Call.is_structural());
        assert!(!CommandKind::Exec.is_structural());
        assert_eq!(CommandKind::EndFor.to_string(), "END-FOR");
    }
}
