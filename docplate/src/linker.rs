//! Command linker: turns the flat command list into a block tree.
//!
//! `FOR … END-FOR` and `IF … END-IF` pairs become [`Block`]s, everything
//! else is a [`CommandNode::Leaf`].  Aliases are resolved here, so the engine
//! never sees a CALL whose target it does not know.

use std::collections::BTreeMap;

use tracing::warn;

use crate::command::{CommandKind, RawCommand};
use crate::error::ReportError;
use crate::scanner::ScannedCommand;
use crate::tree::NodeId;

// ── Types ─────────────────────────────────────────────────────────────────────

/// A command together with where it sits in the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Located {
    pub command: RawCommand,
    /// The `w:t` holding the command text.
    pub text_node: NodeId,
    /// The run holding the command.
    pub anchor: NodeId,
}

impl From<ScannedCommand> for Located {
    fn from(s: ScannedCommand) -> Self {
        Located {
            command: s.command,
            text_node: s.text_node,
            anchor: s.anchor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockHeader {
    For { var: String, expr: String },
    If { cond: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub open: Located,
    pub close: Located,
    pub children: Vec<CommandNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandNode {
    Leaf(Located),
    Block(Block),
}

/// Named command bodies registered by ALIAS / CMD_NODE.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, RawCommand>,
}

impl AliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register `name body` from an ALIAS or CMD_NODE command.
    fn define(&mut self, cmd: &RawCommand) -> Result<(), ReportError> {
        let code = cmd.code.trim();
        let (name, body) = match code.find(char::is_whitespace) {
            Some(i) => (&code[..i], code[i..].trim()),
            None => (code, ""),
        };
        if name.is_empty() || body.is_empty() {
            return Err(ReportError::invalid(&cmd.raw, "ALIAS needs a name and a body"));
        }
        let target = RawCommand::parse(body);
        if target.kind.is_structural() {
            return Err(ReportError::invalid(
                &cmd.raw,
                format!("{} cannot be used as an alias body", target.kind),
            ));
        }
        self.entries.insert(name.to_owned(), target);
        Ok(())
    }

    fn resolve(&self, cmd: &RawCommand) -> Result<RawCommand, ReportError> {
        let name = cmd.code.trim();
        match self.entries.get(name) {
            Some(target) => Ok(cmd.with_body(target.kind, target.code.clone())),
            None => Err(ReportError::invalid(&cmd.raw, format!("alias '{name}' is not defined"))),
        }
    }
}

/// A linked part.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Linked {
    pub nodes: Vec<CommandNode>,
    /// Code of the first QUERY command, if any.
    pub query: Option<String>,
}

// ── Header parsing ────────────────────────────────────────────────────────────

/// Parse `var IN expr`.
pub fn parse_for_header(cmd: &RawCommand) -> Result<BlockHeader, ReportError> {
    let code = cmd.code.trim();
    let (var, rest) = code.split_once(char::is_whitespace).unwrap_or((code, ""));
    let rest = rest.trim_start();
    let (keyword, rest) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let rest = rest.trim();

    let var = var.strip_prefix('$').unwrap_or(var);
    let valid_var = !var.is_empty() && var.chars().all(|c| c.is_alphanumeric() || c == '_');
    if !valid_var || !keyword.eq_ignore_ascii_case("IN") || rest.is_empty() {
        return Err(ReportError::invalid(&cmd.raw, "FOR must read 'FOR <var> IN <expression>'"));
    }
    Ok(BlockHeader::For {
        var: var.to_owned(),
        expr: rest.to_owned(),
    })
}

// ── Linking ───────────────────────────────────────────────────────────────────

struct Frame {
    header: BlockHeader,
    open: Located,
    children: Vec<CommandNode>,
}

/// Build the block tree for one part.  Alias definitions accumulate in
/// `aliases` so later parts can use them.
pub fn link(scanned: Vec<ScannedCommand>, aliases: &mut AliasTable) -> Result<Linked, ReportError> {
    let mut root: Vec<CommandNode> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut query: Option<String> = None;

    for sc in scanned {
        let mut located = Located::from(sc);
        let cmd = &located.command;
        match cmd.kind {
            CommandKind::For => {
                let header = parse_for_header(cmd)?;
                stack.push(Frame { header, open: located, children: Vec::new() });
                continue;
            }
            CommandKind::If => {
                if cmd.code.is_empty() {
                    return Err(ReportError::invalid(&cmd.raw, "IF needs a condition"));
                }
                let header = BlockHeader::If { cond: cmd.code.clone() };
                stack.push(Frame { header, open: located, children: Vec::new() });
                continue;
            }
            CommandKind::EndFor | CommandKind::EndIf => {
                let frame = stack
                    .pop()
                    .ok_or_else(|| ReportError::syntax(&cmd.raw, format!("unexpected {}", cmd.kind)))?;
                match (&frame.header, cmd.kind) {
                    (BlockHeader::For { var, .. }, CommandKind::EndFor) => {
                        let closing = cmd.code.trim();
                        let closing = closing.strip_prefix('$').unwrap_or(closing);
                        if !closing.is_empty() && closing != var.as_str() {
                            return Err(ReportError::syntax(
                                &cmd.raw,
                                format!("END-FOR {closing} does not close FOR {var}"),
                            ));
                        }
                    }
                    (BlockHeader::If { .. }, CommandKind::EndIf) => {}
                    _ => {
                        return Err(ReportError::syntax(
                            &cmd.raw,
                            format!("{} does not match {}", cmd.kind, frame.open.command.raw.trim()),
                        ))
                    }
                }
                let block = CommandNode::Block(Block {
                    header: frame.header,
                    open: frame.open,
                    close: located,
                    children: frame.children,
                });
                push_node(&mut stack, &mut root, block);
                continue;
            }
            CommandKind::Alias | CommandKind::CmdNode => aliases.define(cmd)?,
            CommandKind::Call => {
                let resolved = aliases.resolve(cmd)?;
                located.command = resolved;
            }
            CommandKind::Query => {
                if query.is_none() {
                    query = Some(cmd.code.clone());
                } else {
                    warn!(command = %cmd.raw.trim(), "ignoring additional QUERY command");
                }
            }
            _ => {}
        }
        push_node(&mut stack, &mut root, CommandNode::Leaf(located));
    }

    if let Some(frame) = stack.last() {
        return Err(ReportError::syntax(
            &frame.open.command.raw,
            format!("unterminated {} block", frame.open.command.kind),
        ));
    }
    Ok(Linked { nodes: root, query })
}

fn push_node(stack: &mut [Frame], root: &mut Vec<CommandNode>, node: CommandNode) {
    match stack.last_mut() {
        Some(frame) => frame.children.push(node),
        None => root.push(node),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
