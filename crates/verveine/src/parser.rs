//! Template parser
//!
//! Turns `{{.Path}}` / `{{if}}` / `{{range}}` source into a [`Block`]
//! tree. Only the boundaries between statics and dynamics are
//! interpreted here; everything between delimiters that is not a block
//! keyword must be a dotted path. Event attributes (`lvt-click` and
//! friends) and `data-lvt-*` markers are static bytes as far as the
//! parser is concerned.

use crate::ast::{Block, BlockBuilder, DynamicNode, Path};
use crate::error::{SourceSpan, SyntaxError, TemplateError, TemplateSource};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Key-attribute prefixes, in precedence order. A static literal ending
/// with one of these marks the dynamic slot that follows it as the
/// iteration's key slot.
const KEY_ATTRS: [&str; 4] = ["data-lvt-key=\"", "data-key=\"", "key=\"", "id=\""];

/// What ended a block body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Terminator {
    Eof,
    Else,
    End,
}

pub(crate) struct Parser {
    src: TemplateSource,
    pos: usize,
}

impl Parser {
    pub(crate) fn new(src: TemplateSource) -> Self {
        Self { src, pos: 0 }
    }

    pub(crate) fn parse(mut self) -> Result<Block, TemplateError> {
        let (block, _) = self.parse_block(None)?;
        Ok(block)
    }

    /// Parse a run of statics and dynamics until `{{else}}`, `{{end}}`,
    /// or end of input. `inside` names the enclosing block kind, or None
    /// at the top level.
    fn parse_block(&mut self, inside: Option<&str>) -> Result<(Block, Terminator), TemplateError> {
        let mut block = BlockBuilder::new();
        loop {
            let rest = &self.src.source[self.pos..];
            let Some(open_rel) = rest.find(OPEN) else {
                block.push_text(rest);
                self.pos = self.src.source.len();
                if let Some(kind) = inside {
                    return Err(self
                        .err(
                            "end of input",
                            format!("`{{{{end}}}}` closing the {kind} block"),
                            SourceSpan::new(self.pos, 0),
                        )
                        .into());
                }
                return Ok((block.finish(), Terminator::Eof));
            };

            block.push_text(&rest[..open_rel]);
            let open_at = self.pos + open_rel;
            let after_open = open_at + OPEN.len();

            let Some(close_rel) = self.src.source[after_open..].find(CLOSE) else {
                return Err(self
                    .err("end of input", "`}}`", SourceSpan::new(open_at, OPEN.len()))
                    .into());
            };
            let close_at = after_open + close_rel;
            self.pos = close_at + CLOSE.len();

            let raw = &self.src.source[after_open..close_at];
            let action = raw.trim();
            let action_at = after_open + (raw.len() - raw.trim_start().len());
            let span = SourceSpan::new(action_at, action.len());

            if action.is_empty() {
                return Err(self
                    .err("empty action", "a path or block keyword", span)
                    .into());
            }

            if action == "end" {
                if inside.is_none() {
                    return Err(self
                        .err("`{{end}}`", "it only closes `if`/`range` blocks", span)
                        .into());
                }
                return Ok((block.finish(), Terminator::End));
            }

            if action == "else" {
                if inside.is_none() {
                    return Err(self
                        .err("`{{else}}`", "it only appears inside `if`/`range`", span)
                        .into());
                }
                return Ok((block.finish(), Terminator::Else));
            }

            if let Some(rest) = keyword_arg(action, "if") {
                let cond = self.parse_path(rest, action_at + (action.len() - rest.len()))?;
                let (then_branch, else_branch) = self.parse_branches("if", span)?;
                block.push_dynamic(DynamicNode::If {
                    cond,
                    then_branch,
                    else_branch,
                });
                continue;
            }

            if let Some(rest) = keyword_arg(action, "range") {
                let over = self.parse_path(rest, action_at + (action.len() - rest.len()))?;
                let (body, else_branch) = self.parse_branches("range", span)?;
                let key_slot = find_key_slot(&body);
                block.push_dynamic(DynamicNode::Range {
                    over,
                    body,
                    else_branch,
                    key_slot,
                });
                continue;
            }

            if action.starts_with('.') {
                let path = self.parse_path(action, action_at)?;
                block.push_dynamic(DynamicNode::Field(path));
                continue;
            }

            return Err(self
                .err(
                    format!("`{action}`"),
                    "a `.`-path, `if`, `range`, `else` or `end`",
                    span,
                )
                .into());
        }
    }

    /// Parse a body and optional else branch up to the closing `{{end}}`.
    fn parse_branches(
        &mut self,
        kind: &'static str,
        open_span: SourceSpan,
    ) -> Result<(Block, Option<Block>), TemplateError> {
        let (body, term) = self.parse_block(Some(kind))?;
        match term {
            Terminator::End => Ok((body, None)),
            Terminator::Else => {
                let (else_branch, term) = self.parse_block(Some(kind))?;
                if term == Terminator::Else {
                    return Err(self
                        .err("second `{{else}}`", "`{{end}}`", open_span)
                        .into());
                }
                Ok((body, Some(else_branch)))
            }
            Terminator::Eof => unreachable!("parse_block reports unclosed blocks"),
        }
    }

    /// Parse a dotted path: `.` alone is the current context; otherwise
    /// every segment must be an identifier.
    fn parse_path(&self, text: &str, at: usize) -> Result<Path, TemplateError> {
        let span = SourceSpan::new(at, text.len());
        let Some(body) = text.strip_prefix('.') else {
            return Err(self
                .err(format!("`{text}`"), "a path starting with `.`", span)
                .into());
        };
        if body.is_empty() {
            return Ok(Path {
                segments: Vec::new(),
                span,
            });
        }
        let mut segments = Vec::new();
        for seg in body.split('.') {
            if !is_ident(seg) {
                return Err(self
                    .err(format!("`{text}`"), "identifier path segments", span)
                    .into());
            }
            segments.push(seg.to_string());
        }
        Ok(Path { segments, span })
    }

    fn err(
        &self,
        found: impl Into<String>,
        expected: impl Into<String>,
        span: SourceSpan,
    ) -> SyntaxError {
        SyntaxError {
            found: found.into(),
            expected: expected.into(),
            span,
            src: self.src.clone(),
        }
    }
}

/// `keyword_arg("if .OK", "if")` → `Some(".OK")`
fn keyword_arg<'a>(action: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = action.strip_prefix(keyword)?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Scan an iteration body's own statics (not nested blocks') for the
/// key attribute. Precedence is by attribute, then by position.
fn find_key_slot(body: &Block) -> Option<usize> {
    for attr in KEY_ATTRS {
        for (i, s) in body.statics[..body.dynamics.len()].iter().enumerate() {
            if s.ends_with(attr) {
                return Some(i);
            }
        }
    }
    None
}
