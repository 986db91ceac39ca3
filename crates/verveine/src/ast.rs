//! Compiled template tree
//!
//! A template compiles to an ordered tree of blocks. Each block keeps its
//! static literal fragments strictly interleaved with its dynamic slots:
//! a block with D dynamics stores D + 1 statics and renders as
//! s0 d0 s1 d1 … sD. Slot indices are per block, assigned depth-first
//! left-to-right by the parser, so the same template yields the same
//! indices in every process.

use std::hash::Hasher;
use std::sync::Arc;

use rapidhash::fast::RapidHasher;

use crate::error::{SourceSpan, TemplateError, TemplateSource};
use crate::parser::Parser;

/// A dotted path into the snapshot (`.Name`, `.User.Email`).
///
/// The empty segment list is `.`, the current context value (inside a
/// range iteration, the item itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub segments: Vec<String>,
    pub span: SourceSpan,
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.segments.is_empty() {
            return write!(f, ".");
        }
        for seg in &self.segments {
            write!(f, ".{seg}")?;
        }
        Ok(())
    }
}

/// One node of a block: statics around it, a value inside it.
#[derive(Debug, Clone)]
pub enum DynamicNode {
    /// Scalar slot: the HTML-escaped value at the path
    Field(Path),
    /// Conditional slot: one of two branch subtrees
    If {
        cond: Path,
        then_branch: Block,
        else_branch: Option<Block>,
    },
    /// Range slot: an ordered sequence of iteration subtrees, plus the
    /// slot inside the iteration whose value identifies each item
    Range {
        over: Path,
        body: Block,
        else_branch: Option<Block>,
        key_slot: Option<usize>,
    },
}

/// A run of statics interleaved with dynamic slots.
#[derive(Debug, Clone)]
pub struct Block {
    /// `dynamics.len() + 1` literals; `statics[i]` precedes `dynamics[i]`
    pub statics: Arc<[String]>,
    pub dynamics: Vec<DynamicNode>,
}

impl Block {
    pub fn slot_count(&self) -> usize {
        self.dynamics.len()
    }
}

/// Builder that maintains the interleave invariant structurally: text
/// extends the trailing static, a dynamic always opens a fresh one.
pub(crate) struct BlockBuilder {
    statics: Vec<String>,
    dynamics: Vec<DynamicNode>,
}

impl BlockBuilder {
    pub(crate) fn new() -> Self {
        Self {
            statics: vec![String::new()],
            dynamics: Vec::new(),
        }
    }

    pub(crate) fn push_text(&mut self, text: &str) {
        // statics is never empty
        if let Some(last) = self.statics.last_mut() {
            last.push_str(text);
        }
    }

    pub(crate) fn push_dynamic(&mut self, node: DynamicNode) {
        self.dynamics.push(node);
        self.statics.push(String::new());
    }

    pub(crate) fn finish(self) -> Block {
        debug_assert_eq!(self.statics.len(), self.dynamics.len() + 1);
        Block {
            statics: self.statics.into(),
            dynamics: self.dynamics,
        }
    }
}

/// A compiled template, shared read-only across pages.
#[derive(Debug, Clone)]
pub struct Template {
    pub root: Block,
    pub source: TemplateSource,
    statics_sig: u64,
}

impl Template {
    /// Parse a template from source
    pub fn parse(
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, TemplateError> {
        let name = name.into();
        let source_str: String = source.into();
        let template_source = TemplateSource::new(&name, &source_str);

        let parser = Parser::new(template_source.clone());
        let root = parser.parse()?;
        let statics_sig = hash_statics(&root);

        Ok(Self {
            root,
            source: template_source,
            statics_sig,
        })
    }

    /// Identity hash over every static literal in the tree, hex-encoded.
    ///
    /// Clients echo this back to signal that they still hold the statics
    /// cached; a match lets patches omit the `s` arrays.
    pub fn statics_signature(&self) -> String {
        format!("{:016x}", self.statics_sig)
    }
}

fn hash_statics(root: &Block) -> u64 {
    let mut hasher = RapidHasher::default();
    hash_block(root, &mut hasher);
    hasher.finish()
}

fn hash_block(block: &Block, hasher: &mut RapidHasher) {
    for s in block.statics.iter() {
        hasher.write(s.as_bytes());
        // separator so ["ab",""] and ["a","b"] hash apart
        hasher.write_u8(0xff);
    }
    for dynamic in &block.dynamics {
        match dynamic {
            DynamicNode::Field(_) => hasher.write_u8(0x01),
            DynamicNode::If {
                then_branch,
                else_branch,
                ..
            } => {
                hasher.write_u8(0x02);
                hash_block(then_branch, hasher);
                if let Some(b) = else_branch {
                    hash_block(b, hasher);
                }
            }
            DynamicNode::Range {
                body, else_branch, ..
            } => {
                hasher.write_u8(0x03);
                hash_block(body, hasher);
                if let Some(b) = else_branch {
                    hash_block(b, hasher);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_maintains_interleave_invariant() {
        let mut b = BlockBuilder::new();
        b.push_text("<p>");
        b.push_dynamic(DynamicNode::Field(Path {
            segments: vec!["Name".into()],
            span: SourceSpan::default(),
        }));
        b.push_text("</p>");
        let block = b.finish();
        assert_eq!(block.statics.len(), block.dynamics.len() + 1);
        assert_eq!(&*block.statics, &["<p>".to_string(), "</p>".to_string()]);
    }

    #[test]
    fn consecutive_dynamics_get_empty_statics() {
        let mut b = BlockBuilder::new();
        let field = |name: &str| {
            DynamicNode::Field(Path {
                segments: vec![name.into()],
                span: SourceSpan::default(),
            })
        };
        b.push_dynamic(field("A"));
        b.push_dynamic(field("B"));
        let block = b.finish();
        assert_eq!(block.statics.len(), 3);
        assert!(block.statics.iter().all(|s| s.is_empty()));
    }

    #[test]
    fn statics_signature_is_stable_and_content_sensitive() {
        let a = Template::parse("t", "<p>Hello {{.Name}}!</p>").unwrap();
        let b = Template::parse("t", "<p>Hello {{.Name}}!</p>").unwrap();
        let c = Template::parse("t", "<p>Howdy {{.Name}}!</p>").unwrap();
        assert_eq!(a.statics_signature(), b.statics_signature());
        assert_ne!(a.statics_signature(), c.statics_signature());
    }
}
