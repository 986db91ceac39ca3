//! verveine — live-template tree engine
//!
//! Compiles text templates into trees that separate static literal
//! fragments from dynamic slots, renders those trees against JSON
//! snapshots, and diffs successive renders into minimal patches a thin
//! browser client can apply to the live DOM.
//!
//! The pipeline:
//!
//! ```text
//! source ──parse──▶ Template ──render──▶ RenderedTree ──diff──▶ Patch
//! ```
//!
//! ```
//! use serde_json::json;
//! use verveine::{Template, render, diff, patch_to_wire};
//!
//! let template = Template::parse("hello", "<p>Hello {{.Name}}!</p>")?;
//! let prev = render(&template, &json!({"Name": "Ada"}));
//! let curr = render(&template, &json!({"Name": "Bob"}));
//! let patch = diff(&prev, &curr, true).expect("something changed");
//! assert_eq!(patch_to_wire(&patch), json!({"0": "Bob"}));
//! # Ok::<(), verveine::TemplateError>(())
//! ```

mod apply;
mod ast;
mod diff;
mod error;
mod escape;
mod parser;
mod render;
mod tree;
mod value;
mod wire;

pub use apply::apply;
pub use ast::{Block, DynamicNode, Path, Template};
pub use diff::{InsertPosition, Patch, RangeOp, SlotPatch, diff};
pub use error::{SourceSpan, SyntaxError, TemplateError, TemplateSource};
pub use escape::html_escape;
pub use render::render;
pub use tree::{
    BRANCH_ELSE, BRANCH_THEN, ItemKey, RangeItem, RenderedRange, RenderedTree, SlotValue,
};
pub use value::{ValueExt, resolve};
pub use wire::{patch_to_wire, tree_to_wire};
