//! Tree renderer
//!
//! Evaluates a compiled template against a snapshot, producing a
//! [`RenderedTree`]. Rendering is pure: no side effects, byte-for-byte
//! deterministic, safe to call reentrantly from any thread.

use std::collections::HashSet;

use serde_json::Value;

use crate::ast::{Block, DynamicNode, Template};
use crate::escape::html_escape;
use crate::tree::{
    BRANCH_ELSE, BRANCH_THEN, ItemKey, RangeItem, RenderedRange, RenderedTree, SlotValue,
};
use crate::value::{ValueExt, resolve};

/// Render a template against a snapshot.
pub fn render(template: &Template, snapshot: &Value) -> RenderedTree {
    tracing::trace!(template = %template.source.name, "rendering");
    render_block(&template.root, snapshot)
}

fn render_block(block: &Block, ctx: &Value) -> RenderedTree {
    let slots = block
        .dynamics
        .iter()
        .map(|node| render_dynamic(node, ctx))
        .collect();
    RenderedTree {
        statics: block.statics.clone(),
        slots,
    }
}

fn render_dynamic(node: &DynamicNode, ctx: &Value) -> SlotValue {
    match node {
        DynamicNode::Field(path) => {
            let text = resolve(ctx, path)
                .map(|v| html_escape(&v.render_to_string()))
                .unwrap_or_default();
            SlotValue::Scalar(text)
        }
        DynamicNode::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let truthy = resolve(ctx, cond).map(ValueExt::is_truthy).unwrap_or(false);
            if truthy {
                SlotValue::Nested {
                    branch: BRANCH_THEN,
                    tree: render_block(then_branch, ctx),
                }
            } else if let Some(else_branch) = else_branch {
                SlotValue::Nested {
                    branch: BRANCH_ELSE,
                    tree: render_block(else_branch, ctx),
                }
            } else {
                // falsy with no else arm renders as nothing
                SlotValue::Scalar(String::new())
            }
        }
        DynamicNode::Range {
            over,
            body,
            else_branch,
            key_slot,
        } => {
            let entries: Vec<&Value> = match resolve(ctx, over) {
                Some(Value::Array(items)) => items.iter().collect(),
                // dict iteration visits values in key order
                Some(Value::Object(map)) => map.values().collect(),
                _ => Vec::new(),
            };

            if entries.is_empty()
                && let Some(else_branch) = else_branch
            {
                return SlotValue::Nested {
                    branch: BRANCH_ELSE,
                    tree: render_block(else_branch, ctx),
                };
            }

            let mut seen = HashSet::new();
            let items = entries
                .into_iter()
                .enumerate()
                .map(|(i, entry)| {
                    let slots: Vec<SlotValue> = body
                        .dynamics
                        .iter()
                        .map(|node| render_dynamic(node, entry))
                        .collect();
                    let key = item_key(key_slot, &slots, i, &mut seen);
                    RangeItem { key, slots }
                })
                .collect();

            SlotValue::Range(RenderedRange {
                statics: body.statics.clone(),
                items,
            })
        }
    }
}

/// Resolve an item's identity from its key slot. Empty and duplicate
/// key values degrade to positional keys so ops stay unambiguous.
fn item_key(
    key_slot: &Option<usize>,
    slots: &[SlotValue],
    index: usize,
    seen: &mut HashSet<String>,
) -> ItemKey {
    if let Some(slot) = key_slot
        && let Some(SlotValue::Scalar(key)) = slots.get(*slot)
        && !key.is_empty()
        && seen.insert(key.clone())
    {
        return ItemKey::Keyed(key.clone());
    }
    ItemKey::Positional(index)
}
