//! Wire encoding of rendered trees and patches
//!
//! Trees serialize as objects with a reserved `"s"` key for statics and
//! integer-string keys `"0".."D-1"` for dynamics. Range slots become
//! `{"s": [...], "d": [items]}`; range patches become arrays of compact
//! ops: `["r", key]`, `["u", key, changes]`, `["a", [items]]`,
//! `["i", target, position, [items]]`, `["o", [keys]]`.

use serde_json::{Map, Value, json};

use crate::diff::{InsertPosition, Patch, RangeOp, SlotPatch};
use crate::tree::{RangeItem, RenderedTree, SlotValue};

/// Encode a full rendered tree. `include_statics` controls the
/// top-level `s` array only; nested subtrees always carry theirs.
pub fn tree_to_wire(tree: &RenderedTree, include_statics: bool) -> Value {
    let mut map = Map::new();
    if include_statics {
        map.insert("s".into(), statics_to_wire(&tree.statics));
    }
    for (idx, slot) in tree.slots.iter().enumerate() {
        map.insert(idx.to_string(), slot_to_wire(slot));
    }
    Value::Object(map)
}

/// Encode a sparse patch. Absent slots mean "unchanged".
pub fn patch_to_wire(patch: &Patch) -> Value {
    let mut map = Map::new();
    if let Some(statics) = &patch.statics {
        map.insert("s".into(), statics_to_wire(statics));
    }
    for (idx, change) in &patch.slots {
        let value = match change {
            SlotPatch::Replace(slot) => slot_to_wire(slot),
            SlotPatch::Nested(nested) => patch_to_wire(nested),
            SlotPatch::Range(ops) => Value::Array(ops.iter().map(op_to_wire).collect()),
        };
        map.insert(idx.to_string(), value);
    }
    Value::Object(map)
}

fn statics_to_wire(statics: &[String]) -> Value {
    Value::Array(statics.iter().map(|s| Value::String(s.clone())).collect())
}

fn slot_to_wire(slot: &SlotValue) -> Value {
    match slot {
        SlotValue::Scalar(s) => Value::String(s.clone()),
        SlotValue::Nested { tree, .. } => tree_to_wire(tree, true),
        SlotValue::Range(range) => {
            json!({
                "s": statics_to_wire(&range.statics),
                "d": range.items.iter().map(item_to_wire).collect::<Vec<_>>(),
            })
        }
    }
}

/// Items carry dynamics only; the iteration statics are shared.
fn item_to_wire(item: &RangeItem) -> Value {
    let mut map = Map::new();
    for (idx, slot) in item.slots.iter().enumerate() {
        map.insert(idx.to_string(), slot_to_wire(slot));
    }
    Value::Object(map)
}

fn op_to_wire(op: &RangeOp) -> Value {
    match op {
        RangeOp::Remove(key) => json!(["r", key]),
        RangeOp::Update(key, changes) => json!(["u", key, patch_to_wire(changes)]),
        RangeOp::Append(items) => {
            json!(["a", items.iter().map(item_to_wire).collect::<Vec<_>>()])
        }
        RangeOp::Insert {
            target,
            position,
            items,
        } => {
            json!([
                "i",
                target,
                position_str(*position),
                items.iter().map(item_to_wire).collect::<Vec<_>>(),
            ])
        }
        RangeOp::Reorder(order) => json!(["o", order]),
    }
}

fn position_str(position: InsertPosition) -> &'static str {
    match position {
        InsertPosition::Before => "before",
        InsertPosition::After => "after",
        InsertPosition::Start => "start",
        InsertPosition::End => "end",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Template;
    use crate::diff::diff;
    use crate::render::render;
    use serde_json::json;

    #[test]
    fn pure_literal_template_still_emits_statics() {
        let template = Template::parse("t", "<p>static</p>").unwrap();
        let tree = render(&template, &json!({}));
        assert_eq!(tree_to_wire(&tree, true), json!({"s": ["<p>static</p>"]}));
    }

    #[test]
    fn nested_replacement_in_a_patch_carries_its_statics() {
        let template =
            Template::parse("t", "{{if .OK}}<a>ok</a>{{else}}<b>no</b>{{end}}").unwrap();
        let p = render(&template, &json!({"OK": true}));
        let c = render(&template, &json!({"OK": false}));
        let patch = diff(&p, &c, true).unwrap();
        assert_eq!(patch_to_wire(&patch), json!({"0": {"s": ["<b>no</b>"]}}));
    }

    #[test]
    fn range_slot_encodes_shared_statics_and_items() {
        let template = Template::parse(
            "t",
            r#"<ul>{{range .Items}}<li data-key="{{.ID}}">{{.Text}}</li>{{end}}</ul>"#,
        )
        .unwrap();
        let tree = render(&template, &json!({"Items": [{"ID": "a", "Text": "x"}]}));
        assert_eq!(
            tree_to_wire(&tree, true),
            json!({
                "s": ["<ul>", "</ul>"],
                "0": {
                    "s": ["<li data-key=\"", "\">", "</li>"],
                    "d": [{"0": "a", "1": "x"}],
                },
            })
        );
    }
}
