//! Patch application
//!
//! Replays a [`Patch`] over the tree it was diffed from, yielding the
//! tree it was diffed to. The browser client does the same against the
//! live DOM; this server-side twin backs the round-trip property tests
//! and server-side reconstruction.

use crate::diff::{InsertPosition, Patch, RangeOp, SlotPatch};
use crate::tree::{RangeItem, RenderedRange, RenderedTree, SlotValue};

/// Apply a patch produced by [`diff`](crate::diff::diff) on `prev`.
pub fn apply(prev: &RenderedTree, patch: &Patch) -> RenderedTree {
    let mut tree = prev.clone();
    if let Some(statics) = &patch.statics {
        tree.statics = statics.clone();
    }
    apply_slots(&mut tree.slots, patch);
    tree
}

fn apply_slots(slots: &mut [SlotValue], patch: &Patch) {
    for (&idx, change) in &patch.slots {
        let Some(slot) = slots.get_mut(idx) else {
            continue;
        };
        match change {
            SlotPatch::Replace(value) => *slot = value.clone(),
            SlotPatch::Nested(nested) => {
                if let SlotValue::Nested { tree, .. } = slot {
                    apply_slots(&mut tree.slots, nested);
                }
            }
            SlotPatch::Range(ops) => {
                if let SlotValue::Range(range) = slot {
                    for op in ops {
                        apply_range_op(range, op);
                    }
                }
            }
        }
    }
}

fn apply_range_op(range: &mut RenderedRange, op: &RangeOp) {
    match op {
        RangeOp::Remove(key) => {
            range.items.retain(|item| item.key.wire_key() != *key);
        }
        RangeOp::Update(key, changes) => {
            if let Some(item) = range.items.iter_mut().find(|i| i.key.wire_key() == *key) {
                apply_slots(&mut item.slots, changes);
            }
        }
        RangeOp::Reorder(order) => {
            let mut remaining: Vec<RangeItem> = std::mem::take(&mut range.items);
            for key in order {
                if let Some(pos) = remaining.iter().position(|i| i.key.wire_key() == *key) {
                    range.items.push(remaining.remove(pos));
                }
            }
            // keys the reorder does not mention keep their old order
            range.items.extend(remaining);
        }
        RangeOp::Append(items) => {
            range.items.extend(items.iter().cloned());
        }
        RangeOp::Insert {
            target,
            position,
            items,
        } => {
            let at = match (target, position) {
                (None, InsertPosition::Start) => 0,
                (None, _) => range.items.len(),
                (Some(key), pos) => {
                    let Some(anchor) = range.items.iter().position(|i| i.key.wire_key() == *key)
                    else {
                        return;
                    };
                    match pos {
                        InsertPosition::Before | InsertPosition::Start => anchor,
                        InsertPosition::After | InsertPosition::End => anchor + 1,
                    }
                }
            };
            range.items.splice(at..at, items.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Template;
    use crate::diff::diff;
    use crate::render::render;
    use serde_json::{Value, json};

    /// apply(P, diff(P, C)) == C
    fn roundtrip(src: &str, prev: Value, curr: Value) {
        let template = Template::parse("test.html", src).unwrap();
        let p = render(&template, &prev);
        let c = render(&template, &curr);
        match diff(&p, &c, true) {
            Some(patch) => assert_eq!(apply(&p, &patch), c, "patch {patch:?}"),
            None => assert_eq!(p, c, "no patch means no change"),
        }
    }

    const ITEMS: &str = r#"<ul>{{range .Items}}<li data-key="{{.ID}}">{{.Text}}</li>{{end}}</ul>"#;

    fn items(pairs: &[(&str, &str)]) -> Value {
        json!({"Items": pairs.iter().map(|(id, text)| json!({"ID": id, "Text": text})).collect::<Vec<_>>()})
    }

    #[test]
    fn roundtrip_scalar() {
        roundtrip(
            "<p>Hello {{.Name}}!</p>",
            json!({"Name": "Ada"}),
            json!({"Name": "Bob"}),
        );
    }

    #[test]
    fn roundtrip_conditional_swap() {
        let src = "{{if .OK}}<a>{{.X}}</a>{{else}}<b>no</b>{{end}}";
        roundtrip(src, json!({"OK": true, "X": "1"}), json!({"OK": false}));
        roundtrip(src, json!({"OK": false}), json!({"OK": true, "X": "2"}));
        roundtrip(
            src,
            json!({"OK": true, "X": "1"}),
            json!({"OK": true, "X": "2"}),
        );
    }

    #[test]
    fn roundtrip_range_mutations() {
        let cases: &[(&[(&str, &str)], &[(&str, &str)])] = &[
            (&[], &[("a", "x")]),
            (&[("a", "x")], &[]),
            (&[("a", "x")], &[("a", "x"), ("b", "y")]),
            (&[("a", "x"), ("b", "y"), ("c", "z")], &[("a", "x"), ("c", "z")]),
            (
                &[("a", "x"), ("b", "y"), ("c", "z")],
                &[("b", "y2"), ("a", "x"), ("c", "z")],
            ),
            (
                &[("b", "y"), ("d", "w")],
                &[("a", "x"), ("b", "y"), ("c", "z"), ("d", "w")],
            ),
            (
                &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")],
                &[("d", "4"), ("c", "3"), ("b", "2"), ("a", "1")],
            ),
            (
                &[("a", "1"), ("b", "2")],
                &[("c", "3"), ("b", "9"), ("d", "5"), ("a", "1")],
            ),
        ];
        for (prev, curr) in cases {
            roundtrip(ITEMS, items(prev), items(curr));
        }
    }

    #[test]
    fn roundtrip_positional_items() {
        let src = "{{range .Items}}<li>{{.}}</li>{{end}}";
        roundtrip(
            src,
            json!({"Items": ["a", "b", "c"]}),
            json!({"Items": ["a", "c"]}),
        );
        roundtrip(
            src,
            json!({"Items": ["a"]}),
            json!({"Items": ["a", "b", "c"]}),
        );
        roundtrip(src, json!({"Items": []}), json!({"Items": ["x"]}));
    }

    #[test]
    fn roundtrip_nested_ranges() {
        let src = r#"{{range .Groups}}<ul id="{{.ID}}">{{range .Members}}<li data-key="{{.ID}}">{{.Name}}</li>{{end}}</ul>{{end}}"#;
        roundtrip(
            src,
            json!({"Groups": [
                {"ID": "g1", "Members": [{"ID": "m1", "Name": "Ada"}, {"ID": "m2", "Name": "Bob"}]},
            ]}),
            json!({"Groups": [
                {"ID": "g1", "Members": [{"ID": "m2", "Name": "Bobby"}, {"ID": "m1", "Name": "Ada"}]},
                {"ID": "g2", "Members": []},
            ]}),
        );
    }

    #[test]
    fn roundtrip_range_else_transition() {
        let src = "{{range .Items}}<li>{{.}}</li>{{else}}<p>empty</p>{{end}}";
        roundtrip(src, json!({"Items": ["a"]}), json!({"Items": []}));
        roundtrip(src, json!({"Items": []}), json!({"Items": ["a"]}));
    }
}
