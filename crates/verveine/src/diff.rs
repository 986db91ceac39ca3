//! Differential engine
//!
//! Diffs two rendered trees of the same template into a sparse
//! [`Patch`]: only changed slots appear, ranges get keyed operations.
//! Emission order within a range is removals (old order), updates (new
//! order), one reorder if the surviving keys moved, then insertions and
//! appends (new order, consecutive runs batched).

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::tree::{ItemKey, RangeItem, RenderedRange, RenderedTree, SlotValue};

/// A sparse rendered tree: keys present only where the value changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Top-level statics, present only when the client does not have
    /// them cached
    pub statics: Option<Arc<[String]>>,
    pub slots: BTreeMap<usize, SlotPatch>,
}

/// The change at one dynamic slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotPatch {
    /// Full replacement: scalar change, branch swap, or type change
    Replace(SlotValue),
    /// Sparse recursion into a same-branch nested tree
    Nested(Patch),
    /// Keyed operations against an ordered collection
    Range(Vec<RangeOp>),
}

/// One differential operation against a range slot.
#[derive(Debug, Clone, PartialEq)]
pub enum RangeOp {
    /// Remove the item with this key
    Remove(String),
    /// Sparse per-item changes for a surviving key
    Update(String, Patch),
    /// Append items at the tail
    Append(Vec<RangeItem>),
    /// Insert items relative to an anchor key (None anchors a boundary)
    Insert {
        target: Option<String>,
        position: InsertPosition,
        items: Vec<RangeItem>,
    },
    /// Reorder surviving keys into this sequence
    Reorder(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
    Start,
    End,
}

/// Diff two rendered trees of the same template.
///
/// Returns `None` when nothing changed: the engine emits nothing for an
/// empty patch. `statics_cached` controls whether the top-level `s`
/// array rides along (it does on the first patch after a fresh
/// connection, and again after the client signals cache eviction).
pub fn diff(prev: &RenderedTree, curr: &RenderedTree, statics_cached: bool) -> Option<Patch> {
    let slots = diff_slots(&prev.slots, &curr.slots);
    if slots.is_empty() {
        return None;
    }
    let statics = (!statics_cached).then(|| curr.statics.clone());
    Some(Patch { statics, slots })
}

fn diff_slots(prev: &[SlotValue], curr: &[SlotValue]) -> BTreeMap<usize, SlotPatch> {
    debug_assert_eq!(prev.len(), curr.len(), "same template, same slot count");
    let mut out = BTreeMap::new();
    for (idx, (p, c)) in prev.iter().zip(curr.iter()).enumerate() {
        match (p, c) {
            (SlotValue::Scalar(a), SlotValue::Scalar(b)) => {
                if a != b {
                    out.insert(idx, SlotPatch::Replace(c.clone()));
                }
            }
            (
                SlotValue::Nested {
                    branch: pb,
                    tree: pt,
                },
                SlotValue::Nested {
                    branch: cb,
                    tree: ct,
                },
            ) => {
                if pb == cb {
                    let slots = diff_slots(&pt.slots, &ct.slots);
                    if !slots.is_empty() {
                        out.insert(
                            idx,
                            SlotPatch::Nested(Patch {
                                statics: None,
                                slots,
                            }),
                        );
                    }
                } else {
                    // branch swap replaces the whole subtree
                    out.insert(idx, SlotPatch::Replace(c.clone()));
                }
            }
            (SlotValue::Range(pr), SlotValue::Range(cr)) => {
                let ops = diff_range(pr, cr);
                if !ops.is_empty() {
                    out.insert(idx, SlotPatch::Range(ops));
                }
            }
            // type change (scalar ⇄ nested ⇄ range)
            _ => {
                out.insert(idx, SlotPatch::Replace(c.clone()));
            }
        }
    }
    out
}

/// Keyed, ordered range diff.
fn diff_range(prev: &RenderedRange, curr: &RenderedRange) -> Vec<RangeOp> {
    let old_index: HashMap<&ItemKey, usize> = prev
        .items
        .iter()
        .enumerate()
        .map(|(i, item)| (&item.key, i))
        .collect();
    let curr_keys: HashSet<&ItemKey> = curr.items.iter().map(|item| &item.key).collect();

    let mut ops = Vec::new();

    // removals, in old order
    for item in &prev.items {
        if !curr_keys.contains(&item.key) {
            ops.push(RangeOp::Remove(item.key.wire_key()));
        }
    }

    // per-item updates for surviving keys, in new order
    for item in &curr.items {
        if let Some(&old) = old_index.get(&item.key) {
            let slots = diff_slots(&prev.items[old].slots, &item.slots);
            if !slots.is_empty() {
                ops.push(RangeOp::Update(
                    item.key.wire_key(),
                    Patch {
                        statics: None,
                        slots,
                    },
                ));
            }
        }
    }

    // one reorder iff the surviving keys' old indices are not already
    // increasing in new order (single monotonicity pass)
    let common_old: Vec<usize> = curr
        .items
        .iter()
        .filter_map(|item| old_index.get(&item.key).copied())
        .collect();
    if common_old.windows(2).any(|w| w[0] >= w[1]) {
        let order = curr
            .items
            .iter()
            .filter(|item| old_index.contains_key(&item.key))
            .map(|item| item.key.wire_key())
            .collect();
        ops.push(RangeOp::Reorder(order));
    }

    // additions: maximal runs of new items, anchored on final positions
    let mut i = 0;
    while i < curr.items.len() {
        if old_index.contains_key(&curr.items[i].key) {
            i += 1;
            continue;
        }
        let start = i;
        while i < curr.items.len() && !old_index.contains_key(&curr.items[i].key) {
            i += 1;
        }
        let items: Vec<RangeItem> = curr.items[start..i].to_vec();
        if i == curr.items.len() {
            // tail runs (and whole-new lists) prefer the shorter append
            ops.push(RangeOp::Append(items));
        } else if start == 0 {
            ops.push(RangeOp::Insert {
                target: None,
                position: InsertPosition::Start,
                items,
            });
        } else {
            ops.push(RangeOp::Insert {
                target: Some(curr.items[start - 1].key.wire_key()),
                position: InsertPosition::After,
                items,
            });
        }
    }

    ops
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Template;
    use crate::render::render;
    use serde_json::{Value, json};

    fn diff_snapshots(src: &str, prev: Value, curr: Value) -> Option<Patch> {
        let template = Template::parse("test.html", src).unwrap();
        let p = render(&template, &prev);
        let c = render(&template, &curr);
        diff(&p, &c, true)
    }

    fn range_ops(patch: &Patch) -> &[RangeOp] {
        let SlotPatch::Range(ops) = &patch.slots[&0] else {
            panic!("expected range ops at slot 0");
        };
        ops
    }

    const ITEMS: &str = r#"<ul>{{range .Items}}<li data-key="{{.ID}}">{{.Text}}</li>{{end}}</ul>"#;

    fn items(pairs: &[(&str, &str)]) -> Value {
        json!({"Items": pairs.iter().map(|(id, text)| json!({"ID": id, "Text": text})).collect::<Vec<_>>()})
    }

    #[test]
    fn identical_snapshots_diff_to_nothing() {
        let snap = items(&[("a", "x"), ("b", "y")]);
        assert_eq!(diff_snapshots(ITEMS, snap.clone(), snap), None);
    }

    #[test]
    fn scalar_change_is_a_single_slot() {
        let patch = diff_snapshots(
            "<p>Hello {{.Name}}!</p>",
            json!({"Name": "Ada"}),
            json!({"Name": "Bob"}),
        )
        .unwrap();
        assert_eq!(patch.slots.len(), 1);
        assert_eq!(
            patch.slots[&0],
            SlotPatch::Replace(SlotValue::Scalar("Bob".into()))
        );
    }

    #[test]
    fn same_branch_conditionals_recurse_sparsely() {
        let patch = diff_snapshots(
            "{{if .OK}}<em>{{.Msg}}</em>{{end}}",
            json!({"OK": true, "Msg": "a"}),
            json!({"OK": true, "Msg": "b"}),
        )
        .unwrap();
        let SlotPatch::Nested(nested) = &patch.slots[&0] else {
            panic!("expected sparse nested patch");
        };
        assert!(nested.statics.is_none());
        assert_eq!(
            nested.slots[&0],
            SlotPatch::Replace(SlotValue::Scalar("b".into()))
        );
    }

    #[test]
    fn branch_swap_replaces_the_subtree() {
        let patch = diff_snapshots(
            "{{if .OK}}<a>ok</a>{{else}}<b>no</b>{{end}}",
            json!({"OK": true}),
            json!({"OK": false}),
        )
        .unwrap();
        let SlotPatch::Replace(SlotValue::Nested { tree, .. }) = &patch.slots[&0] else {
            panic!("expected full nested replacement");
        };
        assert_eq!(tree.to_html(), "<b>no</b>");
    }

    #[test]
    fn range_append_at_tail() {
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x")]),
            items(&[("a", "x"), ("b", "y")]),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert_eq!(ops.len(), 1);
        let RangeOp::Append(added) = &ops[0] else {
            panic!("expected append, got {ops:?}");
        };
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].key, ItemKey::Keyed("b".into()));
    }

    #[test]
    fn range_remove_middle() {
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x"), ("b", "y"), ("c", "z")]),
            items(&[("a", "x"), ("c", "z")]),
        )
        .unwrap();
        assert_eq!(range_ops(&patch), &[RangeOp::Remove("b".into())]);
    }

    #[test]
    fn range_reorder_plus_update() {
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x"), ("b", "y"), ("c", "z")]),
            items(&[("b", "y2"), ("a", "x"), ("c", "z")]),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert_eq!(ops.len(), 2);
        let RangeOp::Update(key, changes) = &ops[0] else {
            panic!("expected update first, got {ops:?}");
        };
        assert_eq!(key, "b");
        assert_eq!(
            changes.slots[&1],
            SlotPatch::Replace(SlotValue::Scalar("y2".into()))
        );
        assert_eq!(
            ops[1],
            RangeOp::Reorder(vec!["b".into(), "a".into(), "c".into()])
        );
    }

    #[test]
    fn no_reorder_when_common_order_is_preserved() {
        // b is removed and d appended; a/c keep their relative order
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x"), ("b", "y"), ("c", "z")]),
            items(&[("a", "x"), ("c", "z"), ("d", "w")]),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert!(
            !ops.iter().any(|op| matches!(op, RangeOp::Reorder(_))),
            "order preserved, got {ops:?}"
        );
    }

    #[test]
    fn no_update_with_empty_changes() {
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x"), ("b", "y")]),
            items(&[("b", "y"), ("a", "x")]),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert_eq!(
            ops,
            &[RangeOp::Reorder(vec!["b".into(), "a".into()])],
            "pure move must not emit updates"
        );
    }

    #[test]
    fn unchanged_key_is_never_removed_and_readded() {
        // key stability: "b" changes text and moves; it must appear as
        // an update, never as remove + add
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x"), ("b", "y")]),
            items(&[("b", "y9"), ("a", "x")]),
        )
        .unwrap();
        for op in range_ops(&patch) {
            match op {
                RangeOp::Remove(k) => assert_ne!(k, "b"),
                RangeOp::Append(added) | RangeOp::Insert { items: added, .. } => {
                    assert!(added.iter().all(|it| it.key != ItemKey::Keyed("b".into())));
                }
                _ => {}
            }
        }
    }

    #[test]
    fn insert_at_head_and_middle() {
        let patch = diff_snapshots(
            ITEMS,
            items(&[("b", "y"), ("d", "w")]),
            items(&[("a", "x"), ("b", "y"), ("c", "z"), ("d", "w")]),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert_eq!(ops.len(), 2);
        let RangeOp::Insert {
            target: None,
            position: InsertPosition::Start,
            items: head,
        } = &ops[0]
        else {
            panic!("expected head insert, got {ops:?}");
        };
        assert_eq!(head[0].key, ItemKey::Keyed("a".into()));
        let RangeOp::Insert {
            target: Some(anchor),
            position: InsertPosition::After,
            items: mid,
        } = &ops[1]
        else {
            panic!("expected middle insert, got {ops:?}");
        };
        assert_eq!(anchor, "b");
        assert_eq!(mid[0].key, ItemKey::Keyed("c".into()));
    }

    #[test]
    fn consecutive_additions_batch_into_one_op() {
        let patch = diff_snapshots(
            ITEMS,
            items(&[("a", "x")]),
            items(&[("a", "x"), ("b", "y"), ("c", "z")]),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert_eq!(ops.len(), 1);
        let RangeOp::Append(added) = &ops[0] else {
            panic!("expected one append, got {ops:?}");
        };
        assert_eq!(added.len(), 2);
    }

    #[test]
    fn positional_items_match_by_index() {
        // removing the middle of an unkeyed list shows up as an update
        // of index 1 plus a removal of the last index
        let patch = diff_snapshots(
            "{{range .Items}}<li>{{.}}</li>{{end}}",
            json!({"Items": ["a", "b", "c"]}),
            json!({"Items": ["a", "c"]}),
        )
        .unwrap();
        let ops = range_ops(&patch);
        assert!(ops.contains(&RangeOp::Remove("@2".into())));
        assert!(
            ops.iter()
                .any(|op| matches!(op, RangeOp::Update(k, _) if k == "@1")),
        );
    }

    #[test]
    fn statics_ride_along_until_cached() {
        let template = Template::parse("t", "<p>{{.N}}</p>").unwrap();
        let p = render(&template, &json!({"N": "1"}));
        let c = render(&template, &json!({"N": "2"}));
        let fresh = diff(&p, &c, false).unwrap();
        assert_eq!(fresh.statics.as_deref(), Some(&*c.statics));
        let cached = diff(&p, &c, true).unwrap();
        assert!(cached.statics.is_none());
    }
}
