//! Rendered trees
//!
//! Evaluating a template against a snapshot produces a [`RenderedTree`]:
//! the block's statics plus one resolved value per dynamic slot. Nested
//! trees remember which branch produced them so the differ can tell a
//! branch swap (replace wholesale) from an in-place change (recurse).

use std::sync::Arc;

/// Branch tag for the taken arm of a conditional (or a range's else arm).
pub const BRANCH_THEN: u8 = 0;
/// Branch tag for the else arm.
pub const BRANCH_ELSE: u8 = 1;

/// Statics plus resolved dynamics for one block.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTree {
    /// `slots.len() + 1` literals, interleaved s0 d0 s1 d1 … sD
    pub statics: Arc<[String]>,
    pub slots: Vec<SlotValue>,
}

/// A resolved dynamic slot.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    /// HTML-escaped scalar
    Scalar(String),
    /// A nested subtree (conditional branch, range else-arm)
    Nested { branch: u8, tree: RenderedTree },
    /// An ordered, keyed sequence of iteration subtrees
    Range(RenderedRange),
}

/// A rendered range slot: the shared per-iteration statics and the items.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRange {
    pub statics: Arc<[String]>,
    pub items: Vec<RangeItem>,
}

/// One rendered iteration, carrying its identity.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeItem {
    pub key: ItemKey,
    pub slots: Vec<SlotValue>,
}

/// Item identity within a range: the resolved key-slot value, or the
/// item's position when the iteration carries no key attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Keyed(String),
    Positional(usize),
}

impl ItemKey {
    /// The key as it appears in wire ops (`"@i"` for positional keys).
    pub fn wire_key(&self) -> String {
        match self {
            ItemKey::Keyed(k) => k.clone(),
            ItemKey::Positional(i) => format!("@{i}"),
        }
    }
}

impl RenderedTree {
    /// Flatten to HTML, statics and dynamics strictly alternating.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_html(&mut out);
        out
    }

    fn write_html(&self, out: &mut String) {
        for (i, slot) in self.slots.iter().enumerate() {
            out.push_str(&self.statics[i]);
            slot.write_html(out);
        }
        if let Some(last) = self.statics.last() {
            out.push_str(last);
        }
    }

    /// Rough heap footprint, used for per-page memory accounting.
    pub fn approx_size(&self) -> usize {
        let statics: usize = self.statics.iter().map(String::len).sum();
        statics + self.slots.iter().map(SlotValue::approx_size).sum::<usize>()
    }
}

impl SlotValue {
    fn write_html(&self, out: &mut String) {
        match self {
            SlotValue::Scalar(s) => out.push_str(s),
            SlotValue::Nested { tree, .. } => tree.write_html(out),
            SlotValue::Range(range) => {
                for item in &range.items {
                    for (i, slot) in item.slots.iter().enumerate() {
                        out.push_str(&range.statics[i]);
                        slot.write_html(out);
                    }
                    if let Some(last) = range.statics.last() {
                        out.push_str(last);
                    }
                }
            }
        }
    }

    fn approx_size(&self) -> usize {
        match self {
            SlotValue::Scalar(s) => s.len(),
            SlotValue::Nested { tree, .. } => tree.approx_size(),
            SlotValue::Range(range) => {
                let statics: usize = range.statics.iter().map(String::len).sum();
                statics
                    + range
                        .items
                        .iter()
                        .map(|it| it.slots.iter().map(SlotValue::approx_size).sum::<usize>())
                        .sum::<usize>()
            }
        }
    }
}
