//! Serialize a sequence of frame snapshots to packed binary and to a
//! human-readable YAML text snapshot (spec §4.F / §6.2).
//!
//! Reads only through `Tree::get_val` and `Tree::view`; stateless, no
//! caching between frames, matching `a2ltool`'s direct-byte-writing style
//! for formats with exactly one writer and one invariant (here, I7).

use crate::error::Result;
use crate::tree::{ChildrenView, NodeId, Tree};
use serde_yaml::{Mapping, Value};
use std::io::Write;

/// Write each frame's top-level value as little-endian 32-bit words in
/// ascending bit order (spec §6.2 "Frame binary").
pub fn write_frame_binary<W: Write>(frames: &[Tree], mut out: W) -> Result<()> {
    for frame in frames {
        let root = frame.root();
        for word in frame.get_val(root).to_le_u32_words() {
            out.write_all(&word.to_le_bytes())?;
        }
    }
    Ok(())
}

fn node_to_yaml(tree: &Tree, node: NodeId) -> Value {
    match tree.view(node) {
        ChildrenView::Leaf => {
            let bits = tree.bit_size(node);
            let hex = tree.get_val(node).to_hex();
            Value::String(hex_with_width(&hex, bits))
        }
        ChildrenView::Aggregate(members) => {
            let mut map = Mapping::new();
            for (name, child) in members {
                map.insert(Value::String(name), node_to_yaml(tree, child));
            }
            Value::Mapping(map)
        }
        ChildrenView::Overlay(arms) => {
            let mut map = Mapping::new();
            for (name, child) in arms {
                map.insert(Value::String(name), node_to_yaml(tree, child));
            }
            Value::Mapping(map)
        }
        ChildrenView::Array(elements) => {
            Value::Sequence(elements.into_iter().map(|c| node_to_yaml(tree, c)).collect())
        }
    }
}

fn hex_with_width(hex: &str, bits: u32) -> String {
    let width = ((bits + 3) / 4) as usize;
    if hex.len() >= width {
        hex.to_string()
    } else {
        format!("{hex:0>width$}")
    }
}

/// Write the ordered list of frame snapshots as a YAML sequence (spec §6.2
/// "Frame text"). No anchors or aliases are produced since each frame is
/// serialized from a fresh `serde_yaml::Value` tree.
pub fn write_frame_text<W: Write>(frames: &[Tree], mut out: W) -> Result<()> {
    let sequence: Vec<Value> = frames.iter().map(|f| node_to_yaml(f, f.root())).collect();
    let text = serde_yaml::to_string(&Value::Sequence(sequence))?;
    out.write_all(text.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::types::{Aggregate, BaseIntWidth, Member, TypeDescriptor};
    use indexmap::IndexMap;

    #[test]
    fn leaf_round_trip_binary() {
        let desc = TypeDescriptor::BaseInt(BaseIntWidth::W32);
        let mut tree = Tree::instantiate(&desc).unwrap();
        let root = tree.root();
        tree.set_val(root, crate::bitint::BitInt::from_u128(32, 0xDEADBEEF), false).unwrap();

        let mut bytes = Vec::new();
        write_frame_binary(std::slice::from_ref(&tree), &mut bytes).unwrap();
        assert_eq!(bytes, vec![0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn aggregate_text_preserves_key_order_and_hex_width() {
        let mut members = IndexMap::new();
        members.insert(
            "a".to_string(),
            Member { descriptor: TypeDescriptor::BaseInt(BaseIntWidth::W8), bit_size: 3, bit_offset: 0 },
        );
        members.insert(
            "b".to_string(),
            Member { descriptor: TypeDescriptor::BaseInt(BaseIntWidth::W16), bit_size: 13, bit_offset: 3 },
        );
        let desc = TypeDescriptor::Aggregate(Aggregate::new(members, 16).unwrap());
        let mut tree = Tree::instantiate(&desc).unwrap();
        let root = tree.root();
        tree.set_val(root, crate::bitint::BitInt::from_u128(16, 0xBEEF), false).unwrap();

        let mut text = Vec::new();
        write_frame_text(std::slice::from_ref(&tree), &mut text).unwrap();
        let text = String::from_utf8(text).unwrap();
        let a_pos = text.find("a:").unwrap();
        let b_pos = text.find("b:").unwrap();
        assert!(a_pos < b_pos);
        assert!(text.contains("a: '7'") || text.contains("a: \"7\""));
    }
}
