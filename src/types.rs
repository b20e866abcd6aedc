//! Language-neutral type descriptors (spec §3.1 / §4.B).
//!
//! These are immutable once extracted from DWARF (`dwarf::mod`) and are the
//! blueprint `tree::Tree::instantiate` walks to build a mutable composite
//! value tree.

use crate::error::{GenError, Result};
use indexmap::IndexMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseIntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl BaseIntWidth {
    pub fn bits(self) -> u32 {
        match self {
            BaseIntWidth::W8 => 8,
            BaseIntWidth::W16 => 16,
            BaseIntWidth::W32 => 32,
            BaseIntWidth::W64 => 64,
        }
    }

    pub fn from_byte_size(byte_size: u64) -> Option<Self> {
        match byte_size {
            1 => Some(BaseIntWidth::W8),
            2 => Some(BaseIntWidth::W16),
            4 => Some(BaseIntWidth::W32),
            8 => Some(BaseIntWidth::W64),
            _ => None,
        }
    }
}

/// A member of an `Aggregate`: its type plus the bit window it occupies.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub descriptor: TypeDescriptor,
    pub bit_size: u32,
    pub bit_offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub members: IndexMap<String, Member>,
    pub bit_size: u32,
}

impl Aggregate {
    /// Construct an aggregate, checking the "member fits inside the
    /// aggregate" invariant from spec §3.1.
    pub fn new(members: IndexMap<String, Member>, bit_size: u32) -> Result<Self> {
        for (name, member) in &members {
            if member.bit_offset + member.bit_size > bit_size {
                return Err(GenError::MalformedDebugInfo(format!(
                    "member '{name}' at offset {} size {} exceeds aggregate size {bit_size}",
                    member.bit_offset, member.bit_size
                )));
            }
        }
        Ok(Aggregate { members, bit_size })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub arms: IndexMap<String, TypeDescriptor>,
    pub bit_size: u32,
}

impl Overlay {
    /// Construct an overlay, enforcing spec §3.1's sizing rules: all
    /// non-`BaseInt` arms share one size, any `BaseInt` arm is at least
    /// that size, and an overlay made only of `BaseInt` arms is invalid.
    pub fn new(arms: IndexMap<String, TypeDescriptor>) -> Result<Self> {
        let mut non_base_size: Option<u32> = None;
        for (name, arm) in &arms {
            if let TypeDescriptor::BaseInt(_) = arm {
                continue;
            }
            let size = arm.bit_size();
            match non_base_size {
                None => non_base_size = Some(size),
                Some(expected) if expected != size => {
                    return Err(GenError::InvalidOverlay(
                        name.clone(),
                        format!("arm size {size} does not match overlay size {expected}"),
                    ));
                }
                _ => {}
            }
        }
        let Some(bit_size) = non_base_size else {
            return Err(GenError::InvalidOverlay(
                "<overlay>".to_string(),
                "overlay of only BaseInt arms is unsupported".to_string(),
            ));
        };
        for (name, arm) in &arms {
            if let TypeDescriptor::BaseInt(w) = arm {
                if w.bits() < bit_size {
                    return Err(GenError::InvalidOverlay(
                        name.clone(),
                        format!("BaseInt arm of {} bits is narrower than overlay size {bit_size}", w.bits()),
                    ));
                }
            }
        }
        Ok(Overlay { arms, bit_size })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrayType {
    pub element: Box<TypeDescriptor>,
    pub count: u32,
}

impl ArrayType {
    pub fn bit_size(&self) -> u32 {
        self.element.bit_size() * self.count
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    BaseInt(BaseIntWidth),
    Aggregate(Aggregate),
    Overlay(Overlay),
    Array(ArrayType),
}

impl TypeDescriptor {
    pub fn bit_size(&self) -> u32 {
        match self {
            TypeDescriptor::BaseInt(w) => w.bits(),
            TypeDescriptor::Aggregate(a) => a.bit_size,
            TypeDescriptor::Overlay(o) => o.bit_size,
            TypeDescriptor::Array(a) => a.bit_size(),
        }
    }
}

/// A named enumeration: symbol -> integer value (spec §3.1). Not part of
/// any layout; consumed only by constraint expressions (spec §4.G).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Enumeration {
    pub variants: IndexMap<String, i64>,
}

#[cfg(test)]
mod test {
    use super::*;

    fn leaf(bits: u32, offset: u32) -> Member {
        Member {
            descriptor: TypeDescriptor::BaseInt(match bits {
                8 => BaseIntWidth::W8,
                16 => BaseIntWidth::W16,
                32 => BaseIntWidth::W32,
                64 => BaseIntWidth::W64,
                _ => unreachable!(),
            }),
            bit_size: bits,
            bit_offset: offset,
        }
    }

    #[test]
    fn aggregate_rejects_member_overflowing_size() {
        let mut members = IndexMap::new();
        members.insert("a".to_string(), leaf(16, 8));
        assert!(Aggregate::new(members, 16).is_err());
    }

    #[test]
    fn overlay_rejects_all_baseint_arms() {
        let mut arms = IndexMap::new();
        arms.insert("raw".to_string(), TypeDescriptor::BaseInt(BaseIntWidth::W32));
        assert!(Overlay::new(arms).is_err());
    }

    #[test]
    fn overlay_rejects_mismatched_arm_sizes() {
        let mut arms = IndexMap::new();
        let mut members_a = IndexMap::new();
        members_a.insert("x".to_string(), leaf(16, 0));
        arms.insert(
            "a".to_string(),
            TypeDescriptor::Aggregate(Aggregate::new(members_a, 16).unwrap()),
        );
        let mut members_b = IndexMap::new();
        members_b.insert("y".to_string(), leaf(8, 0));
        arms.insert(
            "b".to_string(),
            TypeDescriptor::Aggregate(Aggregate::new(members_b, 8).unwrap()),
        );
        assert!(Overlay::new(arms).is_err());
    }

    #[test]
    fn overlay_allows_wider_baseint_arm() {
        let mut arms = IndexMap::new();
        let mut members_a = IndexMap::new();
        members_a.insert("x".to_string(), leaf(16, 0));
        arms.insert(
            "fields".to_string(),
            TypeDescriptor::Aggregate(Aggregate::new(members_a, 16).unwrap()),
        );
        arms.insert("raw".to_string(), TypeDescriptor::BaseInt(BaseIntWidth::W32));
        let overlay = Overlay::new(arms).unwrap();
        assert_eq!(overlay.bit_size, 16);
    }
}
