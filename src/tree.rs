//! The composite value tree (spec §3.2 / §3.3 / §4.C).
//!
//! Nodes live in a single arena (`Vec<NodeData>`) owned by the `Tree` that
//! built them; parent back-references are plain `NodeId`s into that same
//! arena rather than `Rc`/`Weak` handles, so dropping a tree is one `Vec`
//! deallocation with no cycle to break (Design Notes, option (a)).

use crate::bitint::BitInt;
use crate::error::{GenError, Result};
use crate::types::TypeDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A shape-discriminated, named view of one node's children (see `Tree::view`).
#[derive(Debug, Clone)]
pub enum ChildrenView {
    Leaf,
    Aggregate(Vec<(String, NodeId)>),
    Overlay(Vec<(String, NodeId)>),
    Array(Vec<NodeId>),
}

#[derive(Debug, Clone)]
enum Shape {
    Leaf,
    Aggregate {
        /// (member name, child node, bit offset from aggregate start)
        members: Vec<(String, NodeId, u32)>,
    },
    Overlay {
        /// (arm name, child node)
        arms: Vec<(String, NodeId)>,
    },
    Array {
        elements: Vec<NodeId>,
        elem_size: u32,
    },
}

#[derive(Debug)]
struct NodeData {
    shape: Shape,
    value: BitInt,
    bit_size: u32,
    is_rand: bool,
    rand_mode: bool,
    parent: Option<NodeId>,
}

/// A mutable instantiation of a `TypeDescriptor`. See spec §3.2.
#[derive(Debug)]
pub struct Tree {
    arena: Vec<NodeData>,
    root: NodeId,
}

fn push(arena: &mut Vec<NodeData>, shape: Shape, bit_size: u32) -> NodeId {
    let id = NodeId(arena.len());
    arena.push(NodeData {
        shape,
        value: BitInt::zero(bit_size),
        bit_size,
        is_rand: true,
        rand_mode: true,
        parent: None,
    });
    id
}

fn build_node(arena: &mut Vec<NodeData>, descriptor: &TypeDescriptor) -> Result<NodeId> {
    match descriptor {
        TypeDescriptor::BaseInt(w) => Ok(push(arena, Shape::Leaf, w.bits())),
        TypeDescriptor::Aggregate(agg) => {
            let mut members = Vec::with_capacity(agg.members.len());
            for (name, member) in &agg.members {
                if name.starts_with('_') {
                    return Err(GenError::InvalidField(name.clone()));
                }
                let child = build_node(arena, &member.descriptor)?;
                // A bit-field's member table entry may narrow the child's
                // natural container width (e.g. a `u16:3` field child built
                // from a 16-bit BaseInt but occupying only 3 bits).
                if member.bit_size != arena[child.0].bit_size {
                    arena[child.0].bit_size = member.bit_size;
                    arena[child.0].value = BitInt::zero(member.bit_size);
                }
                members.push((name.clone(), child, member.bit_offset));
            }
            let id = push(arena, Shape::Aggregate { members: members.clone() }, agg.bit_size);
            for (_, child, _) in &members {
                arena[child.0].parent = Some(id);
            }
            Ok(id)
        }
        TypeDescriptor::Overlay(ov) => {
            let mut arms = Vec::with_capacity(ov.arms.len());
            for (name, arm_ty) in &ov.arms {
                if name.starts_with('_') {
                    return Err(GenError::InvalidField(name.clone()));
                }
                let child = build_node(arena, arm_ty)?;
                arms.push((name.clone(), child));
            }
            let id = push(arena, Shape::Overlay { arms: arms.clone() }, ov.bit_size);
            for (_, child) in &arms {
                arena[child.0].parent = Some(id);
            }
            Ok(id)
        }
        TypeDescriptor::Array(arr) => {
            let mut elements = Vec::with_capacity(arr.count as usize);
            for _ in 0..arr.count {
                elements.push(build_node(arena, &arr.element)?);
            }
            let elem_size = arr.element.bit_size();
            let bit_size = elem_size * arr.count;
            let id = push(arena, Shape::Array { elements: elements.clone(), elem_size }, bit_size);
            for child in &elements {
                arena[child.0].parent = Some(id);
            }
            Ok(id)
        }
    }
}

/// Fit `v` into a field of `bit_size` bits: zero-extend if narrower,
/// truncate if wider but only when the discarded high bits are all zero,
/// else `Overflow`.
fn fit_to_width(v: &BitInt, bit_size: u32, field: &str) -> Result<BitInt> {
    if v.bits() == bit_size {
        return Ok(v.clone());
    }
    if v.bits() > bit_size {
        let overflow_bits = v.bits() - bit_size;
        let high = v.get_range(bit_size, overflow_bits);
        if !high.is_zero() {
            return Err(GenError::Overflow {
                field: field.to_string(),
                bits: bit_size,
                value: v.to_u128().unwrap_or(u128::MAX),
            });
        }
        Ok(v.get_range(0, bit_size))
    } else {
        let mut out = BitInt::zero(bit_size);
        out.set_range(0, v.bits(), v);
        Ok(out)
    }
}

enum PathSegment {
    Name(String),
    Index(u32),
}

/// Split a dotted/bracketed field path the way `a2ltool`'s
/// `split_symbol_components` splits a C-style member path, e.g.
/// `"fields.counters[2]"` -> `[Name(fields), Name(counters), Index(2)]`.
fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let invalid = || GenError::InvalidField(path.to_string());
    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return Err(invalid());
        }
        let (name, mut brackets) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };
        if !name.is_empty() {
            if name.starts_with('_') {
                return Err(invalid());
            }
            segments.push(PathSegment::Name(name.to_string()));
        } else if brackets.is_empty() {
            return Err(invalid());
        }
        while !brackets.is_empty() {
            if !brackets.starts_with('[') {
                return Err(invalid());
            }
            let close = brackets.find(']').ok_or_else(invalid)?;
            let idx: u32 = brackets[1..close].parse().map_err(|_| invalid())?;
            segments.push(PathSegment::Index(idx));
            brackets = &brackets[close + 1..];
        }
    }
    Ok(segments)
}

/// Deterministic overlay arm tie-break (spec §4.C `pre_rand`, Design Notes
/// Open Question 1): prefer the first non-`BaseInt`, non-`Array` arm in
/// declaration order; else the first non-`BaseInt` arm; else the first arm.
fn select_arm(arena: &[NodeData], arms: &[(String, NodeId)]) -> NodeId {
    let non_base: Vec<&(String, NodeId)> = arms
        .iter()
        .filter(|(_, c)| !matches!(arena[c.0].shape, Shape::Leaf))
        .collect();
    let non_base_non_array: Option<&&(String, NodeId)> = non_base
        .iter()
        .find(|(_, c)| !matches!(arena[c.0].shape, Shape::Array { .. }));
    if let Some((_, id)) = non_base_non_array {
        return *id;
    }
    if let Some((_, id)) = non_base.first() {
        return *id;
    }
    arms[0].1
}

impl Tree {
    pub fn instantiate(descriptor: &TypeDescriptor) -> Result<Self> {
        let mut arena = Vec::new();
        let root = build_node(&mut arena, descriptor)?;
        Ok(Tree { arena, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn bit_size(&self, node: NodeId) -> u32 {
        self.arena[node.0].bit_size
    }

    pub fn get_val(&self, node: NodeId) -> BitInt {
        self.arena[node.0].value.clone()
    }

    pub fn is_rand(&self, node: NodeId) -> bool {
        self.arena[node.0].is_rand
    }

    pub fn set_is_rand(&mut self, node: NodeId, v: bool) {
        self.arena[node.0].is_rand = v;
    }

    pub fn rand_mode(&self, node: NodeId) -> bool {
        self.arena[node.0].rand_mode
    }

    pub fn set_rand_mode(&mut self, node: NodeId, v: bool) {
        self.arena[node.0].rand_mode = v;
    }

    pub fn is_leaf(&self, node: NodeId) -> bool {
        matches!(self.arena[node.0].shape, Shape::Leaf)
    }

    /// The immediate children of `node` in declaration order, or an empty
    /// vector for a leaf.
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        match &self.arena[node.0].shape {
            Shape::Leaf => Vec::new(),
            Shape::Aggregate { members } => members.iter().map(|(_, c, _)| *c).collect(),
            Shape::Overlay { arms } => arms.iter().map(|(_, c)| *c).collect(),
            Shape::Array { elements, .. } => elements.clone(),
        }
    }

    /// A named, shape-discriminated view of `node`'s children, for callers
    /// (the packer) that need to mirror the original layout structure.
    pub fn view(&self, node: NodeId) -> ChildrenView {
        match &self.arena[node.0].shape {
            Shape::Leaf => ChildrenView::Leaf,
            Shape::Aggregate { members } => {
                ChildrenView::Aggregate(members.iter().map(|(n, c, _)| (n.clone(), *c)).collect())
            }
            Shape::Overlay { arms } => ChildrenView::Overlay(arms.clone()),
            Shape::Array { elements, .. } => ChildrenView::Array(elements.clone()),
        }
    }

    /// Resolve a dotted/bracketed path starting at `start` (spec Design
    /// Notes: "expose a `field(path) -> Node` lookup").
    pub fn field(&self, start: NodeId, path: &str) -> Result<NodeId> {
        let segments = parse_path(path)?;
        let invalid = || GenError::InvalidField(path.to_string());
        let mut current = start;
        for seg in segments {
            current = match (&self.arena[current.0].shape, &seg) {
                (Shape::Aggregate { members }, PathSegment::Name(name)) => members
                    .iter()
                    .find(|(n, _, _)| n == name)
                    .map(|(_, c, _)| *c)
                    .ok_or_else(invalid)?,
                (Shape::Overlay { arms }, PathSegment::Name(name)) => arms
                    .iter()
                    .find(|(n, _)| n == name)
                    .map(|(_, c)| *c)
                    .ok_or_else(invalid)?,
                (Shape::Array { elements, .. }, PathSegment::Index(idx)) => {
                    elements.get(*idx as usize).copied().ok_or_else(invalid)?
                }
                _ => return Err(invalid()),
            };
        }
        Ok(current)
    }

    pub fn set_val(&mut self, node: NodeId, v: BitInt, from_parent: bool) -> Result<()> {
        let bit_size = self.arena[node.0].bit_size;
        let v = fit_to_width(&v, bit_size, &format!("node#{}", node.0))?;
        self.arena[node.0].value = v.clone();

        let shape = self.arena[node.0].shape.clone();
        match shape {
            Shape::Leaf => {}
            Shape::Aggregate { members } => {
                for (_, child, offset) in members {
                    let child_size = self.arena[child.0].bit_size;
                    let piece = v.get_range(offset, child_size);
                    self.set_val(child, piece, true)?;
                }
            }
            Shape::Array { elements, elem_size } => {
                for (i, child) in elements.into_iter().enumerate() {
                    let offset = i as u32 * elem_size;
                    let piece = v.get_range(offset, elem_size);
                    self.set_val(child, piece, true)?;
                }
            }
            Shape::Overlay { arms } => {
                for (_, child) in arms {
                    let child_size = self.arena[child.0].bit_size;
                    let mut extended = BitInt::zero(child_size);
                    extended.set_range(0, bit_size, &v);
                    self.set_val(child, extended, true)?;
                }
            }
        }

        if !from_parent {
            if let Some(parent) = self.arena[node.0].parent {
                self.update_from_member(parent, node)?;
            }
        }
        Ok(())
    }

    fn update_from_member(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        let child_val = self.arena[child.0].value.clone();
        let parent_shape = self.arena[parent.0].shape.clone();
        match parent_shape {
            Shape::Aggregate { members } => {
                let (_, _, offset) = members
                    .iter()
                    .find(|(_, c, _)| *c == child)
                    .ok_or_else(|| GenError::InvalidField(format!("node#{}", child.0)))?;
                let child_size = self.arena[child.0].bit_size;
                let mut new_val = self.arena[parent.0].value.clone();
                new_val.set_range(*offset, child_size, &child_val);
                self.set_val(parent, new_val, false)
            }
            Shape::Array { elements, elem_size } => {
                let idx = elements
                    .iter()
                    .position(|c| *c == child)
                    .ok_or_else(|| GenError::InvalidField(format!("node#{}", child.0)))?;
                let mut new_val = self.arena[parent.0].value.clone();
                new_val.set_range(idx as u32 * elem_size, elem_size, &child_val);
                self.set_val(parent, new_val, false)
            }
            Shape::Overlay { .. } => {
                let bit_size = self.arena[parent.0].bit_size;
                let truncated = child_val.get_range(0, bit_size);
                self.set_val(parent, truncated, false)
            }
            Shape::Leaf => unreachable!("leaf node has no children to update from"),
        }
    }

    /// Finalize overlay-arm selection prior to solving (spec §4.C).
    pub fn pre_rand(&mut self, node: NodeId) {
        self.arena[node.0].is_rand = true;
        let shape = self.arena[node.0].shape.clone();
        match shape {
            Shape::Leaf => {}
            Shape::Aggregate { members } => {
                for (_, child, _) in members {
                    self.pre_rand(child);
                }
            }
            Shape::Array { elements, .. } => {
                for child in elements {
                    self.pre_rand(child);
                }
            }
            Shape::Overlay { arms } => {
                let chosen = select_arm(&self.arena, &arms);
                for (_, child) in &arms {
                    self.arena[child.0].is_rand = *child == chosen;
                }
                self.pre_rand(chosen);
            }
        }
    }

    /// Reconcile solver-assigned leaf values bottom-up (spec §4.C).
    pub fn post_rand(&mut self, node: NodeId) -> Result<()> {
        let shape = self.arena[node.0].shape.clone();
        match shape {
            Shape::Leaf => Ok(()),
            Shape::Aggregate { members } => {
                for (_, child, _) in &members {
                    self.post_rand(*child)?;
                }
                let bit_size = self.arena[node.0].bit_size;
                let mut v = BitInt::zero(bit_size);
                for (_, child, offset) in &members {
                    let cv = self.arena[child.0].value.clone();
                    v.set_range(*offset, self.arena[child.0].bit_size, &cv);
                }
                self.set_val(node, v, true)
            }
            Shape::Array { elements, elem_size } => {
                for child in &elements {
                    self.post_rand(*child)?;
                }
                let bit_size = self.arena[node.0].bit_size;
                let mut v = BitInt::zero(bit_size);
                for (i, child) in elements.iter().enumerate() {
                    let cv = self.arena[child.0].value.clone();
                    v.set_range(i as u32 * elem_size, elem_size, &cv);
                }
                self.set_val(node, v, true)
            }
            Shape::Overlay { arms } => {
                let chosen = arms
                    .iter()
                    .find(|(_, c)| self.arena[c.0].is_rand)
                    .map(|(_, c)| *c)
                    .ok_or_else(|| {
                        GenError::MalformedDebugInfo(
                            "overlay has no randomizable arm after pre_rand".to_string(),
                        )
                    })?;
                self.post_rand(chosen)?;
                let bit_size = self.arena[node.0].bit_size;
                let v = self.arena[chosen.0].value.get_range(0, bit_size);
                self.set_val(node, v, true)
            }
        }
    }
}
