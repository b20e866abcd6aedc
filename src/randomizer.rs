//! Randomization driver (spec §4.E): drives N solver invocations over one
//! reusable randomizer tree, yielding N immutable frame snapshots.
//!
//! The canonical Frame shape assumed here mirrors §8.3's own scenarios: an
//! overlay whose arms include one named `fields` (an aggregate carrying
//! `count`/`width`/`height`/`depth`/`type`/`id`) — the built-in constraints
//! and the `id` field override (§4.D) are expressed against `fields.*`.

use crate::bitint::BitInt;
use crate::config::RandCfg;
use crate::constraints::{self, builtin_constraints, Constraint};
use crate::enums::EnumIndex;
use crate::error::Result;
use crate::solver::Solver;
use crate::tree::{NodeId, Tree};
use crate::types::TypeDescriptor;

const ID_PATH: &str = "fields.id";

fn disable_id_field(tree: &mut Tree, root: NodeId) {
    if let Ok(node) = tree.field(root, ID_PATH) {
        tree.set_is_rand(node, false);
    }
}

fn set_id_field(tree: &mut Tree, root: NodeId, index: u32) -> Result<()> {
    if let Ok(node) = tree.field(root, ID_PATH) {
        let bit_size = tree.bit_size(node);
        let masked = (index as u128) & 0xFFFF_FFFF;
        tree.set_val(node, BitInt::from_u128(bit_size, masked), false)?;
    }
    Ok(())
}

fn declare_randoms<S: Solver>(tree: &mut Tree, node: NodeId, solver: &mut S) {
    if !tree.is_rand(node) {
        return;
    }
    if tree.is_leaf(node) {
        if tree.rand_mode(node) {
            solver.declare_random(node, tree.bit_size(node));
        }
        return;
    }
    for child in tree.children(node) {
        declare_randoms(tree, child, solver);
    }
}

/// Drives one test entry's worth of frames over a persistent randomizer
/// tree (spec §4.E).
pub struct Randomizer<S: Solver> {
    descriptor: TypeDescriptor,
    tree: Tree,
    solver: S,
}

impl<S: Solver> Randomizer<S> {
    pub fn new(descriptor: TypeDescriptor, mut solver: S, enums: &EnumIndex, rnd_cfg: Option<&RandCfg>) -> Result<Self> {
        let mut tree = Tree::instantiate(&descriptor)?;
        let root = tree.root();
        tree.pre_rand(root);
        disable_id_field(&mut tree, root);

        if let Some(cfg) = rnd_cfg {
            for path in &cfg.enables {
                if let Ok(node) = tree.field(root, path) {
                    tree.set_rand_mode(node, true);
                }
            }
        }

        declare_randoms(&mut tree, root, &mut solver);

        for c in builtin_constraints(enums) {
            solver.add_constraint("base", c);
        }
        solver.enable_block("base", true);

        if let Some(cfg) = rnd_cfg {
            for (name, text) in &cfg.constraints_frame {
                let expr = constraints::compile(text, enums)?;
                solver.add_constraint("base", Constraint { name: name.clone(), expr, soft: false });
            }
            for (idx, block) in &cfg.per_cmd_constraints_frame {
                let block_name = format!("constr_idx{idx}");
                for (name, text) in block {
                    let expr = constraints::compile(text, enums)?;
                    solver.add_constraint(&block_name, Constraint { name: name.clone(), expr, soft: false });
                }
            }
        }

        Ok(Randomizer { descriptor, tree, solver })
    }

    /// Lazily produce `num_cmds` frame snapshots (spec §4.E step 5 / Design
    /// Notes "generator-style emission").
    pub fn generate(&mut self, num_cmds: u32) -> impl Iterator<Item = Result<Tree>> + '_ {
        (0..num_cmds).map(move |i| self.solve_one(i))
    }

    fn solve_one(&mut self, index: u32) -> Result<Tree> {
        let block_name = format!("constr_idx{index}");
        self.solver.enable_block(&block_name, true);
        let solved = self.solver.solve(&mut self.tree);
        self.solver.enable_block(&block_name, false);
        solved.map_err(|e| match e {
            crate::error::GenError::ConstraintUnsat(_) => crate::error::GenError::ConstraintUnsat(index as usize),
            other => other,
        })?;

        let root = self.tree.root();
        self.tree.post_rand(root)?;

        let mut frame = Tree::instantiate(&self.descriptor)?;
        let frame_root = frame.root();
        frame.set_val(frame_root, self.tree.get_val(root), false)?;
        set_id_field(&mut frame, frame_root, index)?;
        Ok(frame)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::solver::RejectionSampler;
    use crate::types::{Aggregate, BaseIntWidth, Member};
    use indexmap::IndexMap;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::collections::HashMap;

    fn leaf(bits: u32, offset: u32) -> Member {
        Member {
            descriptor: TypeDescriptor::BaseInt(match bits {
                8 => BaseIntWidth::W8,
                16 => BaseIntWidth::W16,
                32 => BaseIntWidth::W32,
                _ => unreachable!(),
            }),
            bit_size: bits,
            bit_offset: offset,
        }
    }

    fn small_frame_descriptor() -> TypeDescriptor {
        let mut inner = IndexMap::new();
        inner.insert("count".to_string(), leaf(8, 0));
        inner.insert("id".to_string(), leaf(32, 8));
        let fields_agg = TypeDescriptor::Aggregate(Aggregate::new(inner, 40).unwrap());

        let mut outer = IndexMap::new();
        outer.insert("fields".to_string(), Member { descriptor: fields_agg, bit_size: 40, bit_offset: 0 });
        TypeDescriptor::Aggregate(Aggregate::new(outer, 40).unwrap())
    }

    #[test]
    fn id_field_matches_command_index() {
        let descriptor = small_frame_descriptor();
        let enums = EnumIndex::new(HashMap::new());
        let solver = RejectionSampler::new(ChaCha8Rng::seed_from_u64(7));
        let mut randomizer = Randomizer::new(descriptor, solver, &enums, None).unwrap();

        let frames: Vec<Tree> = randomizer.generate(3).collect::<Result<Vec<_>>>().unwrap();
        for (i, frame) in frames.iter().enumerate() {
            let id_node = frame.field(frame.root(), "fields.id").unwrap();
            assert_eq!(frame.get_val(id_node).to_u128(), Some(i as u128));
        }
    }

    #[test]
    fn per_command_constraint_applies_only_to_its_index() {
        let descriptor = small_frame_descriptor();
        let enums = EnumIndex::new(HashMap::new());
        let solver = RejectionSampler::new(ChaCha8Rng::seed_from_u64(7));

        let mut per_cmd = HashMap::new();
        let mut at_one = HashMap::new();
        at_one.insert("count_is_five".to_string(), "self.fields.count == 5".to_string());
        per_cmd.insert(1u32, at_one);
        let cfg = RandCfg { enables: vec![], constraints_frame: HashMap::new(), per_cmd_constraints_frame: per_cmd };

        let mut randomizer = Randomizer::new(descriptor, solver, &enums, Some(&cfg)).unwrap();
        let frames: Vec<Tree> = randomizer.generate(3).collect::<Result<Vec<_>>>().unwrap();

        let count_at = |f: &Tree| f.get_val(f.field(f.root(), "fields.count").unwrap()).to_u128();
        assert_eq!(count_at(&frames[1]), Some(5));
    }
}
