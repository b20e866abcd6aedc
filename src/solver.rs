//! The constraint solver capability (spec §9, Design Notes): "Treat the
//! constraint solver as a capability with operations `declare_random`,
//! `add_constraint`, `enable_block`, `solve`." The solver itself is an
//! external collaborator per spec §1 — this module defines the trait seam
//! plus one concrete implementation (bounded-retry rejection sampling)
//! good enough to drive the randomizer and test suite without depending on
//! an external SMT/bit-vector solver crate, none of which appears anywhere
//! in this corpus's dependency graphs.

use crate::constraints::Constraint;
use crate::error::{GenError, Result};
use crate::tree::{NodeId, Tree};
use rand::RngCore;

/// A named, independently toggleable group of constraints (spec §4.D,
/// "constr_idx{N}" blocks).
pub struct Block {
    pub name: String,
    pub constraints: Vec<Constraint>,
    pub enabled: bool,
}

/// Constraint-solver capability (Design Notes §9). Any implementation
/// supporting bit-vector variables and boolean combinations of relational
/// formulas over them suffices.
pub trait Solver {
    fn declare_random(&mut self, node: NodeId, bit_size: u32);
    fn add_constraint(&mut self, block: &str, constraint: Constraint);
    fn enable_block(&mut self, block: &str, enabled: bool);
    /// Attempt to find an assignment for every declared random node
    /// satisfying every enabled hard constraint (soft constraints are
    /// honored best-effort). Writes results back into `tree` via
    /// `set_val` and returns `Ok(())`, or `ConstraintUnsat` on exhaustion.
    fn solve(&mut self, tree: &mut Tree) -> Result<()>;
}

const MAX_ATTEMPTS: usize = 10_000;

/// A bounded-retry rejection sampler seeded from a `ChaCha8Rng` stream
/// (spec §8.1 I5 requires bit-identical reproducibility across runs).
pub struct RejectionSampler<R: RngCore> {
    rng: R,
    randoms: Vec<(NodeId, u32)>,
    blocks: Vec<Block>,
}

impl<R: RngCore> RejectionSampler<R> {
    pub fn new(rng: R) -> Self {
        RejectionSampler { rng, randoms: Vec::new(), blocks: Vec::new() }
    }

    fn active_constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.blocks.iter().filter(|b| b.enabled).flat_map(|b| b.constraints.iter())
    }

    fn sample_node(&mut self, bit_size: u32) -> crate::bitint::BitInt {
        use crate::bitint::BitInt;
        let mut value = BitInt::zero(bit_size);
        let mut offset = 0u32;
        while offset < bit_size {
            let size = 32.min(bit_size - offset);
            let word = self.rng.next_u32() as u128;
            let masked = if size == 32 { word } else { word & ((1u128 << size) - 1) };
            value.set_range(offset, size, &BitInt::from_u128(size, masked));
            offset += size;
        }
        value
    }

    /// Draw a fresh value for every declared random node.
    fn draw(&mut self, tree: &mut Tree) -> Result<()> {
        for (node, bit_size) in self.randoms.clone() {
            let value = self.sample_node(bit_size);
            tree.set_val(node, value, false)?;
        }
        Ok(())
    }

    /// Check the current tree against `constraints`. Hard constraints always
    /// have to hold. Soft constraints are only required when `honor_soft` is
    /// set (spec GLOSSARY: "a preference the solver satisfies if consistent
    /// with hard constraints") and are skipped if they reference a path that
    /// does not exist yet in this assignment.
    fn check(&self, tree: &Tree, root: NodeId, constraints: &[Constraint], honor_soft: bool) -> Result<bool> {
        for c in constraints {
            if c.soft && !honor_soft {
                continue;
            }
            if c.soft && c.expr.references_missing_path(tree, root) {
                continue;
            }
            match c.expr.eval_bool(tree, root) {
                Ok(true) => {}
                Ok(false) => return Ok(false),
                Err(_) if c.soft => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

impl<R: RngCore> Solver for RejectionSampler<R> {
    fn declare_random(&mut self, node: NodeId, bit_size: u32) {
        self.randoms.push((node, bit_size));
    }

    fn add_constraint(&mut self, block: &str, constraint: Constraint) {
        if let Some(b) = self.blocks.iter_mut().find(|b| b.name == block) {
            b.constraints.push(constraint);
        } else {
            self.blocks.push(Block { name: block.to_string(), constraints: vec![constraint], enabled: false });
        }
    }

    fn enable_block(&mut self, block: &str, enabled: bool) {
        if let Some(b) = self.blocks.iter_mut().find(|b| b.name == block) {
            b.enabled = enabled;
        }
    }

    fn solve(&mut self, tree: &mut Tree) -> Result<()> {
        let root = tree.root();
        let constraints: Vec<Constraint> = self.active_constraints().cloned().collect();

        // First try to find a draw that honors every soft preference as
        // well as every hard constraint, for a bounded share of the attempt
        // budget; if none turns up, fall back to hard-only for the rest.
        let soft_rounds = MAX_ATTEMPTS / 10;
        for _ in 0..soft_rounds {
            self.draw(tree)?;
            if self.check(tree, root, &constraints, true)? {
                return Ok(());
            }
        }
        for _ in soft_rounds..MAX_ATTEMPTS {
            self.draw(tree)?;
            if self.check(tree, root, &constraints, false)? {
                return Ok(());
            }
        }
        Err(GenError::ConstraintUnsat(0))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constraints::{CmpOp, Expr};
    use crate::types::{Aggregate, BaseIntWidth, Member, TypeDescriptor};
    use indexmap::IndexMap;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn finds_assignment_satisfying_hard_constraint() {
        let mut members = IndexMap::new();
        members.insert(
            "v".to_string(),
            Member { descriptor: TypeDescriptor::BaseInt(BaseIntWidth::W8), bit_size: 8, bit_offset: 0 },
        );
        let desc = TypeDescriptor::Aggregate(Aggregate::new(members, 8).unwrap());
        let mut tree = Tree::instantiate(&desc).unwrap();
        let root = tree.root();
        let v = tree.field(root, "v").unwrap();

        let mut solver = RejectionSampler::new(ChaCha8Rng::seed_from_u64(1));
        solver.declare_random(v, 8);
        solver.add_constraint(
            "base",
            Constraint {
                name: "fixed".to_string(),
                expr: Expr::Cmp(CmpOp::Eq, Box::new(Expr::Path("v".to_string())), Box::new(Expr::Int(5))),
                soft: false,
            },
        );
        solver.enable_block("base", true);

        solver.solve(&mut tree).unwrap();
        assert_eq!(tree.get_val(root).to_u128(), Some(5));
    }

    #[test]
    fn unsatisfiable_hard_constraint_is_unsat() {
        let desc = TypeDescriptor::BaseInt(BaseIntWidth::W8);
        let mut tree = Tree::instantiate(&desc).unwrap();

        let mut solver = RejectionSampler::new(ChaCha8Rng::seed_from_u64(1));
        solver.declare_random(tree.root(), 8);
        solver.add_constraint(
            "base",
            Constraint {
                name: "contradiction".to_string(),
                expr: Expr::Cmp(CmpOp::Ne, Box::new(Expr::Int(1)), Box::new(Expr::Int(1))),
                soft: false,
            },
        );
        solver.enable_block("base", true);

        assert!(matches!(solver.solve(&mut tree), Err(GenError::ConstraintUnsat(_))));
    }
}
