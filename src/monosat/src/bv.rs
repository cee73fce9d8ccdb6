//! The bitvector theory.
//!
//! Bitvectors are built from three primitives: constants (fully forced at
//! creation), explicit-bit vectors (a vector of SAT literals, LSB first) and
//! anonymous vectors (free symbolic values that participate only through
//! comparison atoms until bit-blasted). Arithmetic operators maintain
//! interval under/over-approximations and propagate bounds; bitwise
//! operators are wired directly as CNF clauses; `bitblast` forces a full CNF
//! encoding of the supported operators in a vector's cone of influence.
//!
//! The current bounds (and the assigned literals justifying them) live in a
//! [`BvBounds`] store shared with the graph theory, which reads them when
//! edge weights are bitvectors.

use crate::callbacks::Callbacks;
use crate::clause::{lbool, Lit, VMap, Var};
use crate::core::TheoryArg;
use crate::errors::{check_name, Error, Result};
use crate::simp::SimpSolver;
use crate::theory::Theory;
use fnv::FnvHashMap;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

pub const MAX_WIDTH: u32 = 64;

pub fn max_val(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Comparison operators of bitvector atoms. Equality and disequality are
/// encoded at the embedding layer from `Geq` and `Gt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Leq,
    Gt,
    Geq,
}

impl CmpOp {
    fn code(self) -> u8 {
        match self {
            CmpOp::Lt => 0,
            CmpOp::Leq => 1,
            CmpOp::Gt => 2,
            CmpOp::Geq => 3,
        }
    }
}

/// Shared store of per-bitvector interval bounds, readable by other theories.
///
/// `reason(id)` is the set of currently-assigned literals that justify the
/// current interval; any propagation derived from the interval must cite
/// these literals in its explanation.
pub struct BvBounds {
    bounds: Vec<(u64, u64)>,
    reasons: Vec<Vec<Lit>>,
    /// Bounds staged at the last full-model check.
    staged: Vec<(u64, u64)>,
    /// Bounds at the last accepted full model; used for model queries after
    /// the trail has been backtracked.
    model: Vec<(u64, u64)>,
}

impl BvBounds {
    fn new() -> Self {
        Self {
            bounds: vec![],
            reasons: vec![],
            staged: vec![],
            model: vec![],
        }
    }

    fn push(&mut self, under: u64, over: u64) -> usize {
        self.bounds.push((under, over));
        self.reasons.push(vec![]);
        self.bounds.len() - 1
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    #[inline]
    pub fn under(&self, id: usize) -> u64 {
        self.bounds[id].0
    }

    #[inline]
    pub fn over(&self, id: usize) -> u64 {
        self.bounds[id].1
    }

    /// Literals justifying the current interval of `id`.
    pub fn reason(&self, id: usize) -> &[Lit] {
        &self.reasons[id]
    }

    /// Interval of `id` under the last accepted full model.
    pub fn model_bounds(&self, id: usize) -> (u64, u64) {
        self.model.get(id).copied().unwrap_or_else(|| {
            let b = self.bounds[id];
            b
        })
    }

    fn snapshot(&mut self) {
        self.staged.clear();
        self.staged.extend_from_slice(&self.bounds);
    }

    fn commit(&mut self) {
        self.model.clear();
        self.model.extend_from_slice(&self.staged);
    }
}

#[derive(Debug, Clone, Copy)]
enum Rhs {
    Const(u64),
    Bv(usize),
}

#[derive(Clone, Copy)]
struct Comparison {
    bv: usize,
    op: CmpOp,
    rhs: Rhs,
    lit: Lit,
}

fn negate_all(lits: &[Lit]) -> Vec<Lit> {
    let mut cl: Vec<Lit> = lits.iter().map(|&l| !l).collect();
    cl.sort_unstable();
    cl.dedup();
    cl
}

enum BvOp {
    Add {
        a: usize,
        b: usize,
        r: usize,
    },
    Sub {
        a: usize,
        b: usize,
        r: usize,
    },
    Mul {
        a: usize,
        b: usize,
        r: usize,
    },
    Div {
        a: usize,
        b: usize,
        r: usize,
    },
    Min {
        args: Vec<usize>,
        r: usize,
    },
    Max {
        args: Vec<usize>,
        r: usize,
    },
    Ite {
        cond: Lit,
        then_bv: usize,
        else_bv: usize,
        r: usize,
    },
    /// Result counts the true literals among `args`.
    Popcount {
        args: Vec<Lit>,
        r: usize,
    },
    /// `a` occupies the low bits of `r`, `b` the high bits.
    Concat {
        a: usize,
        b: usize,
        r: usize,
    },
    /// Bits `[lower, upper)` of `a`.
    Slice {
        a: usize,
        lower: u32,
        r: usize,
    },
}

enum OpView {
    Add { a: usize, b: usize, r: usize },
    Sub { a: usize, b: usize, r: usize },
    Ite {
        cond: Lit,
        then_bv: usize,
        else_bv: usize,
        r: usize,
    },
    Concat { a: usize, b: usize, r: usize },
    Slice { a: usize, lower: u32, r: usize },
    Other,
}

struct BitvectorInfo {
    width: u32,
    constant: Option<u64>,
    bits: Vec<Lit>,
    name: String,
}

#[derive(Clone, Copy)]
struct LevelMark {
    head: usize,
    undo_len: usize,
    links_len: usize,
}

struct Undo {
    bv: usize,
    under: u64,
    over: u64,
    reason_len: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct BitRef {
    bv: i32, // -1: not a bit
    idx: u32,
}

/// The bitvector theory propagator.
pub struct BvTheory {
    tid: usize,
    store: Rc<RefCell<BvBounds>>,
    bvs: Vec<BitvectorInfo>,
    comparisons: Vec<Comparison>,
    cmp_of_var: VMap<i32>,
    cmp_dedup: FnvHashMap<(usize, u8, u64, bool), Lit>,
    ops: Vec<BvOp>,
    op_encoded: Vec<bool>,
    bit_of_var: VMap<BitRef>,
    /// Assigned bv-to-bv comparison atoms, re-applied during bound fixpoints.
    links: Vec<(usize, bool)>,
    head: usize,
    level_marks: Vec<LevelMark>,
    undo: Vec<Undo>,
    incoming: Vec<Lit>,
    expl_map: FnvHashMap<Lit, Vec<Lit>>,
    expl: Vec<Lit>,
    pending: Vec<(Lit, Vec<Lit>)>,
    conflict: Option<Vec<Lit>>,
    names: FnvHashMap<String, usize>,
    named: Vec<usize>,
}

impl BvTheory {
    pub fn new(tid: usize) -> Self {
        Self {
            tid,
            store: Rc::new(RefCell::new(BvBounds::new())),
            bvs: vec![],
            comparisons: vec![],
            cmp_of_var: VMap::new(),
            cmp_dedup: FnvHashMap::default(),
            ops: vec![],
            op_encoded: vec![],
            bit_of_var: VMap::new(),
            links: vec![],
            head: 0,
            level_marks: vec![],
            undo: vec![],
            incoming: vec![],
            expl_map: FnvHashMap::default(),
            expl: vec![],
            pending: vec![],
            conflict: None,
            names: FnvHashMap::default(),
            named: vec![],
        }
    }

    pub fn theory_index(&self) -> usize {
        self.tid
    }

    /// Handle to the shared bound store, for theories that consume bitvector
    /// bounds (graph edge weights).
    pub fn bounds(&self) -> Rc<RefCell<BvBounds>> {
        self.store.clone()
    }

    pub fn n_bitvectors(&self) -> usize {
        self.bvs.len()
    }

    pub fn has_bv(&self, id: usize) -> bool {
        id < self.bvs.len()
    }

    fn check_id(&self, id: usize) -> Result<()> {
        if self.has_bv(id) {
            Ok(())
        } else {
            Err(Error::domain(format!("bitvector {} is not allocated", id)))
        }
    }

    fn check_width(width: u32) -> Result<()> {
        if width == 0 || width > MAX_WIDTH {
            Err(Error::domain(format!(
                "bitvector width must be in 1..={}, got {}",
                MAX_WIDTH, width
            )))
        } else {
            Ok(())
        }
    }

    pub fn width(&self, id: usize) -> Result<u32> {
        self.check_id(id)?;
        Ok(self.bvs[id].width)
    }

    /// The defined bit literals (LSB first); may be empty.
    pub fn bits(&self, id: usize) -> Result<&[Lit]> {
        self.check_id(id)?;
        Ok(&self.bvs[id].bits)
    }

    pub fn bit(&self, id: usize, n: usize) -> Result<Lit> {
        let bits = self.bits(id)?;
        bits.get(n)
            .copied()
            .ok_or_else(|| Error::domain(format!("bit index {} out of range", n)))
    }

    pub fn set_name(&mut self, id: usize, name: &str) -> Result<()> {
        self.check_id(id)?;
        if name.is_empty() {
            return Ok(());
        }
        check_name(name)?;
        if self.names.contains_key(name) {
            return Err(Error::domain(format!(
                "all bitvector names must be unique; duplicate name: {}",
                name
            )));
        }
        self.names.insert(name.to_string(), id);
        self.named.push(id);
        self.bvs[id].name = name.to_string();
        Ok(())
    }

    pub fn has_name(&self, id: usize) -> bool {
        self.has_bv(id) && !self.bvs[id].name.is_empty()
    }

    pub fn name(&self, id: usize) -> &str {
        &self.bvs[id].name
    }

    pub fn bv_by_name(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    pub fn n_named(&self) -> usize {
        self.named.len()
    }

    pub fn named_at(&self, n: usize) -> Option<usize> {
        self.named.get(n).copied()
    }

    fn push_bv(&mut self, info: BitvectorInfo, under: u64, over: u64) -> usize {
        let id = self.bvs.len();
        self.bvs.push(info);
        let sid = self.store.borrow_mut().push(under, over);
        debug_assert_eq!(sid, id);
        id
    }

    /// A free symbolic value of the given width.
    pub fn new_bitvector_anon(&mut self, width: u32) -> Result<usize> {
        Self::check_width(width)?;
        Ok(self.push_bv(
            BitvectorInfo {
                width,
                constant: None,
                bits: vec![],
                name: String::new(),
            },
            0,
            max_val(width),
        ))
    }

    /// A fully forced constant.
    pub fn new_bitvector_const(&mut self, width: u32, val: u64) -> Result<usize> {
        Self::check_width(width)?;
        if val > max_val(width) {
            return Err(Error::domain(format!(
                "constant {} does not fit in width {}",
                val, width
            )));
        }
        Ok(self.push_bv(
            BitvectorInfo {
                width,
                constant: Some(val),
                bits: vec![],
                name: String::new(),
            },
            val,
            val,
        ))
    }

    /// A vector over explicit bit literals, LSB first.
    pub fn new_bitvector_bits(&mut self, bits: Vec<Lit>) -> Result<usize> {
        let width = bits.len() as u32;
        Self::check_width(width)?;
        let id = self.push_bv(
            BitvectorInfo {
                width,
                constant: None,
                bits: bits.clone(),
                name: String::new(),
            },
            0,
            max_val(width),
        );
        for (i, &b) in bits.iter().enumerate() {
            self.bit_of_var.insert_default(
                b.var(),
                BitRef {
                    bv: id as i32,
                    idx: i as u32,
                },
            );
        }
        Ok(id)
    }

    /// Make sure `id` has explicit bit literals, allocating fresh solver
    /// variables if needed. Constants get their bits pinned at level 0.
    pub fn ensure_bits<Cb: Callbacks>(&mut self, sat: &mut SimpSolver<Cb>, id: usize) -> Result<()> {
        self.check_id(id)?;
        if !self.bvs[id].bits.is_empty() {
            return Ok(());
        }
        let width = self.bvs[id].width;
        let constant = self.bvs[id].constant;
        let mut bits = Vec::with_capacity(width as usize);
        for i in 0..width {
            let v = sat.new_var_default();
            sat.set_frozen(v, true);
            let b = Lit::new(v, true);
            bits.push(b);
            if let Some(c) = constant {
                let set = (c >> i) & 1 == 1;
                sat.add_clause_reuse(&mut vec![if set { b } else { !b }]);
            } else {
                self.bit_of_var.insert_default(
                    v,
                    BitRef {
                        bv: id as i32,
                        idx: i,
                    },
                );
            }
        }
        self.bvs[id].bits = bits;
        Ok(())
    }

    /// The comparison atom `bv op c`, deduplicated: re-requesting with
    /// identical parameters returns the same literal.
    pub fn new_comparison_const<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        op: CmpOp,
        bv: usize,
        c: u64,
        var: Option<Var>,
    ) -> Result<Lit> {
        self.check_id(bv)?;
        let key = (bv, op.code(), c, false);
        if let Some(&l) = self.cmp_dedup.get(&key) {
            return Ok(l);
        }
        let v = match var {
            Some(v) => v,
            None => sat.new_var_default(),
        };
        sat.set_frozen(v, true);
        let lit = Lit::new(v, true);
        let idx = self.comparisons.len();
        self.comparisons.push(Comparison {
            bv,
            op,
            rhs: Rhs::Const(c),
            lit,
        });
        self.cmp_of_var.insert(v, idx as i32, -1);
        self.cmp_dedup.insert(key, lit);
        Ok(lit)
    }

    /// The comparison atom `bv op other`, deduplicated.
    pub fn new_comparison_bv<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        op: CmpOp,
        bv: usize,
        other: usize,
        var: Option<Var>,
    ) -> Result<Lit> {
        self.check_id(bv)?;
        self.check_id(other)?;
        let key = (bv, op.code(), other as u64, true);
        if let Some(&l) = self.cmp_dedup.get(&key) {
            return Ok(l);
        }
        let v = match var {
            Some(v) => v,
            None => sat.new_var_default(),
        };
        sat.set_frozen(v, true);
        let lit = Lit::new(v, true);
        let idx = self.comparisons.len();
        self.comparisons.push(Comparison {
            bv,
            op,
            rhs: Rhs::Bv(other),
            lit,
        });
        self.cmp_of_var.insert(v, idx as i32, -1);
        self.cmp_dedup.insert(key, lit);
        Ok(lit)
    }

    fn same_width(&self, a: usize, b: usize) -> Result<()> {
        if self.bvs[a].width != self.bvs[b].width {
            return Err(Error::domain(format!(
                "bitvector widths must match ({} vs {})",
                self.bvs[a].width, self.bvs[b].width
            )));
        }
        Ok(())
    }

    fn push_op(&mut self, op: BvOp) {
        self.ops.push(op);
        self.op_encoded.push(false);
    }

    pub fn add_of(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(r)?;
        self.same_width(a, b)?;
        self.same_width(a, r)?;
        self.push_op(BvOp::Add { a, b, r });
        Ok(())
    }

    pub fn sub_of(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(r)?;
        self.same_width(a, b)?;
        self.same_width(a, r)?;
        self.push_op(BvOp::Sub { a, b, r });
        Ok(())
    }

    pub fn mul_of(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(r)?;
        self.same_width(a, b)?;
        self.same_width(a, r)?;
        self.push_op(BvOp::Mul { a, b, r });
        Ok(())
    }

    pub fn div_of(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(r)?;
        self.same_width(a, b)?;
        self.same_width(a, r)?;
        self.push_op(BvOp::Div { a, b, r });
        Ok(())
    }

    pub fn min_of(&mut self, args: Vec<usize>, r: usize) -> Result<()> {
        self.check_id(r)?;
        for &a in &args {
            self.check_id(a)?;
            self.same_width(a, r)?;
        }
        self.push_op(BvOp::Min { args, r });
        Ok(())
    }

    pub fn max_of(&mut self, args: Vec<usize>, r: usize) -> Result<()> {
        self.check_id(r)?;
        for &a in &args {
            self.check_id(a)?;
            self.same_width(a, r)?;
        }
        self.push_op(BvOp::Max { args, r });
        Ok(())
    }

    pub fn ite_of(&mut self, cond: Lit, then_bv: usize, else_bv: usize, r: usize) -> Result<()> {
        self.check_id(then_bv)?;
        self.check_id(else_bv)?;
        self.check_id(r)?;
        self.same_width(then_bv, else_bv)?;
        self.same_width(then_bv, r)?;
        self.push_op(BvOp::Ite {
            cond,
            then_bv,
            else_bv,
            r,
        });
        Ok(())
    }

    /// `r` counts how many of `args` (which must all be positive literals)
    /// are true.
    pub fn popcount_of(&mut self, args: Vec<Lit>, r: usize) -> Result<()> {
        self.check_id(r)?;
        for &l in &args {
            if !l.sign() {
                return Err(Error::domain(
                    "popcount arguments must all be positive literals".to_string(),
                ));
            }
        }
        if args.len() as u64 > max_val(self.bvs[r].width) {
            return Err(Error::domain(format!(
                "popcount of {} literals does not fit in width {}",
                args.len(),
                self.bvs[r].width
            )));
        }
        self.push_op(BvOp::Popcount { args, r });
        Ok(())
    }

    /// A unary (thermometer) value: `args` must be sequential positive
    /// literals; ordering clauses `args[i+1] -> args[i]` are added so the
    /// true prefix length is the value of `r`.
    pub fn unary_of<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        args: Vec<Lit>,
        r: usize,
    ) -> Result<()> {
        for &l in &args {
            if !l.sign() {
                return Err(Error::domain(
                    "unary arguments must all be positive literals".to_string(),
                ));
            }
        }
        for w in args.windows(2) {
            if w[1].var().idx() != w[0].var().idx() + 1 {
                return Err(Error::domain(
                    "unary arguments must be sequential".to_string(),
                ));
            }
        }
        for w in args.windows(2) {
            sat.add_clause_reuse(&mut vec![!w[1], w[0]]);
        }
        self.popcount_of(args, r)
    }

    /// `a` occupies the low bits of `r`, `b` the high bits.
    pub fn concat_of(&mut self, a: usize, b: usize, r: usize) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(r)?;
        if self.bvs[a].width + self.bvs[b].width != self.bvs[r].width {
            return Err(Error::domain(
                "concat result width must be the sum of the operand widths".to_string(),
            ));
        }
        self.push_op(BvOp::Concat { a, b, r });
        Ok(())
    }

    /// Bits `[lower, upper)` of `a`.
    pub fn slice_of(&mut self, a: usize, lower: u32, upper: u32, r: usize) -> Result<()> {
        self.check_id(a)?;
        self.check_id(r)?;
        if lower >= upper || upper > self.bvs[a].width {
            return Err(Error::domain(format!(
                "invalid slice range [{}, {})",
                lower, upper
            )));
        }
        if self.bvs[r].width != upper - lower {
            return Err(Error::domain(
                "slice result width must match the slice range".to_string(),
            ));
        }
        self.push_op(BvOp::Slice { a, lower, r });
        Ok(())
    }

    fn bitwise_binary<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
        mk: impl Fn(Lit, Lit, Lit) -> [Vec<Lit>; 3],
    ) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(out)?;
        self.same_width(a, b)?;
        self.same_width(a, out)?;
        self.ensure_bits(sat, a)?;
        self.ensure_bits(sat, b)?;
        self.ensure_bits(sat, out)?;
        for i in 0..self.bvs[a].width as usize {
            let (x, y, z) = (self.bvs[a].bits[i], self.bvs[b].bits[i], self.bvs[out].bits[i]);
            for mut c in mk(x, y, z).into_iter() {
                sat.add_clause_reuse(&mut c);
            }
        }
        Ok(())
    }

    /// `out = !a`, bitwise.
    pub fn bitwise_not<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        out: usize,
    ) -> Result<()> {
        self.check_id(a)?;
        self.check_id(out)?;
        self.same_width(a, out)?;
        self.ensure_bits(sat, a)?;
        self.ensure_bits(sat, out)?;
        for i in 0..self.bvs[a].width as usize {
            let (x, z) = (self.bvs[a].bits[i], self.bvs[out].bits[i]);
            sat.add_clause_reuse(&mut vec![x, z]);
            sat.add_clause_reuse(&mut vec![!x, !z]);
        }
        Ok(())
    }

    pub fn bitwise_and<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
    ) -> Result<()> {
        self.bitwise_binary(sat, a, b, out, |x, y, z| {
            [vec![!x, !y, z], vec![x, !z], vec![y, !z]]
        })
    }

    pub fn bitwise_nand<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
    ) -> Result<()> {
        self.bitwise_binary(sat, a, b, out, |x, y, z| {
            [vec![!x, !y, !z], vec![x, z], vec![y, z]]
        })
    }

    pub fn bitwise_or<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
    ) -> Result<()> {
        self.bitwise_binary(sat, a, b, out, |x, y, z| {
            [vec![x, y, !z], vec![!x, z], vec![!y, z]]
        })
    }

    pub fn bitwise_nor<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
    ) -> Result<()> {
        self.bitwise_binary(sat, a, b, out, |x, y, z| {
            [vec![x, y, z], vec![!x, !z], vec![!y, !z]]
        })
    }

    pub fn bitwise_xor<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
    ) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(out)?;
        self.same_width(a, b)?;
        self.same_width(a, out)?;
        self.ensure_bits(sat, a)?;
        self.ensure_bits(sat, b)?;
        self.ensure_bits(sat, out)?;
        for i in 0..self.bvs[a].width as usize {
            let (x, y, z) = (self.bvs[a].bits[i], self.bvs[b].bits[i], self.bvs[out].bits[i]);
            sat.add_clause_reuse(&mut vec![!x, !y, !z]);
            sat.add_clause_reuse(&mut vec![x, y, !z]);
            sat.add_clause_reuse(&mut vec![x, !y, z]);
            sat.add_clause_reuse(&mut vec![!x, y, z]);
        }
        Ok(())
    }

    pub fn bitwise_xnor<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        out: usize,
    ) -> Result<()> {
        self.check_id(a)?;
        self.check_id(b)?;
        self.check_id(out)?;
        self.same_width(a, b)?;
        self.same_width(a, out)?;
        self.ensure_bits(sat, a)?;
        self.ensure_bits(sat, b)?;
        self.ensure_bits(sat, out)?;
        for i in 0..self.bvs[a].width as usize {
            let (x, y, z) = (self.bvs[a].bits[i], self.bvs[b].bits[i], self.bvs[out].bits[i]);
            sat.add_clause_reuse(&mut vec![!x, !y, z]);
            sat.add_clause_reuse(&mut vec![x, y, z]);
            sat.add_clause_reuse(&mut vec![x, !y, !z]);
            sat.add_clause_reuse(&mut vec![!x, y, !z]);
        }
        Ok(())
    }

    /// Force a full CNF encoding of `id` and the supported operators in its
    /// cone of influence. Addition, subtraction, conditionals, concatenation
    /// and slicing are compiled to clauses; multiplication, division, min/max
    /// and popcount stay enforced by the theory's exact final check.
    pub fn bitblast<Cb: Callbacks>(&mut self, sat: &mut SimpSolver<Cb>, id: usize) -> Result<()> {
        self.check_id(id)?;
        // collect the cone of influence
        let mut in_cone = vec![false; self.bvs.len()];
        let mut stack = vec![id];
        while let Some(x) = stack.pop() {
            if in_cone[x] {
                continue;
            }
            in_cone[x] = true;
            for op in &self.ops {
                let (r, operands): (usize, Vec<usize>) = match op {
                    BvOp::Add { a, b, r }
                    | BvOp::Sub { a, b, r }
                    | BvOp::Mul { a, b, r }
                    | BvOp::Div { a, b, r }
                    | BvOp::Concat { a, b, r } => (*r, vec![*a, *b]),
                    BvOp::Min { args, r } | BvOp::Max { args, r } => (*r, args.clone()),
                    BvOp::Ite {
                        then_bv, else_bv, r, ..
                    } => (*r, vec![*then_bv, *else_bv]),
                    BvOp::Popcount { r, .. } => (*r, vec![]),
                    BvOp::Slice { a, r, .. } => (*r, vec![*a]),
                };
                if r == x {
                    stack.extend(operands.into_iter().filter(|&o| !in_cone[o]));
                }
            }
        }
        for x in 0..self.bvs.len() {
            if in_cone[x] {
                self.ensure_bits(sat, x)?;
            }
        }
        for i in 0..self.ops.len() {
            if self.op_encoded[i] {
                continue;
            }
            let r = match &self.ops[i] {
                BvOp::Add { r, .. }
                | BvOp::Sub { r, .. }
                | BvOp::Mul { r, .. }
                | BvOp::Div { r, .. }
                | BvOp::Min { r, .. }
                | BvOp::Max { r, .. }
                | BvOp::Ite { r, .. }
                | BvOp::Popcount { r, .. }
                | BvOp::Concat { r, .. }
                | BvOp::Slice { r, .. } => *r,
            };
            if !in_cone[r] {
                continue;
            }
            match self.op_view(i) {
                OpView::Add { a, b, r } => {
                    self.encode_adder(sat, a, b, r)?;
                    self.op_encoded[i] = true;
                }
                OpView::Sub { a, b, r } => {
                    // a - b = r  <=>  r + b = a, with no borrow
                    self.encode_adder(sat, r, b, a)?;
                    self.op_encoded[i] = true;
                }
                OpView::Ite {
                    cond,
                    then_bv,
                    else_bv,
                    r,
                } => {
                    for j in 0..self.bvs[r].width as usize {
                        let (t, e, z) = (
                            self.bvs[then_bv].bits[j],
                            self.bvs[else_bv].bits[j],
                            self.bvs[r].bits[j],
                        );
                        sat.add_clause_reuse(&mut vec![!cond, !t, z]);
                        sat.add_clause_reuse(&mut vec![!cond, t, !z]);
                        sat.add_clause_reuse(&mut vec![cond, !e, z]);
                        sat.add_clause_reuse(&mut vec![cond, e, !z]);
                    }
                    self.op_encoded[i] = true;
                }
                OpView::Concat { a, b, r } => {
                    let wa = self.bvs[a].width as usize;
                    for j in 0..self.bvs[r].width as usize {
                        let src = if j < wa {
                            self.bvs[a].bits[j]
                        } else {
                            self.bvs[b].bits[j - wa]
                        };
                        let z = self.bvs[r].bits[j];
                        sat.add_clause_reuse(&mut vec![!src, z]);
                        sat.add_clause_reuse(&mut vec![src, !z]);
                    }
                    self.op_encoded[i] = true;
                }
                OpView::Slice { a, lower, r } => {
                    for j in 0..self.bvs[r].width as usize {
                        let src = self.bvs[a].bits[lower as usize + j];
                        let z = self.bvs[r].bits[j];
                        sat.add_clause_reuse(&mut vec![!src, z]);
                        sat.add_clause_reuse(&mut vec![src, !z]);
                    }
                    self.op_encoded[i] = true;
                }
                OpView::Other => {}
            }
        }
        Ok(())
    }

    fn op_view(&self, i: usize) -> OpView {
        match &self.ops[i] {
            BvOp::Add { a, b, r } => OpView::Add {
                a: *a,
                b: *b,
                r: *r,
            },
            BvOp::Sub { a, b, r } => OpView::Sub {
                a: *a,
                b: *b,
                r: *r,
            },
            BvOp::Ite {
                cond,
                then_bv,
                else_bv,
                r,
            } => OpView::Ite {
                cond: *cond,
                then_bv: *then_bv,
                else_bv: *else_bv,
                r: *r,
            },
            BvOp::Concat { a, b, r } => OpView::Concat {
                a: *a,
                b: *b,
                r: *r,
            },
            BvOp::Slice { a, lower, r } => OpView::Slice {
                a: *a,
                lower: *lower,
                r: *r,
            },
            _ => OpView::Other,
        }
    }

    /// Ripple-carry adder `a + b = r`; the final carry is forced false, so
    /// the sum must fit in the width.
    fn encode_adder<Cb: Callbacks>(
        &mut self,
        sat: &mut SimpSolver<Cb>,
        a: usize,
        b: usize,
        r: usize,
    ) -> Result<()> {
        let w = self.bvs[r].width as usize;
        let mut carry: Option<Lit> = None;
        for j in 0..w {
            let (x, y, z) = (self.bvs[a].bits[j], self.bvs[b].bits[j], self.bvs[r].bits[j]);
            let cout = {
                let v = sat.new_var_default();
                Lit::new(v, true)
            };
            match carry {
                None => {
                    // z = x ^ y; cout = x & y
                    sat.add_clause_reuse(&mut vec![!x, !y, !z]);
                    sat.add_clause_reuse(&mut vec![x, y, !z]);
                    sat.add_clause_reuse(&mut vec![x, !y, z]);
                    sat.add_clause_reuse(&mut vec![!x, y, z]);
                    sat.add_clause_reuse(&mut vec![!x, !y, cout]);
                    sat.add_clause_reuse(&mut vec![x, !cout]);
                    sat.add_clause_reuse(&mut vec![y, !cout]);
                }
                Some(cin) => {
                    // full adder: z = x ^ y ^ cin
                    sat.add_clause_reuse(&mut vec![!x, !y, !cin, z]);
                    sat.add_clause_reuse(&mut vec![!x, !y, cin, !z]);
                    sat.add_clause_reuse(&mut vec![!x, y, !cin, !z]);
                    sat.add_clause_reuse(&mut vec![!x, y, cin, z]);
                    sat.add_clause_reuse(&mut vec![x, !y, !cin, !z]);
                    sat.add_clause_reuse(&mut vec![x, !y, cin, z]);
                    sat.add_clause_reuse(&mut vec![x, y, !cin, z]);
                    sat.add_clause_reuse(&mut vec![x, y, cin, !z]);
                    // cout = majority(x, y, cin)
                    sat.add_clause_reuse(&mut vec![!x, !y, cout]);
                    sat.add_clause_reuse(&mut vec![!x, !cin, cout]);
                    sat.add_clause_reuse(&mut vec![!y, !cin, cout]);
                    sat.add_clause_reuse(&mut vec![x, y, !cout]);
                    sat.add_clause_reuse(&mut vec![x, cin, !cout]);
                    sat.add_clause_reuse(&mut vec![y, cin, !cout]);
                }
            }
            carry = Some(cout);
        }
        if let Some(c) = carry {
            sat.add_clause_reuse(&mut vec![!c]);
        }
        Ok(())
    }

    /// Value of `id` under the last accepted model: the under-approximation,
    /// or the over-approximation when `maximize` is set.
    pub fn model_value(&self, id: usize, maximize: bool) -> Result<u64> {
        self.check_id(id)?;
        let (under, over) = self.store.borrow().model_bounds(id);
        Ok(if maximize { over } else { under })
    }

    // ------------ propagation machinery ------------

    fn set_under(
        store: &mut BvBounds,
        undo: &mut Vec<Undo>,
        bv: usize,
        val: u64,
        reason: &[Lit],
    ) -> bool {
        let (u, o) = store.bounds[bv];
        if val <= u {
            return u <= o;
        }
        undo.push(Undo {
            bv,
            under: u,
            over: o,
            reason_len: store.reasons[bv].len(),
        });
        store.bounds[bv].0 = val;
        store.reasons[bv].extend_from_slice(reason);
        val <= o
    }

    fn set_over(
        store: &mut BvBounds,
        undo: &mut Vec<Undo>,
        bv: usize,
        val: u64,
        reason: &[Lit],
    ) -> bool {
        let (u, o) = store.bounds[bv];
        if val >= o {
            return u <= o;
        }
        undo.push(Undo {
            bv,
            under: u,
            over: o,
            reason_len: store.reasons[bv].len(),
        });
        store.bounds[bv].1 = val;
        store.reasons[bv].extend_from_slice(reason);
        u <= val
    }

    fn conflict_from(store: &BvBounds, bv: usize, extra: &[Lit]) -> Vec<Lit> {
        let mut clause: Vec<Lit> = store.reasons[bv].iter().map(|&l| !l).collect();
        clause.extend(extra.iter().map(|&l| !l));
        clause.sort_unstable();
        clause.dedup();
        clause
    }

    /// The atom assignment `alit` is impossible on its own (e.g. `x < 0`).
    fn impossible(&mut self, alit: Lit) -> bool {
        self.conflict = Some(vec![!alit]);
        false
    }

    /// Apply the constraint of comparison `ci` being assigned `val`.
    /// Returns false on an inconsistency (the conflict is recorded).
    fn apply_comparison(&mut self, ci: usize, val: bool) -> bool {
        let Comparison { bv, op, rhs, lit } = self.comparisons[ci];
        let alit = if val { lit } else { !lit };
        match rhs {
            Rhs::Const(c) => {
                let w = self.bvs[bv].width;
                // the (under, over) tightening implied by the assignment
                let (new_under, new_over) = match (op, val) {
                    (CmpOp::Leq, true) => (None, Some(c)),
                    (CmpOp::Leq, false) => {
                        if c >= max_val(w) {
                            return self.impossible(alit);
                        }
                        (Some(c + 1), None)
                    }
                    (CmpOp::Lt, true) => {
                        if c == 0 {
                            return self.impossible(alit);
                        }
                        (None, Some(c - 1))
                    }
                    (CmpOp::Lt, false) => (Some(c), None),
                    (CmpOp::Geq, true) => (Some(c), None),
                    (CmpOp::Geq, false) => {
                        if c == 0 {
                            return self.impossible(alit);
                        }
                        (None, Some(c - 1))
                    }
                    (CmpOp::Gt, true) => {
                        if c >= max_val(w) {
                            return self.impossible(alit);
                        }
                        (Some(c + 1), None)
                    }
                    (CmpOp::Gt, false) => (None, Some(c)),
                };
                let store_rc = self.store.clone();
                let mut store_guard = store_rc.borrow_mut();
                let store = &mut *store_guard;
                if let Some(u) = new_under {
                    if !Self::set_under(store, &mut self.undo, bv, u, &[alit]) {
                        self.conflict = Some(Self::conflict_from(store, bv, &[]));
                        return false;
                    }
                }
                if let Some(o) = new_over {
                    if !Self::set_over(store, &mut self.undo, bv, o, &[alit]) {
                        self.conflict = Some(Self::conflict_from(store, bv, &[]));
                        return false;
                    }
                }
                true
            }
            Rhs::Bv(other) => {
                let store_rc = self.store.clone();
                let mut store_guard = store_rc.borrow_mut();
                let store = &mut *store_guard;
                if let Some(clause) =
                    Self::apply_link(store, &mut self.undo, bv, other, op, val, alit)
                {
                    self.conflict = Some(clause);
                    return false;
                }
                true
            }
        }
    }

    /// Apply `a op b` (or its negation) to the bounds of both sides.
    /// Returns a conflict clause on inconsistency.
    fn apply_link(
        store: &mut BvBounds,
        undo: &mut Vec<Undo>,
        a: usize,
        b: usize,
        op: CmpOp,
        holds: bool,
        alit: Lit,
    ) -> Option<Vec<Lit>> {
        // rewrite everything into `x + margin <= y`
        let (x, y, strict) = match (op, holds) {
            (CmpOp::Leq, true) => (a, b, false),
            (CmpOp::Lt, true) => (a, b, true),
            (CmpOp::Geq, true) => (b, a, false),
            (CmpOp::Gt, true) => (b, a, true),
            (CmpOp::Leq, false) => (b, a, true), // !(a <= b) => b < a
            (CmpOp::Lt, false) => (b, a, false), // !(a < b)  => b <= a
            (CmpOp::Geq, false) => (a, b, true),
            (CmpOp::Gt, false) => (a, b, false),
        };
        let margin: u64 = if strict { 1 } else { 0 };
        // y's over bound caps x
        let oy = store.bounds[y].1;
        if oy < margin {
            let mut cl: Vec<Lit> = store.reasons[y].iter().map(|&l| !l).collect();
            cl.push(!alit);
            cl.sort_unstable();
            cl.dedup();
            return Some(cl);
        }
        let mut reason_x: Vec<Lit> = store.reasons[y].clone();
        reason_x.push(alit);
        if !Self::set_over(store, undo, x, oy - margin, &reason_x) {
            return Some(Self::conflict_from(store, x, &[]));
        }
        // x's under bound lifts y
        let ux = store.bounds[x].0;
        if margin > 0 && ux == u64::MAX {
            let mut cl: Vec<Lit> = store.reasons[x].iter().map(|&l| !l).collect();
            cl.push(!alit);
            cl.sort_unstable();
            cl.dedup();
            return Some(cl);
        }
        let mut reason_y: Vec<Lit> = store.reasons[x].clone();
        reason_y.push(alit);
        if !Self::set_under(store, undo, y, ux + margin, &reason_y) {
            return Some(Self::conflict_from(store, y, &[]));
        }
        None
    }

    /// Process a newly assigned bit of `bv`.
    fn apply_bit(&mut self, bv: usize, idx: u32, set: bool, blit: Lit) -> bool {
        let store_rc = self.store.clone();
        let mut store_guard = store_rc.borrow_mut();
        let store = &mut *store_guard;
        let undo = &mut self.undo;
        let ok = if set {
            let u = store.bounds[bv].0 | (1u64 << idx);
            Self::set_under(store, undo, bv, u, &[blit])
        } else {
            let o = store.bounds[bv].1 & !(1u64 << idx);
            Self::set_over(store, undo, bv, o, &[blit])
        };
        if !ok {
            self.conflict = Some(Self::conflict_from(store, bv, &[]));
        }
        ok
    }

    /// One bound-tightening pass over all operators and active links.
    /// Returns Some(changed) or None on conflict.
    fn op_pass(&mut self, vals: &dyn Fn(Lit) -> lbool) -> Option<bool> {
        let mut changed = false;
        for oi in 0..self.ops.len() {
            let store_rc = self.store.clone();
            let mut store_guard = store_rc.borrow_mut();
            let store = &mut *store_guard;
            let undo = &mut self.undo;
            macro_rules! bail {
                ($bv:expr, $extra:expr) => {{
                    self.conflict = Some(Self::conflict_from(store, $bv, $extra));
                    return None;
                }};
            }
            match &self.ops[oi] {
                BvOp::Add { a, b, r } => {
                    let (a, b, r) = (*a, *b, *r);
                    let w = self.bvs[r].width;
                    let (ua, oa) = store.bounds[a];
                    let (ub, ob) = store.bounds[b];
                    let mut reason = store.reasons[a].clone();
                    reason.extend_from_slice(&store.reasons[b]);
                    let lo = ua.saturating_add(ub);
                    if lo > max_val(w) {
                        // the sum cannot fit in the width
                        self.conflict = Some(negate_all(&reason));
                        return None;
                    }
                    let hi = oa.saturating_add(ob).min(max_val(w));
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Sub { a, b, r } => {
                    let (a, b, r) = (*a, *b, *r);
                    let (ua, oa) = store.bounds[a];
                    let (ub, ob) = store.bounds[b];
                    let mut reason = store.reasons[a].clone();
                    reason.extend_from_slice(&store.reasons[b]);
                    if oa < ub {
                        // b > a in every completion: no non-negative difference
                        self.conflict = Some(negate_all(&reason));
                        return None;
                    }
                    let lo = ua.saturating_sub(ob);
                    let hi = oa - ub;
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Mul { a, b, r } => {
                    let (a, b, r) = (*a, *b, *r);
                    let w = self.bvs[r].width;
                    let (ua, oa) = store.bounds[a];
                    let (ub, ob) = store.bounds[b];
                    let mut reason = store.reasons[a].clone();
                    reason.extend_from_slice(&store.reasons[b]);
                    let lo = ua.saturating_mul(ub);
                    if lo > max_val(w) {
                        self.conflict = Some(negate_all(&reason));
                        return None;
                    }
                    let hi = oa.saturating_mul(ob).min(max_val(w));
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Div { a, b, r } => {
                    let (a, b, r) = (*a, *b, *r);
                    let w = self.bvs[r].width;
                    let (ua, oa) = store.bounds[a];
                    let (ub, ob) = store.bounds[b];
                    let mut reason = store.reasons[a].clone();
                    reason.extend_from_slice(&store.reasons[b]);
                    // division by zero yields the all-ones value
                    let lo = if ob == 0 { max_val(w) } else { ua / ob };
                    let hi = if ub == 0 { max_val(w) } else { oa / ub };
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Min { args, r } => {
                    let r = *r;
                    let mut lo = u64::MAX;
                    let mut hi = u64::MAX;
                    let mut reason = vec![];
                    for &a in args {
                        lo = lo.min(store.bounds[a].0);
                        hi = hi.min(store.bounds[a].1);
                        reason.extend_from_slice(&store.reasons[a]);
                    }
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Max { args, r } => {
                    let r = *r;
                    let mut lo = 0;
                    let mut hi = 0;
                    let mut reason = vec![];
                    for &a in args {
                        lo = lo.max(store.bounds[a].0);
                        hi = hi.max(store.bounds[a].1);
                        reason.extend_from_slice(&store.reasons[a]);
                    }
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Ite {
                    cond,
                    then_bv,
                    else_bv,
                    r,
                } => {
                    let (cond, t, e, r) = (*cond, *then_bv, *else_bv, *r);
                    let src = match vals(cond) {
                        v if v == lbool::TRUE => Some((t, cond)),
                        v if v == lbool::FALSE => Some((e, !cond)),
                        _ => None,
                    };
                    if let Some((src, clit)) = src {
                        let (u, o) = store.bounds[src];
                        let mut reason = store.reasons[src].clone();
                        reason.push(clit);
                        let before = undo.len();
                        if !Self::set_under(store, undo, r, u, &reason)
                            || !Self::set_over(store, undo, r, o, &reason)
                        {
                            bail!(r, &[]);
                        }
                        changed |= undo.len() > before;
                    } else {
                        // either branch possible
                        let lo = store.bounds[t].0.min(store.bounds[e].0);
                        let hi = store.bounds[t].1.max(store.bounds[e].1);
                        let mut reason = store.reasons[t].clone();
                        reason.extend_from_slice(&store.reasons[e]);
                        let before = undo.len();
                        if !Self::set_under(store, undo, r, lo, &reason)
                            || !Self::set_over(store, undo, r, hi, &reason)
                        {
                            bail!(r, &[]);
                        }
                        changed |= undo.len() > before;
                    }
                }
                BvOp::Popcount { args, r } => {
                    let r = *r;
                    let mut lo = 0u64;
                    let mut hi = 0u64;
                    let mut reason = vec![];
                    for &l in args {
                        match vals(l) {
                            v if v == lbool::TRUE => {
                                lo += 1;
                                hi += 1;
                                reason.push(l);
                            }
                            v if v == lbool::FALSE => {
                                reason.push(!l);
                            }
                            _ => hi += 1,
                        }
                    }
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Concat { a, b, r } => {
                    let (a, b, r) = (*a, *b, *r);
                    let wa = self.bvs[a].width;
                    let (ua, oa) = store.bounds[a];
                    let (ub, ob) = store.bounds[b];
                    let mut reason = store.reasons[a].clone();
                    reason.extend_from_slice(&store.reasons[b]);
                    let lo = ua | (ub << wa);
                    let hi = oa | (ob << wa);
                    let before = undo.len();
                    if !Self::set_under(store, undo, r, lo, &reason)
                        || !Self::set_over(store, undo, r, hi, &reason)
                    {
                        bail!(r, &[]);
                    }
                    changed |= undo.len() > before;
                }
                BvOp::Slice { .. } => {
                    // enforced through bit equalities once bitblasted
                }
            }
        }
        // re-apply assigned bv-to-bv comparisons
        for li in 0..self.links.len() {
            let (ci, val) = self.links[li];
            let Comparison { bv, op, rhs, lit } = self.comparisons[ci];
            if let Rhs::Bv(other) = rhs {
                let alit = if val { lit } else { !lit };
                let store_rc = self.store.clone();
                let mut store_guard = store_rc.borrow_mut();
                let store = &mut *store_guard;
                let before = self.undo.len();
                if let Some(clause) =
                    Self::apply_link(store, &mut self.undo, bv, other, op, val, alit)
                {
                    self.conflict = Some(clause);
                    return None;
                }
                changed |= self.undo.len() > before;
            }
        }
        Some(changed)
    }

    /// Evaluate all comparison atoms against the current bounds, queueing
    /// propagations for those whose truth is now determined.
    fn evaluate_comparisons(&mut self, vals: &dyn Fn(Lit) -> lbool) {
        let store = self.store.borrow();
        for ci in 0..self.comparisons.len() {
            let Comparison { bv, op, rhs, lit } = self.comparisons[ci];
            let (ua, oa) = store.bounds[bv];
            let (implied, reason_side): (Option<bool>, bool) = match rhs {
                Rhs::Const(c) => match op {
                    CmpOp::Leq => {
                        if oa <= c {
                            (Some(true), false)
                        } else if ua > c {
                            (Some(false), true)
                        } else {
                            (None, false)
                        }
                    }
                    CmpOp::Lt => {
                        if oa < c {
                            (Some(true), false)
                        } else if ua >= c {
                            (Some(false), true)
                        } else {
                            (None, false)
                        }
                    }
                    CmpOp::Geq => {
                        if ua >= c {
                            (Some(true), true)
                        } else if oa < c {
                            (Some(false), false)
                        } else {
                            (None, false)
                        }
                    }
                    CmpOp::Gt => {
                        if ua > c {
                            (Some(true), true)
                        } else if oa <= c {
                            (Some(false), false)
                        } else {
                            (None, false)
                        }
                    }
                },
                Rhs::Bv(b) => {
                    let (ub, ob) = store.bounds[b];
                    match op {
                        CmpOp::Leq => {
                            if oa <= ub {
                                (Some(true), false)
                            } else if ua > ob {
                                (Some(false), true)
                            } else {
                                (None, false)
                            }
                        }
                        CmpOp::Lt => {
                            if oa < ub {
                                (Some(true), false)
                            } else if ua >= ob {
                                (Some(false), true)
                            } else {
                                (None, false)
                            }
                        }
                        CmpOp::Geq => {
                            if ua >= ob {
                                (Some(true), true)
                            } else if oa < ub {
                                (Some(false), false)
                            } else {
                                (None, false)
                            }
                        }
                        CmpOp::Gt => {
                            if ua > ob {
                                (Some(true), true)
                            } else if oa <= ub {
                                (Some(false), false)
                            } else {
                                (None, false)
                            }
                        }
                    }
                }
            };
            if let Some(truth) = implied {
                let plit = if truth { lit } else { !lit };
                if vals(plit) == lbool::TRUE {
                    continue; // already assigned consistently
                }
                // explanation: bounds reasons of both sides
                let mut expl: Vec<Lit> = store.reasons[bv].clone();
                if let Rhs::Bv(b) = rhs {
                    expl.extend_from_slice(&store.reasons[b]);
                }
                expl.sort_unstable();
                expl.dedup();
                let _ = reason_side;
                self.pending.push((plit, expl));
            }
        }
    }

    fn sync_and_propagate(&mut self, acts: &mut TheoryArg, final_check: bool) {
        // pull the newly assigned literals off the trail
        self.incoming.clear();
        {
            let model = acts.model();
            if self.head > model.len() {
                // the solver backtracked without a pop (level-0 restart);
                // reprocess the whole prefix
                self.head = 0;
            }
            self.incoming.extend_from_slice(&model[self.head..]);
            self.head = model.len();
        }
        self.pending.clear();

        for i in 0..self.incoming.len() {
            let l = self.incoming[i];
            let v = l.var();
            if let Some(&ci) = self.cmp_of_var.get(v) {
                if ci >= 0 {
                    let val = l.sign();
                    if !self.apply_comparison(ci as usize, val) {
                        break;
                    }
                    if let Rhs::Bv(_) = self.comparisons[ci as usize].rhs {
                        self.links.push((ci as usize, val));
                    }
                    continue;
                }
            }
            if let Some(&br) = self.bit_of_var.get(v) {
                if br.bv >= 0 {
                    if !self.apply_bit(br.bv as usize, br.idx, l.sign(), l) {
                        break;
                    }
                }
            }
        }

        // run the operator fixpoint
        if self.conflict.is_none() {
            loop {
                let vals = |l: Lit| acts.value_lit(l);
                match self.op_pass(&vals) {
                    None => break,
                    Some(true) => continue,
                    Some(false) => break,
                }
            }
        }

        if self.conflict.is_none() && final_check {
            // pin exact values so model queries read a single value
            self.finalize_exact(acts);
        }

        if let Some(clause) = self.conflict.take() {
            acts.raise_conflict(&clause, true);
            return;
        }

        let vals = |l: Lit| acts.value_lit(l);
        self.evaluate_comparisons(&vals);

        let pending = std::mem::replace(&mut self.pending, vec![]);
        for (lit, expl) in pending.into_iter() {
            self.expl_map.insert(lit, expl);
            if !acts.propagate(lit) {
                return;
            }
        }

        if final_check && self.conflict.is_none() {
            self.store.borrow_mut().snapshot();
        }
    }

    /// At final check every operator is evaluated exactly over the value of
    /// its operands (the under-approximation of a still-loose interval),
    /// catching anything interval propagation was too weak to see.
    fn finalize_exact(&mut self, acts: &mut TheoryArg) {
        for _round in 0..self.ops.len() + 1 {
            let mut changed = false;
            for oi in 0..self.ops.len() {
                let store_rc = self.store.clone();
                let mut store_guard = store_rc.borrow_mut();
                let store = &mut *store_guard;
                let (r, exact, reason): (usize, u64, Vec<Lit>) = match &self.ops[oi] {
                    BvOp::Add { a, b, r } => {
                        let w = self.bvs[*r].width;
                        let v = store.bounds[*a].0.saturating_add(store.bounds[*b].0);
                        let mut re = store.reasons[*a].clone();
                        re.extend_from_slice(&store.reasons[*b]);
                        (*r, v.min(max_val(w)), re)
                    }
                    BvOp::Sub { a, b, r } => {
                        let v = store.bounds[*a].0.saturating_sub(store.bounds[*b].0);
                        let mut re = store.reasons[*a].clone();
                        re.extend_from_slice(&store.reasons[*b]);
                        (*r, v, re)
                    }
                    BvOp::Mul { a, b, r } => {
                        let w = self.bvs[*r].width;
                        let v = store.bounds[*a].0.saturating_mul(store.bounds[*b].0);
                        let mut re = store.reasons[*a].clone();
                        re.extend_from_slice(&store.reasons[*b]);
                        (*r, v.min(max_val(w)), re)
                    }
                    BvOp::Div { a, b, r } => {
                        let w = self.bvs[*r].width;
                        let d = store.bounds[*b].0;
                        let v = if d == 0 {
                            max_val(w)
                        } else {
                            store.bounds[*a].0 / d
                        };
                        let mut re = store.reasons[*a].clone();
                        re.extend_from_slice(&store.reasons[*b]);
                        (*r, v, re)
                    }
                    BvOp::Min { args, r } => {
                        let mut v = u64::MAX;
                        let mut re = vec![];
                        for &a in args {
                            v = v.min(store.bounds[a].0);
                            re.extend_from_slice(&store.reasons[a]);
                        }
                        (*r, v, re)
                    }
                    BvOp::Max { args, r } => {
                        let mut v = 0;
                        let mut re = vec![];
                        for &a in args {
                            v = v.max(store.bounds[a].0);
                            re.extend_from_slice(&store.reasons[a]);
                        }
                        (*r, v, re)
                    }
                    BvOp::Ite {
                        cond,
                        then_bv,
                        else_bv,
                        r,
                    } => {
                        let (src, clit) = if acts.value_lit(*cond) == lbool::TRUE {
                            (*then_bv, *cond)
                        } else {
                            (*else_bv, !*cond)
                        };
                        let mut re = store.reasons[src].clone();
                        re.push(clit);
                        (*r, store.bounds[src].0, re)
                    }
                    BvOp::Popcount { args, r } => {
                        let mut v = 0u64;
                        let mut re = vec![];
                        for &l in args {
                            if acts.value_lit(l) == lbool::TRUE {
                                v += 1;
                                re.push(l);
                            } else {
                                re.push(!l);
                            }
                        }
                        (*r, v, re)
                    }
                    BvOp::Concat { a, b, r } => {
                        let wa = self.bvs[*a].width;
                        let v = store.bounds[*a].0 | (store.bounds[*b].0 << wa);
                        let mut re = store.reasons[*a].clone();
                        re.extend_from_slice(&store.reasons[*b]);
                        (*r, v, re)
                    }
                    BvOp::Slice { a, lower, r } => {
                        let w = self.bvs[*r].width;
                        let v = (store.bounds[*a].0 >> *lower) & max_val(w);
                        (*r, v, store.reasons[*a].clone())
                    }
                };
                let before = self.undo.len();
                if !Self::set_under(store, &mut self.undo, r, exact, &reason)
                    || !Self::set_over(store, &mut self.undo, r, exact, &reason)
                {
                    self.conflict = Some(Self::conflict_from(store, r, &[]));
                    return;
                }
                changed |= self.undo.len() > before;
            }
            if !changed {
                break;
            }
        }
    }
}

impl Theory for BvTheory {
    fn partial_check(&mut self, acts: &mut TheoryArg) {
        self.sync_and_propagate(acts, false);
    }

    fn final_check(&mut self, acts: &mut TheoryArg) {
        self.sync_and_propagate(acts, true);
    }

    fn create_level(&mut self) {
        self.level_marks.push(LevelMark {
            head: self.head,
            undo_len: self.undo.len(),
            links_len: self.links.len(),
        });
    }

    fn pop_levels(&mut self, n: usize) {
        debug_assert!(self.level_marks.len() >= n);
        let target = self.level_marks.len() - n;
        let mark = self.level_marks[target];
        let mut store = self.store.borrow_mut();
        while self.undo.len() > mark.undo_len {
            let u = self.undo.pop().unwrap();
            store.bounds[u.bv] = (u.under, u.over);
            store.reasons[u.bv].truncate(u.reason_len);
        }
        self.links.truncate(mark.links_len);
        self.head = mark.head;
        self.level_marks.truncate(target);
        self.conflict = None;
        self.pending.clear();
    }

    fn n_levels(&self) -> usize {
        self.level_marks.len()
    }

    fn explain_propagation(&mut self, p: Lit) -> &[Lit] {
        let expl = self
            .expl_map
            .get(&p)
            .expect("bv: no explanation recorded for propagated literal");
        self.expl.clear();
        self.expl.extend_from_slice(expl);
        &self.expl
    }

    fn commit_model(&mut self) {
        self.store.borrow_mut().commit();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_max_val() {
        assert_eq!(max_val(1), 1);
        assert_eq!(max_val(4), 15);
        assert_eq!(max_val(64), u64::MAX);
    }

    #[test]
    fn test_const_width_check() {
        let mut bv = BvTheory::new(0);
        assert!(bv.new_bitvector_const(4, 16).is_err());
        assert!(bv.new_bitvector_const(4, 15).is_ok());
        assert!(bv.new_bitvector_anon(0).is_err());
        assert!(bv.new_bitvector_anon(65).is_err());
    }

    #[test]
    fn test_const_bounds() {
        let mut bv = BvTheory::new(0);
        let id = bv.new_bitvector_const(4, 6).unwrap();
        let store = bv.bounds();
        assert_eq!(store.borrow().under(id), 6);
        assert_eq!(store.borrow().over(id), 6);
    }
}
