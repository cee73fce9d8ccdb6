//! The objective optimizer and the unsat-core minimizer.
//!
//! Optimization is lexicographic: each objective in turn is driven to its
//! optimum through repeated solve calls with a transient improvement bound
//! assumed, then pinned with a permanent constraint before the next
//! objective starts. Bitvector objectives tighten through fresh comparison
//! atoms; weighted-literal objectives tighten through the outputs of a
//! counting network built once per objective.

use crate::bv::{BvTheory, CmpOp};
use crate::callbacks::Callbacks;
use crate::clause::{lbool, Lit};
use crate::pb::Totalizer;
use crate::simp::SimpSolver;
use crate::theory::{Theory, TheoryRegistry};

/// One optimization objective.
#[derive(Debug, Clone)]
pub enum Objective {
    Bv {
        bv: usize,
        maximize: bool,
    },
    Lits {
        lits: Vec<Lit>,
        weights: Vec<u64>,
        maximize: bool,
    },
}

/// Conflict budget for each removal probe of the core minimizer.
const CORE_PROBE_CONFLICTS: i64 = 10_000;

/// Solve under `assumps`, then lexicographically optimize `objectives`.
///
/// `found_optimal` is cleared when a budget or interrupt fires before every
/// objective is proven optimal; the best model found so far is then
/// returned. Note that the flag stays `true` when the initial solve is
/// UNSAT: the result is vacuously optimal over an empty set of models.
pub fn optimize_and_solve<Cb: Callbacks>(
    sat: &mut SimpSolver<Cb>,
    th: &mut TheoryRegistry,
    bv_tid: Option<usize>,
    objectives: &[Objective],
    assumps: &[Lit],
    found_optimal: &mut bool,
) -> lbool {
    *found_optimal = true;
    let mut assumptions = assumps.to_vec();

    let res = sat.solve_limited_th(th, &assumptions);
    if res != lbool::TRUE {
        if res == lbool::UNDEF {
            *found_optimal = false;
        }
        return res;
    }
    th.commit_model();
    if objectives.is_empty() {
        return res;
    }

    let mut best_model: Vec<lbool> = sat.get_model().to_vec();

    'objectives: for obj in objectives {
        match obj {
            Objective::Bv { bv, maximize } => {
                let bv = *bv;
                let tid = bv_tid.expect("bv objective without a bv theory");
                loop {
                    let v = th
                        .theory_ref::<BvTheory>(tid)
                        .unwrap()
                        .model_value(bv, *maximize)
                        .expect("objective bitvector not allocated");
                    // improvement bound: strictly better than `v`
                    let improve = if *maximize {
                        let width = th.theory_ref::<BvTheory>(tid).unwrap().width(bv).unwrap();
                        if v >= crate::bv::max_val(width) {
                            break;
                        }
                        mk_cmp(sat, th, tid, CmpOp::Geq, bv, v + 1)
                    } else {
                        if v == 0 {
                            break;
                        }
                        mk_cmp(sat, th, tid, CmpOp::Leq, bv, v - 1)
                    };
                    assumptions.push(improve);
                    let r = sat.solve_limited_th(th, &assumptions);
                    match r {
                        x if x == lbool::TRUE => {
                            th.commit_model();
                            best_model = sat.get_model().to_vec();
                        }
                        x if x == lbool::FALSE => {
                            assumptions.pop();
                            // pin the optimum before the next objective
                            let pin = if *maximize {
                                mk_cmp(sat, th, tid, CmpOp::Geq, bv, v)
                            } else {
                                mk_cmp(sat, th, tid, CmpOp::Leq, bv, v)
                            };
                            sat.add_clause_reuse(&mut vec![pin]);
                            break;
                        }
                        _ => {
                            assumptions.pop();
                            *found_optimal = false;
                            break 'objectives;
                        }
                    }
                }
            }
            Objective::Lits {
                lits,
                weights,
                maximize,
            } => {
                // maximizing the satisfied weight is minimizing the weight
                // of the falsified literals
                let elems: Vec<Lit> = if *maximize {
                    lits.iter().map(|&l| !l).collect()
                } else {
                    lits.clone()
                };
                let tot = Totalizer::build(sat, &elems, weights);
                loop {
                    let cost: u64 = elems
                        .iter()
                        .zip(weights.iter())
                        .filter(|&(&l, _)| sat.value_lit(l) == lbool::TRUE)
                        .map(|(_, &w)| w)
                        .sum();
                    if cost == 0 {
                        break;
                    }
                    let improve = !tot
                        .exact_lit(cost)
                        .expect("the current cost is an attainable sum");
                    assumptions.push(improve);
                    let r = sat.solve_limited_th(th, &assumptions);
                    match r {
                        x if x == lbool::TRUE => {
                            th.commit_model();
                            best_model = sat.get_model().to_vec();
                        }
                        x if x == lbool::FALSE => {
                            assumptions.pop();
                            if let Some(l) = tot.bound_lit(cost) {
                                sat.add_clause_reuse(&mut vec![!l]);
                            }
                            break;
                        }
                        _ => {
                            assumptions.pop();
                            *found_optimal = false;
                            break 'objectives;
                        }
                    }
                }
            }
        }
    }

    if *found_optimal {
        // re-solve against the pinned optima so the final model satisfies
        // every constraint added along the way
        let r = sat.solve_limited_th(th, &assumptions);
        if r == lbool::TRUE {
            th.commit_model();
            return lbool::TRUE;
        }
        *found_optimal = false;
    }
    // a budget or interrupt fired mid-optimization; fall back to the best
    // model found, whose witnesses were committed right after the solve
    // that produced it
    sat.force_model(&best_model);
    lbool::TRUE
}

fn mk_cmp<Cb: Callbacks>(
    sat: &mut SimpSolver<Cb>,
    th: &mut TheoryRegistry,
    tid: usize,
    op: CmpOp,
    bv: usize,
    c: u64,
) -> Lit {
    let lit = th
        .theory_mut::<BvTheory>(tid)
        .unwrap()
        .new_comparison_const(sat, op, bv, c, None)
        .expect("objective bitvector not allocated");
    th.set_owner(lit.var(), tid);
    lit
}

/// Shrink a known-UNSAT assumption set to a locally minimal core by probing
/// single removals under a conflict budget. The shrunken set is written back
/// in place and the solver's conflict set is updated to match.
pub fn minimize_unsat_core<Cb: Callbacks>(
    sat: &mut SimpSolver<Cb>,
    th: &mut TheoryRegistry,
    assumptions: &mut Vec<Lit>,
) -> lbool {
    sat.budget_off();
    let r0 = sat.solve_limited_th(th, assumptions);
    if r0 != lbool::FALSE {
        return r0;
    }
    // start from the conflict the solver already derived
    assumptions.retain(|&a| sat.unsat_core_contains_lit(!a));

    let mut i = 0;
    while i < assumptions.len() {
        let cand = assumptions.remove(i);
        sat.set_conf_budget(CORE_PROBE_CONFLICTS);
        let r = sat.solve_limited_th(th, assumptions);
        sat.budget_off();
        if r == lbool::FALSE {
            // still unsat without `cand`: drop it, and let the new conflict
            // drop anything else it no longer mentions
            assumptions.retain(|&a| sat.unsat_core_contains_lit(!a));
        } else {
            // SAT (or not proven within budget): `cand` stays
            assumptions.insert(i, cand);
            i += 1;
        }
    }

    let negated: Vec<Lit> = assumptions.iter().map(|&a| !a).collect();
    sat.set_conflict(&negated);
    lbool::FALSE
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::callbacks::Basic;
    use crate::core::SolverOpts;

    fn mk() -> (SimpSolver<Basic>, TheoryRegistry) {
        (
            SimpSolver::new(SolverOpts::default(), Basic::new()),
            TheoryRegistry::new(),
        )
    }

    #[test]
    fn test_minimize_core_drops_redundant() {
        let (mut sat, mut th) = mk();
        let a = Lit::new(sat.new_var_default(), true);
        let b = Lit::new(sat.new_var_default(), true);
        let c = Lit::new(sat.new_var_default(), true);
        // a and b conflict; c is irrelevant
        sat.add_clause_reuse(&mut vec![!a, !b]);
        let mut assumptions = vec![c, a, b];
        let r = minimize_unsat_core(&mut sat, &mut th, &mut assumptions);
        assert_eq!(r, lbool::FALSE);
        assert_eq!(assumptions.len(), 2);
        assert!(assumptions.contains(&a));
        assert!(assumptions.contains(&b));
        // the solver's conflict was updated to the minimized core
        assert!(sat.unsat_core_contains_lit(!a));
        assert!(sat.unsat_core_contains_lit(!b));
        assert!(!sat.unsat_core_contains_lit(!c));
        // local minimality: removing either remaining literal is SAT
        for i in 0..assumptions.len() {
            let mut probe = assumptions.clone();
            probe.remove(i);
            assert_eq!(sat.solve_limited_th(&mut th, &probe), lbool::TRUE);
        }
    }

    #[test]
    fn test_minimize_lits_objective() {
        let (mut sat, mut th) = mk();
        let lits: Vec<Lit> = (0..3).map(|_| Lit::new(sat.new_var_default(), true)).collect();
        // at least one of the three must hold
        sat.add_clause_reuse(&mut lits.clone());
        let objectives = vec![Objective::Lits {
            lits: lits.clone(),
            weights: vec![1, 1, 1],
            maximize: false,
        }];
        let mut opt = false;
        let r = optimize_and_solve(&mut sat, &mut th, None, &objectives, &[], &mut opt);
        assert_eq!(r, lbool::TRUE);
        assert!(opt);
        let n_true = lits
            .iter()
            .filter(|&&l| sat.value_lit(l) == lbool::TRUE)
            .count();
        assert_eq!(n_true, 1);
    }

    #[test]
    fn test_maximize_lits_objective() {
        let (mut sat, mut th) = mk();
        let lits: Vec<Lit> = (0..3).map(|_| Lit::new(sat.new_var_default(), true)).collect();
        // the first two exclude each other
        sat.add_clause_reuse(&mut vec![!lits[0], !lits[1]]);
        let objectives = vec![Objective::Lits {
            lits: lits.clone(),
            weights: vec![1, 1, 1],
            maximize: true,
        }];
        let mut opt = false;
        let r = optimize_and_solve(&mut sat, &mut th, None, &objectives, &[], &mut opt);
        assert_eq!(r, lbool::TRUE);
        assert!(opt);
        let n_true = lits
            .iter()
            .filter(|&&l| sat.value_lit(l) == lbool::TRUE)
            .count();
        assert_eq!(n_true, 2);
    }
}
