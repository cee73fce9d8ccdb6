//! End-to-end scenarios driven through the embedding surface.

use monosat::{lbool, CmpOp, Solver};

#[test]
fn empty_problem_is_sat() {
    let mut s = Solver::new();
    assert!(s.solve().unwrap());
    assert!(s.has_model());
}

#[test]
fn unsat_without_assumptions_has_empty_conflict_set() {
    let mut s = Solver::new();
    let x1 = monosat::Lit::new(s.new_var(), true);
    let x2 = monosat::Lit::new(s.new_var(), true);
    assert!(s.add_clause(&[x1, x2]).unwrap());
    assert!(s.add_clause(&[!x1, x2]).unwrap());
    s.add_clause(&[!x2]).unwrap();
    assert!(!s.solve().unwrap());
    // the conflicting-assumption set is empty: no assumptions were used
    assert_eq!(s.conflict_clause().unwrap().len(), 0);
    // the solver stays queryable, and remains unsat
    assert!(!s.solve().unwrap());
}

#[test]
fn reachability_under_assumptions() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..3 {
        s.new_node(g).unwrap();
    }
    let a = s.new_edge(g, 0, 1, 1).unwrap();
    let b = s.new_edge(g, 1, 2, 1).unwrap();
    let r = s.reaches(g, 0, 2).unwrap();

    assert!(s.solve_assumptions(&[a, b]).unwrap());
    assert_eq!(s.model_lit(r).unwrap(), lbool::TRUE);
    let path = s.model_path_nodes(g, r).unwrap().unwrap();
    assert_eq!(path, vec![0, 1, 2]);
    let edge_lits = s.model_path_edge_lits(g, r).unwrap().unwrap();
    assert_eq!(edge_lits, vec![a, b]);

    assert!(s.solve_assumptions(&[a, !b]).unwrap());
    assert_eq!(s.model_lit(r).unwrap(), lbool::FALSE);
}

#[test]
fn reaches_self_is_always_true() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    s.new_node(g).unwrap();
    let n_before = s.n_vars();
    let r = s.reaches(g, 0, 0).unwrap();
    // one variable for the constant-true literal, and no more on re-request
    let r2 = s.reaches(g, 0, 0).unwrap();
    assert_eq!(r, r2);
    assert!(s.n_vars() <= n_before + 1);
    assert!(s.solve().unwrap());
    assert_eq!(s.model_lit(r).unwrap(), lbool::TRUE);
}

#[test]
fn weighted_distance_strictness() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..3 {
        s.new_node(g).unwrap();
    }
    let a = s.new_edge(g, 0, 1, 3).unwrap();
    let b = s.new_edge(g, 1, 2, 5).unwrap();
    // total weight is 8, so the non-strict bound holds and the strict fails
    let d8 = s.shortest_path_leq_const(g, 0, 2, 8).unwrap();
    let d8s = s.shortest_path_lt_const(g, 0, 2, 8).unwrap();
    assert!(s.solve_assumptions(&[a, b]).unwrap());
    assert_eq!(s.model_lit(d8).unwrap(), lbool::TRUE);
    assert_eq!(s.model_lit(d8s).unwrap(), lbool::FALSE);
}

#[test]
fn atom_deduplication() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..2 {
        s.new_node(g).unwrap();
    }
    s.new_edge(g, 0, 1, 1).unwrap();
    let r1 = s.reaches(g, 0, 1).unwrap();
    let r2 = s.reaches(g, 0, 1).unwrap();
    assert_eq!(r1, r2);
    let m1 = s.maximum_flow_geq(g, 0, 1, 1).unwrap();
    let m2 = s.maximum_flow_geq(g, 0, 1, 1).unwrap();
    assert_eq!(m1, m2);
}

#[test]
fn bv_constant_comparisons() {
    let mut s = Solver::new();
    s.init_bv_theory();
    let bv0 = s.new_bv_const(4, 6).unwrap();
    let bv1 = s.new_bv_const(4, 9).unwrap();
    let l = s.bv_comparison_bv(CmpOp::Lt, bv0, bv1).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.model_lit(l).unwrap(), lbool::TRUE);
    let l2 = s.bv_comparison_bv(CmpOp::Lt, bv1, bv0).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.model_lit(l2).unwrap(), lbool::FALSE);
    // both atoms are decided at level 0
    assert_eq!(s.constant_model_lit(l).unwrap(), lbool::TRUE);
    assert_eq!(s.constant_model_lit(l2).unwrap(), lbool::FALSE);
}

#[test]
fn minimize_bv_objective() {
    let mut s = Solver::new();
    s.init_bv_theory();
    let bv = s.new_bv_anon(3).unwrap();
    let geq2 = s.bv_comparison_const(CmpOp::Geq, bv, 2).unwrap();
    s.add_clause(&[geq2]).unwrap();
    s.minimize_bv(bv).unwrap();
    assert!(s.solve().unwrap());
    assert_eq!(s.model_bv(bv, false).unwrap(), 2);
    assert!(s.last_solution_was_optimal());
}

#[test]
fn maxflow_diamond() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..4 {
        s.new_node(g).unwrap();
    }
    let e1 = s.new_edge(g, 0, 1, 1).unwrap();
    let e2 = s.new_edge(g, 0, 2, 1).unwrap();
    let e3 = s.new_edge(g, 1, 3, 1).unwrap();
    let e4 = s.new_edge(g, 2, 3, 1).unwrap();
    let m = s.maximum_flow_geq(g, 0, 3, 2).unwrap();
    assert!(s.solve_assumptions(&[e1, e2, e3, e4]).unwrap());
    assert_eq!(s.model_lit(m).unwrap(), lbool::TRUE);
    assert_eq!(s.model_maxflow(g, m).unwrap(), 2);
    // the acyclic decomposition carries the full flow out of the source
    let f1 = s.model_acyclic_edge_flow(g, m, e1).unwrap();
    let f2 = s.model_acyclic_edge_flow(g, m, e2).unwrap();
    assert_eq!(f1 + f2, 2);
    // per-edge flows agree with capacities
    for &e in &[e1, e2, e3, e4] {
        assert!(s.model_edge_flow(g, m, e).unwrap() <= 1);
    }
}

#[test]
fn maxflow_with_disabled_edge_forces_false() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..4 {
        s.new_node(g).unwrap();
    }
    let e1 = s.new_edge(g, 0, 1, 1).unwrap();
    let e2 = s.new_edge(g, 0, 2, 1).unwrap();
    let e3 = s.new_edge(g, 1, 3, 1).unwrap();
    let e4 = s.new_edge(g, 2, 3, 1).unwrap();
    let m = s.maximum_flow_geq(g, 0, 3, 2).unwrap();
    assert!(s.solve_assumptions(&[e1, !e2, e3, e4]).unwrap());
    assert_eq!(s.model_lit(m).unwrap(), lbool::FALSE);
    // requiring the flow anyway is unsat
    assert!(!s.solve_assumptions(&[e1, !e2, e3, e4, m]).unwrap());
}

#[test]
fn acyclicity_directed() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..2 {
        s.new_node(g).unwrap();
    }
    let a = s.new_edge(g, 0, 1, 1).unwrap();
    let b = s.new_edge(g, 1, 0, 1).unwrap();
    let acyc = s.acyclic_directed(g).unwrap();
    assert!(s.solve_assumptions(&[a, b]).unwrap());
    assert_eq!(s.model_lit(acyc).unwrap(), lbool::FALSE);
    assert!(s.solve_assumptions(&[a, !b]).unwrap());
    assert_eq!(s.model_lit(acyc).unwrap(), lbool::TRUE);
    // demanding acyclicity while both edges are enabled is unsat
    assert!(!s.solve_assumptions(&[a, b, acyc]).unwrap());
}

#[test]
fn mst_weight_bound() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..3 {
        s.new_node(g).unwrap();
    }
    let e1 = s.new_edge(g, 0, 1, 2).unwrap();
    let e2 = s.new_edge(g, 1, 2, 3).unwrap();
    let e3 = s.new_edge(g, 0, 2, 10).unwrap();
    let mst = s.minimum_spanning_tree_leq(g, 5).unwrap();
    assert!(s.solve_assumptions(&[e1, e2, e3]).unwrap());
    assert_eq!(s.model_lit(mst).unwrap(), lbool::TRUE);
    assert_eq!(s.model_mst_weight(g, mst).unwrap(), 5);
    // without the light edges the only spanning option is too heavy
    assert!(s.solve_assumptions(&[!e1, e2, e3]).unwrap());
    assert_eq!(s.model_lit(mst).unwrap(), lbool::FALSE);
}

#[test]
fn unsat_core_is_sufficient_and_minimal() {
    let mut s = Solver::new();
    let a = monosat::Lit::new(s.new_var(), true);
    let b = monosat::Lit::new(s.new_var(), true);
    let c = monosat::Lit::new(s.new_var(), true);
    s.add_clause(&[!a, !b]).unwrap();
    let mut assumptions = vec![c, a, b];
    let n = s.minimize_unsat_core(&mut assumptions).unwrap();
    assert_eq!(n, 2);
    assert!(assumptions.contains(&a));
    assert!(assumptions.contains(&b));
    // sufficiency: the returned core alone is still unsat
    assert!(!s.solve_assumptions(&assumptions).unwrap());
    // local minimality: removing either literal is satisfiable
    for i in 0..assumptions.len() {
        let mut probe = assumptions.clone();
        probe.remove(i);
        assert!(s.solve_assumptions(&probe).unwrap());
    }
}

#[test]
fn edge_set_exactly_one() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..3 {
        s.new_node(g).unwrap();
    }
    let e1 = s.new_edge(g, 0, 1, 1).unwrap();
    let e2 = s.new_edge(g, 0, 2, 1).unwrap();
    s.new_edge_set(g, &[e1, e2], true).unwrap();
    assert!(s.solve().unwrap());
    let v1 = s.model_lit(e1).unwrap();
    let v2 = s.model_lit(e2).unwrap();
    assert_ne!(v1, v2); // exactly one enabled
    assert!(!s.solve_assumptions(&[e1, e2]).unwrap());
    assert!(!s.solve_assumptions(&[!e1, !e2]).unwrap());
}

#[test]
fn at_most_one_constraint() {
    let mut s = Solver::new();
    let vars: Vec<_> = (0..3).map(|_| s.new_var()).collect();
    let lits: Vec<_> = vars.iter().map(|&v| monosat::Lit::new(v, true)).collect();
    s.at_most_one(&vars).unwrap();
    assert!(s.solve_assumptions(&[lits[0]]).unwrap());
    assert_eq!(s.model_lit(lits[1]).unwrap(), lbool::FALSE);
    assert_eq!(s.model_lit(lits[2]).unwrap(), lbool::FALSE);
    assert!(!s.solve_assumptions(&[lits[0], lits[1]]).unwrap());
}

#[test]
fn pseudo_boolean_constraints() {
    let mut s = Solver::new();
    let lits: Vec<_> = (0..4)
        .map(|_| monosat::Lit::new(s.new_var(), true))
        .collect();
    s.assert_pb(2, &lits, &[1, 1, 1, 1], monosat::Ineq::Geq)
        .unwrap();
    s.assert_pb(2, &lits, &[1, 1, 1, 1], monosat::Ineq::Leq)
        .unwrap();
    s.flush_pb().unwrap();
    assert!(s.solve().unwrap());
    let n_true = lits
        .iter()
        .filter(|&&l| s.model_lit(l).unwrap() == lbool::TRUE)
        .count();
    assert_eq!(n_true, 2);
}

#[test]
fn fsm_acceptance() {
    let mut s = Solver::new();
    let f = s.new_fsm(2, 0).unwrap();
    let q0 = s.new_fsm_state(f).unwrap();
    let q1 = s.new_fsm_state(f).unwrap();
    let t = s.new_fsm_transition(f, q0, q1, 1, 0).unwrap();
    let w = s.new_fsm_string(&[1]).unwrap();
    let acc = s.fsm_accepts(f, q0, q1, w).unwrap();
    assert!(s.solve_assumptions(&[t]).unwrap());
    assert_eq!(s.model_lit(acc).unwrap(), lbool::TRUE);
    assert!(s.solve_assumptions(&[!t]).unwrap());
    assert_eq!(s.model_lit(acc).unwrap(), lbool::FALSE);
}

#[test]
fn bv_weighted_edges() {
    let mut s = Solver::new();
    s.init_bv_theory();
    let g = s.new_graph_named("", 4).unwrap();
    for _ in 0..2 {
        s.new_node(g).unwrap();
    }
    let w = s.new_bv_anon(4).unwrap();
    let e = s.new_edge_bv(g, 0, 1, w).unwrap();
    let wle3 = s.bv_comparison_const(CmpOp::Leq, w, 3).unwrap();
    let d = s.shortest_path_leq_const(g, 0, 1, 3).unwrap();
    // with the weight bounded by 3, the distance bound must hold
    assert!(s.solve_assumptions(&[e, wle3]).unwrap());
    assert_eq!(s.model_lit(d).unwrap(), lbool::TRUE);
    // with the weight forced above 3, it must not
    assert!(s.solve_assumptions(&[e, !wle3]).unwrap());
    assert_eq!(s.model_lit(d).unwrap(), lbool::FALSE);
}

#[test]
fn graph_monotonicity_of_reach() {
    // enabling additional edges never falsifies a positive reach atom
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..4 {
        s.new_node(g).unwrap();
    }
    let e1 = s.new_edge(g, 0, 1, 1).unwrap();
    let e2 = s.new_edge(g, 1, 3, 1).unwrap();
    let e3 = s.new_edge(g, 0, 2, 1).unwrap();
    let e4 = s.new_edge(g, 2, 3, 1).unwrap();
    let r = s.reaches(g, 0, 3).unwrap();
    assert!(s.solve_assumptions(&[e1, e2, !e3, !e4]).unwrap());
    assert_eq!(s.model_lit(r).unwrap(), lbool::TRUE);
    assert!(s.solve_assumptions(&[e1, e2, e3, e4]).unwrap());
    assert_eq!(s.model_lit(r).unwrap(), lbool::TRUE);
}

#[test]
fn unknown_algorithm_option_is_rejected() {
    let mut s = Solver::new();
    assert!(s.set_graph_option("maxflow", "edmondskarp").is_ok());
    assert!(s.set_graph_option("maxflow", "spaghetti").is_err());
    assert!(s.set_graph_option("reach", "ramal-reps-batch2").is_ok());
    assert!(s.set_graph_option("nonsense", "bfs").is_err());
}

#[test]
fn invalid_names_are_rejected() {
    let mut s = Solver::new();
    assert!(s.new_named_var("ok_name").is_ok());
    assert!(s.new_named_var("ok_name").is_err()); // duplicate
    assert!(s.new_named_var("bad name").is_err()); // whitespace
    let g = s.new_graph().unwrap();
    s.new_node_named(g, "n0").unwrap();
    assert!(s.new_node_named(g, "n0").is_err());
    assert_eq!(s.node_by_name(g, "n0").unwrap(), Some(0));
}

#[test]
fn flow_router_net_lemmas() {
    let mut s = Solver::new();
    let g = s.new_graph().unwrap();
    for _ in 0..2 {
        s.new_node(g).unwrap();
    }
    let e1 = s.new_edge(g, 0, 1, 1).unwrap();
    let e2 = s.new_edge(g, 0, 1, 1).unwrap();
    let dis = s.new_edge(g, 0, 1, 1).unwrap();
    let mf = s.maximum_flow_geq(g, 0, 1, 1).unwrap();
    let r1 = monosat::Lit::new(s.new_var(), true);
    let r2 = monosat::Lit::new(s.new_var(), true);
    let router = s.create_flow_routing(g, 0, 1, mf).unwrap();
    s.add_routing_net(g, router, dis, &[(e1, r1), (e2, r2)])
        .unwrap();

    // two members routed at once violate the net's mutual exclusion
    assert!(!s.solve_assumptions(&[e1, e2]).unwrap());
    // a routed net cannot also be opted out through its disable edge
    assert!(!s.solve_assumptions(&[dis, e1]).unwrap());
    // the chosen member must carry its reachability
    assert!(!s.solve_assumptions(&[e1, !r1]).unwrap());
    // a net that is neither routed nor opted out is rejected at the full
    // model, and repaired when the disable edge is left open
    assert!(!s.solve_assumptions(&[!e1, !e2, !dis]).unwrap());
    assert!(s.solve_assumptions(&[!e1, !e2]).unwrap());
    assert_eq!(s.model_lit(dis).unwrap(), lbool::TRUE);
    // a single routed member with its reachability holds
    assert!(s.solve_assumptions(&[e1, !e2, !dis]).unwrap());
    assert_eq!(s.model_lit(r1).unwrap(), lbool::TRUE);
}

#[test]
fn conflict_limit_reports_unknown() {
    let mut s = Solver::new();
    // a small pigeonhole instance that needs search
    let n = 6;
    let holes = n - 1;
    let mut vars = vec![];
    for _ in 0..n {
        let row: Vec<_> = (0..holes)
            .map(|_| monosat::Lit::new(s.new_var(), true))
            .collect();
        s.add_clause(&row).unwrap();
        vars.push(row);
    }
    for h in 0..holes {
        for i in 0..n {
            for j in (i + 1)..n {
                s.add_clause(&[!vars[i][h], !vars[j][h]]).unwrap();
            }
        }
    }
    s.set_conflict_limit(1);
    let r = s.solve_limited(&[]).unwrap();
    assert_eq!(r, lbool::UNDEF);
    assert!(!s.last_solution_was_optimal());
    s.set_conflict_limit(-1);
    let r = s.solve_limited(&[]).unwrap();
    assert_eq!(r, lbool::FALSE);
}
