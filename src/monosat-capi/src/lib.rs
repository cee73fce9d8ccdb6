//! # C API
//!
//! Foreign-callable layer over the solver, following the conventions of the
//! original embedding surface: an opaque solver pointer, literals encoded as
//! non-negative integers (`2 * var + sign`), and ternary results encoded as
//! 0 = true, 1 = false, 2 = undefined.

use monosat::{lbool, Lit, Solver};
use std::os::raw::{c_char, c_int, c_longlong};

static NAME: &str = concat!("monosat-", env!("CARGO_PKG_VERSION"), "\0");

fn get_solver<'a>(ptr: *mut Solver) -> &'a mut Solver {
    unsafe { &mut *ptr }
}

/// External integer encoding of a literal over the external numbering.
fn ext_of_lit(s: &Solver, l: Lit) -> c_int {
    let e = s.external_lit(l).expect("literal has no external id");
    (e.var().idx() * 2 + (!e.sign()) as u32) as c_int
}

fn lit_of_ext(s: &mut Solver, ext: c_int) -> Lit {
    debug_assert!(ext >= 0);
    let var = (ext / 2) as u32;
    let sign = ext % 2 == 0;
    // dimacs form: var + 1, negative when negated
    let d = if sign {
        var as i32 + 1
    } else {
        -(var as i32 + 1)
    };
    s.lit_of_dimacs(d).expect("bad external literal")
}

fn lbool_to_int(x: lbool) -> c_int {
    match x {
        x if x == lbool::TRUE => 0,
        x if x == lbool::FALSE => 1,
        _ => 2,
    }
}

#[no_mangle]
pub extern "C" fn monosat_version() -> *const c_char {
    NAME.as_bytes().as_ptr() as *const c_char
}

#[no_mangle]
pub extern "C" fn monosat_new_solver() -> *mut Solver {
    Box::into_raw(Box::new(Solver::new()))
}

#[no_mangle]
pub extern "C" fn monosat_delete_solver(ptr: *mut Solver) {
    if !ptr.is_null() {
        drop(unsafe { Box::from_raw(ptr) });
    }
}

#[no_mangle]
pub extern "C" fn monosat_new_var(ptr: *mut Solver) -> c_int {
    let s = get_solver(ptr);
    let v = s.new_var();
    let e = s.external_lit(Lit::new(v, true)).unwrap();
    e.var().idx() as c_int
}

#[no_mangle]
pub extern "C" fn monosat_true_lit(ptr: *mut Solver) -> c_int {
    let s = get_solver(ptr);
    let l = s.true_lit().expect("transcript failure");
    ext_of_lit(s, l)
}

#[no_mangle]
pub extern "C" fn monosat_add_clause(ptr: *mut Solver, lits: *const c_int, n: c_int) -> bool {
    let s = get_solver(ptr);
    let ext = unsafe { std::slice::from_raw_parts(lits, n as usize) };
    let clause: Vec<Lit> = ext.iter().map(|&e| lit_of_ext(s, e)).collect();
    s.add_clause(&clause).unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn monosat_solve(ptr: *mut Solver) -> c_int {
    monosat_solve_assumptions(ptr, std::ptr::null(), 0)
}

#[no_mangle]
pub extern "C" fn monosat_solve_assumptions(
    ptr: *mut Solver,
    lits: *const c_int,
    n: c_int,
) -> c_int {
    let s = get_solver(ptr);
    let assumps: Vec<Lit> = if lits.is_null() || n == 0 {
        vec![]
    } else {
        let ext = unsafe { std::slice::from_raw_parts(lits, n as usize) };
        ext.iter().map(|&e| lit_of_ext(s, e)).collect()
    };
    match s.solve_limited(&assumps) {
        Ok(r) => lbool_to_int(r),
        Err(_) => 2,
    }
}

#[no_mangle]
pub extern "C" fn monosat_get_model_lit(ptr: *mut Solver, lit: c_int) -> c_int {
    let s = get_solver(ptr);
    let l = lit_of_ext(s, lit);
    match s.model_lit(l) {
        Ok(v) => lbool_to_int(v),
        Err(_) => 2,
    }
}

#[no_mangle]
pub extern "C" fn monosat_last_solution_was_optimal(ptr: *mut Solver) -> bool {
    get_solver(ptr).last_solution_was_optimal()
}

/// Is `lit` part of the conflicting assumption set of the last UNSAT solve?
#[no_mangle]
pub extern "C" fn monosat_failed(ptr: *mut Solver, lit: c_int) -> bool {
    let s = get_solver(ptr);
    let l = lit_of_ext(s, lit);
    match s.conflict_clause() {
        Some(conflict) => conflict.contains(&!l),
        None => false,
    }
}

#[no_mangle]
pub extern "C" fn monosat_set_time_limit(ptr: *mut Solver, seconds: c_int) {
    get_solver(ptr).set_time_limit(seconds);
}

#[no_mangle]
pub extern "C" fn monosat_set_memory_limit(ptr: *mut Solver, mb: c_int) {
    get_solver(ptr).set_memory_limit(mb);
}

#[no_mangle]
pub extern "C" fn monosat_set_conflict_limit(ptr: *mut Solver, n: c_int) {
    get_solver(ptr).set_conflict_limit(n as i64);
}

#[no_mangle]
pub extern "C" fn monosat_set_propagation_limit(ptr: *mut Solver, n: c_int) {
    get_solver(ptr).set_propagation_limit(n as i64);
}

#[no_mangle]
pub extern "C" fn monosat_interrupt(ptr: *mut Solver) {
    get_solver(ptr).interrupt();
}

#[no_mangle]
pub extern "C" fn monosat_new_graph(ptr: *mut Solver) -> c_int {
    get_solver(ptr).new_graph().expect("transcript failure") as c_int
}

#[no_mangle]
pub extern "C" fn monosat_new_node(ptr: *mut Solver, g: c_int) -> c_int {
    get_solver(ptr).new_node(g as usize).expect("bad graph") as c_int
}

#[no_mangle]
pub extern "C" fn monosat_new_edge(
    ptr: *mut Solver,
    g: c_int,
    from: c_int,
    to: c_int,
    weight: c_longlong,
) -> c_int {
    let s = get_solver(ptr);
    let l = s
        .new_edge(g as usize, from as usize, to as usize, weight as u64)
        .expect("bad edge");
    ext_of_lit(s, l)
}

#[no_mangle]
pub extern "C" fn monosat_reaches(ptr: *mut Solver, g: c_int, from: c_int, to: c_int) -> c_int {
    let s = get_solver(ptr);
    let l = s
        .reaches(g as usize, from as usize, to as usize)
        .expect("bad reach atom");
    ext_of_lit(s, l)
}

#[no_mangle]
pub extern "C" fn monosat_maximum_flow_geq(
    ptr: *mut Solver,
    g: c_int,
    source: c_int,
    sink: c_int,
    flow: c_longlong,
) -> c_int {
    let s = get_solver(ptr);
    let l = s
        .maximum_flow_geq(g as usize, source as usize, sink as usize, flow as u64)
        .expect("bad maxflow atom");
    ext_of_lit(s, l)
}

#[no_mangle]
pub extern "C" fn monosat_get_model_maxflow(ptr: *mut Solver, g: c_int, lit: c_int) -> c_longlong {
    let s = get_solver(ptr);
    let l = lit_of_ext(s, lit);
    s.model_maxflow(g as usize, l).unwrap_or(0) as c_longlong
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_c_roundtrip() {
        let ptr = monosat_new_solver();
        let v = monosat_new_var(ptr);
        assert_eq!(v, 0);
        let pos = v * 2;
        let neg = v * 2 + 1;
        let clause = [pos];
        assert!(monosat_add_clause(ptr, clause.as_ptr(), 1));
        assert_eq!(monosat_solve(ptr), 0);
        assert_eq!(monosat_get_model_lit(ptr, pos), 0);
        assert_eq!(monosat_get_model_lit(ptr, neg), 1);
        let assume = [neg];
        assert_eq!(monosat_solve_assumptions(ptr, assume.as_ptr(), 1), 1);
        assert!(monosat_failed(ptr, neg));
        monosat_delete_solver(ptr);
    }

    #[test]
    fn test_c_graph() {
        let ptr = monosat_new_solver();
        let g = monosat_new_graph(ptr);
        let n0 = monosat_new_node(ptr, g);
        let n1 = monosat_new_node(ptr, g);
        let e = monosat_new_edge(ptr, g, n0, n1, 1);
        let r = monosat_reaches(ptr, g, n0, n1);
        let assume = [e];
        assert_eq!(monosat_solve_assumptions(ptr, assume.as_ptr(), 1), 0);
        assert_eq!(monosat_get_model_lit(ptr, r), 0);
        monosat_delete_solver(ptr);
    }
}
