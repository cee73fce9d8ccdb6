//! The constructive-call transcript: a deterministic, append-only replay
//! log, plus the parser that rebuilds an identical problem from one.
//!
//! Every line records one construction call with its parameters, literals in
//! DIMACS form over the external numbering (variable + 1, negated literals
//! negative). `solve` lines re-run the recorded solve. The log is flushed
//! after every write.

use crate::api::Solver;
use crate::bv::CmpOp;
use crate::errors::{Error, Result};
use crate::pb::Ineq;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};

pub struct Transcript {
    out: Option<BufWriter<File>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self { out: None }
    }

    /// Open (truncating) the given path; an empty path closes the log.
    pub fn set_output_file(&mut self, path: &str) -> Result<()> {
        self.out = None;
        if !path.is_empty() {
            self.out = Some(BufWriter::new(File::create(path)?));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.out.is_some()
    }

    /// Write one line and flush it.
    pub fn emit(&mut self, line: fmt::Arguments) -> Result<()> {
        if let Some(out) = self.out.as_mut() {
            out.write_fmt(line)?;
            out.write_all(b"\n")?;
            out.flush()?;
        }
        Ok(())
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_err(lineno: usize, msg: impl fmt::Display) -> Error {
    Error::domain(format!("transcript parse error at line {}: {}", lineno, msg))
}

struct Tokens<'a> {
    toks: std::str::SplitWhitespace<'a>,
    lineno: usize,
}

impl<'a> Tokens<'a> {
    fn next_str(&mut self) -> Result<&'a str> {
        self.toks
            .next()
            .ok_or_else(|| parse_err(self.lineno, "unexpected end of line"))
    }

    fn opt_str(&mut self) -> Option<&'a str> {
        self.toks.next()
    }

    fn next_int<T: std::str::FromStr>(&mut self) -> Result<T> {
        let s = self.next_str()?;
        s.parse::<T>()
            .map_err(|_| parse_err(self.lineno, format!("expected a number, got {:?}", s)))
    }

    fn rest_ints<T: std::str::FromStr>(&mut self) -> Result<Vec<T>> {
        let mut out = vec![];
        while let Some(s) = self.toks.next() {
            out.push(
                s.parse::<T>()
                    .map_err(|_| parse_err(self.lineno, format!("expected a number, got {:?}", s)))?,
            );
        }
        Ok(out)
    }
}

/// Rebuild the problem recorded in `input` into `solver`, re-running every
/// recorded solve call. The final solve result is returned (true except
/// when the last recorded solve was UNSAT or never ran).
pub fn parse_transcript<R: BufRead>(solver: &mut Solver, input: R) -> Result<bool> {
    let mut last_result = true;
    let mut line_s = String::new();
    let mut input = input;
    let mut lineno = 0;
    loop {
        line_s.clear();
        if input.read_line(&mut line_s)? == 0 {
            break;
        }
        lineno += 1;
        let line = line_s.trim();
        if line.is_empty() || line.starts_with('c') {
            continue;
        }
        let mut t = Tokens {
            toks: line.split_whitespace(),
            lineno,
        };
        let head = t.next_str()?;
        match head {
            "solve" => {
                let dimacs: Vec<i64> = t.rest_ints()?;
                let mut assumps = vec![];
                for d in dimacs {
                    assumps.push(solver.lit_of_dimacs(d as i32)?);
                }
                last_result = solver.solve_assumptions(&assumps)?;
            }
            "symbol" => {
                let v: i64 = t.next_int()?;
                let name = t.next_str()?;
                let l = solver.lit_of_dimacs(v as i32)?;
                solver.set_variable_name(l.var(), name)?;
            }
            "decision" => {
                let v: i64 = t.next_int()?;
                let b: i64 = t.next_int()?;
                let l = solver.lit_of_dimacs(v as i32)?;
                solver.set_decision_var(l.var(), b != 0)?;
            }
            "priority" => {
                let v: i64 = t.next_int()?;
                let p: i64 = t.next_int()?;
                let l = solver.lit_of_dimacs(v as i32)?;
                solver.set_decision_priority(l.var(), p as i32)?;
            }
            "digraph" => {
                let _z0: i64 = t.next_int()?;
                let _z1: i64 = t.next_int()?;
                let _gid: i64 = t.next_int()?;
                let bw: i64 = t.next_int()?;
                let name = t.opt_str().unwrap_or("");
                solver.new_graph_named(name, bw as i32)?;
            }
            "node" => {
                let g: usize = t.next_int()?;
                let _n: i64 = t.next_int()?;
                let name = t.opt_str().unwrap_or("");
                solver.new_node_named(g, name)?;
            }
            "edge" => {
                let g: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let w: u64 = t.next_int()?;
                let l = solver.lit_of_dimacs(d as i32)?;
                solver.new_edge_with_var(g, from, to, w, Some(l.var()))?;
            }
            "edge_bv" => {
                let g: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let bv: usize = t.next_int()?;
                let l = solver.lit_of_dimacs(d as i32)?;
                solver.new_edge_bv_with_var(g, from, to, bv, Some(l.var()))?;
            }
            "reach" | "reach_backward" => {
                let g: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                if head == "reach" {
                    solver.reaches_with_var(g, from, to, -1, Some(v))?;
                } else {
                    solver.reaches_backward_with_var(g, from, to, Some(v))?;
                }
            }
            "on_path" => {
                let g: usize = t.next_int()?;
                let node: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                solver.on_path_with_var(g, node, from, to, Some(v))?;
            }
            "distance_lt" | "distance_leq" => {
                let g: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let steps: i64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                let within = if head == "distance_lt" { steps - 1 } else { steps };
                solver.reaches_with_var(g, from, to, within, Some(v))?;
            }
            "weighted_distance_lt" | "weighted_distance_leq" => {
                let g: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let dist: u64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                let strict = head == "weighted_distance_lt";
                solver.shortest_path_with_var(g, from, to, dist, strict, Some(v))?;
            }
            "weighted_distance_bv_lt" | "weighted_distance_bv_leq" => {
                let g: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let bv: usize = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                let strict = head == "weighted_distance_bv_lt";
                solver.shortest_path_bv_with_var(g, from, to, bv, strict, Some(v))?;
            }
            "maximum_flow_geq" | "maximum_flow_gt" => {
                let g: usize = t.next_int()?;
                let s: usize = t.next_int()?;
                let snk: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let w: u64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                let strict = head == "maximum_flow_gt";
                solver.maxflow_with_var(g, s, snk, w, strict, Some(v))?;
            }
            "maximum_flow_bv_geq" | "maximum_flow_bv_gt" => {
                let g: usize = t.next_int()?;
                let s: usize = t.next_int()?;
                let snk: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let bv: usize = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                let strict = head == "maximum_flow_bv_gt";
                solver.maxflow_bv_with_var(g, s, snk, bv, strict, Some(v))?;
            }
            "mst_weight_leq" | "mst_weight_lt" => {
                let g: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let w: u64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                let strict = head == "mst_weight_lt";
                solver.mst_weight_with_var(g, w, strict, Some(v))?;
            }
            "forest" | "acyclic" => {
                let g: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                solver.acyclic_with_var(g, head == "acyclic", Some(v))?;
            }
            "edge_set" => {
                let g: usize = t.next_int()?;
                let n: usize = t.next_int()?;
                let mut lits = vec![];
                for _ in 0..n {
                    let d: i64 = t.next_int()?;
                    lits.push(solver.lit_of_dimacs(d as i32)?);
                }
                solver.new_edge_set(g, &lits, true)?;
            }
            "graph_assign_edges_to_weight" => {
                let g: usize = t.next_int()?;
                let w: u64 = t.next_int()?;
                solver.set_assign_edges_to_weight(g, w)?;
            }
            "amo" => {
                let dimacs: Vec<i64> = t.rest_ints()?;
                let mut vars = vec![];
                for d in dimacs {
                    if d == 0 {
                        break;
                    }
                    vars.push(solver.lit_of_dimacs(d as i32)?.var());
                }
                solver.at_most_one(&vars)?;
            }
            "pb" => {
                let op = Ineq::parse(t.next_str()?)?;
                let rhs: i64 = t.next_int()?;
                let n: usize = t.next_int()?;
                let mut lits = vec![];
                for _ in 0..n {
                    let d: i64 = t.next_int()?;
                    lits.push(solver.lit_of_dimacs(d as i32)?);
                }
                let n2: usize = t.next_int()?;
                let mut coefs = vec![];
                for _ in 0..n2 {
                    coefs.push(t.next_int::<i64>()?);
                }
                solver.assert_pb(rhs, &lits, &coefs, op)?;
            }
            "bv" => self::parse_bv_line(solver, &mut t)?,
            "bv_ite" => {
                let d: i64 = t.next_int()?;
                let then_bv: usize = t.next_int()?;
                let else_bv: usize = t.next_int()?;
                let r: usize = t.next_int()?;
                let cond = solver.lit_of_dimacs(d as i32)?;
                solver.bv_ite(cond, then_bv, else_bv, r)?;
            }
            "fsm" => {
                let _id: i64 = t.next_int()?;
                let ia: u32 = t.next_int()?;
                let oa: u32 = t.next_int()?;
                solver.new_fsm(ia, oa)?;
            }
            "fsm_state" => {
                let f: usize = t.next_int()?;
                solver.new_fsm_state(f)?;
            }
            "transition" => {
                let f: usize = t.next_int()?;
                let from: usize = t.next_int()?;
                let to: usize = t.next_int()?;
                let il: u32 = t.next_int()?;
                let ol: u32 = t.next_int()?;
                let d: i64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                solver.new_fsm_transition_with_var(f, from, to, il, ol, Some(v))?;
            }
            "str" => {
                let _id: i64 = t.next_int()?;
                let labels: Vec<u32> = t.rest_ints()?;
                solver.new_fsm_string(&labels)?;
            }
            "accepts" => {
                let f: usize = t.next_int()?;
                let start: usize = t.next_int()?;
                let accept: usize = t.next_int()?;
                let s: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let v = solver.lit_of_dimacs(d as i32)?.var();
                solver.fsm_accepts_with_var(f, start, accept, s, Some(v))?;
            }
            "f_router" => {
                let g: usize = t.next_int()?;
                let _rid: i64 = t.next_int()?;
                let source: usize = t.next_int()?;
                let dest: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let mf = solver.lit_of_dimacs(d as i32)?;
                solver.create_flow_routing(g, source, dest, mf)?;
            }
            "f_router_net" => {
                let g: usize = t.next_int()?;
                let rid: usize = t.next_int()?;
                let d: i64 = t.next_int()?;
                let disable = solver.lit_of_dimacs(d as i32)?;
                let n: usize = t.next_int()?;
                let mut members = vec![];
                for _ in 0..n {
                    let e: i64 = t.next_int()?;
                    let r: i64 = t.next_int()?;
                    members.push((
                        solver.lit_of_dimacs(e as i32)?,
                        solver.lit_of_dimacs(r as i32)?,
                    ));
                }
                solver.add_routing_net(g, rid, disable, &members)?;
            }
            "maximize" | "minimize" => {
                let maximize = head == "maximize";
                match t.next_str()? {
                    "bv" => {
                        let id: usize = t.next_int()?;
                        solver.optimize_bv(id, maximize)?;
                    }
                    "lits" => {
                        let n: usize = t.next_int()?;
                        let mut lits = vec![];
                        for _ in 0..n {
                            let d: i64 = t.next_int()?;
                            lits.push(solver.lit_of_dimacs(d as i32)?);
                        }
                        let rest: Vec<i64> = t.rest_ints()?;
                        if rest.is_empty() {
                            solver.optimize_lits(&lits, None, maximize)?;
                        } else {
                            // weights followed by a terminating 0
                            let weights: Vec<i64> =
                                rest.iter().take(n).copied().collect();
                            solver.optimize_lits(&lits, Some(&weights), maximize)?;
                        }
                    }
                    other => return Err(parse_err(lineno, format!("unknown objective {:?}", other))),
                }
            }
            "clear_opt" => solver.clear_optimization_objectives()?,
            "minimize_core" => {
                let dimacs: Vec<i64> = t.rest_ints()?;
                let mut assumps = vec![];
                for d in dimacs {
                    assumps.push(solver.lit_of_dimacs(d as i32)?);
                }
                solver.minimize_unsat_core(&mut assumps)?;
            }
            _ => {
                // a bare clause line: dimacs literals terminated by 0
                let first: i64 = head
                    .parse()
                    .map_err(|_| parse_err(lineno, format!("unknown directive {:?}", head)))?;
                let mut lits = vec![];
                let mut d = first;
                loop {
                    if d == 0 {
                        break;
                    }
                    lits.push(solver.lit_of_dimacs(d as i32)?);
                    d = match t.opt_str() {
                        None => break,
                        Some(s) => s
                            .parse()
                            .map_err(|_| parse_err(lineno, format!("bad literal {:?}", s)))?,
                    };
                }
                solver.add_clause(&lits)?;
            }
        }
    }
    Ok(last_result)
}

fn parse_bv_line(solver: &mut Solver, t: &mut Tokens) -> Result<()> {
    let lineno = t.lineno;
    let kw = t.next_str()?;
    match kw {
        "anon" => {
            let _id: i64 = t.next_int()?;
            let w: u32 = t.next_int()?;
            solver.new_bv_anon(w)?;
        }
        "const" => {
            // either a constant declaration or a constant comparison
            let second = t.next_str()?;
            match second {
                "<" | "<=" | ">" | ">=" => {
                    let op = cmp_of_str(second).unwrap();
                    let d: i64 = t.next_int()?;
                    let bv: usize = t.next_int()?;
                    let w: u64 = t.next_int()?;
                    let v = solver.lit_of_dimacs(d as i32)?.var();
                    solver.bv_comparison_const_with_var(op, bv, w, Some(v))?;
                }
                _ => {
                    let _id: i64 = second
                        .parse()
                        .map_err(|_| parse_err(lineno, format!("bad bv id {:?}", second)))?;
                    let w: u32 = t.next_int()?;
                    let val: u64 = t.next_int()?;
                    solver.new_bv_const(w, val)?;
                }
            }
        }
        "<" | "<=" | ">" | ">=" => {
            let op = cmp_of_str(kw).unwrap();
            let d: i64 = t.next_int()?;
            let bv: usize = t.next_int()?;
            let other: usize = t.next_int()?;
            let v = solver.lit_of_dimacs(d as i32)?.var();
            solver.bv_comparison_bv_with_var(op, bv, other, Some(v))?;
        }
        "symbol" => {
            let id: usize = t.next_int()?;
            let name = t.next_str()?;
            solver.set_bv_name(id, name)?;
        }
        "+" | "-" | "*" | "/" => {
            let r: usize = t.next_int()?;
            let a: usize = t.next_int()?;
            let b: usize = t.next_int()?;
            match kw {
                "+" => solver.bv_addition(a, b, r)?,
                "-" => solver.bv_subtraction(a, b, r)?,
                "*" => solver.bv_multiply(a, b, r)?,
                _ => solver.bv_divide(a, b, r)?,
            }
        }
        "min" | "max" => {
            let r: usize = t.next_int()?;
            let n: usize = t.next_int()?;
            let mut args = vec![];
            for _ in 0..n {
                args.push(t.next_int::<usize>()?);
            }
            if kw == "min" {
                solver.bv_min(&args, r)?;
            } else {
                solver.bv_max(&args, r)?;
            }
        }
        "popcount" | "unary" => {
            let r: usize = t.next_int()?;
            let n: usize = t.next_int()?;
            let mut args = vec![];
            for _ in 0..n {
                let d: i64 = t.next_int()?;
                args.push(solver.lit_of_dimacs(d as i32)?);
            }
            if kw == "popcount" {
                solver.bv_popcount(&args, r)?;
            } else {
                solver.bv_unary(&args, r)?;
            }
        }
        "not" => {
            let a: usize = t.next_int()?;
            let out: usize = t.next_int()?;
            solver.bv_not(a, out)?;
        }
        "and" | "nand" | "or" | "nor" | "xor" | "xnor" => {
            let a: usize = t.next_int()?;
            let b: usize = t.next_int()?;
            let out: usize = t.next_int()?;
            match kw {
                "and" => solver.bv_and(a, b, out)?,
                "nand" => solver.bv_nand(a, b, out)?,
                "or" => solver.bv_or(a, b, out)?,
                "nor" => solver.bv_nor(a, b, out)?,
                "xor" => solver.bv_xor(a, b, out)?,
                _ => solver.bv_xnor(a, b, out)?,
            }
        }
        "concat" => {
            let a: usize = t.next_int()?;
            let b: usize = t.next_int()?;
            let r: usize = t.next_int()?;
            solver.bv_concat(a, b, r)?;
        }
        "slice" => {
            let a: usize = t.next_int()?;
            let lower: u32 = t.next_int()?;
            let upper: u32 = t.next_int()?;
            let r: usize = t.next_int()?;
            solver.bv_slice(a, lower, upper, r)?;
        }
        "bitblast" => {
            let id: usize = t.next_int()?;
            solver.bv_bitblast(id)?;
        }
        _ => {
            // explicit-bit declaration: "bv <id> <n> <bits...>"
            let _id: i64 = kw
                .parse()
                .map_err(|_| parse_err(lineno, format!("unknown bv directive {:?}", kw)))?;
            let n: usize = t.next_int()?;
            let mut bits = vec![];
            for _ in 0..n {
                let d: i64 = t.next_int()?;
                bits.push(solver.lit_of_dimacs(d as i32)?.var());
            }
            solver.new_bv(&bits)?;
        }
    }
    Ok(())
}

fn cmp_of_str(s: &str) -> Option<CmpOp> {
    match s {
        "<" => Some(CmpOp::Lt),
        "<=" => Some(CmpOp::Leq),
        ">" => Some(CmpOp::Gt),
        ">=" => Some(CmpOp::Geq),
        _ => None,
    }
}
