//! An SMT solver for monotonic theories: a CDCL SAT core cooperating with
//! theory propagators for finite graphs (reachability, shortest paths,
//! maximum flow, spanning trees, acyclicity), fixed-width bitvectors,
//! pseudo-Boolean constraints, at-most-one sets and finite state machines,
//! with lexicographic optimization over bitvector or weighted-literal
//! objectives.
//!
//! The [`Solver`] type is the embedding surface; the CDCL engine and the
//! individual theories are exposed through their modules for direct use.

//======== LOG ============

// stubs when logging is not enabled
#[cfg(not(feature = "logging"))]
#[macro_use]
pub(crate) mod log {
    macro_rules! trace {
        ($( $x:expr ),*) => {};
    }
    macro_rules! debug {
        ($( $x:expr ),*) => {};
    }
    macro_rules! info {
        ($( $x:expr ),*) => {};
    }
    macro_rules! warn {
        ($( $x:expr ),*) => {};
    }
}

#[cfg(feature = "logging")]
#[macro_use]
pub extern crate log;

//======== PUBLIC INTERFACE ============

pub mod amo;
pub mod api;
pub mod bv;
pub mod callbacks;
pub mod clause;
pub mod core;
pub mod errors;
pub mod fsm;
pub mod graph;
pub mod intmap;
pub mod limits;
pub mod optimize;
pub mod options;
pub mod pb;
pub mod router;
pub mod simp;
pub mod theory;
pub mod transcript;
pub mod varmap;

pub use crate::{
    api::Solver,
    bv::CmpOp,
    callbacks::{Basic as BasicCallbacks, Callbacks, ProgressStatus, Stats as StatsCallbacks},
    clause::{display::Print, lbool, Kind as ClauseKind, LMap, LSet, Lit, VMap, Var},
    core::{Solver as CoreSolver, SolverOpts},
    errors::{Error, Result},
    options::GraphOptions,
    pb::Ineq,
    theory::{EmptyTheory, Theory, TheoryRegistry},
};

/// Basic SAT solver, with basic callbacks and no theories.
pub type BasicSolver = core::Solver<BasicCallbacks>;
