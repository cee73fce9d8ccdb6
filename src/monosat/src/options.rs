//! Algorithm selection for the graph theory.
//!
//! Each predicate family has a set of recognized algorithm names; the choice
//! is parsed once, stored on the solver, and frozen for its lifetime. An
//! unrecognized name is a domain error and aborts construction.

use crate::errors::{Error, Result};
use std::str::FromStr;

macro_rules! alg_enum {
    ($name:ident, $what:expr, { $($variant:ident : $($s:literal)|+ ,)+ }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant,)+
        }

        impl FromStr for $name {
            type Err = Error;
            fn from_str(s: &str) -> Result<Self> {
                let ls = s.to_ascii_lowercase();
                match ls.as_str() {
                    $($($s)|+ => Ok($name::$variant),)+
                    _ => Err(Error::domain(format!(
                        concat!("unknown ", $what, " algorithm {}, aborting"), s
                    ))),
                }
            }
        }
    };
}

alg_enum!(MaxFlowAlg, "max-flow/min-cut", {
    EdmondsKarpAdj: "edmondskarp-adj",
    EdmondsKarp: "edmondskarp",
    EdmondsKarpDynamic: "edmondskarp-dynamic",
    Dinitz: "dinitz" | "dinics" | "dinits",
    DinitzLinkCut: "dinitz-linkcut" | "dinics-linkcut" | "dinits-linkcut",
    KohliTorr: "kohli-torr",
});

alg_enum!(ComponentsAlg, "connectivity", {
    DisjointSets: "disjoint-sets",
});

alg_enum!(CycleAlg, "cycle detection", {
    Dfs: "dfs",
    Pk: "pk",
});

alg_enum!(MstAlg, "minimum spanning tree", {
    Kruskal: "kruskal",
    Prim: "prim",
    SpiraPan: "spira-pan",
});

alg_enum!(ReachAlg, "reachability", {
    Dijkstra: "dijkstra",
    Bfs: "bfs",
    Dfs: "dfs",
    Cnf: "cnf",
    RamalReps: "ramal-reps",
    RamalRepsBatch: "ramal-reps-batch",
    RamalRepsBatch2: "ramal-reps-batch2",
});

alg_enum!(DistAlg, "distance", {
    Dijkstra: "dijkstra",
    Bfs: "bfs",
    Cnf: "cnf",
    RamalReps: "ramal-reps",
    RamalRepsBatch: "ramal-reps-batch",
    RamalRepsBatch2: "ramal-reps-batch2",
});

alg_enum!(ConnectivityAlg, "undirected reachability", {
    Dijkstra: "dijkstra",
    Bfs: "bfs",
    Dfs: "dfs",
    Cnf: "cnf",
    Thorup: "thorup",
});

alg_enum!(AllPairsAlg, "allpairs reachability", {
    FloydWarshall: "floyd-warshall",
    Dijkstra: "dijkstra",
});

alg_enum!(UndirAllPairsAlg, "undirected allpairs reachability", {
    FloydWarshall: "floyd-warshall",
    Dijkstra: "dijkstra",
    Thorup: "thorup",
});

/// The per-solver algorithm configuration; copied onto each graph at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphOptions {
    pub maxflow: MaxFlowAlg,
    pub components: ComponentsAlg,
    pub cycle: CycleAlg,
    pub mst: MstAlg,
    pub reach: ReachAlg,
    pub dist: DistAlg,
    pub connectivity: ConnectivityAlg,
    pub allpairs: AllPairsAlg,
    pub undir_allpairs: UndirAllPairsAlg,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            maxflow: MaxFlowAlg::EdmondsKarp,
            components: ComponentsAlg::DisjointSets,
            cycle: CycleAlg::Dfs,
            mst: MstAlg::Kruskal,
            reach: ReachAlg::Bfs,
            dist: DistAlg::Bfs,
            connectivity: ConnectivityAlg::Bfs,
            allpairs: AllPairsAlg::Dijkstra,
            undir_allpairs: UndirAllPairsAlg::Dijkstra,
        }
    }
}

impl GraphOptions {
    /// Assign one option family from its textual value.
    pub fn set(&mut self, family: &str, value: &str) -> Result<()> {
        match family {
            "maxflow" => self.maxflow = value.parse()?,
            "components" => self.components = value.parse()?,
            "cycle" => self.cycle = value.parse()?,
            "mst" => self.mst = value.parse()?,
            "reach" => self.reach = value.parse()?,
            "dist" => self.dist = value.parse()?,
            "connectivity" => self.connectivity = value.parse()?,
            "allpairs" => self.allpairs = value.parse()?,
            "undir-allpairs" => self.undir_allpairs = value.parse()?,
            _ => {
                return Err(Error::domain(format!(
                    "unknown graph option family: {}",
                    family
                )))
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!("dinics".parse::<MaxFlowAlg>().unwrap(), MaxFlowAlg::Dinitz);
        assert_eq!("dinits".parse::<MaxFlowAlg>().unwrap(), MaxFlowAlg::Dinitz);
        assert_eq!("DINITZ".parse::<MaxFlowAlg>().unwrap(), MaxFlowAlg::Dinitz);
    }

    #[test]
    fn test_unknown_is_domain_error() {
        assert!("spaghetti".parse::<MaxFlowAlg>().is_err());
        assert!("".parse::<ReachAlg>().is_err());
        let mut opts = GraphOptions::default();
        assert!(opts.set("mst", "boruvka").is_err());
        assert!(opts.set("nonsense", "bfs").is_err());
        assert!(opts.set("mst", "spira-pan").is_ok());
        assert_eq!(opts.mst, MstAlg::SpiraPan);
    }
}
