//! Transcript determinism: a recorded run, replayed into a fresh solver,
//! reproduces the original results.

use monosat::{lbool, Solver};

fn record_and_replay(build: impl Fn(&mut Solver) -> Vec<bool>) {
    let dir = std::env::temp_dir();
    let path = dir.join(format!(
        "monosat-replay-{}-{:?}.gnf",
        std::process::id(),
        std::thread::current().id()
    ));
    let path_s = path.to_str().unwrap().to_string();

    let original = {
        let mut s = Solver::new();
        s.set_output_file(&path_s).unwrap();
        build(&mut s)
    };

    let transcript = std::fs::read_to_string(&path_s).unwrap();
    let mut replayed = Solver::new();
    let last = replayed
        .read_transcript(std::io::Cursor::new(transcript.clone()))
        .unwrap();
    assert_eq!(last, *original.last().unwrap(), "replayed final result");

    // replaying the replayed solver's own recording gives the same log
    let path2_s = format!("{}.second", path_s);
    {
        let mut s2 = Solver::new();
        s2.set_output_file(&path2_s).unwrap();
        s2.read_transcript(std::io::Cursor::new(transcript.clone()))
            .unwrap();
    }
    let transcript2 = std::fs::read_to_string(&path2_s).unwrap();
    assert_eq!(transcript, transcript2, "transcripts are deterministic");

    let _ = std::fs::remove_file(&path_s);
    let _ = std::fs::remove_file(&path2_s);
}

#[test]
fn replay_plain_clauses() {
    record_and_replay(|s| {
        let a = monosat::Lit::new(s.new_var(), true);
        let b = monosat::Lit::new(s.new_var(), true);
        s.add_clause(&[a, b]).unwrap();
        s.add_clause(&[!a, b]).unwrap();
        let r1 = s.solve().unwrap();
        s.add_clause(&[!b]).unwrap();
        let r2 = s.solve().unwrap();
        vec![r1, r2]
    });
}

#[test]
fn replay_graph_problem() {
    record_and_replay(|s| {
        let g = s.new_graph().unwrap();
        for _ in 0..3 {
            s.new_node(g).unwrap();
        }
        let a = s.new_edge(g, 0, 1, 2).unwrap();
        let b = s.new_edge(g, 1, 2, 3).unwrap();
        let r = s.reaches(g, 0, 2).unwrap();
        s.add_clause(&[r]).unwrap();
        let r1 = s.solve_assumptions(&[a, b]).unwrap();
        let r2 = s.solve_assumptions(&[!a]).unwrap();
        vec![r1, r2]
    });
}

#[test]
fn replay_bv_problem() {
    record_and_replay(|s| {
        s.init_bv_theory();
        let x = s.new_bv_anon(4).unwrap();
        let y = s.new_bv_const(4, 5).unwrap();
        let lt = s.bv_comparison_bv(monosat::CmpOp::Lt, x, y).unwrap();
        let ge3 = s.bv_comparison_const(monosat::CmpOp::Geq, x, 3).unwrap();
        s.add_clause(&[lt]).unwrap();
        s.add_clause(&[ge3]).unwrap();
        vec![s.solve().unwrap()]
    });
}

#[test]
fn replay_preserves_unsat() {
    record_and_replay(|s| {
        let g = s.new_graph().unwrap();
        for _ in 0..2 {
            s.new_node(g).unwrap();
        }
        let e = s.new_edge(g, 0, 1, 1).unwrap();
        let r = s.reaches(g, 0, 1).unwrap();
        s.add_clause(&[r]).unwrap();
        vec![s.solve_assumptions(&[!e]).unwrap()]
    });
}

#[test]
fn determinism_same_calls_same_results() {
    // two runs over the same call sequence give identical literals and
    // identical models
    let run = || {
        let mut s = Solver::new();
        let g = s.new_graph().unwrap();
        for _ in 0..4 {
            s.new_node(g).unwrap();
        }
        let mut lits = vec![];
        for (u, v) in [(0, 1), (1, 2), (2, 3), (0, 3)] {
            lits.push(s.new_edge(g, u, v, 1).unwrap());
        }
        let r = s.reaches(g, 0, 3).unwrap();
        s.add_clause(&[r]).unwrap();
        assert!(s.solve().unwrap());
        let model: Vec<lbool> = lits.iter().map(|&l| s.model_lit(l).unwrap()).collect();
        (lits, r, model)
    };
    let (l1, r1, m1) = run();
    let (l2, r2, m2) = run();
    assert_eq!(l1, l2);
    assert_eq!(r1, r2);
    assert_eq!(m1, m2);
}
