#[cfg(not(feature = "logging"))]
mod env_logger {
    pub fn init() {}
}

use clap::{App, Arg};
use flate2::bufread::GzDecoder;
use monosat::{lbool, GraphOptions, Solver, SolverOpts};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::exit;

mod system;

fn main() {
    env_logger::init();
    let exitcode = main2().unwrap_or_else(|err| {
        eprintln!("{}", err);
        exit(1)
    });
    exit(exitcode);
}

fn main2() -> Result<i32, String> {
    let matches = App::new("monosat")
        .about("SMT solver for monotonic theories over graphs and bitvectors")
        .arg(Arg::with_name("input").help("input file (may be gzipped)").required(true))
        .arg(
            Arg::with_name("verb")
                .long("verb")
                .takes_value(true)
                .help("verbosity level (0, 1 or 2)"),
        )
        .arg(
            Arg::with_name("witness")
                .short("w")
                .long("witness")
                .help("print the model values of the recorded variables"),
        )
        .arg(
            Arg::with_name("time-limit")
                .long("time-limit")
                .takes_value(true)
                .help("CPU time limit, in seconds"),
        )
        .arg(
            Arg::with_name("mem-limit")
                .long("mem-limit")
                .takes_value(true)
                .help("virtual memory limit, in MiB"),
        )
        .arg(
            Arg::with_name("maxflow-alg")
                .long("maxflow-alg")
                .takes_value(true)
                .help("edmondskarp-adj|edmondskarp|edmondskarp-dynamic|dinitz|dinitz-linkcut|kohli-torr"),
        )
        .arg(
            Arg::with_name("reach-alg")
                .long("reach-alg")
                .takes_value(true)
                .help("dijkstra|bfs|dfs|cnf|ramal-reps|ramal-reps-batch|ramal-reps-batch2"),
        )
        .arg(
            Arg::with_name("dist-alg")
                .long("dist-alg")
                .takes_value(true)
                .help("dijkstra|bfs|cnf|ramal-reps|ramal-reps-batch|ramal-reps-batch2"),
        )
        .arg(
            Arg::with_name("mst-alg")
                .long("mst-alg")
                .takes_value(true)
                .help("kruskal|prim|spira-pan"),
        )
        .arg(
            Arg::with_name("cycle-alg")
                .long("cycle-alg")
                .takes_value(true)
                .help("dfs|pk"),
        )
        .get_matches();

    let verbosity: i32 = matches
        .value_of("verb")
        .map(|s| s.parse().unwrap_or(0))
        .unwrap_or(0);

    let mut graph_opts = GraphOptions::default();
    for (family, arg) in [
        ("maxflow", "maxflow-alg"),
        ("reach", "reach-alg"),
        ("dist", "dist-alg"),
        ("mst", "mst-alg"),
        ("cycle", "cycle-alg"),
    ] {
        if let Some(v) = matches.value_of(arg) {
            graph_opts
                .set(family, v)
                .map_err(|e| format!("{}", e))?;
        }
    }

    let mut solver = Solver::with_opts(SolverOpts::default(), graph_opts);
    if let Some(s) = matches.value_of("time-limit") {
        solver.set_time_limit(s.parse().map_err(|_| "bad time limit")?);
    }
    if let Some(s) = matches.value_of("mem-limit") {
        solver.set_memory_limit(s.parse().map_err(|_| "bad memory limit")?);
    }

    let path = matches.value_of("input").unwrap();
    let measure = system::ResourceMeasure::new();

    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path, e))?;
    let reader = BufReader::new(file);
    let result = if path.ends_with(".gz") {
        let gz: Box<dyn BufRead> = Box::new(BufReader::new(GzDecoder::new(reader)));
        solver.read_transcript(gz)
    } else {
        solver.read_transcript(reader)
    };

    let sat = result.map_err(|e| format!("{}", e))?;

    if verbosity >= 1 {
        solver.print_stats();
        println!("c CPU time              : {:.3} s", measure.cpu_time());
    }

    if sat && solver.has_model() {
        println!("s SATISFIABLE");
        if matches.is_present("witness") {
            let mut line = String::from("v");
            for e in 0..solver.n_vars() {
                let l = solver
                    .internal_lit(monosat::Lit::new(monosat::Var::from_idx(e as u32), true))
                    .map_err(|e| format!("{}", e))?;
                let val = solver.model_lit(l).map_err(|e| format!("{}", e))?;
                if val == lbool::TRUE {
                    line.push_str(&format!(" {}", e + 1));
                } else if val == lbool::FALSE {
                    line.push_str(&format!(" -{}", e + 1));
                }
            }
            line.push_str(" 0");
            println!("{}", line);
        }
        Ok(10)
    } else if !sat && !solver.ok() {
        println!("s UNSATISFIABLE");
        Ok(20)
    } else if !sat {
        // unsat under the recorded assumptions only
        println!("s UNSATISFIABLE");
        Ok(20)
    } else {
        println!("s UNKNOWN");
        Ok(0)
    }
}
