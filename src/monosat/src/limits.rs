//! Process-wide resource guard.
//!
//! Time and memory limits are shared among every live solver, as is the
//! `SIGXCPU` hook that interrupts them. Limits are applied on solve entry
//! and restored on every exit path; enable/disable calls nest, and the
//! previously installed limits and signal handler are saved on the outermost
//! enable and restored on the outermost disable. A limit that is negative or
//! at least `i32::MAX` means "no limit".
//!
//! The signal handler itself only sets an atomic flag: each solver's stop
//! callback polls it between conflicts, which interrupts every live solver
//! at its next safe point.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Set by the SIGXCPU handler; polled by every live solver.
static SIGNAL_FIRED: AtomicBool = AtomicBool::new(false);

struct GuardState {
    time_limit_s: i64,
    memory_limit_mb: i64,
    depth: usize,
    saved_cpu: Option<libc::rlim_t>,
    saved_as: Option<libc::rlim_t>,
    saved_handler: Option<libc::sighandler_t>,
    solvers: Vec<(u64, Arc<AtomicBool>)>,
    next_token: u64,
}

fn guard() -> &'static Mutex<GuardState> {
    static GUARD: OnceLock<Mutex<GuardState>> = OnceLock::new();
    GUARD.get_or_init(|| {
        Mutex::new(GuardState {
            time_limit_s: -1,
            memory_limit_mb: -1,
            depth: 0,
            saved_cpu: None,
            saved_as: None,
            saved_handler: None,
            solvers: vec![],
            next_token: 0,
        })
    })
}

extern "C" fn sigxcpu_handler(_signum: libc::c_int) {
    // async-signal-safe: only flip the flag; solvers poll it
    SIGNAL_FIRED.store(true, Ordering::Relaxed);
}

fn no_limit(v: i64) -> bool {
    v < 0 || v >= i32::MAX as i64
}

/// Set the CPU-time limit, in seconds, shared by all solvers.
pub fn set_time_limit(seconds: i32) {
    guard().lock().unwrap().time_limit_s = seconds as i64;
}

/// Set the virtual-memory limit, in MiB, shared by all solvers.
pub fn set_memory_limit(mb: i32) {
    guard().lock().unwrap().memory_limit_mb = mb as i64;
}

/// Has the signal hook fired since the last enable?
pub fn interrupt_fired() -> bool {
    SIGNAL_FIRED.load(Ordering::Relaxed)
}

/// Register a live solver's interrupt flag; returns a token for
/// `unregister_solver`.
pub fn register_solver(flag: Arc<AtomicBool>) -> u64 {
    let mut g = guard().lock().unwrap();
    let token = g.next_token;
    g.next_token += 1;
    g.solvers.push((token, flag));
    token
}

pub fn unregister_solver(token: u64) {
    let mut g = guard().lock().unwrap();
    g.solvers.retain(|&(t, _)| t != token);
}

/// Interrupt every live solver.
pub fn interrupt_all_solvers() {
    let g = guard().lock().unwrap();
    for (_, flag) in g.solvers.iter() {
        flag.store(true, Ordering::Relaxed);
    }
}

fn current_cpu_seconds() -> i64 {
    unsafe {
        let mut ru: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut ru) == 0 {
            ru.ru_utime.tv_sec as i64
        } else {
            0
        }
    }
}

/// Apply the configured limits and install the signal hook. Nested calls
/// only bump the depth; the outermost call saves the previous state.
pub fn enable_resource_limits() {
    let mut g = guard().lock().unwrap();
    g.depth += 1;
    if g.depth > 1 {
        return;
    }
    SIGNAL_FIRED.store(false, Ordering::Relaxed);
    unsafe {
        let mut rl: libc::rlimit = std::mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_CPU, &mut rl) == 0 {
            g.saved_cpu = Some(rl.rlim_cur);
            if !no_limit(g.time_limit_s) {
                // a relative limit: allowance on top of the CPU already used
                let lim = (current_cpu_seconds() + g.time_limit_s) as libc::rlim_t;
                if rl.rlim_max == libc::RLIM_INFINITY || lim < rl.rlim_max {
                    rl.rlim_cur = lim;
                    libc::setrlimit(libc::RLIMIT_CPU, &rl);
                }
            }
        }
        let mut rl: libc::rlimit = std::mem::zeroed();
        if libc::getrlimit(libc::RLIMIT_AS, &mut rl) == 0 {
            g.saved_as = Some(rl.rlim_cur);
            if !no_limit(g.memory_limit_mb) {
                let lim = (g.memory_limit_mb as libc::rlim_t) * 1024 * 1024;
                if rl.rlim_max == libc::RLIM_INFINITY || lim < rl.rlim_max {
                    rl.rlim_cur = lim;
                    libc::setrlimit(libc::RLIMIT_AS, &rl);
                }
            }
        }
        let old = libc::signal(libc::SIGXCPU, sigxcpu_handler as libc::sighandler_t);
        if old != libc::SIG_ERR {
            g.saved_handler = Some(old);
        }
    }
}

/// Undo the outermost `enable_resource_limits`.
pub fn disable_resource_limits() {
    let mut g = guard().lock().unwrap();
    if g.depth == 0 {
        return;
    }
    g.depth -= 1;
    if g.depth > 0 {
        return;
    }
    unsafe {
        if let Some(saved) = g.saved_cpu.take() {
            let mut rl: libc::rlimit = std::mem::zeroed();
            if libc::getrlimit(libc::RLIMIT_CPU, &mut rl) == 0 {
                rl.rlim_cur = saved;
                libc::setrlimit(libc::RLIMIT_CPU, &rl);
            }
        }
        if let Some(saved) = g.saved_as.take() {
            let mut rl: libc::rlimit = std::mem::zeroed();
            if libc::getrlimit(libc::RLIMIT_AS, &mut rl) == 0 {
                rl.rlim_cur = saved;
                libc::setrlimit(libc::RLIMIT_AS, &rl);
            }
        }
        if let Some(old) = g.saved_handler.take() {
            libc::signal(libc::SIGXCPU, old);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_register_and_interrupt_all() {
        let f1 = Arc::new(AtomicBool::new(false));
        let f2 = Arc::new(AtomicBool::new(false));
        let t1 = register_solver(f1.clone());
        let t2 = register_solver(f2.clone());
        interrupt_all_solvers();
        assert!(f1.load(Ordering::Relaxed));
        assert!(f2.load(Ordering::Relaxed));
        unregister_solver(t1);
        unregister_solver(t2);
    }

    #[test]
    fn test_nesting_depth() {
        // nested enables must not lose the saved state on inner disables
        enable_resource_limits();
        enable_resource_limits();
        disable_resource_limits();
        {
            let g = guard().lock().unwrap();
            assert_eq!(g.depth, 1);
        }
        disable_resource_limits();
        {
            let g = guard().lock().unwrap();
            assert_eq!(g.depth, 0);
        }
    }
}
