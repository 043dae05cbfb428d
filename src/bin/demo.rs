/*
 * Demonstration Driver
 *
 * A small CLI program exercising spawn/sleep/terminate against the public
 * API only — no scheduler-internal knowledge. Parses a handful of knobs,
 * drives the library, and prints what happened, as a one-shot batch run
 * rather than an interactive shell, since this library has no filesystem
 * or syscall surface of its own to shell into.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Runs a handful of worker threads under uthreads' round-robin preemptive scheduler")]
struct Cli {
    /// Length of one scheduling quantum, in microseconds.
    #[arg(long, default_value_t = 100_000)]
    quantum_usecs: i64,

    /// Number of worker threads to spawn.
    #[arg(long, default_value_t = 3)]
    worker_count: usize,

    /// Log level passed through to env_logger (error, warn, info, debug, trace).
    #[arg(long, default_value = "info")]
    log_level: String,
}

static WORKERS_DONE: AtomicUsize = AtomicUsize::new(0);
static WORKER_COUNT: AtomicUsize = AtomicUsize::new(0);

fn worker() {
    let id = uthreads::get_tid();
    println!(
        "[worker {id}] running, quantums_run={}",
        uthreads::get_quantums(id).unwrap_or_default()
    );

    if let Err(err) = uthreads::sleep(2) {
        log::warn!("worker {id} failed to sleep: {err}");
    }

    println!(
        "[worker {id}] woke up, quantums_run={}",
        uthreads::get_quantums(id).unwrap_or_default()
    );

    WORKERS_DONE.fetch_add(1, Ordering::SeqCst);
    let _ = uthreads::terminate(id);
}

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();

    if let Err(err) = uthreads::init(cli.quantum_usecs) {
        eprintln!("failed to initialize uthreads: {err}");
        std::process::exit(1);
    }

    WORKER_COUNT.store(cli.worker_count, Ordering::SeqCst);
    for _ in 0..cli.worker_count {
        if let Err(err) = uthreads::spawn(worker) {
            eprintln!("failed to spawn worker: {err}");
            std::process::exit(1);
        }
    }

    while WORKERS_DONE.load(Ordering::SeqCst) < WORKER_COUNT.load(Ordering::SeqCst) {
        std::hint::spin_loop();
    }

    println!(
        "[main] all {} workers finished after {} quanta",
        cli.worker_count,
        uthreads::get_total_quantums()
    );

    let _ = uthreads::terminate(uthreads::ThreadId(0));
}
