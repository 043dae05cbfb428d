/*
 * Public API Façade
 *
 * Thin wrappers over the scheduler core's operations — `init`, `spawn`,
 * `terminate`, `block`, `resume`, `sleep`, and the three read-only
 * accessors. Each one forwards straight into the scheduler singleton,
 * which takes its own lock (`CriticalSection`'s signal mask rather than a
 * `Mutex`) inside each scheduler-core function, so this module stays a
 * pure re-export with no locking of its own.
 */

mod context;
mod error;
mod preempt;
mod registry;
mod scheduler;
mod stack_pool;
mod tcb;

pub use error::ThreadLibError;
pub use stack_pool::{MAX_THREADS, STACK_SIZE};
pub use tcb::ThreadId;

/// Initializes the thread library: allocates the stack pool, registers the
/// calling OS thread as thread id 0, and arms the `SIGVTALRM` preemption
/// timer with period `quantum_usecs` microseconds.
///
/// Must be called at most once per process, before any other operation in
/// this crate.
pub fn init(quantum_usecs: i64) -> Result<(), ThreadLibError> {
    if quantum_usecs <= 0 {
        let err = ThreadLibError::NonPositiveQuantum;
        error::report(&err);
        return Err(err);
    }
    scheduler::init(quantum_usecs).inspect_err(error::report)
}

/// Spawns a new thread running `entry` and returns its id. The new thread
/// starts READY; it is not guaranteed to run before `spawn` returns.
pub fn spawn(entry: fn()) -> Result<ThreadId, ThreadLibError> {
    scheduler::spawn(entry).inspect_err(error::report)
}

/// Terminates the thread with id `id`. Terminating id 0 ends the process
/// with exit status 0. Terminating the calling thread does not return.
pub fn terminate(id: ThreadId) -> Result<(), ThreadLibError> {
    scheduler::terminate(id).inspect_err(error::report)
}

/// Moves the thread with id `id` to BLOCKED. Blocking the calling thread
/// does not return until some other thread calls `resume` on it.
pub fn block(id: ThreadId) -> Result<(), ThreadLibError> {
    scheduler::block(id).inspect_err(error::report)
}

/// Clears the BLOCKED state of the thread with id `id`, making it READY
/// once it is not also sleeping.
pub fn resume(id: ThreadId) -> Result<(), ThreadLibError> {
    scheduler::resume(id).inspect_err(error::report)
}

/// Blocks the calling thread for at least `num_quantums` quanta, then
/// returns once it is rescheduled. May not be called from thread id 0.
pub fn sleep(num_quantums: u64) -> Result<(), ThreadLibError> {
    scheduler::sleep(num_quantums).inspect_err(error::report)
}

/// Returns the id of the currently running thread.
pub fn get_tid() -> ThreadId {
    scheduler::get_tid()
}

/// Returns the total number of quanta that have elapsed since `init`.
pub fn get_total_quantums() -> u64 {
    scheduler::get_total_quantums()
}

/// Returns the number of quanta the thread with id `id` has run for.
pub fn get_quantums(id: ThreadId) -> Result<u64, ThreadLibError> {
    scheduler::get_quantums(id).inspect_err(error::report)
}
