/*
 * Scheduler Core
 *
 * Holds the process-wide scheduling state (ready queue, blocked set,
 * quantum counter, TCB registry, stack pool) and implements the dispatch
 * algorithm that the preemption signal and the voluntary-yield public API
 * operations both drive.
 *
 * This is a single concrete struct rather than a pluggable policy/
 * mechanism split: there is only one scheduling policy (FIFO round-robin)
 * to support, so a `Scheduler`/`KernelSchedCtx`-style trait indirection
 * for swapping algorithms would be unused generality here.
 *
 * State is kept in a `thread_local!` `RefCell` rather than a `Mutex`: this
 * library multiplexes every logical thread onto a single OS thread, and
 * the preemption signal that would otherwise race a lock handler runs on
 * that same OS thread, so `CriticalSection`'s signal-masking is already a
 * complete mutual-exclusion primitive (see preempt.rs). A `thread_local!`
 * is what lets the signal handler — which interrupts this exact thread —
 * reach the same state without requiring `unsafe impl Sync`.
 */

use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};

use crate::context::Context;
use crate::error::{self, ThreadLibError};
use crate::preempt::{self, CriticalSection};
use crate::registry::Registry;
use crate::stack_pool::StackPool;
use crate::tcb::{Tcb, ThreadId, ThreadState};

struct SchedulerState {
    registry: Registry,
    stack_pool: StackPool,
    ready_queue: VecDeque<ThreadId>,
    blocked_set: HashSet<ThreadId>,
    current_tid: ThreadId,
    total_quantums: u64,
}

thread_local! {
    static STATE: RefCell<Option<SchedulerState>> = const { RefCell::new(None) };
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    STATE.with(|cell| {
        let mut borrow = cell.borrow_mut();
        let state = borrow
            .as_mut()
            .expect("scheduler state accessed before init() or after terminate(0)");
        f(state)
    })
}

fn is_initialized() -> bool {
    STATE.with(|cell| cell.borrow().is_some())
}

fn require_initialized() -> Result<(), ThreadLibError> {
    if is_initialized() {
        Ok(())
    } else {
        Err(ThreadLibError::NotInitialized)
    }
}

/// Defensive consistency check between TCB state and the ready-queue/
/// blocked-set bookkeeping. Compiled only in debug builds.
fn debug_check_invariants(state: &SchedulerState) {
    let running = state
        .registry
        .ids()
        .filter(|&id| state.registry.get(id).is_some_and(|tcb| tcb.state == ThreadState::Running))
        .count();
    debug_assert_eq!(running, 1, "exactly one thread must be RUNNING");

    for &id in &state.ready_queue {
        debug_assert_eq!(
            state.registry.get(id).map(|tcb| tcb.state),
            Some(ThreadState::Ready),
            "thread {id} is in the ready queue but not READY"
        );
    }

    for &id in &state.blocked_set {
        debug_assert_eq!(
            state.registry.get(id).map(|tcb| tcb.state),
            Some(ThreadState::Blocked),
            "thread {id} is in the blocked set but not BLOCKED"
        );
    }
}

/// Initializes the scheduler: allocates the stack pool, registers the main
/// thread, and arms the preemption timer.
pub fn init(quantum_usecs: i64) -> Result<(), ThreadLibError> {
    if is_initialized() {
        return Err(ThreadLibError::AlreadyInitialized);
    }

    STATE.with(|cell| {
        let mut registry = Registry::new();
        registry.insert(Tcb::main());
        *cell.borrow_mut() = Some(SchedulerState {
            registry,
            stack_pool: StackPool::new(),
            ready_queue: VecDeque::new(),
            blocked_set: HashSet::new(),
            current_tid: ThreadId(0),
            total_quantums: 1,
        });
    });

    // Safety: init() runs exactly once, before any thread is spawned and
    // before the timer that could race this setup exists.
    unsafe {
        preempt::install(quantum_usecs);
    }

    log::info!("uthreads initialized with quantum_usecs={quantum_usecs}");
    Ok(())
}

/// Creates a new thread whose entry point is `entry`.
pub fn spawn(entry: fn()) -> Result<ThreadId, ThreadLibError> {
    require_initialized()?;
    let _cs = CriticalSection::enter();
    with_state(|state| {
        let id = state.registry.smallest_free_id()?;
        let slot = state.stack_pool.acquire()?;
        let stack_top = state.stack_pool.stack_top(slot);

        // Safety: `stack_top` points one-past-the-end of the slot just
        // reserved above, which stays allocated for as long as this TCB
        // holds onto `slot`.
        let context = unsafe { Context::seeded(stack_top, entry_trampoline) };

        state.registry.insert(Tcb::spawned(id, slot, context, entry));
        state.ready_queue.push_back(id);
        log::info!("spawned thread {id}");
        debug_check_invariants(state);
        Ok(id)
    })
}

/// Terminates the thread with id `id`.
pub fn terminate(id: ThreadId) -> Result<(), ThreadLibError> {
    require_initialized()?;
    let _cs = CriticalSection::enter();

    if id.0 == 0 {
        log::info!("main thread terminated, exiting process");
        std::process::exit(0);
    }

    let is_self = with_state(|state| {
        if !state.registry.contains(id) {
            return None;
        }
        Some(id == state.current_tid)
    });

    let is_self = match is_self {
        Some(v) => v,
        None => return Err(ThreadLibError::InvalidId(id.0 as i32)),
    };

    if !is_self {
        with_state(|state| {
            state.ready_queue.retain(|&t| t != id);
            state.blocked_set.remove(&id);
            if let Some(tcb) = state.registry.remove(id) {
                if let Some(slot) = tcb.stack_slot {
                    state.stack_pool.release(slot);
                }
            }
            debug_check_invariants(state);
        });
        log::info!("terminated thread {id}");
        return Ok(());
    }

    terminate_self();
}

/// Terminates the currently running thread. Picks the next ready thread,
/// switches into it, and only then frees the outgoing TCB's stack slot —
/// the TCB itself is removed from the registry (and thus no longer owned
/// by anyone but this local binding) before the switch, so nothing reads
/// freed memory mid-switch. Never returns.
fn terminate_self() -> ! {
    let outgoing_id = with_state(|state| state.current_tid);

    let next_id = with_state(|state| {
        state.total_quantums += 1;
        wake_scan(state);
        if state.ready_queue.is_empty() {
            None
        } else {
            state.ready_queue.pop_front()
        }
    });

    let Some(next_id) = next_id else {
        log::info!("last thread terminated, exiting process");
        std::process::exit(0);
    };

    let mut outgoing = with_state(|state| {
        state.registry.remove(outgoing_id).expect("self must exist")
    });

    with_state(|state| {
        let next = state.registry.get_mut(next_id).expect("next thread must exist");
        next.state = ThreadState::Running;
        next.quantums_run += 1;
        state.current_tid = next_id;
        debug_check_invariants(state);
    });

    if let Some(slot) = outgoing.stack_slot {
        with_state(|state| state.stack_pool.release(slot));
    }

    log::info!("thread {outgoing_id} terminated itself");

    preempt::unblock_preemption();
    let next_ctx_ptr: *const Context = with_state(|state| {
        &state.registry.get(next_id).expect("next thread must exist").context as *const Context
    });
    // Safety: `next_id`'s Tcb (and thus its Context) lives in the registry
    // for as long as the thread exists, which outlives this switch.
    unsafe {
        Context::switch(&mut outgoing.context, &*next_ctx_ptr);
    }
    unreachable!("a terminated thread's context is never switched back into");
}

/// Blocks the thread with id `id`.
pub fn block(id: ThreadId) -> Result<(), ThreadLibError> {
    require_initialized()?;
    let _cs = CriticalSection::enter();

    if id.0 == 0 {
        return Err(ThreadLibError::MainThreadBlocked);
    }

    let outcome = with_state(|state| {
        let Some(tcb) = state.registry.get_mut(id) else {
            return Err(ThreadLibError::InvalidId(id.0 as i32));
        };
        tcb.explicitly_blocked = true;

        if tcb.state == ThreadState::Blocked {
            return Ok(false);
        }

        if tcb.state == ThreadState::Ready {
            state.ready_queue.retain(|&t| t != id);
        }
        tcb.state = ThreadState::Blocked;
        state.blocked_set.insert(id);

        let is_self = id == state.current_tid;
        if !is_self {
            debug_check_invariants(state);
        }
        Ok(is_self)
    });

    let blocking_self = outcome?;
    log::info!("blocked thread {id}");

    if blocking_self {
        dispatch();
    }
    Ok(())
}

/// Resumes the thread with id `id`.
pub fn resume(id: ThreadId) -> Result<(), ThreadLibError> {
    require_initialized()?;
    let _cs = CriticalSection::enter();

    with_state(|state| {
        let Some(tcb) = state.registry.get_mut(id) else {
            return Err(ThreadLibError::InvalidId(id.0 as i32));
        };

        if tcb.state == ThreadState::Ready || tcb.state == ThreadState::Running {
            // Resume on a RUNNING/READY thread is a pure no-op and never
            // reschedules, even for the running thread itself.
            return Ok(());
        }

        tcb.explicitly_blocked = false;
        if !tcb.is_sleeping() {
            tcb.state = ThreadState::Ready;
            state.ready_queue.push_back(id);
            state.blocked_set.remove(&id);
        }
        // Still sleeping: stays BLOCKED; the wake scan will promote it to
        // READY once wake_at elapses, because explicitly_blocked is now
        // cleared.
        debug_check_invariants(state);
        Ok(())
    })?;

    log::info!("resumed thread {id}");
    Ok(())
}

/// Puts the running thread to sleep for `num_quantums` quanta.
pub fn sleep(num_quantums: u64) -> Result<(), ThreadLibError> {
    require_initialized()?;
    let _cs = CriticalSection::enter();

    if num_quantums == 0 {
        return Err(ThreadLibError::NonPositiveSleep);
    }

    let current = with_state(|state| state.current_tid);
    if current.0 == 0 {
        return Err(ThreadLibError::MainThreadBlocked);
    }

    with_state(|state| {
        let wake_at = state.total_quantums + num_quantums + 1;
        let tcb = state
            .registry
            .get_mut(current)
            .expect("current thread must exist");
        tcb.state = ThreadState::Blocked;
        tcb.wake_at = Some(wake_at);
        state.blocked_set.insert(current);
        // The current thread is now BLOCKED, not RUNNING: the one-RUNNING
        // invariant is intentionally broken here until dispatch() below
        // picks a successor, so no debug_check_invariants call belongs here.
    });

    log::debug!("thread {current} sleeping for {num_quantums} quanta");
    dispatch();
    Ok(())
}

pub fn get_tid() -> ThreadId {
    let _cs = CriticalSection::enter();
    with_state(|state| state.current_tid)
}

pub fn get_total_quantums() -> u64 {
    let _cs = CriticalSection::enter();
    with_state(|state| state.total_quantums)
}

pub fn get_quantums(id: ThreadId) -> Result<u64, ThreadLibError> {
    require_initialized()?;
    let _cs = CriticalSection::enter();
    with_state(|state| {
        state
            .registry
            .get(id)
            .map(|tcb| tcb.quantums_run)
            .ok_or(ThreadLibError::InvalidId(id.0 as i32))
    })
}

/// Called by the signal trampoline on every SIGVTALRM delivery. SIGVTALRM
/// is already blocked for the duration of signal handler execution (the
/// default POSIX behavior for the signal being handled), so this does not
/// need its own `CriticalSection`.
pub(crate) fn on_preemption_tick() {
    if is_initialized() {
        dispatch();
    }
}

/// The scheduler entry point. Precondition: SIGVTALRM is currently
/// blocked, either by an enclosing `CriticalSection` or by the signal
/// handler's own implicit mask. Performs one full dispatch cycle and, if
/// the outgoing thread is ever switched back into, returns to the caller
/// at that point.
fn dispatch() {
    let outgoing_id = with_state(|state| state.current_tid);

    let next_id = with_state(|state| {
        state.total_quantums += 1;
        wake_scan(state);

        if let Some(outgoing) = state.registry.get_mut(outgoing_id) {
            if outgoing.state == ThreadState::Running {
                outgoing.state = ThreadState::Ready;
                state.ready_queue.push_back(outgoing_id);
            }
        }

        state.ready_queue.pop_front()
    });

    let Some(next_id) = next_id else {
        error::fatal_starvation();
    };

    if next_id == outgoing_id {
        // Only one runnable thread: dispatch "switches" to itself. Still
        // counts as a quantum and still updates bookkeeping, but there is
        // nothing to context-switch into.
        with_state(|state| {
            let tcb = state.registry.get_mut(next_id).expect("must exist");
            tcb.state = ThreadState::Running;
            tcb.quantums_run += 1;
            debug_check_invariants(state);
        });
        preempt::unblock_preemption();
        return;
    }

    with_state(|state| {
        let tcb = state.registry.get_mut(next_id).expect("next thread must exist");
        tcb.state = ThreadState::Running;
        tcb.quantums_run += 1;
        state.current_tid = next_id;
        debug_check_invariants(state);
    });

    log::debug!("dispatch: {outgoing_id} -> {next_id}");

    preempt::unblock_preemption();

    let outgoing_ctx: *mut Context = with_state(|state| {
        &mut state
            .registry
            .get_mut(outgoing_id)
            .expect("outgoing thread must exist")
            .context as *mut Context
    });
    let next_ctx: *const Context = with_state(|state| {
        &state.registry.get(next_id).expect("next thread must exist").context as *const Context
    });

    // Safety: both TCBs remain in the registry for the duration of the
    // switch (neither is removed except on the self-terminate path, which
    // never reaches here), so these raw pointers stay valid across the
    // call despite `with_state`'s borrow ending before it.
    unsafe {
        Context::switch(&mut *outgoing_ctx, &*next_ctx);
    }
}

/// Promotes sleeping threads whose wake time has arrived back to READY,
/// unless they were also explicitly blocked.
fn wake_scan(state: &mut SchedulerState) {
    let total = state.total_quantums;
    let woken: Vec<ThreadId> = state
        .blocked_set
        .iter()
        .copied()
        .filter(|id| {
            state
                .registry
                .get(*id)
                .and_then(|tcb| tcb.wake_at)
                .is_some_and(|wake_at| wake_at <= total)
        })
        .collect();

    for id in woken {
        let tcb = state.registry.get_mut(id).expect("must exist");
        tcb.wake_at = None;
        if !tcb.explicitly_blocked {
            tcb.state = ThreadState::Ready;
            state.ready_queue.push_back(id);
            state.blocked_set.remove(&id);
        }
    }
}

/// Entry trampoline seeded into every spawned thread's context. Runs the
/// user's entry function once, then auto-terminates if it returns, per
/// the trampoline's own "falling off the end" rule.
extern "C" fn entry_trampoline() -> ! {
    let id = get_tid();
    let entry = with_state(|state| {
        state
            .registry
            .get(id)
            .and_then(|tcb| tcb.entry)
            .expect("trampoline must find its own entry point")
    });

    entry();

    let _ = terminate(id);
    unreachable!("terminate(self) never returns");
}
