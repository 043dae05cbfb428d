/*
 * Thread Control Block
 *
 * This module defines the Tcb structure and related types that the
 * scheduler core manages. It mirrors a kernel's Thread/ThreadId/ThreadState
 * trio, trimmed of the process/fd-table fields a single-address-space
 * user-space library has no use for, and extended with the sleep/
 * explicit-block bookkeeping this library needs.
 */

use crate::context::Context;

/// Thread identifier. Id 0 is always the main thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Thread lifecycle state.
///
/// There is no `Terminated` variant: a terminated thread is removed from
/// the registry outright rather than lingering in a zombie state, since
/// this library has no parent/child relationship for a caller to reap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
}

/// Thread Control Block.
///
/// Owns the thread's saved machine context and stack-pool slot, and tracks
/// the bookkeeping the scheduler's dispatch algorithm needs: how many
/// quanta this thread has run, whether it is sleeping, and whether a sleep
/// expiry should actually wake it (`explicitly_blocked`).
pub struct Tcb {
    pub id: ThreadId,
    pub name: String,
    pub state: ThreadState,
    pub quantums_run: u64,

    /// Saved machine context. For the main thread this is never actually
    /// restored from (the host stack is reused as-is); for spawned threads
    /// it is the seeded or last-saved register state.
    pub context: Context,

    /// Index into the stack pool, or `None` for the main thread.
    pub stack_slot: Option<usize>,

    /// Quantum number at which a sleeping thread must be woken, or `None`
    /// if this thread is not sleeping.
    pub wake_at: Option<u64>,

    /// True iff this thread was placed into `Blocked` via the explicit
    /// `block` primitive, as opposed to sleeping alone. Sleep expiry does
    /// not wake an explicitly-blocked thread.
    pub explicitly_blocked: bool,

    /// The user-supplied entry point, read exactly once by the entry
    /// trampoline the first time this thread is dispatched. `None` for
    /// the main thread, which has no trampoline of its own.
    pub entry: Option<fn()>,
}

impl Tcb {
    /// Builds the TCB for the main thread (id 0). It starts RUNNING with
    /// `quantums_run == 1`, reflecting the synthetic first quantum already
    /// credited to it immediately after `init`.
    pub fn main() -> Self {
        Self {
            id: ThreadId(0),
            name: "main".to_string(),
            state: ThreadState::Running,
            quantums_run: 1,
            context: Context::blank(),
            stack_slot: None,
            wake_at: None,
            explicitly_blocked: false,
            entry: None,
        }
    }

    /// Builds the TCB for a freshly spawned thread. Starts READY with
    /// `quantums_run == 0`; the scheduler increments it to 1 on first
    /// dispatch.
    pub fn spawned(id: ThreadId, stack_slot: usize, context: Context, entry: fn()) -> Self {
        Self {
            id,
            name: format!("thread-{}", id.0),
            state: ThreadState::Ready,
            quantums_run: 0,
            context,
            stack_slot: Some(stack_slot),
            wake_at: None,
            explicitly_blocked: false,
            entry: Some(entry),
        }
    }

    pub fn is_sleeping(&self) -> bool {
        self.wake_at.is_some()
    }
}

impl std::fmt::Debug for Tcb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tcb")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("quantums_run", &self.quantums_run)
            .field("wake_at", &self.wake_at)
            .field("explicitly_blocked", &self.explicitly_blocked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_thread_starts_running() {
        let tcb = Tcb::main();
        assert_eq!(tcb.id, ThreadId(0));
        assert_eq!(tcb.state, ThreadState::Running);
        assert_eq!(tcb.quantums_run, 1);
        assert!(!tcb.is_sleeping());
    }

    #[test]
    fn spawned_thread_starts_ready_with_zero_quantums() {
        let tcb = Tcb::spawned(ThreadId(1), 0, Context::blank(), || {});
        assert_eq!(tcb.state, ThreadState::Ready);
        assert_eq!(tcb.quantums_run, 0);
        assert!(tcb.entry.is_some());
    }

    #[test]
    fn sleeping_tracks_wake_at() {
        let mut tcb = Tcb::spawned(ThreadId(1), 0, Context::blank(), || {});
        assert!(!tcb.is_sleeping());
        tcb.wake_at = Some(5);
        assert!(tcb.is_sleeping());
    }

    #[test]
    fn thread_id_displays_as_its_number() {
        assert_eq!(ThreadId(7).to_string(), "7");
    }
}
