/*
 * Preemption Driver
 *
 * Installs the SIGVTALRM handler and arms the ITIMER_VIRTUAL interval timer
 * that drives quantum preemption, and provides the CriticalSection RAII
 * guard every public API entry point uses to mask SIGVTALRM for the
 * duration of a mutation.
 *
 * The RAII-guard shape follows the kernel's own
 * `x86_64::instructions::interrupts::without_interrupts(|| { .. })`
 * discipline, adapted from a closure-taking helper to a guard type because
 * a Unix signal handler is installed once up front rather than invoked
 * inline the way a kernel's "disable interrupts" instruction is.
 */

use std::mem::MaybeUninit;

use crate::error;
use crate::scheduler;

/// Blocks SIGVTALRM on construction and unblocks it on drop. Every public
/// API function wraps its body in one of these; the scheduler's dispatch
/// routine also uses it internally. Because this library multiplexes onto
/// a single OS thread, masking a signal is a complete mutual-exclusion
/// primitive for the process-wide scheduler state — no `Mutex` is needed
/// or used.
pub(crate) struct CriticalSection {
    previous: libc::sigset_t,
}

impl CriticalSection {
    pub fn enter() -> Self {
        unsafe {
            let mut block_set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut block_set);
            libc::sigaddset(&mut block_set, libc::SIGVTALRM);

            let mut previous: libc::sigset_t = std::mem::zeroed();
            libc::sigprocmask(libc::SIG_BLOCK, &block_set, &mut previous);
            Self { previous }
        }
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        unsafe {
            libc::sigprocmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut());
        }
    }
}

/// Unblocks SIGVTALRM unconditionally. Used by the scheduler immediately
/// before switching into a thread: the restored thread must never resume
/// with the preemption signal still blocked.
pub(crate) fn unblock_preemption() {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGVTALRM);
        libc::sigprocmask(libc::SIG_UNBLOCK, &set, std::ptr::null_mut());
    }
}

/// Installs the SIGVTALRM handler and arms ITIMER_VIRTUAL with period
/// `quantum_usecs`. Both the interval and the initial expiry equal
/// `quantum_usecs`.
///
/// # Safety
/// Must only be called once, from `init`, before any thread is spawned.
pub(crate) unsafe fn install(quantum_usecs: i64) {
    unsafe {
        let mut action: libc::sigaction = MaybeUninit::zeroed().assume_init();
        action.sa_sigaction = signal_trampoline as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;

        if libc::sigaction(libc::SIGVTALRM, &action, std::ptr::null_mut()) < 0 {
            error::fatal("sigaction", &std::io::Error::last_os_error());
        }

        let interval = libc::timeval {
            tv_sec: quantum_usecs / 1_000_000,
            tv_usec: quantum_usecs % 1_000_000,
        };
        let timer = libc::itimerval {
            it_interval: interval,
            it_value: interval,
        };

        if libc::setitimer(libc::ITIMER_VIRTUAL, &timer, std::ptr::null_mut()) < 0 {
            error::fatal("setitimer", &std::io::Error::last_os_error());
        }
    }
}

/// The actual signal handler registered with the kernel. SIGVTALRM is
/// already blocked for the duration of handler execution (the default
/// behavior of `sigaction` for the signal being handled), so this simply
/// forwards to the scheduler's dispatch entry point.
extern "C" fn signal_trampoline(_signum: libc::c_int) {
    scheduler::on_preemption_tick();
}
