/*
 * Machine Context Primitive
 *
 * This module provides the non-local control transfer the scheduler needs
 * to move execution between thread stacks: Context::switch saves the
 * caller's callee-saved registers and stack pointer, restores the target
 * context's, and resumes wherever that target last switched away from (or
 * at its seed entry point, the first time it runs).
 *
 * This combines capture and restore into one operation rather than a
 * setjmp/longjmp-style dual return, since Rust's inline-asm model has no
 * direct equivalent of "returns twice"; see DESIGN.md for the rationale.
 * The register-save/restore shape targets x86-64's System V AMD64 calling
 * convention (callee-saved: rbx, rbp, r12-r15, plus rsp).
 */

use std::arch::naked_asm;

/// Callee-saved register file plus the stack pointer. `rip` has no explicit
/// field: the return address `ret` needs lives on the stack itself, either
/// pushed there by the compiler's `call` into `raw_switch` (for a thread
/// that has run before) or placed there by `Context::seeded` (for one that
/// hasn't).
#[repr(C)]
#[derive(Clone, Copy, Default)]
struct Registers {
    rsp: u64,
    rbx: u64,
    rbp: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

/// A saved machine context: enough CPU state to resume a thread later.
///
/// `mask` records a per-context signal mask for bookkeeping parity with the
/// saved register file. Because this library multiplexes onto a single OS
/// thread, the blocked-signal set is actually process-wide rather than
/// per-logical-thread: the scheduler always unblocks `SIGVTALRM` itself
/// immediately before switching into any thread, so `mask` here only needs
/// to guarantee that a freshly seeded context is never born with the
/// signal blocked.
pub struct Context {
    regs: Registers,
    mask: libc::sigset_t,
}

impl Context {
    /// A context for the main thread before it has ever been switched
    /// away from. Every field is overwritten the first time the scheduler
    /// switches away from the main thread, since `switch` unconditionally
    /// saves into its `old` argument.
    pub fn blank() -> Self {
        Self {
            regs: Registers::default(),
            mask: empty_sigset(),
        }
    }

    /// Builds a context for a thread that has never run: switching into it
    /// for the first time begins execution at `entry` with the stack
    /// pointer set up within the region ending at `stack_top`.
    ///
    /// # Safety
    /// `stack_top` must point one-past-the-end of a stack region at least
    /// 16 bytes long that stays live for as long as this context might be
    /// switched into.
    pub unsafe fn seeded(stack_top: *mut u8, entry: extern "C" fn() -> !) -> Self {
        // Round down to 16-byte alignment, then reserve one 16-byte-aligned
        // slot for the "return address" `raw_switch`'s closing `ret` will
        // pop. Per the System V AMD64 ABI, a function entered via `call`
        // sees rsp == 8 (mod 16); entering via `ret` instead adds 8 to
        // whatever rsp held beforehand, so we need that rsp to be 16-byte
        // aligned for the post-`ret` value to land on the same residue a
        // normal `call` would produce.
        let slot = (stack_top as usize & !0xf) - 16;
        unsafe {
            (slot as *mut u64).write(entry as usize as u64);
        }
        Self {
            regs: Registers {
                rsp: slot as u64,
                ..Registers::default()
            },
            mask: empty_sigset(),
        }
    }

    /// Saves the caller's machine state into `old`, then restores `new`
    /// and resumes execution there. Control returns to the statement
    /// following this call only when some later `Context::switch` targets
    /// `old` again.
    ///
    /// # Safety
    /// `new` must be a context previously produced by `seeded` or by a
    /// prior `switch` that saved into it, and its stack region must remain
    /// live and exclusively owned for as long as it might be switched into
    /// again.
    pub unsafe fn switch(old: &mut Context, new: &Context) {
        debug_assert!(
            is_empty_sigset(&new.mask),
            "a context must never be switched into while carrying a blocked-signal mask"
        );
        unsafe { raw_switch(&mut old.regs, &new.regs) }
    }
}

fn empty_sigset() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        set
    }
}

/// True iff `set` blocks no signals. Used only to defensively check the
/// invariant `mask` exists to document; the process-wide mask itself is
/// what actually gates `SIGVTALRM` delivery (see preempt.rs).
fn is_empty_sigset(set: &libc::sigset_t) -> bool {
    (1..32).all(|signum| unsafe { libc::sigismember(set, signum) } == 0)
}

/// Saves `rsp`/`rbx`/`rbp`/`r12`-`r15` into `old`, loads the same registers
/// from `new`, and `ret`s into whatever address sits at the new `rsp` —
/// either a previous caller's return address, or the entry trampoline a
/// seeded context pushed there.
#[unsafe(naked)]
unsafe extern "C" fn raw_switch(old: *mut Registers, new: *const Registers) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbx",
        "mov [rdi + 0x10], rbp",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "mov rsp, [rsi + 0x00]",
        "mov rbx, [rsi + 0x08]",
        "mov rbp, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",
        "ret",
    )
}
