/*
 * Thread Library Error Types
 *
 * This module defines the typed error hierarchy for the thread library.
 * Every recoverable failure (bad id, capacity exhaustion, misuse of the
 * main thread) is represented here and surfaced to callers as `Err`; the
 * "-1 with a diagnostic on stderr" contract a C-ABI-flavored API would
 * expose is implemented by logging at `error!` wherever one of these is
 * constructed and letting `Display` produce the "thread library error:
 * ..." text.
 */

use std::fmt;

/// Recoverable errors returned by the public API.
///
/// Every variant corresponds to an input or capacity failure a caller can
/// meaningfully react to. Environment errors (signal install, timer arm,
/// allocation failure) and scheduler starvation are *not* represented
/// here: those are unrecoverable and are reported by logging and calling
/// `std::process::exit` directly, never by returning a value.
#[derive(Debug, thiserror::Error)]
pub enum ThreadLibError {
    #[error("invalid thread id {0}")]
    InvalidId(i32),

    #[error("entry_point is null")]
    NullEntryPoint,

    #[error("quantum_usecs must be positive")]
    NonPositiveQuantum,

    #[error("num_quantums must be positive")]
    NonPositiveSleep,

    #[error("cannot block, resume, or sleep the main thread")]
    MainThreadBlocked,

    #[error("too many threads")]
    Capacity,

    #[error("the thread library has already been initialized")]
    AlreadyInitialized,

    #[error("the thread library has not been initialized")]
    NotInitialized,
}

impl ThreadLibError {
    /// The stderr-visible diagnostic line every recoverable error reports:
    /// prefixed `thread library error:`.
    pub fn diagnostic(&self) -> String {
        format!("thread library error: {self}")
    }
}

/// Writes the diagnostic line to stderr and logs it at `error!`. Called by
/// every public API function on the error path so a caller always sees a
/// human-readable line on the standard error stream alongside the typed
/// `Err` it gets back, regardless of which entry point failed.
pub(crate) fn report(err: &ThreadLibError) {
    log::error!("{err}");
    eprintln!("{}", err.diagnostic());
}

/// Reports an unrecoverable environment failure (a signal/timer syscall
/// that failed, or allocation failure at init) and terminates the process
/// with a non-zero status. Never returns.
pub(crate) fn fatal(context: &str, detail: &dyn fmt::Display) -> ! {
    log::error!("system error: {context}: {detail}");
    eprintln!("system error: {context}: {detail}");
    std::process::exit(1);
}

/// Reports scheduler starvation (empty ready queue at dispatch) and
/// terminates the process. Distinguished from `fatal` only by its
/// diagnostic text, since starvation is a thread-library-logic condition
/// rather than an OS-call failure.
pub(crate) fn fatal_starvation() -> ! {
    let msg = "no threads to schedule";
    log::error!("thread library error: {msg}");
    eprintln!("thread library error: {msg}");
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_is_prefixed_per_the_stderr_contract() {
        let err = ThreadLibError::InvalidId(42);
        assert_eq!(err.diagnostic(), "thread library error: invalid thread id 42");
    }

    #[test]
    fn capacity_error_displays_without_payload() {
        assert_eq!(ThreadLibError::Capacity.to_string(), "too many threads");
    }
}
