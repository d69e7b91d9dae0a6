//! Severity-based error reporting.
//!
//! The allocator does not own its reporting channel. Conditions are handed
//! to this module with a [`Severity`], and the module routes them through
//! the [`log`] facade: warnings return control to the caller, fatal reports
//! terminate the process on the spot. Whoever links the final binary picks
//! the logger implementation.

use core::fmt;

/// How bad a reported condition is.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Recoverable. The operation that hit it returns a sentinel value and
    /// the caller is expected to check.
    Warning,
    /// An internal invariant was violated. Not recoverable.
    Fatal,
}

/// Report a condition at the given severity.
///
/// `Severity::Fatal` does not return.
pub fn report(severity: Severity, message: impl fmt::Display) {
    match severity {
        Severity::Warning => warn(message),
        Severity::Fatal => fatal(message),
    }
}

/// Report a recoverable condition and return to the caller.
pub fn warn(message: impl fmt::Display) {
    log::warn!("{}", message);
}

/// Report an invariant violation and terminate the process.
///
/// No unwinding happens; destructors on the stack do not run.
pub fn fatal(message: impl fmt::Display) -> ! {
    log::error!("{}", message);
    unsafe { libc::abort() }
}

#[cfg(test)]
mod tests {
    use super::*;

    use test_log::test;

    #[test]
    fn test_warning_returns() {
        report(Severity::Warning, "this should only be logged");
        warn(format_args!("formatted {} too", "arguments"));
    }
}
