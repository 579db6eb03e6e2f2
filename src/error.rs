//! Kernel error kinds, per spec.md §7.
//!
//! Every fallible operation in this crate returns `Result<T, KernelError>`.
//! Invariant violations (spec.md §7's fourth bullet) are not represented
//! here: they are kernel panics, raised with `assert!`/`panic!` at the
//! point of violation, since by definition they are unrecoverable.

use core::fmt;

/// The non-fatal error kinds a syscall can observe, per spec.md §7.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum KernelError {
    /// No free process slot, no free frame, no free descriptor, or a swap
    /// file could not be created.
    OutOfResource,
    /// A bad pointer, an out-of-range priority, or a negative sleep count.
    InvalidArgument,
    /// The caller was killed while blocked, or observed `killed` on wakeup.
    Killed,
    /// The caller has no children to wait for (`wait`/`waitstats`).
    NoChildren,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            KernelError::OutOfResource => "out of resource",
            KernelError::InvalidArgument => "invalid argument",
            KernelError::Killed => "killed",
            KernelError::NoChildren => "no children",
        };
        f.write_str(msg)
    }
}

/// Every syscall in spec.md §6 returns a kernel error as `-1` to user space
/// (the one exception, `history`'s `1`/`2` error codes, is handled locally
/// in `syscall::sys_history` since it is not a `KernelError`).
impl KernelError {
    pub fn to_retval(self) -> isize {
        -1
    }
}
