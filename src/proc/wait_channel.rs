//! The opaque rendezvous token sleepers and wakers compare by address.
//!
//! Grounded on xv6's `WaitChannel` (`src/proc.rs`): "a
//! channel is any address used as a unique token" (spec.md §9), so the same
//! primitive serves `wait` (a parent's slot address), the tick clock, and
//! both swap queues' sentinels. The actual scan-and-transition logic lives
//! on `Procs`, since only the process table knows how to find sleepers —
//! `WaitChannel` itself carries no behavior, matching its role as a token.

/// Deliberately non-zero-sized: two distinct `WaitChannel`s must never share
/// an address, or unrelated sleepers would spuriously wake each other.
pub struct WaitChannel {
    _padding: u8,
}

impl WaitChannel {
    pub const fn new() -> Self {
        Self { _padding: 0 }
    }

    /// The token callers compare against `ProcInfo::chan`.
    pub fn token(&self) -> *const WaitChannel {
        self as *const WaitChannel
    }
}

impl Default for WaitChannel {
    fn default() -> Self {
        Self::new()
    }
}
