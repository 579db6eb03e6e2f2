//! A spinlock with a built-in `sleep`, for the places spec.md §4.2 requires
//! the table lock to stay held across the SLEEPING transition so no wakeup
//! is ever missed between checking a condition and parking.
//!
//! Grounded on xv6's `SleepableLock`
//! (`src/lock/sleepablelock.rs`), generalized over `Sleeper` for the same
//! reason as `Sleeplock`.

use crate::cpu::Cpus;
use crate::hal::Hal;

use super::spinlock::RawSpinLock;
use super::{Lock, RawLock, Sleeper, Waitable};

pub struct RawSleepableLock<'a, H: Hal> {
    inner: RawSpinLock<'a, H>,
}

impl<'a, H: Hal> RawSleepableLock<'a, H> {
    pub const fn new(cpus: &'a Cpus) -> Self {
        Self {
            inner: RawSpinLock::new(cpus),
        }
    }
}

impl<'a, H: Hal> RawLock for RawSleepableLock<'a, H> {
    fn acquire(&self) {
        self.inner.acquire();
    }

    fn release(&self) {
        self.inner.release();
    }

    fn holding(&self) -> bool {
        self.inner.holding()
    }
}

pub type SleepableLock<'a, H, T> = Lock<RawSleepableLock<'a, H>, T>;
pub type SleepableLockGuard<'a, 's, H, T> = super::Guard<'s, RawSleepableLock<'a, H>, T>;

/// Sleeps on `chan` while holding `guard`, releasing the lock and parking
/// atomically with respect to any `wake(chan)` racing in from another CPU —
/// the `Waitable::raw_release`/`raw_acquire` pair exists exactly so this
/// function never has to know which lock flavor `guard` wraps.
pub fn sleep_on<S: Sleeper, W: Waitable>(sleeper: &S, chan: usize, guard: &mut W) {
    sleeper.sleep(chan, guard);
}
