//! A spinlock that protects data not co-located with it — the pattern
//! spec.md §3 calls for with the process table's `parent` field, which is
//! guarded by one shared `wait_lock` rather than each process's own lock.
//!
//! Grounded on xv6's `SpinlockProtected`
//! (`src/lock/spinlock_protected.rs`): many `SpinlockProtected<T>` values can
//! refer to one external `RawSpinLock`, which is exactly how every process
//! slot's `parent` back-reference shares one process-system-wide
//! `wait_lock`. `get_mut` (not `Deref`) is the only way at the data, and it
//! accepts a guard obtained from any `SpinlockProtected` that refers to the
//! same raw lock — letting `Procs::reparent`/`wait` walk every slot's
//! `parent` field while holding `wait_lock` exactly once.

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ptr;

use crate::hal::Hal;

use super::spinlock::RawSpinLock;
use super::{RawLock, Waitable};

pub struct SpinlockProtected<'a, H: Hal, T> {
    lock: &'a RawSpinLock<'a, H>,
    data: UnsafeCell<T>,
}

unsafe impl<'a, H: Hal, T: Send> Sync for SpinlockProtected<'a, H, T> {}

pub struct SpinlockProtectedGuard<'s, 'a, H: Hal> {
    lock: &'s RawSpinLock<'a, H>,
    _marker: PhantomData<*const ()>,
}

impl<'a, H: Hal, T> SpinlockProtected<'a, H, T> {
    pub const fn new(lock: &'a RawSpinLock<'a, H>, data: T) -> Self {
        Self {
            lock,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> SpinlockProtectedGuard<'_, 'a, H> {
        self.lock.acquire();
        SpinlockProtectedGuard {
            lock: self.lock,
            _marker: PhantomData,
        }
    }

    pub fn holding(&self) -> bool {
        self.lock.holding()
    }

    /// Returns a mutable reference to the data, given a guard attesting
    /// that *some* `SpinlockProtected` referring to the same raw lock is
    /// held — not necessarily `self`.
    ///
    /// # Panics
    /// If `guard` was obtained from a `SpinlockProtected` referring to a
    /// different raw lock.
    pub fn get_mut<'g>(&self, guard: &'g mut SpinlockProtectedGuard<'_, 'a, H>) -> &'g mut T {
        assert!(ptr::eq(self.lock, guard.lock), "mismatched SpinlockProtected lock");
        unsafe { &mut *self.data.get() }
    }
}

impl<'s, 'a, H: Hal> Waitable for SpinlockProtectedGuard<'s, 'a, H> {
    unsafe fn raw_release(&mut self) {
        self.lock.release();
    }

    unsafe fn raw_acquire(&mut self) {
        self.lock.acquire();
    }
}

impl<'s, 'a, H: Hal> Drop for SpinlockProtectedGuard<'s, 'a, H> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpus;
    use crate::testing::{reset_interrupts, MockHal};

    #[test]
    fn get_mut_reads_back_what_was_written() {
        reset_interrupts();
        let cpus = Cpus::new();
        let raw: RawSpinLock<'_, MockHal> = RawSpinLock::new(&cpus);
        let protected: SpinlockProtected<'_, MockHal, i32> = SpinlockProtected::new(&raw, 0);
        let mut guard = protected.lock();
        *protected.get_mut(&mut guard) = 7;
        assert_eq!(*protected.get_mut(&mut guard), 7);
    }

    #[test]
    fn one_guard_reaches_many_protected_values_sharing_a_lock() {
        reset_interrupts();
        let cpus = Cpus::new();
        let raw: RawSpinLock<'_, MockHal> = RawSpinLock::new(&cpus);
        let a: SpinlockProtected<'_, MockHal, i32> = SpinlockProtected::new(&raw, 1);
        let b: SpinlockProtected<'_, MockHal, i32> = SpinlockProtected::new(&raw, 2);
        let mut guard = a.lock();
        assert_eq!(*a.get_mut(&mut guard), 1);
        assert_eq!(*b.get_mut(&mut guard), 2);
    }

    #[test]
    #[should_panic(expected = "mismatched")]
    fn get_mut_rejects_a_guard_from_a_different_lock() {
        reset_interrupts();
        let cpus = Cpus::new();
        let raw_a: RawSpinLock<'_, MockHal> = RawSpinLock::new(&cpus);
        let raw_b: RawSpinLock<'_, MockHal> = RawSpinLock::new(&cpus);
        let a: SpinlockProtected<'_, MockHal, i32> = SpinlockProtected::new(&raw_a, 1);
        let b: SpinlockProtected<'_, MockHal, i32> = SpinlockProtected::new(&raw_b, 2);
        let mut guard = a.lock();
        let _ = b.get_mut(&mut guard);
    }
}
