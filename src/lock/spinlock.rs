//! A spinning mutual-exclusion lock that disables interrupts on the
//! acquiring CPU for as long as it is held.
//!
//! Grounded on xv6's `Spinlock`/`RawSpinlock`
//! (`src/lock/spinlock.rs`): `acquire` calls `push_off` before spinning so a
//! timer interrupt can never re-enter a held lock on the same hart, and
//! `release` calls `pop_off` after clearing the locked flag. This crate's
//! `Cpus` is not a global singleton (each `Kernel<H>` owns one), so the raw
//! lock borrows it rather than reaching for a `static`.

use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::cpu::{push_off, pop_off, Cpus};
use crate::hal::Hal;

use super::{Lock, Guard, RawLock};

pub struct RawSpinLock<'a, H: Hal> {
    cpus: &'a Cpus,
    locked: AtomicBool,
    /// `cpu_id + 1` of the holder, `0` if unlocked. Offset by one so `0` can
    /// mean "no owner" without an `Option`.
    owner: AtomicUsize,
    _hal: PhantomData<H>,
}

impl<'a, H: Hal> RawSpinLock<'a, H> {
    pub const fn new(cpus: &'a Cpus) -> Self {
        Self {
            cpus,
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(0),
            _hal: PhantomData,
        }
    }
}

impl<'a, H: Hal> RawLock for RawSpinLock<'a, H> {
    fn acquire(&self) {
        // SAFETY: `cpus` outlives `self` by construction (`'a`).
        unsafe { push_off::<H>(self.cpus) };
        assert!(!self.holding(), "acquire: already holding this spinlock");
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            core::hint::spin_loop();
        }
        self.owner
            .store(self.cpus.current_id() + 1, Ordering::Relaxed);
    }

    fn release(&self) {
        assert!(self.holding(), "release: spinlock not held by this cpu");
        self.owner.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);
        // SAFETY: interrupts were disabled by the matching `push_off` in
        // `acquire`, and only that hart reaches this `pop_off`.
        unsafe { pop_off::<H>(self.cpus) };
    }

    fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
            && self.owner.load(Ordering::Relaxed) == self.cpus.current_id() + 1
    }
}

pub type Spinlock<'a, H, T> = Lock<RawSpinLock<'a, H>, T>;
pub type SpinlockGuard<'a, 's, H, T> = Guard<'s, RawSpinLock<'a, H>, T>;
