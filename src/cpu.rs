//! Per-CPU state: the scheduler context, the nested interrupt-disable
//! counter, and the process currently running here.
//!
//! Grounded on xv6's `Cpu` struct and `push_off`/`pop_off`
//! pair (`src/proc.rs`, `src/lock/spinlock.rs`).

use core::ptr;
use core::sync::atomic::{AtomicUsize, Ordering};

use array_macro::array;

use crate::hal::{Context, Hal};
use crate::param::NCPU;

/// Per-CPU-state.
pub struct Cpu {
    /// The process running on this CPU, or null.
    pub(crate) proc: *mut (),

    /// `switch()`es here to enter the scheduler loop.
    pub context: Context,

    /// Depth of `push_off()` nesting.
    noff: i32,

    /// Were interrupts enabled before the first `push_off()`?
    interrupt_enabled: bool,
}

// SAFETY: a `Cpu` is only ever mutated by the hart it belongs to, with
// interrupts disabled while doing so; sharing the pointer across harts is
// fine because no other hart dereferences it mutably.
unsafe impl Sync for Cpu {}

impl Cpu {
    pub const fn new() -> Self {
        Self {
            proc: ptr::null_mut(),
            context: Context::new(),
            noff: 0,
            interrupt_enabled: false,
        }
    }

    pub fn noff(&self) -> i32 {
        self.noff
    }

    pub fn interrupt_enabled(&self) -> bool {
        self.interrupt_enabled
    }

    pub fn set_interrupt_enabled(&mut self, v: bool) {
        self.interrupt_enabled = v;
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// The fixed per-CPU array, one slot per hart.
pub struct Cpus {
    cpus: [core::cell::UnsafeCell<Cpu>; NCPU],
    /// The id of the hart each call to `current_id` is running on, supplied
    /// by the platform (would be `r_tp()` on RISC-V); tests fake it with a
    /// thread-local-free single-threaded counter.
    current: AtomicUsize,
}

unsafe impl Sync for Cpus {}

impl Cpus {
    pub fn new() -> Self {
        Self {
            cpus: array![_ => core::cell::UnsafeCell::new(Cpu::new()); NCPU],
            current: AtomicUsize::new(0),
        }
    }

    /// Sets which CPU id the calling thread of execution is "running on".
    /// In a real kernel this is implicit (one hart = one thread of
    /// control); in tests, which are single-threaded, this lets a test
    /// simulate several CPUs taking turns.
    pub fn set_current_id(&self, id: usize) {
        assert!(id < NCPU, "unknown APIC id");
        self.current.store(id, Ordering::Relaxed);
    }

    pub fn current_id(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Returns a raw pointer to the calling CPU's `Cpu` struct.
    ///
    /// It is safe to call this function with interrupts enabled, but the
    /// returned pointer may stop denoting "the CPU we're running on" if a
    /// timer interrupt migrates the caller's process to another CPU
    /// afterwards — exactly the caveat xv6 documents on
    /// `mycpu`/`current_cpu_raw`.
    pub fn current_raw(&self) -> *mut Cpu {
        self.cpus[self.current_id()].get()
    }
}

impl Default for Cpus {
    fn default() -> Self {
        Self::new()
    }
}

/// `push_off`/`pop_off` are like disabling/enabling interrupts except that
/// they nest: it takes two `pop_off()`s to undo two `push_off()`s. If
/// interrupts were already off, `push_off` then `pop_off` leaves them off.
///
/// # Safety
///
/// Must be called with a valid `Cpus` that outlives the call.
pub unsafe fn push_off<H: Hal>(cpus: &Cpus) {
    let old = H::intr_get();
    H::intr_off();
    let cpu = cpus.current_raw();
    // SAFETY: interrupts are now off, so no one else touches this CPU.
    unsafe {
        if (*cpu).noff == 0 {
            (*cpu).interrupt_enabled = old;
        }
        (*cpu).noff += 1;
    }
}

/// # Safety
///
/// See `push_off`. Must be called with interrupts currently disabled.
pub unsafe fn pop_off<H: Hal>(cpus: &Cpus) {
    assert!(!H::intr_get(), "pop_off - interruptible");
    let cpu = cpus.current_raw();
    // SAFETY: interrupts are off.
    unsafe {
        assert!((*cpu).noff >= 1, "pop_off");
        (*cpu).noff -= 1;
        if (*cpu).noff == 0 && (*cpu).interrupt_enabled {
            H::intr_on();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockHal;

    #[test]
    fn push_pop_off_nests() {
        let cpus = Cpus::new();
        // SAFETY: single-threaded test, no concurrent access to `cpus`.
        unsafe {
            push_off::<MockHal>(&cpus);
            push_off::<MockHal>(&cpus);
            assert_eq!((*cpus.current_raw()).noff(), 2);
            pop_off::<MockHal>(&cpus);
            assert_eq!((*cpus.current_raw()).noff(), 1);
            pop_off::<MockHal>(&cpus);
            assert_eq!((*cpus.current_raw()).noff(), 0);
        }
    }

    #[test]
    fn current_id_tracks_the_calling_hart() {
        let cpus = Cpus::new();
        cpus.set_current_id(0);
        assert_eq!(cpus.current_id(), 0);
        cpus.set_current_id(NCPU - 1);
        assert_eq!(cpus.current_id(), NCPU - 1);
    }

    #[test]
    #[should_panic(expected = "unknown APIC id")]
    fn unknown_cpu_id_panics() {
        let cpus = Cpus::new();
        cpus.set_current_id(NCPU);
    }
}
