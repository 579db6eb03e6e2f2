//! Scheduling policy dispatch (`policy`), the timer-interrupt entry point,
//! and `fork_return`, the landing pad every freshly allocated process's
//! context resumes at (spec.md §4.2, §4.4).
//!
//! Grounded on xv6's `src/trap.rs` (`clockintr` deciding
//! whether to call `yield_`) and `src/proc.rs`'s `forkret`, which likewise
//! releases the slot lock handed to it by the scheduler and, on its very
//! first invocation, runs one-time post-switch setup before returning to
//! user mode.

pub mod policy;

use core::sync::atomic::{AtomicBool, Ordering};

use crate::hal::Hal;
use crate::kernel::Kernel;
use crate::param::{SWAPIND_NAME, SWAPOUTD_NAME};
use crate::proc::{CurrentProc, Procs};
use crate::swap::daemon;

/// A timer interrupt landed while `current` was `RUNNING` (spec.md §4.4:
/// "A timer interrupt that sees a RUNNING user process calls `yield`").
/// `Procs::tick` must already have been called by the caller; this only
/// decides whether the interrupted process gives up the CPU.
///
/// FCFS is non-preemptive (spec.md §4.4.1: "the timer does **not** yield
/// under FCFS") so this is a no-op under that policy. DML additionally
/// ages the running process by one priority level before it yields
/// (spec.md §4.4.1: "the running process's priority drops by one on each
/// full quantum").
pub fn timer_interrupt<H: Hal>(procs: &Procs<H>, current: &CurrentProc<H>) {
    if cfg!(feature = "policy-fcfs") {
        return;
    }
    if cfg!(feature = "policy-dml") {
        procs.dec_prio(current.proc());
    }
    procs.proc_yield(current);
}

static DAEMONS_STARTED: AtomicBool = AtomicBool::new(false);

/// Starts the swap-out and swap-in kernel threads, each entering through
/// `fork_return` itself like any other process (spec.md §4.2: every
/// allocated slot's context resumes at `fork_return`). Each one's *own*
/// first `fork_return` call then recognizes its registered name and jumps
/// straight into its daemon loop without returning.
fn spawn_daemon<H: Hal>(kernel: &'static Kernel<H>, name: &[u8]) {
    let mut guard = kernel
        .procs
        .alloc(&kernel.allocator, fork_return::<H>)
        .expect("out of process slots while starting a swap daemon");
    kernel.procs.set_name(&mut guard, name);
}

/// The entry point every freshly allocated process's context resumes at
/// (spec.md §4.2). Reached only via the raw context switch out of
/// `Procs::scheduler_loop`, which is why this takes no parameters and
/// recovers its collaborators from [`Kernel::current`] instead.
///
/// Releases the slot lock the scheduler is still holding on this
/// process's behalf (spec.md §4.4: "`fork_return` ... releases the table
/// lock (held across the switch by the scheduler)"), runs one-time
/// post-boot initialisation the first time any process reaches this
/// point, and then either enters a daemon's infinite loop (if this
/// process is one of the two swap daemons) or returns, handing control
/// back to the embedder's own trap-return path for an ordinary process.
/// Log replay itself is the `Hal::FileSystem` implementation's own
/// concern and outside this crate's scope (spec.md §1).
pub extern "C" fn fork_return<H: Hal>() {
    let kernel = unsafe { Kernel::<H>::current() };
    let current = unsafe { kernel.procs.current() }.expect("fork_return always has a current process");
    unsafe { current.proc().unlock_info() };

    if DAEMONS_STARTED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
        .is_ok()
    {
        spawn_daemon(kernel, SWAPOUTD_NAME);
        spawn_daemon(kernel, SWAPIND_NAME);
    }

    if current.proc().name_matches(SWAPOUTD_NAME) {
        daemon::swapout_daemon_loop(&kernel.procs, &kernel.swap, &kernel.file_system, &kernel.allocator);
    }
    if current.proc().name_matches(SWAPIND_NAME) {
        daemon::swapin_daemon_loop(&kernel.procs, &kernel.swap, &kernel.file_system, &kernel.allocator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpus;
    use crate::proc::Procstate;
    use crate::testing::{reset_interrupts, MockAllocator, MockHal};
    use std::boxed::Box;

    fn setup() -> (&'static Cpus, &'static Procs<MockHal>, MockAllocator) {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let procs: &'static Procs<MockHal> = Box::leak(Box::new(Procs::new(cpus)));
        procs.init();
        (cpus, procs, MockAllocator::new(8))
    }

    #[test]
    fn default_policy_yields_running_process() {
        let (cpus, procs, alloc) = setup();
        let mut guard = procs.alloc(&alloc, fork_return::<MockHal>).expect("alloc");
        guard.info_mut().state = Procstate::Running;
        let ptr = guard.raw();
        drop(guard);
        let current = unsafe { CurrentProc::from_raw(ptr as *mut _) };

        unsafe { (*cpus.current_raw()).proc = ptr as *mut () };
        timer_interrupt(procs, &current);

        let state = unsafe { &*ptr }.lock().info().state;
        assert_eq!(state, Procstate::Runnable);
    }

    #[test]
    fn fcfs_policy_never_yields() {
        if !cfg!(feature = "policy-fcfs") {
            return;
        }
        let (cpus, procs, alloc) = setup();
        let mut guard = procs.alloc(&alloc, fork_return::<MockHal>).expect("alloc");
        guard.info_mut().state = Procstate::Running;
        let ptr = guard.raw();
        drop(guard);
        let current = unsafe { CurrentProc::from_raw(ptr as *mut _) };

        unsafe { (*cpus.current_raw()).proc = ptr as *mut () };
        timer_interrupt(procs, &current);

        let state = unsafe { &*ptr }.lock().info().state;
        assert_eq!(state, Procstate::Running);
    }
}
