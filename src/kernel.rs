//! The top-level aggregate an embedder instantiates once: the per-CPU
//! array, the process table, the swap service, and the `Hal` backend's own
//! allocator and file system (spec.md §9: "Global mutable state ... has a
//! single documented init point and is never torn down").
//!
//! Grounded directly on xv6's own `Kernel` struct
//! (`src/kernel.rs`) and its `static mut KERNEL: Option<Kernel>` plus
//! `kernel()` accessor: a handful of `extern "C" fn()` entry points this
//! crate must expose (`sched::fork_return`, reached only via the raw
//! `swtch` context switch, never a normal call) cannot take a `&Kernel<H>`
//! parameter, so they recover it from a process-wide singleton instead.
//! `current` is the sole concession this crate makes to that constraint;
//! every other function takes its collaborators as ordinary parameters.

use core::sync::atomic::{AtomicPtr, Ordering};

use crate::console::HistoryLog;
use crate::cpu::Cpus;
use crate::hal::Hal;
use crate::proc::Procs;
use crate::swap::SwapService;

/// Type-erased slot for the one `Kernel<H>` this process ever builds.
/// Erased to `()` because a `static` cannot name the generic `H` an
/// embedder chooses; `current::<H>` casts it back, which is sound because
/// exactly one `H` is ever compiled into a given binary (spec.md §6's
/// "Build-time policy selection" establishes the same one-build-one-config
/// discipline for scheduler policies).
static GLOBAL: AtomicPtr<()> = AtomicPtr::new(core::ptr::null_mut());

/// The aggregate bundling every piece of global state this crate defines.
/// An embedder owns one, at a fixed `'static` address, and reaches it
/// either directly (most code) or through [`current`] (only the handful of
/// zero-argument entry points that can't take a parameter).
pub struct Kernel<H: Hal> {
    pub cpus: &'static Cpus,
    pub procs: Procs<H>,
    pub swap: SwapService<H>,
    pub allocator: H::Allocator,
    pub file_system: H::FileSystem,
    /// The `history` syscall's backing ring (spec.md §6). Independent of
    /// `H`: it never touches a process's address space or file table, only
    /// a fixed in-kernel buffer.
    pub history: HistoryLog,
}

impl<H: Hal> Kernel<H> {
    /// Builds a zeroed `Kernel`. Must be placed at its final `'static`
    /// address (a boot-time `static` or a leaked `Box`, mirroring
    /// `Procs::new`/`init`'s split) before `init` runs.
    pub fn new(cpus: &'static Cpus, allocator: H::Allocator, file_system: H::FileSystem) -> Self {
        Self {
            cpus,
            procs: Procs::new(cpus),
            swap: SwapService::new(cpus),
            allocator,
            file_system,
            history: HistoryLog::new(),
        }
    }

    /// Finishes initialization and publishes `self` as the process-wide
    /// singleton [`current`] recovers. Must run exactly once, after `self`
    /// has its final address, before any CPU enters `Procs::scheduler_loop`.
    pub fn init(&'static self) {
        self.procs.init();
        GLOBAL.store(self as *const Self as *mut (), Ordering::Release);
    }

    /// Recovers the singleton published by `init`.
    ///
    /// # Safety
    /// `init` must have already run on this `H`, and the caller must not
    /// outlive the program (the kernel is never torn down, per spec.md §9).
    pub unsafe fn current() -> &'static Self {
        let ptr = GLOBAL.load(Ordering::Acquire);
        assert!(!ptr.is_null(), "Kernel::current before Kernel::init");
        unsafe { &*(ptr as *const Self) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{reset_interrupts, MockAllocator, MockFileSystem, MockHal};
    use serial_test::serial;
    use std::boxed::Box;

    // `GLOBAL` is one process-wide static shared by every test in this
    // binary; `#[serial]` keeps these two from racing each other over it.

    #[test]
    #[serial]
    #[should_panic(expected = "before Kernel::init")]
    fn current_before_init_panics() {
        GLOBAL.store(core::ptr::null_mut(), Ordering::Release);
        unsafe { Kernel::<MockHal>::current() };
    }

    #[test]
    #[serial]
    fn init_publishes_the_singleton() {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let kernel: &'static Kernel<MockHal> = Box::leak(Box::new(Kernel::new(
            cpus,
            MockAllocator::new(4),
            MockFileSystem::new(),
        )));
        kernel.init();
        let recovered = unsafe { Kernel::<MockHal>::current() };
        assert!(core::ptr::eq(recovered, kernel));
    }
}
