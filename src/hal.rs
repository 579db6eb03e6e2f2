//! The hardware/OS collaborators this crate treats as external, per
//! spec.md §1: the boot loader and trap vectors, the physical page
//! allocator and page-table walker, the file system and log layer, the
//! console, the interrupt controller, and the two-stack `swtch` dance.
//!
//! Grounded on xv6's `arch::interface` trait split
//! (`src/arch/interface.rs`), which separates "what the kernel core needs"
//! from "how a particular architecture provides it", and on
//! `kernel-rs-lib`'s generic `PCB`/`Current` traits, which show the same
//! library-reusable-across-backends shape with associated types instead of
//! a concrete `TargetArch`. A concrete kernel embeds this crate by
//! implementing `Hal` once and instantiating `Kernel<MyHal>`; this crate's
//! own tests implement it as `testing::MockHal`.

use crate::error::KernelError;
use crate::param::PGSIZE;

/// Saved callee-registers and PC for a kernel thread (spec.md §9's
/// "Cooperative context switch"). Opaque to everything but a real `Hal`
/// backend's `switch`/assembly boundary, which bit-casts this fixed-size
/// storage into its actual register layout. Fixed-size (rather than an
/// associated type) so `Cpu` and the lock module stay free of a generic
/// `Hal` parameter, matching how xv6's `Context` is a single
/// concrete struct because exactly one architecture is ever compiled in.
#[derive(Copy, Clone)]
pub struct Context {
    pub(crate) _opaque: [usize; 14],
}

impl Context {
    pub const fn new() -> Self {
        Self { _opaque: [0; 14] }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// One physical page frame, identified by its physical address. Opaque: the
/// allocator that produced it is the only code that interprets the address.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Frame(pub usize);

/// `alloc_frame`/`free_frame`, named directly from spec.md §1.
pub trait PageAllocator {
    fn alloc_frame(&self) -> Option<Frame>;
    fn free_frame(&self, frame: Frame);
}

/// One user virtual page number within a process's address space.
pub type Vpn = usize;

/// `create`/`open`/`read`/`write`/`close`/`unlink`, and transactional
/// `begin_op`/`end_op`, named directly from spec.md §1. The swap-file codec
/// (`swap::codec`) and the two paging daemons (`swap::daemon`) are written
/// against this trait only. `FileHandle` is an opaque token the
/// implementation assigns; this crate never interprets it.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct FileHandle(pub u32);

pub trait BlockFile {
    fn begin_op(&self);
    fn end_op(&self);

    fn create(&self, name: &str) -> Result<FileHandle, KernelError>;
    fn open(&self, name: &str) -> Result<FileHandle, KernelError>;
    fn read(&self, handle: FileHandle, offset: usize, buf: &mut [u8]) -> Result<usize, KernelError>;
    fn write(&self, handle: FileHandle, offset: usize, buf: &[u8]) -> Result<usize, KernelError>;
    fn close(&self, handle: FileHandle);
    fn unlink(&self, name: &str) -> Result<(), KernelError>;
}

/// `map`/`unmap`/`walk_pte`/`switch_address_space`, named directly from
/// spec.md §1. One `AddressSpace` handle is owned by each process's private
/// data (spec.md §3's `pgdir`). `Default::default()` must produce the empty,
/// zero-size address space a freshly allocated process starts from.
pub trait AddressSpace: Default {
    /// Virtual size of the address space, in bytes (spec.md §3's `sz`).
    fn size(&self) -> usize;

    /// Grows or shrinks the address space by `delta` bytes (spec.md §4.6's
    /// `growproc`). Negative `delta` shrinks. Returns the new size.
    fn resize(&mut self, delta: isize, alloc: &impl PageAllocator) -> Result<usize, KernelError>;

    /// Builds a page-by-page copy of `self` for `fork` (spec.md §4.6: "copies
    /// the parent's address space page-by-page").
    fn fork_from(&self, alloc: &impl PageAllocator) -> Result<Self, KernelError>
    where
        Self: Sized;

    /// Calls `f(vpn, accessed, dirty)` for every present user page above
    /// the first page (spec.md §4.5's victim-search domain — the first
    /// page is skipped because it backs the trampoline/guard mapping).
    fn for_each_present_page(&self, f: &mut dyn FnMut(Vpn, bool, bool));

    /// Clears the present bit and sets the swapped bit for `vpn`, and hands
    /// back the frame that was backing it so the caller can free it only
    /// after the page's bytes have been written out (spec.md §4.5: "clear
    /// the present bit and set the swapped bit ... free the physical
    /// frame" are separated by the swap file I/O).
    fn mark_swapped_out(&mut self, vpn: Vpn) -> Frame;

    /// True if `vpn`'s PTE has the swapped bit set (present bit clear).
    fn is_swapped_out(&self, vpn: Vpn) -> bool;

    /// Installs `frame` as the backing of `vpn` with the present bit set
    /// and the swapped bit clear (spec.md §4.5 "installing the frame ...
    /// with present bit set and swapped bit clear").
    fn install_swapped_in(&mut self, vpn: Vpn, frame: Frame);

    /// Copies `dst.len()` bytes out of user virtual address `va`.
    fn copy_out(&self, va: usize, dst: &mut [u8]) -> Result<(), KernelError>;

    /// Copies `src.len()` bytes into user virtual address `va`.
    fn copy_in(&mut self, va: usize, src: &[u8]) -> Result<(), KernelError>;

    /// Reads exactly one page's worth of raw bytes backing `vpn`, for the
    /// swap-out path to write to disk.
    fn read_page(&self, vpn: Vpn, buf: &mut [u8; PGSIZE]);

    /// Writes exactly one page's worth of raw bytes into the frame backing
    /// `vpn`, for the swap-in path after reading the page off disk.
    fn write_page(&mut self, vpn: Vpn, buf: &[u8; PGSIZE]);

    /// Frees every frame still backing a resident page, for the reap step
    /// of `wait`/`waitstats` (spec.md §4.6: "free its address space").
    fn teardown(&mut self, alloc: &impl PageAllocator);

    /// Flushes the TLB for this address space on the calling CPU (spec.md
    /// §4.5's "flush the TLB of the victim's address space").
    fn flush_tlb(&self);

    /// Switches the hardware address-space register to this address space
    /// (spec.md §1's `switch_address_space`, used by the scheduler loop and
    /// `growproc`).
    fn activate(&self);
}

/// The hardware abstraction layer a concrete kernel provides to embed this
/// crate. Bundles the out-of-scope collaborators of spec.md §1 behind
/// associated types, the way `TargetArch: Arch` bundles
/// `PageInitiator + MemLayout + ... + ProcManager` in xv6.
pub trait Hal: 'static {
    type AddressSpace: AddressSpace;
    type Allocator: PageAllocator;
    type FileSystem: BlockFile;

    /// The two-stack cooperative context switch. A real backend is
    /// hand-written assembly (`swtch.S` in xv6); this crate
    /// only calls it exactly at the boundary `sched()` defines.
    ///
    /// # Safety
    ///
    /// `from` and `to` must each be the unique `Context` belonging to a
    /// kernel thread that is not concurrently running elsewhere.
    unsafe fn switch(from: *mut Context, to: *mut Context);

    /// Builds a fresh `Context` that, once switched into, resumes execution
    /// at `entry` running on a stack based at `stack_top` (spec.md §4.2:
    /// "a context whose resumed PC is `fork_return`"). A real backend packs
    /// `entry`/`stack_top` into whatever register layout `switch`'s
    /// assembly restores from; this crate never inspects the result.
    fn new_context(entry: extern "C" fn(), stack_top: usize) -> Context;

    /// Whether this hart currently has interrupts enabled.
    fn intr_get() -> bool;
    /// Disables interrupts on this hart.
    fn intr_off();
    /// Enables interrupts on this hart.
    fn intr_on();
}
