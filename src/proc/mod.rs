//! The process table's per-slot data: `Proc`, the lock-guarded `ProcInfo`
//! every waker and scheduler decision touches, and the lock-free `ProcData`
//! private to whichever CPU currently owns the slot.
//!
//! Grounded on xv6's `proc.rs`, generalized over `H: Hal` so
//! the address space, kernel stack frame and file handles are whatever the
//! embedding kernel's `Hal` impl provides instead of a fixed RISC-V layout.

pub mod procs;
pub mod wait_channel;

pub use procs::{ExitStats, Procs};

use core::mem;
use core::ops::{Deref, DerefMut};
use core::ptr;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::cpu::Cpus;
use crate::hal::{BlockFile, Frame, Hal};
use crate::lock::{RawSpinLock, SpinlockProtected, SpinlockProtectedGuard, Waitable};
use crate::param::{MAXPROCNAME, NOFILE};

pub use wait_channel::WaitChannel;

/// The six lifecycle states of spec.md §3. `EMBRYO` is the state between
/// `alloc` reserving a slot and the caller finishing setup; xv6
/// kernel calls this `USED` for the same purpose (see DESIGN.md).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Procstate {
    Unused,
    Embryo,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

impl Procstate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Procstate::Unused => "unused",
            Procstate::Embryo => "embryo",
            Procstate::Sleeping => "sleep ",
            Procstate::Runnable => "runble",
            Procstate::Running => "run   ",
            Procstate::Zombie => "zombie",
        }
    }
}

/// Fields a waker or the scheduler must be able to touch while only holding
/// this slot's lock (spec.md §3's state/scheduling/blocking fields).
pub struct ProcInfo {
    pub state: Procstate,
    pub pid: i32,

    /// Opaque channel token this process is sleeping on, or null.
    pub chan: *const WaitChannel,
    /// Channel woken when this process's child becomes a ZOMBIE.
    pub child_waitchannel: WaitChannel,

    pub priority: u8,
    pub ticks_elapsed: u32,
    pub ctime: u32,
    pub retime: u32,
    pub rutime: u32,
    pub stime: u32,

    /// Swap-in bookkeeping (spec.md §3's `satisfied`/`trapva`).
    pub satisfied: bool,
    pub trapva: usize,

    pub xstate: i32,
}

// SAFETY: `chan` is only ever compared against other addresses, never
// dereferenced; access is always under `Proc::info`'s lock.
unsafe impl Send for ProcInfo {}

impl ProcInfo {
    const fn zero() -> Self {
        Self {
            state: Procstate::Unused,
            pid: 0,
            chan: ptr::null(),
            child_waitchannel: WaitChannel::new(),
            priority: crate::param::PRIO_DEFAULT,
            ticks_elapsed: 0,
            ctime: 0,
            retime: 0,
            rutime: 0,
            stime: 0,
            satisfied: false,
            trapva: 0,
            xstate: 0,
        }
    }
}

/// Fields private to the owning CPU while the slot is not shared (spec.md
/// §3's memory/I/O/trap fields). No lock: invariant 1 of spec.md §3 permits
/// the owning CPU to touch these without the table lock while RUNNING; any
/// other access happens only through a `ProcGuard`, i.e. with `info` held.
pub struct ProcData<H: Hal> {
    pub kstack: Option<Frame>,
    pub trapframe: Option<Frame>,
    pub address_space: Option<H::AddressSpace>,
    pub context: crate::hal::Context,
    pub open_files: [Option<crate::hal::FileHandle>; NOFILE],
    pub cwd: Option<crate::hal::FileHandle>,
}

impl<H: Hal> ProcData<H> {
    const fn new() -> Self {
        Self {
            kstack: None,
            trapframe: None,
            address_space: None,
            context: crate::hal::Context::new(),
            open_files: [None; NOFILE],
            cwd: None,
        }
    }

    pub fn size(&self) -> usize {
        self.address_space.as_ref().map_or(0, |a| {
            use crate::hal::AddressSpace;
            a.size()
        })
    }

    /// Closes every open file descriptor and the cwd through `fs` (spec.md
    /// §4.6's `exit`: "closes all open files, releases cwd"). Each `Some`
    /// handle is handed to `H::FileSystem::close` before the slot forgets
    /// it, matching the teacher's `exit_current` freeing every open file
    /// and the cwd rather than merely dropping the descriptor table.
    pub(crate) fn close_files(&mut self, fs: &H::FileSystem) {
        for f in &mut self.open_files {
            if let Some(handle) = f.take() {
                fs.close(handle);
            }
        }
        if let Some(handle) = self.cwd.take() {
            fs.close(handle);
        }
    }
}

/// One process-table slot.
pub struct Proc<H: Hal> {
    /// Back-reference to the parent slot, guarded by the process system's
    /// shared `wait_lock` rather than `info` (spec.md §3, DESIGN.md).
    parent: mem::MaybeUninit<SpinlockProtected<'static, H, *const Proc<H>>>,

    info: crate::lock::Spinlock<'static, H, ProcInfo>,

    pub data: core::cell::UnsafeCell<ProcData<H>>,

    killed: AtomicBool,

    pub name: [u8; MAXPROCNAME],
}

unsafe impl<H: Hal> Sync for Proc<H> {}

impl<H: Hal> Proc<H> {
    pub const fn zero(cpus: &'static Cpus) -> Self {
        Self {
            parent: mem::MaybeUninit::uninit(),
            info: crate::lock::Spinlock::new(RawSpinLock::new(cpus), ProcInfo::zero()),
            data: core::cell::UnsafeCell::new(ProcData::new()),
            killed: AtomicBool::new(false),
            name: [0; MAXPROCNAME],
        }
    }

    /// Must be called exactly once per slot before any other use, per
    /// `procinit` in xv6.
    ///
    /// # Safety
    /// Must be called with exclusive access to `self` before the slot is
    /// shared across threads.
    pub unsafe fn init_parent_link(&self, wait_lock: &'static RawSpinLock<'static, H>) {
        unsafe {
            self.parent
                .as_ptr()
                .cast_mut()
                .write(SpinlockProtected::new(wait_lock, ptr::null()));
        }
    }

    fn parent_link(&self) -> &SpinlockProtected<'static, H, *const Proc<H>> {
        // SAFETY: `init_parent_link` is called before any process slot is
        // used (see `Procs::new`).
        unsafe { self.parent.assume_init_ref() }
    }

    /// Acquires the shared `wait_lock` backing every slot's `parent` field.
    /// The returned guard works with `parent_of`/`set_parent_of` on *any*
    /// slot from the same process table, not just `self`.
    pub fn lock_parent(&self) -> SpinlockProtectedGuard<'_, 'static, H> {
        self.parent_link().lock()
    }

    /// Reads this slot's parent back-reference, given a guard obtained
    /// from `lock_parent` on any slot sharing the same `wait_lock`.
    pub fn parent_of(&self, guard: &mut SpinlockProtectedGuard<'_, 'static, H>) -> *const Proc<H> {
        *self.parent_link().get_mut(guard)
    }

    /// Writes this slot's parent back-reference.
    pub fn set_parent_of(
        &self,
        guard: &mut SpinlockProtectedGuard<'_, 'static, H>,
        parent: *const Proc<H>,
    ) {
        *self.parent_link().get_mut(guard) = parent;
    }

    pub fn lock(&self) -> ProcGuard<H> {
        mem::forget(self.info.lock());
        ProcGuard { ptr: self }
    }

    pub fn pid(&self) -> i32 {
        // SAFETY: caller already holds `info`'s lock via a `ProcGuard`, or
        // is only peeking for a debug dump per spec.md §6's Ctrl-P, which
        // xv6 also does lock-free.
        unsafe { (*self.info.get_mut_raw()).pid }
    }

    /// Peeks this slot's priority without acquiring `info`'s lock, the way
    /// `pid()` peeks for a debug dump. Callers that need a consistent
    /// snapshot alongside other fields should lock instead.
    pub fn priority(&self) -> u8 {
        unsafe { (*self.info.get_mut_raw()).priority }
    }

    /// Peeks this slot's state, for a policy selector scanning candidates
    /// before locking the one it picks (see `sched::policy`).
    pub fn state(&self) -> Procstate {
        unsafe { (*self.info.get_mut_raw()).state }
    }

    /// Peeks this slot's `ctime`, for FCFS's earliest-arrival comparison.
    pub fn ctime(&self) -> u32 {
        unsafe { (*self.info.get_mut_raw()).ctime }
    }

    /// The address of this slot's own `child_waitchannel`, used as the
    /// rendezvous token a child's `exit` wakes and this process's `wait`
    /// sleeps on (spec.md §9: "a channel is any address used as a unique
    /// token"). Reading the address itself needs no lock: the field's
    /// location is fixed for the slot's whole lifetime.
    pub fn child_waitchannel(&self) -> usize {
        unsafe { &(*self.info.get_mut_raw()).child_waitchannel as *const WaitChannel as usize }
    }

    /// Releases this slot's `info` lock without an owning `ProcGuard`, for
    /// `fork_return`'s one-time "still holding the lock from the
    /// scheduler" release (spec.md §4.4).
    ///
    /// # Safety
    /// The calling kernel thread must actually be the one the scheduler
    /// just switched into, holding this slot's lock implicitly.
    pub unsafe fn unlock_info(&self) {
        unsafe { self.info.unlock() };
    }

    /// True if this slot's stored name matches `name` exactly once both are
    /// nul-padded to `MAXPROCNAME` (spec.md §9, Open Question (b)'s
    /// find-by-name lookup).
    pub fn name_matches(&self, name: &[u8]) -> bool {
        self.name
            .iter()
            .zip(name.iter().chain(core::iter::repeat(&0u8)))
            .take(MAXPROCNAME)
            .all(|(a, b)| a == b)
    }

    pub fn kill(&self) {
        self.killed.store(true, Ordering::Release);
    }

    pub fn killed(&self) -> bool {
        self.killed.load(Ordering::Acquire)
    }
}

/// A `ProcGuard` asserts that `info`'s spinlock is held for `ptr`.
pub struct ProcGuard<H: Hal> {
    ptr: *const Proc<H>,
}

impl<H: Hal> ProcGuard<H> {
    pub fn info(&self) -> &ProcInfo {
        unsafe { &*(*self.ptr).info.get_mut_raw() }
    }

    pub fn info_mut(&mut self) -> &mut ProcInfo {
        unsafe { &mut *(*self.ptr).info.get_mut_raw() }
    }

    pub fn raw(&self) -> *const Proc<H> {
        self.ptr
    }

    pub fn proc(&self) -> &Proc<H> {
        unsafe { &*self.ptr }
    }

    /// Switches to the calling CPU's scheduler context. Must hold only
    /// `info`'s lock, with the caller's state already changed away from
    /// `Running`, per spec.md §4.4.
    ///
    /// # Safety
    /// See spec.md §4.4's `sched()` contract; the caller is responsible for
    /// every precondition (`noff == 1`, state not `Running`, interrupts
    /// off) because violating any of them corrupts scheduler state rather
    /// than merely misbehaving locally.
    pub unsafe fn sched(&mut self, cpus: &Cpus, cpu_context: *mut crate::hal::Context) {
        assert_ne!(self.info().state, Procstate::Running, "sched running");
        assert!(!H::intr_get(), "sched interruptible");
        let cpu = cpus.current_raw();
        // SAFETY: interrupts are off, so no one else touches this CPU.
        assert_eq!(unsafe { (*cpu).noff() }, 1, "sched locks");
        let interrupt_enabled = unsafe { (*cpu).interrupt_enabled() };
        let proc_context = unsafe { &mut (*(*self.ptr).data.get()).context as *mut _ };
        unsafe { H::switch(proc_context, cpu_context) };
        unsafe { (*cpu).set_interrupt_enabled(interrupt_enabled) };
    }

    /// Returns this slot's kernel-stack, trap-frame, and address-space
    /// frames to `alloc` (spec.md §4.6's reap step: "free its kernel
    /// stack, free its address space"). Must run before `clear`, which
    /// only zeroes bookkeeping and does not itself know an allocator.
    pub fn free_memory(&mut self, alloc: &H::Allocator) {
        use crate::hal::AddressSpace;
        let data = unsafe { &mut *(*self.ptr).data.get() };
        if let Some(frame) = data.kstack.take() {
            alloc.free_frame(frame);
        }
        if let Some(frame) = data.trapframe.take() {
            alloc.free_frame(frame);
        }
        if let Some(mut space) = data.address_space.take() {
            space.teardown(alloc);
        }
    }

    /// Frees this slot's resources. If `parent_guard` is provided, also
    /// clears the parent back-reference (spec.md §4.6's reap step). Open
    /// files and the cwd are not touched here: `exit_current` already
    /// closed every one of them through `H::FileSystem::close` before this
    /// slot could become `ZOMBIE`, so by the time a parent reaps it
    /// `open_files`/`cwd` are already `None`.
    pub fn clear(&mut self, parent_guard: Option<&mut SpinlockProtectedGuard<'_, 'static, H>>) {
        let data = unsafe { &mut *(*self.ptr).data.get() };
        data.kstack = None;
        data.trapframe = None;
        data.address_space = None;
        data.open_files = [None; NOFILE];
        data.cwd = None;

        if let Some(guard) = parent_guard {
            *self.parent_link().get_mut(guard) = ptr::null();
        }

        let info = self.info_mut();
        info.pid = 0;
        info.chan = ptr::null();
        info.satisfied = false;
        info.trapva = 0;
        info.xstate = 0;
        info.priority = crate::param::PRIO_DEFAULT;
        info.ticks_elapsed = 0;
        info.ctime = 0;
        info.retime = 0;
        info.rutime = 0;
        info.stime = 0;
        info.state = Procstate::Unused;
        unsafe {
            (*(self.ptr as *mut Proc<H>)).name = [0; MAXPROCNAME];
            (*(self.ptr as *mut Proc<H>)).killed = AtomicBool::new(false);
        }
    }
}

impl<H: Hal> Drop for ProcGuard<H> {
    fn drop(&mut self) {
        // An error during `alloc`'s caller-side setup leaves the slot
        // `Embryo` with a zero-size address space; roll it back rather
        // than leak it, matching xv6's `ProcGuard::drop`.
        let should_clear = self.info().state == Procstate::Embryo
            && unsafe { &*(*self.ptr).data.get() }.size() == 0;
        if should_clear {
            self.clear(None);
        }
        unsafe { (*self.ptr).info.unlock() };
    }
}

impl<H: Hal> Deref for ProcGuard<H> {
    type Target = Proc<H>;

    fn deref(&self) -> &Proc<H> {
        unsafe { &*self.ptr }
    }
}

impl<H: Hal> DerefMut for ProcGuard<H> {
    fn deref_mut(&mut self) -> &mut Proc<H> {
        unsafe { &mut *(self.ptr as *mut Proc<H>) }
    }
}

impl<H: Hal> Waitable for ProcGuard<H> {
    unsafe fn raw_release(&mut self) {
        unsafe { (*self.ptr).info.unlock() };
    }

    unsafe fn raw_acquire(&mut self) {
        unsafe { (*self.ptr).info.raw_lock().acquire() };
    }
}

/// A handle to the process currently running on the calling CPU, obtained
/// with interrupts transiently disabled (`myproc` in xv6).
pub struct CurrentProc<H: Hal> {
    ptr: *mut Proc<H>,
}

impl<H: Hal> CurrentProc<H> {
    /// # Safety
    /// `ptr` must be the calling CPU's current process.
    pub unsafe fn from_raw(ptr: *mut Proc<H>) -> Self {
        Self { ptr }
    }

    pub fn data(&self) -> &ProcData<H> {
        unsafe { &*(*self.ptr).data.get() }
    }

    pub fn data_mut(&mut self) -> &mut ProcData<H> {
        unsafe { &mut *(*self.ptr).data.get() }
    }

    pub fn proc(&self) -> &Proc<H> {
        unsafe { &*self.ptr }
    }

    pub fn killed(&self) -> bool {
        unsafe { (*self.ptr).killed() }
    }

    pub fn raw(&self) -> *mut Proc<H> {
        self.ptr
    }
}
