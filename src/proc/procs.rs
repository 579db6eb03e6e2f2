//! The process table: slot allocation, `fork`/`exit`/`wait`, sleep/wakeup,
//! priority control, and the Ctrl-P debug dump.
//!
//! Grounded on xv6's `ProcessSystem` (`src/proc.rs`), which
//! bundles exactly these operations behind the table lock plus the
//! `wait_lock`-protected parent links described in DESIGN.md.

use core::sync::atomic::{AtomicI32, AtomicPtr, AtomicUsize, Ordering};

use array_macro::array;

use crate::cpu::Cpus;
use crate::error::KernelError;
use crate::hal::{AddressSpace, BlockFile, Hal, PageAllocator};
use crate::lock::{RawSpinLock, Waitable};
use crate::param::{MAXPROCNAME, NPROC, PGSIZE};
use crate::swap::{daemon, SwapService};

use super::{CurrentProc, Proc, ProcGuard, Procstate, WaitChannel};

/// Stats captured off a reaped ZOMBIE child, for the `wait2`/`waitstats`
/// syscall (spec.md §6).
#[derive(Copy, Clone, Debug, Default)]
pub struct ExitStats {
    pub pid: i32,
    pub retime: u32,
    pub rutime: u32,
    pub stime: u32,
    pub ctime: u32,
}

/// The fixed-size process table and the bookkeeping shared by every slot.
pub struct Procs<H: Hal> {
    nextpid: AtomicI32,
    process_pool: [Proc<H>; NPROC],

    /// The first user process, reparented orphans' new parent (spec.md
    /// §4.6's "reparents children to init"). Set exactly once by whoever
    /// runs the boot-time `alloc` for pid 1.
    initial_proc: AtomicPtr<Proc<H>>,

    /// Shared by every slot's `parent` back-reference (see
    /// `lock::SpinlockProtected`) and by `wait`'s scan-for-zombie loop.
    wait_lock: RawSpinLock<'static, H>,

    /// Monotonic tick count, bumped once per timer interrupt and returned
    /// by the `uptime` syscall; its own address is used by `sleep(n_ticks)`
    /// as the rendezvous token (see `ticks_channel`).
    ticks: AtomicUsize,

    cpus: &'static Cpus,
}

unsafe impl<H: Hal> Sync for Procs<H> {}

impl<H: Hal> Procs<H> {
    /// Builds a zeroed process table. Must be placed at its final `'static`
    /// address (e.g. in a boot-time `static` or a leaked `Box`) before
    /// `init` is called, mirroring xv6's
    /// `ProcessSystem::zero()` + `procinit()` split: the slots' parent
    /// back-references need a `&'static` pointer to `self.wait_lock`, which
    /// doesn't exist until `self` has a stable address.
    pub fn new(cpus: &'static Cpus) -> Self {
        Self {
            nextpid: AtomicI32::new(1),
            process_pool: array![_ => Proc::zero(cpus); NPROC],
            initial_proc: AtomicPtr::new(core::ptr::null_mut()),
            wait_lock: RawSpinLock::new(cpus),
            ticks: AtomicUsize::new(0),
            cpus,
        }
    }

    /// Links every slot's `parent` back-reference to this table's shared
    /// `wait_lock`. Must run exactly once, before any slot is used.
    pub fn init(&'static self) {
        for p in &self.process_pool {
            unsafe { p.init_parent_link(&self.wait_lock) };
        }
    }

    /// The raw slot array, for callers outside this module that need to
    /// scan every slot themselves (the swap daemons' victim search in
    /// `swap::classify`).
    pub fn process_pool(&self) -> &[Proc<H>] {
        &self.process_pool
    }

    fn alloc_pid(&self) -> i32 {
        self.nextpid.fetch_add(1, Ordering::Relaxed)
    }

    pub fn ticks(&self) -> usize {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Bumps the tick counter and wakes anyone sleeping on it (`sleep(n)`'s
    /// channel, per spec.md §9's "tick clock" example). Called once per
    /// timer interrupt by the embedder.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.wakeup(self.ticks_channel());
    }

    /// The token `sleep(n_ticks)` parks on, per spec.md §9: "any address
    /// used as a unique token" — here, the tick counter's own address.
    pub fn ticks_channel(&self) -> usize {
        &self.ticks as *const AtomicUsize as usize
    }

    /// Scans for an `UNUSED` slot, installs `EMBRYO`, and returns it locked
    /// (spec.md §4.2's `allocproc`). On any failure the returned `Err`
    /// leaves the slot `UNUSED` again: `ProcGuard::drop` rolls an `EMBRYO`
    /// slot with a zero-size address space back automatically, and this
    /// function frees any frame it already obtained before returning.
    pub fn alloc(
        &self,
        alloc: &H::Allocator,
        entry: extern "C" fn(),
    ) -> Result<ProcGuard<H>, KernelError> {
        for p in &self.process_pool {
            let mut guard = p.lock();
            if guard.info().state != Procstate::Unused {
                continue;
            }

            let pid = self.alloc_pid();
            let now = self.ticks() as u32;
            {
                let info = guard.info_mut();
                info.pid = pid;
                info.state = Procstate::Embryo;
                info.ctime = now;
                info.priority = crate::param::PRIO_DEFAULT;
                info.ticks_elapsed = 0;
                info.retime = 0;
                info.rutime = 0;
                info.stime = 0;
            }

            // Each frame is wrapped in a `scopeguard` that frees it unless
            // defused below, so a failure allocating the second frame rolls
            // the first back automatically instead of needing an explicit
            // cleanup arm (mirrors xv6's `user_proc_init`).
            let kstack = scopeguard::guard(alloc.alloc_frame().ok_or(KernelError::OutOfResource)?, |f| {
                alloc.free_frame(f)
            });
            let trapframe = scopeguard::guard(alloc.alloc_frame().ok_or(KernelError::OutOfResource)?, |f| {
                alloc.free_frame(f)
            });

            let kstack = scopeguard::ScopeGuard::into_inner(kstack);
            let trapframe = scopeguard::ScopeGuard::into_inner(trapframe);
            let stack_top = kstack.0 + crate::param::PGSIZE;
            let data = unsafe { &mut *guard.proc().data.get() };
            data.kstack = Some(kstack);
            data.trapframe = Some(trapframe);
            data.address_space = Some(H::AddressSpace::default());
            data.context = H::new_context(entry, stack_top);

            return Ok(guard);
        }
        Err(KernelError::OutOfResource)
    }

    /// The first user process this table ever allocated (spec.md §4.6's
    /// reparent target). Panics if called before `alloc` has succeeded at
    /// least once — mirrors xv6's assumption that `initcode`
    /// is the first thing `fork_return`'s one-time setup hands control to.
    pub fn initial_proc(&self) -> &Proc<H> {
        let ptr = self.initial_proc.load(Ordering::Acquire);
        assert!(!ptr.is_null(), "no initial process yet");
        unsafe { &*ptr }
    }

    /// Registers `p` as the initial process. Called exactly once, right
    /// after the first `alloc` succeeds during boot.
    pub fn set_initial_proc(&self, p: &Proc<H>) {
        self.initial_proc
            .store(p as *const Proc<H> as *mut Proc<H>, Ordering::Release);
    }

    /// Looks up a process by its exact, nul-padded name (spec.md §9, Open
    /// Question (b)): the swap daemons are found this way rather than by a
    /// hard-coded pid.
    pub fn find_by_name(&self, name: &[u8]) -> Option<&Proc<H>> {
        for p in &self.process_pool {
            let guard = p.lock();
            if guard.info().state == Procstate::Unused {
                continue;
            }
            let stored = &p.name[..];
            let matches = stored
                .iter()
                .zip(name.iter().chain(core::iter::repeat(&0u8)))
                .take(MAXPROCNAME)
                .all(|(a, b)| a == b);
            drop(guard);
            if matches {
                return Some(p);
            }
        }
        None
    }

    /// Copies `name` (truncated to fit) into `p`'s name field. Used right
    /// after `alloc` for a kernel thread the embedder wants `find_by_name`
    /// to locate later (e.g. the swap daemons).
    pub fn set_name(&self, guard: &mut ProcGuard<H>, name: &[u8]) {
        let n = name.len().min(MAXPROCNAME - 1);
        let slot = unsafe { &mut (*(guard.raw() as *mut Proc<H>)).name };
        *slot = [0; MAXPROCNAME];
        slot[..n].copy_from_slice(&name[..n]);
    }

    /// Duplicates `parent`'s address space, file table, and cwd into a
    /// freshly allocated slot, then marks the child `RUNNABLE` (spec.md
    /// §4.6's `fork`).
    pub fn fork(
        &self,
        current: &mut CurrentProc<H>,
        alloc: &H::Allocator,
        entry: extern "C" fn(),
    ) -> Result<i32, KernelError> {
        let mut child = self.alloc(alloc, entry)?;

        let parent_size = current.data().size();
        let parent_space = current
            .data()
            .address_space
            .as_ref()
            .expect("running process has an address space");
        let child_space = parent_space.fork_from(alloc)?;
        debug_assert_eq!(child_space.size(), parent_size);

        let child_data = child.proc().data.get();
        // SAFETY: `child` holds the only reference to this slot's data; no
        // other CPU can see it yet (state is still EMBRYO).
        unsafe {
            (*child_data).address_space = Some(child_space);
            (*child_data).open_files = current.data().open_files;
            (*child_data).cwd = current.data().cwd;
        }

        let child_pid = child.info().pid;
        {
            let info = child.info_mut();
            info.priority = current.proc().priority();
            info.state = Procstate::Runnable;
        }

        let parent_ptr = current.raw() as *const Proc<H>;
        let mut wl_guard = child.proc().lock_parent();
        child.proc().set_parent_of(&mut wl_guard, parent_ptr);

        Ok(child_pid)
    }

    /// Marks every `SLEEPING` slot waiting on `channel` `RUNNABLE`. Under
    /// the dynamic-multilevel policy, also resets its priority to the
    /// highest level (spec.md §4.3: "reset priority to 3 on wake").
    /// Holding the table lock is not required here: each slot's own `info`
    /// lock is acquired per-iteration, matching xv6's table-wide `wakeup`
    /// which takes every slot's lock in turn rather than one global table
    /// lock (see DESIGN.md).
    ///
    /// Skips the calling CPU's own current process, exactly like the
    /// teacher's `wakeup_pool` (`if p.deref() as *const _ != current_proc`):
    /// a caller may legitimately invoke this while still holding its own
    /// slot's lock (e.g. `exit_current` waking its parent before it has
    /// released its own lock), and re-locking an already-held spinlock
    /// would trip `RawSpinLock::acquire`'s reentrancy assertion.
    pub fn wakeup(&self, channel: usize) {
        let current = unsafe { (*self.cpus.current_raw()).proc } as *const Proc<H>;
        for p in &self.process_pool {
            if core::ptr::eq(p as *const Proc<H>, current) {
                continue;
            }
            let mut guard = p.lock();
            if guard.info().state == Procstate::Sleeping && guard.info().chan as usize == channel
            {
                let info = guard.info_mut();
                info.state = Procstate::Runnable;
                info.chan = core::ptr::null();
                if crate::sched::policy::WAKE_RESETS_PRIORITY {
                    info.priority = crate::param::PRIO_MAX;
                }
            }
        }
    }

    /// Parks the calling process on `channel` until a matching `wakeup`.
    /// `guard` is the slot's own locked handle; it must already reflect
    /// the caller transitioning away from `RUNNING` before this is called,
    /// matching spec.md §4.3's `sleep` contract (step 3 happens in the
    /// caller, which then hands its `ProcGuard` in as `guard`).
    pub fn sleep(&self, guard: &mut ProcGuard<H>, channel: usize) {
        {
            let info = guard.info_mut();
            info.chan = channel as *const WaitChannel;
            info.state = Procstate::Sleeping;
        }
        let cpu = self.cpus.current_raw();
        unsafe { guard.sched(self.cpus, &mut (*cpu).context) };
        guard.info_mut().chan = core::ptr::null();
    }

    /// Sets `killed` and, if the target is sleeping, forces it `RUNNABLE`
    /// so it observes the flag on its next return to user mode (spec.md
    /// §4.3's `kill`).
    pub fn kill(&self, pid: i32) -> Result<(), KernelError> {
        for p in &self.process_pool {
            let mut guard = p.lock();
            if guard.info().pid != pid || guard.info().state == Procstate::Unused {
                continue;
            }
            drop(guard);
            p.kill();
            let mut guard = p.lock();
            if guard.info().state == Procstate::Sleeping {
                guard.info_mut().state = Procstate::Runnable;
            }
            return Ok(());
        }
        Err(KernelError::InvalidArgument)
    }

    /// Reassigns every slot whose parent is `of` to `initial_proc`, waking
    /// init if any reassigned child is already a `ZOMBIE` (spec.md §4.6's
    /// `exit`: "reparents children to init").
    fn reparent(&self, of: *const Proc<H>) {
        let initial = self.initial_proc();
        let mut wl_guard = self.process_pool[0].lock_parent();
        for p in &self.process_pool {
            if p.parent_of(&mut wl_guard) == of {
                p.set_parent_of(&mut wl_guard, initial as *const Proc<H>);
                let guard = p.lock();
                if guard.info().state == Procstate::Zombie {
                    drop(guard);
                    self.wakeup(initial.child_waitchannel());
                }
            }
        }
    }

    /// Closes every open file and the cwd, deletes any swap files still
    /// named for this process's pages (spec.md §4.5's "Lifecycle cleanup"),
    /// reparents children (waking init if any are already `ZOMBIE`), wakes
    /// the parent, marks self `ZOMBIE`, and never returns (spec.md §4.6's
    /// `exit`). Exiting the initial process is a fatal invariant violation.
    ///
    /// Deliberately does not lock its own slot until the very end (matching
    /// the teacher's `exit_current`, which only calls `ctx.proc().lock()`
    /// right before the `ZOMBIE` transition): the file close, reparenting,
    /// and parent wakeup below all run with the caller `RUNNING` and
    /// unlocked, which is both enough under invariant 1 of spec.md §3 (the
    /// owning CPU may touch its own private fields without the lock while
    /// `RUNNING`) and the only way to avoid two lock-order problems
    /// locking self up front would cause: `reparent`'s `wait_lock` would be
    /// acquired while already holding `info` (the reverse of `wait`'s
    /// `wait_lock`-then-`info` order), and `wakeup`'s table-wide scan would
    /// try to re-lock this slot's own still-held `info`.
    pub fn exit_current(
        &self,
        current: &CurrentProc<H>,
        fs: &H::FileSystem,
        swap: &SwapService<H>,
        xstate: i32,
    ) -> ! {
        let self_ptr = current.raw() as *const Proc<H>;
        assert!(
            self_ptr != self.initial_proc() as *const Proc<H>,
            "init exiting"
        );

        let pid = unsafe { &*self_ptr }.pid();

        fs.begin_op();
        let data = unsafe { &mut *(*self_ptr).data.get() };
        let max_vpn = data.size() / PGSIZE;
        data.close_files(fs);
        fs.end_op();

        daemon::delete_swapout_page_files(swap, fs, pid, max_vpn);

        self.reparent(self_ptr);

        let mut wl_guard = unsafe { &*self_ptr }.lock_parent();
        let parent = unsafe { &*self_ptr }.parent_of(&mut wl_guard);
        drop(wl_guard);
        if !parent.is_null() {
            self.wakeup(unsafe { &*parent }.child_waitchannel());
        }

        let mut guard = unsafe { &*self_ptr }.lock();
        {
            let info = guard.info_mut();
            info.xstate = xstate;
            info.state = Procstate::Zombie;
        }

        let cpu = self.cpus.current_raw();
        unsafe { guard.sched(self.cpus, &mut (*cpu).context) };
        unreachable!("a ZOMBIE process was rescheduled");
    }

    /// Repeatedly scans for a `ZOMBIE` child; on finding one, frees its
    /// memory, zeroes its slot, and returns its pid and stats (spec.md
    /// §4.6's `wait`/`waitstats`). Returns `NoChildren` if the caller has
    /// no children, or `Killed` if the caller is killed while waiting.
    pub fn wait(
        &self,
        current: &mut CurrentProc<H>,
        alloc: &H::Allocator,
    ) -> Result<ExitStats, KernelError> {
        let self_ptr = current.raw() as *const Proc<H>;
        loop {
            let mut have_children = false;
            {
                let mut wl_guard = self.process_pool[0].lock_parent();
                for p in &self.process_pool {
                    if p.parent_of(&mut wl_guard) != self_ptr {
                        continue;
                    }
                    have_children = true;

                    let mut guard = p.lock();
                    if guard.info().state != Procstate::Zombie {
                        continue;
                    }
                    let stats = ExitStats {
                        pid: guard.info().pid,
                        retime: guard.info().retime,
                        rutime: guard.info().rutime,
                        stime: guard.info().stime,
                        ctime: guard.info().ctime,
                    };
                    guard.free_memory(alloc);
                    guard.clear(Some(&mut wl_guard));
                    return Ok(stats);
                }
            }

            if !have_children || current.killed() {
                return Err(if have_children {
                    KernelError::Killed
                } else {
                    KernelError::NoChildren
                });
            }

            let mut guard = unsafe { &*self_ptr }.lock();
            self.sleep(&mut guard, current.proc().child_waitchannel());
        }
    }

    /// Voluntarily gives up the CPU: `RUNNING → RUNNABLE`, then calls
    /// `sched` (spec.md §4.4's `yield`). A timer interrupt that sees a
    /// `RUNNING` user process calls this; under the dynamic-multilevel
    /// policy the caller must call `dec_prio` first (spec.md §4.4: "Under
    /// DML it first decrements the running process's priority").
    pub fn proc_yield(&self, current: &CurrentProc<H>) {
        let mut guard = unsafe { &*current.raw() }.lock();
        guard.info_mut().state = Procstate::Runnable;
        let cpu = self.cpus.current_raw();
        unsafe { guard.sched(self.cpus, &mut (*cpu).context) };
    }

    /// Sleeps on `channel` while holding an unrelated lock `extra` instead
    /// of the slot's own lock (spec.md §4.3's `sleep(channel, extra_lock)`
    /// when `extra_lock` isn't the table lock): acquires the calling
    /// process's own slot lock first, then releases `extra`, so no wakeup
    /// racing in between the two can be missed; reacquires `extra` after
    /// resuming.
    ///
    /// # Safety
    /// Must be called with interrupts disabled and a current process set.
    pub unsafe fn sleep_releasing<W: Waitable>(&self, extra: &mut W, channel: usize) {
        let current = unsafe { self.current() }.expect("sleep with no current process");
        let mut guard = current.proc().lock();
        unsafe { extra.raw_release() };
        self.sleep(&mut guard, channel);
        drop(guard);
        unsafe { extra.raw_acquire() };
    }

    /// Sets the caller's priority. Returns `InvalidArgument` if `prio` is
    /// out of `{1,2,3}` (spec.md §4.6's `set_prio`).
    pub fn set_prio(&self, current: &Proc<H>, prio: u8) -> Result<(), KernelError> {
        if !(crate::param::PRIO_MIN..=crate::param::PRIO_MAX).contains(&prio) {
            return Err(KernelError::InvalidArgument);
        }
        let mut guard = current.lock();
        guard.info_mut().priority = prio;
        Ok(())
    }

    /// Decrements the caller's priority, clamped at the floor (spec.md
    /// §4.6's `dec_prio`, used by the DML timer path on quantum expiry).
    pub fn dec_prio(&self, current: &Proc<H>) {
        let mut guard = current.lock();
        let info = guard.info_mut();
        if info.priority > crate::param::PRIO_MIN {
            info.priority -= 1;
        }
    }

    /// Grows or shrinks the current process's address space by `delta`
    /// bytes and re-activates it (spec.md §4.6's `growproc`).
    pub fn resize(
        &self,
        current: &mut CurrentProc<H>,
        alloc: &H::Allocator,
        delta: isize,
    ) -> Result<usize, KernelError> {
        let data = current.data_mut();
        let space = data
            .address_space
            .as_mut()
            .expect("running process has an address space");
        let new_size = space.resize(delta, alloc)?;
        space.activate();
        Ok(new_size)
    }

    /// Iterates every non-`UNUSED` slot for the Ctrl-P debug dump (spec.md
    /// §6): pid, state, and name. Sleepers' call-stack walk is the
    /// embedder's responsibility since this crate does not know the frame
    /// layout of a concrete `Hal::AddressSpace`.
    pub fn dump(&self, mut visit: impl FnMut(i32, &str, &[u8; MAXPROCNAME])) {
        for p in &self.process_pool {
            let guard = p.lock();
            if guard.info().state == Procstate::Unused {
                continue;
            }
            let name = p.name;
            visit(guard.info().pid, guard.info().state.as_str(), &name);
        }
    }

    /// The process currently running on the calling CPU, or `None` if the
    /// CPU is in its scheduler loop.
    ///
    /// # Safety
    /// Must be called with interrupts disabled, or the result may already
    /// be stale by the time the caller inspects it (a timer interrupt
    /// could migrate/deschedule the process in between).
    pub unsafe fn current(&self) -> Option<CurrentProc<H>> {
        let cpu = self.cpus.current_raw();
        let ptr = unsafe { (*cpu).proc as *mut Proc<H> };
        if ptr.is_null() {
            None
        } else {
            Some(unsafe { CurrentProc::from_raw(ptr) })
        }
    }

    /// The per-CPU scheduler loop (spec.md §4.4): forever pick a `RUNNABLE`
    /// process via the active policy and context-switch into it. The
    /// switched-to process is responsible for releasing this slot's lock
    /// (`fork_return`/`sched`'s callers do so explicitly) and reacquiring
    /// it before switching back, so that by the time control returns here
    /// `guard`'s ordinary `Drop` releases the lock exactly once.
    pub fn scheduler_loop(&'static self) -> ! {
        let cpu = self.cpus.current_raw();
        unsafe {
            (*cpu).proc = core::ptr::null_mut();
        }
        loop {
            H::intr_on();

            let Some(p) = crate::sched::policy::select(&self.process_pool) else {
                continue;
            };
            let mut guard = p.lock();
            if guard.info().state != Procstate::Runnable {
                continue;
            }

            {
                let info = guard.info_mut();
                info.state = Procstate::Running;
                info.ticks_elapsed = 0;
            }
            unsafe {
                (*cpu).proc = guard.raw() as *mut ();
            }
            let data = unsafe { &mut *(*guard.raw() as *mut Proc<H>).data.get() };
            if let Some(space) = data.address_space.as_ref() {
                space.activate();
            }
            let proc_context = &mut data.context as *mut _;
            unsafe { H::switch(&mut (*cpu).context as *mut _, proc_context) };

            unsafe {
                (*cpu).proc = core::ptr::null_mut();
            }
        }
    }
}
