//! The system-call dispatcher's adapter layer (spec.md §1: "in scope only
//! as a thin adapter that exposes the operations defined in §4"; spec.md
//! §6's syscall surface). Each `sys_*` function forwards straight into the
//! lifecycle/scheduler/swap operations of §4 with no business logic of its
//! own; argument decoding for user pointers goes through
//! `hal::AddressSpace::copy_in`/`copy_out`, the boundary spec.md §1 assigns
//! to the (out-of-scope) page-table walker.
//!
//! Grounded on xv6's `sysproc.rs` (one `sys_*` function per
//! number, each a few lines forwarding into `proc.rs`/`vm.rs`) and
//! `syscall.rs`'s argument-decoding helpers, generalized over `Hal` in the
//! same way every other module in this crate is.

use crate::console;
use crate::error::KernelError;
use crate::hal::{AddressSpace, Hal};
use crate::kernel::Kernel;
use crate::proc::CurrentProc;

/// `fork` (spec.md §6): allocates a child sharing `current`'s priority,
/// address space copy, open files and cwd, and marks it `RUNNABLE`. The
/// child's context resumes at [`crate::sched::fork_return`], exactly like
/// every other process this crate ever allocates (spec.md §4.2).
pub fn sys_fork<H: Hal>(kernel: &'static Kernel<H>, current: &mut CurrentProc<H>) -> isize {
    match kernel
        .procs
        .fork(current, &kernel.allocator, crate::sched::fork_return::<H>)
    {
        Ok(pid) => pid as isize,
        Err(e) => e.to_retval(),
    }
}

/// `exit` (spec.md §6): closes files, reparents children, wakes the
/// parent, marks self `ZOMBIE`, and never returns (spec.md §4.6).
pub fn sys_exit<H: Hal>(kernel: &'static Kernel<H>, current: &CurrentProc<H>, xstate: i32) -> ! {
    kernel
        .procs
        .exit_current(current, &kernel.file_system, &kernel.swap, xstate)
}

/// `wait` (spec.md §6): reaps one `ZOMBIE` child and returns its pid, or
/// `-1` if the caller has no children or is killed (spec.md §4.6).
pub fn sys_wait<H: Hal>(kernel: &Kernel<H>, current: &mut CurrentProc<H>) -> isize {
    match kernel.procs.wait(current, &kernel.allocator) {
        Ok(stats) => stats.pid as isize,
        Err(_) => -1,
    }
}

/// `wait2(retime*, rutime*, stime*, ctime*)` (spec.md §6): like `wait`, but
/// additionally copies the reaped child's timing stats into four
/// caller-supplied user pointers (`0` for any the caller doesn't want).
/// Returns the reaped pid, or `-1` on the same conditions as `wait`, or if
/// any non-zero pointer is invalid.
pub fn sys_wait2<H: Hal>(
    kernel: &Kernel<H>,
    current: &mut CurrentProc<H>,
    retime_va: usize,
    rutime_va: usize,
    stime_va: usize,
    ctime_va: usize,
) -> isize {
    let stats = match kernel.procs.wait(current, &kernel.allocator) {
        Ok(stats) => stats,
        Err(_) => return -1,
    };

    let space = current
        .data_mut()
        .address_space
        .as_mut()
        .expect("running process has an address space");
    let fields = [
        (retime_va, stats.retime),
        (rutime_va, stats.rutime),
        (stime_va, stats.stime),
        (ctime_va, stats.ctime),
    ];
    for (va, value) in fields {
        if va != 0 && space.copy_in(va, &value.to_ne_bytes()).is_err() {
            return KernelError::InvalidArgument.to_retval();
        }
    }
    stats.pid as isize
}

/// `kill(pid)` (spec.md §6): marks `pid` killed, forcing it `RUNNABLE` if
/// it was sleeping (spec.md §4.3).
pub fn sys_kill<H: Hal>(kernel: &Kernel<H>, pid: i32) -> isize {
    match kernel.procs.kill(pid) {
        Ok(()) => 0,
        Err(e) => e.to_retval(),
    }
}

/// `getpid` (spec.md §6). Reads the caller's own `pid` without locking: the
/// calling CPU is the only writer of its own current process's identity
/// fields while it's `RUNNING` (spec.md §3, invariant 1).
pub fn sys_getpid<H: Hal>(current: &CurrentProc<H>) -> isize {
    unsafe { &*current.raw() }.pid() as isize
}

/// `sbrk(n)` (spec.md §6): grows or shrinks the caller's address space by
/// `n` bytes (spec.md §4.6's `growproc`), returning the size *before* the
/// change, or `-1` on failure.
pub fn sys_sbrk<H: Hal>(kernel: &Kernel<H>, current: &mut CurrentProc<H>, n: isize) -> isize {
    let old_size = current.data().size();
    match kernel.procs.resize(current, &kernel.allocator, n) {
        Ok(_) => old_size as isize,
        Err(e) => e.to_retval(),
    }
}

/// `sleep(n_ticks)` (spec.md §6): blocks the caller until `n_ticks` timer
/// ticks have elapsed, checking `killed` on every wakeup (spec.md §7:
/// "syscalls that may sleep check `killed` before and after waking").
/// Negative `n_ticks` is an invalid argument.
pub fn sys_sleep<H: Hal>(kernel: &Kernel<H>, current: &CurrentProc<H>, n_ticks: i32) -> isize {
    if n_ticks < 0 {
        return KernelError::InvalidArgument.to_retval();
    }
    let target = kernel.procs.ticks() + n_ticks as usize;
    while kernel.procs.ticks() < target {
        if current.killed() {
            return KernelError::Killed.to_retval();
        }
        let mut guard = unsafe { &*current.raw() }.lock();
        kernel.procs.sleep(&mut guard, kernel.procs.ticks_channel());
    }
    0
}

/// `uptime` (spec.md §6): the global tick count.
pub fn sys_uptime<H: Hal>(kernel: &Kernel<H>) -> isize {
    kernel.procs.ticks() as isize
}

/// `set_prio(p)` (spec.md §6, §4.6): `0` on success, non-zero if `p` is out
/// of `{1,2,3}`.
pub fn sys_set_prio<H: Hal>(kernel: &Kernel<H>, current: &CurrentProc<H>, prio: u8) -> isize {
    match kernel.procs.set_prio(unsafe { &*current.raw() }, prio) {
        Ok(()) => 0,
        Err(e) => e.to_retval(),
    }
}

/// `yield` (spec.md §6): voluntarily gives up the CPU (spec.md §4.4).
pub fn sys_yield<H: Hal>(kernel: &Kernel<H>, current: &CurrentProc<H>) -> isize {
    kernel.procs.proc_yield(current);
    0
}

/// `draw(buf, size)` (spec.md §6): copies the fixed ASCII banner into a
/// user buffer. Returns the number of bytes copied, or `-1` if `size` is
/// too small or `buf` is not a valid user address.
pub fn sys_draw<H: Hal>(current: &mut CurrentProc<H>, buf_va: usize, size: usize) -> isize {
    if size < console::BANNER.len() {
        return -1;
    }
    let space = current
        .data_mut()
        .address_space
        .as_mut()
        .expect("running process has an address space");
    match space.copy_in(buf_va, console::BANNER) {
        Ok(()) => console::BANNER.len() as isize,
        Err(_) => -1,
    }
}

/// `history(buf, id)` (spec.md §6): copies the command recorded at ring
/// slot `id` into a user buffer. `0` on success, `1` if no such slot has
/// been recorded, `2` if `id` is out of range, or `-1` if `buf` is not a
/// valid user address.
pub fn sys_history<H: Hal>(kernel: &Kernel<H>, current: &mut CurrentProc<H>, buf_va: usize, id: usize) -> isize {
    match kernel.history.get(id) {
        Ok(cmd) => {
            let space = current
                .data_mut()
                .address_space
                .as_mut()
                .expect("running process has an address space");
            let mut bytes = [0u8; crate::param::HISTORY_CMD_LEN + 1];
            let n = cmd.len().min(crate::param::HISTORY_CMD_LEN);
            bytes[..n].copy_from_slice(&cmd.as_bytes()[..n]);
            match space.copy_in(buf_va, &bytes[..n + 1]) {
                Ok(()) => 0,
                Err(_) => -1,
            }
        }
        Err(code) => code as isize,
    }
}
