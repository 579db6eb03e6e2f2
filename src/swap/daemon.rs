//! The two paging daemons (spec.md §4.5): `swapout_daemon_loop` evicts
//! pages to satisfy `request_swap_out` callers, `swapin_daemon_loop`
//! restores pages for `handle_page_fault` callers. Both are plain kernel
//! threads started by `fork_return`'s one-time init, found later by name
//! (spec.md §9, Open Question (b)) rather than a hard-coded pid.
//!
//! Grounded on xv6's kernel-thread daemons (the log's
//! background writeback thread in `src/fs/log.rs` is the closest analogue
//! in the pack: sleep on a condition, drain a queue, signal completion).

use crate::hal::{AddressSpace, BlockFile, Hal};
use crate::param::PGSIZE;
use crate::proc::{Procstate, Procs};

use super::classify::{find_victim, Victim};
use super::codec::file_name;
use super::SwapService;

/// Evicts one victim page: stashes its `(state, chan)`, forces it
/// `SLEEPING` on a null channel so it cannot run or be woken, reads and
/// marks its page swapped-out while still locked, writes the page to its
/// swap file with the locks dropped, then reacquires the slot to free the
/// frame, flush the TLB, and restore the victim (spec.md §4.5's "Eviction
/// of a victim").
fn evict<H: Hal>(
    service: &SwapService<H>,
    fs: &H::FileSystem,
    alloc: &H::Allocator,
    victim: Victim<H>,
) {
    let Victim { mut guard, vpn } = victim;
    let ptr = guard.raw();

    let pid = guard.info().pid;
    let saved_state = guard.info().state;
    let saved_chan = guard.info().chan;
    {
        let info = guard.info_mut();
        info.state = Procstate::Sleeping;
        info.chan = core::ptr::null();
    }

    let mut page = [0u8; PGSIZE];
    let frame = {
        let data = unsafe { &mut *guard.data.get() };
        let space = data
            .address_space
            .as_mut()
            .expect("victim has an address space");
        space.read_page(vpn, &mut page);
        space.mark_swapped_out(vpn)
    };

    service.reserve_file();
    drop(guard);

    fs.begin_op();
    let name = file_name(pid, vpn);
    let handle = fs.create(name.as_str()).expect("swap file create");
    fs.write(handle, 0, &page).expect("swap file write");
    fs.close(handle);
    fs.end_op();

    let mut guard = unsafe { &*ptr }.lock();
    alloc.free_frame(frame);
    {
        let data = unsafe { &mut *guard.data.get() };
        if let Some(space) = data.address_space.as_ref() {
            space.flush_tlb();
        }
    }
    {
        let info = guard.info_mut();
        info.state = saved_state;
        info.chan = saved_chan;
    }
}

/// The swap-out daemon's body (spec.md §4.5): sleep on the queue channel;
/// when woken, drain the queue one requester at a time, evicting a
/// system-wide victim (not necessarily the requester's own page) for each;
/// on quota pressure or no victim found, broadcast the request channel and
/// yield rather than block, retrying after the next reschedule.
pub fn swapout_daemon_loop<H: Hal>(
    procs: &'static Procs<H>,
    service: &'static SwapService<H>,
    fs: &'static H::FileSystem,
    alloc: &'static H::Allocator,
) -> ! {
    let current = unsafe { procs.current() }.expect("daemon has a current process");
    loop {
        while service.out_queue.is_empty() {
            let mut guard = unsafe { &*current.raw() }.lock();
            procs.sleep(&mut guard, service.out_queue.queue_channel());
        }

        while !service.out_queue.is_empty() {
            if service.quota_exhausted() {
                procs.wakeup(service.out_queue.request_channel());
                procs.proc_yield(&current);
                continue;
            }

            let victim = find_victim(procs.process_pool());
            let Some(victim) = victim else {
                procs.wakeup(service.out_queue.request_channel());
                procs.proc_yield(&current);
                continue;
            };

            evict(service, fs, alloc, victim);

            if let Some(requester) = service.out_queue.pop() {
                let mut guard = unsafe { &*requester }.lock();
                guard.info_mut().satisfied = true;
            }
        }

        procs.wakeup(service.out_queue.request_channel());
    }
}

/// The swap-in daemon's body (spec.md §4.5): sleep on the queue channel;
/// drain the queue by reading each requester's page off its swap file,
/// installing the frame, deleting the file, and waking the requester. The
/// quota counter is decremented on each successful swap-in.
pub fn swapin_daemon_loop<H: Hal>(
    procs: &'static Procs<H>,
    service: &'static SwapService<H>,
    fs: &'static H::FileSystem,
    alloc: &'static H::Allocator,
) -> ! {
    let current = unsafe { procs.current() }.expect("daemon has a current process");
    loop {
        while service.in_queue.is_empty() {
            let mut guard = unsafe { &*current.raw() }.lock();
            procs.sleep(&mut guard, service.in_queue.queue_channel());
        }

        while let Some(requester) = service.in_queue.pop() {
            let (pid, vpn) = {
                let guard = unsafe { &*requester }.lock();
                let vpn = guard.info().trapva / PGSIZE;
                (guard.info().pid, vpn)
            };

            let frame = alloc.alloc_frame().expect("swap-in out of frames");
            let mut page = [0u8; PGSIZE];
            fs.begin_op();
            let name = file_name(pid, vpn);
            let handle = fs.open(name.as_str()).expect("swap file open");
            fs.read(handle, 0, &mut page).expect("swap file read");
            fs.close(handle);
            fs.unlink(name.as_str()).expect("swap file unlink");
            fs.end_op();

            let mut guard = unsafe { &*requester }.lock();
            {
                let data = unsafe { &mut *guard.data.get() };
                if let Some(space) = data.address_space.as_mut() {
                    space.install_swapped_in(vpn, frame);
                    space.write_page(vpn, &page);
                }
            }
            drop(guard);

            service.release_file();
            procs.wakeup(pid as usize);
        }
    }
}

/// Deletes every swap file still named for `pid`'s pages, for the
/// lifecycle cleanup of spec.md §4.5: "any swap files still named for its
/// descriptors ... are deleted and their file handles released" when a
/// user process whose parent is the shell exits. `max_vpn` bounds the scan
/// since swap files are identified by `(pid, vpn)` rather than listed.
pub fn delete_swapout_page_files<H: Hal>(service: &SwapService<H>, fs: &H::FileSystem, pid: i32, max_vpn: usize) {
    fs.begin_op();
    for vpn in 0..max_vpn {
        let name = file_name(pid, vpn);
        if fs.unlink(name.as_str()).is_ok() {
            service.release_file();
        }
    }
    fs.end_op();
}
