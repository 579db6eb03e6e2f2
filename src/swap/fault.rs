//! The requester side of both swap queues: `request_swap_out`, called when
//! a frame must be freed, and `handle_page_fault`, the fault handler hook
//! of spec.md §2's component table ("on page-not-present with 'swapped' bit
//! set, enqueue request and block").
//!
//! Grounded on xv6's trap-handling split between the trap
//! vector (out of scope here, per spec.md §1) and the page-fault policy
//! code it calls into — this module is the policy half.

use crate::hal::{AddressSpace, Hal};
use crate::param::PGSIZE;
use crate::proc::{CurrentProc, Procs};

use super::queue::SwapQueue;

/// Asks the swap-out daemon to free a frame, blocking until it has (spec.md
/// §4.5's `request_swap_out`). The daemon may evict any process's page, not
/// necessarily the caller's own — this only asks that *a* frame be freed.
///
/// Spec.md's wording acquires the table lock and the queue lock together
/// before enqueuing; this crate's per-slot locking (see DESIGN.md) makes
/// that impossible without self-deadlocking `Procs::wakeup`, which relocks
/// every slot including the caller's, so the caller's own lock is dropped
/// before the queue push and the broadcast.
pub fn request_swap_out<H: Hal>(procs: &Procs<H>, out_queue: &SwapQueue<H>, current: &CurrentProc<H>) {
    {
        let mut guard = unsafe { &*current.raw() }.lock();
        guard.info_mut().satisfied = false;
    }
    out_queue.push(current.raw());
    procs.wakeup(out_queue.queue_channel());

    loop {
        let mut guard = unsafe { &*current.raw() }.lock();
        if guard.info().satisfied {
            return;
        }
        procs.sleep(&mut guard, out_queue.request_channel());
    }
}

/// Services a page fault on a swapped-out page: records the faulting
/// address, enqueues on the swap-in queue, and blocks until the in-daemon
/// has restored the page (spec.md §4.5's swap-in protocol).
pub fn handle_page_fault<H: Hal>(
    procs: &Procs<H>,
    in_queue: &SwapQueue<H>,
    current: &CurrentProc<H>,
    fault_va: usize,
) {
    let vpn = fault_va / PGSIZE;
    let pid = unsafe { &*current.raw() }.pid();
    {
        let mut guard = unsafe { &*current.raw() }.lock();
        guard.info_mut().trapva = fault_va;
    }
    in_queue.push(current.raw());
    procs.wakeup(in_queue.queue_channel());

    loop {
        let still_swapped = current
            .data()
            .address_space
            .as_ref()
            .map(|space| space.is_swapped_out(vpn))
            .unwrap_or(false);
        if !still_swapped {
            return;
        }
        let mut guard = unsafe { &*current.raw() }.lock();
        procs.sleep(&mut guard, pid as usize);
    }
}
