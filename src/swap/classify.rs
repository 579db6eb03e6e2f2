//! Access/dirty victim classification (spec.md §4.5's "simplified NRU").
//!
//! Grounded on xv6's page-replacement notes and its general
//! pattern of peeking every slot's lock in turn rather than holding one
//! giant table lock (`src/proc.rs`'s `wakeup`/dump loops): the victim scan
//! below takes each candidate's own slot lock only long enough to read its
//! address space, then re-locks the eventual winner to hand back to the
//! eviction routine in `swap::daemon`.

use crate::hal::{AddressSpace, Hal, Vpn};
use crate::proc::{Proc, ProcGuard, Procstate};

/// Maps a page's (accessed, dirty) bits into spec.md §4.5's 4-way class:
/// 0 for `(A=0,D=0)`, 3 for `(A=0,D=1)`, 2 for `(A=1,D=0)`, 1 for
/// `(A=1,D=1)` — classes 1 and 2 are swapped from binary order to invert
/// their eviction priority, per spec.md's explicit note.
pub fn class_of(accessed: bool, dirty: bool) -> usize {
    match (accessed, dirty) {
        (false, false) => 0,
        (true, true) => 1,
        (true, false) => 2,
        (false, true) => 3,
    }
}

fn is_eligible(state: Procstate) -> bool {
    !matches!(
        state,
        Procstate::Unused | Procstate::Running | Procstate::Embryo
    )
}

/// A swap-out candidate: a locked victim process and the page to evict
/// from it. Holding `guard` keeps the victim from running or being woken
/// until the eviction routine restores its state, per spec.md §4.5.
pub struct Victim<H: Hal> {
    pub guard: ProcGuard<H>,
    pub vpn: Vpn,
}

/// Scans the whole process table for the lowest-numbered non-empty
/// access/dirty class among every present user page above the first page,
/// considering only non-kernel (TODO: no kernel/user distinction exists at
/// this layer, so every slot is a candidate), non-`RUNNING`, non-`EMBRYO`
/// process (spec.md §4.5). Returns the winner locked; every other
/// candidate's lock is released before returning.
pub fn find_victim<H: Hal>(pool: &[Proc<H>]) -> Option<Victim<H>> {
    let mut candidates: [Option<(usize, Vpn)>; 4] = [None; 4];

    for (slot_idx, p) in pool.iter().enumerate() {
        let guard = p.lock();
        if !is_eligible(guard.info().state) {
            continue;
        }
        let data = unsafe { &*p.data.get() };
        let Some(space) = data.address_space.as_ref() else {
            continue;
        };
        let mut best_vpn_per_class: [Option<Vpn>; 4] = [None; 4];
        space.for_each_present_page(&mut |vpn, accessed, dirty| {
            let class = class_of(accessed, dirty);
            if best_vpn_per_class[class].is_none() {
                best_vpn_per_class[class] = Some(vpn);
            }
        });
        drop(guard);
        for (class, slot) in best_vpn_per_class.into_iter().enumerate() {
            if candidates[class].is_none() {
                if let Some(vpn) = slot {
                    candidates[class] = Some((slot_idx, vpn));
                }
            }
        }
    }

    for (slot_idx, vpn) in candidates.into_iter().flatten() {
        let guard = pool[slot_idx].lock();
        // Re-check: another CPU may have changed this slot's state between
        // the scan above and this re-lock.
        if !is_eligible(guard.info().state) {
            continue;
        }
        return Some(Victim { guard, vpn });
    }
    None
}
