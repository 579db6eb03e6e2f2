//! The four build-time-selectable next-process selectors (spec.md §4.4.1).
//! Exactly one `policy-*` Cargo feature is enabled at a time (enforced in
//! `lib.rs`); `select` dispatches to whichever one is compiled in so
//! `Procs::scheduler_loop` never has to know which policy it's running.
//!
//! Grounded on xv6's own build-time arch selection
//! (`cfg_if!` over target-feature flags in `src/arch/mod.rs`) for the
//! dispatch shape, and on the RISC-V xv6 redesign's per-slot locking for
//! why each selector only *peeks* `state`/`priority`/`ctime` instead of
//! locking every slot during the scan — the caller locks the winner itself
//! and rechecks its state before dispatching it (see `Procs::scheduler_loop`).

use core::sync::atomic::{AtomicUsize, Ordering};

use cfg_if::cfg_if;

use crate::hal::Hal;
use crate::param::{NPROC, PRIO_MAX, PRIO_MIN};
use crate::proc::{Proc, Procstate};

/// Whether a process waking from sleep is promoted to the highest priority
/// (spec.md §4.3: "Under the DML policy additionally reset priority to 3 on
/// wake"). Only true under the dynamic-multilevel policy.
pub const WAKE_RESETS_PRIORITY: bool = cfg!(feature = "policy-dml");

/// Picks the next `RUNNABLE` slot to dispatch under whichever policy this
/// build selected, or `None` if no slot is currently runnable. Does not
/// lock any slot; `Procs::scheduler_loop` locks the winner and rechecks its
/// state before committing to it, since it may have changed between this
/// peek and the lock.
pub fn select<H: Hal>(pool: &[Proc<H>]) -> Option<&Proc<H>> {
    cfg_if! {
        if #[cfg(feature = "policy-fcfs")] {
            select_fcfs(pool)
        } else if #[cfg(feature = "policy-sml")] {
            select_multilevel(pool, &SML_CURSORS)
        } else if #[cfg(feature = "policy-dml")] {
            select_multilevel(pool, &DML_CURSORS)
        } else {
            select_default(pool)
        }
    }
}

/// **DEFAULT (round-robin):** a single cursor advancing through the table
/// once per call, dispatching the first `RUNNABLE` slot found from it
/// (spec.md §4.4.1).
fn select_default<H: Hal>(pool: &[Proc<H>]) -> Option<&Proc<H>> {
    static CURSOR: AtomicUsize = AtomicUsize::new(0);
    let start = CURSOR.load(Ordering::Relaxed) % NPROC;
    for offset in 0..NPROC {
        let idx = (start + offset) % NPROC;
        if pool[idx].state() == Procstate::Runnable {
            CURSOR.store((idx + 1) % NPROC, Ordering::Relaxed);
            return Some(&pool[idx]);
        }
    }
    None
}

/// **FCFS:** the `RUNNABLE` slot with the smallest `ctime`, ties broken by
/// slot index (spec.md §4.4.1).
fn select_fcfs<H: Hal>(pool: &[Proc<H>]) -> Option<&Proc<H>> {
    let mut best: Option<(u32, usize)> = None;
    for (idx, p) in pool.iter().enumerate() {
        if p.state() != Procstate::Runnable {
            continue;
        }
        let ctime = p.ctime();
        match best {
            Some((best_ctime, _)) if ctime >= best_ctime => {}
            _ => best = Some((ctime, idx)),
        }
    }
    best.map(|(_, idx)| &pool[idx])
}

/// Three independent round-robin cursors, one per priority level, shared by
/// SML and DML (spec.md §9, Open Question (a): the two policies contain
/// textually identical selection logic, so this crate implements it once
/// and lets `WAKE_RESETS_PRIORITY`/`dec_prio` at the call sites be the only
/// behavioral difference between them).
struct LevelCursors {
    p1: AtomicUsize,
    p2: AtomicUsize,
    p3: AtomicUsize,
}

impl LevelCursors {
    const fn new() -> Self {
        Self {
            p1: AtomicUsize::new(0),
            p2: AtomicUsize::new(0),
            p3: AtomicUsize::new(0),
        }
    }

    fn cursor(&self, priority: u8) -> &AtomicUsize {
        match priority {
            3 => &self.p3,
            2 => &self.p2,
            _ => &self.p1,
        }
    }
}

static SML_CURSORS: LevelCursors = LevelCursors::new();
static DML_CURSORS: LevelCursors = LevelCursors::new();

/// **SML/DML:** starting at priority 3, scan `NPROC` slots from that
/// priority's cursor; the first `RUNNABLE` match at that priority wins and
/// advances the cursor past it. If none at priority 3, try 2, then 1
/// (spec.md §4.4.1). Priority itself is never changed here — `set_prio`,
/// `dec_prio`, and wake-promotion under DML are the only things that move
/// a process between levels.
fn select_multilevel<'p, H: Hal>(pool: &'p [Proc<H>], cursors: &LevelCursors) -> Option<&'p Proc<H>> {
    for priority in (PRIO_MIN..=PRIO_MAX).rev() {
        let cursor = cursors.cursor(priority);
        let start = cursor.load(Ordering::Relaxed) % NPROC;
        for offset in 0..NPROC {
            let idx = (start + offset) % NPROC;
            let p = &pool[idx];
            if p.state() == Procstate::Runnable && p.priority() == priority {
                cursor.store((idx + 1) % NPROC, Ordering::Relaxed);
                return Some(p);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpus;
    use crate::testing::{reset_interrupts, MockHal};
    use std::boxed::Box;

    fn pool() -> (&'static Cpus, [Proc<MockHal>; NPROC]) {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        (cpus, array_macro::array![_ => Proc::zero(cpus); NPROC])
    }

    #[test]
    fn fcfs_picks_smallest_ctime_with_index_tiebreak() {
        let (_cpus, pool_slots) = pool();
        for (idx, ctime) in [(0usize, 12u32), (1, 10), (2, 10)] {
            let mut guard = pool_slots[idx].lock();
            guard.info_mut().state = Procstate::Runnable;
            guard.info_mut().ctime = ctime;
            guard.info_mut().pid = idx as i32 + 1;
        }
        let winner = select_fcfs(&pool_slots).expect("a runnable process exists");
        assert_eq!(winner.ctime(), 10);
        assert_eq!(winner.pid(), 2);
    }

    #[test]
    fn multilevel_prefers_highest_priority() {
        let (_cpus, pool_slots) = pool();
        {
            let mut guard = pool_slots[0].lock();
            guard.info_mut().state = Procstate::Runnable;
            guard.info_mut().priority = 1;
            guard.info_mut().pid = 1;
        }
        {
            let mut guard = pool_slots[1].lock();
            guard.info_mut().state = Procstate::Runnable;
            guard.info_mut().priority = 3;
            guard.info_mut().pid = 2;
        }
        let cursors = LevelCursors::new();
        let winner = select_multilevel(&pool_slots, &cursors).expect("a runnable process exists");
        assert_eq!(winner.pid(), 2);
    }

    #[test]
    fn multilevel_round_robins_within_a_level() {
        let (_cpus, pool_slots) = pool();
        for idx in [0usize, 1] {
            let mut guard = pool_slots[idx].lock();
            guard.info_mut().state = Procstate::Runnable;
            guard.info_mut().priority = 2;
            guard.info_mut().pid = idx as i32 + 1;
        }
        let cursors = LevelCursors::new();
        let first = select_multilevel(&pool_slots, &cursors).expect("runnable").pid();
        let second = select_multilevel(&pool_slots, &cursors).expect("runnable").pid();
        assert_ne!(first, second);
    }

    #[test]
    fn default_round_robin_visits_every_runnable_slot() {
        let (_cpus, pool_slots) = pool();
        for idx in [3usize, 7] {
            let mut guard = pool_slots[idx].lock();
            guard.info_mut().state = Procstate::Runnable;
            guard.info_mut().pid = idx as i32 + 1;
        }
        let first = select_default(&pool_slots).expect("runnable").pid();
        let second = select_default(&pool_slots).expect("runnable").pid();
        assert_ne!(first, second);
    }

    #[test]
    fn select_returns_none_when_nothing_runnable() {
        let (_cpus, pool_slots) = pool();
        assert!(select_default(&pool_slots).is_none());
    }
}
