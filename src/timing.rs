//! Per-tick timing bookkeeping (spec.md §2's "Timing bookkeeper" row, §3,
//! §4.1): `retime`/`rutime`/`stime` track, in ticks, how long each process
//! has spent `RUNNABLE`/`RUNNING`/`SLEEPING` respectively. Together with
//! `ctime` they satisfy spec.md §8's invariant that their sum equals the
//! number of ticks a process has existed outside `EMBRYO`/`ZOMBIE`.
//!
//! Grounded on xv6's per-tick `Procs::tick` sweep
//! (`src/proc/procs.rs`), which already walks the whole table once per
//! timer interrupt to serve `sleep(n)` wakeups; this module adds the
//! matching per-slot counter bump to that same walk rather than a second
//! one, mirroring how `wakeup`'s scan and `dump`'s scan each do one pass
//! over `process_pool()`.

use crate::hal::Hal;
use crate::proc::{Procs, Procstate};

/// Bumps the counter matching each non-`UNUSED` slot's current state
/// (spec.md §4.1: "Per-tick update of `retime`/`rutime`/`stime` from
/// process state"). `EMBRYO` and `ZOMBIE` are excluded, matching spec.md
/// §8's invariant ("minus ticks in EMBRYO/ZOMBIE").
pub fn update_timing<H: Hal>(procs: &Procs<H>) {
    for p in procs.process_pool() {
        let mut guard = p.lock();
        match guard.info().state {
            Procstate::Runnable => guard.info_mut().retime += 1,
            Procstate::Running => guard.info_mut().rutime += 1,
            Procstate::Sleeping => guard.info_mut().stime += 1,
            Procstate::Unused | Procstate::Embryo | Procstate::Zombie => {}
        }
    }
}

/// The embedder's single timer-interrupt entry point for everything this
/// crate does per tick: bump the global tick counter and wake `sleep(n)`
/// waiters (`Procs::tick`), then update every slot's timing counters.
/// Separate from `sched::timer_interrupt`, which only decides whether the
/// *currently running* process should yield — this runs regardless of
/// whether a process is running at all, since `RUNNABLE` and `SLEEPING`
/// processes accrue time too.
pub fn on_timer_tick<H: Hal>(procs: &Procs<H>) {
    procs.tick();
    update_timing(procs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpus;
    use crate::proc::Procstate;
    use crate::testing::{reset_interrupts, MockHal};
    use std::boxed::Box;

    fn setup() -> &'static Procs<MockHal> {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let procs: &'static Procs<MockHal> = Box::leak(Box::new(Procs::new(cpus)));
        procs.init();
        procs
    }

    #[test]
    fn running_slot_accrues_rutime() {
        let procs = setup();
        let mut guard = procs.process_pool()[0].lock();
        guard.info_mut().state = Procstate::Running;
        guard.info_mut().pid = 1;
        drop(guard);

        update_timing(procs);
        update_timing(procs);

        let guard = procs.process_pool()[0].lock();
        assert_eq!(guard.info().rutime, 2);
        assert_eq!(guard.info().retime, 0);
        assert_eq!(guard.info().stime, 0);
    }

    #[test]
    fn runnable_and_sleeping_slots_accrue_their_own_counters() {
        let procs = setup();
        {
            let mut guard = procs.process_pool()[0].lock();
            guard.info_mut().state = Procstate::Runnable;
            guard.info_mut().pid = 1;
        }
        {
            let mut guard = procs.process_pool()[1].lock();
            guard.info_mut().state = Procstate::Sleeping;
            guard.info_mut().pid = 2;
        }

        update_timing(procs);

        assert_eq!(procs.process_pool()[0].lock().info().retime, 1);
        assert_eq!(procs.process_pool()[1].lock().info().stime, 1);
    }

    #[test]
    fn unused_embryo_and_zombie_slots_never_accrue() {
        let procs = setup();
        for state in [Procstate::Unused, Procstate::Embryo, Procstate::Zombie] {
            let mut guard = procs.process_pool()[0].lock();
            guard.info_mut().state = state;
            guard.info_mut().pid = if state == Procstate::Unused { 0 } else { 1 };
            drop(guard);

            update_timing(procs);

            let guard = procs.process_pool()[0].lock();
            assert_eq!(guard.info().retime, 0);
            assert_eq!(guard.info().rutime, 0);
            assert_eq!(guard.info().stime, 0);
        }
    }

    #[test]
    fn on_timer_tick_bumps_ticks_and_timing_together() {
        let procs = setup();
        let mut guard = procs.process_pool()[0].lock();
        guard.info_mut().state = Procstate::Running;
        guard.info_mut().pid = 1;
        drop(guard);

        let before = procs.ticks();
        on_timer_tick(procs);

        assert_eq!(procs.ticks(), before + 1);
        assert_eq!(procs.process_pool()[0].lock().info().rutime, 1);
    }
}
