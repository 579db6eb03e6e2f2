//! The FIFO swap request queue (spec.md §3's **Swap queue**): a ring buffer
//! of capacity `NPROC+1` holding references to waiting process slots, its
//! own lock, and the two channel tokens requesters and the daemon
//! rendezvous on.
//!
//! Grounded on xv6's own bounded ring buffers (`src/fs/log.rs`
//! and the pipe buffer) and, like `proc::wait_channel`, on its "a channel is
//! any address used as a unique token" convention: the two `WaitChannel`s
//! below never carry data, only an address to compare against.

use crate::cpu::Cpus;
use crate::hal::Hal;
use crate::lock::{RawSpinLock, Spinlock};
use crate::param::SWAPQ_CAPACITY;
use crate::proc::{Proc, WaitChannel};

struct Ring<H: Hal> {
    slots: [*const Proc<H>; SWAPQ_CAPACITY],
    head: usize,
    len: usize,
}

// SAFETY: entries are bare addresses, never dereferenced by `Ring` itself;
// the `Spinlock` wrapping it provides the actual synchronization.
unsafe impl<H: Hal> Send for Ring<H> {}

impl<H: Hal> Ring<H> {
    const fn empty() -> Self {
        Self {
            slots: [core::ptr::null(); SWAPQ_CAPACITY],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, p: *const Proc<H>) {
        assert!(self.len < SWAPQ_CAPACITY, "swap queue overflow");
        let tail = (self.head + self.len) % SWAPQ_CAPACITY;
        self.slots[tail] = p;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<*const Proc<H>> {
        if self.len == 0 {
            return None;
        }
        let p = self.slots[self.head];
        self.head = (self.head + 1) % SWAPQ_CAPACITY;
        self.len -= 1;
        Some(p)
    }
}

/// One direction's request queue: swap-out or swap-in each own one.
pub struct SwapQueue<H: Hal> {
    ring: Spinlock<'static, H, Ring<H>>,

    /// The daemon sleeps here for "queue non-empty"; requesters broadcast it
    /// after enqueuing (spec.md §4.5).
    queue_channel: WaitChannel,
    /// Requesters sleep here for "my request completed"; the daemon
    /// broadcasts it once the queue drains (spec.md §4.5).
    request_channel: WaitChannel,
}

impl<H: Hal> SwapQueue<H> {
    pub fn new(cpus: &'static Cpus) -> Self {
        Self {
            ring: Spinlock::new(RawSpinLock::new(cpus), Ring::empty()),
            queue_channel: WaitChannel::new(),
            request_channel: WaitChannel::new(),
        }
    }

    pub fn queue_channel(&self) -> usize {
        self.queue_channel.token() as usize
    }

    pub fn request_channel(&self) -> usize {
        self.request_channel.token() as usize
    }

    pub fn push(&self, p: *const Proc<H>) {
        self.ring.lock().push(p);
    }

    pub fn pop(&self) -> Option<*const Proc<H>> {
        self.ring.lock().pop()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.lock().len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::NPROC;
    use crate::testing::{reset_interrupts, MockHal};
    use std::boxed::Box;

    #[test]
    fn fifo_order_is_preserved() {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let q: SwapQueue<MockHal> = SwapQueue::new(cpus);
        let a = 1usize as *const Proc<MockHal>;
        let b = 2usize as *const Proc<MockHal>;
        q.push(a);
        q.push(b);
        assert_eq!(q.pop(), Some(a));
        assert_eq!(q.pop(), Some(b));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn capacity_matches_nproc_plus_one() {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let q: SwapQueue<MockHal> = SwapQueue::new(cpus);
        for i in 0..SWAPQ_CAPACITY {
            q.push((i + 1) as *const Proc<MockHal>);
        }
        assert_eq!(SWAPQ_CAPACITY, NPROC + 1);
    }

    #[test]
    fn distinct_queues_have_distinct_channel_tokens() {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let out: SwapQueue<MockHal> = SwapQueue::new(cpus);
        let inq: SwapQueue<MockHal> = SwapQueue::new(cpus);
        assert_ne!(out.queue_channel(), inq.queue_channel());
        assert_ne!(out.request_channel(), inq.request_channel());
        assert_ne!(out.queue_channel(), out.request_channel());
    }
}
