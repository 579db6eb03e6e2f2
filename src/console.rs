//! Formatted kernel output and the auxiliary debug-facing syscalls of
//! spec.md §6: the `print!`/`println!` macro pair, a `klog!` tracing
//! wrapper, the Ctrl-P process-list dump, the `draw` banner, and the
//! `history` command ring.
//!
//! Grounded on xv6's `Printer`/`printf` split
//! (`src/printer.rs`, `src/printf.rs`): a zero-sized `Printer` implementing
//! `core::fmt::Write` by pushing bytes one at a time to whatever sink is
//! registered, behind a lock so concurrent `println!`s don't interleave.
//! This crate has no real UART (out of scope per spec.md §1), so the sink
//! is a trait object an embedder registers once at boot, the same
//! type-erased-singleton shape `kernel::Kernel::init`/`current` already use
//! for the one piece of global state this crate can't thread as a
//! parameter.

use core::fmt::{self, Write};
use core::sync::atomic::{AtomicUsize, Ordering};

use arrayvec::ArrayString;
use spin::Mutex;

use crate::hal::Hal;
use crate::param::{HISTORY_CMD_LEN, HISTORY_SIZE, MAXPROCNAME};
use crate::proc::Procs;

/// A byte sink `print!`/`println!` write to. An embedder implements this
/// once for its real console (UART, framebuffer, whatever) and registers it
/// with [`init`]; this crate's own tests register an in-memory sink.
pub trait ConsoleSink: Sync {
    fn putc(&self, c: u8);
}

static SINK: Mutex<Option<&'static dyn ConsoleSink>> = Mutex::new(None);

/// Registers the console sink `print!`/`println!` write to. Must run once
/// at boot before either macro is used; matches `console.init()` in the
/// xv6's own startup sequence.
pub fn init(sink: &'static dyn ConsoleSink) {
    *SINK.lock() = Some(sink);
}

/// Zero-sized `core::fmt::Write` adapter over the registered [`ConsoleSink`]
/// (xv6's `Printer`). Silently drops output if no sink has
/// been registered yet, rather than panicking — a `println!` reached before
/// `init` (e.g. from an early panic) should not itself panic.
pub struct Printer;

impl Write for Printer {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(sink) = *SINK.lock() {
            for b in s.bytes() {
                sink.putc(b);
            }
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    let _ = Printer.write_fmt(args);
}

/// Prints to the registered console sink, exactly like `std::print!`.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(core::format_args!($($arg)*)));
}

/// Prints to the registered console sink followed by a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", core::format_args!($($arg)*)));
}

/// Diagnostic tracing for the scheduler/swap daemons, compiled out entirely
/// unless the `trace` feature is enabled (spec.md §2's ambient-stack
/// expansion: a `KTRACE`-style wrapper gated so it costs nothing on the hot
/// paths of the scheduler loop and the paging daemons by default).
#[macro_export]
macro_rules! klog {
    ($($arg:tt)*) => {
        #[cfg(feature = "trace")]
        $crate::println!($($arg)*);
    };
}

/// The fixed ASCII banner the `draw` syscall copies into a user buffer
/// (spec.md §6). The shell/user program that requests it is out of scope;
/// this crate only owns the constant and the copy.
pub const BANNER: &[u8] = b"rv6-sched-core\n";

/// Top-10 call-stack PCs walked from a sleeper's saved frame pointer
/// (spec.md §6's Ctrl-P dump). Walking frame pointers is architecture- and
/// `Hal`-specific and out of scope here (spec.md §1's trap-vector boundary);
/// callers supply the walk as a closure.
pub const MAX_STACK_PCS: usize = 10;

/// Dumps the process list the way Ctrl-P does in xv6: pid,
/// state name, process name, and for `SLEEPING` processes the PCs `walk`
/// reports (spec.md §6). `walk(pid, visit)` must call `visit` at most
/// [`MAX_STACK_PCS`] times; this function does not enforce the cap itself
/// since it never inspects the embedder-specific stack layout.
pub fn dump_process_list<H: Hal>(procs: &Procs<H>, mut walk: impl FnMut(i32, &mut dyn FnMut(usize))) {
    procs.dump(|pid, state, name: &[u8; MAXPROCNAME]| {
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        let name_str = core::str::from_utf8(&name[..end]).unwrap_or("?");
        println!("{} {} {}", pid, state, name_str);
        if state.trim() == "sleep" {
            walk(pid, &mut |pc| println!("  {:x}", pc));
        }
    });
}

/// The fixed-size ring of past shell command lines the `history` syscall
/// reads from (spec.md §6: "returns past shell command; 0 on success, 1 if
/// no such slot, 2 if id out of range"). The shell itself is out of scope;
/// this crate owns only the storage and lookup-by-slot-id, so an embedder's
/// thin shell-adjacent code can call [`HistoryLog::record`] and the
/// `history` syscall can call [`HistoryLog::get`].
pub struct HistoryLog {
    entries: Mutex<[Option<ArrayString<HISTORY_CMD_LEN>>; HISTORY_SIZE]>,
    next: AtomicUsize,
}

impl HistoryLog {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new([None; HISTORY_SIZE]),
            next: AtomicUsize::new(0),
        }
    }

    /// Records `cmd` (truncated to fit) into the next ring slot, overwriting
    /// the oldest entry once the ring is full.
    pub fn record(&self, cmd: &str) {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % HISTORY_SIZE;
        let truncated = &cmd[..cmd.len().min(HISTORY_CMD_LEN)];
        let mut s = ArrayString::new();
        // `truncated` is at most HISTORY_CMD_LEN bytes by construction.
        let _ = s.try_push_str(truncated);
        self.entries.lock()[idx] = Some(s);
    }

    /// Looks up the command recorded at ring slot `id`. `Err(2)` if `id` is
    /// out of range, `Err(1)` if that slot has never been recorded into,
    /// matching spec.md §6's `history` error codes exactly.
    pub fn get(&self, id: usize) -> Result<ArrayString<HISTORY_CMD_LEN>, u8> {
        if id >= HISTORY_SIZE {
            return Err(2);
        }
        self.entries.lock()[id].ok_or(1)
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu::Cpus;
    use crate::proc::Procstate;
    use crate::testing::{reset_interrupts, MockHal};
    use std::boxed::Box;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec;

    struct CapturingSink {
        captured: StdMutex<Vec<u8>>,
    }

    impl ConsoleSink for CapturingSink {
        fn putc(&self, c: u8) {
            self.captured.lock().unwrap().push(c);
        }
    }

    #[test]
    fn print_writes_through_the_registered_sink() {
        let sink: &'static CapturingSink = Box::leak(Box::new(CapturingSink {
            captured: StdMutex::new(Vec::new()),
        }));
        init(sink);
        println!("hello {}", 42);
        let got = sink.captured.lock().unwrap().clone();
        assert_eq!(got, b"hello 42\n");
    }

    #[test]
    fn history_round_trips_by_slot() {
        let log = HistoryLog::new();
        log.record("ls -la");
        assert_eq!(log.get(0).unwrap().as_str(), "ls -la");
    }

    #[test]
    fn history_reports_out_of_range_and_empty_slots() {
        let log = HistoryLog::new();
        assert_eq!(log.get(HISTORY_SIZE).unwrap_err(), 2);
        assert_eq!(log.get(0).unwrap_err(), 1);
    }

    #[test]
    fn history_wraps_after_filling_the_ring() {
        let log = HistoryLog::new();
        for i in 0..=HISTORY_SIZE {
            let cmd = std::format!("cmd{}", i);
            log.record(&cmd);
        }
        // Slot 0 held "cmd0" until the (HISTORY_SIZE + 1)-th record wrapped
        // back around and overwrote it.
        assert_eq!(
            log.get(0).unwrap().as_str(),
            std::format!("cmd{}", HISTORY_SIZE)
        );
    }

    #[test]
    fn banner_copies_within_draw_size_limit() {
        assert!(BANNER.len() < crate::param::PGSIZE);
    }

    #[test]
    fn dump_lists_every_non_unused_slot() {
        reset_interrupts();
        let cpus: &'static Cpus = Box::leak(Box::new(Cpus::new()));
        let procs: &'static Procs<MockHal> = Box::leak(Box::new(Procs::new(cpus)));
        procs.init();
        let mut guard = procs.process_pool()[0].lock();
        guard.info_mut().state = Procstate::Runnable;
        guard.info_mut().pid = 7;
        drop(guard);

        let sink: &'static CapturingSink = Box::leak(Box::new(CapturingSink {
            captured: StdMutex::new(Vec::new()),
        }));
        init(sink);
        dump_process_list(procs, |_pid, _visit| {});
        let out = std::string::String::from_utf8(sink.captured.lock().unwrap().clone()).unwrap();
        assert!(out.contains('7'));
    }
}
