//! Compile-time kernel parameters.
//!
//! Grounded on xv6's `src/param.rs`: a flat list of `const`s
//! rather than a runtime configuration object, since every one of these
//! bounds a fixed-size array allocated once at link time.

/// Maximum number of processes.
pub const NPROC: usize = 64;

/// Maximum number of CPUs.
pub const NCPU: usize = 8;

/// Open files per process.
pub const NOFILE: usize = 16;

/// Open files per system (`file_limit`'s ceiling, spec.md §4.5).
pub const NFILE: usize = 100;

/// Maximum length of a process name, including the terminating nul.
pub const MAXPROCNAME: usize = 16;

/// Page size in bytes. Swap files are exactly one page.
pub const PGSIZE: usize = 4096;

/// Reserved descriptors counted against `file_limit` before any swap file
/// is created (spec.md §4.5: "start value 2").
pub const FILE_LIMIT_RESERVED: usize = 2;

/// Capacity of each swap request ring buffer (`NPROC + 1`, spec.md §3).
pub const SWAPQ_CAPACITY: usize = NPROC + 1;

/// Process names the swap daemons register under, so they can be found by
/// name rather than hard-coded pid (spec.md §9, Open Question (b)).
pub const SWAPOUTD_NAME: &[u8] = b"swapoutd";
pub const SWAPIND_NAME: &[u8] = b"swapind";

/// Priority bounds for `set_prio`/`dec_prio` (spec.md §3, §4.6).
pub const PRIO_MIN: u8 = 1;
pub const PRIO_MAX: u8 = 3;
pub const PRIO_DEFAULT: u8 = 2;

/// Ring capacity for the `history` syscall (spec.md §6).
pub const HISTORY_SIZE: usize = 16;
/// Maximum length of a recorded shell command line.
pub const HISTORY_CMD_LEN: usize = 128;

static_assertions::const_assert!(SWAPQ_CAPACITY == NPROC + 1);
static_assertions::const_assert!(PRIO_MIN <= PRIO_DEFAULT && PRIO_DEFAULT <= PRIO_MAX);
