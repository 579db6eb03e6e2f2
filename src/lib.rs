//! rv6-sched-core: the scheduling and paging core of a teaching kernel.
//!
//! This crate implements only the concurrency/resource engine described in
//! the design docs: a per-CPU cooperative scheduler with pluggable
//! policies, a channel-based sleep/wakeup primitive, and on-demand paging
//! with swap-file eviction. The boot loader, trap vectors, physical page
//! allocator, page-table walker, file system, console driver and user
//! programs are external collaborators, reached only through the traits in
//! [`hal`].

#![cfg_attr(not(test), no_std)]
//
#![deny(absolute_paths_not_starting_with_crate)]
#![deny(anonymous_parameters)]
#![deny(elided_lifetimes_in_paths)]
#![deny(keyword_idents)]
#![deny(macro_use_extern_crate)]
#![deny(trivial_numeric_casts)]
#![deny(unsafe_op_in_unsafe_fn)]
#![deny(unused_extern_crates)]
#![deny(unused_import_braces)]
#![allow(clippy::unit_arg)]

#[cfg(any(
    all(feature = "policy-default", feature = "policy-fcfs"),
    all(feature = "policy-default", feature = "policy-sml"),
    all(feature = "policy-default", feature = "policy-dml"),
    all(feature = "policy-fcfs", feature = "policy-sml"),
    all(feature = "policy-fcfs", feature = "policy-dml"),
    all(feature = "policy-sml", feature = "policy-dml"),
))]
compile_error!("exactly one policy-* feature may be enabled at a time");

pub mod console;
pub mod cpu;
pub mod error;
pub mod hal;
pub mod kernel;
pub mod lock;
pub mod param;
pub mod proc;
pub mod sched;
pub mod swap;
pub mod syscall;
pub mod timing;

#[cfg(test)]
pub mod testing;
