//! Trident kernel library
//!
//! Core of a 32-bit protected-mode x86 teaching kernel: three virtual text
//! terminals, a read-only boot-block filesystem, six user processes
//! round-robin scheduled by the PIT, and a nine-call syscall surface.
//!
//! The crate builds for two worlds. On a bare-metal x86 target it is
//! `no_std` and drives the hardware directly. On a hosted target the
//! hardware layer degrades to no-op stubs and the kernel's logic (console,
//! line editor, filesystem reader, process/FD tables, scheduler policy)
//! compiles against `std` so the standard test harness can exercise it.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(all(target_arch = "x86", target_os = "none"), feature(abi_x86_interrupt))]

#[macro_use]
pub mod print;

pub mod arch;
pub mod drivers;
pub mod error;
pub mod fs;
pub mod klog;
pub mod mm;
pub mod process;
pub mod sched;
pub mod serial;
pub mod syscall;
pub mod terminal;

pub use error::{FsError, KernelError, KernelResult};
