//! Working set size estimation for Linux processes, built on the
//! kernel's idle page tracking interface
//! (`/sys/kernel/mm/page_idle/bitmap`, Linux 4.3+).
//!
//! A run marks every physical page idle, sleeps for the requested
//! window, snapshots the idle bitmap, and reconciles it with the
//! process's virtual-to-physical translations to classify each mapped
//! page as accessed or idle. Both kernel bitmaps are handled in bulk:
//! touching them bit by bit through syscalls can take minutes on a
//! large process, so the idle bitmap is snapshotted into memory once
//! per run and the pagemap is read with one syscall per region.
//!
//! The result is a best-effort estimate. Setting and reading the flags
//! takes real time, which the reported window accounts for with a
//! half-overhead adjustment.

pub mod classify;
pub mod error;
pub mod idlemap;
pub mod logger;
pub mod maps;
pub mod pagemap;
pub mod sampler;
