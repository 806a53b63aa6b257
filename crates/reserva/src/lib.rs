//! Virtual-memory-backed arena allocation.
//!
//! `reserva` reserves a large contiguous address range up front and backs it
//! with physical memory lazily, one fixed-size commit granule at a time, as
//! a bump cursor advances. The result is a very large, stably-addressed,
//! append-only region — bulk byte buffers or typed element arrays — without
//! the copy-and-relocate cost of growable collections.
//!
//! - [`MemoryManager`]: owns the platform handler and the default commit
//!   granularity; creates and tracks arenas, and revokes them all on
//!   teardown.
//! - [`BufferArena`]: append-only bytes over one reservation.
//! - [`TypedArena<T>`]: fixed-layout element array with per-element bump
//!   allocation.
//! - [`VirtualMemory`]: the reserve/commit/uncommit/protect/free capability,
//!   implemented for POSIX (`mmap`/`mprotect`) and Windows
//!   (`VirtualAlloc`/`VirtualProtect`), injectable for tests.
//!
//! # Example
//!
//! ```no_run
//! use reserva::MemoryManager;
//!
//! fn main() -> reserva::Result<()> {
//!     let manager = MemoryManager::new();
//!
//!     // Reserve 1 GiB of address space; almost none of it is backed yet.
//!     let mut samples = manager.create_array::<f32>("samples", 1 << 30)?;
//!
//!     // Physical memory is committed 64 KiB at a time as the array grows.
//!     let (start, window) = samples.alloc_range(1024)?;
//!     window[0] = 1.0;
//!     assert_eq!(start, 0);
//!     assert_eq!(samples.len(), 1024);
//!
//!     Ok(())
//! }
//! ```
//!
//! Individual arenas are not internally synchronized: mutation takes
//! `&mut self`, and views are borrows the compiler scopes to "until the next
//! reset or dispose". Only arena creation and teardown through the manager
//! are safe to drive from multiple threads.

#![warn(missing_docs)]

pub mod arena;
pub mod error;
pub mod manager;
pub mod platform;
pub mod region;
pub mod utils;

pub use arena::{ArenaElement, BufferArena, ResetPolicy, TypedArena};
pub use error::{MemoryError, Result};
pub use manager::{ArenaInfo, MemoryManager};
pub use platform::{VirtualMemory, page_size};
pub use region::{MemoryRange, Protection};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
