//! Platform virtual-memory handlers.
//!
//! One capability interface — reserve, commit, uncommit, protect, free —
//! implemented per target OS. The two models differ genuinely: Windows has a
//! first-class two-phase reserve-then-commit protocol (`VirtualAlloc` with
//! `MEM_RESERVE`, then `MEM_COMMIT`), while POSIX reserves by mapping with
//! `PROT_NONE` and "commits" by raising protection on pages that are already
//! mapped. The arenas are written against the trait and never see the
//! difference.
//!
//! The process-wide default handler and the OS page size are initialized
//! once and published read-only; tests may inject their own handler through
//! the manager instead.

use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::error::{MemoryError, Result};
use crate::region::{MemoryRange, Protection};

#[cfg(unix)]
mod unix;
#[cfg(unix)]
pub use unix::PosixMemory;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsMemory;

/// Default commit granule: 64 KiB worth of pages per growth step.
pub const DEFAULT_GRANULE: usize = 64 * 1024;

/// Reserve/commit/uncommit/protect/free over process address space.
///
/// Implementations validate page-granularity preconditions before every
/// syscall: except for `reserve` (which merely rounds its request up), each
/// operation requires a non-null range whose base and size are exact
/// multiples of the OS page size, and fails with
/// [`MemoryError::MisalignedRange`] otherwise. That check guards against
/// silently mis-sized syscalls and is a caller-bug report, not a runtime
/// condition.
pub trait VirtualMemory: Send + Sync {
    /// Size of one OS page in bytes.
    fn page_size(&self) -> usize;

    /// Reserves `size` bytes of address space (rounded up to the page size)
    /// without backing them with physical memory. The returned range is
    /// inaccessible until committed.
    fn reserve(&self, size: usize) -> Result<MemoryRange>;

    /// Backs `range` with physical memory and applies `protection`.
    fn commit(&self, range: MemoryRange, protection: Protection) -> Result<()>;

    /// Releases the physical backing of `range` while keeping the address
    /// space reserved; the range becomes inaccessible again.
    fn uncommit(&self, range: MemoryRange) -> Result<()>;

    /// Changes the access protection of the committed `range`.
    fn protect(&self, range: MemoryRange, protection: Protection) -> Result<()>;

    /// Releases the entire reservation. `range` must cover the whole span
    /// returned by [`VirtualMemory::reserve`].
    fn free(&self, range: MemoryRange) -> Result<()>;
}

/// Page-granularity precondition shared by every handler entry point except
/// `reserve`.
pub fn validate_range(range: MemoryRange, page_size: usize) -> Result<()> {
    if range.base().is_null() || range.size() == 0 || !range.is_page_aligned(page_size) {
        return Err(MemoryError::misaligned(range, page_size));
    }
    Ok(())
}

/// The commit-page multiplier that yields [`DEFAULT_GRANULE`] for the given
/// page size (at least 1).
pub fn default_multiplier(page_size: usize) -> usize {
    (DEFAULT_GRANULE / page_size).max(1)
}

#[cfg(unix)]
static PLATFORM: Lazy<Arc<dyn VirtualMemory>> = Lazy::new(|| Arc::new(PosixMemory::new()));

#[cfg(windows)]
static PLATFORM: Lazy<Arc<dyn VirtualMemory>> = Lazy::new(|| Arc::new(WindowsMemory::new()));

/// The process-wide handler for the running OS.
pub fn default_platform() -> Arc<dyn VirtualMemory> {
    Arc::clone(&PLATFORM)
}

/// OS page size, read once per process.
pub fn page_size() -> usize {
    static PAGE_SIZE: Lazy<usize> = Lazy::new(|| PLATFORM.page_size());
    *PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_size_is_sane() {
        let page = page_size();
        assert!(page.is_power_of_two());
        assert!(page >= 4096);
    }

    #[test]
    fn default_multiplier_yields_64k_granule() {
        assert_eq!(default_multiplier(4096), 16);
        assert_eq!(default_multiplier(16384), 4);
        // Gigantic pages still get a multiplier of at least one.
        assert_eq!(default_multiplier(1 << 21), 1);
    }

    #[test]
    fn validate_range_rejects_misalignment() {
        let page = 4096;
        assert!(validate_range(MemoryRange::NULL, page).is_err());
        assert!(validate_range(MemoryRange::new(0x1000 as *mut u8, 0), page).is_err());
        assert!(validate_range(MemoryRange::new(0x1001 as *mut u8, page), page).is_err());
        assert!(validate_range(MemoryRange::new(0x1000 as *mut u8, page + 1), page).is_err());
        assert!(validate_range(MemoryRange::new(0x1000 as *mut u8, page), page).is_ok());
    }

    #[test]
    fn reserve_commit_write_free() {
        let platform = default_platform();
        let page = platform.page_size();

        let range = platform.reserve(page * 4).unwrap();
        assert!(!range.is_null());
        assert_eq!(range.size(), page * 4);
        assert!(range.is_page_aligned(page));

        let first = range.subrange(0, page);
        platform.commit(first, Protection::READ_WRITE).unwrap();

        // Committed pages are zero-filled and writable.
        // SAFETY: `first` was just committed read-write and nothing else
        // aliases the fresh reservation.
        unsafe {
            let slice = std::slice::from_raw_parts_mut(first.base(), first.size());
            assert!(slice.iter().all(|&b| b == 0));
            slice[0] = 0xA5;
            assert_eq!(slice[0], 0xA5);
        }

        platform.uncommit(first).unwrap();
        platform.free(range).unwrap();
    }

    #[test]
    fn reserve_rounds_up_to_page_size() {
        let platform = default_platform();
        let page = platform.page_size();

        let range = platform.reserve(1).unwrap();
        assert_eq!(range.size(), page);
        platform.free(range).unwrap();
    }

    #[test]
    fn commit_rejects_unaligned_range() {
        let platform = default_platform();
        let page = platform.page_size();

        let range = platform.reserve(page).unwrap();
        let skewed = MemoryRange::new(unsafe { range.base().add(1) }, page);
        let err = platform.commit(skewed, Protection::READ_WRITE).unwrap_err();
        assert!(matches!(err, MemoryError::MisalignedRange { .. }));
        platform.free(range).unwrap();
    }
}
