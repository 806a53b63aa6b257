//! POSIX virtual-memory handler (`mmap`/`mprotect`/`munmap`).
//!
//! POSIX has no distinct commit step: the whole capacity is mapped up front
//! with `PROT_NONE`, and committing a sub-range is just raising its
//! protection. Uncommitting drops the protection back to `PROT_NONE` and
//! hints the kernel with `madvise(MADV_DONTNEED)` so the physical pages are
//! actually reclaimed rather than merely becoming inaccessible.

use std::ptr;

use crate::error::{MemoryError, Result};
use crate::region::{MemoryRange, Protection};
use crate::utils::align_up;

use super::{VirtualMemory, validate_range};

// macOS spells the anonymous-mapping flag differently; this is the single
// site where the choice is made.
#[cfg(target_os = "macos")]
const MAP_ANONYMOUS: libc::c_int = libc::MAP_ANON;
#[cfg(not(target_os = "macos"))]
const MAP_ANONYMOUS: libc::c_int = libc::MAP_ANONYMOUS;

/// Translate protection flags to `PROT_*` bits.
///
/// Write implies read (POSIX offers no write-only mode); execute alone maps
/// to `PROT_EXEC` and lets the OS decide whether execute-only pages exist.
fn prot_bits(protection: Protection) -> libc::c_int {
    let mut bits = libc::PROT_NONE;
    if protection.is_readable() {
        bits |= libc::PROT_READ;
    }
    if protection.is_writable() {
        bits |= libc::PROT_READ | libc::PROT_WRITE;
    }
    if protection.is_executable() {
        bits |= libc::PROT_EXEC;
    }
    bits
}

/// Handler backed by the POSIX memory-mapping calls.
pub struct PosixMemory {
    page_size: usize,
}

impl PosixMemory {
    /// Creates the handler, reading the page size from the OS.
    pub fn new() -> Self {
        // SAFETY: sysconf with _SC_PAGESIZE has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as usize;
        Self { page_size }
    }
}

impl Default for PosixMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMemory for PosixMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn reserve(&self, size: usize) -> Result<MemoryRange> {
        if size == 0 {
            return Err(MemoryError::invalid_size(
                0,
                "reservation size must be non-zero",
            ));
        }
        let size = align_up(size, self.page_size);

        // SAFETY: FFI call to mmap for a fresh anonymous private mapping.
        // - addr is null, letting the kernel pick the placement
        // - size is non-zero and page-aligned
        // - PROT_NONE keeps the range inaccessible until committed
        // - fd = -1 / offset = 0 as required for anonymous mappings
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            Err(MemoryError::ReserveFailed { size })
        } else {
            Ok(MemoryRange::new(ptr.cast::<u8>(), size))
        }
    }

    fn commit(&self, range: MemoryRange, protection: Protection) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to mprotect over a validated page-aligned range
        // inside a live mapping owned by the calling arena.
        let rc = unsafe {
            libc::mprotect(
                range.base().cast::<libc::c_void>(),
                range.size(),
                prot_bits(protection),
            )
        };
        if rc == -1 {
            return Err(MemoryError::platform("commit", range, protection));
        }
        Ok(())
    }

    fn uncommit(&self, range: MemoryRange) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to mprotect; same contract as in commit.
        let rc = unsafe {
            libc::mprotect(
                range.base().cast::<libc::c_void>(),
                range.size(),
                libc::PROT_NONE,
            )
        };
        if rc == -1 {
            return Err(MemoryError::platform("uncommit", range, Protection::NONE));
        }

        // SAFETY: FFI call to madvise over the just-revoked range; the hint
        // tells the kernel the contents are disposable so the backing pages
        // can be reclaimed now instead of at memory-pressure time.
        let rc = unsafe {
            libc::madvise(
                range.base().cast::<libc::c_void>(),
                range.size(),
                libc::MADV_DONTNEED,
            )
        };
        if rc == -1 {
            return Err(MemoryError::platform("uncommit", range, Protection::NONE));
        }
        Ok(())
    }

    fn protect(&self, range: MemoryRange, protection: Protection) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to mprotect; same contract as in commit.
        let rc = unsafe {
            libc::mprotect(
                range.base().cast::<libc::c_void>(),
                range.size(),
                prot_bits(protection),
            )
        };
        if rc == -1 {
            return Err(MemoryError::platform("protect", range, protection));
        }
        Ok(())
    }

    fn free(&self, range: MemoryRange) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to munmap. The range covers exactly one mapping
        // created by reserve, and the owning arena never touches it again.
        let rc = unsafe { libc::munmap(range.base().cast::<libc::c_void>(), range.size()) };
        if rc == -1 {
            return Err(MemoryError::platform("free", range, Protection::NONE));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prot_bits_lattice() {
        assert_eq!(prot_bits(Protection::NONE), libc::PROT_NONE);
        assert_eq!(prot_bits(Protection::READ), libc::PROT_READ);
        // Write implies read.
        assert_eq!(
            prot_bits(Protection::WRITE),
            libc::PROT_READ | libc::PROT_WRITE
        );
        assert_eq!(
            prot_bits(Protection::READ_WRITE),
            libc::PROT_READ | libc::PROT_WRITE
        );
        assert_eq!(prot_bits(Protection::EXECUTE), libc::PROT_EXEC);
        assert_eq!(
            prot_bits(Protection::READ | Protection::EXECUTE),
            libc::PROT_READ | libc::PROT_EXEC
        );
        assert_eq!(
            prot_bits(Protection::READ_WRITE | Protection::EXECUTE),
            libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC
        );
    }

    #[test]
    fn uncommit_then_recommit_reads_zero() {
        let platform = PosixMemory::new();
        let page = platform.page_size();
        let range = platform.reserve(page).unwrap();

        platform.commit(range, Protection::READ_WRITE).unwrap();
        // SAFETY: the page was just committed read-write.
        unsafe {
            *range.base() = 7;
        }

        platform.uncommit(range).unwrap();
        platform.commit(range, Protection::READ_WRITE).unwrap();
        // SAFETY: recommitted read-write; MADV_DONTNEED dropped the old
        // contents, so the page reads back zero.
        unsafe {
            assert_eq!(*range.base(), 0);
        }

        platform.free(range).unwrap();
    }
}
