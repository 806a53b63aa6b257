//! Windows virtual-memory handler (`VirtualAlloc`/`VirtualProtect`/
//! `VirtualFree`).
//!
//! Windows exposes the two-phase model directly: `VirtualAlloc` with
//! `MEM_RESERVE` claims address space, a second `VirtualAlloc` with
//! `MEM_COMMIT` backs sub-ranges with memory, `VirtualFree` with
//! `MEM_DECOMMIT` releases the backing, and `MEM_RELEASE` (with size 0)
//! drops the whole reservation.

use std::mem::MaybeUninit;
use std::ptr;

use winapi::um::memoryapi::{VirtualAlloc, VirtualFree, VirtualProtect};
use winapi::um::sysinfoapi::{GetSystemInfo, SYSTEM_INFO};
use winapi::um::winnt::{
    MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_EXECUTE, PAGE_EXECUTE_READ,
    PAGE_EXECUTE_READWRITE, PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE,
};

use crate::error::{MemoryError, Result};
use crate::region::{MemoryRange, Protection};
use crate::utils::align_up;

use super::{VirtualMemory, validate_range};

/// Translate protection flags to `PAGE_*` constants.
///
/// The `PAGE_*` values are an enumeration rather than a bitmask, so the
/// lattice is spelled out: write implies read, and any write combined with
/// execute lands on `PAGE_EXECUTE_READWRITE`.
fn prot_bits(protection: Protection) -> u32 {
    let r = protection.is_readable();
    let w = protection.is_writable();
    let x = protection.is_executable();
    match (r, w, x) {
        (_, true, true) => PAGE_EXECUTE_READWRITE,
        (true, false, true) => PAGE_EXECUTE_READ,
        (false, false, true) => PAGE_EXECUTE,
        (_, true, false) => PAGE_READWRITE,
        (true, false, false) => PAGE_READONLY,
        (false, false, false) => PAGE_NOACCESS,
    }
}

/// Handler backed by the Win32 virtual-memory API.
pub struct WindowsMemory {
    page_size: usize,
}

impl WindowsMemory {
    /// Creates the handler, reading the page size from the OS.
    pub fn new() -> Self {
        // SAFETY: GetSystemInfo fills the provided struct and cannot fail.
        let info = unsafe {
            let mut info = MaybeUninit::<SYSTEM_INFO>::uninit();
            GetSystemInfo(info.as_mut_ptr());
            info.assume_init()
        };
        Self {
            page_size: info.dwPageSize as usize,
        }
    }
}

impl Default for WindowsMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMemory for WindowsMemory {
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

        // SAFETY: FFI call to VirtualAlloc reserving (not committing)
        // address space; null base lets the OS pick the placement, and
        // PAGE_NOACCESS keeps the range inaccessible until committed.
        let ptr =
            unsafe { VirtualAlloc(ptr::null_mut(), size, MEM_RESERVE, PAGE_NOACCESS) };

        if ptr.is_null() {
            Err(MemoryError::ReserveFailed { size })
        } else {
            Ok(MemoryRange::new(ptr.cast::<u8>(), size))
        }
    }

    fn commit(&self, range: MemoryRange, protection: Protection) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to VirtualAlloc committing pages inside a
        // reservation owned by the calling arena; range is validated
        // page-aligned above.
        let ptr = unsafe {
            VirtualAlloc(
                range.base().cast(),
                range.size(),
                MEM_COMMIT,
                prot_bits(protection),
            )
        };

        // A successful commit of an existing sub-range returns its base.
        if ptr.is_null() || !ptr::eq(ptr.cast::<u8>(), range.base()) {
            return Err(MemoryError::platform("commit", range, protection));
        }
        Ok(())
    }

    fn uncommit(&self, range: MemoryRange) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to VirtualFree with MEM_DECOMMIT, which releases
        // the physical backing but keeps the address range reserved.
        let rc = unsafe { VirtualFree(range.base().cast(), range.size(), MEM_DECOMMIT) };
        if rc == 0 {
            return Err(MemoryError::platform("uncommit", range, Protection::NONE));
        }
        Ok(())
    }

    fn protect(&self, range: MemoryRange, protection: Protection) -> Result<()> {
        validate_range(range, self.page_size)?;

        let mut old = 0u32;
        // SAFETY: FFI call to VirtualProtect over validated committed pages;
        // `old` receives the previous protection as the API requires.
        let rc = unsafe {
            VirtualProtect(
                range.base().cast(),
                range.size(),
                prot_bits(protection),
                &mut old,
            )
        };
        if rc == 0 {
            return Err(MemoryError::platform("protect", range, protection));
        }
        Ok(())
    }

    fn free(&self, range: MemoryRange) -> Result<()> {
        validate_range(range, self.page_size)?;

        // SAFETY: FFI call to VirtualFree with MEM_RELEASE; size must be 0,
        // which releases the entire reservation starting at base.
        let rc = unsafe { VirtualFree(range.base().cast(), 0, MEM_RELEASE) };
        if rc == 0 {
            return Err(MemoryError::platform("free", range, Protection::NONE));
        }
        Ok(())
    }
}
