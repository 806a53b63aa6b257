//! Address-range and protection-flag value types shared by the platform
//! layer and the arenas.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::ptr;

use crate::utils::is_aligned;

/// A contiguous range of process address space.
///
/// A range is a plain descriptor: it does not own the memory it names, and
/// copying it copies nothing but the address and length. The null range
/// (`base = null`, `size = 0`) is the sentinel an arena stores once its
/// reservation has been released.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemoryRange {
    base: *mut u8,
    size: usize,
}

// SAFETY: MemoryRange is an address/length pair with no ownership semantics.
// - It never dereferences its pointer on its own
// - All access to the described memory goes through the arena that owns the
//   reservation, which enforces exclusivity separately
unsafe impl Send for MemoryRange {}

// SAFETY: Same reasoning as Send; the type has no interior mutability.
unsafe impl Sync for MemoryRange {}

impl MemoryRange {
    /// The null range: no base address, zero length.
    pub const NULL: Self = Self {
        base: ptr::null_mut(),
        size: 0,
    };

    /// Creates a range covering `size` bytes starting at `base`.
    #[inline]
    pub const fn new(base: *mut u8, size: usize) -> Self {
        Self { base, size }
    }

    /// Base address of the range.
    #[inline]
    pub const fn base(&self) -> *mut u8 {
        self.base
    }

    /// Length of the range in bytes.
    #[inline]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Whether this is the null sentinel.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.base.is_null() && self.size == 0
    }

    /// One-past-the-end address.
    #[inline]
    pub fn end(&self) -> usize {
        self.base as usize + self.size
    }

    /// A sub-range covering `[offset, offset + len)` of this range.
    ///
    /// # Panics
    ///
    /// Panics if the requested window does not lie within the range. Callers
    /// in this crate derive offsets from the arena counters, which the arena
    /// invariants keep in bounds.
    #[inline]
    pub fn subrange(&self, offset: usize, len: usize) -> MemoryRange {
        assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.size),
            "subrange {}+{} escapes range of {} bytes",
            offset,
            len,
            self.size
        );
        // SAFETY: offset <= self.size was just checked, so the result stays
        // within the same allocated object (or is its one-past-end address).
        let base = unsafe { self.base.add(offset) };
        MemoryRange::new(base, len)
    }

    /// Whether both the base address and the size are multiples of
    /// `page_size`.
    #[inline]
    pub fn is_page_aligned(&self, page_size: usize) -> bool {
        is_aligned(self.base as usize, page_size) && is_aligned(self.size, page_size)
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}+{:#x}", self.base as usize, self.size)
    }
}

/// Access rights applied to committed memory.
///
/// A small bitset over read/write/execute. `Protection::NONE` denies all
/// access; the flags of an arena apply uniformly to its whole committed
/// prefix. Note that on every supported OS write access implies read access
/// (there is no write-only page mode), which the platform translation tables
/// account for.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protection(u8);

impl Protection {
    /// All access denied.
    pub const NONE: Self = Self(0);
    /// Read access.
    pub const READ: Self = Self(1);
    /// Write access (implies read on every supported OS).
    pub const WRITE: Self = Self(2);
    /// Execute access.
    pub const EXECUTE: Self = Self(4);
    /// Read and write access; the default for new arenas.
    pub const READ_WRITE: Self = Self(1 | 2);

    const ALL: u8 = 1 | 2 | 4;

    /// Reconstructs flags from their raw bit representation.
    #[inline]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Raw bit representation.
    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is also set in `self`.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the read flag is set.
    #[inline]
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READ)
    }

    /// Whether the write flag is set.
    #[inline]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITE)
    }

    /// Whether the execute flag is set.
    #[inline]
    pub const fn is_executable(self) -> bool {
        self.contains(Self::EXECUTE)
    }
}

impl BitOr for Protection {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Protection {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Protection {
    /// Renders the classic 3-character flag string: `r`/`w`/`x` per granted
    /// flag, `-` per denied one, `???` for bit patterns outside the
    /// recognized set.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 & !Self::ALL != 0 {
            return f.write_str("???");
        }
        let r = if self.is_readable() { 'r' } else { '-' };
        let w = if self.is_writable() { 'w' } else { '-' };
        let x = if self.is_executable() { 'x' } else { '-' };
        write!(f, "{r}{w}{x}")
    }
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Protection({self})")
    }
}
