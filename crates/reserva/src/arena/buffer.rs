//! Byte-buffer projection over the arena core.

use std::fmt;
use std::ops::Index;
use std::ptr;

use crate::error::{MemoryError, Result};
use crate::region::Protection;

use super::{RawArena, ResetPolicy};

/// An append-only byte buffer backed by a lazily committed reservation.
///
/// Bytes live at a stable address for the buffer's whole lifetime; growing
/// never relocates anything because the full capacity was reserved up
/// front. Slices returned by the accessors borrow the buffer, so the borrow
/// checker rules out reading a region across a reset or dispose.
///
/// Created through [`MemoryManager`](crate::manager::MemoryManager).
pub struct BufferArena {
    raw: RawArena,
}

impl BufferArena {
    pub(crate) fn new(raw: RawArena) -> Self {
        Self { raw }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.raw.ensure_live()?;
        if !self.raw.protection().is_writable() {
            return Err(MemoryError::NotWritable {
                name: self.raw.name().to_string(),
                flags: self.raw.protection(),
            });
        }
        Ok(())
    }

    fn ensure_readable(&self) -> Result<()> {
        self.raw.ensure_live()?;
        // An empty extent is always viewable; nothing will be dereferenced.
        if self.raw.allocated() > 0 && !self.raw.protection().is_readable() {
            return Err(MemoryError::NotReadable {
                name: self.raw.name().to_string(),
                flags: self.raw.protection(),
            });
        }
        Ok(())
    }

    /// Bump-allocates `len` bytes and returns the zero-filled region.
    pub fn alloc(&mut self, len: usize) -> Result<&mut [u8]> {
        self.ensure_writable()?;
        let offset = self.raw.bump(len)?;
        let ptr = self.raw.ptr_at(offset);
        // SAFETY: [offset, offset + len) was just handed out by the cursor,
        // lies inside committed writable memory, and nothing else references
        // it; the returned borrow keeps `self` exclusively borrowed.
        unsafe {
            ptr::write_bytes(ptr, 0, len);
            Ok(std::slice::from_raw_parts_mut(ptr, len))
        }
    }

    /// Appends a single byte, returning its offset.
    pub fn append(&mut self, byte: u8) -> Result<usize> {
        self.append_slice(std::slice::from_ref(&byte))
    }

    /// Appends a slice of bytes, returning the offset of its first byte.
    pub fn append_slice(&mut self, bytes: &[u8]) -> Result<usize> {
        self.ensure_writable()?;
        let offset = self.raw.bump(bytes.len())?;
        let ptr = self.raw.ptr_at(offset);
        // SAFETY: destination was just handed out by the cursor (committed,
        // writable, unaliased) and `bytes` cannot overlap a fresh span.
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), ptr, bytes.len());
        }
        Ok(offset)
    }

    /// A view over the whole allocated extent.
    pub fn as_slice(&self) -> Result<&[u8]> {
        self.slice(0, self.raw.allocated())
    }

    /// A zero-copy view over `[start, start + len)` of the allocated (not
    /// merely committed) extent.
    pub fn slice(&self, start: usize, len: usize) -> Result<&[u8]> {
        self.ensure_readable()?;
        let end = start
            .checked_add(len)
            .ok_or(MemoryError::out_of_bounds(start, self.raw.allocated()))?;
        if end > self.raw.allocated() {
            return Err(MemoryError::out_of_bounds(end, self.raw.allocated()));
        }
        // SAFETY: the window lies within the allocated extent, which is
        // committed and readable; the borrow is tied to `&self`.
        unsafe { Ok(std::slice::from_raw_parts(self.raw.ptr_at(start), len)) }
    }

    /// The byte at `index`, bounds-checked.
    pub fn get(&self, index: usize) -> Result<u8> {
        Ok(self.slice(index, 1)?[0])
    }

    /// Mutable access to the byte at `index`, bounds-checked.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut u8> {
        self.ensure_writable()?;
        if index >= self.raw.allocated() {
            return Err(MemoryError::out_of_bounds(index, self.raw.allocated()));
        }
        // SAFETY: index is within the allocated, committed, writable extent
        // and `&mut self` guarantees exclusivity.
        unsafe { Ok(&mut *self.raw.ptr_at(index)) }
    }

    /// Reapplies protection over the committed prefix; future commits use
    /// the new flags.
    pub fn protect(&mut self, protection: Protection) -> Result<()> {
        self.raw.protect(protection)
    }

    /// Rewinds the cursor to zero, releasing committed memory per `policy`.
    pub fn reset(&mut self, policy: ResetPolicy) -> Result<()> {
        self.raw.reset(policy)
    }

    /// Releases the reservation. Idempotent; afterwards every operation
    /// fails. Dropping the buffer does the same.
    pub fn dispose(&mut self) {
        self.raw.dispose();
    }

    /// Total reserved bytes.
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Bytes currently backed by physical memory.
    pub fn committed(&self) -> usize {
        self.raw.committed()
    }

    /// Bytes handed out so far.
    pub fn allocated(&self) -> usize {
        self.raw.allocated()
    }

    /// Bytes still available for allocation.
    pub fn available(&self) -> usize {
        self.raw.available()
    }

    /// Current protection flags.
    pub fn protection(&self) -> Protection {
        self.raw.protection()
    }

    /// Diagnostic name.
    pub fn name(&self) -> &str {
        self.raw.name()
    }

    /// Base address of the reservation (null once disposed).
    pub fn base_ptr(&self) -> *const u8 {
        self.raw.base()
    }

    /// Commit granule in bytes.
    pub fn granule(&self) -> usize {
        self.raw.granule()
    }

    /// Whether the buffer has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.raw.is_disposed()
    }
}

impl Index<usize> for BufferArena {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        match self.slice(index, 1) {
            Ok(slice) => &slice[0],
            Err(err) => panic!("{err}"),
        }
    }
}

impl fmt::Display for BufferArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}
