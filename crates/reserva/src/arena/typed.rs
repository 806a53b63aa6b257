//! Typed-array projection over the arena core.

use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ops::Index;
use std::ptr;

use crate::error::{MemoryError, Result};
use crate::region::Protection;

use super::{RawArena, ResetPolicy};

/// Element types that may live in a typed arena.
///
/// # Safety
///
/// Implementors must be plain data: the all-zeroes bit pattern must be a
/// valid value, because freshly allocated elements are zero-filled before
/// they are handed out. The `Copy + 'static` bounds rule out drop glue and
/// borrowed data, which an arena that never runs destructors could not
/// honor.
pub unsafe trait ArenaElement: Copy + 'static {}

macro_rules! arena_element {
    ($($ty:ty),* $(,)?) => {
        $(
            // SAFETY: primitive numeric types accept any bit pattern.
            unsafe impl ArenaElement for $ty {}
        )*
    };
}

arena_element!(u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64);

// SAFETY: zeroed bytes make `false`, a valid bool.
unsafe impl ArenaElement for bool {}

// SAFETY: an array of valid-when-zeroed elements is itself valid when
// zeroed.
unsafe impl<T: ArenaElement, const N: usize> ArenaElement for [T; N] {}

/// A growable array of fixed-layout elements backed by a lazily committed
/// reservation.
///
/// Elements are bump-allocated, never move, and are zero-filled when handed
/// out. The element count always mirrors `allocated / size_of::<T>()`, so a
/// reset brings it back to zero with no separate bookkeeping.
///
/// Created through
/// [`MemoryManager::create_array`](crate::manager::MemoryManager::create_array).
pub struct TypedArena<T: ArenaElement> {
    raw: RawArena,
    _marker: PhantomData<T>,
}

impl<T: ArenaElement> TypedArena<T> {
    pub(crate) fn new(raw: RawArena) -> Self {
        debug_assert!(mem::size_of::<T>() > 0);
        debug_assert!(mem::align_of::<T>() <= raw.granule());
        Self {
            raw,
            _marker: PhantomData,
        }
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
        if self.len() > 0 && !self.raw.protection().is_readable() {
            return Err(MemoryError::NotReadable {
                name: self.raw.name().to_string(),
                flags: self.raw.protection(),
            });
        }
        Ok(())
    }

    /// Number of elements allocated so far.
    pub fn len(&self) -> usize {
        self.raw.allocated() / mem::size_of::<T>()
    }

    /// Whether no elements have been allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total element capacity of the reservation.
    pub fn capacity_elements(&self) -> usize {
        self.raw.capacity() / mem::size_of::<T>()
    }

    /// Bump-allocates `count` elements and returns the starting index along
    /// with the zero-filled region.
    pub fn alloc_range(&mut self, count: usize) -> Result<(usize, &mut [T])> {
        if count == 0 {
            return Err(MemoryError::invalid_size(
                0,
                "element count must be non-zero",
            ));
        }
        self.ensure_writable()?;
        let bytes = count
            .checked_mul(mem::size_of::<T>())
            .ok_or(MemoryError::InvalidSize {
                size: count,
                reason: "element count overflows the address space",
            })?;

        let start = self.len();
        let offset = self.raw.bump(bytes)?;
        debug_assert_eq!(offset, start * mem::size_of::<T>());

        let ptr = self.raw.ptr_at(offset).cast::<T>();
        // SAFETY: the span was just handed out by the cursor (committed,
        // writable, unaliased); it is zero-filled, which ArenaElement
        // guarantees is a valid value; the pointer is element-aligned
        // because the cursor only ever advances by whole elements from a
        // page-aligned base.
        unsafe {
            ptr::write_bytes(ptr.cast::<u8>(), 0, bytes);
            Ok((start, std::slice::from_raw_parts_mut(ptr, count)))
        }
    }

    /// Bump-allocates a single element, returning its index and a mutable
    /// reference to it.
    pub fn alloc_one(&mut self) -> Result<(usize, &mut T)> {
        let (index, slice) = self.alloc_range(1)?;
        Ok((index, &mut slice[0]))
    }

    /// A view over all allocated elements.
    pub fn as_slice(&self) -> Result<&[T]> {
        self.slice(0, self.len())
    }

    /// A zero-copy view over `count` elements starting at `start`.
    pub fn slice(&self, start: usize, count: usize) -> Result<&[T]> {
        self.ensure_readable()?;
        let end = start
            .checked_add(count)
            .ok_or(MemoryError::out_of_bounds(start, self.len()))?;
        if end > self.len() {
            return Err(MemoryError::out_of_bounds(end, self.len()));
        }
        let ptr = self.raw.ptr_at(start * mem::size_of::<T>()).cast::<T>();
        // SAFETY: the window lies within the allocated extent (committed,
        // readable, element-aligned); the borrow is tied to `&self`.
        unsafe { Ok(std::slice::from_raw_parts(ptr, count)) }
    }

    /// The element at `index`, bounds-checked.
    pub fn get(&self, index: usize) -> Result<&T> {
        Ok(&self.slice(index, 1)?[0])
    }

    /// Mutable access to the element at `index`, bounds-checked.
    pub fn get_mut(&mut self, index: usize) -> Result<&mut T> {
        self.ensure_writable()?;
        if index >= self.len() {
            return Err(MemoryError::out_of_bounds(index, self.len()));
        }
        let ptr = self.raw.ptr_at(index * mem::size_of::<T>()).cast::<T>();
        // SAFETY: index is within the allocated, committed, writable extent
        // and `&mut self` guarantees exclusivity.
        unsafe { Ok(&mut *ptr) }
    }

    /// Reapplies protection over the committed prefix; future commits use
    /// the new flags.
    pub fn protect(&mut self, protection: Protection) -> Result<()> {
        self.raw.protect(protection)
    }

    /// Rewinds the array to zero elements, releasing committed memory per
    /// `policy`.
    pub fn reset(&mut self, policy: ResetPolicy) -> Result<()> {
        self.raw.reset(policy)
    }

    /// Releases the reservation. Idempotent; afterwards every operation
    /// fails. Dropping the arena does the same.
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
    pub fn base_ptr(&self) -> *const T {
        self.raw.base().cast()
    }

    /// Commit granule in bytes.
    pub fn granule(&self) -> usize {
        self.raw.granule()
    }

    /// Whether the arena has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.raw.is_disposed()
    }
}

impl<T: ArenaElement> Index<usize> for TypedArena<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        match self.get(index) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<T: ArenaElement> fmt::Display for TypedArena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.raw.fmt(f)
    }
}
