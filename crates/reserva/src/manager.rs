//! Arena registry: creation, bookkeeping, and bulk teardown.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::debug;

use crate::arena::{ArenaElement, BufferArena, RawArena, TypedArena};
use crate::error::{MemoryError, Result};
use crate::platform::{VirtualMemory, default_multiplier, default_platform};

/// Creates and tracks arenas over one platform handler.
///
/// The manager owns the handler and the default commit granularity, and
/// keeps a mutex-guarded list of live-arena records in registration order —
/// creation and disposal from multiple threads serialize on that mutex and
/// nothing else. The arenas themselves are owned by their callers; each
/// record carries a shared control block through which the manager
/// enumerates counters for diagnostics and revokes the arena when the
/// manager itself is disposed.
///
/// # Examples
///
/// ```no_run
/// use reserva::{MemoryManager, ResetPolicy};
///
/// fn main() -> reserva::Result<()> {
///     let manager = MemoryManager::new();
///     let mut events = manager.create_buffer("events", 1 << 20)?;
///
///     let offset = events.append_slice(b"hello")?;
///     assert_eq!(offset, 0);
///     assert_eq!(events.committed(), 64 * 1024);
///
///     events.reset(ResetPolicy::Decommit)?;
///     Ok(())
/// }
/// ```
pub struct MemoryManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    platform: Arc<dyn VirtualMemory>,
    default_multiplier: usize,
    disposed: AtomicBool,
    arenas: Mutex<Vec<ArenaRecord>>,
    next_id: AtomicU64,
}

struct ArenaRecord {
    id: u64,
    control: Arc<ArenaControl>,
}

/// Shared bookkeeping between an arena and its manager: the revocation flag
/// checked by every arena operation, plus mirrored counters the manager
/// reads for diagnostics without touching the arena itself.
pub(crate) struct ArenaControl {
    name: String,
    capacity: usize,
    allocated: AtomicUsize,
    committed: AtomicUsize,
    revoked: AtomicBool,
}

/// The arena-side half of a manager record. Detaches itself from the
/// manager's list when the arena is disposed.
pub(crate) struct Registration {
    manager: Weak<ManagerInner>,
    id: u64,
    control: Arc<ArenaControl>,
}

impl Registration {
    pub(crate) fn is_revoked(&self) -> bool {
        self.control.revoked.load(Ordering::Acquire)
    }

    pub(crate) fn publish(&self, allocated: usize, committed: usize) {
        self.control.allocated.store(allocated, Ordering::Relaxed);
        self.control.committed.store(committed, Ordering::Relaxed);
    }

    pub(crate) fn detach(&self) {
        if let Some(inner) = self.manager.upgrade() {
            inner.remove(self.id);
        }
    }
}

/// Diagnostic snapshot of one live arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaInfo {
    /// Diagnostic name given at creation.
    pub name: String,
    /// Total reserved bytes.
    pub capacity: usize,
    /// Bytes currently backed by physical memory.
    pub committed: usize,
    /// Bytes handed out so far.
    pub allocated: usize,
}

impl ManagerInner {
    fn remove(&self, id: u64) {
        let mut arenas = self.arenas.lock();
        if let Some(pos) = arenas.iter().position(|record| record.id == id) {
            arenas.remove(pos);
        }
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Drain under the lock, revoke outside it, newest first. An arena
        // disposing itself concurrently removes its record under the same
        // lock, so nothing is processed twice.
        let drained: Vec<ArenaRecord> = {
            let mut arenas = self.arenas.lock();
            arenas.drain(..).collect()
        };
        for record in drained.iter().rev() {
            record.control.revoked.store(true, Ordering::Release);
        }
        debug!(arenas = drained.len(), "memory manager disposed");
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl MemoryManager {
    /// Creates a manager over the running OS's handler with the default
    /// 64 KiB commit granule.
    pub fn new() -> Self {
        Self::with_platform(default_platform(), 0)
    }

    /// Creates a manager over the running OS's handler with an explicit
    /// default commit-page multiplier (0 picks the multiplier that yields a
    /// 64 KiB granule).
    pub fn with_default_multiplier(multiplier: usize) -> Self {
        Self::with_platform(default_platform(), multiplier)
    }

    /// Creates a manager over an explicit handler — the injection point for
    /// test doubles. A `multiplier` of 0 picks the multiplier that yields a
    /// 64 KiB granule for the handler's page size.
    pub fn with_platform(platform: Arc<dyn VirtualMemory>, multiplier: usize) -> Self {
        let resolved = if multiplier == 0 {
            default_multiplier(platform.page_size())
        } else {
            multiplier
        };
        Self {
            inner: Arc::new(ManagerInner {
                platform,
                default_multiplier: resolved,
                disposed: AtomicBool::new(false),
                arenas: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn create_raw(
        &self,
        name: &str,
        capacity: usize,
        multiplier: usize,
        min_capacity: usize,
    ) -> Result<RawArena> {
        if self.inner.disposed.load(Ordering::Acquire) {
            return Err(MemoryError::ManagerDisposed);
        }
        if capacity == 0 {
            return Err(MemoryError::invalid_size(
                0,
                "arena capacity must be non-zero",
            ));
        }
        let capacity = capacity.max(min_capacity);
        let multiplier = if multiplier == 0 {
            self.inner.default_multiplier
        } else {
            multiplier
        };

        let mut raw = RawArena::new(
            Arc::clone(&self.inner.platform),
            name.to_string(),
            capacity,
            multiplier,
        )?;

        {
            let mut arenas = self.inner.arenas.lock();
            // Re-check under the lock: a concurrent dispose must not end up
            // with an unrevoked reservation it never saw.
            if self.inner.disposed.load(Ordering::Acquire) {
                drop(arenas);
                return Err(MemoryError::ManagerDisposed);
            }
            let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
            let control = Arc::new(ArenaControl {
                name: name.to_string(),
                capacity: raw.capacity(),
                allocated: AtomicUsize::new(0),
                committed: AtomicUsize::new(0),
                revoked: AtomicBool::new(false),
            });
            raw.attach(Registration {
                manager: Arc::downgrade(&self.inner),
                id,
                control: Arc::clone(&control),
            });
            arenas.push(ArenaRecord { id, control });
        }

        debug!(arena = name, capacity = raw.capacity(), "registered arena");
        Ok(raw)
    }

    /// Creates a byte-buffer arena with the manager's default granule.
    pub fn create_buffer(&self, name: &str, capacity: usize) -> Result<BufferArena> {
        self.create_buffer_with_multiplier(name, capacity, 0)
    }

    /// Creates a byte-buffer arena with an explicit commit-page multiplier
    /// (0 uses the manager's default).
    pub fn create_buffer_with_multiplier(
        &self,
        name: &str,
        capacity: usize,
        multiplier: usize,
    ) -> Result<BufferArena> {
        Ok(BufferArena::new(self.create_raw(
            name, capacity, multiplier, 1,
        )?))
    }

    /// Creates a typed-array arena with the manager's default granule.
    /// `capacity` is in bytes and is rounded up to hold at least one
    /// element.
    pub fn create_array<T: ArenaElement>(
        &self,
        name: &str,
        capacity: usize,
    ) -> Result<TypedArena<T>> {
        self.create_array_with_multiplier(name, capacity, 0)
    }

    /// Creates a typed-array arena with an explicit commit-page multiplier
    /// (0 uses the manager's default).
    pub fn create_array_with_multiplier<T: ArenaElement>(
        &self,
        name: &str,
        capacity: usize,
        multiplier: usize,
    ) -> Result<TypedArena<T>> {
        // Rules out zero-sized elements such as `[u8; 0]`, which the
        // element-count arithmetic could not represent.
        if mem::size_of::<T>() == 0 {
            return Err(MemoryError::invalid_config(
                "zero-sized element types are not supported",
            ));
        }
        let raw = self.create_raw(name, capacity, multiplier, mem::size_of::<T>())?;
        Ok(TypedArena::new(raw))
    }

    /// Diagnostic snapshots of every live arena, in registration order.
    pub fn arenas(&self) -> Vec<ArenaInfo> {
        self.inner
            .arenas
            .lock()
            .iter()
            .map(|record| ArenaInfo {
                name: record.control.name.clone(),
                capacity: record.control.capacity,
                committed: record.control.committed.load(Ordering::Relaxed),
                allocated: record.control.allocated.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Number of live arenas.
    pub fn arena_count(&self) -> usize {
        self.inner.arenas.lock().len()
    }

    /// The default commit-page multiplier applied when creation does not
    /// specify one.
    pub fn default_multiplier(&self) -> usize {
        self.inner.default_multiplier
    }

    /// The default commit granule in bytes (`page_size * multiplier`).
    pub fn default_granule(&self) -> usize {
        self.inner.platform.page_size() * self.inner.default_multiplier
    }

    /// Page size of the underlying handler.
    pub fn page_size(&self) -> usize {
        self.inner.platform.page_size()
    }

    /// Whether the manager has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Disposes the manager: no further arenas can be created, and every
    /// tracked arena is revoked in reverse registration order. Idempotent.
    /// Each arena's reservation is released when its owner drops it (every
    /// operation on it fails from here on). Dropping the manager disposes
    /// it too.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}
