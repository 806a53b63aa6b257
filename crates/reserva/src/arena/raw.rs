//! The arena core: one reservation, a bump cursor, and commit bookkeeping.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, trace};

use crate::error::{MemoryError, Result};
use crate::manager::Registration;
use crate::platform::VirtualMemory;
use crate::region::{MemoryRange, Protection};
use crate::utils::{format_bytes, round_up_to};

use super::ResetPolicy;

/// Core state shared by the byte-buffer and typed-array projections.
///
/// Owns its reservation exclusively: the range is mapped in `new`, unmapped
/// in `dispose` (or `Drop`), and nothing else ever holds it. Views returned
/// by the projections are reborrows of this memory whose lifetimes the
/// borrow checker ties to the arena itself.
pub(crate) struct RawArena {
    platform: Arc<dyn VirtualMemory>,
    range: MemoryRange,
    committed: usize,
    allocated: usize,
    granule: usize,
    protection: Protection,
    name: String,
    disposed: bool,
    registration: Option<Registration>,
}

impl RawArena {
    /// Reserves `capacity` bytes (rounded up to a whole number of commit
    /// granules) and constructs the arena around the reservation.
    pub(crate) fn new(
        platform: Arc<dyn VirtualMemory>,
        name: String,
        capacity: usize,
        multiplier: usize,
    ) -> Result<Self> {
        if capacity == 0 {
            return Err(MemoryError::invalid_size(
                0,
                "arena capacity must be non-zero",
            ));
        }
        if multiplier == 0 {
            return Err(MemoryError::invalid_config(
                "commit-page multiplier must be at least 1",
            ));
        }

        let granule = platform.page_size() * multiplier;
        let capacity = round_up_to(capacity, granule);
        let range = platform.reserve(capacity)?;
        debug_assert_eq!(range.size(), capacity);

        debug!(
            arena = %name,
            capacity,
            granule,
            base = range.base() as usize,
            "reserved arena"
        );

        Ok(Self {
            platform,
            range,
            committed: 0,
            allocated: 0,
            granule,
            protection: Protection::READ_WRITE,
            name,
            disposed: false,
            registration: None,
        })
    }

    /// Attaches the manager bookkeeping record. Called once, right after
    /// construction, while the manager still holds its collection lock.
    pub(crate) fn attach(&mut self, registration: Registration) {
        debug_assert!(self.registration.is_none());
        registration.publish(self.allocated, self.committed);
        self.registration = Some(registration);
    }

    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(MemoryError::disposed(self.name.as_str()));
        }
        if let Some(registration) = &self.registration {
            if registration.is_revoked() {
                return Err(MemoryError::disposed(self.name.as_str()));
            }
        }
        Ok(())
    }

    fn publish(&self) {
        if let Some(registration) = &self.registration {
            registration.publish(self.allocated, self.committed);
        }
    }

    /// Advances the bump cursor by `size` bytes, committing further granules
    /// from the reservation when the cursor crosses the committed frontier.
    /// Returns the byte offset of the new span within the arena.
    ///
    /// Fails without mutating any state: either the whole operation happens
    /// (counters advance together, after a successful commit if one was
    /// needed) or nothing does.
    pub(crate) fn bump(&mut self, size: usize) -> Result<usize> {
        self.ensure_live()?;
        if size == 0 {
            return Err(MemoryError::invalid_size(
                0,
                "allocation size must be non-zero",
            ));
        }

        let new_allocated = self
            .allocated
            .checked_add(size)
            .ok_or(MemoryError::InvalidSize {
                size,
                reason: "allocation size overflows the cursor",
            })?;

        if new_allocated > self.committed {
            let target = round_up_to(new_allocated, self.granule);
            if target > self.capacity() {
                return Err(MemoryError::CapacityExhausted {
                    name: self.name.clone(),
                    requested: size,
                    available: self.capacity() - self.allocated,
                    capacity: self.capacity(),
                    allocated: self.allocated,
                    committed: self.committed,
                });
            }
            let growth = self.range.subrange(self.committed, target - self.committed);
            self.platform.commit(growth, self.protection)?;
            trace!(
                arena = %self.name,
                committed = target,
                grew_by = target - self.committed,
                "committed additional granules"
            );
            self.committed = target;
        }

        let offset = self.allocated;
        self.allocated = new_allocated;
        self.publish();
        Ok(offset)
    }

    /// Reapplies `protection` over the entire committed prefix and records
    /// it for future commits. With nothing committed this only records the
    /// flags.
    pub(crate) fn protect(&mut self, protection: Protection) -> Result<()> {
        self.ensure_live()?;
        if self.committed > 0 {
            self.platform
                .protect(self.range.subrange(0, self.committed), protection)?;
        }
        self.protection = protection;
        Ok(())
    }

    /// Moves the cursor back to zero, releasing committed memory according
    /// to `policy`. Counters are only updated once the uncommit syscall (if
    /// any) has succeeded.
    pub(crate) fn reset(&mut self, policy: ResetPolicy) -> Result<()> {
        self.ensure_live()?;
        match policy {
            ResetPolicy::Decommit => {
                if self.committed > 0 {
                    self.platform
                        .uncommit(self.range.subrange(0, self.committed))?;
                    self.committed = 0;
                }
            }
            ResetPolicy::KeepAllCommitted => {}
            ResetPolicy::KeepMinimalCommitted => {
                let keep = self.granule.min(self.committed);
                if self.committed > keep {
                    self.platform
                        .uncommit(self.range.subrange(keep, self.committed - keep))?;
                    self.committed = keep;
                }
            }
        }
        self.allocated = 0;
        self.publish();
        debug!(arena = %self.name, ?policy, committed = self.committed, "arena reset");
        Ok(())
    }

    /// Releases the reservation and zeroes all state. Idempotent; every
    /// operation after the first call fails with a disposed error.
    pub(crate) fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        // Leave the manager's collection before touching the mapping, so
        // diagnostics never observe a freed range.
        if let Some(registration) = self.registration.take() {
            registration.detach();
        }

        if !self.range.is_null() {
            if let Err(err) = self.platform.free(self.range) {
                // A failed unmap of a range this arena owns means the
                // process address space is corrupt; nothing can be retried.
                error!(arena = %self.name, %err, "failed to release arena reservation");
                debug_assert!(false, "failed to release arena reservation: {err}");
            }
        }
        debug!(arena = %self.name, "arena disposed");

        self.range = MemoryRange::NULL;
        self.committed = 0;
        self.allocated = 0;
        self.protection = Protection::NONE;
    }

    /// Total reserved bytes (0 once disposed).
    pub(crate) fn capacity(&self) -> usize {
        self.range.size()
    }

    pub(crate) fn committed(&self) -> usize {
        self.committed
    }

    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    /// Bytes still available for bump allocation (capacity − allocated).
    pub(crate) fn available(&self) -> usize {
        self.capacity() - self.allocated
    }

    pub(crate) fn granule(&self) -> usize {
        self.granule
    }

    pub(crate) fn protection(&self) -> Protection {
        self.protection
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn base(&self) -> *mut u8 {
        self.range.base()
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Pointer `offset` bytes into the reservation.
    ///
    /// Callers must keep `offset` within the allocated extent; the
    /// projections derive it from the cursor, which the invariants bound.
    pub(crate) fn ptr_at(&self, offset: usize) -> *mut u8 {
        debug_assert!(offset <= self.capacity());
        // SAFETY: offset stays within the reservation, so the arithmetic
        // stays within one mapped object.
        unsafe { self.range.base().add(offset) }
    }
}

impl Drop for RawArena {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Display for RawArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Arena {{ name: {}, base: {:#x}, allocated: {}, committed: {}, available: {}, flags: {} }}",
            self.name,
            self.range.base() as usize,
            format_bytes(self.allocated),
            format_bytes(self.committed),
            format_bytes(self.available()),
            self.protection,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::default_platform;

    fn arena(capacity: usize) -> RawArena {
        RawArena::new(default_platform(), "test".into(), capacity, 1).unwrap()
    }

    #[test]
    fn rejects_zero_capacity_and_multiplier() {
        let platform = default_platform();
        assert!(matches!(
            RawArena::new(platform.clone(), "z".into(), 0, 1),
            Err(MemoryError::InvalidSize { .. })
        ));
        assert!(matches!(
            RawArena::new(platform, "z".into(), 4096, 0),
            Err(MemoryError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn capacity_rounds_up_to_granule() {
        let platform = default_platform();
        let page = platform.page_size();
        let mut arena = RawArena::new(platform, "round".into(), page + 1, 4).unwrap();
        assert_eq!(arena.capacity(), page * 4);
        assert_eq!(arena.granule(), page * 4);
        arena.dispose();
    }

    #[test]
    fn bump_grows_commitment_in_granules() {
        let mut arena = arena(1 << 20);
        let page = arena.granule();

        assert_eq!(arena.bump(100).unwrap(), 0);
        assert_eq!(arena.allocated(), 100);
        assert_eq!(arena.committed(), page);

        // Stays within the first granule: no further commit.
        assert_eq!(arena.bump(100).unwrap(), 100);
        assert_eq!(arena.committed(), page);

        // Crossing the frontier commits the next granule.
        assert_eq!(arena.bump(page).unwrap(), 200);
        assert_eq!(arena.committed(), page * 2);
    }

    #[test]
    fn bump_failure_leaves_state_untouched() {
        let mut arena = arena(4096);
        arena.bump(10).unwrap();
        let (allocated, committed) = (arena.allocated(), arena.committed());

        let err = arena.bump(arena.capacity()).unwrap_err();
        assert!(matches!(err, MemoryError::CapacityExhausted { .. }));
        assert_eq!(arena.allocated(), allocated);
        assert_eq!(arena.committed(), committed);

        assert!(matches!(
            arena.bump(0),
            Err(MemoryError::InvalidSize { .. })
        ));
        assert_eq!(arena.allocated(), allocated);
    }

    #[test]
    fn exact_fit_then_one_more_byte() {
        let mut arena = arena(8192);
        let capacity = arena.capacity();
        arena.bump(capacity).unwrap();
        assert_eq!(arena.available(), 0);
        assert_eq!(arena.committed(), capacity);

        let err = arena.bump(1).unwrap_err();
        match err {
            MemoryError::CapacityExhausted {
                requested,
                available,
                ..
            } => {
                assert_eq!(requested, 1);
                assert_eq!(available, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reset_policies() {
        let mut arena = arena(1 << 20);
        let granule = arena.granule();
        arena.bump(granule * 3 + 1).unwrap();
        assert_eq!(arena.committed(), granule * 4);

        arena.reset(ResetPolicy::KeepAllCommitted).unwrap();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.committed(), granule * 4);

        arena.bump(granule * 2).unwrap();
        arena.reset(ResetPolicy::KeepMinimalCommitted).unwrap();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.committed(), granule);

        arena.reset(ResetPolicy::Decommit).unwrap();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.committed(), 0);

        // Resetting an empty arena is a no-op, not an error.
        arena.reset(ResetPolicy::Decommit).unwrap();
    }

    #[test]
    fn base_is_stable_until_dispose() {
        let mut arena = arena(1 << 20);
        let base = arena.base();
        arena.bump(100_000).unwrap();
        assert_eq!(arena.base(), base);
        arena.reset(ResetPolicy::Decommit).unwrap();
        assert_eq!(arena.base(), base);

        arena.dispose();
        assert!(arena.base().is_null());
        assert_eq!(arena.capacity(), 0);
        assert_eq!(arena.committed(), 0);
        assert_eq!(arena.allocated(), 0);
    }

    #[test]
    fn dispose_is_idempotent_and_fails_later_operations() {
        let mut arena = arena(4096);
        arena.dispose();
        arena.dispose();
        assert!(matches!(arena.bump(1), Err(MemoryError::Disposed { .. })));
        assert!(matches!(
            arena.reset(ResetPolicy::Decommit),
            Err(MemoryError::Disposed { .. })
        ));
        assert!(matches!(
            arena.protect(Protection::READ),
            Err(MemoryError::Disposed { .. })
        ));
    }

    #[test]
    fn protect_records_flags_for_future_commits() {
        let mut arena = arena(1 << 20);
        // Nothing committed yet: recording only.
        arena.protect(Protection::READ_WRITE).unwrap();
        assert_eq!(arena.protection(), Protection::READ_WRITE);

        arena.bump(16).unwrap();
        arena.protect(Protection::READ).unwrap();
        assert_eq!(arena.protection(), Protection::READ);
        // Idempotent re-apply.
        arena.protect(Protection::READ).unwrap();
        assert_eq!(arena.protection(), Protection::READ);

        // Restore writability so later growth commits writable pages.
        arena.protect(Protection::READ_WRITE).unwrap();
        arena.bump(arena.granule()).unwrap();
    }

    #[test]
    fn display_renders_diagnostic_form() {
        let mut arena = arena(1 << 20);
        arena.bump(1024).unwrap();
        let rendered = arena.to_string();
        assert!(rendered.starts_with("Arena { name: test, base: 0x"));
        assert!(rendered.contains("allocated: 1 KiB"));
        assert!(rendered.contains("committed: "));
        assert!(rendered.ends_with("flags: rw- }"));
    }
}
