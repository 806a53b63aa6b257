//! Error types for arena and platform-memory operations.

use crate::region::{MemoryRange, Protection};

/// Result type for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Memory operation errors.
///
/// Three channels, surfaced synchronously to the caller of the operation
/// that triggered them:
///
/// - caller bugs (`InvalidSize`, `MisalignedRange`, `OutOfBounds`,
///   `InvalidConfig`), detected before any syscall and without side effects;
/// - allocation failures (`ReserveFailed`, `PlatformFailure`,
///   `CapacityExhausted`, `NotWritable`, `NotReadable`), fatal to the
///   operation but not to the arena — the caller may reset, dispose, or
///   abandon it;
/// - state errors (`Disposed`, `ManagerDisposed`) for use after teardown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    /// Zero or otherwise unusable size or count.
    #[error("invalid size {size}: {reason}")]
    InvalidSize {
        /// The rejected value.
        size: usize,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A range whose base or size is not a page-size multiple (or is null)
    /// reached the platform layer.
    #[error("range {range} is not aligned to the {page_size}-byte page size")]
    MisalignedRange {
        /// The offending range.
        range: MemoryRange,
        /// Page size the range was validated against.
        page_size: usize,
    },

    /// Index or window outside the allocated extent.
    #[error("index {index} out of bounds (length {len})")]
    OutOfBounds {
        /// First out-of-range position.
        index: usize,
        /// Length of the allocated extent.
        len: usize,
    },

    /// Rejected configuration value.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: &'static str,
    },

    /// The OS declined to reserve address space.
    #[error("reservation of {size} bytes of address space failed")]
    ReserveFailed {
        /// Page-aligned size that was requested.
        size: usize,
    },

    /// A commit, uncommit, protect, or free syscall failed.
    #[error("{op} failed on {range} (flags {flags}, os error {errno})")]
    PlatformFailure {
        /// Which platform operation failed.
        op: &'static str,
        /// The range it was applied to.
        range: MemoryRange,
        /// The protection flags in effect for the call.
        flags: Protection,
        /// Raw OS error code, 0 when unavailable.
        errno: i32,
    },

    /// Bump allocation would grow past the reserved capacity.
    #[error(
        "arena '{name}' exhausted: requested {requested} bytes with {available} \
         of {capacity} available (allocated {allocated}, committed {committed})"
    )]
    CapacityExhausted {
        /// Name of the arena.
        name: String,
        /// Bytes the caller asked for.
        requested: usize,
        /// Bytes still available (capacity − allocated).
        available: usize,
        /// Total reserved bytes.
        capacity: usize,
        /// Bytes handed out so far.
        allocated: usize,
        /// Bytes currently committed.
        committed: usize,
    },

    /// Allocation attempted through an arena whose current protection does
    /// not permit writes.
    #[error("arena '{name}' is not writable (flags {flags})")]
    NotWritable {
        /// Name of the arena.
        name: String,
        /// Its current protection flags.
        flags: Protection,
    },

    /// View requested over an arena whose current protection does not
    /// permit reads.
    #[error("arena '{name}' is not readable (flags {flags})")]
    NotReadable {
        /// Name of the arena.
        name: String,
        /// Its current protection flags.
        flags: Protection,
    },

    /// Operation on an arena that has been disposed, or whose owning
    /// manager has been disposed.
    #[error("arena '{name}' is disposed")]
    Disposed {
        /// Name of the arena.
        name: String,
    },

    /// Arena creation attempted through a disposed manager.
    #[error("memory manager is disposed")]
    ManagerDisposed,
}

impl MemoryError {
    /// Create an invalid size error
    pub fn invalid_size(size: usize, reason: &'static str) -> Self {
        Self::InvalidSize { size, reason }
    }

    /// Create a misaligned range error
    pub fn misaligned(range: MemoryRange, page_size: usize) -> Self {
        Self::MisalignedRange { range, page_size }
    }

    /// Create an out of bounds error
    pub fn out_of_bounds(index: usize, len: usize) -> Self {
        Self::OutOfBounds { index, len }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(reason: &'static str) -> Self {
        Self::InvalidConfig { reason }
    }

    /// Create a platform failure error from the last OS error
    pub fn platform(op: &'static str, range: MemoryRange, flags: Protection) -> Self {
        Self::PlatformFailure {
            op,
            range,
            flags,
            errno: std::io::Error::last_os_error().raw_os_error().unwrap_or(0),
        }
    }

    /// Create a disposed-arena error
    pub fn disposed(name: impl Into<String>) -> Self {
        Self::Disposed { name: name.into() }
    }

    /// Whether this error came from the invalid-argument channel (a caller
    /// bug rather than a runtime allocation condition).
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Self::InvalidSize { .. }
                | Self::MisalignedRange { .. }
                | Self::OutOfBounds { .. }
                | Self::InvalidConfig { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        let err = MemoryError::invalid_size(0, "allocation size must be non-zero");
        assert_eq!(
            err.to_string(),
            "invalid size 0: allocation size must be non-zero"
        );

        let err = MemoryError::misaligned(MemoryRange::new(0x1001 as *mut u8, 0x1000), 4096);
        assert!(err.to_string().contains("0x1001"));
        assert!(err.to_string().contains("4096"));

        let err = MemoryError::CapacityExhausted {
            name: "events".into(),
            requested: 2,
            available: 1,
            capacity: 65536,
            allocated: 65535,
            committed: 65536,
        };
        assert!(err.to_string().contains("'events'"));
        assert!(err.to_string().contains("requested 2"));
    }

    #[test]
    fn channel_classification() {
        assert!(MemoryError::invalid_size(0, "x").is_invalid_argument());
        assert!(MemoryError::out_of_bounds(4, 4).is_invalid_argument());
        assert!(!MemoryError::ReserveFailed { size: 4096 }.is_invalid_argument());
        assert!(!MemoryError::ManagerDisposed.is_invalid_argument());
    }
}
