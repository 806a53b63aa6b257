//! Alignment arithmetic and byte-count formatting helpers.

/// Aligns a value up to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use reserva::utils::align_up;
///
/// assert_eq!(align_up(7, 8), 8);
/// assert_eq!(align_up(8, 8), 8);
/// assert_eq!(align_up(9, 8), 16);
/// ```
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Aligns a value down to the nearest multiple of alignment
///
/// # Examples
/// ```
/// use reserva::utils::align_down;
///
/// assert_eq!(align_down(7, 8), 0);
/// assert_eq!(align_down(8, 8), 8);
/// assert_eq!(align_down(9, 8), 8);
/// ```
#[inline(always)]
pub const fn align_down(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    value & !(alignment - 1)
}

/// Checks if a value is a multiple of alignment
///
/// # Examples
/// ```
/// use reserva::utils::is_aligned;
///
/// assert!(is_aligned(16, 8));
/// assert!(!is_aligned(17, 8));
/// ```
#[inline(always)]
pub const fn is_aligned(value: usize, alignment: usize) -> bool {
    debug_assert!(alignment.is_power_of_two());
    value & (alignment - 1) == 0
}

/// Aligns a value up to the nearest multiple of a granularity that need not
/// be a power of two. Used for commit-granule arithmetic, where the granule
/// is `page_size * multiplier` and the multiplier is arbitrary.
#[inline]
pub const fn round_up_to(value: usize, granularity: usize) -> usize {
    debug_assert!(granularity != 0);
    match value % granularity {
        0 => value,
        rem => value + (granularity - rem),
    }
}

/// Format a byte count for human-readable display.
///
/// Picks the largest of B/KiB/MiB/GiB/TiB that divides the value exactly;
/// anything that does not divide evenly is printed as raw bytes, so the
/// rendered value is never approximate.
///
/// # Examples
/// ```
/// use reserva::utils::format_bytes;
///
/// assert_eq!(format_bytes(65536), "64 KiB");
/// assert_eq!(format_bytes(1048576), "1 MiB");
/// assert_eq!(format_bytes(1000), "1000 B");
/// ```
pub fn format_bytes(bytes: usize) -> String {
    const UNITS: &[(usize, &str)] = &[
        (1 << 40, "TiB"),
        (1 << 30, "GiB"),
        (1 << 20, "MiB"),
        (1 << 10, "KiB"),
    ];

    for &(scale, unit) in UNITS {
        if bytes >= scale && bytes % scale == 0 {
            return format!("{} {}", bytes / scale, unit);
        }
    }
    format!("{} B", bytes)
}
