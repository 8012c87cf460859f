//! Addresses, page granularity and half-open address ranges.
//!
//! All arithmetic in here is done on unsigned integers. Operations that may wrap are either
//! checked (and return `None`) or explicitly wrapping where wraparound is part of the contract.

use core::fmt::{Debug, Display, Formatter, Result};

/// Physical address.
pub type PAddr = usize;

/// Virtual address.
pub type VAddr = usize;

/// A register-sized value as it is passed to the kernel.
pub type Word = usize;

/// The loader works in 4 KiB pages.
pub const PAGE_BITS: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_BITS;

/// A load destination must allow 32-bit word accesses, independent of the page alignment.
pub const WORD_ACCESS_BITS: u32 = 2;

/// Returns `true` if the lowest `bits` bits of `value` are clear.
pub const fn is_aligned(value: u64, bits: u32) -> bool {
    value & ((1u64 << bits) - 1) == 0
}

/// Rounds `value` up to the next multiple of `1 << bits`. Returns `None` if that multiple is not
/// representable.
pub const fn round_up(value: u64, bits: u32) -> Option<u64> {
    let mask = (1u64 << bits) - 1;
    match value.checked_add(mask) {
        Some(value) => Some(value & !mask),
        None => None,
    }
}

/// Rounds `value` down to a multiple of `1 << bits`.
pub const fn round_down(value: u64, bits: u32) -> u64 {
    value & !((1u64 << bits) - 1)
}

/// Determines whether the closed intervals `[start_a, end_a]` and `[start_b, end_b]` share at
/// least one byte. Intervals that touch (`end_a == start_b`) overlap. Callers holding half-open
/// ranges have to pass `end - 1`.
pub const fn regions_overlap(start_a: usize, end_a: usize, start_b: usize, end_b: usize) -> bool {
    !(end_a < start_b || end_b < start_a)
}

/// A half-open range `[start, end)` of addresses.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrRange {
    pub start: usize,
    pub end: usize,
}

impl AddrRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Range of `len` bytes starting at `start`, or `None` if the end address would wrap.
    pub const fn from_len(start: usize, len: usize) -> Option<Self> {
        match start.checked_add(len) {
            Some(end) => Some(Self { start, end }),
            None => None,
        }
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// The last address inside the range.
    pub const fn last(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(self.end - 1)
        }
    }

    /// Check whether the two ranges share at least one byte. Empty ranges overlap nothing.
    pub const fn overlaps(&self, other: &AddrRange) -> bool {
        match (self.last(), other.last()) {
            (Some(last), Some(other_last)) => {
                regions_overlap(self.start, last, other.start, other_last)
            }
            _ => false,
        }
    }

    /// Grow the range to page boundaries: round the start down and the end up.
    pub const fn page_aligned_outward(&self) -> Option<Self> {
        match round_up(self.end as u64, PAGE_BITS) {
            Some(end) if end <= usize::MAX as u64 => Some(Self {
                start: round_down(self.start as u64, PAGE_BITS) as usize,
                end: end as usize,
            }),
            _ => None,
        }
    }
}

impl Display for AddrRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.last() {
            Some(last) => write!(f, "[{:#x}..{:#x}]", self.start, last),
            None => write!(f, "[{:#x}..] (empty)", self.start),
        }
    }
}

impl Debug for AddrRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{:#x}..{:#x}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn touching_closed_intervals_overlap() {
        assert!(regions_overlap(0x1000, 0x2000, 0x2000, 0x3000));
        assert!(regions_overlap(0x2000, 0x3000, 0x1000, 0x2000));
        assert!(!regions_overlap(0x1000, 0x1fff, 0x2000, 0x3000));
    }

    #[test]
    fn adjacent_half_open_ranges_do_not_overlap() {
        let footprint = AddrRange::new(0x1000, 0x2000);
        assert!(!AddrRange::new(0x2000, 0x3000).overlaps(&footprint));
        assert!(AddrRange::new(0x1fff, 0x2fff).overlaps(&footprint));
        assert!(!AddrRange::new(0x0, 0x1000).overlaps(&footprint));
    }

    #[test]
    fn empty_range_overlaps_nothing() {
        let footprint = AddrRange::new(0x1000, 0x2000);
        assert!(!AddrRange::new(0x1800, 0x1800).overlaps(&footprint));
        assert_eq!(AddrRange::new(0x1800, 0x1800).last(), None);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_up(0x403001, PAGE_BITS), Some(0x404000));
        assert_eq!(round_up(0x404000, PAGE_BITS), Some(0x404000));
        assert_eq!(round_up(0, PAGE_BITS), Some(0));
        assert_eq!(round_up(u64::MAX, PAGE_BITS), None);
        assert_eq!(round_down(0x1fff, PAGE_BITS), 0x1000);
    }

    #[test]
    fn page_before_boundary_is_unaligned() {
        assert!(is_aligned(0xe200000, PAGE_BITS));
        assert!(!is_aligned(0xe200000 - 1, PAGE_BITS));
        assert!(!is_aligned(0xe200002, WORD_ACCESS_BITS));
        assert!(is_aligned(0xe200004, WORD_ACCESS_BITS));
    }

    #[test]
    fn outward_alignment() {
        let range = AddrRange::new(0x8_0123, 0x9_0456).page_aligned_outward();
        assert_eq!(range, Some(AddrRange::new(0x8_0000, 0x9_1000)));
        assert_eq!(AddrRange::new(0, usize::MAX).page_aligned_outward(), None);
    }

    #[test]
    fn from_len_detects_wrap() {
        assert_eq!(AddrRange::from_len(0x1000, 0x1000), Some(AddrRange::new(0x1000, 0x2000)));
        assert_eq!(AddrRange::from_len(usize::MAX, 1), None);
    }

    #[test]
    fn display_uses_inclusive_end() {
        assert_eq!(format!("{}", AddrRange::new(0x1000, 0x2000)), "[0x1000..0x1fff]");
    }

    proptest! {
        #[test]
        fn overlap_iff_shared_byte(a in 0usize..64, la in 0usize..16, b in 0usize..64, lb in 0usize..16) {
            let (end_a, end_b) = (a + la, b + lb);
            let shared = (a..=end_a).any(|byte| (b..=end_b).contains(&byte));
            prop_assert_eq!(regions_overlap(a, end_a, b, end_b), shared);
            prop_assert_eq!(regions_overlap(a, end_a, b, end_b), regions_overlap(b, end_b, a, end_a));
        }

        #[test]
        fn round_up_is_aligned_and_minimal(value in 0u64..(1 << 40)) {
            let rounded = round_up(value, PAGE_BITS).unwrap();
            prop_assert!(is_aligned(rounded, PAGE_BITS));
            prop_assert!(rounded >= value);
            prop_assert!(rounded - value < PAGE_SIZE as u64);
        }
    }
}
