use log::error;
use types::mem::{AddrRange, PAddr};

use crate::LoadError;

/// Ensure that the physical range `[paddr_min, paddr_max)` can be written without overwriting the
/// loader, whose code and data occupy `loader`. The loader range is widened to page boundaries
/// before the comparison.
pub fn ensure_phys_range_valid(
    paddr_min: PAddr,
    paddr_max: PAddr,
    loader: AddrRange,
) -> Result<(), LoadError> {
    let loader = loader.page_aligned_outward().ok_or(LoadError::Overflow)?;
    let image = AddrRange::new(paddr_min, paddr_max);
    if image.overlaps(&loader) {
        error!("Image load address {} overlaps with ELF-loader {}", image, loader);
        return Err(LoadError::Overlap { image, loader });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use types::mem::PAGE_SIZE;

    const LOADER: AddrRange = AddrRange::new(0x1000, 0x2000);

    #[test]
    fn adjacent_ranges_are_accepted() {
        assert_eq!(ensure_phys_range_valid(0x2000, 0x3000, LOADER), Ok(()));
        assert_eq!(ensure_phys_range_valid(0x0, 0x1000, LOADER), Ok(()));
    }

    #[test]
    fn single_shared_byte_is_rejected() {
        assert_eq!(
            ensure_phys_range_valid(0x1fff, 0x2fff, LOADER),
            Err(LoadError::Overlap {
                image: AddrRange::new(0x1fff, 0x2fff),
                loader: LOADER,
            })
        );
        assert!(ensure_phys_range_valid(0x0, 0x1001, LOADER).is_err());
    }

    #[test]
    fn destination_covering_the_loader_is_rejected() {
        assert!(ensure_phys_range_valid(0x0, 0x10_0000, LOADER).is_err());
        assert!(ensure_phys_range_valid(0x1400, 0x1800, LOADER).is_err());
    }

    #[test]
    fn loader_footprint_is_widened_to_pages() {
        // The loader ends in the middle of page 0x8_1000, so that whole page is off limits.
        let loader = AddrRange::new(0x8_0000, 0x8_1234);
        assert!(ensure_phys_range_valid(0x8_1800, 0x8_2000, loader).is_err());
        assert_eq!(ensure_phys_range_valid(0x8_2000, 0x8_3000, loader), Ok(()));
    }

    #[test]
    fn unrepresentable_footprint() {
        let loader = AddrRange::new(usize::MAX - 0x10, usize::MAX);
        assert_eq!(
            ensure_phys_range_valid(0x1000, 0x2000, loader),
            Err(LoadError::Overflow)
        );
    }

    proptest! {
        #[test]
        fn accepted_iff_no_byte_in_loader_pages(
            start in 0usize..0x10_000,
            len in 0usize..0x4000,
            loader_start in 0x4000usize..0x8000,
            loader_len in 1usize..0x3000,
        ) {
            let loader = AddrRange::new(loader_start, loader_start + loader_len);
            let pages_start = loader_start / PAGE_SIZE * PAGE_SIZE;
            let pages_end = (loader.end + PAGE_SIZE - 1) / PAGE_SIZE * PAGE_SIZE;
            let clear = len == 0 || start + len <= pages_start || start >= pages_end;
            prop_assert_eq!(ensure_phys_range_valid(start, start + len, loader).is_ok(), clear);
        }
    }
}
