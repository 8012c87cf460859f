//! The placement record of a loaded image and the argument tuple passed to the kernel entry.

use core::fmt::{Display, Formatter, Result};

use crate::mem::{AddrRange, PAddr, VAddr, Word};

/// Where an image lives in physical memory and where it expects to live in virtual memory.
///
/// Both regions are half-open. `phys_virt_offset` is kept unsigned and all conversions wrap, so
/// that `virt + phys_virt_offset == phys` holds for any combination of low or high virtual and
/// physical addresses. For example, an image linked at `0xc000_0000` and placed at `0` on a 32-bit
/// machine gets an offset of `0x4000_0000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(C)]
pub struct ImagePlacement {
    pub phys_region_start: PAddr,
    pub phys_region_end: PAddr,
    pub virt_region_start: VAddr,
    pub virt_region_end: VAddr,
    pub virt_entry: VAddr,
    pub phys_virt_offset: Word,
}

impl ImagePlacement {
    /// The all-zero record.
    pub const fn empty() -> Self {
        Self {
            phys_region_start: 0,
            phys_region_end: 0,
            virt_region_start: 0,
            virt_region_end: 0,
            virt_entry: 0,
            phys_virt_offset: 0,
        }
    }

    /// Describe an image whose virtual region `[virt_start, virt_end)` has been placed at
    /// `dest_paddr`. The offset is derived from the two start addresses. Returns `None` if the
    /// virtual region is inverted or the physical end address would not be representable.
    pub const fn place(
        dest_paddr: PAddr,
        virt_start: VAddr,
        virt_end: VAddr,
        virt_entry: VAddr,
    ) -> Option<Self> {
        let Some(size) = virt_end.checked_sub(virt_start) else {
            return None;
        };
        let Some(phys_end) = dest_paddr.checked_add(size) else {
            return None;
        };
        Some(Self {
            phys_region_start: dest_paddr,
            phys_region_end: phys_end,
            virt_region_start: virt_start,
            virt_region_end: virt_end,
            virt_entry,
            phys_virt_offset: dest_paddr.wrapping_sub(virt_start),
        })
    }

    pub const fn phys_region(&self) -> AddrRange {
        AddrRange::new(self.phys_region_start, self.phys_region_end)
    }

    pub const fn virt_region(&self) -> AddrRange {
        AddrRange::new(self.virt_region_start, self.virt_region_end)
    }

    pub const fn virt_to_phys(&self, vaddr: VAddr) -> PAddr {
        vaddr.wrapping_add(self.phys_virt_offset)
    }

    pub const fn phys_to_virt(&self, paddr: PAddr) -> VAddr {
        paddr.wrapping_sub(self.phys_virt_offset)
    }

    /// Checks the record invariants: both regions are ordered and equally sized and the offset
    /// maps the virtual start onto the physical start.
    pub const fn is_consistent(&self) -> bool {
        self.phys_region_start <= self.phys_region_end
            && self.virt_region_start <= self.virt_region_end
            && self.phys_region_end - self.phys_region_start
                == self.virt_region_end - self.virt_region_start
            && self.phys_virt_offset == self.phys_region_start.wrapping_sub(self.virt_region_start)
    }
}

impl Display for ImagePlacement {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "paddr={} vaddr={} virt_entry={:#x} pv_offset={:#x}",
            self.phys_region(),
            self.virt_region(),
            self.virt_entry,
            self.phys_virt_offset,
        )
    }
}

/// The six register-sized arguments the kernel entry point is called with. This is a binary
/// interface with the kernel and the order of the fields must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct KernelEntryArgs {
    /// Start of the user image in physical memory.
    pub ui_p_reg_start: Word,
    /// End of the user image in physical memory.
    pub ui_p_reg_end: Word,
    /// Physical-to-virtual offset of the user image.
    pub pv_offset: Word,
    /// Virtual entry address of the user image.
    pub v_entry: Word,
    /// Device tree pointer, unused by this loader.
    pub dtb: Word,
    /// Device tree size, unused by this loader.
    pub dtb_size: Word,
}

impl KernelEntryArgs {
    pub const fn for_user_image(user: &ImagePlacement) -> Self {
        Self {
            ui_p_reg_start: user.phys_region_start,
            ui_p_reg_end: user.phys_region_end,
            pv_offset: user.phys_virt_offset,
            v_entry: user.virt_entry,
            dtb: 0,
            dtb_size: 0,
        }
    }

    /// The arguments in register order.
    pub const fn as_words(&self) -> [Word; 6] {
        [
            self.ui_p_reg_start,
            self.ui_p_reg_end,
            self.pv_offset,
            self.v_entry,
            self.dtb,
            self.dtb_size,
        ]
    }
}
