//! Translation tables of the boot address space, in the AArch64 VMSAv8-64 format with a 4 KiB
//! granule and 39-bit virtual addresses on both halves.
//!
//! The lower half (TTBR0) identity maps the first 512 GiB of physical memory, so the loader keeps
//! running after translation is switched on. The first GiB is split into 2 MiB blocks so that the
//! block holding the console can be mapped as device memory. The upper half (TTBR1) maps the
//! kernel window with 2 MiB blocks, from the start of the kernel to the end of its GiB.

use core::ptr;

use types::image::ImagePlacement;
use types::mem::{PAddr, VAddr};

/// Number of virtual address bits translated by each half.
pub const VA_BITS: u32 = 39;

/// Value of `TCR_EL1.T0SZ` and `TCR_EL1.T1SZ`.
pub const TXSZ: u64 = 64 - VA_BITS as u64;

/// Lowest address translated through TTBR1.
pub const UPPER_HALF_START: VAddr = usize::MAX << VA_BITS;

const ENTRIES: usize = 512;
const INDEX_BITS: u32 = 9;
const L2_BLOCK_BITS: u32 = 21;
const L1_BLOCK_BITS: u32 = 30;

/// `MAIR_EL1` attribute indices.
pub const MAIR_DEVICE: u64 = 0;
pub const MAIR_NORMAL: u64 = 1;

const DESC_VALID: u64 = 1 << 0;
const DESC_TABLE: u64 = 1 << 1;
const DESC_ATTR_INDEX_SHIFT: u64 = 2;
const DESC_INNER_SHAREABLE: u64 = 0b11 << 8;
const DESC_ACCESS_FLAG: u64 = 1 << 10;
const DESC_PXN: u64 = 1 << 53;
const DESC_UXN: u64 = 1 << 54;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryKind {
    Device,
    Normal,
}

/// Block descriptor for a level 1 (1 GiB) or level 2 (2 MiB) block at `paddr`.
pub const fn block_descriptor(paddr: PAddr, kind: MemoryKind) -> u64 {
    let desc = paddr as u64 | DESC_VALID | DESC_ACCESS_FLAG | DESC_UXN;
    match kind {
        MemoryKind::Device => desc | (MAIR_DEVICE << DESC_ATTR_INDEX_SHIFT) | DESC_PXN,
        MemoryKind::Normal => {
            desc | (MAIR_NORMAL << DESC_ATTR_INDEX_SHIFT) | DESC_INNER_SHAREABLE
        }
    }
}

/// Descriptor pointing to the next level table at `paddr`.
pub const fn table_descriptor(paddr: PAddr) -> u64 {
    paddr as u64 | DESC_VALID | DESC_TABLE
}

const fn index(vaddr: VAddr, block_bits: u32) -> usize {
    (vaddr >> block_bits) & (ENTRIES - 1)
}

#[repr(C, align(4096))]
pub struct Table(pub [u64; ENTRIES]);

impl Table {
    const fn empty() -> Self {
        Self([0; ENTRIES])
    }
}

/// The four tables of the boot address space. They must stay where they are once built, the
/// table descriptors hold their addresses.
#[repr(C)]
pub struct BootTables {
    pub lower_l1: Table,
    pub lower_l2: Table,
    pub upper_l1: Table,
    pub upper_l2: Table,
}

impl BootTables {
    pub const fn new() -> Self {
        Self {
            lower_l1: Table::empty(),
            lower_l2: Table::empty(),
            upper_l1: Table::empty(),
            upper_l2: Table::empty(),
        }
    }

    /// Fill in the tables for `kernel`, with the 2 MiB block holding `console` mapped as device
    /// memory. The table addresses are taken to be physical addresses.
    ///
    /// Panics if the kernel window can not be mapped with this layout: it has to be in the upper
    /// half, within a single GiB, and congruent to its physical location modulo 2 MiB.
    pub fn build(&mut self, kernel: &ImagePlacement, console: PAddr) {
        assert!(
            console < 1 << L1_BLOCK_BITS,
            "console {console:#x} is outside of the first GiB"
        );

        let lower_l2 = ptr::addr_of!(self.lower_l2) as PAddr;
        self.lower_l1.0[0] = table_descriptor(lower_l2);
        for (i, entry) in self.lower_l1.0.iter_mut().enumerate().skip(1) {
            *entry = block_descriptor(i << L1_BLOCK_BITS, MemoryKind::Normal);
        }

        let console_block = console >> L2_BLOCK_BITS;
        for (i, entry) in self.lower_l2.0.iter_mut().enumerate() {
            let kind = if i == console_block {
                MemoryKind::Device
            } else {
                MemoryKind::Normal
            };
            *entry = block_descriptor(i << L2_BLOCK_BITS, kind);
        }

        let window = kernel.virt_region();
        let last = window.last().unwrap_or(window.start);
        assert!(
            window.start >= UPPER_HALF_START,
            "kernel window {window} is not in the upper half"
        );
        assert_eq!(
            window.start >> L1_BLOCK_BITS,
            last >> L1_BLOCK_BITS,
            "kernel window {window} crosses a GiB boundary"
        );
        let block_mask = (1 << L2_BLOCK_BITS) - 1;
        assert_eq!(
            window.start & block_mask,
            kernel.phys_region_start & block_mask,
            "kernel window {window} is not 2 MiB congruent to its physical location"
        );

        let upper_l2 = ptr::addr_of!(self.upper_l2) as PAddr;
        self.upper_l1.0[index(window.start, L1_BLOCK_BITS)] = table_descriptor(upper_l2);

        let mut paddr = kernel.phys_region_start & !block_mask;
        for entry in &mut self.upper_l2.0[index(window.start, L2_BLOCK_BITS)..] {
            *entry = block_descriptor(paddr, MemoryKind::Normal);
            paddr += 1 << L2_BLOCK_BITS;
        }
    }
}

const _: () = assert!(INDEX_BITS + L2_BLOCK_BITS == L1_BLOCK_BITS);
const _: () = assert!(INDEX_BITS + L1_BLOCK_BITS == VA_BITS);

#[cfg(test)]
mod tests {
    use super::*;

    const KERNEL_VBASE: VAddr = 0xffff_ff80_0000_0000;

    fn kernel(phys: PAddr, virt: VAddr, size: usize) -> ImagePlacement {
        ImagePlacement::place(phys, virt, virt + size, virt).unwrap()
    }

    fn tables() -> Box<BootTables> {
        Box::new(BootTables::new())
    }

    #[test]
    fn lower_half_is_identity() {
        let mut tables = tables();
        tables.build(&kernel(0xe200000, KERNEL_VBASE, 0x40000), 0x0900_0000);

        let lower_l2 = ptr::addr_of!(tables.lower_l2) as PAddr;
        assert_eq!(tables.lower_l1.0[0], table_descriptor(lower_l2));
        assert_eq!(
            tables.lower_l1.0[1],
            block_descriptor(0x4000_0000, MemoryKind::Normal)
        );
        assert_eq!(
            tables.lower_l1.0[511],
            block_descriptor(511 << 30, MemoryKind::Normal)
        );
        assert_eq!(
            tables.lower_l2.0[0x71],
            block_descriptor(0xe200000, MemoryKind::Normal)
        );
    }

    #[test]
    fn console_block_is_device_memory() {
        let mut tables = tables();
        tables.build(&kernel(0xe200000, KERNEL_VBASE, 0x40000), 0x0900_0000);

        let devices: Vec<usize> = (0..ENTRIES)
            .filter(|&i| tables.lower_l2.0[i] & (0b111 << DESC_ATTR_INDEX_SHIFT) == 0)
            .collect();
        assert_eq!(devices, vec![0x48]);
        assert_eq!(
            tables.lower_l2.0[0x48],
            block_descriptor(0x0900_0000, MemoryKind::Device)
        );
    }

    #[test]
    fn kernel_window_to_end_of_gib() {
        let mut tables = tables();
        let vbase = KERNEL_VBASE + 0x20_0000;
        tables.build(&kernel(0xe200000, vbase, 0x40000), 0x0900_0000);

        let upper_l2 = ptr::addr_of!(tables.upper_l2) as PAddr;
        assert_eq!(tables.upper_l1.0[0], table_descriptor(upper_l2));
        assert!(tables.upper_l1.0[1..].iter().all(|&desc| desc == 0));

        assert_eq!(tables.upper_l2.0[0], 0);
        assert_eq!(
            tables.upper_l2.0[1],
            block_descriptor(0xe200000, MemoryKind::Normal)
        );
        assert_eq!(
            tables.upper_l2.0[511],
            block_descriptor(0xe200000 + 510 * 0x20_0000, MemoryKind::Normal)
        );
    }

    #[test]
    fn unaligned_kernel_start_maps_enclosing_block() {
        let mut tables = tables();
        tables.build(&kernel(0xe201000, KERNEL_VBASE + 0x1000, 0x1000), 0x0900_0000);
        assert_eq!(
            tables.upper_l2.0[0],
            block_descriptor(0xe200000, MemoryKind::Normal)
        );
    }

    #[test]
    #[should_panic(expected = "upper half")]
    fn lower_half_kernel() {
        tables().build(&kernel(0xe200000, 0x8000_0000, 0x40000), 0x0900_0000);
    }

    #[test]
    #[should_panic(expected = "crosses a GiB boundary")]
    fn kernel_across_gib() {
        tables().build(
            &kernel(0xe200000, KERNEL_VBASE + 0x3fe0_0000, 0x40_0000),
            0x0900_0000,
        );
    }

    #[test]
    #[should_panic(expected = "congruent")]
    fn kernel_not_congruent() {
        tables().build(&kernel(0xe201000, KERNEL_VBASE, 0x1000), 0x0900_0000);
    }

    #[test]
    fn descriptor_bits() {
        assert_eq!(table_descriptor(0x4000_1000), 0x4000_1003);
        let device = block_descriptor(0x0900_0000, MemoryKind::Device);
        assert_eq!(device & 0b11, 0b01);
        assert_ne!(device & DESC_ACCESS_FLAG, 0);
        assert_ne!(device & DESC_PXN, 0);
        let normal = block_descriptor(0x4000_0000, MemoryKind::Normal);
        assert_eq!(normal & DESC_PXN, 0);
        assert_eq!((normal >> DESC_ATTR_INDEX_SHIFT) & 0b111, MAIR_NORMAL);
    }
}
