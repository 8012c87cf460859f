//! Build configuration of the loader for the target machine.

use log::LevelFilter;
use types::image::ImagePlacement;
use types::mem::PAddr;

/// Number of cores that take part in booting. Cores with a higher affinity-0 number are parked.
pub const MAX_NUM_NODES: usize = 2;

/// Base address of the PL011 console.
pub const PLAT_MMIO_PADDR: PAddr = 0x0900_0000;

/// Physical address the kernel image is loaded to.
pub const KERNEL_LOAD_PADDR: PAddr = 0x0e20_0000;

/// Size of the stack of each core.
pub const STACK_SIZE: usize = 4096;

/// The image the kernel starts as its first task. It is put into place by an earlier boot stage,
/// the loader only hands its location to the kernel.
pub const USER_IMAGE: ImagePlacement = ImagePlacement {
    phys_region_start: 0xe600000,
    phys_region_end: 0xe620000,
    virt_region_start: 0x400000,
    virt_region_end: 0x420000,
    virt_entry: 0x400000,
    phys_virt_offset: 0xe200000,
};

const _: () = assert!(USER_IMAGE.is_consistent());

pub const LOG_LEVEL: LevelFilter = if cfg!(debug_assertions) {
    LevelFilter::Debug
} else {
    LevelFilter::Info
};
