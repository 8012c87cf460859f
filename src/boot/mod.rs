//! Rust entry points of the loader, called by the reset code in [`crate::arch`]. The primary core
//! loads the kernel and releases the others, every core ends up jumping into the kernel.

use core::ptr;

use log::{debug, error, info};
use loader::smp::{CoreRegistry, ReleaseGate};
use loader::{secondary_main, BootConfig, BootSequencer, IdentityMapped};
use types::fmt::ByteSize;
use types::image::ImagePlacement;
use types::mem::AddrRange;

use crate::arch::{self, AArch64};
use crate::config::{KERNEL_LOAD_PADDR, MAX_NUM_NODES, USER_IMAGE};

/// The kernel placement, handed from the primary to the secondary cores. Secondary cores poll it
/// while `.bss` is cleared, so it must live in `.data`.
#[link_section = ".data.boot"]
static KERNEL_INFO: ReleaseGate<ImagePlacement> = ReleaseGate::new();

#[link_section = ".data.boot"]
static CORES: CoreRegistry<MAX_NUM_NODES> = CoreRegistry::new();

#[cfg(embedded_kernel)]
static KERNEL_ELF: &[u8] = include_bytes!(env!("KERNEL_ELF"));

#[cfg(not(embedded_kernel))]
static KERNEL_ELF: &[u8] = &[];

/// Physical memory occupied by the loader binary, including its stacks.
fn loader_footprint() -> AddrRange {
    // Symbols defined by linker script:
    extern "C" {
        static _text: u8;
        static _end: u8;
    }

    unsafe { AddrRange::new(ptr::addr_of!(_text) as usize, ptr::addr_of!(_end) as usize) }
}

/// Entry point of the primary core, with a stack and a cleared `.bss`.
#[no_mangle]
pub extern "C" fn loader_main(core_id: usize) -> ! {
    crate::logging::initialize_kernel_log();
    info!("ELF-loader v{} on core {}", env!("CARGO_PKG_VERSION"), core_id);
    CORES.mark_up(core_id);

    let footprint = loader_footprint();
    info!("  paddr={}", footprint);
    debug!(
        "Kernel ELF: {} embedded at {:p}",
        ByteSize::from(KERNEL_ELF.len()),
        KERNEL_ELF.as_ptr()
    );

    info!("{} of {} cores up", CORES.count_up(), MAX_NUM_NODES);
    for id in (0..MAX_NUM_NODES).filter(|&id| !CORES.is_core_up(id)) {
        debug!("Core {} not up yet, it will find the kernel released", id);
    }

    let config = BootConfig {
        kernel_name: "kernel",
        kernel_elf: KERNEL_ELF,
        kernel_load_paddr: KERNEL_LOAD_PADDR,
        loader_footprint: footprint,
        user_image: USER_IMAGE,
    };

    let (platform, memory) = unsafe {
        // SAFETY: This is the primary core and the MMU is still off.
        (AArch64::new(), IdentityMapped::new())
    };
    let mut sequencer = unsafe {
        // SAFETY: Nothing but this sequencer publishes `KERNEL_INFO`.
        BootSequencer::new(&platform, memory, config, &KERNEL_INFO)
    };
    let err = sequencer.run();
    error!(
        "Boot failed in state {:?} ({} of {} cores up): {}",
        sequencer.state(),
        CORES.count_up(),
        MAX_NUM_NODES,
        err
    );
    arch::halt_core();
}

/// Entry point of all other cores, with a stack. `.bss` may not have been cleared yet.
#[no_mangle]
pub extern "C" fn non_boot_main(core_id: usize) -> ! {
    CORES.mark_up(core_id);

    let platform = unsafe {
        // SAFETY: The secondary path only reads the boot tables.
        AArch64::new()
    };
    let err = secondary_main(&platform, &KERNEL_INFO, &USER_IMAGE);
    error!("Core {}: {}", core_id, err);
    arch::halt_core();
}

/// Zero `[__bss_start, __bss_end)`. Run by the primary core from the reset code, before any Rust
/// code that touches `.bss`.
pub unsafe extern "C" fn clear_bss() {
    extern "C" {
        static mut __bss_start: u8;
        static __bss_end: u8;
    }

    unsafe {
        let start = ptr::addr_of_mut!(__bss_start);
        let end = ptr::addr_of!(__bss_end);
        ptr::write_bytes(start, 0, end as usize - start as usize);
    }
}
