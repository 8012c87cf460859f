//! Reset entry, CPU control and the [`Platform`] of AArch64 machines, running at EL1.

use core::arch::global_asm;
use core::ptr;

use aarch64_cpu::asm;
use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::*;
use loader::Platform;
use types::image::{ImagePlacement, KernelEntryArgs};
use types::mem::{VAddr, Word};

use crate::arch::paging::BootTables;
use crate::config::{MAX_NUM_NODES, PLAT_MMIO_PADDR, STACK_SIZE};

mod mmu;
pub mod pl011;

#[repr(C, align(16))]
struct Stacks([[u8; STACK_SIZE]; MAX_NUM_NODES]);

/// One stack per core. Kept out of `.bss`, which the primary core clears while running on its
/// stack.
#[link_section = ".stacks"]
static mut STACKS: Stacks = Stacks([[0; STACK_SIZE]; MAX_NUM_NODES]);

/// Built by the primary core before the other cores are released, read-only afterwards.
static mut BOOT_TABLES: BootTables = BootTables::new();

// Every core starts here, with the MMU off. The affinity-0 field of `MPIDR_EL1` selects the stack
// (which grows down from the end of the core's slot) and the path: core 0 clears `.bss` and runs
// `loader_main()`, the other cores run `non_boot_main()`. Cores beyond `MAX_NUM_NODES` are parked.
// Both Rust entry points receive the core number as first argument.
global_asm!(
    ".section .text.boot, \"ax\"",
    ".global _start",
    "_start:",
    "    mrs     x19, mpidr_el1",
    "    and     x19, x19, #0xff",
    "    cmp     x19, #{max_nodes}",
    "    b.hs    3f",
    "    adrp    x1, {stacks}",
    "    add     x1, x1, :lo12:{stacks}",
    "    add     x2, x19, #1",
    "    mov     x3, #{stack_size}",
    "    madd    x1, x2, x3, x1",
    "    mov     sp, x1",
    "    cbnz    x19, 2f",
    "    bl      {clear_bss}",
    "    mov     x0, x19",
    "    b       {loader_main}",
    "2:  mov     x0, x19",
    "    b       {non_boot_main}",
    "3:  wfe",
    "    b       3b",
    max_nodes = const MAX_NUM_NODES,
    stack_size = const STACK_SIZE,
    stacks = sym STACKS,
    clear_bss = sym crate::boot::clear_bss,
    loader_main = sym crate::boot::loader_main,
    non_boot_main = sym crate::boot::non_boot_main,
);

/// Disable interrupts and stop execution on this core indefinitely.
pub fn halt_core() -> ! {
    DAIF.write(DAIF::D::Masked + DAIF::A::Masked + DAIF::I::Masked + DAIF::F::Masked);
    loop {
        asm::wfe();
    }
}

/// Signature of the kernel entry point.
type KernelEntry = unsafe extern "C" fn(Word, Word, Word, Word, Word, Word);

/// The machine as seen by the boot sequence. Zero sized, every core makes its own.
pub struct AArch64 {
    _private: (),
}

impl AArch64 {
    /// ### Safety
    ///
    /// Must only be used by the loader's own boot and secondary paths. These own the boot tables
    /// and the console.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Platform for AArch64 {
    fn init_boot_vspace(&self, kernel: &ImagePlacement) {
        unsafe {
            // SAFETY: Only the primary core builds the tables, before any other core uses them.
            (*ptr::addr_of_mut!(BOOT_TABLES)).build(kernel, PLAT_MMIO_PADDR);
        }
    }

    fn enable_mmu(&self) {
        unsafe {
            // SAFETY: The tables are complete once the kernel has been released, and the release
            // orders their writes before this read.
            mmu::enable(ptr::addr_of!(BOOT_TABLES));
        }
    }

    fn cpu_idle(&self) {
        barrier::dsb(barrier::SY);
        asm::wfe();
    }

    fn notify_secondaries(&self) {
        barrier::dsb(barrier::SY);
        asm::sev();
    }

    fn enter_kernel(&self, entry: VAddr, args: KernelEntryArgs) {
        let [a0, a1, a2, a3, a4, a5] = args.as_words();
        unsafe {
            // SAFETY: `entry` is the entry point of the loaded kernel, mapped by the boot tables.
            let kernel: KernelEntry = core::mem::transmute(entry);
            kernel(a0, a1, a2, a3, a4, a5);
        }
    }
}
