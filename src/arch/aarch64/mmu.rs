use core::arch::asm;

use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::*;

use crate::arch::paging::{BootTables, TXSZ};

/// Switch on address translation of the calling core with the boot tables, along with the data
/// and instruction caches.
///
/// ### Safety
///
/// `tables` must be fully built and identity map the code that is running, and every write to
/// them must be visible to this core.
pub unsafe fn enable(tables: *const BootTables) {
    // Indices must match `paging::MAIR_DEVICE` and `paging::MAIR_NORMAL`.
    MAIR_EL1.write(
        MAIR_EL1::Attr0_Device::nonGathering_nonReordering_EarlyWriteAck
            + MAIR_EL1::Attr1_Normal_Outer::WriteBack_NonTransient_ReadWriteAlloc
            + MAIR_EL1::Attr1_Normal_Inner::WriteBack_NonTransient_ReadWriteAlloc,
    );

    TCR_EL1.write(
        TCR_EL1::IPS::Bits_40
            + TCR_EL1::TG0::KiB_4
            + TCR_EL1::SH0::Inner
            + TCR_EL1::ORGN0::WriteBack_ReadAlloc_WriteAlloc_Cacheable
            + TCR_EL1::IRGN0::WriteBack_ReadAlloc_WriteAlloc_Cacheable
            + TCR_EL1::EPD0::EnableTTBR0Walks
            + TCR_EL1::T0SZ.val(TXSZ)
            + TCR_EL1::TG1::KiB_4
            + TCR_EL1::SH1::Inner
            + TCR_EL1::ORGN1::WriteBack_ReadAlloc_WriteAlloc_Cacheable
            + TCR_EL1::IRGN1::WriteBack_ReadAlloc_WriteAlloc_Cacheable
            + TCR_EL1::EPD1::EnableTTBR1Walks
            + TCR_EL1::A1::TTBR0
            + TCR_EL1::T1SZ.val(TXSZ),
    );

    let tables = unsafe { &*tables };
    TTBR0_EL1.set(core::ptr::addr_of!(tables.lower_l1) as u64);
    TTBR1_EL1.set(core::ptr::addr_of!(tables.upper_l1) as u64);

    barrier::dsb(barrier::SY);
    unsafe {
        // Nothing may survive from translation regimes set up before the loader ran.
        asm!("tlbi vmalle1", "ic iallu", options(nostack, preserves_flags));
    }
    barrier::dsb(barrier::SY);
    barrier::isb(barrier::SY);

    SCTLR_EL1.modify(SCTLR_EL1::M::Enable + SCTLR_EL1::C::Cacheable + SCTLR_EL1::I::Cacheable);
    barrier::isb(barrier::SY);
}
