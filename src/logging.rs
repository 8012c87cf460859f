//! Loader log, written to the PL011 console.

use core::fmt::Write;
use log::{Metadata, Record};

use crate::arch::aarch64::pl011::Pl011;
use crate::config::{LOG_LEVEL, PLAT_MMIO_PADDR};

/// Global instance of the loader logger.
static LOGGER: KernelLog = KernelLog {};

/// Install the console logger. Must be called by the primary core before any other core logs.
pub fn initialize_kernel_log() {
    unsafe {
        // SAFETY: Only the primary core gets here, and it does so once. The other cores are still
        // waiting to be released.
        log::set_logger_racy(&LOGGER)
            .map(|()| log::set_max_level_racy(LOG_LEVEL))
            .ok();
    }
}

struct KernelLog;

impl log::Log for KernelLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= LOG_LEVEL
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut console = unsafe {
                // SAFETY: The console is identity mapped as device memory, before and after the
                // MMU is enabled.
                Pl011::new(PLAT_MMIO_PADDR)
            };
            let _ = writeln!(&mut console, "{}", record.args());
        }
    }

    fn flush(&self) {}
}
