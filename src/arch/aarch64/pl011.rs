//! Transmit side of the ARM PL011 UART.

use core::fmt;
use core::ptr;

use types::mem::PAddr;

/// Data register.
const UARTDR: usize = 0x000;
/// Flag register.
const UARTFR: usize = 0x018;
/// Transmit FIFO full.
const UARTFR_TXFF: u32 = 1 << 5;

pub struct Pl011 {
    base: PAddr,
}

impl Pl011 {
    /// ### Safety
    ///
    /// `base` must be the address of a PL011 register block, accessible as device memory.
    pub const unsafe fn new(base: PAddr) -> Self {
        Self { base }
    }

    /// Wait until the transmit FIFO has room, then queue `byte`.
    pub fn put_byte(&mut self, byte: u8) {
        while self.read(UARTFR) & UARTFR_TXFF != 0 {
            core::hint::spin_loop();
        }
        self.write(UARTDR, byte.into());
    }

    fn read(&self, offset: usize) -> u32 {
        unsafe { ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write(&mut self, offset: usize, value: u32) {
        unsafe { ptr::write_volatile((self.base + offset) as *mut u32, value) }
    }
}

impl fmt::Write for Pl011 {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.put_byte(b'\r');
            }
            self.put_byte(byte);
        }
        Ok(())
    }
}
