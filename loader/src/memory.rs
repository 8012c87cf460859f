use types::mem::PAddr;

/// Write access to physical memory.
///
/// Implementations are not required to check the addresses they are handed. The loader only
/// writes to ranges that passed [`crate::ensure_phys_range_valid()`] and the segment checks.
pub trait PhysicalMemory {
    /// Fill `len` bytes starting at `paddr` with zeroes.
    fn zero(&mut self, paddr: PAddr, len: usize);

    /// Copy `bytes` to `paddr`.
    fn copy_from(&mut self, paddr: PAddr, bytes: &[u8]);
}

/// Physical memory accessed with address translation disabled, where a physical address is a
/// valid pointer.
pub struct IdentityMapped {
    _private: (),
}

impl IdentityMapped {
    /// ### Safety
    ///
    /// Address translation must be off (or physical memory identity mapped) for as long as the
    /// returned value is used, and nothing else may access the memory it is used to write.
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl PhysicalMemory for IdentityMapped {
    fn zero(&mut self, paddr: PAddr, len: usize) {
        unsafe {
            // SAFETY: Guaranteed by the contract of `IdentityMapped::new()` and the range checks
            // done by the loader before writing.
            core::ptr::write_bytes(paddr as *mut u8, 0, len);
        }
    }

    fn copy_from(&mut self, paddr: PAddr, bytes: &[u8]) {
        unsafe {
            // SAFETY: As above. The destination never overlaps the loader, which contains the
            // source image.
            core::ptr::copy_nonoverlapping(bytes.as_ptr(), paddr as *mut u8, bytes.len());
        }
    }
}

#[cfg(test)]
pub(crate) mod window {
    use super::PhysicalMemory;
    use types::mem::PAddr;

    /// A piece of "physical memory" backed by a vector. Starts out filled with a non-zero
    /// pattern and panics on any access outside of it.
    pub struct Window {
        pub base: PAddr,
        pub bytes: Vec<u8>,
        pub writes: usize,
    }

    pub const FILL: u8 = 0xa5;

    impl Window {
        pub fn new(base: PAddr, len: usize) -> Self {
            Self {
                base,
                bytes: vec![FILL; len],
                writes: 0,
            }
        }

        pub fn slice(&self, paddr: PAddr, len: usize) -> &[u8] {
            let offset = paddr - self.base;
            &self.bytes[offset..offset + len]
        }

        fn slice_mut(&mut self, paddr: PAddr, len: usize) -> &mut [u8] {
            assert!(paddr >= self.base, "write below window at {paddr:#x}");
            let offset = paddr - self.base;
            assert!(
                offset + len <= self.bytes.len(),
                "write beyond window at {paddr:#x} (+{len:#x})"
            );
            &mut self.bytes[offset..offset + len]
        }
    }

    impl PhysicalMemory for Window {
        fn zero(&mut self, paddr: PAddr, len: usize) {
            self.writes += 1;
            self.slice_mut(paddr, len).fill(0);
        }

        fn copy_from(&mut self, paddr: PAddr, bytes: &[u8]) {
            self.writes += 1;
            self.slice_mut(paddr, bytes.len()).copy_from_slice(bytes);
        }
    }
}
