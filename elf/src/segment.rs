//! Program headers and an iterator to traverse the program header table.

use crate::{read_u32, Class};

/// Provides an iterator over the program header table. The `'elf` lifetime parameter describes
/// the lifetime of the underlying image.
#[derive(Clone)]
pub struct ProgramHeaderIter<'elf> {
    /// The remaining, not yet decoded part of the table.
    table: &'elf [u8],
    class: Class,
    /// Distance between two entries (`e_phentsize`). May be larger than the decoded structure.
    stride: usize,
}

impl<'elf> ProgramHeaderIter<'elf> {
    pub(crate) fn new(table: &'elf [u8], class: Class, stride: usize) -> Self {
        Self {
            table,
            class,
            stride,
        }
    }
}

impl Iterator for ProgramHeaderIter<'_> {
    type Item = ProgramHeader;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.table.get(..self.stride)?;
        self.table = &self.table[self.stride..];
        ProgramHeader::decode(entry, self.class)
    }
}

impl core::fmt::Debug for ProgramHeaderIter<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.clone()).finish()
    }
}

/// A decoded program header. ELF32 fields are widened to 64 bits.
///
/// ```text
/// ELF32: type  offset vaddr paddr filesz memsz flags align   (8 x u32)
/// ELF64: type  flags  offset vaddr paddr filesz memsz align  (2 x u32, 6 x u64)
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct ProgramHeader {
    pub kind: SegmentKind,
    pub flags: SegmentFlags,
    /// Offset of the segment's data within the image.
    pub offset: u64,
    pub vaddr: u64,
    pub paddr: u64,
    /// Number of bytes of the segment stored in the image.
    pub file_size: u64,
    /// Number of bytes the segment occupies in memory. The part beyond `file_size` is zero.
    pub mem_size: u64,
    pub align: u64,
}

impl ProgramHeader {
    fn decode(entry: &[u8], class: Class) -> Option<Self> {
        let kind = read_u32(entry, 0)?.into();
        Some(match class {
            Class::Elf32 => Self {
                kind,
                offset: class.read_addr(entry, 4)?,
                vaddr: class.read_addr(entry, 8)?,
                paddr: class.read_addr(entry, 12)?,
                file_size: class.read_addr(entry, 16)?,
                mem_size: class.read_addr(entry, 20)?,
                flags: SegmentFlags(read_u32(entry, 24)?),
                align: class.read_addr(entry, 28)?,
            },
            Class::Elf64 => Self {
                kind,
                flags: SegmentFlags(read_u32(entry, 4)?),
                offset: class.read_addr(entry, 8)?,
                vaddr: class.read_addr(entry, 16)?,
                paddr: class.read_addr(entry, 24)?,
                file_size: class.read_addr(entry, 32)?,
                mem_size: class.read_addr(entry, 40)?,
                align: class.read_addr(entry, 48)?,
            },
        })
    }
}

impl core::fmt::Debug for ProgramHeader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?} {:?} @ {:#x}: vaddr {:#x}, file {:#x}, mem {:#x}",
            self.kind, self.flags, self.offset, self.vaddr, self.file_size, self.mem_size,
        )
    }
}

pub const PT_NULL: u32 = 0;
pub const PT_LOAD: u32 = 1;
pub const PT_DYNAMIC: u32 = 2;
pub const PT_INTERP: u32 = 3;
pub const PT_NOTE: u32 = 4;
pub const PT_PHDR: u32 = 6;
pub const PT_TLS: u32 = 7;

/// The `p_type` field of a program header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Null,
    Load,
    Dynamic,
    Interp,
    Note,
    Phdr,
    Tls,
    Other(u32),
}

impl From<u32> for SegmentKind {
    fn from(value: u32) -> Self {
        match value {
            PT_NULL => Self::Null,
            PT_LOAD => Self::Load,
            PT_DYNAMIC => Self::Dynamic,
            PT_INTERP => Self::Interp,
            PT_NOTE => Self::Note,
            PT_PHDR => Self::Phdr,
            PT_TLS => Self::Tls,
            other => Self::Other(other),
        }
    }
}

impl From<SegmentKind> for u32 {
    fn from(kind: SegmentKind) -> Self {
        match kind {
            SegmentKind::Null => PT_NULL,
            SegmentKind::Load => PT_LOAD,
            SegmentKind::Dynamic => PT_DYNAMIC,
            SegmentKind::Interp => PT_INTERP,
            SegmentKind::Note => PT_NOTE,
            SegmentKind::Phdr => PT_PHDR,
            SegmentKind::Tls => PT_TLS,
            SegmentKind::Other(other) => other,
        }
    }
}

/// The `p_flags` field of a program header.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct SegmentFlags(pub u32);

impl SegmentFlags {
    const fn bits() -> &'static [(&'static str, usize)] {
        &[("X", 0), ("W", 1), ("R", 2)]
    }

    fn is_nth_bit_set(&self, bit: usize) -> bool {
        self.0 & (1 << bit) as u32 != 0
    }
}

impl core::fmt::Debug for SegmentFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // Printed in the usual `RWX` order.
        for (name, bit) in Self::bits().iter().rev() {
            if self.is_nth_bit_set(*bit) {
                f.write_str(name)?;
            } else {
                f.write_str("-")?;
            }
        }
        Ok(())
    }
}
