//! The ELF file header. Its layout depends on the class of the file:
//!
//! ```text
//! offset (32/64)   field
//! 0  / 0           e_ident[16]   magic, class, data encoding, version, ABI
//! 16 / 16          e_type        u16
//! 18 / 18          e_machine     u16
//! 20 / 20          e_version     u32
//! 24 / 24          e_entry       u32 / u64
//! 28 / 32          e_phoff       u32 / u64
//! 32 / 40          e_shoff       u32 / u64
//! 36 / 48          e_flags       u32
//! 40 / 52          e_ehsize      u16
//! 42 / 54          e_phentsize   u16
//! 44 / 56          e_phnum       u16
//! 46 / 58          e_shentsize   u16
//! 48 / 60          e_shnum       u16
//! 50 / 62          e_shstrndx    u16
//! ```

use crate::{read_u16, read_u32, read_u64, Error};

pub const ELF_MAGIC: [u8; 4] = [0x7f, b'E', b'L', b'F'];
pub const ELFCLASS32: u8 = 1;
pub const ELFCLASS64: u8 = 2;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;

/// Word size of the ELF file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Elf32,
    Elf64,
}

impl Class {
    pub const fn file_header_size(self) -> usize {
        match self {
            Self::Elf32 => 52,
            Self::Elf64 => 64,
        }
    }

    pub const fn program_header_size(self) -> usize {
        match self {
            Self::Elf32 => 32,
            Self::Elf64 => 56,
        }
    }

    pub const fn section_header_size(self) -> usize {
        match self {
            Self::Elf32 => 40,
            Self::Elf64 => 64,
        }
    }

    /// Reads an address-sized field, widened to 64 bits.
    pub(crate) fn read_addr(self, bytes: &[u8], offset: usize) -> Option<u64> {
        match self {
            Self::Elf32 => read_u32(bytes, offset).map(u64::from),
            Self::Elf64 => read_u64(bytes, offset),
        }
    }
}

/// The decoded file header. Address-sized fields are widened to 64 bits for both classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub class: Class,
    pub kind: u16,
    pub machine: u16,
    pub version: u32,
    pub entry: u64,
    pub phoff: u64,
    pub shoff: u64,
    pub flags: u32,
    pub ehsize: u16,
    pub phentsize: u16,
    pub phnum: u16,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

impl FileHeader {
    /// Check the identification bytes and decode the header that follows them.
    pub fn parse(bytes: &[u8]) -> Result<Self, Error> {
        let ident = bytes.get(..16).ok_or(Error::Truncated)?;
        if ident[..4] != ELF_MAGIC {
            return Err(Error::BadMagic);
        }
        let class = match ident[4] {
            ELFCLASS32 => Class::Elf32,
            ELFCLASS64 => Class::Elf64,
            other => return Err(Error::UnsupportedClass(other)),
        };
        if ident[5] != ELFDATA2LSB {
            return Err(Error::UnsupportedEncoding(ident[5]));
        }
        if ident[6] != EV_CURRENT {
            return Err(Error::UnsupportedVersion(ident[6] as u32));
        }
        let bytes = bytes
            .get(..class.file_header_size())
            .ok_or(Error::Truncated)?;
        Self::decode(bytes, class).ok_or(Error::Truncated)
    }

    fn decode(bytes: &[u8], class: Class) -> Option<Self> {
        // Offsets of the fields following e_entry shift by 4 bytes per address-sized field.
        let (entry, phoff, shoff, rest) = match class {
            Class::Elf32 => (24, 28, 32, 36),
            Class::Elf64 => (24, 32, 40, 48),
        };
        Some(Self {
            class,
            kind: read_u16(bytes, 16)?,
            machine: read_u16(bytes, 18)?,
            version: read_u32(bytes, 20)?,
            entry: class.read_addr(bytes, entry)?,
            phoff: class.read_addr(bytes, phoff)?,
            shoff: class.read_addr(bytes, shoff)?,
            flags: read_u32(bytes, rest)?,
            ehsize: read_u16(bytes, rest + 4)?,
            phentsize: read_u16(bytes, rest + 6)?,
            phnum: read_u16(bytes, rest + 8)?,
            shentsize: read_u16(bytes, rest + 10)?,
            shnum: read_u16(bytes, rest + 12)?,
            shstrndx: read_u16(bytes, rest + 14)?,
        })
    }
}
