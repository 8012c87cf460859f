//! A small reader for ELF images that are embedded in memory as a byte slice. It only understands
//! what a loader needs: the file header, the program header table and the extent of the loadable
//! segments. Both ELF classes are supported, but only little-endian encoding.
//!
//! Every read is bounds-checked against the slice, so a malformed image results in an [`Error`]
//! rather than an out-of-bounds access.

#![cfg_attr(not(any(test, feature = "builder")), no_std)]

#[cfg(any(test, feature = "builder"))]
pub mod builder;
mod header;
mod segment;

pub use header::*;
pub use segment::*;

use core::fmt::{Display, Formatter};

/// Reasons why an ELF image is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The image is shorter than the structure that was about to be read.
    Truncated,
    BadMagic,
    UnsupportedClass(u8),
    UnsupportedEncoding(u8),
    UnsupportedVersion(u32),
    BadHeaderSize(u16),
    BadProgramHeaderSize(u16),
    BadSectionHeaderSize(u16),
    ProgramHeadersOutOfBounds,
    SectionHeadersOutOfBounds,
    BadStringTableIndex(u16),
    NoLoadableSegments,
    /// `vaddr + mem_size` of a loadable segment does not fit into 64 bits.
    SegmentAddressOverflow(usize),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Truncated => write!(f, "image truncated"),
            Self::BadMagic => write!(f, "bad magic"),
            Self::UnsupportedClass(class) => write!(f, "unsupported class {class}"),
            Self::UnsupportedEncoding(data) => write!(f, "unsupported data encoding {data}"),
            Self::UnsupportedVersion(version) => write!(f, "unsupported version {version}"),
            Self::BadHeaderSize(size) => write!(f, "bad file header size {size}"),
            Self::BadProgramHeaderSize(size) => write!(f, "bad program header size {size}"),
            Self::BadSectionHeaderSize(size) => write!(f, "bad section header size {size}"),
            Self::ProgramHeadersOutOfBounds => write!(f, "program header table out of bounds"),
            Self::SectionHeadersOutOfBounds => write!(f, "section header table out of bounds"),
            Self::BadStringTableIndex(index) => write!(f, "bad string table index {index}"),
            Self::NoLoadableSegments => write!(f, "no loadable segments"),
            Self::SegmentAddressOverflow(index) => {
                write!(f, "segment {index} address range overflows")
            }
        }
    }
}

/// An ELF image in memory.
#[derive(Clone, Copy)]
pub struct ElfFile<'elf> {
    bytes: &'elf [u8],
    header: FileHeader,
}

impl<'elf> ElfFile<'elf> {
    /// Identify the image and decode its file header. This only checks what is needed to read
    /// the header; use [`ElfFile::check_file()`] to validate the rest.
    pub fn new(bytes: &'elf [u8]) -> Result<Self, Error> {
        let header = FileHeader::parse(bytes)?;
        Ok(Self { bytes, header })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn bytes(&self) -> &'elf [u8] {
        self.bytes
    }

    pub fn entry_point(&self) -> u64 {
        self.header.entry
    }

    /// Validate the structure of the image: header sizes match the class and the program and
    /// section header tables lie within the image.
    pub fn check_file(&self) -> Result<(), Error> {
        let header = &self.header;
        if header.version != EV_CURRENT as u32 {
            return Err(Error::UnsupportedVersion(header.version));
        }
        if header.ehsize as usize != header.class.file_header_size() {
            return Err(Error::BadHeaderSize(header.ehsize));
        }

        self.program_header_table()?;

        if header.shnum > 0 {
            if (header.shentsize as usize) < header.class.section_header_size() {
                return Err(Error::BadSectionHeaderSize(header.shentsize));
            }
            table_end(header.shoff, header.shentsize, header.shnum)
                .filter(|end| *end <= self.bytes.len())
                .ok_or(Error::SectionHeadersOutOfBounds)?;
            if header.shstrndx >= header.shnum {
                return Err(Error::BadStringTableIndex(header.shstrndx));
            }
        }

        Ok(())
    }

    /// Returns an iterator over the program header table, or an error if the table does not fit
    /// into the image.
    pub fn program_headers(&self) -> Result<ProgramHeaderIter<'elf>, Error> {
        let table = self.program_header_table()?;
        Ok(ProgramHeaderIter::new(
            table,
            self.header.class,
            self.header.phentsize as usize,
        ))
    }

    /// Returns the lowest start and the highest end virtual address of all loadable segments.
    /// The end of a segment is `vaddr + mem_size`, so zero-initialized memory is included.
    pub fn memory_bounds(&self) -> Result<(u64, u64), Error> {
        let mut bounds: Option<(u64, u64)> = None;
        for (index, segment) in self.program_headers()?.enumerate() {
            if segment.kind != SegmentKind::Load {
                continue;
            }
            let end = segment
                .vaddr
                .checked_add(segment.mem_size)
                .ok_or(Error::SegmentAddressOverflow(index))?;
            bounds = Some(match bounds {
                Some((min, max)) => (min.min(segment.vaddr), max.max(end)),
                None => (segment.vaddr, end),
            });
        }
        bounds.ok_or(Error::NoLoadableSegments)
    }

    fn program_header_table(&self) -> Result<&'elf [u8], Error> {
        let header = &self.header;
        if header.phnum == 0 {
            return Ok(&[]);
        }
        if (header.phentsize as usize) < header.class.program_header_size() {
            return Err(Error::BadProgramHeaderSize(header.phentsize));
        }
        let start = usize::try_from(header.phoff).map_err(|_| Error::ProgramHeadersOutOfBounds)?;
        let end = table_end(header.phoff, header.phentsize, header.phnum)
            .ok_or(Error::ProgramHeadersOutOfBounds)?;
        self.bytes
            .get(start..end)
            .ok_or(Error::ProgramHeadersOutOfBounds)
    }
}

impl core::fmt::Debug for ElfFile<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ElfFile")
            .field("len", &self.bytes.len())
            .field("header", &self.header)
            .field("segments", &self.program_headers().ok())
            .finish()
    }
}

/// End offset of a table of `count` entries of `entry_size` bytes starting at `offset`.
fn table_end(offset: u64, entry_size: u16, count: u16) -> Option<usize> {
    let size = (entry_size as usize).checked_mul(count as usize)?;
    usize::try_from(offset).ok()?.checked_add(size)
}

/// Little-endian field readers. All of them return `None` if the field is not inside `bytes`.
pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Option<u16> {
    Some(u16::from_le_bytes(
        bytes.get(offset..offset.checked_add(2)?)?.try_into().ok()?,
    ))
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(
        bytes.get(offset..offset.checked_add(4)?)?.try_into().ok()?,
    ))
}

pub(crate) fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    Some(u64::from_le_bytes(
        bytes.get(offset..offset.checked_add(8)?)?.try_into().ok()?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{ElfBuilder, RawSegment};

    #[test]
    fn bounds_span_all_loadable_segments() {
        let image = ElfBuilder::new(Class::Elf64)
            .entry(0x400000)
            .load(0x401000, 0x1800, &[1; 0x100])
            .load(0x400000, 0x1000, &[2; 0x80])
            .raw(RawSegment::new(SegmentKind::Note, 0, 0x10_0000, 0, 0x1000))
            .build();
        let elf = ElfFile::new(&image).unwrap();
        elf.check_file().unwrap();
        assert_eq!(elf.memory_bounds(), Ok((0x400000, 0x402800)));
        assert_eq!(elf.entry_point(), 0x400000);
    }

    #[test]
    fn elf32_is_widened() {
        let image = ElfBuilder::new(Class::Elf32)
            .entry(0x8000)
            .load(0x8000, 0x2000, &[7; 0x40])
            .build();
        let elf = ElfFile::new(&image).unwrap();
        elf.check_file().unwrap();
        assert_eq!(elf.header().class, Class::Elf32);
        let segment = elf.program_headers().unwrap().next().unwrap();
        assert_eq!(segment.kind, SegmentKind::Load);
        assert_eq!(segment.vaddr, 0x8000);
        assert_eq!(segment.file_size, 0x40);
        assert_eq!(segment.mem_size, 0x2000);
        assert_eq!(elf.memory_bounds(), Ok((0x8000, 0xa000)));
    }

    #[test]
    fn rejects_foreign_files() {
        assert_eq!(ElfFile::new(&[]).err(), Some(Error::Truncated));
        assert_eq!(ElfFile::new(&[0u8; 64]).err(), Some(Error::BadMagic));

        let mut image = ElfBuilder::new(Class::Elf64).load(0, 0x1000, &[]).build();
        image[4] = 3;
        assert_eq!(ElfFile::new(&image).err(), Some(Error::UnsupportedClass(3)));
        image[4] = 2;
        image[5] = 2;
        assert_eq!(ElfFile::new(&image).err(), Some(Error::UnsupportedEncoding(2)));
    }

    #[test]
    fn header_must_fit() {
        let image = ElfBuilder::new(Class::Elf64).load(0, 0x1000, &[]).build();
        assert_eq!(ElfFile::new(&image[..40]).err(), Some(Error::Truncated));
    }

    #[test]
    fn program_header_table_out_of_bounds() {
        let image = ElfBuilder::new(Class::Elf64)
            .load(0x400000, 0x1000, &[0; 16])
            .build();
        let truncated = &image[..image.len() - 40];
        let elf = ElfFile::new(truncated).unwrap();
        assert_eq!(elf.check_file(), Err(Error::ProgramHeadersOutOfBounds));
        assert_eq!(elf.memory_bounds(), Err(Error::ProgramHeadersOutOfBounds));
    }

    #[test]
    fn check_file_validates_header_fields() {
        let mut image = ElfBuilder::new(Class::Elf64).load(0, 0x1000, &[]).build();
        image[52] = 63;
        assert_eq!(
            ElfFile::new(&image).unwrap().check_file(),
            Err(Error::BadHeaderSize(63))
        );

        let mut image = ElfBuilder::new(Class::Elf64).load(0, 0x1000, &[]).build();
        image[54] = 32;
        assert_eq!(
            ElfFile::new(&image).unwrap().check_file(),
            Err(Error::BadProgramHeaderSize(32))
        );

        let mut image = ElfBuilder::new(Class::Elf64).load(0, 0x1000, &[]).build();
        // One section header at an offset far past the end of the image.
        image[40..48].copy_from_slice(&0x10_0000u64.to_le_bytes());
        image[58..60].copy_from_slice(&64u16.to_le_bytes());
        image[60..62].copy_from_slice(&1u16.to_le_bytes());
        assert_eq!(
            ElfFile::new(&image).unwrap().check_file(),
            Err(Error::SectionHeadersOutOfBounds)
        );
    }

    #[test]
    fn memory_bounds_errors() {
        let image = ElfBuilder::new(Class::Elf64)
            .raw(RawSegment::new(SegmentKind::Dynamic, 0, 0x1000, 0, 0x10))
            .build();
        let elf = ElfFile::new(&image).unwrap();
        assert_eq!(elf.memory_bounds(), Err(Error::NoLoadableSegments));

        let image = ElfBuilder::new(Class::Elf64)
            .raw(RawSegment::new(SegmentKind::Load, 0, u64::MAX - 0xfff, 0, 0x2000))
            .build();
        let elf = ElfFile::new(&image).unwrap();
        assert_eq!(elf.memory_bounds(), Err(Error::SegmentAddressOverflow(0)));
    }
}
