//! Assembles small ELF images in memory. Only available with the `builder` feature and meant for
//! tests, e.g. to produce images with hand-crafted (and possibly malformed) program headers.

extern crate alloc;

use alloc::vec::Vec;

use crate::{Class, SegmentKind, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELF_MAGIC, EV_CURRENT};

const ET_EXEC: u16 = 2;
const EM_AARCH64: u16 = 183;

/// A program header that is written verbatim, without any data being placed in the image.
#[derive(Debug, Clone, Copy)]
pub struct RawSegment {
    pub kind: SegmentKind,
    pub offset: u64,
    pub vaddr: u64,
    pub file_size: u64,
    pub mem_size: u64,
}

impl RawSegment {
    pub fn new(kind: SegmentKind, offset: u64, vaddr: u64, file_size: u64, mem_size: u64) -> Self {
        Self {
            kind,
            offset,
            vaddr,
            file_size,
            mem_size,
        }
    }
}

enum Entry {
    /// A `PT_LOAD` segment whose data is appended to the image.
    Load {
        vaddr: u64,
        mem_size: u64,
        data: Vec<u8>,
    },
    Raw(RawSegment),
}

/// Builder for an executable ELF image. Program headers directly follow the file header, segment
/// data follows the program header table in the order the segments were added.
pub struct ElfBuilder {
    class: Class,
    entry: u64,
    entries: Vec<Entry>,
}

impl ElfBuilder {
    pub fn new(class: Class) -> Self {
        Self {
            class,
            entry: 0,
            entries: Vec::new(),
        }
    }

    pub fn entry(self, entry: u64) -> Self {
        Self { entry, ..self }
    }

    /// Add a loadable segment at `vaddr` occupying `mem_size` bytes in memory, of which the first
    /// `data.len()` bytes are stored in the image.
    pub fn load(mut self, vaddr: u64, mem_size: u64, data: &[u8]) -> Self {
        self.entries.push(Entry::Load {
            vaddr,
            mem_size,
            data: data.to_vec(),
        });
        self
    }

    /// Add a program header with arbitrary field values.
    pub fn raw(mut self, segment: RawSegment) -> Self {
        self.entries.push(Entry::Raw(segment));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let header_size = self.class.file_header_size();
        let phdr_size = self.class.program_header_size();
        let mut data_offset = (header_size + phdr_size * self.entries.len()) as u64;

        let mut segments = Vec::new();
        let mut payload = Vec::new();
        for entry in &self.entries {
            segments.push(match entry {
                Entry::Load {
                    vaddr,
                    mem_size,
                    data,
                } => {
                    let segment = RawSegment::new(
                        SegmentKind::Load,
                        data_offset,
                        *vaddr,
                        data.len() as u64,
                        *mem_size,
                    );
                    data_offset += data.len() as u64;
                    payload.extend_from_slice(data);
                    segment
                }
                Entry::Raw(segment) => *segment,
            });
        }

        let mut image = Vec::new();
        self.write_header(&mut image, segments.len() as u16);
        for segment in &segments {
            self.write_program_header(&mut image, segment);
        }
        image.extend_from_slice(&payload);
        image
    }

    fn write_header(&self, image: &mut Vec<u8>, phnum: u16) {
        let mut ident = [0u8; 16];
        ident[..4].copy_from_slice(&ELF_MAGIC);
        ident[4] = match self.class {
            Class::Elf32 => ELFCLASS32,
            Class::Elf64 => ELFCLASS64,
        };
        ident[5] = ELFDATA2LSB;
        ident[6] = EV_CURRENT;
        image.extend_from_slice(&ident);
        image.extend_from_slice(&ET_EXEC.to_le_bytes());
        image.extend_from_slice(&EM_AARCH64.to_le_bytes());
        image.extend_from_slice(&(EV_CURRENT as u32).to_le_bytes());
        self.write_addr(image, self.entry);
        self.write_addr(image, self.class.file_header_size() as u64); // e_phoff
        self.write_addr(image, 0); // e_shoff
        image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
        image.extend_from_slice(&(self.class.file_header_size() as u16).to_le_bytes());
        image.extend_from_slice(&(self.class.program_header_size() as u16).to_le_bytes());
        image.extend_from_slice(&phnum.to_le_bytes());
        image.extend_from_slice(&(self.class.section_header_size() as u16).to_le_bytes());
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
        image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    }

    fn write_program_header(&self, image: &mut Vec<u8>, segment: &RawSegment) {
        let kind = u32::from(segment.kind);
        let flags = 0b111u32;
        match self.class {
            Class::Elf32 => {
                image.extend_from_slice(&kind.to_le_bytes());
                self.write_addr(image, segment.offset);
                self.write_addr(image, segment.vaddr);
                self.write_addr(image, segment.vaddr);
                self.write_addr(image, segment.file_size);
                self.write_addr(image, segment.mem_size);
                image.extend_from_slice(&flags.to_le_bytes());
                self.write_addr(image, 0x1000);
            }
            Class::Elf64 => {
                image.extend_from_slice(&kind.to_le_bytes());
                image.extend_from_slice(&flags.to_le_bytes());
                self.write_addr(image, segment.offset);
                self.write_addr(image, segment.vaddr);
                self.write_addr(image, segment.vaddr);
                self.write_addr(image, segment.file_size);
                self.write_addr(image, segment.mem_size);
                self.write_addr(image, 0x1000);
            }
        }
    }

    /// Writes an address-sized field. ELF32 values are truncated to 32 bits.
    fn write_addr(&self, image: &mut Vec<u8>, value: u64) {
        match self.class {
            Class::Elf32 => image.extend_from_slice(&(value as u32).to_le_bytes()),
            Class::Elf64 => image.extend_from_slice(&value.to_le_bytes()),
        }
    }
}
