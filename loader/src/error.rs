use core::fmt::{Display, Formatter, Result};

use types::mem::{AddrRange, PAddr};

/// Reasons why an image could not be loaded. Loading stops at the first violated check, nothing
/// is written to the destination before all checks have passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadError {
    /// The ELF metadata is malformed or could not be read.
    ElfFormat(elf::Error),
    /// The image's virtual addresses do not fit into a pointer.
    AddressRange { min_vaddr: u64, max_vaddr: u64 },
    /// Address or size arithmetic would wrap.
    Overflow,
    Alignment(Misalignment),
    /// The destination overlaps the memory occupied by the loader itself.
    Overlap { image: AddrRange, loader: AddrRange },
    /// Source or destination bounds of program segment `index` are inconsistent.
    SegmentBounds { index: usize },
}

impl From<elf::Error> for LoadError {
    fn from(err: elf::Error) -> Self {
        Self::ElfFormat(err)
    }
}

impl Display for LoadError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::ElfFormat(err) => write!(f, "invalid ELF file: {err}"),
            Self::AddressRange {
                min_vaddr,
                max_vaddr,
            } => write!(
                f,
                "image virtual address [{min_vaddr:#x}..{max_vaddr:#x}] exceeds {:#x}",
                usize::MAX
            ),
            Self::Overflow => write!(f, "image destination address integer overflow"),
            Self::Alignment(misalignment) => write!(f, "{misalignment}"),
            Self::Overlap { image, loader } => {
                write!(f, "image load address {image} overlaps with loader {loader}")
            }
            Self::SegmentBounds { index } => write!(f, "segment {index} invalid"),
        }
    }
}

/// Which alignment requirement was violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Misalignment {
    /// The destination is not page aligned.
    DestinationPage(PAddr),
    /// The destination does not allow 32-bit word accesses.
    DestinationWord(PAddr),
    /// The lowest virtual address of the image is not page aligned.
    ImageStart(u64),
}

impl Display for Misalignment {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::DestinationPage(paddr) => {
                write!(f, "physical load address {paddr:#x} is not page aligned")
            }
            Self::DestinationWord(paddr) => {
                write!(f, "physical load address {paddr:#x} is not 4-byte aligned")
            }
            Self::ImageStart(vaddr) => write!(f, "start of image {vaddr:#x} is not page aligned"),
        }
    }
}

/// Reasons why the boot sequence stopped. All of them are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    Load(LoadError),
    /// The kernel information has already been handed to the secondary cores.
    AlreadyReleased,
    /// The jump into the kernel returned.
    UnreachableReturn,
}

impl From<LoadError> for BootError {
    fn from(err: LoadError) -> Self {
        Self::Load(err)
    }
}

impl From<crate::smp::AlreadyReleased> for BootError {
    fn from(_: crate::smp::AlreadyReleased) -> Self {
        Self::AlreadyReleased
    }
}

impl Display for BootError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Self::Load(err) => write!(f, "could not load kernel ELF: {err}"),
            Self::AlreadyReleased => write!(f, "secondary cores have already been released"),
            Self::UnreachableReturn => write!(f, "unreachable: kernel entry returned"),
        }
    }
}
