use elf::{ElfFile, ProgramHeader, SegmentKind};
use log::{debug, error};
use types::mem::{AddrRange, PAddr, VAddr};

use crate::{LoadError, PhysicalMemory};

/// A validated copy of one loadable segment.
struct SegmentCopy<'elf> {
    dest_paddr: PAddr,
    data: &'elf [u8],
}

/// Unpack the loadable segments of `elf` to physical memory starting at `dest_paddr`. The lowest
/// virtual address of the image ends up at `dest_paddr`, every other segment at the same offset
/// relative to it. Memory that is covered by the image but not by segment data is zeroed.
///
/// All segments are validated before the first byte is written, so on error the destination is
/// untouched. Returns the number of bytes the image occupies.
pub fn unpack_elf_to_paddr<M: PhysicalMemory + ?Sized>(
    elf: &ElfFile<'_>,
    dest_paddr: PAddr,
    memory: &mut M,
) -> Result<usize, LoadError> {
    let (u64_min_vaddr, u64_max_vaddr) = elf.memory_bounds().map_err(|err| {
        error!("Could not get image size: {}", err);
        LoadError::ElfFormat(err)
    })?;

    // Check that image virtual address range is sane
    let (Ok(min_vaddr), Ok(max_vaddr)) = (
        VAddr::try_from(u64_min_vaddr),
        VAddr::try_from(u64_max_vaddr),
    ) else {
        error!(
            "Image virtual address [{:#x}..{:#x}] exceeds {:#x}",
            u64_min_vaddr,
            u64_max_vaddr,
            usize::MAX
        );
        return Err(LoadError::AddressRange {
            min_vaddr: u64_min_vaddr,
            max_vaddr: u64_max_vaddr,
        });
    };

    let image_size = max_vaddr - min_vaddr;
    let image = AddrRange::from_len(dest_paddr, image_size).ok_or_else(|| {
        error!("Image destination address integer overflow");
        LoadError::Overflow
    })?;

    let segments = elf.program_headers()?;
    for (index, segment) in segments.clone().enumerate() {
        plan_segment(elf, index, &segment, min_vaddr, image)?;
    }

    // The image may be sparse, so clear everything before copying the segments.
    memory.zero(image.start, image.len());

    for (index, segment) in segments.enumerate() {
        if let Some(copy) = plan_segment(elf, index, &segment, min_vaddr, image)? {
            debug!(
                "  segment {}: {:?} -> {:#x}",
                index, segment, copy.dest_paddr
            );
            memory.copy_from(copy.dest_paddr, copy.data);
        }
    }

    Ok(image_size)
}

/// Compute where the data of `segment` comes from and where it goes to, checking every bound and
/// every addition on the way. Returns `None` for segments that are not loaded.
fn plan_segment<'elf>(
    elf: &ElfFile<'elf>,
    index: usize,
    segment: &ProgramHeader,
    min_vaddr: VAddr,
    image: AddrRange,
) -> Result<Option<SegmentCopy<'elf>>, LoadError> {
    if segment.kind != SegmentKind::Load {
        return Ok(None);
    }

    let invalid = || {
        error!("Segment {} invalid: {:?}", index, segment);
        LoadError::SegmentBounds { index }
    };

    let image_size = image.len();
    let seg_vaddr = VAddr::try_from(segment.vaddr).map_err(|_| invalid())?;
    let seg_size = usize::try_from(segment.file_size).map_err(|_| invalid())?;
    let seg_elf_offset = usize::try_from(segment.offset).map_err(|_| invalid())?;

    if seg_vaddr < min_vaddr || seg_size > image_size {
        return Err(invalid());
    }
    let seg_virt_offset = seg_vaddr - min_vaddr;

    // Source pointer arithmetic must not wrap and the data must be inside the image file.
    let elf_base = elf.bytes().as_ptr() as usize;
    elf_base
        .checked_add(seg_elf_offset)
        .and_then(|seg_src_addr| seg_src_addr.checked_add(seg_size))
        .ok_or_else(invalid)?;
    let data = seg_elf_offset
        .checked_add(seg_size)
        .and_then(|seg_elf_end| elf.bytes().get(seg_elf_offset..seg_elf_end))
        .ok_or_else(invalid)?;

    if seg_virt_offset > image_size
        || seg_virt_offset
            .checked_add(seg_size)
            .map_or(true, |end| end > image_size)
    {
        return Err(invalid());
    }

    let seg_dest_paddr = image
        .start
        .checked_add(seg_virt_offset)
        .filter(|dest| dest.checked_add(seg_size).is_some())
        .ok_or_else(invalid)?;

    Ok(Some(SegmentCopy {
        dest_paddr: seg_dest_paddr,
        data,
    }))
}
