use elf::ElfFile;
use log::{error, info};
use types::fmt::ByteSize;
use types::image::ImagePlacement;
use types::mem::{is_aligned, round_up, AddrRange, PAddr, VAddr, PAGE_BITS, WORD_ACCESS_BITS};

use crate::{ensure_phys_range_valid, unpack_elf_to_paddr, LoadError, Misalignment, PhysicalMemory};

/// Load the ELF image `elf_blob` into physical memory at `dest_paddr` and describe where it went.
///
/// The image size is rounded up to whole pages; the padding is zeroed as well and is part of the
/// recorded physical region. `loader` is the physical range occupied by the running loader, which
/// the image must not overlap. Checks are run in this order, the first failing one aborts:
///
/// 1. ELF memory bounds can be determined ([`LoadError::ElfFormat`])
/// 2. `dest_paddr` is page aligned and word aligned ([`LoadError::Alignment`])
/// 3. the ELF file passes the integrity check ([`LoadError::ElfFormat`])
/// 4. the lowest virtual address is page aligned ([`LoadError::Alignment`])
/// 5. the destination does not wrap ([`LoadError::Overflow`]) and does not overlap the loader
///    ([`LoadError::Overlap`])
/// 6. every segment fits ([`unpack_elf_to_paddr()`])
pub fn load_kernel_elf<M: PhysicalMemory + ?Sized>(
    name: &str,
    elf_blob: &[u8],
    dest_paddr: PAddr,
    loader: AddrRange,
    memory: &mut M,
) -> Result<ImagePlacement, LoadError> {
    info!("ELF-loading image '{}' to {:#x}", name, dest_paddr);

    let (elf, (min_vaddr, max_vaddr)) = ElfFile::new(elf_blob)
        .and_then(|elf| Ok((elf, elf.memory_bounds()?)))
        .map_err(|err| {
            error!("Could not get image bounds: {}", err);
            LoadError::ElfFormat(err)
        })?;

    // Round up the size to the end of the page
    let max_vaddr = round_up(max_vaddr, PAGE_BITS).ok_or_else(|| {
        error!("Image end {:#x} cannot be rounded up to a page", max_vaddr);
        LoadError::Overflow
    })?;
    let image_size = max_vaddr - min_vaddr;

    if !is_aligned(dest_paddr as u64, PAGE_BITS) {
        error!("Attempting to load ELF at unaligned physical address");
        return Err(LoadError::Alignment(Misalignment::DestinationPage(
            dest_paddr,
        )));
    }
    if !is_aligned(dest_paddr as u64, WORD_ACCESS_BITS) {
        error!("Physical load address not 4-byte aligned");
        return Err(LoadError::Alignment(Misalignment::DestinationWord(
            dest_paddr,
        )));
    }

    let address_range_error = || {
        error!(
            "Image virtual address [{:#x}..{:#x}] exceeds {:#x}",
            min_vaddr,
            max_vaddr,
            usize::MAX
        );
        LoadError::AddressRange {
            min_vaddr,
            max_vaddr,
        }
    };
    let image_size = usize::try_from(image_size).map_err(|_| address_range_error())?;

    info!(
        "  paddr={}",
        AddrRange::new(dest_paddr, dest_paddr.wrapping_add(image_size))
    );
    info!("  vaddr=[{:#x}..{:#x}]", min_vaddr, max_vaddr - 1);
    info!("  virt_entry={:#x}", elf.entry_point());
    info!("  size={}", ByteSize::from(image_size));

    elf.check_file().map_err(|err| {
        error!("Invalid ELF file: {}", err);
        LoadError::ElfFormat(err)
    })?;

    if !is_aligned(min_vaddr, PAGE_BITS) {
        error!("Start of image is not 4K-aligned");
        return Err(LoadError::Alignment(Misalignment::ImageStart(min_vaddr)));
    }

    let image = AddrRange::from_len(dest_paddr, image_size).ok_or_else(|| {
        error!("Image destination address integer overflow");
        LoadError::Overflow
    })?;

    ensure_phys_range_valid(image.start, image.end, loader).map_err(|err| {
        error!("Physical address range invalid");
        err
    })?;

    let unpacked_size = unpack_elf_to_paddr(&elf, dest_paddr, memory).map_err(|err| {
        error!("Unpacking ELF to {:#x} failed", dest_paddr);
        err
    })?;

    // Clear the padding up to the page boundary, the kernel sees it as part of its image.
    memory.zero(dest_paddr + unpacked_size, image_size - unpacked_size);

    let (Ok(virt_start), Ok(virt_end), Ok(virt_entry)) = (
        VAddr::try_from(min_vaddr),
        VAddr::try_from(max_vaddr),
        VAddr::try_from(elf.entry_point()),
    ) else {
        return Err(address_range_error());
    };

    ImagePlacement::place(dest_paddr, virt_start, virt_end, virt_entry).ok_or(LoadError::Overflow)
}
