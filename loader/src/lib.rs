//! The loader core: places the kernel ELF image in physical memory, records where it went and
//! coordinates the cores of the machine until all of them jump into the kernel.
//!
//! Everything in here is independent of the machine it runs on. Writes to physical memory go
//! through [`PhysicalMemory`] and all other hardware operations through [`Platform`], so that the
//! whole boot sequence can be exercised on the host.

#![cfg_attr(not(test), no_std)]

mod bounds;
mod error;
mod load;
mod memory;
mod sequence;
pub mod smp;
mod sync;
mod unpack;

pub use bounds::ensure_phys_range_valid;
pub use error::{BootError, LoadError, Misalignment};
pub use load::load_kernel_elf;
pub use memory::{IdentityMapped, PhysicalMemory};
pub use sequence::{secondary_main, BootConfig, BootSequencer, BootState, Platform};
pub use unpack::unpack_elf_to_paddr;
