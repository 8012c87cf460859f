//! Architecture specific code. Only AArch64 is supported. The page table layout is plain data and
//! builds on any host, so it can be tested there.

#[cfg(all(target_arch = "aarch64", not(test)))]
pub mod aarch64;
pub mod paging;

#[cfg(all(target_arch = "aarch64", not(test)))]
pub use aarch64::{halt_core, AArch64};
