//! Plain data shared by the loader crates: physical and virtual address ranges, the record that
//! describes where an image was placed, the kernel handoff arguments and helpers to format sizes
//! in the boot log.

#![cfg_attr(not(test), no_std)]

pub mod fmt;
pub mod image;
pub mod mem;
