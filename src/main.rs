#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

#[cfg(all(not(test), not(target_arch = "aarch64")))]
compile_error!("the loader only runs on aarch64, build with `--target aarch64-unknown-none`");

mod arch;

#[cfg(all(target_arch = "aarch64", not(test)))]
mod boot;

mod config;

#[cfg(all(target_arch = "aarch64", not(test)))]
mod logging;

/// The panic handler is called whenever the loader encountered an unrecoverable error. There is
/// nothing to fall back to, so report the reason and stop this core.
#[cfg(not(test))]
#[panic_handler]
fn panic(reason: &core::panic::PanicInfo) -> ! {
    log::error!("Halting due to unrecoverable loader panic:\n{}", reason);
    arch::halt_core();
}
