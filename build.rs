use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo::rustc-check-cfg=cfg(embedded_kernel)");
    println!("cargo::rerun-if-env-changed=KERNEL_ELF");

    let bare_metal = env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("none");
    if bare_metal && env::var("CARGO_CFG_TARGET_ARCH").as_deref() == Ok("aarch64") {
        let manifest_dir = PathBuf::from(env::var_os("CARGO_MANIFEST_DIR").unwrap());
        let script = manifest_dir.join("link.ld");
        println!("cargo::rerun-if-changed={}", script.display());
        println!("cargo::rustc-link-arg-bins=-T{}", script.display());
    }

    if let Some(kernel) = env::var_os("KERNEL_ELF") {
        let kernel = PathBuf::from(kernel);
        println!("cargo::rerun-if-changed={}", kernel.display());
        println!("cargo::rustc-env=KERNEL_ELF={}", kernel.display());
        println!("cargo::rustc-cfg=embedded_kernel");
    }
}
