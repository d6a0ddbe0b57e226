//! Build script for matrix-envoy.
//!
//! Selects the correct `memory.x` linker script for the target board.

use std::{env, fs, path::Path, path::PathBuf};

fn main() {
    println!("cargo:rustc-check-cfg=cfg(rust_analyzer)");

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR is set by cargo"));
    let target = env::var("TARGET").expect("TARGET is set by cargo");

    if target.starts_with("thumbv6m") {
        // Pico 1 (RP2040)
        copy_memory_x("memory-pico1.x", &out_dir);
    } else if target.starts_with("thumbv8m") || target.starts_with("riscv32imac") {
        // Pico 2 (RP2350), ARM or RISC-V core
        copy_memory_x("memory-pico2.x", &out_dir);
    }
}

fn copy_memory_x(name: &str, out_dir: &Path) {
    let memory_x = fs::read_to_string(name).unwrap_or_else(|_| panic!("Failed to read {name}"));
    let dest = out_dir.join("memory.x");
    fs::write(&dest, memory_x).expect("Failed to write memory.x");
    println!("cargo:rustc-link-search={}", out_dir.display());
    println!("cargo:rerun-if-changed={name}");
}
