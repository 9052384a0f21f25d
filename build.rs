//!
//! Probe the toolchain for optional features used by the kernels.
//!

fn main() {
    let ac = autocfg::new();

    // branch-free pointer selection in the zero-padding resolver
    ac.emit_path_cfg("std::hint::select_unpredictable", "has_select_unpredictable");
    println!("cargo:rustc-check-cfg=cfg(has_select_unpredictable)");

    autocfg::rerun_path("build.rs");
}
