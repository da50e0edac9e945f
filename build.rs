//! Build script for poolhive.
//!
//! Prints a few build-time hints about feature combinations.

use std::env;

fn main() {
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DEBUG");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");

    let debug_enabled = env::var("CARGO_FEATURE_DEBUG").is_ok();
    let profile = env::var("PROFILE").unwrap_or_default();

    if debug_enabled && profile == "release" {
        emit_warning("'debug' feature enabled in a release build");
        emit_note("every stack pool allocation and reset rewrites memory with 0xCC");
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("wasm") {
        emit_warning("WebAssembly target detected");
        emit_note("Hive needs OS threads; only the memory pools are usable here");
    }
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[poolhive] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[poolhive]    {}", msg);
}
