//! Build Script for Currency Service
//!
//! Protobuf bindings are checked in under `packages/schema-gen/rust/currency/v1/`
//! and included directly, so this script only tracks the contract for rebuilds
//! and emits the coverage cfg.

use std::env;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=../../packages/proto/currency/");
    println!("cargo:rerun-if-changed=../../packages/schema-gen/rust/currency/");

    // Emit cfg for coverage detection
    if env::var("CARGO_LLVM_COV").is_ok()
        || env::var("LLVM_PROFILE_FILE").is_ok()
        || env::var("RUSTFLAGS")
            .map(|f| f.contains("instrument-coverage"))
            .unwrap_or(false)
    {
        println!("cargo:rustc-cfg=coverage");
    }
}
