//! Compiles the canonical instruction description into the dispatch tables
//! this crate indexes at runtime. Run at every `cargo build`, not just on a
//! separate "generator" invocation, so the checked-in `opcodes.txt` and the
//! tables baked into the binary can never drift apart.

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let graph = xdec_tablegen::parse_default_spec().unwrap_or_else(|errors| {
        panic!("failed to parse the canonical instruction description:\n{errors}");
    });

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR not set"));
    let rendered = xdec_tablegen::codegen::render_tables(&graph);
    fs::write(out_dir.join("tables_generated.rs"), rendered).expect("failed to write tables_generated.rs");

    println!("cargo:rerun-if-changed=../xdec-tablegen/opcodes.txt");
}
