//! Derives the `Mnemonic` enum from the canonical instruction description
//! (`xdec-tablegen/opcodes.txt`) so the enum is never hand-maintained
//! (spec §9: "derive the enum itself from the spec file").

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    let graph = xdec_tablegen::parse_default_spec().unwrap_or_else(|errors| {
        panic!("failed to parse the canonical instruction description:\n{errors}");
    });

    let out_dir = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR not set"));
    let rendered = xdec_tablegen::codegen::render_mnemonic_enum(&graph);
    fs::write(out_dir.join("mnemonic_generated.rs"), rendered).expect("failed to write mnemonic_generated.rs");

    println!("cargo:rerun-if-changed=../xdec-tablegen/opcodes.txt");
}
