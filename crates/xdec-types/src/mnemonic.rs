//! The `Mnemonic` enum, generated at build time from the canonical
//! instruction description (`xdec-tablegen/opcodes.txt`). See
//! `xdec-tablegen`'s `codegen` module for the renderer.

include!(concat!(env!("OUT_DIR"), "/mnemonic_generated.rs"));
