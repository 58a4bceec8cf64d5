//! Table-driven x86-32/x86-64 instruction decoder (§2, §4.1). `no_std`, no
//! heap allocation, no I/O: every call is a pure function of `buf` and the
//! static dispatch tables baked in by `build.rs` (§5).

#![no_std]

mod decode;
mod modrm;
mod prefixes;
mod tables;

pub use decode::decode;
pub use xdec_types::{
    DecodeError, ImmKind, Instruction, MemoryOperand, ModeGate, Operand, OperandTemplate,
    PrefixFlags, Register, RegisterKind, SegmentOverride, MAX_INSTRUCTION_LENGTH, OPERAND_SLOTS,
};
pub use xdec_types::{Mnemonic, MNEMONIC_COUNT};
