//! Shared data model for the x86-32/x86-64 instruction decoder: the
//! [`Instruction`] record, the [`Operand`] sum type, the generated
//! [`Mnemonic`] enum, and [`DecodeError`]. `no_std`, no heap allocation —
//! every type here is `Copy` and fixed-size, so a decoder built on top of
//! this crate never allocates to produce a result (§3.4).

#![no_std]

mod error;
mod instruction;
mod mnemonic;
mod operand;
mod prefix;
mod registers;

pub use error::DecodeError;
pub use instruction::{Instruction, MAX_INSTRUCTION_LENGTH, OPERAND_SLOTS};
pub use mnemonic::{Mnemonic, MNEMONIC_COUNT};
pub use operand::{ImmKind, MemoryOperand, ModeGate, Operand, OperandTemplate};
pub use prefix::{PrefixFlags, SegmentOverride};
pub use registers::{Register, RegisterKind};
