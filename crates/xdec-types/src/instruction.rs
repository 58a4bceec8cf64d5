//! The decoder's sole output record (§3.1) and its accessor surface (§6.2).
//! Fixed-size, no indirection, `Copy`: callers own it on the stack, and the
//! decoder never has to allocate one.

use crate::mnemonic::Mnemonic;
use crate::operand::Operand;
use crate::prefix::{PrefixFlags, SegmentOverride};

/// The maximum number of bytes any valid x86 instruction occupies.
pub const MAX_INSTRUCTION_LENGTH: usize = 15;

/// The number of operand slots every instruction carries, used or not
/// (§3.1 "a fixed-length array (4 slots)").
pub const OPERAND_SLOTS: usize = 4;

/// One fully decoded instruction.
///
/// Queried through the accessors below rather than by field access, so a
/// future revision of the layout doesn't break callers (§6.2); the fields
/// themselves stay `pub` because nothing here is an invariant-bearing
/// abstraction, just a flat record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    /// Bytes consumed from the input, `1..=15`.
    pub length: u8,
    /// The virtual address the caller supplied, stored verbatim.
    pub address: u64,
    /// Effective operand size in bytes (1, 2, 4, 8, 16, 32), or 0 for the
    /// §6.5 exception list and for segment/FPU register operands.
    pub operand_size: u8,
    /// Effective address size in bytes (2, 4, or 8).
    pub address_size: u8,
    pub prefix_flags: PrefixFlags,
    pub segment_override: SegmentOverride,
    pub operands: [Operand; OPERAND_SLOTS],
    /// Sign- or zero-extended per the encoding; meaningful only if an
    /// operand is `Operand::Imm`.
    pub immediate: i64,
    /// Meaningful only for memory operands that carry one.
    pub displacement: i64,
}

impl Instruction {
    /// An all-zero record with mnemonic `mnemonic`; the decoder builds one
    /// of these per phase and fills it in as it goes rather than
    /// allocating a fresh one per field (§3.4: no allocation at all).
    pub const fn empty(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            length: 0,
            address: 0,
            operand_size: 0,
            address_size: 0,
            prefix_flags: PrefixFlags::empty(),
            segment_override: SegmentOverride::None,
            operands: [Operand::None; OPERAND_SLOTS],
            immediate: 0,
            displacement: 0,
        }
    }

    pub fn mnemonic(&self) -> Mnemonic {
        self.mnemonic
    }

    pub fn length(&self) -> u8 {
        self.length
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn operand_size(&self) -> u8 {
        self.operand_size
    }

    pub fn address_size(&self) -> u8 {
        self.address_size
    }

    /// The operand at `slot`, or `Operand::None` past the last one in use
    /// (every unused slot is `Operand::None` already, so this never panics).
    pub fn operand(&self, slot: usize) -> Operand {
        self.operands.get(slot).copied().unwrap_or(Operand::None)
    }

    pub fn has_prefix(&self, flag: PrefixFlags) -> bool {
        self.prefix_flags.contains(flag)
    }

    pub fn segment_override(&self) -> SegmentOverride {
        self.segment_override
    }

    /// Meaningful only if some operand is `Operand::Imm`.
    pub fn immediate(&self) -> i64 {
        self.immediate
    }

    /// Meaningful only for memory operands carrying a displacement.
    pub fn displacement(&self) -> i64 {
        self.displacement
    }

    /// The resolved target of a `Operand::Pcrel` operand, if present.
    pub fn pcrel_target(&self) -> Option<u64> {
        self.operands.iter().find_map(|o| match o {
            Operand::Pcrel(target) => Some(*target),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_operands_and_no_prefixes() {
        let instr = Instruction::empty(Mnemonic::NOP);
        assert_eq!(instr.operand(0), Operand::None);
        assert_eq!(instr.operand(99), Operand::None);
        assert!(!instr.has_prefix(PrefixFlags::LOCK));
        assert_eq!(instr.pcrel_target(), None);
    }

    #[test]
    fn pcrel_target_reads_back_a_resolved_operand() {
        let mut instr = Instruction::empty(Mnemonic::CALL);
        instr.operands[0] = Operand::Pcrel(0x40_1000);
        assert_eq!(instr.pcrel_target(), Some(0x40_1000));
    }
}
