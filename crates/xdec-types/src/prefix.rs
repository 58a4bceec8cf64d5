//! Prefix-derived state carried on the `Instruction` record (§3.1
//! `prefix_flags`, `segment_override`).

use bitflags::bitflags;

bitflags! {
    /// Presence bits for prefixes that matter to callers, independent of
    /// whether they changed the decoded operand/address size (§3.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PrefixFlags: u16 {
        /// `F3` when it means REP (not REPZ on `SCAS`/`CMPS`, see the
        /// string-prefix quirk in §4.1 — the flag is still set there).
        const REP = 1 << 0;
        /// `F2`, or `F3` on `SCAS`/`CMPS` architecturally meaning REPNZ.
        const REPNZ = 1 << 1;
        /// `F0`.
        const LOCK = 1 << 2;
        /// A segment-override prefix was present; which one is in
        /// `Instruction::segment_override`.
        const SEGMENT_OVERRIDE = 1 << 3;
        /// A VEX or XOP prefix introduced this encoding.
        const VEX_PRESENT = 1 << 4;
        /// REX.W was set (64-bit mode only).
        const REX_W = 1 << 5;
        /// `66` was present, whether or not it changed the effective
        /// operand size (distinct from the finalized `operand_size` field).
        const OPERAND_SIZE_OVERRIDE = 1 << 6;
        /// `67` was present.
        const ADDRESS_SIZE_OVERRIDE = 1 << 7;
    }
}

/// Effective segment override after resolution (§4.1 finalization:
/// `FS`/`GS` always win; other overrides are recorded but ignored for
/// 64-bit address computation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentOverride {
    #[default]
    None,
    Cs,
    Ss,
    Ds,
    Es,
    Fs,
    Gs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_query_independently() {
        let f = PrefixFlags::LOCK | PrefixFlags::REX_W;
        assert!(f.contains(PrefixFlags::LOCK));
        assert!(f.contains(PrefixFlags::REX_W));
        assert!(!f.contains(PrefixFlags::REP));
    }
}
