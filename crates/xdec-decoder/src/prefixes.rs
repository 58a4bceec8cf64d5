//! Phases 1–2 of §4.1: legacy prefix accumulation, then REX/VEX/XOP
//! recognition. Grounded on the teacher's `parse_prefixes`/`RexPrefix`, but
//! generalized from a fixed 4-slot array to per-group "last one wins"
//! state (§4.1 phase 1: "a repeated prefix of the same group keeps the
//! last one") and extended with real VEX decoding (the teacher only
//! stubbed `VexPrefix` with a `TODO`).

use bit_field::BitField;

use xdec_types::{DecodeError, PrefixFlags, SegmentOverride};

/// Which mandatory-prefix/opcode-map selection a legacy byte or VEX prefix
/// contributes (§3.3 discriminator 2/3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MandatoryPrefix {
    None,
    P66,
    PF2,
    PF3,
}

/// Opcode map selector (§3.3): which root table to start the opcode walk
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpMap {
    One,
    Ext0F,
    Ext0F38,
    Ext0F3A,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RexPrefix {
    pub w: bool,
    pub r: bool,
    pub x: bool,
    pub b: bool,
}

impl RexPrefix {
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte & 0xF0 == 0x40 {
            Some(Self {
                w: byte.get_bit(3),
                r: byte.get_bit(2),
                x: byte.get_bit(1),
                b: byte.get_bit(0),
            })
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VexPrefix {
    pub map: OpMap,
    pub pp: MandatoryPrefix,
    pub r: bool,
    pub x: bool,
    pub b: bool,
    pub vvvv: u8,
    pub l256: bool,
    pub w: bool,
    /// True for a byte sequence this crate recognizes the *shape* of
    /// (`8F` XOP) but has no tabulated instructions for; such encodings
    /// always resolve to `INVALID` at the opcode walk rather than
    /// misreading an XOP-only opcode map as one of ours.
    pub unmapped: bool,
}

fn pp_to_mandatory(pp: u8) -> MandatoryPrefix {
    match pp & 0b11 {
        0b01 => MandatoryPrefix::P66,
        0b10 => MandatoryPrefix::PF3,
        0b11 => MandatoryPrefix::PF2,
        _ => MandatoryPrefix::None,
    }
}

fn mm_to_map(mm: u8) -> Option<OpMap> {
    match mm {
        0b00001 => Some(OpMap::One),
        0b00010 => Some(OpMap::Ext0F38),
        0b00011 => Some(OpMap::Ext0F3A),
        _ => None,
    }
}

/// Everything phases 1–2 produce: per-group legacy prefix state, plus
/// whichever of REX/VEX/XOP was present.
#[derive(Debug, Clone, Default)]
pub struct PrefixState {
    pub lock: bool,
    /// `None` unless an `F2` or `F3` byte was seen; repeats of either
    /// overwrite this with the most recent one (§4.1 phase 1).
    pub rep: Option<u8>,
    pub segment: Option<SegmentOverride>,
    pub operand_size_override: bool,
    pub address_size_override: bool,
    pub rex: Option<RexPrefix>,
    pub vex: Option<VexPrefix>,
    /// Total bytes consumed by phases 1 and 2.
    pub length: usize,
}

impl PrefixState {
    pub fn mandatory_prefix(&self) -> MandatoryPrefix {
        if let Some(vex) = self.vex {
            return vex.pp;
        }
        match self.rep {
            Some(0xF3) => MandatoryPrefix::PF3,
            Some(0xF2) => MandatoryPrefix::PF2,
            _ if self.operand_size_override => MandatoryPrefix::P66,
            _ => MandatoryPrefix::None,
        }
    }

    pub fn op_map(&self) -> OpMap {
        self.vex.map(|v| v.map).unwrap_or(OpMap::One)
    }

    pub fn rex_w(&self) -> bool {
        self.vex.map(|v| v.w).or(self.rex.map(|r| r.w)).unwrap_or(false)
    }

    pub fn vex_present(&self) -> bool {
        self.vex.is_some()
    }

    pub fn to_flags(&self) -> PrefixFlags {
        let mut flags = PrefixFlags::empty();
        if self.lock {
            flags |= PrefixFlags::LOCK;
        }
        match self.rep {
            Some(0xF3) => flags |= PrefixFlags::REP,
            Some(0xF2) => flags |= PrefixFlags::REPNZ,
            _ => {}
        }
        if self.segment.is_some() {
            flags |= PrefixFlags::SEGMENT_OVERRIDE;
        }
        if self.vex_present() {
            flags |= PrefixFlags::VEX_PRESENT;
        }
        if self.rex_w() {
            flags |= PrefixFlags::REX_W;
        }
        if self.operand_size_override {
            flags |= PrefixFlags::OPERAND_SIZE_OVERRIDE;
        }
        if self.address_size_override {
            flags |= PrefixFlags::ADDRESS_SIZE_OVERRIDE;
        }
        flags
    }
}

/// Runs phases 1 and 2 over `buf`, stopping at the first byte that is
/// neither a legacy prefix nor REX/VEX/XOP (that byte is the opcode and is
/// left unread).
pub fn parse(buf: &[u8], mode: u32) -> Result<PrefixState, DecodeError> {
    let mut state = PrefixState::default();
    let mut pos = 0usize;

    while pos < buf.len() && pos < xdec_types::MAX_INSTRUCTION_LENGTH {
        match buf[pos] {
            0xF0 => state.lock = true,
            0xF2 | 0xF3 => state.rep = Some(buf[pos]),
            0x2E => state.segment = Some(SegmentOverride::Cs),
            0x36 => state.segment = Some(SegmentOverride::Ss),
            0x3E => state.segment = Some(SegmentOverride::Ds),
            0x26 => state.segment = Some(SegmentOverride::Es),
            0x64 => state.segment = Some(SegmentOverride::Fs),
            0x65 => state.segment = Some(SegmentOverride::Gs),
            0x66 => state.operand_size_override = true,
            0x67 => state.address_size_override = true,
            _ => break,
        }
        pos += 1;
    }

    if mode == 64 {
        if let Some(rex) = buf.get(pos).copied().and_then(RexPrefix::from_byte) {
            state.rex = Some(rex);
            pos += 1;
        }
    }

    // VEX/XOP are recognized only when they can't be an ordinary opcode:
    // in 32-bit mode, the byte after the prefix must look like a ModR/M
    // byte with mod==3 (otherwise C4/C5/8F are LDS/LES/POP r/m); in
    // 64-bit mode they're unambiguous since LDS/LES don't exist there.
    if state.rex.is_none() {
        if let Some(&first) = buf.get(pos) {
            let looks_like_vex = mode == 64 || buf.get(pos + 1).is_some_and(|&b| b & 0xC0 == 0xC0);
            if looks_like_vex {
                match first {
                    0xC5 if buf.len() > pos + 1 => {
                        let b1 = buf[pos + 1];
                        state.vex = Some(VexPrefix {
                            map: OpMap::Ext0F,
                            pp: pp_to_mandatory(b1),
                            r: !b1.get_bit(7),
                            // The 2-byte form has no X/B bits at all -- both
                            // are implicitly not-extended, unlike the 3-byte
                            // form's explicit (inverted) bits below.
                            x: false,
                            b: false,
                            vvvv: !(b1 >> 3) & 0b1111,
                            l256: b1.get_bit(2),
                            w: false,
                            unmapped: false,
                        });
                        pos += 2;
                    }
                    0xC4 if buf.len() > pos + 2 => {
                        let b1 = buf[pos + 1];
                        let b2 = buf[pos + 2];
                        let map = mm_to_map(b1 & 0b1_1111);
                        state.vex = Some(VexPrefix {
                            map: map.unwrap_or(OpMap::One),
                            pp: pp_to_mandatory(b2),
                            r: !b1.get_bit(7),
                            x: !b1.get_bit(6),
                            b: !b1.get_bit(5),
                            vvvv: !(b2 >> 3) & 0b1111,
                            l256: b2.get_bit(2),
                            w: b2.get_bit(7),
                            unmapped: map.is_none(),
                        });
                        pos += 3;
                    }
                    0x8F if buf.len() > pos + 2 && buf[pos + 1] & 0b1_1111 >= 0b01000 => {
                        let b1 = buf[pos + 1];
                        let b2 = buf[pos + 2];
                        state.vex = Some(VexPrefix {
                            map: OpMap::One,
                            pp: pp_to_mandatory(b2),
                            r: !b1.get_bit(7),
                            x: !b1.get_bit(6),
                            b: !b1.get_bit(5),
                            vvvv: !(b2 >> 3) & 0b1111,
                            l256: b2.get_bit(2),
                            w: b2.get_bit(7),
                            unmapped: true,
                        });
                        pos += 3;
                    }
                    _ => {}
                }
            }
        }
    }

    if state.lock && state.vex_present() {
        return Err(DecodeError::Invalid);
    }

    state.length = pos;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_operand_size_prefix_collapses_to_one_flag() {
        let state = parse(&[0x66, 0x66, 0x90], 64).unwrap();
        assert_eq!(state.length, 2);
        assert!(state.operand_size_override);
    }

    #[test]
    fn last_rep_group_byte_wins() {
        let state = parse(&[0xF2, 0xF3, 0x90], 64).unwrap();
        assert_eq!(state.rep, Some(0xF3));
    }

    #[test]
    fn rex_only_recognized_in_64_bit_mode() {
        let s64 = parse(&[0x48, 0x01, 0xD8], 64).unwrap();
        assert!(s64.rex.is_some());
        assert_eq!(s64.length, 1);

        let s32 = parse(&[0x48, 0x01, 0xD8], 32).unwrap();
        assert!(s32.rex.is_none());
        assert_eq!(s32.length, 0);
    }

    #[test]
    fn two_byte_vex_selects_the_0f_map() {
        // VZEROUPPER: C5 F8 77
        let state = parse(&[0xC5, 0xF8, 0x77], 64).unwrap();
        let vex = state.vex.unwrap();
        assert!(matches!(vex.map, OpMap::Ext0F));
        assert!(!vex.l256);
        assert_eq!(state.length, 2);
    }

    #[test]
    fn two_byte_vex_has_no_x_or_b_extension_bits() {
        // The 2-byte VEX form has no room for REX.X/REX.B; both must come
        // out false regardless of the other bits in the second byte.
        let state = parse(&[0xC5, 0xF9, 0xEF, 0xC0], 64).unwrap();
        let vex = state.vex.unwrap();
        assert!(!vex.x);
        assert!(!vex.b);
    }

    #[test]
    fn lock_with_vex_is_invalid() {
        let err = parse(&[0xF0, 0xC5, 0xF8, 0x77], 64).unwrap_err();
        assert_eq!(err, DecodeError::Invalid);
    }

    #[test]
    fn three_byte_vex_in_32_bit_mode_needs_a_mod3_disambiguator() {
        // Without a ModR/M-looking follow-up byte, C4 in 32-bit mode is
        // the LES opcode, not VEX.
        let state = parse(&[0xC4, 0x01], 32).unwrap();
        assert!(state.vex.is_none());
        assert_eq!(state.length, 0);
    }
}
