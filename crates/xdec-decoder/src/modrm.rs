//! Phase 4 of §4.1: ModR/M, SIB, and displacement. Grounded on the
//! teacher's `ModRm`/`Sib` types, generalized to also resolve the actual
//! addressing-mode registers (the teacher only needed byte counts, since
//! it was computing instruction length, not a full operand).

use xdec_types::{MemoryOperand, Register, RegisterKind, SegmentOverride};

#[derive(Debug, Clone, Copy)]
pub struct ModRm {
    pub md: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    pub fn from_byte(byte: u8) -> Self {
        Self { md: (byte >> 6) & 0b11, reg: (byte >> 3) & 0b111, rm: byte & 0b111 }
    }

    pub fn needs_sib(&self) -> bool {
        self.md != 3 && self.rm == 4
    }

    pub fn is_register_form(&self) -> bool {
        self.md == 3
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Sib {
    pub scale: u8,
    pub index: u8,
    pub base: u8,
}

impl Sib {
    pub fn from_byte(byte: u8) -> Self {
        Self { scale: (byte >> 6) & 0b11, index: (byte >> 3) & 0b111, base: byte & 0b111 }
    }

    /// `base == 5` with `mod` 0 or 2 means "no base register, 32-bit
    /// displacement" rather than `(R|E)BP`.
    pub fn base_is_disp_only(&self, modrm: &ModRm) -> bool {
        self.base == 5 && modrm.md == 0
    }
}

/// Everything phase 4 produces for one instruction.
#[derive(Debug, Clone, Copy)]
pub struct ModrmResult {
    pub modrm: ModRm,
    pub sib: Option<Sib>,
    /// Bytes consumed by ModR/M + SIB + displacement.
    pub consumed: usize,
    pub displacement: i64,
    pub has_displacement: bool,
    /// True for `mod=00,rm=101` in 64-bit addressing: the displacement is
    /// RIP-relative rather than an absolute 32-bit address.
    pub rip_relative: bool,
}

/// Reads the ModR/M byte (and SIB/displacement if present) starting at
/// `buf[pos]`. `address_size` is 2, 4, or 8.
pub fn read(buf: &[u8], pos: usize, address_size: u8, mode64: bool) -> Option<ModrmResult> {
    let modrm = ModRm::from_byte(*buf.get(pos)?);
    let mut consumed = 1;
    let mut sib = None;
    let mut rip_relative = false;

    let disp_len = if modrm.needs_sib() {
        let sib_byte = Sib::from_byte(*buf.get(pos + consumed)?);
        consumed += 1;
        let len = if sib_byte.base_is_disp_only(&modrm) {
            4
        } else {
            disp_len_for_mod(modrm.md, address_size)
        };
        sib = Some(sib_byte);
        len
    } else if modrm.md == 0 && modrm.rm == 5 {
        // Always a 32-bit displacement, never a register base, regardless
        // of the generic mod==0 "no displacement" rule below.
        rip_relative = mode64;
        4
    } else {
        disp_len_for_mod(modrm.md, address_size)
    };

    let has_displacement = disp_len > 0;
    let displacement = if has_displacement {
        let bytes = buf.get(pos + consumed..pos + consumed + disp_len)?;
        consumed += disp_len;
        sign_extend(bytes)
    } else {
        0
    };

    Some(ModrmResult { modrm, sib, consumed, displacement, has_displacement, rip_relative })
}

fn disp_len_for_mod(md: u8, address_size: u8) -> usize {
    match md {
        0 => 0,
        1 => 1,
        // disp32 in 32- and 64-bit addressing, disp16 only in 16-bit
        // addressing -- never 8 bytes, regardless of `address_size` tracking
        // the 8-byte GPR width in 64-bit mode.
        2 => if address_size == 2 { 2 } else { 4 },
        3 => 0,
        _ => unreachable!("mod field is two bits"),
    }
}

fn sign_extend(bytes: &[u8]) -> i64 {
    match bytes.len() {
        1 => bytes[0] as i8 as i64,
        2 => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
        4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
        _ => unreachable!("displacement is 0, 1, 2, or 4 bytes"),
    }
}

/// Resolves a `r/m`-field memory operand once ModR/M (and SIB, if read)
/// are known. Returns `None` if `mod == 3` (the caller should read a
/// register operand from `rm` directly in that case).
pub fn memory_operand(
    r: &ModrmResult,
    address_size: u8,
    rex_x: bool,
    rex_b: bool,
    explicit_segment: Option<SegmentOverride>,
) -> Option<MemoryOperand> {
    if r.modrm.is_register_form() {
        return None;
    }
    let gpr_kind = RegisterKind::Gpr;

    if let Some(sib) = r.sib {
        let index = if sib.index == 4 && !rex_x {
            None
        } else {
            Some(Register::new(gpr_kind, sib.index | ((rex_x as u8) << 3)))
        };
        let disp_only = sib.base_is_disp_only(&r.modrm);
        let base = if disp_only {
            None
        } else {
            Some(Register::new(gpr_kind, sib.base | ((rex_b as u8) << 3)))
        };
        let base_field = if disp_only { None } else { Some(sib.base) };
        return Some(MemoryOperand {
            base,
            index,
            scale: 1 << sib.scale,
            has_displacement: r.has_displacement,
            rip_relative: false,
            segment: explicit_segment.unwrap_or(default_segment(base_field)),
        });
    }

    if r.rip_relative {
        return Some(MemoryOperand {
            base: None,
            index: None,
            scale: 1,
            has_displacement: true,
            rip_relative: true,
            segment: explicit_segment.unwrap_or(SegmentOverride::Ds),
        });
    }
    if r.modrm.md == 0 && r.modrm.rm == 5 {
        // 32-bit addressing, mod=00,rm=101: absolute disp32, no base.
        return Some(MemoryOperand {
            base: None,
            index: None,
            scale: 1,
            has_displacement: true,
            rip_relative: false,
            segment: explicit_segment.unwrap_or(SegmentOverride::Ds),
        });
    }

    let _ = address_size;
    let base = Register::new(gpr_kind, r.modrm.rm | ((rex_b as u8) << 3));
    Some(MemoryOperand {
        base: Some(base),
        index: None,
        scale: 1,
        has_displacement: r.has_displacement,
        rip_relative: false,
        segment: explicit_segment.unwrap_or(default_segment(Some(r.modrm.rm))),
    })
}

/// DS is the default for every addressing form except a base register drawn
/// from the SP/BP slot (`4`/`5`), which implies SS (ESP/RSP/R12, EBP/RBP/R13
/// as a base — the REX.B extension bit doesn't change which slot it is).
fn default_segment(base_field: Option<u8>) -> SegmentOverride {
    match base_field {
        Some(4) | Some(5) => SegmentOverride::Ss,
        _ => SegmentOverride::Ds,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_form_has_no_sib_or_displacement() {
        // mod=11, reg=000, rm=011: C3... actually build byte directly.
        let byte = 0b11_000_011;
        let r = read(&[byte], 0, 4, false).unwrap();
        assert!(r.modrm.is_register_form());
        assert!(!r.has_displacement);
        assert_eq!(r.consumed, 1);
    }

    #[test]
    fn mod10_disp32_in_64_bit_addressing_is_four_bytes_not_eight() {
        // ModR/M: mod=10, reg=000, rm=000 -- ... + disp32, no SIB.
        let byte = 0b10_000_000;
        let disp = [0x78, 0x56, 0x34, 0x12];
        let mut buf = vec![byte];
        buf.extend_from_slice(&disp);
        let r = read(&buf, 0, 8, true).unwrap();
        assert_eq!(r.consumed, 5);
        assert_eq!(r.displacement, 0x12345678);
    }

    #[test]
    fn mod00_rm101_is_rip_relative_in_64_bit_mode() {
        let byte = 0b00_000_101;
        let disp = [0x78, 0x56, 0x34, 0x12];
        let mut buf = vec![byte];
        buf.extend_from_slice(&disp);
        let r = read(&buf, 0, 8, true).unwrap();
        assert!(r.rip_relative);
        assert_eq!(r.displacement, 0x12345678);
        assert_eq!(r.consumed, 5);
    }

    #[test]
    fn sib_with_base5_mod0_has_disp32_and_no_base() {
        // ModR/M: mod=00, rm=100 (SIB follows); SIB: base=101.
        let modrm_byte = 0b00_000_100;
        let sib_byte = 0b00_000_101;
        let disp = [0x78, 0x56, 0x34, 0x12];
        let mut buf = vec![modrm_byte, sib_byte];
        buf.extend_from_slice(&disp);
        let r = read(&buf, 0, 4, false).unwrap();
        let mem = memory_operand(&r, 4, false, false, None).unwrap();
        assert!(mem.base.is_none());
        assert_eq!(r.displacement, 0x12345678);
    }

    #[test]
    fn sib_index4_with_no_rex_x_has_no_index_register() {
        let modrm_byte = 0b00_000_100;
        let sib_byte = 0b00_100_011; // index=100(4), base=011
        let r = read(&[modrm_byte, sib_byte], 0, 4, false).unwrap();
        let mem = memory_operand(&r, 4, false, false, None).unwrap();
        assert!(mem.index.is_none());
    }
}
