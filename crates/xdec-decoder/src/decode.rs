//! The top-level orchestrator: §4.1 phases 3 (opcode table walk) through 6
//! (finalization), driving `prefixes::parse` and `modrm::read` in sequence.
//! Grounded on the teacher's `parse_prefixes` + `calculate_instruction_length`
//! pipeline, generalized from "count the bytes" to "fill in an `Instruction`".

use xdec_types::{
    DecodeError, ImmKind, Instruction, MemoryOperand, ModeGate, Operand, OperandTemplate,
    Register, RegisterKind, SegmentOverride, MAX_INSTRUCTION_LENGTH,
};

use crate::modrm;
use crate::prefixes::{self, MandatoryPrefix, PrefixState};
use crate::tables::{self, Node, Terminal};

/// Decodes one instruction starting at `buf[0]`. `len` is how many bytes of
/// `buf` are actually available; at most 15 are ever read. `mode` is 32 or
/// 64. Returns the number of bytes consumed and the filled record.
pub fn decode(buf: &[u8], len: usize, mode: u32, address: u64) -> Result<(usize, Instruction), DecodeError> {
    if mode != 32 && mode != 64 {
        return Err(DecodeError::BadMode);
    }

    let prefix_state = prefixes::parse(buf, mode)?;
    if prefix_state.vex.is_some_and(|v| v.unmapped) {
        return Err(DecodeError::Invalid);
    }
    let mut pos = prefix_state.length;

    // A VEX prefix carries its own map selector (`mm`); absent one, a
    // literal `0F` (optionally followed by `38`/`3A`) escapes to the
    // two-/three-byte opcode maps (§3.3 discriminator 2).
    let mut map_idx = op_map_index(&prefix_state);
    if prefix_state.vex.is_none() && buf.get(pos) == Some(&0x0F) {
        pos += 1;
        map_idx = match buf.get(pos) {
            Some(0x38) => {
                pos += 1;
                2
            }
            Some(0x3A) => {
                pos += 1;
                3
            }
            _ => 1,
        };
    }

    let opcode = *buf.get(pos).ok_or(DecodeError::ShortBuffer)?;
    pos += 1;

    let mut node = tables::root_slot(map_idx, opcode);
    let mut reg_in_opcode_value = opcode & 0b111;

    let terminal = loop {
        match tables::node(node) {
            Node::Empty => return Err(DecodeError::Invalid),
            Node::Terminal(t) => break tables::terminal(*t),
            Node::Prefix(slots) => {
                let idx = mandatory_prefix_slot(prefix_state.mandatory_prefix());
                node = slots[idx];
            }
            Node::Reg(slots) => {
                let byte = *buf.get(pos).ok_or(DecodeError::ShortBuffer)?;
                let reg = (byte >> 3) & 0b111;
                node = slots[reg as usize];
            }
            Node::ModSplit { reg_form, mem_form } => {
                let byte = *buf.get(pos).ok_or(DecodeError::ShortBuffer)?;
                node = if byte >> 6 == 0b11 { *reg_form } else { *mem_form };
            }
            Node::RexW { w0, w1 } => {
                node = if prefix_state.rex_w() { *w1 } else { *w0 };
            }
            Node::FixedModrm { pairs, fallback } => {
                let byte = *buf.get(pos).ok_or(DecodeError::ShortBuffer)?;
                node = pairs
                    .iter()
                    .find(|(b, _)| *b == byte)
                    .map(|(_, idx)| *idx)
                    .unwrap_or(*fallback);
                if node == tables::NODE_EMPTY {
                    return Err(DecodeError::Invalid);
                }
            }
            Node::Vex { l128, l256 } => {
                let vex = prefix_state.vex.ok_or(DecodeError::Invalid)?;
                let slot = if vex.l256 { l256 } else { l128 };
                node = slot.resolve(vex.w);
            }
        }
    };

    if !mode_allows(terminal.mode_gate, mode) {
        return Err(DecodeError::Invalid);
    }
    if let Some(required_w) = terminal.rex_w {
        if required_w != prefix_state.rex_w() {
            return Err(DecodeError::Invalid);
        }
    }
    if prefix_state.lock && !terminal.lockable {
        return Err(DecodeError::Invalid);
    }
    // `Instruction` carries a single `immediate` field; a second declared
    // immediate (the `ENTER`/`EXTRQ`-shaped case) has nowhere to go. No
    // current table entry declares two, but reject rather than silently
    // drop the first one if that ever changes.
    if terminal.imms[1].is_some() {
        return Err(DecodeError::Invalid);
    }

    let address_size = compute_address_size(mode, prefix_state.address_size_override);
    let rex = prefix_state.rex;
    let vex = prefix_state.vex;
    let rex_b = rex.map(|r| r.b).or(vex.map(|v| v.b)).unwrap_or(false);
    let rex_x = rex.map(|r| r.x).or(vex.map(|v| v.x)).unwrap_or(false);
    let rex_r = rex.map(|r| r.r).or(vex.map(|v| v.r)).unwrap_or(false);
    if vex.is_none() {
        if let Some(r) = rex {
            reg_in_opcode_value |= (r.b as u8) << 3;
        }
    }

    let mut modrm_info: Option<modrm::ModrmResult> = None;
    if terminal.needs_modrm {
        let r = modrm::read(buf, pos, address_size, mode == 64).ok_or(DecodeError::ShortBuffer)?;
        pos += r.consumed;
        modrm_info = Some(r);
    }

    let explicit_segment = resolve_segment(mode, prefix_state.segment);
    let segment = explicit_segment.unwrap_or(SegmentOverride::None);

    let mut operands = [Operand::None; 4];
    let mut imm_value: i64 = 0;
    let mut displacement: i64 = 0;
    let mut pcrel: Option<(usize, i64)> = None;
    // §4.1 phase 4: `mod=00,r/m=101` in 64-bit addressing resolves against
    // `address + length` like a `Jb`/`Jz` target, not a plain displacement.
    let mut rip_relative_raw_disp: Option<i64> = None;
    // Indexes `terminal.imms`, advanced each time an `Ib`/`Iw`/`Iz` operand
    // is read, so the immediate width comes from the generator's own
    // `declared_imms` rather than being re-derived independently here.
    let mut imm_slot = 0usize;

    for (slot, template) in terminal.operands.iter().enumerate() {
        operands[slot] = match template {
            OperandTemplate::None => Operand::None,
            OperandTemplate::Gb | OperandTemplate::Gv | OperandTemplate::Vx => {
                let r = modrm_info.as_ref().ok_or(DecodeError::Invalid)?;
                let kind = if matches!(template, OperandTemplate::Vx) { RegisterKind::Xmm } else { RegisterKind::Gpr };
                Operand::Reg(Register::new(kind, r.modrm.reg | ((rex_r as u8) << 3)))
            }
            OperandTemplate::Eb | OperandTemplate::Ev | OperandTemplate::Wx => {
                let r = modrm_info.as_ref().ok_or(DecodeError::Invalid)?;
                if r.modrm.is_register_form() {
                    let kind = if matches!(template, OperandTemplate::Wx) { RegisterKind::Xmm } else { RegisterKind::Gpr };
                    Operand::Reg(Register::new(kind, r.modrm.rm | ((rex_b as u8) << 3)))
                } else {
                    let mem = modrm::memory_operand(r, address_size, rex_x, rex_b, explicit_segment)
                        .ok_or(DecodeError::Invalid)?;
                    if mem.rip_relative {
                        rip_relative_raw_disp = Some(r.displacement);
                    } else {
                        displacement = r.displacement;
                    }
                    Operand::Mem(mem)
                }
            }
            OperandTemplate::M => {
                let r = modrm_info.as_ref().ok_or(DecodeError::Invalid)?;
                let mem = modrm::memory_operand(r, address_size, rex_x, rex_b, explicit_segment)
                    .ok_or(DecodeError::Invalid)?;
                if mem.rip_relative {
                    rip_relative_raw_disp = Some(r.displacement);
                } else {
                    displacement = r.displacement;
                }
                Operand::Mem(mem)
            }
            OperandTemplate::Ib | OperandTemplate::Iw | OperandTemplate::Iz => {
                let kind = terminal.imms[imm_slot].ok_or(DecodeError::Invalid)?;
                imm_slot += 1;
                let width = match kind {
                    ImmKind::Byte => 1,
                    ImmKind::Word => 2,
                    ImmKind::Z => {
                        if effective_operand_width_is_16(mode, &prefix_state, terminal) {
                            2
                        } else {
                            4
                        }
                    }
                };
                let v = read_imm(buf, &mut pos, width)?;
                imm_value = sign_extend_width(v, width);
                Operand::Imm
            }
            OperandTemplate::Jb => {
                let v = read_imm(buf, &mut pos, 1)?;
                pcrel = Some((slot, v as i8 as i64));
                Operand::None // patched below once `length` is known
            }
            OperandTemplate::Jz => {
                let width = if effective_operand_width_is_16(mode, &prefix_state, terminal) { 2 } else { 4 };
                let v = read_imm(buf, &mut pos, width)?;
                pcrel = Some((slot, sign_extend_width(v, width)));
                Operand::None
            }
            OperandTemplate::AlReg => Operand::Reg(Register::new(RegisterKind::Gpr, 0)),
            OperandTemplate::ClReg => Operand::Reg(Register::new(RegisterKind::Gpr, 1)),
            OperandTemplate::DxReg => Operand::Reg(Register::new(RegisterKind::Gpr, 2)),
            OperandTemplate::EaxReg => Operand::Reg(Register::new(RegisterKind::Gpr, 0)),
            OperandTemplate::Sw => {
                let r = modrm_info.as_ref().ok_or(DecodeError::Invalid)?;
                Operand::Reg(Register::new(RegisterKind::Seg, r.modrm.reg))
            }
            OperandTemplate::Cd => {
                let r = modrm_info.as_ref().ok_or(DecodeError::Invalid)?;
                Operand::Reg(Register::new(RegisterKind::Cr, r.modrm.reg | ((rex_r as u8) << 3)))
            }
            OperandTemplate::Dd => {
                let r = modrm_info.as_ref().ok_or(DecodeError::Invalid)?;
                Operand::Reg(Register::new(RegisterKind::Dr, r.modrm.reg | ((rex_r as u8) << 3)))
            }
            OperandTemplate::Ob | OperandTemplate::Ov => {
                let width = address_size as usize;
                let v = read_imm(buf, &mut pos, width)?;
                displacement = v;
                Operand::Mem(MemoryOperand {
                    base: None,
                    index: None,
                    scale: 1,
                    has_displacement: true,
                    rip_relative: false,
                    segment: explicit_segment.unwrap_or(SegmentOverride::Ds),
                })
            }
            OperandTemplate::Zb | OperandTemplate::Zv => {
                Operand::Reg(Register::new(RegisterKind::Gpr, reg_in_opcode_value))
            }
        };
    }

    if prefix_state.lock && !operands.iter().any(|o| matches!(o, Operand::Mem(_))) {
        return Err(DecodeError::Invalid);
    }

    let length = pos;
    if length > MAX_INSTRUCTION_LENGTH {
        return Err(DecodeError::TooLong);
    }
    if length > len {
        return Err(DecodeError::ShortBuffer);
    }

    if let Some((slot, rel)) = pcrel {
        let target = (address.wrapping_add(length as u64)).wrapping_add(rel as u64);
        operands[slot] = Operand::Pcrel(target);
    }
    if let Some(raw) = rip_relative_raw_disp {
        displacement = (address.wrapping_add(length as u64)).wrapping_add(raw as u64) as i64;
    }

    let operand_size = compute_operand_size(terminal, mode, &prefix_state);

    let mut instr = Instruction::empty(terminal.mnemonic);
    instr.length = length as u8;
    instr.address = address;
    instr.operand_size = operand_size;
    instr.address_size = address_size;
    instr.prefix_flags = prefix_state.to_flags();
    instr.segment_override = segment;
    instr.operands = operands;
    instr.immediate = imm_value;
    instr.displacement = displacement;

    Ok((length, instr))
}

fn op_map_index(state: &PrefixState) -> usize {
    use crate::prefixes::OpMap;
    match state.op_map() {
        OpMap::One => 0,
        OpMap::Ext0F => 1,
        OpMap::Ext0F38 => 2,
        OpMap::Ext0F3A => 3,
    }
}

fn mandatory_prefix_slot(p: MandatoryPrefix) -> usize {
    match p {
        MandatoryPrefix::None => 0,
        MandatoryPrefix::P66 => 1,
        MandatoryPrefix::PF2 => 2,
        MandatoryPrefix::PF3 => 3,
    }
}

fn mode_allows(gate: ModeGate, mode: u32) -> bool {
    match gate {
        ModeGate::Any => true,
        ModeGate::Only32 => mode == 32,
        ModeGate::Only64 => mode == 64,
    }
}

fn compute_address_size(mode: u32, addr_override: bool) -> u8 {
    match (mode, addr_override) {
        (64, false) => 8,
        (64, true) => 4,
        (32, false) => 4,
        (32, true) => 2,
        _ => unreachable!("mode is validated to be 32 or 64 before this is called"),
    }
}

/// The explicit override to honor, if any: `FS`/`GS` always win; other
/// overrides are only honored for address computation in 32-bit mode (§4.1
/// phase 6), though they're still recorded in `prefix_flags` regardless.
fn resolve_segment(mode: u32, seg: Option<SegmentOverride>) -> Option<SegmentOverride> {
    match seg {
        Some(SegmentOverride::Fs) => Some(SegmentOverride::Fs),
        Some(SegmentOverride::Gs) => Some(SegmentOverride::Gs),
        Some(other) if mode == 32 => Some(other),
        _ => None,
    }
}

fn effective_operand_width_is_16(mode: u32, state: &PrefixState, terminal: &Terminal) -> bool {
    let _ = mode;
    !terminal.default64 && !state.rex_w() && state.operand_size_override
}

fn compute_operand_size(terminal: &Terminal, mode: u32, state: &PrefixState) -> u8 {
    if terminal.osz_zero {
        return 0;
    }
    let is_vector = terminal.operands.iter().any(|t| matches!(t, OperandTemplate::Vx | OperandTemplate::Wx));
    if is_vector {
        let l256 = state.vex.map(|v| v.l256).unwrap_or(false);
        return if l256 { 32 } else { 16 };
    }
    let is_segment_or_control = terminal
        .operands
        .iter()
        .any(|t| matches!(t, OperandTemplate::Sw | OperandTemplate::Cd | OperandTemplate::Dd));
    if is_segment_or_control {
        return 0;
    }
    let is_byte = terminal.operands.iter().any(|t| {
        matches!(
            t,
            OperandTemplate::Gb | OperandTemplate::Eb | OperandTemplate::AlReg | OperandTemplate::ClReg | OperandTemplate::Zb | OperandTemplate::Ob
        )
    });
    if is_byte {
        return 1;
    }
    if terminal.default64 && mode == 64 {
        return 8;
    }
    if state.rex_w() {
        return 8;
    }
    if state.operand_size_override {
        return 2;
    }
    4
}

fn read_imm(buf: &[u8], pos: &mut usize, width: usize) -> Result<i64, DecodeError> {
    let bytes = buf.get(*pos..*pos + width).ok_or(DecodeError::ShortBuffer)?;
    *pos += width;
    let mut raw: u64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        raw |= (*b as u64) << (8 * i);
    }
    Ok(raw as i64)
}

fn sign_extend_width(raw: i64, width: usize) -> i64 {
    match width {
        1 => raw as u8 as i8 as i64,
        2 => raw as u16 as i16 as i64,
        4 => raw as u32 as i32 as i64,
        8 => raw,
        _ => unreachable!("immediate width is 1, 2, 4, or 8"),
    }
}
