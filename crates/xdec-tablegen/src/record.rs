//! Parses one line of the instruction-description file (§4.2) into one or
//! more resolved [`EncodingRecord`]s.
//!
//! A line names a single opcode-bytes pattern, but `+r` and `+cc` spans each
//! expand into several concrete records before the trie is built — see
//! [`parse_line`].

use crate::error::GeneratorError;

/// Which opcode map a record lives in, selected by escape bytes (§3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpMap {
    One,
    Ext0F,
    Ext0F38,
    Ext0F3A,
}

impl OpMap {
    pub fn all() -> [OpMap; 4] {
        [OpMap::One, OpMap::Ext0F, OpMap::Ext0F38, OpMap::Ext0F3A]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OpMap::One => "one",
            OpMap::Ext0F => "0f",
            OpMap::Ext0F38 => "0f38",
            OpMap::Ext0F3A => "0f3a",
        }
    }
}

/// Mandatory-prefix / VEX.pp selector (§3.3, §4.1 phase 3 discriminator 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MandatoryPrefix {
    /// This opcode has no prefix-selected variants; `66`/`F2`/`F3` if
    /// present act as ordinary size/rep prefixes, not discriminators.
    Insensitive,
    /// Explicitly requires the *absence* of `66`/`F2`/`F3` (used only for
    /// opcodes that otherwise have prefix-selected siblings).
    None,
    P66,
    PF2,
    PF3,
}

/// A ModR/M `reg`-field disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegField {
    /// No ModR/M at all.
    NoModrm,
    /// `/r`: the reg field selects a register operand.
    Operand,
    /// `/0`..`/7`: the reg field is an opcode extension.
    Extension(u8),
}

/// VEX.L / VEX.W gate, when the record is VEX-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VexSpec {
    pub l256: bool,
    pub w: Option<bool>,
}

/// Mode gate (§4.1 discriminator 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeGate {
    Any,
    Only32,
    Only64,
}

/// One resolved operand slot, drawn from the fixed vocabulary (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandTemplate {
    None,
    /// ModR/M reg field, byte-sized GPR.
    Gb,
    /// ModR/M reg field, operand-size GPR.
    Gv,
    /// ModR/M r/m field, byte-sized GPR or memory.
    Eb,
    /// ModR/M r/m field, operand-size GPR or memory.
    Ev,
    /// ModR/M r/m field, memory only (no register form exists for this encoding).
    M,
    /// 8-bit immediate.
    Ib,
    /// 16-bit immediate (fixed).
    Iw,
    /// Immediate sized 16 (if 16-bit operand size) or 32 otherwise.
    Iz,
    /// 8-bit relative displacement, PC-relative operand.
    Jb,
    /// `z`-sized relative displacement, PC-relative operand.
    Jz,
    /// Implicit `AL`.
    AlReg,
    /// Implicit `CL`.
    ClReg,
    /// Implicit `DX`.
    DxReg,
    /// Implicit accumulator, sized by operand size.
    EaxReg,
    /// ModR/M reg field, segment register.
    Sw,
    /// ModR/M reg field, control register.
    Cd,
    /// ModR/M reg field, debug register.
    Dd,
    /// `moffs`, byte-sized.
    Ob,
    /// `moffs`, operand-size.
    Ov,
    /// ModR/M reg field, XMM register.
    Vx,
    /// ModR/M r/m field, XMM register or memory.
    Wx,
    /// Register encoded in the low 3 bits of the opcode byte, byte-sized.
    Zb,
    /// Register encoded in the low 3 bits of the opcode byte, operand-size.
    Zv,
}

impl OperandTemplate {
    pub fn parse(tok: &str) -> Option<Self> {
        use OperandTemplate::*;
        Some(match tok {
            "NONE" => None_,
            "Gb" => Gb,
            "Gv" => Gv,
            "Eb" => Eb,
            "Ev" => Ev,
            "M" => M,
            "Ib" => Ib,
            "Iw" => Iw,
            "Iz" => Iz,
            "Jb" => Jb,
            "Jz" => Jz,
            "AL" => AlReg,
            "CL" => ClReg,
            "DX" => DxReg,
            "eAX" => EaxReg,
            "Sw" => Sw,
            "Cd" => Cd,
            "Dd" => Dd,
            "Ob" => Ob,
            "Ov" => Ov,
            "Vx" => Vx,
            "Wx" => Wx,
            "Zb" => Zb,
            "Zv" => Zv,
            _ => return Option::None,
        })
    }

    /// True for templates whose value comes from the ModR/M r/m field
    /// (register-or-memory).
    pub fn is_rm(self) -> bool {
        matches!(self, OperandTemplate::Eb | OperandTemplate::Ev | OperandTemplate::M | OperandTemplate::Wx)
    }

    /// True for templates whose value comes from the ModR/M reg field.
    pub fn is_reg_field(self) -> bool {
        matches!(
            self,
            OperandTemplate::Gb
                | OperandTemplate::Gv
                | OperandTemplate::Sw
                | OperandTemplate::Cd
                | OperandTemplate::Dd
                | OperandTemplate::Vx
        )
    }
}

// Note: `None_` above is spelled `None` in the data file; we alias it here
// because `None` collides with `Option::None` inside this enum's own scope.
#[allow(non_upper_case_globals)]
const None_: OperandTemplate = OperandTemplate::None;

/// A resolved declared immediate (§4.1 phase 5: 0/1/2/4/8 bytes, possibly
/// two of them for `ENTER`/`EXTRQ`-shaped encodings).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmKind {
    /// Fixed 1-byte immediate.
    Byte,
    /// Fixed 2-byte immediate.
    Word,
    /// `z`-sized: 2 bytes under a 16-bit operand size, else 4.
    Z,
}

/// Flags column (§4.2) — properties that aren't part of the dispatch key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFlags {
    /// `LOCK` may prefix this encoding without it being `INVALID`.
    pub lockable: bool,
    /// Operand size defaults to 64 bits in 64-bit mode regardless of REX.W
    /// (near `CALL`/`JMP`/`PUSH`/`POP`/`RET`).
    pub default64: bool,
    /// Report `operand_size = 0` per §6.5, regardless of computed size.
    pub osz_zero: bool,
    /// Two declared immediates (`ENTER`); `imms` carries both in order.
    pub two_imm: bool,
}

/// One fully-resolved encoding, ready to be inserted into the dispatch
/// trie. Produced by expanding `+r`/`+cc` spans in [`parse_line`].
#[derive(Debug, Clone)]
pub struct EncodingRecord {
    pub source_line: usize,
    pub map: OpMap,
    /// The literal opcode byte this record is keyed on within its map.
    pub opcode: u8,
    pub mandatory_prefix: MandatoryPrefix,
    pub vex: Option<VexSpec>,
    pub rex_w: Option<bool>,
    pub mode_gate: ModeGate,
    pub reg_field: RegField,
    /// Exact ModR/M byte match (mod==3 fixed forms like `FNINIT`/`LFENCE`).
    pub fixed_modrm: Option<u8>,
    /// The register for this opcode is encoded in its low 3 bits
    /// (`+r` spans); mutually exclusive with `reg_field`.
    pub reg_in_opcode: bool,
    pub mnemonic: String,
    pub operands: [OperandTemplate; 4],
    pub imms: Vec<ImmKind>,
    pub flags: RecordFlags,
}

const CONDITION_CODES: [&str; 16] = [
    "O", "NO", "B", "AE", "E", "NE", "BE", "A", "S", "NS", "P", "NP", "L", "GE", "LE", "G",
];

/// Parses one non-blank, non-comment line into its resolved records.
pub fn parse_line(line_no: usize, raw: &str) -> Result<Vec<EncodingRecord>, GeneratorError> {
    let cols: Vec<&str> = raw.split_whitespace().collect();
    if cols.len() != 4 {
        return Err(GeneratorError::MalformedLine {
            line: line_no,
            found: cols.len(),
            text: raw.to_string(),
        });
    }
    let (opcode_spec, mnemonic, operands_col, flags_col) = (cols[0], cols[1], cols[2], cols[3]);

    if !is_valid_identifier(mnemonic) && !mnemonic.contains("{cc}") {
        return Err(GeneratorError::BadMnemonic {
            line: line_no,
            mnemonic: mnemonic.to_string(),
        });
    }

    let operands = parse_operands(line_no, operands_col)?;
    let flags = parse_flags(line_no, flags_col)?;
    let spec = parse_opcode_spec(line_no, opcode_spec)?;

    let imms = declared_imms(&operands);

    if spec.cc_span {
        let mut out = Vec::with_capacity(16);
        for (i, cc) in CONDITION_CODES.iter().enumerate() {
            let opcode = spec.base.wrapping_add(i as u8);
            let name = mnemonic.replace("{cc}", cc);
            if !is_valid_identifier(&name) {
                return Err(GeneratorError::BadMnemonic { line: line_no, mnemonic: name });
            }
            out.push(EncodingRecord {
                source_line: line_no,
                map: spec.map,
                opcode,
                mandatory_prefix: spec.mandatory_prefix,
                vex: spec.vex,
                rex_w: spec.rex_w,
                mode_gate: spec.mode_gate,
                reg_field: spec.reg_field,
                fixed_modrm: spec.fixed_modrm,
                reg_in_opcode: false,
                mnemonic: name,
                operands,
                imms: imms.clone(),
                flags,
            });
        }
        Ok(out)
    } else if spec.reg_span {
        // A single terminal occupies every byte slot in [base, base|7]; the
        // register index at decode time is (opcode_byte & 7) | (REX.B << 3).
        Ok(vec![EncodingRecord {
            source_line: line_no,
            map: spec.map,
            opcode: spec.base,
            mandatory_prefix: spec.mandatory_prefix,
            vex: spec.vex,
            rex_w: spec.rex_w,
            mode_gate: spec.mode_gate,
            reg_field: RegField::NoModrm,
            fixed_modrm: None,
            reg_in_opcode: true,
            mnemonic: mnemonic.to_string(),
            operands,
            imms,
            flags,
        }])
    } else {
        Ok(vec![EncodingRecord {
            source_line: line_no,
            map: spec.map,
            opcode: spec.base,
            mandatory_prefix: spec.mandatory_prefix,
            vex: spec.vex,
            rex_w: spec.rex_w,
            mode_gate: spec.mode_gate,
            reg_field: spec.reg_field,
            fixed_modrm: spec.fixed_modrm,
            reg_in_opcode: false,
            mnemonic: mnemonic.to_string(),
            operands,
            imms,
            flags,
        }])
    }
}

fn declared_imms(operands: &[OperandTemplate; 4]) -> Vec<ImmKind> {
    operands
        .iter()
        .filter_map(|o| match o {
            OperandTemplate::Ib => Some(ImmKind::Byte),
            OperandTemplate::Iw => Some(ImmKind::Word),
            OperandTemplate::Iz => Some(ImmKind::Z),
            _ => None,
        })
        .collect()
}

fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn parse_operands(line_no: usize, col: &str) -> Result<[OperandTemplate; 4], GeneratorError> {
    let mut out = [OperandTemplate::None; 4];
    if col == "-" {
        return Ok(out);
    }
    for (i, tok) in col.split(',').enumerate() {
        if i >= 4 {
            break;
        }
        out[i] = OperandTemplate::parse(tok).ok_or_else(|| GeneratorError::UnknownOperandTemplate {
            line: line_no,
            token: tok.to_string(),
        })?;
    }
    Ok(out)
}

fn parse_flags(line_no: usize, col: &str) -> Result<RecordFlags, GeneratorError> {
    let mut flags = RecordFlags::default();
    if col == "-" {
        return Ok(flags);
    }
    for tok in col.split(',') {
        match tok {
            "LOCK" => flags.lockable = true,
            "D64" => flags.default64 = true,
            "OSZ" => flags.osz_zero = true,
            "TWOIMM" => flags.two_imm = true,
            _ => {
                return Err(GeneratorError::UnknownFlag {
                    line: line_no,
                    token: tok.to_string(),
                })
            }
        }
    }
    Ok(flags)
}

struct OpcodeSpec {
    map: OpMap,
    mandatory_prefix: MandatoryPrefix,
    vex: Option<VexSpec>,
    rex_w: Option<bool>,
    mode_gate: ModeGate,
    reg_field: RegField,
    fixed_modrm: Option<u8>,
    base: u8,
    cc_span: bool,
    reg_span: bool,
}

fn parse_opcode_spec(line_no: usize, col: &str) -> Result<OpcodeSpec, GeneratorError> {
    let mut map = OpMap::One;
    let mut mandatory_prefix = MandatoryPrefix::Insensitive;
    let mut vex_l256: Option<bool> = None;
    let mut vex_w: Option<Option<bool>> = None;
    let mut rex_w = None;
    let mut mode_gate = ModeGate::Any;
    let mut reg_field = RegField::NoModrm;
    let mut fixed_modrm = None;
    let mut opcode_tok: Option<&str> = None;

    for tok in col.split('.') {
        match tok {
            "ONLY32" => mode_gate = ModeGate::Only32,
            "ONLY64" => mode_gate = ModeGate::Only64,
            "0F" => map = OpMap::Ext0F,
            "0F38" => map = OpMap::Ext0F38,
            "0F3A" => map = OpMap::Ext0F3A,
            "NP" => mandatory_prefix = MandatoryPrefix::None,
            "P66" => mandatory_prefix = MandatoryPrefix::P66,
            "PF2" => mandatory_prefix = MandatoryPrefix::PF2,
            "PF3" => mandatory_prefix = MandatoryPrefix::PF3,
            "VEX128" => vex_l256 = Some(false),
            "VEX256" => vex_l256 = Some(true),
            "W0" => {
                if vex_l256.is_some() || vex_w.is_some() {
                    vex_w = Some(Some(false));
                } else {
                    rex_w = Some(false);
                }
            }
            "W1" => {
                if vex_l256.is_some() || vex_w.is_some() {
                    vex_w = Some(Some(true));
                } else {
                    rex_w = Some(true);
                }
            }
            "WIG" => vex_w = Some(None),
            "r" => reg_field = RegField::Operand,
            "EXT0" => reg_field = RegField::Extension(0),
            "EXT1" => reg_field = RegField::Extension(1),
            "EXT2" => reg_field = RegField::Extension(2),
            "EXT3" => reg_field = RegField::Extension(3),
            "EXT4" => reg_field = RegField::Extension(4),
            "EXT5" => reg_field = RegField::Extension(5),
            "EXT6" => reg_field = RegField::Extension(6),
            "EXT7" => reg_field = RegField::Extension(7),
            t if t.len() == 4 && t.starts_with("FM") && t[2..].chars().all(|c| c.is_ascii_hexdigit()) => {
                fixed_modrm = Some(u8::from_str_radix(&t[2..], 16).unwrap());
            }
            t => {
                if opcode_tok.is_some() {
                    return Err(GeneratorError::OpcodeByteCount { line: line_no, found: 2 });
                }
                opcode_tok = Some(t);
            }
        }
    }

    let opcode_tok = opcode_tok.ok_or(GeneratorError::OpcodeByteCount { line: line_no, found: 0 })?;
    let (hex, suffix) = match opcode_tok.split_once('+') {
        Some((h, s)) => (h, Some(s)),
        None => (opcode_tok, None),
    };
    if hex.len() != 2 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(GeneratorError::BadOpcodeToken {
            line: line_no,
            token: opcode_tok.to_string(),
        });
    }
    let base = u8::from_str_radix(hex, 16).unwrap();
    let (cc_span, reg_span) = match suffix {
        None => (false, false),
        Some("cc") => (true, false),
        Some("r") => (false, true),
        Some(other) => {
            return Err(GeneratorError::BadOpcodeToken {
                line: line_no,
                token: format!("+{other}"),
            })
        }
    };
    if cc_span && base as usize + 15 > 0xFF {
        return Err(GeneratorError::SpanOverflow { line: line_no, base });
    }
    if reg_span && (base | 7) < base {
        return Err(GeneratorError::SpanOverflow { line: line_no, base });
    }

    let vex = vex_l256.map(|l256| VexSpec { l256, w: vex_w.flatten() });

    Ok(OpcodeSpec {
        map,
        mandatory_prefix,
        vex,
        rex_w,
        mode_gate,
        reg_field,
        fixed_modrm,
        base,
        cc_span,
        reg_span,
    })
}
