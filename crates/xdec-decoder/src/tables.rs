//! The dispatch-table shape the generated tables are built from (§3.3,
//! §4.2). Kept as a small fixed set of node kinds rather than a generic
//! trie node, mirroring the fixed discriminator order §4.1 phase 3 already
//! specifies: the generator decides which levels a given opcode group
//! actually needs, but never invents a new kind of level.

use xdec_types::{ImmKind, ModeGate, Mnemonic, OperandTemplate};

/// Index into the generated `NODES` array; `0` is reserved for "absent"
/// and decodes to `INVALID`.
pub type NodeIdx = u16;
/// Index into [`TERMINALS`].
pub type TermIdx = u16;

pub const NODE_EMPTY: NodeIdx = 0;

#[derive(Debug, Clone, Copy)]
pub enum Node {
    Empty,
    Terminal(TermIdx),
    /// Keyed by mandatory prefix: `[none, 66, F2, F3]`.
    Prefix([NodeIdx; 4]),
    /// Keyed by ModR/M reg field, 0..7.
    Reg([NodeIdx; 8]),
    /// Keyed by `mod == 3` (reg form) vs `mod != 3` (memory form).
    ModSplit { reg_form: NodeIdx, mem_form: NodeIdx },
    /// Keyed by REX.W.
    RexW { w0: NodeIdx, w1: NodeIdx },
    /// Keyed by an exact ModR/M byte match; `fallback` is tried when no
    /// pair matches (`NODE_EMPTY` if unmatched bytes should be `INVALID`).
    FixedModrm { pairs: &'static [(u8, NodeIdx)], fallback: NodeIdx },
    /// Keyed by VEX.L then VEX.W.
    Vex { l128: VexWNode, l256: VexWNode },
}

#[derive(Debug, Clone, Copy)]
pub struct VexWNode {
    pub w0: NodeIdx,
    pub w1: NodeIdx,
    /// Used when the encoding doesn't pin W (`WIG`); checked when the
    /// specific W0/W1 slot is empty.
    pub wig: NodeIdx,
}

impl VexWNode {
    pub fn resolve(&self, w: bool) -> NodeIdx {
        let pinned = if w { self.w1 } else { self.w0 };
        if pinned != NODE_EMPTY {
            pinned
        } else {
            self.wig
        }
    }
}

/// One fully-resolved dispatch-table leaf: everything the decoder needs to
/// fill in an `Instruction` once it has read the bytes this terminal says
/// to read.
#[derive(Debug, Clone, Copy)]
pub struct Terminal {
    pub mnemonic: Mnemonic,
    pub needs_modrm: bool,
    pub operands: [OperandTemplate; 4],
    pub imms: [Option<ImmKind>; 2],
    pub mode_gate: ModeGate,
    /// `Some(w)` if this terminal only exists for one setting of REX.W.
    pub rex_w: Option<bool>,
    pub vex_present: bool,
    /// The register is encoded in the low 3 bits of the opcode byte
    /// (`+r` spans), not read from ModR/M.
    pub reg_in_opcode: bool,
    pub lockable: bool,
    /// Operand size defaults to 64 bits in 64-bit mode regardless of
    /// REX.W (near `CALL`/`JMP`/`PUSH`/`POP`/`RET`).
    pub default64: bool,
    /// Report `operand_size = 0` unconditionally (§6.5).
    pub osz_zero: bool,
}

include!(concat!(env!("OUT_DIR"), "/tables_generated.rs"));

/// Looks up the root-table slot for `map` (0 = one-byte, 1 = `0F`, 2 =
/// `0F38`, 3 = `0F3A`) and `opcode`.
pub fn root_slot(map: usize, opcode: u8) -> NodeIdx {
    match map {
        0 => ONE_BYTE_ROOT[opcode as usize],
        1 => EXT_0F_ROOT[opcode as usize],
        2 => EXT_0F38_ROOT[opcode as usize],
        3 => EXT_0F3A_ROOT[opcode as usize],
        _ => NODE_EMPTY,
    }
}

pub fn node(idx: NodeIdx) -> &'static Node {
    &NODES[idx as usize]
}

pub fn terminal(idx: TermIdx) -> &'static Terminal {
    &TERMINALS[idx as usize]
}
