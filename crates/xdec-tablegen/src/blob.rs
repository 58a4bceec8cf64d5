//! Binary serialization of a [`Graph`] into the single data blob the
//! `generator` CLI writes (§4.2 "Output", §6.6). This is the
//! external-tool-facing artifact; `xdec-decoder`'s build script instead
//! asks [`crate::codegen`] for a typed Rust source rendering of the same
//! graph, but both are built from identical [`Graph`] data so the two
//! views never drift apart.

use crate::graph::{Graph, Node, NodeIdx, Terminal, TermIdx, VexWNode};
use crate::record::{ImmKind, ModeGate, OperandTemplate};

const MAGIC: u32 = 0x3143_4458; // "XDC1" as a little-endian u32
const VERSION: u32 = 1;

pub fn write_blob(graph: &Graph) -> Vec<u8> {
    let mut out = Vec::new();
    push_u32(&mut out, MAGIC);
    push_u32(&mut out, VERSION);
    push_u32(&mut out, graph.nodes.len() as u32);
    push_u32(&mut out, graph.terminals.len() as u32);
    push_u32(&mut out, graph.mnemonic_ids.len() as u32);

    for root in &graph.roots {
        for &slot in root {
            push_u16(&mut out, slot);
        }
    }

    for node in &graph.nodes {
        write_node(&mut out, node);
    }
    for term in &graph.terminals {
        write_terminal(&mut out, term);
    }
    push_u32(&mut out, graph.mnemonic_ids.len() as u32);
    for name in &graph.mnemonic_ids {
        let bytes = name.as_bytes();
        push_u16(&mut out, bytes.len() as u16);
        out.extend_from_slice(bytes);
    }
    out
}

fn write_node(out: &mut Vec<u8>, node: &Node) {
    match node {
        Node::Empty => out.push(0),
        Node::Terminal(t) => {
            out.push(1);
            push_u16(out, *t);
        }
        Node::Prefix(slots) => {
            out.push(2);
            for s in slots {
                push_u16(out, *s);
            }
        }
        Node::Reg(slots) => {
            out.push(3);
            for s in slots {
                push_u16(out, *s);
            }
        }
        Node::ModSplit { reg_form, mem_form } => {
            out.push(4);
            push_u16(out, *reg_form);
            push_u16(out, *mem_form);
        }
        Node::FixedModrm { pairs, fallback } => {
            out.push(5);
            push_u16(out, *fallback);
            push_u16(out, pairs.len() as u16);
            for (byte, idx) in pairs {
                out.push(*byte);
                out.push(0);
                push_u16(out, *idx);
            }
        }
        Node::Vex { l128, l256 } => {
            out.push(6);
            write_vex_w(out, l128);
            write_vex_w(out, l256);
        }
        Node::RexW { w0, w1 } => {
            out.push(7);
            push_u16(out, *w0);
            push_u16(out, *w1);
        }
    }
}

fn write_vex_w(out: &mut Vec<u8>, node: &VexWNode) {
    push_u16(out, node.w0);
    push_u16(out, node.w1);
    push_u16(out, node.wig);
}

fn write_terminal(out: &mut Vec<u8>, t: &Terminal) {
    push_u16(out, t.mnemonic);
    out.push(t.needs_modrm as u8);
    for o in t.operands {
        out.push(operand_tag(o));
    }
    for imm in t.imms {
        out.push(match imm {
            None => 0xFF,
            Some(ImmKind::Byte) => 0,
            Some(ImmKind::Word) => 1,
            Some(ImmKind::Z) => 2,
        });
    }
    out.push(match t.mode_gate {
        ModeGate::Any => 0,
        ModeGate::Only32 => 1,
        ModeGate::Only64 => 2,
    });
    out.push(match t.rex_w {
        None => 0,
        Some(false) => 1,
        Some(true) => 2,
    });
    out.push(t.vex_present as u8);
    out.push(t.reg_in_opcode as u8);
    out.push(t.lockable as u8);
    out.push(t.default64 as u8);
    out.push(t.osz_zero as u8);
}

fn operand_tag(o: OperandTemplate) -> u8 {
    use OperandTemplate::*;
    match o {
        None => 0,
        Gb => 1,
        Gv => 2,
        Eb => 3,
        Ev => 4,
        M => 5,
        Ib => 6,
        Iw => 7,
        Iz => 8,
        Jb => 9,
        Jz => 10,
        AlReg => 11,
        ClReg => 12,
        DxReg => 13,
        EaxReg => 14,
        Sw => 15,
        Cd => 16,
        Dd => 17,
        Ob => 18,
        Ov => 19,
        Vx => 20,
        Wx => 21,
        Zb => 22,
        Zv => 23,
    }
}

fn operand_from_tag(tag: u8) -> Option<OperandTemplate> {
    use OperandTemplate::*;
    Some(match tag {
        0 => None,
        1 => Gb,
        2 => Gv,
        3 => Eb,
        4 => Ev,
        5 => M,
        6 => Ib,
        7 => Iw,
        8 => Iz,
        9 => Jb,
        10 => Jz,
        11 => AlReg,
        12 => ClReg,
        13 => DxReg,
        14 => EaxReg,
        15 => Sw,
        16 => Cd,
        17 => Dd,
        18 => Ob,
        19 => Ov,
        20 => Vx,
        21 => Wx,
        22 => Zb,
        23 => Zv,
        _ => return Option::None,
    })
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}
fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Reads back a blob written by [`write_blob`]. Used by the generator's own
/// tests to check the round trip; the decoder never calls this (it consumes
/// generated Rust source instead, see [`crate::codegen`]).
pub struct ReadError(pub &'static str);

pub fn read_blob(bytes: &[u8]) -> Result<Graph, ReadError> {
    let mut r = Reader { bytes, pos: 0 };
    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(ReadError("bad magic"));
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(ReadError("unsupported version"));
    }
    let node_count = r.u32()? as usize;
    let terminal_count = r.u32()? as usize;
    let _mnemonic_count_hint = r.u32()?;

    let mut roots = [[0u16; 256]; 4];
    for root in &mut roots {
        for slot in root.iter_mut() {
            *slot = r.u16()?;
        }
    }

    let mut nodes = Vec::with_capacity(node_count);
    for _ in 0..node_count {
        nodes.push(read_node(&mut r)?);
    }
    let mut terminals = Vec::with_capacity(terminal_count);
    for _ in 0..terminal_count {
        terminals.push(read_terminal(&mut r)?);
    }
    let mnemonic_count = r.u32()? as usize;
    let mut mnemonic_ids = Vec::with_capacity(mnemonic_count);
    for _ in 0..mnemonic_count {
        let len = r.u16()? as usize;
        let bytes = r.take(len)?;
        mnemonic_ids.push(String::from_utf8_lossy(bytes).into_owned());
    }

    Ok(Graph { roots, nodes, terminals, mnemonic_ids })
}

fn read_node(r: &mut Reader) -> Result<Node, ReadError> {
    let tag = r.u8()?;
    Ok(match tag {
        0 => Node::Empty,
        1 => Node::Terminal(r.u16()? as TermIdx),
        2 => {
            let mut slots = [0u16; 4];
            for s in &mut slots {
                *s = r.u16()?;
            }
            Node::Prefix(slots)
        }
        3 => {
            let mut slots = [0u16; 8];
            for s in &mut slots {
                *s = r.u16()?;
            }
            Node::Reg(slots)
        }
        4 => Node::ModSplit { reg_form: r.u16()?, mem_form: r.u16()? },
        5 => {
            let fallback = r.u16()?;
            let count = r.u16()? as usize;
            let mut pairs = Vec::with_capacity(count);
            for _ in 0..count {
                let byte = r.u8()?;
                let _pad = r.u8()?;
                let idx = r.u16()?;
                pairs.push((byte, idx as NodeIdx));
            }
            Node::FixedModrm { pairs, fallback }
        }
        6 => {
            let l128 = read_vex_w(r)?;
            let l256 = read_vex_w(r)?;
            Node::Vex { l128, l256 }
        }
        7 => Node::RexW { w0: r.u16()?, w1: r.u16()? },
        _ => return Err(ReadError("bad node tag")),
    })
}

fn read_vex_w(r: &mut Reader) -> Result<VexWNode, ReadError> {
    Ok(VexWNode { w0: r.u16()?, w1: r.u16()?, wig: r.u16()? })
}

fn read_terminal(r: &mut Reader) -> Result<Terminal, ReadError> {
    let mnemonic = r.u16()?;
    let needs_modrm = r.u8()? != 0;
    let mut operands = [OperandTemplate::None; 4];
    for o in &mut operands {
        *o = operand_from_tag(r.u8()?).ok_or(ReadError("bad operand tag"))?;
    }
    let mut imms = [None, None];
    for imm in &mut imms {
        *imm = match r.u8()? {
            0xFF => None,
            0 => Some(ImmKind::Byte),
            1 => Some(ImmKind::Word),
            2 => Some(ImmKind::Z),
            _ => return Err(ReadError("bad imm tag")),
        };
    }
    let mode_gate = match r.u8()? {
        0 => ModeGate::Any,
        1 => ModeGate::Only32,
        2 => ModeGate::Only64,
        _ => return Err(ReadError("bad mode gate")),
    };
    let rex_w = match r.u8()? {
        0 => None,
        1 => Some(false),
        2 => Some(true),
        _ => return Err(ReadError("bad rex.w tag")),
    };
    let vex_present = r.u8()? != 0;
    let reg_in_opcode = r.u8()? != 0;
    let lockable = r.u8()? != 0;
    let default64 = r.u8()? != 0;
    let osz_zero = r.u8()? != 0;
    Ok(Terminal {
        mnemonic,
        needs_modrm,
        operands,
        imms,
        mode_gate,
        rex_w,
        vex_present,
        reg_in_opcode,
        lockable,
        default64,
        osz_zero,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], ReadError> {
        if self.pos + n > self.bytes.len() {
            return Err(ReadError("truncated blob"));
        }
        let s = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }
    fn u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.take(1)?[0])
    }
    fn u16(&mut self) -> Result<u16, ReadError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
    fn u32(&mut self) -> Result<u32, ReadError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}
