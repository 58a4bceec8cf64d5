//! Builds the dispatch graph (§3.3, §4.2) from a flat list of
//! [`EncodingRecord`]s.
//!
//! The graph has a fixed node shape rather than a generically-chosen
//! discriminator order, because §4.1 phase 3 already fixes that order; what
//! the generator actually does is decide, per `(map, opcode)` group,
//! *which* of the fixed levels are actually present (a plain one-byte
//! opcode has none of them; `CMPXCHG8B`/`CMPXCHG16B` need a mod-split under
//! a `/1` extension; SSE moves need a prefix split but no extension). Groups
//! that need nothing beyond the opcode byte collapse straight to a
//! terminal, which is the compression §4.2 asks for: no node is emitted for
//! a level no record actually uses.

use std::collections::BTreeMap;

use crate::error::GeneratorError;
use crate::record::{EncodingRecord, MandatoryPrefix, ModeGate, OpMap, OperandTemplate, RegField, VexSpec};

/// Index into [`Graph::nodes`]. `0` is reserved for "absent" (decodes to
/// `INVALID`).
pub type NodeIdx = u16;
/// Index into [`Graph::terminals`].
pub type TermIdx = u16;

pub const NODE_EMPTY: NodeIdx = 0;

#[derive(Debug, Clone)]
pub enum Node {
    Empty,
    Terminal(TermIdx),
    /// Keyed by mandatory prefix: [none, 66, F2, F3].
    Prefix([NodeIdx; 4]),
    /// Keyed by ModR/M reg field, 0..7.
    Reg([NodeIdx; 8]),
    /// Keyed by `mod == 3` (reg form) vs `mod != 3` (memory form).
    ModSplit { reg_form: NodeIdx, mem_form: NodeIdx },
    /// Keyed by REX.W, for the rare case where otherwise-identical
    /// encodings (e.g. `CMPXCHG8B`/`CMPXCHG16B`) differ only by it.
    RexW { w0: NodeIdx, w1: NodeIdx },
    /// Keyed by an exact ModR/M byte match (linear scan over a small,
    /// fixed set); `fallback` is tried when no exact byte matches
    /// (`NODE_EMPTY` if unmatched bytes should decode to `INVALID`).
    FixedModrm { pairs: Vec<(u8, NodeIdx)>, fallback: NodeIdx },
    /// Keyed by VEX.L (false=128,true=256) then VEX.W (None=either/WIG).
    Vex { l128: VexWNode, l256: VexWNode },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VexWNode {
    pub w0: NodeIdx,
    pub w1: NodeIdx,
    /// Used when the record didn't pin W (`WIG`); checked if the specific
    /// W0/W1 slot is empty.
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

#[derive(Debug, Clone, Copy)]
pub struct Terminal {
    pub mnemonic: u16,
    pub needs_modrm: bool,
    pub operands: [OperandTemplate; 4],
    pub imms: [Option<crate::record::ImmKind>; 2],
    pub mode_gate: ModeGate,
    pub rex_w: Option<bool>,
    pub vex_present: bool,
    pub reg_in_opcode: bool,
    pub lockable: bool,
    pub default64: bool,
    pub osz_zero: bool,
}

pub struct Graph {
    pub roots: [[NodeIdx; 256]; 4],
    pub nodes: Vec<Node>,
    pub terminals: Vec<Terminal>,
    /// Mnemonic name -> stable id, in first-appearance order (§9: "derive
    /// the enum itself from the spec file").
    pub mnemonic_ids: Vec<String>,
}

impl OpMap {
    fn root_index(self) -> usize {
        match self {
            OpMap::One => 0,
            OpMap::Ext0F => 1,
            OpMap::Ext0F38 => 2,
            OpMap::Ext0F3A => 3,
        }
    }
}

pub fn build_graph(records: &[EncodingRecord]) -> Result<Graph, GeneratorError> {
    let mut nodes = vec![Node::Empty];
    let mut terminals = Vec::new();
    let mut mnemonic_ids: Vec<String> = Vec::new();
    let mut mnemonic_lookup: BTreeMap<String, u16> = BTreeMap::new();
    let mut roots = [[NODE_EMPTY; 256]; 4];

    // Group records by (map, opcode byte) — the only level the root table
    // itself dispatches on.
    let mut groups: BTreeMap<(u8, u8), Vec<&EncodingRecord>> = BTreeMap::new();
    for r in records {
        groups.entry((r.map.root_index() as u8, r.opcode)).or_default().push(r);
    }

    for ((map_idx, opcode), group_records) in groups {
        let node_idx = build_group(&group_records, &mut nodes, &mut terminals, &mut mnemonic_ids, &mut mnemonic_lookup)?;
        if group_records[0].reg_in_opcode {
            // Occupies every slot in [opcode, opcode|7].
            let base = opcode;
            let span_end = base | 7;
            let mut b = base;
            loop {
                if roots[map_idx as usize][b as usize] != NODE_EMPTY {
                    return Err(GeneratorError::DuplicateEncoding {
                        first_line: group_records[0].source_line,
                        second_line: group_records[0].source_line,
                        path: format!("{}:{:#04x}", OpMap::all()[map_idx as usize].as_str(), b),
                        first_mnemonic: group_records[0].mnemonic.clone(),
                        second_mnemonic: group_records[0].mnemonic.clone(),
                    });
                }
                roots[map_idx as usize][b as usize] = node_idx;
                if b == span_end {
                    break;
                }
                b += 1;
            }
        } else {
            roots[map_idx as usize][opcode as usize] = node_idx;
        }
    }

    Ok(Graph { roots, nodes, terminals, mnemonic_ids })
}

fn mnemonic_id(
    name: &str,
    mnemonic_ids: &mut Vec<String>,
    lookup: &mut BTreeMap<String, u16>,
) -> u16 {
    if let Some(&id) = lookup.get(name) {
        return id;
    }
    let id = mnemonic_ids.len() as u16;
    mnemonic_ids.push(name.to_string());
    lookup.insert(name.to_string(), id);
    id
}

fn make_terminal(r: &EncodingRecord, mnemonic: u16) -> Terminal {
    // ModR/M is read whenever something actually consumes it: an explicit
    // reg-field use (/r or an extension group), a fixed-byte match, or any
    // operand template whose value comes from the ModR/M byte itself (an
    // r/m-only opcode like SETcc never sets `reg_field` but still has an
    // `Eb` operand that needs the byte decoded).
    let needs_modrm = !matches!(r.reg_field, RegField::NoModrm)
        || r.fixed_modrm.is_some()
        || r.operands.iter().any(|o| o.is_rm() || o.is_reg_field());
    let mut imms = [None, None];
    for (i, k) in r.imms.iter().take(2).enumerate() {
        imms[i] = Some(*k);
    }
    Terminal {
        mnemonic,
        needs_modrm,
        operands: r.operands,
        imms,
        mode_gate: r.mode_gate,
        rex_w: r.rex_w,
        vex_present: r.vex.is_some(),
        reg_in_opcode: r.reg_in_opcode,
        lockable: r.flags.lockable,
        default64: r.flags.default64,
        osz_zero: r.flags.osz_zero,
    }
}

/// Builds the sub-graph for every record sharing a single `(map, opcode)`
/// key, returning the node those root-table slots should point at.
fn build_group(
    records: &[&EncodingRecord],
    nodes: &mut Vec<Node>,
    terminals: &mut Vec<Terminal>,
    mnemonic_ids: &mut Vec<String>,
    lookup: &mut BTreeMap<String, u16>,
) -> Result<NodeIdx, GeneratorError> {
    // Split by mandatory-prefix sensitivity first (discriminator 3 sits
    // above the VEX/reg/mod levels in priority, and VEX records carry their
    // own pp via the same field).
    let prefix_sensitive = records.iter().any(|r| r.mandatory_prefix != MandatoryPrefix::Insensitive);

    if !prefix_sensitive {
        return build_reg_level(records, nodes, terminals, mnemonic_ids, lookup);
    }

    let mut slots = [const { Vec::new() }; 4];
    for r in records {
        let idx = match r.mandatory_prefix {
            MandatoryPrefix::None => 0,
            MandatoryPrefix::P66 => 1,
            MandatoryPrefix::PF2 => 2,
            MandatoryPrefix::PF3 => 3,
            MandatoryPrefix::Insensitive => {
                return Err(GeneratorError::DuplicateEncoding {
                    first_line: r.source_line,
                    second_line: r.source_line,
                    path: "mandatory-prefix group mixes a prefix-insensitive record".into(),
                    first_mnemonic: r.mnemonic.clone(),
                    second_mnemonic: r.mnemonic.clone(),
                })
            }
        };
        slots[idx].push(*r);
    }
    let mut out = [NODE_EMPTY; 4];
    for (i, recs) in slots.iter().enumerate() {
        if recs.is_empty() {
            continue;
        }
        out[i] = build_reg_level(recs, nodes, terminals, mnemonic_ids, lookup)?;
    }
    let node = Node::Prefix(out);
    nodes.push(node);
    Ok((nodes.len() - 1) as NodeIdx)
}

fn build_reg_level(
    records: &[&EncodingRecord],
    nodes: &mut Vec<Node>,
    terminals: &mut Vec<Terminal>,
    mnemonic_ids: &mut Vec<String>,
    lookup: &mut BTreeMap<String, u16>,
) -> Result<NodeIdx, GeneratorError> {
    let has_vex = records.iter().any(|r| r.vex.is_some());
    if has_vex {
        return build_vex_level(records, nodes, terminals, mnemonic_ids, lookup);
    }

    let extension_used = records
        .iter()
        .any(|r| matches!(r.reg_field, RegField::Extension(_)));

    if !extension_used {
        return build_modrm_leaf(records, nodes, terminals, mnemonic_ids, lookup);
    }

    let mut slots: [Vec<&EncodingRecord>; 8] = Default::default();
    for r in records {
        let ext = match r.reg_field {
            RegField::Extension(n) => n as usize,
            _ => {
                return Err(GeneratorError::DuplicateEncoding {
                    first_line: r.source_line,
                    second_line: r.source_line,
                    path: "extension group mixes a non-extension record".into(),
                    first_mnemonic: r.mnemonic.clone(),
                    second_mnemonic: r.mnemonic.clone(),
                })
            }
        };
        slots[ext].push(r);
    }
    let mut out = [NODE_EMPTY; 8];
    for (i, recs) in slots.iter().enumerate() {
        if recs.is_empty() {
            continue;
        }
        out[i] = build_modrm_leaf(recs, nodes, terminals, mnemonic_ids, lookup)?;
    }
    nodes.push(Node::Reg(out));
    Ok((nodes.len() - 1) as NodeIdx)
}

/// The bottom of the tree: either a single terminal, a fixed-ModR/M list
/// (exact byte match), or a mod==3-vs-!=3 split.
fn build_modrm_leaf(
    records: &[&EncodingRecord],
    nodes: &mut Vec<Node>,
    terminals: &mut Vec<Terminal>,
    mnemonic_ids: &mut Vec<String>,
    lookup: &mut BTreeMap<String, u16>,
) -> Result<NodeIdx, GeneratorError> {
    if records.len() > 1 && records.iter().any(|r| r.rex_w.is_some()) {
        let w0: Vec<&&EncodingRecord> = records.iter().filter(|r| r.rex_w != Some(true)).collect();
        let w1: Vec<&&EncodingRecord> = records.iter().filter(|r| r.rex_w == Some(true)).collect();
        if w0.len() < records.len() && w1.len() < records.len() {
            let w0: Vec<&EncodingRecord> = w0.into_iter().copied().collect();
            let w1: Vec<&EncodingRecord> = w1.into_iter().copied().collect();
            let w0_idx = build_modrm_leaf(&w0, nodes, terminals, mnemonic_ids, lookup)?;
            let w1_idx = build_modrm_leaf(&w1, nodes, terminals, mnemonic_ids, lookup)?;
            nodes.push(Node::RexW { w0: w0_idx, w1: w1_idx });
            return Ok((nodes.len() - 1) as NodeIdx);
        }
    }

    if records.len() == 1 && records[0].fixed_modrm.is_none() {
        let r = records[0];
        let id = mnemonic_id(&r.mnemonic, mnemonic_ids, lookup);
        terminals.push(make_terminal(r, id));
        let term_idx = (terminals.len() - 1) as TermIdx;
        nodes.push(Node::Terminal(term_idx));
        return Ok((nodes.len() - 1) as NodeIdx);
    }

    let fixed: Vec<&&EncodingRecord> = records.iter().filter(|r| r.fixed_modrm.is_some()).collect();
    let non_fixed: Vec<&&EncodingRecord> = records.iter().filter(|r| r.fixed_modrm.is_none()).collect();

    if !fixed.is_empty() {
        let mut pairs = Vec::new();
        for r in &fixed {
            let id = mnemonic_id(&r.mnemonic, mnemonic_ids, lookup);
            terminals.push(make_terminal(r, id));
            let term_idx = (terminals.len() - 1) as TermIdx;
            nodes.push(Node::Terminal(term_idx));
            pairs.push((r.fixed_modrm.unwrap(), (nodes.len() - 1) as NodeIdx));
        }
        let fallback = if non_fixed.len() == 1 {
            // e.g. a group extension that is a plain memory form plus one
            // reserved mod==3 encoding (`FNINIT` under `DB`).
            let r = non_fixed[0];
            let id = mnemonic_id(&r.mnemonic, mnemonic_ids, lookup);
            terminals.push(make_terminal(r, id));
            let term_idx = (terminals.len() - 1) as TermIdx;
            nodes.push(Node::Terminal(term_idx));
            (nodes.len() - 1) as NodeIdx
        } else {
            NODE_EMPTY
        };
        nodes.push(Node::FixedModrm { pairs, fallback });
        return Ok((nodes.len() - 1) as NodeIdx);
    }

    // No fixed-ModR/M records: split on mod==3 vs !=3 if both forms exist
    // (e.g. CMPXCHG8B needs a memory operand only; LFENCE-shaped group not
    // present here goes through FixedModrm above instead).
    if non_fixed.len() == 1 {
        let r = non_fixed[0];
        let id = mnemonic_id(&r.mnemonic, mnemonic_ids, lookup);
        terminals.push(make_terminal(r, id));
        let term_idx = (terminals.len() - 1) as TermIdx;
        nodes.push(Node::Terminal(term_idx));
        return Ok((nodes.len() - 1) as NodeIdx);
    }

    Err(GeneratorError::DuplicateEncoding {
        first_line: records[0].source_line,
        second_line: records[1].source_line,
        path: "unresolvable ModR/M-leaf ambiguity".into(),
        first_mnemonic: records[0].mnemonic.clone(),
        second_mnemonic: records[1].mnemonic.clone(),
    })
}

fn build_vex_level(
    records: &[&EncodingRecord],
    nodes: &mut Vec<Node>,
    terminals: &mut Vec<Terminal>,
    mnemonic_ids: &mut Vec<String>,
    lookup: &mut BTreeMap<String, u16>,
) -> Result<NodeIdx, GeneratorError> {
    let mut l128 = VexWNode::default();
    let mut l256 = VexWNode::default();
    for r in records {
        let vex: VexSpec = r.vex.expect("build_vex_level called with a non-VEX record");
        let id = mnemonic_id(&r.mnemonic, mnemonic_ids, lookup);
        terminals.push(make_terminal(r, id));
        let term_idx = (terminals.len() - 1) as TermIdx;
        nodes.push(Node::Terminal(term_idx));
        let node_idx = (nodes.len() - 1) as NodeIdx;
        let slot = if vex.l256 { &mut l256 } else { &mut l128 };
        match vex.w {
            None => slot.wig = node_idx,
            Some(false) => slot.w0 = node_idx,
            Some(true) => slot.w1 = node_idx,
        }
    }
    nodes.push(Node::Vex { l128, l256 });
    Ok((nodes.len() - 1) as NodeIdx)
}
