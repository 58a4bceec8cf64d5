//! Renders a [`Graph`] as Rust source, for the two build scripts that embed
//! generated tables directly in a crate rather than loading the blob at
//! runtime (`xdec-types` needs the `Mnemonic` enum; `xdec-decoder` needs the
//! dispatch tables themselves). Keeping both renderings here, next to
//! [`crate::blob`], means a single [`Graph`] is the one source of truth for
//! every consumer.

use std::fmt::Write as _;

use crate::graph::{Graph, Node};
use crate::record::{ImmKind, ModeGate, OperandTemplate};

/// Emits `pub enum Mnemonic { ... }` plus a `pub const MNEMONIC_COUNT` and a
/// `name()` method, in first-appearance order so the numeric id embedded in
/// generated tables always lines up with the variant (§9).
pub fn render_mnemonic_enum(graph: &Graph) -> String {
    let mut out = String::new();
    out.push_str("// @generated by xdec-tablegen. Do not edit by hand.\n\n");
    out.push_str("/// Every mnemonic the table generator saw in the instruction description.\n");
    out.push_str("#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]\n");
    out.push_str("#[repr(u16)]\n");
    out.push_str("#[non_exhaustive]\n");
    out.push_str("pub enum Mnemonic {\n");
    for name in &graph.mnemonic_ids {
        let _ = writeln!(out, "    {name},");
    }
    out.push_str("}\n\n");

    let _ = writeln!(out, "pub const MNEMONIC_COUNT: usize = {};", graph.mnemonic_ids.len());
    out.push('\n');

    out.push_str("impl Mnemonic {\n");
    out.push_str("    /// The mnemonic's spelling, exactly as it appeared in the instruction description.\n");
    out.push_str("    pub fn name(self) -> &'static str {\n");
    out.push_str("        match self {\n");
    for name in &graph.mnemonic_ids {
        let _ = writeln!(out, "            Mnemonic::{name} => \"{name}\",");
    }
    out.push_str("        }\n    }\n}\n\n");

    out.push_str("impl core::fmt::Display for Mnemonic {\n");
    out.push_str("    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {\n");
    out.push_str("        f.write_str(self.name())\n    }\n}\n");
    out
}

/// Emits the dispatch tables themselves: `ROOTS`, `NODES`, `TERMINALS`. This
/// is textually `include!`d into `xdec-decoder`'s `src/tables.rs`, which
/// already defines `Node`/`Terminal`/`VexWNode` in the same module, so only
/// the `xdec_types` item types need importing here; `Mnemonic` variants are
/// referenced by name rather than by numeric id, so a mismatch between this
/// and the `Mnemonic` enum fails to compile instead of misdecoding.
pub fn render_tables(graph: &Graph) -> String {
    let mut out = String::new();
    out.push_str("// @generated by xdec-tablegen. Do not edit by hand.\n\n");
    out.push_str("use xdec_types::{ImmKind, ModeGate, Mnemonic, OperandTemplate};\n\n");

    render_roots(&mut out, graph);
    render_nodes(&mut out, graph);
    render_terminals(&mut out, graph);
    out
}

fn render_roots(out: &mut String, graph: &Graph) {
    let names = ["ONE_BYTE_ROOT", "EXT_0F_ROOT", "EXT_0F38_ROOT", "EXT_0F3A_ROOT"];
    for (root, name) in graph.roots.iter().zip(names) {
        let _ = writeln!(out, "pub static {name}: [u16; 256] = [");
        out.push_str("    ");
        for (i, slot) in root.iter().enumerate() {
            let _ = write!(out, "{slot}, ");
            if i % 16 == 15 {
                out.push_str("\n    ");
            }
        }
        out.push_str("\n];\n\n");
    }
}

fn render_nodes(out: &mut String, graph: &Graph) {
    let _ = writeln!(out, "pub static NODES: [Node; {}] = [", graph.nodes.len());
    for node in &graph.nodes {
        let _ = writeln!(out, "    {},", render_node(node));
    }
    out.push_str("];\n\n");
}

fn render_node(node: &Node) -> String {
    match node {
        Node::Empty => "Node::Empty".to_string(),
        Node::Terminal(t) => format!("Node::Terminal({t})"),
        Node::Prefix(slots) => format!(
            "Node::Prefix([{}, {}, {}, {}])",
            slots[0], slots[1], slots[2], slots[3]
        ),
        Node::Reg(slots) => format!(
            "Node::Reg([{}, {}, {}, {}, {}, {}, {}, {}])",
            slots[0], slots[1], slots[2], slots[3], slots[4], slots[5], slots[6], slots[7]
        ),
        Node::ModSplit { reg_form, mem_form } => {
            format!("Node::ModSplit {{ reg_form: {reg_form}, mem_form: {mem_form} }}")
        }
        Node::RexW { w0, w1 } => format!("Node::RexW {{ w0: {w0}, w1: {w1} }}"),
        Node::FixedModrm { pairs, fallback } => {
            let pairs_src: Vec<String> = pairs.iter().map(|(b, i)| format!("({b:#04x}, {i})")).collect();
            format!(
                "Node::FixedModrm {{ pairs: &[{}], fallback: {fallback} }}",
                pairs_src.join(", ")
            )
        }
        Node::Vex { l128, l256 } => format!(
            "Node::Vex {{ l128: VexWNode {{ w0: {}, w1: {}, wig: {} }}, l256: VexWNode {{ w0: {}, w1: {}, wig: {} }} }}",
            l128.w0, l128.w1, l128.wig, l256.w0, l256.w1, l256.wig
        ),
    }
}

fn render_terminals(out: &mut String, graph: &Graph) {
    let _ = writeln!(out, "pub static TERMINALS: [Terminal; {}] = [", graph.terminals.len());
    for t in &graph.terminals {
        let operands: Vec<String> = t.operands.iter().map(|o| render_operand(*o)).collect();
        let imms: Vec<String> = t.imms.iter().map(|i| render_imm(*i)).collect();
        let mode_gate = match t.mode_gate {
            ModeGate::Any => "ModeGate::Any",
            ModeGate::Only32 => "ModeGate::Only32",
            ModeGate::Only64 => "ModeGate::Only64",
        };
        let rex_w = match t.rex_w {
            None => "None".to_string(),
            Some(b) => format!("Some({b})"),
        };
        let mnemonic = &graph.mnemonic_ids[t.mnemonic as usize];
        let _ = writeln!(
            out,
            "    Terminal {{ mnemonic: Mnemonic::{mnemonic}, needs_modrm: {}, operands: [{}], imms: [{}], \
             mode_gate: {mode_gate}, rex_w: {rex_w}, vex_present: {}, reg_in_opcode: {}, lockable: {}, \
             default64: {}, osz_zero: {} }},",
            t.needs_modrm,
            operands.join(", "),
            imms.join(", "),
            t.vex_present,
            t.reg_in_opcode,
            t.lockable,
            t.default64,
            t.osz_zero,
        );
    }
    out.push_str("];\n");
}

fn render_operand(o: OperandTemplate) -> &'static str {
    use OperandTemplate::*;
    match o {
        None => "OperandTemplate::None",
        Gb => "OperandTemplate::Gb",
        Gv => "OperandTemplate::Gv",
        Eb => "OperandTemplate::Eb",
        Ev => "OperandTemplate::Ev",
        M => "OperandTemplate::M",
        Ib => "OperandTemplate::Ib",
        Iw => "OperandTemplate::Iw",
        Iz => "OperandTemplate::Iz",
        Jb => "OperandTemplate::Jb",
        Jz => "OperandTemplate::Jz",
        AlReg => "OperandTemplate::AlReg",
        ClReg => "OperandTemplate::ClReg",
        DxReg => "OperandTemplate::DxReg",
        EaxReg => "OperandTemplate::EaxReg",
        Sw => "OperandTemplate::Sw",
        Cd => "OperandTemplate::Cd",
        Dd => "OperandTemplate::Dd",
        Ob => "OperandTemplate::Ob",
        Ov => "OperandTemplate::Ov",
        Vx => "OperandTemplate::Vx",
        Wx => "OperandTemplate::Wx",
        Zb => "OperandTemplate::Zb",
        Zv => "OperandTemplate::Zv",
    }
}

fn render_imm(i: Option<ImmKind>) -> String {
    match i {
        None => "None".to_string(),
        Some(ImmKind::Byte) => "Some(ImmKind::Byte)".to_string(),
        Some(ImmKind::Word) => "Some(ImmKind::Word)".to_string(),
        Some(ImmKind::Z) => "Some(ImmKind::Z)".to_string(),
    }
}
