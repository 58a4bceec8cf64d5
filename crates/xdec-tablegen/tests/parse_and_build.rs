use xdec_tablegen::graph::Node;
use xdec_tablegen::{blob, parse_default_spec, parse_spec_str};

#[test]
fn default_spec_parses_and_builds_without_error() {
    let graph = parse_default_spec().expect("canonical opcodes.txt must parse cleanly");
    assert!(!graph.nodes.is_empty());
    assert!(!graph.terminals.is_empty());
    assert!(graph.mnemonic_ids.contains(&"ADD".to_string()));
    assert!(graph.mnemonic_ids.contains(&"CMPXCHG8B".to_string()));
    assert!(graph.mnemonic_ids.contains(&"CMPXCHG16B".to_string()));
}

#[test]
fn cmpxchg_8b_16b_share_a_leaf_split_by_rex_w() {
    let graph = parse_default_spec().unwrap();
    // map index 1 == 0F, opcode 0xC7.
    let root = graph.roots[1][0xC7];
    assert_ne!(root, 0, "0F C7 must be reachable from the root table");
    let node = &graph.nodes[root as usize];
    match node {
        Node::Reg(slots) => {
            let ext1 = slots[1];
            assert_ne!(ext1, 0);
            match &graph.nodes[ext1 as usize] {
                Node::RexW { w0, w1 } => {
                    assert_ne!(*w0, 0);
                    assert_ne!(*w1, 0);
                }
                other => panic!("expected a RexW split at 0F C7 /1, got {other:?}"),
            }
        }
        other => panic!("expected a Reg (extension) node at 0F C7, got {other:?}"),
    }
}

#[test]
fn group7_mixes_fixed_modrm_bytes_with_a_memory_fallback() {
    let graph = parse_default_spec().unwrap();
    let root = graph.roots[1][0x01]; // 0F 01
    let node = &graph.nodes[root as usize];
    let ext0 = match node {
        Node::Reg(slots) => slots[0],
        other => panic!("expected Reg node at 0F 01, got {other:?}"),
    };
    match &graph.nodes[ext0 as usize] {
        Node::FixedModrm { pairs, fallback } => {
            assert_eq!(pairs.len(), 2, "MONITOR and MWAIT should both be exact matches");
            assert_ne!(*fallback, 0, "SGDT should be the memory fallback");
        }
        other => panic!("expected a FixedModrm node at 0F 01 /0, got {other:?}"),
    }
}

#[test]
fn vex_form_splits_by_l_and_w() {
    let graph = parse_default_spec().unwrap();
    let root = graph.roots[1][0x2A]; // 0F 2A, VCVTSI2SD
    match &graph.nodes[root as usize] {
        Node::Vex { l128, .. } => {
            assert_ne!(l128.w0, 0);
            assert_ne!(l128.w1, 0);
        }
        other => panic!("expected a Vex node at 0F 2A, got {other:?}"),
    }
}

#[test]
fn reg_span_covers_every_byte_in_range_except_the_nop_alias() {
    let graph = parse_default_spec().unwrap();
    // PUSH r/64, 0x50..=0x57, all eight slots populated.
    for b in 0x50u8..=0x57 {
        assert_ne!(graph.roots[0][b as usize], 0, "{b:#04x} should decode");
    }
    // XCHG eAX, r is 0x91..=0x97; 0x90 itself is the separate NOP entry.
    assert_ne!(graph.roots[0][0x90], 0);
    for b in 0x91u8..=0x97 {
        assert_ne!(graph.roots[0][b as usize], 0, "{b:#04x} should decode");
    }
}

#[test]
fn cc_span_expands_to_all_sixteen_conditions() {
    let graph = parse_default_spec().unwrap();
    for b in 0x70u8..=0x7F {
        assert_ne!(graph.roots[0][b as usize], 0, "Jcc short form {b:#04x}");
    }
    assert!(graph.mnemonic_ids.contains(&"JAE".to_string()));
    assert!(graph.mnemonic_ids.contains(&"JLE".to_string()));
    assert!(graph.mnemonic_ids.contains(&"SETNE".to_string()));
    assert!(graph.mnemonic_ids.contains(&"CMOVGE".to_string()));
}

#[test]
fn malformed_line_is_reported_with_its_line_number() {
    let err = parse_spec_str("00 ADD Eb,Gb LOCK EXTRA\n").unwrap_err();
    assert_eq!(err.0.len(), 1);
    assert_eq!(err.0[0].line(), Some(1));
}

#[test]
fn unknown_operand_template_is_rejected() {
    let err = parse_spec_str("00 ADD Qq -\n").unwrap_err();
    assert_eq!(err.0.len(), 1);
}

#[test]
fn blob_round_trips_the_default_graph() {
    let graph = parse_default_spec().unwrap();
    let bytes = blob::write_blob(&graph);
    let back = blob::read_blob(&bytes).expect("round trip must succeed");
    assert_eq!(back.nodes.len(), graph.nodes.len());
    assert_eq!(back.terminals.len(), graph.terminals.len());
    assert_eq!(back.mnemonic_ids, graph.mnemonic_ids);
    assert_eq!(back.roots, graph.roots);
}

#[test]
fn blob_rejects_truncated_input() {
    let graph = parse_default_spec().unwrap();
    let mut bytes = blob::write_blob(&graph);
    bytes.truncate(bytes.len() / 2);
    assert!(blob::read_blob(&bytes).is_err());
}
