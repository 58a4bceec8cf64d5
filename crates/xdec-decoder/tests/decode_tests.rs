use proptest::prelude::*;

use xdec_decoder::{
    decode, DecodeError, Mnemonic, Operand, PrefixFlags, Register, RegisterKind, SegmentOverride,
    MAX_INSTRUCTION_LENGTH,
};

fn reg(kind: RegisterKind, index: u8) -> Operand {
    Operand::Reg(Register::new(kind, index))
}

#[test]
fn nop_in_64_bit_mode() {
    let (len, instr) = decode(&[0x90], 1, 64, 0).unwrap();
    assert_eq!(len, 1);
    assert_eq!(instr.mnemonic, Mnemonic::NOP);
    assert_eq!(instr.operand(0), Operand::None);
}

#[test]
fn mov_rax_rbx_with_rex_w() {
    // 48 89 D8: REX.W MOV r/m64, r64 -- MOV RAX, RBX
    let (len, instr) = decode(&[0x48, 0x89, 0xD8], 3, 64, 0).unwrap();
    assert_eq!(len, 3);
    assert_eq!(instr.mnemonic, Mnemonic::MOV);
    assert_eq!(instr.operand_size, 8);
    assert_eq!(instr.operand(0), reg(RegisterKind::Gpr, 0)); // RAX
    assert_eq!(instr.operand(1), reg(RegisterKind::Gpr, 3)); // RBX
}

#[test]
fn mov_rax_rax_plus_disp32_in_64_bit_mode_does_not_read_eight_byte_displacement() {
    // 48 8B 80 78 56 34 12: MOV RAX, [RAX + 0x12345678] -- mod=10 in 64-bit
    // addressing must read a 4-byte displacement, not 8.
    let bytes = [0x48, 0x8B, 0x80, 0x78, 0x56, 0x34, 0x12];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 7);
    assert_eq!(instr.mnemonic, Mnemonic::MOV);
    match instr.operand(1) {
        Operand::Mem(mem) => {
            assert_eq!(mem.base, Some(Register::new(RegisterKind::Gpr, 0)));
            assert!(mem.has_displacement);
        }
        other => panic!("expected a memory operand, got {other:?}"),
    }
    assert_eq!(instr.displacement, 0x1234_5678);
}

#[test]
fn mov_with_address_size_override_reads_absolute_disp32() {
    // 67 8B 04 25 78 56 34 12: address-size override, MOV EAX, [0x12345678]
    let bytes = [0x67, 0x8B, 0x04, 0x25, 0x78, 0x56, 0x34, 0x12];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 8);
    assert_eq!(instr.mnemonic, Mnemonic::MOV);
    assert_eq!(instr.address_size, 4);
    assert_eq!(instr.operand(0), reg(RegisterKind::Gpr, 0)); // EAX
    match instr.operand(1) {
        Operand::Mem(mem) => {
            assert_eq!(mem.base, None);
            assert_eq!(mem.index, None);
            assert!(mem.has_displacement);
            assert!(!mem.rip_relative);
            assert_eq!(mem.segment, SegmentOverride::Ds);
        }
        other => panic!("expected a memory operand, got {other:?}"),
    }
    assert_eq!(instr.displacement, 0x1234_5678);
}

#[test]
fn cmpxchg_with_lock_on_a_memory_destination() {
    // F0 0F B1 0F: LOCK CMPXCHG [RDI], RCX
    let bytes = [0xF0, 0x0F, 0xB1, 0x0F];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 4);
    assert_eq!(instr.mnemonic, Mnemonic::CMPXCHG);
    assert!(instr.has_prefix(PrefixFlags::LOCK));
    assert!(matches!(instr.operand(0), Operand::Mem(_)));
    assert!(matches!(instr.operand(1), Operand::Reg(_)));
}

#[test]
fn fwait_then_fninit_in_32_bit_mode() {
    // 9B DB E3: FWAIT, then FNINIT (the non-waiting form DB E3 decodes to
    // under its fixed-ModR/M dispatch).
    let bytes = [0x9B, 0xDB, 0xE3];
    let (len1, first) = decode(&bytes, bytes.len(), 32, 0).unwrap();
    assert_eq!(len1, 1);
    assert_eq!(first.mnemonic, Mnemonic::FWAIT);

    let rest = &bytes[1..];
    let (len2, second) = decode(rest, rest.len(), 32, 1).unwrap();
    assert_eq!(len2, 2);
    assert_eq!(second.mnemonic, Mnemonic::FNINIT);
}

#[test]
fn vpxor_via_two_byte_vex_does_not_extend_the_rm_register() {
    // C5 F9 EF C0: VPXOR xmm0, xmm0, xmm0 via the 2-byte VEX form. The 2-byte
    // form has no REX.X/REX.B bits, so the r/m register must stay xmm0, not
    // be pushed out to xmm8.
    let bytes = [0xC5, 0xF9, 0xEF, 0xC0];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 4);
    assert_eq!(instr.mnemonic, Mnemonic::VPXOR);
    assert_eq!(instr.operand(0), reg(RegisterKind::Xmm, 0));
    assert_eq!(instr.operand(1), reg(RegisterKind::Xmm, 0));
}

#[test]
fn vzeroupper_via_two_byte_vex() {
    let bytes = [0xC5, 0xF8, 0x77];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 3);
    assert_eq!(instr.mnemonic, Mnemonic::VZEROUPPER);
    assert!(instr.has_prefix(PrefixFlags::VEX_PRESENT));
    assert_eq!(instr.operand(0), Operand::None);
}

#[test]
fn call_rel32_resolves_pcrel_target() {
    // E8 05 00 00 00 at 0x401000: CALL to 0x401000 + 5 + 5 = 0x40100A.
    let bytes = [0xE8, 0x05, 0x00, 0x00, 0x00];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0x401000).unwrap();
    assert_eq!(len, 5);
    assert_eq!(instr.mnemonic, Mnemonic::CALL);
    assert_eq!(instr.pcrel_target(), Some(0x40100A));
}

#[test]
fn rip_relative_memory_operand_resolves_against_address_plus_length() {
    // 8B 05 00 00 00 00: MOV EAX, [RIP + 0] at address 0x1000 -> target 0x1006.
    let bytes = [0x8B, 0x05, 0x00, 0x00, 0x00, 0x00];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0x1000).unwrap();
    assert_eq!(len, 6);
    match instr.operand(1) {
        Operand::Mem(mem) => {
            assert!(mem.rip_relative);
            assert!(mem.base.is_none());
        }
        other => panic!("expected a memory operand, got {other:?}"),
    }
    assert_eq!(instr.displacement, 0x1006);
}

#[test]
fn rip_relative_resolution_wraps_at_2_pow_64() {
    let bytes = [0x8B, 0x05, 0xFF, 0xFF, 0xFF, 0x7F];
    let (_, instr) = decode(&bytes, bytes.len(), 64, u64::MAX).unwrap();
    let expected = (u64::MAX.wrapping_add(bytes.len() as u64)).wrapping_add(0x7FFF_FFFF) as i64;
    assert_eq!(instr.displacement, expected);
}

#[test]
fn exactly_15_bytes_is_the_maximum_valid_length() {
    // F3 2E 66 48 C7 04 25 <disp32> <imm32>: exactly 15 bytes.
    let bytes: [u8; 15] = [
        0xF3, 0x2E, 0x66, 0x48, 0xC7, 0x04, 0x25, 0xAA, 0xAA, 0xAA, 0xAA, 0x11, 0x11, 0x11, 0x11,
    ];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 15);
    assert_eq!(instr.mnemonic, Mnemonic::MOV);
}

#[test]
fn sixteen_byte_encoding_is_too_long() {
    // F3 2E 66 67 48 C7 04 25 <disp32> <imm32>: 16 bytes, one past the max.
    let bytes: [u8; 16] = [
        0xF3, 0x2E, 0x66, 0x67, 0x48, 0xC7, 0x04, 0x25, 0xAA, 0xAA, 0xAA, 0xAA, 0x11, 0x11, 0x11,
        0x11,
    ];
    let err = decode(&bytes, bytes.len(), 64, 0).unwrap_err();
    assert_eq!(err, DecodeError::TooLong);
}

#[test]
fn repeated_legacy_prefix_of_the_same_group_collapses_to_one_flag() {
    let bytes = [0x66, 0x66, 0x90];
    let (len, instr) = decode(&bytes, bytes.len(), 64, 0).unwrap();
    assert_eq!(len, 3);
    assert!(instr.has_prefix(PrefixFlags::OPERAND_SIZE_OVERRIDE));
}

#[test]
fn rex_looking_byte_in_32_bit_mode_is_a_short_form_opcode_not_rex() {
    // 0x48 is DEC EAX (the `48+r` short form) in 32-bit mode, where the
    // 0x40..0x4F range is never REX.
    let (len, instr) = decode(&[0x48], 1, 32, 0).unwrap();
    assert_eq!(len, 1);
    assert_eq!(instr.mnemonic, Mnemonic::DEC);
    assert_eq!(instr.operand(0), reg(RegisterKind::Gpr, 0)); // EAX
}

#[test]
fn same_short_form_byte_is_rex_in_64_bit_mode() {
    // 0x48 0x90: REX.W then NOP, not the ONLY32 DEC terminal.
    let (len, instr) = decode(&[0x48, 0x90], 2, 64, 0).unwrap();
    assert_eq!(len, 2);
    assert_eq!(instr.mnemonic, Mnemonic::NOP);
}

#[test]
fn bad_mode_is_rejected() {
    let err = decode(&[0x90], 1, 16, 0).unwrap_err();
    assert_eq!(err, DecodeError::BadMode);
}

#[test]
fn lock_on_a_register_destination_is_invalid() {
    // F0 01 D8: LOCK ADD EAX, EBX -- both operands are registers, so LOCK
    // has no memory destination to apply to.
    let err = decode(&[0xF0, 0x01, 0xD8], 3, 64, 0).unwrap_err();
    assert_eq!(err, DecodeError::Invalid);
}

#[test]
fn xop_prefix_is_recognized_as_unmapped_and_rejected() {
    // 8F E8 78 ...: XOP prefix (8F, modrm-like byte with reg field >= 8),
    // a shape this decoder recognizes but has no tabulated map for.
    let bytes = [0x8F, 0xE8, 0x78, 0x00];
    let err = decode(&bytes, bytes.len(), 64, 0).unwrap_err();
    assert_eq!(err, DecodeError::Invalid);
}

#[test]
fn truncated_buffer_is_short_buffer_not_invalid() {
    // 0F B1 wants a ModR/M byte that isn't there.
    let err = decode(&[0x0F, 0xB1], 2, 64, 0).unwrap_err();
    assert_eq!(err, DecodeError::ShortBuffer);
}

proptest! {
    #![proptest_config(ProptestConfig {
        // Integration test under `tests/`; disable regression-file
        // persistence since proptest can't reliably locate the crate root.
        failure_persistence: None,
        .. ProptestConfig::default()
    })]

    #[test]
    fn decode_never_panics_and_never_reads_past_len(
        bytes in prop::collection::vec(any::<u8>(), 0..20),
        mode in prop_oneof![Just(32u32), Just(64u32)],
        address in any::<u64>(),
        len in 0usize..20,
    ) {
        let len = len.min(bytes.len());
        let result = std::panic::catch_unwind(|| decode(&bytes, len, mode, address))
            .expect("decode must not panic");
        if let Ok((consumed, _)) = result {
            prop_assert!(consumed <= len);
            prop_assert!(consumed <= MAX_INSTRUCTION_LENGTH);
        }
    }
}
