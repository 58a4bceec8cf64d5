//! Register-operand vocabulary (§3.2 `REG(kind, index)`).

/// Which register file an operand's `index` selects into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Gpr,
    Xmm,
    Ymm,
    Mmx,
    Seg,
    Fpu,
    Cr,
    Dr,
    Mask,
}

/// A resolved register reference: which file, and which of its (up to 16)
/// registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    pub kind: RegisterKind,
    pub index: u8,
}

impl Register {
    pub const fn new(kind: RegisterKind, index: u8) -> Self {
        Self { kind, index }
    }
}
