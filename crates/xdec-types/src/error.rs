//! The decoder's error domain (§4.1 "Error conditions", §7). Exactly four
//! kinds; all non-fatal to the caller, none of them hold a heap-allocated
//! payload so the type stays `Copy` and `no_std`-safe.

use core::fmt;

/// Why `decode` failed to produce an `Instruction` at the given position.
///
/// A negative return from `decode` carries one of these; the instruction
/// record itself is left in an unspecified state and must not be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum DecodeError {
    /// The input ran out before a well-formed instruction could be read.
    ShortBuffer,
    /// The byte sequence reached a terminal marked invalid, or an
    /// architecturally illegal prefix combination (e.g. `LOCK` on a
    /// non-memory destination, conflicting VEX-like prefixes).
    Invalid,
    /// A well-formed instruction would consume more than 15 bytes.
    TooLong,
    /// `mode` was not 32 or 64.
    BadMode,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DecodeError::ShortBuffer => "input exhausted before a complete instruction was read",
            DecodeError::Invalid => "invalid encoding",
            DecodeError::TooLong => "instruction would exceed 15 bytes",
            DecodeError::BadMode => "mode must be 32 or 64",
        };
        f.write_str(s)
    }
}
