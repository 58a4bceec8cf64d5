//! Diagnostics for the instruction-description parser and table builder.
//!
//! Every variant here is fatal to a generator run (§7 of the spec treats any
//! inconsistency in the spec file as fatal): the caller is expected to print
//! the message, including line/token context, and exit nonzero without
//! producing an output file.

use core::fmt;

/// A single fatal problem found while parsing or compiling the instruction
/// description file.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GeneratorError {
    /// A line didn't split into the expected four whitespace-separated
    /// columns.
    #[error("{line}: expected 4 columns (opcode-bytes mnemonic operands flags), found {found}: {text:?}")]
    MalformedLine {
        line: usize,
        found: usize,
        text: String,
    },

    /// A token in the opcode-bytes column didn't match any recognized
    /// keyword and wasn't a valid opcode byte either.
    #[error("{line}: unrecognized opcode-bytes token {token:?}")]
    BadOpcodeToken { line: usize, token: String },

    /// The opcode-bytes column didn't name exactly one opcode byte.
    #[error("{line}: opcode-bytes column must name exactly one opcode byte, found {found}")]
    OpcodeByteCount { line: usize, found: usize },

    /// An operand-template token isn't in the fixed vocabulary (§4.2).
    #[error("{line}: unknown operand template {token:?}")]
    UnknownOperandTemplate { line: usize, token: String },

    /// A flags-column token isn't recognized.
    #[error("{line}: unknown flag {token:?}")]
    UnknownFlag { line: usize, token: String },

    /// A mnemonic isn't a valid Rust identifier and can't become an enum
    /// variant name.
    #[error("{line}: mnemonic {mnemonic:?} is not a valid identifier")]
    BadMnemonic { line: usize, mnemonic: String },

    /// Two records would occupy the same dispatch leaf with different
    /// mnemonics — a generator error per §4.2 ("it is a generator error").
    #[error(
        "duplicate encoding: {first_line} and {second_line} both resolve to opcode path {path} \
         with different terminals ({first_mnemonic} vs {second_mnemonic})"
    )]
    DuplicateEncoding {
        first_line: usize,
        second_line: usize,
        path: String,
        first_mnemonic: String,
        second_mnemonic: String,
    },

    /// A `+cc` or `+r` span would walk off the end of the opcode byte space.
    #[error("{line}: opcode span starting at {base:#04x} overflows the one-byte range")]
    SpanOverflow { line: usize, base: u8 },
}

impl GeneratorError {
    /// The source line this diagnostic pins, if any (used by the CLI to
    /// print `file:line: message`).
    pub fn line(&self) -> Option<usize> {
        match self {
            GeneratorError::MalformedLine { line, .. }
            | GeneratorError::BadOpcodeToken { line, .. }
            | GeneratorError::OpcodeByteCount { line, .. }
            | GeneratorError::UnknownOperandTemplate { line, .. }
            | GeneratorError::UnknownFlag { line, .. }
            | GeneratorError::BadMnemonic { line, .. }
            | GeneratorError::SpanOverflow { line, .. } => Some(*line),
            GeneratorError::DuplicateEncoding { .. } => None,
        }
    }
}

/// A collection of diagnostics, gathered so a single CLI run reports every
/// problem instead of stopping at the first one.
#[derive(Debug, Default)]
pub struct GeneratorErrors(pub Vec<GeneratorError>);

impl fmt::Display for GeneratorErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for GeneratorErrors {}
