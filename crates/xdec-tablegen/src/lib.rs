//! Table generator: turns the textual instruction-description file into a
//! dispatch [`Graph`], then renders that graph as either generated Rust
//! source ([`codegen`], used by build scripts) or a standalone binary blob
//! ([`blob`], used by the `generator` CLI's own output file).
//!
//! The description file itself lives at `opcodes.txt`, next to this crate,
//! and is compiled in via [`include_str!`] so every consumer — both build
//! scripts and the CLI — parses the exact same canonical data.

pub mod blob;
pub mod codegen;
pub mod error;
pub mod graph;
pub mod record;

use error::{GeneratorError, GeneratorErrors};
use graph::Graph;

/// The canonical instruction description, embedded at compile time.
pub const DEFAULT_SPEC: &str = include_str!("../opcodes.txt");

/// Parses [`DEFAULT_SPEC`] and builds its dispatch graph.
pub fn parse_default_spec() -> Result<Graph, GeneratorErrors> {
    parse_spec_str(DEFAULT_SPEC)
}

/// Parses an arbitrary instruction-description string and builds its
/// dispatch graph. Used directly by the `generator` CLI (which reads its
/// input file at runtime) and indirectly by build scripts (through
/// [`parse_default_spec`]).
pub fn parse_spec_str(text: &str) -> Result<Graph, GeneratorErrors> {
    let mut errors = Vec::new();
    let mut records = Vec::new();

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match record::parse_line(line_no, trimmed) {
            Ok(mut recs) => records.append(&mut recs),
            Err(e) => errors.push(e),
        }
    }

    if !errors.is_empty() {
        return Err(GeneratorErrors(errors));
    }

    graph::build_graph(&records).map_err(|e| GeneratorErrors(vec![e]))
}

/// Convenience for callers that want a single [`GeneratorError`] rather than
/// the full collection (the CLI always wants every diagnostic; build
/// scripts, which abort on the first problem anyway, can use this).
pub fn first_error(errors: &GeneratorErrors) -> Option<&GeneratorError> {
    errors.0.first()
}
