//! Structured YAML model for rkpt.
//!
//! Parses Kubernetes-style resource files into a node tree that keeps the
//! information a text-level round trip needs: mapping key order, scalar
//! style (plain, quoted, block), and comments (head, line, foot). The
//! serializer turns the tree back into bytes so that `parse ∘ emit ∘ parse`
//! equals `parse`.
//!
//! The surface is the subset of YAML that configuration manifests use:
//! block mappings and sequences, flow collections, quoted and block
//! scalars, explicit tags and multi-document streams. Anchors, aliases,
//! `%` directives and multi-line plain scalars are rejected with a
//! [`SyntaxError`] naming the offending line.

mod emitter;
mod node;
mod parser;

pub use emitter::{emit, emit_document, emit_node};
pub use node::{
	Chomping, Document, Mapping, MappingEntry, Node, Pos, Scalar, ScalarStyle, Sequence,
	SequenceItem,
};
pub use parser::parse;

/// Malformed YAML input. Carries the 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("yaml syntax error at line {line}, column {col}: {msg}")]
pub struct SyntaxError {
	pub line: usize,
	pub col: usize,
	pub msg: String,
}

impl SyntaxError {
	pub(crate) fn new(line: usize, col: usize, msg: impl Into<String>) -> Self {
		Self {
			line,
			col,
			msg: msg.into(),
		}
	}
}
