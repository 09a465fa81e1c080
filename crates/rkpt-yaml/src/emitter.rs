//! YAML serializer.
//!
//! Writes a node tree back to text, reproducing mapping key order, scalar
//! styles, sequence indentation and comments. Output canonicalizes spacing
//! (two-space indent, one space before trailing comments, flow collections
//! with `, ` separators); reparsing the output yields the same tree.

use crate::node::{Chomping, Document, Mapping, Node, Scalar, ScalarStyle, Sequence};

/// Serialize a document stream.
pub fn emit(docs: &[Document]) -> String {
	let mut out = String::new();
	for (i, doc) in docs.iter().enumerate() {
		emit_document_into(doc, i > 0, &mut out);
	}
	out
}

/// Serialize a single document, including its comments.
pub fn emit_document(doc: &Document) -> String {
	let mut out = String::new();
	emit_document_into(doc, false, &mut out);
	out
}

fn emit_document_into(doc: &Document, force_separator: bool, out: &mut String) {
	for c in &doc.head {
		comment_line(0, c, out);
	}
	if doc.explicit_start || force_separator {
		out.push_str("---\n");
	}
	if !doc.root.is_null() || !matches!(doc.root, Node::Scalar(_)) {
		emit_node_into(&doc.root, 0, out);
	}
	for c in &doc.foot {
		comment_line(0, c, out);
	}
}

/// Serialize one node at the given indentation. Scalars get a trailing
/// newline; collections are emitted in block style.
pub fn emit_node(node: &Node, indent: usize) -> String {
	let mut out = String::new();
	emit_node_into(node, indent, &mut out);
	out
}

fn emit_node_into(node: &Node, indent: usize, out: &mut String) {
	match node {
		Node::Scalar(s) => {
			pad(indent, out);
			match s.style {
				ScalarStyle::Literal(_) | ScalarStyle::Folded(_) => {
					out.push_str(&block_scalar_header(s));
					out.push('\n');
					block_scalar_body(s, indent + 2, out);
				}
				_ => {
					out.push_str(&scalar_text(s));
					out.push('\n');
				}
			}
		}
		Node::Mapping(m) if m.flow || m.entries.is_empty() => {
			pad(indent, out);
			out.push_str(&flow_text(node));
			out.push('\n');
		}
		Node::Sequence(s) if s.flow || s.items.is_empty() => {
			pad(indent, out);
			out.push_str(&flow_text(node));
			out.push('\n');
		}
		Node::Mapping(m) => emit_block_mapping(m, indent, out, None),
		Node::Sequence(s) => emit_block_sequence(s, indent, out),
	}
}

fn pad(indent: usize, out: &mut String) {
	for _ in 0..indent {
		out.push(' ');
	}
}

fn comment_line(indent: usize, text: &str, out: &mut String) {
	if text.is_empty() {
		out.push('\n');
	} else {
		pad(indent, out);
		out.push_str(text);
		out.push('\n');
	}
}

fn trailing_comment(comment: &Option<String>, out: &mut String) {
	if let Some(c) = comment {
		out.push(' ');
		out.push_str(c);
	}
	out.push('\n');
}

/// Emit a block mapping. When `compact_prefix` is set, the first entry goes
/// on the current output line (sequence items like `- name: x`); its head
/// comments were already emitted by the caller.
fn emit_block_mapping(
	map: &Mapping,
	indent: usize,
	out: &mut String,
	compact_prefix: Option<usize>,
) {
	for (i, entry) in map.entries.iter().enumerate() {
		let inline = compact_prefix.is_some() && i == 0;
		if !inline {
			for c in &entry.head {
				comment_line(indent, c, out);
			}
			pad(indent, out);
		}
		out.push_str(&scalar_text(&entry.key));
		out.push(':');
		match &entry.value {
			Node::Scalar(s) => match s.style {
				ScalarStyle::Literal(_) | ScalarStyle::Folded(_) => {
					out.push(' ');
					out.push_str(&block_scalar_header(s));
					trailing_comment(&entry.line, out);
					block_scalar_body(s, indent + 2, out);
				}
				_ => {
					let text = scalar_text(s);
					if !text.is_empty() {
						out.push(' ');
						out.push_str(&text);
					}
					trailing_comment(&entry.line, out);
				}
			},
			value @ Node::Mapping(m) if m.flow || m.entries.is_empty() => {
				out.push(' ');
				out.push_str(&flow_text(value));
				trailing_comment(&entry.line, out);
			}
			value @ Node::Sequence(s) if s.flow || s.items.is_empty() => {
				out.push(' ');
				out.push_str(&flow_text(value));
				trailing_comment(&entry.line, out);
			}
			Node::Mapping(m) => {
				trailing_comment(&entry.line, out);
				emit_block_mapping(m, indent + 2, out, None);
			}
			Node::Sequence(s) => {
				trailing_comment(&entry.line, out);
				emit_block_sequence(s, indent + s.indent_hint, out);
			}
		}
	}
}

fn emit_block_sequence(seq: &Sequence, indent: usize, out: &mut String) {
	for item in &seq.items {
		for c in &item.head {
			comment_line(indent, c, out);
		}
		match &item.value {
			Node::Scalar(s) => match s.style {
				ScalarStyle::Literal(_) | ScalarStyle::Folded(_) => {
					pad(indent, out);
					out.push_str("- ");
					out.push_str(&block_scalar_header(s));
					trailing_comment(&item.line, out);
					block_scalar_body(s, indent + 2, out);
				}
				_ => {
					pad(indent, out);
					out.push('-');
					let text = scalar_text(s);
					if !text.is_empty() {
						out.push(' ');
						out.push_str(&text);
					}
					trailing_comment(&item.line, out);
				}
			},
			value @ Node::Mapping(m) if m.flow || m.entries.is_empty() => {
				pad(indent, out);
				out.push_str("- ");
				out.push_str(&flow_text(value));
				trailing_comment(&item.line, out);
			}
			value @ Node::Sequence(s) if s.flow || s.items.is_empty() => {
				pad(indent, out);
				out.push_str("- ");
				out.push_str(&flow_text(value));
				trailing_comment(&item.line, out);
			}
			Node::Mapping(m) => {
				// Head comments of the first entry go above the dash line.
				if let Some(first) = m.entries.first() {
					for c in &first.head {
						comment_line(indent, c, out);
					}
				}
				pad(indent, out);
				out.push_str("- ");
				emit_block_mapping(m, indent + 2, out, Some(indent));
			}
			Node::Sequence(s) => {
				pad(indent, out);
				out.push('-');
				trailing_comment(&item.line, out);
				emit_block_sequence(s, indent + 2, out);
			}
		}
	}
}

fn block_scalar_header(s: &Scalar) -> String {
	let (marker, chomp) = match s.style {
		ScalarStyle::Literal(c) => ('|', c),
		ScalarStyle::Folded(c) => ('>', c),
		_ => unreachable!("not a block scalar"),
	};
	let mut header = String::new();
	header.push(marker);
	// An explicit indent indicator is required when the first content line
	// starts with a space.
	let needs_indicator = s
		.value
		.split('\n')
		.find(|l| !l.trim().is_empty())
		.is_some_and(|l| l.starts_with(' '));
	if needs_indicator {
		header.push('2');
	}
	match chomp {
		Chomping::Clip => {}
		Chomping::Strip => header.push('-'),
		Chomping::Keep => header.push('+'),
	}
	header
}

fn block_scalar_body(s: &Scalar, indent: usize, out: &mut String) {
	if s.value.is_empty() {
		return;
	}
	for line in s.value.split('\n') {
		if line.is_empty() {
			out.push('\n');
		} else {
			pad(indent, out);
			out.push_str(line);
			out.push('\n');
		}
	}
}

fn flow_text(node: &Node) -> String {
	match node {
		Node::Scalar(s) => scalar_text(s),
		Node::Mapping(m) => {
			let inner: Vec<String> = m
				.entries
				.iter()
				.map(|e| {
					let value = flow_text(&e.value);
					if value.is_empty() {
						format!("{}:", scalar_text(&e.key))
					} else {
						format!("{}: {}", scalar_text(&e.key), value)
					}
				})
				.collect();
			format!("{{{}}}", inner.join(", "))
		}
		Node::Sequence(s) => {
			let inner: Vec<String> = s.items.iter().map(|i| flow_text(&i.value)).collect();
			format!("[{}]", inner.join(", "))
		}
	}
}

fn scalar_text(s: &Scalar) -> String {
	let body = match s.style {
		ScalarStyle::Plain => s.value.clone(),
		ScalarStyle::SingleQuoted => format!("'{}'", s.value.replace('\'', "''")),
		ScalarStyle::DoubleQuoted => format!("\"{}\"", escape_double(&s.value)),
		ScalarStyle::Literal(_) | ScalarStyle::Folded(_) => {
			unreachable!("block scalars are emitted by the caller")
		}
	};
	match &s.tag {
		Some(tag) if body.is_empty() => tag.clone(),
		Some(tag) => format!("{tag} {body}"),
		None => body,
	}
}

fn escape_double(value: &str) -> String {
	let mut out = String::with_capacity(value.len());
	for c in value.chars() {
		match c {
			'\\' => out.push_str("\\\\"),
			'"' => out.push_str("\\\""),
			'\n' => out.push_str("\\n"),
			'\t' => out.push_str("\\t"),
			'\r' => out.push_str("\\r"),
			'\0' => out.push_str("\\0"),
			other => out.push(other),
		}
	}
	out
}
