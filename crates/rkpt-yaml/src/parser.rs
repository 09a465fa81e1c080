//! Line-oriented YAML parser.
//!
//! The parser works on logical lines: each keeps its indentation, its
//! content with any trailing comment split off, and the raw text (block
//! scalar bodies are captured from the raw text so `#` inside them is not
//! treated as a comment). Blocks nest by indentation; compact notation
//! (`- name: x`) is handled by re-entering the current line at the inner
//! indentation.

use crate::{
	node::{
		Chomping, Document, Mapping, MappingEntry, Node, Pos, Scalar, ScalarStyle, Sequence,
		SequenceItem,
	},
	SyntaxError,
};

/// Parse a YAML stream into its documents.
pub fn parse(input: &str) -> Result<Vec<Document>, SyntaxError> {
	let lines = tokenize(input)?;
	Parser { lines, idx: 0 }.parse_stream()
}

#[derive(Debug, Clone)]
struct Line {
	raw: String,
	indent: usize,
	content: String,
	comment: Option<String>,
	number: usize,
}

impl Line {
	fn error(&self, msg: impl Into<String>) -> SyntaxError {
		SyntaxError::new(self.number, self.indent + 1, msg)
	}
}

fn tokenize(input: &str) -> Result<Vec<Line>, SyntaxError> {
	let mut lines = Vec::new();
	for (i, raw_line) in input.split('\n').enumerate() {
		let number = i + 1;
		let raw = raw_line.strip_suffix('\r').unwrap_or(raw_line).to_string();
		let indent = raw.chars().take_while(|c| *c == ' ').count();
		if raw[indent..].starts_with('\t') {
			return Err(SyntaxError::new(
				number,
				indent + 1,
				"tab characters are not allowed in indentation",
			));
		}
		let (content, comment) = split_comment(&raw[indent..]);
		lines.push(Line {
			raw,
			indent,
			content,
			comment,
			number,
		});
	}
	// split() yields one trailing empty element for a trailing newline
	if lines.last().is_some_and(|l| l.raw.is_empty()) {
		lines.pop();
	}
	Ok(lines)
}

/// Split trailing comment off a content line, respecting quoting.
///
/// A `#` starts a comment when it is at the start of the content or right
/// after whitespace, outside of quotes.
fn split_comment(s: &str) -> (String, Option<String>) {
	let mut in_single = false;
	let mut in_double = false;
	let mut prev: Option<char> = None;
	let mut escaped = false;
	let chars: Vec<(usize, char)> = s.char_indices().collect();
	let mut i = 0;
	while i < chars.len() {
		let (pos, c) = chars[i];
		if in_double {
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_double = false;
			}
		} else if in_single {
			if c == '\'' {
				if chars.get(i + 1).is_some_and(|&(_, n)| n == '\'') {
					i += 1;
				} else {
					in_single = false;
				}
			}
		} else {
			match c {
				'\'' | '"' if quote_can_start(prev) => {
					if c == '\'' {
						in_single = true;
					} else {
						in_double = true;
					}
				}
				'#' if prev.is_none() || prev.is_some_and(|p| p == ' ' || p == '\t') => {
					let content = s[..pos].trim_end().to_string();
					return (content, Some(s[pos..].trim_end().to_string()));
				}
				_ => {}
			}
		}
		prev = Some(c);
		i += 1;
	}
	(s.trim_end().to_string(), None)
}

/// A quote opens a scalar only at the start of a value position, not in the
/// middle of a plain scalar such as `it's`.
fn quote_can_start(prev: Option<char>) -> bool {
	match prev {
		None => true,
		Some(c) => matches!(c, ' ' | '\t' | '[' | '{' | ',' | ':' | '-'),
	}
}

fn is_seq_item(content: &str) -> bool {
	content == "-" || content.starts_with("- ")
}

/// Byte index of the `:` that separates key from value, if this line is a
/// mapping entry. The colon must sit outside quotes and flow brackets and
/// be followed by whitespace or end of line.
fn find_key_colon(s: &str) -> Option<usize> {
	let mut in_single = false;
	let mut in_double = false;
	let mut escaped = false;
	let mut depth = 0i32;
	let mut prev: Option<char> = None;
	let chars: Vec<(usize, char)> = s.char_indices().collect();
	let mut i = 0;
	while i < chars.len() {
		let (pos, c) = chars[i];
		if in_double {
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_double = false;
			}
		} else if in_single {
			if c == '\'' {
				if chars.get(i + 1).is_some_and(|&(_, n)| n == '\'') {
					i += 1;
				} else {
					in_single = false;
				}
			}
		} else {
			match c {
				'\'' | '"' if quote_can_start(prev) => {
					if c == '\'' {
						in_single = true;
					} else {
						in_double = true;
					}
				}
				'[' | '{' => depth += 1,
				']' | '}' => depth -= 1,
				':' if depth == 0 => {
					let next = chars.get(i + 1).map(|&(_, n)| n);
					if next.is_none() || next == Some(' ') || next == Some('\t') {
						return Some(pos);
					}
				}
				_ => {}
			}
		}
		prev = Some(c);
		i += 1;
	}
	None
}

fn is_mapping_line(content: &str) -> bool {
	if content.starts_with('"') || content.starts_with('\'') {
		if let Ok((_, len, _)) = parse_quoted(content) {
			let rest = content[len..].trim_start();
			return rest.starts_with(':')
				&& rest[1..].chars().next().is_none_or(|c| c == ' ' || c == '\t');
		}
		return false;
	}
	find_key_colon(content).is_some()
}

/// Parse a quoted scalar at the start of `s`. Returns the unescaped value,
/// the byte length consumed (including quotes), and the style.
fn parse_quoted(s: &str) -> Result<(String, usize, ScalarStyle), String> {
	let mut chars = s.char_indices();
	let (_, quote) = chars.next().ok_or("empty scalar")?;
	let mut value = String::new();
	if quote == '\'' {
		let mut iter = chars.peekable();
		while let Some((pos, c)) = iter.next() {
			if c == '\'' {
				if iter.peek().is_some_and(|&(_, n)| n == '\'') {
					value.push('\'');
					iter.next();
				} else {
					return Ok((value, pos + 1, ScalarStyle::SingleQuoted));
				}
			} else {
				value.push(c);
			}
		}
		Err("unterminated single-quoted scalar".into())
	} else {
		let mut escaped = false;
		for (pos, c) in chars {
			if escaped {
				match c {
					'n' => value.push('\n'),
					't' => value.push('\t'),
					'r' => value.push('\r'),
					'0' => value.push('\0'),
					'\\' => value.push('\\'),
					'"' => value.push('"'),
					other => {
						value.push('\\');
						value.push(other);
					}
				}
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				return Ok((value, pos + c.len_utf8(), ScalarStyle::DoubleQuoted));
			} else {
				value.push(c);
			}
		}
		Err("unterminated double-quoted scalar".into())
	}
}

struct Parser {
	lines: Vec<Line>,
	idx: usize,
}

impl Parser {
	fn cur(&self) -> Option<&Line> {
		self.lines.get(self.idx)
	}

	fn cur_cloned(&self) -> Option<Line> {
		self.cur().cloned()
	}

	/// Next line with non-empty content, without consuming anything.
	fn peek_content_line(&self) -> Option<Line> {
		self.lines[self.idx..]
			.iter()
			.find(|l| !l.content.is_empty())
			.cloned()
	}

	/// Consume consecutive comment and blank lines. Blank lines become
	/// empty strings so emission can reproduce them.
	fn take_comments(&mut self) -> Vec<String> {
		let mut out = Vec::new();
		while let Some(l) = self.cur() {
			if !l.content.is_empty() {
				break;
			}
			out.push(l.comment.clone().unwrap_or_default());
			self.idx += 1;
		}
		out
	}

	fn parse_stream(mut self) -> Result<Vec<Document>, SyntaxError> {
		let mut docs: Vec<Document> = Vec::new();
		loop {
			let mut head = self.take_comments();
			let Some(cur) = self.cur_cloned() else {
				if !head.is_empty() {
					match docs.last_mut() {
						Some(doc) => doc.foot.append(&mut head),
						None => {
							// Comment-only file: keep the comments on an
							// empty document so store() reproduces them.
							let mut doc = Document::new(Node::null());
							doc.head = head;
							docs.push(doc);
						}
					}
				}
				break;
			};
			if cur.content == "..." {
				self.idx += 1;
				if let Some(doc) = docs.last_mut() {
					doc.foot.append(&mut head);
				}
				continue;
			}
			if cur.content.starts_with('%') {
				return Err(cur.error("YAML directives are not supported"));
			}
			let mut explicit_start = false;
			if cur.content == "---" {
				explicit_start = true;
				self.idx += 1;
				head.append(&mut self.take_comments());
			}
			let root = match self.peek_content_line() {
				Some(l) if l.content != "---" && l.content != "..." => {
					self.parse_node_at_known(l.indent)?
				}
				_ => Node::null(),
			};
			let mut doc = Document::new(root);
			doc.head = head;
			doc.explicit_start = explicit_start || !docs.is_empty();
			docs.push(doc);
			if !explicit_start && self.peek_content_line().is_none() {
				// Nothing left but trailing comments; next loop turn
				// attaches them as foot.
				continue;
			}
		}
		Ok(docs)
	}

	/// Dispatch on the next content line, which starts a node at `indent`.
	fn parse_node_at_known(&mut self, indent: usize) -> Result<Node, SyntaxError> {
		let Some(l) = self.peek_content_line() else {
			return Ok(Node::null());
		};
		if is_seq_item(&l.content) {
			return self.parse_sequence(indent);
		}
		if is_mapping_line(&l.content) {
			return self.parse_mapping(indent);
		}
		// Standalone scalar value.
		self.take_comments();
		let line = self
			.cur_cloned()
			.ok_or_else(|| SyntaxError::new(0, 0, "expected a value"))?;
		self.idx += 1;
		let content = line.content.clone();
		self.parse_inline_value(&line, &content, indent)
	}

	fn parse_mapping(&mut self, indent: usize) -> Result<Node, SyntaxError> {
		let mut map = Mapping::default();
		loop {
			let save = self.idx;
			let head = self.take_comments();
			let Some(line) = self.cur_cloned() else {
				self.idx = save;
				break;
			};
			if line.content == "---" || line.content == "..." || line.indent < indent {
				self.idx = save;
				break;
			}
			if line.indent > indent {
				return Err(line.error("unexpected indentation"));
			}
			if is_seq_item(&line.content) {
				self.idx = save;
				break;
			}
			let (key, rest) = self.split_entry(&line)?;
			if map.entries.iter().any(|e| e.key.value == key.value) {
				return Err(line.error(format!("duplicate mapping key {:?}", key.value)));
			}
			self.idx += 1;
			let value = if rest.is_empty() {
				self.parse_block_value(indent, true)?
			} else {
				self.parse_inline_value(&line, &rest, indent)?
			};
			map.entries.push(MappingEntry {
				key,
				value,
				head,
				line: line.comment.clone(),
			});
		}
		Ok(Node::Mapping(map))
	}

	fn split_entry(&self, line: &Line) -> Result<(Scalar, String), SyntaxError> {
		let content = &line.content;
		if content.starts_with("? ") {
			return Err(line.error("complex mapping keys are not supported"));
		}
		if content.starts_with('"') || content.starts_with('\'') {
			let (value, len, style) =
				parse_quoted(content).map_err(|e| line.error(e))?;
			let after = content[len..].trim_start();
			let Some(tail) = after.strip_prefix(':') else {
				return Err(line.error("expected ':' after quoted key"));
			};
			let key = Scalar {
				value,
				style,
				tag: None,
				pos: Pos::new(line.number, line.indent + 1),
			};
			return Ok((key, tail.trim_start().to_string()));
		}
		let Some(ci) = find_key_colon(content) else {
			return Err(line.error("expected a 'key: value' mapping entry"));
		};
		let key_text = content[..ci].trim_end();
		if key_text.is_empty() {
			return Err(line.error("empty mapping key"));
		}
		let key = Scalar {
			value: key_text.to_string(),
			style: ScalarStyle::Plain,
			tag: None,
			pos: Pos::new(line.number, line.indent + 1),
		};
		Ok((key, content[ci + 1..].trim_start().to_string()))
	}

	/// Value of an entry (or dash item) whose own line carried nothing:
	/// either a nested block on deeper lines, a sequence at the parent's
	/// own indentation, or null.
	fn parse_block_value(
		&mut self,
		parent_indent: usize,
		allow_same_indent_seq: bool,
	) -> Result<Node, SyntaxError> {
		match self.peek_content_line() {
			Some(l) if l.content == "---" || l.content == "..." => Ok(Node::null()),
			Some(l) if l.indent > parent_indent => {
				let mut node = self.parse_node_at_known(l.indent)?;
				if let Node::Sequence(s) = &mut node {
					if !s.flow {
						s.indent_hint = l.indent - parent_indent;
					}
				}
				Ok(node)
			}
			Some(l)
				if allow_same_indent_seq
					&& l.indent == parent_indent
					&& is_seq_item(&l.content) =>
			{
				self.parse_sequence(parent_indent)
			}
			_ => Ok(Node::null()),
		}
	}

	fn parse_sequence(&mut self, indent: usize) -> Result<Node, SyntaxError> {
		let mut seq = Sequence::default();
		loop {
			let save = self.idx;
			let head = self.take_comments();
			let Some(line) = self.cur_cloned() else {
				self.idx = save;
				break;
			};
			if line.content == "---"
				|| line.content == "..."
				|| line.indent != indent
				|| !is_seq_item(&line.content)
			{
				self.idx = save;
				break;
			}
			let rest = line.content[1..].trim_start().to_string();
			let inner_indent = line.indent + (line.content.len() - rest.len());
			self.idx += 1;
			let (value, line_comment) = if rest.is_empty() {
				(self.parse_block_value(indent, false)?, line.comment.clone())
			} else if rest.starts_with('|') || rest.starts_with('>') {
				(
					self.parse_block_scalar(indent, &rest, &line)?,
					line.comment.clone(),
				)
			} else if is_seq_item(&rest) || is_mapping_line(&rest) {
				// Compact notation: re-enter this line at the inner
				// indentation so `- name: x` parses as a nested mapping.
				self.idx -= 1;
				self.lines[self.idx] = Line {
					raw: line.raw.clone(),
					indent: inner_indent,
					content: rest,
					comment: line.comment.clone(),
					number: line.number,
				};
				(self.parse_node_at_known(inner_indent)?, None)
			} else {
				(
					self.parse_inline_value(&line, &rest, indent)?,
					line.comment.clone(),
				)
			};
			seq.items.push(SequenceItem {
				value,
				head,
				line: line_comment,
			});
		}
		Ok(Node::Sequence(seq))
	}

	/// A value that starts on the current (already consumed) line.
	fn parse_inline_value(
		&mut self,
		line: &Line,
		rest: &str,
		parent_indent: usize,
	) -> Result<Node, SyntaxError> {
		let pos = Pos::new(line.number, line.indent + 1);
		if let Some(tagged) = rest.strip_prefix('!') {
			let split = tagged.find([' ', '\t']).map_or(tagged.len(), |i| i);
			let tag = format!("!{}", &tagged[..split]);
			let value = tagged[split..].trim_start();
			let mut node = if value.is_empty() {
				Node::Scalar(Scalar {
					value: String::new(),
					style: ScalarStyle::Plain,
					tag: None,
					pos,
				})
			} else {
				self.parse_inline_value(line, value, parent_indent)?
			};
			if let Node::Scalar(s) = &mut node {
				s.tag = Some(tag);
				return Ok(node);
			}
			return Err(line.error("tags are only supported on scalars"));
		}
		if rest.starts_with('|') || rest.starts_with('>') {
			return self.parse_block_scalar(parent_indent, rest, line);
		}
		if rest.starts_with('[') || rest.starts_with('{') {
			return self.parse_flow(line, rest);
		}
		if rest.starts_with('&') || rest.starts_with('*') {
			return Err(line.error("anchors and aliases are not supported"));
		}
		if rest.starts_with('"') || rest.starts_with('\'') {
			let (value, len, style) = parse_quoted(rest).map_err(|e| line.error(e))?;
			if !rest[len..].trim().is_empty() {
				return Err(line.error("unexpected content after quoted scalar"));
			}
			return Ok(Node::Scalar(Scalar {
				value,
				style,
				tag: None,
				pos,
			}));
		}
		Ok(Node::Scalar(Scalar {
			value: rest.to_string(),
			style: ScalarStyle::Plain,
			tag: None,
			pos,
		}))
	}

	fn parse_block_scalar(
		&mut self,
		parent_indent: usize,
		header: &str,
		line: &Line,
	) -> Result<Node, SyntaxError> {
		let folded = header.starts_with('>');
		let mut chomp = Chomping::Clip;
		let mut explicit_indent = None;
		for c in header[1..].chars() {
			match c {
				'-' => chomp = Chomping::Strip,
				'+' => chomp = Chomping::Keep,
				'1'..='9' => explicit_indent = Some(c as usize - '0' as usize),
				_ => return Err(line.error("invalid block scalar header")),
			}
		}
		// Capture raw lines deeper than the parent; raw text so `#` is kept.
		let mut captured: Vec<Line> = Vec::new();
		while let Some(l) = self.cur() {
			let blank = l.raw.trim().is_empty();
			if !blank && l.indent <= parent_indent {
				break;
			}
			captured.push(l.clone());
			self.idx += 1;
		}
		// Blank tail lines separate the scalar from the next node unless
		// the scalar keeps trailing newlines.
		if chomp != Chomping::Keep {
			while captured.last().is_some_and(|l| l.raw.trim().is_empty()) {
				captured.pop();
				self.idx -= 1;
			}
		}
		let content_indent = explicit_indent.map(|d| parent_indent + d).or_else(|| {
			captured
				.iter()
				.find(|l| !l.raw.trim().is_empty())
				.map(|l| l.indent)
		});
		let text = match content_indent {
			Some(ci) => captured
				.iter()
				.map(|l| l.raw.get(ci..).unwrap_or(""))
				.collect::<Vec<_>>()
				.join("\n"),
			None => String::new(),
		};
		let style = if folded {
			ScalarStyle::Folded(chomp)
		} else {
			ScalarStyle::Literal(chomp)
		};
		Ok(Node::Scalar(Scalar {
			value: text,
			style,
			tag: None,
			pos: Pos::new(line.number, line.indent + 1),
		}))
	}

	/// Flow collection, possibly continued on following lines.
	fn parse_flow(&mut self, line: &Line, rest: &str) -> Result<Node, SyntaxError> {
		let mut text = rest.to_string();
		while !flow_balanced(&text) {
			let Some(cont) = self.cur_cloned() else {
				return Err(line.error("unterminated flow collection"));
			};
			self.idx += 1;
			text.push(' ');
			text.push_str(&cont.content);
		}
		let mut cursor = FlowCursor::new(&text, line);
		let node = cursor.parse_value()?;
		cursor.skip_ws();
		if !cursor.at_end() {
			return Err(line.error("unexpected content after flow collection"));
		}
		Ok(node)
	}
}

fn flow_balanced(s: &str) -> bool {
	let mut depth = 0i32;
	let mut in_single = false;
	let mut in_double = false;
	let mut escaped = false;
	for c in s.chars() {
		if in_double {
			if escaped {
				escaped = false;
			} else if c == '\\' {
				escaped = true;
			} else if c == '"' {
				in_double = false;
			}
		} else if in_single {
			if c == '\'' {
				in_single = false;
			}
		} else {
			match c {
				'\'' => in_single = true,
				'"' => in_double = true,
				'[' | '{' => depth += 1,
				']' | '}' => depth -= 1,
				_ => {}
			}
		}
	}
	depth <= 0
}

struct FlowCursor<'a> {
	chars: Vec<char>,
	pos: usize,
	line: &'a Line,
}

impl<'a> FlowCursor<'a> {
	fn new(text: &str, line: &'a Line) -> Self {
		Self {
			chars: text.chars().collect(),
			pos: 0,
			line,
		}
	}

	fn error(&self, msg: impl Into<String>) -> SyntaxError {
		self.line.error(msg)
	}

	fn peek(&self) -> Option<char> {
		self.chars.get(self.pos).copied()
	}

	fn bump(&mut self) -> Option<char> {
		let c = self.peek();
		if c.is_some() {
			self.pos += 1;
		}
		c
	}

	fn skip_ws(&mut self) {
		while self.peek().is_some_and(|c| c == ' ' || c == '\t') {
			self.pos += 1;
		}
	}

	fn at_end(&self) -> bool {
		self.pos >= self.chars.len()
	}

	fn parse_value(&mut self) -> Result<Node, SyntaxError> {
		self.skip_ws();
		match self.peek() {
			Some('[') => self.parse_seq(),
			Some('{') => self.parse_map(),
			Some('"') | Some('\'') => self.parse_quoted_scalar(),
			_ => self.parse_plain(&[',', ']', '}']),
		}
	}

	fn parse_seq(&mut self) -> Result<Node, SyntaxError> {
		self.bump(); // [
		let mut seq = Sequence {
			flow: true,
			..Sequence::default()
		};
		loop {
			self.skip_ws();
			if self.peek() == Some(']') {
				self.bump();
				break;
			}
			if self.at_end() {
				return Err(self.error("unterminated flow sequence"));
			}
			let value = self.parse_value()?;
			seq.items.push(SequenceItem::new(value));
			self.skip_ws();
			match self.peek() {
				Some(',') => {
					self.bump();
				}
				Some(']') => {}
				_ => return Err(self.error("expected ',' or ']' in flow sequence")),
			}
		}
		Ok(Node::Sequence(seq))
	}

	fn parse_map(&mut self) -> Result<Node, SyntaxError> {
		self.bump(); // {
		let mut map = Mapping {
			flow: true,
			..Mapping::default()
		};
		loop {
			self.skip_ws();
			if self.peek() == Some('}') {
				self.bump();
				break;
			}
			if self.at_end() {
				return Err(self.error("unterminated flow mapping"));
			}
			let key = match self.peek() {
				Some('"') | Some('\'') => self.parse_quoted_scalar()?,
				_ => self.parse_plain(&[':', ',', '}'])?,
			};
			let Node::Scalar(key) = key else {
				return Err(self.error("flow mapping keys must be scalars"));
			};
			self.skip_ws();
			if self.peek() != Some(':') {
				return Err(self.error("expected ':' in flow mapping"));
			}
			self.bump();
			let value = match self.peek() {
				Some(',') | Some('}') => Node::null(),
				_ => self.parse_value()?,
			};
			map.entries.push(MappingEntry {
				key,
				value,
				head: Vec::new(),
				line: None,
			});
			self.skip_ws();
			match self.peek() {
				Some(',') => {
					self.bump();
				}
				Some('}') => {}
				_ => return Err(self.error("expected ',' or '}' in flow mapping")),
			}
		}
		Ok(Node::Mapping(map))
	}

	fn parse_quoted_scalar(&mut self) -> Result<Node, SyntaxError> {
		let remaining: String = self.chars[self.pos..].iter().collect();
		let (value, len, style) = parse_quoted(&remaining).map_err(|e| self.error(e))?;
		self.pos += remaining[..len].chars().count();
		Ok(Node::Scalar(Scalar {
			value,
			style,
			tag: None,
			pos: Pos::new(self.line.number, self.line.indent + 1),
		}))
	}

	fn parse_plain(&mut self, stops: &[char]) -> Result<Node, SyntaxError> {
		let mut value = String::new();
		while let Some(c) = self.peek() {
			if stops.contains(&c) {
				break;
			}
			value.push(c);
			self.pos += 1;
		}
		Ok(Node::Scalar(Scalar {
			value: value.trim().to_string(),
			style: ScalarStyle::Plain,
			tag: None,
			pos: Pos::new(self.line.number, self.line.indent + 1),
		}))
	}
}

#[cfg(test)]
mod tests {
	use indoc::indoc;
	use rstest::rstest;

	use super::*;
	use crate::node::{Node, ScalarStyle};

	fn parse_one(input: &str) -> Node {
		let docs = parse(input).expect("parse");
		assert_eq!(docs.len(), 1, "expected a single document");
		docs.into_iter().next().unwrap().root
	}

	#[test]
	fn parses_nested_mapping() {
		let root = parse_one(indoc! {"
			apiVersion: apps/v1
			kind: Deployment
			metadata:
			  name: nginx
			  labels:
			    app: nginx
		"});
		assert_eq!(
			root.get("metadata").and_then(|m| m.get("name")).and_then(Node::str_value),
			Some("nginx")
		);
		assert_eq!(
			root.get("metadata")
				.and_then(|m| m.get("labels"))
				.and_then(|l| l.get("app"))
				.and_then(Node::str_value),
			Some("nginx")
		);
	}

	#[test]
	fn parses_sequence_at_parent_indent_and_nested() {
		let root = parse_one(indoc! {"
			spec:
			  containers:
			  - name: app
			    image: nginx
			  args:
			    - serve
			    - --verbose
		"});
		let containers = root
			.get("spec")
			.and_then(|s| s.get("containers"))
			.and_then(Node::as_sequence)
			.unwrap();
		assert_eq!(containers.items.len(), 1);
		assert_eq!(containers.indent_hint, 0);
		let args = root
			.get("spec")
			.and_then(|s| s.get("args"))
			.and_then(Node::as_sequence)
			.unwrap();
		assert_eq!(args.items.len(), 2);
		assert_eq!(args.items[1].value.str_value(), Some("--verbose"));
	}

	#[test]
	fn keeps_comments() {
		let docs = parse(indoc! {"
			# head comment
			apiVersion: v1
			kind: ConfigMap
			metadata: # kpt-merge: team/app
			  name: app
		"})
		.unwrap();
		assert_eq!(docs[0].head, vec!["# head comment".to_string()]);
		let root = docs[0].root.as_mapping().unwrap();
		let metadata = root.entry("metadata").unwrap();
		assert_eq!(metadata.line.as_deref(), Some("# kpt-merge: team/app"));
	}

	#[test]
	fn splits_documents() {
		let docs = parse(indoc! {"
			a: 1
			---
			b: 2
			---
			c: 3
		"})
		.unwrap();
		assert_eq!(docs.len(), 3);
		assert!(!docs[0].explicit_start);
		assert!(docs[1].explicit_start);
		assert_eq!(docs[2].root.get("c").and_then(Node::str_value), Some("3"));
	}

	#[test]
	fn parses_block_scalar() {
		let root = parse_one(indoc! {"
			data:
			  config: |
			    line one
			    line two # not a comment
		"});
		let config = root
			.get("data")
			.and_then(|d| d.get("config"))
			.and_then(Node::as_scalar)
			.unwrap();
		assert_eq!(config.value, "line one\nline two # not a comment");
		assert!(matches!(config.style, ScalarStyle::Literal(Chomping::Clip)));
	}

	#[test]
	fn parses_quoted_scalars() {
		let root = parse_one(indoc! {r#"
			single: 'it''s quoted'
			double: "a\nb"
			plain: it's plain # comment
		"#});
		assert_eq!(root.get("single").and_then(Node::str_value), Some("it's quoted"));
		assert_eq!(root.get("double").and_then(Node::str_value), Some("a\nb"));
		assert_eq!(root.get("plain").and_then(Node::str_value), Some("it's plain"));
	}

	#[test]
	fn parses_flow_collections() {
		let root = parse_one(indoc! {"
			args: [one, two, three]
			selector: {app: web, tier: frontend}
		"});
		let args = root.get("args").and_then(Node::as_sequence).unwrap();
		assert!(args.flow);
		assert_eq!(args.items.len(), 3);
		let selector = root.get("selector").and_then(Node::as_mapping).unwrap();
		assert!(selector.flow);
		assert_eq!(selector.get("tier").and_then(Node::str_value), Some("frontend"));
	}

	#[test]
	fn parses_compact_nested_sequences() {
		let root = parse_one(indoc! {"
			matrix:
			- - 1
			  - 2
			- - 3
		"});
		let matrix = root.get("matrix").and_then(Node::as_sequence).unwrap();
		assert_eq!(matrix.items.len(), 2);
		let first = matrix.items[0].value.as_sequence().unwrap();
		assert_eq!(first.items.len(), 2);
	}

	#[test]
	fn urls_are_not_mapping_keys() {
		let root = parse_one("repo: https://example.com/pkg.git\n");
		assert_eq!(
			root.get("repo").and_then(Node::str_value),
			Some("https://example.com/pkg.git")
		);
	}

	#[rstest]
	#[case::tab_indent("\tkey: value\n", "tab characters")]
	#[case::anchor("key: &anchor value\n", "anchors")]
	#[case::directive("%YAML 1.2\nkey: value\n", "directives")]
	#[case::unterminated("key: \"oops\n", "unterminated")]
	#[case::duplicate_key("a: 1\na: 2\n", "duplicate")]
	fn rejects_invalid_input(#[case] input: &str, #[case] needle: &str) {
		let err = parse(input).unwrap_err();
		assert!(
			err.msg.contains(needle),
			"error {:?} should mention {:?}",
			err.msg,
			needle
		);
	}

	#[test]
	fn syntax_error_carries_position() {
		let err = parse("a: 1\n    deeper: 2\n").unwrap_err();
		assert_eq!(err.line, 2);
	}
}
