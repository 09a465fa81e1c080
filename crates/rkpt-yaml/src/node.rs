//! Node tree for parsed YAML documents.
//!
//! Nodes own their comments so that moving a subtree between documents
//! moves its comments with it. Structural equality for merge decisions is
//! [`Node::same_value`], which ignores comments, positions and sequence
//! indentation hints.

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
	pub line: usize,
	pub col: usize,
}

impl Pos {
	pub fn new(line: usize, col: usize) -> Self {
		Self { line, col }
	}
}

/// How a scalar was written in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
	Plain,
	SingleQuoted,
	DoubleQuoted,
	/// `|` block scalar. Value holds the dedented lines joined by `\n`.
	Literal(Chomping),
	/// `>` block scalar. Lines are kept verbatim, not folded.
	Folded(Chomping),
}

impl ScalarStyle {
	/// Whether this style marks the value as a string regardless of content.
	pub fn is_stringy(self) -> bool {
		!matches!(self, Self::Plain)
	}
}

/// Block scalar chomping indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chomping {
	/// Default: single trailing newline.
	Clip,
	/// `-`: no trailing newline.
	Strip,
	/// `+`: all trailing newlines kept.
	Keep,
}

/// A scalar value with its presentation style.
#[derive(Debug, Clone)]
pub struct Scalar {
	pub value: String,
	pub style: ScalarStyle,
	/// Explicit tag (`!!int`, `!custom`), if any.
	pub tag: Option<String>,
	pub pos: Pos,
}

impl Scalar {
	pub fn plain(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
			style: ScalarStyle::Plain,
			tag: None,
			pos: Pos::default(),
		}
	}

	pub fn quoted(value: impl Into<String>) -> Self {
		Self {
			value: value.into(),
			style: ScalarStyle::DoubleQuoted,
			tag: None,
			pos: Pos::default(),
		}
	}

	/// Plain empty, `~` and `null` scalars all denote null.
	pub fn is_null(&self) -> bool {
		self.style == ScalarStyle::Plain
			&& self.tag.is_none()
			&& matches!(self.value.as_str(), "" | "~" | "null" | "Null" | "NULL")
	}

	pub fn same_value(&self, other: &Self) -> bool {
		self.value == other.value
			&& self.style.is_stringy() == other.style.is_stringy()
			&& self.tag == other.tag
	}
}

/// One `key: value` pair of a mapping, with the comments anchored to it.
#[derive(Debug, Clone)]
pub struct MappingEntry {
	pub key: Scalar,
	pub value: Node,
	/// Full-line comments above the key. Empty strings are blank lines.
	pub head: Vec<String>,
	/// Trailing comment on the key line (includes the `#`).
	pub line: Option<String>,
}

impl MappingEntry {
	pub fn new(key: impl Into<String>, value: Node) -> Self {
		Self {
			key: Scalar::plain(key),
			value,
			head: Vec::new(),
			line: None,
		}
	}
}

/// An ordered mapping. Key order is source order and is preserved on emit.
#[derive(Debug, Clone, Default)]
pub struct Mapping {
	pub entries: Vec<MappingEntry>,
	/// Parsed from `{...}` flow syntax; emitted back as flow.
	pub flow: bool,
}

impl Mapping {
	pub fn get(&self, key: &str) -> Option<&Node> {
		self.entries
			.iter()
			.find(|e| e.key.value == key)
			.map(|e| &e.value)
	}

	pub fn get_mut(&mut self, key: &str) -> Option<&mut Node> {
		self.entries
			.iter_mut()
			.find(|e| e.key.value == key)
			.map(|e| &mut e.value)
	}

	pub fn entry(&self, key: &str) -> Option<&MappingEntry> {
		self.entries.iter().find(|e| e.key.value == key)
	}

	/// Replace the value under `key`, appending a new entry when absent.
	pub fn set(&mut self, key: &str, value: Node) {
		match self.get_mut(key) {
			Some(slot) => *slot = value,
			None => self.entries.push(MappingEntry::new(key, value)),
		}
	}

	pub fn remove(&mut self, key: &str) -> Option<Node> {
		let idx = self.entries.iter().position(|e| e.key.value == key)?;
		Some(self.entries.remove(idx).value)
	}
}

/// One `- value` item of a sequence.
#[derive(Debug, Clone)]
pub struct SequenceItem {
	pub value: Node,
	pub head: Vec<String>,
	pub line: Option<String>,
}

impl SequenceItem {
	pub fn new(value: Node) -> Self {
		Self {
			value,
			head: Vec::new(),
			line: None,
		}
	}
}

#[derive(Debug, Clone, Default)]
pub struct Sequence {
	pub items: Vec<SequenceItem>,
	pub flow: bool,
	/// Extra indentation of `-` items relative to the parent key (0 or 2 in
	/// practice). Preserved so reformatting does not churn diffs.
	pub indent_hint: usize,
}

/// A YAML node: scalar, mapping or sequence.
#[derive(Debug, Clone)]
pub enum Node {
	Scalar(Scalar),
	Mapping(Mapping),
	Sequence(Sequence),
}

impl Node {
	pub fn null() -> Self {
		Self::Scalar(Scalar::plain(""))
	}

	pub fn scalar(value: impl Into<String>) -> Self {
		Self::Scalar(Scalar::plain(value))
	}

	pub fn as_scalar(&self) -> Option<&Scalar> {
		match self {
			Self::Scalar(s) => Some(s),
			_ => None,
		}
	}

	pub fn as_mapping(&self) -> Option<&Mapping> {
		match self {
			Self::Mapping(m) => Some(m),
			_ => None,
		}
	}

	pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
		match self {
			Self::Mapping(m) => Some(m),
			_ => None,
		}
	}

	pub fn as_sequence(&self) -> Option<&Sequence> {
		match self {
			Self::Sequence(s) => Some(s),
			_ => None,
		}
	}

	/// Mapping field lookup; `None` for non-mappings.
	pub fn get(&self, key: &str) -> Option<&Node> {
		self.as_mapping().and_then(|m| m.get(key))
	}

	/// Scalar string value; `None` for collections.
	pub fn str_value(&self) -> Option<&str> {
		self.as_scalar().map(|s| s.value.as_str())
	}

	pub fn is_null(&self) -> bool {
		matches!(self, Self::Scalar(s) if s.is_null())
	}

	pub fn kind_name(&self) -> &'static str {
		match self {
			Self::Scalar(_) => "scalar",
			Self::Mapping(_) => "mapping",
			Self::Sequence(_) => "sequence",
		}
	}

	/// Deep value equality, ignoring comments, positions and layout hints.
	pub fn same_value(&self, other: &Node) -> bool {
		match (self, other) {
			(Self::Scalar(a), Self::Scalar(b)) => a.same_value(b),
			(Self::Mapping(a), Self::Mapping(b)) => {
				a.entries.len() == b.entries.len()
					&& a.entries.iter().zip(&b.entries).all(|(x, y)| {
						x.key.value == y.key.value && x.value.same_value(&y.value)
					})
			}
			(Self::Sequence(a), Self::Sequence(b)) => {
				a.items.len() == b.items.len()
					&& a.items
						.iter()
						.zip(&b.items)
						.all(|(x, y)| x.value.same_value(&y.value))
			}
			_ => false,
		}
	}
}

/// One document of a (possibly multi-document) resource file.
#[derive(Debug, Clone)]
pub struct Document {
	pub root: Node,
	/// Comments above the root node (or above the `---` marker).
	pub head: Vec<String>,
	/// Comments after the last node of the document.
	pub foot: Vec<String>,
	/// Whether the source wrote an explicit `---` before this document.
	pub explicit_start: bool,
}

impl Document {
	pub fn new(root: Node) -> Self {
		Self {
			root,
			head: Vec::new(),
			foot: Vec::new(),
			explicit_start: false,
		}
	}
}
