//! Raw markup tree and the HTML parsing seam.
//!
//! The pipeline only depends on the [`MarkupParser`] trait. [`HtmlParser`] is a
//! small tolerant implementation that is good enough for template sources: it
//! keeps doctype detection, drops comments, understands void and raw-text
//! elements and closes whatever is left open at the end of the input.

use derive_more::Deref;
use logos::Logos;
use serde::Serialize;

use crate::StencilResult;

/// An ordered attribute map. The first occurrence of a name wins, so
/// duplicates cannot exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize)]
pub struct Attributes(Vec<(String, String)>);

impl Attributes {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert an attribute. Returns `false` and keeps the existing value when
	/// the name is already present.
	pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
		let name = name.into();
		if self.contains(&name) {
			return false;
		}

		self.0.push((name, value.into()));
		true
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.0
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.iter().any(|(key, _)| key == name)
	}

	/// A copy with the named attributes removed.
	#[must_use]
	pub fn without(&self, names: &[&str]) -> Self {
		Self(
			self.0
				.iter()
				.filter(|(key, _)| !names.contains(&key.as_str()))
				.cloned()
				.collect(),
		)
	}
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
	fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
		let mut attributes = Self::new();
		for (name, value) in iter {
			attributes.insert(name, value);
		}
		attributes
	}
}

/// A node of the raw tree handed over by the markup parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
	Fragment(Fragment),
	Tag(Tag),
	Text(Text),
}

/// The root of a parsed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
	pub children: Vec<Node>,
	/// Whether the source started with `<!DOCTYPE html>`.
	pub has_doctype: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
	pub name: String,
	pub attributes: Attributes,
	pub children: Vec<Node>,
}

impl Tag {
	pub fn new(name: impl Into<String>, attributes: Attributes, children: Vec<Node>) -> Self {
		Self {
			name: name.into(),
			attributes,
			children,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Text {
	pub text: String,
	/// Already escaped content that must be written verbatim.
	pub markup: bool,
}

impl Text {
	pub fn new(text: impl Into<String>) -> Self {
		Self {
			text: text.into(),
			markup: false,
		}
	}

	pub fn markup(text: impl Into<String>) -> Self {
		Self {
			text: text.into(),
			markup: true,
		}
	}

	pub fn is_whitespace(&self) -> bool {
		self.text.trim().is_empty()
	}
}

/// Turns template source into a raw [`Fragment`].
pub trait MarkupParser {
	fn parse(&self, source: &str, filename: &str) -> StencilResult<Fragment>;
}

/// Elements that never have children.
const VOID_ELEMENTS: [&str; 14] = [
	"area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
	"track", "wbr",
];

/// Template directives that never have children.
const VOID_DIRECTIVES: [&str; 1] = ["import"];

/// Elements whose content runs verbatim up to the matching close tag.
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];

/// Raw-text elements whose content still has character references decoded.
const ESCAPABLE_RAW_TEXT_ELEMENTS: [&str; 2] = ["textarea", "title"];

/// The default, tolerant HTML parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlParser;

impl MarkupParser for HtmlParser {
	fn parse(&self, source: &str, _filename: &str) -> StencilResult<Fragment> {
		Ok(TreeBuilder::default().build(source))
	}
}

/// Tokens inside a start tag, after the tag name.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum AttrToken {
	#[token(">")]
	End,
	#[token("/>")]
	SelfClosingEnd,
	#[token("/")]
	Slash,
	#[token("=")]
	Equals,
	#[regex(r#""[^"]*""#)]
	DoubleQuoted,
	#[regex(r"'[^']*'")]
	SingleQuoted,
	#[regex(r#"[^ \t\r\n\f"'=<>/`]+"#)]
	Word,
}

struct StartTag {
	attributes: Attributes,
	/// Byte length consumed after the tag name.
	consumed: usize,
	self_closing: bool,
}

#[derive(Default)]
struct TreeBuilder {
	root: Vec<Node>,
	stack: Vec<Tag>,
	has_doctype: bool,
}

impl TreeBuilder {
	fn build(mut self, source: &str) -> Fragment {
		let mut pos = 0;

		while pos < source.len() {
			let Some(offset) = source[pos..].find('<') else {
				self.push_text(decode_entities(&source[pos..]), false);
				break;
			};

			let start = pos + offset;
			if start > pos {
				self.push_text(decode_entities(&source[pos..start]), false);
			}

			let rest = &source[start..];
			if rest.starts_with("<!--") {
				pos = rest[4..]
					.find("-->")
					.map_or(source.len(), |end| start + 4 + end + 3);
			} else if rest.starts_with("<!") || rest.starts_with("<?") {
				let end = rest.find('>').map_or(rest.len(), |end| end + 1);
				if rest[2..end].trim_start().to_ascii_lowercase().starts_with("doctype") {
					self.has_doctype = true;
				}
				pos = start + end;
			} else if let Some(after) = rest.strip_prefix("</") {
				let name_len = tag_name_len(after);
				let name = after[..name_len].to_ascii_lowercase();
				let end = after.find('>').map_or(after.len(), |end| end + 1);
				if !name.is_empty() {
					self.close(&name);
				}
				pos = start + 2 + end;
			} else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
				pos = self.start_tag(source, start);
			} else {
				self.push_text("<".to_string(), false);
				pos = start + 1;
			}
		}

		while !self.stack.is_empty() {
			self.pop();
		}

		Fragment {
			children: self.root,
			has_doctype: self.has_doctype,
		}
	}

	/// Handle a start tag beginning at `start` and return the position after
	/// it (and after its raw text content, if any).
	fn start_tag(&mut self, source: &str, start: usize) -> usize {
		let after_lt = start + 1;
		let name_len = tag_name_len(&source[after_lt..]);
		let name = source[after_lt..after_lt + name_len].to_ascii_lowercase();
		let attrs_start = after_lt + name_len;
		let tag = lex_start_tag(&source[attrs_start..]);
		let mut pos = attrs_start + tag.consumed;

		let element = Tag::new(name.clone(), tag.attributes, Vec::new());
		if tag.self_closing
			|| VOID_ELEMENTS.contains(&name.as_str())
			|| VOID_DIRECTIVES.contains(&name.as_str())
		{
			self.append(Node::Tag(element));
			return pos;
		}

		let raw = RAW_TEXT_ELEMENTS.contains(&name.as_str());
		let escapable = ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&name.as_str());
		self.stack.push(element);

		if raw || escapable {
			let closing = format!("</{name}");
			let rest = &source[pos..];
			let content_len = rest
				.to_ascii_lowercase()
				.find(&closing)
				.unwrap_or(rest.len());
			let content = &rest[..content_len];
			if !content.is_empty() {
				if raw {
					self.push_text(content.to_string(), true);
				} else {
					self.push_text(decode_entities(content), false);
				}
			}
			pos += content_len;
			let rest = &source[pos..];
			pos += rest.find('>').map_or(rest.len(), |end| end + 1);
			self.close(&name);
		}

		pos
	}

	fn push_text(&mut self, text: String, markup: bool) {
		if text.is_empty() {
			return;
		}

		let siblings = match self.stack.last_mut() {
			Some(parent) => &mut parent.children,
			None => &mut self.root,
		};

		if let Some(Node::Text(previous)) = siblings.last_mut() {
			if previous.markup == markup {
				previous.text.push_str(&text);
				return;
			}
		}

		siblings.push(Node::Text(Text { text, markup }));
	}

	fn append(&mut self, node: Node) {
		match self.stack.last_mut() {
			Some(parent) => parent.children.push(node),
			None => self.root.push(node),
		}
	}

	fn pop(&mut self) {
		if let Some(tag) = self.stack.pop() {
			self.append(Node::Tag(tag));
		}
	}

	/// Close the innermost open element named `name`, implicitly closing any
	/// elements opened after it. Stray close tags are ignored.
	fn close(&mut self, name: &str) {
		let Some(index) = self.stack.iter().rposition(|tag| tag.name == name) else {
			return;
		};

		while self.stack.len() > index {
			self.pop();
		}
	}
}

fn tag_name_len(source: &str) -> usize {
	source
		.find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':' | '.')))
		.unwrap_or(source.len())
}

/// Lex the attributes of a start tag. `source` begins right after the tag
/// name.
fn lex_start_tag(source: &str) -> StartTag {
	let mut lexer = AttrToken::lexer(source);
	let mut attributes = Attributes::new();
	let mut pending: Option<String> = None;

	while let Some(token) = lexer.next() {
		match token {
			Ok(AttrToken::End | AttrToken::SelfClosingEnd) => {
				if let Some(name) = pending.take() {
					attributes.insert(name, "");
				}

				return StartTag {
					attributes,
					consumed: lexer.span().end,
					self_closing: lexer.slice() == "/>",
				};
			}
			Ok(AttrToken::Word) => {
				if let Some(name) = pending.take() {
					attributes.insert(name, "");
				}
				pending = Some(lexer.slice().to_ascii_lowercase());
			}
			Ok(AttrToken::Equals) => {
				let Some(name) = pending.take() else {
					continue;
				};

				let remainder = lexer.remainder();
				let value_source = remainder.trim_start_matches([' ', '\t', '\r', '\n', '\x0c']);
				let skipped = remainder.len() - value_source.len();
				let (value, consumed) = split_attribute_value(value_source);
				attributes.insert(name, decode_entities(value));
				lexer.bump(skipped + consumed);
			}
			Ok(AttrToken::Slash | AttrToken::DoubleQuoted | AttrToken::SingleQuoted) | Err(()) => {}
		}
	}

	if let Some(name) = pending.take() {
		attributes.insert(name, "");
	}

	StartTag {
		attributes,
		consumed: source.len(),
		self_closing: false,
	}
}

/// Split an attribute value off the front of `source`, returning the value and
/// the number of bytes it occupied (including quotes).
fn split_attribute_value(source: &str) -> (&str, usize) {
	let Some(quote) = source.chars().next().filter(|c| matches!(c, '"' | '\'')) else {
		let end = source
			.find(|c: char| c.is_ascii_whitespace() || c == '>')
			.unwrap_or(source.len());
		return (&source[..end], end);
	};

	match source[1..].find(quote) {
		Some(end) => (&source[1..=end], end + 2),
		None => (&source[1..], source.len()),
	}
}

/// Decode the common named character references and numeric references.
/// Unknown references are left untouched.
pub fn decode_entities(source: &str) -> String {
	if !source.contains('&') {
		return source.to_string();
	}

	let mut output = String::with_capacity(source.len());
	let mut rest = source;

	while let Some(index) = rest.find('&') {
		output.push_str(&rest[..index]);
		rest = &rest[index..];

		let decoded = rest.find(';').filter(|end| *end <= 10).and_then(|end| {
			let entity = &rest[1..end];
			let ch = match entity {
				"amp" => Some('&'),
				"lt" => Some('<'),
				"gt" => Some('>'),
				"quot" => Some('"'),
				"apos" | "#39" => Some('\''),
				"nbsp" => Some('\u{a0}'),
				_ => entity
					.strip_prefix("#x")
					.or_else(|| entity.strip_prefix("#X"))
					.and_then(|hex| u32::from_str_radix(hex, 16).ok())
					.or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
					.and_then(char::from_u32),
			};
			ch.map(|ch| (ch, end))
		});

		match decoded {
			Some((ch, end)) => {
				output.push(ch);
				rest = &rest[end + 1..];
			}
			None => {
				output.push('&');
				rest = &rest[1..];
			}
		}
	}

	output.push_str(rest);
	output
}
