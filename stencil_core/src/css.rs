//! Stylesheet AST and the CSS parsing seam.
//!
//! The AST is deliberately shallow: rules keep their selector and declaration
//! text verbatim, at-rules keep their prelude and either a nested rule list or
//! a raw declaration block. That is all the pipeline needs to move rules
//! between sheets, find `@import`s and rewrite `url(...)` references.

use serde::Serialize;
use thiserror::Error;

/// A node of a parsed stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CssNode {
	StyleSheet {
		rules: Vec<CssNode>,
	},
	AtRule {
		name: String,
		prelude: String,
		block: Option<CssBlock>,
	},
	Rule {
		selector: String,
		declarations: String,
	},
}

/// The body of an at-rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum CssBlock {
	/// Nested rules, e.g. `@media`.
	Rules(Vec<CssNode>),
	/// A declaration list, e.g. `@font-face`.
	Declarations(String),
}

impl CssNode {
	pub fn empty_sheet() -> Self {
		Self::StyleSheet { rules: Vec::new() }
	}

	/// The top-level rules when this node is a stylesheet.
	pub fn rules(&self) -> Option<&Vec<CssNode>> {
		match self {
			Self::StyleSheet { rules } => Some(rules),
			_ => None,
		}
	}

	pub fn rules_mut(&mut self) -> Option<&mut Vec<CssNode>> {
		match self {
			Self::StyleSheet { rules } => Some(rules),
			_ => None,
		}
	}

	pub fn is_at_rule(&self, at_name: &str) -> bool {
		matches!(self, Self::AtRule { name, .. } if name.eq_ignore_ascii_case(at_name))
	}

	/// The url referenced by an `@import` rule.
	pub fn import_url(&self) -> Option<String> {
		let Self::AtRule { prelude, .. } = self else {
			return None;
		};
		if !self.is_at_rule("import") {
			return None;
		}

		let prelude = prelude.trim_start();
		if let Some(quote) = prelude.chars().next().filter(|c| matches!(c, '"' | '\'')) {
			return prelude[1..]
				.find(quote)
				.map(|end| prelude[1..=end].to_string());
		}

		let mut found = None;
		for_each_url(prelude, |url| {
			if found.is_none() {
				found = Some(url.to_string());
			}
			None
		});
		found
	}
}

/// Options passed to a [`CssParser`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CssParseOptions {
	/// Recover from malformed input instead of failing on the first error.
	pub tolerant: bool,
}

/// A problem found while parsing a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (at byte {offset})")]
pub struct CssParseError {
	pub message: String,
	pub offset: usize,
}

/// Turns stylesheet source into a [`CssNode::StyleSheet`].
pub trait CssParser {
	/// Parse `source`. In tolerant mode every problem is passed to
	/// `on_error` and parsing continues; otherwise the first problem is
	/// returned.
	fn parse(
		&self,
		source: &str,
		options: &CssParseOptions,
		on_error: &mut dyn FnMut(CssParseError),
	) -> Result<CssNode, CssParseError>;
}

/// The default stylesheet parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCssParser;

impl CssParser for DefaultCssParser {
	fn parse(
		&self,
		source: &str,
		options: &CssParseOptions,
		on_error: &mut dyn FnMut(CssParseError),
	) -> Result<CssNode, CssParseError> {
		let mut errors = Vec::new();
		let rules = Cursor::new(source, 0).parse_rules(false, &mut errors);

		if options.tolerant {
			for error in errors {
				on_error(error);
			}
		} else if let Some(error) = errors.into_iter().next() {
			return Err(error);
		}

		Ok(CssNode::StyleSheet { rules })
	}
}

struct Cursor<'a> {
	source: &'a str,
	pos: usize,
	/// Offset of `source` inside the original input, for error positions.
	base: usize,
}

impl<'a> Cursor<'a> {
	fn new(source: &'a str, base: usize) -> Self {
		Self {
			source,
			pos: 0,
			base,
		}
	}

	fn peek(&self) -> Option<char> {
		self.source[self.pos..].chars().next()
	}

	fn rest(&self) -> &'a str {
		&self.source[self.pos..]
	}

	fn bump(&mut self) {
		if let Some(c) = self.peek() {
			self.pos += c.len_utf8();
		}
	}

	fn error(&self, errors: &mut Vec<CssParseError>, message: impl Into<String>) {
		errors.push(CssParseError {
			message: message.into(),
			offset: self.base + self.pos,
		});
	}

	fn skip_trivia(&mut self) {
		loop {
			let rest = self.rest();
			let trimmed = rest.trim_start();
			self.pos += rest.len() - trimmed.len();

			if trimmed.starts_with("/*") {
				self.skip_comment();
			} else if trimmed.starts_with("<!--") || trimmed.starts_with("-->") {
				self.pos += if trimmed.starts_with("<!--") { 4 } else { 3 };
			} else {
				return;
			}
		}
	}

	fn skip_comment(&mut self) {
		self.pos = self.rest()[2..]
			.find("*/")
			.map_or(self.source.len(), |end| self.pos + 2 + end + 2);
	}

	fn skip_string(&mut self, quote: char) {
		self.bump();
		while let Some(c) = self.peek() {
			self.bump();
			if c == '\\' {
				self.bump();
			} else if c == quote || c == '\n' {
				return;
			}
		}
	}

	/// Advance until one of `stops` appears outside strings, comments and
	/// parentheses. The stop character is not consumed.
	fn scan_until(&mut self, stops: &[char]) -> (&'a str, Option<char>) {
		let start = self.pos;
		let mut parens = 0usize;

		while let Some(c) = self.peek() {
			match c {
				'"' | '\'' => self.skip_string(c),
				'/' if self.rest().starts_with("/*") => self.skip_comment(),
				'\\' => {
					self.bump();
					self.bump();
				}
				'(' => {
					parens += 1;
					self.bump();
				}
				')' => {
					parens = parens.saturating_sub(1);
					self.bump();
				}
				c if parens == 0 && stops.contains(&c) => {
					return (&self.source[start..self.pos], Some(c));
				}
				_ => self.bump(),
			}
		}

		(&self.source[start..self.pos], None)
	}

	/// Consume a `{ ... }` block whose opening brace was already consumed and
	/// return its inner text, or `None` when the input ends first.
	fn scan_block(&mut self) -> Option<(&'a str, usize)> {
		let start = self.pos;
		let mut depth = 1usize;

		loop {
			let (_, stop) = self.scan_until(&['{', '}']);
			match stop {
				Some('{') => depth += 1,
				Some(_) => depth -= 1,
				None => return None,
			}

			if depth == 0 {
				let inner = &self.source[start..self.pos];
				self.bump();
				return Some((inner, start));
			}
			self.bump();
		}
	}

	fn parse_rules(&mut self, nested: bool, errors: &mut Vec<CssParseError>) -> Vec<CssNode> {
		let mut rules = Vec::new();

		loop {
			self.skip_trivia();
			match self.peek() {
				None => break,
				Some('}') => {
					self.error(errors, "unexpected `}`");
					self.bump();
				}
				Some(';') => self.bump(),
				Some('@') => {
					if let Some(rule) = self.parse_at_rule(errors) {
						rules.push(rule);
					}
				}
				Some(_) => {
					if let Some(rule) = self.parse_qualified_rule(nested, errors) {
						rules.push(rule);
					}
				}
			}
		}

		rules
	}

	fn parse_at_rule(&mut self, errors: &mut Vec<CssParseError>) -> Option<CssNode> {
		self.bump();
		let name_len = self
			.rest()
			.find(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
			.unwrap_or(self.rest().len());
		let name = self.rest()[..name_len].to_ascii_lowercase();
		self.pos += name_len;

		if name.is_empty() {
			self.error(errors, "expected an at-rule name after `@`");
		}

		let (prelude, stop) = self.scan_until(&[';', '{', '}']);
		let prelude = strip_comments(prelude).trim().to_string();

		match stop {
			Some(';') => {
				self.bump();
				Some(CssNode::AtRule {
					name,
					prelude,
					block: None,
				})
			}
			Some('{') => {
				self.bump();
				let Some((inner, inner_start)) = self.scan_block() else {
					self.error(errors, format!("unclosed block in `@{name}`"));
					return None;
				};
				let block = if has_nested_block(inner) {
					let mut nested = Cursor::new(inner, self.base + inner_start);
					CssBlock::Rules(nested.parse_rules(true, errors))
				} else {
					CssBlock::Declarations(inner.trim().to_string())
				};

				Some(CssNode::AtRule {
					name,
					prelude,
					block: Some(block),
				})
			}
			_ => {
				// Statement at-rules may end at the end of the input or block.
				if stop.is_none() && !prelude.is_empty() {
					return Some(CssNode::AtRule {
						name,
						prelude,
						block: None,
					});
				}

				self.error(errors, format!("unterminated `@{name}` rule"));
				None
			}
		}
	}

	fn parse_qualified_rule(
		&mut self,
		nested: bool,
		errors: &mut Vec<CssParseError>,
	) -> Option<CssNode> {
		let (selector, stop) = self.scan_until(&['{', '}', ';']);
		let selector = strip_comments(selector).trim().to_string();

		match stop {
			Some('{') => {
				self.bump();
				let Some((inner, _)) = self.scan_block() else {
					self.error(errors, format!("unclosed block for `{selector}`"));
					return None;
				};

				Some(CssNode::Rule {
					selector,
					declarations: inner.trim().to_string(),
				})
			}
			Some('}') if nested => {
				self.error(errors, format!("expected `{{` after `{selector}`"));
				None
			}
			Some(_) => {
				self.error(errors, format!("expected `{{` after `{selector}`"));
				self.bump();
				None
			}
			None => {
				self.error(errors, format!("unexpected end of input after `{selector}`"));
				None
			}
		}
	}
}

fn has_nested_block(inner: &str) -> bool {
	let mut cursor = Cursor::new(inner, 0);
	matches!(cursor.scan_until(&['{']).1, Some('{'))
}

fn strip_comments(source: &str) -> String {
	let mut output = String::with_capacity(source.len());
	let mut rest = source;

	while let Some(start) = rest.find("/*") {
		output.push_str(&rest[..start]);
		rest = rest[start + 2..]
			.find("*/")
			.map_or("", |end| &rest[start + 2 + end + 2..]);
	}

	output.push_str(rest);
	output
}

/// Visit `node` and every node nested inside it, parents first.
pub fn walk(node: &CssNode, visit: &mut dyn FnMut(&CssNode)) {
	visit(node);
	match node {
		CssNode::StyleSheet { rules }
		| CssNode::AtRule {
			block: Some(CssBlock::Rules(rules)),
			..
		} => {
			for rule in rules {
				walk(rule, visit);
			}
		}
		CssNode::AtRule { .. } | CssNode::Rule { .. } => {}
	}
}

/// Mutable variant of [`walk`].
pub fn walk_mut(node: &mut CssNode, visit: &mut dyn FnMut(&mut CssNode)) {
	visit(node);
	match node {
		CssNode::StyleSheet { rules }
		| CssNode::AtRule {
			block: Some(CssBlock::Rules(rules)),
			..
		} => {
			for rule in rules {
				walk_mut(rule, visit);
			}
		}
		CssNode::AtRule { .. } | CssNode::Rule { .. } => {}
	}
}

/// Remove every node (at any depth) for which `matches` returns true and
/// return the removed nodes in document order.
pub fn extract(node: &mut CssNode, matches: &dyn Fn(&CssNode) -> bool) -> Vec<CssNode> {
	let mut removed = Vec::new();
	let rules = match node {
		CssNode::StyleSheet { rules }
		| CssNode::AtRule {
			block: Some(CssBlock::Rules(rules)),
			..
		} => rules,
		CssNode::AtRule { .. } | CssNode::Rule { .. } => return removed,
	};

	for mut rule in std::mem::take(rules) {
		if matches(&rule) {
			removed.push(rule);
		} else {
			removed.extend(extract(&mut rule, matches));
			rules.push(rule);
		}
	}

	removed
}

/// Call `rewrite` for every `url(...)` reference in `source`. A `Some` result
/// replaces the reference.
pub fn for_each_url(source: &str, mut rewrite: impl FnMut(&str) -> Option<String>) -> String {
	let mut output = String::with_capacity(source.len());
	let mut rest = source;

	while let Some(start) = rest.to_ascii_lowercase().find("url(") {
		let open = start + 4;
		output.push_str(&rest[..open]);
		let Some(close) = rest[open..].find(')') else {
			rest = &rest[open..];
			break;
		};

		let raw = &rest[open..open + close];
		let trimmed = raw.trim();
		let (quote, url) = match trimmed.chars().next() {
			Some(q @ ('"' | '\'')) if trimmed.len() >= 2 && trimmed.ends_with(q) => {
				(Some(q), &trimmed[1..trimmed.len() - 1])
			}
			_ => (None, trimmed),
		};

		match rewrite(url) {
			Some(replacement) => {
				let quote = quote.unwrap_or('"');
				output.push(quote);
				output.push_str(&replacement);
				output.push(quote);
			}
			None => output.push_str(raw),
		}
		output.push(')');
		rest = &rest[open + close + 1..];
	}

	output.push_str(rest);
	output
}

/// Rewrite every `url(...)` reference inside `node` and its children.
pub fn rewrite_urls(node: &mut CssNode, rewrite: &mut dyn FnMut(&str) -> Option<String>) {
	walk_mut(node, &mut |node| match node {
		CssNode::Rule { declarations, .. }
		| CssNode::AtRule {
			block: Some(CssBlock::Declarations(declarations)),
			..
		} => {
			*declarations = for_each_url(declarations.as_str(), &mut *rewrite);
		}
		CssNode::AtRule { prelude, .. } => {
			*prelude = for_each_url(prelude.as_str(), &mut *rewrite);
		}
		CssNode::StyleSheet { .. } => {}
	});
}

/// Render a node back to CSS text.
pub fn translate(node: &CssNode) -> String {
	match node {
		CssNode::StyleSheet { rules } => translate_rules(rules),
		CssNode::AtRule {
			name,
			prelude,
			block,
		} => {
			let head = if prelude.is_empty() {
				format!("@{name}")
			} else {
				format!("@{name} {prelude}")
			};

			match block {
				None => format!("{head};"),
				Some(CssBlock::Rules(rules)) => {
					format!("{head} {{\n{}\n}}", translate_rules(rules))
				}
				Some(CssBlock::Declarations(declarations)) => {
					translate_block(&head, declarations)
				}
			}
		}
		CssNode::Rule {
			selector,
			declarations,
		} => translate_block(selector, declarations),
	}
}

fn translate_rules(rules: &[CssNode]) -> String {
	rules.iter().map(translate).collect::<Vec<_>>().join("\n")
}

fn translate_block(head: &str, declarations: &str) -> String {
	if declarations.is_empty() {
		format!("{head} {{}}")
	} else {
		format!("{head} {{ {declarations} }}")
	}
}
