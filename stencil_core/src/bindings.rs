//! Attribute and text binding compilation.
//!
//! Placeholders are written as `{path.to.value}`. `{{` and `}}` produce a
//! literal brace, a lone `}` is literal text and an empty `{}` is kept as
//! literal text.

use thiserror::Error;

use crate::ast::Binding;
use crate::ast::Expression;
use crate::ast::TextFragment;
use crate::ast::TextTemplate;
use crate::diagnostics::Diagnostics;

/// A directive attribute with an unusable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectiveError {
	#[error("invalid repeat `{0}`: expected `alias in expression`")]
	InvalidRepeat(String),
	#[error("the `if` directive needs an expression")]
	EmptyCondition,
}

/// A parsed `repeat="alias in expression"` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepeatDirective {
	pub alias: String,
	pub each: Expression,
}

/// Split `source` into literal text and expressions. Problems are ignored;
/// see [`parse_placeholders_reporting`].
pub fn parse_placeholders(source: &str) -> Vec<TextFragment> {
	split_placeholders(source, &mut |_| {})
}

/// Like [`parse_placeholders`], reporting malformed placeholders as lints.
pub fn parse_placeholders_reporting(
	source: &str,
	diagnostics: &mut Diagnostics,
	file: Option<&str>,
) -> Vec<TextFragment> {
	split_placeholders(source, &mut |message| diagnostics.lint(file, message))
}

fn split_placeholders(source: &str, report: &mut dyn FnMut(String)) -> Vec<TextFragment> {
	let mut fragments = Vec::new();
	let mut literal = String::new();
	let mut rest = source;

	while let Some(index) = rest.find(['{', '}']) {
		literal.push_str(&rest[..index]);
		let tail = &rest[index..];

		if tail.starts_with("{{") || tail.starts_with("}}") {
			literal.push_str(&tail[..1]);
			rest = &tail[2..];
			continue;
		}

		if tail.starts_with('}') {
			literal.push('}');
			rest = &tail[1..];
			continue;
		}

		let after = &tail[1..];
		let Some(end) = after.find('}') else {
			report(format!("unterminated placeholder in `{source}`"));
			if after.trim().is_empty() {
				literal.push('{');
				rest = after;
				break;
			}

			flush(&mut literal, &mut fragments);
			fragments.push(TextFragment::Expression(Expression::parse(after)));
			rest = "";
			break;
		};

		let inner = &after[..end];
		if inner.trim().is_empty() {
			report(format!("empty placeholder in `{source}`"));
			literal.push_str(&tail[..end + 2]);
		} else {
			flush(&mut literal, &mut fragments);
			fragments.push(TextFragment::Expression(Expression::parse(inner)));
		}
		rest = &after[end + 1..];
	}

	literal.push_str(rest);
	flush(&mut literal, &mut fragments);
	fragments
}

fn flush(literal: &mut String, fragments: &mut Vec<TextFragment>) {
	if !literal.is_empty() {
		fragments.push(TextFragment::Text(std::mem::take(literal)));
	}
}

/// Classify an attribute value.
///
/// - `{x.y}` is a bare expression that keeps the native value.
/// - anything else containing braces is a text template, collapsed to plain
///   text when it only holds literals.
/// - everything else is plain text.
pub fn parse_attribute(value: &str) -> Binding {
	classify(value, parse_placeholders)
}

/// Like [`parse_attribute`], reporting malformed placeholders as lints.
pub fn parse_attribute_reporting(value: &str, diagnostics: &mut Diagnostics, file: Option<&str>) -> Binding {
	classify(value, |source| {
		parse_placeholders_reporting(source, diagnostics, file)
	})
}

fn classify(value: &str, split: impl FnOnce(&str) -> Vec<TextFragment>) -> Binding {
	let bare = value
		.strip_prefix('{')
		.and_then(|value| value.strip_suffix('}'))
		.filter(|inner| !inner.contains(['{', '}']) && !inner.trim().is_empty());
	if let Some(inner) = bare {
		return Binding::Expression(Expression::parse(inner));
	}

	if !value.contains(['{', '}']) {
		return Binding::Text(value.to_string());
	}

	let fragments = split(value);
	let literal: Option<String> = fragments
		.iter()
		.map(|fragment| {
			match fragment {
				TextFragment::Text(text) => Some(text.as_str()),
				TextFragment::Expression(_) => None,
			}
		})
		.collect();

	match literal {
		Some(text) => Binding::Text(text),
		None => Binding::Template(TextTemplate(fragments)),
	}
}

/// Parse the value of a `repeat` attribute.
pub fn parse_repeat(value: &str) -> Result<RepeatDirective, DirectiveError> {
	let invalid = || DirectiveError::InvalidRepeat(value.to_string());
	let terms: Vec<&str> = value.split(" in ").map(str::trim).collect();

	let [alias, each] = terms.as_slice() else {
		return Err(invalid());
	};
	if alias.is_empty() || each.is_empty() {
		return Err(invalid());
	}

	Ok(RepeatDirective {
		alias: (*alias).to_string(),
		each: Expression::parse(strip_braces(each)),
	})
}

/// Parse the value of an `if` attribute. The braces around the expression are
/// optional.
pub fn parse_condition(value: &str) -> Result<Expression, DirectiveError> {
	let inner = strip_braces(value.trim());
	if inner.trim().is_empty() {
		return Err(DirectiveError::EmptyCondition);
	}

	Ok(Expression::parse(inner))
}

fn strip_braces(value: &str) -> &str {
	value
		.strip_prefix('{')
		.and_then(|value| value.strip_suffix('}'))
		.unwrap_or(value)
}
