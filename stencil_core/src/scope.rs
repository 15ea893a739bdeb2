//! Phase two: resolve which tags are visible inside each component and compile
//! its raw body into [`TplNode`]s.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::ast::Binding;
use crate::ast::Binds;
use crate::ast::CustomTag;
use crate::ast::DefnId;
use crate::ast::RawNode;
use crate::ast::RawStyle;
use crate::ast::RawTag;
use crate::ast::StyleSheet;
use crate::ast::TagDefn;
use crate::ast::Template;
use crate::ast::TextFragment;
use crate::ast::TplCond;
use crate::ast::TplNode;
use crate::ast::TplRepeat;
use crate::ast::TplTag;
use crate::bindings::parse_attribute_reporting;
use crate::bindings::parse_condition;
use crate::bindings::parse_placeholders_reporting;
use crate::bindings::parse_repeat;
use crate::css;
use crate::diagnostics::Diagnostics;
use crate::html_tags::BUILTIN_TAGS;
use crate::html_tags::is_deprecated_tag;
use crate::html_tags::is_html5_tag;
use crate::loader::LoadedGraph;
use crate::markup::Attributes;
use crate::markup::Text;

/// Attributes compiled into wrapper nodes instead of bindings.
const DIRECTIVES: [&str; 2] = ["if", "repeat"];

/// What a tag name resolves to inside a component body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visible {
	/// A directive tag of the template language.
	Builtin,
	Defn(DefnId),
}

/// The tag names visible inside a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
	tags: BTreeMap<String, Visible>,
}

impl Default for Namespace {
	fn default() -> Self {
		Self::builtins()
	}
}

impl Namespace {
	/// Only the built-in directive tags.
	pub fn builtins() -> Self {
		let tags = BUILTIN_TAGS
			.iter()
			.map(|name| ((*name).to_string(), Visible::Builtin))
			.collect();
		Self { tags }
	}

	pub fn get(&self, name: &str) -> Option<Visible> {
		self.tags.get(name).copied()
	}

	pub fn len(&self) -> usize {
		self.tags.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tags.is_empty()
	}

	/// Make `name` visible. Returns `false` and keeps the first registrant
	/// when a different definition already uses the name.
	pub fn insert(&mut self, name: &str, visible: Visible) -> bool {
		match self.tags.get(name) {
			Some(existing) => *existing == visible,
			None => {
				self.tags.insert(name.to_string(), visible);
				true
			}
		}
	}

	/// Merge every tag declared by `source`, reporting one error per
	/// colliding name.
	pub fn merge(&mut self, source: &Template, diagnostics: &mut Diagnostics, file: &str) {
		for (name, defn) in &source.tags {
			if !self.insert(name, Visible::Defn(*defn)) {
				diagnostics.error(
					Some(file),
					format!(
						"`<{name}>` imported from `{}` collides with a tag that is already visible",
						source.location
					),
				);
			}
		}
	}

	/// Add the entries of `other` that are not visible yet, reporting names
	/// that resolve differently.
	fn overlay(&mut self, other: &Namespace, diagnostics: &mut Diagnostics, file: &str) {
		for (name, visible) in &other.tags {
			if !self.insert(name, *visible) {
				diagnostics.error(
					Some(file),
					format!("`<{name}>` imported by the component collides with a template import"),
				);
			}
		}
	}
}

/// The namespace shared by every component of `template` without imports of
/// its own: built-ins, own declarations, then template-scope imports.
struct TemplateScope {
	own: Namespace,
	imported: Namespace,
}

impl TemplateScope {
	fn new(template: &Template, templates: &[Template], diagnostics: &mut Diagnostics) -> Self {
		let file = template.file();
		let mut own = Namespace::builtins();

		for (name, defn) in &template.tags {
			if !own.insert(name, Visible::Defn(*defn)) {
				diagnostics.error(
					Some(&file),
					format!("component `{name}` shadows a built-in tag and is never used"),
				);
			}
		}

		let mut imported = own.clone();
		for import in &template.imports {
			imported.merge(&templates[import.0], diagnostics, &file);
		}

		Self { own, imported }
	}

	/// The namespace for `defn`. Its own imports take precedence over the
	/// template-scope ones.
	fn for_defn(
		&self,
		defn: &TagDefn,
		templates: &[Template],
		diagnostics: &mut Diagnostics,
		file: &str,
	) -> Cow<'_, Namespace> {
		if defn.imports.is_empty() {
			return Cow::Borrowed(&self.imported);
		}

		let mut namespace = self.own.clone();
		for import in &defn.imports {
			namespace.merge(&templates[import.0], diagnostics, file);
		}
		namespace.overlay(&self.imported, diagnostics, file);
		Cow::Owned(namespace)
	}
}

/// Compile the body of every declaration in `graph`.
pub(crate) fn build_scopes(graph: &mut LoadedGraph) {
	let LoadedGraph {
		templates,
		sheets,
		defns,
		diagnostics,
		..
	} = graph;
	let templates = templates.as_slice();

	let mut compiled = Vec::with_capacity(defns.len());

	for template in templates.iter() {
		if template.tags.is_empty() {
			continue;
		}

		let file = template.file();
		let scope = TemplateScope::new(template, templates, diagnostics);

		for defn in defns.iter().filter(|defn| defn.template == template.id) {
			let namespace = scope.for_defn(defn, templates, diagnostics, &file);
			let mut builder = ScopeBuilder {
				defn,
				defns: defns.as_slice(),
				sheets: sheets.as_slice(),
				namespace: &namespace,
				diagnostics: &mut *diagnostics,
				file: &file,
			};
			let nodes = builder.build_tag_defn();
			diagnostics.debug(
				Some(&file),
				format!("compiled `<{}>` into {} nodes", defn.name, nodes.len()),
			);
			compiled.push((defn.id, nodes));
		}
	}

	for (id, nodes) in compiled {
		defns[id.0].nodes = nodes;
	}
}

/// Compiles the raw body of one declaration.
pub(crate) struct ScopeBuilder<'a> {
	defn: &'a TagDefn,
	defns: &'a [TagDefn],
	sheets: &'a [StyleSheet],
	namespace: &'a Namespace,
	diagnostics: &'a mut Diagnostics,
	file: &'a str,
}

impl ScopeBuilder<'_> {
	pub(crate) fn build_tag_defn(&mut self) -> Vec<TplNode> {
		let defn = self.defn;
		self.build(&defn.raw, false)
	}

	fn build(&mut self, raw: &[RawNode], verbatim: bool) -> Vec<TplNode> {
		let mut nodes = Vec::with_capacity(raw.len());

		for node in raw {
			match node {
				RawNode::Text(text) => self.text(text, verbatim, &mut nodes),
				RawNode::Style(style) => self.style(style, &mut nodes),
				RawNode::Tag(tag) => {
					let node = self.tag(tag);
					nodes.push(node);
				}
			}
		}

		nodes
	}

	fn text(&mut self, text: &Text, verbatim: bool, nodes: &mut Vec<TplNode>) {
		if verbatim || text.markup {
			nodes.push(TplNode::Text(Text::markup(text.text.clone())));
			return;
		}

		for fragment in parse_placeholders_reporting(&text.text, self.diagnostics, Some(self.file)) {
			nodes.push(match fragment {
				TextFragment::Text(text) => TplNode::Text(Text::new(text)),
				TextFragment::Expression(expression) => TplNode::Expression(expression),
			});
		}
	}

	/// Emit the rendered sheet, folding it into a directly preceding `<style>`
	/// with the same bindings. A sheet under `if` or `repeat` is never folded.
	fn style(&mut self, style: &RawStyle, nodes: &mut Vec<TplNode>) {
		let Some(ast) = &self.sheets[style.sheet.0].ast else {
			return;
		};

		let rendered = css::translate(ast);
		if rendered.trim().is_empty() {
			return;
		}

		let binds = self.plain_binds(&style.attributes.without(&DIRECTIVES));
		let directed = DIRECTIVES
			.iter()
			.any(|directive| style.attributes.contains(directive));

		if !directed {
			let previous = nodes
				.iter_mut()
				.rev()
				.find(|node| !node.is_whitespace_text());

			match previous {
				Some(TplNode::Tag(previous)) if previous.name == "style" && previous.binds == binds => {
					previous.children.push(TplNode::Text(Text::markup(rendered)));
					return;
				}
				_ => {}
			}
		}

		let node = TplNode::Tag(TplTag {
			name: "style".to_string(),
			binds,
			children: vec![TplNode::Text(Text::markup(rendered))],
		});
		let node = self.directives("style", &style.attributes, node);
		nodes.push(node);
	}

	fn tag(&mut self, tag: &RawTag) -> TplNode {
		let attributes = tag.attributes.without(&DIRECTIVES);

		let node = match self.namespace.get(&tag.name) {
			Some(Visible::Defn(id)) if id != self.defn.id => self.custom_tag(tag, id, &attributes),
			_ => self.plain_tag(tag, &attributes),
		};

		self.directives(&tag.name, &tag.attributes, node)
	}

	/// Wrap `node` in the `if` and `repeat` directives found in `attributes`.
	/// `repeat` is outermost so the condition sees the alias.
	fn directives(&mut self, name: &str, attributes: &Attributes, node: TplNode) -> TplNode {
		let node = match attributes.get("if").map(parse_condition) {
			Some(Ok(condition)) => {
				TplNode::Cond(TplCond {
					condition,
					children: vec![node],
				})
			}
			Some(Err(e)) => {
				self.diagnostics
					.error(Some(self.file), format!("`<{name}>`: {e}"));
				node
			}
			None => node,
		};

		match attributes.get("repeat").map(parse_repeat) {
			Some(Ok(repeat)) => {
				TplNode::Repeat(TplRepeat {
					alias: repeat.alias,
					each: repeat.each,
					children: vec![node],
				})
			}
			Some(Err(e)) => {
				self.diagnostics
					.error(Some(self.file), format!("`<{name}>`: {e}"));
				node
			}
			None => node,
		}
	}

	fn custom_tag(&mut self, tag: &RawTag, id: DefnId, attributes: &Attributes) -> TplNode {
		let defns = self.defns;
		let target = &defns[id.0];
		let mut binds = Binds::new();

		for (name, value) in attributes.iter() {
			if !target.params.contains(name) {
				self.diagnostics.warn(
					Some(self.file),
					format!("`<{}>` has no parameter `{name}`; the attribute is dropped", tag.name),
				);
				continue;
			}

			let binding = parse_attribute_reporting(value, self.diagnostics, Some(self.file));
			binds.insert(name.clone(), binding);
		}

		for (name, default) in target.params.iter() {
			if !binds.contains(name) {
				binds.insert(name.clone(), Binding::Text(default.clone()));
			}
		}

		TplNode::Custom(CustomTag {
			defn: id,
			name: tag.name.clone(),
			binds,
			captured: self.build(&tag.children, false),
		})
	}

	fn plain_tag(&mut self, tag: &RawTag, attributes: &Attributes) -> TplNode {
		let name = tag.name.as_str();
		if is_deprecated_tag(name) {
			self.diagnostics
				.warn(Some(self.file), format!("`<{name}>` is deprecated"));
		} else if !is_html5_tag(name) {
			self.diagnostics
				.error(Some(self.file), format!("unknown tag `<{name}>`"));
		}

		TplNode::Tag(TplTag {
			name: tag.name.clone(),
			binds: self.plain_binds(attributes),
			children: self.build(&tag.children, name == "script"),
		})
	}

	fn plain_binds(&mut self, attributes: &Attributes) -> Binds {
		let mut binds = Binds::new();
		for (name, value) in attributes.iter() {
			let binding = parse_attribute_reporting(value, self.diagnostics, Some(self.file));
			binds.insert(name.clone(), binding);
		}
		binds
	}
}
