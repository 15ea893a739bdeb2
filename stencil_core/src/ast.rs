//! The node vocabulary shared by every phase of the pipeline.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::Deref;
use serde::Serialize;

use crate::css::CssNode;
use crate::loader::Location;
use crate::markup::Attributes;
use crate::markup::Text;

/// Handle to a [`Template`] owned by a compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TemplateId(pub(crate) usize);

/// Handle to a [`StyleSheet`] owned by a compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SheetId(pub(crate) usize);

/// Handle to a [`TagDefn`] owned by a compilation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DefnId(pub(crate) usize);

/// Where a proxy object is in its load lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadState {
	/// Referenced and queued, not read yet.
	Pending,
	Loaded,
	/// Reading or parsing failed. The object stays cached but empty.
	Failed,
}

/// One template source file and everything it declares and imports.
#[derive(Debug, Clone, Serialize)]
pub struct Template {
	pub id: TemplateId,
	pub location: Location,
	/// Every place this template was referenced from.
	pub used_from: Vec<String>,
	pub is_main: bool,
	/// Declared components by tag name.
	pub tags: BTreeMap<String, DefnId>,
	/// Templates imported at whole-file scope.
	pub imports: Vec<TemplateId>,
	pub stylesheets: Vec<SheetId>,
	/// The `<style inline-fonts>` host sheet.
	pub inline_fonts: Option<SheetId>,
	/// The `<style component-styles>` host sheet.
	pub component_styles: Option<SheetId>,
	/// JSON document referenced by `<link rel="test-data">`.
	pub test_data: Option<Location>,
	/// Stylesheet links hoisted from outside any component.
	pub link_tags: Vec<LinkTag>,
	pub state: LoadState,
}

impl Template {
	pub(crate) fn new(id: TemplateId, location: Location, used_from: String, is_main: bool) -> Self {
		Self {
			id,
			location,
			used_from: vec![used_from],
			is_main,
			tags: BTreeMap::new(),
			imports: Vec::new(),
			stylesheets: Vec::new(),
			inline_fonts: None,
			component_styles: None,
			test_data: None,
			link_tags: Vec::new(),
			state: LoadState::Pending,
		}
	}

	/// Display name used in diagnostics.
	pub fn file(&self) -> String {
		self.location.to_string()
	}
}

/// A component declaration.
#[derive(Debug, Clone, Serialize)]
pub struct TagDefn {
	pub id: DefnId,
	pub template: TemplateId,
	pub name: String,
	/// The declaration body as discovered, before scope resolution.
	#[serde(skip)]
	pub raw: Vec<RawNode>,
	/// Declared parameters and their default literal values.
	pub params: Attributes,
	/// The compiled body. Empty until scope build has run.
	pub nodes: Vec<TplNode>,
	/// Templates imported inside this declaration.
	pub imports: Vec<TemplateId>,
	/// Stylesheet links to emit once per page that uses this component.
	pub link_tags: Vec<LinkTag>,
}

/// A stylesheet `<link>` lifted out of a component body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkTag {
	/// The resolved stylesheet. Emitters derive the page-relative url from
	/// its location.
	pub sheet: SheetId,
	/// The `href` as written, relative to the declaring template. Only valid
	/// on pages in the same directory.
	pub href: String,
	pub attributes: Attributes,
}

/// A CSS resource, either loaded from a url or parsed from a `<style>` tag.
#[derive(Debug, Clone, Serialize)]
pub struct StyleSheet {
	pub id: SheetId,
	pub location: Location,
	pub used_from: Vec<String>,
	/// Parsed rules. `None` until loaded, and forever after a failed load.
	pub ast: Option<CssNode>,
	/// Declared by a non-main template.
	pub from_component: bool,
	/// Sheets pulled in with `@import`.
	pub imports: Vec<SheetId>,
	pub state: LoadState,
}

impl StyleSheet {
	pub(crate) fn new(id: SheetId, location: Location, used_from: String) -> Self {
		Self {
			id,
			location,
			used_from: vec![used_from],
			ast: None,
			from_component: false,
			imports: Vec::new(),
			state: LoadState::Pending,
		}
	}

	pub fn file(&self) -> String {
		self.location.to_string()
	}
}

/// A discovered body node. Imports, nested declarations and hoisted links are
/// already gone; styles point at their parsed sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawNode {
	Text(Text),
	Tag(RawTag),
	Style(RawStyle),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTag {
	pub name: String,
	pub attributes: Attributes,
	pub children: Vec<RawNode>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStyle {
	pub sheet: SheetId,
	pub attributes: Attributes,
}

/// A compiled dot-path lookup such as `user.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Expression {
	pub path: Vec<String>,
}

impl Expression {
	pub fn parse(source: &str) -> Self {
		Self {
			path: source.trim().split('.').map(|part| part.trim().to_string()).collect(),
		}
	}

	pub fn source(&self) -> String {
		self.path.join(".")
	}
}

impl fmt::Display for Expression {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{{{}}}", self.source())
	}
}

/// One piece of a [`TextTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum TextFragment {
	Text(String),
	Expression(Expression),
}

/// Literal text interleaved with placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Deref, Serialize)]
#[serde(transparent)]
pub struct TextTemplate(pub Vec<TextFragment>);

/// The compiled value of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Binding {
	Text(String),
	Template(TextTemplate),
	/// Evaluates to the native value of the expression, not just a string.
	Expression(Expression),
}

/// Ordered attribute bindings of a compiled tag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deref, Serialize)]
#[serde(transparent)]
pub struct Binds(Vec<(String, Binding)>);

impl Binds {
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert a binding unless the name is already bound.
	pub fn insert(&mut self, name: impl Into<String>, binding: Binding) -> bool {
		let name = name.into();
		if self.contains(&name) {
			return false;
		}

		self.0.push((name, binding));
		true
	}

	pub fn get(&self, name: &str) -> Option<&Binding> {
		self.0
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, binding)| binding)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.0.iter().any(|(key, _)| key == name)
	}
}

/// A compiled body node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TplNode {
	Text(Text),
	Expression(Expression),
	Tag(TplTag),
	Custom(CustomTag),
	Cond(TplCond),
	Repeat(TplRepeat),
}

impl TplNode {
	pub fn is_whitespace_text(&self) -> bool {
		matches!(self, Self::Text(text) if !text.markup && text.is_whitespace())
	}
}

/// A plain output tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TplTag {
	pub name: String,
	pub binds: Binds,
	pub children: Vec<TplNode>,
}

/// An instantiation of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomTag {
	pub defn: DefnId,
	pub name: String,
	pub binds: Binds,
	/// Child content written inside the instantiation.
	pub captured: Vec<TplNode>,
}

/// Children rendered only when the condition is truthy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TplCond {
	pub condition: Expression,
	pub children: Vec<TplNode>,
}

/// Children rendered once per item of `each`, with the item bound to
/// `alias`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TplRepeat {
	pub alias: String,
	pub each: Expression,
	pub children: Vec<TplNode>,
}
