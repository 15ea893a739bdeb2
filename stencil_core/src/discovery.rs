//! Phase one: walk a freshly parsed template, register its component
//! declarations and queue everything it references.

use crate::ast::DefnId;
use crate::ast::LinkTag;
use crate::ast::RawNode;
use crate::ast::RawStyle;
use crate::ast::RawTag;
use crate::ast::SheetId;
use crate::ast::TemplateId;
use crate::html_tags::is_html5_tag;
use crate::loader::Loader;
use crate::loader::Location;
use crate::markup::Attributes;
use crate::markup::Fragment;
use crate::markup::Node;
use crate::markup::Tag;

/// Attributes that turn a `<style>` into the target of a global transform.
const INLINE_FONTS: &str = "inline-fonts";
const COMPONENT_STYLES: &str = "component-styles";

/// Register every declaration in `fragment` with `template`.
pub(crate) fn discover(loader: &mut Loader<'_>, template: TemplateId, fragment: &Fragment) {
	let location = loader.template(template).location.clone();
	let is_main = loader.template(template).is_main;
	let mut discovery = Discovery {
		file: location.to_string(),
		loader,
		template,
		location,
		is_main,
	};

	if is_main && !fragment.has_doctype {
		discovery.lint("main template is missing `<!DOCTYPE html>`");
	}

	discovery.top_level(&fragment.children);
}

struct Discovery<'l, 'c> {
	loader: &'l mut Loader<'c>,
	template: TemplateId,
	location: Location,
	file: String,
	is_main: bool,
}

impl Discovery<'_, '_> {
	fn error(&mut self, message: impl Into<String>) {
		self.loader.diagnostics().error(Some(&self.file), message);
	}

	fn warn(&mut self, message: impl Into<String>) {
		self.loader.diagnostics().warn(Some(&self.file), message);
	}

	fn lint(&mut self, message: impl Into<String>) {
		self.loader.diagnostics().lint(Some(&self.file), message);
	}

	fn top_level(&mut self, nodes: &[Node]) {
		for node in nodes {
			match node {
				Node::Fragment(fragment) => self.top_level(&fragment.children),
				Node::Text(text) => {
					if !text.is_whitespace() {
						self.lint(format!(
							"text outside of a component is ignored: `{}`",
							text.text.trim()
						));
					}
				}
				Node::Tag(tag) => self.top_level_tag(tag),
			}
		}
	}

	fn top_level_tag(&mut self, tag: &Tag) {
		match tag.name.as_str() {
			"import" => self.import(tag, None),
			"component" => self.component(tag),
			"link" => {
				self.link(tag, None);
			}
			"style" => {
				self.style(tag);
			}
			"html" => self.html(tag),
			name => {
				if is_html5_tag(name) {
					self.lint(format!("top-level `<{name}>` declares a component that shadows an HTML element"));
				}

				if let Some(defn) = self.declare(name, tag.attributes.clone()) {
					let raw = self.children(&tag.children, defn);
					self.loader.defn_mut(defn).raw = raw;
				}
			}
		}
	}

	fn html(&mut self, tag: &Tag) {
		if !self.is_main {
			self.error("`<html>` is only allowed in the main template");
			return;
		}

		let Some(defn) = self.declare("html", Attributes::new()) else {
			return;
		};

		let children = self.children(&tag.children, defn);
		self.loader.defn_mut(defn).raw = vec![RawNode::Tag(RawTag {
			name: tag.name.clone(),
			attributes: tag.attributes.clone(),
			children,
		})];
	}

	/// Register a declaration, refusing duplicates. Names are lowercased to
	/// match the tag names produced by the markup parser.
	fn declare(&mut self, name: &str, params: Attributes) -> Option<DefnId> {
		let name = name.to_ascii_lowercase();
		let name = name.as_str();
		if self.loader.template(self.template).tags.contains_key(name) {
			self.error(format!("component `{name}` is declared more than once"));
			return None;
		}

		let defn = self.loader.add_defn(self.template, name, params);
		self.loader
			.template_mut(self.template)
			.tags
			.insert(name.to_string(), defn);
		Some(defn)
	}

	fn component(&mut self, tag: &Tag) {
		let Some(name) = tag.attributes.get("name") else {
			self.error("`<component>` is missing the `name` attribute");
			return;
		};

		let params = tag.attributes.without(&["name"]);
		if let Some(defn) = self.declare(name, params) {
			let raw = self.children(&tag.children, defn);
			self.loader.defn_mut(defn).raw = raw;
		}
	}

	fn import(&mut self, tag: &Tag, scope: Option<DefnId>) {
		let Some(src) = tag.attributes.get("src") else {
			self.error("`<import>` is missing the `src` attribute");
			return;
		};

		let imported = self.loader.use_template(src, &self.location);
		let imports = match scope {
			Some(defn) => &mut self.loader.defn_mut(defn).imports,
			None => &mut self.loader.template_mut(self.template).imports,
		};

		if !imports.contains(&imported) {
			imports.push(imported);
		}
	}

	/// Handle a `<link>`. Returns the node to keep in the body, if any.
	fn link(&mut self, tag: &Tag, scope: Option<DefnId>) -> Option<RawNode> {
		match tag.attributes.get("rel") {
			Some("stylesheet") => self.stylesheet_link(tag, scope),
			Some("test-data") => {
				self.test_data_link(tag);
				None
			}
			_ => Some(self.plain(tag, scope)),
		}
	}

	fn stylesheet_link(&mut self, tag: &Tag, scope: Option<DefnId>) -> Option<RawNode> {
		let Some(href) = tag.attributes.get("href") else {
			self.error("stylesheet `<link>` is missing the `href` attribute");
			return None;
		};

		let sheet = self.loader.import_css(href, &self.location);
		self.add_stylesheet(sheet);

		if tag.attributes.contains("inline") {
			let attributes = tag.attributes.without(&["rel", "href", "inline"]);
			return scope.map(|_| RawNode::Style(RawStyle { sheet, attributes }));
		}

		if let Some(defn) = scope.filter(|_| self.is_main) {
			return Some(self.plain(tag, Some(defn)));
		}

		let link = LinkTag {
			sheet,
			href: href.to_string(),
			attributes: tag.attributes.clone(),
		};
		match scope {
			Some(defn) => self.loader.defn_mut(defn).link_tags.push(link),
			None => self.loader.template_mut(self.template).link_tags.push(link),
		}
		None
	}

	fn test_data_link(&mut self, tag: &Tag) {
		let Some(href) = tag.attributes.get("href") else {
			self.error("test-data `<link>` is missing the `href` attribute");
			return;
		};

		let location = self.location.resolve_path(href);
		let template = self.loader.template_mut(self.template);
		if template.test_data.is_some() {
			self.warn(format!("ignoring additional test-data link `{href}`"));
			return;
		}

		template.test_data = Some(location);
	}

	/// Parse an inline `<style>` and record host markers. Returns the sheet
	/// reference to keep in the body.
	fn style(&mut self, tag: &Tag) -> Option<RawNode> {
		let mut source = String::new();
		for child in &tag.children {
			match child {
				Node::Text(text) => source.push_str(&text.text),
				Node::Tag(_) | Node::Fragment(_) => {
					self.error("`<style>` may only contain text");
					return None;
				}
			}
		}

		let from_component = !self.is_main;
		let sheet = self
			.loader
			.inline_sheet(&source, &self.location, from_component);
		self.add_stylesheet(sheet);

		if tag.attributes.contains(INLINE_FONTS) {
			self.host(INLINE_FONTS, sheet);
		}
		if tag.attributes.contains(COMPONENT_STYLES) {
			self.host(COMPONENT_STYLES, sheet);
		}

		Some(RawNode::Style(RawStyle {
			sheet,
			attributes: tag.attributes.without(&[INLINE_FONTS, COMPONENT_STYLES]),
		}))
	}

	fn host(&mut self, marker: &str, sheet: SheetId) {
		if !self.is_main {
			self.error(format!("`<style {marker}>` is only allowed in the main template"));
			return;
		}

		let template = self.loader.template_mut(self.template);
		let slot = if marker == INLINE_FONTS {
			&mut template.inline_fonts
		} else {
			&mut template.component_styles
		};

		if slot.is_some() {
			self.error(format!("more than one `<style {marker}>` host"));
			return;
		}

		*slot = Some(sheet);
	}

	fn add_stylesheet(&mut self, sheet: SheetId) {
		let stylesheets = &mut self.loader.template_mut(self.template).stylesheets;
		if !stylesheets.contains(&sheet) {
			stylesheets.push(sheet);
		}
	}

	/// Discover the body of `defn`, dropping elided nodes.
	fn children(&mut self, nodes: &[Node], defn: DefnId) -> Vec<RawNode> {
		let mut raw = Vec::with_capacity(nodes.len());

		for node in nodes {
			match node {
				Node::Fragment(fragment) => raw.extend(self.children(&fragment.children, defn)),
				Node::Text(text) => raw.push(RawNode::Text(text.clone())),
				Node::Tag(tag) => {
					let kept = match tag.name.as_str() {
						"import" => {
							self.import(tag, Some(defn));
							None
						}
						"component" => {
							self.component(tag);
							None
						}
						"link" => self.link(tag, Some(defn)),
						"style" => self.style(tag),
						_ => Some(self.plain(tag, Some(defn))),
					};
					raw.extend(kept);
				}
			}
		}

		raw
	}

	fn plain(&mut self, tag: &Tag, scope: Option<DefnId>) -> RawNode {
		let children = match scope {
			Some(defn) => self.children(&tag.children, defn),
			None => Vec::new(),
		};

		RawNode::Tag(RawTag {
			name: tag.name.clone(),
			attributes: tag.attributes.clone(),
			children,
		})
	}
}
