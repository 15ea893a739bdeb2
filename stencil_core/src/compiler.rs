//! The compilation session and the program it produces.

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;

use crate::StencilError;
use crate::StencilResult;
use crate::ast::DefnId;
use crate::ast::LinkTag;
use crate::ast::SheetId;
use crate::ast::StyleSheet;
use crate::ast::TagDefn;
use crate::ast::Template;
use crate::ast::TemplateId;
use crate::ast::TplNode;
use crate::config::CompileOptions;
use crate::config::StencilConfig;
use crate::css::CssParser;
use crate::css::DefaultCssParser;
use crate::diagnostics::Diagnostics;
use crate::loader::FsReader;
use crate::loader::LoadedGraph;
use crate::loader::Loader;
use crate::loader::Location;
use crate::loader::ResourceReader;
use crate::loader::normalize_path;
use crate::markup::HtmlParser;
use crate::markup::MarkupParser;
use crate::scope::build_scopes;
use crate::transforms::apply_style_transforms;

/// A compilation session. Each call to [`Compiler::compile`] starts from
/// empty caches, so independent compilations never share state.
pub struct Compiler {
	options: CompileOptions,
	reader: Box<dyn ResourceReader>,
	markup: Box<dyn MarkupParser>,
	css: Box<dyn CssParser>,
}

impl Compiler {
	/// A compiler that reads from disk with the default parsers.
	pub fn new(mut options: CompileOptions) -> Self {
		options.site_root = absolute(&options.site_root);

		Self {
			options,
			reader: Box::new(FsReader),
			markup: Box::new(HtmlParser),
			css: Box::new(DefaultCssParser),
		}
	}

	#[must_use]
	pub fn with_reader(mut self, reader: impl ResourceReader + 'static) -> Self {
		self.reader = Box::new(reader);
		self
	}

	#[must_use]
	pub fn with_markup_parser(mut self, parser: impl MarkupParser + 'static) -> Self {
		self.markup = Box::new(parser);
		self
	}

	#[must_use]
	pub fn with_css_parser(mut self, parser: impl CssParser + 'static) -> Self {
		self.css = Box::new(parser);
		self
	}

	pub fn options(&self) -> &CompileOptions {
		&self.options
	}

	/// Run discovery from `entry` until every referenced resource has loaded.
	pub fn load(&self, entry: &Path) -> LoadedGraph {
		let mut loader = Loader::new(
			self.options.clone(),
			self.reader.as_ref(),
			self.markup.as_ref(),
			self.css.as_ref(),
		);
		loader.use_main(Location::File(absolute(entry)));
		loader.run()
	}

	/// Compile the template at `entry` and everything it references.
	///
	/// Problems are reported through [`Program::diagnostics`]; a best effort
	/// program is always returned.
	pub fn compile(&self, entry: &Path) -> Program {
		let mut graph = self.load(entry);
		apply_style_transforms(&mut graph);
		build_scopes(&mut graph);
		let test_data = self.load_test_data(&mut graph);

		let program = Program {
			main: graph.main,
			templates: graph.templates,
			sheets: graph.sheets,
			defns: graph.defns,
			diagnostics: graph.diagnostics,
			test_data,
		};
		tracing::debug!(
			errors = program.diagnostics.num_errors(),
			warnings = program.diagnostics.num_warnings(),
			"compiled {}",
			entry.display()
		);
		program
	}

	fn load_test_data(&self, graph: &mut LoadedGraph) -> Option<serde_json::Value> {
		let main = graph.main?;
		let template = &graph.templates[main.0];
		let location = template.test_data.clone()?;
		let file = template.file();

		let parsed = self.reader.read(&location).and_then(|source| {
			serde_json::from_str(&source).map_err(|e| {
				StencilError::TestData {
					path: location.to_string(),
					reason: e.to_string(),
				}
			})
		});

		match parsed {
			Ok(value) => Some(value),
			Err(e) => {
				graph.diagnostics.error(Some(&file), e.to_string());
				None
			}
		}
	}
}

fn absolute(path: &Path) -> std::path::PathBuf {
	let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
	normalize_path(&path)
}

/// Compile `entry` (relative to `root`) using the `stencil.toml` found at
/// `root`, if any.
pub fn compile_project(root: &Path, entry: &Path) -> StencilResult<Program> {
	let config = StencilConfig::load(root)?;
	let options = CompileOptions::from_config(root, config.as_ref());
	let compiler = Compiler::new(options);

	Ok(compiler.compile(&root.join(entry)))
}

/// The compiled output: every template and component with its body compiled,
/// plus the diagnostics collected on the way.
#[derive(Debug, Serialize)]
pub struct Program {
	main: Option<TemplateId>,
	templates: Vec<Template>,
	sheets: Vec<StyleSheet>,
	defns: Vec<TagDefn>,
	diagnostics: Diagnostics,
	test_data: Option<serde_json::Value>,
}

impl Program {
	/// The entry template.
	pub fn main(&self) -> Option<&Template> {
		self.main.map(|id| self.template(id))
	}

	/// The `<html>` declaration of the entry template.
	pub fn html(&self) -> Option<&TagDefn> {
		let id = self.main()?.tags.get("html")?;
		Some(self.defn(*id))
	}

	pub fn template(&self, id: TemplateId) -> &Template {
		&self.templates[id.0]
	}

	pub fn templates(&self) -> &[Template] {
		&self.templates
	}

	pub fn find_template(&self, location: &Location) -> Option<&Template> {
		self.templates
			.iter()
			.find(|template| &template.location == location)
	}

	pub fn defn(&self, id: DefnId) -> &TagDefn {
		&self.defns[id.0]
	}

	pub fn defns(&self) -> &[TagDefn] {
		&self.defns
	}

	/// The declaration `name` of `template`.
	pub fn lookup(&self, template: &Template, name: &str) -> Option<&TagDefn> {
		template.tags.get(name).map(|id| self.defn(*id))
	}

	pub fn sheet(&self, id: SheetId) -> &StyleSheet {
		&self.sheets[id.0]
	}

	pub fn sheets(&self) -> &[StyleSheet] {
		&self.sheets
	}

	pub fn diagnostics(&self) -> &Diagnostics {
		&self.diagnostics
	}

	pub fn num_errors(&self) -> usize {
		self.diagnostics.num_errors()
	}

	pub fn num_warnings(&self) -> usize {
		self.diagnostics.num_warnings()
	}

	/// The parsed `<link rel="test-data">` document of the entry template.
	pub fn test_data(&self) -> Option<&serde_json::Value> {
		self.test_data.as_ref()
	}

	/// Every hoisted stylesheet link needed by a page rendered from `root`,
	/// once per sheet, in the order components are first used.
	pub fn page_links(&self, root: DefnId) -> Vec<&LinkTag> {
		let mut links = Vec::new();
		let mut sheets = HashSet::new();
		let mut visited = HashSet::new();
		let mut templates = HashSet::new();

		self.collect_links(root, &mut visited, &mut templates, &mut |link| {
			if sheets.insert(link.sheet) {
				links.push(link);
			}
		});

		links
	}

	fn collect_links<'p>(
		&'p self,
		id: DefnId,
		visited: &mut HashSet<DefnId>,
		templates: &mut HashSet<TemplateId>,
		emit: &mut dyn FnMut(&'p LinkTag),
	) {
		if !visited.insert(id) {
			return;
		}

		let defn = self.defn(id);
		for link in &defn.link_tags {
			emit(link);
		}
		if templates.insert(defn.template) {
			for link in &self.template(defn.template).link_tags {
				emit(link);
			}
		}

		let mut stack: Vec<&TplNode> = defn.nodes.iter().rev().collect();
		while let Some(node) = stack.pop() {
			let children = match node {
				TplNode::Custom(custom) => {
					self.collect_links(custom.defn, visited, templates, emit);
					&custom.captured
				}
				TplNode::Tag(tag) => &tag.children,
				TplNode::Cond(cond) => &cond.children,
				TplNode::Repeat(repeat) => &repeat.children,
				TplNode::Text(_) | TplNode::Expression(_) => continue,
			};
			stack.extend(children.iter().rev());
		}
	}

	/// The program as pretty printed JSON.
	pub fn to_json(&self) -> StencilResult<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}
}
