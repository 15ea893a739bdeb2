//! Template and stylesheet caches plus the load queue.
//!
//! Everything referenced during discovery is created as an empty proxy, cached
//! synchronously and queued for loading in the same call. The queue is a
//! work-list: jobs may enqueue more jobs, and [`Loader::run`] only returns once
//! nothing is left. Consuming the loader into a [`LoadedGraph`] is the barrier
//! after which populated fields may be read.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use serde::Serialize;
use serde::Serializer;

use crate::StencilError;
use crate::StencilResult;
use crate::ast::DefnId;
use crate::ast::LoadState;
use crate::ast::SheetId;
use crate::ast::StyleSheet;
use crate::ast::TagDefn;
use crate::ast::Template;
use crate::ast::TemplateId;
use crate::config::CompileOptions;
use crate::css;
use crate::css::CssNode;
use crate::css::CssParseOptions;
use crate::css::CssParser;
use crate::diagnostics::Diagnostics;
use crate::discovery;
use crate::markup::Attributes;
use crate::markup::MarkupParser;

/// The canonical identity of a loadable resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
	/// An absolute, lexically normalised file path.
	File(PathBuf),
	/// A url with a scheme, used verbatim.
	Remote(String),
}

impl fmt::Display for Location {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::File(path) => write!(f, "{}", path.display()),
			Self::Remote(url) => f.write_str(url),
		}
	}
}

impl Serialize for Location {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.collect_str(self)
	}
}

impl Location {
	/// A file location. The path is normalised but not touched on disk.
	pub fn file(path: impl AsRef<Path>) -> Self {
		Self::File(normalize_path(path.as_ref()))
	}

	/// Resolve a template reference relative to this location's directory.
	pub fn resolve_path(&self, reference: &str) -> Location {
		match self {
			Self::File(path) => {
				let reference = Path::new(reference);
				if reference.is_absolute() {
					Self::file(reference)
				} else {
					Self::file(parent_dir(path).join(reference))
				}
			}
			Self::Remote(base) => Self::Remote(join_url(base, reference)),
		}
	}

	/// Resolve a stylesheet url. Urls with a scheme are remote and kept
	/// as-is, `/…` urls resolve against `site_root` and everything else is
	/// relative to this location.
	pub fn resolve_url(&self, url: &str, site_root: &Path) -> Location {
		if has_scheme(url) {
			return Self::Remote(url.to_string());
		}

		if url.starts_with("//") {
			return Self::Remote(format!("https:{url}"));
		}

		match self {
			Self::Remote(base) => Self::Remote(join_url(base, url)),
			Self::File(path) => {
				let url = strip_query(url);
				match url.strip_prefix('/') {
					Some(rooted) => Self::file(site_root.join(rooted)),
					None => Self::file(parent_dir(path).join(url)),
				}
			}
		}
	}
}

fn parent_dir(path: &Path) -> &Path {
	path.parent().unwrap_or(path)
}

/// Whether `url` starts with a scheme such as `https:` or `data:`. Single
/// letter schemes are treated as drive letters.
pub(crate) fn has_scheme(url: &str) -> bool {
	let Some(colon) = url.find(':') else {
		return false;
	};
	let scheme = &url[..colon];

	scheme.len() > 1
		&& scheme.starts_with(|c: char| c.is_ascii_alphabetic())
		&& scheme
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn strip_query(url: &str) -> &str {
	url.find(['?', '#']).map_or(url, |end| &url[..end])
}

/// Lexically resolve `.` and `..` components.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
	let mut normalized = PathBuf::new();

	for component in path.components() {
		match component {
			Component::CurDir => {}
			Component::ParentDir => {
				if !normalized.pop() {
					normalized.push(component);
				}
			}
			_ => normalized.push(component),
		}
	}

	normalized
}

/// Resolve `reference` against the remote url `base`.
fn join_url(base: &str, reference: &str) -> String {
	if has_scheme(reference) {
		return reference.to_string();
	}

	let scheme_end = base.find("://").map_or(0, |index| index + 3);
	let origin_end = base[scheme_end..]
		.find('/')
		.map_or(base.len(), |index| scheme_end + index);

	if reference.starts_with("//") {
		let scheme = base.find(':').map_or("https", |index| &base[..index]);
		return format!("{scheme}:{reference}");
	}

	let (origin, path) = base.split_at(origin_end);
	let joined = if reference.starts_with('/') {
		reference.to_string()
	} else {
		let path = strip_query(path);
		let directory = path.rfind('/').map_or("/", |index| &path[..=index]);
		format!("{directory}{reference}")
	};

	let mut segments: Vec<&str> = Vec::new();
	for segment in joined.split('/').skip(1) {
		match segment {
			"." => {}
			".." => {
				segments.pop();
			}
			_ => segments.push(segment),
		}
	}

	format!("{origin}/{}", segments.join("/"))
}

/// Supplies the contents of templates, stylesheets and data files.
pub trait ResourceReader {
	fn read(&self, location: &Location) -> StencilResult<String>;
}

/// Reads files from disk. Remote locations are not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

impl ResourceReader for FsReader {
	fn read(&self, location: &Location) -> StencilResult<String> {
		match location {
			Location::File(path) => {
				std::fs::read_to_string(path).map_err(|e| StencilError::Read {
					location: location.to_string(),
					reason: e.to_string(),
				})
			}
			Location::Remote(url) => Err(StencilError::RemoteUnsupported(url.clone())),
		}
	}
}

/// A unit of work in the load queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadJob {
	Template(TemplateId),
	StyleSheet(SheetId),
}

/// FIFO work-list of pending loads.
#[derive(Debug, Default)]
pub struct LoadQueue {
	pending: VecDeque<LoadJob>,
	completed: usize,
}

impl LoadQueue {
	pub fn push(&mut self, job: LoadJob) {
		self.pending.push_back(job);
	}

	fn pop(&mut self) -> Option<LoadJob> {
		let job = self.pending.pop_front()?;
		self.completed += 1;
		Some(job)
	}

	/// Number of jobs taken off the queue so far.
	pub fn completed(&self) -> usize {
		self.completed
	}
}

/// Phase-one compilation state: the caches, the queue and the diagnostics.
pub struct Loader<'c> {
	options: CompileOptions,
	reader: &'c dyn ResourceReader,
	markup: &'c dyn MarkupParser,
	css: &'c dyn CssParser,
	templates: Vec<Template>,
	template_index: HashMap<Location, TemplateId>,
	sheets: Vec<StyleSheet>,
	sheet_index: HashMap<Location, SheetId>,
	defns: Vec<TagDefn>,
	queue: LoadQueue,
	diagnostics: Diagnostics,
	main: Option<TemplateId>,
}

impl<'c> Loader<'c> {
	pub fn new(
		options: CompileOptions,
		reader: &'c dyn ResourceReader,
		markup: &'c dyn MarkupParser,
		css: &'c dyn CssParser,
	) -> Self {
		let diagnostics = Diagnostics::new(options.lints);

		Self {
			options,
			reader,
			markup,
			css,
			templates: Vec::new(),
			template_index: HashMap::new(),
			sheets: Vec::new(),
			sheet_index: HashMap::new(),
			defns: Vec::new(),
			queue: LoadQueue::default(),
			diagnostics,
			main: None,
		}
	}

	/// Register the entry template. Only the first call marks a template as
	/// main.
	pub fn use_main(&mut self, location: Location) -> TemplateId {
		if let Some(id) = self.main {
			return id;
		}

		let id = self.register_template(location, "<entry>".to_string(), true);
		self.main = Some(id);
		id
	}

	/// Resolve `path` against `used_from` and return its template, creating
	/// and queueing it when it has not been seen before.
	pub fn use_template(&mut self, path: &str, used_from: &Location) -> TemplateId {
		let location = used_from.resolve_path(path);
		self.register_template(location, used_from.to_string(), false)
	}

	fn register_template(&mut self, location: Location, used_from: String, is_main: bool) -> TemplateId {
		if let Some(&id) = self.template_index.get(&location) {
			self.templates[id.0].used_from.push(used_from);
			return id;
		}

		let id = TemplateId(self.templates.len());
		self.template_index.insert(location.clone(), id);
		self.templates
			.push(Template::new(id, location, used_from, is_main));
		self.queue.push(LoadJob::Template(id));
		id
	}

	/// Resolve `url` against `used_from` and return its stylesheet, creating
	/// and queueing it when it has not been seen before.
	pub fn import_css(&mut self, url: &str, used_from: &Location) -> SheetId {
		let location = used_from.resolve_url(url, &self.options.site_root);
		if let Some(&id) = self.sheet_index.get(&location) {
			self.sheets[id.0].used_from.push(used_from.to_string());
			return id;
		}

		let id = SheetId(self.sheets.len());
		self.sheet_index.insert(location.clone(), id);
		self.sheets
			.push(StyleSheet::new(id, location, used_from.to_string()));
		self.queue.push(LoadJob::StyleSheet(id));
		id
	}

	/// Parse an inline `<style>` body into a new, never shared stylesheet.
	pub fn inline_sheet(&mut self, source: &str, used_from: &Location, from_component: bool) -> SheetId {
		let id = SheetId(self.sheets.len());
		let mut sheet = StyleSheet::new(id, used_from.clone(), used_from.to_string());
		sheet.from_component = from_component;
		self.sheets.push(sheet);

		let file = used_from.to_string();
		let ast = self.parse_css(source, &file);
		self.finish_sheet(id, ast);
		id
	}

	/// Drain the queue until no job is left, including jobs queued by other
	/// jobs.
	pub fn run(mut self) -> LoadedGraph {
		while let Some(job) = self.queue.pop() {
			match job {
				LoadJob::Template(id) => self.load_template(id),
				LoadJob::StyleSheet(id) => self.load_sheet(id),
			}
		}

		self.diagnostics.debug(
			None,
			format!(
				"load queue drained after {} jobs ({} templates, {} stylesheets)",
				self.queue.completed(),
				self.templates.len(),
				self.sheets.len()
			),
		);

		LoadedGraph {
			options: self.options,
			templates: self.templates,
			sheets: self.sheets,
			defns: self.defns,
			diagnostics: self.diagnostics,
			main: self.main,
		}
	}

	fn load_template(&mut self, id: TemplateId) {
		let location = self.templates[id.0].location.clone();
		let file = location.to_string();
		self.diagnostics.debug(Some(&file), "loading template");

		let fragment = self
			.reader
			.read(&location)
			.and_then(|source| self.markup.parse(&source, &file));
		let fragment = match fragment {
			Ok(fragment) => fragment,
			Err(e) => {
				self.templates[id.0].state = LoadState::Failed;
				self.diagnostics.error(Some(&file), e.to_string());
				return;
			}
		};

		self.templates[id.0].state = LoadState::Loaded;
		discovery::discover(self, id, &fragment);
	}

	fn load_sheet(&mut self, id: SheetId) {
		let location = self.sheets[id.0].location.clone();
		let file = location.to_string();
		self.diagnostics.debug(Some(&file), "loading stylesheet");

		match self.reader.read(&location) {
			Ok(source) => {
				let ast = self.parse_css(&source, &file);
				self.finish_sheet(id, ast);
			}
			Err(e) => {
				self.sheets[id.0].state = LoadState::Failed;
				self.diagnostics.error(Some(&file), e.to_string());
			}
		}
	}

	fn parse_css(&mut self, source: &str, file: &str) -> Option<CssNode> {
		let mut problems = Vec::new();
		let parsed = self.css.parse(
			source,
			&CssParseOptions { tolerant: true },
			&mut |error| problems.push(error),
		);

		for problem in problems {
			self.diagnostics.warn(Some(file), format!("css: {problem}"));
		}

		match parsed {
			Ok(ast) => Some(ast),
			Err(e) => {
				self.diagnostics.error(Some(file), format!("css: {e}"));
				None
			}
		}
	}

	/// Store a parsed sheet and queue the sheets it `@import`s.
	fn finish_sheet(&mut self, id: SheetId, ast: Option<CssNode>) {
		let Some(ast) = ast else {
			self.sheets[id.0].state = LoadState::Failed;
			return;
		};

		let mut urls = Vec::new();
		css::walk(&ast, &mut |node| {
			if let Some(url) = node.import_url() {
				urls.push(url);
			}
		});

		let location = self.sheets[id.0].location.clone();
		let imports: Vec<SheetId> = urls
			.iter()
			.map(|url| self.import_css(url, &location))
			.collect();

		let sheet = &mut self.sheets[id.0];
		sheet.ast = Some(ast);
		sheet.imports = imports;
		sheet.state = LoadState::Loaded;
	}

	pub(crate) fn diagnostics(&mut self) -> &mut Diagnostics {
		&mut self.diagnostics
	}

	pub(crate) fn template(&self, id: TemplateId) -> &Template {
		&self.templates[id.0]
	}

	pub(crate) fn template_mut(&mut self, id: TemplateId) -> &mut Template {
		&mut self.templates[id.0]
	}

	pub(crate) fn defn_mut(&mut self, id: DefnId) -> &mut TagDefn {
		&mut self.defns[id.0]
	}

	/// Create a component declaration owned by `template`. Registering the
	/// name in the template is up to the caller.
	pub(crate) fn add_defn(&mut self, template: TemplateId, name: &str, params: Attributes) -> DefnId {
		let id = DefnId(self.defns.len());
		self.defns.push(TagDefn {
			id,
			template,
			name: name.to_string(),
			raw: Vec::new(),
			params,
			nodes: Vec::new(),
			imports: Vec::new(),
			link_tags: Vec::new(),
		});
		id
	}
}

/// The fully settled load graph. Only obtainable by draining a [`Loader`].
#[derive(Debug)]
pub struct LoadedGraph {
	pub(crate) options: CompileOptions,
	pub(crate) templates: Vec<Template>,
	pub(crate) sheets: Vec<StyleSheet>,
	pub(crate) defns: Vec<TagDefn>,
	pub(crate) diagnostics: Diagnostics,
	pub(crate) main: Option<TemplateId>,
}

impl LoadedGraph {
	pub fn main(&self) -> Option<TemplateId> {
		self.main
	}

	pub fn template(&self, id: TemplateId) -> &Template {
		&self.templates[id.0]
	}

	pub fn templates(&self) -> &[Template] {
		&self.templates
	}

	/// Find a template by its location.
	pub fn find_template(&self, location: &Location) -> Option<&Template> {
		self.templates
			.iter()
			.find(|template| &template.location == location)
	}

	pub fn sheet(&self, id: SheetId) -> &StyleSheet {
		&self.sheets[id.0]
	}

	pub fn sheets(&self) -> &[StyleSheet] {
		&self.sheets
	}

	pub fn defn(&self, id: DefnId) -> &TagDefn {
		&self.defns[id.0]
	}

	pub fn defns(&self) -> &[TagDefn] {
		&self.defns
	}

	pub fn diagnostics(&self) -> &Diagnostics {
		&self.diagnostics
	}
}
