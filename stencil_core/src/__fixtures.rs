use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::ast::TagDefn;
use crate::ast::TplNode;
use crate::compiler::Compiler;
use crate::compiler::Program;
use crate::config::CompileOptions;
use crate::diagnostics::Severity;
use crate::error::StencilError;
use crate::error::StencilResult;
use crate::loader::Location;
use crate::loader::ResourceReader;

/// Site root every in-memory project lives under.
pub const ROOT: &str = "/site";

/// Serves files from memory and counts how often each one is read.
#[derive(Debug, Default)]
pub struct MemoryReader {
	files: HashMap<Location, String>,
	reads: Rc<RefCell<HashMap<Location, usize>>>,
}

impl MemoryReader {
	/// Files are given relative to [`ROOT`]; `https://` urls are kept as is.
	pub fn new(files: &[(&str, &str)]) -> Self {
		let files = files
			.iter()
			.map(|(path, contents)| (location(path), (*contents).to_string()))
			.collect();

		Self {
			files,
			reads: Rc::default(),
		}
	}

	pub fn reads(&self) -> ReadLog {
		ReadLog(Rc::clone(&self.reads))
	}
}

impl ResourceReader for MemoryReader {
	fn read(&self, location: &Location) -> StencilResult<String> {
		*self.reads.borrow_mut().entry(location.clone()).or_default() += 1;

		self.files.get(location).cloned().ok_or_else(|| {
			StencilError::Read {
				location: location.to_string(),
				reason: "not found".to_string(),
			}
		})
	}
}

/// Shared view of the read counts of a [`MemoryReader`].
#[derive(Debug, Clone)]
pub struct ReadLog(Rc<RefCell<HashMap<Location, usize>>>);

impl ReadLog {
	pub fn count(&self, path: &str) -> usize {
		self.0.borrow().get(&location(path)).copied().unwrap_or(0)
	}

	pub fn total(&self) -> usize {
		self.0.borrow().values().sum()
	}
}

pub fn location(path: &str) -> Location {
	if path.contains("://") {
		Location::Remote(path.to_string())
	} else {
		Location::file(Path::new(ROOT).join(path))
	}
}

pub fn compiler(files: &[(&str, &str)]) -> (Compiler, ReadLog) {
	let reader = MemoryReader::new(files);
	let reads = reader.reads();
	let compiler = Compiler::new(CompileOptions::new(ROOT)).with_reader(reader);

	(compiler, reads)
}

/// Compile an in-memory project whose entry is `index.html`.
pub fn compile(files: &[(&str, &str)]) -> Program {
	let (compiler, _) = compiler(files);
	compiler.compile(&Path::new(ROOT).join("index.html"))
}

/// A main template with a doctype, whole-file imports of `imports` and the
/// given `<body>` content.
pub fn page(imports: &[&str], body: &str) -> String {
	let imports: String = imports
		.iter()
		.map(|src| format!("<import src=\"{src}\" />\n"))
		.collect();

	format!("<!DOCTYPE html>\n{imports}<html lang=\"en\"><body>{body}</body></html>\n")
}

/// The declaration `name` in the template at `path`.
pub fn defn<'p>(program: &'p Program, path: &str, name: &str) -> &'p TagDefn {
	let template = program
		.find_template(&location(path))
		.unwrap_or_else(|| panic!("template `{path}` was not loaded"));

	program
		.lookup(template, name)
		.unwrap_or_else(|| panic!("`{path}` does not declare `{name}`"))
}

/// The `<body>` children of the main `<html>` declaration.
pub fn body(program: &Program) -> &[TplNode] {
	let html = program
		.html()
		.unwrap_or_else(|| panic!("no html declaration"));
	let Some(TplNode::Tag(root)) = html.nodes.first() else {
		panic!("html declaration does not start with a tag: {:?}", html.nodes);
	};

	root.children
		.iter()
		.find_map(|node| {
			match node {
				TplNode::Tag(tag) if tag.name == "body" => Some(tag.children.as_slice()),
				_ => None,
			}
		})
		.unwrap_or_else(|| panic!("no body in {:?}", root.children))
}

/// Nodes that are not whitespace-only text.
pub fn significant(nodes: &[TplNode]) -> Vec<&TplNode> {
	nodes
		.iter()
		.filter(|node| !node.is_whitespace_text())
		.collect()
}

pub fn messages(program: &Program, severity: Severity) -> Vec<String> {
	program
		.diagnostics()
		.of(severity)
		.map(|diagnostic| diagnostic.message.clone())
		.collect()
}
