//! Global stylesheet rewrites that run once every sheet has loaded.

use std::collections::HashSet;
use std::path::Path;

use crate::ast::LoadState;
use crate::ast::SheetId;
use crate::css;
use crate::css::CssNode;
use crate::loader::LoadedGraph;
use crate::loader::Location;
use crate::loader::has_scheme;

/// Run the transforms whose host sheet was declared.
pub fn apply_style_transforms(graph: &mut LoadedGraph) {
	let inline_fonts = graph.templates.iter().find_map(|t| t.inline_fonts);
	let component_styles = graph.templates.iter().find_map(|t| t.component_styles);

	if let Some(host) = inline_fonts {
		inline_font_face_transform(graph, host);
	}

	if let Some(host) = component_styles {
		component_styles_transform(graph, host);
	}
}

/// Move every `@font-face` rule of every loaded sheet into `host`, keeping the
/// first copy of textually identical rules.
pub fn inline_font_face_transform(graph: &mut LoadedGraph, host: SheetId) {
	let Some(host_location) = valid_host(graph, host, "inline-fonts") else {
		return;
	};
	let site_root = graph.options.site_root.clone();

	let mut seen = HashSet::new();
	let mut collected = Vec::new();

	for index in 0..graph.sheets.len() {
		let sheet = &mut graph.sheets[index];
		if sheet.state != LoadState::Loaded {
			continue;
		}

		let location = sheet.location.clone();
		let Some(ast) = sheet.ast.as_mut().filter(|ast| ast.rules().is_some()) else {
			let file = sheet.file();
			graph
				.diagnostics
				.error(Some(&file), "cannot collect font faces: stylesheet is invalid");
			continue;
		};

		for mut rule in css::extract(ast, &|node| node.is_at_rule("font-face")) {
			rebase(&mut rule, &location, &host_location, &site_root);
			if seen.insert(css::translate(&rule)) {
				collected.push(rule);
			}
		}
	}

	graph.diagnostics.debug(
		Some(&host_location.to_string()),
		format!("inlined {} font faces", collected.len()),
	);
	append_rules(graph, host, collected);
}

/// Move every rule of every component sheet into `host`.
pub fn component_styles_transform(graph: &mut LoadedGraph, host: SheetId) {
	let Some(host_location) = valid_host(graph, host, "component-styles") else {
		return;
	};
	let site_root = graph.options.site_root.clone();

	let mut collected = Vec::new();

	for sheet in &mut graph.sheets {
		if !sheet.from_component || sheet.id == host || sheet.state != LoadState::Loaded {
			continue;
		}

		let location = sheet.location.clone();
		let Some(rules) = sheet.ast.as_mut().and_then(CssNode::rules_mut) else {
			let file = sheet.file();
			graph
				.diagnostics
				.error(Some(&file), "cannot move component styles: stylesheet is invalid");
			continue;
		};

		for mut rule in std::mem::take(rules) {
			rebase(&mut rule, &location, &host_location, &site_root);
			collected.push(rule);
		}
	}

	graph.diagnostics.debug(
		Some(&host_location.to_string()),
		format!("moved {} component rules", collected.len()),
	);
	append_rules(graph, host, collected);
}

/// The host's location, or `None` after reporting when its ast cannot
/// receive rules.
fn valid_host(graph: &mut LoadedGraph, host: SheetId, marker: &str) -> Option<Location> {
	let sheet = &graph.sheets[host.0];
	if sheet.ast.as_ref().and_then(CssNode::rules).is_some() {
		return Some(sheet.location.clone());
	}

	let file = sheet.file();
	graph.diagnostics.error(
		Some(&file),
		format!("the `<style {marker}>` host does not contain a valid stylesheet"),
	);
	None
}

fn append_rules(graph: &mut LoadedGraph, host: SheetId, collected: Vec<CssNode>) {
	if let Some(rules) = graph.sheets[host.0].ast.as_mut().and_then(CssNode::rules_mut) {
		rules.extend(collected);
	}
}

/// Rewrite the relative urls of a rule moving from `from` into a sheet at
/// `to`.
fn rebase(rule: &mut CssNode, from: &Location, to: &Location, site_root: &Path) {
	if from == to {
		return;
	}

	css::rewrite_urls(rule, &mut |url| rebase_url(url, from, site_root));
}

/// The absolute form of `url` as seen from `from`, or `None` when it is
/// already location independent.
pub(crate) fn rebase_url(url: &str, from: &Location, site_root: &Path) -> Option<String> {
	if url.is_empty()
		|| has_scheme(url)
		|| url.starts_with('/')
		|| url.starts_with('#')
	{
		return None;
	}

	let suffix = url.find(['?', '#']).map_or("", |start| &url[start..]);

	match from.resolve_url(url, site_root) {
		Location::Remote(resolved) => Some(resolved),
		Location::File(path) => {
			let rebased = match path.strip_prefix(site_root) {
				Ok(relative) => {
					let segments: Vec<_> = relative
						.components()
						.map(|component| component.as_os_str().to_string_lossy())
						.collect();
					format!("/{}", segments.join("/"))
				}
				Err(_) => path.display().to_string(),
			};
			Some(format!("{rebased}{suffix}"))
		}
	}
}
