use std::path::Path;
use std::path::PathBuf;

use rstest::rstest;
use similar_asserts::assert_eq;
use tracing_test::traced_test;

use super::__fixtures::*;
use super::*;
use crate::bindings::DirectiveError;
use crate::bindings::RepeatDirective;
use crate::bindings::parse_attribute;
use crate::bindings::parse_placeholders;
use crate::bindings::parse_repeat;
use crate::css::CssBlock;
use crate::css::CssNode;
use crate::css::CssParseError;
use crate::css::CssParseOptions;
use crate::css::CssParser;
use crate::css::DefaultCssParser;
use crate::markup::Attributes;
use crate::markup::Fragment;
use crate::markup::HtmlParser;
use crate::markup::MarkupParser;
use crate::markup::Node;
use crate::markup::Tag;
use crate::markup::Text;
use crate::transforms::rebase_url;

fn text(value: &str) -> TextFragment {
	TextFragment::Text(value.to_string())
}

fn expr(path: &str) -> TextFragment {
	TextFragment::Expression(Expression::parse(path))
}

fn write(root: &Path, path: &str, contents: &str) {
	let path = root.join(path);
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent).unwrap_or_else(|e| panic!("create dir: {e}"));
	}
	std::fs::write(&path, contents).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));
}

fn parse_css(source: &str) -> CssNode {
	DefaultCssParser
		.parse(source, &CssParseOptions::default(), &mut |_| {})
		.unwrap_or_else(|e| panic!("css: {e}"))
}

#[rstest]
#[case::surrounded("a{b}c", vec![text("a"), expr("b"), text("c")])]
#[case::only_expression("{b}", vec![expr("b")])]
#[case::only_text("abc", vec![text("abc")])]
#[case::empty("", vec![])]
#[case::trimmed_path("{ user . name }!", vec![expr("user.name"), text("!")])]
#[case::adjacent("{a}{b}", vec![expr("a"), expr("b")])]
#[case::escaped_braces("{{literal}}", vec![text("{literal}")])]
#[case::lone_close("a } b", vec![text("a } b")])]
#[case::empty_placeholder("x{}y", vec![text("x{}y")])]
#[case::unterminated("a{b", vec![text("a"), expr("b")])]
fn split_placeholders(#[case] input: &str, #[case] expected: Vec<TextFragment>) {
	assert_eq!(parse_placeholders(input), expected);
}

#[test]
fn expression_segments_are_trimmed() {
	let expression = Expression::parse(" user. address .city ");
	assert_eq!(expression.path, vec!["user", "address", "city"]);
	assert_eq!(expression.to_string(), "{user.address.city}");
}

#[rstest]
#[case::bare_expression("{x.y}", Binding::Expression(Expression::parse("x.y")))]
#[case::text_template("pre{x}post", Binding::Template(TextTemplate(vec![text("pre"), expr("x"), text("post")])))]
#[case::two_expressions("{a}{b}", Binding::Template(TextTemplate(vec![expr("a"), expr("b")])))]
#[case::plain("plain", Binding::Text("plain".to_string()))]
#[case::escaped("{{x}}", Binding::Text("{x}".to_string()))]
#[case::empty_braces("{}", Binding::Text("{}".to_string()))]
fn classify_attribute(#[case] value: &str, #[case] expected: Binding) {
	assert_eq!(parse_attribute(value), expected);
}

#[rstest]
#[case::simple("item in list", "item", "list")]
#[case::padded("  row in table.rows ", "row", "table.rows")]
#[case::braced("item in {items}", "item", "items")]
fn parse_valid_repeat(#[case] value: &str, #[case] alias: &str, #[case] each: &str) {
	let expected = RepeatDirective {
		alias: alias.to_string(),
		each: Expression::parse(each),
	};
	assert_eq!(parse_repeat(value), Ok(expected));
}

#[rstest]
#[case::no_separator("bad")]
#[case::two_separators("a in b in c")]
#[case::missing_alias(" in list")]
#[case::missing_iterable("item in ")]
fn parse_invalid_repeat(#[case] value: &str) {
	assert_eq!(
		parse_repeat(value),
		Err(DirectiveError::InvalidRepeat(value.to_string()))
	);
}

#[rstest]
#[case::relative("../components/card.html", "/site/components/card.html")]
#[case::sibling("./card.html", "/site/pages/card.html")]
#[case::absolute("/shared/card.html", "/shared/card.html")]
fn resolve_template_paths(#[case] reference: &str, #[case] expected: &str) {
	let from = Location::file("/site/pages/index.html");
	assert_eq!(from.resolve_path(reference), Location::file(expected));
}

#[rstest]
#[case::scheme("https://cdn.example.com/a.css", Location::Remote("https://cdn.example.com/a.css".to_string()))]
#[case::protocol_relative("//cdn.example.com/a.css", Location::Remote("https://cdn.example.com/a.css".to_string()))]
#[case::site_absolute("/css/site.css", Location::file("/site/css/site.css"))]
#[case::relative("./theme.css", Location::file("/site/pages/theme.css"))]
#[case::query_stripped("../fonts.css?v=2", Location::file("/site/fonts.css"))]
fn resolve_stylesheet_urls(#[case] url: &str, #[case] expected: Location) {
	let from = Location::file("/site/pages/index.html");
	assert_eq!(from.resolve_url(url, Path::new(ROOT)), expected);
}

#[test]
fn resolve_relative_to_remote_sheet() {
	let from = Location::Remote("https://cdn.example.com/css/main.css".to_string());
	assert_eq!(
		from.resolve_url("../fonts/a.css", Path::new(ROOT)),
		Location::Remote("https://cdn.example.com/fonts/a.css".to_string())
	);
}

#[rstest]
#[case::relative("fonts/a.woff2", "/site/css/x.css", Some("/css/fonts/a.woff2"))]
#[case::keeps_query("../img/a.png?v=1", "/site/css/x.css", Some("/img/a.png?v=1"))]
#[case::outside_site_root("a.png", "/other/x.css", Some("/other/a.png"))]
#[case::scheme("https://example.com/a.png", "/site/css/x.css", None)]
#[case::data("data:image/png;base64,AAAA", "/site/css/x.css", None)]
#[case::absolute("/a.png", "/site/css/x.css", None)]
#[case::protocol_relative("//cdn.example.com/a.png", "/site/css/x.css", None)]
#[case::fragment("#icon", "/site/css/x.css", None)]
fn rebase_moved_urls(#[case] url: &str, #[case] from: &str, #[case] expected: Option<&str>) {
	let rebased = rebase_url(url, &Location::file(from), Path::new(ROOT));
	assert_eq!(rebased.as_deref(), expected);
}

#[test]
fn namespace_keeps_first_registrant() {
	let mut namespace = Namespace::builtins();
	assert_eq!(namespace.get("import"), Some(Visible::Builtin));
	assert_eq!(namespace.get("component"), Some(Visible::Builtin));

	assert!(namespace.insert("x-card", Visible::Defn(DefnId(3))));
	assert!(namespace.insert("x-card", Visible::Defn(DefnId(3))));
	assert!(!namespace.insert("x-card", Visible::Defn(DefnId(7))));
	assert!(!namespace.insert("import", Visible::Defn(DefnId(7))));
	assert_eq!(namespace.get("x-card"), Some(Visible::Defn(DefnId(3))));
	assert_eq!(namespace.len(), 3);
}

#[test]
fn html_parser_builds_tree() -> StencilResult<()> {
	let source = "<!DOCTYPE html><!-- note --><DIV class=a id=\"b\" hidden>x &amp; y<br><img \
	              src=\"x.png\" /><p>open</div>";
	let fragment = HtmlParser.parse(source, "test.html")?;
	assert!(fragment.has_doctype);
	assert_eq!(fragment.children.len(), 1);

	let Node::Tag(div) = &fragment.children[0] else {
		panic!("expected a tag: {:?}", fragment.children);
	};
	assert_eq!(div.name, "div");
	assert_eq!(div.attributes.get("class"), Some("a"));
	assert_eq!(div.attributes.get("id"), Some("b"));
	assert_eq!(div.attributes.get("hidden"), Some(""));

	let names: Vec<&str> = div
		.children
		.iter()
		.map(|child| {
			match child {
				Node::Tag(tag) => tag.name.as_str(),
				Node::Text(text) => text.text.as_str(),
				Node::Fragment(_) => "fragment",
			}
		})
		.collect();
	assert_eq!(names, vec!["x & y", "br", "img", "p"]);

	Ok(())
}

#[test]
fn html_parser_keeps_raw_text_and_first_attribute() -> StencilResult<()> {
	let fragment = HtmlParser.parse(
		"<a href=\"1\" href=\"2\">x</a><script>if (a < b) { run(\"<b>\"); }</script>",
		"test.html",
	)?;
	assert!(!fragment.has_doctype);

	let [Node::Tag(anchor), Node::Tag(script)] = fragment.children.as_slice() else {
		panic!("unexpected children: {:?}", fragment.children);
	};
	assert_eq!(anchor.attributes.get("href"), Some("1"));
	assert_eq!(
		script.children,
		vec![Node::Text(Text::markup("if (a < b) { run(\"<b>\"); }"))]
	);

	Ok(())
}

#[test]
fn css_parser_keeps_nesting() {
	let sheet = parse_css(
		".a { color: red; }\n@media (min-width: 1px) { .b { x: y; } }\n@import 'x.css';",
	);
	let rules = sheet.rules().cloned().unwrap_or_default();
	assert_eq!(rules.len(), 3);
	assert_eq!(
		rules[1],
		CssNode::AtRule {
			name: "media".to_string(),
			prelude: "(min-width: 1px)".to_string(),
			block: Some(CssBlock::Rules(vec![CssNode::Rule {
				selector: ".b".to_string(),
				declarations: "x: y;".to_string(),
			}])),
		}
	);
	assert_eq!(rules[2].import_url().as_deref(), Some("x.css"));
	assert_eq!(
		css::translate(&sheet),
		".a { color: red; }\n@media (min-width: 1px) {\n.b { x: y; }\n}\n@import 'x.css';"
	);
}

#[test]
fn css_parser_strict_mode_fails_on_first_error() {
	let result = DefaultCssParser.parse(
		".a { color: red",
		&CssParseOptions { tolerant: false },
		&mut |_| {},
	);
	assert!(result.is_err());

	let mut problems = Vec::new();
	let result = DefaultCssParser.parse(
		".a { color: red",
		&CssParseOptions { tolerant: true },
		&mut |error| problems.push(error),
	);
	assert_eq!(result.ok(), Some(CssNode::empty_sheet()));
	assert_eq!(problems.len(), 1);
}

#[test]
fn css_extract_removes_nested_rules() {
	let mut sheet = parse_css(
		"@font-face { font-family: A; }\n@media print { @font-face { font-family: B; } .p { x: y; } }",
	);
	let removed = css::extract(&mut sheet, &|node| node.is_at_rule("font-face"));

	assert_eq!(removed.len(), 2);
	assert_eq!(css::translate(&sheet), "@media print {\n.p { x: y; }\n}");
}

#[test]
fn same_template_is_loaded_once() {
	let index = page(&["a.html", "b.html"], "<x-a></x-a><x-b></x-b>");
	let (compiler, reads) = compiler(&[
		("index.html", index.as_str()),
		("a.html", "<import src=\"b.html\" />\n<x-a><x-b></x-b></x-a>"),
		("b.html", "<x-b><p>b</p></x-b>"),
	]);
	let program = compiler.compile(&Path::new(ROOT).join("index.html"));

	assert_eq!(program.num_errors(), 0);
	assert_eq!(program.templates().len(), 3);
	assert_eq!(reads.count("b.html"), 1);
	assert_eq!(reads.total(), 3);

	let index = program.main().unwrap_or_else(|| panic!("no main template"));
	let a = program
		.find_template(&location("a.html"))
		.unwrap_or_else(|| panic!("a.html not loaded"));
	let b = program
		.find_template(&location("b.html"))
		.unwrap_or_else(|| panic!("b.html not loaded"));
	assert_eq!(index.imports, vec![a.id, b.id]);
	assert_eq!(a.imports, vec![b.id]);
	assert_eq!(b.used_from.len(), 2);
	assert_eq!(b.state, LoadState::Loaded);
}

#[test]
fn missing_template_stays_cached_and_empty() {
	let index = page(&["missing.html"], "<p>still here</p>");
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.num_errors(), 1);
	assert!(messages(&program, Severity::Error)[0].contains("missing.html"));

	let missing = program
		.find_template(&location("missing.html"))
		.unwrap_or_else(|| panic!("missing.html not cached"));
	assert_eq!(missing.state, LoadState::Failed);
	assert!(missing.tags.is_empty());
	assert!(program.html().is_some());
}

#[test]
fn colliding_imports_keep_first_definition() {
	let index = page(&["one.html", "two.html"], "<x-card></x-card>");
	let program = compile(&[
		("index.html", index.as_str()),
		("one.html", "<x-card><p>one</p></x-card>"),
		("two.html", "<x-card><p>two</p></x-card>"),
	]);

	let errors = messages(&program, Severity::Error);
	assert_eq!(errors.len(), 1, "{errors:?}");
	assert!(errors[0].contains("x-card"));

	let first = defn(&program, "one.html", "x-card");
	let nodes = significant(body(&program));
	let [TplNode::Custom(custom)] = nodes.as_slice() else {
		panic!("expected one custom tag: {:?}", body(&program));
	};
	assert_eq!(custom.defn, first.id);
}

#[test]
fn component_imports_take_precedence() {
	let index = format!(
		"{}<x-panel><import src=\"two.html\" /><x-card></x-card></x-panel>\n",
		page(&["one.html"], "<x-panel></x-panel>")
	);
	let program = compile(&[
		("index.html", index.as_str()),
		("one.html", "<x-card><p>one</p></x-card>"),
		("two.html", "<x-card><p>two</p></x-card>"),
	]);

	assert_eq!(program.num_errors(), 1);

	let panel = defn(&program, "index.html", "x-panel");
	let expected = defn(&program, "two.html", "x-card").id;
	let nodes = significant(&panel.nodes);
	let [TplNode::Custom(custom)] = nodes.as_slice() else {
		panic!("expected one custom tag: {:?}", panel.nodes);
	};
	assert_eq!(custom.defn, expected);
	assert_eq!(panel.imports.len(), 1);
}

#[test]
fn unknown_tag_is_reported_once_and_kept() {
	let index = page(&[], "<blorp>hi</blorp>");
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(
		messages(&program, Severity::Error),
		vec!["unknown tag `<blorp>`"]
	);
	assert_eq!(
		significant(body(&program)),
		vec![&TplNode::Tag(TplTag {
			name: "blorp".to_string(),
			binds: Binds::new(),
			children: vec![TplNode::Text(Text::new("hi"))],
		})]
	);
}

#[test]
fn deprecated_tag_is_a_warning() {
	let index = page(&[], "<center>old</center>");
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.num_errors(), 0);
	assert_eq!(
		messages(&program, Severity::Warning),
		vec!["`<center>` is deprecated"]
	);
}

#[test]
fn adjacent_styles_are_merged() {
	let index = page(
		&[],
		"<style>p { color: red; }</style>\n  <style>a { color: blue; }</style>",
	);
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.num_errors(), 0);
	assert_eq!(
		significant(body(&program)),
		vec![&TplNode::Tag(TplTag {
			name: "style".to_string(),
			binds: Binds::new(),
			children: vec![
				TplNode::Text(Text::markup("p { color: red; }")),
				TplNode::Text(Text::markup("a { color: blue; }")),
			],
		})]
	);
}

#[test]
fn styles_with_different_bindings_are_not_merged() {
	let index = page(
		&[],
		"<style>p { color: red; }</style><style media=\"print\">p { color: black; }</style>",
	);
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(significant(body(&program)).len(), 2);
}

#[test]
fn directives_wrap_styles() {
	let index = page(
		&[],
		"<style if=\"{dark}\">p { color: white; }</style>\n<link rel=\"stylesheet\" \
		 href=\"theme.css\" inline repeat=\"theme in themes\">\n<style>a { color: blue; }</style>",
	);
	let program = compile(&[
		("index.html", index.as_str()),
		("theme.css", "body { margin: 0; }"),
	]);

	let style = |css: &str| {
		TplNode::Tag(TplTag {
			name: "style".to_string(),
			binds: Binds::new(),
			children: vec![TplNode::Text(Text::markup(css))],
		})
	};

	assert_eq!(program.num_errors(), 0);
	assert_eq!(
		significant(body(&program)),
		vec![
			&TplNode::Cond(TplCond {
				condition: Expression::parse("dark"),
				children: vec![style("p { color: white; }")],
			}),
			&TplNode::Repeat(TplRepeat {
				alias: "theme".to_string(),
				each: Expression::parse("themes"),
				children: vec![style("body { margin: 0; }")],
			}),
			&style("a { color: blue; }"),
		]
	);
}

#[test]
fn repeat_wraps_condition() {
	let index = page(
		&[],
		"<ul><li repeat=\"item in items\" if=\"{item.visible}\">{item.name}</li></ul>",
	);
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.num_errors(), 0);
	let nodes = significant(body(&program));
	let [TplNode::Tag(list)] = nodes.as_slice() else {
		panic!("expected a list: {:?}", body(&program));
	};
	assert_eq!(
		list.children,
		vec![TplNode::Repeat(TplRepeat {
			alias: "item".to_string(),
			each: Expression::parse("items"),
			children: vec![TplNode::Cond(TplCond {
				condition: Expression::parse("item.visible"),
				children: vec![TplNode::Tag(TplTag {
					name: "li".to_string(),
					binds: Binds::new(),
					children: vec![TplNode::Expression(Expression::parse("item.name"))],
				})],
			})],
		})]
	);
}

#[test]
fn invalid_repeat_leaves_node_unwrapped() {
	let index = page(&[], "<p repeat=\"bad\">x</p>");
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.num_errors(), 1);
	let nodes = significant(body(&program));
	let [TplNode::Tag(tag)] = nodes.as_slice() else {
		panic!("expected a plain tag: {:?}", body(&program));
	};
	assert_eq!(tag.name, "p");
	assert!(tag.binds.is_empty());
}

#[test]
fn custom_tag_bindings_and_defaults() {
	let index = page(
		&["components.html"],
		"<x-button label=\"{cta.text}\" size=\"lg\"></x-button>",
	);
	let program = compile(&[
		("index.html", index.as_str()),
		(
			"components.html",
			"<component name=\"x-button\" label=\"Click\" kind=\"primary\"><button \
			 class=\"btn-{kind}\">{label}</button></component>",
		),
	]);

	assert_eq!(program.num_errors(), 0);
	assert_eq!(
		messages(&program, Severity::Warning),
		vec!["`<x-button>` has no parameter `size`; the attribute is dropped"]
	);

	let nodes = significant(body(&program));
	let [TplNode::Custom(button)] = nodes.as_slice() else {
		panic!("expected one custom tag: {:?}", body(&program));
	};
	assert_eq!(button.binds.len(), 2);
	assert_eq!(
		button.binds.get("label"),
		Some(&Binding::Expression(Expression::parse("cta.text")))
	);
	assert_eq!(
		button.binds.get("kind"),
		Some(&Binding::Text("primary".to_string()))
	);

	let mut binds = Binds::new();
	binds.insert(
		"class",
		Binding::Template(TextTemplate(vec![text("btn-"), expr("kind")])),
	);
	let declaration = defn(&program, "components.html", "x-button");
	assert_eq!(declaration.params.get("kind"), Some("primary"));
	assert_eq!(
		declaration.nodes,
		vec![TplNode::Tag(TplTag {
			name: "button".to_string(),
			binds,
			children: vec![TplNode::Expression(Expression::parse("label"))],
		})]
	);
}

#[test]
fn html_declaration_keeps_root_element() {
	let index = page(&[], "");
	let program = compile(&[("index.html", index.as_str())]);

	let html = program.html().unwrap_or_else(|| panic!("no html declaration"));
	assert!(html.params.is_empty());
	let [TplNode::Tag(root)] = html.nodes.as_slice() else {
		panic!("expected the html element: {:?}", html.nodes);
	};
	assert_eq!(root.name, "html");
	assert_eq!(
		root.binds.get("lang"),
		Some(&Binding::Text("en".to_string()))
	);
}

#[test]
fn script_text_is_verbatim() {
	let index = page(&[], "<script>if (a) { b(); }</script>");
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.diagnostics().entries().len(), 0);
	let nodes = significant(body(&program));
	let [TplNode::Tag(script)] = nodes.as_slice() else {
		panic!("expected a script: {:?}", body(&program));
	};
	assert_eq!(
		script.children,
		vec![TplNode::Text(Text::markup("if (a) { b(); }"))]
	);
}

#[test]
fn nested_components_are_registered_and_elided() {
	let index = page(&["outer.html"], "<x-outer></x-outer>");
	let program = compile(&[
		("index.html", index.as_str()),
		(
			"outer.html",
			"<component name=\"x-outer\"><component \
			 name=\"x-inner\"><i>in</i></component><x-inner></x-inner></component>",
		),
	]);

	assert_eq!(program.num_errors(), 0);
	let inner = defn(&program, "outer.html", "x-inner");
	let outer = defn(&program, "outer.html", "x-outer");
	let [TplNode::Custom(custom)] = outer.nodes.as_slice() else {
		panic!("expected the inner component: {:?}", outer.nodes);
	};
	assert_eq!(custom.defn, inner.id);
}

#[test]
fn discovery_reports_structural_errors() {
	let index = "<!DOCTYPE html>\n<import />\n<component>nameless</component>\n<component \
	             name=\"x-a\"></component>\n<component name=\"x-a\"></component>\n<html><body><link \
	             rel=\"stylesheet\"></body></html>\n";
	let program = compile(&[("index.html", index)]);

	assert_eq!(
		messages(&program, Severity::Error),
		vec![
			"`<import>` is missing the `src` attribute",
			"`<component>` is missing the `name` attribute",
			"component `x-a` is declared more than once",
			"stylesheet `<link>` is missing the `href` attribute",
		]
	);
}

#[rstest]
#[case::html_twice(
	"<!DOCTYPE html>\n<html><body></body></html>\n<html><body></body></html>\n",
	"component `html` is declared more than once"
)]
#[case::names_differing_in_case(
	"<!DOCTYPE html>\n<component name=\"X-A\"></component>\n<component \
	 name=\"x-a\"></component>\n<html><body></body></html>\n",
	"component `x-a` is declared more than once"
)]
fn duplicate_declarations_are_errors(#[case] index: &str, #[case] expected: &str) {
	let program = compile(&[("index.html", index)]);

	assert_eq!(messages(&program, Severity::Error), vec![expected]);
}

/// Yields a `<style>` holding an element, which the HTML parser never
/// produces.
struct StyleWithMarkupParser;

impl MarkupParser for StyleWithMarkupParser {
	fn parse(&self, _source: &str, _filename: &str) -> StencilResult<Fragment> {
		let bold = Node::Tag(Tag::new("b", Attributes::new(), Vec::new()));
		let style = Node::Tag(Tag::new("style", Attributes::new(), vec![bold]));
		let body = Node::Tag(Tag::new("body", Attributes::new(), vec![style]));
		let html = Node::Tag(Tag::new("html", Attributes::new(), vec![body]));

		Ok(Fragment {
			children: vec![html],
			has_doctype: true,
		})
	}
}

#[test]
fn style_with_markup_is_dropped() {
	let program = Compiler::new(CompileOptions::new(ROOT))
		.with_reader(MemoryReader::new(&[("index.html", "")]))
		.with_markup_parser(StyleWithMarkupParser)
		.compile(&Path::new(ROOT).join("index.html"));

	assert_eq!(
		messages(&program, Severity::Error),
		vec!["`<style>` may only contain text"]
	);
	assert!(significant(body(&program)).is_empty());
	let main = program.main().unwrap_or_else(|| panic!("no main template"));
	assert!(main.stylesheets.is_empty());
}

#[test]
fn component_names_are_lowercased() {
	let index = page(&["card.html"], "<MyCard></MyCard>");
	let program = compile(&[
		("index.html", index.as_str()),
		("card.html", "<component name=\"MyCard\"><p>card</p></component>"),
	]);

	assert_eq!(program.num_errors(), 0);
	let card = defn(&program, "card.html", "mycard");
	let nodes = significant(body(&program));
	let [TplNode::Custom(custom)] = nodes.as_slice() else {
		panic!("expected one custom tag: {:?}", body(&program));
	};
	assert_eq!(custom.defn, card.id);
	assert_eq!(custom.name, "mycard");
}

#[test]
fn top_level_links_of_the_main_template_are_hoisted() {
	let index = "<!DOCTYPE html>\n<link rel=\"stylesheet\" href=\"site.css\">\n<html><body></body></html>\n";
	let program = compile(&[("index.html", index), ("site.css", "body { margin: 0; }")]);

	assert!(
		program.diagnostics().entries().is_empty(),
		"{:?}",
		program.diagnostics().entries()
	);

	let main = program.main().unwrap_or_else(|| panic!("no main template"));
	assert_eq!(main.link_tags.len(), 1);
	assert_eq!(
		program.sheet(main.link_tags[0].sheet).location,
		location("site.css")
	);

	let html = program.html().unwrap_or_else(|| panic!("no html declaration"));
	let hrefs: Vec<&str> = program
		.page_links(html.id)
		.into_iter()
		.map(|link| link.href.as_str())
		.collect();
	assert_eq!(hrefs, vec!["site.css"]);
}

#[test]
fn html_outside_main_template_is_an_error() {
	let index = page(&["other.html"], "");
	let program = compile(&[
		("index.html", index.as_str()),
		("other.html", "<html><body></body></html>"),
	]);

	assert_eq!(
		messages(&program, Severity::Error),
		vec!["`<html>` is only allowed in the main template"]
	);
}

#[test]
fn stylesheet_links_are_hoisted_from_components() {
	let index = page(
		&["list.html", "card.html"],
		"<link rel=\"stylesheet\" href=\"/css/site.css\"><link rel=\"stylesheet\" \
		 href=\"print.css\" inline media=\"print\"><x-list></x-list><x-card></x-card>",
	);
	let (compiler, reads) = compiler(&[
		("index.html", index.as_str()),
		("css/site.css", "body { margin: 0; }"),
		("print.css", "p { color: black; }"),
		(
			"list.html",
			"<import src=\"card.html\" /><x-list><link rel=\"stylesheet\" \
			 href=\"list.css\"><ul><x-card></x-card></ul></x-list>",
		),
		(
			"card.html",
			"<component name=\"x-card\"><link rel=\"stylesheet\" href=\"card.css\"><div \
			 class=\"card\"></div></component>",
		),
		("list.css", "ul { padding: 0; }"),
		("card.css", ".card { padding: 1em; }"),
	]);
	let program = compiler.compile(&Path::new(ROOT).join("index.html"));

	assert_eq!(program.num_errors(), 0);
	assert_eq!(reads.count("card.css"), 1);
	assert_eq!(reads.count("css/site.css"), 1);

	let card = defn(&program, "card.html", "x-card");
	assert_eq!(card.link_tags.len(), 1);
	assert_eq!(card.link_tags[0].href, "card.css");
	assert_eq!(
		program.sheet(card.link_tags[0].sheet).location,
		location("card.css")
	);
	assert_eq!(significant(&card.nodes).len(), 1);

	let nodes = significant(body(&program));
	let [TplNode::Tag(site), TplNode::Tag(print), ..] = nodes.as_slice() else {
		panic!("unexpected body: {nodes:?}");
	};
	assert_eq!(site.name, "link");
	assert_eq!(print.name, "style");
	assert_eq!(
		print.binds.get("media"),
		Some(&Binding::Text("print".to_string()))
	);
	assert_eq!(
		print.children,
		vec![TplNode::Text(Text::markup("p { color: black; }"))]
	);

	let html = program.html().unwrap_or_else(|| panic!("no html declaration"));
	let hrefs: Vec<&str> = program
		.page_links(html.id)
		.into_iter()
		.map(|link| link.href.as_str())
		.collect();
	assert_eq!(hrefs, vec!["list.css", "card.css"]);
}

#[test]
fn stylesheet_imports_are_loaded() {
	let index = page(&[], "<style>@import \"reset.css\"; p { margin: 0; }</style>");
	let (compiler, reads) = compiler(&[
		("index.html", index.as_str()),
		("reset.css", "* { box-sizing: border-box; }"),
	]);
	let program = compiler.compile(&Path::new(ROOT).join("index.html"));

	assert_eq!(program.num_errors(), 0);
	assert_eq!(reads.count("reset.css"), 1);

	let main = program.main().unwrap_or_else(|| panic!("no main template"));
	let inline = program.sheet(main.stylesheets[0]);
	assert_eq!(inline.imports.len(), 1);
	assert_eq!(program.sheet(inline.imports[0]).state, LoadState::Loaded);
}

#[test]
fn css_problems_are_warnings() {
	let index = page(&[], "<style>.a { color: red</style>");
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(program.num_errors(), 0);
	assert_eq!(program.num_warnings(), 1);
	assert!(significant(body(&program)).is_empty());
}

#[test]
fn test_data_is_loaded_from_the_main_template() {
	let index = format!(
		"<link rel=\"test-data\" href=\"data.json\">\n<link rel=\"test-data\" \
		 href=\"other.json\">\n{}",
		page(&[], "")
	);
	let program = compile(&[
		("index.html", index.as_str()),
		("data.json", "{\"title\": \"Hello\"}"),
	]);

	assert_eq!(program.num_errors(), 0);
	assert_eq!(program.num_warnings(), 1);
	assert_eq!(
		program.test_data(),
		Some(&serde_json::json!({ "title": "Hello" }))
	);
}

#[test]
fn invalid_test_data_is_an_error() {
	let index = format!("<link rel=\"test-data\" href=\"data.json\">\n{}", page(&[], ""));
	let program = compile(&[("index.html", index.as_str()), ("data.json", "{ nope")]);

	assert_eq!(program.num_errors(), 1);
	assert!(program.test_data().is_none());
}

#[test]
fn advisory_lints() {
	let program = compile(&[
		("index.html", "stray words\n<import src=\"card.html\" /><html><body></body></html>"),
		("card.html", "<div class=\"x\"></div>"),
	]);

	let lints = messages(&program, Severity::Lint);
	assert_eq!(lints.len(), 3, "{lints:?}");
	assert!(lints.iter().any(|lint| lint.contains("<!DOCTYPE html>")));
	assert!(lints.iter().any(|lint| lint.contains("stray words")));
	assert!(lints.iter().any(|lint| lint.contains("shadows an HTML element")));
	assert_eq!(program.num_errors(), 0);
	assert_eq!(program.num_warnings(), 0);
}

#[rstest]
#[case::unterminated(
	"<p>a{b</p>",
	"unterminated placeholder in `a{b`",
	vec![TplNode::Text(Text::new("a")), TplNode::Expression(Expression::parse("b"))]
)]
#[case::empty("<p>x{}y</p>", "empty placeholder in `x{}y`", vec![TplNode::Text(Text::new("x{}y"))])]
fn malformed_placeholders_are_lints(
	#[case] content: &str,
	#[case] expected: &str,
	#[case] children: Vec<TplNode>,
) {
	let index = page(&[], content);
	let program = compile(&[("index.html", index.as_str())]);

	assert_eq!(messages(&program, Severity::Lint), vec![expected]);
	assert_eq!(program.num_errors(), 0);

	let nodes = significant(body(&program));
	let [TplNode::Tag(paragraph)] = nodes.as_slice() else {
		panic!("expected a paragraph: {:?}", body(&program));
	};
	assert_eq!(paragraph.children, children);
}

#[test]
fn lints_can_be_disabled() {
	let options = CompileOptions {
		site_root: PathBuf::from(ROOT),
		lints: false,
	};
	let program = Compiler::new(options)
		.with_reader(MemoryReader::new(&[(
			"index.html",
			"<html><body></body></html>",
		)]))
		.compile(&Path::new(ROOT).join("index.html"));

	assert_eq!(program.diagnostics().num_lints(), 0);
}

#[test]
fn font_faces_are_inlined_once() {
	let index = "<!DOCTYPE html>\n<import src=\"components/card.html\" />\n<html><head>\n<style \
	             inline-fonts></style>\n<style>@font-face { font-family: Inter; src: \
	             url(/fonts/inter.woff2); } body { margin: 0; }</style>\n<link rel=\"stylesheet\" \
	             href=\"/css/fonts.css\">\n</head><body><x-card></x-card></body></html>\n";
	let program = compile(&[
		("index.html", index),
		(
			"css/fonts.css",
			"@font-face { font-family: Inter; src: url(/fonts/inter.woff2); }\n@media print { \
			 @font-face { font-family: Print; src: url(print.woff2); } }",
		),
		(
			"components/card.html",
			"<component name=\"x-card\"><style>@font-face { font-family: Card; src: \
			 url(fonts/card.woff2); }</style><div class=\"card\"></div></component>",
		),
	]);

	assert_eq!(program.num_errors(), 0);

	let main = program.main().unwrap_or_else(|| panic!("no main template"));
	let host = main
		.inline_fonts
		.unwrap_or_else(|| panic!("no inline-fonts host"));
	let host_css = program
		.sheet(host)
		.ast
		.as_ref()
		.map(css::translate)
		.unwrap_or_default();
	assert_eq!(
		host_css,
		"@font-face { font-family: Inter; src: url(/fonts/inter.woff2); }\n@font-face { \
		 font-family: Print; src: url(\"/css/print.woff2\"); }\n@font-face { font-family: Card; \
		 src: url(\"/components/fonts/card.woff2\"); }"
	);

	for sheet in program.sheets().iter().filter(|sheet| sheet.id != host) {
		if let Some(ast) = &sheet.ast {
			let mut font_faces = 0;
			css::walk(ast, &mut |node| {
				if node.is_at_rule("font-face") {
					font_faces += 1;
				}
			});
			assert_eq!(font_faces, 0, "{} still has font faces", sheet.file());
		}
	}

	let card = defn(&program, "components/card.html", "x-card");
	assert_eq!(significant(&card.nodes).len(), 1);
}

#[test]
fn component_styles_are_collected() {
	let index = "<!DOCTYPE html>\n<import src=\"card.html\" />\n<html><head><style \
	             component-styles>h1 { margin: 0; }</style></head><body><x-card></x-card></body></html>\n";
	let program = compile(&[
		("index.html", index),
		(
			"card.html",
			"<x-card><style>.card { background: url(img/bg.png); }</style><div \
			 class=\"card\"></div></x-card>\n<style>.extra { color: red; }</style>",
		),
	]);

	assert_eq!(program.num_errors(), 0);

	let main = program.main().unwrap_or_else(|| panic!("no main template"));
	let host = main
		.component_styles
		.unwrap_or_else(|| panic!("no component-styles host"));
	let host_css = program
		.sheet(host)
		.ast
		.as_ref()
		.map(css::translate)
		.unwrap_or_default();
	assert_eq!(
		host_css,
		"h1 { margin: 0; }\n.card { background: url(\"/img/bg.png\"); }\n.extra { color: red; }"
	);

	let card = defn(&program, "card.html", "x-card");
	let nodes = significant(&card.nodes);
	let [TplNode::Tag(div)] = nodes.as_slice() else {
		panic!("expected only the div: {:?}", card.nodes);
	};
	assert_eq!(div.name, "div");
}

#[rstest]
#[case::component_host(
	"",
	"<x-card><style component-styles>.a { x: y; }</style></x-card>",
	"`<style component-styles>` is only allowed in the main template"
)]
#[case::second_host(
	"<style inline-fonts></style><style inline-fonts></style>",
	"",
	"more than one `<style inline-fonts>` host"
)]
fn invalid_style_hosts(#[case] body: &str, #[case] card: &str, #[case] expected: &str) {
	let index = page(&["card.html"], body);
	let program = compile(&[("index.html", index.as_str()), ("card.html", card)]);

	assert_eq!(messages(&program, Severity::Error), vec![expected]);
}

/// Produces a non-stylesheet node for sources containing `not-a-sheet`.
struct BrokenCssParser;

impl CssParser for BrokenCssParser {
	fn parse(
		&self,
		source: &str,
		options: &CssParseOptions,
		on_error: &mut dyn FnMut(CssParseError),
	) -> Result<CssNode, CssParseError> {
		if source.contains("not-a-sheet") {
			return Ok(CssNode::Rule {
				selector: "broken".to_string(),
				declarations: String::new(),
			});
		}

		DefaultCssParser.parse(source, options, on_error)
	}
}

#[rstest]
#[case::invalid_host(
	"<style inline-fonts>/* not-a-sheet */</style>",
	"<x-card></x-card>",
	"the `<style inline-fonts>` host does not contain a valid stylesheet"
)]
#[case::invalid_source(
	"<style inline-fonts></style>",
	"<x-card><style>/* not-a-sheet */</style></x-card>",
	"cannot collect font faces: stylesheet is invalid"
)]
fn invalid_sheets_are_reported(#[case] head: &str, #[case] card: &str, #[case] expected: &str) {
	let index = page(&["card.html"], head);
	let program = Compiler::new(CompileOptions::new(ROOT))
		.with_reader(MemoryReader::new(&[
			("index.html", index.as_str()),
			("card.html", card),
		]))
		.with_css_parser(BrokenCssParser)
		.compile(&Path::new(ROOT).join("index.html"));

	assert_eq!(messages(&program, Severity::Error), vec![expected]);
}

#[test]
fn program_serializes_to_json() -> StencilResult<()> {
	let index = page(&["card.html"], "<x-card title=\"{page.title}\"></x-card>");
	let program = compile(&[
		("index.html", index.as_str()),
		("card.html", "<component name=\"x-card\" title=\"\"><h2>{title}</h2></component>"),
	]);

	let json = program.to_json()?;
	assert!(json.contains("\"type\": \"custom\""));
	assert!(json.contains("\"type\": \"expression\""));
	assert!(json.contains("/site/card.html"));

	Ok(())
}

#[test]
fn load_config_from_candidates() -> StencilResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	assert!(StencilConfig::load(tmp.path())?.is_none());

	write(
		tmp.path(),
		".config/stencil.toml",
		"site_root = \"public\"\n\n[lint]\nenabled = false\n",
	);
	let config = StencilConfig::load(tmp.path())?;
	let options = CompileOptions::from_config(tmp.path(), config.as_ref());
	assert_eq!(options.site_root, tmp.path().join("public"));
	assert!(!options.lints);

	let defaults = CompileOptions::from_config(tmp.path(), None);
	assert_eq!(defaults.site_root, tmp.path().to_path_buf());
	assert!(defaults.lints);

	Ok(())
}

#[test]
fn invalid_config_is_an_error() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write(tmp.path(), "stencil.toml", "site_root = [");

	let result = StencilConfig::load(tmp.path());
	assert!(matches!(result, Err(StencilError::ConfigParse(_))));
}

#[test]
fn compile_project_from_disk() -> StencilResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write(
		tmp.path(),
		"index.html",
		&page(&["components/card.html"], "<x-card title=\"Hi\"></x-card>"),
	);
	write(
		tmp.path(),
		"components/card.html",
		"<component name=\"x-card\" title=\"\"><h2>{title}</h2></component>",
	);

	let program = compile_project(tmp.path(), Path::new("index.html"))?;
	assert_eq!(program.num_errors(), 0);

	let nodes = significant(body(&program));
	let [TplNode::Custom(card)] = nodes.as_slice() else {
		panic!("expected one custom tag: {:?}", body(&program));
	};
	assert_eq!(card.binds.get("title"), Some(&Binding::Text("Hi".to_string())));

	Ok(())
}

#[test]
fn remote_stylesheets_are_not_fetched() -> StencilResult<()> {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write(
		tmp.path(),
		"index.html",
		&page(&[], "<link rel=\"stylesheet\" href=\"https://cdn.example.com/x.css\">"),
	);

	let program = compile_project(tmp.path(), Path::new("index.html"))?;
	let errors = messages(&program, Severity::Error);
	assert_eq!(errors.len(), 1);
	assert!(errors[0].contains("cannot fetch remote resource"));

	let nodes = significant(body(&program));
	let [TplNode::Tag(link)] = nodes.as_slice() else {
		panic!("expected the link to be kept: {:?}", body(&program));
	};
	assert_eq!(link.name, "link");

	Ok(())
}

#[test]
#[traced_test]
fn load_failures_are_logged() {
	let tmp = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {e}"));
	write(tmp.path(), "index.html", &page(&["missing.html"], ""));

	let program = compile_project(tmp.path(), Path::new("index.html"))
		.unwrap_or_else(|e| panic!("compile: {e}"));
	assert_eq!(program.num_errors(), 1);
	assert!(logs_contain("missing.html"));
}

#[test]
fn separate_compilers_share_nothing() {
	let index = page(&["card.html"], "<x-card></x-card>");
	let files = [
		("index.html", index.as_str()),
		("card.html", "<x-card><p>card</p></x-card>"),
	];
	let (first, first_reads) = compiler(&files);
	let (second, second_reads) = compiler(&files);
	let entry = Path::new(ROOT).join("index.html");

	let a = first.compile(&entry);
	let b = second.compile(&entry);

	assert_eq!(first_reads.count("card.html"), 1);
	assert_eq!(second_reads.count("card.html"), 1);
	assert_eq!(a.templates().len(), b.templates().len());
	assert_eq!(a.num_errors(), 0);
}
