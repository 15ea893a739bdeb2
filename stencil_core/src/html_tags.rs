/// Tag names reserved by the template language itself. They are always
/// visible and cannot be shadowed by imported components.
pub const BUILTIN_TAGS: [&str; 2] = ["component", "import"];

/// Elements defined by the HTML living standard, plus the SVG and MathML
/// elements commonly embedded in pages.
const HTML5_TAGS: &[&str] = &[
	"a", "abbr", "address", "area", "article", "aside", "audio", "b", "base", "bdi", "bdo",
	"blockquote", "body", "br", "button", "canvas", "caption", "cite", "code", "col", "colgroup",
	"data", "datalist", "dd", "del", "details", "dfn", "dialog", "div", "dl", "dt", "em", "embed",
	"fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6",
	"head", "header", "hgroup", "hr", "html", "i", "iframe", "img", "input", "ins", "kbd", "label",
	"legend", "li", "link", "main", "map", "mark", "menu", "meta", "meter", "nav", "noscript",
	"object", "ol", "optgroup", "option", "output", "p", "param", "picture", "pre", "progress",
	"q", "rp", "rt", "ruby", "s", "samp", "script", "search", "section", "select", "slot",
	"small", "source", "span", "strong", "style", "sub", "summary", "sup", "table", "tbody",
	"td", "template", "textarea", "tfoot", "th", "thead", "time", "title", "tr", "track", "u",
	"ul", "var", "video", "wbr", // svg
	"svg", "circle", "clippath", "defs", "desc", "ellipse", "g", "image", "line",
	"lineargradient", "marker", "mask", "path", "pattern", "polygon", "polyline",
	"radialgradient", "rect", "stop", "symbol", "text", "textpath", "tspan", "use", // mathml
	"math", "mi", "mn", "mo", "mrow", "msup", "msub", "mfrac", "msqrt", "mtext",
];

/// Elements removed from the standard. Still rendered, but reported.
const DEPRECATED_TAGS: &[&str] = &[
	"acronym", "applet", "basefont", "bgsound", "big", "blink", "center", "dir", "font", "frame",
	"frameset", "isindex", "keygen", "listing", "marquee", "menuitem", "multicol", "nextid",
	"nobr", "noembed", "noframes", "plaintext", "rb", "rtc", "spacer", "strike", "tt", "xmp",
];

pub fn is_html5_tag(name: &str) -> bool {
	HTML5_TAGS.contains(&name)
}

pub fn is_deprecated_tag(name: &str) -> bool {
	DEPRECATED_TAGS.contains(&name)
}
