use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum StencilError {
	#[error(transparent)]
	#[diagnostic(code(stencil::io_error))]
	Io(#[from] std::io::Error),

	#[error("failed to read `{location}`: {reason}")]
	#[diagnostic(code(stencil::read_failed))]
	Read { location: String, reason: String },

	#[error("cannot fetch remote resource `{0}`")]
	#[diagnostic(
		code(stencil::remote_unsupported),
		help("download the resource and reference it by path, or supply a reader that supports remote urls")
	)]
	RemoteUnsupported(String),

	#[error("failed to parse config file: {0}")]
	#[diagnostic(
		code(stencil::config_parse),
		help("check that stencil.toml is valid TOML with an optional `site_root` and [lint] section")
	)]
	ConfigParse(String),

	#[error("failed to load test data `{path}`: {reason}")]
	#[diagnostic(
		code(stencil::test_data),
		help("the file referenced by <link rel=\"test-data\"> must contain a JSON document")
	)]
	TestData { path: String, reason: String },

	#[error(transparent)]
	#[diagnostic(code(stencil::json))]
	Json(#[from] serde_json::Error),
}

pub type StencilResult<T> = Result<T, StencilError>;
