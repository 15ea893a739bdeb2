use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;

use crate::StencilError;
use crate::StencilResult;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
	["stencil.toml", ".stencil.toml", ".config/stencil.toml"];

/// Configuration loaded from a `stencil.toml` file.
///
/// ```toml
/// site_root = "public"
///
/// [lint]
/// enabled = true
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct StencilConfig {
	/// Directory that absolute stylesheet urls (`/css/site.css`) resolve
	/// against. Relative to the project root. Defaults to the project root.
	#[serde(default)]
	pub site_root: Option<PathBuf>,
	/// Advisory lint configuration.
	#[serde(default)]
	pub lint: LintConfig,
}

/// Controls whether advisory lints are reported.
#[derive(Debug, Deserialize)]
pub struct LintConfig {
	/// When false, lints are neither logged nor recorded. Errors and warnings
	/// are unaffected.
	#[serde(default = "default_true")]
	pub enabled: bool,
}

impl Default for LintConfig {
	fn default() -> Self {
		Self { enabled: true }
	}
}

fn default_true() -> bool {
	true
}

impl StencilConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> StencilResult<Option<StencilConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config: StencilConfig =
			toml::from_str(&content).map_err(|e| StencilError::ConfigParse(e.to_string()))?;

		Ok(Some(config))
	}
}

/// Options for controlling a compilation.
///
/// Use [`CompileOptions::new`] for defaults rooted at a directory or
/// [`CompileOptions::from_config`] to construct from a [`StencilConfig`].
#[derive(Debug, Clone)]
pub struct CompileOptions {
	/// Absolute directory that `/…` stylesheet urls resolve against.
	pub site_root: PathBuf,
	/// Whether advisory lints are reported.
	pub lints: bool,
}

impl CompileOptions {
	/// Default options with the site root set to `root`.
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self {
			site_root: root.into(),
			lints: true,
		}
	}

	/// Construct [`CompileOptions`] for the project at `root` from an optional
	/// [`StencilConfig`].
	pub fn from_config(root: &Path, config: Option<&StencilConfig>) -> Self {
		let site_root = config
			.and_then(|c| c.site_root.as_deref())
			.map_or_else(|| root.to_path_buf(), |site_root| root.join(site_root));
		let lints = config.is_none_or(|c| c.lint.enabled);

		Self { site_root, lints }
	}
}
