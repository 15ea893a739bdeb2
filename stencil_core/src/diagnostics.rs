use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// How serious a reported problem is. None of them stop compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
	/// A structural defect. A fallback was substituted.
	Error,
	/// A recoverable issue. The offending fragment was dropped.
	Warning,
	/// Advisory only.
	Lint,
}

impl fmt::Display for Severity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Error => f.write_str("error"),
			Self::Warning => f.write_str("warning"),
			Self::Lint => f.write_str("lint"),
		}
	}
}

/// A single reported problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
	pub severity: Severity,
	/// The template or stylesheet the problem was found in, when known.
	pub file: Option<String>,
	pub message: String,
}

impl fmt::Display for Diagnostic {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.file {
			Some(file) => write!(f, "{}: {file}: {}", self.severity, self.message),
			None => write!(f, "{}: {}", self.severity, self.message),
		}
	}
}

/// Collects diagnostics for one compilation session and logs each one as it
/// arrives.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
	entries: Vec<Diagnostic>,
	num_errors: usize,
	num_warnings: usize,
	#[serde(skip)]
	lints_enabled: bool,
}

impl Default for Diagnostics {
	fn default() -> Self {
		Self::new(true)
	}
}

impl Diagnostics {
	pub fn new(lints_enabled: bool) -> Self {
		Self {
			entries: Vec::new(),
			num_errors: 0,
			num_warnings: 0,
			lints_enabled,
		}
	}

	pub fn error(&mut self, file: Option<&str>, message: impl Into<String>) {
		let message = message.into();
		tracing::error!(file = file.unwrap_or_default(), "{message}");
		self.num_errors += 1;
		self.push(Severity::Error, file, message);
	}

	pub fn warn(&mut self, file: Option<&str>, message: impl Into<String>) {
		let message = message.into();
		tracing::warn!(file = file.unwrap_or_default(), "{message}");
		self.num_warnings += 1;
		self.push(Severity::Warning, file, message);
	}

	pub fn lint(&mut self, file: Option<&str>, message: impl Into<String>) {
		if !self.lints_enabled {
			return;
		}

		let message = message.into();
		tracing::info!(target: "stencil::lint", file = file.unwrap_or_default(), "{message}");
		self.push(Severity::Lint, file, message);
	}

	/// Trace-level progress output. Not recorded.
	pub fn debug(&self, file: Option<&str>, message: impl AsRef<str>) {
		tracing::debug!(file = file.unwrap_or_default(), "{}", message.as_ref());
	}

	fn push(&mut self, severity: Severity, file: Option<&str>, message: String) {
		self.entries.push(Diagnostic {
			severity,
			file: file.map(ToString::to_string),
			message,
		});
	}

	pub fn num_errors(&self) -> usize {
		self.num_errors
	}

	pub fn num_warnings(&self) -> usize {
		self.num_warnings
	}

	pub fn has_errors(&self) -> bool {
		self.num_errors > 0
	}

	pub fn entries(&self) -> &[Diagnostic] {
		&self.entries
	}

	/// All recorded diagnostics of the given severity.
	pub fn of(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
		self.entries
			.iter()
			.filter(move |entry| entry.severity == severity)
	}

	/// Number of recorded lints.
	pub fn num_lints(&self) -> usize {
		self.of(Severity::Lint).count()
	}
}
