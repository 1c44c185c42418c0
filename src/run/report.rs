use crate::run::FileOutcome;
use std::fmt::Write as _;
use std::path::Path;

/// Render the report block for one file.
///
/// Clean files produce `<path>: no issues found`; otherwise the path heads a
/// block of `  <line>:<col>  <severity>  <text>` lines in message order.
/// Continuation lines of a multi-line message are emitted verbatim beneath
/// the first. Output depends only on the outcome, so identical configurations
/// report identically.
pub fn report(outcome: &FileOutcome, cwd: &Path) -> String {
	let path = relative_display(&outcome.path, cwd);

	if outcome.messages.is_empty() {
		return format!("{path}: no issues found\n");
	}

	let mut out = format!("{path}\n");
	for message in &outcome.messages {
		let mut lines = message.text.lines();
		if let Some(first) = lines.next() {
			let _ = writeln!(
				out,
				"  {}:{}  {}  {}",
				message.line,
				message.column,
				message.severity.as_str(),
				first
			);
		}
		for rest in lines {
			out.push_str(rest);
			out.push('\n');
		}
	}
	out
}

/// Display `path` relative to `cwd` when it lies underneath it.
pub(crate) fn relative_display(path: &Path, cwd: &Path) -> String {
	path.strip_prefix(cwd)
		.unwrap_or(path)
		.display()
		.to_string()
}
