//! User-facing messages for the lampbackup CLI.
//!
//! Progress lines are written to an injected writer (stderr in the binary)
//! so that tests can capture them. Diagnostic detail goes through `log`
//! instead.

use crate::pipeline::CleanupOutcome;
use camino::Utf8Path;
use log::debug;
use std::fmt::Display;
use std::io::Write;

/// Write one line to `stderr`. A failed write is logged and otherwise
/// ignored.
pub fn write_stderr_line(stderr: &mut dyn Write, message: impl Display) {
    if let Err(e) = writeln!(stderr, "{message}") {
        debug!("could not write progress line: {e}");
    }
}

/// The banner printed at start-up.
///
/// # Example
///
/// ```
/// use lampbackup::output::version_banner;
///
/// assert!(version_banner().starts_with("lampbackup Version "));
/// ```
#[must_use]
pub fn version_banner() -> String {
    format!("lampbackup Version {}", env!("CARGO_PKG_VERSION"))
}

/// Announce a numbered step.
#[must_use]
pub fn step_message(number: usize, description: &str) -> String {
    format!("Executing step {number}: {description}")
}

/// Explain which step stopped the run.
#[must_use]
pub fn abort_message(failure: &str) -> String {
    format!("Exiting (could not {failure})")
}

/// Lines printed instead of the cleanup step in debug mode.
#[must_use]
pub fn skipped_cleanup_lines(number: usize, staging_dir: &Utf8Path) -> [String; 2] {
    [
        format!("Skipping step {number}: (staging path will not be removed)"),
        format!("Staging path: {staging_dir}"),
    ]
}

/// Final line of a successful run.
#[must_use]
pub fn success_message(archive: &Utf8Path) -> String {
    format!("Backup complete: {archive}")
}

/// Describe what best-effort cleanup did after a failed step.
#[must_use]
pub fn abandoned_staging_message(outcome: &CleanupOutcome) -> String {
    match outcome {
        CleanupOutcome::Removed(path) => format!("Removed staging path {path}"),
        CleanupOutcome::Preserved(path) => {
            format!("Staging path kept for inspection: {path}")
        }
    }
}
