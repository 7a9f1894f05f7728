//! Error types for the lampbackup CLI.
//!
//! Each variant names the operation that failed and carries the underlying
//! cause so the binary can print a single actionable line before exiting.

use crate::pipeline::StageState;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while validating configuration or running the
/// staging pipeline.
#[derive(Debug, Error)]
pub enum BackupError {
    /// A required configuration value was not supplied.
    #[error("{name} was not set")]
    MissingField {
        /// Flag name of the missing value (for example `dbName`).
        name: &'static str,
    },

    /// A configured directory does not exist or could not be resolved.
    #[error("could not find {role} directory {path} ({reason})")]
    PathNotFound {
        /// Which directory failed (`HTML`, `SSL`, `temporary`, `output`).
        role: &'static str,
        /// The path as supplied by the user.
        path: String,
        /// Description of why resolution failed.
        reason: String,
    },

    /// The temporary root lies inside a directory that is copied into it.
    #[error("temporary directory {temp_dir} is inside the {role} directory {source_dir}")]
    TempInsideSource {
        /// Which source directory contains it (`HTML` or `SSL`).
        role: &'static str,
        /// The resolved temporary directory.
        temp_dir: Utf8PathBuf,
        /// The resolved source directory.
        source_dir: Utf8PathBuf,
    },

    /// The staging directory tree could not be created.
    #[error("could not create staging directory {path}")]
    StagingCreate {
        /// Path that was being created or cleared.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Copying a source tree into the staging directory failed.
    #[error("could not copy files from {from} to {to}")]
    Copy {
        /// Source directory.
        from: Utf8PathBuf,
        /// Destination directory inside the staging tree.
        to: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The database export tool failed, timed out or could not be found.
    #[error("database dump failed: {reason}")]
    DatabaseDump {
        /// Description of the failure, usually the tool's stderr.
        reason: String,
    },

    /// The staging directory could not be archived.
    #[error("archive creation failed: {reason}")]
    Archive {
        /// Description of the archiving failure.
        reason: String,
    },

    /// Removing the staging directory failed.
    #[error("could not remove staging directory {path}")]
    Cleanup {
        /// Staging directory that could not be removed.
        path: Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A pipeline step ran before the staging directory was prepared.
    #[error("cannot {operation}: staging directory has not been prepared")]
    NotConfigured {
        /// The step that was attempted.
        operation: &'static str,
    },

    /// A pipeline step ran out of order after preparation.
    #[error("cannot {operation} in state {actual}; expected state {expected}")]
    OutOfOrder {
        /// The step that was attempted.
        operation: &'static str,
        /// State the step requires.
        expected: StageState,
        /// State the pipeline was in.
        actual: StageState,
    },
}

impl BackupError {
    /// Render the error followed by its chain of causes on one line.
    ///
    /// # Examples
    ///
    /// ```
    /// use lampbackup::error::BackupError;
    ///
    /// let err = BackupError::Cleanup {
    ///     path: "/tmp/site".into(),
    ///     source: std::io::Error::other("device busy"),
    /// };
    /// assert_eq!(
    ///     err.report(),
    ///     "could not remove staging directory /tmp/site (device busy)"
    /// );
    /// ```
    #[must_use]
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(&format!(" ({err})"));
            cause = err.source();
        }
        message
    }
}

/// Result type alias using [`BackupError`].
pub type Result<T> = std::result::Result<T, BackupError>;
