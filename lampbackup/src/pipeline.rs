//! Staging directory lifecycle.
//!
//! [`StagingPipeline`] owns the staging directory `tempRoot/archiveName` and
//! executes the backup steps against it. Steps must run in order:
//!
//! ```text
//! prepare -> copy_html_files -> copy_ssl_files -> dump_database -> archive -> cleanup
//! ```
//!
//! The order is enforced at runtime. A step called before [`prepare`]
//! fails with [`BackupError::NotConfigured`]; any other out-of-order call
//! fails with [`BackupError::OutOfOrder`] and leaves both the filesystem and
//! the pipeline state untouched. A failing step moves the pipeline to
//! [`StageState::Aborted`]; only `prepare` and `cleanup` are accepted after
//! that.
//!
//! Every filesystem call uses an absolute path derived from the staging
//! directory. The process working directory is never changed.
//!
//! Removing a stale staging directory in `prepare` is not safe against two
//! concurrent runs that share a temporary root and archive name.
//!
//! [`prepare`]: StagingPipeline::prepare

use crate::archive::Archiver;
use crate::config::Config;
use crate::copy::{CopyStats, copy_tree};
use crate::dump::DatabaseDumper;
use crate::error::{BackupError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::io;

/// Subdirectory of the staging tree holding the document root copy.
pub const HTML_SUBDIR: &str = "html";

/// Subdirectory of the staging tree holding the TLS material copy.
pub const SSL_SUBDIR: &str = "ssl";

/// Position of a [`StagingPipeline`] in the step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageState {
    /// Nothing has been created yet.
    Unprepared,
    /// The staging directory and its subdirectories exist.
    Prepared,
    /// The document root has been copied.
    HtmlCopied,
    /// The TLS directory has been copied.
    SslCopied,
    /// The database dump is in the staging directory.
    DatabaseDumped,
    /// The archive has been written.
    Archived,
    /// The staging directory has been removed.
    CleanedUp,
    /// The staging directory was kept for inspection.
    Preserved,
    /// A step failed.
    Aborted,
}

impl StageState {
    /// Return the kebab-case name used in messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unprepared => "unprepared",
            Self::Prepared => "prepared",
            Self::HtmlCopied => "html-copied",
            Self::SslCopied => "ssl-copied",
            Self::DatabaseDumped => "database-dumped",
            Self::Archived => "archived",
            Self::CleanedUp => "cleaned-up",
            Self::Preserved => "preserved",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`StagingPipeline::cleanup`] did with the staging directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The staging directory was removed, or was already absent.
    Removed(Utf8PathBuf),
    /// Debug mode kept the staging directory in place.
    Preserved(Utf8PathBuf),
}

impl CleanupOutcome {
    /// The staging directory the outcome refers to.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        match self {
            Self::Removed(path) | Self::Preserved(path) => path,
        }
    }
}

/// Executes the backup steps against a staging directory.
pub struct StagingPipeline<'a> {
    config: &'a Config,
    dumper: &'a dyn DatabaseDumper,
    archiver: &'a dyn Archiver,
    staging_dir: Utf8PathBuf,
    state: StageState,
    dump_path: Option<Utf8PathBuf>,
    archive_path: Option<Utf8PathBuf>,
}

impl fmt::Debug for StagingPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingPipeline")
            .field("staging_dir", &self.staging_dir)
            .field("state", &self.state)
            .field("dump_path", &self.dump_path)
            .field("archive_path", &self.archive_path)
            .finish_non_exhaustive()
    }
}

impl<'a> StagingPipeline<'a> {
    /// Create a pipeline for `config`. Nothing is touched on disk until
    /// [`StagingPipeline::prepare`] is called.
    #[must_use]
    pub fn new(
        config: &'a Config,
        dumper: &'a dyn DatabaseDumper,
        archiver: &'a dyn Archiver,
    ) -> Self {
        Self {
            config,
            dumper,
            archiver,
            staging_dir: config.temp_dir().join(config.archive_name().as_str()),
            state: StageState::Unprepared,
            dump_path: None,
            archive_path: None,
        }
    }

    /// Current position in the step sequence.
    #[must_use]
    pub fn state(&self) -> StageState {
        self.state
    }

    /// The staging directory, `tempRoot/archiveName`.
    #[must_use]
    pub fn staging_dir(&self) -> &Utf8Path {
        &self.staging_dir
    }

    /// Destination of the document root copy.
    #[must_use]
    pub fn html_dir(&self) -> Utf8PathBuf {
        self.staging_dir.join(HTML_SUBDIR)
    }

    /// Destination of the TLS directory copy.
    #[must_use]
    pub fn ssl_dir(&self) -> Utf8PathBuf {
        self.staging_dir.join(SSL_SUBDIR)
    }

    /// Path of the database dump, once written.
    #[must_use]
    pub fn dump_path(&self) -> Option<&Utf8Path> {
        self.dump_path.as_deref()
    }

    /// Path of the archive, once written.
    #[must_use]
    pub fn archive_path(&self) -> Option<&Utf8Path> {
        self.archive_path.as_deref()
    }

    /// Create a fresh staging directory with `html/` and `ssl/` inside.
    ///
    /// Any existing entry at the staging path is removed first, whatever its
    /// type. May be called in any state; it resets the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::StagingCreate`] if the stale entry cannot be
    /// removed or a directory cannot be created.
    pub fn prepare(&mut self) -> Result<&Utf8Path> {
        info!("preparing staging directory {}", self.staging_dir);
        self.dump_path = None;
        self.archive_path = None;

        let result = create_staging_tree(&self.staging_dir);
        self.record(result, StageState::Prepared)?;
        Ok(&self.staging_dir)
    }

    /// Copy the document root into `html/`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotConfigured`] or [`BackupError::OutOfOrder`]
    /// when called out of sequence, or [`BackupError::Copy`] on I/O failure.
    pub fn copy_html_files(&mut self) -> Result<CopyStats> {
        self.require("copy HTML files", StageState::Prepared)?;
        let result = self.copy_into(self.config.html_dir(), self.html_dir());
        self.record(result, StageState::HtmlCopied)
    }

    /// Copy the TLS directory into `ssl/`.
    ///
    /// # Errors
    ///
    /// As for [`StagingPipeline::copy_html_files`]; requires the HTML copy to
    /// have completed.
    pub fn copy_ssl_files(&mut self) -> Result<CopyStats> {
        self.require("copy SSL files", StageState::HtmlCopied)?;
        let result = self.copy_into(self.config.ssl_dir(), self.ssl_dir());
        self.record(result, StageState::SslCopied)
    }

    /// Export the database into the staging directory.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::DatabaseDump`] when the dumper fails, or an
    /// ordering error when called out of sequence.
    pub fn dump_database(&mut self) -> Result<Utf8PathBuf> {
        self.require("dump the database", StageState::SslCopied)?;
        let result = self.dumper.dump(
            self.config.database(),
            &self.staging_dir,
            self.config.step_timeout(),
        );
        let path = self.record(result, StageState::DatabaseDumped)?;
        debug!("database dump written to {path}");
        self.dump_path = Some(path.clone());
        Ok(path)
    }

    /// Compress the staging directory into `<outputDir>/<archiveName>.tar.gz`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Archive`] when the archiver fails, or an
    /// ordering error when called out of sequence.
    pub fn archive(&mut self) -> Result<Utf8PathBuf> {
        self.require("archive", StageState::DatabaseDumped)?;
        let result = self.archiver.archive(
            &self.staging_dir,
            self.config.archive_name().as_str(),
            self.config.output_dir(),
        );
        let path = self.record(result, StageState::Archived)?;
        self.archive_path = Some(path.clone());
        Ok(path)
    }

    /// Remove the staging directory, or keep it in debug mode.
    ///
    /// Valid in every state. A staging directory that does not exist counts
    /// as removed.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Cleanup`] when removal was attempted and
    /// failed.
    pub fn cleanup(&mut self) -> Result<CleanupOutcome> {
        let path = self.staging_dir.clone();

        if self.config.debug() {
            info!("debug mode: keeping staging directory {path}");
            self.state = StageState::Preserved;
            return Ok(CleanupOutcome::Preserved(path));
        }

        match fs::remove_dir_all(&path) {
            Ok(()) => info!("removed staging directory {path}"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("staging directory {path} already absent");
            }
            Err(source) => {
                self.state = StageState::Aborted;
                return Err(BackupError::Cleanup { path, source });
            }
        }

        self.state = StageState::CleanedUp;
        Ok(CleanupOutcome::Removed(path))
    }

    fn require(&self, operation: &'static str, expected: StageState) -> Result<()> {
        match self.state {
            actual if actual == expected => Ok(()),
            StageState::Unprepared => Err(BackupError::NotConfigured { operation }),
            actual => Err(BackupError::OutOfOrder {
                operation,
                expected,
                actual,
            }),
        }
    }

    fn record<T>(&mut self, result: Result<T>, next: StageState) -> Result<T> {
        match result {
            Ok(value) => {
                debug!("pipeline state {} -> {next}", self.state);
                self.state = next;
                Ok(value)
            }
            Err(err) => {
                warn!("pipeline aborted in state {}: {err}", self.state);
                self.state = StageState::Aborted;
                Err(err)
            }
        }
    }

    fn copy_into(&self, from: &Utf8Path, to: Utf8PathBuf) -> Result<CopyStats> {
        info!("copying {from} to {to}");
        let stats = copy_tree(from, &to).map_err(|source| BackupError::Copy {
            from: from.to_owned(),
            to: to.clone(),
            source,
        })?;
        debug!(
            "copied {} files, {} directories, {} bytes into {to}",
            stats.files, stats.directories, stats.bytes
        );
        Ok(stats)
    }
}

fn create_staging_tree(staging_dir: &Utf8Path) -> Result<()> {
    let failed = |source: io::Error| BackupError::StagingCreate {
        path: staging_dir.to_owned(),
        source,
    };

    remove_stale_entry(staging_dir).map_err(failed)?;
    for subdir in [HTML_SUBDIR, SSL_SUBDIR] {
        fs::create_dir_all(staging_dir.join(subdir)).map_err(failed)?;
    }
    Ok(())
}

/// Remove whatever occupies `path`. Symlinks are removed, not followed.
fn remove_stale_entry(path: &Utf8Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    warn!("removing stale staging entry {path}");
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
