//! Shared test utilities for the lampbackup crate.
//!
//! Available to unit tests and, through the `test-support` feature, to the
//! behaviour suites under `tests/`.

use crate::archive::Archiver;
use crate::config::{Config, DatabaseSettings, Password, RawConfig};
use crate::dump::{DatabaseDumper, dump_filename};
use crate::error::{BackupError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{NaiveDate, NaiveDateTime};
use std::cell::{Cell, RefCell};
use std::fs;
use std::process::{ExitStatus, Output};
use std::time::Duration;
use tempfile::TempDir;

/// Creates an `ExitStatus` from an exit code (Unix implementation).
#[cfg(unix)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;

    ExitStatus::from_raw(code << 8)
}

/// Creates an `ExitStatus` from an exit code (Windows implementation).
#[cfg(windows)]
#[must_use]
pub fn exit_status(code: i32) -> ExitStatus {
    use std::os::windows::process::ExitStatusExt;

    ExitStatus::from_raw(code as u32)
}

/// Creates a successful command `Output` with empty stdout and stderr.
#[must_use]
pub fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// Creates a failed command `Output` with the given stderr message.
#[must_use]
pub fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(1),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

/// The timestamp used for archive names in tests: 2024-06-01 12:00:00.
#[must_use]
pub fn fixed_timestamp() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, 1)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .unwrap_or_default()
}

/// A throwaway site layout: source `html/` and `ssl/` trees plus the
/// temporary root and output directory, all under one temp dir.
pub struct SiteFixture {
    _temp: TempDir,
    /// Canonical root of the fixture.
    pub root: Utf8PathBuf,
    /// Document root to back up.
    pub html: Utf8PathBuf,
    /// TLS directory to back up.
    pub ssl: Utf8PathBuf,
    /// Temporary root for staging.
    pub temp: Utf8PathBuf,
    /// Archive output directory.
    pub output: Utf8PathBuf,
}

impl SiteFixture {
    /// Create the four directories, all empty.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"));
        let root = Utf8PathBuf::try_from(temp.path().to_owned())
            .unwrap_or_else(|e| panic!("temp dir path not UTF-8: {e}"))
            .canonicalize_utf8()
            .unwrap_or_else(|e| panic!("failed to canonicalize temp dir: {e}"));
        let dir = |name: &str| {
            let path = root.join(name);
            fs::create_dir_all(&path)
                .unwrap_or_else(|e| panic!("failed to create {path}: {e}"));
            path
        };
        let (html, ssl, temp_root, output) = (dir("www"), dir("certs"), dir("tmp"), dir("out"));
        Self {
            _temp: temp,
            root,
            html,
            ssl,
            temp: temp_root,
            output,
        }
    }

    /// Write `contents` to `relative` below `base`, creating parents.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn write(base: &Utf8Path, relative: &str, contents: &[u8]) {
        let path = base.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("failed to create {parent}: {e}"));
        }
        fs::write(&path, contents).unwrap_or_else(|e| panic!("failed to write {path}: {e}"));
    }

    /// A complete raw configuration pointing at this fixture.
    #[must_use]
    pub fn raw_config(&self, website_name: &str) -> RawConfig {
        RawConfig {
            db_host: None,
            db_name: Some("wordpress".to_owned()),
            db_user: Some("wp".to_owned()),
            db_pass: Some(Password::from("hunter2")),
            website_name: Some(website_name.to_owned()),
            html_path: Some(self.html.to_string()),
            ssl_path: Some(self.ssl.to_string()),
            temp_path: Some(self.temp.to_string()),
            output_path: Some(self.output.to_string()),
            step_timeout: Some(Duration::from_secs(5)),
            debug: false,
        }
    }

    /// A validated configuration stamped with [`fixed_timestamp`].
    ///
    /// # Panics
    ///
    /// Panics if validation fails.
    #[must_use]
    pub fn config(&self, website_name: &str, debug: bool) -> Config {
        RawConfig {
            debug,
            ..self.raw_config(website_name)
        }
        .validate_at(fixed_timestamp())
        .unwrap_or_else(|e| panic!("fixture configuration should validate: {e}"))
    }
}

impl Default for SiteFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`DatabaseDumper`] that writes a canned dump or fails on demand.
#[derive(Debug, Default)]
pub struct FakeDumper {
    unavailable: bool,
    failure: Option<String>,
    probes: Cell<usize>,
    dumps: Cell<usize>,
}

impl FakeDumper {
    /// A dumper whose probe and dump both succeed.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    /// A dumper whose dump fails with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_owned()),
            ..Self::default()
        }
    }

    /// A dumper whose availability probe fails.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Number of availability probes made.
    #[must_use]
    pub fn probes(&self) -> usize {
        self.probes.get()
    }

    /// Number of dumps attempted.
    #[must_use]
    pub fn dumps(&self) -> usize {
        self.dumps.get()
    }
}

impl DatabaseDumper for FakeDumper {
    fn check_available(&self) -> Result<()> {
        self.probes.set(self.probes.get() + 1);
        if self.unavailable {
            return Err(BackupError::DatabaseDump {
                reason: "mysqldump not found; is it installed and on PATH?".to_owned(),
            });
        }
        Ok(())
    }

    fn dump(
        &self,
        database: &DatabaseSettings,
        destination: &Utf8Path,
        _timeout: Duration,
    ) -> Result<Utf8PathBuf> {
        self.dumps.set(self.dumps.get() + 1);
        if let Some(reason) = &self.failure {
            return Err(BackupError::DatabaseDump {
                reason: reason.clone(),
            });
        }
        let path = destination.join(dump_filename(&database.name));
        fs::write(&path, format!("-- dump of {}\n", database.name)).map_err(|e| {
            BackupError::DatabaseDump {
                reason: format!("{path}: {e}"),
            }
        })?;
        Ok(path)
    }
}

/// Arguments received by [`FakeArchiver::archive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCall {
    /// Directory that would have been archived.
    pub source: Utf8PathBuf,
    /// Top-level entry name.
    pub root_name: String,
    /// Directory receiving the archive.
    pub output_dir: Utf8PathBuf,
}

/// An [`Archiver`] that records its inputs and writes a marker file
/// instead of compressing the staging tree.
#[derive(Debug, Default)]
pub struct FakeArchiver {
    failure: Option<String>,
    calls: RefCell<Vec<ArchiveCall>>,
}

impl FakeArchiver {
    /// An archiver that always fails with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            failure: Some(reason.to_owned()),
            calls: RefCell::default(),
        }
    }

    /// The calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ArchiveCall> {
        self.calls.borrow().clone()
    }
}

impl Archiver for FakeArchiver {
    fn archive(
        &self,
        source: &Utf8Path,
        root_name: &str,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        self.calls.borrow_mut().push(ArchiveCall {
            source: source.to_owned(),
            root_name: root_name.to_owned(),
            output_dir: output_dir.to_owned(),
        });
        if let Some(reason) = &self.failure {
            return Err(BackupError::Archive {
                reason: reason.clone(),
            });
        }
        let path = output_dir.join(format!("{root_name}.tar.gz"));
        fs::write(&path, format!("fake archive of {source}\n")).map_err(|e| {
            BackupError::Archive {
                reason: format!("{path}: {e}"),
            }
        })?;
        Ok(path)
    }
}
