//! Run configuration and validation.
//!
//! Configuration is built in two phases. [`RawConfig`] collects whatever the
//! user supplied and may be incomplete; [`RawConfig::validate`] checks it and
//! produces an immutable [`Config`] whose paths are canonical, existing
//! directories. A `Config` cannot be constructed any other way, so code that
//! holds one never needs to ask whether configuration has happened yet.
//!
//! Validation only reads the filesystem; it never creates or removes
//! anything.

use crate::archive_name::ArchiveName;
use crate::error::{BackupError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDateTime};
use log::{debug, warn};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Database host used when none is supplied.
pub const DEFAULT_DB_HOST: &str = "localhost";

/// Default upper bound on each external-tool step.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(300);

/// Last-resort temporary directory when the platform default is unusable.
#[cfg(windows)]
const FALLBACK_TEMP_DIR: &str = "C:\\Windows\\Temp";

/// Last-resort temporary directory when the platform default is unusable.
#[cfg(not(windows))]
const FALLBACK_TEMP_DIR: &str = "/tmp";

/// A database password that never appears in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Return the plaintext password for handing to the dump tool.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(****)")
    }
}

impl From<String> for Password {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Password {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Unvalidated configuration as supplied by the user.
///
/// Every field is optional so that absence can be reported precisely by
/// [`RawConfig::validate`].
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    /// Database server hostname; defaults to [`DEFAULT_DB_HOST`].
    pub db_host: Option<String>,
    /// Name of the database to dump.
    pub db_name: Option<String>,
    /// Database user.
    pub db_user: Option<String>,
    /// Database password.
    pub db_pass: Option<Password>,
    /// Website name; sanitized to ASCII alphanumerics.
    pub website_name: Option<String>,
    /// Document root to back up.
    pub html_path: Option<String>,
    /// TLS material directory to back up.
    pub ssl_path: Option<String>,
    /// Root under which the staging directory is created.
    pub temp_path: Option<String>,
    /// Directory receiving the final archive; defaults to the working directory.
    pub output_path: Option<String>,
    /// Per-step limit for external tools; defaults to [`DEFAULT_STEP_TIMEOUT`].
    pub step_timeout: Option<Duration>,
    /// Keep the staging directory and log verbosely.
    pub debug: bool,
}

/// Connection settings handed to the database dump tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// Server hostname.
    pub host: String,
    /// Database name.
    pub name: String,
    /// Login user.
    pub user: String,
    /// Login password.
    pub password: Password,
}

/// Validated, immutable run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    database: DatabaseSettings,
    website_name: String,
    html_dir: Utf8PathBuf,
    ssl_dir: Utf8PathBuf,
    temp_dir: Utf8PathBuf,
    output_dir: Utf8PathBuf,
    archive_name: ArchiveName,
    step_timeout: Duration,
    debug: bool,
}

/// Required values that are present but not yet checked.
struct Required {
    db_name: String,
    db_user: String,
    db_pass: Password,
    website_name: String,
    html_path: String,
    ssl_path: String,
}

impl RawConfig {
    /// Validate using the current local time for the archive name.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::MissingField`] for the first absent required
    /// value, [`BackupError::PathNotFound`] when a directory cannot be
    /// resolved, or [`BackupError::TempInsideSource`] when the staging tree
    /// would be created inside a directory that is copied into it.
    pub fn validate(self) -> Result<Config> {
        self.validate_at(Local::now().naive_local())
    }

    /// Validate with an explicit timestamp for the archive name.
    ///
    /// All required fields are checked for presence before any path is
    /// resolved, so a missing field is always reported as such.
    ///
    /// # Errors
    ///
    /// See [`RawConfig::validate`].
    pub fn validate_at(self, now: NaiveDateTime) -> Result<Config> {
        let required = Required {
            db_name: require(self.db_name, "dbName")?,
            db_user: require(self.db_user, "dbUser")?,
            db_pass: require(self.db_pass, "dbPass")?,
            website_name: require(self.website_name, "websiteName")?,
            html_path: require(self.html_path, "htmlPath")?,
            ssl_path: require(self.ssl_path, "sslPath")?,
        };

        let html_dir = resolve_dir("HTML", &required.html_path)?;
        let ssl_dir = resolve_dir("SSL", &required.ssl_path)?;
        let temp_dir = match self.temp_path.as_deref() {
            Some(raw) => resolve_dir("temporary", raw)?,
            None => default_temp_dir(std::env::temp_dir()),
        };
        reject_temp_inside("HTML", &temp_dir, &html_dir)?;
        reject_temp_inside("SSL", &temp_dir, &ssl_dir)?;
        let output_dir = match self.output_path.as_deref() {
            Some(raw) => resolve_dir("output", raw)?,
            None => current_dir()?,
        };

        let archive_name = ArchiveName::new(&required.website_name, now);
        debug!("archive name is {archive_name}");

        Ok(Config {
            database: DatabaseSettings {
                host: self.db_host.unwrap_or_else(|| DEFAULT_DB_HOST.to_owned()),
                name: required.db_name,
                user: required.db_user,
                password: required.db_pass,
            },
            website_name: archive_name.website().to_owned(),
            html_dir,
            ssl_dir,
            temp_dir,
            output_dir,
            archive_name,
            step_timeout: self.step_timeout.unwrap_or(DEFAULT_STEP_TIMEOUT),
            debug: self.debug,
        })
    }
}

impl Config {
    /// Database connection settings.
    #[must_use]
    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    /// Sanitized website name (may be empty).
    #[must_use]
    pub fn website_name(&self) -> &str {
        &self.website_name
    }

    /// Canonical document root.
    #[must_use]
    pub fn html_dir(&self) -> &Utf8Path {
        &self.html_dir
    }

    /// Canonical TLS directory.
    #[must_use]
    pub fn ssl_dir(&self) -> &Utf8Path {
        &self.ssl_dir
    }

    /// Root under which the staging directory is created.
    #[must_use]
    pub fn temp_dir(&self) -> &Utf8Path {
        &self.temp_dir
    }

    /// Directory that receives the final archive.
    #[must_use]
    pub fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    /// Name shared by the staging directory and the archive.
    #[must_use]
    pub fn archive_name(&self) -> &ArchiveName {
        &self.archive_name
    }

    /// Upper bound on each external-tool step.
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        self.step_timeout
    }

    /// Whether debug mode is active.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Render the configuration block printed in debug mode.
    ///
    /// The password is always masked.
    #[must_use]
    pub fn summary_lines(&self) -> Vec<String> {
        let rule = "-".repeat(80);
        vec![
            rule.clone(),
            format!("{:^80}", "CONFIGURATION"),
            format!("Database server hostname: {}", self.database.host),
            format!("           Database name: {}", self.database.name),
            format!("       Database username: {}", self.database.user),
            "       Database password: ********".to_owned(),
            format!("            Website name: {}", self.website_name),
            format!("     HTML root directory: {}", self.html_dir),
            format!("           SSL directory: {}", self.ssl_dir),
            format!("            Archive name: {}", self.archive_name),
            format!("     Temporary directory: {}", self.temp_dir),
            format!("        Output directory: {}", self.output_dir),
            format!("            Step timeout: {}s", self.step_timeout.as_secs()),
            rule,
        ]
    }
}

fn require<T>(value: Option<T>, name: &'static str) -> Result<T> {
    value.ok_or(BackupError::MissingField { name })
}

/// Resolve `raw` to a canonical path naming an existing directory.
fn resolve_dir(role: &'static str, raw: &str) -> Result<Utf8PathBuf> {
    let not_found = |reason: String| BackupError::PathNotFound {
        role,
        path: raw.to_owned(),
        reason,
    };

    let resolved = Utf8Path::new(raw)
        .canonicalize_utf8()
        .map_err(|e| not_found(e.to_string()))?;

    if !resolved.is_dir() {
        return Err(not_found("not a directory".to_owned()));
    }

    debug!("resolved {role} directory {raw} to {resolved}");
    Ok(resolved)
}

/// Staging under a source directory would copy the staging tree into itself.
fn reject_temp_inside(
    role: &'static str,
    temp_dir: &Utf8Path,
    source_dir: &Utf8Path,
) -> Result<()> {
    if temp_dir.starts_with(source_dir) {
        return Err(BackupError::TempInsideSource {
            role,
            temp_dir: temp_dir.to_owned(),
            source_dir: source_dir.to_owned(),
        });
    }
    Ok(())
}

/// Resolve the platform temporary directory without failing.
///
/// A default that cannot be canonicalized is used verbatim; staging will
/// report the problem if the directory is genuinely unusable.
fn default_temp_dir(candidate: PathBuf) -> Utf8PathBuf {
    let candidate = Utf8PathBuf::try_from(candidate).unwrap_or_else(|e| {
        warn!("platform temporary directory is not valid UTF-8 ({e}); using {FALLBACK_TEMP_DIR}");
        Utf8PathBuf::from(FALLBACK_TEMP_DIR)
    });

    match candidate.canonicalize_utf8() {
        Ok(resolved) => resolved,
        Err(e) => {
            warn!("could not resolve temporary directory {candidate} ({e}); using it as given");
            candidate
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let not_found = |reason: String| BackupError::PathNotFound {
        role: "output",
        path: ".".to_owned(),
        reason,
    };

    let cwd = std::env::current_dir().map_err(|e| not_found(e.to_string()))?;
    let cwd = Utf8PathBuf::try_from(cwd).map_err(|e| not_found(e.to_string()))?;
    cwd.canonicalize_utf8().map_err(|e| not_found(e.to_string()))
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
