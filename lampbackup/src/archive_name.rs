//! Archive naming policy for staged backups.
//!
//! A backup is identified by the sanitized website name and the local time
//! at which configuration was validated:
//! `<website>_<YYYY-MM-DD-HH-MM-SS>`. The same name is used for the staging
//! directory, the root directory inside the archive, and the archive file
//! itself (with a `.tar.gz` suffix).

use chrono::{NaiveDateTime, Timelike};
use std::fmt;
use thiserror::Error;

/// `strftime` pattern for the timestamp component.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// File extension appended to the archive name for the compressed output.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Remove every character that is not an ASCII letter or digit.
///
/// An empty result is allowed; the caller decides whether that is useful.
///
/// # Examples
///
/// ```
/// use lampbackup::archive_name::sanitize_website_name;
///
/// assert_eq!(sanitize_website_name("My-Site!"), "MySite");
/// assert_eq!(sanitize_website_name("café.example.com"), "cafexamplecom");
/// assert_eq!(sanitize_website_name("--"), "");
/// ```
#[must_use]
pub fn sanitize_website_name(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// Errors raised when parsing an archive name back into its components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveNameError {
    /// No `_` separates the website from the timestamp.
    #[error("archive name {0:?} has no timestamp separator")]
    MissingSeparator(String),

    /// The website component contains characters sanitization would remove.
    #[error("archive name {0:?} has an unsanitized website component")]
    UnsanitizedWebsite(String),

    /// The timestamp component does not match `YYYY-MM-DD-HH-MM-SS`.
    #[error("archive name {name:?} has an invalid timestamp: {reason}")]
    InvalidTimestamp {
        /// The full name being parsed.
        name: String,
        /// Parser diagnostic.
        reason: String,
    },
}

/// The name shared by a backup's staging directory and archive file.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use lampbackup::archive_name::ArchiveName;
///
/// let at = NaiveDate::from_ymd_opt(2024, 3, 9)
///     .and_then(|d| d.and_hms_opt(7, 5, 0))
///     .expect("valid timestamp");
/// let name = ArchiveName::new("My-Site!", at);
///
/// assert_eq!(name.as_str(), "MySite_2024-03-09-07-05-00");
/// assert_eq!(name.archive_filename(), "MySite_2024-03-09-07-05-00.tar.gz");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    website: String,
    timestamp: NaiveDateTime,
    rendered: String,
}

impl ArchiveName {
    /// Build an archive name, sanitizing `website` first.
    ///
    /// Sub-second precision in `timestamp` is discarded.
    #[must_use]
    pub fn new(website: &str, timestamp: NaiveDateTime) -> Self {
        let website = sanitize_website_name(website);
        let rendered = format!("{website}_{}", timestamp.format(TIMESTAMP_FORMAT));
        let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);
        Self {
            website,
            timestamp,
            rendered,
        }
    }

    /// Return the sanitized website component.
    #[must_use]
    pub fn website(&self) -> &str {
        &self.website
    }

    /// Return the timestamp component at one-second precision.
    #[must_use]
    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Return the rendered name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.rendered
    }

    /// Return the filename of the compressed archive.
    #[must_use]
    pub fn archive_filename(&self) -> String {
        format!("{}{ARCHIVE_EXTENSION}", self.rendered)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

impl TryFrom<&str> for ArchiveName {
    type Error = ArchiveNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let (website, stamp) = value
            .rsplit_once('_')
            .ok_or_else(|| ArchiveNameError::MissingSeparator(value.to_owned()))?;

        if !website.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ArchiveNameError::UnsanitizedWebsite(value.to_owned()));
        }

        let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).map_err(|e| {
            ArchiveNameError::InvalidTimestamp {
                name: value.to_owned(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self::new(website, timestamp))
    }
}
