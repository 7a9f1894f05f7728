//! Compression of the staging tree into a single archive.
//!
//! [`Archiver`] is the seam the pipeline depends on. [`TarGzArchiver`]
//! writes a gzip-compressed tarball whose entries are rooted at the archive
//! name, mirroring `tar -czf <name>.tar.gz <name>/`.
//!
//! The archive is first written to a hidden temporary file in the output
//! directory and renamed into place once complete, so a failure never leaves
//! a truncated `.tar.gz` next to good backups.

use crate::archive_name::ARCHIVE_EXTENSION;
use crate::error::{BackupError, Result};
use camino::{Utf8Path, Utf8PathBuf};
use flate2::Compression;
use flate2::write::GzEncoder;
use log::{debug, info};
use std::io;

/// Compresses a directory tree into an archive file.
#[cfg_attr(test, mockall::automock)]
pub trait Archiver {
    /// Archive `source` under the top-level directory `root_name`, writing
    /// the result into `output_dir`. Returns the archive path.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::Archive`] if reading the tree or writing the
    /// archive fails.
    fn archive(
        &self,
        source: &Utf8Path,
        root_name: &str,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf>;
}

/// Writes `<root_name>.tar.gz` using the `tar` and `flate2` crates.
#[derive(Debug, Clone, Copy)]
pub struct TarGzArchiver {
    compression: Compression,
}

impl TarGzArchiver {
    /// Create an archiver with the given gzip level (0-9).
    #[must_use]
    pub fn with_level(level: u32) -> Self {
        Self {
            compression: Compression::new(level.min(9)),
        }
    }
}

impl Default for TarGzArchiver {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
        }
    }
}

impl Archiver for TarGzArchiver {
    fn archive(
        &self,
        source: &Utf8Path,
        root_name: &str,
        output_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf> {
        let archive_path = output_dir.join(format!("{root_name}{ARCHIVE_EXTENSION}"));
        info!("archiving {source} to {archive_path}");

        write_tar_gz(source, root_name, output_dir, &archive_path, self.compression).map_err(
            |e| BackupError::Archive {
                reason: format!("{archive_path}: {e}"),
            },
        )?;

        Ok(archive_path)
    }
}

fn write_tar_gz(
    source: &Utf8Path,
    root_name: &str,
    output_dir: &Utf8Path,
    archive_path: &Utf8Path,
    compression: Compression,
) -> io::Result<()> {
    let partial = tempfile::Builder::new()
        .prefix(".lampbackup-")
        .suffix(".partial")
        .tempfile_in(output_dir)?;

    let encoder = GzEncoder::new(partial.as_file(), compression);
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(root_name, source)?;
    let encoder = builder.into_inner()?;
    encoder.finish()?;
    partial.as_file().sync_all()?;

    partial.persist(archive_path).map_err(|e| e.error)?;
    debug!("archive {archive_path} complete");
    Ok(())
}
