//! Database export into the staging directory.
//!
//! The dump itself is produced by an external tool. [`DatabaseDumper`] is the
//! seam the pipeline depends on; [`MysqlDumper`] drives `mysqldump` and is
//! the implementation used by the binary.

use crate::config::DatabaseSettings;
use crate::error::{BackupError, Result};
use crate::process::{CommandExecutor, SystemCommandExecutor, ToolInvocation, run_checked};
use camino::{Utf8Path, Utf8PathBuf};
use log::{debug, info};
use std::time::Duration;

/// Default dump executable.
pub const MYSQLDUMP: &str = "mysqldump";

/// Time allowed for the `--version` availability probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Produces a database export file inside a directory.
#[cfg_attr(test, mockall::automock)]
pub trait DatabaseDumper {
    /// Confirm the dump tool can be run, before anything is written.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::DatabaseDump`] when the tool is unavailable.
    fn check_available(&self) -> Result<()>;

    /// Export `database` into `destination`, returning the dump file path.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::DatabaseDump`] when the tool cannot be located,
    /// exits unsuccessfully, exceeds `timeout`, or produces no file.
    fn dump(
        &self,
        database: &DatabaseSettings,
        destination: &Utf8Path,
        timeout: Duration,
    ) -> Result<Utf8PathBuf>;
}

/// Return the dump filename for a database, `<name>.sql`.
///
/// Path separators are replaced so the file always lands directly inside the
/// destination directory.
///
/// # Examples
///
/// ```
/// use lampbackup::dump::dump_filename;
///
/// assert_eq!(dump_filename("wordpress"), "wordpress.sql");
/// assert_eq!(dump_filename("../etc"), ".._etc.sql");
/// ```
#[must_use]
pub fn dump_filename(database_name: &str) -> String {
    format!("{}.sql", database_name.replace(['/', '\\'], "_"))
}

/// Dumps a MySQL/MariaDB database with `mysqldump`.
///
/// The password is passed through the `MYSQL_PWD` environment variable so it
/// does not appear in the process list.
#[derive(Debug, Clone)]
pub struct MysqlDumper<E = SystemCommandExecutor> {
    executor: E,
    program: String,
}

impl MysqlDumper {
    /// Create a dumper that runs `mysqldump` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_executor(SystemCommandExecutor, MYSQLDUMP)
    }
}

impl Default for MysqlDumper {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> MysqlDumper<E> {
    /// Create a dumper with a custom executor and program name.
    #[must_use]
    pub fn with_executor(executor: E, program: impl Into<String>) -> Self {
        Self {
            executor,
            program: program.into(),
        }
    }

    /// Build the command line for dumping `database` into `dump_file`.
    #[must_use]
    pub fn invocation(&self, database: &DatabaseSettings, dump_file: &Utf8Path) -> ToolInvocation {
        ToolInvocation::new(self.program.as_str())
            .arg(format!("--host={}", database.host))
            .arg(format!("--user={}", database.user))
            .arg("--add-drop-table")
            .arg(format!("--result-file={dump_file}"))
            .arg(database.name.as_str())
            .env("MYSQL_PWD", database.password.expose())
    }
}

impl<E: CommandExecutor> DatabaseDumper for MysqlDumper<E> {
    fn check_available(&self) -> Result<()> {
        let probe = ToolInvocation::new(self.program.as_str()).arg("--version");
        run_checked(&self.executor, &probe, PROBE_TIMEOUT).map_err(|e| {
            BackupError::DatabaseDump {
                reason: e.to_string(),
            }
        })?;
        debug!("{} is available", self.program);
        Ok(())
    }

    fn dump(
        &self,
        database: &DatabaseSettings,
        destination: &Utf8Path,
        timeout: Duration,
    ) -> Result<Utf8PathBuf> {
        let dump_file = destination.join(dump_filename(&database.name));
        let invocation = self.invocation(database, &dump_file);

        info!("dumping database {} from {}", database.name, database.host);
        run_checked(&self.executor, &invocation, timeout).map_err(|e| {
            BackupError::DatabaseDump {
                reason: e.to_string(),
            }
        })?;

        if !dump_file.is_file() {
            return Err(BackupError::DatabaseDump {
                reason: format!("{} produced no dump file at {dump_file}", self.program),
            });
        }

        Ok(dump_file)
    }
}
