//! The fixed six-step backup run.
//!
//! [`run_backup`] checks that the dump tool is available, then drives a
//! [`StagingPipeline`] through its steps, announcing each one. The first
//! failure stops the run: the staging directory is removed on a best-effort
//! basis (or kept and reported in debug mode) and the step's error is
//! returned unchanged.

use crate::archive::Archiver;
use crate::config::Config;
use crate::dump::DatabaseDumper;
use crate::error::{BackupError, Result};
use crate::output::{
    abandoned_staging_message, abort_message, skipped_cleanup_lines, step_message,
    write_stderr_line,
};
use crate::pipeline::{CleanupOutcome, StagingPipeline};
use camino::Utf8PathBuf;
use log::{info, warn};
use std::io::Write;

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    /// The archive written to the output directory.
    pub archive_path: Utf8PathBuf,
    /// What happened to the staging directory.
    pub cleanup: CleanupOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackupStep {
    Prepare,
    CopyHtml,
    CopySsl,
    DumpDatabase,
    Archive,
    Cleanup,
}

impl BackupStep {
    const fn number(self) -> usize {
        match self {
            Self::Prepare => 1,
            Self::CopyHtml => 2,
            Self::CopySsl => 3,
            Self::DumpDatabase => 4,
            Self::Archive => 5,
            Self::Cleanup => 6,
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Prepare => "Preparing staging path",
            Self::CopyHtml => "Copying HTML files",
            Self::CopySsl => "Copying SSL files",
            Self::DumpDatabase => "Copying database to dump file",
            Self::Archive => "Archiving staging path",
            Self::Cleanup => "Removing staging path",
        }
    }

    const fn failure(self) -> &'static str {
        match self {
            Self::Prepare => "prepare staging path",
            Self::CopyHtml => "copy HTML files",
            Self::CopySsl => "copy SSL files",
            Self::DumpDatabase => "dump SQL",
            Self::Archive => "archive staging path",
            Self::Cleanup => "remove staging path",
        }
    }
}

struct StepFailure {
    step: BackupStep,
    error: BackupError,
}

/// Run the whole backup for `config`.
///
/// Progress lines are written to `stderr`. Nothing is written to disk if the
/// dump tool is unavailable.
///
/// # Errors
///
/// Returns the error of the first step that failed. A failure of the
/// best-effort cleanup that follows it is logged, not returned.
pub fn run_backup(
    config: &Config,
    dumper: &dyn DatabaseDumper,
    archiver: &dyn Archiver,
    stderr: &mut dyn Write,
) -> Result<BackupReport> {
    dumper.check_available()?;

    let mut pipeline = StagingPipeline::new(config, dumper, archiver);
    match run_steps(&mut pipeline, config.debug(), stderr) {
        Ok(report) => {
            info!("backup written to {}", report.archive_path);
            Ok(report)
        }
        Err(StepFailure { step, error }) => {
            write_stderr_line(stderr, abort_message(step.failure()));
            if step != BackupStep::Cleanup {
                abandon_staging(&mut pipeline, stderr);
            }
            Err(error)
        }
    }
}

fn run_steps(
    pipeline: &mut StagingPipeline<'_>,
    debug: bool,
    stderr: &mut dyn Write,
) -> std::result::Result<BackupReport, StepFailure> {
    execute(stderr, BackupStep::Prepare, || pipeline.prepare().map(|_| ()))?;
    execute(stderr, BackupStep::CopyHtml, || pipeline.copy_html_files())?;
    execute(stderr, BackupStep::CopySsl, || pipeline.copy_ssl_files())?;
    execute(stderr, BackupStep::DumpDatabase, || pipeline.dump_database())?;
    let archive_path = execute(stderr, BackupStep::Archive, || pipeline.archive())?;

    let cleanup = if debug {
        for line in skipped_cleanup_lines(BackupStep::Cleanup.number(), pipeline.staging_dir()) {
            write_stderr_line(stderr, line);
        }
        pipeline.cleanup().map_err(|error| StepFailure {
            step: BackupStep::Cleanup,
            error,
        })?
    } else {
        execute(stderr, BackupStep::Cleanup, || pipeline.cleanup())?
    };

    Ok(BackupReport {
        archive_path,
        cleanup,
    })
}

fn execute<T>(
    stderr: &mut dyn Write,
    step: BackupStep,
    action: impl FnOnce() -> Result<T>,
) -> std::result::Result<T, StepFailure> {
    write_stderr_line(stderr, step_message(step.number(), step.description()));
    action().map_err(|error| StepFailure { step, error })
}

fn abandon_staging(pipeline: &mut StagingPipeline<'_>, stderr: &mut dyn Write) {
    match pipeline.cleanup() {
        Ok(outcome) => write_stderr_line(stderr, abandoned_staging_message(&outcome)),
        Err(e) => warn!("best-effort cleanup failed: {}", e.report()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarGzArchiver;
    use crate::dump::MockDatabaseDumper;
    use crate::test_utils::{FakeArchiver, FakeDumper, SiteFixture};
    use rstest::{fixture, rstest};

    const STAGING_NAME: &str = "MySite_2024-06-01-12-00-00";

    #[fixture]
    fn site() -> SiteFixture {
        let site = SiteFixture::new();
        SiteFixture::write(&site.html, "index.html", b"<h1>home</h1>");
        SiteFixture::write(&site.ssl, "fullchain.pem", b"CHAIN");
        site
    }

    fn lines(stderr: &[u8]) -> Vec<String> {
        String::from_utf8_lossy(stderr)
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[rstest]
    fn successful_run_announces_six_steps_and_cleans_up(site: SiteFixture) {
        let config = site.config("My-Site!", false);
        let dumper = FakeDumper::succeeding();
        let mut stderr = Vec::new();

        let report =
            run_backup(&config, &dumper, &TarGzArchiver::default(), &mut stderr).expect("run");

        assert_eq!(
            report.archive_path,
            site.output.join(format!("{STAGING_NAME}.tar.gz"))
        );
        assert!(report.archive_path.is_file());
        assert_eq!(
            report.cleanup,
            CleanupOutcome::Removed(site.temp.join(STAGING_NAME))
        );
        assert!(!site.temp.join(STAGING_NAME).exists());
        assert_eq!(
            lines(&stderr),
            vec![
                "Executing step 1: Preparing staging path",
                "Executing step 2: Copying HTML files",
                "Executing step 3: Copying SSL files",
                "Executing step 4: Copying database to dump file",
                "Executing step 5: Archiving staging path",
                "Executing step 6: Removing staging path",
            ]
        );
        assert_eq!(dumper.probes(), 1);
    }

    #[rstest]
    fn debug_run_skips_cleanup_and_reports_path(site: SiteFixture) {
        let config = site.config("My-Site!", true);
        let mut stderr = Vec::new();

        let report = run_backup(
            &config,
            &FakeDumper::succeeding(),
            &FakeArchiver::default(),
            &mut stderr,
        )
        .expect("run");

        let staging = site.temp.join(STAGING_NAME);
        assert_eq!(report.cleanup, CleanupOutcome::Preserved(staging.clone()));
        assert!(staging.join("html/index.html").is_file());
        assert!(staging.join("wordpress.sql").is_file());
        let output = lines(&stderr);
        assert!(output.contains(&"Skipping step 6: (staging path will not be removed)".to_owned()));
        assert!(output.contains(&format!("Staging path: {staging}")));
        assert!(!output.iter().any(|l| l.starts_with("Executing step 6")));
    }

    #[rstest]
    fn unavailable_dump_tool_stops_before_any_mutation(site: SiteFixture) {
        let config = site.config("My-Site!", false);
        let dumper = FakeDumper::unavailable();
        let archiver = FakeArchiver::default();
        let mut stderr = Vec::new();

        let err = run_backup(&config, &dumper, &archiver, &mut stderr).expect_err("must fail");

        assert!(matches!(err, BackupError::DatabaseDump { .. }));
        assert!(stderr.is_empty());
        assert!(!site.temp.join(STAGING_NAME).exists());
        assert_eq!(dumper.dumps(), 0);
        assert!(archiver.calls().is_empty());
    }

    #[rstest]
    fn dump_failure_cleans_up_and_returns_the_step_error(site: SiteFixture) {
        let config = site.config("My-Site!", false);
        let archiver = FakeArchiver::default();
        let mut stderr = Vec::new();

        let err = run_backup(
            &config,
            &FakeDumper::failing("Access denied for user 'wp'"),
            &archiver,
            &mut stderr,
        )
        .expect_err("must fail");

        assert!(
            matches!(&err, BackupError::DatabaseDump { reason } if reason.contains("Access denied"))
        );
        assert!(!site.temp.join(STAGING_NAME).exists());
        assert!(archiver.calls().is_empty());
        let output = lines(&stderr);
        assert_eq!(
            output.last().map(String::as_str),
            Some(format!("Removed staging path {}", site.temp.join(STAGING_NAME)).as_str())
        );
        assert!(output.contains(&"Exiting (could not dump SQL)".to_owned()));
    }

    #[rstest]
    fn failure_in_debug_mode_keeps_staging_for_diagnosis(site: SiteFixture) {
        let config = site.config("My-Site!", true);
        let mut stderr = Vec::new();

        let err = run_backup(
            &config,
            &FakeDumper::succeeding(),
            &FakeArchiver::failing("disk full"),
            &mut stderr,
        )
        .expect_err("must fail");

        assert!(matches!(err, BackupError::Archive { .. }));
        let staging = site.temp.join(STAGING_NAME);
        assert!(staging.join("wordpress.sql").is_file());
        assert!(
            lines(&stderr).contains(&format!("Staging path kept for inspection: {staging}"))
        );
    }

    #[rstest]
    fn copy_failure_stops_before_dump(site: SiteFixture) {
        let config = site.config("My-Site!", false);
        std::fs::remove_dir_all(&site.ssl).expect("remove ssl source");
        let mut dumper = MockDatabaseDumper::new();
        dumper.expect_check_available().times(1).returning(|| Ok(()));
        dumper.expect_dump().never();
        let mut stderr = Vec::new();

        let err = run_backup(&config, &dumper, &FakeArchiver::default(), &mut stderr)
            .expect_err("must fail");

        assert!(matches!(err, BackupError::Copy { .. }));
        assert!(!site.temp.join(STAGING_NAME).exists());
        assert!(!lines(&stderr).iter().any(|l| l.starts_with("Executing step 4")));
    }
}
