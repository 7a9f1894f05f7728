//! Behaviour tests for a complete backup run.
//!
//! These scenarios drive the library end to end with a fake database dumper
//! and the real tar+gzip archiver.

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use lampbackup::archive::TarGzArchiver;
use lampbackup::archive_name::{ARCHIVE_EXTENSION, ArchiveName};
use lampbackup::error::BackupError;
use lampbackup::flow::{BackupReport, run_backup};
use lampbackup::pipeline::StagingPipeline;
use lampbackup::test_utils::{FakeArchiver, FakeDumper, SiteFixture, fixed_timestamp};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::collections::BTreeMap;
use std::fs;
use std::io::Read;

const INDEX_PAGE: &[u8] = b"<html><body>Welcome</body></html>";
const LOGO: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Default)]
struct BackupWorld {
    site: Option<SiteFixture>,
    website_name: String,
    debug: bool,
    dumper: FakeDumper,
    result: Option<Result<BackupReport, BackupError>>,
    stderr: Vec<u8>,
}

impl BackupWorld {
    fn site(&self) -> &SiteFixture {
        self.site.as_ref().expect("site not set")
    }

    fn staging_dir(&self) -> Utf8PathBuf {
        let name = self.site().config(&self.website_name, self.debug);
        self.site().temp.join(name.archive_name().as_str())
    }

    fn report(&self) -> &BackupReport {
        match self.result.as_ref().expect("backup has not run") {
            Ok(report) => report,
            Err(err) => panic!("backup failed: {err}"),
        }
    }
}

#[fixture]
fn world() -> BackupWorld {
    BackupWorld::default()
}

fn archive_entries(path: &Utf8Path) -> BTreeMap<String, Vec<u8>> {
    let file = fs::File::open(path).expect("open archive");
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().expect("read archive entries") {
        let mut entry = entry.expect("archive entry");
        let name = entry
            .path()
            .expect("entry path")
            .to_string_lossy()
            .trim_end_matches('/')
            .to_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).expect("read entry");
        entries.insert(name, data);
    }
    entries
}

#[given("a site with an index page and a logo")]
fn given_site(world: &mut BackupWorld) {
    let site = SiteFixture::new();
    SiteFixture::write(&site.html, "index.html", INDEX_PAGE);
    SiteFixture::write(&site.html, "assets/logo.png", LOGO);
    SiteFixture::write(&site.html, ".htaccess", b"Options -Indexes");
    SiteFixture::write(&site.ssl, "fullchain.pem", b"-----BEGIN CERTIFICATE-----");
    world.site = Some(site);
}

#[given("the website name is {name}")]
fn given_website_name(world: &mut BackupWorld, name: String) {
    world.website_name = name;
}

#[given("debug mode is enabled")]
fn given_debug(world: &mut BackupWorld) {
    world.debug = true;
}

#[given("the database dump fails")]
fn given_dump_fails(world: &mut BackupWorld) {
    world.dumper = FakeDumper::failing("Access denied for user 'wp'@'localhost'");
}

#[given("the dump tool is not installed")]
fn given_dump_tool_missing(world: &mut BackupWorld) {
    world.dumper = FakeDumper::unavailable();
}

#[when("the backup runs")]
fn when_backup_runs(world: &mut BackupWorld) {
    let config = world.site().config(&world.website_name, world.debug);
    let mut stderr = Vec::new();
    let result = run_backup(
        &config,
        &world.dumper,
        &TarGzArchiver::default(),
        &mut stderr,
    );
    world.stderr = stderr;
    world.result = Some(result);
}

#[when("the staging directory is prepared twice")]
fn when_prepared_twice(world: &mut BackupWorld) {
    let config = world.site().config(&world.website_name, world.debug);
    let archiver = FakeArchiver::default();
    let mut pipeline = StagingPipeline::new(&config, &world.dumper, &archiver);

    pipeline.prepare().expect("first prepare");
    pipeline.copy_html_files().expect("copy html");
    pipeline.prepare().expect("second prepare");
}

#[then("the backup succeeds")]
fn then_backup_succeeds(world: &mut BackupWorld) {
    let report = world.report();
    assert!(report.archive_path.is_file(), "archive missing");
}

#[then("the archive is named {file_name}")]
fn then_archive_named(world: &mut BackupWorld, file_name: String) {
    let report = world.report();
    assert_eq!(report.archive_path.file_name(), Some(file_name.as_str()));
    assert_eq!(report.archive_path.parent(), Some(world.site().output.as_path()));

    let stem = file_name
        .strip_suffix(ARCHIVE_EXTENSION)
        .expect("archive extension");
    let parsed = ArchiveName::try_from(stem).expect("archive name parses");
    assert_eq!(parsed.timestamp(), fixed_timestamp());
    assert_eq!(parsed.archive_filename(), file_name);
}

#[then("the archive holds the index page and logo unchanged")]
fn then_archive_holds_content(world: &mut BackupWorld) {
    let entries = archive_entries(&world.report().archive_path);
    let root = world.staging_dir();
    let root = root.file_name().expect("staging name");
    assert_eq!(
        entries.get(&format!("{root}/html/index.html")).map(Vec::as_slice),
        Some(INDEX_PAGE)
    );
    assert_eq!(
        entries.get(&format!("{root}/html/assets/logo.png")).map(Vec::as_slice),
        Some(LOGO)
    );
    assert!(entries.contains_key(&format!("{root}/html/.htaccess")));
}

#[then("the archive contains {entry}")]
fn then_archive_contains(world: &mut BackupWorld, entry: String) {
    let entries = archive_entries(&world.report().archive_path);
    assert!(
        entries.contains_key(&entry),
        "{entry} not in {:?}",
        entries.keys().collect::<Vec<_>>()
    );
}

#[then("the staging directory has been removed")]
fn then_staging_removed(world: &mut BackupWorld) {
    assert!(!world.staging_dir().exists());
}

#[then("the staging directory still holds the copied files")]
fn then_staging_kept(world: &mut BackupWorld) {
    let staging = world.staging_dir();
    assert_eq!(
        fs::read(staging.join("html/index.html")).expect("read index"),
        INDEX_PAGE
    );
    assert_eq!(
        fs::read(staging.join("html/assets/logo.png")).expect("read logo"),
        LOGO
    );
    assert!(staging.join("wordpress.sql").is_file());
}

#[then("the progress output names the staging path")]
fn then_output_names_staging(world: &mut BackupWorld) {
    let output = String::from_utf8_lossy(&world.stderr);
    assert!(output.contains(&format!("Staging path: {}", world.staging_dir())));
}

#[then("the staging directory contains empty html and ssl directories")]
fn then_fresh_tree(world: &mut BackupWorld) {
    let staging = world.staging_dir();
    for subdir in ["html", "ssl"] {
        let path = staging.join(subdir);
        assert!(path.is_dir(), "{path} missing");
        assert_eq!(
            fs::read_dir(&path).expect("read dir").count(),
            0,
            "{path} is not empty"
        );
    }
}

#[then("the backup fails with a database dump error")]
fn then_dump_error(world: &mut BackupWorld) {
    match world.result.as_ref().expect("backup has not run") {
        Err(BackupError::DatabaseDump { .. }) => {}
        other => panic!("expected a database dump error, got {other:?}"),
    }
}

#[then("no archive is written")]
fn then_no_archive(world: &mut BackupWorld) {
    let count = fs::read_dir(&world.site().output).expect("read output").count();
    assert_eq!(count, 0);
}

#[then("no step was announced")]
fn then_no_steps(world: &mut BackupWorld) {
    let output = String::from_utf8_lossy(&world.stderr);
    assert!(!output.contains("Executing step"), "unexpected output: {output}");
    assert!(!world.staging_dir().exists());
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "A complete backup archives the site and removes staging"
)]
fn scenario_complete_backup(world: BackupWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Debug mode keeps the staging directory"
)]
fn scenario_debug_keeps_staging(world: BackupWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "Preparing twice leaves a fresh staging tree"
)]
fn scenario_prepare_twice(world: BackupWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "A failed dump leaves nothing behind"
)]
fn scenario_failed_dump(world: BackupWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/backup.feature",
    name = "A missing dump tool is detected before staging"
)]
fn scenario_missing_dump_tool(world: BackupWorld) {
    let _ = world;
}
