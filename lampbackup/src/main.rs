//! lampbackup CLI entrypoint.
//!
//! This binary stages a site's HTML and TLS directories with a database dump,
//! archives them to `<website>_<timestamp>.tar.gz` and removes the staging
//! directory.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use lampbackup::archive::TarGzArchiver;
use lampbackup::cli::Cli;
use lampbackup::dump::MysqlDumper;
use lampbackup::error::{BackupError, Result};
use lampbackup::flow::run_backup;
use lampbackup::output::{success_message, version_banner, write_stderr_line};
use std::ffi::OsString;
use std::io::Write;

/// What to do after reading the command line.
enum Invocation {
    Run(Box<Cli>),
    Exit(i32),
}

fn main() {
    let mut stderr = std::io::stderr();
    write_stderr_line(&mut stderr, version_banner());

    let cli = match read_invocation(std::env::args_os()) {
        Invocation::Run(cli) => cli,
        Invocation::Exit(code) => std::process::exit(code),
    };

    init_logging(cli.debug);
    let run_result = run(*cli, &mut stderr);
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn read_invocation(args: impl IntoIterator<Item = OsString>) -> Invocation {
    let args: Vec<OsString> = args.into_iter().collect();
    if args.len() <= 1 {
        if let Err(e) = Cli::command().print_help() {
            log::debug!("could not print help: {e}");
        }
        return Invocation::Exit(0);
    }

    match Cli::try_parse_from(args) {
        Ok(cli) => Invocation::Run(Box::new(cli)),
        Err(err) => {
            if let Err(e) = err.print() {
                log::debug!("could not print usage error: {e}");
            }
            Invocation::Exit(exit_code_for_parse_error(err.kind()))
        }
    }
}

fn exit_code_for_parse_error(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        _ => 1,
    }
}

/// `--debug` lowers the default filter to `debug`; `RUST_LOG` wins over both.
fn init_logging(debug: bool) {
    let default_filter = if debug { "debug" } else { "warn" };
    let env = env_logger::Env::default().default_filter_or(default_filter);
    if let Err(e) = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init()
    {
        log::debug!("logger already installed: {e}");
    }
}

fn run(cli: Cli, stderr: &mut dyn Write) -> Result<()> {
    let config = cli.into_raw_config().validate()?;

    if config.debug() {
        for line in config.summary_lines() {
            write_stderr_line(stderr, line);
        }
    }

    let report = run_backup(
        &config,
        &MysqlDumper::new(),
        &TarGzArchiver::default(),
        stderr,
    )?;
    write_stderr_line(stderr, success_message(&report.archive_path));
    Ok(())
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, error_line(&err));
            1
        }
    }
}

fn error_line(err: &BackupError) -> String {
    format!("Error: {}", err.report())
}
