//! lampbackup library.
//!
//! This crate backs up a website running on a LAMP stack. The document root,
//! the TLS directory and a database dump are staged together in a temporary
//! directory, compressed into a single `.tar.gz`, and the staging directory is
//! removed. It is used by the `lampbackup` binary and can be driven
//! programmatically with substitute dumpers and archivers for testing.
//!
//! # Modules
//!
//! - [`archive`] - Tar+gzip compression of the staging tree
//! - [`archive_name`] - The `website_YYYY-MM-DD-HH-MM-SS` naming scheme
//! - [`cli`] - Command-line argument definitions
//! - [`config`] - Two-phase configuration and validation
//! - [`copy`] - Recursive directory copying
//! - [`dump`] - Database export through `mysqldump`
//! - [`error`] - Error types
//! - [`flow`] - The six-step backup run
//! - [`output`] - User-facing progress messages
//! - [`pipeline`] - Staging directory lifecycle and step ordering
//! - [`process`] - External tool execution with timeouts

pub mod archive;
pub mod archive_name;
pub mod cli;
pub mod config;
pub mod copy;
pub mod dump;
pub mod error;
pub mod flow;
pub mod output;
pub mod pipeline;
pub mod process;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
