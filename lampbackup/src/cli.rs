//! CLI argument definitions for lampbackup.
//!
//! Flags use the camel-case spelling of earlier releases (`--dbName`,
//! `--htmlPath`, ...) so existing cron entries keep working. Parsed
//! arguments are converted into a [`RawConfig`] for validation.

use crate::config::{DEFAULT_DB_HOST, Password, RawConfig};
use clap::Parser;
use std::time::Duration;

/// Environment variable consulted when `--dbPass` is not given.
pub const DB_PASS_ENV: &str = "LAMPBACKUP_DB_PASS";

/// Back up a LAMP-stack website.
#[derive(Parser, Debug, Clone)]
#[command(name = "lampbackup")]
#[command(version, about)]
#[command(long_about = concat!(
    "Back up a website running on a LAMP stack.\n\n",
    "The document root, the TLS certificate directory and a dump of the site's ",
    "MySQL/MariaDB database are staged together in a temporary directory, ",
    "compressed into <website>_<timestamp>.tar.gz in the output directory, and ",
    "the staging directory is removed.",
))]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Back up a WordPress site into the current directory:\n",
    "    $ lampbackup --dbName wordpress --dbUser wp --dbPass secret \\\n",
    "        --websiteName example.com --htmlPath /var/www/html \\\n",
    "        --sslPath /etc/letsencrypt\n\n",
    "  Keep the staging directory for inspection:\n",
    "    $ LAMPBACKUP_DB_PASS=secret lampbackup --debug ...",
))]
pub struct Cli {
    /// Database server hostname.
    #[arg(long = "dbHost", value_name = "HOST", default_value = DEFAULT_DB_HOST)]
    pub db_host: String,

    /// Name of the database to dump.
    #[arg(long = "dbName", value_name = "NAME")]
    pub db_name: Option<String>,

    /// Database user.
    #[arg(long = "dbUser", value_name = "USER")]
    pub db_user: Option<String>,

    /// Database password.
    #[arg(
        long = "dbPass",
        value_name = "PASSWORD",
        env = DB_PASS_ENV,
        hide_env_values = true
    )]
    pub db_pass: Option<String>,

    /// Website name; only ASCII letters and digits are kept.
    #[arg(long = "websiteName", value_name = "NAME")]
    pub website_name: Option<String>,

    /// Document root to back up.
    #[arg(long = "htmlPath", value_name = "DIR")]
    pub html_path: Option<String>,

    /// TLS certificate directory to back up.
    #[arg(long = "sslPath", value_name = "DIR")]
    pub ssl_path: Option<String>,

    /// Directory for the staging tree [default: platform temporary directory].
    #[arg(long = "tempPath", value_name = "DIR")]
    pub temp_path: Option<String>,

    /// Directory for the archive [default: current directory].
    #[arg(long = "outputPath", value_name = "DIR")]
    pub output_path: Option<String>,

    /// Seconds allowed for the database dump before it is killed.
    #[arg(
        long = "stepTimeout",
        value_name = "SECONDS",
        default_value_t = 300,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub step_timeout: u64,

    /// Show the configuration, log verbosely and keep the staging directory.
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Convert parsed arguments into configuration awaiting validation.
    #[must_use]
    pub fn into_raw_config(self) -> RawConfig {
        RawConfig {
            db_host: Some(self.db_host),
            db_name: self.db_name,
            db_user: self.db_user,
            db_pass: self.db_pass.map(Password::from),
            website_name: self.website_name,
            html_path: self.html_path,
            ssl_path: self.ssl_path,
            temp_path: self.temp_path,
            output_path: self.output_path,
            step_timeout: Some(Duration::from_secs(self.step_timeout)),
            debug: self.debug,
        }
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
