//! External tool execution with a timeout.
//!
//! The database dump is delegated to a command-line tool that may hang on an
//! unreachable server, so every invocation is bounded. Commands are described
//! by [`ToolInvocation`] and executed through the [`CommandExecutor`] trait,
//! letting tests substitute canned results.

use log::debug;
use std::fmt;
use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use wait_timeout::ChildExt;

/// Errors raised while running an external tool.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The executable could not be located.
    #[error("{program} not found; is it installed and on PATH?")]
    NotFound {
        /// Program that was requested.
        program: String,
    },

    /// The process could not be started for another reason.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// Program that was requested.
        program: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The process did not finish in time and was killed.
    #[error("{program} timed out after {seconds} seconds")]
    TimedOut {
        /// Program that was running.
        program: String,
        /// Timeout that elapsed.
        seconds: u64,
    },

    /// Waiting on the process or collecting its output failed.
    #[error("failed to collect output from {program}: {source}")]
    Io {
        /// Program that was running.
        program: String,
        /// The underlying I/O error.
        source: io::Error,
    },

    /// The process exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        /// Program that ran.
        program: String,
        /// Rendered exit status.
        status: String,
        /// Trimmed standard error output.
        stderr: String,
    },
}

/// A fully described command line.
///
/// Environment values may hold secrets, so `Debug` and `Display` only show
/// the variable names.
#[derive(Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Executable name or path.
    pub program: String,
    /// Arguments, excluding the program.
    pub args: Vec<String>,
    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,
}

impl ToolInvocation {
    /// Create an invocation with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add an environment variable for the child.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl fmt::Display for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ToolInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("ToolInvocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .finish()
    }
}

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Run `invocation`, killing it if it outlives `timeout`.
    ///
    /// A non-zero exit status is not an error at this level; callers inspect
    /// the returned [`Output`].
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the process cannot be started, times
    /// out, or its output cannot be read.
    fn run(&self, invocation: &ToolInvocation, timeout: Duration) -> Result<Output, ProcessError>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, invocation: &ToolInvocation, timeout: Duration) -> Result<Output, ProcessError> {
        let program = invocation.program.clone();
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!("running {invocation} (timeout {}s)", timeout.as_secs());
        let mut child = command.spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ProcessError::NotFound {
                    program: program.clone(),
                }
            } else {
                ProcessError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        let io_error = |source| ProcessError::Io {
            program: program.clone(),
            source,
        };

        // Both pipes are read concurrently with the wait.
        let stdout_reader = spawn_drain(child.stdout.take());
        let stderr_reader = spawn_drain(child.stderr.take());

        match child.wait_timeout(timeout).map_err(io_error)? {
            Some(status) => {
                let stdout = join_drain(stdout_reader).map_err(io_error)?;
                let stderr = join_drain(stderr_reader).map_err(io_error)?;
                Ok(Output {
                    status,
                    stdout,
                    stderr,
                })
            }
            None => {
                // The child may already have exited.
                if let Err(e) = child.kill() {
                    debug!("could not kill {program}: {e}");
                }
                if let Err(e) = child.wait() {
                    debug!("could not reap {program}: {e}");
                }
                Err(ProcessError::TimedOut {
                    program,
                    seconds: timeout.as_secs(),
                })
            }
        }
    }
}

/// Run `invocation` and treat a non-zero exit status as an error.
///
/// # Errors
///
/// Returns [`ProcessError::Failed`] when the tool exits unsuccessfully, or any
/// error from [`CommandExecutor::run`].
pub fn run_checked(
    executor: &dyn CommandExecutor,
    invocation: &ToolInvocation,
    timeout: Duration,
) -> Result<Output, ProcessError> {
    let output = executor.run(invocation, timeout)?;
    if output.status.success() {
        return Ok(output);
    }

    Err(ProcessError::Failed {
        program: invocation.program.clone(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
    })
}

fn spawn_drain<R>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = Vec::new();
        if let Some(mut reader) = pipe {
            reader.read_to_end(&mut buffer)?;
        }
        Ok(buffer)
    })
}

fn join_drain(reader: JoinHandle<io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    reader
        .join()
        .map_err(|_| io::Error::other("output reader thread panicked"))?
}
