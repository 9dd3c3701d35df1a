use std::{fmt, future::Future, io, net::SocketAddr, path::Path, process::ExitStatus};

use thiserror::Error;
use tokio::process::Command;
use tracing::info;

/// Operations delegated to the web framework's management tooling.
pub trait Framework {
    /// Applies every pending schema migration.
    fn apply_migrations(&self) -> impl Future<Output = Result<(), CommandError>>;

    /// Loads a fixture file into the database.
    fn load_snapshot(&self, path: &Path) -> impl Future<Output = Result<(), CommandError>>;

    /// Starts the long-running server. Where the process can be replaced
    /// this only returns on failure; otherwise it returns the server's exit
    /// code once it stops.
    fn launch_server(&self, addr: SocketAddr) -> impl Future<Output = Result<i32, CommandError>>;
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start `{command}`: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("`{command}` {outcome}")]
    Failed { command: String, outcome: Outcome },
}

impl CommandError {
    /// The child's exit code, when it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Failed {
                outcome: Outcome::Exited(code),
                ..
            } => Some(*code),
            _ => None,
        }
    }
}

/// How a failed child process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Exited(i32),
    Signalled,
}

impl From<ExitStatus> for Outcome {
    fn from(status: ExitStatus) -> Self {
        match status.code() {
            Some(code) => Self::Exited(code),
            None => Self::Signalled,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signalled => f.write_str("was terminated by a signal"),
        }
    }
}

/// Runs `<manage> <subcommand> ...` with inherited stdio and environment.
#[derive(Debug, Clone)]
pub struct ManageCommand {
    program: String,
    prefix: Vec<String>,
}

impl ManageCommand {
    /// `prefix` goes before every subcommand, e.g. `python` with `["manage.py"]`.
    pub fn new(program: impl Into<String>, prefix: Vec<String>) -> Self {
        Self {
            program: program.into(),
            prefix,
        }
    }

    fn args<'a>(&'a self, args: &'a [&'a str]) -> impl Iterator<Item = &'a str> {
        self.prefix
            .iter()
            .map(String::as_str)
            .chain(args.iter().copied())
    }

    fn describe(&self, args: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args(args))
            .collect::<Vec<_>>()
            .join(" ")
    }

    async fn run(&self, args: &[&str]) -> Result<(), CommandError> {
        let command = self.describe(args);
        info!(stage = "framework", %command, "running");

        let status = Command::new(&self.program)
            .args(self.args(args))
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Failed {
                command,
                outcome: status.into(),
            })
        }
    }
}

impl Framework for ManageCommand {
    async fn apply_migrations(&self) -> Result<(), CommandError> {
        self.run(&["migrate", "--noinput"]).await
    }

    async fn load_snapshot(&self, path: &Path) -> Result<(), CommandError> {
        let path = path.to_string_lossy();
        self.run(&["loaddata", &*path]).await
    }

    #[cfg(unix)]
    async fn launch_server(&self, addr: SocketAddr) -> Result<i32, CommandError> {
        use std::os::unix::process::CommandExt;

        let addr = addr.to_string();
        let args = ["runserver", addr.as_str()];
        let command = self.describe(&args);
        info!(stage = "framework", %command, "handing off to server");

        let source = std::process::Command::new(&self.program)
            .args(self.args(&args))
            .exec();
        Err(CommandError::Spawn { command, source })
    }

    #[cfg(not(unix))]
    async fn launch_server(&self, addr: SocketAddr) -> Result<i32, CommandError> {
        let addr = addr.to_string();
        let args = ["runserver", addr.as_str()];
        let command = self.describe(&args);
        info!(stage = "framework", %command, "starting server");

        let status = Command::new(&self.program)
            .args(self.args(&args))
            .status()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.clone(),
                source,
            })?;
        Ok(status.code().unwrap_or(1))
    }
}
