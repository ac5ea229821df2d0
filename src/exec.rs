//! External process execution behind an injectable [`Executor`].
use anyhow::{Context as _, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio as ProcessStdio};

/// Program prepended to a command line that needs elevated privileges.
pub const ELEVATION_PROGRAM: &str = "sudo";

/// How the standard streams of a spawned process are wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stdio {
    /// Inherit stdin, stdout and stderr (interactive package managers).
    #[default]
    Inherit,
    /// Capture stdout; stdin and stderr stay attached so prompts still work.
    CaptureStdout,
    /// Capture stdout and stderr (quiet probes).
    Quiet,
}

/// A fully described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// Program name or path.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory, if not the current one.
    pub dir: Option<PathBuf>,
    /// Extra environment variables.
    pub env: Vec<(String, String)>,
    /// Whether to run the program through [`ELEVATION_PROGRAM`].
    pub elevated: bool,
    /// Stream wiring.
    pub stdio: Stdio,
}

impl CommandLine {
    /// Describe `program` invoked with `args`.
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
            dir: None,
            env: Vec::new(),
            elevated: false,
            stdio: Stdio::Inherit,
        }
    }

    /// Run inside `dir`.
    #[must_use]
    pub fn in_dir(mut self, dir: &Path) -> Self {
        self.dir = Some(dir.to_path_buf());
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Request elevated privileges.
    #[must_use]
    pub const fn elevated(mut self, elevated: bool) -> Self {
        self.elevated = elevated;
        self
    }

    /// Capture stdout, leaving stdin/stderr attached.
    #[must_use]
    pub const fn capture_stdout(mut self) -> Self {
        self.stdio = Stdio::CaptureStdout;
        self
    }

    /// Capture both output streams.
    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.stdio = Stdio::Quiet;
        self
    }

    /// The program actually spawned and its full argument list, with the
    /// elevation wrapper applied.
    #[must_use]
    pub fn argv(&self) -> (&str, Vec<&str>) {
        let args = self.args.iter().map(String::as_str);
        if self.elevated {
            let mut argv = vec![self.program.as_str()];
            argv.extend(args);
            (ELEVATION_PROGRAM, argv)
        } else {
            (self.program.as_str(), args.collect())
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (program, args) = self.argv();
        write!(f, "{program}")?;
        for arg in args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        if let Some(dir) = &self.dir {
            write!(f, " (in {})", dir.display())?;
        }
        Ok(())
    }
}

/// Result of a command execution.
#[derive(Debug, Clone, Default)]
pub struct ExecResult {
    /// Captured stdout, lossily decoded.
    pub stdout: String,
    /// Captured stdout bytes, for binary payloads.
    pub stdout_bytes: Vec<u8>,
    /// Captured stderr (empty unless [`Stdio::Quiet`]).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, if the process was not killed by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// A synthetic successful result with no output.
    #[must_use]
    pub fn synthetic_success() -> Self {
        Self {
            success: true,
            code: Some(0),
            ..Self::default()
        }
    }
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            stdout_bytes: output.stdout,
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over process execution so steps can be tested without
/// spawning real programs.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Spawn `cmd` and wait for it. A non-zero exit is reported through
    /// [`ExecResult::success`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    fn execute(&self, cmd: &CommandLine) -> Result<ExecResult>;

    /// Check if a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn execute(&self, cmd: &CommandLine) -> Result<ExecResult> {
        let (program, args) = cmd.argv();
        let mut command = Command::new(program);
        command.args(&args);
        if let Some(dir) = &cmd.dir {
            command.current_dir(dir);
        }
        for (k, v) in &cmd.env {
            command.env(k, v);
        }

        let (stdout, stderr) = match cmd.stdio {
            Stdio::Inherit => (ProcessStdio::inherit(), ProcessStdio::inherit()),
            Stdio::CaptureStdout => (ProcessStdio::piped(), ProcessStdio::inherit()),
            Stdio::Quiet => (ProcessStdio::piped(), ProcessStdio::piped()),
        };
        let output = command
            .stdin(ProcessStdio::inherit())
            .stdout(stdout)
            .stderr(stderr)
            .output()
            .with_context(|| format!("failed to execute: {cmd}"))?;

        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}
