//! Idempotent provisioning steps and the environment they run in.
//!
//! A configuration compiles to an ordered list of [`Step`]s.  Every step
//! performs its side effects through an [`Environment`], which applies the
//! dry-run, elevation and overwrite policies uniformly.
pub mod context;
pub mod packages;
pub mod secrets;
pub mod symlinks;
pub mod toolchain;

pub use context::{Environment, Options, SymlinkOutcome};
pub use packages::{EnsureAurHelper, InstallPackages, PackageManager};
pub use secrets::CopySecretsToDisk;
pub use symlinks::{ApplySymlinks, Link};
pub use toolchain::{CargoInstall, EnsureRustInstalled};

use std::fmt;

use anyhow::Result;

/// Lists up to this many items are spelled out in step descriptions.
pub const INLINE_LIST_LIMIT: usize = 5;

/// Describe `items` for a step description.
///
/// One item is named on its own, a short list is joined with commas and a
/// long one collapses to a count.
///
/// # Examples
///
/// ```
/// use provision_cli::steps::summarize;
///
/// assert_eq!(summarize(&["git"], "packages"), "git");
/// assert_eq!(summarize(&["git", "curl"], "packages"), "git, curl");
/// assert_eq!(summarize(&["a", "b", "c", "d", "e"], "packages"), "5 packages");
/// ```
#[must_use]
pub fn summarize<S: AsRef<str>>(items: &[S], noun: &str) -> String {
    match items {
        [single] => single.as_ref().to_string(),
        _ if items.len() < INLINE_LIST_LIMIT => items
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", "),
        _ => format!("{} {noun}", items.len()),
    }
}

/// Outcome of a step that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The step ran and the system is now in the wanted state.
    Ok,
    /// The step had nothing to do.
    Skipped(String),
    /// The step ran in dry-run mode.
    DryRun,
}

/// Counters for steps that handle many items.
///
/// # Examples
///
/// ```
/// use provision_cli::steps::StepStats;
///
/// let stats = StepStats { changed: 2, already_ok: 1, skipped: 0 };
/// assert_eq!(stats.summary(false), "2 changed, 1 already ok");
/// assert_eq!(stats.summary(true), "2 would change, 1 already ok");
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepStats {
    /// Number of items changed or applied.
    pub changed: u32,
    /// Number of items already in the correct state.
    pub already_ok: u32,
    /// Number of items skipped because of a conflict or missing input.
    pub skipped: u32,
}

impl StepStats {
    /// Create a new empty stats counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the summary string (e.g. "3 changed, 10 already ok, 1 skipped").
    #[must_use]
    pub fn summary(&self, dry_run: bool) -> String {
        let verb = if dry_run { "would change" } else { "changed" };
        if self.skipped > 0 {
            format!(
                "{} {verb}, {} already ok, {} skipped",
                self.changed, self.already_ok, self.skipped
            )
        } else {
            format!("{} {verb}, {} already ok", self.changed, self.already_ok)
        }
    }

    /// Log the summary and return the matching [`StepResult`].
    #[must_use]
    pub fn finish(self, env: &Environment) -> StepResult {
        env.log.info(&self.summary(env.dry_run));
        if env.dry_run {
            StepResult::DryRun
        } else {
            StepResult::Ok
        }
    }
}

/// A single idempotent unit of provisioning work.
pub trait Action {
    /// Short identifier used to scope log messages (e.g. `pacman`).
    fn name(&self) -> &str;

    /// Human-readable description shown as the stage header and in the
    /// summary.
    fn description(&self) -> String;

    /// Bring the system into the state this step describes.
    ///
    /// # Errors
    ///
    /// Returns an error if the step cannot complete, such as when a command
    /// exits non-zero, a download fails or the vault cannot be unlocked.
    fn run(&self, env: &Environment) -> Result<StepResult>;
}

/// Every kind of step a recipe can contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Install packages with pacman or the AUR helper.
    InstallPackages(InstallPackages),
    /// Build and install the AUR helper if it is missing.
    EnsureAurHelper(EnsureAurHelper),
    /// Link dotfiles into place.
    ApplySymlinks(ApplySymlinks),
    /// Install rustup and a default toolchain if rustup is missing.
    EnsureRustInstalled(EnsureRustInstalled),
    /// Install crates with `cargo install`.
    CargoInstall(CargoInstall),
    /// Copy vault attachments to files on disk.
    CopySecretsToDisk(CopySecretsToDisk),
}

impl Step {
    fn action(&self) -> &dyn Action {
        match self {
            Self::InstallPackages(step) => step,
            Self::EnsureAurHelper(step) => step,
            Self::ApplySymlinks(step) => step,
            Self::EnsureRustInstalled(step) => step,
            Self::CargoInstall(step) => step,
            Self::CopySecretsToDisk(step) => step,
        }
    }
}

impl Action for Step {
    fn name(&self) -> &str {
        self.action().name()
    }

    fn description(&self) -> String {
        self.action().description()
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        self.action().run(env)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

macro_rules! step_from {
    ($($variant:ident),+ $(,)?) => {
        $(
            impl From<$variant> for Step {
                fn from(step: $variant) -> Self {
                    Self::$variant(step)
                }
            }
        )+
    };
}

step_from!(
    InstallPackages,
    EnsureAurHelper,
    ApplySymlinks,
    EnsureRustInstalled,
    CargoInstall,
    CopySecretsToDisk,
);

/// Shared helpers for step unit tests.
///
/// Provides a recording executor, a capturing logger and an environment
/// factory so each step test module does not have to duplicate them.
#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
pub mod test_helpers {
    use std::collections::{HashSet, VecDeque};
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use crate::exec::{CommandLine, ExecResult, Executor};
    use crate::logging::{Log, StepStatus};

    use super::Environment;

    /// Executor that records every command and replays queued results.
    ///
    /// Commands with no queued result succeed with empty output.
    #[derive(Debug, Default)]
    pub struct MockExecutor {
        calls: Mutex<Vec<CommandLine>>,
        results: Mutex<VecDeque<ExecResult>>,
        on_path: HashSet<String>,
    }

    impl MockExecutor {
        /// An executor with nothing on `PATH` and no queued results.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Report `program` as present on `PATH`.
        #[must_use]
        pub fn with_program(mut self, program: &str) -> Self {
            self.on_path.insert(program.to_string());
            self
        }

        /// Queue the result of the next unanswered command.
        #[must_use]
        pub fn with_result(self, result: ExecResult) -> Self {
            self.results.lock().unwrap().push_back(result);
            self
        }

        /// Queue a successful result whose stdout is `stdout`.
        #[must_use]
        pub fn with_stdout(self, stdout: &str) -> Self {
            self.with_result(Self::output(stdout))
        }

        /// A successful result with the given stdout.
        #[must_use]
        pub fn output(stdout: &str) -> ExecResult {
            ExecResult {
                stdout: stdout.to_string(),
                stdout_bytes: stdout.as_bytes().to_vec(),
                ..ExecResult::synthetic_success()
            }
        }

        /// A failed result with the given exit code.
        #[must_use]
        pub fn failed(code: i32) -> ExecResult {
            ExecResult {
                success: false,
                code: Some(code),
                ..ExecResult::default()
            }
        }

        /// Every command executed so far, rendered as on the console.
        #[must_use]
        pub fn calls(&self) -> Vec<String> {
            self.commands().iter().map(ToString::to_string).collect()
        }

        /// Every command executed so far.
        #[must_use]
        pub fn commands(&self) -> Vec<CommandLine> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Executor for MockExecutor {
        fn execute(&self, cmd: &CommandLine) -> anyhow::Result<ExecResult> {
            self.calls.lock().unwrap().push(cmd.clone());
            Ok(self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(ExecResult::synthetic_success))
        }

        fn which(&self, program: &str) -> bool {
            self.on_path.contains(program)
        }
    }

    /// Logger that keeps every message as `"<level> <message>"`.
    #[derive(Debug, Default)]
    pub struct CaptureLog {
        lines: Mutex<Vec<String>>,
        steps: Mutex<Vec<(String, StepStatus, Option<String>)>>,
    }

    impl CaptureLog {
        fn push(&self, level: &str, msg: &str) {
            self.lines.lock().unwrap().push(format!("{level} {msg}"));
        }

        /// All captured lines.
        #[must_use]
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        /// Whether a message at `level` contains `needle`.
        #[must_use]
        pub fn contains(&self, level: &str, needle: &str) -> bool {
            let prefix = format!("{level} ");
            self.lines()
                .iter()
                .any(|l| l.starts_with(&prefix) && l.contains(needle))
        }

        /// Messages logged at warning level.
        #[must_use]
        pub fn warnings(&self) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter_map(|l| l.strip_prefix("warn ").map(String::from))
                .collect()
        }

        /// Recorded step results.
        #[must_use]
        pub fn steps(&self) -> Vec<(String, StepStatus, Option<String>)> {
            self.steps.lock().unwrap().clone()
        }
    }

    impl Log for CaptureLog {
        fn stage(&self, msg: &str) {
            self.push("stage", msg);
        }
        fn info(&self, msg: &str) {
            self.push("info", msg);
        }
        fn debug(&self, msg: &str) {
            self.push("debug", msg);
        }
        fn warn(&self, msg: &str) {
            self.push("warn", msg);
        }
        fn error(&self, msg: &str) {
            self.push("error", msg);
        }
        fn dry_run(&self, msg: &str) {
            self.push("dry_run", msg);
        }
        fn record_step(&self, name: &str, status: StepStatus, message: Option<&str>) {
            self.steps
                .lock()
                .unwrap()
                .push((name.to_string(), status, message.map(String::from)));
        }
    }

    /// Build an [`Environment`] sandboxed under `root`.
    ///
    /// `root` doubles as the base directory; the home directory is
    /// `root/home` and cargo home is `root/home/.cargo`.
    #[must_use]
    pub fn make_env(root: &Path, executor: Arc<MockExecutor>) -> (Environment, Arc<CaptureLog>) {
        let log = Arc::new(CaptureLog::default());
        let home = root.join("home");
        let env = Environment {
            dry_run: false,
            force: false,
            base_dir: root.to_path_buf(),
            cargo_home: home.join(".cargo"),
            home,
            log: Arc::clone(&log) as Arc<dyn Log>,
            executor,
        };
        (env, log)
    }
}
