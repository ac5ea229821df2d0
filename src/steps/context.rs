//! The [`Environment`] every step runs against and its side-effect helpers.
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::error::StepError;
use crate::exec::{CommandLine, ExecResult, Executor};
use crate::logging::{Log, ScopedLog};

/// Run-wide switches chosen on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    /// Preview changes without applying them.
    pub dry_run: bool,
    /// Allow replacing existing destinations.
    pub force: bool,
}

/// Outcome of [`Environment::create_symlink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymlinkOutcome {
    /// A new link was created.
    Created,
    /// An existing entry was removed and replaced by the link.
    Replaced,
    /// The link already pointed at the wanted target.
    AlreadyLinked,
    /// Something exists at the link path and overwriting is not permitted.
    Conflict,
    /// Dry run; nothing was touched.
    DryRun,
    /// The link could not be created.
    Failed(String),
}

/// Shared context for step execution.
///
/// Every side effect a step performs goes through this type so that
/// dry-run, privilege elevation and the overwrite policy are applied in one
/// place.
pub struct Environment {
    /// Whether to perform a dry run (preview changes without applying).
    pub dry_run: bool,
    /// Whether existing destinations may be replaced.
    pub force: bool,
    /// Directory relative symlink sources are resolved against.
    pub base_dir: PathBuf,
    /// User's home directory path.
    pub home: PathBuf,
    /// Cargo home (`$CARGO_HOME`, or `~/.cargo`).
    pub cargo_home: PathBuf,
    /// Logger for output and step recording.
    pub log: Arc<dyn Log>,
    /// Command executor (for testing or real system calls).
    pub executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("dry_run", &self.dry_run)
            .field("force", &self.force)
            .field("base_dir", &self.base_dir)
            .field("home", &self.home)
            .field("cargo_home", &self.cargo_home)
            .field("log", &"<dyn Log>")
            .field("executor", &self.executor)
            .finish()
    }
}

impl Environment {
    /// Creates a new environment for step execution.
    ///
    /// # Errors
    ///
    /// Returns an error if the `HOME` environment variable is not set.
    pub fn new(
        base_dir: PathBuf,
        options: Options,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
    ) -> Result<Self> {
        let home = std::env::var("HOME")
            .map(PathBuf::from)
            .map_err(|_| anyhow::anyhow!("HOME environment variable is not set"))?;
        let cargo_home = std::env::var("CARGO_HOME")
            .map_or_else(|_| home.join(".cargo"), PathBuf::from);

        Ok(Self {
            dry_run: options.dry_run,
            force: options.force,
            base_dir,
            home,
            cargo_home,
            log,
            executor,
        })
    }

    /// Create a copy of this environment with a different logger.
    #[must_use]
    pub fn with_log(&self, log: Arc<dyn Log>) -> Self {
        Self {
            dry_run: self.dry_run,
            force: self.force,
            base_dir: self.base_dir.clone(),
            home: self.home.clone(),
            cargo_home: self.cargo_home.clone(),
            log,
            executor: Arc::clone(&self.executor),
        }
    }

    /// Create a copy whose logger attributes every message to `scope`.
    ///
    /// The receiver keeps its own logger; dropping the copy is all it takes
    /// to leave the scope.
    #[must_use]
    pub fn scoped(&self, scope: &str) -> Self {
        self.with_log(Arc::new(ScopedLog::new(Arc::clone(&self.log), scope)))
    }

    /// Run a command that changes the system.
    ///
    /// In dry-run mode the command is only logged and a synthetic success is
    /// returned.  A non-zero exit is returned to the caller, not raised.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn run_command(&self, cmd: &CommandLine) -> Result<ExecResult> {
        if self.dry_run {
            self.log.dry_run(&format!("would run: {cmd}"));
            return Ok(ExecResult::synthetic_success());
        }
        self.log.debug(&format!("running: {cmd}"));
        self.executor.execute(cmd)
    }

    /// [`run_command`](Self::run_command), failing on a non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::CommandFailed`] if the command exits non-zero, or
    /// an error if it cannot be spawned.
    pub fn run_checked(&self, cmd: &CommandLine) -> Result<ExecResult> {
        let result = self.run_command(cmd)?;
        if !result.success {
            return Err(StepError::CommandFailed {
                program: cmd.to_string(),
                code: result.code.unwrap_or(-1),
                stderr: result.stderr,
            }
            .into());
        }
        Ok(result)
    }

    /// Run a read-only command, even in dry-run mode.
    ///
    /// Only for queries whose result feeds "what would happen" reporting
    /// (presence probes, status checks).
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned.
    pub fn inspect(&self, cmd: &CommandLine) -> Result<ExecResult> {
        self.log.debug(&format!("inspecting: {cmd}"));
        self.executor.execute(cmd)
    }

    /// Check if a program is available on `PATH`.
    #[must_use]
    pub fn which(&self, program: &str) -> bool {
        self.executor.which(program)
    }

    /// Decide whether an entry at `path` may be replaced.
    ///
    /// Nothing there: yes.  Any existing entry (file, directory, valid or
    /// dangling symlink) needs `force`; without it a conflict warning is
    /// logged.
    #[must_use]
    pub fn may_replace(&self, path: &Path) -> bool {
        if path.symlink_metadata().is_err() {
            return true;
        }
        if self.force {
            self.log
                .debug(&format!("overwriting existing {}", path.display()));
            return true;
        }
        let conflict = StepError::PermissionConflict {
            path: path.to_path_buf(),
        };
        self.log.warn(&conflict.to_string());
        false
    }

    /// Create a symlink at `link` pointing to `target`.
    ///
    /// Never fails: problems are logged as warnings and reported through the
    /// returned [`SymlinkOutcome`] so that one bad link cannot abort a run.
    pub fn create_symlink(&self, link: &Path, target: &Path) -> SymlinkOutcome {
        match self.try_create_symlink(link, target) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.log.warn(&format!(
                    "could not link {} -> {}: {e:#}",
                    link.display(),
                    target.display()
                ));
                SymlinkOutcome::Failed(format!("{e:#}"))
            }
        }
    }

    fn try_create_symlink(&self, link: &Path, target: &Path) -> Result<SymlinkOutcome> {
        if std::fs::read_link(link).is_ok_and(|existing| existing == target) {
            self.log.debug(&format!(
                "ok: {} (already linked)",
                link.display()
            ));
            return Ok(SymlinkOutcome::AlreadyLinked);
        }

        let exists = link.symlink_metadata().is_ok();
        if exists && !self.may_replace(link) {
            return Ok(SymlinkOutcome::Conflict);
        }

        if self.dry_run {
            let verb = if exists { "would replace" } else { "would link" };
            self.log.dry_run(&format!(
                "{verb} {} -> {}",
                link.display(),
                target.display()
            ));
            return Ok(SymlinkOutcome::DryRun);
        }

        if let Some(parent) = link.parent() {
            self.ensure_directory(parent)?;
        }
        if exists {
            self.remove_path(link)?;
        }

        std::os::unix::fs::symlink(target, link).with_context(|| {
            format!(
                "creating symlink {} -> {}",
                link.display(),
                target.display()
            )
        })?;
        self.log.debug(&format!(
            "linked {} -> {}",
            link.display(),
            target.display()
        ));

        Ok(if exists {
            SymlinkOutcome::Replaced
        } else {
            SymlinkOutcome::Created
        })
    }

    /// Remove a file, a symlink, or a directory tree.
    ///
    /// A symlink is always unlinked, never followed, even when it points at
    /// a directory.  A missing path is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry exists but cannot be removed.
    pub fn remove_path(&self, path: &Path) -> Result<()> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(e).with_context(|| format!("reading metadata: {}", path.display()));
            }
        };

        if self.dry_run {
            self.log
                .dry_run(&format!("would remove {}", path.display()));
            return Ok(());
        }

        if !meta.file_type().is_symlink() && meta.is_dir() {
            std::fs::remove_dir_all(path)
                .with_context(|| format!("removing directory: {}", path.display()))
        } else {
            std::fs::remove_file(path).with_context(|| format!("removing: {}", path.display()))
        }
    }

    /// Create `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_directory(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            return Ok(());
        }
        if self.dry_run {
            self.log
                .dry_run(&format!("would create directory {}", path.display()));
            return Ok(());
        }
        std::fs::create_dir_all(path)
            .with_context(|| format!("creating directory: {}", path.display()))
    }

    /// Write `contents` to `path`, readable by the owner only.
    ///
    /// The data goes to a `0600` temporary file next to `path` which is then
    /// renamed over it, so an existing link is replaced rather than written
    /// through. An existing directory is removed first. Callers decide
    /// beforehand whether an existing entry may be replaced (see
    /// [`may_replace`](Self::may_replace)).
    ///
    /// # Errors
    ///
    /// Returns an error if the parent cannot be created or the file cannot
    /// be written.
    pub fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.dry_run {
            self.log.dry_run(&format!(
                "would write {} bytes to {}",
                contents.len(),
                path.display()
            ));
            return Ok(());
        }
        let parent = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        self.ensure_directory(parent)?;

        if std::fs::symlink_metadata(path).is_ok_and(|meta| meta.is_dir()) {
            self.remove_path(path)?;
        }

        let mut file = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temporary file in {}", parent.display()))?;
        file.write_all(contents)
            .with_context(|| format!("writing {}", path.display()))?;
        file.persist(path)
            .with_context(|| format!("replacing {}", path.display()))?;
        self.log.debug(&format!("wrote {}", path.display()));
        Ok(())
    }
}
