//! Package installation through pacman and the yay AUR helper.
use std::fmt;

use anyhow::{Context as _, Result};

use super::{Action, Environment, StepResult, summarize};
use crate::config::{AUR_PACKAGES, SYSTEM_PACKAGES};
use crate::error::ConfigError;
use crate::exec::CommandLine;

/// Repository the AUR helper is built from.
pub const YAY_REPO: &str = "https://aur.archlinux.org/yay.git";

/// Package manager used by an [`InstallPackages`] step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// Official repositories.
    Pacman,
    /// AUR packages.
    Yay,
}

impl PackageManager {
    /// Executable name.
    #[must_use]
    pub const fn program(self) -> &'static str {
        match self {
            Self::Pacman => "pacman",
            Self::Yay => "yay",
        }
    }

    /// pacman writes to the system database directly; yay elevates itself
    /// and refuses to run as root.
    #[must_use]
    pub const fn needs_elevation(self) -> bool {
        matches!(self, Self::Pacman)
    }

    /// Configuration section listing this manager's packages.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Pacman => SYSTEM_PACKAGES,
            Self::Yay => AUR_PACKAGES,
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.program())
    }
}

/// Install a list of packages in one package manager transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPackages {
    packages: Vec<String>,
    manager: PackageManager,
}

impl InstallPackages {
    /// Build the step for `packages`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySection`] if `packages` is empty and
    /// [`ConfigError::EmptyEntry`] if a package name is blank.
    pub fn new(manager: PackageManager, packages: &[String]) -> Result<Self, ConfigError> {
        if packages.is_empty() {
            return Err(ConfigError::EmptySection(manager.section().to_string()));
        }
        if packages.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyEntry {
                section: manager.section().to_string(),
            });
        }
        Ok(Self {
            packages: packages.to_vec(),
            manager,
        })
    }

    /// Packages installed by this step, in configuration order.
    #[must_use]
    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    /// The package manager used.
    #[must_use]
    pub const fn manager(&self) -> PackageManager {
        self.manager
    }

    fn command(&self) -> CommandLine {
        let mut args = vec!["--sync", "--needed", "--noconfirm"];
        args.extend(self.packages.iter().map(String::as_str));
        CommandLine::new(self.manager.program(), args).elevated(self.manager.needs_elevation())
    }
}

impl Action for InstallPackages {
    fn name(&self) -> &str {
        self.manager.program()
    }

    fn description(&self) -> String {
        format!(
            "use {} to install {}",
            self.manager,
            summarize(&self.packages, "packages")
        )
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        env.log.debug(&format!(
            "{} packages to install with {}",
            self.packages.len(),
            self.manager
        ));
        env.run_checked(&self.command())
            .with_context(|| format!("installing packages with {}", self.manager))?;

        if env.dry_run {
            return Ok(StepResult::DryRun);
        }
        env.log
            .info(&format!("{} packages up to date", self.packages.len()));
        Ok(StepResult::Ok)
    }
}

/// Build and install the AUR helper from source when it is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureAurHelper {
    helper: String,
    repo: String,
}

impl EnsureAurHelper {
    /// The `yay` helper, built from its AUR repository.
    #[must_use]
    pub fn yay() -> Self {
        Self {
            helper: PackageManager::Yay.program().to_string(),
            repo: YAY_REPO.to_string(),
        }
    }

    /// Whether the helper is already installed.
    ///
    /// A binary on `PATH` is enough; otherwise pacman's local database is
    /// asked, which also catches a package whose binary is not on `PATH`
    /// yet.
    fn is_installed(&self, env: &Environment) -> Result<bool> {
        if env.which(&self.helper) {
            env.log.debug(&format!("{} found on PATH", self.helper));
            return Ok(true);
        }
        if !env.which(PackageManager::Pacman.program()) {
            env.log.debug("pacman not found, assuming helper is missing");
            return Ok(false);
        }
        let probe = CommandLine::new(
            PackageManager::Pacman.program(),
            ["--query", "--info", "--quiet", self.helper.as_str()],
        )
        .quiet();
        Ok(env.inspect(&probe)?.success)
    }

    fn build(&self, env: &Environment) -> Result<()> {
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-build-", self.helper))
            .tempdir()
            .context("creating build directory")?;
        let checkout = scratch.path().join(&self.helper);

        env.log.debug(&format!("cloning {} into {}", self.repo, checkout.display()));
        let dest = checkout.to_string_lossy().into_owned();
        env.run_checked(&CommandLine::new(
            "git",
            ["clone".to_string(), self.repo.clone(), dest],
        ))
        .with_context(|| format!("cloning {}", self.repo))?;

        env.run_checked(
            &CommandLine::new("makepkg", ["--syncdeps", "--install", "--noconfirm"])
                .in_dir(&checkout),
        )
        .with_context(|| format!("building {} with makepkg", self.helper))?;

        Ok(())
    }
}

impl Action for EnsureAurHelper {
    fn name(&self) -> &str {
        &self.helper
    }

    fn description(&self) -> String {
        format!("ensure the {} AUR helper is installed", self.helper)
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        if self.is_installed(env)? {
            return Ok(StepResult::Skipped(format!(
                "{} already installed",
                self.helper
            )));
        }

        if env.dry_run {
            env.log.dry_run(&format!(
                "would build {} from {} with makepkg",
                self.helper, self.repo
            ));
            return Ok(StepResult::DryRun);
        }

        self.build(env)?;
        env.log.info(&format!("{} installed", self.helper));
        Ok(StepResult::Ok)
    }
}
