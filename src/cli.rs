//! Command-line arguments.
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{ArgAction, Parser};

use crate::steps::Options;

/// Command-line interface of the provisioning engine.
#[derive(Parser, Debug)]
#[command(
    name = "provision",
    about = "Provision a workstation from a declarative JSON configuration",
    version = crate::VERSION
)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// Directory symlink sources are relative to (default: the config file's directory)
    #[arg(short, long, env = "PROVISION_DOTFILES")]
    pub dotfiles: Option<PathBuf>,

    /// Overwrite existing files and links
    #[arg(short, long)]
    pub force: bool,

    /// Preview changes without applying
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Increase output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Run-wide options for the step environment.
    #[must_use]
    pub const fn options(&self) -> Options {
        Options {
            dry_run: self.dry_run,
            force: self.force,
        }
    }

    /// Resolve the dotfiles directory to an absolute, canonical path.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist.
    pub fn base_dir(&self) -> Result<PathBuf> {
        let dir = match &self.dotfiles {
            Some(dir) => dir.clone(),
            None => self
                .config
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        };
        dunce::canonicalize(&dir)
            .with_context(|| format!("dotfiles directory {} not found", dir.display()))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["provision"]);
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(!cli.force);
        assert!(!cli.dry_run);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn parse_dry_run_short() {
        let cli = Cli::parse_from(["provision", "-n"]);
        assert!(cli.dry_run);
        assert!(cli.options().dry_run);
    }

    #[test]
    fn parse_force_and_config() {
        let cli = Cli::parse_from(["provision", "--force", "-c", "/etc/provision.json"]);
        assert!(cli.options().force);
        assert_eq!(cli.config, PathBuf::from("/etc/provision.json"));
    }

    #[test]
    fn verbose_is_counted() {
        let cli = Cli::parse_from(["provision", "-vv"]);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn base_dir_defaults_to_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        let cli = Cli::parse_from(["provision", "-c", config.to_str().unwrap()]);
        assert_eq!(
            cli.base_dir().unwrap(),
            dunce::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn base_dir_prefers_dotfiles_flag() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::parse_from(["provision", "-d", dir.path().to_str().unwrap()]);
        assert_eq!(
            cli.base_dir().unwrap(),
            dunce::canonicalize(dir.path()).unwrap()
        );
    }

    #[test]
    fn base_dir_missing_is_error() {
        let cli = Cli::parse_from(["provision", "-d", "/definitely/not/here"]);
        assert!(cli.base_dir().is_err());
    }
}
