//! Linking dotfiles sources into the home directory.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use super::{Action, Environment, StepResult, StepStats, SymlinkOutcome, summarize};
use crate::config::SYMLINKS;
use crate::error::{ConfigError, StepError};

/// One dotfile to link into place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Source path as written in the configuration.
    pub name: String,
    /// Absolute source inside the dotfiles directory.
    pub source: PathBuf,
    /// Destination as written in the configuration, before expansion.
    pub destination: String,
}

/// Expand `~` and `$VAR`/`${VAR}` in `raw` and make the result absolute.
///
/// `~` resolves to `home`.  Unknown variables are left as written.
///
/// # Errors
///
/// Returns an error if a relative result cannot be made absolute.
pub fn expand_path(raw: &str, home: &Path) -> Result<PathBuf> {
    let home = home.to_string_lossy().into_owned();
    let expanded = shellexpand::full_with_context_no_errors(
        raw,
        || Some(home.as_str()),
        |var: &str| std::env::var(var).ok(),
    );
    std::path::absolute(&*expanded)
        .with_context(|| format!("resolving destination {raw}"))
}

/// Link files from the dotfiles directory to their destinations.
///
/// Every link is attempted even if an earlier one failed; the step fails
/// afterwards if any link could not be created.  A destination that is
/// occupied and may not be replaced is only a warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplySymlinks {
    links: Vec<Link>,
}

impl ApplySymlinks {
    /// Build the step from the `symlinks` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySection`] for an empty mapping and
    /// [`ConfigError::EmptyEntry`] if a source or destination is blank.
    pub fn new(base_dir: &Path, symlinks: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        if symlinks.is_empty() {
            return Err(ConfigError::EmptySection(SYMLINKS.to_string()));
        }
        let links = symlinks
            .iter()
            .map(|(name, destination)| {
                if name.trim().is_empty() || destination.trim().is_empty() {
                    return Err(ConfigError::EmptyEntry {
                        section: SYMLINKS.to_string(),
                    });
                }
                Ok(Link {
                    name: name.clone(),
                    source: base_dir.join(name),
                    destination: destination.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { links })
    }

    /// Links created by this step, ordered by source name.
    #[must_use]
    pub fn links(&self) -> &[Link] {
        &self.links
    }
}

impl Action for ApplySymlinks {
    fn name(&self) -> &str {
        "symlinks"
    }

    fn description(&self) -> String {
        let names: Vec<&str> = self.links.iter().map(|l| l.name.as_str()).collect();
        format!("symlink {}", summarize(&names, "files"))
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        let mut stats = StepStats::new();
        let mut failed = 0usize;

        for link in &self.links {
            if link.source.symlink_metadata().is_err() {
                env.log.warn(&format!(
                    "source missing, skipping: {}",
                    link.source.display()
                ));
                stats.skipped += 1;
                continue;
            }

            let destination = match expand_path(&link.destination, &env.home) {
                Ok(path) => path,
                Err(e) => {
                    env.log.warn(&format!("{e:#}"));
                    failed += 1;
                    continue;
                }
            };

            match env.create_symlink(&destination, &link.source) {
                SymlinkOutcome::Created | SymlinkOutcome::Replaced | SymlinkOutcome::DryRun => {
                    stats.changed += 1;
                }
                SymlinkOutcome::AlreadyLinked => stats.already_ok += 1,
                SymlinkOutcome::Conflict => stats.skipped += 1,
                SymlinkOutcome::Failed(_) => failed += 1,
            }
        }

        if failed > 0 {
            env.log.info(&stats.summary(env.dry_run));
            return Err(StepError::LinkFailures {
                failed,
                total: self.links.len(),
            }
            .into());
        }
        Ok(stats.finish(env))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::steps::test_helpers::{MockExecutor, make_env};
    use std::sync::Arc;

    fn mapping(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn empty_mapping_is_rejected() {
        let err = ApplySymlinks::new(Path::new("/repo"), &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySection(ref s) if s == "symlinks"));
    }

    #[test]
    fn blank_destination_is_rejected() {
        let err = ApplySymlinks::new(Path::new("/repo"), &mapping(&[("vimrc", "")])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyEntry { .. }));
    }

    #[test]
    fn sources_are_joined_to_base_dir() {
        let step = ApplySymlinks::new(Path::new("/repo"), &mapping(&[("vimrc", "~/.vimrc")])).unwrap();
        assert_eq!(step.links()[0].source, PathBuf::from("/repo/vimrc"));
        assert_eq!(step.description(), "symlink vimrc");
    }

    #[test]
    fn description_counts_many_links() {
        let pairs: Vec<(String, String)> = (0..7)
            .map(|i| (format!("f{i}"), format!("~/f{i}")))
            .collect();
        let step = ApplySymlinks::new(Path::new("/repo"), &pairs.into_iter().collect()).unwrap();
        assert_eq!(step.description(), "symlink 7 files");
    }

    #[test]
    fn expand_path_uses_home() {
        let path = expand_path("~/.config/nvim", Path::new("/home/me")).unwrap();
        assert_eq!(path, PathBuf::from("/home/me/.config/nvim"));
    }

    #[test]
    fn expand_path_keeps_unknown_variables() {
        let path = expand_path("/tmp/$PROVISION_SURELY_UNSET_VAR/x", Path::new("/home/me")).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/$PROVISION_SURELY_UNSET_VAR/x"));
    }

    #[test]
    fn expand_path_absolutizes_relative() {
        let path = expand_path("relative/file", Path::new("/home/me")).unwrap();
        assert!(path.is_absolute());
        assert!(path.ends_with("relative/file"));
    }

    #[test]
    fn links_into_home() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vimrc"), "set nu").unwrap();
        let (env, log) = make_env(dir.path(), Arc::new(MockExecutor::new()));
        let step = ApplySymlinks::new(dir.path(), &mapping(&[("vimrc", "~/.vimrc")])).unwrap();

        assert_eq!(step.run(&env).unwrap(), StepResult::Ok);
        assert_eq!(
            std::fs::read_link(env.home.join(".vimrc")).unwrap(),
            dir.path().join("vimrc")
        );
        assert!(log.contains("info", "1 changed, 0 already ok"));
    }

    #[test]
    fn second_run_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vimrc"), "set nu").unwrap();
        let (env, log) = make_env(dir.path(), Arc::new(MockExecutor::new()));
        let step = ApplySymlinks::new(dir.path(), &mapping(&[("vimrc", "~/.vimrc")])).unwrap();

        step.run(&env).unwrap();
        step.run(&env).unwrap();

        assert!(log.contains("info", "0 changed, 1 already ok"));
        assert!(log.warnings().is_empty());
    }

    #[test]
    fn missing_source_is_skipped_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (env, log) = make_env(dir.path(), Arc::new(MockExecutor::new()));
        let step = ApplySymlinks::new(dir.path(), &mapping(&[("absent", "~/.absent")])).unwrap();

        assert_eq!(step.run(&env).unwrap(), StepResult::Ok);
        assert!(!env.home.join(".absent").exists());
        assert_eq!(log.warnings().len(), 1);
    }

    #[test]
    fn conflict_is_a_warning_not_a_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vimrc"), "new").unwrap();
        let (env, log) = make_env(dir.path(), Arc::new(MockExecutor::new()));
        std::fs::create_dir_all(&env.home).unwrap();
        std::fs::write(env.home.join(".vimrc"), "mine").unwrap();
        let step = ApplySymlinks::new(dir.path(), &mapping(&[("vimrc", "~/.vimrc")])).unwrap();

        assert_eq!(step.run(&env).unwrap(), StepResult::Ok);
        assert_eq!(
            std::fs::read_to_string(env.home.join(".vimrc")).unwrap(),
            "mine"
        );
        assert_eq!(log.warnings().len(), 1);
    }

    #[test]
    fn failures_are_counted_after_all_links() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "a").unwrap();
        std::fs::write(dir.path().join("b"), "b").unwrap();
        let (env, _log) = make_env(dir.path(), Arc::new(MockExecutor::new()));
        std::fs::create_dir_all(&env.home).unwrap();
        std::fs::write(env.home.join("blocker"), "file").unwrap();
        let step = ApplySymlinks::new(
            dir.path(),
            &mapping(&[("a", "~/blocker/a"), ("b", "~/b")]),
        )
        .unwrap();

        let err = step.run(&env).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepError>(),
            Some(StepError::LinkFailures { failed: 1, total: 2 })
        ));
        // The link after the failing one was still created.
        assert!(env.home.join("b").symlink_metadata().is_ok());
    }

    #[test]
    fn dry_run_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vimrc"), "x").unwrap();
        let (mut env, log) = make_env(dir.path(), Arc::new(MockExecutor::new()));
        env.dry_run = true;
        let step = ApplySymlinks::new(dir.path(), &mapping(&[("vimrc", "~/.vimrc")])).unwrap();

        assert_eq!(step.run(&env).unwrap(), StepResult::DryRun);
        assert!(!env.home.exists());
        assert!(log.contains("info", "1 would change"));
    }
}
