// Shared helpers for integration tests.
//
// Provides a temporary-directory-backed dotfiles repository with its own home
// directory, a fluent builder, and an executor that records commands instead
// of running them.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use provision_cli::config::Config;
use provision_cli::exec::{CommandLine, ExecResult, Executor};
use provision_cli::logging::{Log, Logger};
use provision_cli::steps::Environment;

/// Executor that records every command and reports success.
///
/// Programs listed with [`RecordingExecutor::with_program`] are reported as
/// present on `PATH`; everything else is missing.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<String>>,
    on_path: HashSet<String>,
}

impl RecordingExecutor {
    /// Create an executor with an empty `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `program` as installed.
    pub fn with_program(mut self, program: &str) -> Self {
        self.on_path.insert(program.to_string());
        self
    }

    /// Commands executed so far, rendered as on the console.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, cmd: &CommandLine) -> anyhow::Result<ExecResult> {
        self.calls.lock().expect("calls lock").push(cmd.to_string());
        Ok(ExecResult::synthetic_success())
    }

    fn which(&self, program: &str) -> bool {
        self.on_path.contains(program)
    }
}

/// An isolated dotfiles repository and home directory backed by a
/// [`tempfile::TempDir`].
///
/// Layout: `<tmp>/dotfiles` holds sources and `config.json`, `<tmp>/home` is
/// the home directory `~` expands to.
pub struct TestRepo {
    /// Temporary directory containing the repository and home directory.
    pub root: tempfile::TempDir,
}

impl TestRepo {
    /// Create an empty repository.
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        std::fs::create_dir_all(root.path().join("dotfiles")).expect("create dotfiles dir");
        std::fs::create_dir_all(root.path().join("home")).expect("create home dir");
        Self { root }
    }

    /// The dotfiles directory (symlink sources and `config.json`).
    pub fn dotfiles(&self) -> PathBuf {
        self.root.path().join("dotfiles")
    }

    /// The home directory.
    pub fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    /// Path of the configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.dotfiles().join("config.json")
    }

    /// Load the configuration file.
    pub fn load_config(&self) -> Config {
        Config::load(&self.config_path()).expect("load config")
    }

    /// Build an environment rooted in this repository.
    pub fn env(
        &self,
        dry_run: bool,
        force: bool,
        log: Arc<dyn Log>,
        executor: Arc<dyn Executor>,
    ) -> Environment {
        Environment {
            dry_run,
            force,
            base_dir: self.dotfiles(),
            home: self.home(),
            cargo_home: self.home().join(".cargo"),
            log,
            executor,
        }
    }

    /// Build an environment logging to a fresh [`Logger`], also returning
    /// the logger so tests can inspect recorded steps.
    pub fn env_with_logger(
        &self,
        dry_run: bool,
        force: bool,
        executor: Arc<dyn Executor>,
    ) -> (Environment, Arc<Logger>) {
        let log = Arc::new(Logger::new());
        let env = self.env(dry_run, force, Arc::clone(&log) as Arc<dyn Log>, executor);
        (env, log)
    }
}

/// Fluent builder for [`TestRepo`].
pub struct TestRepoBuilder {
    repo: TestRepo,
}

impl TestRepoBuilder {
    /// Begin building a new, empty repository.
    pub fn new() -> Self {
        Self {
            repo: TestRepo::new(),
        }
    }

    /// Write `config.json`.
    pub fn with_config(self, json: &str) -> Self {
        std::fs::write(self.repo.config_path(), json).expect("write config.json");
        self
    }

    /// Create a source file inside the dotfiles directory.
    pub fn with_source(self, relative: &str, content: &str) -> Self {
        let path = self.repo.dotfiles().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create source parent");
        }
        std::fs::write(&path, content).expect("write source file");
        self
    }

    /// Create a file inside the home directory.
    pub fn with_home_file(self, relative: &str, content: &str) -> Self {
        let path = self.repo.home().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create home parent");
        }
        std::fs::write(&path, content).expect("write home file");
        self
    }

    /// Finish building and return the repository.
    pub fn build(self) -> TestRepo {
        self.repo
    }
}

/// Every entry below `root` with its kind and, for links, its target.
///
/// Used to compare filesystem state before and after a run.
pub fn snapshot_tree(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
        entries.sort_by_key(std::fs::DirEntry::path);
        for entry in entries {
            let path = entry.path();
            let rel = path.strip_prefix(root).expect("entry below root").display().to_string();
            let meta = std::fs::symlink_metadata(&path).expect("metadata");
            if meta.file_type().is_symlink() {
                let target = std::fs::read_link(&path).expect("read link");
                out.push(format!("link {rel} -> {}", target.display()));
            } else if meta.is_dir() {
                out.push(format!("dir {rel}"));
                walk(&path, root, out);
            } else {
                let content = std::fs::read(&path).expect("read file");
                out.push(format!("file {rel} ({} bytes)", content.len()));
            }
        }
    }

    let mut out = Vec::new();
    walk(root, root, &mut out);
    out
}
