//! Rust toolchain bootstrap and `cargo install` packages.
use std::collections::BTreeSet;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{Context as _, Result};

use super::{Action, Environment, StepResult, summarize};
use crate::config::TOOLCHAIN;
use crate::error::{ConfigError, StepError};
use crate::exec::CommandLine;

/// Where the rustup installer script is downloaded from.
pub const RUSTUP_INSTALLER_URL: &str = "https://sh.rustup.rs";

/// Upper bound on the installer script size.
const MAX_INSTALLER_SIZE: u64 = 4 * 1024 * 1024;

/// Cargo's record of installed crates, relative to cargo home.
const INSTALL_RECORD: &str = ".crates.toml";

/// Install rustup and a default toolchain when rustup is missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnsureRustInstalled {
    channel: String,
    installer_url: String,
}

impl EnsureRustInstalled {
    /// Build the step for `channel`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyEntry`] if `channel` is blank.
    pub fn new(channel: &str) -> Result<Self, ConfigError> {
        if channel.trim().is_empty() {
            return Err(ConfigError::EmptyEntry {
                section: TOOLCHAIN.to_string(),
            });
        }
        Ok(Self {
            channel: channel.to_string(),
            installer_url: RUSTUP_INSTALLER_URL.to_string(),
        })
    }

    /// Download the installer from `url` instead.
    #[must_use]
    pub fn with_installer_url(mut self, url: impl Into<String>) -> Self {
        self.installer_url = url.into();
        self
    }

    /// The toolchain channel installed.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

/// Fetch `url` into memory.
///
/// # Errors
///
/// Returns [`StepError::Network`] on a non-success status or a transport
/// failure.
fn download(url: &str) -> Result<Vec<u8>, StepError> {
    let network = |reason: String| StepError::Network {
        url: url.to_string(),
        reason,
    };

    let agent = ureq::Agent::new_with_defaults();
    let mut response = agent
        .get(url)
        .header("User-Agent", concat!("provision/", env!("CARGO_PKG_VERSION")))
        .call()
        .map_err(|e| match e {
            ureq::Error::StatusCode(code) => network(format!("HTTP {code}")),
            other => network(other.to_string()),
        })?;

    response
        .body_mut()
        .with_config()
        .limit(MAX_INSTALLER_SIZE)
        .read_to_vec()
        .map_err(|e| network(e.to_string()))
}

impl Action for EnsureRustInstalled {
    fn name(&self) -> &str {
        "rustup"
    }

    fn description(&self) -> String {
        format!("install the Rust toolchain ({} channel)", self.channel)
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        if env.which("rustup") || env.cargo_home.join("bin").join("rustup").is_file() {
            return Ok(StepResult::Skipped("rustup already installed".to_string()));
        }

        if env.dry_run {
            env.log.dry_run(&format!(
                "would download {} and install the {} toolchain",
                self.installer_url, self.channel
            ));
            return Ok(StepResult::DryRun);
        }

        env.log
            .debug(&format!("downloading {}", self.installer_url));
        let script = download(&self.installer_url)?;

        let mut installer = tempfile::Builder::new()
            .prefix("rustup-init-")
            .suffix(".sh")
            .tempfile()
            .context("creating installer file")?;
        installer
            .write_all(&script)
            .and_then(|()| installer.flush())
            .context("writing installer file")?;

        let path = installer.path().to_string_lossy().into_owned();
        env.run_checked(&CommandLine::new(
            "sh",
            [
                path,
                "-y".to_string(),
                "--default-toolchain".to_string(),
                self.channel.clone(),
            ],
        ))
        .context("running the rustup installer")?;

        env.log
            .info(&format!("installed the {} toolchain", self.channel));
        Ok(StepResult::Ok)
    }
}

/// Names of the crates recorded in cargo's install record.
///
/// Record lines look like
/// `"ripgrep 14.1.0 (registry+https://github.com/rust-lang/crates.io-index)" = ["rg"]`;
/// the crate name is the first word of the quoted key.  Anything else
/// (section headers, blank lines, malformed entries) is ignored.
#[must_use]
pub fn installed_packages(record: &str) -> BTreeSet<String> {
    record.lines().filter_map(parse_record_line).collect()
}

fn parse_record_line(line: &str) -> Option<String> {
    let rest = line.trim_start().strip_prefix('"')?;
    let (key, tail) = rest.split_once('"')?;
    if !tail.trim_start().starts_with('=') {
        return None;
    }
    key.split_whitespace().next().map(String::from)
}

/// Install crates with `cargo install`, skipping those already installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoInstall {
    packages: Vec<String>,
    force_reinstall: bool,
}

impl CargoInstall {
    /// Build the step for `packages`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySection`] if `packages` is empty and
    /// [`ConfigError::EmptyEntry`] if a crate name is blank.
    pub fn new(packages: &[String], force_reinstall: bool) -> Result<Self, ConfigError> {
        if packages.is_empty() {
            return Err(ConfigError::EmptySection(format!("{TOOLCHAIN}.install")));
        }
        if packages.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::EmptyEntry {
                section: format!("{TOOLCHAIN}.install"),
            });
        }
        Ok(Self {
            packages: packages.to_vec(),
            force_reinstall,
        })
    }

    /// `cargo` from `PATH`, or the one inside cargo home.
    ///
    /// A toolchain installed earlier in the same run is not on `PATH` yet.
    fn cargo(env: &Environment) -> String {
        if env.which("cargo") {
            return "cargo".to_string();
        }
        env.cargo_home
            .join("bin")
            .join("cargo")
            .to_string_lossy()
            .into_owned()
    }

    fn installed(env: &Environment) -> Result<BTreeSet<String>> {
        let path: PathBuf = env.cargo_home.join(INSTALL_RECORD);
        match std::fs::read_to_string(&path) {
            Ok(text) => Ok(installed_packages(&text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                env.log
                    .debug(&format!("no install record at {}", path.display()));
                Ok(BTreeSet::new())
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

impl Action for CargoInstall {
    fn name(&self) -> &str {
        "cargo"
    }

    fn description(&self) -> String {
        format!("use cargo to install {}", summarize(&self.packages, "crates"))
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        let missing: Vec<&str> = if self.force_reinstall {
            self.packages.iter().map(String::as_str).collect()
        } else {
            let installed = Self::installed(env)?;
            self.packages
                .iter()
                .map(String::as_str)
                .filter(|p| !installed.contains(*p))
                .collect()
        };

        if missing.is_empty() {
            env.log
                .info(&format!("all {} crates already installed", self.packages.len()));
            return Ok(StepResult::Skipped(
                "all crates already installed".to_string(),
            ));
        }

        let mut args = vec!["install"];
        if self.force_reinstall {
            args.push("--force");
        }
        args.extend(missing.iter().copied());
        env.run_checked(&CommandLine::new(&Self::cargo(env), args))
            .context("installing crates with cargo")?;

        if env.dry_run {
            return Ok(StepResult::DryRun);
        }
        env.log
            .info(&format!("installed {}", summarize(&missing, "crates")));
        Ok(StepResult::Ok)
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::steps::test_helpers::{MockExecutor, make_env};
    use httpmock::prelude::*;
    use std::sync::Arc;

    const RECORD: &str = r#"[v1]
"bat 0.24.0 (registry+https://github.com/rust-lang/crates.io-index)" = ["bat"]
"ripgrep 14.1.0 (registry+https://github.com/rust-lang/crates.io-index)" = ["rg"]

not a record line
"unterminated = ["x"]
"#;

    fn names(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn write_record(env: &Environment, text: &str) {
        std::fs::create_dir_all(&env.cargo_home).unwrap();
        std::fs::write(env.cargo_home.join(INSTALL_RECORD), text).unwrap();
    }

    #[test]
    fn parses_install_record() {
        let installed = installed_packages(RECORD);
        assert_eq!(
            installed.into_iter().collect::<Vec<_>>(),
            vec!["bat", "ripgrep"]
        );
    }

    #[test]
    fn empty_record_has_no_packages() {
        assert!(installed_packages("").is_empty());
        assert!(installed_packages("[v1]\n").is_empty());
    }

    #[test]
    fn toolchain_description_names_channel() {
        let step = EnsureRustInstalled::new("stable").unwrap();
        assert_eq!(step.description(), "install the Rust toolchain (stable channel)");
    }

    #[test]
    fn blank_channel_is_rejected() {
        assert!(EnsureRustInstalled::new(" ").is_err());
    }

    #[test]
    fn rustup_present_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new().with_program("rustup"));
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));

        let result = EnsureRustInstalled::new("stable").unwrap().run(&env).unwrap();
        assert!(matches!(result, StepResult::Skipped(_)));
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn rustup_in_cargo_home_is_skipped_without_download() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rustup-init.sh");
            then.status(200).body("#!/bin/sh\nexit 0\n");
        });
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));
        std::fs::create_dir_all(env.cargo_home.join("bin")).unwrap();
        std::fs::write(env.cargo_home.join("bin/rustup"), "").unwrap();
        let step = EnsureRustInstalled::new("stable")
            .unwrap()
            .with_installer_url(server.url("/rustup-init.sh"));

        let result = step.run(&env).unwrap();

        assert!(matches!(result, StepResult::Skipped(_)));
        mock.assert_hits(0);
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn installer_http_error_is_network_error() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rustup-init.sh");
            then.status(404).body("Not Found");
        });
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));
        let step = EnsureRustInstalled::new("stable")
            .unwrap()
            .with_installer_url(server.url("/rustup-init.sh"));

        let err = step.run(&env).unwrap_err();

        mock.assert();
        match err.downcast_ref::<StepError>() {
            Some(StepError::Network { reason, .. }) => assert_eq!(reason, "HTTP 404"),
            other => panic!("expected network error, got {other:?}"),
        }
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn installer_is_downloaded_and_run() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/rustup-init.sh");
            then.status(200).body("#!/bin/sh\nexit 0\n");
        });
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));
        let step = EnsureRustInstalled::new("nightly")
            .unwrap()
            .with_installer_url(server.url("/rustup-init.sh"));

        assert_eq!(step.run(&env).unwrap(), StepResult::Ok);

        let commands = executor.commands();
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].program, "sh");
        assert_eq!(
            &commands[0].args[1..],
            &["-y", "--default-toolchain", "nightly"]
        );
        // The installer file is removed once the step returns.
        assert!(!std::path::Path::new(&commands[0].args[0]).exists());
    }

    #[test]
    fn toolchain_dry_run_does_not_download() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/rustup-init.sh");
            then.status(200).body("exit 0");
        });
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let (mut env, log) = make_env(dir.path(), Arc::clone(&executor));
        env.dry_run = true;
        let step = EnsureRustInstalled::new("stable")
            .unwrap()
            .with_installer_url(server.url("/rustup-init.sh"));

        assert_eq!(step.run(&env).unwrap(), StepResult::DryRun);
        mock.assert_hits(0);
        assert!(executor.calls().is_empty());
        assert!(log.contains("dry_run", "stable toolchain"));
    }

    #[test]
    fn cargo_description_lists_crates() {
        let step = CargoInstall::new(&names(&["ripgrep"]), false).unwrap();
        assert_eq!(step.description(), "use cargo to install ripgrep");
    }

    #[test]
    fn cargo_empty_list_is_rejected() {
        let err = CargoInstall::new(&[], false).unwrap_err();
        assert!(matches!(err, ConfigError::EmptySection(ref s) if s == "rust.install"));
    }

    #[test]
    fn cargo_installs_only_missing_crates() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new().with_program("cargo"));
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));
        write_record(&env, RECORD);

        let step = CargoInstall::new(&names(&["ripgrep", "fd-find", "bat"]), false).unwrap();
        assert_eq!(step.run(&env).unwrap(), StepResult::Ok);
        assert_eq!(executor.calls(), vec!["cargo install fd-find"]);
    }

    #[test]
    fn cargo_all_installed_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new().with_program("cargo"));
        let (env, log) = make_env(dir.path(), Arc::clone(&executor));
        write_record(&env, RECORD);

        let step = CargoInstall::new(&names(&["ripgrep", "bat"]), false).unwrap();
        let result = step.run(&env).unwrap();

        assert!(matches!(result, StepResult::Skipped(_)));
        assert!(executor.calls().is_empty());
        assert!(log.contains("info", "already installed"));
    }

    #[test]
    fn cargo_missing_record_installs_everything() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new().with_program("cargo"));
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));

        CargoInstall::new(&names(&["ripgrep", "bat"]), false)
            .unwrap()
            .run(&env)
            .unwrap();
        assert_eq!(executor.calls(), vec!["cargo install ripgrep bat"]);
    }

    #[test]
    fn cargo_force_reinstall_ignores_record() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new().with_program("cargo"));
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));
        write_record(&env, RECORD);

        CargoInstall::new(&names(&["ripgrep"]), true)
            .unwrap()
            .run(&env)
            .unwrap();
        assert_eq!(executor.calls(), vec!["cargo install --force ripgrep"]);
    }

    #[test]
    fn cargo_falls_back_to_cargo_home() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new());
        let (env, _log) = make_env(dir.path(), Arc::clone(&executor));

        CargoInstall::new(&names(&["bat"]), false)
            .unwrap()
            .run(&env)
            .unwrap();
        let commands = executor.commands();
        assert_eq!(
            PathBuf::from(&commands[0].program),
            env.cargo_home.join("bin/cargo")
        );
    }

    #[test]
    fn cargo_dry_run_reads_record_but_installs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let executor = Arc::new(MockExecutor::new().with_program("cargo"));
        let (mut env, log) = make_env(dir.path(), Arc::clone(&executor));
        env.dry_run = true;
        write_record(&env, RECORD);

        let step = CargoInstall::new(&names(&["ripgrep", "tokei"]), false).unwrap();
        assert_eq!(step.run(&env).unwrap(), StepResult::DryRun);
        assert!(executor.calls().is_empty());
        assert!(log.contains("dry_run", "cargo install tokei"));
    }
}
