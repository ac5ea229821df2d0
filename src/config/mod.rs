//! Declarative configuration loading.
//!
//! The configuration is a single JSON object whose top-level keys are
//! sections.  Every section is optional; unknown keys are ignored and a
//! `null` section is the same as an absent one.  Emptiness checks happen in
//! the recipe compiler so that they surface as [`ConfigError`]s before any
//! step runs.
pub mod rust;
pub mod secrets;

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

pub use rust::RustSection;
pub use secrets::SecretsSection;

/// Section holding official repository packages.
pub const SYSTEM_PACKAGES: &str = "arch-packages";
/// Section holding AUR packages.
pub const AUR_PACKAGES: &str = "aur-packages";
/// Section mapping dotfiles sources to link destinations.
pub const SYMLINKS: &str = "symlinks";
/// Section describing the Rust toolchain and cargo-installed tools.
pub const TOOLCHAIN: &str = "rust";
/// Section describing vault attachments to copy to disk.
pub const SECRETS: &str = "secrets";

/// All sections of a configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Packages installed with pacman.
    #[serde(default)]
    pub arch_packages: Option<Vec<String>>,
    /// Packages installed with the AUR helper.
    #[serde(default)]
    pub aur_packages: Option<Vec<String>>,
    /// Source (relative to the dotfiles directory) → destination.
    #[serde(default)]
    pub symlinks: Option<BTreeMap<String, String>>,
    /// Rust toolchain settings.
    #[serde(default)]
    pub rust: Option<RustSection>,
    /// Vault attachments to copy to disk.
    #[serde(default)]
    pub secrets: Option<SecretsSection>,
}

impl Config {
    /// Read and parse the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read and
    /// [`ConfigError::Parse`] if it is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Parse configuration JSON; `origin` names the source in errors.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if `json` is malformed or a section has
    /// the wrong shape.
    pub fn parse(json: &str, origin: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            origin: origin.to_string(),
            source,
        })
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s, "<string>")
    }
}
