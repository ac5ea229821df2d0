//! Translation of a [`Config`] into the ordered list of steps to run.
//!
//! Sections always compile in the same order, whatever their order in the
//! file: system packages, the AUR helper and AUR packages, symlinks, the
//! Rust toolchain and cargo crates, then secrets.  Absent sections produce no
//! steps.  Every step is validated here so a bad section is reported before
//! anything runs.
use std::path::Path;

use crate::config::Config;
use crate::error::ConfigError;
use crate::steps::{
    ApplySymlinks, CargoInstall, CopySecretsToDisk, EnsureAurHelper, EnsureRustInstalled,
    InstallPackages, PackageManager, Step,
};

/// Compile `config` into steps; relative symlink sources resolve against
/// `base_dir`.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any present section is empty or contains a
/// blank entry.
pub fn compile(config: &Config, base_dir: &Path) -> Result<Vec<Step>, ConfigError> {
    let mut steps = Vec::new();

    if let Some(packages) = &config.arch_packages {
        steps.push(InstallPackages::new(PackageManager::Pacman, packages)?.into());
    }

    if let Some(packages) = &config.aur_packages {
        let install = InstallPackages::new(PackageManager::Yay, packages)?;
        steps.push(EnsureAurHelper::yay().into());
        steps.push(install.into());
    }

    if let Some(symlinks) = &config.symlinks {
        steps.push(ApplySymlinks::new(base_dir, symlinks)?.into());
    }

    if let Some(rust) = &config.rust {
        steps.push(EnsureRustInstalled::new(rust.channel())?.into());
        if let Some(crates) = &rust.install {
            steps.push(CargoInstall::new(crates, rust.force_reinstall)?.into());
        }
    }

    if let Some(secrets) = &config.secrets {
        steps.push(CopySecretsToDisk::new(secrets)?.into());
    }

    Ok(steps)
}
