//! Workstation provisioning engine.
//!
//! Reads a declarative JSON configuration and brings an Arch Linux machine
//! into the described state: system and AUR packages, dotfile symlinks, the
//! Rust toolchain with cargo-installed tools, and secrets copied out of a
//! password vault.
//!
//! The public API is organised into four layers:
//!
//! - **[`config`]**: deserialise the configuration file
//! - **[`recipe`]**: compile a configuration into ordered [`steps::Step`]s
//! - **[`steps`]**: idempotent units of work and the [`steps::Environment`]
//!   every side effect goes through
//! - **[`runner`]**: run a recipe, record results and print the summary
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod cli;
pub mod config;
pub mod error;
pub mod exec;
pub mod logging;
pub mod recipe;
pub mod runner;
pub mod steps;

/// Version string embedded at build time (`git describe`), falling back to
/// the crate version.
pub const VERSION: &str = match option_env!("PROVISION_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
