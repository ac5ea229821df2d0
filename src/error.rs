//! Domain-specific error types for the provisioning engine.
//!
//! Internal modules return typed errors ([`ConfigError`], [`StepError`])
//! while the CLI boundary converts them to [`anyhow::Error`] via `?`.
//!
//! # Error kinds
//!
//! ```text
//! ConfigError — unreadable, unparsable or empty configuration
//! StepError   — failures while a step is running
//! ```
//!
//! Every variant is fatal except [`StepError::PermissionConflict`], which is
//! only ever rendered into a warning.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or compiling the configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("IO error reading config file {path}: {source}")]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or a section has the wrong shape.
    #[error("Invalid configuration in {origin}: {source}")]
    Parse {
        /// Where the JSON came from (a path or `<string>`).
        origin: String,
        /// Underlying deserialisation error.
        source: serde_json::Error,
    },

    /// A section is present but contains nothing to do.
    #[error("Section \"{0}\" is present but empty")]
    EmptySection(String),

    /// A section contains an empty name or path.
    #[error("Section \"{section}\" contains an empty entry")]
    EmptyEntry {
        /// Section containing the empty entry.
        section: String,
    },
}

/// Errors raised by running steps.
#[derive(Error, Debug)]
pub enum StepError {
    /// An external command exited non-zero.
    #[error("command '{program}' failed (exit {code}){}", stderr_suffix(.stderr))]
    CommandFailed {
        /// The command line that was run.
        program: String,
        /// Exit code, `-1` when killed by a signal.
        code: i32,
        /// Captured stderr, if any was captured.
        stderr: String,
    },

    /// An HTTP download returned a non-success status or could not complete.
    #[error("download of {url} failed: {reason}")]
    Network {
        /// URL that was requested.
        url: String,
        /// Status code or transport error description.
        reason: String,
    },

    /// The vault is logged out and no identity was configured.
    #[error("the vault is not logged in and no username was configured")]
    AuthenticationRequired,

    /// The vault returned something the engine cannot interpret.
    #[error("vault error: {0}")]
    Vault(String),

    /// A requested attachment does not exist on the vault item.
    #[error("secret '{secret}' has no attachment named '{attachment}'")]
    MissingAttachment {
        /// Vault item name.
        secret: String,
        /// Requested attachment file name.
        attachment: String,
    },

    /// Some links could not be created (every link was still attempted).
    #[error("{failed} of {total} symlinks could not be created")]
    LinkFailures {
        /// Number of links that failed.
        failed: usize,
        /// Number of links in the step.
        total: usize,
    },

    /// A destination already exists and overwriting was not permitted.
    #[error("{} already exists, re-run with --force to overwrite", .path.display())]
    PermissionConflict {
        /// The existing destination.
        path: PathBuf,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}
