//! Rust toolchain section.
use serde::Deserialize;

/// Channel installed when the section does not name one.
pub const DEFAULT_CHANNEL: &str = "stable";

/// The `rust` section: which toolchain to install and which tools to
/// install with `cargo install`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RustSection {
    /// Toolchain channel passed to the rustup installer.
    #[serde(default)]
    pub default_channel: Option<String>,
    /// Crates to install with `cargo install`.
    #[serde(default)]
    pub install: Option<Vec<String>>,
    /// Reinstall every crate even if it is recorded as installed.
    #[serde(default)]
    pub force_reinstall: bool,
}

impl RustSection {
    /// The configured channel, or [`DEFAULT_CHANNEL`].
    #[must_use]
    pub fn channel(&self) -> &str {
        self.default_channel.as_deref().unwrap_or(DEFAULT_CHANNEL)
    }
}
