//! Vault secrets section.
use std::collections::BTreeMap;

use serde::Deserialize;

/// Attachment file name → destination path, for one vault item.
pub type Attachments = BTreeMap<String, String>;

/// The `secrets` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SecretsSection {
    /// Identity used to log in when the vault has no session.
    #[serde(default)]
    pub username: Option<String>,
    /// Vault item name → attachments to copy.
    #[serde(default)]
    pub files: BTreeMap<String, Attachments>,
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn username_is_optional() {
        let section: SecretsSection =
            serde_json::from_str(r#"{"files": {"gpg": {"key.asc": "~/key.asc"}}}"#).unwrap();
        assert!(section.username.is_none());
        assert_eq!(section.files["gpg"]["key.asc"], "~/key.asc");
    }

    #[test]
    fn missing_files_is_empty() {
        let section: SecretsSection =
            serde_json::from_str(r#"{"username": "me@example.com"}"#).unwrap();
        assert!(section.files.is_empty());
    }
}
