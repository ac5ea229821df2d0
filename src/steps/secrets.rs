//! Copying vault attachments to disk.
use std::collections::BTreeMap;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use super::symlinks::expand_path;
use super::{Action, Environment, StepResult, StepStats, summarize};
use crate::config::SECRETS;
use crate::config::secrets::{Attachments, SecretsSection};
use crate::error::{ConfigError, StepError};
use crate::exec::CommandLine;

/// Vault command-line client.
pub const VAULT_PROGRAM: &str = "bw";

/// Environment variable carrying the vault session token.
const SESSION_ENV: &str = "BW_SESSION";

/// Output of `bw status`.
#[derive(Debug, Deserialize)]
struct VaultStatus {
    status: String,
}

/// The parts of `bw get item` output this step needs.
#[derive(Debug, Deserialize)]
struct VaultItem {
    id: String,
    #[serde(default)]
    attachments: Vec<VaultAttachment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultAttachment {
    id: String,
    file_name: String,
}

/// Copy attachments of vault items to files on disk.
///
/// Files are written readable by the owner only.  A destination that
/// already exists is left alone unless `--force` was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySecretsToDisk {
    secrets: BTreeMap<String, Attachments>,
    username: Option<String>,
}

impl CopySecretsToDisk {
    /// Build the step from the `secrets` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptySection`] if no secret or an empty
    /// attachment list is configured, and [`ConfigError::EmptyEntry`] for a
    /// blank name or destination.
    pub fn new(section: &SecretsSection) -> Result<Self, ConfigError> {
        if section.files.is_empty() {
            return Err(ConfigError::EmptySection(SECRETS.to_string()));
        }
        for (secret, attachments) in &section.files {
            if secret.trim().is_empty() {
                return Err(ConfigError::EmptyEntry {
                    section: SECRETS.to_string(),
                });
            }
            if attachments.is_empty() {
                return Err(ConfigError::EmptySection(format!("{SECRETS}.{secret}")));
            }
            if attachments
                .iter()
                .any(|(name, dest)| name.trim().is_empty() || dest.trim().is_empty())
            {
                return Err(ConfigError::EmptyEntry {
                    section: format!("{SECRETS}.{secret}"),
                });
            }
        }
        Ok(Self {
            secrets: section.files.clone(),
            username: section
                .username
                .clone()
                .filter(|u| !u.trim().is_empty()),
        })
    }

    fn bw<'a>(args: impl IntoIterator<Item = &'a str>, session: Option<&str>) -> CommandLine {
        let cmd = CommandLine::new(VAULT_PROGRAM, args).capture_stdout();
        match session {
            Some(token) => cmd.with_env(SESSION_ENV, token),
            None => cmd,
        }
    }

    /// Make sure the vault is unlocked and return the session token to use.
    ///
    /// `None` means the vault is already unlocked and the ambient session
    /// applies.
    fn open_session(&self, env: &Environment) -> Result<Option<String>> {
        let output = env.inspect(&CommandLine::new(VAULT_PROGRAM, ["status"]).quiet())?;
        let status: VaultStatus = serde_json::from_str(output.stdout.trim())
            .map_err(|e| StepError::Vault(format!("unreadable status: {e}")))?;
        env.log.debug(&format!("vault is {}", status.status));

        let unlock = match status.status.as_str() {
            "unlocked" => return Ok(None),
            "locked" => Self::bw(["unlock", "--raw"], None),
            "unauthenticated" => {
                let username = self
                    .username
                    .as_deref()
                    .ok_or(StepError::AuthenticationRequired)?;
                Self::bw(["login", username, "--raw"], None)
            }
            other => {
                return Err(StepError::Vault(format!("unexpected status '{other}'")).into());
            }
        };

        let token = env.run_checked(&unlock)?.stdout.trim().to_string();
        if token.is_empty() {
            return Err(StepError::Vault("no session token returned".to_string()).into());
        }
        Ok(Some(token))
    }

    fn fetch_item(name: &str, session: Option<&str>, env: &Environment) -> Result<VaultItem> {
        let output = env
            .run_checked(&Self::bw(["get", "item", name], session))
            .with_context(|| format!("looking up secret '{name}'"))?;
        serde_json::from_str(output.stdout.trim())
            .map_err(|e| StepError::Vault(format!("unreadable item '{name}': {e}")).into())
    }

    fn preview(&self, env: &Environment) -> Result<StepResult> {
        let mut stats = StepStats::new();
        for (secret, attachments) in &self.secrets {
            let item_id = format!("<{secret}-id>");
            for (attachment, dest) in attachments {
                let dest = expand_path(dest, &env.home)?;
                if !env.may_replace(&dest) {
                    stats.skipped += 1;
                    continue;
                }
                env.log.dry_run(&format!(
                    "would copy {secret}/{attachment} (attachment <{attachment}-id> of item {item_id}) to {}",
                    dest.display()
                ));
                stats.changed += 1;
            }
        }
        Ok(stats.finish(env))
    }
}

impl Action for CopySecretsToDisk {
    fn name(&self) -> &str {
        SECRETS
    }

    fn description(&self) -> String {
        let names: Vec<&str> = self.secrets.keys().map(String::as_str).collect();
        format!(
            "copy attachments from {} to disk",
            summarize(&names, "secrets")
        )
    }

    fn run(&self, env: &Environment) -> Result<StepResult> {
        if env.dry_run {
            return self.preview(env);
        }

        let session = self.open_session(env)?;
        let mut stats = StepStats::new();

        for (secret, attachments) in &self.secrets {
            let item = Self::fetch_item(secret, session.as_deref(), env)?;
            env.log.debug(&format!(
                "secret '{secret}' has {} attachments",
                item.attachments.len()
            ));

            for (attachment, dest) in attachments {
                let dest = expand_path(dest, &env.home)?;
                if !env.may_replace(&dest) {
                    stats.skipped += 1;
                    continue;
                }

                let attachment_id = item
                    .attachments
                    .iter()
                    .find(|a| a.file_name == *attachment)
                    .map(|a| a.id.as_str())
                    .ok_or_else(|| StepError::MissingAttachment {
                        secret: secret.clone(),
                        attachment: attachment.clone(),
                    })?;

                let output = env
                    .run_checked(&Self::bw(
                        [
                            "get",
                            "attachment",
                            attachment_id,
                            "--itemid",
                            item.id.as_str(),
                            "--raw",
                        ],
                        session.as_deref(),
                    ))
                    .with_context(|| format!("fetching {secret}/{attachment}"))?;
                env.write_file(&dest, &output.stdout_bytes)?;
                env.log
                    .debug(&format!("copied {secret}/{attachment} to {}", dest.display()));
                stats.changed += 1;
            }
        }

        Ok(stats.finish(env))
    }
}
