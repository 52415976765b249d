//! Git identity and GitHub token setup
//!
//! Reads `.github/config.json` and configures the global git identity. When
//! a personal access token is present it is exported for `gh`, handed to
//! `gh auth`, and written to the git credential store so HTTPS pushes work
//! non-interactively.

use crate::permissions::set_mode;
use crate::{CommandSpec, ExecContext};
use clawboot_config::{Descriptor, FieldPath, GitHubConfig};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

const NAME_FIELDS: &[FieldPath<'static>] = &[
    &["name"],
    &["user.name"],
    &["user", "name"],
    &["github", "name"],
];

const EMAIL_FIELDS: &[FieldPath<'static>] = &[
    &["email"],
    &["user.email"],
    &["user", "email"],
    &["github", "email"],
];

const PAT_FIELDS: &[FieldPath<'static>] = &[&["pat"]];

/// Credential store file, relative to the home directory
const CREDENTIALS_FILE: &str = ".git-credentials";

/// Fields resolved from the identity descriptor
#[derive(Clone, Default, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
    pub pat: Option<String>,
}

impl GitIdentity {
    pub fn from_descriptor(descriptor: &Descriptor) -> Self {
        Self {
            name: descriptor.lookup(NAME_FIELDS),
            email: descriptor.lookup(EMAIL_FIELDS),
            pat: descriptor.lookup(PAT_FIELDS),
        }
    }
}

impl fmt::Debug for GitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitIdentity")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("pat", &self.pat.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Result of the GitHub configurator, for the bootstrap report
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GitHubStatus {
    /// Descriptor found and parsed
    pub configured: bool,
    pub name_set: bool,
    pub email_set: bool,
    pub token_exported: bool,
    pub credentials_file: Option<PathBuf>,
}

/// Apply the identity descriptor at `descriptor_path`.
///
/// Every sub-step is best-effort: a failing `git` or `gh` call is logged and
/// the remaining steps still run.
pub async fn configure_github(
    ctx: &mut ExecContext,
    descriptor_path: &Path,
    settings: &GitHubConfig,
    home: &Path,
) -> GitHubStatus {
    let Some(descriptor) = Descriptor::load(descriptor_path) else {
        return GitHubStatus::default();
    };
    let identity = GitIdentity::from_descriptor(&descriptor);
    let mut status = GitHubStatus {
        configured: true,
        ..GitHubStatus::default()
    };

    if let Some(ref name) = identity.name {
        status.name_set = set_git_global(ctx, "user.name", name).await;
    }
    if let Some(ref email) = identity.email {
        status.email_set = set_git_global(ctx, "user.email", email).await;
    }

    if let Some(ref token) = identity.pat {
        ctx.set_env(settings.token_env.clone(), token.clone());
        status.token_exported = true;

        // Persist auth in gh's own config
        ctx.run_best_effort(
            CommandSpec::new("gh")
                .args(["auth", "login", "--with-token"])
                .stdin(token.clone()),
        )
        .await;
        ctx.run_best_effort(CommandSpec::new("gh").args(["auth", "setup-git"]))
            .await;

        let credentials_path = home.join(CREDENTIALS_FILE);
        let line = format_credential_line(&settings.credential_user, token, &settings.host);
        match write_private_file(&credentials_path, &line) {
            Ok(()) => status.credentials_file = Some(credentials_path),
            Err(e) => tracing::warn!("Failed to write {:?}: {}", credentials_path, e),
        }

        set_git_global(ctx, "credential.helper", "store").await;
        tracing::info!("GitHub token configured (gh auth + git credential store)");
    }

    status
}

async fn set_git_global(ctx: &ExecContext, key: &str, value: &str) -> bool {
    let spec = CommandSpec::new("git").args(["config", "--global", key, value]);
    let set = ctx
        .run_best_effort(spec)
        .await
        .is_some_and(|output| output.success());
    if set {
        tracing::info!("Set git {}", key);
    }
    set
}

/// Format one git-credentials store line
fn format_credential_line(user: &str, token: &str, host: &str) -> String {
    format!("https://{}:{}@{}\n", urlencoded(user), urlencoded(token), host)
}

/// Percent-encode the characters `git credential-store` parses as URL syntax,
/// so a user or token containing `:`, `@` or `/` survives the round-trip.
fn urlencoded(s: &str) -> String {
    let mut encoded = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | ':' | '@' | '/' | ' ' | '#' | '?' | '&' | '+' | '=' | '\n' | '\r' => {
                encoded.push_str(&format!("%{:02X}", c as u32));
            }
            _ => encoded.push(c),
        }
    }
    encoded
}

/// Truncate-and-write a secret file, leaving it at mode 0600
fn write_private_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(content.as_bytes())?;
    // A pre-existing file keeps its old mode on open
    set_mode(path, 0o600)
}
