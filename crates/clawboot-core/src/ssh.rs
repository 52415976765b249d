//! SSH agent, key enrollment and host trust
//!
//! # Security
//!
//! - The agent socket and PID are exported only through the [`ExecContext`],
//!   so they reach ssh tooling and the gateway but not unrelated processes
//! - Host keys are trusted on first use: `ssh-keyscan` output is appended to
//!   known_hosts without verification. Repeated runs append duplicate lines,
//!   which ssh tolerates

use crate::{CommandSpec, ExecContext, Result};
use regex::Regex;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Exit code ssh uses for its own failures (network, auth, host key)
const SSH_ERROR_EXIT: i32 = 255;

/// Outcome of starting the agent
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    /// Disabled in settings
    #[default]
    Disabled,
    /// `ssh-agent` missing or failed; key enrollment will fail on its own
    Unavailable,
    /// Agent started; names of the variables exported
    Started { exported: Vec<String> },
}

/// Observed result of the connectivity probe
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    #[default]
    Skipped,
    /// ssh could not be started
    NotRun(String),
    /// The remote answered (GitHub answers a successful `-T` login with exit 1)
    Responded { exit_code: i32 },
    /// ssh itself failed: network, authentication or host key problems
    Failed { exit_code: i32 },
}

fn agent_env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(SSH_AUTH_SOCK|SSH_AGENT_PID)=([^;\n]+)").expect("agent pattern is valid")
    })
}

/// Extract `SSH_AUTH_SOCK` / `SSH_AGENT_PID` assignments from `ssh-agent -s` output
pub fn parse_agent_env(output: &str) -> Vec<(String, String)> {
    agent_env_pattern()
        .captures_iter(output)
        .map(|caps| (caps[1].to_string(), caps[2].to_string()))
        .collect()
}

/// Start an agent and export its connection variables into the context
pub async fn start_agent(ctx: &mut ExecContext) -> AgentStatus {
    let output = match ctx.run(CommandSpec::new("ssh-agent").arg("-s")).await {
        Ok(output) if output.success() => output,
        Ok(output) => {
            tracing::warn!(
                "ssh-agent exited with code {}, continuing without agent",
                output.exit_code
            );
            return AgentStatus::Unavailable;
        }
        Err(e) => {
            tracing::warn!("Could not start ssh-agent: {}", e);
            return AgentStatus::Unavailable;
        }
    };

    let mut exported = Vec::new();
    for (key, value) in parse_agent_env(&output.stdout) {
        ctx.set_env(key.clone(), value);
        exported.push(key);
    }

    if exported.len() < 2 {
        tracing::warn!("ssh-agent output only provided {:?}", exported);
    } else {
        tracing::info!("SSH agent started");
    }
    AgentStatus::Started { exported }
}

/// Key enrollment, host trust and probe against one remote host
pub struct SshManager {
    key_path: PathBuf,
    known_hosts: PathBuf,
    host: String,
    user: String,
}

impl SshManager {
    pub fn new(
        key_path: PathBuf,
        known_hosts: PathBuf,
        host: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            key_path,
            known_hosts,
            host: host.into(),
            user: user.into(),
        }
    }

    /// Get the private key path
    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Get the known_hosts path
    pub fn known_hosts(&self) -> &Path {
        &self.known_hosts
    }

    /// Add the private key to the agent, then log the enrolled keys.
    ///
    /// Returns whether `ssh-add` accepted the key.
    pub async fn enroll_key(&self, ctx: &ExecContext) -> bool {
        let added = if self.key_path.is_file() {
            let spec = CommandSpec::new("ssh-add").arg(self.key_path.to_string_lossy());
            let added = ctx
                .run_best_effort(spec)
                .await
                .is_some_and(|output| output.success());
            if added {
                tracing::info!("Added {:?} to the SSH agent", self.key_path);
            }
            added
        } else {
            tracing::info!("No SSH key at {:?}, skipping ssh-add", self.key_path);
            false
        };

        if let Some(output) = ctx
            .run_best_effort(CommandSpec::new("ssh-add").arg("-l"))
            .await
        {
            for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
                tracing::info!("Agent key: {}", line);
            }
        }

        added
    }

    /// Append the host's scanned keys to known_hosts, creating it if needed.
    ///
    /// A failed scan appends nothing. Returns the number of lines appended.
    pub async fn seed_known_hosts(&self, ctx: &ExecContext) -> Result<usize> {
        if let Some(parent) = self.known_hosts.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.known_hosts)?;

        let spec = CommandSpec::new("ssh-keyscan").args(["-H", self.host.as_str()]);
        let scanned = match ctx.run(spec).await {
            Ok(output) => output.stdout,
            Err(e) => {
                tracing::warn!("ssh-keyscan could not be run: {}", e);
                String::new()
            }
        };

        if scanned.is_empty() {
            tracing::warn!("No host keys scanned for {}", self.host);
            return Ok(0);
        }

        if !ends_with_newline(&mut file)? {
            file.write_all(b"\n")?;
        }
        file.write_all(scanned.as_bytes())?;

        let appended = scanned.lines().filter(|l| !l.trim().is_empty()).count();
        tracing::info!(
            "Appended {} host key line(s) for {} to {:?}",
            appended,
            self.host,
            self.known_hosts
        );
        Ok(appended)
    }

    /// One authenticated round-trip against the host; the result is only observed
    pub async fn probe(&self, ctx: &ExecContext) -> ProbeOutcome {
        let target = format!("{}@{}", self.user, self.host);
        let spec = CommandSpec::new("ssh").args(["-T", target.as_str()]);

        let output = match ctx.run(spec).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("SSH probe could not be run: {}", e);
                return ProbeOutcome::NotRun(e.to_string());
            }
        };

        let message = output.stderr.trim();
        if output.exit_code == SSH_ERROR_EXIT {
            tracing::warn!("SSH probe to {} failed: {}", target, message);
            ProbeOutcome::Failed {
                exit_code: output.exit_code,
            }
        } else {
            tracing::info!("SSH probe to {}: {}", target, message);
            ProbeOutcome::Responded {
                exit_code: output.exit_code,
            }
        }
    }
}

/// True for an empty file or one whose last byte is a newline
fn ends_with_newline(file: &mut std::fs::File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
