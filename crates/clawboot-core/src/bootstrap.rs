//! The bootstrap pipeline
//!
//! Stages run strictly in order, each skipped when its input is absent:
//! 1. umask and config directory permissions
//! 2. SSH agent
//! 3. git/GitHub identity, Notion key, mail config
//! 4. key enrollment and known_hosts seeding
//! 5. connectivity probe
//! 6. gateway handoff
//!
//! Nothing before the handoff aborts the sequence. Failures are logged and
//! recorded in the [`BootstrapReport`].

use crate::credentials::{configure_github, configure_notion, install_mail_config, GitHubStatus};
use crate::handoff::{handoff, EXIT_NOT_FOUND};
use crate::permissions::{normalize_permissions, PermissionReport};
use crate::ssh::{start_agent, AgentStatus, ProbeOutcome, SshManager};
use crate::{CommandRunner, ExecContext};
use clawboot_config::{resolve_in_home, BootstrapConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-stage outcome of [`Bootstrap::prepare`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    pub permissions: PermissionReport,
    pub agent: AgentStatus,
    pub github: GitHubStatus,
    pub notion_key: bool,
    pub mail_config: Option<PathBuf>,
    pub key_enrolled: bool,
    pub known_hosts_appended: usize,
    pub probe: ProbeOutcome,
    /// Stage errors that were logged and skipped
    pub warnings: Vec<String>,
}

impl BootstrapReport {
    fn warn(&mut self, stage: &str, message: impl std::fmt::Display) {
        tracing::warn!("{}: {}", stage, message);
        self.warnings.push(format!("{}: {}", stage, message));
    }

    fn log_summary(&self) {
        tracing::info!(
            "Bootstrap complete: agent={:?} git_identity={} token={} notion={} mail={} key={} known_hosts+={} probe={:?} warnings={}",
            self.agent,
            self.github.name_set || self.github.email_set,
            self.github.token_exported,
            self.notion_key,
            self.mail_config.is_some(),
            self.key_enrolled,
            self.known_hosts_appended,
            self.probe,
            self.warnings.len()
        );
    }
}

/// Runs the bootstrap stages against one environment
pub struct Bootstrap {
    config: BootstrapConfig,
    ctx: ExecContext,
    home: PathBuf,
}

impl Bootstrap {
    pub fn new(config: BootstrapConfig, runner: Arc<dyn CommandRunner>) -> Self {
        let home = config.home_dir();
        let mut ctx = ExecContext::new(runner);
        // git --global and gh resolve their files through HOME
        if config.paths.home.is_some() {
            ctx.set_env("HOME", home.to_string_lossy());
        }

        Self { config, ctx, home }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    fn ssh_manager(&self) -> SshManager {
        let ssh = &self.config.ssh;
        SshManager::new(
            self.config.resolve_in_config_dir(&ssh.key),
            resolve_in_home(&self.home, &ssh.known_hosts),
            ssh.host.clone(),
            ssh.user.clone(),
        )
    }

    /// Run every stage before the handoff. Never fails.
    pub async fn prepare(&mut self) -> BootstrapReport {
        let mut report = BootstrapReport::default();

        self.apply_umask();

        let config_dir = self.config.config_dir();
        tracing::info!("Bootstrapping from {:?}", config_dir);
        report.permissions = normalize_permissions(&config_dir);

        if self.config.ssh.agent {
            report.agent = start_agent(&mut self.ctx).await;
        }

        let github_descriptor = self.config.resolve_in_config_dir(&self.config.github.descriptor);
        report.github = configure_github(
            &mut self.ctx,
            &github_descriptor,
            &self.config.github,
            &self.home,
        )
        .await;

        let notion_descriptor = self.config.resolve_in_config_dir(&self.config.notion.descriptor);
        report.notion_key =
            configure_notion(&mut self.ctx, &notion_descriptor, &self.config.notion.env_var);

        let mail_source = self.config.resolve_in_config_dir(&self.config.mail.source);
        let mail_destination = resolve_in_home(&self.home, &self.config.mail.destination);
        match install_mail_config(&mail_source, &mail_destination) {
            Ok(installed) => report.mail_config = installed,
            Err(e) => report.warn("mail config", e),
        }

        let ssh = self.ssh_manager();
        report.key_enrolled = ssh.enroll_key(&self.ctx).await;

        if self.config.ssh.scan {
            match ssh.seed_known_hosts(&self.ctx).await {
                Ok(appended) => report.known_hosts_appended = appended,
                Err(e) => report.warn("known_hosts", e),
            }
        }

        if self.config.ssh.probe {
            report.probe = ssh.probe(&self.ctx).await;
        }

        report.log_summary();
        report
    }

    /// Run every stage, then hand off to the gateway and return its exit code
    pub async fn run(&mut self) -> i32 {
        self.prepare().await;

        match self.config.gateway.argv() {
            Ok(argv) => handoff(&self.ctx, &argv).await,
            Err(e) => {
                tracing::error!("Cannot launch gateway: {}", e);
                EXIT_NOT_FOUND
            }
        }
    }

    #[cfg(unix)]
    fn apply_umask(&self) {
        use nix::sys::stat::{umask, Mode};

        umask(Mode::from_bits_truncate(
            self.config.umask as nix::libc::mode_t,
        ));
    }

    #[cfg(not(unix))]
    fn apply_umask(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockCall, MockRunner};

    fn config_for(root: &Path) -> BootstrapConfig {
        let mut config = BootstrapConfig::default();
        config.paths.config_dir = root.join("config").to_string_lossy().to_string();
        config.paths.home = Some(root.join("home").to_string_lossy().to_string());
        config
    }

    #[tokio::test]
    async fn test_empty_environment_still_hands_off() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        let mut bootstrap = Bootstrap::new(config_for(tmp.path()), runner.clone());

        assert_eq!(bootstrap.run().await, 0);

        let commands = runner.commands();
        assert_eq!(
            commands,
            vec![
                "ssh-agent -s",
                "ssh-add -l",
                "ssh-keyscan -H github.com",
                "ssh -T git@github.com",
                "openclaw gateway --port 18789",
            ]
        );
        assert!(matches!(
            runner.get_calls().last(),
            Some(MockCall::Foreground(_))
        ));
        // known_hosts is created even though the scan produced nothing
        assert!(tmp.path().join("home/.ssh/known_hosts").is_file());
    }

    #[tokio::test]
    async fn test_home_override_exported() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        let bootstrap = Bootstrap::new(config_for(tmp.path()), runner);

        let home = tmp.path().join("home");
        assert_eq!(bootstrap.home(), home.as_path());
        assert_eq!(
            bootstrap.context().env_var("HOME"),
            Some(home.to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn test_disabled_ssh_stages() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path());
        config.ssh.agent = false;
        config.ssh.scan = false;
        config.ssh.probe = false;
        let runner = Arc::new(MockRunner::new());
        let mut bootstrap = Bootstrap::new(config, runner.clone());

        let report = bootstrap.prepare().await;
        assert_eq!(report.agent, AgentStatus::Disabled);
        assert_eq!(report.probe, ProbeOutcome::Skipped);
        assert_eq!(runner.commands(), vec!["ssh-add -l"]);
        assert!(!tmp.path().join("home/.ssh/known_hosts").exists());
    }

    #[tokio::test]
    async fn test_gateway_exit_code_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = Arc::new(MockRunner::new());
        runner.set_foreground_exit_code(7);
        // Every earlier tool failing must not change the outcome
        runner.fail_spawn("ssh-agent");
        runner.fail_spawn("ssh-add");
        runner.fail_spawn("ssh-keyscan");
        runner.fail_spawn("ssh");
        let mut bootstrap = Bootstrap::new(config_for(tmp.path()), runner);

        assert_eq!(bootstrap.run().await, 7);
    }

    #[tokio::test]
    async fn test_invalid_gateway_command() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path());
        config.gateway.command = String::new();
        let runner = Arc::new(MockRunner::new());
        let mut bootstrap = Bootstrap::new(config, runner.clone());

        assert_eq!(bootstrap.run().await, EXIT_NOT_FOUND);
        assert!(!runner
            .get_calls()
            .iter()
            .any(|call| matches!(call, MockCall::Foreground(_))));
    }

    #[tokio::test]
    async fn test_stage_order_with_agent_and_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let config_dir = tmp.path().join("config");
        std::fs::create_dir_all(config_dir.join(".github")).unwrap();
        std::fs::create_dir_all(config_dir.join(".ssh")).unwrap();
        std::fs::write(
            config_dir.join(".github/config.json"),
            r#"{"name": "A", "email": "b@x.com"}"#,
        )
        .unwrap();
        std::fs::write(config_dir.join(".ssh/github"), "key").unwrap();

        let runner = Arc::new(MockRunner::new());
        runner.respond(
            "ssh-agent -s",
            0,
            "SSH_AUTH_SOCK=/tmp/a.sock; export SSH_AUTH_SOCK;\nSSH_AGENT_PID=9; export SSH_AGENT_PID;\n",
            "",
        );
        let mut bootstrap = Bootstrap::new(config, runner.clone());

        let code = bootstrap.run().await;
        assert_eq!(code, 0);

        let key = config_dir.join(".ssh/github");
        assert_eq!(
            runner.commands(),
            vec![
                "ssh-agent -s".to_string(),
                "git config --global user.name A".to_string(),
                "git config --global user.email b@x.com".to_string(),
                format!("ssh-add {}", key.display()),
                "ssh-add -l".to_string(),
                "ssh-keyscan -H github.com".to_string(),
                "ssh -T git@github.com".to_string(),
                "openclaw gateway --port 18789".to_string(),
            ]
        );

        let add = runner.spec_for(&format!("ssh-add {}", key.display())).unwrap();
        assert_eq!(
            add.env.get("SSH_AUTH_SOCK").map(String::as_str),
            Some("/tmp/a.sock")
        );
        let gateway = runner.last_spec().unwrap();
        assert_eq!(
            gateway.env.get("SSH_AGENT_PID").map(String::as_str),
            Some("9")
        );
    }
}
