//! The umask is process-wide, so this lives in its own test binary where no
//! other test can reset it mid-run.

#![cfg(unix)]

use clawboot_config::BootstrapConfig;
use clawboot_core::test_support::MockRunner;
use clawboot_core::Bootstrap;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;

#[tokio::test]
async fn test_configured_umask_applies_to_created_files() {
    let tmp = tempfile::tempdir().unwrap();
    let home = tmp.path().join("home");
    let mut config = BootstrapConfig::default();
    config.umask = 0o077;
    config.paths.config_dir = tmp.path().join("config").to_string_lossy().to_string();
    config.paths.home = Some(home.to_string_lossy().to_string());

    let runner = Arc::new(MockRunner::new());
    runner.respond("ssh-keyscan -H github.com", 0, "|1|h= ssh-ed25519 AAAA\n", "");
    let mut bootstrap = Bootstrap::new(config, runner);
    bootstrap.prepare().await;

    let mode = |path: &std::path::Path| {
        std::fs::metadata(path).unwrap().permissions().mode() & 0o777
    };
    assert_eq!(mode(&home.join(".ssh/known_hosts")), 0o600);
    assert_eq!(mode(&home.join(".ssh")), 0o700);
}
