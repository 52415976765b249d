//! Mail client config install
//!
//! The mail CLI only looks under `~/.config/himalaya/`, so the mounted
//! config is copied there verbatim.

use crate::permissions::set_mode;
use crate::Result;
use std::path::{Path, PathBuf};

/// Copy `source` to `destination` (overwriting) and restrict it to 0600.
///
/// Returns the installed path, or `None` when there is no source file.
pub fn install_mail_config(source: &Path, destination: &Path) -> Result<Option<PathBuf>> {
    if !source.is_file() {
        tracing::debug!("No mail config at {:?}, skipping", source);
        return Ok(None);
    }

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(source, destination)?;
    set_mode(destination, 0o600)?;

    tracing::info!("Mail config installed to {:?}", destination);
    Ok(Some(destination.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = "[accounts.work]\nemail = \"me@example.com\"\n";

    #[test]
    fn test_missing_source() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("home/.config/himalaya/config.toml");
        let installed = install_mail_config(&tmp.path().join("absent.toml"), &dest).unwrap();
        assert!(installed.is_none());
        assert!(!dest.exists());
    }

    #[test]
    fn test_copies_and_restricts() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("config/.himalaya/config.toml");
        std::fs::create_dir_all(source.parent().unwrap()).unwrap();
        std::fs::write(&source, CONFIG).unwrap();
        let dest = tmp.path().join("home/.config/himalaya/config.toml");

        let installed = install_mail_config(&source, &dest).unwrap();
        assert_eq!(installed.as_deref(), Some(dest.as_path()));
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), CONFIG);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&dest).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn test_overwrites_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("config.toml");
        std::fs::write(&source, CONFIG).unwrap();
        let dest = tmp.path().join("dest/config.toml");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, "stale = true\nwith = \"more content than the source has\"\n")
            .unwrap();

        install_mail_config(&source, &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), CONFIG);
    }
}
