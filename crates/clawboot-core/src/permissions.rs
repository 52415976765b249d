//! Permission normalization for the mounted config directory
//!
//! Mounted config trees often arrive with modes that block traversal by the
//! tools run later (git, gh, ssh). Directories gain `0755`, regular files
//! gain `0644`, and anything below a `.ssh` directory is forced to exactly
//! `0600` since ssh refuses group/world readable private keys.

use std::path::Path;

const DIR_BITS: u32 = 0o755;
const FILE_BITS: u32 = 0o644;
const PRIVATE_FILE_MODE: u32 = 0o600;

/// Counts of entries touched by [`normalize_permissions`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PermissionReport {
    pub directories: usize,
    pub files: usize,
    /// Files under a `.ssh` directory, forced to 0600
    pub private_files: usize,
    pub failures: usize,
}

/// Recursively normalize modes under `root`.
///
/// A missing root or a root that is not a directory is a no-op. A symlinked
/// root is resolved first; symlinks inside the tree are never followed or
/// modified. A failure on one entry is logged and the walk continues.
pub fn normalize_permissions(root: &Path) -> PermissionReport {
    let mut report = PermissionReport::default();

    if !root.is_dir() {
        tracing::debug!("Config directory {:?} not present, skipping permissions", root);
        return report;
    }

    // A linked root is followed; links below it are not
    let resolved = match std::fs::canonicalize(root) {
        Ok(resolved) => resolved,
        Err(e) => {
            report.failure(root, e);
            return report;
        }
    };

    let private = [root, resolved.as_path()]
        .iter()
        .any(|path| path.components().any(|c| c.as_os_str() == ".ssh"));
    normalize_dir(&resolved, private, &mut report);

    tracing::debug!(
        "Normalized permissions under {:?}: {} dirs, {} files ({} private), {} failures",
        root,
        report.directories,
        report.files,
        report.private_files,
        report.failures
    );
    report
}

impl PermissionReport {
    fn failure(&mut self, path: &Path, e: std::io::Error) {
        tracing::warn!("Failed to fix permissions on {:?}: {}", path, e);
        self.failures += 1;
    }
}

#[cfg(unix)]
fn normalize_dir(dir: &Path, private: bool, report: &mut PermissionReport) {
    // Fix the directory before listing it so locked directories become traversable
    match add_mode_bits(dir, DIR_BITS) {
        Ok(()) => report.directories += 1,
        Err(e) => report.failure(dir, e),
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            report.failure(dir, e);
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                report.failure(dir, e);
                continue;
            }
        };
        let path = entry.path();
        let file_type = match entry.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                report.failure(&path, e);
                continue;
            }
        };

        if file_type.is_dir() {
            let private = private || entry.file_name() == ".ssh";
            normalize_dir(&path, private, report);
        } else if file_type.is_file() {
            let result = if private {
                set_mode(&path, PRIVATE_FILE_MODE)
            } else {
                add_mode_bits(&path, FILE_BITS)
            };
            match result {
                Ok(()) => {
                    report.files += 1;
                    if private {
                        report.private_files += 1;
                    }
                }
                Err(e) => report.failure(&path, e),
            }
        }
    }
}

#[cfg(not(unix))]
fn normalize_dir(dir: &Path, _private: bool, _report: &mut PermissionReport) {
    tracing::debug!("Unix permissions unsupported, leaving {:?} as is", dir);
}

#[cfg(unix)]
fn add_mode_bits(path: &Path, bits: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::symlink_metadata(path)?.permissions();
    let mode = perms.mode() | bits;
    if mode != perms.mode() {
        perms.set_mode(mode);
        std::fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    fn mode_of(path: &Path) -> u32 {
        std::fs::symlink_metadata(path).unwrap().permissions().mode() & 0o7777
    }

    fn write_with_mode(path: &Path, mode: u32) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, "content").unwrap();
        set_mode(path, mode).unwrap();
    }

    fn snapshot(root: &Path) -> Vec<(PathBuf, u32)> {
        let mut modes = Vec::new();
        let mut stack = vec![root.to_path_buf()];
        while let Some(dir) = stack.pop() {
            modes.push((dir.clone(), mode_of(&dir)));
            for entry in std::fs::read_dir(&dir).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    modes.push((path.clone(), mode_of(&path)));
                }
            }
        }
        modes.sort();
        modes
    }

    #[test]
    fn test_missing_root_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let report = normalize_permissions(&tmp.path().join("absent"));
        assert_eq!(report, PermissionReport::default());
    }

    #[test]
    fn test_file_root_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("config");
        write_with_mode(&file, 0o600);
        let report = normalize_permissions(&file);
        assert_eq!(report, PermissionReport::default());
        assert_eq!(mode_of(&file), 0o600);
    }

    #[test]
    fn test_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        std::fs::create_dir(&root).unwrap();
        set_mode(&root, 0o700).unwrap();

        let report = normalize_permissions(&root);
        assert_eq!(report.directories, 1);
        assert_eq!(report.files, 0);
        assert_eq!(mode_of(&root), 0o755);
    }

    #[test]
    fn test_regular_files_and_dirs_gain_bits() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write_with_mode(&root.join(".github/config.json"), 0o600);
        write_with_mode(&root.join("script.sh"), 0o700);
        set_mode(&root.join(".github"), 0o700).unwrap();

        let report = normalize_permissions(&root);
        assert_eq!(report.failures, 0);
        assert_eq!(report.files, 2);
        assert_eq!(report.private_files, 0);
        assert_eq!(mode_of(&root.join(".github")), 0o755);
        assert_eq!(mode_of(&root.join(".github/config.json")), 0o644);
        assert_eq!(mode_of(&root.join("script.sh")), 0o744);
    }

    #[test]
    fn test_ssh_files_forced_to_0600() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write_with_mode(&root.join(".ssh/github"), 0o777);
        write_with_mode(&root.join(".ssh/github.pub"), 0o644);
        write_with_mode(&root.join(".ssh/nested/deploy"), 0o400);

        let report = normalize_permissions(&root);
        assert_eq!(report.private_files, 3);
        assert_eq!(mode_of(&root.join(".ssh/github")), 0o600);
        assert_eq!(mode_of(&root.join(".ssh/github.pub")), 0o600);
        assert_eq!(mode_of(&root.join(".ssh/nested/deploy")), 0o600);
        // The .ssh directory itself still follows the directory rule
        assert_eq!(mode_of(&root.join(".ssh")) & 0o755, 0o755);
    }

    #[test]
    fn test_root_inside_ssh_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join(".ssh");
        write_with_mode(&root.join("id_ed25519"), 0o644);

        normalize_permissions(&root);
        assert_eq!(mode_of(&root.join("id_ed25519")), 0o600);
    }

    #[test]
    fn test_locked_directory_becomes_traversable() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write_with_mode(&root.join("locked/inner.json"), 0o600);
        set_mode(&root.join("locked"), 0o000).unwrap();

        let report = normalize_permissions(&root);
        assert_eq!(report.failures, 0);
        assert_eq!(mode_of(&root.join("locked")), 0o755);
        assert_eq!(mode_of(&root.join("locked/inner.json")), 0o644);
    }

    #[test]
    fn test_symlinks_not_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("outside.key");
        write_with_mode(&outside, 0o600);
        let root = tmp.path().join("config");
        std::fs::create_dir_all(&root).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("linked.key")).unwrap();

        let report = normalize_permissions(&root);
        assert_eq!(report.files, 0);
        assert_eq!(mode_of(&outside), 0o600);
    }

    #[test]
    fn test_symlinked_root_is_resolved() {
        let tmp = tempfile::tempdir().unwrap();
        let real = tmp.path().join("real");
        write_with_mode(&real.join("config.json"), 0o600);
        set_mode(&real, 0o700).unwrap();
        let root = tmp.path().join("config");
        std::os::unix::fs::symlink(&real, &root).unwrap();

        let report = normalize_permissions(&root);
        assert_eq!(report.directories, 1);
        assert_eq!(report.files, 1);
        assert_eq!(report.failures, 0);
        assert_eq!(mode_of(&real), 0o755);
        assert_eq!(mode_of(&real.join("config.json")), 0o644);
    }

    #[test]
    fn test_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("config");
        write_with_mode(&root.join(".ssh/github"), 0o777);
        write_with_mode(&root.join(".notion/config.json"), 0o640);
        write_with_mode(&root.join(".himalaya/config.toml"), 0o604);

        normalize_permissions(&root);
        let first = snapshot(&root);
        normalize_permissions(&root);
        let second = snapshot(&root);
        assert_eq!(first, second);
    }
}
