/// Path expansion and resolution utilities
///
/// Watch directories arrive from configuration as user-written strings;
/// discovery needs them tilde-expanded and symlink-free before any
/// identity comparison can happen.
use std::path::{Path, PathBuf};

/// Expand a leading `~` to the user's home directory.
///
/// Paths without a tilde are returned unchanged. If the home directory
/// cannot be determined, the path is returned as written.
pub fn expand_tilde(path: &str) -> PathBuf {
    if path == "~" {
        return dirs::home_dir().unwrap_or_else(|| PathBuf::from(path));
    }
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(path)
}

/// Resolve symlinks in a path, falling back to the unresolved path when
/// resolution fails (e.g. the path does not exist yet).
pub fn resolve_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Default data directory: `{data_dir}/codetrail`
pub fn project_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codetrail")
}

/// Default config directory: `{config_dir}/codetrail`
pub fn project_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("codetrail")
}

/// Default SQLite database path: `{data_dir}/codetrail/codetrail.db`
pub fn default_db_path() -> PathBuf {
    project_data_dir().join("codetrail.db")
}

/// Default config file path: `{config_dir}/codetrail/config.toml`
pub fn default_config_path() -> PathBuf {
    project_config_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_tilde_plain_path() {
        assert_eq!(expand_tilde("/tmp/foo"), PathBuf::from("/tmp/foo"));
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
    }

    #[test]
    fn test_expand_tilde_home_prefix() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/projects"), home.join("projects"));
            assert_eq!(expand_tilde("~"), home);
        }
    }

    #[test]
    fn test_expand_tilde_mid_path_untouched() {
        // A tilde that is not a prefix is a literal file name
        assert_eq!(expand_tilde("/tmp/~foo"), PathBuf::from("/tmp/~foo"));
    }

    #[test]
    fn test_resolve_path_missing_falls_back() {
        let missing = Path::new("/definitely/not/a/real/path");
        assert_eq!(resolve_path(missing), missing.to_path_buf());
    }

    #[test]
    fn test_resolve_path_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("target");
        std::fs::create_dir(&target).unwrap();
        let link = dir.path().join("link");
        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, &link).unwrap();
            assert_eq!(resolve_path(&link), std::fs::canonicalize(&target).unwrap());
        }
    }

    #[test]
    fn test_default_paths_contain_project_name() {
        assert!(default_db_path().to_string_lossy().contains("codetrail"));
        assert!(default_config_path().to_string_lossy().contains("codetrail"));
    }
}
