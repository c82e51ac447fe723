/// Git repository discovery
///
/// Walks configured directories looking for `.git` markers. A `.git`
/// directory marks a regular repository root; a `.git` file is a worktree
/// marker pointing at the shared object store. Candidates are validated by
/// actually opening them, so corrupted or half-initialized repositories are
/// skipped rather than handed to the poller.
use crate::error::DiscoveryError;
use crate::paths;
use crate::types::Repository;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Discover git repositories under the given directories.
///
/// Never fails the whole call: unusable directories are logged and
/// skipped. Results are deduplicated by absolute repository path,
/// preserving first-discovery order across overlapping inputs.
pub fn discover_repositories(dirs: &[String]) -> Vec<Repository> {
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut repositories = Vec::new();

    for dir in dirs {
        let expanded = paths::expand_tilde(dir);
        let resolved = paths::resolve_path(&expanded);

        if !resolved.exists() {
            tracing::warn!("watch directory does not exist, skipping: {}", dir);
            continue;
        }
        if !resolved.is_dir() {
            tracing::warn!("watch path is not a directory, skipping: {}", dir);
            continue;
        }

        match find_git_repositories(&resolved) {
            Ok(found) => {
                for repo in found {
                    if seen.insert(repo.path.clone()) {
                        repositories.push(repo);
                    }
                }
            }
            Err(e) => tracing::warn!("skipping watch directory '{}': {}", dir, e),
        }
    }

    tracing::info!("discovered {} git repositories", repositories.len());
    repositories
}

/// Recursively scan one directory tree for git repositories.
pub fn find_git_repositories(dir: &Path) -> Result<Vec<Repository>, DiscoveryError> {
    if !dir.exists() {
        return Err(DiscoveryError::DirectoryNotFound(dir.display().to_string()));
    }
    if !dir.is_dir() {
        return Err(DiscoveryError::NotADirectory(dir.display().to_string()));
    }

    let mut repositories = Vec::new();
    let mut walker = WalkDir::new(dir).follow_links(false).into_iter();

    loop {
        let entry = match walker.next() {
            None => break,
            Some(Ok(entry)) => entry,
            Some(Err(e)) => {
                // Permission-denied subtrees are skipped, not fatal
                tracing::debug!("skipping unreadable path: {}", e);
                continue;
            }
        };

        if entry.file_name() != ".git" {
            continue;
        }

        if entry.file_type().is_dir() {
            if let Some(root) = entry.path().parent()
                && let Some(repo) = validate_repository(root, false, None)
            {
                repositories.push(repo);
            }
            // Never descend into the object store itself
            walker.skip_current_dir();
        } else if entry.file_type().is_file() {
            let Some(root) = entry.path().parent() else {
                continue;
            };
            match parse_worktree_marker(entry.path(), root) {
                Ok(git_dir) => {
                    if let Some(repo) = validate_repository(root, true, Some(git_dir)) {
                        repositories.push(repo);
                    }
                }
                Err(e) => tracing::debug!("skipping worktree marker: {}", e),
            }
        }
    }

    Ok(repositories)
}

/// Parse a worktree `.git` file of the form `gitdir: <path>`.
///
/// Relative targets resolve against the worktree root; the resolved target
/// must exist.
fn parse_worktree_marker(marker: &Path, root: &Path) -> Result<PathBuf, DiscoveryError> {
    let invalid = |reason: &str| DiscoveryError::InvalidWorktree {
        path: marker.display().to_string(),
        reason: reason.to_string(),
    };

    let content = std::fs::read_to_string(marker)
        .map_err(|e| invalid(&format!("unreadable: {e}")))?;
    let line = content.lines().next().ok_or_else(|| invalid("empty file"))?;
    let target = line
        .strip_prefix("gitdir:")
        .ok_or_else(|| invalid("missing 'gitdir:' prefix"))?
        .trim();
    if target.is_empty() {
        return Err(invalid("empty gitdir target"));
    }

    let mut git_dir = PathBuf::from(target);
    if git_dir.is_relative() {
        git_dir = root.join(git_dir);
    }
    let git_dir = paths::resolve_path(&git_dir);

    if !git_dir.is_dir() {
        return Err(invalid("gitdir target does not exist"));
    }
    Ok(git_dir)
}

/// Validate a candidate root by opening it as a git repository.
///
/// Returns None (logged) for corrupted or incomplete candidates.
fn validate_repository(root: &Path, is_worktree: bool, git_dir: Option<PathBuf>) -> Option<Repository> {
    let resolved = paths::resolve_path(root);

    if let Err(e) = git2::Repository::open(&resolved) {
        tracing::debug!(
            "skipping invalid repository at {}: {}",
            resolved.display(),
            e.message()
        );
        return None;
    }

    let git_dir = git_dir.unwrap_or_else(|| paths::resolve_path(&resolved.join(".git")));
    Some(Repository::new(resolved, git_dir, is_worktree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init_repo_with_commit(path: &Path) -> git2::Repository {
        let repo = git2::Repository::init(path).unwrap();
        {
            std::fs::write(path.join("README.md"), "hello\n").unwrap();
            let mut index = repo.index().unwrap();
            index.add_path(Path::new("README.md")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = git2::Signature::now("Test", "test@example.com").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_finds_regular_repository() {
        let dir = TempDir::new().unwrap();
        let repo_root = dir.path().join("project");
        std::fs::create_dir(&repo_root).unwrap();
        git2::Repository::init(&repo_root).unwrap();

        let found = find_git_repositories(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "project");
        assert!(!found[0].is_worktree);
        assert!(found[0].path.is_absolute());
    }

    #[test]
    fn test_finds_nested_repositories() {
        let dir = TempDir::new().unwrap();
        for name in ["one", "group/two"] {
            let root = dir.path().join(name);
            std::fs::create_dir_all(&root).unwrap();
            git2::Repository::init(&root).unwrap();
        }

        let found = find_git_repositories(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert!(names.contains(&"one"));
        assert!(names.contains(&"two"));
    }

    #[test]
    fn test_skips_corrupted_git_directory() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("broken");
        // A bare `.git` directory with no object store is not a repository
        std::fs::create_dir_all(root.join(".git")).unwrap();

        let found = find_git_repositories(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_non_repo_directory_yields_nothing() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("plain")).unwrap();
        let found = find_git_repositories(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_missing_directory_is_error() {
        let result = find_git_repositories(Path::new("/nonexistent/dir"));
        assert!(matches!(result, Err(DiscoveryError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_dedup_across_overlapping_inputs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        git2::Repository::init(&root).unwrap();

        // The same repository is reachable through both input directories
        let repos = discover_repositories(&[
            dir.path().to_string_lossy().to_string(),
            root.to_string_lossy().to_string(),
        ]);
        assert_eq!(repos.len(), 1, "overlapping inputs must deduplicate");
    }

    #[test]
    fn test_discover_skips_missing_inputs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("project");
        std::fs::create_dir(&root).unwrap();
        git2::Repository::init(&root).unwrap();

        let repos = discover_repositories(&[
            "/nonexistent/watch/dir".to_string(),
            dir.path().to_string_lossy().to_string(),
        ]);
        assert_eq!(repos.len(), 1);
    }

    #[test]
    fn test_worktree_marker_parsing() {
        let dir = TempDir::new().unwrap();
        let main_root = dir.path().join("main");
        std::fs::create_dir(&main_root).unwrap();
        let repo = init_repo_with_commit(&main_root);

        let wt_root = dir.path().join("feature-wt");
        repo.worktree("feature-wt", &wt_root, None).unwrap();

        let found = find_git_repositories(dir.path()).unwrap();
        let worktree = found
            .iter()
            .find(|r| r.is_worktree)
            .expect("worktree should be discovered");
        assert_eq!(worktree.name, "feature-wt");
        assert!(worktree.git_dir.is_dir(), "gitdir must resolve to a directory");

        let main = found.iter().find(|r| !r.is_worktree).expect("main repo");
        assert_eq!(main.name, "main");
    }

    #[test]
    fn test_malformed_worktree_marker_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("fake-wt");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join(".git"), "not a gitdir line\n").unwrap();

        // Scan must not abort; the malformed marker is simply skipped
        let found = find_git_repositories(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_worktree_marker_with_missing_target_skipped() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("stale-wt");
        std::fs::create_dir(&root).unwrap();
        std::fs::write(root.join(".git"), "gitdir: /nonexistent/gitdir\n").unwrap();

        let found = find_git_repositories(dir.path()).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_parse_worktree_marker_relative_target() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("wt");
        std::fs::create_dir(&root).unwrap();
        let target = dir.path().join("store");
        std::fs::create_dir(&target).unwrap();
        let marker = root.join(".git");
        std::fs::write(&marker, "gitdir: ../store\n").unwrap();

        let resolved = parse_worktree_marker(&marker, &root).unwrap();
        assert_eq!(resolved, paths::resolve_path(&target));
    }
}
