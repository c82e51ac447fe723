/// Commit metadata and diff extraction
///
/// Given an open repository and a commit hash, produces full metadata and a
/// size-bounded unified diff. Initial commits are diffed against the empty
/// tree; merge commits against their first parent only. Branch attribution
/// and parent enumeration are best-effort enrichment and never fail the
/// extraction itself.
use crate::error::ExtractError;
use crate::retry::RetryPolicy;
use crate::types::{Commit, Diff, FileChange};
use chrono::{DateTime, Utc};
use git2::{DiffOptions, ErrorCode, Oid};
use std::collections::HashMap;

/// Maximum number of diff lines kept in `Diff::content`
pub const MAX_DIFF_LINES: usize = 5000;

/// Extracts commit metadata and diffs from an open repository
#[derive(Debug, Clone)]
pub struct CommitExtractor {
    retry: RetryPolicy,
    max_diff_lines: usize,
}

impl Default for CommitExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitExtractor {
    pub fn new() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_diff_lines: MAX_DIFF_LINES,
        }
    }

    /// Override the truncation threshold (used by tests)
    pub fn with_max_diff_lines(mut self, max_diff_lines: usize) -> Self {
        self.max_diff_lines = max_diff_lines;
        self
    }

    /// Extract full metadata for a commit.
    ///
    /// Fails with `InvalidCommit` when the hash does not resolve. Branch
    /// lookup failure degrades to `"unknown"` rather than failing the call.
    pub fn extract_metadata(
        &self,
        repo: &git2::Repository,
        hash: &str,
    ) -> Result<Commit, ExtractError> {
        let commit = self.find_commit(repo, hash)?;

        let author = commit.author();
        let parents: Vec<String> = commit.parent_ids().map(|id| id.to_string()).collect();
        let timestamp = DateTime::from_timestamp(commit.time().seconds(), 0)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

        let branch = match branch_for_commit(repo, commit.id()) {
            Ok(name) => name,
            Err(e) => {
                tracing::debug!(
                    "branch lookup failed for {}: {}",
                    commit.id(),
                    e.message()
                );
                "unknown".to_string()
            }
        };

        Ok(Commit {
            hash: commit.id().to_string(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("").to_string(),
            timestamp,
            branch,
            is_merge: parents.len() > 1,
            parents,
        })
    }

    /// Extract a unified diff for a commit.
    ///
    /// Parentless commits are diffed against the empty tree; everything
    /// else against the first parent. File statistics are computed over the
    /// full diff even when the textual content is truncated.
    pub fn extract_diff(
        &self,
        repo: &git2::Repository,
        hash: &str,
    ) -> Result<Diff, ExtractError> {
        let commit = self.find_commit(repo, hash)?;

        let tree = commit.tree()?;
        let parent_tree = if commit.parent_count() > 0 {
            Some(commit.parent(0)?.tree()?)
        } else {
            None
        };

        let mut diff_opts = DiffOptions::new();
        diff_opts
            .context_lines(3)
            .interhunk_lines(0)
            .ignore_whitespace(false);

        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&tree), Some(&mut diff_opts))?;

        // Build the ordered file list up front so statistics keep delta order
        let mut files: Vec<FileChange> = Vec::new();
        let mut index_by_path: HashMap<String, usize> = HashMap::new();
        for delta in diff.deltas() {
            if let Some(path) = delta.new_file().path().or_else(|| delta.old_file().path()) {
                let path = path.display().to_string();
                if !index_by_path.contains_key(&path) {
                    index_by_path.insert(path.clone(), files.len());
                    files.push(FileChange {
                        path,
                        additions: 0,
                        deletions: 0,
                    });
                }
            }
        }

        let mut lines: Vec<String> = Vec::new();
        diff.print(git2::DiffFormat::Patch, |delta, _hunk, line| {
            let current = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path())
                .map(|p| p.display().to_string())
                .and_then(|p| index_by_path.get(&p).copied());

            let Ok(content) = std::str::from_utf8(line.content()) else {
                tracing::debug!("skipping diff line with invalid UTF-8");
                return true;
            };

            match line.origin() {
                '+' => {
                    if let Some(i) = current {
                        files[i].additions += 1;
                    }
                    lines.push(format!("+{}", content.trim_end_matches('\n')));
                }
                '-' => {
                    if let Some(i) = current {
                        files[i].deletions += 1;
                    }
                    lines.push(format!("-{}", content.trim_end_matches('\n')));
                }
                ' ' => lines.push(format!(" {}", content.trim_end_matches('\n'))),
                // File and hunk headers can span multiple lines
                'F' | 'H' => lines.extend(content.lines().map(|l| l.to_string())),
                // Binary files carry no textual diff
                'B' => {}
                _ => {}
            }
            true
        })?;

        let total_lines = lines.len();
        let truncated = total_lines > self.max_diff_lines;
        let shown_lines = if truncated {
            self.max_diff_lines
        } else {
            total_lines
        };

        let mut content = lines[..shown_lines].join("\n");
        if !content.is_empty() {
            content.push('\n');
        }
        if truncated {
            content.push_str(&format!(
                "... diff truncated: showing {shown_lines} of {total_lines} lines ...\n"
            ));
            tracing::warn!(
                "truncated large diff for commit {} ({} lines total)",
                hash,
                total_lines
            );
        }

        Ok(Diff {
            content,
            files,
            truncated,
            total_lines,
            shown_lines,
        })
    }

    /// Extract metadata and diff together; fails if either part fails.
    pub fn extract_commit(
        &self,
        repo: &git2::Repository,
        hash: &str,
    ) -> Result<(Commit, Diff), ExtractError> {
        let metadata = self.extract_metadata(repo, hash)?;
        let diff = self.extract_diff(repo, hash)?;
        Ok((metadata, diff))
    }

    /// Resolve a hash to a commit, retrying transient failures.
    fn find_commit<'r>(
        &self,
        repo: &'r git2::Repository,
        hash: &str,
    ) -> Result<git2::Commit<'r>, ExtractError> {
        let oid =
            Oid::from_str(hash).map_err(|_| ExtractError::InvalidCommit(hash.to_string()))?;
        self.retry
            .run(|| repo.find_commit(oid))
            .map_err(|e| match e.code() {
                ErrorCode::NotFound => ExtractError::InvalidCommit(hash.to_string()),
                _ => ExtractError::Git(e),
            })
    }
}

/// Resolve the branch name to report for a commit.
///
/// An unborn or non-branch HEAD reports `"detached"`. When HEAD's tip is
/// the queried commit, that branch wins. Otherwise the first local branch
/// containing the commit is reported (reference enumeration order, which is
/// not guaranteed stable across branches that all contain it), falling back
/// to the current branch name.
fn branch_for_commit(repo: &git2::Repository, oid: Oid) -> Result<String, git2::Error> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
            return Ok("detached".to_string());
        }
        Err(e) => return Err(e),
    };

    if !head.is_branch() {
        return Ok("detached".to_string());
    }
    let current = head.shorthand().unwrap_or("detached").to_string();

    if head.target() == Some(oid) {
        return Ok(current);
    }

    for branch in repo.branches(Some(git2::BranchType::Local))? {
        let (branch, _) = branch?;
        let Some(tip) = branch.get().target() else {
            continue;
        };
        if tip == oid || repo.graph_descendant_of(tip, oid)? {
            if let Ok(Some(name)) = branch.name() {
                return Ok(name.to_string());
            }
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) -> git2::Repository {
        git2::Repository::init(dir).unwrap()
    }

    fn commit_file(repo: &git2::Repository, name: &str, content: &str, message: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), content).unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let sig = git2::Signature::now("Test Author", "author@example.com").unwrap();
        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    #[test]
    fn test_extract_metadata_fields() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_file(&repo, "a.txt", "one\n", "Add a.txt");

        let extractor = CommitExtractor::new();
        let commit = extractor
            .extract_metadata(&repo, &oid.to_string())
            .unwrap();

        assert_eq!(commit.hash, oid.to_string());
        assert_eq!(commit.message, "Add a.txt");
        assert_eq!(commit.author_name, "Test Author");
        assert_eq!(commit.author_email, "author@example.com");
        assert!(commit.timestamp.timestamp() > 0);
        assert!(commit.parents.is_empty());
        assert!(!commit.is_merge);
        // HEAD's tip is the queried commit, so its branch is reported
        assert_eq!(commit.branch, repo.head().unwrap().shorthand().unwrap());
    }

    #[test]
    fn test_extract_metadata_invalid_hash() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "one\n", "initial");

        let extractor = CommitExtractor::new();
        let err = extractor
            .extract_metadata(&repo, "not-a-hash")
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidCommit(_)));

        // A well-formed hash that resolves to nothing is also invalid
        let err = extractor
            .extract_metadata(&repo, "0123456789abcdef0123456789abcdef01234567")
            .unwrap_err();
        assert!(matches!(err, ExtractError::InvalidCommit(_)));
    }

    #[test]
    fn test_initial_commit_diffs_against_empty_tree() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let oid = commit_file(&repo, "a.txt", "one\ntwo\n", "initial");

        let extractor = CommitExtractor::new();
        let diff = extractor.extract_diff(&repo, &oid.to_string()).unwrap();

        assert!(!diff.truncated);
        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].path, "a.txt");
        assert_eq!(diff.files[0].additions, 2);
        assert_eq!(diff.files[0].deletions, 0);
        assert!(diff.content.contains("+one"));
        assert!(diff.content.contains("+two"));
    }

    #[test]
    fn test_diff_counts_modifications() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "a.txt", "one\ntwo\n", "initial");
        let oid = commit_file(&repo, "a.txt", "one\nthree\n", "change line two");

        let extractor = CommitExtractor::new();
        let diff = extractor.extract_diff(&repo, &oid.to_string()).unwrap();

        assert_eq!(diff.files.len(), 1);
        assert_eq!(diff.files[0].additions, 1);
        assert_eq!(diff.files[0].deletions, 1);
        assert!(diff.content.contains("-two"));
        assert!(diff.content.contains("+three"));
    }

    #[test]
    fn test_merge_commit_detection_and_first_parent_diff() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_file(&repo, "a.txt", "one\n", "base");
        let main_tip = commit_file(&repo, "a.txt", "one\ntwo\n", "main change");

        // Second parent built off base without touching the worktree
        let base_commit = repo.find_commit(base).unwrap();
        let blob = repo.blob(b"feature\n").unwrap();
        let mut builder = repo
            .treebuilder(Some(&base_commit.tree().unwrap()))
            .unwrap();
        builder.insert("b.txt", blob, 0o100644).unwrap();
        let feature_tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = git2::Signature::now("Test Author", "author@example.com").unwrap();
        let feature_tip = repo
            .commit(
                Some("refs/heads/feature"),
                &sig,
                &sig,
                "feature change",
                &feature_tree,
                &[&base_commit],
            )
            .unwrap();

        // Merge whose tree equals the first parent's tree
        let main_commit = repo.find_commit(main_tip).unwrap();
        let feature_commit = repo.find_commit(feature_tip).unwrap();
        let merge_oid = repo
            .commit(
                Some("HEAD"),
                &sig,
                &sig,
                "merge feature",
                &main_commit.tree().unwrap(),
                &[&main_commit, &feature_commit],
            )
            .unwrap();

        let extractor = CommitExtractor::new();
        let (commit, diff) = extractor
            .extract_commit(&repo, &merge_oid.to_string())
            .unwrap();

        assert!(commit.is_merge);
        assert_eq!(commit.parents.len(), 2);
        assert_eq!(commit.parents[0], main_tip.to_string());
        // Diffed against the first parent only: identical trees, empty diff
        assert!(diff.files.is_empty());
        assert_eq!(diff.total_lines, 0);

        // A single-parent commit is never flagged as merge
        let single = extractor
            .extract_metadata(&repo, &main_tip.to_string())
            .unwrap();
        assert!(!single.is_merge);
        assert_eq!(single.parents.len(), 1);
    }

    #[test]
    fn test_diff_truncation() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let body: String = (0..200).map(|i| format!("line {i}\n")).collect();
        let oid = commit_file(&repo, "big.txt", &body, "big file");

        let full = CommitExtractor::new()
            .extract_diff(&repo, &oid.to_string())
            .unwrap();
        assert!(!full.truncated);
        assert_eq!(full.shown_lines, full.total_lines);

        let capped = CommitExtractor::new()
            .with_max_diff_lines(10)
            .extract_diff(&repo, &oid.to_string())
            .unwrap();
        assert!(capped.truncated);
        assert_eq!(capped.shown_lines, 10);
        assert_eq!(capped.total_lines, full.total_lines);
        assert!(
            capped
                .content
                .contains(&format!("showing 10 of {} lines", full.total_lines)),
            "truncation marker must name both counts"
        );
        // File statistics are identical whether or not truncation occurs
        assert_eq!(capped.files, full.files);
        assert_eq!(capped.files[0].additions, 200);
    }

    #[test]
    fn test_branch_fallback_for_older_commit() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let first = commit_file(&repo, "a.txt", "one\n", "first");
        commit_file(&repo, "a.txt", "one\ntwo\n", "second");

        let extractor = CommitExtractor::new();
        let commit = extractor
            .extract_metadata(&repo, &first.to_string())
            .unwrap();
        // The current branch contains the older commit
        assert_eq!(commit.branch, repo.head().unwrap().shorthand().unwrap());
    }

    #[test]
    fn test_branch_search_across_branches() {
        let dir = TempDir::new().unwrap();
        let repo = init_repo(dir.path());
        let base = commit_file(&repo, "a.txt", "one\n", "base");

        // A commit only reachable from a side branch
        let base_commit = repo.find_commit(base).unwrap();
        let blob = repo.blob(b"side\n").unwrap();
        let mut builder = repo
            .treebuilder(Some(&base_commit.tree().unwrap()))
            .unwrap();
        builder.insert("side.txt", blob, 0o100644).unwrap();
        let tree = repo.find_tree(builder.write().unwrap()).unwrap();
        let sig = git2::Signature::now("Test Author", "author@example.com").unwrap();
        let side_tip = repo
            .commit(
                Some("refs/heads/side"),
                &sig,
                &sig,
                "side only",
                &tree,
                &[&base_commit],
            )
            .unwrap();
        // Advance HEAD past base so the side commit is not on HEAD's tip
        commit_file(&repo, "a.txt", "one\ntwo\n", "advance");

        let extractor = CommitExtractor::new();
        let commit = extractor
            .extract_metadata(&repo, &side_tip.to_string())
            .unwrap();
        assert_eq!(commit.branch, "side");
    }
}
