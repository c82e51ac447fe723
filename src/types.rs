use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A discovered git repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Resolved, symlink-free absolute path to the repository root.
    /// Two repositories with equal paths are the same repository.
    pub path: PathBuf,
    /// Repository name derived from the directory basename
    pub name: String,
    /// Absolute path to the repository's object/ref store
    pub git_dir: PathBuf,
    /// True when the root is a linked worktree (`.git` file marker)
    pub is_worktree: bool,
}

impl Repository {
    /// Build a repository value from an already-resolved root path
    pub fn new(path: PathBuf, git_dir: PathBuf, is_worktree: bool) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            path,
            name,
            git_dir,
            is_worktree,
        }
    }
}

/// Metadata for a single git commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    /// Full hex content hash (40 characters)
    pub hash: String,
    /// Commit message (subject and body)
    pub message: String,
    /// Author's name
    pub author_name: String,
    /// Author's email address
    pub author_email: String,
    /// Commit timestamp
    pub timestamp: DateTime<Utc>,
    /// Short branch name, or "detached" / "unknown"
    pub branch: String,
    /// True iff the commit has more than one parent
    pub is_merge: bool,
    /// Ordered parent hashes
    pub parents: Vec<String>,
}

/// Per-file change statistics, computed over the full diff
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub additions: usize,
    pub deletions: usize,
}

/// A unified diff, possibly truncated for size
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diff {
    /// Unified diff text. When truncated, ends with a marker line naming
    /// the true total and the shown count.
    pub content: String,
    /// Ordered file-level statistics, unaffected by truncation
    pub files: Vec<FileChange>,
    pub truncated: bool,
    pub total_lines: usize,
    pub shown_lines: usize,
}

/// Strength of a commit-to-session match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationType {
    /// Commit inside the session's time bounds and near a message
    Active,
    /// Near a message but outside the session's time bounds
    Proximate,
    /// No message within the correlation window
    None,
}

impl CorrelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrelationType::Active => "active",
            CorrelationType::Proximate => "proximate",
            CorrelationType::None => "none",
        }
    }
}

impl std::fmt::Display for CorrelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CorrelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(CorrelationType::Active),
            "proximate" => Ok(CorrelationType::Proximate),
            "none" => Ok(CorrelationType::None),
            other => Err(format!("unknown correlation type: {other}")),
        }
    }
}

/// Result of correlating one commit against recorded sessions.
/// Produced fresh per commit, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct CommitSessionCorrelation {
    pub commit_hash: String,
    /// Matched session ID; empty when unmatched
    pub session_id: String,
    /// Normalized project name the lookup ran against
    pub project: String,
    pub correlation_type: CorrelationType,
    /// Distance to the nearest matched message; zero when unmatched
    pub time_diff: chrono::Duration,
}

impl CommitSessionCorrelation {
    /// An unmatched correlation for the given commit
    pub fn unmatched(commit_hash: &str, project: &str) -> Self {
        Self {
            commit_hash: commit_hash.to_string(),
            session_id: String::new(),
            project: project.to_string(),
            correlation_type: CorrelationType::None,
            time_diff: chrono::Duration::zero(),
        }
    }
}

/// A recorded development session, consumed read-only by correlation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Normalized project name the session was recorded under
    pub project: String,
    pub started_at: DateTime<Utc>,
    /// Recorded end time; absent while the session is still open
    pub ended_at: Option<DateTime<Utc>>,
    pub last_activity: DateTime<Utc>,
    pub conversations: Vec<Conversation>,
}

/// A conversation inside a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub messages: Vec<Message>,
}

/// A single message inside a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Effective end of the session: the recorded end time when present,
    /// otherwise the last-activity time. A one-second grace is added so a
    /// commit landing in the same wall-clock second as the final message
    /// still counts as inside the session.
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.ended_at.unwrap_or(self.last_activity) + chrono::Duration::seconds(1)
    }
}
