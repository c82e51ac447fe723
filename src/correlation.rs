/// Commit-to-session correlation
///
/// Decides which previously recorded development session, if any, a commit
/// belongs to. Candidate sessions are matched by normalized project name
/// and classified by the minimum time distance between the commit and any
/// conversation message. Correlation never fails: every internal error
/// degrades to an unmatched result.
use crate::storage::SessionSource;
use crate::types::{
    Commit, CommitSessionCorrelation, CorrelationType, Repository, Session,
};
use chrono::Duration;
use std::collections::HashMap;

/// Maximum time distance in seconds between a commit and a message for
/// them to be considered temporally related (inclusive)
pub const CORRELATION_WINDOW_SECS: i64 = 300;

/// Maximum length of a normalized project name
pub const MAX_PROJECT_NAME_LEN: usize = 255;

/// Normalize a repository path or URI into a project name.
///
/// Strips a `file://` scheme, takes the final path segment, maps every
/// character outside `[A-Za-z0-9._-]` to `-`, lowercases, collapses `-`
/// runs, trims `-` from both ends, and caps the length. Empty input (or an
/// empty result) normalizes to `"unknown"`.
pub fn normalize_project_name(input: &str) -> String {
    let path = input.strip_prefix("file://").unwrap_or(input);
    let segment = path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path);

    let mut name = String::with_capacity(segment.len());
    let mut prev_dash = false;
    for ch in segment.chars() {
        let mapped = if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
            ch.to_ascii_lowercase()
        } else {
            '-'
        };
        if mapped == '-' {
            if prev_dash {
                continue;
            }
            prev_dash = true;
        } else {
            prev_dash = false;
        }
        name.push(mapped);
    }

    let mut name = name.trim_matches('-').to_string();
    name.truncate(MAX_PROJECT_NAME_LEN);
    let name = name.trim_matches('-').to_string();

    if name.is_empty() {
        "unknown".to_string()
    } else {
        name
    }
}

/// Correlates commits against recorded sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct CorrelationService;

impl CorrelationService {
    pub fn new() -> Self {
        Self
    }

    /// Correlate one commit against the sessions recorded for its
    /// repository's project. Never fails; a session-source error logs and
    /// returns an unmatched correlation.
    pub fn correlate_commit(
        &self,
        commit: &Commit,
        repository: &Repository,
        sessions: &dyn SessionSource,
    ) -> CommitSessionCorrelation {
        let project = normalize_project_name(&repository.path.to_string_lossy());

        let candidates = match sessions.sessions_for_project(&project) {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("session lookup failed for project '{}': {}", project, e);
                return CommitSessionCorrelation::unmatched(&commit.hash, &project);
            }
        };

        // Running best across candidates, evaluated in source order
        // (descending start time): stronger type wins, then smaller
        // distance; ties keep the first seen.
        let mut best: Option<(String, CorrelationType, Duration)> = None;
        for session in &candidates {
            let Some((correlation_type, time_diff)) = classify_session(commit, session) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((_, best_type, best_diff)) => {
                    rank(correlation_type) > rank(*best_type)
                        || (rank(correlation_type) == rank(*best_type) && time_diff < *best_diff)
                }
            };
            if better {
                best = Some((session.id.clone(), correlation_type, time_diff));
            }
        }

        match best {
            Some((session_id, correlation_type, time_diff)) => CommitSessionCorrelation {
                commit_hash: commit.hash.clone(),
                session_id,
                project,
                correlation_type,
                time_diff,
            },
            None => CommitSessionCorrelation::unmatched(&commit.hash, &project),
        }
    }

    /// Correlate a batch of commits, collecting one result per commit.
    pub fn correlate_commits(
        &self,
        commits: &[Commit],
        repository: &Repository,
        sessions: &dyn SessionSource,
    ) -> Vec<CommitSessionCorrelation> {
        commits
            .iter()
            .map(|commit| self.correlate_commit(commit, repository, sessions))
            .collect()
    }
}

/// Partition correlations by session ID. Uncorrelated commits group under
/// the empty-string key.
pub fn group_commits_by_session(
    correlations: Vec<CommitSessionCorrelation>,
) -> HashMap<String, Vec<CommitSessionCorrelation>> {
    let mut groups: HashMap<String, Vec<CommitSessionCorrelation>> = HashMap::new();
    for correlation in correlations {
        groups
            .entry(correlation.session_id.clone())
            .or_default()
            .push(correlation);
    }
    groups
}

fn rank(correlation_type: CorrelationType) -> u8 {
    match correlation_type {
        CorrelationType::Active => 2,
        CorrelationType::Proximate => 1,
        CorrelationType::None => 0,
    }
}

/// Classify one session against a commit.
///
/// Returns None when the session has no messages or none lie within the
/// correlation window. A window hit inside the session's active bounds is
/// `active`, outside them `proximate`.
fn classify_session(
    commit: &Commit,
    session: &Session,
) -> Option<(CorrelationType, Duration)> {
    let mut min_diff: Option<Duration> = None;
    for conversation in &session.conversations {
        for message in &conversation.messages {
            let diff = (commit.timestamp - message.created_at).abs();
            if min_diff.is_none_or(|current| diff < current) {
                min_diff = Some(diff);
            }
        }
    }
    let min_diff = min_diff?;

    // Boundary is inclusive: exactly five minutes still counts
    if min_diff > Duration::seconds(CORRELATION_WINDOW_SECS) {
        return None;
    }

    let inside_bounds =
        commit.timestamp > session.started_at && commit.timestamp < session.effective_end();
    let correlation_type = if inside_bounds {
        CorrelationType::Active
    } else {
        CorrelationType::Proximate
    };
    Some((correlation_type, min_diff))
}
