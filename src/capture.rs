/// Capture pipeline consumer
///
/// Drains the poller's results channel and, for every newly detected
/// commit, extracts its diff, correlates it against recorded sessions, and
/// hands the combined record to the store. One commit failing never stops
/// the rest; per-repository poll errors are logged and retried by the
/// poller on its next cycle.
use crate::correlation::CorrelationService;
use crate::extractor::CommitExtractor;
use crate::poller::PollResult;
use crate::storage::{CommitStore, SessionSource};
use crate::types::{Commit, Repository};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Consumes poll results and persists captured commits
pub struct CaptureService<S> {
    store: Arc<S>,
    extractor: CommitExtractor,
    correlator: CorrelationService,
}

impl<S> CaptureService<S>
where
    S: CommitStore + SessionSource + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            extractor: CommitExtractor::new(),
            correlator: CorrelationService::new(),
        }
    }

    /// Drain poll results until the channel closes.
    pub async fn run(&self, mut results: mpsc::Receiver<PollResult>) {
        while let Some(result) = results.recv().await {
            if let Some(error) = &result.error {
                tracing::warn!(
                    "poll failed for '{}': {}",
                    result.repository.name,
                    error
                );
                continue;
            }

            tracing::info!(
                "{} new commit(s) in '{}'",
                result.new_commits.len(),
                result.repository.name
            );

            for commit in result.new_commits {
                let hash = commit.hash.clone();
                if let Err(e) = self.capture_commit(result.repository.clone(), commit).await {
                    tracing::warn!(
                        "failed to capture commit {} in '{}': {:#}",
                        hash,
                        result.repository.name,
                        e
                    );
                }
            }
        }
        tracing::debug!("poll results channel closed, capture loop exiting");
    }

    /// Extract, correlate, and store a single commit.
    pub async fn capture_commit(&self, repository: Repository, commit: Commit) -> Result<()> {
        let store = self.store.clone();
        let extractor = self.extractor.clone();
        let correlator = self.correlator;

        tokio::task::spawn_blocking(move || -> Result<()> {
            let git_repo = git2::Repository::open(&repository.path)
                .with_context(|| format!("opening repository {}", repository.path.display()))?;
            let diff = extractor
                .extract_diff(&git_repo, &commit.hash)
                .with_context(|| format!("extracting diff for {}", commit.hash))?;
            let correlation = correlator.correlate_commit(&commit, &repository, store.as_ref());

            tracing::debug!(
                "commit {} correlated as '{}' (session '{}')",
                commit.hash,
                correlation.correlation_type,
                correlation.session_id
            );

            store
                .store_commit(
                    &commit,
                    &diff,
                    &correlation,
                    &repository,
                    &correlation.session_id,
                )
                .with_context(|| format!("storing commit {}", commit.hash))?;
            Ok(())
        })
        .await
        .context("capture task failed")?
    }
}
