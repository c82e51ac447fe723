/// Concurrent change-detection poller
///
/// Owns per-repository last-seen head state and runs a scheduled scan of
/// all known repositories. Each tick fans out one blocking worker per
/// repository; a cycle finishes before the next can start. New commits are
/// detected by comparing head hashes and walking the log back to the stored
/// hash, and published on a bounded channel that never blocks the producer:
/// under backpressure a result is dropped with a warning, trading delivery
/// for bounded memory.
use crate::error::PollerError;
use crate::extractor::CommitExtractor;
use crate::retry::RetryPolicy;
use crate::types::{Commit, Repository};
use git2::{ErrorCode, Oid};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Capacity of the shared results channel
pub const RESULT_CHANNEL_CAPACITY: usize = 10;

/// Outcome of scanning a single repository during one poll cycle
#[derive(Debug)]
pub struct PollResult {
    pub repository: Repository,
    /// Newly detected commits, oldest first
    pub new_commits: Vec<Commit>,
    /// Set when the scan failed; the repository's last-seen hash was not
    /// advanced and the same range is retried next cycle
    pub error: Option<PollerError>,
}

/// Polls a fixed set of repositories for new commits
pub struct Poller {
    interval: Duration,
    shared: Arc<PollerShared>,
    lifecycle: Mutex<Lifecycle>,
}

struct PollerShared {
    /// Repository path -> last seen head hash. Read-locked for lookups,
    /// write-locked for updates, never held across a git call.
    last_seen: RwLock<HashMap<PathBuf, String>>,
    extractor: CommitExtractor,
    retry: RetryPolicy,
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    cancel: Option<CancellationToken>,
    ticker: Option<tokio::task::JoinHandle<()>>,
}

impl Poller {
    /// Create a poller ticking at the given interval (floored at one second)
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_secs(1)),
            shared: Arc::new(PollerShared {
                last_seen: RwLock::new(HashMap::new()),
                extractor: CommitExtractor::new(),
                retry: RetryPolicy::default(),
            }),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Start polling the given repositories.
    ///
    /// Seeds each repository's baseline from its current HEAD (failures are
    /// logged and the repository stays unseeded until its first successful
    /// poll), then launches the ticking task. Returns the results channel;
    /// it closes after `stop` once the in-flight cycle has drained.
    ///
    /// A second call without an intervening `stop` fails with
    /// `AlreadyStarted`.
    pub async fn start(
        &self,
        repos: Vec<Repository>,
    ) -> Result<mpsc::Receiver<PollResult>, PollerError> {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.started {
            return Err(PollerError::AlreadyStarted);
        }

        let shared = self.shared.clone();
        let seed_repos = repos.clone();
        let seed = tokio::task::spawn_blocking(move || {
            for repo in &seed_repos {
                match read_head_hash(&shared.retry, &repo.path) {
                    Ok(Some(hash)) => {
                        shared
                            .last_seen
                            .blocking_write()
                            .insert(repo.path.clone(), hash);
                    }
                    Ok(None) => {
                        tracing::debug!("repository '{}' has no commits yet", repo.name);
                    }
                    Err(e) => {
                        tracing::warn!(
                            "could not seed baseline for '{}': {}",
                            repo.name,
                            e.message()
                        );
                    }
                }
            }
        });
        if let Err(e) = seed.await {
            tracing::warn!("baseline seeding task failed: {e}");
        }

        let (tx, rx) = mpsc::channel(RESULT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let ticker = tokio::spawn(run_ticker(
            self.shared.clone(),
            repos,
            tx,
            cancel.clone(),
            self.interval,
        ));

        lifecycle.started = true;
        lifecycle.cancel = Some(cancel);
        lifecycle.ticker = Some(ticker);
        tracing::info!("poller started, interval {:?}", self.interval);
        Ok(rx)
    }

    /// Stop polling. Idempotent; a no-op when not started.
    ///
    /// Cancels the ticker, waits for any in-flight cycle's workers to
    /// finish, then lets the results channel close.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(cancel) = lifecycle.cancel.take() else {
            return;
        };
        cancel.cancel();
        if let Some(ticker) = lifecycle.ticker.take() {
            if let Err(e) = ticker.await {
                tracing::warn!("poll ticker task failed: {e}");
            }
        }
        lifecycle.started = false;
        tracing::info!("poller stopped");
    }
}

/// Ticking loop: one poll cycle per interval, cancellation checked between
/// cycles so an in-flight scan is never aborted mid-repository.
async fn run_ticker(
    shared: Arc<PollerShared>,
    repos: Vec<Repository>,
    tx: mpsc::Sender<PollResult>,
    cancel: CancellationToken,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                run_poll_cycle(&shared, &repos, &tx).await;
            }
        }
    }
    tracing::debug!("poll ticker exited");
    // tx drops here; the results channel closes once workers are done
}

/// Fan out one blocking worker per repository and wait for all of them.
async fn run_poll_cycle(
    shared: &Arc<PollerShared>,
    repos: &[Repository],
    tx: &mpsc::Sender<PollResult>,
) {
    let mut workers = JoinSet::new();
    for repo in repos {
        let shared = shared.clone();
        let repo = repo.clone();
        let tx = tx.clone();
        workers.spawn_blocking(move || {
            let result = match scan_repository(&shared, &repo) {
                Ok(Some(new_commits)) => PollResult {
                    repository: repo,
                    new_commits,
                    error: None,
                },
                Ok(None) => return,
                Err(e) => PollResult {
                    repository: repo,
                    new_commits: Vec::new(),
                    error: Some(e),
                },
            };
            publish(&tx, result);
        });
    }
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            tracing::warn!("repository scan task panicked: {e}");
        }
    }
}

/// Non-blocking publish; a full channel drops the result with a warning.
fn publish(tx: &mpsc::Sender<PollResult>, result: PollResult) {
    use tokio::sync::mpsc::error::TrySendError;
    match tx.try_send(result) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            tracing::warn!(
                "results channel full, dropping poll result for '{}' ({} commits lost)",
                dropped.repository.name,
                dropped.new_commits.len()
            );
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("results channel closed, discarding poll result");
        }
    }
}

/// Scan one repository for commits newer than its last-seen head.
///
/// Returns Ok(None) when there is nothing to report: an empty repository, a
/// first observation (which only establishes the baseline), or an unchanged
/// head. The stored hash advances only after a fully successful scan.
fn scan_repository(
    shared: &PollerShared,
    repo: &Repository,
) -> Result<Option<Vec<Commit>>, PollerError> {
    let current = read_head_hash(&shared.retry, &repo.path).map_err(|e| {
        PollerError::HeadReadFailed {
            repo: repo.name.clone(),
            reason: e.message().to_string(),
        }
    })?;
    let Some(current) = current else {
        return Ok(None);
    };

    let previous = shared.last_seen.blocking_read().get(&repo.path).cloned();

    let Some(previous) = previous else {
        // First observation establishes the baseline; history is not
        // announced as new.
        shared
            .last_seen
            .blocking_write()
            .insert(repo.path.clone(), current);
        return Ok(None);
    };

    if previous == current {
        return Ok(None);
    }

    let commits = walk_new_commits(shared, repo, &current, &previous)?;

    shared
        .last_seen
        .blocking_write()
        .insert(repo.path.clone(), current);

    if commits.is_empty() {
        Ok(None)
    } else {
        Ok(Some(commits))
    }
}

/// Read the current HEAD hash, or None for a repository with no commits.
fn read_head_hash(retry: &RetryPolicy, path: &Path) -> Result<Option<String>, git2::Error> {
    retry.run(|| {
        let repo = git2::Repository::open(path)?;
        match repo.head() {
            Ok(head) => Ok(head.target().map(|oid| oid.to_string())),
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    })
}

/// Walk history from `current` back to `previous` (exclusive), returning
/// the newly arrived commits oldest first.
///
/// When `previous` is unreachable (force-push, rebase, reset) every commit
/// reachable from `current` is returned; losing the low-water mark is not
/// an error.
fn walk_new_commits(
    shared: &PollerShared,
    repo: &Repository,
    current: &str,
    previous: &str,
) -> Result<Vec<Commit>, PollerError> {
    let walk_failed = |reason: String| PollerError::LogWalkFailed {
        repo: repo.name.clone(),
        reason,
    };

    let git_repo = shared
        .retry
        .run(|| git2::Repository::open(&repo.path))
        .map_err(|e| walk_failed(e.message().to_string()))?;

    let prev_oid = Oid::from_str(previous).ok();
    let hashes = shared
        .retry
        .run(|| {
            let mut revwalk = git_repo.revwalk()?;
            revwalk.push(Oid::from_str(current)?)?;
            let mut hashes = Vec::new();
            for oid in revwalk {
                let oid = oid?;
                if Some(oid) == prev_oid {
                    break;
                }
                hashes.push(oid);
            }
            Ok(hashes)
        })
        .map_err(|e| walk_failed(e.message().to_string()))?;

    let mut commits = Vec::with_capacity(hashes.len());
    for oid in &hashes {
        let commit = shared
            .extractor
            .extract_metadata(&git_repo, &oid.to_string())?;
        commits.push(commit);
    }
    // Oldest first, so consumers can replay history chronologically
    commits.reverse();
    Ok(commits)
}
