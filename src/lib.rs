//! # codetrail - Git Activity Capture
//!
//! A background agent that turns raw version-control history into
//! time-correlated, structured records of development activity, for later
//! analysis by a human or an AI assistant.
//!
//! ## Overview
//!
//! codetrail watches a set of directories for git repositories, polls them
//! for new commits on a fixed interval, extracts commit metadata and
//! size-bounded diffs, and correlates each commit with recorded coding
//! sessions by comparing timestamps against conversation messages. Results
//! land in a SQLite database.
//!
//! ## Architecture
//!
//! ```text
//! watch dirs ──> discovery ──> poller ──(bounded channel)──> capture
//!                                │                              │
//!                        last-seen hashes              extractor + correlation
//!                                                               │
//!                                                          SQLite store
//! ```
//!
//! Discovery feeds the poller's repository set; the poller's detected
//! commits feed the extractor; the extractor's metadata feeds the
//! correlator; the capture consumer persists the combined record.
//!
//! ## Modules
//!
//! - [`discovery`]: Repository discovery across watch directories
//! - [`poller`]: Scheduled concurrent change detection
//! - [`extractor`]: Commit metadata and diff extraction
//! - [`correlation`]: Commit-to-session time correlation
//! - [`capture`]: Consumer gluing extraction, correlation, and storage
//! - [`storage`]: Collaborator contracts and the SQLite implementation
//! - [`retry`]: Transient-error classification and bounded backoff
//! - [`config`]: Configuration loading
//! - [`types`]: Shared value types
//! - [`error`]: Error types
//! - [`paths`]: Path expansion utilities
//!
//! ## Usage Example
//!
//! ```no_run
//! use codetrail::discovery;
//! use codetrail::poller::Poller;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let repos = discovery::discover_repositories(&["~/projects".to_string()]);
//!     let poller = Poller::new(Duration::from_secs(30));
//!     let mut results = poller.start(repos).await?;
//!
//!     while let Some(result) = results.recv().await {
//!         for commit in &result.new_commits {
//!             println!("{}: {}", result.repository.name, commit.message);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

/// Consumer gluing extraction, correlation, and storage together
pub mod capture;

/// Configuration loading with TOML file and defaults
pub mod config;

/// Commit-to-session correlation and project name normalization
pub mod correlation;

/// Git repository discovery across watch directories
pub mod discovery;

/// Error types and utilities
pub mod error;

/// Commit metadata and diff extraction
pub mod extractor;

/// Path expansion and resolution utilities
pub mod paths;

/// Scheduled concurrent change-detection polling
pub mod poller;

/// Transient-error classification and bounded retry/backoff
pub mod retry;

/// Collaborator contracts and the SQLite store
pub mod storage;

/// Shared value types
pub mod types;
