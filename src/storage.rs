/// Commit and session persistence
///
/// Defines the two collaborator contracts the capture pipeline talks to
/// (`CommitStore` for writes, `SessionSource` for read-only session data)
/// and a SQLite implementation of both. `store_commit` is transactional
/// (commit row plus all file rows atomically) and idempotent on the commit
/// hash.
use crate::error::StorageError;
use crate::types::{
    Commit, CommitSessionCorrelation, Conversation, CorrelationType, Diff, Message, Repository,
    Session,
};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;

/// Write surface for captured commits
pub trait CommitStore: Send + Sync {
    /// Store a commit with its diff and correlation. Re-storing the same
    /// hash updates the existing row. A non-empty `session_id` must refer
    /// to an existing session.
    fn store_commit(
        &self,
        commit: &Commit,
        diff: &Diff,
        correlation: &CommitSessionCorrelation,
        repository: &Repository,
        session_id: &str,
    ) -> Result<(), StorageError>;
}

/// Read-only query surface over recorded sessions
pub trait SessionSource: Send + Sync {
    /// All sessions (active and ended) recorded for the given normalized
    /// project name, newest started first, with nested conversations and
    /// messages. A missing sessions table reads as zero rows.
    fn sessions_for_project(&self, project: &str) -> Result<Vec<Session>, StorageError>;
}

/// SQLite-backed implementation of both collaborator contracts
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at the given path and apply
    /// the schema.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        }
        let conn = Connection::open(path).map_err(|e| StorageError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::init(conn)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(include_str!("schema.sql"))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|e| StorageError::LockPoisoned(e.to_string()))
    }

    /// Insert a session with its conversations and messages.
    ///
    /// The conversation-capture subsystem owns these tables in production;
    /// this writer exists for tests and backfill tooling.
    pub fn insert_session(&self, session: &Session) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO sessions (id, project, started_at, ended_at, last_activity)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session.id,
                session.project,
                session.started_at.to_rfc3339(),
                session.ended_at.map(|t| t.to_rfc3339()),
                session.last_activity.to_rfc3339(),
            ],
        )?;
        for conversation in &session.conversations {
            tx.execute(
                "INSERT OR REPLACE INTO conversations (id, session_id) VALUES (?1, ?2)",
                params![conversation.id, session.id],
            )?;
            for message in &conversation.messages {
                tx.execute(
                    "INSERT OR REPLACE INTO messages (id, conversation_id, created_at)
                     VALUES (?1, ?2, ?3)",
                    params![message.id, conversation.id, message.created_at.to_rfc3339()],
                )?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Number of stored commits, mostly for diagnostics and tests
    pub fn commit_count(&self) -> Result<usize, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM commits", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// File-change rows stored for a commit
    pub fn files_for_commit(&self, hash: &str) -> Result<Vec<(String, usize, usize)>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT path, additions, deletions FROM commit_files WHERE commit_hash = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([hash], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)? as usize,
                row.get::<_, i64>(2)? as usize,
            ))
        })?;
        let mut files = Vec::new();
        for row in rows {
            files.push(row?);
        }
        Ok(files)
    }
}

impl CommitStore for SqliteStore {
    fn store_commit(
        &self,
        commit: &Commit,
        diff: &Diff,
        correlation: &CommitSessionCorrelation,
        repository: &Repository,
        session_id: &str,
    ) -> Result<(), StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        if !session_id.is_empty() {
            let exists: bool = tx.query_row(
                "SELECT COUNT(*) FROM sessions WHERE id = ?1",
                [session_id],
                |row| row.get::<_, i64>(0).map(|c| c > 0),
            )?;
            if !exists {
                return Err(StorageError::UnknownSession(session_id.to_string()));
            }
        }

        let parents =
            serde_json::to_string(&commit.parents).unwrap_or_else(|_| "[]".to_string());

        tx.execute(
            "INSERT INTO commits (hash, repo_path, repo_name, project, message, author_name,
                 author_email, timestamp, branch, is_merge, parents, diff_content,
                 diff_truncated, diff_total_lines, diff_shown_lines, session_id,
                 correlation_type, time_diff_secs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(hash) DO UPDATE SET
                 repo_path = excluded.repo_path,
                 repo_name = excluded.repo_name,
                 project = excluded.project,
                 message = excluded.message,
                 author_name = excluded.author_name,
                 author_email = excluded.author_email,
                 timestamp = excluded.timestamp,
                 branch = excluded.branch,
                 is_merge = excluded.is_merge,
                 parents = excluded.parents,
                 diff_content = excluded.diff_content,
                 diff_truncated = excluded.diff_truncated,
                 diff_total_lines = excluded.diff_total_lines,
                 diff_shown_lines = excluded.diff_shown_lines,
                 session_id = excluded.session_id,
                 correlation_type = excluded.correlation_type,
                 time_diff_secs = excluded.time_diff_secs",
            params![
                commit.hash,
                repository.path.to_string_lossy().to_string(),
                repository.name,
                correlation.project,
                commit.message,
                commit.author_name,
                commit.author_email,
                commit.timestamp.to_rfc3339(),
                commit.branch,
                commit.is_merge,
                parents,
                diff.content,
                diff.truncated,
                diff.total_lines as i64,
                diff.shown_lines as i64,
                if session_id.is_empty() {
                    None
                } else {
                    Some(session_id)
                },
                correlation.correlation_type.as_str(),
                correlation.time_diff.num_seconds(),
            ],
        )?;

        tx.execute(
            "DELETE FROM commit_files WHERE commit_hash = ?1",
            [&commit.hash],
        )?;
        for file in &diff.files {
            tx.execute(
                "INSERT INTO commit_files (commit_hash, path, additions, deletions)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    commit.hash,
                    file.path,
                    file.additions as i64,
                    file.deletions as i64
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

impl SessionSource for SqliteStore {
    fn sessions_for_project(&self, project: &str) -> Result<Vec<Session>, StorageError> {
        let conn = self.lock()?;

        let mut stmt = match conn.prepare(
            "SELECT id, project, started_at, ended_at, last_activity
             FROM sessions WHERE project = ?1 ORDER BY started_at DESC",
        ) {
            Ok(stmt) => stmt,
            Err(e) if is_missing_table(&e) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let rows = stmt.query_map([project], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        let rows: Vec<_> = rows.collect::<Result<_, _>>()?;
        drop(stmt);

        let mut sessions = Vec::new();
        for (id, project, started_at, ended_at, last_activity) in rows {
            let conversations = load_conversations(&conn, &id)?;
            sessions.push(Session {
                id,
                project,
                started_at: parse_timestamp(&started_at)?,
                ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
                last_activity: parse_timestamp(&last_activity)?,
                conversations,
            });
        }
        Ok(sessions)
    }
}

fn load_conversations(conn: &Connection, session_id: &str) -> Result<Vec<Conversation>, StorageError> {
    let mut stmt = match conn.prepare(
        "SELECT id FROM conversations WHERE session_id = ?1 ORDER BY id",
    ) {
        Ok(stmt) => stmt,
        Err(e) if is_missing_table(&e) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let ids = stmt.query_map([session_id], |row| row.get::<_, String>(0))?;
    let ids: Vec<String> = ids.collect::<Result<_, _>>()?;
    drop(stmt);

    let mut conversations = Vec::new();
    for id in ids {
        let messages = load_messages(conn, &id)?;
        conversations.push(Conversation { id, messages });
    }
    Ok(conversations)
}

fn load_messages(conn: &Connection, conversation_id: &str) -> Result<Vec<Message>, StorageError> {
    let mut stmt = match conn.prepare(
        "SELECT id, created_at FROM messages WHERE conversation_id = ?1 ORDER BY created_at",
    ) {
        Ok(stmt) => stmt,
        Err(e) if is_missing_table(&e) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let rows = stmt.query_map([conversation_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut messages = Vec::new();
    for row in rows {
        let (id, created_at) = row?;
        messages.push(Message {
            id,
            created_at: parse_timestamp(&created_at)?,
        });
    }
    Ok(messages)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::ParseFailed(format!("timestamp '{value}': {e}")))
}

fn is_missing_table(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table")
    )
}

/// Fetch the stored correlation type for a commit, for diagnostics
pub fn stored_correlation_type(
    store: &SqliteStore,
    hash: &str,
) -> Result<Option<CorrelationType>, StorageError> {
    let conn = store.lock()?;
    let value: Option<String> = conn
        .query_row(
            "SELECT correlation_type FROM commits WHERE hash = ?1",
            [hash],
            |row| row.get(0),
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(other),
        })?;
    Ok(value
        .as_deref()
        .and_then(|v| v.parse::<CorrelationType>().ok()))
}
