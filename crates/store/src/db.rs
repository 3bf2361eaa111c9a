// Database persistence layer using SQLite

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, Transaction};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use caseboard_core::{
    Collaborator, CollaboratorRole, EngineError, EngineResult, EvidenceItem, Investigation,
    Presence, Task,
};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> EngineResult<Self> {
        let conn = Connection::open(path).map_err(EngineError::store)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory().map_err(EngineError::store)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> EngineResult<()> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS investigations (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                created_by TEXT NOT NULL,
                lead_investigator TEXT,
                metadata TEXT,
                snapshot TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS investigation_tasks (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL
                    REFERENCES investigations(id) ON DELETE CASCADE,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL,
                priority TEXT NOT NULL,
                assigned_to TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                due_date TEXT,
                metadata TEXT
            );

            CREATE TABLE IF NOT EXISTS evidence_items (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL
                    REFERENCES investigations(id) ON DELETE CASCADE,
                task_id TEXT
                    REFERENCES investigation_tasks(id) ON DELETE SET NULL,
                title TEXT NOT NULL,
                description TEXT,
                type TEXT NOT NULL,
                source TEXT NOT NULL,
                content TEXT NOT NULL,
                hash TEXT,
                collected_at TEXT NOT NULL,
                metadata TEXT
            );

            CREATE TABLE IF NOT EXISTS investigation_activities (
                id TEXT PRIMARY KEY,
                investigation_id TEXT NOT NULL
                    REFERENCES investigations(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL,
                details TEXT
            );

            CREATE TABLE IF NOT EXISTS investigation_collaborators (
                investigation_id TEXT NOT NULL
                    REFERENCES investigations(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                permissions TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                last_active TEXT NOT NULL,
                PRIMARY KEY (investigation_id, user_id)
            );

            CREATE TABLE IF NOT EXISTS user_presence (
                user_id TEXT PRIMARY KEY,
                investigation_id TEXT
                    REFERENCES investigations(id) ON DELETE SET NULL,
                status TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                current_location TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_investigations_status
                ON investigations(status);

            CREATE INDEX IF NOT EXISTS idx_investigations_priority
                ON investigations(priority);

            CREATE INDEX IF NOT EXISTS idx_tasks_investigation
                ON investigation_tasks(investigation_id);

            CREATE INDEX IF NOT EXISTS idx_tasks_status
                ON investigation_tasks(status);

            CREATE INDEX IF NOT EXISTS idx_evidence_investigation
                ON evidence_items(investigation_id);

            CREATE INDEX IF NOT EXISTS idx_evidence_task
                ON evidence_items(task_id);

            CREATE INDEX IF NOT EXISTS idx_activities_order
                ON investigation_activities(investigation_id, created_at, id);

            CREATE INDEX IF NOT EXISTS idx_collaborators_user
                ON investigation_collaborators(user_id);

            CREATE INDEX IF NOT EXISTS idx_presence_investigation
                ON user_presence(investigation_id);

            -- Chain-of-custody backstop: evidence content and activity rows
            -- are append-only at the SQL layer. Cascade deletes stay legal.
            CREATE TRIGGER IF NOT EXISTS evidence_content_frozen
                BEFORE UPDATE OF content, hash ON evidence_items
            BEGIN
                SELECT RAISE(ABORT, 'evidence content is immutable');
            END;

            CREATE TRIGGER IF NOT EXISTS activities_append_only
                BEFORE UPDATE ON investigation_activities
            BEGIN
                SELECT RAISE(ABORT, 'activity rows are append-only');
            END;
        "#,
        )
        .map_err(EngineError::store)?;
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    /// Health check - verify the database is accessible.
    pub fn health_check(&self) -> EngineResult<()> {
        let conn = self.lock();
        conn.query_row("SELECT 1", [], |_| Ok(()))
            .map_err(EngineError::store)?;
        Ok(())
    }

    /// Run `f` inside a transaction; commit on Ok, roll back on Err.
    pub(crate) fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(EngineError::store)?;
        let value = f(&tx)?;
        tx.commit().map_err(EngineError::store)?;
        Ok(value)
    }
}

// ============================================================================
// Timestamp codec
// ============================================================================

/// Fixed-width RFC 3339 (microseconds, Z suffix) so lexicographic order over
/// the stored text equals chronological order.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(text: &str) -> EngineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(EngineError::store)
}

pub(crate) fn opt_json(text: Option<String>) -> Option<serde_json::Value> {
    text.and_then(|s| serde_json::from_str(&s).ok())
}

pub(crate) fn json_text(value: &Option<serde_json::Value>) -> Option<String> {
    value.as_ref().map(|v| v.to_string())
}

// ============================================================================
// Row mappers
// ============================================================================

pub(crate) fn row_to_investigation(row: &Row) -> EngineResult<Investigation> {
    let status: String = row.get("status").map_err(EngineError::store)?;
    let priority: String = row.get("priority").map_err(EngineError::store)?;
    let created_at: String = row.get("created_at").map_err(EngineError::store)?;
    let updated_at: String = row.get("updated_at").map_err(EngineError::store)?;
    let metadata: Option<String> = row.get("metadata").map_err(EngineError::store)?;

    Ok(Investigation {
        id: row.get("id").map_err(EngineError::store)?,
        title: row.get("title").map_err(EngineError::store)?,
        description: row.get("description").map_err(EngineError::store)?,
        status: status.parse()?,
        priority: priority.parse()?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        created_by: row.get("created_by").map_err(EngineError::store)?,
        lead_investigator: row.get("lead_investigator").map_err(EngineError::store)?,
        metadata: opt_json(metadata),
    })
}

pub(crate) fn row_to_task(row: &Row) -> EngineResult<Task> {
    let status: String = row.get("status").map_err(EngineError::store)?;
    let priority: String = row.get("priority").map_err(EngineError::store)?;
    let created_at: String = row.get("created_at").map_err(EngineError::store)?;
    let updated_at: String = row.get("updated_at").map_err(EngineError::store)?;
    let due_date: Option<String> = row.get("due_date").map_err(EngineError::store)?;
    let metadata: Option<String> = row.get("metadata").map_err(EngineError::store)?;

    Ok(Task {
        id: row.get("id").map_err(EngineError::store)?,
        investigation_id: row.get("investigation_id").map_err(EngineError::store)?,
        title: row.get("title").map_err(EngineError::store)?,
        description: row.get("description").map_err(EngineError::store)?,
        status: status.parse()?,
        priority: priority.parse()?,
        assigned_to: row.get("assigned_to").map_err(EngineError::store)?,
        created_at: parse_ts(&created_at)?,
        updated_at: parse_ts(&updated_at)?,
        due_date: due_date.as_deref().map(parse_ts).transpose()?,
        metadata: opt_json(metadata),
    })
}

pub(crate) fn row_to_evidence(row: &Row) -> EngineResult<EvidenceItem> {
    let collected_at: String = row.get("collected_at").map_err(EngineError::store)?;
    let metadata: Option<String> = row.get("metadata").map_err(EngineError::store)?;

    Ok(EvidenceItem {
        id: row.get("id").map_err(EngineError::store)?,
        investigation_id: row.get("investigation_id").map_err(EngineError::store)?,
        task_id: row.get("task_id").map_err(EngineError::store)?,
        title: row.get("title").map_err(EngineError::store)?,
        description: row.get("description").map_err(EngineError::store)?,
        evidence_type: row.get("type").map_err(EngineError::store)?,
        source: row.get("source").map_err(EngineError::store)?,
        content: row.get("content").map_err(EngineError::store)?,
        hash: row.get("hash").map_err(EngineError::store)?,
        collected_at: parse_ts(&collected_at)?,
        metadata: opt_json(metadata),
    })
}

pub(crate) fn row_to_collaborator(row: &Row) -> EngineResult<Collaborator> {
    let role: String = row.get("role").map_err(EngineError::store)?;
    let permissions: String = row.get("permissions").map_err(EngineError::store)?;
    let joined_at: String = row.get("joined_at").map_err(EngineError::store)?;
    let last_active: String = row.get("last_active").map_err(EngineError::store)?;

    Ok(Collaborator {
        investigation_id: row.get("investigation_id").map_err(EngineError::store)?,
        user_id: row.get("user_id").map_err(EngineError::store)?,
        role: role.parse::<CollaboratorRole>()?,
        permissions: serde_json::from_str(&permissions).unwrap_or_default(),
        joined_at: parse_ts(&joined_at)?,
        last_active: parse_ts(&last_active)?,
    })
}

pub(crate) fn row_to_presence(row: &Row) -> EngineResult<Presence> {
    let status: String = row.get("status").map_err(EngineError::store)?;
    let last_seen: String = row.get("last_seen").map_err(EngineError::store)?;

    Ok(Presence {
        user_id: row.get("user_id").map_err(EngineError::store)?,
        investigation_id: row.get("investigation_id").map_err(EngineError::store)?,
        status: status.parse()?,
        last_seen: parse_ts(&last_seen)?,
        current_location: row.get("current_location").map_err(EngineError::store)?,
    })
}
