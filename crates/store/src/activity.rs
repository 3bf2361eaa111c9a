// Append-only audit trail. `append_activity` is crate-internal: it only runs
// inside the transactions of the lifecycle, ledger, and tracker operations,
// never as a standalone client write.

use chrono::{DateTime, Utc};
use rusqlite::{params, Transaction};

use caseboard_core::{new_id, Activity, ActivityType, EngineError, EngineResult};

use crate::db::{self, Database};

/// Insert one activity row at `created_at`. The caller passes the same
/// timestamp it used for the row mutation so replay sees one instant per
/// operation.
pub(crate) fn append_activity(
    tx: &Transaction,
    investigation_id: &str,
    user_id: &str,
    activity_type: ActivityType,
    description: &str,
    details: serde_json::Value,
    created_at: DateTime<Utc>,
) -> EngineResult<Activity> {
    activity_type.validate_details(&details)?;

    let activity = Activity {
        id: new_id(),
        investigation_id: investigation_id.to_string(),
        user_id: user_id.to_string(),
        activity_type: activity_type.as_str().to_string(),
        description: description.to_string(),
        created_at,
        details: Some(details),
    };

    tx.execute(
        r#"INSERT INTO investigation_activities
           (id, investigation_id, user_id, activity_type, description, created_at, details)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
        params![
            activity.id,
            activity.investigation_id,
            activity.user_id,
            activity.activity_type,
            activity.description,
            db::fmt_ts(activity.created_at),
            db::json_text(&activity.details),
        ],
    )
    .map_err(EngineError::store)?;

    Ok(activity)
}

impl Database {
    /// The causal sequence for an investigation, oldest first. The
    /// (created_at, id) order is total, so replays are deterministic.
    pub fn list_activities(&self, investigation_id: &str) -> EngineResult<Vec<Activity>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                r#"SELECT id, investigation_id, user_id, activity_type, description,
                          created_at, details
                   FROM investigation_activities
                   WHERE investigation_id = ?1
                   ORDER BY created_at, id"#,
            )
            .map_err(EngineError::store)?;

        let mut rows = stmt
            .query(params![investigation_id])
            .map_err(EngineError::store)?;

        let mut activities = Vec::new();
        while let Some(row) = rows.next().map_err(EngineError::store)? {
            let created_at: String = row.get("created_at").map_err(EngineError::store)?;
            let details: Option<String> = row.get("details").map_err(EngineError::store)?;
            activities.push(Activity {
                id: row.get("id").map_err(EngineError::store)?,
                investigation_id: row.get("investigation_id").map_err(EngineError::store)?,
                user_id: row.get("user_id").map_err(EngineError::store)?,
                activity_type: row.get("activity_type").map_err(EngineError::store)?,
                description: row.get("description").map_err(EngineError::store)?,
                created_at: db::parse_ts(&created_at)?,
                details: db::opt_json(details),
            });
        }
        Ok(activities)
    }
}
