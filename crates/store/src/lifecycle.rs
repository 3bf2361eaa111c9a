// Investigation lifecycle: creation, patching, status transitions, tasks.
// Each mutation writes its row change and exactly one activity row in the
// same transaction, with optimistic concurrency on the updated_at token.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde_json::json;

use caseboard_core::{
    new_id, ActivityType, Actor, CollaboratorRole, EngineError, EngineResult, Investigation,
    InvestigationStatus, Priority, Task, TaskStatus,
};
use caseboard_core::{requires_lead, transition_allowed};

use crate::activity::append_activity;
use crate::db::{self, Database};

#[derive(Debug, Clone, Default)]
pub struct NewInvestigation {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub lead_investigator: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct InvestigationPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub lead_investigator: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct InvestigationFilter {
    pub status: Option<InvestigationStatus>,
    pub priority: Option<Priority>,
    pub created_by: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub investigation_id: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub assigned_to: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl Database {
    /// Create an investigation. The creator becomes created_by and is seeded
    /// as the team's first (lead) collaborator; the row's creation snapshot
    /// is frozen for audit replay. Appends no activity: the snapshot is the
    /// replay origin.
    pub fn create_investigation(
        &self,
        new: NewInvestigation,
        actor: &Actor,
    ) -> EngineResult<Investigation> {
        validate_title(&new.title)?;

        let now = Utc::now();
        let investigation = Investigation {
            id: new_id(),
            title: new.title.trim().to_string(),
            description: new.description,
            status: InvestigationStatus::Active,
            priority: new.priority.unwrap_or(Priority::Medium),
            created_at: now,
            updated_at: now,
            created_by: actor.user_id.clone(),
            lead_investigator: new.lead_investigator,
            metadata: new.metadata,
        };

        let snapshot = json!({
            "investigation": investigation,
            "collaborators": [{
                "user_id": actor.user_id,
                "role": CollaboratorRole::Lead.as_str(),
            }],
        });

        self.in_transaction(|tx| {
            tx.execute(
                r#"INSERT INTO investigations
                   (id, title, description, status, priority, created_at, updated_at,
                    created_by, lead_investigator, metadata, snapshot)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    investigation.id,
                    investigation.title,
                    investigation.description,
                    investigation.status.as_str(),
                    investigation.priority.as_str(),
                    db::fmt_ts(investigation.created_at),
                    db::fmt_ts(investigation.updated_at),
                    investigation.created_by,
                    investigation.lead_investigator,
                    db::json_text(&investigation.metadata),
                    snapshot.to_string(),
                ],
            )
            .map_err(EngineError::store)?;

            let permissions = CollaboratorRole::Lead.default_permissions();
            tx.execute(
                r#"INSERT INTO investigation_collaborators
                   (investigation_id, user_id, role, permissions, joined_at, last_active)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    investigation.id,
                    actor.user_id,
                    CollaboratorRole::Lead.as_str(),
                    serde_json::to_string(&permissions).unwrap_or_default(),
                    db::fmt_ts(now),
                    db::fmt_ts(now),
                ],
            )
            .map_err(EngineError::store)?;

            Ok(())
        })?;

        tracing::info!(
            investigation_id = %investigation.id,
            created_by = %actor.user_id,
            "investigation created"
        );
        Ok(investigation)
    }

    pub fn get_investigation(&self, id: &str) -> EngineResult<Investigation> {
        let conn = self.lock();
        load_investigation(&conn, id)
    }

    pub fn list_investigations(
        &self,
        filter: &InvestigationFilter,
    ) -> EngineResult<Vec<Investigation>> {
        let conn = self.lock();

        let mut sql = String::from(
            "SELECT id, title, description, status, priority, created_at, updated_at,
                    created_by, lead_investigator, metadata
             FROM investigations WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        if let Some(priority) = filter.priority {
            sql.push_str(" AND priority = ?");
            params_vec.push(Box::new(priority.as_str().to_string()));
        }
        if let Some(ref created_by) = filter.created_by {
            sql.push_str(" AND created_by = ?");
            params_vec.push(Box::new(created_by.clone()));
        }

        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        params_vec.push(Box::new(filter.limit.unwrap_or(100) as i64));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql).map_err(EngineError::store)?;
        let mut rows = stmt
            .query(params_refs.as_slice())
            .map_err(EngineError::store)?;

        let mut investigations = Vec::new();
        while let Some(row) = rows.next().map_err(EngineError::store)? {
            investigations.push(db::row_to_investigation(row)?);
        }
        Ok(investigations)
    }

    /// Patch investigation fields. The caller-supplied `expected_updated_at`
    /// is the optimistic version token: on mismatch nothing is written and
    /// the caller must re-read and retry.
    pub fn update_investigation(
        &self,
        id: &str,
        patch: InvestigationPatch,
        actor: &Actor,
        expected_updated_at: DateTime<Utc>,
    ) -> EngineResult<Investigation> {
        if let Some(ref title) = patch.title {
            validate_title(title)?;
        }

        let now = Utc::now();
        let (updated, activity) = self.in_transaction(|tx| {
            let mut investigation = load_investigation(tx, id)?;
            ensure_not_archived(&investigation)?;
            require_writer(tx, &investigation, actor, "update investigation")?;
            check_version(
                investigation.updated_at,
                expected_updated_at,
                "investigation",
                id,
            )?;

            let mut before = serde_json::Map::new();
            let mut after = serde_json::Map::new();

            if let Some(title) = patch.title {
                let title = title.trim().to_string();
                before.insert("title".into(), json!(investigation.title));
                after.insert("title".into(), json!(title));
                investigation.title = title;
            }
            if let Some(description) = patch.description {
                before.insert("description".into(), json!(investigation.description));
                after.insert("description".into(), json!(description));
                investigation.description = Some(description);
            }
            if let Some(priority) = patch.priority {
                before.insert("priority".into(), json!(investigation.priority));
                after.insert("priority".into(), json!(priority));
                investigation.priority = priority;
            }
            if let Some(lead) = patch.lead_investigator {
                before.insert(
                    "lead_investigator".into(),
                    json!(investigation.lead_investigator),
                );
                after.insert("lead_investigator".into(), json!(lead));
                investigation.lead_investigator = Some(lead);
            }
            if let Some(metadata) = patch.metadata {
                before.insert("metadata".into(), json!(investigation.metadata));
                after.insert("metadata".into(), json!(metadata));
                investigation.metadata = Some(metadata);
            }
            investigation.updated_at = now;

            tx.execute(
                r#"UPDATE investigations
                   SET title = ?1, description = ?2, priority = ?3,
                       lead_investigator = ?4, metadata = ?5, updated_at = ?6
                   WHERE id = ?7"#,
                params![
                    investigation.title,
                    investigation.description,
                    investigation.priority.as_str(),
                    investigation.lead_investigator,
                    db::json_text(&investigation.metadata),
                    db::fmt_ts(now),
                    id,
                ],
            )
            .map_err(EngineError::store)?;

            let activity = append_activity(
                tx,
                id,
                &actor.user_id,
                ActivityType::InvestigationUpdated,
                "investigation fields updated",
                json!({ "before": before, "after": after }),
                now,
            )?;

            Ok((investigation, activity))
        })?;

        tracing::info!(
            investigation_id = %id,
            user_id = %actor.user_id,
            activity_id = %activity.id,
            "investigation updated"
        );
        Ok(updated)
    }

    /// Move an investigation along the status graph. Completion and archival
    /// need lead authority; the Active/Pending toggle needs membership.
    pub fn transition_status(
        &self,
        id: &str,
        target: InvestigationStatus,
        actor: &Actor,
        expected_updated_at: DateTime<Utc>,
    ) -> EngineResult<Investigation> {
        let now = Utc::now();
        let updated = self.in_transaction(|tx| {
            let mut investigation = load_investigation(tx, id)?;
            let from = investigation.status;

            if !transition_allowed(from, target) {
                return Err(EngineError::InvalidTransition {
                    from: from.to_string(),
                    to: target.to_string(),
                });
            }

            if requires_lead(target) {
                if !has_lead_authority(tx, &investigation, &actor.user_id)? {
                    return Err(EngineError::PermissionDenied {
                        user_id: actor.user_id.clone(),
                        action: "complete or archive investigation",
                    });
                }
            } else if !is_member(tx, id, &actor.user_id)? {
                return Err(EngineError::PermissionDenied {
                    user_id: actor.user_id.clone(),
                    action: "toggle investigation status",
                });
            }

            check_version(
                investigation.updated_at,
                expected_updated_at,
                "investigation",
                id,
            )?;

            investigation.status = target;
            investigation.updated_at = now;

            tx.execute(
                "UPDATE investigations SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![target.as_str(), db::fmt_ts(now), id],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                id,
                &actor.user_id,
                ActivityType::StatusChanged,
                &format!("status changed from {} to {}", from, target),
                json!({ "from": from, "to": target }),
                now,
            )?;

            Ok(investigation)
        })?;

        tracing::info!(
            investigation_id = %id,
            to = %target,
            user_id = %actor.user_id,
            "investigation status transitioned"
        );
        Ok(updated)
    }

    /// Delete an investigation. FK actions cascade owned tasks, evidence,
    /// activities, and collaborators, and null out presence focus rows.
    pub fn delete_investigation(&self, id: &str, actor: &Actor) -> EngineResult<()> {
        self.in_transaction(|tx| {
            let investigation = load_investigation(tx, id)?;
            if !has_lead_authority(tx, &investigation, &actor.user_id)? {
                return Err(EngineError::PermissionDenied {
                    user_id: actor.user_id.clone(),
                    action: "delete investigation",
                });
            }

            tx.execute("DELETE FROM investigations WHERE id = ?1", params![id])
                .map_err(EngineError::store)?;
            Ok(())
        })?;

        tracing::info!(investigation_id = %id, user_id = %actor.user_id, "investigation deleted");
        Ok(())
    }

    pub fn create_task(&self, new: NewTask, actor: &Actor) -> EngineResult<Task> {
        validate_title(&new.title)?;

        let now = Utc::now();
        let task = Task {
            id: new_id(),
            investigation_id: new.investigation_id.clone(),
            title: new.title.trim().to_string(),
            description: new.description,
            status: TaskStatus::Open,
            priority: new.priority.unwrap_or(Priority::Medium),
            assigned_to: new.assigned_to,
            created_at: now,
            updated_at: now,
            due_date: new.due_date,
            metadata: new.metadata,
        };

        self.in_transaction(|tx| {
            let investigation = load_investigation(tx, &task.investigation_id)?;
            ensure_not_archived(&investigation)?;
            require_writer(tx, &investigation, actor, "create task")?;

            tx.execute(
                r#"INSERT INTO investigation_tasks
                   (id, investigation_id, title, description, status, priority,
                    assigned_to, created_at, updated_at, due_date, metadata)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    task.id,
                    task.investigation_id,
                    task.title,
                    task.description,
                    task.status.as_str(),
                    task.priority.as_str(),
                    task.assigned_to,
                    db::fmt_ts(task.created_at),
                    db::fmt_ts(task.updated_at),
                    task.due_date.map(db::fmt_ts),
                    db::json_text(&task.metadata),
                ],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                &task.investigation_id,
                &actor.user_id,
                ActivityType::TaskCreated,
                &format!("task created: {}", task.title),
                json!({ "task": task }),
                now,
            )?;

            Ok(())
        })?;

        tracing::info!(
            task_id = %task.id,
            investigation_id = %task.investigation_id,
            user_id = %actor.user_id,
            "task created"
        );
        Ok(task)
    }

    pub fn get_task(&self, id: &str) -> EngineResult<Task> {
        let conn = self.lock();
        load_task(&conn, id)
    }

    pub fn list_tasks(&self, investigation_id: &str) -> EngineResult<Vec<Task>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, investigation_id, title, description, status, priority,
                        assigned_to, created_at, updated_at, due_date, metadata
                 FROM investigation_tasks
                 WHERE investigation_id = ?1
                 ORDER BY created_at",
            )
            .map_err(EngineError::store)?;

        let mut rows = stmt
            .query(params![investigation_id])
            .map_err(EngineError::store)?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next().map_err(EngineError::store)? {
            tasks.push(db::row_to_task(row)?);
        }
        Ok(tasks)
    }

    /// Task status mutation is frozen once the owning investigation is
    /// Archived.
    pub fn update_task_status(
        &self,
        task_id: &str,
        target: TaskStatus,
        actor: &Actor,
        expected_updated_at: DateTime<Utc>,
    ) -> EngineResult<Task> {
        let now = Utc::now();
        let updated = self.in_transaction(|tx| {
            let mut task = load_task(tx, task_id)?;
            let investigation = load_investigation(tx, &task.investigation_id)?;
            ensure_not_archived(&investigation)?;
            require_writer(tx, &investigation, actor, "update task status")?;
            check_version(task.updated_at, expected_updated_at, "task", task_id)?;

            let from = task.status;
            task.status = target;
            task.updated_at = now;

            tx.execute(
                "UPDATE investigation_tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![target.as_str(), db::fmt_ts(now), task_id],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                &task.investigation_id,
                &actor.user_id,
                ActivityType::TaskStatusChanged,
                &format!("task status changed from {} to {}", from, target),
                json!({ "task_id": task_id, "from": from, "to": target }),
                now,
            )?;

            Ok(task)
        })?;

        tracing::info!(
            task_id = %task_id,
            to = %target,
            user_id = %actor.user_id,
            "task status updated"
        );
        Ok(updated)
    }
}

// ============================================================================
// Shared transaction helpers
// ============================================================================

pub(crate) fn load_investigation(conn: &Connection, id: &str) -> EngineResult<Investigation> {
    let mut stmt = conn
        .prepare(
            "SELECT id, title, description, status, priority, created_at, updated_at,
                    created_by, lead_investigator, metadata
             FROM investigations WHERE id = ?1",
        )
        .map_err(EngineError::store)?;

    let mut rows = stmt.query(params![id]).map_err(EngineError::store)?;
    match rows.next().map_err(EngineError::store)? {
        Some(row) => db::row_to_investigation(row),
        None => Err(EngineError::NotFound {
            entity: "investigation",
            id: id.to_string(),
        }),
    }
}

pub(crate) fn load_task(conn: &Connection, id: &str) -> EngineResult<Task> {
    let mut stmt = conn
        .prepare(
            "SELECT id, investigation_id, title, description, status, priority,
                    assigned_to, created_at, updated_at, due_date, metadata
             FROM investigation_tasks WHERE id = ?1",
        )
        .map_err(EngineError::store)?;

    let mut rows = stmt.query(params![id]).map_err(EngineError::store)?;
    match rows.next().map_err(EngineError::store)? {
        Some(row) => db::row_to_task(row),
        None => Err(EngineError::NotFound {
            entity: "task",
            id: id.to_string(),
        }),
    }
}

pub(crate) fn collaborator_role(
    conn: &Connection,
    investigation_id: &str,
    user_id: &str,
) -> EngineResult<Option<CollaboratorRole>> {
    let mut stmt = conn
        .prepare(
            "SELECT role FROM investigation_collaborators
             WHERE investigation_id = ?1 AND user_id = ?2",
        )
        .map_err(EngineError::store)?;

    let mut rows = stmt
        .query(params![investigation_id, user_id])
        .map_err(EngineError::store)?;

    match rows.next().map_err(EngineError::store)? {
        Some(row) => {
            let role: String = row.get(0).map_err(EngineError::store)?;
            Ok(Some(role.parse()?))
        }
        None => Ok(None),
    }
}

pub(crate) fn is_member(
    conn: &Connection,
    investigation_id: &str,
    user_id: &str,
) -> EngineResult<bool> {
    Ok(collaborator_role(conn, investigation_id, user_id)?.is_some())
}

/// Lead authority: the investigation's lead_investigator, or any collaborator
/// holding the lead role. An investigation with neither cannot be completed,
/// archived, or deleted.
pub(crate) fn has_lead_authority(
    conn: &Connection,
    investigation: &Investigation,
    user_id: &str,
) -> EngineResult<bool> {
    if investigation.lead_investigator.as_deref() == Some(user_id) {
        return Ok(true);
    }
    Ok(matches!(
        collaborator_role(conn, &investigation.id, user_id)?,
        Some(CollaboratorRole::Lead)
    ))
}

pub(crate) fn ensure_not_archived(investigation: &Investigation) -> EngineResult<()> {
    if investigation.status == InvestigationStatus::Archived {
        return Err(EngineError::InvestigationArchived {
            id: investigation.id.clone(),
        });
    }
    Ok(())
}

/// Mutations need membership with a writing role; observers are read-only.
pub(crate) fn require_writer(
    conn: &Connection,
    investigation: &Investigation,
    actor: &Actor,
    action: &'static str,
) -> EngineResult<()> {
    if investigation.lead_investigator.as_deref() == Some(actor.user_id.as_str()) {
        return Ok(());
    }
    match collaborator_role(conn, &investigation.id, &actor.user_id)? {
        Some(role) if role.can_write() => Ok(()),
        _ => Err(EngineError::PermissionDenied {
            user_id: actor.user_id.clone(),
            action,
        }),
    }
}

fn check_version(
    stored: DateTime<Utc>,
    expected: DateTime<Utc>,
    entity: &'static str,
    id: &str,
) -> EngineResult<()> {
    // Compare at stored precision so a round-tripped token always matches.
    if db::fmt_ts(stored) != db::fmt_ts(expected) {
        return Err(EngineError::ConcurrentModification {
            entity,
            id: id.to_string(),
        });
    }
    Ok(())
}

fn validate_title(title: &str) -> EngineResult<()> {
    if title.trim().is_empty() {
        return Err(EngineError::Validation {
            field: "title",
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}
