// Audit replay: fold the frozen creation snapshot plus the totally ordered
// activity sequence back into current state. Auditors use this to prove the
// live rows are exactly what the log says they should be.

use rusqlite::params;
use serde::Serialize;
use std::collections::BTreeMap;

use caseboard_core::{
    Activity, ActivityType, CollaboratorRole, EngineError, EngineResult, Investigation, Task,
};

use crate::db::Database;

#[derive(Debug, Clone, Serialize)]
pub struct ReplayedState {
    pub investigation: Investigation,
    pub tasks: BTreeMap<String, Task>,
    pub collaborators: BTreeMap<String, CollaboratorRole>,
    pub evidence_ids: Vec<String>,
}

impl Database {
    /// Reduce snapshot + activities to current state. Deterministic: the
    /// activity order (created_at, id) is total per investigation.
    pub fn replay_investigation(&self, investigation_id: &str) -> EngineResult<ReplayedState> {
        let snapshot: String = {
            let conn = self.lock();
            conn.query_row(
                "SELECT snapshot FROM investigations WHERE id = ?1",
                params![investigation_id],
                |r| r.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => EngineError::NotFound {
                    entity: "investigation",
                    id: investigation_id.to_string(),
                },
                other => EngineError::store(other),
            })?
        };

        let activities = self.list_activities(investigation_id)?;
        let mut state = parse_snapshot(&snapshot)?;
        for activity in &activities {
            apply(&mut state, activity)?;
        }
        Ok(state)
    }
}

fn parse_snapshot(snapshot: &str) -> EngineResult<ReplayedState> {
    let value: serde_json::Value =
        serde_json::from_str(snapshot).map_err(EngineError::store)?;

    let investigation: Investigation =
        serde_json::from_value(value["investigation"].clone()).map_err(EngineError::store)?;

    let mut collaborators = BTreeMap::new();
    if let Some(seeded) = value["collaborators"].as_array() {
        for entry in seeded {
            let user_id = entry["user_id"].as_str().unwrap_or_default().to_string();
            let role: CollaboratorRole =
                entry["role"].as_str().unwrap_or("analyst").parse()?;
            collaborators.insert(user_id, role);
        }
    }

    Ok(ReplayedState {
        investigation,
        tasks: BTreeMap::new(),
        collaborators,
        evidence_ids: Vec::new(),
    })
}

fn apply(state: &mut ReplayedState, activity: &Activity) -> EngineResult<()> {
    let ty: ActivityType = activity.activity_type.parse()?;
    let details = activity.details.clone().unwrap_or_default();

    match ty {
        ActivityType::InvestigationUpdated => {
            let after = details["after"].as_object().cloned().unwrap_or_default();
            for (key, value) in after {
                match key.as_str() {
                    "title" => {
                        state.investigation.title =
                            value.as_str().unwrap_or_default().to_string();
                    }
                    "description" => {
                        state.investigation.description =
                            value.as_str().map(|s| s.to_string());
                    }
                    "priority" => {
                        state.investigation.priority =
                            serde_json::from_value(value).map_err(EngineError::store)?;
                    }
                    "lead_investigator" => {
                        state.investigation.lead_investigator =
                            value.as_str().map(|s| s.to_string());
                    }
                    "metadata" => {
                        state.investigation.metadata = Some(value);
                    }
                    _ => {}
                }
            }
            state.investigation.updated_at = activity.created_at;
        }
        ActivityType::StatusChanged => {
            state.investigation.status =
                serde_json::from_value(details["to"].clone()).map_err(EngineError::store)?;
            state.investigation.updated_at = activity.created_at;
        }
        ActivityType::TaskCreated => {
            let task: Task =
                serde_json::from_value(details["task"].clone()).map_err(EngineError::store)?;
            state.tasks.insert(task.id.clone(), task);
        }
        ActivityType::TaskStatusChanged => {
            let task_id = details["task_id"].as_str().unwrap_or_default();
            if let Some(task) = state.tasks.get_mut(task_id) {
                task.status =
                    serde_json::from_value(details["to"].clone()).map_err(EngineError::store)?;
                task.updated_at = activity.created_at;
            }
        }
        ActivityType::EvidenceCollected => {
            if let Some(id) = details["evidence_id"].as_str() {
                state.evidence_ids.push(id.to_string());
            }
        }
        ActivityType::CollaboratorJoined => {
            let user_id = details["user_id"].as_str().unwrap_or_default().to_string();
            let role: CollaboratorRole =
                serde_json::from_value(details["role"].clone()).map_err(EngineError::store)?;
            state.collaborators.insert(user_id, role);
        }
        ActivityType::CollaboratorLeft => {
            if let Some(user_id) = details["user_id"].as_str() {
                state.collaborators.remove(user_id);
            }
        }
        ActivityType::RoleChanged => {
            let user_id = details["user_id"].as_str().unwrap_or_default().to_string();
            let role: CollaboratorRole =
                serde_json::from_value(details["to"].clone()).map_err(EngineError::store)?;
            state.collaborators.insert(user_id, role);
        }
    }
    Ok(())
}
