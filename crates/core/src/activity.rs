use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// The closed set of audit activity types. Each type documents the detail
/// keys its `details` payload must carry so that replay can fold the
/// sequence deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityType {
    InvestigationUpdated,
    StatusChanged,
    TaskCreated,
    TaskStatusChanged,
    EvidenceCollected,
    CollaboratorJoined,
    CollaboratorLeft,
    RoleChanged,
}

impl ActivityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityType::InvestigationUpdated => "investigation_updated",
            ActivityType::StatusChanged => "status_changed",
            ActivityType::TaskCreated => "task_created",
            ActivityType::TaskStatusChanged => "task_status_changed",
            ActivityType::EvidenceCollected => "evidence_collected",
            ActivityType::CollaboratorJoined => "collaborator_joined",
            ActivityType::CollaboratorLeft => "collaborator_left",
            ActivityType::RoleChanged => "role_changed",
        }
    }

    /// Detail keys that must be present for this activity type.
    pub fn required_detail_keys(&self) -> &'static [&'static str] {
        match self {
            ActivityType::InvestigationUpdated => &["before", "after"],
            ActivityType::StatusChanged => &["from", "to"],
            ActivityType::TaskCreated => &["task"],
            ActivityType::TaskStatusChanged => &["task_id", "from", "to"],
            ActivityType::EvidenceCollected => &["evidence_id", "evidence_type", "hash"],
            ActivityType::CollaboratorJoined => &["user_id", "role"],
            ActivityType::CollaboratorLeft => &["user_id"],
            ActivityType::RoleChanged => &["user_id", "from", "to"],
        }
    }

    /// Validate a details payload against this type's registry entry.
    /// Called at the append edge; untyped blobs never reach the core.
    pub fn validate_details(&self, details: &serde_json::Value) -> Result<(), EngineError> {
        let object = details.as_object().ok_or_else(|| EngineError::Validation {
            field: "details",
            reason: format!("{} details must be a JSON object", self.as_str()),
        })?;

        for key in self.required_detail_keys() {
            if !object.contains_key(*key) {
                return Err(EngineError::Validation {
                    field: "details",
                    reason: format!("{} details missing key `{}`", self.as_str(), key),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for ActivityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "investigation_updated" => Ok(ActivityType::InvestigationUpdated),
            "status_changed" => Ok(ActivityType::StatusChanged),
            "task_created" => Ok(ActivityType::TaskCreated),
            "task_status_changed" => Ok(ActivityType::TaskStatusChanged),
            "evidence_collected" => Ok(ActivityType::EvidenceCollected),
            "collaborator_joined" => Ok(ActivityType::CollaboratorJoined),
            "collaborator_left" => Ok(ActivityType::CollaboratorLeft),
            "role_changed" => Ok(ActivityType::RoleChanged),
            other => Err(EngineError::Validation {
                field: "activity_type",
                reason: format!("unknown activity type: {}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validates_required_keys() {
        let ok = json!({"from": "Active", "to": "Completed"});
        assert!(ActivityType::StatusChanged.validate_details(&ok).is_ok());

        let missing = json!({"from": "Active"});
        let err = ActivityType::StatusChanged.validate_details(&missing).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.field(), Some("details"));
    }

    #[test]
    fn rejects_non_object_details() {
        assert!(ActivityType::TaskCreated
            .validate_details(&json!("not an object"))
            .is_err());
    }

    #[test]
    fn labels_round_trip() {
        for ty in [
            ActivityType::InvestigationUpdated,
            ActivityType::StatusChanged,
            ActivityType::TaskCreated,
            ActivityType::TaskStatusChanged,
            ActivityType::EvidenceCollected,
            ActivityType::CollaboratorJoined,
            ActivityType::CollaboratorLeft,
            ActivityType::RoleChanged,
        ] {
            assert_eq!(ty.as_str().parse::<ActivityType>().unwrap(), ty);
        }
    }
}
