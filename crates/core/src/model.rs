use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum InvestigationStatus {
    Active,
    Pending,
    Completed,
    Archived,
}

impl InvestigationStatus {
    pub const ALL: [InvestigationStatus; 4] = [
        InvestigationStatus::Active,
        InvestigationStatus::Pending,
        InvestigationStatus::Completed,
        InvestigationStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvestigationStatus::Active => "Active",
            InvestigationStatus::Pending => "Pending",
            InvestigationStatus::Completed => "Completed",
            InvestigationStatus::Archived => "Archived",
        }
    }
}

impl fmt::Display for InvestigationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(InvestigationStatus::Active),
            "Pending" => Ok(InvestigationStatus::Pending),
            "Completed" => Ok(InvestigationStatus::Completed),
            "Archived" => Ok(InvestigationStatus::Archived),
            other => Err(EngineError::Validation {
                field: "status",
                reason: format!("unknown investigation status: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Open,
    InProgress,
    Review,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::InProgress => "InProgress",
            TaskStatus::Review => "Review",
            TaskStatus::Completed => "Completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(TaskStatus::Open),
            "InProgress" => Ok(TaskStatus::InProgress),
            "Review" => Ok(TaskStatus::Review),
            "Completed" => Ok(TaskStatus::Completed),
            other => Err(EngineError::Validation {
                field: "status",
                reason: format!("unknown task status: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Low" => Ok(Priority::Low),
            "Medium" => Ok(Priority::Medium),
            "High" => Ok(Priority::High),
            "Critical" => Ok(Priority::Critical),
            other => Err(EngineError::Validation {
                field: "priority",
                reason: format!("unknown priority: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CollaboratorRole {
    Lead,
    Analyst,
    Observer,
}

impl CollaboratorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaboratorRole::Lead => "lead",
            CollaboratorRole::Analyst => "analyst",
            CollaboratorRole::Observer => "observer",
        }
    }

    /// Default permission set granted when a collaborator joins with this role.
    pub fn default_permissions(&self) -> Vec<String> {
        let perms: &[&str] = match self {
            CollaboratorRole::Lead => &["read", "write", "manage"],
            CollaboratorRole::Analyst => &["read", "write"],
            CollaboratorRole::Observer => &["read"],
        };
        perms.iter().map(|p| p.to_string()).collect()
    }

    pub fn can_write(&self) -> bool {
        !matches!(self, CollaboratorRole::Observer)
    }
}

impl fmt::Display for CollaboratorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CollaboratorRole {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead" => Ok(CollaboratorRole::Lead),
            "analyst" => Ok(CollaboratorRole::Analyst),
            "observer" => Ok(CollaboratorRole::Observer),
            other => Err(EngineError::Validation {
                field: "role",
                reason: format!("unknown collaborator role: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Busy => "busy",
            PresenceStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PresenceStatus::Online),
            "away" => Ok(PresenceStatus::Away),
            "busy" => Ok(PresenceStatus::Busy),
            "offline" => Ok(PresenceStatus::Offline),
            other => Err(EngineError::Validation {
                field: "status",
                reason: format!("unknown presence status: {}", other),
            }),
        }
    }
}

/// Top-level case record owning tasks, evidence, activity, and membership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Investigation {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: InvestigationStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: String,
    pub lead_investigator: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub investigation_id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

/// One link in the chain of custody. Content and hash never change after
/// insert; corrections are new rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub investigation_id: String,
    pub task_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub evidence_type: String,
    pub source: String,
    pub content: String,
    pub hash: Option<String>,
    pub collected_at: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

/// Append-only audit record, totally ordered per investigation by
/// (created_at, id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub investigation_id: String,
    pub user_id: String,
    pub activity_type: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collaborator {
    pub investigation_id: String,
    pub user_id: String,
    pub role: CollaboratorRole,
    pub permissions: Vec<String>,
    pub joined_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
}

/// Per-user liveness record, at most one row per user process-wide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: String,
    pub investigation_id: Option<String>,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
    pub current_location: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_text() {
        for status in InvestigationStatus::ALL {
            assert_eq!(status.as_str().parse::<InvestigationStatus>().unwrap(), status);
        }
        for status in [
            TaskStatus::Open,
            TaskStatus::InProgress,
            TaskStatus::Review,
            TaskStatus::Completed,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn role_permissions_widen_with_authority() {
        assert_eq!(CollaboratorRole::Observer.default_permissions(), vec!["read"]);
        assert!(CollaboratorRole::Lead.default_permissions().contains(&"manage".to_string()));
        assert!(!CollaboratorRole::Observer.can_write());
        assert!(CollaboratorRole::Analyst.can_write());
    }

    #[test]
    fn unknown_labels_are_validation_errors() {
        let err = "Paused".parse::<InvestigationStatus>().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }
}
