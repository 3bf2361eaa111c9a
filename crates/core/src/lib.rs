pub mod activity;
pub mod actor;
pub mod error;
pub mod ids;
pub mod model;
pub mod transition;

pub use activity::ActivityType;
pub use actor::Actor;
pub use error::{EngineError, EngineResult};
pub use ids::{new_id, validate_id};
pub use model::{
    Activity, Collaborator, CollaboratorRole, EvidenceItem, Investigation, InvestigationStatus,
    Presence, PresenceStatus, Priority, Task, TaskStatus,
};
pub use transition::{requires_lead, transition_allowed};
