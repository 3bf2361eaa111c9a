//! Persistence store and coordination engine for collaborative
//! investigations: lifecycle, evidence ledger, activity log, and
//! collaboration/presence tracking over a single SQLite database.
//!
//! Every mutating operation performs its row write and its activity append
//! inside one transaction; partial application is impossible by construction.

mod activity;
mod collab;
mod db;
mod evidence;
mod lifecycle;
mod replay;

pub use collab::PresenceFilter;
pub use db::Database;
pub use evidence::{EvidenceFilter, NewEvidence};
pub use lifecycle::{InvestigationFilter, InvestigationPatch, NewInvestigation, NewTask};
pub use replay::ReplayedState;
