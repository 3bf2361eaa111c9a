//! Referential integrity across investigation deletion.
//!
//! Deleting an investigation must leave zero owned task/evidence/activity/
//! collaborator rows and null out presence focus, all through FK actions in
//! one statement.

use caseboard_core::{Actor, PresenceStatus};
use caseboard_store::{Database, EvidenceFilter, NewEvidence, NewInvestigation, NewTask};

fn alice() -> Actor {
    Actor::new("alice", "analyst")
}

fn populated() -> (Database, String) {
    let db = Database::open_in_memory().unwrap();
    let inv = db
        .create_investigation(
            NewInvestigation {
                title: "Credential stuffing wave".into(),
                ..Default::default()
            },
            &alice(),
        )
        .unwrap();

    db.join_investigation(&inv.id, "bob", None).unwrap();

    let task = db
        .create_task(
            NewTask {
                investigation_id: inv.id.clone(),
                title: "Pull auth logs".into(),
                ..Default::default()
            },
            &alice(),
        )
        .unwrap();

    db.record_evidence(
        NewEvidence {
            investigation_id: inv.id.clone(),
            task_id: Some(task.id),
            title: "Auth log excerpt".into(),
            evidence_type: "log".into(),
            source: "idp".into(),
            content: "2025-06-01T09:00:00Z login failed for admin".into(),
            ..Default::default()
        },
        &alice(),
    )
    .unwrap();

    db.heartbeat("bob", PresenceStatus::Online, Some(&inv.id), None)
        .unwrap();

    (db, inv.id)
}

#[test]
fn deletion_cascades_and_clears_presence_focus() {
    let (db, inv_id) = populated();

    // Sanity: the graph is populated before deletion.
    assert!(!db.list_tasks(&inv_id).unwrap().is_empty());
    assert!(!db
        .list_evidence(&inv_id, &EvidenceFilter::default())
        .unwrap()
        .is_empty());
    assert!(!db.list_activities(&inv_id).unwrap().is_empty());
    assert!(!db.list_collaborators(&inv_id).unwrap().is_empty());

    db.delete_investigation(&inv_id, &alice()).unwrap();

    assert!(db.get_investigation(&inv_id).is_err());
    assert!(db.list_tasks(&inv_id).unwrap().is_empty());
    assert!(db
        .list_evidence(&inv_id, &EvidenceFilter::default())
        .unwrap()
        .is_empty());
    assert!(db.list_activities(&inv_id).unwrap().is_empty());
    assert!(db.list_collaborators(&inv_id).unwrap().is_empty());

    // The presence row survives with its focus cleared, not deleted.
    let presence = db.get_presence("bob").unwrap().unwrap();
    assert_eq!(presence.investigation_id, None);
    assert_eq!(presence.status, PresenceStatus::Online);
}

#[test]
fn deletion_requires_lead_authority() {
    let (db, inv_id) = populated();
    let err = db
        .delete_investigation(&inv_id, &Actor::new("bob", "analyst"))
        .unwrap_err();
    assert_eq!(err.kind(), "permission_denied");
    assert!(db.get_investigation(&inv_id).is_ok());
}
