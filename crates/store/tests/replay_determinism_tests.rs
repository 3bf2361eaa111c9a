//! Audit replay determinism: folding the creation snapshot plus the activity
//! sequence must reproduce the exact current investigation/task state.

use caseboard_core::{
    Actor, CollaboratorRole, InvestigationStatus, Priority, TaskStatus,
};
use caseboard_store::{
    Database, InvestigationPatch, NewEvidence, NewInvestigation, NewTask,
};

fn alice() -> Actor {
    Actor::new("alice", "analyst")
}

#[test]
fn replay_reproduces_current_state_after_a_mixed_history() {
    let db = Database::open_in_memory().unwrap();
    let inv = db
        .create_investigation(
            NewInvestigation {
                title: "Watering hole campaign".into(),
                description: Some("Initial scoping".into()),
                ..Default::default()
            },
            &alice(),
        )
        .unwrap();

    // A realistic mutation history touching every replayable activity type.
    db.join_investigation(&inv.id, "bob", None).unwrap();
    db.join_investigation(&inv.id, "carol", Some(CollaboratorRole::Observer))
        .unwrap();

    let inv = db
        .update_investigation(
            &inv.id,
            InvestigationPatch {
                title: Some("Watering hole campaign (APT-29)".into()),
                priority: Some(Priority::High),
                ..Default::default()
            },
            &alice(),
            inv.updated_at,
        )
        .unwrap();

    let task = db
        .create_task(
            NewTask {
                investigation_id: inv.id.clone(),
                title: "Identify compromised CDN asset".into(),
                ..Default::default()
            },
            &alice(),
        )
        .unwrap();
    let task = db
        .update_task_status(&task.id, TaskStatus::InProgress, &alice(), task.updated_at)
        .unwrap();
    db.update_task_status(&task.id, TaskStatus::Completed, &alice(), task.updated_at)
        .unwrap();

    db.record_evidence(
        NewEvidence {
            investigation_id: inv.id.clone(),
            task_id: Some(task.id.clone()),
            title: "Injected script".into(),
            evidence_type: "javascript".into(),
            source: "cdn-mirror".into(),
            content: "window.__c2 = 'callback.example.org';".into(),
            ..Default::default()
        },
        &alice(),
    )
    .unwrap();

    db.change_collaborator_role(&inv.id, "bob", CollaboratorRole::Lead, &alice())
        .unwrap();
    db.leave_investigation(&inv.id, "carol").unwrap();

    let inv = db.get_investigation(&inv.id).unwrap();
    let inv = db
        .transition_status(&inv.id, InvestigationStatus::Completed, &alice(), inv.updated_at)
        .unwrap();

    // Fold the log and compare against the live rows, field by field.
    let replayed = db.replay_investigation(&inv.id).unwrap();
    let live = db.get_investigation(&inv.id).unwrap();

    assert_eq!(replayed.investigation.title, live.title);
    assert_eq!(replayed.investigation.status, live.status);
    assert_eq!(replayed.investigation.priority, live.priority);
    assert_eq!(replayed.investigation.updated_at, live.updated_at);

    let live_tasks = db.list_tasks(&inv.id).unwrap();
    assert_eq!(replayed.tasks.len(), live_tasks.len());
    for live_task in &live_tasks {
        let folded = replayed.tasks.get(&live_task.id).expect("task in replay");
        assert_eq!(folded.title, live_task.title);
        assert_eq!(folded.status, live_task.status);
        assert_eq!(folded.updated_at, live_task.updated_at);
    }

    let live_roles: std::collections::BTreeMap<String, CollaboratorRole> = db
        .list_collaborators(&inv.id)
        .unwrap()
        .into_iter()
        .map(|c| (c.user_id, c.role))
        .collect();
    assert_eq!(replayed.collaborators, live_roles);

    assert_eq!(replayed.evidence_ids.len(), 1);
}

#[test]
fn replaying_twice_yields_identical_results() {
    let db = Database::open_in_memory().unwrap();
    let inv = db
        .create_investigation(
            NewInvestigation {
                title: "Repeatable fold".into(),
                ..Default::default()
            },
            &alice(),
        )
        .unwrap();
    db.join_investigation(&inv.id, "bob", None).unwrap();
    db.transition_status(&inv.id, InvestigationStatus::Pending, &alice(), inv.updated_at)
        .unwrap();

    let first = db.replay_investigation(&inv.id).unwrap();
    let second = db.replay_investigation(&inv.id).unwrap();

    assert_eq!(
        serde_json::to_value(&first).unwrap(),
        serde_json::to_value(&second).unwrap()
    );
}
