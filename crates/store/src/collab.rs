// Membership and live presence. Membership changes are audited; presence
// heartbeats are high-frequency and deliberately are not, to keep the
// activity log from flooding.

use chrono::{DateTime, Duration, Utc};
use rusqlite::params;
use serde_json::json;

use caseboard_core::{
    ActivityType, Actor, Collaborator, CollaboratorRole, EngineError, EngineResult, Presence,
    PresenceStatus,
};

use crate::activity::append_activity;
use crate::db::{self, Database};
use crate::lifecycle::{
    collaborator_role, ensure_not_archived, has_lead_authority, is_member, load_investigation,
};

#[derive(Debug, Clone, Default)]
pub struct PresenceFilter {
    pub investigation_id: Option<String>,
    pub status: Option<PresenceStatus>,
}

impl Database {
    /// Join an investigation's team. The first member of a team defaults to
    /// the lead role; later joiners default to analyst.
    pub fn join_investigation(
        &self,
        investigation_id: &str,
        user_id: &str,
        role: Option<CollaboratorRole>,
    ) -> EngineResult<Collaborator> {
        let now = Utc::now();
        let joined = self.in_transaction(|tx| {
            let investigation = load_investigation(tx, investigation_id)?;
            ensure_not_archived(&investigation)?;

            if collaborator_role(tx, investigation_id, user_id)?.is_some() {
                return Err(EngineError::AlreadyMember {
                    investigation_id: investigation_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }

            let member_count: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM investigation_collaborators WHERE investigation_id = ?1",
                    params![investigation_id],
                    |r| r.get(0),
                )
                .map_err(EngineError::store)?;

            let role = role.unwrap_or(if member_count == 0 {
                CollaboratorRole::Lead
            } else {
                CollaboratorRole::Analyst
            });

            let collaborator = Collaborator {
                investigation_id: investigation_id.to_string(),
                user_id: user_id.to_string(),
                role,
                permissions: role.default_permissions(),
                joined_at: now,
                last_active: now,
            };

            tx.execute(
                r#"INSERT INTO investigation_collaborators
                   (investigation_id, user_id, role, permissions, joined_at, last_active)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    collaborator.investigation_id,
                    collaborator.user_id,
                    collaborator.role.as_str(),
                    serde_json::to_string(&collaborator.permissions).unwrap_or_default(),
                    db::fmt_ts(now),
                    db::fmt_ts(now),
                ],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                investigation_id,
                user_id,
                ActivityType::CollaboratorJoined,
                &format!("{} joined as {}", user_id, role),
                json!({ "user_id": user_id, "role": role }),
                now,
            )?;

            Ok(collaborator)
        })?;

        tracing::info!(
            investigation_id = %investigation_id,
            user_id = %user_id,
            role = %joined.role,
            "collaborator joined"
        );
        Ok(joined)
    }

    pub fn leave_investigation(&self, investigation_id: &str, user_id: &str) -> EngineResult<()> {
        let now = Utc::now();
        self.in_transaction(|tx| {
            let removed = tx
                .execute(
                    "DELETE FROM investigation_collaborators
                     WHERE investigation_id = ?1 AND user_id = ?2",
                    params![investigation_id, user_id],
                )
                .map_err(EngineError::store)?;
            if removed == 0 {
                return Err(EngineError::NotAMember {
                    investigation_id: investigation_id.to_string(),
                    user_id: user_id.to_string(),
                });
            }

            // A presence row focused here would otherwise keep advertising an
            // investigation the user can no longer heartbeat against.
            tx.execute(
                "UPDATE user_presence SET investigation_id = NULL
                 WHERE user_id = ?1 AND investigation_id = ?2",
                params![user_id, investigation_id],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                investigation_id,
                user_id,
                ActivityType::CollaboratorLeft,
                &format!("{} left the investigation", user_id),
                json!({ "user_id": user_id }),
                now,
            )?;

            Ok(())
        })?;

        tracing::info!(
            investigation_id = %investigation_id,
            user_id = %user_id,
            "collaborator left"
        );
        Ok(())
    }

    /// Change a member's role. Lead authority required.
    pub fn change_collaborator_role(
        &self,
        investigation_id: &str,
        user_id: &str,
        new_role: CollaboratorRole,
        actor: &Actor,
    ) -> EngineResult<Collaborator> {
        let now = Utc::now();
        let updated = self.in_transaction(|tx| {
            let investigation = load_investigation(tx, investigation_id)?;
            if !has_lead_authority(tx, &investigation, &actor.user_id)? {
                return Err(EngineError::PermissionDenied {
                    user_id: actor.user_id.clone(),
                    action: "change collaborator role",
                });
            }

            let from = collaborator_role(tx, investigation_id, user_id)?.ok_or_else(|| {
                EngineError::NotAMember {
                    investigation_id: investigation_id.to_string(),
                    user_id: user_id.to_string(),
                }
            })?;

            let permissions = new_role.default_permissions();
            tx.execute(
                r#"UPDATE investigation_collaborators
                   SET role = ?1, permissions = ?2
                   WHERE investigation_id = ?3 AND user_id = ?4"#,
                params![
                    new_role.as_str(),
                    serde_json::to_string(&permissions).unwrap_or_default(),
                    investigation_id,
                    user_id,
                ],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                investigation_id,
                &actor.user_id,
                ActivityType::RoleChanged,
                &format!("role of {} changed from {} to {}", user_id, from, new_role),
                json!({ "user_id": user_id, "from": from, "to": new_role }),
                now,
            )?;

            load_collaborator(tx, investigation_id, user_id)
        })?;

        tracing::info!(
            investigation_id = %investigation_id,
            user_id = %user_id,
            role = %new_role,
            "collaborator role changed"
        );
        Ok(updated)
    }

    pub fn list_collaborators(&self, investigation_id: &str) -> EngineResult<Vec<Collaborator>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT investigation_id, user_id, role, permissions, joined_at, last_active
                 FROM investigation_collaborators
                 WHERE investigation_id = ?1
                 ORDER BY joined_at",
            )
            .map_err(EngineError::store)?;

        let mut rows = stmt
            .query(params![investigation_id])
            .map_err(EngineError::store)?;

        let mut collaborators = Vec::new();
        while let Some(row) = rows.next().map_err(EngineError::store)? {
            collaborators.push(db::row_to_collaborator(row)?);
        }
        Ok(collaborators)
    }

    /// Upsert the caller's presence row: one row per user for the lifetime of
    /// the process. A supplied focus must name an investigation the user has
    /// joined. Heartbeats append no activity.
    pub fn heartbeat(
        &self,
        user_id: &str,
        status: PresenceStatus,
        investigation_id: Option<&str>,
        current_location: Option<&str>,
    ) -> EngineResult<Presence> {
        let now = Utc::now();
        self.in_transaction(|tx| {
            if let Some(inv_id) = investigation_id {
                if !is_member(tx, inv_id, user_id)? {
                    return Err(EngineError::NotAMember {
                        investigation_id: inv_id.to_string(),
                        user_id: user_id.to_string(),
                    });
                }
                // Keep the membership record's liveness in step, best-effort.
                tx.execute(
                    "UPDATE investigation_collaborators SET last_active = ?1
                     WHERE investigation_id = ?2 AND user_id = ?3",
                    params![db::fmt_ts(now), inv_id, user_id],
                )
                .map_err(EngineError::store)?;
            }

            tx.execute(
                r#"INSERT INTO user_presence
                   (user_id, investigation_id, status, last_seen, current_location)
                   VALUES (?1, ?2, ?3, ?4, ?5)
                   ON CONFLICT(user_id) DO UPDATE SET
                       investigation_id = excluded.investigation_id,
                       status = excluded.status,
                       last_seen = excluded.last_seen,
                       current_location = excluded.current_location"#,
                params![
                    user_id,
                    investigation_id,
                    status.as_str(),
                    db::fmt_ts(now),
                    current_location,
                ],
            )
            .map_err(EngineError::store)?;

            Ok(())
        })?;

        Ok(Presence {
            user_id: user_id.to_string(),
            investigation_id: investigation_id.map(|s| s.to_string()),
            status,
            last_seen: now,
            current_location: current_location.map(|s| s.to_string()),
        })
    }

    /// Mark presence rows whose last_seen predates the threshold as offline.
    /// The WHERE clause re-checks last_seen at write time, so a heartbeat
    /// racing the sweep is never clobbered back to stale.
    pub fn sweep_stale_presence(
        &self,
        now: DateTime<Utc>,
        stale_threshold: Duration,
    ) -> EngineResult<usize> {
        let cutoff = now - stale_threshold;
        let conn = self.lock();
        let swept = conn
            .execute(
                "UPDATE user_presence SET status = 'offline'
                 WHERE last_seen < ?1 AND status != 'offline'",
                params![db::fmt_ts(cutoff)],
            )
            .map_err(EngineError::store)?;

        if swept > 0 {
            tracing::warn!(swept, "presence sweep marked stale users offline");
        }
        Ok(swept)
    }

    pub fn get_presence(&self, user_id: &str) -> EngineResult<Option<Presence>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, investigation_id, status, last_seen, current_location
                 FROM user_presence WHERE user_id = ?1",
            )
            .map_err(EngineError::store)?;

        let mut rows = stmt.query(params![user_id]).map_err(EngineError::store)?;
        match rows.next().map_err(EngineError::store)? {
            Some(row) => Ok(Some(db::row_to_presence(row)?)),
            None => Ok(None),
        }
    }

    pub fn list_presence(&self, filter: &PresenceFilter) -> EngineResult<Vec<Presence>> {
        let conn = self.lock();

        let mut sql = String::from(
            "SELECT user_id, investigation_id, status, last_seen, current_location
             FROM user_presence WHERE 1=1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref investigation_id) = filter.investigation_id {
            sql.push_str(" AND investigation_id = ?");
            params_vec.push(Box::new(investigation_id.clone()));
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            params_vec.push(Box::new(status.as_str().to_string()));
        }
        sql.push_str(" ORDER BY last_seen DESC");

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql).map_err(EngineError::store)?;
        let mut rows = stmt
            .query(params_refs.as_slice())
            .map_err(EngineError::store)?;

        let mut presence = Vec::new();
        while let Some(row) = rows.next().map_err(EngineError::store)? {
            presence.push(db::row_to_presence(row)?);
        }
        Ok(presence)
    }
}

fn load_collaborator(
    conn: &rusqlite::Connection,
    investigation_id: &str,
    user_id: &str,
) -> EngineResult<Collaborator> {
    let mut stmt = conn
        .prepare(
            "SELECT investigation_id, user_id, role, permissions, joined_at, last_active
             FROM investigation_collaborators
             WHERE investigation_id = ?1 AND user_id = ?2",
        )
        .map_err(EngineError::store)?;

    let mut rows = stmt
        .query(params![investigation_id, user_id])
        .map_err(EngineError::store)?;

    match rows.next().map_err(EngineError::store)? {
        Some(row) => db::row_to_collaborator(row),
        None => Err(EngineError::NotAMember {
            investigation_id: investigation_id.to_string(),
            user_id: user_id.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::NewInvestigation;
    use caseboard_core::Actor;

    fn alice() -> Actor {
        Actor::new("alice", "analyst")
    }

    fn seeded() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let inv = db
            .create_investigation(
                NewInvestigation {
                    title: "Phishing Campaign X".into(),
                    ..Default::default()
                },
                &alice(),
            )
            .unwrap();
        (db, inv.id)
    }

    #[test]
    fn duplicate_join_fails() {
        let (db, inv_id) = seeded();
        db.join_investigation(&inv_id, "bob", None).unwrap();
        let err = db.join_investigation(&inv_id, "bob", None).unwrap_err();
        assert_eq!(err.kind(), "already_member");
    }

    #[test]
    fn later_joiners_default_to_analyst() {
        let (db, inv_id) = seeded();
        // Creator seeding made alice the first (lead) member.
        let bob = db.join_investigation(&inv_id, "bob", None).unwrap();
        assert_eq!(bob.role, CollaboratorRole::Analyst);
        assert_eq!(bob.permissions, vec!["read", "write"]);
    }

    #[test]
    fn heartbeat_requires_membership_for_focus() {
        let (db, inv_id) = seeded();
        let err = db
            .heartbeat("mallory", PresenceStatus::Online, Some(&inv_id), None)
            .unwrap_err();
        assert_eq!(err.kind(), "not_a_member");
        assert!(db.get_presence("mallory").unwrap().is_none());
    }

    #[test]
    fn heartbeat_upserts_a_single_row() {
        let (db, inv_id) = seeded();
        db.heartbeat("alice", PresenceStatus::Online, Some(&inv_id), Some("ops-floor"))
            .unwrap();
        db.heartbeat("alice", PresenceStatus::Busy, Some(&inv_id), None)
            .unwrap();

        let presence = db.list_presence(&PresenceFilter::default()).unwrap();
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].status, PresenceStatus::Busy);
        assert_eq!(presence[0].current_location, None);
    }

    #[test]
    fn sweep_only_touches_rows_past_the_threshold() {
        let (db, inv_id) = seeded();
        let threshold = Duration::seconds(60);
        let now = Utc::now();

        db.heartbeat("alice", PresenceStatus::Online, Some(&inv_id), None)
            .unwrap();
        db.heartbeat("bob", PresenceStatus::Online, None, None).unwrap();

        // Backdate bob far past the threshold and alice to half of it.
        let conn = db.lock();
        conn.execute(
            "UPDATE user_presence SET last_seen = ?1 WHERE user_id = 'bob'",
            params![db::fmt_ts(now - threshold * 2)],
        )
        .unwrap();
        conn.execute(
            "UPDATE user_presence SET last_seen = ?1 WHERE user_id = 'alice'",
            params![db::fmt_ts(now - threshold / 2)],
        )
        .unwrap();
        drop(conn);

        let swept = db.sweep_stale_presence(now, threshold).unwrap();
        assert_eq!(swept, 1);
        assert_eq!(
            db.get_presence("bob").unwrap().unwrap().status,
            PresenceStatus::Offline
        );
        assert_eq!(
            db.get_presence("alice").unwrap().unwrap().status,
            PresenceStatus::Online
        );

        // Second pass finds nothing new: re-check-then-write, not blind.
        assert_eq!(db.sweep_stale_presence(now, threshold).unwrap(), 0);
    }

    #[test]
    fn sweep_does_not_resurrect_a_fresh_heartbeat() {
        let (db, _inv_id) = seeded();
        let threshold = Duration::seconds(60);
        let now = Utc::now();

        // Heartbeat lands between the sweep's decision and its write; the
        // WHERE clause re-check must leave the row online.
        db.heartbeat("bob", PresenceStatus::Online, None, None).unwrap();
        let swept = db.sweep_stale_presence(now, threshold).unwrap();
        assert_eq!(swept, 0);
        assert_eq!(
            db.get_presence("bob").unwrap().unwrap().status,
            PresenceStatus::Online
        );
    }

    #[test]
    fn leaving_clears_presence_focus_and_audits() {
        let (db, inv_id) = seeded();
        db.join_investigation(&inv_id, "bob", None).unwrap();
        db.heartbeat("bob", PresenceStatus::Online, Some(&inv_id), None)
            .unwrap();

        db.leave_investigation(&inv_id, "bob").unwrap();
        let presence = db.get_presence("bob").unwrap().unwrap();
        assert_eq!(presence.investigation_id, None);

        let err = db.leave_investigation(&inv_id, "bob").unwrap_err();
        assert_eq!(err.kind(), "not_a_member");

        let types: Vec<String> = db
            .list_activities(&inv_id)
            .unwrap()
            .into_iter()
            .map(|a| a.activity_type)
            .collect();
        assert_eq!(types, vec!["collaborator_joined", "collaborator_left"]);
    }

    #[test]
    fn role_change_is_lead_gated_and_audited() {
        let (db, inv_id) = seeded();
        db.join_investigation(&inv_id, "bob", None).unwrap();

        let err = db
            .change_collaborator_role(
                &inv_id,
                "bob",
                CollaboratorRole::Lead,
                &Actor::new("bob", "analyst"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "permission_denied");

        let updated = db
            .change_collaborator_role(&inv_id, "bob", CollaboratorRole::Lead, &alice())
            .unwrap();
        assert_eq!(updated.role, CollaboratorRole::Lead);
        assert!(updated.permissions.contains(&"manage".to_string()));
    }

    #[test]
    fn heartbeats_do_not_flood_the_activity_log() {
        let (db, inv_id) = seeded();
        for _ in 0..5 {
            db.heartbeat("alice", PresenceStatus::Online, Some(&inv_id), None)
                .unwrap();
        }
        assert!(db.list_activities(&inv_id).unwrap().is_empty());
    }
}
