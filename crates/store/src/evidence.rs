// Append-only evidence ledger. Content and hash are written once; there is
// no update path, and a schema trigger aborts any in-place rewrite.
// Corrections are new rows against the same investigation (and optionally
// the same task), which keeps the chain of custody intact.

use chrono::Utc;
use rusqlite::params;
use serde_json::json;
use sha2::{Digest, Sha256};

use caseboard_core::{new_id, ActivityType, Actor, EngineError, EngineResult, EvidenceItem};

use crate::activity::append_activity;
use crate::db::{self, Database};
use crate::lifecycle::{ensure_not_archived, load_investigation, load_task, require_writer};

#[derive(Debug, Clone, Default)]
pub struct NewEvidence {
    pub investigation_id: String,
    pub task_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub evidence_type: String,
    pub source: String,
    pub content: String,
    /// Hash declared by the collector, if any. The ledger recomputes and
    /// compares; divergence fails the write.
    pub hash: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct EvidenceFilter {
    pub evidence_type: Option<String>,
    pub task_id: Option<String>,
    pub source: Option<String>,
    pub limit: Option<usize>,
}

pub(crate) fn sha256_hex(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

impl Database {
    /// Record one evidence item and its `evidence_collected` activity
    /// atomically. A declared hash that does not match the recomputed digest
    /// of `content` fails with IntegrityMismatch before anything is stored;
    /// transport corruption is caught at write time, not read time.
    pub fn record_evidence(&self, new: NewEvidence, actor: &Actor) -> EngineResult<EvidenceItem> {
        if new.content.is_empty() {
            return Err(EngineError::Validation {
                field: "content",
                reason: "must not be empty".into(),
            });
        }

        let computed = sha256_hex(&new.content);
        let hash = match new.hash {
            Some(declared) => {
                if !declared.eq_ignore_ascii_case(&computed) {
                    return Err(EngineError::IntegrityMismatch {
                        declared,
                        computed,
                    });
                }
                declared
            }
            None => computed,
        };

        let now = Utc::now();
        let item = EvidenceItem {
            id: new_id(),
            investigation_id: new.investigation_id.clone(),
            task_id: new.task_id.clone(),
            title: if new.title.trim().is_empty() {
                "Evidence Item".to_string()
            } else {
                new.title.trim().to_string()
            },
            description: new.description,
            evidence_type: new.evidence_type,
            source: new.source,
            content: new.content,
            hash: Some(hash),
            collected_at: now,
            metadata: new.metadata,
        };

        self.in_transaction(|tx| {
            let investigation = load_investigation(tx, &item.investigation_id)?;
            ensure_not_archived(&investigation)?;
            require_writer(tx, &investigation, actor, "record evidence")?;

            if let Some(ref task_id) = item.task_id {
                let task = load_task(tx, task_id)?;
                if task.investigation_id != item.investigation_id {
                    return Err(EngineError::Validation {
                        field: "task_id",
                        reason: "task belongs to a different investigation".into(),
                    });
                }
            }

            tx.execute(
                r#"INSERT INTO evidence_items
                   (id, investigation_id, task_id, title, description, type, source,
                    content, hash, collected_at, metadata)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    item.id,
                    item.investigation_id,
                    item.task_id,
                    item.title,
                    item.description,
                    item.evidence_type,
                    item.source,
                    item.content,
                    item.hash,
                    db::fmt_ts(item.collected_at),
                    db::json_text(&item.metadata),
                ],
            )
            .map_err(EngineError::store)?;

            append_activity(
                tx,
                &item.investigation_id,
                &actor.user_id,
                ActivityType::EvidenceCollected,
                &format!("evidence collected from {}", item.source),
                json!({
                    "evidence_id": item.id,
                    "evidence_type": item.evidence_type,
                    "hash": item.hash,
                    "task_id": item.task_id,
                }),
                now,
            )?;

            Ok(())
        })?;

        tracing::info!(
            evidence_id = %item.id,
            investigation_id = %item.investigation_id,
            user_id = %actor.user_id,
            "evidence recorded"
        );
        Ok(item)
    }

    pub fn get_evidence(&self, id: &str) -> EngineResult<EvidenceItem> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, investigation_id, task_id, title, description, type, source,
                        content, hash, collected_at, metadata
                 FROM evidence_items WHERE id = ?1",
            )
            .map_err(EngineError::store)?;

        let mut rows = stmt.query(params![id]).map_err(EngineError::store)?;
        match rows.next().map_err(EngineError::store)? {
            Some(row) => db::row_to_evidence(row),
            None => Err(EngineError::NotFound {
                entity: "evidence",
                id: id.to_string(),
            }),
        }
    }

    pub fn list_evidence(
        &self,
        investigation_id: &str,
        filter: &EvidenceFilter,
    ) -> EngineResult<Vec<EvidenceItem>> {
        let conn = self.lock();

        let mut sql = String::from(
            "SELECT id, investigation_id, task_id, title, description, type, source,
                    content, hash, collected_at, metadata
             FROM evidence_items WHERE investigation_id = ?",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(investigation_id.to_string())];

        if let Some(ref evidence_type) = filter.evidence_type {
            sql.push_str(" AND type = ?");
            params_vec.push(Box::new(evidence_type.clone()));
        }
        if let Some(ref task_id) = filter.task_id {
            sql.push_str(" AND task_id = ?");
            params_vec.push(Box::new(task_id.clone()));
        }
        if let Some(ref source) = filter.source {
            sql.push_str(" AND source = ?");
            params_vec.push(Box::new(source.clone()));
        }

        sql.push_str(" ORDER BY collected_at DESC LIMIT ?");
        params_vec.push(Box::new(filter.limit.unwrap_or(100) as i64));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = conn.prepare(&sql).map_err(EngineError::store)?;
        let mut rows = stmt
            .query(params_refs.as_slice())
            .map_err(EngineError::store)?;

        let mut items = Vec::new();
        while let Some(row) = rows.next().map_err(EngineError::store)? {
            items.push(db::row_to_evidence(row)?);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{NewInvestigation, NewTask};
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

    fn header_evidence(investigation_id: &str) -> NewEvidence {
        NewEvidence {
            investigation_id: investigation_id.to_string(),
            title: "Original message headers".into(),
            evidence_type: "email-header".into(),
            source: "mail-gateway".into(),
            content: "Received: from mx1.example.net".into(),
            ..Default::default()
        }
    }

    #[test]
    fn computes_hash_when_none_declared() {
        let (db, inv_id) = seeded();
        let item = db.record_evidence(header_evidence(&inv_id), &alice()).unwrap();
        assert_eq!(
            item.hash.as_deref(),
            Some(sha256_hex("Received: from mx1.example.net").as_str())
        );
    }

    #[test]
    fn declared_hash_divergence_is_fatal_for_the_write() {
        let (db, inv_id) = seeded();
        let mut new = header_evidence(&inv_id);
        new.hash = Some("deadbeef".into());

        let err = db.record_evidence(new, &alice()).unwrap_err();
        assert_eq!(err.kind(), "integrity_mismatch");
        assert!(db
            .list_evidence(&inv_id, &EvidenceFilter::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn matching_declared_hash_is_stored_verbatim() {
        let (db, inv_id) = seeded();
        let mut new = header_evidence(&inv_id);
        let declared = sha256_hex(&new.content).to_uppercase();
        new.hash = Some(declared.clone());

        let item = db.record_evidence(new, &alice()).unwrap();
        assert_eq!(item.hash, Some(declared));
    }

    #[test]
    fn direct_content_update_is_aborted_by_the_trigger() {
        let (db, inv_id) = seeded();
        let item = db.record_evidence(header_evidence(&inv_id), &alice()).unwrap();

        let conn = db.lock();
        let err = conn.execute(
            "UPDATE evidence_items SET content = 'tampered' WHERE id = ?1",
            params![item.id],
        );
        assert!(err.is_err());
        drop(conn);

        let stored = db.get_evidence(&item.id).unwrap();
        assert_eq!(stored.content, item.content);
    }

    #[test]
    fn corrections_leave_the_original_row_untouched() {
        let (db, inv_id) = seeded();
        let original = db.record_evidence(header_evidence(&inv_id), &alice()).unwrap();

        let mut correction = header_evidence(&inv_id);
        correction.content = "Received: from mx1.example.net (corrected trace)".into();
        let corrected = db.record_evidence(correction, &alice()).unwrap();
        assert_ne!(original.id, corrected.id);

        let stored = db.get_evidence(&original.id).unwrap();
        assert_eq!(stored.content, original.content);
        assert_eq!(stored.hash, original.hash);

        let all = db
            .list_evidence(&inv_id, &EvidenceFilter::default())
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn task_from_another_investigation_is_rejected() {
        let (db, inv_id) = seeded();
        let other = db
            .create_investigation(
                NewInvestigation {
                    title: "Unrelated case".into(),
                    ..Default::default()
                },
                &alice(),
            )
            .unwrap();
        let foreign_task = db
            .create_task(
                NewTask {
                    investigation_id: other.id.clone(),
                    title: "Elsewhere".into(),
                    ..Default::default()
                },
                &alice(),
            )
            .unwrap();

        let mut new = header_evidence(&inv_id);
        new.task_id = Some(foreign_task.id);
        let err = db.record_evidence(new, &alice()).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
        assert_eq!(err.field(), Some("task_id"));
    }

    #[test]
    fn deleting_a_task_preserves_its_evidence() {
        let (db, inv_id) = seeded();
        let task = db
            .create_task(
                NewTask {
                    investigation_id: inv_id.clone(),
                    title: "Trace sender domain".into(),
                    ..Default::default()
                },
                &alice(),
            )
            .unwrap();

        let mut new = header_evidence(&inv_id);
        new.task_id = Some(task.id.clone());
        let item = db.record_evidence(new, &alice()).unwrap();

        let conn = db.lock();
        conn.execute(
            "DELETE FROM investigation_tasks WHERE id = ?1",
            params![task.id],
        )
        .unwrap();
        drop(conn);

        let stored = db.get_evidence(&item.id).unwrap();
        assert_eq!(stored.task_id, None);
        assert_eq!(stored.content, item.content);
    }
}
