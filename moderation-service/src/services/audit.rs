//! Append-only audit trail.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use super::{ServiceError, Store};
use crate::models::{ActorSummary, AuditLog, AuditLogView, NewAuditLog, Snapshot};

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn Store>,
}

impl AuditService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append one entry stamped with the current time. At least one of
    /// `old_values` and `new_values` must be present.
    #[tracing::instrument(skip(self, old_values, new_values))]
    pub async fn record(
        &self,
        actor: Option<i64>,
        action: &str,
        table_name: &str,
        record_id: i64,
        old_values: Option<Snapshot>,
        new_values: Option<Snapshot>,
    ) -> Result<AuditLog, ServiceError> {
        if old_values.is_none() && new_values.is_none() {
            return Err(ServiceError::internal(
                "audit entry requires an old or new snapshot",
            ));
        }

        let entry = self
            .store
            .insert_audit_log(NewAuditLog {
                user_id: actor,
                action: action.to_string(),
                table_name: table_name.to_string(),
                record_id,
                old_values,
                new_values,
                created_at: Utc::now(),
            })
            .await?;

        metrics::counter!("audit_entries_total", "action" => action.to_string()).increment(1);
        Ok(entry)
    }

    /// Entries for one record, newest first.
    pub async fn logs_by_table(
        &self,
        table_name: &str,
        record_id: i64,
    ) -> Result<Vec<AuditLogView>, ServiceError> {
        let logs = self
            .store
            .find_audit_logs_by_record(table_name, record_id)
            .await?;
        self.with_actors(logs).await
    }

    /// Entries made by one actor, newest first.
    pub async fn logs_by_user(&self, user_id: i64) -> Result<Vec<AuditLogView>, ServiceError> {
        let logs = self.store.find_audit_logs_by_user(user_id).await?;
        self.with_actors(logs).await
    }

    async fn with_actors(&self, logs: Vec<AuditLog>) -> Result<Vec<AuditLogView>, ServiceError> {
        let mut actors: HashMap<i64, Option<ActorSummary>> = HashMap::new();
        let mut views = Vec::with_capacity(logs.len());

        for entry in logs {
            let actor = match entry.user_id {
                Some(user_id) => {
                    if !actors.contains_key(&user_id) {
                        let summary =
                            self.store
                                .find_user_by_id(user_id)
                                .await?
                                .map(|u| ActorSummary {
                                    id: u.id,
                                    username: u.username,
                                    name: u.name,
                                });
                        actors.insert(user_id, summary);
                    }
                    actors.get(&user_id).cloned().flatten()
                }
                None => None,
            };
            views.push(AuditLogView { entry, actor });
        }

        Ok(views)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::services::MemoryStore;
    use chrono::NaiveDate;
    use serde_json::json;

    fn snapshot(value: serde_json::Value) -> Snapshot {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn entry_without_snapshots_is_rejected() {
        let audit = AuditService::new(Arc::new(MemoryStore::new()));
        let err = audit
            .record(Some(1), "update", "posts", 1, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[tokio::test]
    async fn system_entries_have_no_actor() {
        let store = Arc::new(MemoryStore::new());
        let audit = AuditService::new(store);
        audit
            .record(None, "create", "roles", 7, None, Some(snapshot(json!({"name": "user"}))))
            .await
            .unwrap();

        let logs = audit.logs_by_table("roles", 7).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].entry.user_id, None);
        assert!(logs[0].actor.is_none());
    }

    #[tokio::test]
    async fn queries_are_newest_first_with_actor_resolved() {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_user_with_roles(
                NewUser {
                    username: "alice".to_string(),
                    email: "a@x.com".to_string(),
                    password_hash: "hash".to_string(),
                    name: "Alice".to_string(),
                    birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                },
                &[],
            )
            .await
            .unwrap();
        let audit = AuditService::new(store);

        for title in ["A", "B", "C"] {
            audit
                .record(
                    Some(user.id),
                    "update",
                    "posts",
                    3,
                    Some(snapshot(json!({"title": "old"}))),
                    Some(snapshot(json!({"title": title}))),
                )
                .await
                .unwrap();
        }

        let logs = audit.logs_by_table("posts", 3).await.unwrap();
        let titles: Vec<_> = logs
            .iter()
            .map(|l| l.entry.new_values.as_ref().unwrap()["title"].clone())
            .collect();
        assert_eq!(titles, vec![json!("C"), json!("B"), json!("A")]);
        assert_eq!(logs[0].actor.as_ref().map(|a| a.username.as_str()), Some("alice"));

        let by_user = audit.logs_by_user(user.id).await.unwrap();
        assert_eq!(by_user.len(), 3);
        assert!(audit.logs_by_table("posts", 4).await.unwrap().is_empty());
    }
}
