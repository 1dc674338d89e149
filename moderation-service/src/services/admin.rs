//! Audited role and permission administration.
//!
//! Wraps `RbacService` so every change to the RBAC graph leaves an audit
//! entry with the calling administrator as actor. Calls that change nothing
//! (re-assigning a held role, removing an absent grant) are not audited.

use serde_json::json;

use super::{AuditService, RbacService, ServiceError};
use crate::models::{AuditAction, Permission, Role, Snapshot};

pub const ROLES_TABLE: &str = "roles";
pub const PERMISSIONS_TABLE: &str = "permissions";
pub const USER_ROLES_TABLE: &str = "user_roles";
pub const ROLE_PERMISSIONS_TABLE: &str = "role_permissions";

fn snapshot(value: serde_json::Value) -> Option<Snapshot> {
    match value {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

#[derive(Clone)]
pub struct AdminService {
    rbac: RbacService,
    audit: AuditService,
}

impl AdminService {
    pub fn new(rbac: RbacService, audit: AuditService) -> Self {
        Self { rbac, audit }
    }

    pub async fn create_role(
        &self,
        actor: i64,
        name: &str,
        description: &str,
    ) -> Result<Role, ServiceError> {
        let role = self.rbac.create_role(name, description).await?;
        self.audit
            .record(
                Some(actor),
                AuditAction::CreateRole.as_str(),
                ROLES_TABLE,
                role.id,
                None,
                snapshot(json!({ "name": role.name, "description": role.description })),
            )
            .await?;
        Ok(role)
    }

    pub async fn create_permission(
        &self,
        actor: i64,
        name: &str,
        resource: &str,
        action: &str,
        description: &str,
    ) -> Result<Permission, ServiceError> {
        let permission = self
            .rbac
            .create_permission(name, resource, action, description)
            .await?;
        self.audit
            .record(
                Some(actor),
                AuditAction::CreatePermission.as_str(),
                PERMISSIONS_TABLE,
                permission.id,
                None,
                snapshot(json!({
                    "name": permission.name,
                    "resource": permission.resource,
                    "action": permission.action,
                })),
            )
            .await?;
        Ok(permission)
    }

    pub async fn user_roles(&self, user_id: i64) -> Result<Vec<Role>, ServiceError> {
        self.rbac.get_user_roles(user_id).await
    }

    pub async fn role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError> {
        self.rbac.get_role_permissions(role_id).await
    }

    pub async fn assign_role(
        &self,
        actor: i64,
        user_id: i64,
        role_id: i64,
    ) -> Result<bool, ServiceError> {
        let added = self.rbac.assign_role_to_user(user_id, role_id).await?;
        if added {
            self.audit
                .record(
                    Some(actor),
                    AuditAction::AssignRole.as_str(),
                    USER_ROLES_TABLE,
                    user_id,
                    None,
                    snapshot(json!({ "user_id": user_id, "role_id": role_id })),
                )
                .await?;
        }
        Ok(added)
    }

    pub async fn remove_role(
        &self,
        actor: i64,
        user_id: i64,
        role_id: i64,
    ) -> Result<bool, ServiceError> {
        let removed = self.rbac.remove_role_from_user(user_id, role_id).await? > 0;
        if removed {
            self.audit
                .record(
                    Some(actor),
                    AuditAction::RemoveRole.as_str(),
                    USER_ROLES_TABLE,
                    user_id,
                    snapshot(json!({ "user_id": user_id, "role_id": role_id })),
                    None,
                )
                .await?;
        }
        Ok(removed)
    }

    pub async fn grant_permission(
        &self,
        actor: i64,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool, ServiceError> {
        let added = self
            .rbac
            .assign_permission_to_role(role_id, permission_id)
            .await?;
        if added {
            self.audit
                .record(
                    Some(actor),
                    AuditAction::GrantPermission.as_str(),
                    ROLE_PERMISSIONS_TABLE,
                    role_id,
                    None,
                    snapshot(json!({ "role_id": role_id, "permission_id": permission_id })),
                )
                .await?;
        }
        Ok(added)
    }

    pub async fn revoke_permission(
        &self,
        actor: i64,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool, ServiceError> {
        let removed = self
            .rbac
            .remove_permission_from_role(role_id, permission_id)
            .await?
            > 0;
        if removed {
            self.audit
                .record(
                    Some(actor),
                    AuditAction::RevokePermission.as_str(),
                    ROLE_PERMISSIONS_TABLE,
                    role_id,
                    snapshot(json!({ "role_id": role_id, "permission_id": permission_id })),
                    None,
                )
                .await?;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::services::{MemoryStore, Store};
    use chrono::NaiveDate;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn only_effective_changes_are_audited() {
        let store = Arc::new(MemoryStore::new());
        let rbac = RbacService::new(store.clone(), Duration::ZERO);
        let audit = AuditService::new(store.clone());
        let admin = AdminService::new(rbac, audit.clone());

        let user = store
            .insert_user_with_roles(
                NewUser {
                    username: "bob".to_string(),
                    email: "bob@x.com".to_string(),
                    password_hash: "hash".to_string(),
                    name: "Bob".to_string(),
                    birthday: NaiveDate::from_ymd_opt(1980, 2, 2).unwrap(),
                },
                &[],
            )
            .await
            .unwrap();
        let role = admin.create_role(user.id, "moderator", "").await.unwrap();

        assert!(admin.assign_role(user.id, user.id, role.id).await.unwrap());
        assert!(!admin.assign_role(user.id, user.id, role.id).await.unwrap());
        assert!(admin.remove_role(user.id, user.id, role.id).await.unwrap());
        assert!(!admin.remove_role(user.id, user.id, role.id).await.unwrap());

        let actions: Vec<String> = audit
            .logs_by_table(USER_ROLES_TABLE, user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.entry.action)
            .collect();
        assert_eq!(actions, vec!["remove_role", "assign_role"]);

        let created = audit.logs_by_table(ROLES_TABLE, role.id).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].entry.new_values.as_ref().unwrap()["name"], "moderator");
    }
}
