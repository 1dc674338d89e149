use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio::sync::RwLock;

use super::{ServiceError, Store};
use crate::models::{
    AuditLog, NewAuditLog, NewPermission, NewPost, NewPostHistory, NewReport, NewRole, NewUser,
    Permission, Post, PostHistory, Report, Role, User,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    users: Vec<User>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    user_roles: Vec<(i64, i64, DateTime<Utc>)>,
    role_permissions: Vec<(i64, i64, DateTime<Utc>)>,
    audit_logs: Vec<AuditLog>,
    posts: Vec<Post>,
    post_history: Vec<PostHistory>,
    reports: Vec<Report>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process `Store`. Ids come from one shared sequence so they are unique
/// across tables, which keeps test assertions unambiguous.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: DashSet<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later call of the named `Store` method fail with an
    /// internal error.
    pub fn fail_on(&self, operation: &str) {
        self.failing.insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.failing.remove(operation);
    }

    fn check(&self, operation: &str) -> Result<(), ServiceError> {
        if self.failing.contains(operation) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "store operation '{}' failed",
                operation
            )));
        }
        Ok(())
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (DateTime<Utc>, i64)) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.check("health_check")
    }

    async fn insert_user_with_roles(
        &self,
        user: NewUser,
        role_ids: &[i64],
    ) -> Result<User, ServiceError> {
        self.check("insert_user")?;
        if !role_ids.is_empty() {
            self.check("insert_user_role")?;
        }
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(ServiceError::AlreadyExists("User".to_string()));
        }
        if let Some(missing) = role_ids
            .iter()
            .find(|id| !tables.roles.iter().any(|r| r.id == **id))
        {
            return Err(ServiceError::NotFound(format!("Role {}", missing)));
        }
        let now = Utc::now();
        let user = User {
            id: tables.next_id(),
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            birthday: user.birthday,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(user.clone());
        for role_id in role_ids {
            if !tables
                .user_roles
                .iter()
                .any(|(u, r, _)| *u == user.id && r == role_id)
            {
                tables.user_roles.push((user.id, *role_id, now));
            }
        }
        Ok(user)
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, ServiceError> {
        self.check("find_user_by_id")?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        self.check("find_user_by_email")?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn user_exists(&self, email: &str) -> Result<bool, ServiceError> {
        self.check("user_exists")?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().any(|u| u.email == email))
    }

    async fn insert_role(&self, role: NewRole) -> Result<Role, ServiceError> {
        self.check("insert_role")?;
        let mut tables = self.tables.write().await;
        if tables.roles.iter().any(|r| r.name == role.name) {
            return Err(ServiceError::AlreadyExists(format!("Role '{}'", role.name)));
        }
        let now = Utc::now();
        let role = Role {
            id: tables.next_id(),
            name: role.name,
            description: role.description,
            created_at: now,
            updated_at: now,
        };
        tables.roles.push(role.clone());
        Ok(role)
    }

    async fn find_role_by_id(&self, role_id: i64) -> Result<Option<Role>, ServiceError> {
        self.check("find_role_by_id")?;
        let tables = self.tables.read().await;
        Ok(tables.roles.iter().find(|r| r.id == role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError> {
        self.check("find_role_by_name")?;
        let tables = self.tables.read().await;
        Ok(tables.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn insert_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, ServiceError> {
        self.check("insert_permission")?;
        let mut tables = self.tables.write().await;
        if tables.permissions.iter().any(|p| p.name == permission.name) {
            return Err(ServiceError::AlreadyExists(format!(
                "Permission '{}'",
                permission.name
            )));
        }
        let now = Utc::now();
        let permission = Permission {
            id: tables.next_id(),
            name: permission.name,
            description: permission.description,
            resource: permission.resource,
            action: permission.action,
            created_at: now,
            updated_at: now,
        };
        tables.permissions.push(permission.clone());
        Ok(permission)
    }

    async fn find_permission_by_id(
        &self,
        permission_id: i64,
    ) -> Result<Option<Permission>, ServiceError> {
        self.check("find_permission_by_id")?;
        let tables = self.tables.read().await;
        Ok(tables.permissions.iter().find(|p| p.id == permission_id).cloned())
    }

    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        self.check("find_permission_by_name")?;
        let tables = self.tables.read().await;
        Ok(tables.permissions.iter().find(|p| p.name == name).cloned())
    }

    async fn insert_user_role(&self, user_id: i64, role_id: i64) -> Result<bool, ServiceError> {
        self.check("insert_user_role")?;
        let mut tables = self.tables.write().await;
        if tables
            .user_roles
            .iter()
            .any(|(u, r, _)| *u == user_id && *r == role_id)
        {
            return Ok(false);
        }
        tables.user_roles.push((user_id, role_id, Utc::now()));
        Ok(true)
    }

    async fn delete_user_role(&self, user_id: i64, role_id: i64) -> Result<u64, ServiceError> {
        self.check("delete_user_role")?;
        let mut tables = self.tables.write().await;
        let before = tables.user_roles.len();
        tables
            .user_roles
            .retain(|(u, r, _)| !(*u == user_id && *r == role_id));
        Ok((before - tables.user_roles.len()) as u64)
    }

    async fn find_user_roles(&self, user_id: i64) -> Result<Vec<Role>, ServiceError> {
        self.check("find_user_roles")?;
        let tables = self.tables.read().await;
        let roles = tables
            .user_roles
            .iter()
            .filter(|(u, _, _)| *u == user_id)
            .filter_map(|(_, role_id, _)| tables.roles.iter().find(|r| r.id == *role_id))
            .cloned()
            .collect();
        Ok(roles)
    }

    async fn insert_role_permission(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool, ServiceError> {
        self.check("insert_role_permission")?;
        let mut tables = self.tables.write().await;
        if tables
            .role_permissions
            .iter()
            .any(|(r, p, _)| *r == role_id && *p == permission_id)
        {
            return Ok(false);
        }
        tables
            .role_permissions
            .push((role_id, permission_id, Utc::now()));
        Ok(true)
    }

    async fn delete_role_permission(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<u64, ServiceError> {
        self.check("delete_role_permission")?;
        let mut tables = self.tables.write().await;
        let before = tables.role_permissions.len();
        tables
            .role_permissions
            .retain(|(r, p, _)| !(*r == role_id && *p == permission_id));
        Ok((before - tables.role_permissions.len()) as u64)
    }

    async fn find_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError> {
        self.check("find_role_permissions")?;
        let tables = self.tables.read().await;
        let permissions = tables
            .role_permissions
            .iter()
            .filter(|(r, _, _)| *r == role_id)
            .filter_map(|(_, permission_id, _)| {
                tables.permissions.iter().find(|p| p.id == *permission_id)
            })
            .cloned()
            .collect();
        Ok(permissions)
    }

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog, ServiceError> {
        self.check("insert_audit_log")?;
        let mut tables = self.tables.write().await;
        let log = AuditLog {
            id: tables.next_id(),
            user_id: entry.user_id,
            action: entry.action,
            table_name: entry.table_name,
            record_id: entry.record_id,
            old_values: entry.old_values.map(serde_json::Value::Object),
            new_values: entry.new_values.map(serde_json::Value::Object),
            created_at: entry.created_at,
        };
        tables.audit_logs.push(log.clone());
        Ok(log)
    }

    async fn find_audit_logs_by_record(
        &self,
        table_name: &str,
        record_id: i64,
    ) -> Result<Vec<AuditLog>, ServiceError> {
        self.check("find_audit_logs_by_record")?;
        let tables = self.tables.read().await;
        let mut logs: Vec<AuditLog> = tables
            .audit_logs
            .iter()
            .filter(|l| l.table_name == table_name && l.record_id == record_id)
            .cloned()
            .collect();
        newest_first(&mut logs, |l| (l.created_at, l.id));
        Ok(logs)
    }

    async fn find_audit_logs_by_user(&self, user_id: i64) -> Result<Vec<AuditLog>, ServiceError> {
        self.check("find_audit_logs_by_user")?;
        let tables = self.tables.read().await;
        let mut logs: Vec<AuditLog> = tables
            .audit_logs
            .iter()
            .filter(|l| l.user_id == Some(user_id))
            .cloned()
            .collect();
        newest_first(&mut logs, |l| (l.created_at, l.id));
        Ok(logs)
    }

    async fn insert_post(&self, post: NewPost) -> Result<Post, ServiceError> {
        self.check("insert_post")?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let post = Post {
            id: tables.next_id(),
            user_id: post.user_id,
            title: post.title,
            description: post.description,
            address: post.address,
            contact_name: post.contact_name,
            mobile_number: post.mobile_number,
            incident_date: post.incident_date,
            status: post.status,
            is_anonymous: post.is_anonymous,
            visibility: post.visibility,
            allow_comments: post.allow_comments,
            created_at: now,
            updated_at: now,
        };
        tables.posts.push(post.clone());
        Ok(post)
    }

    async fn find_post_by_id(&self, post_id: i64) -> Result<Option<Post>, ServiceError> {
        self.check("find_post_by_id")?;
        let tables = self.tables.read().await;
        Ok(tables.posts.iter().find(|p| p.id == post_id).cloned())
    }

    async fn update_post(&self, post: &Post) -> Result<Post, ServiceError> {
        self.check("update_post")?;
        let mut tables = self.tables.write().await;
        let stored = tables
            .posts
            .iter_mut()
            .find(|p| p.id == post.id)
            .ok_or_else(|| ServiceError::NotFound("Post".to_string()))?;
        *stored = Post {
            updated_at: Utc::now(),
            created_at: stored.created_at,
            ..post.clone()
        };
        Ok(stored.clone())
    }

    async fn delete_post(&self, post_id: i64) -> Result<u64, ServiceError> {
        self.check("delete_post")?;
        let mut tables = self.tables.write().await;
        let before = tables.posts.len();
        tables.posts.retain(|p| p.id != post_id);
        let removed = (before - tables.posts.len()) as u64;
        if removed > 0 {
            tables.reports.retain(|r| r.post_id != post_id);
        }
        Ok(removed)
    }

    async fn list_posts(
        &self,
        viewer: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Post>, i64), ServiceError> {
        self.check("list_posts")?;
        let tables = self.tables.read().await;
        let mut visible: Vec<Post> = tables
            .posts
            .iter()
            .filter(|p| p.is_visible_to(viewer))
            .cloned()
            .collect();
        newest_first(&mut visible, |p| (p.created_at, p.id));
        let total = visible.len() as i64;
        let page = visible
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn insert_post_history(
        &self,
        entry: NewPostHistory,
    ) -> Result<PostHistory, ServiceError> {
        self.check("insert_post_history")?;
        let mut tables = self.tables.write().await;
        let history = PostHistory {
            id: tables.next_id(),
            post_id: entry.post_id,
            user_id: entry.user_id,
            title: entry.title,
            description: entry.description,
            address: entry.address,
            contact_name: entry.contact_name,
            mobile_number: entry.mobile_number,
            incident_date: entry.incident_date,
            status: entry.status,
            is_anonymous: entry.is_anonymous,
            visibility: entry.visibility,
            allow_comments: entry.allow_comments,
            created_at: entry.created_at,
        };
        tables.post_history.push(history.clone());
        Ok(history)
    }

    async fn find_post_history(&self, post_id: i64) -> Result<Vec<PostHistory>, ServiceError> {
        self.check("find_post_history")?;
        let tables = self.tables.read().await;
        let mut history: Vec<PostHistory> = tables
            .post_history
            .iter()
            .filter(|h| h.post_id == post_id)
            .cloned()
            .collect();
        newest_first(&mut history, |h| (h.created_at, h.id));
        Ok(history)
    }

    async fn insert_report(&self, report: NewReport) -> Result<Report, ServiceError> {
        self.check("insert_report")?;
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let report = Report {
            id: tables.next_id(),
            post_id: report.post_id,
            reporter_id: report.reporter_id,
            reason: report.reason,
            status: report.status,
            created_at: now,
            updated_at: now,
        };
        tables.reports.push(report.clone());
        Ok(report)
    }

    async fn find_report_by_id(&self, report_id: i64) -> Result<Option<Report>, ServiceError> {
        self.check("find_report_by_id")?;
        let tables = self.tables.read().await;
        Ok(tables.reports.iter().find(|r| r.id == report_id).cloned())
    }

    async fn update_report_status(
        &self,
        report_id: i64,
        status: &str,
    ) -> Result<Option<Report>, ServiceError> {
        self.check("update_report_status")?;
        let mut tables = self.tables.write().await;
        Ok(tables
            .reports
            .iter_mut()
            .find(|r| r.id == report_id)
            .map(|report| {
                report.status = status.to_string();
                report.updated_at = Utc::now();
                report.clone()
            }))
    }

    async fn list_reports(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Report>, i64), ServiceError> {
        self.check("list_reports")?;
        let tables = self.tables.read().await;
        let mut reports = tables.reports.clone();
        newest_first(&mut reports, |r| (r.created_at, r.id));
        let total = reports.len() as i64;
        let page = reports
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            name: "Alice".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected() {
        let store = MemoryStore::new();
        store.insert_user_with_roles(new_user("a@x.com"), &[]).await.unwrap();
        let err = store.insert_user_with_roles(new_user("a@x.com"), &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn user_roles_keep_assignment_order() {
        let store = MemoryStore::new();
        let user = store.insert_user_with_roles(new_user("a@x.com"), &[]).await.unwrap();
        let second = store
            .insert_role(NewRole { name: "b".into(), description: String::new() })
            .await
            .unwrap();
        let first = store
            .insert_role(NewRole { name: "a".into(), description: String::new() })
            .await
            .unwrap();

        store.insert_user_role(user.id, second.id).await.unwrap();
        store.insert_user_role(user.id, first.id).await.unwrap();
        assert!(!store.insert_user_role(user.id, first.id).await.unwrap());

        let names: Vec<String> = store
            .find_user_roles(user.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn user_with_unknown_role_is_not_stored() {
        let store = MemoryStore::new();
        let role = store
            .insert_role(NewRole { name: "user".into(), description: String::new() })
            .await
            .unwrap();

        let err = store
            .insert_user_with_roles(new_user("a@x.com"), &[role.id, 999])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert!(store.find_user_by_email("a@x.com").await.unwrap().is_none());

        let user = store
            .insert_user_with_roles(new_user("a@x.com"), &[role.id])
            .await
            .unwrap();
        assert_eq!(store.find_user_roles(user.id).await.unwrap()[0].id, role.id);
    }

    #[tokio::test]
    async fn fail_on_injects_errors_until_recovered() {
        let store = MemoryStore::new();
        store.fail_on("find_user_roles");
        assert!(store.find_user_roles(1).await.is_err());
        store.recover("find_user_roles");
        assert!(store.find_user_roles(1).await.unwrap().is_empty());
    }
}
