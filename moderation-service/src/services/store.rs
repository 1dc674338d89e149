//! Persistence seam shared by every service.
//!
//! `Database` talks to PostgreSQL; `MemoryStore` keeps everything in process
//! and backs the test suite and `STORE_BACKEND=memory`.

use async_trait::async_trait;

use super::ServiceError;
use crate::models::{
    AuditLog, NewAuditLog, NewPermission, NewPost, NewPostHistory, NewReport, NewRole, NewUser,
    Permission, Post, PostHistory, Report, Role, User,
};

#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    // Users
    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, ServiceError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;
    async fn user_exists(&self, email: &str) -> Result<bool, ServiceError>;
    /// Insert a user and their initial role assignments as one unit.
    async fn insert_user_with_roles(
        &self,
        user: NewUser,
        role_ids: &[i64],
    ) -> Result<User, ServiceError>;

    // Roles and permissions
    async fn insert_role(&self, role: NewRole) -> Result<Role, ServiceError>;
    async fn find_role_by_id(&self, role_id: i64) -> Result<Option<Role>, ServiceError>;
    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError>;
    async fn insert_permission(&self, permission: NewPermission)
        -> Result<Permission, ServiceError>;
    async fn find_permission_by_id(
        &self,
        permission_id: i64,
    ) -> Result<Option<Permission>, ServiceError>;
    async fn find_permission_by_name(&self, name: &str)
        -> Result<Option<Permission>, ServiceError>;

    /// Insert-or-ignore. Returns whether a row was added.
    async fn insert_user_role(&self, user_id: i64, role_id: i64) -> Result<bool, ServiceError>;
    /// Returns the number of rows removed.
    async fn delete_user_role(&self, user_id: i64, role_id: i64) -> Result<u64, ServiceError>;
    /// Roles in assignment order.
    async fn find_user_roles(&self, user_id: i64) -> Result<Vec<Role>, ServiceError>;
    async fn insert_role_permission(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool, ServiceError>;
    async fn delete_role_permission(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<u64, ServiceError>;
    async fn find_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError>;

    // Audit trail
    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog, ServiceError>;
    /// Newest first.
    async fn find_audit_logs_by_record(
        &self,
        table_name: &str,
        record_id: i64,
    ) -> Result<Vec<AuditLog>, ServiceError>;
    /// Newest first.
    async fn find_audit_logs_by_user(&self, user_id: i64) -> Result<Vec<AuditLog>, ServiceError>;

    // Posts
    async fn insert_post(&self, post: NewPost) -> Result<Post, ServiceError>;
    async fn find_post_by_id(&self, post_id: i64) -> Result<Option<Post>, ServiceError>;
    /// Persists every business field of `post` and bumps `updated_at`.
    async fn update_post(&self, post: &Post) -> Result<Post, ServiceError>;
    async fn delete_post(&self, post_id: i64) -> Result<u64, ServiceError>;
    /// Public posts plus the viewer's own, newest first, with the total count.
    async fn list_posts(
        &self,
        viewer: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Post>, i64), ServiceError>;
    async fn insert_post_history(
        &self,
        entry: NewPostHistory,
    ) -> Result<PostHistory, ServiceError>;
    /// Newest first.
    async fn find_post_history(&self, post_id: i64) -> Result<Vec<PostHistory>, ServiceError>;

    // Reports
    async fn insert_report(&self, report: NewReport) -> Result<Report, ServiceError>;
    async fn find_report_by_id(&self, report_id: i64) -> Result<Option<Report>, ServiceError>;
    async fn update_report_status(
        &self,
        report_id: i64,
        status: &str,
    ) -> Result<Option<Report>, ServiceError>;
    /// Newest first, with the total count.
    async fn list_reports(&self, offset: i64, limit: i64)
        -> Result<(Vec<Report>, i64), ServiceError>;
}
