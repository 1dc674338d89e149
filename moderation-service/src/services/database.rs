//! PostgreSQL implementation of `Store`.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use super::{ServiceError, Store};
use crate::models::{
    AuditLog, NewAuditLog, NewPermission, NewPost, NewPostHistory, NewReport, NewRole, NewUser,
    Permission, Post, PostHistory, Report, Role, User,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Turn a unique-constraint violation into `AlreadyExists`.
fn conflict(err: sqlx::Error, what: impl Into<String>) -> ServiceError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            ServiceError::AlreadyExists(what.into())
        }
        _ => ServiceError::Database(err),
    }
}

#[async_trait]
impl Store for Database {
    async fn health_check(&self) -> Result<(), ServiceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                ServiceError::Database(e)
            })?;
        Ok(())
    }

    // ==================== User Operations ====================

    async fn insert_user_with_roles(
        &self,
        user: NewUser,
        role_ids: &[i64],
    ) -> Result<User, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash, name, birthday)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.birthday)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict(e, "User"))?;

        for role_id in role_ids {
            sqlx::query(
                "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(created.id)
            .bind(role_id)
            .execute(&mut *tx)
            .await?;
        }

        // Dropping `tx` on any early return above rolls the user back.
        tx.commit().await?;
        Ok(created)
    }

    async fn find_user_by_id(&self, user_id: i64) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn user_exists(&self, email: &str) -> Result<bool, ServiceError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    // ==================== Role Operations ====================

    async fn insert_role(&self, role: NewRole) -> Result<Role, ServiceError> {
        sqlx::query_as::<_, Role>(
            "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING *",
        )
        .bind(&role.name)
        .bind(&role.description)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict(e, format!("Role '{}'", role.name)))
    }

    async fn find_role_by_id(&self, role_id: i64) -> Result<Option<Role>, ServiceError> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, ServiceError> {
        Ok(sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn insert_permission(
        &self,
        permission: NewPermission,
    ) -> Result<Permission, ServiceError> {
        sqlx::query_as::<_, Permission>(
            r#"
            INSERT INTO permissions (name, description, resource, action)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(&permission.name)
        .bind(&permission.description)
        .bind(&permission.resource)
        .bind(&permission.action)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict(e, format!("Permission '{}'", permission.name)))
    }

    async fn find_permission_by_id(
        &self,
        permission_id: i64,
    ) -> Result<Option<Permission>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE id = $1")
                .bind(permission_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_permission_by_name(
        &self,
        name: &str,
    ) -> Result<Option<Permission>, ServiceError> {
        Ok(
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    // ==================== Assignment Operations ====================

    async fn insert_user_role(&self, user_id: i64, role_id: i64) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_user_role(&self, user_id: i64, role_id: i64) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn find_user_roles(&self, user_id: i64) -> Result<Vec<Role>, ServiceError> {
        Ok(sqlx::query_as::<_, Role>(
            r#"
            SELECT r.* FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY ur.created_at ASC, ur.seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_role_permission(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool, ServiceError> {
        let result = sqlx::query(
            "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(role_id)
        .bind(permission_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_role_permission(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<u64, ServiceError> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(role_id)
                .bind(permission_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn find_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError> {
        Ok(sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.* FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY rp.created_at ASC, p.id ASC
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ==================== Audit Operations ====================

    async fn insert_audit_log(&self, entry: NewAuditLog) -> Result<AuditLog, ServiceError> {
        Ok(sqlx::query_as::<_, AuditLog>(
            r#"
            INSERT INTO audit_logs (user_id, action, table_name, record_id, old_values, new_values, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(entry.user_id)
        .bind(&entry.action)
        .bind(&entry.table_name)
        .bind(entry.record_id)
        .bind(entry.old_values.map(serde_json::Value::Object))
        .bind(entry.new_values.map(serde_json::Value::Object))
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_audit_logs_by_record(
        &self,
        table_name: &str,
        record_id: i64,
    ) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT * FROM audit_logs
            WHERE table_name = $1 AND record_id = $2
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .bind(table_name)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn find_audit_logs_by_user(&self, user_id: i64) -> Result<Vec<AuditLog>, ServiceError> {
        Ok(sqlx::query_as::<_, AuditLog>(
            "SELECT * FROM audit_logs WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ==================== Post Operations ====================

    async fn insert_post(&self, post: NewPost) -> Result<Post, ServiceError> {
        Ok(sqlx::query_as::<_, Post>(
            r#"
            INSERT INTO posts (user_id, title, description, address, contact_name, mobile_number,
                               incident_date, status, is_anonymous, visibility, allow_comments)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(post.user_id)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.address)
        .bind(&post.contact_name)
        .bind(&post.mobile_number)
        .bind(post.incident_date)
        .bind(&post.status)
        .bind(post.is_anonymous)
        .bind(&post.visibility)
        .bind(post.allow_comments)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_post_by_id(&self, post_id: i64) -> Result<Option<Post>, ServiceError> {
        Ok(sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = $1")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_post(&self, post: &Post) -> Result<Post, ServiceError> {
        sqlx::query_as::<_, Post>(
            r#"
            UPDATE posts
            SET title = $2, description = $3, address = $4, contact_name = $5,
                mobile_number = $6, incident_date = $7, status = $8, is_anonymous = $9,
                visibility = $10, allow_comments = $11, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(post.id)
        .bind(&post.title)
        .bind(&post.description)
        .bind(&post.address)
        .bind(&post.contact_name)
        .bind(&post.mobile_number)
        .bind(post.incident_date)
        .bind(&post.status)
        .bind(post.is_anonymous)
        .bind(&post.visibility)
        .bind(post.allow_comments)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("Post".to_string()))
    }

    async fn delete_post(&self, post_id: i64) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn list_posts(
        &self,
        viewer: Option<i64>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Post>, i64), ServiceError> {
        let posts = sqlx::query_as::<_, Post>(
            r#"
            SELECT * FROM posts
            WHERE visibility = 'public' OR user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(viewer)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM posts WHERE visibility = 'public' OR user_id = $1",
        )
        .bind(viewer)
        .fetch_one(&self.pool)
        .await?;

        Ok((posts, total))
    }

    async fn insert_post_history(
        &self,
        entry: NewPostHistory,
    ) -> Result<PostHistory, ServiceError> {
        Ok(sqlx::query_as::<_, PostHistory>(
            r#"
            INSERT INTO post_history (post_id, user_id, title, description, address, contact_name,
                                      mobile_number, incident_date, status, is_anonymous,
                                      visibility, allow_comments, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(entry.post_id)
        .bind(entry.user_id)
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(&entry.address)
        .bind(&entry.contact_name)
        .bind(&entry.mobile_number)
        .bind(entry.incident_date)
        .bind(&entry.status)
        .bind(entry.is_anonymous)
        .bind(&entry.visibility)
        .bind(entry.allow_comments)
        .bind(entry.created_at)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_post_history(&self, post_id: i64) -> Result<Vec<PostHistory>, ServiceError> {
        Ok(sqlx::query_as::<_, PostHistory>(
            "SELECT * FROM post_history WHERE post_id = $1 ORDER BY created_at DESC, id DESC",
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ==================== Report Operations ====================

    async fn insert_report(&self, report: NewReport) -> Result<Report, ServiceError> {
        Ok(sqlx::query_as::<_, Report>(
            r#"
            INSERT INTO reports (post_id, reporter_id, reason, status)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(report.post_id)
        .bind(report.reporter_id)
        .bind(&report.reason)
        .bind(&report.status)
        .fetch_one(&self.pool)
        .await?)
    }

    async fn find_report_by_id(&self, report_id: i64) -> Result<Option<Report>, ServiceError> {
        Ok(sqlx::query_as::<_, Report>("SELECT * FROM reports WHERE id = $1")
            .bind(report_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_report_status(
        &self,
        report_id: i64,
        status: &str,
    ) -> Result<Option<Report>, ServiceError> {
        Ok(sqlx::query_as::<_, Report>(
            "UPDATE reports SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(report_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn list_reports(
        &self,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Report>, i64), ServiceError> {
        let reports = sqlx::query_as::<_, Report>(
            "SELECT * FROM reports ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reports")
            .fetch_one(&self.pool)
            .await?;

        Ok((reports, total))
    }
}
