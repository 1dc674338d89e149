//! Audit log model - append-only record of every mutation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Field set captured before or after a mutation.
pub type Snapshot = serde_json::Map<String, serde_json::Value>;

/// Known audit action tags. The column itself is free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    CreateReport,
    UpdateReportStatus,
    ViewProfile,
    CreateRole,
    CreatePermission,
    AssignRole,
    RemoveRole,
    GrantPermission,
    RevokePermission,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::CreateReport => "create_report",
            AuditAction::UpdateReportStatus => "update_report_status",
            AuditAction::ViewProfile => "view_profile",
            AuditAction::CreateRole => "create_role",
            AuditAction::CreatePermission => "create_permission",
            AuditAction::AssignRole => "assign_role",
            AuditAction::RemoveRole => "remove_role",
            AuditAction::GrantPermission => "grant_permission",
            AuditAction::RevokePermission => "revoke_permission",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub table_name: String,
    pub record_id: i64,
    pub old_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Entry about to be appended.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub user_id: Option<i64>,
    pub action: String,
    pub table_name: String,
    pub record_id: i64,
    pub old_values: Option<Snapshot>,
    pub new_values: Option<Snapshot>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActorSummary {
    pub id: i64,
    pub username: String,
    pub name: String,
}

/// Audit entry with its actor resolved, as returned by the query endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogView {
    #[serde(flatten)]
    pub entry: AuditLog,
    pub actor: Option<ActorSummary>,
}
