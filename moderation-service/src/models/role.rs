//! Role and permission models - the flat RBAC graph.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Role entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Permission entity. `(resource, action)` is what authorization matches on;
/// `name` is only a label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Permission {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Permission {
    pub fn grants(&self, resource: &str, action: &str) -> bool {
        self.resource == resource && self.action == action
    }
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewPermission {
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}
