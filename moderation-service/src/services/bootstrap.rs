//! Idempotent seeding of the built-in roles and permissions.

use super::{RbacService, ServiceError, ADMIN_ROLE};

pub const MODERATOR_ROLE: &str = "moderator";

/// `(resource, action)` pairs the router guards on.
pub const BUILTIN_PERMISSIONS: &[(&str, &str, &str)] = &[
    ("posts", "create", "Create posts"),
    ("reports", "create", "Report posts"),
    ("reports", "read", "List reports"),
    ("reports", "update", "Change report status"),
    ("audit", "read", "Read the audit trail"),
    ("roles", "manage", "Manage roles and permissions"),
];

const DEFAULT_GRANTS: &[(&str, &str)] = &[("posts", "create"), ("reports", "create")];
const MODERATOR_GRANTS: &[(&str, &str)] =
    &[("reports", "read"), ("reports", "update"), ("audit", "read")];

fn permission_name(resource: &str, action: &str) -> String {
    format!("{}:{}", resource, action)
}

async fn grant_all(
    rbac: &RbacService,
    role_name: &str,
    description: &str,
    grants: &[(&str, &str)],
) -> Result<(), ServiceError> {
    let role = rbac.ensure_role(role_name, description).await?;
    for (resource, action) in grants {
        let permission = rbac
            .ensure_permission(&permission_name(resource, action), resource, action, "")
            .await?;
        rbac.assign_permission_to_role(role.id, permission.id).await?;
    }
    Ok(())
}

pub async fn seed_defaults(rbac: &RbacService, default_role: &str) -> Result<(), ServiceError> {
    for (resource, action, description) in BUILTIN_PERMISSIONS {
        rbac.ensure_permission(&permission_name(resource, action), resource, action, description)
            .await?;
    }

    let all: Vec<(&str, &str)> = BUILTIN_PERMISSIONS
        .iter()
        .map(|(resource, action, _)| (*resource, *action))
        .collect();

    grant_all(rbac, default_role, "Default role for registered users", DEFAULT_GRANTS).await?;
    grant_all(rbac, MODERATOR_ROLE, "Report moderation", MODERATOR_GRANTS).await?;
    grant_all(rbac, ADMIN_ROLE, "Full access", &all).await?;

    tracing::info!(default_role, "Default roles and permissions seeded");
    Ok(())
}
