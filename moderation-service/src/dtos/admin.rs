use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 50, message = "Role name is required"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 100, message = "Permission name is required"))]
    pub name: String,
    #[validate(length(min = 1, max = 50, message = "Resource is required"))]
    pub resource: String,
    #[validate(length(min = 1, max = 50, message = "Action is required"))]
    pub action: String,
    #[serde(default)]
    pub description: String,
}

/// Outcome of an assign/remove call on a join relation.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssignmentResponse {
    pub changed: bool,
    pub message: String,
}
