//! Business logic: sessions, RBAC, audit trail, post history and
//! moderation, plus the persistence seam they share.

mod admin;
mod audit;
mod auth;
pub mod bootstrap;
mod database;
pub mod error;
mod history;
mod memory_store;
pub mod post;
mod rbac;
mod store;
mod token;

pub use admin::AdminService;
pub use audit::AuditService;
pub use auth::{AuthService, ADMIN_ROLE, USERS_TABLE};
pub use database::Database;
pub use error::ServiceError;
pub use history::HistoryService;
pub use memory_store::MemoryStore;
pub use post::{merge_update, PostService, POSTS_TABLE, REPORTS_TABLE};
pub use rbac::{PermissionCache, RbacService};
pub use store::Store;
pub use token::{Claims, IssuedToken, TokenService};
