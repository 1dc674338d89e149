pub mod audit_log;
pub mod post;
pub mod role;
pub mod user;

pub use audit_log::{ActorSummary, AuditAction, AuditLog, AuditLogView, NewAuditLog, Snapshot};
pub use post::{NewPost, NewPostHistory, NewReport, Post, PostHistory, Report, ReportStatus, Visibility};
pub use role::{NewPermission, NewRole, Permission, Role};
pub use user::{NewUser, User, UserResponse};
