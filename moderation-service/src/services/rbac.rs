//! Role-based access control over the flat role -> permission graph.
//!
//! Permissions are granted to roles and roles to users. A user may do
//! `(resource, action)` iff any of their roles carries a permission with
//! exactly that pair.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::{ServiceError, Store};
use crate::models::{NewPermission, NewRole, Permission, Role};

#[derive(Debug, Clone, Default)]
struct ResolvedGrants {
    role_ids: HashSet<i64>,
    grants: HashSet<(String, String)>,
}

impl ResolvedGrants {
    fn allows(&self, resource: &str, action: &str) -> bool {
        self.grants
            .iter()
            .any(|(r, a)| r == resource && a == action)
    }
}

struct CacheEntry {
    resolved: ResolvedGrants,
    expires_at: Instant,
}

/// Short-lived per-user cache of resolved grants.
///
/// Every invalidation bumps `generation`; a resolution that started before
/// an invalidation is not stored.
pub struct PermissionCache {
    ttl: Duration,
    entries: DashMap<i64, CacheEntry>,
    generation: AtomicU64,
}

impl PermissionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    fn get(&self, user_id: i64) -> Option<ResolvedGrants> {
        let hit = self.entries.get(&user_id).and_then(|entry| {
            (entry.expires_at > Instant::now()).then(|| entry.resolved.clone())
        });
        if hit.is_none() {
            self.entries.remove_if(&user_id, |_, e| e.expires_at <= Instant::now());
        }
        hit
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn put(&self, user_id: i64, resolved: ResolvedGrants, seen_generation: u64) {
        if self.generation() != seen_generation {
            return;
        }
        self.entries.insert(
            user_id,
            CacheEntry {
                resolved,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate_user(&self, user_id: i64) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(&user_id);
    }

    pub fn invalidate_role(&self, role_id: i64) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries
            .retain(|_, entry| !entry.resolved.role_ids.contains(&role_id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone)]
pub struct RbacService {
    store: Arc<dyn Store>,
    cache: Option<Arc<PermissionCache>>,
}

impl RbacService {
    /// `cache_ttl` of zero disables caching; every check then reads the store.
    pub fn new(store: Arc<dyn Store>, cache_ttl: Duration) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| Arc::new(PermissionCache::new(cache_ttl)));
        Self { store, cache }
    }

    pub fn cache(&self) -> Option<&PermissionCache> {
        self.cache.as_deref()
    }

    /// Roles of `user_id` in assignment order.
    pub async fn get_user_roles(&self, user_id: i64) -> Result<Vec<Role>, ServiceError> {
        self.store.find_user_roles(user_id).await
    }

    pub async fn get_role_permissions(&self, role_id: i64) -> Result<Vec<Permission>, ServiceError> {
        let mut seen = HashSet::new();
        let permissions = self
            .store
            .find_role_permissions(role_id)
            .await?
            .into_iter()
            .filter(|p| seen.insert(p.id))
            .collect();
        Ok(permissions)
    }

    async fn resolve(&self, user_id: i64) -> Result<ResolvedGrants, ServiceError> {
        let mut resolved = ResolvedGrants::default();
        for role in self.store.find_user_roles(user_id).await? {
            for permission in self.store.find_role_permissions(role.id).await? {
                resolved
                    .grants
                    .insert((permission.resource, permission.action));
            }
            resolved.role_ids.insert(role.id);
        }
        Ok(resolved)
    }

    /// Whether any of the user's roles grants exactly `(resource, action)`.
    /// Store failures are returned as errors, never as a denial.
    #[tracing::instrument(skip(self))]
    pub async fn check_permission(
        &self,
        user_id: i64,
        resource: &str,
        action: &str,
    ) -> Result<bool, ServiceError> {
        let resolved = match &self.cache {
            Some(cache) => match cache.get(user_id) {
                Some(hit) => hit,
                None => {
                    let generation = cache.generation();
                    let resolved = self.resolve(user_id).await?;
                    cache.put(user_id, resolved.clone(), generation);
                    resolved
                }
            },
            None => self.resolve(user_id).await?,
        };

        let allowed = resolved.allows(resource, action);
        metrics::counter!(
            "rbac_checks_total",
            "result" => if allowed { "allow" } else { "deny" }
        )
        .increment(1);
        tracing::debug!(allowed, "Permission check");
        Ok(allowed)
    }

    // ==================== Administration ====================

    pub async fn create_role(&self, name: &str, description: &str) -> Result<Role, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::Validation("role name is required".to_string()));
        }
        let role = self
            .store
            .insert_role(NewRole {
                name: name.to_string(),
                description: description.to_string(),
            })
            .await?;
        tracing::info!(role_id = role.id, role = %role.name, "Role created");
        Ok(role)
    }

    pub async fn create_permission(
        &self,
        name: &str,
        resource: &str,
        action: &str,
        description: &str,
    ) -> Result<Permission, ServiceError> {
        if name.trim().is_empty() || resource.trim().is_empty() || action.trim().is_empty() {
            return Err(ServiceError::Validation(
                "permission name, resource and action are required".to_string(),
            ));
        }
        let permission = self
            .store
            .insert_permission(NewPermission {
                name: name.to_string(),
                description: description.to_string(),
                resource: resource.to_string(),
                action: action.to_string(),
            })
            .await?;
        tracing::info!(permission_id = permission.id, permission = %permission.name, "Permission created");
        Ok(permission)
    }

    /// Find a role by name, creating it when absent.
    pub async fn ensure_role(&self, name: &str, description: &str) -> Result<Role, ServiceError> {
        if let Some(role) = self.store.find_role_by_name(name).await? {
            return Ok(role);
        }
        match self.create_role(name, description).await {
            // Lost a race with a concurrent creator.
            Err(ServiceError::AlreadyExists(_)) => self
                .store
                .find_role_by_name(name)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Role '{}'", name))),
            other => other,
        }
    }

    pub async fn ensure_permission(
        &self,
        name: &str,
        resource: &str,
        action: &str,
        description: &str,
    ) -> Result<Permission, ServiceError> {
        if let Some(permission) = self.store.find_permission_by_name(name).await? {
            return Ok(permission);
        }
        match self
            .create_permission(name, resource, action, description)
            .await
        {
            Err(ServiceError::AlreadyExists(_)) => self
                .store
                .find_permission_by_name(name)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Permission '{}'", name))),
            other => other,
        }
    }

    /// Assign a role. Assigning an already-held role is a no-op; returns
    /// whether a new assignment was made.
    pub async fn assign_role_to_user(&self, user_id: i64, role_id: i64) -> Result<bool, ServiceError> {
        if self.store.find_user_by_id(user_id).await?.is_none() {
            return Err(ServiceError::NotFound("User".to_string()));
        }
        if self.store.find_role_by_id(role_id).await?.is_none() {
            return Err(ServiceError::NotFound("Role".to_string()));
        }
        let added = self.store.insert_user_role(user_id, role_id).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_user(user_id);
        }
        tracing::info!(user_id, role_id, added, "Role assigned to user");
        Ok(added)
    }

    /// Remove a role. Removing an assignment that does not exist succeeds
    /// and returns 0.
    pub async fn remove_role_from_user(&self, user_id: i64, role_id: i64) -> Result<u64, ServiceError> {
        let removed = self.store.delete_user_role(user_id, role_id).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_user(user_id);
        }
        tracing::info!(user_id, role_id, removed, "Role removed from user");
        Ok(removed)
    }

    pub async fn assign_permission_to_role(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<bool, ServiceError> {
        if self.store.find_role_by_id(role_id).await?.is_none() {
            return Err(ServiceError::NotFound("Role".to_string()));
        }
        if self.store.find_permission_by_id(permission_id).await?.is_none() {
            return Err(ServiceError::NotFound("Permission".to_string()));
        }
        let added = self
            .store
            .insert_role_permission(role_id, permission_id)
            .await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_role(role_id);
        }
        tracing::info!(role_id, permission_id, added, "Permission granted to role");
        Ok(added)
    }

    pub async fn remove_permission_from_role(
        &self,
        role_id: i64,
        permission_id: i64,
    ) -> Result<u64, ServiceError> {
        let removed = self
            .store
            .delete_role_permission(role_id, permission_id)
            .await?;
        if let Some(cache) = &self.cache {
            cache.invalidate_role(role_id);
        }
        tracing::info!(role_id, permission_id, removed, "Permission revoked from role");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::services::MemoryStore;
    use chrono::NaiveDate;

    async fn setup(cache_ttl: Duration) -> (Arc<MemoryStore>, RbacService, i64) {
        let store = Arc::new(MemoryStore::new());
        let rbac = RbacService::new(store.clone(), cache_ttl);
        let user = store
            .insert_user_with_roles(
                NewUser {
                    username: "mod".to_string(),
                    email: "mod@x.com".to_string(),
                    password_hash: "hash".to_string(),
                    name: "Mod".to_string(),
                    birthday: NaiveDate::from_ymd_opt(1985, 5, 5).unwrap(),
                },
                &[],
            )
            .await
            .unwrap();
        (store, rbac, user.id)
    }

    #[tokio::test]
    async fn user_without_roles_is_denied_everything() {
        let (_store, rbac, user_id) = setup(Duration::ZERO).await;

        for (resource, action) in [("posts", "create"), ("reports", "update"), ("", "")] {
            assert!(!rbac.check_permission(user_id, resource, action).await.unwrap());
        }
        assert!(rbac.get_user_roles(user_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn moderator_can_update_but_not_delete_reports() {
        let (_store, rbac, user_id) = setup(Duration::ZERO).await;
        let role = rbac.create_role("moderator", "Moderates reports").await.unwrap();
        let permission = rbac
            .create_permission("reports:update", "reports", "update", "")
            .await
            .unwrap();
        rbac.assign_permission_to_role(role.id, permission.id).await.unwrap();
        rbac.assign_role_to_user(user_id, role.id).await.unwrap();

        assert!(rbac.check_permission(user_id, "reports", "update").await.unwrap());
        assert!(!rbac.check_permission(user_id, "reports", "delete").await.unwrap());
        assert!(!rbac.check_permission(user_id, "Reports", "update").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_grant_is_listed_once() {
        let (_store, rbac, _) = setup(Duration::ZERO).await;
        let role = rbac.create_role("editor", "").await.unwrap();
        let permission = rbac
            .create_permission("posts:create", "posts", "create", "")
            .await
            .unwrap();

        assert!(rbac.assign_permission_to_role(role.id, permission.id).await.unwrap());
        assert!(!rbac.assign_permission_to_role(role.id, permission.id).await.unwrap());

        let permissions = rbac.get_role_permissions(role.id).await.unwrap();
        assert_eq!(permissions.len(), 1);
        assert_eq!(permissions[0].id, permission.id);
    }

    #[tokio::test]
    async fn removing_absent_assignment_succeeds_repeatedly() {
        let (_store, rbac, user_id) = setup(Duration::ZERO).await;
        let role = rbac.create_role("viewer", "").await.unwrap();

        assert_eq!(rbac.remove_role_from_user(user_id, role.id).await.unwrap(), 0);
        assert_eq!(rbac.remove_role_from_user(user_id, role.id).await.unwrap(), 0);
        assert_eq!(rbac.remove_permission_from_role(role.id, 9999).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn assigning_unknown_role_or_permission_is_not_found() {
        let (_store, rbac, user_id) = setup(Duration::ZERO).await;
        let role = rbac.create_role("viewer", "").await.unwrap();

        assert!(matches!(
            rbac.assign_role_to_user(user_id, 9999).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            rbac.assign_role_to_user(9999, role.id).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
        assert!(matches!(
            rbac.assign_permission_to_role(role.id, 9999).await.unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn duplicate_role_name_already_exists() {
        let (_store, rbac, _) = setup(Duration::ZERO).await;
        rbac.create_role("admin", "").await.unwrap();
        assert!(matches!(
            rbac.create_role("admin", "").await.unwrap_err(),
            ServiceError::AlreadyExists(_)
        ));
        let again = rbac.ensure_role("admin", "").await.unwrap();
        assert_eq!(again.name, "admin");
    }

    #[tokio::test]
    async fn store_failure_is_an_error_not_a_denial() {
        let (store, rbac, user_id) = setup(Duration::ZERO).await;
        store.fail_on("find_user_roles");

        let err = rbac.check_permission(user_id, "posts", "create").await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[tokio::test]
    async fn permissions_union_across_roles() {
        let (_store, rbac, user_id) = setup(Duration::ZERO).await;
        let reader = rbac.create_role("reader", "").await.unwrap();
        let writer = rbac.create_role("writer", "").await.unwrap();
        let read = rbac.create_permission("reports:read", "reports", "read", "").await.unwrap();
        let create = rbac.create_permission("posts:create", "posts", "create", "").await.unwrap();
        rbac.assign_permission_to_role(reader.id, read.id).await.unwrap();
        rbac.assign_permission_to_role(writer.id, create.id).await.unwrap();
        rbac.assign_role_to_user(user_id, writer.id).await.unwrap();
        rbac.assign_role_to_user(user_id, reader.id).await.unwrap();

        assert!(rbac.check_permission(user_id, "reports", "read").await.unwrap());
        assert!(rbac.check_permission(user_id, "posts", "create").await.unwrap());

        let roles: Vec<String> = rbac
            .get_user_roles(user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(roles, vec!["writer", "reader"]);
    }

    #[tokio::test]
    async fn cache_is_invalidated_by_revoke_and_removal() {
        let (store, rbac, user_id) = setup(Duration::from_secs(60)).await;
        let role = rbac.create_role("moderator", "").await.unwrap();
        let update = rbac.create_permission("reports:update", "reports", "update", "").await.unwrap();
        rbac.assign_permission_to_role(role.id, update.id).await.unwrap();
        rbac.assign_role_to_user(user_id, role.id).await.unwrap();

        assert!(rbac.check_permission(user_id, "reports", "update").await.unwrap());
        assert_eq!(rbac.cache().map(|c| c.len()), Some(1));

        // Served from cache even though the store is now failing.
        store.fail_on("find_user_roles");
        assert!(rbac.check_permission(user_id, "reports", "update").await.unwrap());
        store.recover("find_user_roles");

        rbac.remove_permission_from_role(role.id, update.id).await.unwrap();
        assert_eq!(rbac.cache().map(|c| c.len()), Some(0));
        assert!(!rbac.check_permission(user_id, "reports", "update").await.unwrap());

        rbac.assign_permission_to_role(role.id, update.id).await.unwrap();
        assert!(rbac.check_permission(user_id, "reports", "update").await.unwrap());
        rbac.remove_role_from_user(user_id, role.id).await.unwrap();
        assert!(!rbac.check_permission(user_id, "reports", "update").await.unwrap());
    }
}
