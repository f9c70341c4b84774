//! Permission registry service
//!
//! The registry is the persisted role → (resource, action) grant table.
//! Reads resolve a role into an immutable [`PermissionSet`] snapshot taken
//! at authentication time; writes replace a role's grant set as one unit
//! (delete everything, bulk-insert the new set, single transaction) so no
//! reader ever observes a partially-updated role.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::authz::{can_act, Action, Actor, PermissionSet, Resource, SUPER_ADMIN};
use crate::error::{CrmError, Result};

/// Resolves authenticated user ids into actor snapshots.
///
/// Session middleware depends on this seam rather than on the concrete
/// service, so tests can substitute a canned resolver.
#[async_trait]
pub trait ActorResolver: Send + Sync {
    async fn resolve_actor(&self, user_id: Uuid) -> Result<Actor>;
}

/// Database-backed permission registry
#[derive(Clone)]
pub struct RegistryService {
    pool: PgPool,
}

impl RegistryService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Load the resolved permission set for a role.
    ///
    /// Unknown resource or action strings in the table are a validation
    /// failure, not a silent deny: the closed enums are the boundary.
    pub async fn role_grants(&self, role: &str) -> Result<PermissionSet> {
        let rows = sqlx::query(
            "SELECT resource, action FROM role_permissions WHERE role = $1",
        )
        .bind(role)
        .fetch_all(&self.pool)
        .await?;

        let mut set = PermissionSet::new();
        for row in rows {
            let resource: Resource = row.get::<String, _>("resource").parse()?;
            let action: Action = row.get::<String, _>("action").parse()?;
            set.grant(resource, action);
        }
        debug!("Resolved {} grant(s) for role '{}'", set.grants().len(), role);
        Ok(set)
    }

    /// Replace a role's grant set as one atomic unit.
    ///
    /// Gated on the `roles` resource: only actors allowed to update roles
    /// (administrators) may rewrite the registry. The reserved
    /// `super_admin` role never consults the registry and cannot be edited.
    pub async fn replace_role_grants(
        &self,
        actor: &Actor,
        role: &str,
        grants: &[(Resource, Action)],
    ) -> Result<()> {
        can_act(actor, Resource::Roles, Action::Update, None)?;

        if role == SUPER_ADMIN {
            return Err(CrmError::validation(
                "the super_admin role is implicit and cannot be edited",
            ));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM role_permissions WHERE role = $1")
            .bind(role)
            .execute(&mut *tx)
            .await?;

        for (resource, action) in grants {
            sqlx::query(
                "INSERT INTO role_permissions (role, resource, action) VALUES ($1, $2, $3) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(role)
            .bind(resource.as_str())
            .bind(action.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        info!("Replaced grant set for role '{}' ({} grant(s))", role, grants.len());
        Ok(())
    }

    /// List every role present in the registry.
    pub async fn list_roles(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT DISTINCT role FROM role_permissions ORDER BY role")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|row| row.get("role")).collect())
    }
}

#[async_trait]
impl ActorResolver for RegistryService {
    /// Build the immutable actor snapshot for an active user.
    ///
    /// `super_admin` actors get an empty permission set; the evaluator
    /// never consults it for them.
    async fn resolve_actor(&self, user_id: Uuid) -> Result<Actor> {
        let row = sqlx::query("SELECT role FROM users WHERE id = $1 AND deleted_at IS NULL")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CrmError::NotFound {
                resource: Resource::Users,
                id: user_id,
            })?;

        let role: String = row.get("role");
        let permissions = if role == SUPER_ADMIN {
            PermissionSet::new()
        } else {
            self.role_grants(&role).await?
        };

        Ok(Actor::new(user_id, role, permissions))
    }
}
