//! Permission registry integration tests
//!
//! Covers grant-set resolution into actor snapshots, the atomic
//! replace-as-a-unit update path, and boundary rejection of unknown
//! resource/action strings.
//!
//! Run with: cargo test --test registry --features pg-tests
#![cfg(feature = "pg-tests")]

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crm_core::{
    Action, Actor, ActorResolver, ErrorKind, PermissionSet, RegistryService, Resource,
    SUPER_ADMIN,
};

async fn create_user(pool: &PgPool, role: &str) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO users (id, name, email, role, created_by) VALUES ($1, $2, $3, $4, $1)",
    )
    .bind(id)
    .bind(format!("user-{}", id))
    .bind(format!("{}@example.com", id))
    .bind(role)
    .execute(pool)
    .await?;
    Ok(id)
}

fn admin_actor() -> Actor {
    Actor::new(Uuid::new_v4(), SUPER_ADMIN, PermissionSet::new())
}

#[sqlx::test]
async fn replace_and_resolve_round_trip(pool: PgPool) -> Result<()> {
    let registry = RegistryService::new(pool.clone());
    let admin = admin_actor();

    registry
        .replace_role_grants(
            &admin,
            "sales_rep",
            &[
                (Resource::Leads, Action::Create),
                (Resource::Leads, Action::Read),
                (Resource::Customers, Action::Read),
            ],
        )
        .await?;

    let grants = registry.role_grants("sales_rep").await?;
    assert!(grants.allows(Resource::Leads, Action::Create));
    assert!(grants.allows(Resource::Customers, Action::Read));
    assert!(!grants.allows(Resource::Customers, Action::Delete));

    // A second replace is a full rewrite, not a merge.
    registry
        .replace_role_grants(&admin, "sales_rep", &[(Resource::Leads, Action::Read)])
        .await?;
    let grants = registry.role_grants("sales_rep").await?;
    assert!(grants.allows(Resource::Leads, Action::Read));
    assert!(!grants.allows(Resource::Leads, Action::Create));
    assert!(!grants.allows(Resource::Customers, Action::Read));
    Ok(())
}

#[sqlx::test]
async fn replace_requires_role_update_permission(pool: PgPool) -> Result<()> {
    let registry = RegistryService::new(pool.clone());

    let unprivileged = Actor::new(Uuid::new_v4(), "sales_rep", PermissionSet::new());
    let err = registry
        .replace_role_grants(&unprivileged, "support", &[(Resource::Leads, Action::Read)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    // A non-admin role holding the roles/update grant is enough.
    let role_manager = Actor::new(
        Uuid::new_v4(),
        "role_manager",
        [(Resource::Roles, Action::Update)].into_iter().collect(),
    );
    registry
        .replace_role_grants(&role_manager, "support", &[(Resource::Leads, Action::Read)])
        .await?;
    assert!(registry
        .role_grants("support")
        .await?
        .allows(Resource::Leads, Action::Read));
    Ok(())
}

#[sqlx::test]
async fn reserved_role_cannot_be_edited(pool: PgPool) -> Result<()> {
    let registry = RegistryService::new(pool.clone());
    let err = registry
        .replace_role_grants(&admin_actor(), SUPER_ADMIN, &[(Resource::Leads, Action::Read)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}

#[sqlx::test]
async fn list_roles_reflects_the_registry(pool: PgPool) -> Result<()> {
    let registry = RegistryService::new(pool.clone());
    let admin = admin_actor();

    assert!(registry.list_roles().await?.is_empty());

    registry
        .replace_role_grants(&admin, "support", &[(Resource::Customers, Action::Read)])
        .await?;
    registry
        .replace_role_grants(&admin, "sales_rep", &[(Resource::Leads, Action::Read)])
        .await?;

    assert_eq!(registry.list_roles().await?, vec!["sales_rep", "support"]);
    Ok(())
}

#[sqlx::test]
async fn resolve_actor_builds_the_snapshot(pool: PgPool) -> Result<()> {
    let registry = RegistryService::new(pool.clone());
    registry
        .replace_role_grants(&admin_actor(), "support", &[(Resource::Customers, Action::Read)])
        .await?;

    let user = create_user(&pool, "support").await?;
    let actor = registry.resolve_actor(user).await?;
    assert_eq!(actor.id, user);
    assert_eq!(actor.role, "support");
    assert!(actor.permissions.allows(Resource::Customers, Action::Read));

    // super_admin never consults the registry; the snapshot is empty.
    let root = create_user(&pool, SUPER_ADMIN).await?;
    let actor = registry.resolve_actor(root).await?;
    assert!(actor.is_super_admin());
    assert!(actor.permissions.is_empty());
    Ok(())
}

#[sqlx::test]
async fn resolve_actor_rejects_missing_or_deleted_users(pool: PgPool) -> Result<()> {
    let registry = RegistryService::new(pool.clone());

    let err = registry.resolve_actor(Uuid::new_v4()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let user = create_user(&pool, "support").await?;
    sqlx::query("UPDATE users SET deleted_at = NOW() WHERE id = $1")
        .bind(user)
        .execute(&pool)
        .await?;
    let err = registry.resolve_actor(user).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[sqlx::test]
async fn unknown_registry_rows_fail_at_the_boundary(pool: PgPool) -> Result<()> {
    // Rows written around the service (e.g. by hand) with unknown names
    // surface as validation failures when loaded, not as silent denies.
    sqlx::query("INSERT INTO role_permissions (role, resource, action) VALUES ($1, $2, $3)")
        .bind("legacy")
        .bind("invoices")
        .bind("read")
        .execute(&pool)
        .await?;

    let registry = RegistryService::new(pool.clone());
    let err = registry.role_grants("legacy").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    Ok(())
}
