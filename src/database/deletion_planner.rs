//! Deletion planning with dependency resolution
//!
//! Before an entity is removed, the planner discovers its active dependents
//! through the dependency-graph description below and classifies the
//! situation into a [`DeletionPlan`]: a trivial direct delete, a blocked
//! delete carrying remediation data, a reassignment of dependents to a
//! surviving entity, or a forced cascade over the whole subtree.
//!
//! Both parent/child relationships of the schema (Company→Customer via
//! `company_id`, Customer→Lead via `customer_id`) run through the same
//! generic path; nothing here is specific to one pair of tables.

use serde::Serialize;
use sqlx::{PgPool, Row};
use std::fmt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::authz::Resource;
use crate::error::{CrmError, Result};

/// How many dependents a blocked-deletion response lists as a sample.
pub const BLOCKED_SAMPLE_LIMIT: i64 = 5;

/// Entity kinds that participate in the deletion protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Company,
    Customer,
    Lead,
    User,
}

impl EntityKind {
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Company => "companies",
            EntityKind::Customer => "customers",
            EntityKind::Lead => "leads",
            EntityKind::User => "users",
        }
    }

    /// Column used when listing sample dependents in a blocked response.
    pub fn display_column(&self) -> &'static str {
        match self {
            EntityKind::Lead => "title",
            _ => "name",
        }
    }

    /// The permission-model resource guarding this kind.
    pub fn resource(&self) -> Resource {
        match self {
            EntityKind::Company => Resource::Companies,
            EntityKind::Customer => Resource::Customers,
            EntityKind::Lead => Resource::Leads,
            EntityKind::User => Resource::Users,
        }
    }

    /// Query parameter a caller passes to reassign dependents away from an
    /// entity of this kind before deleting it.
    pub fn reassign_param(&self) -> Option<&'static str> {
        self.dependent_edge().map(|edge| edge.reassign_param)
    }

    /// Outgoing dependency edge, if deleting this kind can strand children.
    pub fn dependent_edge(&self) -> Option<&'static DependencyEdge> {
        match self {
            EntityKind::Company => Some(&COMPANY_CUSTOMERS),
            EntityKind::Customer => Some(&CUSTOMER_LEADS),
            EntityKind::Lead | EntityKind::User => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Company => "company",
            EntityKind::Customer => "customer",
            EntityKind::Lead => "lead",
            EntityKind::User => "user",
        };
        f.write_str(name)
    }
}

/// A directed parent→child relationship that must be resolved before the
/// parent can be deleted while active children exist.
#[derive(Debug)]
pub struct DependencyEdge {
    pub parent: EntityKind,
    pub child: EntityKind,
    /// Foreign key on the child table pointing at the parent.
    pub fk_column: &'static str,
    /// Query parameter naming a reassignment target of the parent kind.
    pub reassign_param: &'static str,
}

pub static COMPANY_CUSTOMERS: DependencyEdge = DependencyEdge {
    parent: EntityKind::Company,
    child: EntityKind::Customer,
    fk_column: "company_id",
    reassign_param: "reassignToCompanyId",
};

pub static CUSTOMER_LEADS: DependencyEdge = DependencyEdge {
    parent: EntityKind::Customer,
    child: EntityKind::Lead,
    fk_column: "customer_id",
    reassign_param: "reassignToCustomerId",
};

/// Summary of one dependent shown in a blocked-deletion response
#[derive(Debug, Clone, Serialize)]
pub struct DependentSummary {
    pub id: Uuid,
    pub label: String,
}

/// Remediation payload for a deletion blocked by active dependents
#[derive(Debug, Clone, Serialize)]
pub struct BlockedDeletion {
    pub kind: EntityKind,
    pub id: Uuid,
    pub total_dependents: i64,
    /// Up to [`BLOCKED_SAMPLE_LIMIT`] of the blocking dependents.
    pub dependents: Vec<DependentSummary>,
    /// The two available strategies, spelled out for the caller.
    pub remediation: [String; 2],
}

/// Resolved deletion strategy for one entity
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DeletionPlan {
    /// No active dependents: soft-delete the target and nothing else.
    DirectDelete { kind: EntityKind, id: Uuid },
    /// Active dependents exist and no strategy was chosen.
    Blocked(BlockedDeletion),
    /// Move every active dependent to `target_id`, then soft-delete the target.
    Reassign {
        kind: EntityKind,
        id: Uuid,
        target_id: Uuid,
    },
    /// Soft-delete the target and every active descendant.
    ForceCascade { kind: EntityKind, id: Uuid },
}

/// Classification of a deletion before target- and DB-level validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Direct,
    Blocked,
    Reassign(Uuid),
    Cascade,
}

/// Pure classification rule: dependents × force × reassignment target.
///
/// A reassignment target without `force` still blocks; `force=true` is the
/// explicit opt-in for either destructive strategy.
fn classify(dependent_count: i64, force: bool, reassign_to: Option<Uuid>) -> Strategy {
    if dependent_count == 0 {
        return Strategy::Direct;
    }
    if !force {
        return Strategy::Blocked;
    }
    match reassign_to {
        Some(target) => Strategy::Reassign(target),
        None => Strategy::Cascade,
    }
}

/// Dependency graph resolver over the live schema
#[derive(Clone)]
pub struct DeletionPlanner {
    pool: PgPool,
}

impl DeletionPlanner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Resolve the deletion of one entity into a [`DeletionPlan`].
    ///
    /// The target must exist and be active. Kinds without an outgoing
    /// dependency edge (leads, users) always resolve to a direct delete.
    pub async fn plan(
        &self,
        kind: EntityKind,
        id: Uuid,
        force: bool,
        reassign_to: Option<Uuid>,
    ) -> Result<DeletionPlan> {
        self.ensure_active(kind, id).await?;

        let edge = match kind.dependent_edge() {
            Some(edge) => edge,
            None => {
                debug!("{} {} has no dependency edge, direct delete", kind, id);
                return Ok(DeletionPlan::DirectDelete { kind, id });
            }
        };

        let dependent_count = self.count_active_dependents(edge, id).await?;
        debug!(
            "{} {} has {} active dependent {}(s)",
            kind, id, dependent_count, edge.child
        );

        match classify(dependent_count, force, reassign_to) {
            Strategy::Direct => Ok(DeletionPlan::DirectDelete { kind, id }),
            Strategy::Blocked => {
                let blocked = self.blocked_response(edge, id, dependent_count).await?;
                info!(
                    "Deletion of {} {} blocked by {} dependent(s)",
                    kind, id, dependent_count
                );
                Ok(DeletionPlan::Blocked(blocked))
            }
            Strategy::Reassign(target_id) => {
                self.validate_reassign_target(kind, id, target_id).await?;
                Ok(DeletionPlan::Reassign {
                    kind,
                    id,
                    target_id,
                })
            }
            Strategy::Cascade => Ok(DeletionPlan::ForceCascade { kind, id }),
        }
    }

    /// Fetch the owning actor id of an active entity.
    pub async fn fetch_owner(&self, kind: EntityKind, id: Uuid) -> Result<Uuid> {
        let sql = format!(
            "SELECT created_by FROM {} WHERE id = $1 AND deleted_at IS NULL",
            kind.table()
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(CrmError::NotFound {
                resource: kind.resource(),
                id,
            })?;
        Ok(row.get("created_by"))
    }

    async fn ensure_active(&self, kind: EntityKind, id: Uuid) -> Result<()> {
        let sql = format!(
            "SELECT 1 AS one FROM {} WHERE id = $1 AND deleted_at IS NULL",
            kind.table()
        );
        sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(|_| ())
            .ok_or(CrmError::NotFound {
                resource: kind.resource(),
                id,
            })
    }

    async fn count_active_dependents(
        &self,
        edge: &DependencyEdge,
        parent_id: Uuid,
    ) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS count FROM {} WHERE {} = $1 AND deleted_at IS NULL",
            edge.child.table(),
            edge.fk_column
        );
        let row = sqlx::query(&sql).bind(parent_id).fetch_one(&self.pool).await?;
        Ok(row.get("count"))
    }

    async fn blocked_response(
        &self,
        edge: &DependencyEdge,
        parent_id: Uuid,
        total: i64,
    ) -> Result<BlockedDeletion> {
        let sql = format!(
            "SELECT id, {} AS label FROM {} WHERE {} = $1 AND deleted_at IS NULL \
             ORDER BY created_at, id LIMIT {}",
            edge.child.display_column(),
            edge.child.table(),
            edge.fk_column,
            BLOCKED_SAMPLE_LIMIT
        );
        let rows = sqlx::query(&sql).bind(parent_id).fetch_all(&self.pool).await?;
        let dependents = rows
            .into_iter()
            .map(|row| DependentSummary {
                id: row.get("id"),
                label: row.get("label"),
            })
            .collect();

        Ok(BlockedDeletion {
            kind: edge.parent,
            id: parent_id,
            total_dependents: total,
            dependents,
            remediation: remediation_options(edge),
        })
    }

    async fn validate_reassign_target(
        &self,
        kind: EntityKind,
        id: Uuid,
        target_id: Uuid,
    ) -> Result<()> {
        if target_id == id {
            return Err(CrmError::validation(format!(
                "cannot reassign dependents of {} {} to itself",
                kind, id
            )));
        }
        let sql = format!(
            "SELECT 1 AS one FROM {} WHERE id = $1 AND deleted_at IS NULL",
            kind.table()
        );
        let found = sqlx::query(&sql)
            .bind(target_id)
            .fetch_optional(&self.pool)
            .await?;
        if found.is_none() {
            return Err(CrmError::validation(format!(
                "reassignment target {} {} not found or already deleted",
                kind, target_id
            )));
        }
        Ok(())
    }
}

/// The two literal remediation strings a blocked response carries.
fn remediation_options(edge: &DependencyEdge) -> [String; 2] {
    [
        format!(
            "Pass force=true to soft-delete this {} together with all of its dependent records",
            edge.parent
        ),
        format!(
            "Pass force=true&{}=<id> to move its dependents to another {} before deletion",
            edge.reassign_param, edge.parent
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_dependents_is_always_direct() {
        assert_eq!(classify(0, false, None), Strategy::Direct);
        assert_eq!(classify(0, true, None), Strategy::Direct);
        assert_eq!(classify(0, true, Some(Uuid::new_v4())), Strategy::Direct);
    }

    #[test]
    fn dependents_without_force_block() {
        assert_eq!(classify(3, false, None), Strategy::Blocked);
        // A target without force is not an opt-in; it still blocks.
        assert_eq!(classify(3, false, Some(Uuid::new_v4())), Strategy::Blocked);
    }

    #[test]
    fn force_picks_cascade_or_reassign() {
        assert_eq!(classify(1, true, None), Strategy::Cascade);

        let target = Uuid::new_v4();
        assert_eq!(classify(1, true, Some(target)), Strategy::Reassign(target));
    }

    #[test]
    fn remediation_names_both_strategies() {
        let [cascade, reassign] = remediation_options(&COMPANY_CUSTOMERS);
        assert!(cascade.contains("force=true"));
        assert!(reassign.contains("force=true&reassignToCompanyId=<id>"));

        let [_, reassign] = remediation_options(&CUSTOMER_LEADS);
        assert!(reassign.contains("reassignToCustomerId"));
    }

    #[test]
    fn edges_cover_the_two_relationships() {
        let edge = EntityKind::Company.dependent_edge().unwrap();
        assert_eq!(edge.child, EntityKind::Customer);
        assert_eq!(edge.fk_column, "company_id");

        let edge = EntityKind::Customer.dependent_edge().unwrap();
        assert_eq!(edge.child, EntityKind::Lead);
        assert_eq!(edge.fk_column, "customer_id");

        assert!(EntityKind::Lead.dependent_edge().is_none());
        assert!(EntityKind::User.dependent_edge().is_none());
    }

    #[test]
    fn kind_metadata_is_consistent() {
        assert_eq!(EntityKind::Company.table(), "companies");
        assert_eq!(EntityKind::Lead.display_column(), "title");
        assert_eq!(EntityKind::Customer.display_column(), "name");
        assert_eq!(
            EntityKind::Company.reassign_param(),
            Some("reassignToCompanyId")
        );
        assert_eq!(EntityKind::Lead.reassign_param(), None);
    }
}
