//! Cascade execution for resolved deletion plans
//!
//! Every plan is carried out inside a single transaction: on any step's
//! failure the transaction rolls back and the original error surfaces, so a
//! partial cascade is never observable. Soft deletes only ever set
//! `deleted_at` on active rows; a row that was deleted by a concurrent
//! transaction counts as gone and maps to `NotFound`.
//!
//! Cascade ordering runs deepest-first: lead activity rows, then leads,
//! then customers, then the target itself. Activity rows are an append-only
//! audit trail and follow their lead at both cascade levels.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::deletion_planner::{BlockedDeletion, DeletionPlan, EntityKind};
use crate::error::{CrmError, Result};

/// Outcome of executing a deletion plan
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionReport {
    /// The target (and, for cascades, its descendants) was soft-deleted.
    Deleted {
        kind: EntityKind,
        id: Uuid,
        /// Rows soft-deleted, target included.
        total_removed: u64,
        deleted_at: DateTime<Utc>,
    },
    /// Dependents were moved to the target entity, then the original was
    /// soft-deleted.
    Reassigned {
        kind: EntityKind,
        id: Uuid,
        target_id: Uuid,
        reassigned: u64,
        deleted_at: DateTime<Utc>,
    },
}

/// Executes resolved deletion plans atomically
#[derive(Clone)]
pub struct CascadeExecutor {
    pool: PgPool,
}

impl CascadeExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Execute a resolved plan in one transaction.
    ///
    /// Blocked plans are not executable: they come back as a
    /// validation-kinded error carrying the remediation payload, so a
    /// handler that skipped the planning step still cannot drop dependents
    /// silently.
    pub async fn execute(&self, plan: DeletionPlan) -> Result<ExecutionReport> {
        match plan {
            DeletionPlan::Blocked(blocked) => Err(self.refuse_blocked(blocked)),
            DeletionPlan::DirectDelete { kind, id } => self.direct_delete(kind, id).await,
            DeletionPlan::Reassign {
                kind,
                id,
                target_id,
            } => self.reassign(kind, id, target_id).await,
            DeletionPlan::ForceCascade { kind, id } => self.force_cascade(kind, id).await,
        }
    }

    fn refuse_blocked(&self, blocked: BlockedDeletion) -> CrmError {
        warn!(
            "Refusing to execute blocked plan for {} {}",
            blocked.kind, blocked.id
        );
        CrmError::BlockedDelete { blocked }
    }

    async fn direct_delete(&self, kind: EntityKind, id: Uuid) -> Result<ExecutionReport> {
        let mut tx = self.pool.begin().await?;
        let deleted_at = soft_delete_target(&mut tx, kind, id).await?;
        tx.commit().await?;

        info!("Soft-deleted {} {}", kind, id);
        Ok(ExecutionReport::Deleted {
            kind,
            id,
            total_removed: 1,
            deleted_at,
        })
    }

    async fn reassign(
        &self,
        kind: EntityKind,
        id: Uuid,
        target_id: Uuid,
    ) -> Result<ExecutionReport> {
        let edge = kind.dependent_edge().ok_or_else(|| {
            CrmError::validation(format!("{} has no dependents to reassign", kind))
        })?;

        // Plans can be built by hand; the planner's invariants hold here too.
        if target_id == id {
            return Err(CrmError::validation(format!(
                "cannot reassign dependents of {} {} to itself",
                kind, id
            )));
        }

        let mut tx = self.pool.begin().await?;

        // Re-check the target inside the transaction; the planner's check
        // may have raced a concurrent delete.
        let sql = format!(
            "SELECT 1 AS one FROM {} WHERE id = $1 AND deleted_at IS NULL",
            kind.table()
        );
        let target_active = sqlx::query(&sql)
            .bind(target_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !target_active {
            return Err(CrmError::validation(format!(
                "reassignment target {} {} not found or already deleted",
                kind, target_id
            )));
        }

        let sql = format!(
            "UPDATE {} SET {} = $1 WHERE {} = $2 AND deleted_at IS NULL",
            edge.child.table(),
            edge.fk_column,
            edge.fk_column
        );
        let reassigned = sqlx::query(&sql)
            .bind(target_id)
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let deleted_at = soft_delete_target(&mut tx, kind, id).await?;
        tx.commit().await?;

        info!(
            "Reassigned {} {}(s) from {} {} to {} and soft-deleted the original",
            reassigned, edge.child, kind, id, target_id
        );
        Ok(ExecutionReport::Reassigned {
            kind,
            id,
            target_id,
            reassigned,
            deleted_at,
        })
    }

    async fn force_cascade(&self, kind: EntityKind, id: Uuid) -> Result<ExecutionReport> {
        let mut tx = self.pool.begin().await?;

        let descendants = match kind {
            EntityKind::Company => cascade_company(&mut tx, id).await?,
            EntityKind::Customer => cascade_customer(&mut tx, id).await?,
            other => {
                return Err(CrmError::validation(format!(
                    "{} has no dependents to cascade over",
                    other
                )))
            }
        };

        let deleted_at = soft_delete_target(&mut tx, kind, id).await?;
        tx.commit().await?;

        let total_removed = descendants + 1;
        info!(
            "Force-cascaded {} {}: {} row(s) soft-deleted",
            kind, id, total_removed
        );
        Ok(ExecutionReport::Deleted {
            kind,
            id,
            total_removed,
            deleted_at,
        })
    }
}

/// Soft-delete the plan's target row. Zero rows affected means a concurrent
/// delete won the race; the transaction is poisoned with `NotFound` and
/// rolls back on drop.
async fn soft_delete_target(
    tx: &mut Transaction<'_, Postgres>,
    kind: EntityKind,
    id: Uuid,
) -> Result<DateTime<Utc>> {
    let sql = format!(
        "UPDATE {} SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL \
         RETURNING deleted_at",
        kind.table()
    );
    match sqlx::query(&sql).bind(id).fetch_optional(&mut **tx).await? {
        Some(row) => Ok(row.get("deleted_at")),
        None => {
            warn!("{} {} vanished mid-transaction", kind, id);
            Err(CrmError::NotFound {
                resource: kind.resource(),
                id,
            })
        }
    }
}

/// Soft-delete every active descendant of a company: activity rows of the
/// leads about to go, those leads, then the customers. Returns the number
/// of descendant rows removed.
async fn cascade_company(tx: &mut Transaction<'_, Postgres>, company_id: Uuid) -> Result<u64> {
    let activities = sqlx::query(
        r#"
        UPDATE lead_activities SET deleted_at = NOW()
        WHERE deleted_at IS NULL
          AND lead_id IN (
              SELECT l.id FROM leads l
              JOIN customers c ON l.customer_id = c.id
              WHERE c.company_id = $1
                AND c.deleted_at IS NULL
                AND l.deleted_at IS NULL
          )
        "#,
    )
    .bind(company_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let leads = sqlx::query(
        r#"
        UPDATE leads SET deleted_at = NOW()
        WHERE deleted_at IS NULL
          AND customer_id IN (
              SELECT id FROM customers
              WHERE company_id = $1 AND deleted_at IS NULL
          )
        "#,
    )
    .bind(company_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let customers = sqlx::query(
        "UPDATE customers SET deleted_at = NOW() WHERE company_id = $1 AND deleted_at IS NULL",
    )
    .bind(company_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(activities + leads + customers)
}

/// Soft-delete every active descendant of a customer: activity rows of its
/// leads, then the leads themselves.
async fn cascade_customer(tx: &mut Transaction<'_, Postgres>, customer_id: Uuid) -> Result<u64> {
    let activities = sqlx::query(
        r#"
        UPDATE lead_activities SET deleted_at = NOW()
        WHERE deleted_at IS NULL
          AND lead_id IN (
              SELECT id FROM leads
              WHERE customer_id = $1 AND deleted_at IS NULL
          )
        "#,
    )
    .bind(customer_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    let leads = sqlx::query(
        "UPDATE leads SET deleted_at = NOW() WHERE customer_id = $1 AND deleted_at IS NULL",
    )
    .bind(customer_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();

    Ok(activities + leads)
}
