//! Deletion facade consumed by delete handlers
//!
//! Wires the pieces together in the required order: authorization first,
//! then dependency resolution, then execution. A blocked plan comes back
//! as data rather than an error so handlers can render the remediation
//! payload as an actionable response.

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::authz::{can_act, Action, Actor};
use crate::database::cascade_executor::{CascadeExecutor, ExecutionReport};
use crate::database::deletion_planner::{
    BlockedDeletion, DeletionPlan, DeletionPlanner, EntityKind,
};
use crate::error::Result;

/// Parameters of one delete request, as extracted by the handler
#[derive(Debug, Clone, Copy)]
pub struct DeletionRequest {
    pub kind: EntityKind,
    pub id: Uuid,
    /// `force=true` query parameter: opt in to cascade or reassignment.
    pub force: bool,
    /// `reassignTo<Kind>Id` query parameter, if given.
    pub reassign_to: Option<Uuid>,
}

/// What a delete handler returns to the client
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum DeletionOutcome {
    Executed(ExecutionReport),
    Blocked(BlockedDeletion),
}

/// Authorization-gated deletion over the dependency graph
#[derive(Clone)]
pub struct DeletionService {
    planner: DeletionPlanner,
    executor: CascadeExecutor,
}

impl DeletionService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            planner: DeletionPlanner::new(pool.clone()),
            executor: CascadeExecutor::new(pool),
        }
    }

    /// Plan the deletion of one entity without executing it.
    pub async fn plan_deletion(&self, request: DeletionRequest) -> Result<DeletionPlan> {
        self.planner
            .plan(request.kind, request.id, request.force, request.reassign_to)
            .await
    }

    /// Execute a previously resolved plan.
    pub async fn execute_plan(&self, plan: DeletionPlan) -> Result<ExecutionReport> {
        self.executor.execute(plan).await
    }

    /// Full delete flow: authorize, resolve, execute.
    ///
    /// Authorization happens before dependency resolution and before any
    /// write. Ownership is compared against the target's `created_by`.
    pub async fn delete(&self, actor: &Actor, request: DeletionRequest) -> Result<DeletionOutcome> {
        let owner = self.planner.fetch_owner(request.kind, request.id).await?;
        can_act(actor, request.kind.resource(), Action::Delete, Some(owner))?;

        info!(
            "Actor {} deleting {} {} (force={}, reassign_to={:?})",
            actor.id, request.kind, request.id, request.force, request.reassign_to
        );

        let plan = self.plan_deletion(request).await?;
        match plan {
            DeletionPlan::Blocked(blocked) => Ok(DeletionOutcome::Blocked(blocked)),
            executable => {
                let report = self.execute_plan(executable).await?;
                Ok(DeletionOutcome::Executed(report))
            }
        }
    }
}
