//! CRM core: authorization and cascade-resolution engine
//!
//! The backbone of a multi-tenant CRM backend. Two subsystems live here:
//!
//! - **Authorization**: a closed role-based permission model
//!   ([`authz`]) with a pure evaluator, backed by a replace-as-a-unit
//!   registry ([`database::RegistryService`]).
//! - **Deletion protocol**: dependency-aware removal of entities that have
//!   active dependents ([`database::DeletionPlanner`] /
//!   [`database::CascadeExecutor`]), offering blocking with remediation
//!   data, reassignment, or a forced cascading soft-delete, each as one
//!   atomic transaction.
//!
//! Route handlers, validation, pagination, and response envelopes are
//! external collaborators; they consume this crate through
//! [`authz::can_act`] and [`database::DeletionService`].

pub mod authz;
pub mod database;
pub mod error;

pub use authz::{can_act, Action, Actor, PermissionSet, Resource, SUPER_ADMIN};
pub use database::{
    ActorResolver, BlockedDeletion, CascadeExecutor, DatabaseConfig, DatabaseManager,
    DeletionOutcome, DeletionPlan, DeletionPlanner, DeletionRequest, DeletionService,
    DependentSummary, EntityKind, ExecutionReport, RegistryService,
};
pub use error::{CrmError, ErrorKind, Result};
