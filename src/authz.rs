//! Role-based authorization for CRM resources
//!
//! Resources and actions are closed enumerations: unknown combinations are
//! rejected at the boundary when registry rows are parsed, never silently
//! treated as denied-by-default strings. The evaluator itself is a pure
//! decision function over an immutable [`Actor`] snapshot resolved at
//! authentication time.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrmError;

/// Reserved role that implicitly holds every permission and bypasses
/// ownership checks.
pub const SUPER_ADMIN: &str = "super_admin";

/// Resource kinds covered by the permission model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Companies,
    Customers,
    Leads,
    Users,
    Roles,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Companies => "companies",
            Resource::Customers => "customers",
            Resource::Leads => "leads",
            Resource::Users => "users",
            Resource::Roles => "roles",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "companies" => Ok(Resource::Companies),
            "customers" => Ok(Resource::Customers),
            "leads" => Ok(Resource::Leads),
            "users" => Ok(Resource::Users),
            "roles" => Ok(Resource::Roles),
            other => Err(CrmError::validation(format!(
                "unknown resource '{}'",
                other
            ))),
        }
    }
}

/// Actions that can be granted on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "read" => Ok(Action::Read),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(CrmError::validation(format!("unknown action '{}'", other))),
        }
    }
}

/// Resolved permission set for a role: resource -> granted actions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSet(HashMap<Resource, HashSet<Action>>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&mut self, resource: Resource, action: Action) {
        self.0.entry(resource).or_default().insert(action);
    }

    pub fn allows(&self, resource: Resource, action: Action) -> bool {
        self.0
            .get(&resource)
            .map(|actions| actions.contains(&action))
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into (resource, action) pairs, e.g. for persisting a grant set.
    pub fn grants(&self) -> Vec<(Resource, Action)> {
        let mut pairs: Vec<(Resource, Action)> = self
            .0
            .iter()
            .flat_map(|(r, actions)| actions.iter().map(|a| (*r, *a)))
            .collect();
        pairs.sort_by_key(|(r, a)| (r.as_str(), a.as_str()));
        pairs
    }
}

impl FromIterator<(Resource, Action)> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = (Resource, Action)>>(iter: I) -> Self {
        let mut set = PermissionSet::new();
        for (resource, action) in iter {
            set.grant(resource, action);
        }
        set
    }
}

/// Authenticated actor context, computed at authentication time and
/// immutable for the lifetime of the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: String,
    pub permissions: PermissionSet,
}

impl Actor {
    pub fn new(id: Uuid, role: impl Into<String>, permissions: PermissionSet) -> Self {
        Self {
            id,
            role: role.into(),
            permissions,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == SUPER_ADMIN
    }
}

/// Decide whether `actor` may perform `action` on a `resource` instance
/// owned by `owner_id`.
///
/// Decision order:
/// 1. `super_admin` is always allowed; ownership and registry content are
///    irrelevant.
/// 2. The owning actor is always allowed: creators control their own
///    records regardless of role grants.
/// 3. Otherwise the actor's resolved permission set must grant the action
///    for the resource.
///
/// Pure decision function with no side effects. Callers must evaluate it
/// before any mutating write and before dependency resolution begins.
pub fn can_act(
    actor: &Actor,
    resource: Resource,
    action: Action,
    owner_id: Option<Uuid>,
) -> Result<(), CrmError> {
    if actor.is_super_admin() {
        return Ok(());
    }
    if owner_id == Some(actor.id) {
        return Ok(());
    }
    if actor.permissions.allows(resource, action) {
        return Ok(());
    }
    Err(CrmError::Authorization { resource, action })
}
