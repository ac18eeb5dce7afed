//! Authorization policy.
//!
//! Roles are an external fact supplied with the authenticated actor; this
//! module only answers capability questions about them.
use crate::error::{Result, WorkflowError};
use crate::request::AssetRequest;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Employee,
    Manager,
    AssetAdmin,
    SuperAdmin,
}

impl Role {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "employee" => Some(Role::Employee),
            "manager" => Some(Role::Manager),
            "asset_admin" => Some(Role::AssetAdmin),
            "super_admin" => Some(Role::SuperAdmin),
            _ => None,
        }
    }
    pub fn name(self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::AssetAdmin => "asset_admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

pub const SYSTEM_ACTOR: &str = "system";

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    roles: HashSet<Role>,
    active: bool,
    system: bool,
}

impl Actor {
    pub fn new(id: &str, roles: &[Role]) -> Self {
        Self {
            id: id.to_string(),
            roles: roles.iter().copied().collect(),
            active: true,
            system: false,
        }
    }
    /// Parses role names as delivered by the identity provider; unknown names
    /// are ignored.
    pub fn from_role_names(id: &str, names: &[&str]) -> Self {
        let roles: Vec<Role> = names.iter().filter_map(|n| Role::from_name(n)).collect();
        Self::new(id, &roles)
    }
    pub fn employee(id: &str) -> Self {
        Self::new(id, &[Role::Employee])
    }
    pub fn asset_admin(id: &str) -> Self {
        Self::new(id, &[Role::Employee, Role::AssetAdmin])
    }
    /// Internal jobs acting on assets directly
    pub fn system() -> Self {
        Self {
            id: SYSTEM_ACTOR.to_string(),
            roles: HashSet::new(),
            active: true,
            system: true,
        }
    }
    pub fn deactivated(mut self) -> Self {
        self.active = false;
        self
    }
    pub fn is_active(&self) -> bool {
        self.active
    }
    pub fn is_system(&self) -> bool {
        self.system
    }
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
    pub fn is_admin(&self) -> bool {
        self.has_role(Role::AssetAdmin) || self.has_role(Role::SuperAdmin)
    }
}

pub fn can_create_request(actor: &Actor) -> bool {
    actor.active && !actor.system
}

pub fn can_view(actor: &Actor, request: &AssetRequest) -> bool {
    actor.active
        && (actor.is_admin()
            || actor.system
            || request.requester == actor.id
            || request.is_approver(&actor.id))
}

pub fn can_edit(actor: &Actor, request: &AssetRequest) -> bool {
    actor.active && request.requester == actor.id && request.status().can_edit()
}

pub fn can_cancel(actor: &Actor, request: &AssetRequest) -> bool {
    actor.active && request.requester == actor.id && request.status().can_cancel()
}

pub fn can_decide(actor: &Actor, request: &AssetRequest) -> bool {
    actor.active && request.current_approver() == Some(actor.id.as_str())
}

pub fn can_fulfill(actor: &Actor, request: &AssetRequest) -> bool {
    actor.active && actor.is_admin() && request.status().can_fulfill()
}

pub fn can_close(actor: &Actor, request: &AssetRequest) -> bool {
    actor.active
        && (actor.is_admin() || request.requester == actor.id)
        && request.status().can_close()
}

/// Direct asset operations: registration and lifecycle actions
pub fn can_manage_assets(actor: &Actor) -> bool {
    actor.active && (actor.is_admin() || actor.system)
}

/// Turns a capability answer into `Unauthorized`
pub fn ensure(actor: &Actor, allowed: bool, action: &'static str) -> Result<()> {
    if allowed {
        return Ok(());
    }
    Err(WorkflowError::Unauthorized {
        actor: actor.id.clone(),
        action,
    })
}
