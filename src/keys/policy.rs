use std::collections::HashSet;

use async_trait::async_trait;
use thiserror::Error;

/// key: public-key-actor
/// Authenticated identity acting on keys, with the roles it was granted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub id: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            roles,
        }
    }

    pub fn has_any_role(&self, roles: &HashSet<String>) -> bool {
        self.roles.iter().any(|role| roles.contains(role))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPermission {
    Create,
    Edit,
    Remove,
}

impl KeyPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyPermission::Create => "create",
            KeyPermission::Edit => "edit",
            KeyPermission::Remove => "remove",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{actor} may not {} keys owned by {owner}", .permission.as_str())]
pub struct AuthorizationError {
    pub actor: String,
    pub permission: KeyPermission,
    pub owner: String,
}

/// Decides whether an actor may exercise a permission on keys of an owner.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        actor: &Actor,
        permission: KeyPermission,
        owner: &str,
    ) -> Result<(), AuthorizationError>;
}

#[derive(Clone, Debug, Default)]
pub struct RolePolicy {
    /// Roles allowed to act on keys of any owner.
    pub elevated_roles: HashSet<String>,
    /// Roles allowed to act on keys the actor owns.
    pub owner_roles: HashSet<String>,
}

/// key: public-key-role-authorizer
/// Role-based authorizer: elevated roles act on anyone, owner roles act on themselves.
#[derive(Clone, Debug)]
pub struct RoleAuthorizer {
    policy: RolePolicy,
}

impl RoleAuthorizer {
    pub fn new(policy: RolePolicy) -> Self {
        Self { policy }
    }

    pub fn permits(&self, actor: &Actor, owner: &str) -> bool {
        if actor.has_any_role(&self.policy.elevated_roles) {
            return true;
        }
        actor.id == owner && actor.has_any_role(&self.policy.owner_roles)
    }
}

#[async_trait]
impl Authorizer for RoleAuthorizer {
    async fn authorize(
        &self,
        actor: &Actor,
        permission: KeyPermission,
        owner: &str,
    ) -> Result<(), AuthorizationError> {
        if self.permits(actor, owner) {
            Ok(())
        } else {
            Err(AuthorizationError {
                actor: actor.id.clone(),
                permission,
                owner: owner.to_string(),
            })
        }
    }
}
