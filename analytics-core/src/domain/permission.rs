//! Permission domain types
//!
//! Mirrors the resource permission model of the external permission service.
//! Every pipeline is a resource under a single topic; subjects (users, groups,
//! roles) are granted capabilities independently.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A capability that can be granted on a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Read,
    Write,
    Execute,
    Administrate,
}

impl Capability {
    /// Short code used by the permission service API
    pub fn code(self) -> &'static str {
        match self {
            Capability::Read => "r",
            Capability::Write => "w",
            Capability::Execute => "x",
            Capability::Administrate => "a",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Read => "read",
            Capability::Write => "write",
            Capability::Execute => "execute",
            Capability::Administrate => "administrate",
        };
        f.write_str(name)
    }
}

/// The four independent capabilities of one subject on one resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsMap {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub administrate: bool,
}

impl PermissionsMap {
    /// All capabilities granted
    pub fn all() -> Self {
        Self {
            read: true,
            write: true,
            execute: true,
            administrate: true,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::Read => self.read,
            Capability::Write => self.write,
            Capability::Execute => self.execute,
            Capability::Administrate => self.administrate,
        }
    }
}

/// Per-user, per-group and per-role capability maps of a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourcePermissions {
    pub user_permissions: HashMap<String, PermissionsMap>,
    pub group_permissions: HashMap<String, PermissionsMap>,
    pub role_permissions: HashMap<String, PermissionsMap>,
}

impl ResourcePermissions {
    /// Record granting the owner every capability and nothing to anyone else
    pub fn owned_by(user_id: &str) -> Self {
        let mut permissions = Self::default();
        permissions.grant_owner(user_id);
        permissions
    }

    /// Ensures `user_id` holds every capability, leaving other subjects untouched
    pub fn grant_owner(&mut self, user_id: &str) {
        self.user_permissions
            .insert(user_id.to_string(), PermissionsMap::all());
    }

    /// Whether a subject with the given user id, groups and roles holds `capability`
    pub fn allows(
        &self,
        user_id: &str,
        groups: &[String],
        roles: &[String],
        capability: Capability,
    ) -> bool {
        let by_user = self
            .user_permissions
            .get(user_id)
            .is_some_and(|p| p.allows(capability));
        let by_group = groups.iter().any(|g| {
            self.group_permissions
                .get(g)
                .is_some_and(|p| p.allows(capability))
        });
        let by_role = roles.iter().any(|r| {
            self.role_permissions
                .get(r)
                .is_some_and(|p| p.allows(capability))
        });

        by_user || by_group || by_role
    }
}

/// A resource registered with the permission service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub id: String,
    pub topic_id: String,
    #[serde(flatten)]
    pub permissions: ResourcePermissions,
}

/// A topic groups resources of one kind and defines their default permissions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topic {
    pub id: String,
    pub default_permissions: ResourcePermissions,
}
