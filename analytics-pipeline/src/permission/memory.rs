//! In-memory permission client
//!
//! Evaluates user, group and role grants in process. A token resolves to the
//! subject of its JWT claims when it carries any, otherwise the token text is
//! taken as the user id. The configured admin token bypasses every check.

use analytics_core::domain::permission::{Capability, Resource, ResourcePermissions, Topic};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{PermissionClient, PermissionError, Result};
use crate::auth::{Claims, strip_bearer};

#[derive(Debug, Default)]
struct State {
    topics: HashMap<String, Topic>,
    resources: HashMap<String, BTreeMap<String, ResourcePermissions>>,
}

#[derive(Debug)]
pub struct InMemoryPermissionClient {
    admin_token: String,
    state: RwLock<State>,
}

/// The caller a token stands for
struct Subject {
    user_id: String,
    groups: Vec<String>,
    roles: Vec<String>,
}

impl InMemoryPermissionClient {
    pub fn new(admin_token: impl Into<String>) -> Self {
        Self {
            admin_token: admin_token.into(),
            state: RwLock::new(State::default()),
        }
    }

    fn is_admin_token(&self, token: &str) -> bool {
        !self.admin_token.is_empty() && strip_bearer(token) == strip_bearer(&self.admin_token)
    }

    fn subject(token: &str) -> Subject {
        match Claims::parse(token) {
            Ok(claims) if !claims.sub.is_empty() => Subject {
                user_id: claims.sub,
                groups: claims.groups,
                roles: claims.realm_access.roles,
            },
            _ => Subject {
                user_id: strip_bearer(token).to_string(),
                groups: Vec::new(),
                roles: Vec::new(),
            },
        }
    }

    fn require_admin(&self, token: &str) -> Result<()> {
        if self.is_admin_token(token) {
            Ok(())
        } else {
            Err(PermissionError::Api {
                status: 403,
                message: "administrative token required".to_string(),
            })
        }
    }
}

impl State {
    fn allows(&self, topic: &str, id: &str, subject: &Subject, capability: Capability) -> bool {
        let Some(permissions) = self.resources.get(topic).and_then(|r| r.get(id)) else {
            return false;
        };

        let granted = |p: &ResourcePermissions| {
            p.allows(&subject.user_id, &subject.groups, &subject.roles, capability)
        };

        granted(permissions)
            || self
                .topics
                .get(topic)
                .is_some_and(|t| granted(&t.default_permissions))
    }
}

#[async_trait]
impl PermissionClient for InMemoryPermissionClient {
    async fn ensure_topic(&self, token: &str, topic: &Topic) -> Result<()> {
        self.require_admin(token)?;
        self.state
            .write()
            .await
            .topics
            .insert(topic.id.clone(), topic.clone());
        Ok(())
    }

    async fn check_permission(
        &self,
        token: &str,
        topic: &str,
        id: &str,
        capability: Capability,
    ) -> Result<bool> {
        let state = self.state.read().await;
        if self.is_admin_token(token) {
            return Ok(state.resources.get(topic).is_some_and(|r| r.contains_key(id)));
        }

        Ok(state.allows(topic, id, &Self::subject(token), capability))
    }

    async fn list_accessible_resource_ids(
        &self,
        token: &str,
        topic: &str,
        capability: Capability,
    ) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let Some(resources) = state.resources.get(topic) else {
            return Ok(Vec::new());
        };

        if self.is_admin_token(token) {
            return Ok(resources.keys().cloned().collect());
        }

        let subject = Self::subject(token);
        Ok(resources
            .keys()
            .filter(|id| state.allows(topic, id, &subject, capability))
            .cloned()
            .collect())
    }

    async fn get_resource(&self, token: &str, topic: &str, id: &str) -> Result<Option<Resource>> {
        self.require_admin(token)?;
        let state = self.state.read().await;

        Ok(state
            .resources
            .get(topic)
            .and_then(|r| r.get(id))
            .map(|permissions| Resource {
                id: id.to_string(),
                topic_id: topic.to_string(),
                permissions: permissions.clone(),
            }))
    }

    async fn list_resources(&self, token: &str, topic: &str) -> Result<Vec<Resource>> {
        self.require_admin(token)?;
        let state = self.state.read().await;

        Ok(state
            .resources
            .get(topic)
            .map(|resources| {
                resources
                    .iter()
                    .map(|(id, permissions)| Resource {
                        id: id.clone(),
                        topic_id: topic.to_string(),
                        permissions: permissions.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_permission(
        &self,
        token: &str,
        topic: &str,
        id: &str,
        permissions: &ResourcePermissions,
    ) -> Result<()> {
        self.require_admin(token)?;
        self.state
            .write()
            .await
            .resources
            .entry(topic.to_string())
            .or_default()
            .insert(id.to_string(), permissions.clone());
        Ok(())
    }

    async fn remove_resource(&self, token: &str, topic: &str, id: &str) -> Result<()> {
        self.require_admin(token)?;
        if let Some(resources) = self.state.write().await.resources.get_mut(topic) {
            resources.remove(id);
        }
        Ok(())
    }
}
