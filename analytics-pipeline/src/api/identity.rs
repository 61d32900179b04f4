//! Caller identity extraction
//!
//! The gateway in front of the service forwards either `X-UserId` /
//! `X-User-Roles` headers or the caller's bearer token. Header values win
//! over token claims.

use axum::{
    extract::{FromRequestParts, Query},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::auth::{ADMIN_ROLE, Claims};

pub const USER_ID_HEADER: &str = "X-UserId";
pub const USER_ROLES_HEADER: &str = "X-User-Roles";

/// Resolved caller of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub is_admin: bool,
    /// Credential forwarded to the permission service
    pub token: String,
}

/// Identity of a caller holding the admin role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity(pub Identity);

#[derive(Debug, Default, Deserialize)]
struct ForUser {
    for_user: Option<String>,
}

impl<S: Send + Sync> FromRequestParts<S> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let for_user = Query::<ForUser>::try_from_uri(&parts.uri)
            .map(|q| q.0.for_user)
            .unwrap_or_default();

        resolve(&parts.headers, for_user).ok_or_else(|| {
            tracing::warn!("Request without usable identity: {}", parts.uri.path());
            ApiError::Unauthorized("unauthorized".to_string())
        })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for AdminIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let identity = Identity::from_request_parts(parts, state).await?;
        if !identity.is_admin {
            tracing::warn!(
                "Non-admin user {} tried to access {}",
                identity.user_id,
                parts.uri.path()
            );
            return Err(ApiError::Unauthorized("unauthorized".to_string()));
        }
        Ok(AdminIdentity(identity))
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn resolve(headers: &HeaderMap, for_user: Option<String>) -> Option<Identity> {
    let authorization = header(headers, AUTHORIZATION.as_str());
    let claims = authorization.and_then(|token| Claims::parse(token).ok());

    let is_admin = match header(headers, USER_ROLES_HEADER) {
        Some(roles) => roles.split(',').any(|r| r.trim() == ADMIN_ROLE),
        None => claims.as_ref().is_some_and(Claims::is_admin),
    };

    let user_id = header(headers, USER_ID_HEADER)
        .map(str::to_string)
        .or_else(|| claims.map(|c| c.sub).filter(|sub| !sub.is_empty()))?;

    let token = authorization.map_or_else(|| user_id.clone(), str::to_string);

    let user_id = match for_user.filter(|u| !u.is_empty()) {
        Some(other) if is_admin => other,
        _ => user_id,
    };

    Some(Identity {
        user_id,
        is_admin,
        token,
    })
}
